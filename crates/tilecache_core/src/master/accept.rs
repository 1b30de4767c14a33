use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use hyper::{Request, body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    server::graceful::GracefulShutdown,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{OwnedSemaphorePermit, Semaphore},
};
use tracing::{debug, error, info};

use crate::Dispatcher;

/// Per-connection HTTP/1 settings taken from `[server]`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnSettings {
    pub(crate) header_read_timeout: Duration,
    pub(crate) keepalive: bool,
}

pub(crate) struct AcceptedConn {
    stream: TcpStream,
    addr: SocketAddr,
    permit: OwnedSemaphorePermit,
}

pub(crate) async fn bind_listener(listen_addr: &str) -> anyhow::Result<TcpListener> {
    info!(
        target: "tilecache::master",
        listen = %listen_addr,
        "Binding listener"
    );

    match TcpListener::bind(listen_addr).await {
        Ok(listener) => {
            info!(
                target: "tilecache::master",
                listen = %listen_addr,
                "Bind() successful"
            );
            Ok(listener)
        }
        Err(e) => {
            error!(
                target: "tilecache::master",
                listen = %listen_addr,
                error = ?e,
                "Failed to bind listener"
            );
            Err(e.into())
        }
    }
}

/// Waits for a free connection slot, then for the next client.
///
/// The permit is taken first so that a saturated server stops accepting
/// instead of holding sockets it cannot serve.
pub(crate) async fn accept_with_permit(
    listener: &TcpListener,
    semaphore: &Arc<Semaphore>,
) -> anyhow::Result<AcceptedConn> {
    let permit = semaphore.clone().acquire_owned().await?;
    let (stream, addr) = listener.accept().await?;

    debug!(
        target: "tilecache::master",
        client_addr = %addr,
        available_permits = semaphore.available_permits(),
        "Connection accepted"
    );

    Ok(AcceptedConn {
        stream,
        addr,
        permit,
    })
}

/// Spawns the task that serves one client connection.
pub(crate) fn serve_connection(
    conn: AcceptedConn,
    dispatcher: Arc<Dispatcher>,
    settings: ConnSettings,
    graceful: &GracefulShutdown,
) {
    let AcceptedConn {
        stream,
        addr,
        permit,
    } = conn;

    let service = service_fn(move |req: Request<Incoming>| {
        let dispatcher = dispatcher.clone();
        async move { Ok::<_, Infallible>(dispatcher.handle(req, addr).await) }
    });

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(settings.header_read_timeout)
        .keep_alive(settings.keepalive);
    let connection = graceful.watch(builder.serve_connection(TokioIo::new(stream), service));

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(
                target: "tilecache::master",
                client_addr = %addr,
                error = %e,
                "Connection closed with error"
            );
        }

        drop(permit);
        debug!(
            target: "tilecache::master",
            client_addr = %addr,
            "Permit released after connection closed"
        );
    });
}
