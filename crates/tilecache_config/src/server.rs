use serde::Deserialize;

// =======================================================
// SERVER CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Client-facing listen address, e.g. "0.0.0.0:8080".
    pub listen: String,
    /// Global limit of concurrently served connections.
    pub worker_connections: u32,
    /// Time allowed for a client to send request headers.
    pub header_read_timeout_secs: u64,
    pub keepalive: bool,
    /// How long shutdown waits for in-flight connections.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            worker_connections: 1024,
            header_read_timeout_secs: 15 * 60,
            keepalive: true,
            shutdown_grace_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn worker_connections(&self) -> u32 {
        self.worker_connections
    }

    pub fn header_read_timeout_secs(&self) -> u64 {
        self.header_read_timeout_secs
    }

    pub fn keepalive(&self) -> bool {
        self.keepalive
    }

    pub fn shutdown_grace_secs(&self) -> u64 {
        self.shutdown_grace_secs
    }

    pub(crate) fn apply_defaults_from(&mut self, defaults: &ServerConfig) {
        let listen = self.listen.trim();
        if listen.is_empty() {
            self.listen = defaults.listen.clone();
        } else if listen.starts_with(':') {
            // ":8080" listens on every interface.
            self.listen = format!("0.0.0.0{listen}");
        }
        if self.worker_connections == 0 {
            self.worker_connections = defaults.worker_connections;
        }
        if self.header_read_timeout_secs == 0 {
            self.header_read_timeout_secs = defaults.header_read_timeout_secs;
        }
        if self.shutdown_grace_secs == 0 {
            self.shutdown_grace_secs = defaults.shutdown_grace_secs;
        }
    }
}
