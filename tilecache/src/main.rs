use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tilecache_cache::CacheStore;
use tilecache_config::TilecacheConfig;
use tilecache_core::Master;
use tracing::{info, warn};
use utils::init_tracing;

/// Caching reverse proxy for a remote tile API.
#[derive(Debug, Parser)]
#[command(name = "tilecache", version, about)]
struct Cli {
    /// Path to the configuration file (JSON, TOML, ...).
    #[arg(long, default_value = "config.json")]
    config: String,
}

/// Accepts the single-dash `-config <path>` and `-config=<path>` forms.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-config") => OsString::from("--config"),
            Some(s) if s.starts_with("-config=") => OsString::from(format!("-{s}")),
            _ => arg,
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_tracing();

    let cfg = TilecacheConfig::load(&cli.config)
        .with_context(|| format!("failed to load config '{}'", cli.config))?;
    cfg.log_summary();

    let cache = match cfg.cache().dir() {
        Some(dir) => CacheStore::open(dir, cfg.cache().read_connections())
            .with_context(|| format!("failed to open cache store in '{dir}'"))?,
        None => {
            warn!(target: "tilecache::master", "No cache dir configured; using an in-memory cache");
            CacheStore::in_memory()
        }
    };

    let master = Master::new(cfg, cache)?;
    master.run().await?;

    info!(target: "tilecache::master", "Bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Cli, normalize_args};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(normalize_args(args.iter().map(|a| OsString::from(*a)))).expect("parse")
    }

    #[test]
    fn single_dash_config_is_accepted() {
        assert_eq!(parse(&["tilecache", "-config", "x.json"]).config, "x.json");
        assert_eq!(parse(&["tilecache", "-config=y.json"]).config, "y.json");
    }

    #[test]
    fn double_dash_config_and_default() {
        assert_eq!(parse(&["tilecache", "--config", "z.toml"]).config, "z.toml");
        assert_eq!(parse(&["tilecache"]).config, "config.json");
    }
}
