mod input;
mod local;
mod logging;
mod ssh;
mod writer;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tmon_core::DashboardConfig;
use tracing::info;

const DEFAULT_ADDR: &str = "localhost:23234";
const DEFAULT_LOG_DIR: &str = ".";

#[derive(Clone, Debug)]
pub struct HostConfig {
    pub addr: String,
    pub host_key: Option<PathBuf>,
    pub dashboard: Option<PathBuf>,
    pub log_dir: String,
    pub debug: bool,
    pub shutdown_grace: Duration,
    pub local: bool,
}

#[derive(Parser, Debug)]
#[command(name = "tmon", about = "Service status and kernel log dashboard served over SSH")]
struct Args {
    /// Listen address for the SSH server.
    #[arg(long, default_value = "")]
    addr: String,
    /// OpenSSH private key used as host key; an ed25519 key is generated when empty.
    #[arg(long, default_value = "")]
    host_key: String,
    /// TOML dashboard configuration.
    #[arg(long, default_value = "")]
    config: String,
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
    /// Seconds to wait for open sessions after a shutdown signal.
    #[arg(long, default_value_t = 30)]
    shutdown_grace: u64,
    /// Run one dashboard on this terminal instead of serving SSH.
    #[arg(long, default_value_t = false)]
    local: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let host = load_config();
    logging::init_logging(&host);

    let dashboard = DashboardConfig::load(host.dashboard.as_deref())
        .context("loading dashboard configuration")?;
    info!(
        event = "config_loaded",
        services = dashboard.services.len(),
        status_check = %dashboard.status_check,
        log_stream = %dashboard.log_stream,
    );

    if host.local {
        return local::run(dashboard).await;
    }
    ssh::serve(&host, dashboard).await
}

fn load_config() -> HostConfig {
    let args = Args::parse();
    HostConfig {
        addr: resolve_flag(&args.addr, "TMON_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        host_key: resolve_flag(&args.host_key, "TMON_HOST_KEY").map(PathBuf::from),
        dashboard: resolve_flag(&args.config, "TMON_CONFIG").map(PathBuf::from),
        log_dir: resolve_flag(&args.log_dir, "TMON_LOG_DIR")
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()),
        debug: args.debug || env_true("TMON_DEBUG"),
        shutdown_grace: Duration::from_secs(args.shutdown_grace),
        local: args.local,
    }
}

/// Non-empty flag value, else non-empty environment value.
fn resolve_flag(flag: &str, key: &str) -> Option<String> {
    if !flag.trim().is_empty() {
        return Some(flag.to_string());
    }
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_environment() {
        assert_eq!(
            resolve_flag("127.0.0.1:2222", "TMON_TEST_UNSET_ADDR"),
            Some("127.0.0.1:2222".to_string())
        );
    }

    #[test]
    fn blank_flag_and_unset_env_resolve_to_none() {
        assert_eq!(resolve_flag("  ", "TMON_TEST_UNSET_ADDR"), None);
        assert!(!env_true("TMON_TEST_UNSET_DEBUG"));
    }

    #[test]
    fn args_parse_with_defaults() {
        let args = Args::parse_from(["tmon", "--local"]);
        assert!(args.local);
        assert_eq!(args.shutdown_grace, 30);
        assert!(args.addr.is_empty());
    }
}
