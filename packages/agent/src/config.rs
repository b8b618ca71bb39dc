//! Agent command line and environment.

use std::time::Duration;

use clap::Parser;

/// Print agent: receives label jobs over a socket and sends them to a printer.
#[derive(Debug, Clone, Parser)]
#[command(name = "print-agent", version)]
pub struct AgentConfig {
    /// Label server host and port, or a full ws:// URL.
    #[arg(long, env = "WS_HOST")]
    pub ws_host: String,

    /// Shared secret for the socket handshake.
    #[arg(long, env = "WS_PASSWORD", hide_env_values = true)]
    pub ws_password: String,

    /// Labels older than this many milliseconds are not printed.
    #[arg(long = "label-max-age", env = "LABEL_MAX_AGE")]
    pub label_max_age_ms: u64,

    /// Seconds between heartbeats.
    #[arg(long, env = "HEARTBEAT_SECS", default_value_t = 10)]
    pub heartbeat_secs: u64,

    /// Command that prints a spooled label file, which is passed as the last argument.
    #[arg(long, env = "PRINT_COMMAND", default_value = "lp -o raw")]
    pub print_command: String,
}

impl AgentConfig {
    /// Socket URL of the label server.
    pub fn url(&self) -> String {
        let host = self.ws_host.trim().trim_end_matches('/');
        if host.starts_with("ws://") || host.starts_with("wss://") {
            host.to_string()
        } else {
            format!("ws://{}/ws", host)
        }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.label_max_age_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}
