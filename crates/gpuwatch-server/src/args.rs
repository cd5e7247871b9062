use std::time::Duration;

use clap::Parser;

use gpuwatch_monitor::MonitorConfig;
use gpuwatch_remote::SshOptions;

#[derive(Debug, Parser)]
#[command(name = "gpuwatch-server", about = "Serve live GPU stats for a fleet of SSH hosts")]
pub struct Args {
    #[arg(long, env = "GPUWATCH_LISTEN_ADDR", default_value = "0.0.0.0:8888")]
    pub listen_addr: String,

    /// TOML file with one `[[hosts]]` table per monitored machine.
    #[arg(long, env = "GPUWATCH_HOSTS_FILE", default_value = "hosts.toml")]
    pub hosts_file: String,

    #[arg(long, env = "GPUWATCH_CADENCE_MS", default_value_t = 3000)]
    pub cadence_ms: u64,

    #[arg(long, env = "GPUWATCH_FLOOR_MS", default_value_t = 500)]
    pub floor_ms: u64,

    #[arg(long, env = "GPUWATCH_CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    #[arg(long, env = "GPUWATCH_QUERY_TIMEOUT_MS", default_value_t = 10000)]
    pub query_timeout_ms: u64,

    #[arg(long, env = "GPUWATCH_LOOKUP_TIMEOUT_MS", default_value_t = 5000)]
    pub lookup_timeout_ms: u64,

    #[arg(long, env = "GPUWATCH_KEEPALIVE_SECS", default_value_t = 30)]
    pub keepalive_secs: u64,

    /// `text` or `json`.
    #[arg(long, env = "GPUWATCH_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[arg(long, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}

impl Args {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            cadence: Duration::from_millis(self.cadence_ms),
            floor: Duration::from_millis(self.floor_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
        }
    }

    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            keepalive_interval: Duration::from_secs(self.keepalive_secs),
        }
    }
}
