use std::{net::SocketAddr, time::Duration};

use clap::{Parser, ValueEnum};

use crate::aiven::client::DEFAULT_API_URL;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Kafkarator synchronizes Kafka topics and streams with Aiven.
#[derive(Parser, Clone)]
#[command(name = "kafkarator", version)]
pub(crate) struct Config {
    /// Administrator credentials for the Aiven API, `AIVEN_TOKEN` is accepted as well
    #[arg(long, env = "KAFKARATOR_AIVEN_TOKEN", hide_env_values = true)]
    aiven_token: Option<String>,

    #[arg(long, env = "KAFKARATOR_AIVEN_API_URL", default_value = DEFAULT_API_URL)]
    pub aiven_api_url: String,

    /// Comma separated list of Aiven projects (pools) which may be used in this cluster
    #[arg(
        long,
        env = "KAFKARATOR_PROJECTS",
        value_delimiter = ',',
        default_value = "nav-integration-test"
    )]
    pub projects: Vec<String>,

    /// Retry interval for failed synchronizations, also bounds every Aiven API call
    #[arg(long, env = "KAFKARATOR_REQUEUE_INTERVAL", default_value = "10s", value_parser = humantime::parse_duration)]
    pub requeue_interval: Duration,

    #[arg(long, env = "KAFKARATOR_CREDENTIALS_LIFETIME", default_value = "24h", value_parser = humantime::parse_duration)]
    pub credentials_lifetime: Duration,

    /// Interval between topic and ACL metric reports
    #[arg(long, env = "KAFKARATOR_TOPIC_REPORT_INTERVAL", default_value = "5m", value_parser = humantime::parse_duration)]
    pub topic_report_interval: Duration,

    #[arg(long, env = "KAFKARATOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[arg(long, env = "KAFKARATOR_METRICS_ADDRESS", default_value = "127.0.0.1:8080")]
    pub metrics_address: SocketAddr,

    /// Log Aiven writes instead of executing them
    #[arg(long, env = "KAFKARATOR_DRY_RUN")]
    pub dry_run: bool,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn aiven_token(&self) -> anyhow::Result<String> {
        self.aiven_token
            .clone()
            .filter(|v| !v.is_empty())
            .or_else(|| env_var("AIVEN_TOKEN"))
            .ok_or_else(|| anyhow::anyhow!("the Aiven token is not configured"))
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "aiven-token=<redacted> aiven-api-url={} projects={} requeue-interval={} credentials-lifetime={} topic-report-interval={} log-format={:?} metrics-address={} dry-run={}",
            self.aiven_api_url,
            self.projects.join(","),
            humantime::format_duration(self.requeue_interval),
            humantime::format_duration(self.credentials_lifetime),
            humantime::format_duration(self.topic_report_interval),
            self.log_format,
            self.metrics_address,
            self.dry_run
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let config = Config::try_parse_from([
            "kafkarator",
            "--aiven-token",
            "avns_secret",
            "--projects",
            "pool1,pool2",
            "--requeue-interval",
            "30s",
            "--log-format",
            "json",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!("avns_secret", config.aiven_token().unwrap());
        assert_eq!(vec!["pool1", "pool2"], config.projects);
        assert_eq!(Duration::from_secs(30), config.requeue_interval);
        assert_eq!(Duration::from_secs(24 * 3600), config.credentials_lifetime);
        assert_eq!(LogFormat::Json, config.log_format);
        assert!(config.dry_run);
        assert!(!config.to_string().contains("avns_secret"));
    }

    #[test]
    fn rejects_unknown_log_format() {
        assert!(
            Config::try_parse_from(["kafkarator", "--log-format", "xml"]).is_err()
        );
    }
}
