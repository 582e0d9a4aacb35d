use std::io::Write;

use env_logger::{Builder, Env};
use k8s_openapi::chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::config::LogFormat;

fn json_line(level: log::Level, target: &str, message: &str) -> String {
    json!({
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "level": level.as_str(),
        "target": target,
        "message": message,
    })
    .to_string()
}

/// Installs the global logger, `RUST_LOG` selects the level (default `info`).
pub(crate) fn init(format: LogFormat) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if format == LogFormat::Json {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{}",
                json_line(record.level(), record.target(), &record.args().to_string())
            )
        });
    }
    builder.init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_lines() {
        let line: serde_json::Value =
            serde_json::from_str(&json_line(log::Level::Warn, "kafkarator", "say \"hi\"")).unwrap();
        assert_eq!("WARN", line["level"]);
        assert_eq!("kafkarator", line["target"]);
        assert_eq!("say \"hi\"", line["message"]);
        assert!(line["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
