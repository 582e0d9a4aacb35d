use std::{future::Future, sync::OnceLock, time::Instant};

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Gauge, Histogram, Meter},
};

use crate::{aiven::AivenError, utils::metric_name};

const KAFKARATOR: &'static str = "kafkarator";

/// Process wide metric instruments.
///
/// Created on first use, so the meter provider has to be installed before.
pub(crate) struct Metrics {
    pub aiven_latency: Histogram<f64>,
    pub topics_processed: Counter<u64>,
    pub streams_processed: Counter<u64>,
    pub topics: Gauge<u64>,
    pub acls: Gauge<u64>,
    pub reconcile_count: Counter<u64>,
    pub reconcile_duration: Histogram<u64>,
    pub reconcile_errors: Counter<u64>,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    fn new() -> Self {
        let meter: Meter = global::meter(KAFKARATOR);
        Self {
            aiven_latency: meter
                .f64_histogram(metric_name("aiven_latency"))
                .with_description("Latency of Aiven API calls")
                .with_unit("s")
                .with_boundaries(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
                .build(),
            topics_processed: meter
                .u64_counter(metric_name("topics_processed"))
                .with_description("Number of topics processed")
                .build(),
            streams_processed: meter
                .u64_counter(metric_name("streams_processed"))
                .with_description("Number of streams processed")
                .build(),
            topics: meter
                .u64_gauge(metric_name("topics"))
                .with_description("Number of topics by source, team and pool")
                .build(),
            acls: meter
                .u64_gauge(metric_name("acls"))
                .with_description("Number of ACL entries by topic, team, application and pool")
                .build(),
            reconcile_count: meter
                .u64_counter(metric_name("reconcile_count"))
                .with_description("Count of reconcile invocations")
                .build(),
            reconcile_duration: meter
                .u64_histogram(metric_name("reconcile_duration_ms"))
                .with_description("Reconcile duration in milliseconds")
                .with_unit("ms")
                .build(),
            reconcile_errors: meter
                .u64_counter(metric_name("reconcile_errors"))
                .with_description("Count of reconcile invocation errors")
                .build(),
        }
    }
}

pub(crate) fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Runs an Aiven API call and records its latency, tagged by operation, pool and status.
pub(crate) async fn observe_aiven_latency<T, F>(
    operation: &'static str,
    pool: &str,
    call: F,
) -> Result<T, AivenError>
where
    F: Future<Output = Result<T, AivenError>>,
{
    let start = Instant::now();
    let result = call.await;
    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status,
    };
    metrics().aiven_latency.record(
        start.elapsed().as_secs_f64(),
        &[
            KeyValue::new("operation", operation),
            KeyValue::new("pool", pool.to_string()),
            KeyValue::new("status", i64::from(status)),
        ],
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_results() {
        let ok = observe_aiven_latency("Topic_Get", "pool", async { Ok::<_, AivenError>(42) }).await;
        assert_eq!(Ok(42), ok);
        let err = observe_aiven_latency("Topic_Get", "pool", async {
            Err::<(), _>(AivenError::new(404, "not found", ""))
        })
        .await;
        assert!(err.unwrap_err().is_not_found());
    }

    #[test]
    fn instruments_are_created_once() {
        let first = metrics() as *const Metrics;
        let second = metrics() as *const Metrics;
        assert_eq!(first, second);
    }
}
