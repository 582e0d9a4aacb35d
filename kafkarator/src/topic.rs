use kafkarator_apis::{Config, Stream, Topic, now};

use crate::{
    aiven::{
        ConfigValue, CreateKafkaTopicRequest, KafkaListTopic, KafkaTopic, KafkaTopicConfig,
        KafkaTopicTag, KafkaTopics, UpdateKafkaTopicRequest,
    },
    errors::ControllerError,
    metrics::observe_aiven_latency,
};

const HOUR_MS: i64 = 3_600_000;
const INFINITE_RETENTION_MS: i64 = -1;

/// Synchronizes a single [`Topic`] with its Aiven counterpart.
pub(crate) struct TopicManager<'a> {
    pub topics: &'a dyn KafkaTopics,
    pub project: &'a str,
    pub service: &'a str,
    pub topic: &'a Topic,
    pub dry_run: bool,
}

impl<'a> TopicManager<'a> {
    /// Creates the topic when missing, updates it when its configuration diverges.
    pub(crate) async fn synchronize(&self) -> Result<(), ControllerError> {
        if let Some(cfg) = &self.topic.spec.config {
            validate(cfg)?;
        }
        let name = self.topic.full_name();
        let existing = observe_aiven_latency(
            "Topic_Get",
            self.project,
            self.topics.get(self.project, self.service, &name),
        )
        .await;
        match existing {
            Ok(existing) => {
                if topic_config_changed(&existing, self.topic.spec.config.as_ref())? {
                    info!("topic {} already exists but its configuration changed", name);
                    self.update().await
                } else {
                    debug!("topic {} is up to date", name);
                    Ok(())
                }
            }
            Err(e) if e.is_not_found() => {
                info!("topic {} does not exist", name);
                self.create().await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self) -> Result<(), ControllerError> {
        let default = Config::default();
        let cfg = self.topic.spec.config.as_ref().unwrap_or(&default);
        validate(cfg)?;
        let req = CreateKafkaTopicRequest {
            topic_name: self.topic.full_name(),
            partitions: cfg.partitions,
            replication: cfg.replication,
            config: KafkaTopicConfig {
                cleanup_policy: cfg.cleanup_policy.clone(),
                ..topic_config(cfg)?
            },
            tags: tags(),
        };
        if self.dry_run {
            info!("DRY RUN: would create topic {:?}", req);
            return Ok(());
        }
        info!("creating topic {}", req.topic_name);
        observe_aiven_latency(
            "Topic_Create",
            self.project,
            self.topics.create(self.project, self.service, req),
        )
        .await?;
        Ok(())
    }

    /// Updates everything but the cleanup policy, which Aiven cannot change.
    async fn update(&self) -> Result<(), ControllerError> {
        let default = Config::default();
        let cfg = self.topic.spec.config.as_ref().unwrap_or(&default);
        validate(cfg)?;
        let name = self.topic.full_name();
        let req = UpdateKafkaTopicRequest {
            partitions: cfg.partitions,
            replication: cfg.replication,
            config: topic_config(cfg)?,
            tags: tags(),
        };
        if self.dry_run {
            info!("DRY RUN: would update topic {} with {:?}", name, req);
            return Ok(());
        }
        info!("updating topic {}", name);
        observe_aiven_latency(
            "Topic_Update",
            self.project,
            self.topics.update(self.project, self.service, &name, req),
        )
        .await?;
        Ok(())
    }

    /// Deletes the topic and its data, a missing topic counts as deleted.
    pub(crate) async fn delete(&self) -> Result<(), ControllerError> {
        delete_topic(
            self.topics,
            self.project,
            self.service,
            &self.topic.full_name(),
            self.dry_run,
        )
        .await
    }
}

async fn delete_topic(
    topics: &dyn KafkaTopics,
    project: &str,
    service: &str,
    name: &str,
    dry_run: bool,
) -> Result<(), ControllerError> {
    if dry_run {
        info!("DRY RUN: would delete topic {}", name);
        return Ok(());
    }
    match observe_aiven_latency("Topic_Delete", project, topics.delete(project, service, name))
        .await
    {
        Ok(()) => {
            info!("deleted topic {}", name);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!("topic {} was already deleted", name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn list_topics(
    topics: &dyn KafkaTopics,
    project: &str,
    service: &str,
) -> Result<Vec<KafkaListTopic>, ControllerError> {
    Ok(observe_aiven_latency("Topic_List", project, topics.list(project, service)).await?)
}

/// Deletes every topic of the stream, returns how many were deleted.
pub(crate) async fn delete_stream_topics(
    topics: &dyn KafkaTopics,
    project: &str,
    service: &str,
    stream: &Stream,
    dry_run: bool,
) -> Result<usize, ControllerError> {
    let owned: Vec<KafkaListTopic> = list_topics(topics, project, service)
        .await?
        .into_iter()
        .filter(|t| stream.owns_topic(&t.topic_name))
        .collect();
    for topic in &owned {
        delete_topic(topics, project, service, &topic.topic_name, dry_run).await?;
    }
    Ok(owned.len())
}

fn validate(cfg: &Config) -> Result<(), ControllerError> {
    if let Some(partitions) = cfg.partitions.filter(|p| *p < 1) {
        return Err(ControllerError::Config(format!(
            "Partitions ({}) must be at least 1",
            partitions
        )));
    }
    retention_ms(cfg.retention_hours)?;
    segment_ms(cfg.segment_hours)?;
    match (cfg.minimum_in_sync_replicas, cfg.replication) {
        (Some(min_isr), Some(replication)) if min_isr > replication => {
            Err(ControllerError::Config(format!(
                "MinimumInSyncReplicas ({}) shouldn't be bigger than Replication ({})",
                min_isr, replication
            )))
        }
        _ => Ok(()),
    }
}

fn topic_config(cfg: &Config) -> Result<KafkaTopicConfig, ControllerError> {
    Ok(KafkaTopicConfig {
        cleanup_policy: None,
        max_message_bytes: cfg.max_message_bytes,
        min_insync_replicas: cfg.minimum_in_sync_replicas.map(i64::from),
        retention_bytes: cfg.retention_bytes,
        retention_ms: retention_ms(cfg.retention_hours)?,
        segment_ms: segment_ms(cfg.segment_hours)?,
    })
}

fn tags() -> Vec<KafkaTopicTag> {
    vec![
        KafkaTopicTag {
            key: "created-by".to_string(),
            value: "Kafkarator".to_string(),
        },
        KafkaTopicTag {
            key: "touched-at".to_string(),
            value: now(),
        },
    ]
}

fn hours_to_ms(field: &str, hours: i64) -> Result<i64, ControllerError> {
    hours.checked_mul(HOUR_MS).ok_or_else(|| {
        ControllerError::Config(format!("{} ({}) is too large", field, hours))
    })
}

/// Negative hours mean infinite retention.
fn retention_ms(hours: Option<i64>) -> Result<Option<i64>, ControllerError> {
    hours
        .map(|h| {
            if h < 0 {
                Ok(INFINITE_RETENTION_MS)
            } else {
                hours_to_ms("RetentionHours", h)
            }
        })
        .transpose()
}

/// Segments are at least an hour long.
fn segment_ms(hours: Option<i64>) -> Result<Option<i64>, ControllerError> {
    hours
        .map(|h| hours_to_ms("SegmentHours", h.max(1)))
        .transpose()
}

fn value_changed<T: PartialEq>(wanted: Option<T>, actual: &Option<ConfigValue<T>>) -> bool {
    match (wanted, actual) {
        (None, _) => false,
        (Some(w), Some(a)) => w != a.value,
        (Some(_), None) => true,
    }
}

/// Whether any configured field differs from the existing topic.
pub(crate) fn topic_config_changed(
    topic: &KafkaTopic,
    config: Option<&Config>,
) -> Result<bool, ControllerError> {
    let Some(cfg) = config else {
        return Ok(false);
    };
    if cfg.replication.map_or(false, |r| r != topic.replication) {
        return Ok(true);
    }
    if cfg
        .partitions
        .map_or(false, |p| i64::from(p) != topic.partitions.len() as i64)
    {
        return Ok(true);
    }
    Ok(value_changed(cfg.cleanup_policy.clone(), &topic.config.cleanup_policy)
        || value_changed(
            cfg.minimum_in_sync_replicas.map(i64::from),
            &topic.config.min_insync_replicas,
        )
        || value_changed(cfg.retention_bytes, &topic.config.retention_bytes)
        || value_changed(retention_ms(cfg.retention_hours)?, &topic.config.retention_ms)
        || value_changed(cfg.max_message_bytes, &topic.config.max_message_bytes)
        || value_changed(segment_ms(cfg.segment_hours)?, &topic.config.segment_ms))
}
