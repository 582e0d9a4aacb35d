use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kafkarator_apis::{Stream, SyncStatus, Topic, TopicAcl};
use kube::ResourceExt;
use opentelemetry::metrics::Counter;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    acl::{KafkaAclAdapter, Manager, SchemaRegistryAclAdapter, Source},
    aiven::Interfaces,
    errors::ControllerError,
    metrics::Metrics,
    topic::{TopicManager, delete_stream_topics},
};

/// ACL view of a [`Topic`], without ACLs while the topic is being deleted.
pub(crate) struct TopicSource<'a> {
    pub topic: &'a Topic,
    pub stripped: bool,
}

impl<'a> Source for TopicSource<'a> {
    fn topic_pattern(&self) -> String {
        self.topic.full_name()
    }

    fn pool(&self) -> &str {
        &self.topic.spec.pool
    }

    fn acls(&self) -> Vec<TopicAcl> {
        if self.stripped {
            Vec::new()
        } else {
            self.topic.spec.acl.clone()
        }
    }
}

/// ACL view of a [`Stream`], covering all of its topics.
pub(crate) struct StreamSource<'a> {
    pub stream: &'a Stream,
    pub stripped: bool,
}

impl<'a> Source for StreamSource<'a> {
    fn topic_pattern(&self) -> String {
        self.stream.topic_wildcard()
    }

    fn pool(&self) -> &str {
        &self.stream.spec.pool
    }

    fn acls(&self) -> Vec<TopicAcl> {
        if self.stripped {
            Vec::new()
        } else {
            self.stream.acls()
        }
    }
}

/// Synchronizes resources of one pool with Aiven.
pub(crate) struct Synchronizer {
    aiven: Interfaces,
    project: String,
    service: String,
    dry_run: bool,
}

impl Synchronizer {
    /// Resolves the Kafka service of the pool.
    pub(crate) async fn new(
        aiven: &Interfaces,
        pool: &str,
        dry_run: bool,
    ) -> Result<Self, ControllerError> {
        let service = aiven.name_resolver.resolve_kafka_service_name(pool).await?;
        Ok(Self {
            aiven: aiven.clone(),
            project: pool.to_string(),
            service,
            dry_run,
        })
    }

    /// Kafka ACLs first, then Schema Registry ACLs.
    async fn synchronize_acls(&self, source: &dyn Source) -> Result<(), ControllerError> {
        let kafka = KafkaAclAdapter {
            client: self.aiven.kafka_acls.clone(),
            project: self.project.clone(),
            service: self.service.clone(),
        };
        let schema_registry = SchemaRegistryAclAdapter {
            client: self.aiven.schema_registry_acls.clone(),
            project: self.project.clone(),
            service: self.service.clone(),
        };
        debug!(
            "synchronizing access control lists of {} in pool {}",
            source.topic_pattern(),
            source.pool()
        );
        Manager {
            adapter: &kafka,
            source,
            dry_run: self.dry_run,
        }
        .synchronize()
        .await?;
        Manager {
            adapter: &schema_registry,
            source,
            dry_run: self.dry_run,
        }
        .synchronize()
        .await
    }

    fn topic_manager<'a>(&'a self, topic: &'a Topic) -> TopicManager<'a> {
        TopicManager {
            topics: self.aiven.topics.as_ref(),
            project: &self.project,
            service: &self.service,
            topic,
            dry_run: self.dry_run,
        }
    }

    pub(crate) async fn synchronize_topic(&self, topic: &Topic) -> Result<(), ControllerError> {
        self.synchronize_acls(&TopicSource {
            topic,
            stripped: false,
        })
        .await?;
        debug!("synchronizing topic {}", topic.full_name());
        self.topic_manager(topic).synchronize().await
    }

    /// Removes the topic ACLs, and the topic itself when asked to remove its data.
    pub(crate) async fn delete_topic(&self, topic: &Topic) -> Result<&'static str, ControllerError> {
        info!("deleting ACLs of topic {}", topic.full_name());
        self.synchronize_acls(&TopicSource {
            topic,
            stripped: true,
        })
        .await?;
        if topic.remove_data_when_deleted() {
            info!("permanently deleting topic {} and its data", topic.full_name());
            self.topic_manager(topic).delete().await?;
            Ok("Topic, ACLs and data permanently deleted")
        } else {
            Ok("Topic and ACLs deleted, data kept")
        }
    }

    pub(crate) async fn synchronize_stream(&self, stream: &Stream) -> Result<(), ControllerError> {
        self.synchronize_acls(&StreamSource {
            stream,
            stripped: false,
        })
        .await
    }

    /// Removes the stream ACLs and every topic of the stream.
    pub(crate) async fn delete_stream(&self, stream: &Stream) -> Result<&'static str, ControllerError> {
        info!("deleting ACLs of stream {}", stream.topic_wildcard());
        self.synchronize_acls(&StreamSource {
            stream,
            stripped: true,
        })
        .await?;
        let deleted = delete_stream_topics(
            self.aiven.topics.as_ref(),
            &self.project,
            &self.service,
            stream,
            self.dry_run,
        )
        .await?;
        info!(
            "deleted {} topics of stream {}",
            deleted,
            stream.topic_prefix()
        );
        Ok("Stream, ACLs and data permanently deleted")
    }
}

/// A custom resource which is synchronized to an Aiven pool.
#[async_trait]
pub(crate) trait SyncResource:
    kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: &'static str;
    const SUCCESS_MESSAGE: &'static str;

    fn pool(&self) -> &str;
    fn sync_status(&self) -> Option<&SyncStatus>;
    fn sync_status_mut(&mut self) -> &mut SyncStatus;
    fn spec_hash(&self) -> Result<String, ControllerError>;
    /// Sets the names the resource is known by on the Kafka broker.
    fn set_qualified_name(&mut self);
    fn processed_counter(metrics: &Metrics) -> &Counter<u64>;

    async fn synchronize(&self, sync: &Synchronizer) -> Result<(), ControllerError>;
    /// Tears down everything on Aiven, returns a status message describing what was removed.
    async fn delete(&self, sync: &Synchronizer) -> Result<&'static str, ControllerError>;

    fn id(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}

#[async_trait]
impl SyncResource for Topic {
    const KIND: &'static str = "Topic";
    const SUCCESS_MESSAGE: &'static str = "Topic configuration synchronized to Kafka pool";

    fn pool(&self) -> &str {
        &self.spec.pool
    }

    fn sync_status(&self) -> Option<&SyncStatus> {
        self.status.as_ref()
    }

    fn sync_status_mut(&mut self) -> &mut SyncStatus {
        self.status.get_or_insert_with(Default::default)
    }

    fn spec_hash(&self) -> Result<String, ControllerError> {
        Ok(self.hash()?)
    }

    fn set_qualified_name(&mut self) {
        let name = self.full_name();
        self.sync_status_mut().fully_qualified_name = Some(name);
    }

    fn processed_counter(metrics: &Metrics) -> &Counter<u64> {
        &metrics.topics_processed
    }

    async fn synchronize(&self, sync: &Synchronizer) -> Result<(), ControllerError> {
        sync.synchronize_topic(self).await
    }

    async fn delete(&self, sync: &Synchronizer) -> Result<&'static str, ControllerError> {
        sync.delete_topic(self).await
    }
}

#[async_trait]
impl SyncResource for Stream {
    const KIND: &'static str = "Stream";
    const SUCCESS_MESSAGE: &'static str = "Stream configuration synchronized to Kafka pool";

    fn pool(&self) -> &str {
        &self.spec.pool
    }

    fn sync_status(&self) -> Option<&SyncStatus> {
        self.status.as_ref()
    }

    fn sync_status_mut(&mut self) -> &mut SyncStatus {
        self.status.get_or_insert_with(Default::default)
    }

    fn spec_hash(&self) -> Result<String, ControllerError> {
        Ok(self.hash()?)
    }

    fn set_qualified_name(&mut self) {
        let prefix = self.topic_prefix();
        self.sync_status_mut().fully_qualified_topic_prefix = Some(prefix);
    }

    fn processed_counter(metrics: &Metrics) -> &Counter<u64> {
        &metrics.streams_processed
    }

    async fn synchronize(&self, sync: &Synchronizer) -> Result<(), ControllerError> {
        sync.synchronize_stream(self).await
    }

    async fn delete(&self, sync: &Synchronizer) -> Result<&'static str, ControllerError> {
        sync.delete_stream(self).await
    }
}
