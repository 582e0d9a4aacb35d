//! Narrow capability traits over the Aiven API.
//!
//! The synchronizers only depend on these traits, [`client::AivenClient`] is
//! the production implementation.
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub(crate) mod client;
pub(crate) mod resolver;

#[cfg(test)]
pub(crate) mod fake;

const UNKNOWN_ERROR: &'static str = "unknown error while calling Aiven API";

/// Error returned by the Aiven API.
///
/// Transport failures and timeouts carry status `0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AivenError {
    pub status: u16,
    pub message: String,
    pub more_info: String,
}

impl AivenError {
    pub(crate) fn new(status: u16, message: &str, more_info: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
            more_info: more_info.to_string(),
        }
    }

    pub(crate) fn network(message: String) -> Self {
        Self {
            status: 0,
            message,
            more_info: String::new(),
        }
    }

    pub(crate) fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Network failures, throttling and server side errors.
    pub(crate) fn is_retryable(&self) -> bool {
        self.status == 0 || self.status == 429 || self.status >= 500
    }

    /// Message safe to show to users.
    ///
    /// An error with a 200 status means the response body could not be
    /// understood, which may contain credentials.
    pub(crate) fn user_message(&self) -> String {
        if self.status == 200 {
            UNKNOWN_ERROR.to_string()
        } else if self.more_info.is_empty() {
            self.message.clone()
        } else {
            format!("{}: {}", self.message, self.more_info)
        }
    }
}

impl std::fmt::Display for AivenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (status {})", self.user_message(), self.status)
    }
}

impl std::error::Error for AivenError {}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct KafkaAcl {
    #[serde(default)]
    pub id: String,
    pub permission: String,
    pub topic: String,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct CreateKafkaAclRequest {
    pub permission: String,
    pub topic: String,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct SchemaRegistryAcl {
    #[serde(default)]
    pub id: String,
    pub permission: String,
    pub resource: String,
    pub username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct CreateSchemaRegistryAclRequest {
    pub permission: String,
    pub resource: String,
    pub username: String,
}

/// A topic config entry as reported by Aiven, `{"value": ...}`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub(crate) struct ConfigValue<T> {
    pub value: T,
}

impl<T> From<T> for ConfigValue<T> {
    fn from(value: T) -> Self {
        Self { value }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub(crate) struct KafkaTopicConfigResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_policy: Option<ConfigValue<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_bytes: Option<ConfigValue<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_insync_replicas: Option<ConfigValue<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_bytes: Option<ConfigValue<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_ms: Option<ConfigValue<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_ms: Option<ConfigValue<i64>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub(crate) struct Partition {
    #[serde(default)]
    pub partition: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct KafkaTopicTag {
    pub key: String,
    pub value: String,
}

/// Detailed view of a single topic.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub(crate) struct KafkaTopic {
    pub topic_name: String,
    #[serde(default)]
    pub partitions: Vec<Partition>,
    #[serde(default)]
    pub replication: i32,
    #[serde(default)]
    pub config: KafkaTopicConfigResponse,
    #[serde(default)]
    pub tags: Vec<KafkaTopicTag>,
}

/// Entry of the topic listing.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub(crate) struct KafkaListTopic {
    pub topic_name: String,
    #[serde(default)]
    pub partitions: i32,
    #[serde(default)]
    pub replication: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct KafkaTopicConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_insync_replicas: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_ms: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct CreateKafkaTopicRequest {
    pub topic_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication: Option<i32>,
    pub config: KafkaTopicConfig,
    pub tags: Vec<KafkaTopicTag>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct UpdateKafkaTopicRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication: Option<i32>,
    pub config: KafkaTopicConfig,
    pub tags: Vec<KafkaTopicTag>,
}

#[async_trait]
pub(crate) trait KafkaAcls: Send + Sync {
    async fn list(&self, project: &str, service: &str) -> Result<Vec<KafkaAcl>, AivenError>;
    async fn create(
        &self,
        project: &str,
        service: &str,
        req: CreateKafkaAclRequest,
    ) -> Result<KafkaAcl, AivenError>;
    async fn delete(&self, project: &str, service: &str, acl_id: &str) -> Result<(), AivenError>;
}

#[async_trait]
pub(crate) trait SchemaRegistryAcls: Send + Sync {
    async fn list(&self, project: &str, service: &str)
    -> Result<Vec<SchemaRegistryAcl>, AivenError>;
    async fn create(
        &self,
        project: &str,
        service: &str,
        req: CreateSchemaRegistryAclRequest,
    ) -> Result<SchemaRegistryAcl, AivenError>;
    async fn delete(&self, project: &str, service: &str, acl_id: &str) -> Result<(), AivenError>;
}

#[async_trait]
pub(crate) trait KafkaTopics: Send + Sync {
    async fn get(&self, project: &str, service: &str, topic: &str)
    -> Result<KafkaTopic, AivenError>;
    async fn list(&self, project: &str, service: &str) -> Result<Vec<KafkaListTopic>, AivenError>;
    async fn create(
        &self,
        project: &str,
        service: &str,
        req: CreateKafkaTopicRequest,
    ) -> Result<(), AivenError>;
    async fn update(
        &self,
        project: &str,
        service: &str,
        topic: &str,
        req: UpdateKafkaTopicRequest,
    ) -> Result<(), AivenError>;
    async fn delete(&self, project: &str, service: &str, topic: &str) -> Result<(), AivenError>;
}

/// Resolves the name of the Kafka service within an Aiven project (pool).
#[async_trait]
pub(crate) trait NameResolver: Send + Sync {
    async fn resolve_kafka_service_name(&self, project: &str) -> Result<String, AivenError>;
}

/// All Aiven capabilities the controllers depend on.
#[derive(Clone)]
pub(crate) struct Interfaces {
    pub kafka_acls: Arc<dyn KafkaAcls>,
    pub schema_registry_acls: Arc<dyn SchemaRegistryAcls>,
    pub topics: Arc<dyn KafkaTopics>,
    pub name_resolver: Arc<dyn NameResolver>,
}

impl Interfaces {
    pub(crate) fn from_client(client: Arc<client::AivenClient>) -> Self {
        Self {
            kafka_acls: client.clone(),
            schema_registry_acls: client.clone(),
            topics: client.clone(),
            name_resolver: Arc::new(resolver::CachedNameResolver::new(client)),
        }
    }
}
