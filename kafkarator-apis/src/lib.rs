use std::collections::BTreeSet;

use k8s_openapi::chrono::{SecondsFormat, Utc};
use kube::{CustomResource, ResourceExt};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod hash;
mod naming;

pub use hash::{HashError, SpecHash, spec_hash};
pub use naming::{SERVICE_USER_NAME_MAX_LENGTH, service_user_name, short_name, wildcard_service_user_name};

pub const API_GROUP: &'static str = "kafka.nais.io";

/// The K8s finalizer name.
///
/// Note, changing the finalizer name is a breaking change and needs
/// additional code to remove the old finalizer (name) from all affected
/// K8s objects. So, think twice before you rename it, otherwise users might
/// be stuck with Topic and Stream objects which cannot be deleted.
pub const FINALIZER: &'static str = "kafkarator.kafka.nais.io";

/// Annotations put onto the generated secrets and the resources themselves.
pub mod annotations {
    pub const POOL: &'static str = "kafka.nais.io/pool";
    pub const APPLICATION: &'static str = "kafka.nais.io/application";
    /// Opt-in for deleting the topic and its data together with the resource.
    pub const REMOVE_DATA_WHEN_DELETED: &'static str = "kafka.nais.io/removeDataWhenDeleted";

    // Temporary while migrating to Aivenator
    pub const SERVICE_USER: &'static str = "kafka.aiven.nais.io/serviceUser";
    pub const AIVENATOR_POOL: &'static str = "kafka.aiven.nais.io/pool";
    pub const AIVENATOR_PROTECTED: &'static str = "aivenator.aiven.nais.io/protected";
}

/// Condition types set on [`SyncStatus::conditions`].
pub mod condition_types {
    pub const AIVEN_FAILURE: &'static str = "AivenFailure";
    pub const KAFKARATOR_FAILURE: &'static str = "KafkaratorFailure";
}

/// We maintain our own copy of Condition as the one from k8s_openapi does not implement JsonSchema.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Condition {
    /// lastTransitionTime is the last time the condition transitioned from one status to another. This should be when the underlying condition changed.  If that is not known, then using the time when the API field changed is acceptable.
    #[serde(rename = "lastTransitionTime", skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// message is a human readable message indicating details about the transition. This may be an empty string.
    pub message: String,

    /// observedGeneration represents the .metadata.generation that the condition was set based upon. For instance, if .metadata.generation is currently 12, but the .status.conditions\[x\].observedGeneration is 9, the condition is out of date with respect to the current state of the instance.
    #[serde(rename = "observedGeneration", skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// reason contains a programmatic identifier indicating the reason for the condition's last transition. Producers of specific condition types may define expected values and meanings for this field, and whether the values are considered a guaranteed API. The value should be a CamelCase string. This field may not be empty.
    pub reason: String,

    /// status of the condition, one of True, False, Unknown.
    pub status: String,

    /// type of condition in CamelCase or in foo.example.com/CamelCase.
    #[serde(rename = "type")]
    pub type_: String,
}

impl Condition {
    pub fn new(tpe: &str, status: Option<bool>, reason: &str, message: String) -> Self {
        Self {
            last_transition_time: None,
            message,
            reason: reason.to_string(),
            status: status
                .map(|v| if v { "True" } else { "False" })
                .unwrap_or("Unknown")
                .to_string(),
            type_: tpe.to_string(),
            observed_generation: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Kafka topic declared by a team, synchronized to the Aiven project named by `pool`.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kafka.nais.io",
    version = "v1",
    kind = "Topic",
    derive = "PartialEq",
    status = "SyncStatus",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    printcolumn = r#"{"name":"Team","type":"string","jsonPath":".metadata.labels.team"}"#,
    printcolumn = r#"{
        "name":"State",
        "type": "string",
        "jsonPath": ".status.synchronizationState",
        "description": "Result of the latest synchronization with the Kafka pool."
    }"#
)]
pub struct TopicSpec {
    /// The Aiven project (Kafka pool) hosting the topic.
    pub pool: String,
    /// Topic configuration, unset fields are left to the provider defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
    /// Applications granted access to the topic.
    #[serde(default)]
    pub acl: Vec<TopicAcl>,
}

/// Topic configuration.
///
/// Fields are declared in lexicographic order of their serialized names, the
/// synchronization hash relies on that.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Either `delete` or `compact`. Cannot be changed after the topic has been created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_bytes: Option<i64>,
    #[serde(alias = "minInSyncReplicas", skip_serializing_if = "Option::is_none")]
    pub minimum_in_sync_replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_bytes: Option<i64>,
    /// Negative values mean infinite retention.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_hours: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_hours: Option<i64>,
}

/// Access level granted by a [`TopicAcl`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum Access {
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "write")]
    Write,
    #[serde(rename = "readwrite")]
    ReadWrite,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::ReadWrite => "readwrite",
        }
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grants an application of a team access to a topic.
///
/// Fields are declared in lexicographic order of their serialized names.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, JsonSchema)]
pub struct TopicAcl {
    pub access: Access,
    pub application: String,
    pub team: String,
}

impl TopicAcl {
    pub fn new(access: Access, team: &str, application: &str) -> Self {
        Self {
            access,
            application: application.to_string(),
            team: team.to_string(),
        }
    }

    /// Name of the Aiven service user backing this ACL.
    pub fn service_user_name(&self) -> String {
        service_user_name(&self.team, &self.application)
    }

    /// Username pattern matching every credential generation of the service user.
    pub fn wildcard_service_user_name(&self) -> String {
        wildcard_service_user_name(&self.team, &self.application)
    }

    fn sort_key(&self) -> (&str, &str, &str) {
        (&self.team, &self.application, self.access.as_str())
    }
}

/// Sorted and deduplicated view of an ACL list, ordered by `(team, application, access)`.
pub fn canonical_acls(acls: &[TopicAcl]) -> Vec<&TopicAcl> {
    let mut sorted: Vec<&TopicAcl> = acls.iter().collect();
    sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    sorted.dedup();
    sorted
}

/// Unique service user names referenced by an ACL list.
pub fn service_user_names(acls: &[TopicAcl]) -> BTreeSet<String> {
    acls.iter().map(|acl| acl.service_user_name()).collect()
}

/// A set of topics sharing the prefix `{team}.{name}.`, owned by a single application.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kafka.nais.io",
    version = "v1",
    kind = "Stream",
    derive = "PartialEq",
    status = "SyncStatus",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.synchronizationState"}"#
)]
pub struct StreamSpec {
    /// The Aiven project (Kafka pool) hosting the stream topics.
    pub pool: String,
    /// Application granted `readwrite` on the stream topics, defaults to the stream name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Outcome of the latest synchronization.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum SynchronizationState {
    Prepared,
    FailedPrepare,
    FailedSynchronization,
    RolloutComplete,
}

impl SynchronizationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynchronizationState::Prepared => "Prepared",
            SynchronizationState::FailedPrepare => "FailedPrepare",
            SynchronizationState::FailedSynchronization => "FailedSynchronization",
            SynchronizationState::RolloutComplete => "RolloutComplete",
        }
    }
}

impl std::fmt::Display for SynchronizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status sub-resource shared by [`Topic`] and [`Stream`].
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synchronization_state: Option<SynchronizationState>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub synchronization_hash: String,
    /// RFC 3339 timestamp of the latest completed synchronization.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub synchronization_time: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// RFC 3339 timestamp of the latest non-retryable Aiven failure.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest_aiven_sync_failure: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fully_qualified_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fully_qualified_topic_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl SyncStatus {
    /// Whether the spec with the given hash still has to be synchronized.
    pub fn needs_synchronization(&self, hash: &str) -> bool {
        self.synchronization_state != Some(SynchronizationState::RolloutComplete)
            || self.synchronization_hash != hash
    }

    pub fn update_condition(&mut self, mut c: Condition) {
        if let Some(existing) = self.conditions.iter().find(|e| e.type_ == c.type_) {
            if existing.status == c.status
                && existing.reason == c.reason
                && existing.message == c.message
                && existing.observed_generation == c.observed_generation
            {
                return;
            }
            if existing.status == c.status {
                c.last_transition_time = existing.last_transition_time.clone();
            }
        }
        if c.last_transition_time.is_none() {
            c.last_transition_time = Some(now());
        }
        self.conditions.retain(|v| v.type_ != c.type_);
        self.conditions.push(c);
    }

    pub fn condition(&self, tpe: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == tpe)
    }
}

/// Current time in the RFC 3339 format used by all status timestamps.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Topic {
    /// Name of the topic on the Kafka broker: `{team}.{name}`.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace().unwrap_or_default(), self.name_any())
    }

    pub fn id(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or(""),
            self.metadata.name.as_deref().unwrap_or(""),
        )
    }

    pub fn hash(&self) -> Result<String, HashError> {
        spec_hash(&self.spec)
    }

    /// Whether the topic and its data are removed from Aiven when the resource is deleted.
    pub fn remove_data_when_deleted(&self) -> bool {
        self.annotations()
            .get(annotations::REMOVE_DATA_WHEN_DELETED)
            .map_or(false, |v| v.trim().eq_ignore_ascii_case("true"))
    }
}

impl Stream {
    /// Prefix shared by all topics of this stream: `{team}.{name}`.
    pub fn topic_prefix(&self) -> String {
        format!("{}.{}", self.namespace().unwrap_or_default(), self.name_any())
    }

    /// ACL pattern matching every topic of this stream: `{team}.{name}.*`.
    pub fn topic_wildcard(&self) -> String {
        format!("{}.*", self.topic_prefix())
    }

    /// Whether the broker topic belongs to this stream.
    pub fn owns_topic(&self, topic_name: &str) -> bool {
        topic_name
            .strip_prefix(self.topic_prefix().as_str())
            .map_or(false, |rest| rest.starts_with('.') && rest.len() > 1)
    }

    pub fn id(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or(""),
            self.metadata.name.as_deref().unwrap_or(""),
        )
    }

    pub fn hash(&self) -> Result<String, HashError> {
        spec_hash(&self.spec)
    }

    /// ACLs granted on the stream topics.
    pub fn acls(&self) -> Vec<TopicAcl> {
        let team = self.namespace().unwrap_or_default();
        let name = self.name_any();
        let application = self.spec.user.as_deref().unwrap_or(name.as_str());
        vec![TopicAcl::new(Access::ReadWrite, &team, application)]
    }
}
