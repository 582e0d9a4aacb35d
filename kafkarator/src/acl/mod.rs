//! Differential synchronization of ACLs for a topic pattern.
//!
//! The same [`Manager`] drives both the Kafka ACLs and the Schema Registry
//! ACLs, each surface is reached through its own [`AclAdapter`].
use async_trait::async_trait;
use kafkarator_apis::TopicAcl;

use crate::{aiven::AivenError, errors::ControllerError};

mod kafka;
mod schema_registry;

pub(crate) use kafka::KafkaAclAdapter;
pub(crate) use schema_registry::SchemaRegistryAclAdapter;

const SCHEMA_REGISTRY_PREFIX: &'static str = "schema_registry";

/// Provider agnostic ACL entry.
///
/// Equality ignores the id, Schema Registry permissions are equal to the
/// topic permission they are derived from.
#[derive(Clone, Debug, Default)]
pub(crate) struct Acl {
    pub id: String,
    pub permission: String,
    pub topic_pattern: String,
    pub username: String,
}

impl Acl {
    pub(crate) fn new(permission: &str, topic_pattern: &str, username: &str) -> Self {
        Self {
            id: String::new(),
            permission: permission.to_string(),
            topic_pattern: topic_pattern.to_string(),
            username: username.to_string(),
        }
    }

    pub(crate) fn from_topic_acl(topic_pattern: &str, acl: &TopicAcl) -> Self {
        Self::new(acl.access.as_str(), topic_pattern, &acl.service_user_name())
    }
}

impl PartialEq for Acl {
    fn eq(&self, other: &Self) -> bool {
        relaxed_permission_eq(&self.permission, &other.permission)
            && self.topic_pattern == other.topic_pattern
            && self.username == other.username
    }
}

impl std::fmt::Display for Acl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.id, self.permission, self.topic_pattern, self.username
        )
    }
}

/// Schema Registry permission granted for a topic permission.
pub(crate) fn schema_registry_permission(permission: &str) -> String {
    match permission {
        "read" => "schema_registry_read".to_string(),
        "write" | "readwrite" => "schema_registry_write".to_string(),
        other => other.to_string(),
    }
}

fn relaxed_permission_eq(p1: &str, p2: &str) -> bool {
    if p1 == p2 {
        true
    } else if p1.starts_with(SCHEMA_REGISTRY_PREFIX) {
        schema_registry_permission(p2) == p1
    } else if p2.starts_with(SCHEMA_REGISTRY_PREFIX) {
        schema_registry_permission(p1) == p2
    } else {
        false
    }
}

/// One ACL surface of the provider.
#[async_trait]
pub(crate) trait AclAdapter: Send + Sync {
    /// Name of the surface, used in logs.
    fn kind(&self) -> &'static str;
    async fn list(&self) -> Result<Vec<Acl>, AivenError>;
    async fn create(&self, acl: &Acl) -> Result<Acl, AivenError>;
    async fn delete(&self, acl_id: &str) -> Result<(), AivenError>;
}

/// Resource whose ACLs are synchronized.
pub(crate) trait Source: Send + Sync {
    /// Topic name or pattern the ACLs apply to.
    fn topic_pattern(&self) -> String;
    fn pool(&self) -> &str;
    /// Desired ACLs, empty once the resource is being deleted.
    fn acls(&self) -> Vec<TopicAcl>;
}

pub(crate) struct Manager<'a> {
    pub adapter: &'a dyn AclAdapter,
    pub source: &'a dyn Source,
    pub dry_run: bool,
}

impl<'a> Manager<'a> {
    /// Creates missing ACLs and deletes ACLs no longer wanted, in that order.
    pub(crate) async fn synchronize(&self) -> Result<(), ControllerError> {
        let existing = self.existing_acls().await?;
        let wanted = self.wanted_acls();

        let to_add = new_acls(&existing, &wanted);
        let to_delete = delete_acls(&existing, &wanted);

        self.add(to_add).await?;
        self.delete(to_delete).await?;
        Ok(())
    }

    async fn existing_acls(&self) -> Result<Vec<Acl>, ControllerError> {
        let acls = self.adapter.list().await?;
        Ok(filter_acls(acls, &self.source.topic_pattern()))
    }

    fn wanted_acls(&self) -> Vec<Acl> {
        let topic_pattern = self.source.topic_pattern();
        let mut wanted: Vec<Acl> = Vec::new();
        for acl in self.source.acls() {
            let acl = Acl::from_topic_acl(&topic_pattern, &acl);
            if !wanted.contains(&acl) {
                wanted.push(acl);
            }
        }
        wanted
    }

    async fn add(&self, to_add: Vec<Acl>) -> Result<(), ControllerError> {
        for acl in to_add {
            if self.dry_run {
                info!("DRY RUN: would create {} ACL entry {}", self.adapter.kind(), acl);
                continue;
            }
            self.adapter.create(&acl).await?;
            info!(
                "created {} ACL entry: username={} permission={} topic={}",
                self.adapter.kind(),
                acl.username,
                acl.permission,
                acl.topic_pattern
            );
        }
        Ok(())
    }

    async fn delete(&self, to_delete: Vec<Acl>) -> Result<(), ControllerError> {
        for acl in to_delete {
            if acl.id.is_empty() {
                return Err(ControllerError::Internal(format!(
                    "attempting to delete {} ACL without id: {}",
                    self.adapter.kind(),
                    acl
                )));
            }
            if self.dry_run {
                info!("DRY RUN: would delete {} ACL entry {}", self.adapter.kind(), acl);
                continue;
            }
            self.adapter.delete(&acl.id).await?;
            info!(
                "deleted {} ACL entry: id={} username={} permission={} topic={}",
                self.adapter.kind(),
                acl.id,
                acl.username,
                acl.permission,
                acl.topic_pattern
            );
        }
        Ok(())
    }
}

/// Wanted ACLs which do not exist yet.
pub(crate) fn new_acls(existing: &[Acl], wanted: &[Acl]) -> Vec<Acl> {
    wanted
        .iter()
        .filter(|acl| !existing.contains(acl))
        .cloned()
        .collect()
}

/// Existing ACLs which are not wanted, or which duplicate an earlier existing entry.
pub(crate) fn delete_acls(existing: &[Acl], wanted: &[Acl]) -> Vec<Acl> {
    let mut seen: Vec<&Acl> = Vec::new();
    let mut candidates = Vec::new();
    for acl in existing {
        if !wanted.contains(acl) || seen.contains(&acl) {
            candidates.push(acl.clone());
        } else {
            seen.push(acl);
        }
    }
    candidates
}

fn filter_acls(acls: Vec<Acl>, topic_pattern: &str) -> Vec<Acl> {
    acls.into_iter()
        .filter(|acl| acl.topic_pattern == topic_pattern)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kafkarator_apis::Access;
    use std::sync::Mutex;

    fn acl(id: &str, permission: &str, topic: &str, username: &str) -> Acl {
        Acl {
            id: id.to_string(),
            ..Acl::new(permission, topic, username)
        }
    }

    struct FakeSource {
        topic: String,
        acls: Vec<TopicAcl>,
    }

    impl Source for FakeSource {
        fn topic_pattern(&self) -> String {
            self.topic.clone()
        }

        fn pool(&self) -> &str {
            "pool"
        }

        fn acls(&self) -> Vec<TopicAcl> {
            self.acls.clone()
        }
    }

    #[derive(Default)]
    struct FakeAdapter {
        existing: Vec<Acl>,
        created: Mutex<Vec<Acl>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AclAdapter for FakeAdapter {
        fn kind(&self) -> &'static str {
            "fake"
        }

        async fn list(&self) -> Result<Vec<Acl>, AivenError> {
            Ok(self.existing.clone())
        }

        async fn create(&self, acl: &Acl) -> Result<Acl, AivenError> {
            self.created.lock().unwrap().push(acl.clone());
            Ok(acl.clone())
        }

        async fn delete(&self, acl_id: &str) -> Result<(), AivenError> {
            self.deleted.lock().unwrap().push(acl_id.to_string());
            Ok(())
        }
    }

    fn existing_acls() -> Vec<Acl> {
        vec![
            acl("1", "read", "topic", "user__app-fe8425fc"),
            acl("2", "write", "topic", "user__app-fe8425fc"),
            acl("3", "read", "topic", "user2__app-8f88fef2"),
            acl("4", "write", "topic", "user2__app-8f88fef2"),
            acl("5", "read", "not_our_topic", "user__app-fe8425fc"),
        ]
    }

    fn wanted_topic_acls() -> Vec<TopicAcl> {
        vec![
            TopicAcl::new(Access::Read, "user", "app"),
            TopicAcl::new(Access::Write, "user2", "app"),
            TopicAcl::new(Access::ReadWrite, "user3", "app"),
        ]
    }

    #[test]
    fn computes_acl_diff() {
        let existing = filter_acls(existing_acls(), "topic");
        let wanted: Vec<Acl> = wanted_topic_acls()
            .iter()
            .map(|a| Acl::from_topic_acl("topic", a))
            .collect();

        let to_add = new_acls(&existing, &wanted);
        assert_eq!(
            vec![Acl::new("readwrite", "topic", &kafkarator_apis::service_user_name("user3", "app"))],
            to_add
        );

        let to_delete = delete_acls(&existing, &wanted);
        assert_eq!(2, to_delete.len());
        assert_eq!("2", to_delete[0].id);
        assert_eq!(acl("", "write", "topic", "user__app-fe8425fc"), to_delete[0]);
        assert_eq!("3", to_delete[1].id);
        assert_eq!(acl("", "read", "topic", "user2__app-8f88fef2"), to_delete[1]);
    }

    #[test]
    fn equality_ignores_id_and_relaxes_schema_registry_permissions() {
        assert_eq!(acl("1", "read", "t", "u"), acl("2", "read", "t", "u"));
        assert_eq!(acl("", "schema_registry_read", "t", "u"), acl("", "read", "t", "u"));
        assert_eq!(acl("", "readwrite", "t", "u"), acl("", "schema_registry_write", "t", "u"));
        assert_ne!(acl("", "read", "t", "u"), acl("", "schema_registry_write", "t", "u"));
        assert_ne!(acl("", "read", "t", "u"), acl("", "write", "t", "u"));
        assert_ne!(acl("", "read", "t", "u"), acl("", "read", "t2", "u"));
    }

    #[test]
    fn duplicated_existing_acls_are_deleted() {
        let existing = vec![acl("1", "read", "t", "u"), acl("2", "read", "t", "u")];
        let wanted = vec![Acl::new("read", "t", "u")];
        assert!(new_acls(&existing, &wanted).is_empty());
        let to_delete = delete_acls(&existing, &wanted);
        assert_eq!(1, to_delete.len());
        assert_eq!("2", to_delete[0].id);
    }

    #[tokio::test]
    async fn synchronize_creates_and_deletes() {
        let adapter = FakeAdapter {
            existing: existing_acls(),
            ..Default::default()
        };
        let source = FakeSource {
            topic: "topic".to_string(),
            acls: wanted_topic_acls(),
        };
        let manager = Manager {
            adapter: &adapter,
            source: &source,
            dry_run: false,
        };
        manager.synchronize().await.unwrap();
        let created = adapter.created.lock().unwrap();
        assert_eq!(1, created.len());
        assert_eq!("readwrite", created[0].permission);
        assert_eq!(vec!["2", "3"], *adapter.deleted.lock().unwrap());
    }

    #[tokio::test]
    async fn synchronize_is_idempotent() {
        let source = FakeSource {
            topic: "topic".to_string(),
            acls: wanted_topic_acls(),
        };
        let existing: Vec<Acl> = source
            .acls()
            .iter()
            .enumerate()
            .map(|(i, a)| Acl {
                id: i.to_string(),
                ..Acl::from_topic_acl("topic", a)
            })
            .collect();
        let adapter = FakeAdapter {
            existing,
            ..Default::default()
        };
        let manager = Manager {
            adapter: &adapter,
            source: &source,
            dry_run: false,
        };
        manager.synchronize().await.unwrap();
        assert!(adapter.created.lock().unwrap().is_empty());
        assert!(adapter.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_source_deletes_everything_on_the_pattern() {
        let adapter = FakeAdapter {
            existing: existing_acls(),
            ..Default::default()
        };
        let source = FakeSource {
            topic: "topic".to_string(),
            acls: vec![],
        };
        let manager = Manager {
            adapter: &adapter,
            source: &source,
            dry_run: false,
        };
        manager.synchronize().await.unwrap();
        assert_eq!(vec!["1", "2", "3", "4"], *adapter.deleted.lock().unwrap());
    }

    #[tokio::test]
    async fn deleting_without_id_fails() {
        let adapter = FakeAdapter {
            existing: vec![acl("", "read", "topic", "someone")],
            ..Default::default()
        };
        let source = FakeSource {
            topic: "topic".to_string(),
            acls: vec![],
        };
        let manager = Manager {
            adapter: &adapter,
            source: &source,
            dry_run: false,
        };
        let err = manager.synchronize().await.unwrap_err();
        assert!(matches!(err, ControllerError::Internal(_)));
        assert!(adapter.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_does_not_write() {
        let adapter = FakeAdapter {
            existing: existing_acls(),
            ..Default::default()
        };
        let source = FakeSource {
            topic: "topic".to_string(),
            acls: wanted_topic_acls(),
        };
        let manager = Manager {
            adapter: &adapter,
            source: &source,
            dry_run: true,
        };
        manager.synchronize().await.unwrap();
        assert!(adapter.created.lock().unwrap().is_empty());
        assert!(adapter.deleted.lock().unwrap().is_empty());
    }
}
