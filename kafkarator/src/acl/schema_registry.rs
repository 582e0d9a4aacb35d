use std::sync::Arc;

use async_trait::async_trait;

use super::{Acl, AclAdapter, schema_registry_permission};
use crate::{
    aiven::{AivenError, CreateSchemaRegistryAclRequest, SchemaRegistryAcl, SchemaRegistryAcls},
    metrics::observe_aiven_latency,
};

const SUBJECT_PREFIX: &'static str = "Subject:";

/// Schema Registry ACLs of a single Aiven service.
///
/// Subjects are named after the topic, so the topic pattern is used as
/// subject pattern.
pub(crate) struct SchemaRegistryAclAdapter {
    pub client: Arc<dyn SchemaRegistryAcls>,
    pub project: String,
    pub service: String,
}

impl From<SchemaRegistryAcl> for Acl {
    fn from(acl: SchemaRegistryAcl) -> Self {
        let topic_pattern = acl
            .resource
            .strip_prefix(SUBJECT_PREFIX)
            .unwrap_or(acl.resource.as_str())
            .to_string();
        Acl {
            id: acl.id,
            permission: acl.permission,
            topic_pattern,
            username: acl.username,
        }
    }
}

#[async_trait]
impl AclAdapter for SchemaRegistryAclAdapter {
    fn kind(&self) -> &'static str {
        "schema registry"
    }

    async fn list(&self) -> Result<Vec<Acl>, AivenError> {
        let acls = observe_aiven_latency(
            "SCHEMA_ACL_List",
            &self.project,
            self.client.list(&self.project, &self.service),
        )
        .await?;
        Ok(acls.into_iter().map(Acl::from).collect())
    }

    async fn create(&self, acl: &Acl) -> Result<Acl, AivenError> {
        let req = CreateSchemaRegistryAclRequest {
            permission: schema_registry_permission(&acl.permission),
            resource: format!("{}{}", SUBJECT_PREFIX, acl.topic_pattern),
            username: acl.username.clone(),
        };
        let created = observe_aiven_latency(
            "SCHEMA_ACL_Create",
            &self.project,
            self.client.create(&self.project, &self.service, req),
        )
        .await?;
        Ok(created.into())
    }

    async fn delete(&self, acl_id: &str) -> Result<(), AivenError> {
        observe_aiven_latency(
            "SCHEMA_ACL_Delete",
            &self.project,
            self.client.delete(&self.project, &self.service, acl_id),
        )
        .await
    }
}
