use std::sync::Arc;

use async_trait::async_trait;

use super::{Acl, AclAdapter};
use crate::{
    aiven::{AivenError, CreateKafkaAclRequest, KafkaAcl, KafkaAcls},
    metrics::observe_aiven_latency,
};

/// Kafka broker ACLs of a single Aiven service.
pub(crate) struct KafkaAclAdapter {
    pub client: Arc<dyn KafkaAcls>,
    pub project: String,
    pub service: String,
}

impl From<KafkaAcl> for Acl {
    fn from(acl: KafkaAcl) -> Self {
        Acl {
            id: acl.id,
            permission: acl.permission,
            topic_pattern: acl.topic,
            username: acl.username,
        }
    }
}

#[async_trait]
impl AclAdapter for KafkaAclAdapter {
    fn kind(&self) -> &'static str {
        "kafka"
    }

    async fn list(&self) -> Result<Vec<Acl>, AivenError> {
        let acls = observe_aiven_latency(
            "ACL_List",
            &self.project,
            self.client.list(&self.project, &self.service),
        )
        .await?;
        Ok(acls.into_iter().map(Acl::from).collect())
    }

    async fn create(&self, acl: &Acl) -> Result<Acl, AivenError> {
        let req = CreateKafkaAclRequest {
            permission: acl.permission.clone(),
            topic: acl.topic_pattern.clone(),
            username: acl.username.clone(),
        };
        let created = observe_aiven_latency(
            "ACL_Create",
            &self.project,
            self.client.create(&self.project, &self.service, req),
        )
        .await?;
        Ok(created.into())
    }

    async fn delete(&self, acl_id: &str) -> Result<(), AivenError> {
        observe_aiven_latency(
            "ACL_Delete",
            &self.project,
            self.client.delete(&self.project, &self.service, acl_id),
        )
        .await
    }
}
