//! In-memory Aiven used by the tests.
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use super::{
    AivenError, CreateKafkaAclRequest, CreateKafkaTopicRequest, CreateSchemaRegistryAclRequest,
    Interfaces, KafkaAcl, KafkaAcls, KafkaListTopic, KafkaTopic, KafkaTopics, NameResolver,
    Partition, SchemaRegistryAcl, SchemaRegistryAcls, UpdateKafkaTopicRequest,
};

#[derive(Default)]
struct State {
    next_id: u64,
    kafka_acls: Vec<KafkaAcl>,
    schema_registry_acls: Vec<SchemaRegistryAcl>,
    topics: BTreeMap<String, KafkaTopic>,
    calls: Vec<String>,
    creates: Vec<CreateKafkaTopicRequest>,
    updates: Vec<(String, UpdateKafkaTopicRequest)>,
    failure: Option<AivenError>,
}

/// Records every call, fails all of them once a failure is set.
#[derive(Default)]
pub(crate) struct FakeAiven {
    state: Mutex<State>,
}

impl FakeAiven {
    pub(crate) fn interfaces(self: &Arc<Self>) -> Interfaces {
        Interfaces {
            kafka_acls: self.clone(),
            schema_registry_acls: self.clone(),
            topics: self.clone(),
            name_resolver: self.clone(),
        }
    }

    fn call(&self, name: &str) -> Result<std::sync::MutexGuard<'_, State>, AivenError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(name.to_string());
        if let Some(e) = state.failure.clone() {
            return Err(e);
        }
        Ok(state)
    }

    fn next_id(state: &mut State) -> String {
        state.next_id += 1;
        format!("acl{}", state.next_id)
    }

    pub(crate) fn fail_with(&self, error: AivenError) {
        self.state.lock().unwrap().failure = Some(error);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn creates(&self) -> Vec<CreateKafkaTopicRequest> {
        self.state.lock().unwrap().creates.clone()
    }

    pub(crate) fn updates(&self) -> Vec<(String, UpdateKafkaTopicRequest)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub(crate) fn kafka_acls(&self) -> Vec<KafkaAcl> {
        self.state.lock().unwrap().kafka_acls.clone()
    }

    pub(crate) fn schema_registry_acls(&self) -> Vec<SchemaRegistryAcl> {
        self.state.lock().unwrap().schema_registry_acls.clone()
    }

    pub(crate) fn topic_names(&self) -> Vec<String> {
        self.state.lock().unwrap().topics.keys().cloned().collect()
    }

    pub(crate) fn insert_topic(&self, topic: KafkaTopic) {
        self.state
            .lock()
            .unwrap()
            .topics
            .insert(topic.topic_name.clone(), topic);
    }

    pub(crate) fn insert_kafka_acl(&self, permission: &str, topic: &str, username: &str) {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state);
        state.kafka_acls.push(KafkaAcl {
            id,
            permission: permission.to_string(),
            topic: topic.to_string(),
            username: username.to_string(),
        });
    }
}

#[async_trait]
impl KafkaAcls for FakeAiven {
    async fn list(&self, _project: &str, _service: &str) -> Result<Vec<KafkaAcl>, AivenError> {
        Ok(self.call("ACL_List")?.kafka_acls.clone())
    }

    async fn create(
        &self,
        _project: &str,
        _service: &str,
        req: CreateKafkaAclRequest,
    ) -> Result<KafkaAcl, AivenError> {
        let mut state = self.call("ACL_Create")?;
        let acl = KafkaAcl {
            id: Self::next_id(&mut state),
            permission: req.permission,
            topic: req.topic,
            username: req.username,
        };
        state.kafka_acls.push(acl.clone());
        Ok(acl)
    }

    async fn delete(&self, _project: &str, _service: &str, acl_id: &str) -> Result<(), AivenError> {
        let mut state = self.call("ACL_Delete")?;
        state.kafka_acls.retain(|a| a.id != acl_id);
        Ok(())
    }
}

#[async_trait]
impl SchemaRegistryAcls for FakeAiven {
    async fn list(
        &self,
        _project: &str,
        _service: &str,
    ) -> Result<Vec<SchemaRegistryAcl>, AivenError> {
        Ok(self.call("SCHEMA_ACL_List")?.schema_registry_acls.clone())
    }

    async fn create(
        &self,
        _project: &str,
        _service: &str,
        req: CreateSchemaRegistryAclRequest,
    ) -> Result<SchemaRegistryAcl, AivenError> {
        let mut state = self.call("SCHEMA_ACL_Create")?;
        let acl = SchemaRegistryAcl {
            id: Self::next_id(&mut state),
            permission: req.permission,
            resource: req.resource,
            username: req.username,
        };
        state.schema_registry_acls.push(acl.clone());
        Ok(acl)
    }

    async fn delete(&self, _project: &str, _service: &str, acl_id: &str) -> Result<(), AivenError> {
        let mut state = self.call("SCHEMA_ACL_Delete")?;
        state.schema_registry_acls.retain(|a| a.id != acl_id);
        Ok(())
    }
}

#[async_trait]
impl KafkaTopics for FakeAiven {
    async fn get(
        &self,
        _project: &str,
        _service: &str,
        topic: &str,
    ) -> Result<KafkaTopic, AivenError> {
        self.call("Topic_Get")?
            .topics
            .get(topic)
            .cloned()
            .ok_or_else(|| AivenError::new(404, "Topic not found", ""))
    }

    async fn list(&self, _project: &str, _service: &str) -> Result<Vec<KafkaListTopic>, AivenError> {
        Ok(self
            .call("Topic_List")?
            .topics
            .values()
            .map(|t| KafkaListTopic {
                topic_name: t.topic_name.clone(),
                partitions: t.partitions.len() as i32,
                replication: t.replication,
            })
            .collect())
    }

    async fn create(
        &self,
        _project: &str,
        _service: &str,
        req: CreateKafkaTopicRequest,
    ) -> Result<(), AivenError> {
        let mut state = self.call("Topic_Create")?;
        let topic = KafkaTopic {
            topic_name: req.topic_name.clone(),
            partitions: (0..req.partitions.unwrap_or(1))
                .map(|partition| Partition { partition })
                .collect(),
            replication: req.replication.unwrap_or(3),
            ..Default::default()
        };
        state.topics.insert(req.topic_name.clone(), topic);
        state.creates.push(req);
        Ok(())
    }

    async fn update(
        &self,
        _project: &str,
        _service: &str,
        topic: &str,
        req: UpdateKafkaTopicRequest,
    ) -> Result<(), AivenError> {
        let mut state = self.call("Topic_Update")?;
        if !state.topics.contains_key(topic) {
            return Err(AivenError::new(404, "Topic not found", ""));
        }
        state.updates.push((topic.to_string(), req));
        Ok(())
    }

    async fn delete(&self, _project: &str, _service: &str, topic: &str) -> Result<(), AivenError> {
        let mut state = self.call("Topic_Delete")?;
        match state.topics.remove(topic) {
            Some(_) => Ok(()),
            None => Err(AivenError::new(404, "Topic not found", "")),
        }
    }
}

#[async_trait]
impl NameResolver for FakeAiven {
    async fn resolve_kafka_service_name(&self, project: &str) -> Result<String, AivenError> {
        drop(self.call("Service_Resolve")?);
        Ok(format!("{}-kafka", project))
    }
}
