use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AivenError, NameResolver,
    client::{AivenClient, ServiceSummary},
};
use crate::metrics::observe_aiven_latency;

const KAFKA_SERVICE_TYPE: &'static str = "kafka";

#[async_trait]
pub(crate) trait Services: Send + Sync {
    async fn list(&self, project: &str) -> Result<Vec<ServiceSummary>, AivenError>;
}

#[async_trait]
impl Services for AivenClient {
    async fn list(&self, project: &str) -> Result<Vec<ServiceSummary>, AivenError> {
        self.list_services(project).await
    }
}

/// Looks up the Kafka service of a project once and remembers it.
pub(crate) struct CachedNameResolver {
    services: Arc<dyn Services>,
    cache: RwLock<HashMap<String, String>>,
}

impl CachedNameResolver {
    pub(crate) fn new(services: Arc<dyn Services>) -> Self {
        Self {
            services,
            cache: Default::default(),
        }
    }
}

#[async_trait]
impl NameResolver for CachedNameResolver {
    async fn resolve_kafka_service_name(&self, project: &str) -> Result<String, AivenError> {
        if let Some(name) = self.cache.read().await.get(project) {
            return Ok(name.clone());
        }
        let services =
            observe_aiven_latency("Service_List", project, self.services.list(project)).await?;
        let name = match services
            .into_iter()
            .find(|s| s.service_type == KAFKA_SERVICE_TYPE)
        {
            Some(service) => service.service_name,
            None => {
                let name = format!("{}-kafka", project);
                warn!(
                    "no kafka service found in project {}, falling back to {}",
                    project, name
                );
                name
            }
        };
        debug!("resolved kafka service of project {} to {}", project, name);
        self.cache
            .write()
            .await
            .insert(project.to_string(), name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeServices {
        services: Vec<ServiceSummary>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Services for FakeServices {
        async fn list(&self, project: &str) -> Result<Vec<ServiceSummary>, AivenError> {
            self.calls.lock().unwrap().push(project.to_string());
            Ok(self.services.clone())
        }
    }

    fn service(name: &str, tpe: &str) -> ServiceSummary {
        ServiceSummary {
            service_name: name.to_string(),
            service_type: tpe.to_string(),
        }
    }

    #[tokio::test]
    async fn resolves_and_caches_kafka_service() {
        let services = Arc::new(FakeServices {
            services: vec![service("pg", "pg"), service("my-kafka", "kafka")],
            calls: Default::default(),
        });
        let resolver = CachedNameResolver::new(services.clone());
        assert_eq!(
            "my-kafka",
            resolver.resolve_kafka_service_name("nav-dev").await.unwrap()
        );
        assert_eq!(
            "my-kafka",
            resolver.resolve_kafka_service_name("nav-dev").await.unwrap()
        );
        assert_eq!(1, services.calls.lock().unwrap().len());
    }

    #[tokio::test]
    async fn falls_back_to_project_name() {
        let services = Arc::new(FakeServices {
            services: vec![service("pg", "pg")],
            calls: Default::default(),
        });
        let resolver = CachedNameResolver::new(services);
        assert_eq!(
            "nav-prod-kafka",
            resolver.resolve_kafka_service_name("nav-prod").await.unwrap()
        );
    }
}
