use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, header::AUTHORIZATION};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::{
    AivenError, CreateKafkaAclRequest, CreateKafkaTopicRequest, CreateSchemaRegistryAclRequest,
    KafkaAcl, KafkaAcls, KafkaListTopic, KafkaTopic, KafkaTopics, SchemaRegistryAcl,
    SchemaRegistryAcls, UpdateKafkaTopicRequest,
};

pub(crate) const DEFAULT_API_URL: &'static str = "https://api.aiven.io/v1";

#[derive(Deserialize, Default)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    more_info: String,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    more_info: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct AclResponse<T> {
    #[serde(default = "Vec::new")]
    acl: Vec<T>,
}

#[derive(Deserialize)]
struct TopicResponse {
    topic: KafkaTopic,
}

#[derive(Deserialize)]
struct TopicListResponse {
    #[serde(default)]
    topics: Vec<KafkaListTopic>,
}

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct ServiceSummary {
    pub service_name: String,
    #[serde(default)]
    pub service_type: String,
}

#[derive(Deserialize)]
struct ServiceListResponse {
    #[serde(default)]
    services: Vec<ServiceSummary>,
}

/// Turns a non-successful response into an [`AivenError`].
fn decode_error(status: StatusCode, body: &[u8]) -> AivenError {
    let response: ErrorResponse = serde_json::from_slice(body).unwrap_or_default();
    let first = response.errors.into_iter().next().unwrap_or_default();
    let message = [response.message, first.message]
        .into_iter()
        .find(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    let more_info = [response.more_info, first.more_info]
        .into_iter()
        .find(|m| !m.is_empty())
        .unwrap_or_default();
    AivenError {
        status: status.as_u16(),
        message,
        more_info,
    }
}

/// HTTP client for the Aiven REST API.
pub(crate) struct AivenClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl AivenClient {
    /// Every request is bounded by `timeout`, exceeding it is reported as a network error.
    pub(crate) fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, AivenError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kafkarator/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AivenError::network(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("aivenv1 {}", self.token))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(StatusCode, Vec<u8>), AivenError> {
        let response = request
            .send()
            .await
            .map_err(|e| AivenError::network(format!("request to Aiven failed: {}", e)))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AivenError::network(format!("reading response from Aiven: {}", e)))?;
        if !status.is_success() {
            return Err(decode_error(status, &body));
        }
        Ok((status, body.to_vec()))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AivenError> {
        let (status, body) = self.execute(request).await?;
        serde_json::from_slice(&body).map_err(|e| AivenError {
            status: status.as_u16(),
            message: format!("parse JSON response from Aiven: {}", e),
            more_info: String::new(),
        })
    }

    async fn send_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, AivenError> {
        self.send(self.request(method, path).json(body)).await
    }

    /// Sends a request whose response body is of no interest.
    async fn send_ignored(&self, request: RequestBuilder) -> Result<(), AivenError> {
        self.execute(request).await.map(|_| ())
    }

    pub(crate) async fn list_services(
        &self,
        project: &str,
    ) -> Result<Vec<ServiceSummary>, AivenError> {
        let path = format!("/project/{}/service", project);
        let response: ServiceListResponse = self.send(self.request(Method::GET, &path)).await?;
        Ok(response.services)
    }
}

fn kafka_acl_path(project: &str, service: &str) -> String {
    format!("/project/{}/service/{}/acl", project, service)
}

fn schema_registry_acl_path(project: &str, service: &str) -> String {
    format!(
        "/project/{}/service/{}/kafka/schema-registry/acl",
        project, service
    )
}

fn topic_path(project: &str, service: &str) -> String {
    format!("/project/{}/service/{}/topic", project, service)
}

/// Aiven answers an ACL creation with the full ACL list, the created entry is
/// the last one matching the request.
fn created<T, F>(acls: Vec<T>, matches: F) -> Result<T, AivenError>
where
    F: Fn(&T) -> bool,
{
    acls.into_iter().rev().find(|acl| matches(acl)).ok_or_else(|| {
        AivenError::new(
            200,
            "created ACL is missing from the response",
            "",
        )
    })
}

#[async_trait]
impl KafkaAcls for AivenClient {
    async fn list(&self, project: &str, service: &str) -> Result<Vec<KafkaAcl>, AivenError> {
        let response: AclResponse<KafkaAcl> = self
            .send(self.request(Method::GET, &kafka_acl_path(project, service)))
            .await?;
        Ok(response.acl)
    }

    async fn create(
        &self,
        project: &str,
        service: &str,
        req: CreateKafkaAclRequest,
    ) -> Result<KafkaAcl, AivenError> {
        let response: AclResponse<KafkaAcl> = self
            .send_json(Method::POST, &kafka_acl_path(project, service), &req)
            .await?;
        created(response.acl, |acl| {
            acl.permission == req.permission
                && acl.topic == req.topic
                && acl.username == req.username
        })
    }

    async fn delete(&self, project: &str, service: &str, acl_id: &str) -> Result<(), AivenError> {
        let path = format!("{}/{}", kafka_acl_path(project, service), acl_id);
        self.send_ignored(self.request(Method::DELETE, &path)).await
    }
}

#[async_trait]
impl SchemaRegistryAcls for AivenClient {
    async fn list(
        &self,
        project: &str,
        service: &str,
    ) -> Result<Vec<SchemaRegistryAcl>, AivenError> {
        let response: AclResponse<SchemaRegistryAcl> = self
            .send(self.request(Method::GET, &schema_registry_acl_path(project, service)))
            .await?;
        Ok(response.acl)
    }

    async fn create(
        &self,
        project: &str,
        service: &str,
        req: CreateSchemaRegistryAclRequest,
    ) -> Result<SchemaRegistryAcl, AivenError> {
        let response: AclResponse<SchemaRegistryAcl> = self
            .send_json(
                Method::POST,
                &schema_registry_acl_path(project, service),
                &req,
            )
            .await?;
        created(response.acl, |acl| {
            acl.permission == req.permission
                && acl.resource == req.resource
                && acl.username == req.username
        })
    }

    async fn delete(&self, project: &str, service: &str, acl_id: &str) -> Result<(), AivenError> {
        let path = format!("{}/{}", schema_registry_acl_path(project, service), acl_id);
        self.send_ignored(self.request(Method::DELETE, &path)).await
    }
}

#[async_trait]
impl KafkaTopics for AivenClient {
    async fn get(
        &self,
        project: &str,
        service: &str,
        topic: &str,
    ) -> Result<KafkaTopic, AivenError> {
        let path = format!("{}/{}", topic_path(project, service), topic);
        let response: TopicResponse = self.send(self.request(Method::GET, &path)).await?;
        Ok(response.topic)
    }

    async fn list(&self, project: &str, service: &str) -> Result<Vec<KafkaListTopic>, AivenError> {
        let response: TopicListResponse = self
            .send(self.request(Method::GET, &topic_path(project, service)))
            .await?;
        Ok(response.topics)
    }

    async fn create(
        &self,
        project: &str,
        service: &str,
        req: CreateKafkaTopicRequest,
    ) -> Result<(), AivenError> {
        let request = self
            .request(Method::POST, &topic_path(project, service))
            .json(&req);
        self.send_ignored(request).await
    }

    async fn update(
        &self,
        project: &str,
        service: &str,
        topic: &str,
        req: UpdateKafkaTopicRequest,
    ) -> Result<(), AivenError> {
        let path = format!("{}/{}", topic_path(project, service), topic);
        self.send_ignored(self.request(Method::PUT, &path).json(&req))
            .await
    }

    async fn delete(&self, project: &str, service: &str, topic: &str) -> Result<(), AivenError> {
        let path = format!("{}/{}", topic_path(project, service), topic);
        self.send_ignored(self.request(Method::DELETE, &path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_error_details() {
        let err = decode_error(
            StatusCode::FORBIDDEN,
            br#"{"errors":[{"message":"Not allowed","more_info":"https://api.aiven.io/doc/","status":403}],"message":"Not allowed"}"#,
        );
        assert_eq!(
            AivenError::new(403, "Not allowed", "https://api.aiven.io/doc/"),
            err
        );
    }

    #[test]
    fn falls_back_to_status_reason() {
        let err = decode_error(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert_eq!(AivenError::new(502, "Bad Gateway", ""), err);
        assert!(err.is_retryable());
    }

    #[test]
    fn picks_last_created_acl() {
        let acl = |id: &str, username: &str| KafkaAcl {
            id: id.to_string(),
            permission: "read".to_string(),
            topic: "team.topic".to_string(),
            username: username.to_string(),
        };
        let acls = vec![acl("1", "a"), acl("2", "b"), acl("3", "a")];
        let found = created(acls, |a| a.username == "a").unwrap();
        assert_eq!("3", found.id);
        assert_eq!(
            200,
            created(Vec::<KafkaAcl>::new(), |_| true).unwrap_err().status
        );
    }

    #[test]
    fn paths() {
        assert_eq!("/project/p/service/s/acl", kafka_acl_path("p", "s"));
        assert_eq!(
            "/project/p/service/s/kafka/schema-registry/acl",
            schema_registry_acl_path("p", "s")
        );
        assert_eq!("/project/p/service/s/topic", topic_path("p", "s"));
    }
}
