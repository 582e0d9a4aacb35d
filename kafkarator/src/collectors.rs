//! Periodic reports of topics and ACLs, exported as gauges.
use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};

use async_trait::async_trait;
use kafkarator_apis::Topic;
use kube::{Api, Client, ResourceExt, api::ListParams};
use opentelemetry::KeyValue;
use tokio::time::{Duration, interval, sleep};

use crate::{aiven::Interfaces, errors::ControllerError, metrics::metrics, topic::list_topics};

const SOURCE_CLUSTER: &'static str = "cluster";
const SOURCE_AIVEN: &'static str = "aiven";

#[async_trait]
pub(crate) trait Collector: Send + Sync {
    fn description(&self) -> &'static str;
    async fn report(&self) -> Result<(), ControllerError>;
}

/// Reports once after a short delay, then every `report_interval`. Failures are logged only.
pub(crate) async fn run(collector: &dyn Collector, report_interval: Duration) {
    sleep(Duration::from_secs(5)).await;
    let mut ticker = interval(report_interval);
    loop {
        ticker.tick().await;
        let start = Instant::now();
        match collector.report().await {
            Ok(()) => info!(
                "updated {} in {:?}",
                collector.description(),
                start.elapsed()
            ),
            Err(e) => error!("unable to report {}: {}", collector.description(), e),
        }
    }
}

async fn cluster_topics(client: &Client) -> Result<Vec<Topic>, ControllerError> {
    let topics = Api::<Topic>::all(client.clone())
        .list(&ListParams::default())
        .await?;
    Ok(topics.items)
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TopicKey {
    source: &'static str,
    team: String,
    pool: String,
}

/// Team owning a topic on Aiven: the namespace of the matching cluster topic,
/// otherwise guessed from the name prefix.
fn topic_team(topic_name: &str, owners: &HashMap<String, String>) -> String {
    if let Some(team) = owners.get(topic_name) {
        return team.clone();
    }
    match topic_name.split_once('.') {
        Some((team, _)) => team.to_string(),
        None => String::new(),
    }
}

fn count_topics(
    cluster: &[Topic],
    aiven: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<TopicKey, u64> {
    let mut counts = BTreeMap::new();
    let mut owners = HashMap::new();
    for topic in cluster {
        let team = topic.namespace().unwrap_or_default();
        owners.insert(topic.full_name(), team.clone());
        *counts
            .entry(TopicKey {
                source: SOURCE_CLUSTER,
                team,
                pool: topic.spec.pool.clone(),
            })
            .or_insert(0) += 1;
    }
    for (pool, names) in aiven {
        for name in names {
            *counts
                .entry(TopicKey {
                    source: SOURCE_AIVEN,
                    team: topic_team(name, &owners),
                    pool: pool.clone(),
                })
                .or_insert(0) += 1;
        }
    }
    counts
}

/// Topic names on Aiven, by pool.
async fn aiven_topics(
    aiven: &Interfaces,
    projects: &[String],
) -> Result<BTreeMap<String, Vec<String>>, ControllerError> {
    let mut existing = BTreeMap::new();
    for pool in projects {
        let service = aiven.name_resolver.resolve_kafka_service_name(pool).await?;
        let topics = list_topics(aiven.topics.as_ref(), pool, &service).await?;
        existing.insert(
            pool.clone(),
            topics.into_iter().map(|t| t.topic_name).collect(),
        );
    }
    Ok(existing)
}

pub(crate) struct TopicCollector {
    pub client: Client,
    pub aiven: Interfaces,
    pub projects: Vec<String>,
}

#[async_trait]
impl Collector for TopicCollector {
    fn description(&self) -> &'static str {
        "topic metrics"
    }

    async fn report(&self) -> Result<(), ControllerError> {
        let cluster = cluster_topics(&self.client).await?;
        let aiven = aiven_topics(&self.aiven, &self.projects).await?;
        for (key, count) in count_topics(&cluster, &aiven) {
            metrics().topics.record(
                count,
                &[
                    KeyValue::new("source", key.source),
                    KeyValue::new("team", key.team),
                    KeyValue::new("pool", key.pool),
                ],
            );
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct AclKey {
    topic: String,
    team: String,
    app: String,
    pool: String,
}

fn count_acls(cluster: &[Topic]) -> BTreeMap<AclKey, u64> {
    let mut counts = BTreeMap::new();
    for topic in cluster {
        for acl in &topic.spec.acl {
            *counts
                .entry(AclKey {
                    topic: topic.name_any(),
                    team: acl.team.clone(),
                    app: acl.application.clone(),
                    pool: topic.spec.pool.clone(),
                })
                .or_insert(0) += 1;
        }
    }
    counts
}

pub(crate) struct AclCollector {
    pub client: Client,
}

#[async_trait]
impl Collector for AclCollector {
    fn description(&self) -> &'static str {
        "acl metrics"
    }

    async fn report(&self) -> Result<(), ControllerError> {
        let cluster = cluster_topics(&self.client).await?;
        for (key, count) in count_acls(&cluster) {
            metrics().acls.record(
                count,
                &[
                    KeyValue::new("topic", key.topic),
                    KeyValue::new("team", key.team),
                    KeyValue::new("app", key.app),
                    KeyValue::new("pool", key.pool),
                ],
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aiven::{KafkaTopic, fake::FakeAiven};
    use kafkarator_apis::{Access, TopicAcl, TopicSpec};
    use kube::api::ObjectMeta;
    use std::sync::Arc;

    fn topic(namespace: &str, name: &str, pool: &str, acl: Vec<TopicAcl>) -> Topic {
        Topic {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: TopicSpec {
                pool: pool.to_string(),
                config: None,
                acl,
            },
            status: None,
        }
    }

    #[test]
    fn aiven_topic_teams() {
        let mut owners = HashMap::new();
        owners.insert("owner.topic".to_string(), "realteam".to_string());
        assert_eq!("realteam", topic_team("owner.topic", &owners));
        assert_eq!("guessed", topic_team("guessed.some.topic", &owners));
        assert_eq!("", topic_team("__consumer_offsets", &owners));
    }

    #[test]
    fn topics_by_source_team_and_pool() {
        let cluster = vec![
            topic("team1", "a", "pool1", vec![]),
            topic("team1", "b", "pool1", vec![]),
            topic("team2", "c", "pool2", vec![]),
        ];
        let mut aiven = BTreeMap::new();
        aiven.insert(
            "pool1".to_string(),
            vec!["team1.a".to_string(), "other.x".to_string()],
        );
        let counts = count_topics(&cluster, &aiven);

        let key = |source, team: &str, pool: &str| TopicKey {
            source,
            team: team.to_string(),
            pool: pool.to_string(),
        };
        assert_eq!(Some(&2), counts.get(&key(SOURCE_CLUSTER, "team1", "pool1")));
        assert_eq!(Some(&1), counts.get(&key(SOURCE_CLUSTER, "team2", "pool2")));
        assert_eq!(Some(&1), counts.get(&key(SOURCE_AIVEN, "team1", "pool1")));
        assert_eq!(Some(&1), counts.get(&key(SOURCE_AIVEN, "other", "pool1")));
        assert_eq!(4, counts.len());
    }

    #[test]
    fn acls_by_topic_team_and_app() {
        let cluster = vec![topic(
            "team1",
            "a",
            "pool1",
            vec![
                TopicAcl::new(Access::Read, "team2", "consumer"),
                TopicAcl::new(Access::Write, "team2", "consumer"),
                TopicAcl::new(Access::Write, "team1", "producer"),
            ],
        )];
        let counts = count_acls(&cluster);
        let key = AclKey {
            topic: "a".to_string(),
            team: "team2".to_string(),
            app: "consumer".to_string(),
            pool: "pool1".to_string(),
        };
        assert_eq!(Some(&2), counts.get(&key));
        assert_eq!(2, counts.len());
    }

    #[tokio::test]
    async fn lists_topics_of_every_pool() {
        let aiven = Arc::new(FakeAiven::default());
        aiven.insert_topic(KafkaTopic {
            topic_name: "team1.a".to_string(),
            ..Default::default()
        });
        let projects = vec!["pool1".to_string()];
        let topics = aiven_topics(&aiven.interfaces(), &projects).await.unwrap();
        assert_eq!(Some(&vec!["team1.a".to_string()]), topics.get("pool1"));
        assert_eq!(vec!["Service_Resolve", "Topic_List"], aiven.calls());
    }
}
