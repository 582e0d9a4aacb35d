#[macro_use]
extern crate log;

use clap::Parser;
use kafkarator_apis::{Stream, Topic};
use kube::Client;
use opentelemetry::global;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};

use aiven::{Interfaces, client::AivenClient};
use collectors::{AclCollector, TopicCollector};
use config::Config;
use prometheus_exporter::start_prometheus_metrics_server;
use resource_controller::{Processor, ResourceController};

mod acl;
mod aiven;
mod collectors;
mod config;
mod errors;
mod logging;
mod metrics;
mod prometheus_exporter;
mod resource_controller;
mod resource_modifications;
mod synchronizer;
mod topic;
mod utils;

/// The K8s field manager name, also reported as the source of events.
const MANAGER: &'static str = "kafkarator";

async fn shutdown_signal() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = terminate.recv() => info!("received SIGTERM"),
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("received ctrl-c");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    logging::init(config.log_format);
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("a rustls crypto provider is already installed");
    }
    info!("starting kafkarator with {}", config);

    let registry = Registry::new();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;
    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();
    global::set_meter_provider(meter_provider.clone());
    let metrics_server = start_prometheus_metrics_server(config.metrics_address, registry);

    let client = Client::try_default().await?;
    let aiven = Interfaces::from_client(Arc::new(AivenClient::new(
        &config.aiven_api_url,
        &config.aiven_token()?,
        config.requeue_interval,
    )?));
    let processor = Processor {
        aiven: aiven.clone(),
        projects: config.projects.clone(),
        dry_run: config.dry_run,
    };
    if config.dry_run {
        warn!("dry run, no changes will be written to Aiven");
    }
    let controller = Arc::new(ResourceController::new(
        client.clone(),
        processor,
        config.requeue_interval,
    ));

    let topic_collector = TopicCollector {
        client: client.clone(),
        aiven,
        projects: config.projects.clone(),
    };
    let acl_collector = AclCollector { client };

    info!("start controllers ...");
    tokio::select! {
       _ = controller.clone().start::<Topic>() => (),
       _ = controller.start::<Stream>() => (),
       _ = collectors::run(&topic_collector, config.topic_report_interval) => (),
       _ = collectors::run(&acl_collector, config.topic_report_interval) => (),
       res = metrics_server => res?,
       res = shutdown_signal() => res?,
    };
    if let Err(e) = meter_provider.shutdown() {
        warn!("failed to shut down meter provider: {:?}", e);
    }
    info!("kafkarator stopped");
    Ok(())
}
