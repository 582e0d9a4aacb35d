use std::{net::SocketAddr, sync::Arc};

use http_body_util::Full;
use hyper::{
    Request, Response, StatusCode, body::Bytes, header::CONTENT_TYPE, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;

const METRICS_PATH: &'static str = "/metrics";

async fn serve_req<B>(
    req: Request<B>,
    registry: Arc<Registry>,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    if req.uri().path() != METRICS_PATH {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()));
    }
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut result = Vec::new();
    match encoder.encode(&metric_families, &mut result) {
        Ok(_) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, encoder.format_type())
            .body(Full::new(Bytes::from(result))),
        Err(e) => {
            error!("{}", e);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::new()))
        }
    }
}

/// Serves the registry in the Prometheus text format until the listener fails.
pub(crate) async fn start_prometheus_metrics_server(
    addr: SocketAddr,
    registry: Registry,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("serving metrics on http://{}{}", addr, METRICS_PATH);
    let registry = Arc::new(registry);
    loop {
        let (stream, _) = listener.accept().await?;
        let registry = registry.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| serve_req(req, registry.clone()));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("metrics connection failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use prometheus::IntCounter;

    fn registry() -> Arc<Registry> {
        let registry = Registry::new();
        let counter = IntCounter::new("kafkarator_test_total", "test counter").unwrap();
        counter.inc();
        registry.register(Box::new(counter)).unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn serves_metrics() {
        let req = Request::builder().uri("/metrics").body(()).unwrap();
        let response = serve_req(req, registry()).await.unwrap();
        assert_eq!(StatusCode::OK, response.status());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("kafkarator_test_total 1"));
    }

    #[tokio::test]
    async fn unknown_path() {
        let req = Request::builder().uri("/").body(()).unwrap();
        let response = serve_req(req, registry()).await.unwrap();
        assert_eq!(StatusCode::NOT_FOUND, response.status());
    }
}
