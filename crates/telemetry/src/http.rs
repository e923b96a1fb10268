//! A minimal `/metrics` endpoint, served only if the node config sets
//! `telemetry.metrics_bind_addr`.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use prometheus::{Encoder, TextEncoder};

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).expect("prometheus text encoding cannot fail");
    String::from_utf8(buffer).expect("prometheus text encoding is always utf8")
}

pub async fn serve(addr: SocketAddr) -> Result<(), std::io::Error> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "telemetry", %addr, "metrics endpoint listening");
    axum::serve(listener, app).await
}
