//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "order_notifications_total",
        "Total number of order notification dispatches"
    );
    metrics::describe_counter!(
        "order_notification_tokens_total",
        "Total number of push tokens targeted by order notifications"
    );
    metrics::describe_histogram!(
        "order_dispatch_duration_seconds",
        "Order notification dispatch duration in seconds"
    );
    metrics::describe_counter!(
        "order_events_dead_lettered_total",
        "Total number of order events written to the dead letter topic"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 记录一次订单通知分发
///
/// `mode` 为收件人解析方式（paired/aliased/broadcast），`status` 为 sent/skipped/failed。
#[inline]
pub fn record_dispatch(trigger: &str, mode: &str, status: &str, tokens: usize, duration_secs: f64) {
    metrics::counter!(
        "order_notifications_total",
        "trigger" => trigger.to_string(),
        "mode" => mode.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::counter!(
        "order_notification_tokens_total",
        "trigger" => trigger.to_string()
    )
    .increment(tokens as u64);

    metrics::histogram!(
        "order_dispatch_duration_seconds",
        "trigger" => trigger.to_string()
    )
    .record(duration_secs);
}

/// 记录一次死信投递
#[inline]
pub fn record_dead_letter(trigger: &str) {
    metrics::counter!(
        "order_events_dead_lettered_total",
        "trigger" => trigger.to_string()
    )
    .increment(1);
}
