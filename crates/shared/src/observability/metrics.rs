//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 行为处理耗时分桶（秒），覆盖内存后端的亚毫秒级到数据库后端的秒级
const ACTION_DURATION_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new()
        .add_global_label("service", config.service_name.clone())
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            ACTION_DURATION_BUCKETS,
        )?
        .install_recorder()?;

    register_common_metrics();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述（/metrics 中的 HELP 注释）
fn register_common_metrics() {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "reward_credits_awarded_total",
        "Total credits granted by the reward ledger"
    );
    metrics::describe_counter!(
        "reward_award_replays_total",
        "Awards answered from an existing transaction (idempotent replay)"
    );
    metrics::describe_counter!(
        "achievement_unlocks_total",
        "Total achievement levels unlocked"
    );
    metrics::describe_counter!(
        "achievement_cas_conflicts_total",
        "Compare-and-swap conflicts while upgrading achievement levels"
    );
    metrics::describe_histogram!(
        "reward_action_duration_seconds",
        "End-to-end duration of one handled user action"
    );

    metrics::counter!("service_starts_total").increment(1);
}

/// 启动指标 HTTP 服务器
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

/// 记录 HTTP 请求，`route` 为路由模板而非实际路径
pub fn record_http_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels).record(duration_secs);
}

/// 记录一次积分发放
#[inline]
pub fn record_credits_awarded(action_type: &'static str, credits: i64) {
    metrics::counter!("reward_credits_awarded_total", "action_type" => action_type)
        .increment(credits.max(0) as u64);
}

/// 记录一次幂等重放
#[inline]
pub fn record_award_replay(action_type: &'static str) {
    metrics::counter!("reward_award_replays_total", "action_type" => action_type).increment(1);
}

/// 记录成就解锁
#[inline]
pub fn record_achievement_unlock(category: &'static str) {
    metrics::counter!("achievement_unlocks_total", "category" => category).increment(1);
}

/// 记录成就等级 CAS 冲突
#[inline]
pub fn record_cas_conflict(category: &'static str) {
    metrics::counter!("achievement_cas_conflicts_total", "category" => category).increment(1);
}

/// 记录一次用户行为处理耗时
#[inline]
pub fn record_action_duration(action_type: &'static str, status: &'static str, duration_secs: f64) {
    metrics::histogram!(
        "reward_action_duration_seconds",
        "action_type" => action_type,
        "status" => status
    )
    .record(duration_secs);
}
