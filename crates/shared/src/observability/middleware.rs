//! HTTP 中间件

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use tracing::{Instrument, info_span, warn};

use super::metrics;

/// HTTP 请求追踪和指标中间件
///
/// 指标按路由模板（如 `/api/v1/users/{user_id}/balance`）聚合，
/// 避免用户 ID 进入标签。span 中保留实际路径。
pub async fn http_tracing(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let span = info_span!(
        "http_request",
        method = %method,
        path = %path,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let latency = start.elapsed();
    let status = response.status();

    span.record("status", status.as_u16());
    span.record("latency_ms", latency.as_millis() as u64);
    if status.is_server_error() {
        span.in_scope(|| warn!(status = status.as_u16(), "请求处理失败"));
    }

    metrics::record_http_request(&method, &route, status.as_u16(), latency.as_secs_f64());

    response
}
