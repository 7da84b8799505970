//! API 处理器
//!
//! 处理器只做参数提取与响应包装，业务逻辑全部委托给触发协调器

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use super::{response::ApiResponse, state::AppState};
use crate::error::RewardError;
use crate::models::{ActionType, RewardTransaction};
use crate::service::{
    AchievementProgress, ActionOutcome, ActionRequest, BalanceView, ReconcileOutcome,
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, RewardError>;

/// 行为请求体（userId 取自路径）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBody {
    pub action_type: ActionType,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// 登记用户
///
/// POST /api/v1/users/{user_id}
pub async fn register_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<BalanceView> {
    let view = state.coordinator.register_user(&user_id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// 上报用户行为
///
/// POST /api/v1/users/{user_id}/actions
pub async fn submit_action(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<ActionBody>,
) -> ApiResult<ActionOutcome> {
    let request = ActionRequest {
        user_id,
        action_type: body.action_type,
        metadata: body.metadata,
        event_id: body.event_id,
    };
    let outcome = state.coordinator.handle_action(request).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// GET /api/v1/users/{user_id}/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<BalanceView> {
    let view = state.coordinator.get_balance(&user_id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// GET /api/v1/users/{user_id}/achievements
pub async fn get_achievements(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<AchievementProgress>> {
    let progress = state.coordinator.get_achievements(&user_id).await?;
    Ok(Json(ApiResponse::success(progress)))
}

/// GET /api/v1/users/{user_id}/transactions?limit=
pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Vec<RewardTransaction>> {
    let transactions = state
        .coordinator
        .list_transactions(&user_id, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(transactions)))
}

/// 触发对账
///
/// POST /api/v1/users/{user_id}/reconcile
pub async fn reconcile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<ReconcileOutcome> {
    let outcome = state.coordinator.reconcile(&user_id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}
