//! 奖励引擎服务入口
//!
//! 加载配置与奖励规则，按配置选择存储后端，启动 REST API。

use std::sync::Arc;

use anyhow::Result;
use reward_engine::{
    LogNotificationSink, MemoryRewardStore, PgRewardStore, RewardEngineConfig, RewardRules,
    RewardStore, StorageBackend, TriggerCoordinator,
    http::{AppState, build_router},
};
use reward_shared::{database::Database, observability};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置：无法解析的配置拒绝启动，不回退到默认的内存后端
    let config = RewardEngineConfig::load()
        .map_err(|e| anyhow::anyhow!("Failed to load reward engine config: {}", e))?;

    // 2. 可观测性
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting reward-engine-service...");
    info!(
        environment = %config.environment,
        backend = ?config.storage.backend,
        "Configuration loaded"
    );

    // 3. 奖励规则：无效规则拒绝启动
    let rules = Arc::new(RewardRules::from_config(&config.rewards)?);
    info!(
        unlock_bonus = rules.unlock_bonus(),
        max_cas_retries = rules.max_cas_retries(),
        "Reward rules validated"
    );

    // 4. 存储
    let mut database = None;
    let store: Arc<dyn RewardStore> = match config.storage.backend {
        StorageBackend::Memory => {
            if config.is_production() {
                warn!("Memory storage backend in production: balances are lost on restart");
            }
            Arc::new(MemoryRewardStore::new())
        }
        StorageBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            let store = PgRewardStore::new(db.pool().clone());
            if config.storage.run_migrations {
                store.migrate().await?;
            }
            info!("Database connection established");
            database = Some(db);
            Arc::new(store)
        }
    };

    // 5. 服务
    let coordinator = Arc::new(TriggerCoordinator::new(
        store,
        rules,
        Arc::new(LogNotificationSink),
    ));
    let app = build_router(AppState::new(coordinator));

    // 6. 启动 HTTP 服务
    // 健康检查端点已由 observability 模块在 metrics_port 上提供
    let addr = config.server.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = database {
        db.close().await;
    }

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
