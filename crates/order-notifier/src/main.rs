//! 订单通知服务入口
//!
//! 从 Kafka 消费订单变更事件，解析收件人后通过 FCM 推送通知。

use std::sync::Arc;

use anyhow::Result;
use notify_shared::{config::AppConfig, observability, retry::RetryPolicy};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use order_notifier::{
    auth::{AccessTokenProvider, GoogleAuth, ServiceAccountKey},
    consumer::OrderEventConsumer,
    dispatcher::NotificationDispatcher,
    fcm::FcmPushSink,
    policy::RecipientPolicy,
    resolver::TokenResolver,
    sender::{LogPushSink, PushSink},
    store::{DocumentStore, FirestoreStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置并初始化可观测性
    let config = AppConfig::load("order-notifier")?;
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        project_id = %config.firebase.project_id,
        "Starting order-notifier..."
    );

    // 2. 服务账号鉴权，未配置密钥时 Firestore 免鉴权访问（模拟器），推送只记录日志
    let auth: Option<Arc<dyn AccessTokenProvider>> = match &config.firebase.credentials_path {
        Some(path) if config.has_credentials() => {
            let key = ServiceAccountKey::from_file(path)?;
            info!(client_email = %key.client_email, "已加载服务账号密钥");
            // 令牌刷新期间持有缓存锁，请求必须有超时，否则所有分发都会阻塞
            let auth_client = reqwest::Client::builder()
                .timeout(config.fcm.request_timeout())
                .build()?;
            Some(Arc::new(GoogleAuth::new(key, auth_client)))
        }
        _ => {
            if config.is_production() {
                warn!("生产环境未配置服务账号密钥，推送将只记录日志");
            }
            None
        }
    };

    // 3. 文档库与 token 解析
    let firestore_client = reqwest::Client::builder()
        .timeout(config.firestore.request_timeout())
        .build()?;
    let store: Arc<dyn DocumentStore> = Arc::new(FirestoreStore::new(
        &config.firestore.base_url,
        config.firebase.project_id.clone(),
        config.firestore.page_size,
        firestore_client,
        auth.clone(),
    )?);
    let resolver = TokenResolver::users_then_profiles(store);

    // 4. 推送发送器
    let sink: Arc<dyn PushSink> = match auth {
        Some(auth) => {
            let fcm_client = reqwest::Client::builder()
                .timeout(config.fcm.request_timeout())
                .build()?;
            Arc::new(FcmPushSink::new(
                &config.fcm.base_url,
                &config.firebase.project_id,
                auth,
                fcm_client,
            ))
        }
        None => Arc::new(LogPushSink),
    };
    info!(sink = sink.name(), "推送发送器已就绪");

    // 5. 收件人策略与分发器
    let policy = RecipientPolicy::from_config(&config.recipients)?;
    let dispatcher = Arc::new(NotificationDispatcher::new(policy, resolver, sink));

    // 6. 启动消费者，Ctrl-C 时优雅关闭
    let consumer = OrderEventConsumer::new(
        &config.kafka,
        dispatcher,
        RetryPolicy::from(&config.retry),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_handle = tokio::spawn(consumer.run(shutdown_rx));

    signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    consumer_handle.await??;
    info!("order-notifier stopped");
    Ok(())
}
