//! 推送发送器
//!
//! 通过 `PushSink` trait 抽象推送投递，一次调用发送到一组 token。
//! 生产环境使用 FCM 实现，未配置凭据时使用只记录日志的实现。

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::templates::NotificationPayload;

/// 单个 token 的投递结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResult {
    pub token: String,
    /// 推送服务返回的消息标识，用于追踪投递状态
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl TokenResult {
    pub fn delivered(token: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn rejected(token: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            message_id: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 一次推送调用的汇总结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<TokenResult>,
}

impl SendReport {
    pub fn from_results(results: Vec<TokenResult>) -> Self {
        let success_count = results.iter().filter(|r| r.is_success()).count();
        Self {
            success_count,
            failure_count: results.len() - success_count,
            results,
        }
    }
}

/// 推送发送器
///
/// `tokens` 由调用方保证非空。推送服务整体拒绝本次提交时返回 `SinkFailure`，
/// 此时部分 token 可能已经收到通知，重试会导致这些 token 收到重复通知。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushSink: Send + Sync {
    async fn send(&self, tokens: &[String], payload: &NotificationPayload) -> Result<SendReport>;

    /// 发送器名称，用于日志
    fn name(&self) -> &'static str;
}

/// 只记录日志的发送器
///
/// 用于本地开发或未配置 FCM 凭据的环境，所有 token 都视为投递成功。
pub struct LogPushSink;

#[async_trait]
impl PushSink for LogPushSink {
    async fn send(&self, tokens: &[String], payload: &NotificationPayload) -> Result<SendReport> {
        let results = tokens
            .iter()
            .map(|token| {
                let message_id = Uuid::now_v7().to_string();
                info!(
                    sink = self.name(),
                    token = %token,
                    message_id = %message_id,
                    title = %payload.notification.title,
                    body = %payload.notification.body,
                    order_id = %payload.data.order_id,
                    "模拟发送推送通知"
                );
                TokenResult::delivered(token.clone(), message_id)
            })
            .collect();

        Ok(SendReport::from_results(results))
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
