//! 通知服务错误类型
//!
//! 区分推送失败、文档读取失败、鉴权失败与坏事件等场景，
//! 便于触发循环根据错误类型决定重试或投递死信。
//! 收件人没有推送 token 不属于错误，解析结果为空即可。

use notify_shared::error::NotifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// 推送服务拒绝了本次提交
    #[error("推送发送失败: {reason}")]
    SinkFailure { reason: String },

    /// 文档库访问失败（网络、权限或响应格式错误），文档不存在不属于此类
    #[error("文档读取失败: {collection} - {reason}")]
    Store { collection: String, reason: String },

    #[error("获取访问令牌失败: {0}")]
    Auth(String),

    #[error("无效的订单事件: {0}")]
    InvalidEvent(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error(transparent)]
    Shared(#[from] NotifyError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    pub fn sink(reason: impl Into<String>) -> Self {
        Self::SinkFailure {
            reason: reason.into(),
        }
    }

    pub fn store(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    /// 外部依赖的瞬时故障可以重试，坏数据和错误配置重试也无济于事
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SinkFailure { .. } | Self::Store { .. } | Self::Auth(_) => true,
            Self::InvalidEvent(_) | Self::Config(_) => false,
            Self::Shared(e) => e.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DispatchError::sink("FCM 返回 503");
        assert_eq!(err.to_string(), "推送发送失败: FCM 返回 503");

        let err = DispatchError::store("users", "连接超时");
        assert_eq!(err.to_string(), "文档读取失败: users - 连接超时");

        let err = DispatchError::InvalidEvent("缺少 orderId".to_string());
        assert_eq!(err.to_string(), "无效的订单事件: 缺少 orderId");

        let err = DispatchError::from(NotifyError::Kafka("broker 不可达".to_string()));
        assert_eq!(err.to_string(), "Kafka 错误: broker 不可达");
    }

    #[test]
    fn test_is_retryable() {
        assert!(DispatchError::sink("x").is_retryable());
        assert!(DispatchError::store("profiles", "x").is_retryable());
        assert!(DispatchError::Auth("x".to_string()).is_retryable());
        assert!(!DispatchError::InvalidEvent("x".to_string()).is_retryable());
        assert!(!DispatchError::Config("x".to_string()).is_retryable());
        assert!(DispatchError::Shared(NotifyError::Kafka("x".to_string())).is_retryable());
        assert!(!DispatchError::Shared(NotifyError::from(
            serde_json::from_str::<serde_json::Value>("x").unwrap_err()
        )).is_retryable());
    }
}
