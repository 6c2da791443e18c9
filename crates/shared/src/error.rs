//! 统一错误处理模块
//!
//! 定义各服务共享的基础设施错误类型，使用 thiserror 提供良好的错误信息。
//! 业务相关的错误（推送失败、文档读取失败等）由各服务自行定义并通过
//! `#[from]` 透传本类型。

use thiserror::Error;

/// 共享基础设施错误
#[derive(Debug, Error)]
pub enum NotifyError {
    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    // ==================== 序列化错误 ====================
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, NotifyError>;

impl NotifyError {
    /// 获取错误码，用于日志中的稳定字段
    pub fn code(&self) -> &'static str {
        match self {
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Kafka(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = NotifyError::Kafka("broker 不可达".to_string());
        assert_eq!(err.code(), "KAFKA_ERROR");
        assert_eq!(err.to_string(), "Kafka 错误: broker 不可达");

        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(NotifyError::from(serde_err).code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_is_retryable() {
        assert!(NotifyError::Kafka("broker 不可达".to_string()).is_retryable());

        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        assert!(!NotifyError::Serialization(serde_err).is_retryable());
    }
}
