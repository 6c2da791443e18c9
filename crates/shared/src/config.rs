//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Kafka 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: String,
    pub consumer_group: String,
    pub auto_offset_reset: String,
    /// 订单变更事件 topic，由文档库的变更桥接程序写入
    pub orders_topic: String,
    /// 重试耗尽后的订单事件投递到该 topic
    pub dead_letter_topic: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            consumer_group: "order-notifier".to_string(),
            auto_offset_reset: "earliest".to_string(),
            orders_topic: "orders.changes".to_string(),
            dead_letter_topic: "orders.changes.dlq".to_string(),
        }
    }
}

/// Firebase 项目配置
///
/// `credentials_path` 指向服务账号 JSON 密钥。为空时 Firestore 以免鉴权方式访问
/// （本地模拟器），推送退化为仅记录日志的发送器。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub credentials_path: Option<String>,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: "disenounico".to_string(),
            credentials_path: None,
        }
    }
}

/// Firestore REST 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    pub base_url: String,
    /// 列表接口单页文档数
    pub page_size: u32,
    pub request_timeout_ms: u64,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            page_size: 300,
            request_timeout_ms: 10_000,
        }
    }
}

impl FirestoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// FCM HTTP v1 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcmConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fcm.googleapis.com/v1".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl FcmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// 显示名到用户标识的别名
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AliasEntry {
    pub display_name: String,
    pub user_id: String,
}

impl AliasEntry {
    pub fn new(display_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            user_id: user_id.into(),
        }
    }
}

/// 收件人配置
///
/// `pair` 必须恰好包含两个不同的用户标识，由收件人策略在构造时校验。
/// 别名以列表形式配置，避免配置库对表键做大小写归一化。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecipientConfig {
    pub pair: Vec<String>,
    pub aliases: Vec<AliasEntry>,
}

impl Default for RecipientConfig {
    fn default() -> Self {
        Self {
            pair: vec!["david1720".to_string(), "maria1720".to_string()],
            aliases: vec![
                AliasEntry::new("Esteban", "david1720"),
                AliasEntry::new("Luisa", "maria1720"),
            ],
        }
    }
}

/// 重试配置（作用于触发循环，而非分发器本身）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 是否输出 JSON 结构化日志，否则为人类可读格式
    pub json_logs: bool,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub kafka: KafkaConfig,
    pub firebase: FirebaseConfig,
    pub firestore: FirestoreConfig,
    pub fcm: FcmConfig,
    pub recipients: RecipientConfig,
    pub retry: RetryConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（NOTIFY_ 前缀，双下划线分隔层级，如 NOTIFY_KAFKA__BROKERS -> kafka.brokers）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        // .env 仅用于本地开发，不存在时忽略
        let _ = dotenvy::dotenv();

        let env = std::env::var("NOTIFY_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("NOTIFY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否配置了服务账号密钥
    pub fn has_credentials(&self) -> bool {
        self.firebase
            .credentials_path
            .as_deref()
            .is_some_and(|p| !p.is_empty())
    }
}
