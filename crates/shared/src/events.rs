//! 订单事件模型
//!
//! 定义订单文档快照以及订单变更事件的统一信封格式。变更事件由文档库的
//! 触发桥接程序写入 Kafka，通知服务只读不写。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Order: 订单文档快照
// ---------------------------------------------------------------------------

/// 订单文档快照
///
/// 只建模通知逻辑关心的字段，其余字段在反序列化时忽略。
/// 字段类型不符（如 `paid: "true"`）时按缺失处理，不影响整条事件的解析。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// 下单用户的标识
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_id: Option<String>,
    /// 下单用户的显示名，同时作为用户名的首选来源
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_name: Option<String>,
    /// 是否已付款，新订单通常不带该字段
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub paid: Option<bool>,
}

impl Order {
    /// 非空的 ownerId（空字符串视为缺失）
    pub fn owner_id(&self) -> Option<&str> {
        non_empty(self.owner_id.as_deref())
    }

    /// 非空的 ownerName（空字符串视为缺失）
    pub fn owner_name(&self) -> Option<&str> {
        non_empty(self.owner_name.as_deref())
    }

    /// 下单用户的用户名：优先 ownerName，其次 ownerId
    pub fn owner_username(&self) -> Option<&str> {
        self.owner_name().or_else(|| self.owner_id())
    }

    /// 是否明确标记为已付款
    pub fn is_paid(&self) -> bool {
        self.paid == Some(true)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_str().map(String::from)))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_bool()))
}

// ---------------------------------------------------------------------------
// OrderChange: 订单变更事件信封
// ---------------------------------------------------------------------------

/// 订单变更类型
///
/// 对应文档库 `orders/{orderId}` 路径上的创建与更新两类触发。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderChangeKind {
    Created { order: Order },
    Updated { before: Order, after: Order },
}

impl OrderChangeKind {
    /// 触发器名称，用于日志与指标标签
    pub fn trigger(&self) -> &'static str {
        match self {
            Self::Created { .. } => "order_created",
            Self::Updated { .. } => "order_updated",
        }
    }
}

/// 订单变更事件
///
/// `event_id` 仅用于日志关联与死信排查，通知服务不做去重：
/// 同一事件被重复投递时可能产生重复通知。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderChange {
    pub event_id: String,
    pub order_id: String,
    #[serde(flatten)]
    pub kind: OrderChangeKind,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl OrderChange {
    /// 构建订单创建事件，自动生成 UUID v7 作为 event_id
    pub fn created(order_id: impl Into<String>, order: Order) -> Self {
        Self::new(order_id, OrderChangeKind::Created { order })
    }

    /// 构建订单更新事件
    pub fn updated(order_id: impl Into<String>, before: Order, after: Order) -> Self {
        Self::new(order_id, OrderChangeKind::Updated { before, after })
    }

    fn new(order_id: impl Into<String>, kind: OrderChangeKind) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            order_id: order_id.into(),
            kind,
            occurred_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
