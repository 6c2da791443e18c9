//! 通知模板
//!
//! 根据订单事件生成推送负载。标题固定，正文只在订单创建时带上下单人，
//! 便于客户端按标题聚合同类通知。

use notify_shared::events::Order;
use serde::{Deserialize, Serialize};

/// 下单人未知时正文使用的占位名
pub const UNKNOWN_OWNER: &str = "Alguien";

/// 推送负载
///
/// 序列化格式：`{ notification: {title, body}, data: {type, orderId} }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub notification: NotificationContent,
    pub data: NotificationData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub order_id: String,
}

/// 通知类型，写入 data.type 供客户端路由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    OrderUpdated,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderCreated => "order_created",
            Self::OrderUpdated => "order_updated",
        }
    }
}

/// 订单更新的分类
///
/// 只识别付款完成这一种迁移，其余字段变化一律视为普通修改。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateClassification {
    PaymentCompleted,
    Modified,
}

impl UpdateClassification {
    /// `before.paid` 为 false 或缺失且 `after.paid` 为 true 时为付款完成
    pub fn classify(before: &Order, after: &Order) -> Self {
        if before.paid != Some(true) && after.is_paid() {
            Self::PaymentCompleted
        } else {
            Self::Modified
        }
    }
}

/// 通知模板引擎
pub struct NotificationTemplateEngine;

impl NotificationTemplateEngine {
    /// 订单创建通知
    pub fn order_created(order_id: &str, order: &Order) -> NotificationPayload {
        let owner = order.owner_username().unwrap_or(UNKNOWN_OWNER);
        NotificationPayload {
            notification: NotificationContent {
                title: "Nuevo pedido".to_string(),
                body: format!("{owner} agregó un pedido."),
            },
            data: NotificationData {
                kind: NotificationKind::OrderCreated,
                order_id: order_id.to_string(),
            },
        }
    }

    /// 订单更新通知
    pub fn order_updated(order_id: &str, classification: UpdateClassification) -> NotificationPayload {
        let (title, body) = match classification {
            UpdateClassification::PaymentCompleted => {
                ("Pedido realizado", "Un pedido fue marcado como realizado.")
            }
            UpdateClassification::Modified => ("Pedido modificado", "Un pedido fue modificado."),
        };

        NotificationPayload {
            notification: NotificationContent {
                title: title.to_string(),
                body: body.to_string(),
            },
            data: NotificationData {
                kind: NotificationKind::OrderUpdated,
                order_id: order_id.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(owner_id: Option<&str>, owner_name: Option<&str>, paid: Option<bool>) -> Order {
        Order {
            owner_id: owner_id.map(String::from),
            owner_name: owner_name.map(String::from),
            paid,
        }
    }

    #[test]
    fn test_order_created_uses_owner_name() {
        let payload =
            NotificationTemplateEngine::order_created("ord-1", &order(Some("u1"), Some("Luisa"), None));
        assert_eq!(payload.notification.title, "Nuevo pedido");
        assert_eq!(payload.notification.body, "Luisa agregó un pedido.");
        assert_eq!(payload.data.kind, NotificationKind::OrderCreated);
        assert_eq!(payload.data.order_id, "ord-1");
    }

    #[test]
    fn test_order_created_falls_back_to_owner_id_then_placeholder() {
        let payload = NotificationTemplateEngine::order_created("ord-1", &order(Some("u1"), None, None));
        assert_eq!(payload.notification.body, "u1 agregó un pedido.");

        let payload = NotificationTemplateEngine::order_created("ord-1", &order(None, Some(""), None));
        assert_eq!(payload.notification.body, "Alguien agregó un pedido.");
    }

    #[test]
    fn test_classify_payment_completed() {
        let after = order(None, Some("x"), Some(true));
        assert_eq!(
            UpdateClassification::classify(&order(None, Some("x"), None), &after),
            UpdateClassification::PaymentCompleted
        );
        assert_eq!(
            UpdateClassification::classify(&order(None, Some("x"), Some(false)), &after),
            UpdateClassification::PaymentCompleted
        );
    }

    #[test]
    fn test_classify_other_changes_are_modified() {
        // 已付款订单再次更新
        assert_eq!(
            UpdateClassification::classify(
                &order(None, Some("x"), Some(true)),
                &order(None, Some("y"), Some(true))
            ),
            UpdateClassification::Modified
        );
        // 取消付款
        assert_eq!(
            UpdateClassification::classify(
                &order(None, Some("x"), Some(true)),
                &order(None, Some("x"), Some(false))
            ),
            UpdateClassification::Modified
        );
        // 与 paid 无关的修改
        assert_eq!(
            UpdateClassification::classify(&order(Some("a"), None, None), &order(Some("b"), None, None)),
            UpdateClassification::Modified
        );
    }

    #[test]
    fn test_order_updated_titles() {
        let payload =
            NotificationTemplateEngine::order_updated("ord-9", UpdateClassification::PaymentCompleted);
        assert_eq!(payload.notification.title, "Pedido realizado");
        assert_eq!(payload.notification.body, "Un pedido fue marcado como realizado.");
        assert_eq!(payload.data.kind, NotificationKind::OrderUpdated);

        let payload = NotificationTemplateEngine::order_updated("ord-9", UpdateClassification::Modified);
        assert_eq!(payload.notification.title, "Pedido modificado");
    }

    #[test]
    fn test_payload_wire_format() {
        let payload = NotificationTemplateEngine::order_updated("ord-9", UpdateClassification::Modified);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "notification": {"title": "Pedido modificado", "body": "Un pedido fue modificado."},
                "data": {"type": "order_updated", "orderId": "ord-9"}
            })
        );
    }
}
