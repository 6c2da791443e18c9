//! 订单事件消费者
//!
//! 从 Kafka 消费订单变更事件并交给分发器。可重试的失败按退避策略重试，
//! 重试耗尽或不可重试的事件投递到死信 topic。无法解析的消息记录日志后跳过。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use notify_shared::config::KafkaConfig;
use notify_shared::events::OrderChange;
use notify_shared::kafka::{ConsumerMessage, KafkaConsumer, KafkaProducer};
use notify_shared::observability::metrics;
use notify_shared::retry::{RetryPolicy, retry_with_policy};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::dispatcher::{DispatchOutcome, NotificationDispatcher};
use crate::error::{DispatchError, Result};

/// 死信记录：原始事件加上最后一次失败的原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub change: OrderChange,
    pub error: String,
    pub retryable: bool,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(change: OrderChange, error: &DispatchError) -> Self {
        Self {
            change,
            error: error.to_string(),
            retryable: error.is_retryable(),
            failed_at: Utc::now(),
        }
    }
}

pub struct OrderEventConsumer {
    consumer: KafkaConsumer,
    producer: KafkaProducer,
    dispatcher: Arc<NotificationDispatcher>,
    retry: RetryPolicy,
    topic: String,
    dead_letter_topic: String,
}

impl OrderEventConsumer {
    pub fn new(
        config: &KafkaConfig,
        dispatcher: Arc<NotificationDispatcher>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            consumer: KafkaConsumer::new(config)?,
            producer: KafkaProducer::new(config)?,
            dispatcher,
            retry,
            topic: config.orders_topic.clone(),
            dead_letter_topic: config.dead_letter_topic.clone(),
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.consumer.subscribe(&[self.topic.as_str()])?;
        info!(topic = %self.topic, "订单事件消费者已启动");

        let dispatcher = self.dispatcher;
        let producer = self.producer;
        let retry = self.retry;
        let dead_letter_topic = self.dead_letter_topic;

        self.consumer
            .start(shutdown, |msg| {
                let dispatcher = &dispatcher;
                let producer = &producer;
                let retry = &retry;
                let dead_letter_topic = dead_letter_topic.as_str();
                async move {
                    let Some(change) = decode_change(&msg) else {
                        return Ok(());
                    };

                    if let Err(e) = process_change(dispatcher, retry, &change).await {
                        send_to_dlq(producer, dead_letter_topic, DeadLetter::new(change, &e)).await;
                    }
                    Ok(())
                }
            })
            .await;

        info!("订单事件消费者已停止");
        Ok(())
    }
}

/// 解析订单变更消息，格式错误时记录日志并返回 `None`
pub fn decode_change(msg: &ConsumerMessage) -> Option<OrderChange> {
    match msg.deserialize_payload::<OrderChange>() {
        Ok(change) => Some(change),
        Err(e) => {
            warn!(
                error = %e,
                code = e.code(),
                topic = %msg.topic,
                partition = msg.partition,
                offset = msg.offset,
                "无法解析订单变更消息，跳过"
            );
            None
        }
    }
}

/// 调用分发器处理一条事件，可重试的失败按策略重试
pub async fn process_change(
    dispatcher: &NotificationDispatcher,
    retry: &RetryPolicy,
    change: &OrderChange,
) -> Result<DispatchOutcome> {
    let result = retry_with_policy(
        retry,
        change.kind.trigger(),
        DispatchError::is_retryable,
        || dispatcher.dispatch(change),
    )
    .await;

    match &result {
        Ok(outcome) => info!(
            event_id = %change.event_id,
            order_id = %change.order_id,
            status = outcome.status(),
            tokens = outcome.tokens,
            "订单事件处理完成"
        ),
        Err(e) => error!(
            event_id = %change.event_id,
            order_id = %change.order_id,
            error = %e,
            "订单事件处理失败"
        ),
    }

    result
}

async fn send_to_dlq(producer: &KafkaProducer, topic: &str, letter: DeadLetter) {
    let trigger = letter.change.kind.trigger();
    metrics::record_dead_letter(trigger);

    if let Err(e) = producer
        .send_json(topic, &letter.change.order_id, &letter)
        .await
    {
        error!(
            event_id = %letter.change.event_id,
            order_id = %letter.change.order_id,
            error = %e,
            "发送到死信队列失败，事件可能丢失"
        );
    } else {
        warn!(
            event_id = %letter.change.event_id,
            order_id = %letter.change.order_id,
            topic,
            "订单事件已投递到死信队列"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RecipientPolicy;
    use crate::resolver::TokenResolver;
    use crate::sender::{MockPushSink, SendReport, TokenResult};
    use crate::store::MemoryStore;
    use notify_shared::config::RecipientConfig;
    use notify_shared::events::Order;
    use std::collections::HashMap;
    use std::time::Duration;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    fn dispatcher(sink: MockPushSink) -> NotificationDispatcher {
        let store = MemoryStore::new();
        store.insert_token("users", "maria1720", "T1");
        NotificationDispatcher::new(
            RecipientPolicy::from_config(&RecipientConfig::default()).unwrap(),
            TokenResolver::users_then_profiles(Arc::new(store)),
            Arc::new(sink),
        )
    }

    fn created_by_david() -> OrderChange {
        OrderChange::created(
            "ord-1",
            Order {
                owner_name: Some("david1720".to_string()),
                ..Order::default()
            },
        )
    }

    fn message(payload: &[u8]) -> ConsumerMessage {
        ConsumerMessage {
            topic: "orders.changes".to_string(),
            partition: 0,
            offset: 1,
            key: None,
            payload: payload.to_vec(),
            timestamp: None,
            headers: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_transient_sink_failure_is_retried() {
        let mut sink = MockPushSink::new();
        let mut seq = mockall::Sequence::new();
        sink.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(DispatchError::sink("FCM 返回 503")));
        sink.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|tokens, _| {
                Ok(SendReport::from_results(vec![TokenResult::delivered(
                    tokens[0].clone(),
                    "m1",
                )]))
            });

        let outcome = process_change(&dispatcher(sink), &fast_retry(3), &created_by_david())
            .await
            .unwrap();
        assert_eq!(outcome.status(), "sent");
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let mut sink = MockPushSink::new();
        sink.expect_send()
            .times(3)
            .returning(|_, _| Err(DispatchError::sink("FCM 返回 503")));

        let err = process_change(&dispatcher(sink), &fast_retry(2), &created_by_david())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::SinkFailure { .. }));
    }

    #[tokio::test]
    async fn test_invalid_event_not_retried() {
        let mut sink = MockPushSink::new();
        sink.expect_send().never();

        let change = OrderChange::created("", Order::default());
        let err = process_change(&dispatcher(sink), &fast_retry(3), &change)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidEvent(_)));
    }

    #[test]
    fn test_decode_change_skips_garbage() {
        assert!(decode_change(&message(b"{\"kind\":\"deleted\"}")).is_none());
        assert!(decode_change(&message(b"")).is_none());

        let json = br#"{"eventId":"e1","orderId":"ord-1","kind":"updated","before":{},"after":{"paid":true}}"#;
        let change = decode_change(&message(json)).unwrap();
        assert_eq!(change.kind.trigger(), "order_updated");
    }

    #[tokio::test]
    async fn test_mistyped_paid_still_notifies_as_modified() {
        let mut sink = MockPushSink::new();
        sink.expect_send()
            .withf(|tokens, payload| {
                tokens.len() == 1
                    && tokens[0] == "T1"
                    && payload.notification.title == "Pedido modificado"
            })
            .times(1)
            .returning(|tokens, _| {
                Ok(SendReport::from_results(vec![TokenResult::delivered(
                    tokens[0].clone(),
                    "m1",
                )]))
            });

        let json = br#"{"eventId":"e2","orderId":"ord-2","kind":"updated","before":{"ownerName":"Esteban"},"after":{"ownerName":"Esteban","paid":"true"}}"#;
        let change = decode_change(&message(json)).unwrap();

        let outcome = process_change(&dispatcher(sink), &fast_retry(0), &change)
            .await
            .unwrap();
        assert_eq!(outcome.recipient.as_deref(), Some("maria1720"));
    }

    #[test]
    fn test_dead_letter_serialization() {
        let letter = DeadLetter::new(created_by_david(), &DispatchError::sink("FCM 返回 503"));
        let json = serde_json::to_value(&letter).unwrap();

        assert_eq!(json["change"]["orderId"], "ord-1");
        assert_eq!(json["change"]["kind"], "created");
        assert_eq!(json["error"], "推送发送失败: FCM 返回 503");
        assert_eq!(json["retryable"], true);
        assert!(json["failedAt"].is_string());
    }
}
