//! 通知分发器
//!
//! 订单创建或更新时解析收件人、查找推送 token、生成负载并交给发送器。
//! 解析不出收件人时退化为广播：通知除下单人之外的所有已知用户。
//! 分发器无状态，不做重试，失败原样返回给触发方。

use std::sync::Arc;
use std::time::Instant;

use notify_shared::events::{Order, OrderChange, OrderChangeKind};
use notify_shared::observability::metrics;
use tracing::{error, info, instrument, warn};

use crate::error::{DispatchError, Result};
use crate::policy::{RecipientPolicy, Resolution, ResolutionMode};
use crate::resolver::TokenResolver;
use crate::sender::{PushSink, SendReport};
use crate::templates::{NotificationPayload, NotificationTemplateEngine, UpdateClassification};

/// 一次分发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub trigger: &'static str,
    pub mode: ResolutionMode,
    /// 广播时为 `None`
    pub recipient: Option<String>,
    /// 目标 token 数量
    pub tokens: usize,
    /// 目标集合为空、未调用发送器时为 `None`
    pub report: Option<SendReport>,
}

impl DispatchOutcome {
    pub fn status(&self) -> &'static str {
        if self.report.is_some() { "sent" } else { "skipped" }
    }
}

pub struct NotificationDispatcher {
    policy: RecipientPolicy,
    resolver: TokenResolver,
    sink: Arc<dyn PushSink>,
}

impl NotificationDispatcher {
    pub fn new(policy: RecipientPolicy, resolver: TokenResolver, sink: Arc<dyn PushSink>) -> Self {
        Self {
            policy,
            resolver,
            sink,
        }
    }

    /// 处理一条订单变更事件并记录分发指标
    #[instrument(skip(self, change), fields(event_id = %change.event_id, order_id = %change.order_id))]
    pub async fn dispatch(&self, change: &OrderChange) -> Result<DispatchOutcome> {
        let trigger = change.kind.trigger();
        let started = Instant::now();

        let result = if change.order_id.is_empty() {
            Err(DispatchError::InvalidEvent("orderId 为空".to_string()))
        } else {
            match &change.kind {
                OrderChangeKind::Created { order } => {
                    self.on_order_created(&change.order_id, order).await
                }
                OrderChangeKind::Updated { before, after } => {
                    self.on_order_updated(&change.order_id, before, after).await
                }
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(outcome) => metrics::record_dispatch(
                trigger,
                outcome.mode.as_str(),
                outcome.status(),
                outcome.tokens,
                elapsed,
            ),
            Err(_) => metrics::record_dispatch(trigger, "unknown", "failed", 0, elapsed),
        }

        result
    }

    /// 订单创建：只按配对解析收件人
    pub async fn on_order_created(&self, order_id: &str, order: &Order) -> Result<DispatchOutcome> {
        let resolution = order
            .owner_username()
            .and_then(|owner| self.policy.resolve_direct(owner));
        let payload = NotificationTemplateEngine::order_created(order_id, order);

        self.deliver("order_created", order, resolution, payload).await
    }

    /// 订单更新：按更新后的快照解析收件人，配对失败时再查别名表
    pub async fn on_order_updated(
        &self,
        order_id: &str,
        before: &Order,
        after: &Order,
    ) -> Result<DispatchOutcome> {
        let resolution = after
            .owner_username()
            .and_then(|owner| self.policy.resolve_with_aliases(owner));
        let classification = UpdateClassification::classify(before, after);
        let payload = NotificationTemplateEngine::order_updated(order_id, classification);

        self.deliver("order_updated", after, resolution, payload).await
    }

    async fn deliver(
        &self,
        trigger: &'static str,
        owner: &Order,
        resolution: Option<Resolution>,
        payload: NotificationPayload,
    ) -> Result<DispatchOutcome> {
        let order_id = payload.data.order_id.as_str();

        let (mode, recipient, tokens) = match resolution {
            Some(Resolution { recipient, mode }) => {
                let tokens = match self.resolver.token_for(&recipient).await? {
                    Some(token) => vec![token],
                    None => {
                        warn!(order_id, recipient = %recipient, "收件人没有推送 token，跳过通知");
                        Vec::new()
                    }
                };
                (mode, Some(recipient), tokens)
            }
            None => {
                let excluded: Vec<&str> = [owner.owner_id(), owner.owner_name()]
                    .into_iter()
                    .flatten()
                    .collect();
                let tokens = self.resolver.all_tokens_except(&excluded).await?;
                (ResolutionMode::Broadcast, None, tokens)
            }
        };

        let mut outcome = DispatchOutcome {
            trigger,
            mode,
            recipient,
            tokens: tokens.len(),
            report: None,
        };

        if tokens.is_empty() {
            info!(trigger, order_id, mode = mode.as_str(), "目标集合为空，不发送通知");
            return Ok(outcome);
        }

        let report = self.sink.send(&tokens, &payload).await.inspect_err(|e| {
            error!(
                trigger,
                order_id,
                mode = mode.as_str(),
                tokens = tokens.len(),
                error = %e,
                "推送通知发送失败"
            );
        })?;

        info!(
            trigger,
            order_id,
            mode = mode.as_str(),
            recipient = outcome.recipient.as_deref().unwrap_or("*"),
            title = %payload.notification.title,
            success = report.success_count,
            failure = report.failure_count,
            "推送通知已发送"
        );

        outcome.report = Some(report);
        Ok(outcome)
    }
}
