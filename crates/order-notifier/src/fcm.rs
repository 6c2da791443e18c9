//! FCM HTTP v1 推送发送器
//!
//! FCM v1 每次请求只能投递一个 token，多个 token 逐个发送并汇总结果。
//! 单个 token 被拒绝（未注册、参数无效）只记入报告；鉴权失败、
//! 服务端错误或全部 token 被拒绝时整体返回 `SinkFailure`。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::auth::AccessTokenProvider;
use crate::error::{DispatchError, Result};
use crate::sender::{PushSink, SendReport, TokenResult};
use crate::templates::{NotificationContent, NotificationPayload};

#[derive(Debug, Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: &'a NotificationContent,
    data: FcmData<'a>,
}

/// FCM 的 data 字段只接受字符串值
#[derive(Debug, Serialize)]
struct FcmData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "orderId")]
    order_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct FcmErrorResponse {
    #[serde(default)]
    error: FcmErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct FcmErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FcmErrorDetail {
    error_code: Option<String>,
}

impl FcmErrorBody {
    /// 优先使用 FCM 专有错误码（如 UNREGISTERED），否则使用通用状态
    fn code(&self) -> String {
        self.details
            .iter()
            .find_map(|d| d.error_code.clone())
            .or_else(|| (!self.status.is_empty()).then(|| self.status.clone()))
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }
}

/// 单次请求的结果：token 级拒绝或整体失败
enum Attempt {
    Delivered(String),
    Rejected(String),
}

/// FCM HTTP v1 发送器
///
/// 中途出现整体失败时已投递的 token 不会回滚，上游重试会再次推送给它们，
/// 与重复投递事件可能产生重复通知的约定一致。
pub struct FcmPushSink {
    send_url: String,
    auth: Arc<dyn AccessTokenProvider>,
    http_client: reqwest::Client,
}

impl FcmPushSink {
    pub fn new(
        base_url: &str,
        project_id: &str,
        auth: Arc<dyn AccessTokenProvider>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            send_url: format!(
                "{}/projects/{}/messages:send",
                base_url.trim_end_matches('/'),
                project_id
            ),
            auth,
            http_client,
        }
    }

    async fn send_one(
        &self,
        access_token: &str,
        token: &str,
        payload: &NotificationPayload,
    ) -> Result<Attempt> {
        let request = FcmRequest {
            message: FcmMessage {
                token,
                notification: &payload.notification,
                data: FcmData {
                    kind: payload.data.kind.as_str(),
                    order_id: &payload.data.order_id,
                },
            },
        };

        let response = self
            .http_client
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| DispatchError::sink(format!("FCM 请求失败: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body: FcmResponse = response
                .json()
                .await
                .map_err(|e| DispatchError::sink(format!("FCM 响应解析失败: {e}")))?;
            return Ok(Attempt::Delivered(body.name));
        }

        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<FcmErrorResponse>(&text)
            .unwrap_or_default()
            .error;

        match status {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                let code = body.code();
                warn!(token = %token, code = %code, message = %body.message, "FCM 拒绝了该 token");
                Ok(Attempt::Rejected(code))
            }
            _ => Err(DispatchError::sink(format!("FCM 返回 {status}: {text}"))),
        }
    }
}

#[async_trait]
impl PushSink for FcmPushSink {
    async fn send(&self, tokens: &[String], payload: &NotificationPayload) -> Result<SendReport> {
        let access_token = self
            .auth
            .access_token()
            .await
            .map_err(|e| DispatchError::sink(e.to_string()))?;

        let mut results = Vec::with_capacity(tokens.len());
        for token in tokens {
            let result = match self.send_one(&access_token, token, payload).await {
                Ok(Attempt::Delivered(message_id)) => {
                    debug!(token = %token, message_id = %message_id, "FCM 推送已接受");
                    TokenResult::delivered(token.clone(), message_id)
                }
                Ok(Attempt::Rejected(code)) => TokenResult::rejected(token.clone(), code),
                Err(e) => {
                    error!(token = %token, error = %e, "FCM 推送失败");
                    return Err(e);
                }
            };
            results.push(result);
        }

        let report = SendReport::from_results(results);
        if report.success_count == 0 && report.failure_count > 0 {
            return Err(DispatchError::sink(format!(
                "全部 {} 个 token 被拒绝",
                report.failure_count
            )));
        }

        info!(
            order_id = %payload.data.order_id,
            success = report.success_count,
            failure = report.failure_count,
            "FCM 推送完成"
        );
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}
