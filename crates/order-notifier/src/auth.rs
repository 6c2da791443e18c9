//! Google 服务账号鉴权
//!
//! 用服务账号私钥签发 RS256 JWT，换取 OAuth2 访问令牌并缓存到过期前 60 秒。
//! Firestore 与 FCM 共用同一个令牌提供者。

use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DispatchError, Result};

/// Firestore（cloud-platform）与 FCM 所需的权限范围
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/firebase.messaging",
];

/// 提前刷新的余量（秒）
const REFRESH_MARGIN_SECS: i64 = 60;

/// 访问令牌提供者
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// 固定令牌，用于本地调试或外部已注入令牌的环境
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// 服务账号密钥（只保留签发 JWT 需要的字段）
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DispatchError::Config(format!("服务账号密钥格式错误: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Config(format!("读取服务账号密钥失败: {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// 基于服务账号的 OAuth2 令牌提供者
///
/// 换取令牌期间持有缓存锁，`http_client` 必须配置请求超时。
pub struct GoogleAuth {
    key: ServiceAccountKey,
    scope: String,
    http_client: reqwest::Client,
    // 刷新期间持锁，避免并发调用重复换取令牌
    cache: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    pub fn new(key: ServiceAccountKey, http_client: reqwest::Client) -> Self {
        Self {
            key,
            scope: DEFAULT_SCOPES.join(" "),
            http_client,
            cache: Mutex::new(None),
        }
    }

    fn sign_assertion(&self) -> Result<String> {
        let now = Utc::now();
        let claims = JwtClaims {
            iss: &self.key.client_email,
            sub: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };

        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| DispatchError::Auth(format!("私钥解析失败: {e}")))?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key.private_key_id.clone());

        encode(&header, &claims, &encoding_key)
            .map_err(|e| DispatchError::Auth(format!("JWT 签名失败: {e}")))
    }

    async fn exchange(&self) -> Result<CachedToken> {
        let assertion = self.sign_assertion()?;
        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| DispatchError::Auth(format!("令牌请求失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Auth(format!("令牌请求返回 {status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Auth(format!("令牌响应解析失败: {e}")))?;

        info!(
            client_email = %self.key.client_email,
            expires_in = token.expires_in,
            "已获取新的访问令牌"
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now().timestamp() + token.expires_in,
        })
    }
}

#[async_trait]
impl AccessTokenProvider for GoogleAuth {
    async fn access_token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref()
            && cached.expires_at > Utc::now().timestamp() + REFRESH_MARGIN_SECS
        {
            debug!("使用缓存的访问令牌");
            return Ok(cached.access_token.clone());
        }

        let fresh = self.exchange().await?;
        let token = fresh.access_token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}
