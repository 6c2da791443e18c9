//! Firestore REST 文档库
//!
//! 通过 Firestore REST v1 读取文档。字段以带类型的值返回
//! （`stringValue`、`booleanValue` 等），在此解码为普通 JSON。
//! 未配置令牌提供者时不带鉴权头，用于连接本地模拟器。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{Document, DocumentStore};
use crate::auth::AccessTokenProvider;
use crate::error::{DispatchError, Result};

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

pub struct FirestoreStore {
    base_url: Url,
    project_id: String,
    page_size: u32,
    http_client: reqwest::Client,
    auth: Option<Arc<dyn AccessTokenProvider>>,
}

impl FirestoreStore {
    pub fn new(
        base_url: &str,
        project_id: impl Into<String>,
        page_size: u32,
        http_client: reqwest::Client,
        auth: Option<Arc<dyn AccessTokenProvider>>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DispatchError::Config(format!("Firestore 地址无效: {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(DispatchError::Config(format!(
                "Firestore 地址无效: {base_url}"
            )));
        }

        Ok(Self {
            base_url,
            project_id: project_id.into(),
            page_size: page_size.max(1),
            http_client,
            auth,
        })
    }

    /// `{base}/projects/{p}/databases/(default)/documents/{segments...}`
    fn documents_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // new() 已排除 cannot-be-a-base 地址
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["projects", self.project_id.as_str()])
                .extend(["databases", "(default)", "documents"])
                .extend(segments);
        }
        url
    }

    async fn request(
        &self,
        collection: &str,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response> {
        let mut request = self.http_client.get(url).query(query);
        if let Some(auth) = &self.auth {
            request = request.bearer_auth(auth.access_token().await?);
        }

        request
            .send()
            .await
            .map_err(|e| DispatchError::store(collection, format!("请求失败: {e}")))
    }
}

async fn error_body(collection: &str, response: reqwest::Response) -> DispatchError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    DispatchError::store(collection, format!("Firestore 返回 {status}: {body}"))
}

fn into_document(raw: RawDocument) -> Document {
    let id = raw.name.rsplit('/').next().unwrap_or_default().to_string();
    let fields = raw
        .fields
        .iter()
        .map(|(name, value)| (name.clone(), decode_value(value)))
        .collect();
    Document::new(id, fields)
}

/// 将 Firestore 的带类型值解码为普通 JSON
///
/// integerValue 在线上以字符串表示，解析失败时保留原字符串。
pub fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|obj| obj.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" | "booleanValue"
        | "doubleValue" | "geoPointValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| inner.clone()),
            other => other.clone(),
        },
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(k, v)| (k.clone(), decode_value(v)))
                        .collect::<Map<_, _>>()
                })
                .unwrap_or_default();
            Value::Object(fields)
        }
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default();
            Value::Array(values)
        }
        _ => Value::Null,
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let url = self.documents_url(&[collection, id]);
        let response = self.request(collection, url, &[]).await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(collection, id, "文档不存在");
                Ok(None)
            }
            status if status.is_success() => {
                let raw: RawDocument = response
                    .json()
                    .await
                    .map_err(|e| DispatchError::store(collection, format!("响应解析失败: {e}")))?;
                Ok(Some(into_document(raw)))
            }
            _ => Err(error_body(collection, response).await),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", self.page_size.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let url = self.documents_url(&[collection]);
            let response = self.request(collection, url, &query).await?;
            if !response.status().is_success() {
                return Err(error_body(collection, response).await);
            }

            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| DispatchError::store(collection, format!("响应解析失败: {e}")))?;

            documents.extend(page.documents.into_iter().map(into_document));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(collection, count = documents.len(), "已列出集合文档");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/projects/demo/databases/(default)/documents";

    fn store(server: &MockServer, auth: Option<Arc<dyn AccessTokenProvider>>) -> FirestoreStore {
        FirestoreStore::new(&server.uri(), "demo", 2, reqwest::Client::new(), auth).unwrap()
    }

    fn raw_doc(collection: &str, id: &str, token: &str) -> Value {
        json!({
            "name": format!("projects/demo/databases/(default)/documents/{collection}/{id}"),
            "fields": {"fcmToken": {"stringValue": token}},
            "createTime": "2025-01-15T10:30:00Z",
            "updateTime": "2025-01-15T10:30:00Z"
        })
    }

    #[test]
    fn test_decode_value() {
        assert_eq!(decode_value(&json!({"stringValue": "T1"})), json!("T1"));
        assert_eq!(decode_value(&json!({"booleanValue": true})), json!(true));
        assert_eq!(decode_value(&json!({"integerValue": "42"})), json!(42));
        assert_eq!(decode_value(&json!({"nullValue": null})), Value::Null);
        assert_eq!(
            decode_value(&json!({"mapValue": {"fields": {"paid": {"booleanValue": false}}}})),
            json!({"paid": false})
        );
        assert_eq!(
            decode_value(&json!({"arrayValue": {"values": [{"stringValue": "a"}, {"integerValue": "1"}]}})),
            json!(["a", 1])
        );
        assert_eq!(decode_value(&json!({"arrayValue": {}})), json!([]));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = FirestoreStore::new("not a url", "demo", 10, reqwest::Client::new(), None);
        assert!(matches!(result, Err(DispatchError::Config(_))));
    }

    #[tokio::test]
    async fn test_get_document_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/users/maria1720")))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(raw_doc("users", "maria1720", "T1")))
            .expect(1)
            .mount(&server)
            .await;

        let auth: Arc<dyn AccessTokenProvider> = Arc::new(StaticToken("ya29.test".to_string()));
        let doc = store(&server, Some(auth))
            .get("users", "maria1720")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(doc.id, "maria1720");
        assert_eq!(doc.str_field("fcmToken"), Some("T1"));
    }

    #[tokio::test]
    async fn test_get_missing_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/profiles/ghost")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "status": "NOT_FOUND"}
            })))
            .mount(&server)
            .await;

        let doc = store(&server, None).get("profiles", "ghost").await.unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_get_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = store(&server, None).get("users", "x").await.unwrap_err();
        assert!(matches!(err, DispatchError::Store { ref collection, .. } if collection == "users"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/users")))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [raw_doc("users", "c", "T3")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/users")))
            .and(query_param("pageSize", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [raw_doc("users", "a", "T1"), raw_doc("users", "b", "T2")],
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let docs = store(&server, None).list("users").await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_list_empty_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{DOCS}/profiles")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        assert!(store(&server, None).list("profiles").await.unwrap().is_empty());
    }
}
