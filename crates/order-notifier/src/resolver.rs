//! 推送 token 解析
//!
//! token 冗余保存在多个集合中，按顺序逐个尝试：单用户查询取第一个命中，
//! 广播时合并全部来源并去重，来源顺序决定优先级。

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::store::{Document, DocumentStore, PROFILES_COLLECTION, USERS_COLLECTION};

/// 用户文档中保存推送 token 的字段
pub const TOKEN_FIELD: &str = "fcmToken";

/// 单个 token 来源：某个文档库中的一个集合
#[derive(Clone)]
pub struct TokenSource {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl TokenSource {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn token_for(&self, user_id: &str) -> Result<Option<String>> {
        let doc = self.store.get(&self.collection, user_id).await?;
        Ok(doc.as_ref().and_then(token_of))
    }

    async fn all(&self) -> Result<Vec<Document>> {
        self.store.list(&self.collection).await
    }
}

fn token_of(doc: &Document) -> Option<String> {
    doc.str_field(TOKEN_FIELD).map(String::from)
}

/// token 解析器
#[derive(Clone)]
pub struct TokenResolver {
    sources: Vec<TokenSource>,
}

impl TokenResolver {
    pub fn new(sources: Vec<TokenSource>) -> Self {
        Self { sources }
    }

    /// 先查 `users`，再查 `profiles`
    pub fn users_then_profiles(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(vec![
            TokenSource::new(store.clone(), USERS_COLLECTION),
            TokenSource::new(store, PROFILES_COLLECTION),
        ])
    }

    /// 查找单个用户的 token，全部来源都没有时返回 `None`
    pub async fn token_for(&self, user_id: &str) -> Result<Option<String>> {
        for source in &self.sources {
            if let Some(token) = source.token_for(user_id).await? {
                debug!(user_id, collection = source.collection(), "找到推送 token");
                return Ok(Some(token));
            }
        }
        Ok(None)
    }

    /// 所有来源中除 `excluded` 文档之外的 token，按来源顺序去重
    pub async fn all_tokens_except(&self, excluded: &[&str]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut tokens = Vec::new();

        for source in &self.sources {
            for doc in source.all().await? {
                if excluded.contains(&doc.id.as_str()) {
                    continue;
                }
                if let Some(token) = token_of(&doc)
                    && seen.insert(token.clone())
                {
                    tokens.push(token);
                }
            }
        }

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::store::{MemoryStore, MockDocumentStore};

    fn resolver(store: &MemoryStore) -> TokenResolver {
        TokenResolver::users_then_profiles(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_users_takes_precedence() {
        let store = MemoryStore::new();
        store.insert_token("users", "maria1720", "from-users");
        store.insert_token("profiles", "maria1720", "from-profiles");

        let token = resolver(&store).token_for("maria1720").await.unwrap();
        assert_eq!(token.as_deref(), Some("from-users"));
    }

    #[tokio::test]
    async fn test_falls_back_to_profiles() {
        let store = MemoryStore::new();
        // users 中存在文档但没有 token
        store.insert("users", "maria1720", serde_json::json!({"displayName": "Luisa"}));
        store.insert_token("profiles", "maria1720", "from-profiles");

        let token = resolver(&store).token_for("maria1720").await.unwrap();
        assert_eq!(token.as_deref(), Some("from-profiles"));
    }

    #[tokio::test]
    async fn test_empty_token_is_a_miss() {
        let store = MemoryStore::new();
        store.insert_token("users", "maria1720", "");

        let token = resolver(&store).token_for("maria1720").await.unwrap();
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn test_all_tokens_deduplicated_and_owner_excluded() {
        let store = MemoryStore::new();
        store.insert_token("users", "ana", "T-ana");
        store.insert_token("users", "luis", "T-luis");
        store.insert_token("users", "owner", "T-owner");
        store.insert_token("profiles", "ana", "T-ana");
        store.insert_token("profiles", "owner", "T-owner-profile");
        store.insert_token("profiles", "pia", "T-pia");
        store.insert("profiles", "sin-token", serde_json::json!({}));

        let tokens = resolver(&store).all_tokens_except(&["owner"]).await.unwrap();
        assert_eq!(tokens, vec!["T-ana", "T-luis", "T-pia"]);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let mut mock = MockDocumentStore::new();
        mock.expect_get()
            .returning(|collection, _| Err(DispatchError::store(collection, "超时")));

        let resolver = TokenResolver::users_then_profiles(Arc::new(mock));
        let err = resolver.token_for("maria1720").await.unwrap_err();
        assert!(matches!(err, DispatchError::Store { .. }));
    }

    #[tokio::test]
    async fn test_single_source_resolver() {
        let store = MemoryStore::new();
        store.insert_token("profiles", "ana", "T");

        let resolver = TokenResolver::new(vec![TokenSource::new(Arc::new(store), "users")]);
        assert!(resolver.token_for("ana").await.unwrap().is_none());
    }
}
