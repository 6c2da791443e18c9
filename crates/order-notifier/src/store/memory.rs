//! 内存文档库
//!
//! 使用 DashMap 保存各集合，集合内按文档 ID 排序，保证列表顺序稳定。
//! 适用于测试和本地开发。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};

use super::{Document, DocumentStore};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Arc<DashMap<String, BTreeMap<String, Map<String, Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或覆盖文档，非对象的 `fields` 按空文档处理
    pub fn insert(&self, collection: &str, id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// 写入只含 `fcmToken` 字段的文档
    pub fn insert_token(&self, collection: &str, id: &str, token: &str) {
        self.insert(collection, id, serde_json::json!({ "fcmToken": token }));
    }

    pub fn remove(&self, collection: &str, id: &str) -> bool {
        self.collections
            .get_mut(collection)
            .is_some_and(|mut docs| docs.remove(id).is_some())
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).cloned())
            .map(|fields| Document::new(id, fields)))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_and_list() {
        let store = MemoryStore::new();
        store.insert_token("users", "maria1720", "T1");
        store.insert_token("users", "david1720", "T2");

        let doc = store.get("users", "maria1720").await.unwrap().unwrap();
        assert_eq!(doc.str_field("fcmToken"), Some("T1"));
        assert!(store.get("users", "nobody").await.unwrap().is_none());
        assert!(store.get("profiles", "maria1720").await.unwrap().is_none());

        let ids: Vec<_> = store
            .list("users")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["david1720", "maria1720"]);
        assert!(store.list("profiles").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_overwrites_and_remove() {
        let store = MemoryStore::new();
        store.insert_token("profiles", "ana", "old");
        store.insert_token("profiles", "ana", "new");
        assert_eq!(store.count("profiles"), 1);

        let doc = store.get("profiles", "ana").await.unwrap().unwrap();
        assert_eq!(doc.str_field("fcmToken"), Some("new"));

        assert!(store.remove("profiles", "ana"));
        assert!(!store.remove("profiles", "ana"));
        assert_eq!(store.count("profiles"), 0);
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = MemoryStore::new();
        let clone = store.clone();
        clone.insert("users", "x", serde_json::json!({"name": "X"}));
        assert_eq!(store.count("users"), 1);
    }
}
