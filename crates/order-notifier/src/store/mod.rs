//! 文档库抽象
//!
//! 通知服务只读取 `users` 与 `profiles` 两个集合，需要按键读取与列出全部文档
//! 两种能力。生产环境使用 Firestore REST，测试与本地运行使用内存实现。

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// 用户文档所在的集合
pub const USERS_COLLECTION: &str = "users";
/// 冗余保存推送 token 的备用集合
pub const PROFILES_COLLECTION: &str = "profiles";

/// 文档快照：文档 ID 加上已解码为 JSON 的字段
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// 读取非空字符串字段
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// 文档库接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 按键读取文档，不存在时返回 `None`
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// 列出集合中的全部文档
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;
}
