//! 订单通知服务
//!
//! 订单创建或更新时解析应当收到通知的用户，查找其推送 token，
//! 生成通知负载并交给推送服务投递。

pub mod auth;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod fcm;
pub mod policy;
pub mod resolver;
pub mod sender;
pub mod store;
pub mod templates;

pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use error::{DispatchError, Result};
