//! 收件人策略
//!
//! 两个固定用户互为通知对象，另有显示名到用户标识的别名表。
//! 策略由配置注入，下单人不属于配对且别名也无法解析时返回 `None`，
//! 由分发器退化为广播。

use std::collections::HashMap;

use notify_shared::config::RecipientConfig;

use crate::error::{DispatchError, Result};

/// 收件人的解析方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// 下单人直接命中配对
    Paired,
    /// 通过显示名别名命中
    Aliased,
    /// 未解析出收件人，通知所有其他用户
    Broadcast,
}

impl ResolutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paired => "paired",
            Self::Aliased => "aliased",
            Self::Broadcast => "broadcast",
        }
    }
}

/// 解析出的唯一收件人
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub recipient: String,
    pub mode: ResolutionMode,
}

#[derive(Debug, Clone)]
pub struct RecipientPolicy {
    pair: (String, String),
    aliases: HashMap<String, String>,
}

impl RecipientPolicy {
    /// 配对两端必须非空且互不相同
    pub fn new(pair: (String, String), aliases: HashMap<String, String>) -> Result<Self> {
        if pair.0.is_empty() || pair.1.is_empty() {
            return Err(DispatchError::Config("配对用户标识不能为空".to_string()));
        }
        if pair.0 == pair.1 {
            return Err(DispatchError::Config(format!(
                "配对两端不能是同一用户: {}",
                pair.0
            )));
        }
        Ok(Self { pair, aliases })
    }

    pub fn from_config(config: &RecipientConfig) -> Result<Self> {
        let [a, b] = config.pair.as_slice() else {
            return Err(DispatchError::Config(format!(
                "recipients.pair 需要恰好两个用户标识，实际为 {}",
                config.pair.len()
            )));
        };

        let aliases = config
            .aliases
            .iter()
            .map(|entry| (entry.display_name.clone(), entry.user_id.clone()))
            .collect();

        Self::new((a.clone(), b.clone()), aliases)
    }

    /// 配对中另一方的标识
    pub fn partner_of(&self, user_id: &str) -> Option<&str> {
        if user_id == self.pair.0 {
            Some(&self.pair.1)
        } else if user_id == self.pair.1 {
            Some(&self.pair.0)
        } else {
            None
        }
    }

    /// 仅按配对解析（订单创建）
    pub fn resolve_direct(&self, owner: &str) -> Option<Resolution> {
        self.partner_of(owner).map(|partner| Resolution {
            recipient: partner.to_string(),
            mode: ResolutionMode::Paired,
        })
    }

    /// 先按配对解析，失败后查别名表（订单更新）
    ///
    /// 别名指向配对成员时收件人为其配对方；指向配对之外的用户时，
    /// 收件人就是该用户本身。
    pub fn resolve_with_aliases(&self, owner: &str) -> Option<Resolution> {
        if let Some(resolution) = self.resolve_direct(owner) {
            return Some(resolution);
        }

        let aliased = self.aliases.get(owner)?;
        let recipient = self.partner_of(aliased).unwrap_or(aliased.as_str());
        Some(Resolution {
            recipient: recipient.to_string(),
            mode: ResolutionMode::Aliased,
        })
    }
}
