// thread_chat_client/src/participants.rs

//! 参与者目录：`UserId` 到用户名的本地映射。
//!
//! 出站消息的 `senderUsername` 总是在本地解析，不信任调用方传入的值。
//! 目录可由配置中的参与者列表或用户列表接口返回的 JSON 文档填充。

use std::collections::HashMap;
use std::sync::RwLock;

use common_models::{UserId, UserSummary};

/// 无法解析时使用的用户名。
pub const UNKNOWN_USERNAME: &str = "unknown";

#[derive(Debug, Default)]
pub struct ParticipantDirectory {
    names: RwLock<HashMap<UserId, String>>,
}

impl ParticipantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_summaries(summaries: impl IntoIterator<Item = UserSummary>) -> Self {
        let directory = Self::new();
        directory.extend(summaries);
        directory
    }

    /// 解析用户列表文档，例如 `[{"id":1,"username":"alice"}]`。
    pub fn from_user_list_json(raw: &str) -> Result<Self, serde_json::Error> {
        let summaries: Vec<UserSummary> = serde_json::from_str(raw)?;
        Ok(Self::from_summaries(summaries))
    }

    /// 已知用户名，未知时返回 `"unknown"`。
    pub fn resolve(&self, id: UserId) -> String {
        let names = self.names.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        names.get(&id).cloned().unwrap_or_else(|| UNKNOWN_USERNAME.to_string())
    }

    /// 插入或更新一个参与者，返回旧的用户名。
    pub fn insert(&self, id: UserId, username: impl Into<String>) -> Option<String> {
        let mut names = self.names.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        names.insert(id, username.into())
    }

    pub fn extend(&self, summaries: impl IntoIterator<Item = UserSummary>) {
        let mut names = self.names.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        names.extend(summaries.into_iter().map(|s| (s.id, s.username)));
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_and_unknown() {
        let directory = ParticipantDirectory::from_user_list_json(
            r#"[{"id":1,"username":"alice"},{"id":2,"username":"bob"}]"#,
        )
        .expect("用户列表应能解析");
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.resolve(UserId(2)), "bob");
        assert_eq!(directory.resolve(UserId(99)), UNKNOWN_USERNAME);
    }

    #[test]
    fn test_insert_updates_existing_entry() {
        let directory = ParticipantDirectory::new();
        assert!(directory.is_empty());
        assert_eq!(directory.insert(UserId(1), "alice"), None);
        assert_eq!(directory.insert(UserId(1), "alice2"), Some("alice".to_string()));
        assert_eq!(directory.resolve(UserId(1)), "alice2");
    }

    #[test]
    fn test_poisoned_directory_keeps_its_entries() {
        let directory = std::sync::Arc::new(ParticipantDirectory::from_summaries(vec![UserSummary {
            id: UserId(1),
            username: "alice".to_string(),
        }]));
        let holder = std::sync::Arc::clone(&directory);
        let _ = std::thread::spawn(move || {
            let _guard = holder.names.write().unwrap();
            panic!("持有写锁时崩溃");
        })
        .join();

        assert!(directory.names.is_poisoned());
        assert_eq!(directory.len(), 1);
        assert!(!directory.is_empty());
        assert_eq!(directory.resolve(UserId(1)), "alice");
    }

    #[test]
    fn test_bad_user_list_is_rejected() {
        assert!(ParticipantDirectory::from_user_list_json(r#"[{"id":"x"}]"#).is_err());
    }
}
