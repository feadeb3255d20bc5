// common_models/src/user_models.rs

//! 用户与会话线程相关的基础模型。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 用户标识符。线路上表示为 JSON 数字。
///
/// `0` 保留给本地系统消息，不是合法的发送者。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// 会话线程标识符。线路上表示为 JSON 数字，一个线程对应一条逻辑连接。
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ThreadId(pub u64);

impl UserId {
    /// 是否为可投递的发送者 (非保留值 `0`)。
    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl ThreadId {
    /// 是否为可投递的线程 (非保留值 `0`)。
    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        UserId(value)
    }
}

impl From<u64> for ThreadId {
    fn from(value: u64) -> Self {
        ThreadId(value)
    }
}

/// 用户列表接口返回的单个条目，例如 `{"id": 1, "username": "alice"}`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    /// 用户 ID。
    pub id: UserId,
    /// 显示用的用户名。
    pub username: String,
}
