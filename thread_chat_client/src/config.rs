// thread_chat_client/src/config.rs

//! 客户端配置信息。
//!
//! 配置来自 `config/thread_chat_config.json` (不存在时使用默认值)，随后由环境变量覆盖：
//! `THREAD_CHAT_HOST`、`THREAD_CHAT_SECURE`、`THREAD_CHAT_IDENTITY`。

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use common_models::{ThreadId, UserSummary};
use log::{info, warn};
use serde::Deserialize;
use url::Url;

use crate::error::ChatClientError;

pub const DEFAULT_HOST: &str = "127.0.0.1:3107";
pub const DEFAULT_IDENTITY: &str = "user";
/// 心跳窗口，单位：毫秒。
pub const DEFAULT_LIVENESS_TIMEOUT_MS: u64 = 6000;
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 2000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CONFIG_PATH: &str = "config/thread_chat_config.json";
pub const DEFAULT_CREDENTIALS_PATH: &str = "config/credentials.json";

/// 线程聊天客户端配置。
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChatClientConfig {
    /// 后端主机地址，可带端口，例如 `chat.example.com` 或 `127.0.0.1:3107`。
    pub host: String,
    /// `true` 使用 `wss`，否则使用 `ws`。
    pub secure: bool,
    /// 在凭据存储中查找令牌所用的身份键。
    pub identity: String,
    pub liveness_timeout_ms: u64,
    /// 关闭连接时等待连接任务退出的上限。
    pub close_grace_ms: u64,
    pub connect_timeout_ms: u64,
    pub credentials_path: PathBuf,
    /// 已知的参与者，用于解析出站消息的用户名。
    pub participants: Vec<UserSummary>,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        ChatClientConfig {
            host: DEFAULT_HOST.to_string(),
            secure: false,
            identity: DEFAULT_IDENTITY.to_string(),
            liveness_timeout_ms: DEFAULT_LIVENESS_TIMEOUT_MS,
            close_grace_ms: DEFAULT_CLOSE_GRACE_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            participants: Vec::new(),
        }
    }
}

impl ChatClientConfig {
    /// 从默认路径加载配置并应用环境变量覆盖。
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// 从指定路径加载配置并应用环境变量覆盖。文件不存在时使用默认值。
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("读取配置文件 {} 失败", path.display()))?;
            Self::from_json_str(&raw).with_context(|| format!("解析配置文件 {} 失败", path.display()))?
        } else {
            warn!("配置文件 {} 不存在，使用默认配置", path.display());
            Self::default()
        };
        config.apply_env_overrides()?;
        info!(
            "线程聊天配置已加载: host={}, secure={}, identity={}, liveness_timeout_ms={}",
            config.host, config.secure, config.identity, config.liveness_timeout_ms
        );
        Ok(config)
    }

    /// 解析 JSON 配置文档，缺失的字段取默认值。
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("配置文档不是合法的 JSON 或字段类型不匹配")
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("THREAD_CHAT_HOST") {
            self.host = host;
        }
        if let Ok(secure) = std::env::var("THREAD_CHAT_SECURE") {
            self.secure = parse_flag(&secure)
                .with_context(|| format!("THREAD_CHAT_SECURE 的值 '{}' 不是合法的布尔值", secure))?;
        }
        if let Ok(identity) = std::env::var("THREAD_CHAT_IDENTITY") {
            self.identity = identity;
        }
        Ok(())
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 构造线程连接地址 `ws(s)://<host>/thread/<threadId>?at=<token>`。
    ///
    /// 线程 ID 与令牌都作为 URL 组成部分编码，不做字符串拼接。
    pub fn thread_url(&self, thread_id: ThreadId, token: &str) -> Result<Url, ChatClientError> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let base = format!("{}://{}/", scheme, self.host);
        let mut url = Url::parse(&base).map_err(|e| ChatClientError::InvalidAddress(format!("{}: {}", self.host, e)))?;
        // host 中混入路径、查询或凭据时拒绝
        if url.host_str().is_none()
            || url.path() != "/"
            || url.query().is_some()
            || url.fragment().is_some()
            || !url.username().is_empty()
        {
            return Err(ChatClientError::InvalidAddress(self.host.clone()));
        }
        url.path_segments_mut()
            .map_err(|_| ChatClientError::InvalidAddress(self.host.clone()))?
            .pop_if_empty()
            .push("thread")
            .push(&thread_id.to_string());
        url.query_pairs_mut().append_pair("at", token);
        Ok(url)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
