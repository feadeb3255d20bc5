// thread_chat_client/src/credential.rs

//! 凭据提供者。
//!
//! 连接管理器在打开传输之前通过 `CredentialProvider::fetch_token` 异步获取不透明的令牌，
//! 令牌本身不做校验，原样放入连接地址的 `at` 查询参数。

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use common_models::UserId;
use log::debug;
use serde::Deserialize;

use crate::error::CredentialError;

/// 为指定身份提供令牌的外部协作者。
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch_token(&self, identity: &str) -> Result<String, CredentialError>;
}

/// 内存中的身份到令牌映射。
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    tokens: HashMap<String, String>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, identity: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(identity.into(), token.into());
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn fetch_token(&self, identity: &str) -> Result<String, CredentialError> {
        self.tokens
            .get(identity)
            .cloned()
            .ok_or_else(|| CredentialError::NoCredential {
                identity: identity.to_string(),
            })
    }
}

/// 凭据文件中单个身份的条目。
#[derive(Deserialize, Debug, Clone)]
struct StoredCredential {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user_id: Option<UserId>,
}

/// 从本地 JSON 偏好文件读取令牌，文件形如
/// `{"user": {"token": "...", "user_id": 3}}`。
///
/// 每次获取都重新读取文件，以便外部登录流程更新令牌后立即生效。
#[derive(Debug, Clone)]
pub struct FileCredentialProvider {
    path: PathBuf,
}

impl FileCredentialProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 该身份登录时保存的用户 ID。
    pub async fn stored_user_id(&self, identity: &str) -> Result<Option<UserId>, CredentialError> {
        Ok(self.read_store().await?.and_then(|mut store| store.remove(identity)).and_then(|entry| entry.user_id))
    }

    /// 读取整个凭据文件；文件不存在时返回 `None`。
    async fn read_store(&self) -> Result<Option<HashMap<String, StoredCredential>>, CredentialError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("[凭据] 凭据文件 {} 不存在", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(CredentialError::Storage(format!("{}: {}", self.path.display(), e)));
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CredentialError::Storage(format!("{}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn fetch_token(&self, identity: &str) -> Result<String, CredentialError> {
        let token = self
            .read_store()
            .await?
            .and_then(|mut store| store.remove(identity))
            .and_then(|entry| entry.token)
            .filter(|token| !token.is_empty());
        token.ok_or_else(|| CredentialError::NoCredential {
            identity: identity.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("thread_chat_{}_{}.json", name, std::process::id()));
        std::fs::write(&path, contents).expect("写入临时凭据文件失败");
        path
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticCredentialProvider::new().with_token("alice", "tok-a");
        assert_eq!(provider.fetch_token("alice").await.unwrap(), "tok-a");
        assert!(matches!(
            provider.fetch_token("bob").await,
            Err(CredentialError::NoCredential { identity }) if identity == "bob"
        ));
    }

    #[tokio::test]
    async fn test_file_provider_reads_token_and_user_id() {
        let path = temp_file(
            "read",
            r#"{"user":{"token":"abc","user_id":3},"guest":{"token":""},"legacy":{"user_id":9}}"#,
        );
        let provider = FileCredentialProvider::new(&path);

        assert_eq!(provider.fetch_token("user").await.unwrap(), "abc");
        assert_eq!(provider.stored_user_id("user").await.unwrap(), Some(UserId(3)));
        // 空令牌与缺失令牌都视为没有凭据
        assert!(matches!(provider.fetch_token("guest").await, Err(CredentialError::NoCredential { .. })));
        assert!(matches!(provider.fetch_token("legacy").await, Err(CredentialError::NoCredential { .. })));
        assert!(matches!(provider.fetch_token("nobody").await, Err(CredentialError::NoCredential { .. })));

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_file_provider_missing_and_corrupt_files() {
        let missing = FileCredentialProvider::new(std::env::temp_dir().join("thread_chat_no_such_file.json"));
        assert!(matches!(missing.fetch_token("user").await, Err(CredentialError::NoCredential { .. })));
        assert_eq!(missing.stored_user_id("user").await.unwrap(), None);

        let path = temp_file("corrupt", "{not json");
        let corrupt = FileCredentialProvider::new(&path);
        assert!(matches!(corrupt.fetch_token("user").await, Err(CredentialError::Storage(_))));
        let _ = std::fs::remove_file(path);
    }
}
