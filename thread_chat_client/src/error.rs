// thread_chat_client/src/error.rs

//! 线程聊天客户端的错误类型。
//!
//! 所有公开操作在返回 `Err` 之前都已经把失败转换成了系统通知 (见 `event` 模块)，
//! 这里的错误只供调用方检查，不需要再向用户展示。

use rust_websocket_utils::error::WsError;
use thiserror::Error;

/// 凭据提供者的失败原因。
#[derive(Error, Debug)]
pub enum CredentialError {
    /// 该身份没有可用的令牌。
    #[error("身份 '{identity}' 没有可用的令牌")]
    NoCredential { identity: String },

    /// 凭据存储无法读取或内容无效。
    #[error("读取凭据存储失败: {0}")]
    Storage(String),
}

/// 连接管理器各操作可能返回的错误。
#[derive(Error, Debug)]
pub enum ChatClientError {
    /// 令牌获取失败，连接建立被中止，没有创建任何传输。
    #[error("凭据不可用: {0}")]
    CredentialUnavailable(#[from] CredentialError),

    /// 底层传输故障。
    #[error("传输错误: {0}")]
    Transport(#[from] WsError),

    /// 入站负载不是合法 JSON 或缺少必需字段。
    #[error("无法解析的入站帧: {0}")]
    MalformedFrame(String),

    /// 在没有打开的传输时调用了 `send_message`。
    #[error("连接未打开，消息未发送")]
    SendOnClosedConnection,

    /// 本次 `init_connection` 已被更新的 `init_connection` / `close_connection` 取代。
    #[error("连接请求 (第 {generation} 代) 已被后续请求取代")]
    Superseded { generation: u64 },

    /// 出站消息序列化失败。
    #[error("消息序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 主机配置无法构成合法的连接地址。
    #[error("无效的连接地址: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_error_converts_into_client_error() {
        let err: ChatClientError = CredentialError::NoCredential {
            identity: "bob".to_string(),
        }
        .into();
        assert!(matches!(err, ChatClientError::CredentialUnavailable(_)));
        assert!(err.to_string().contains("bob"));
    }
}
