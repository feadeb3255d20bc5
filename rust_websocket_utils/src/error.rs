// rust_websocket_utils/src/error.rs

//! 定义 WebSocket 工具库相关的错误类型。

use thiserror::Error;

/// 传输层的统一错误类型。`ClientConnection` 的发送端与接收端都使用它作为错误类型。
#[derive(Error, Debug)]
pub enum WsError {
    /// 握手、读写帧时来自 tungstenite 的错误。
    #[error("WebSocket协议错误: {0}")]
    WebSocketProtocolError(#[from] tokio_tungstenite::tungstenite::Error),

    /// 建立 TCP 连接等底层 I/O 失败 (回环连接器注入的失败也表示为此类)。
    #[error("I/O错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 对端已不再接收帧。
    #[error("发送错误: 通道已关闭")]
    SendErrorClosed,

    /// 握手没有在限定时间内完成。
    #[error("连接超时")]
    ConnectionTimeout,

    /// 一次写操作 (含 Close 帧) 没有在限定时间内完成，通常意味着对端已经不再读取。
    #[error("写入超时")]
    WriteTimeout,

    /// URL 协议不是 `ws` / `wss`。
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    /// 发送方向已经被本端关闭。
    #[error("未连接")]
    NotConnected,

    #[error("消息错误: {0}")]
    Message(String),
}

impl WsError {
    /// 该错误是否只是表示连接已经正常结束 (而非故障)。
    pub fn is_connection_closed(&self) -> bool {
        matches!(
            self,
            WsError::WebSocketProtocolError(
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::AlreadyClosed
            ) | WsError::SendErrorClosed
        )
    }
}
