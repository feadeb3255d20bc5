// thread_chat_client/src/event.rs

//! 系统通知定义。
//!
//! 系统通知是与聊天消息流分开的一条广播通道，承载面向用户的连接状态文本
//! (连接建立、连接关闭、传输错误、未连接时发送等)，由 UI 层自行决定如何展示。

use std::fmt;

use chrono::{DateTime, Utc};
use common_models::ThreadId;

/// 传输关闭的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// 对端发送了 Close 帧或断开了连接。
    PeerClosed,
    /// 本地调用了 `close_connection` 或被新的 `init_connection` 替换。
    LocalClose,
    /// 心跳窗口内没有收到探测帧，本地强制关闭。
    SilentPeerTimeout,
    /// 读写过程中发生了传输故障。
    TransportFailure,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::PeerClosed => "peer closed",
            CloseReason::LocalClose => "local close",
            CloseReason::SilentPeerTimeout => "silent peer timeout",
            CloseReason::TransportFailure => "transport failure",
        };
        f.write_str(text)
    }
}

/// 通知种类。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    ConnectionEstablished { thread_id: ThreadId },
    ConnectionClosed { thread_id: ThreadId, reason: CloseReason },
    /// 传输层故障，`detail` 仅用于日志与调试。
    TransportError { detail: String },
    /// 在连接未打开时尝试发送消息。
    NotOpen,
    /// 凭据获取失败或连接地址无效，连接未能开始建立。
    InitFailed { detail: String },
}

/// 一条系统通知。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemNotice {
    pub kind: NoticeKind,
    pub emitted_at: DateTime<Utc>,
}

impl SystemNotice {
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            kind,
            emitted_at: Utc::now(),
        }
    }
}

impl fmt::Display for SystemNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NoticeKind::ConnectionEstablished { thread_id } => {
                write!(f, "WebSocket connection established for thread id {}", thread_id)
            }
            NoticeKind::ConnectionClosed { thread_id, .. } => {
                write!(f, "WebSocket connection closed for thread id {}", thread_id)
            }
            NoticeKind::TransportError { .. } => f.write_str("WebSocket error"),
            NoticeKind::NotOpen => f.write_str("WebSocket connection not open"),
            NoticeKind::InitFailed { .. } => f.write_str("Failed to initialize WebSocket connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_texts() {
        let cases = [
            (
                NoticeKind::ConnectionEstablished { thread_id: ThreadId(7) },
                "WebSocket connection established for thread id 7",
            ),
            (
                NoticeKind::ConnectionClosed {
                    thread_id: ThreadId(7),
                    reason: CloseReason::PeerClosed,
                },
                "WebSocket connection closed for thread id 7",
            ),
            (NoticeKind::TransportError { detail: "io".into() }, "WebSocket error"),
            (NoticeKind::NotOpen, "WebSocket connection not open"),
            (
                NoticeKind::InitFailed { detail: "no token".into() },
                "Failed to initialize WebSocket connection",
            ),
        ];
        for (kind, text) in cases {
            assert_eq!(SystemNotice::new(kind).to_string(), text);
        }
    }
}
