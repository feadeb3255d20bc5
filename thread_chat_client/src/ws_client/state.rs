// thread_chat_client/src/ws_client/state.rs

//! 逻辑连接的状态机。
//!
//! ```text
//! Idle --InitRequested--> Connecting --TransportOpened--> Open
//! Connecting --TransportFailed / CredentialFailed--> Closed
//! Open --PeerClosed / TransportFailed / LivenessExpired--> Closed
//! Connecting / Open --CloseRequested--> Closed
//! 任意状态 --InitRequested--> Connecting (替换当前传输)
//! ```
//!
//! 表中没有的转换一律视为无操作。

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    InitRequested,
    TransportOpened,
    TransportFailed,
    CredentialFailed,
    PeerClosed,
    LivenessExpired,
    CloseRequested,
}

impl ConnectionState {
    /// 合法转换表。返回 `None` 表示该事件在当前状态下不产生转换。
    pub fn next(self, event: ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent::*;
        use ConnectionState::*;
        match (self, event) {
            (_, InitRequested) => Some(Connecting),
            (Connecting, TransportOpened) => Some(Open),
            (Connecting, TransportFailed | CredentialFailed) => Some(Closed),
            (Open, PeerClosed | TransportFailed | LivenessExpired) => Some(Closed),
            (Connecting | Open, CloseRequested) => Some(Closed),
            _ => None,
        }
    }

    /// 应用事件；非法转换保持原状态并记录调试日志。
    pub fn apply(&mut self, event: ConnectionEvent) -> bool {
        match self.next(event) {
            Some(next) => {
                debug!("[状态机] {:?} --{:?}--> {:?}", self, event, next);
                *self = next;
                true
            }
            None => {
                debug!("[状态机] 忽略状态 {:?} 下的事件 {:?}", self, event);
                false
            }
        }
    }

    /// 只有 `Open` 状态允许发送消息。
    pub fn can_send(self) -> bool {
        self == ConnectionState::Open
    }
}
