// thread_chat_client/src/ws_client/heartbeat.rs

//! 对端驱动的心跳看门狗。
//!
//! 每收到一个二进制探测帧就取消旧的截止时间并重新布置一个新的截止时间
//! (默认 6000 毫秒)，同时回送单字节探测帧 `[1]`。在截止时间之前没有收到新的探测帧，
//! 连接任务就会强制关闭传输。第一个探测帧到达之前看门狗处于未布置状态。
//! 任意时刻最多只有一个截止时间。

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Instant, Sleep};

/// 回送给对端的单字节探测帧内容。
pub const LIVENESS_PROBE: [u8; 1] = [1];

#[derive(Debug)]
pub struct LivenessWatchdog {
    window: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl LivenessWatchdog {
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 取消当前截止时间 (如有) 并从现在起重新布置一个。
    pub fn rearm(&mut self) {
        let next = Instant::now() + self.window;
        match self.deadline.as_mut() {
            Some(deadline) => deadline.as_mut().reset(next),
            None => self.deadline = Some(Box::pin(sleep(self.window))),
        }
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// 截止时间到达时完成，并把看门狗恢复为未布置状态。
    /// 未布置时永远不会完成，可以直接放进 `tokio::select!`。
    pub async fn expired(&mut self) {
        match self.deadline.as_mut() {
            Some(deadline) => {
                deadline.as_mut().await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
