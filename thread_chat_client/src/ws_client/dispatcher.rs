// thread_chat_client/src/ws_client/dispatcher.rs

//! 入站帧分发。
//!
//! 二进制帧一律视为心跳探测，由连接任务负责重置看门狗并回送探测帧；
//! 文本帧按 `type` 字段解码为聊天信封，按到达顺序广播给所有订阅者。
//! 无法解码的文本帧只记录日志后丢弃，既不投递也不影响连接。

use common_models::{ChatEnvelope, InboundPayload};
use log::{debug, warn};
use rust_websocket_utils::client::transport::IncomingFrame;

use crate::error::ChatClientError;
use crate::subscription::SubscriberRegistry;

/// 单个入站帧的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 二进制探测帧。
    LivenessProbe,
    /// 文本帧已解码，投递了这么多条信封。
    Delivered(usize),
    /// 文本帧无法解码，已丢弃。
    Dropped,
}

#[derive(Clone)]
pub struct FrameDispatcher {
    envelopes: SubscriberRegistry<ChatEnvelope>,
}

impl FrameDispatcher {
    pub fn new(envelopes: SubscriberRegistry<ChatEnvelope>) -> Self {
        Self { envelopes }
    }

    /// 把文本帧解码为按顺序排列的、可投递的信封。
    ///
    /// 整帧解码失败时返回 `MalformedFrame`；解码成功但发送者或线程为保留值 `0`
    /// 的单条信封会被单独过滤掉。
    pub fn decode_text(text: &str) -> Result<Vec<ChatEnvelope>, ChatClientError> {
        let payload = InboundPayload::from_json(text).map_err(|e| ChatClientError::MalformedFrame(e.to_string()))?;
        let (deliverable, rejected): (Vec<_>, Vec<_>) =
            payload.into_envelopes().into_iter().partition(ChatEnvelope::is_deliverable);
        if !rejected.is_empty() {
            warn!("[帧分发] 丢弃 {} 条缺少发送者或线程标识的信封", rejected.len());
        }
        Ok(deliverable)
    }

    pub fn dispatch(&self, frame: &IncomingFrame) -> DispatchOutcome {
        match frame {
            IncomingFrame::Binary(data) => {
                debug!("[帧分发] 收到二进制探测帧 ({} 字节)", data.len());
                DispatchOutcome::LivenessProbe
            }
            IncomingFrame::Text(text) => match Self::decode_text(text) {
                Ok(envelopes) => {
                    for envelope in &envelopes {
                        self.envelopes.publish(envelope);
                    }
                    debug!("[帧分发] 投递了 {} 条信封", envelopes.len());
                    DispatchOutcome::Delivered(envelopes.len())
                }
                Err(e) => {
                    warn!(
                        "[帧分发] 丢弃无法解析的文本帧: {}. 内容摘要: '{}'",
                        e,
                        text.chars().take(100).collect::<String>()
                    );
                    DispatchOutcome::Dropped
                }
            },
        }
    }
}
