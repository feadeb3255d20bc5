// common_models/src/ws_payloads.rs

//! WebSocket 文本帧中使用的 JSON 负载结构。
//!
//! 后端的所有文本帧都是带 `type` 判别字段的 JSON 对象：
//! - `{"type":"message", senderId, senderUsername, content, threadId}`: 单条聊天消息。
//! - `{"type":"threadMessages", "messages":[...]}`: 一批历史消息，按顺序排列。
//!
//! 解码采用显式的带标签枚举，任何不符合结构的负载都会解码失败并被调用方丢弃，
//! 不会以"部分类型化"的形式继续向下传递。

use serde::{Deserialize, Serialize};

use crate::user_models::{ThreadId, UserId};

/// 聊天消息信封。
///
/// 入站时由服务器发送，出站时由本地构造 (此时 `sender_username` 来自本地参与者目录，
/// 而不是信任调用方或线路上的值)。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEnvelope {
    /// 发送者 ID。
    pub sender_id: UserId,
    /// 发送者显示名。
    pub sender_username: String,
    /// 消息正文。
    pub content: String,
    /// 所属线程 ID。
    pub thread_id: ThreadId,
}

impl ChatEnvelope {
    /// 信封是否可以投递给订阅者：发送者与线程都必须是已分配的 (非 0) 标识符。
    pub fn is_deliverable(&self) -> bool {
        self.sender_id.is_assigned() && self.thread_id.is_assigned()
    }
}

/// 入站文本帧，按 `type` 字段区分。
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum InboundPayload {
    /// 单条消息，信封字段与 `type` 位于同一层级。
    #[serde(rename = "message")]
    Message(ChatEnvelope),
    /// 历史消息批次，`messages` 中的顺序即投递顺序。
    #[serde(rename = "threadMessages")]
    ThreadMessages { messages: Vec<ChatEnvelope> },
}

impl InboundPayload {
    /// 从文本帧解码。失败时返回 `serde_json::Error`，由调用方决定丢弃与记录。
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// 展开为按顺序排列的信封列表。
    pub fn into_envelopes(self) -> Vec<ChatEnvelope> {
        match self {
            InboundPayload::Message(envelope) => vec![envelope],
            InboundPayload::ThreadMessages { messages } => messages,
        }
    }
}

/// 出站文本帧。目前客户端只发送 `message` 一种类型。
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum OutboundPayload {
    #[serde(rename = "message")]
    Message(ChatEnvelope),
}

impl OutboundPayload {
    /// 序列化为 JSON 字符串，准备作为文本帧发送。
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(sender: u64, name: &str, content: &str, thread: u64) -> ChatEnvelope {
        ChatEnvelope {
            sender_id: UserId(sender),
            sender_username: name.to_string(),
            content: content.to_string(),
            thread_id: ThreadId(thread),
        }
    }

    #[test]
    fn test_outbound_message_matches_documented_wire_shape() {
        let payload = OutboundPayload::Message(envelope(1, "alice", "hi", 7));
        let json = payload.to_json().expect("出站消息序列化失败");
        // 判别字段在前，字段名与值类型都必须与后端约定完全一致
        assert_eq!(
            json,
            r#"{"type":"message","senderId":1,"senderUsername":"alice","content":"hi","threadId":7}"#
        );
    }

    #[test]
    fn test_inbound_single_message_decodes() {
        let text = r#"{"type":"message","senderId":1,"senderUsername":"a","content":"hi","threadId":7}"#;
        let payload = InboundPayload::from_json(text).expect("单条消息应能解码");
        assert_eq!(payload.into_envelopes(), vec![envelope(1, "a", "hi", 7)]);
    }

    #[test]
    fn test_inbound_batch_preserves_order() {
        let text = r#"{"type":"threadMessages","messages":[
            {"senderId":1,"senderUsername":"a","content":"first","threadId":7},
            {"senderId":2,"senderUsername":"b","content":"second","threadId":7}
        ]}"#;
        let envelopes = InboundPayload::from_json(text).expect("批次应能解码").into_envelopes();
        assert_eq!(envelopes, vec![envelope(1, "a", "first", 7), envelope(2, "b", "second", 7)]);
    }

    #[test]
    fn test_unknown_or_incomplete_payloads_fail_closed() {
        assert!(InboundPayload::from_json("not json").is_err());
        assert!(InboundPayload::from_json(r#"{"type":"unknown"}"#).is_err());
        // 缺少 content 字段
        assert!(InboundPayload::from_json(r#"{"type":"message","senderId":1,"senderUsername":"a","threadId":7}"#).is_err());
        // 批次中任一元素结构错误，整个帧解码失败
        assert!(
            InboundPayload::from_json(r#"{"type":"threadMessages","messages":[{"senderId":"x"}]}"#).is_err()
        );
    }

    #[test]
    fn test_envelope_deliverability_requires_assigned_ids() {
        assert!(envelope(1, "a", "hi", 7).is_deliverable());
        assert!(!envelope(0, "system", "hi", 7).is_deliverable());
        assert!(!envelope(1, "a", "hi", 0).is_deliverable());
    }
}
