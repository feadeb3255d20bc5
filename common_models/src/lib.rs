//! `common_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了线程聊天客户端各组件之间共享的线路层数据结构：
//! - **WebSocket 消息负载 (`ws_payloads`)**: 聊天消息信封 `ChatEnvelope`、入站帧的
//!   `type` 判别枚举 `InboundPayload`，以及出站帧 `OutboundPayload`。
//! - **用户模型 (`user_models`)**: 用户与会话线程的标识符，以及用户列表条目 `UserSummary`。
//!
//! 设计原则：
//! - 所有模型都派生 `serde::Serialize` / `serde::Deserialize`，字段名与后端 JSON 保持一致 (camelCase)。
//! - 所有模型派生 `Debug` 和 `Clone`，方便调试输出和在订阅者之间复制分发。

pub mod user_models; // 用户 / 线程标识符与用户列表条目
pub mod ws_payloads; // WebSocket 文本帧的 JSON 负载结构

pub use user_models::{ThreadId, UserId, UserSummary};
pub use ws_payloads::{ChatEnvelope, InboundPayload, OutboundPayload};
