// thread_chat_client/src/ws_client/mod.rs

//! WebSocket 客户端模块根文件。
//!
//! ## 核心组件：
//! - `service`: `ConnectionManager`，逻辑连接的协调者 (建立、替换、关闭、发送)。
//! - `dispatcher`: 入站帧分类与信封广播。
//! - `heartbeat`: 对端驱动的心跳看门狗。
//! - `state`: 显式的连接状态机与合法转换表。

// --- 子模块声明 ---

pub mod dispatcher;
pub mod heartbeat;
/// 核心的连接管理器实现。
pub mod service;
pub mod state;

// --- 公开导出 ---

pub use service::ConnectionManager;
pub use state::{ConnectionEvent, ConnectionState};
