//! `rust_websocket_utils` 是一个提供 WebSocket 客户端传输功能的 Rust Crate。
//!
//! 它把 `tokio-tungstenite` 的细节封装在一个很窄的接口之后，供上层连接管理器使用。
//!
//! 主要模块包括：
//! - `error`: 定义库中使用的统一错误类型 `WsError`。
//! - `client`: 客户端传输层：建立连接、按二进制 / 文本分类接收帧、可替换的连接器抽象，
//!   以及用于测试的进程内回环传输。

pub mod client;
pub mod error;

pub use client::transport::{ClientConnection, Connector, IncomingFrame, TungsteniteConnector};
pub use error::WsError;
