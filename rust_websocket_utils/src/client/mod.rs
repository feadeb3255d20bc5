// rust_websocket_utils/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! 主要职责包括：
//! - **连接建立**: `transport::connect_client` 以及可替换的 `Connector` 抽象。
//! - **帧分类**: `transport::receive_frame` 把底层消息归类为文本帧或二进制帧，
//!   跳过 Ping / Pong 等控制帧，并把关闭统一表示为 `None`。
//! - **测试支撑**: `loopback` 子模块提供一个进程内的全双工传输，测试代码可以扮演服务端。

pub mod loopback; // 进程内回环传输 (测试与嵌入使用)
pub mod transport; // 基于 tokio-tungstenite 的客户端传输层
