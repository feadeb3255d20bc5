// rust_websocket_utils/src/client/transport.rs

//! 客户端 WebSocket 传输层核心逻辑。
//!
//! 本模块提供了建立与服务器的连接、按帧类型 (文本 / 二进制) 接收数据，
//! 以及一个可替换的 `Connector` 抽象，使上层的连接管理器既能跑在真实的
//! `tokio-tungstenite` 连接上，也能跑在测试用的进程内回环传输上。

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info};
use tokio_tungstenite::{
    connect_async,                  // 异步连接函数
    tungstenite::protocol::Message, // 底层 WebSocket 消息枚举 (Text, Binary, Ping, Pong, Close)
};
use url::Url;

use crate::error::WsError;

/// 发送端：接收底层 `Message`，错误统一为 `WsError`。
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// 接收端：产出底层 `Message`，错误统一为 `WsError`。
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// `ClientConnection` 结构体代表一个活动的客户端 WebSocket 连接。
///
/// 它封装了发送端 (`FrameSink`) 和接收端 (`FrameStream`)。两端都被装箱擦除了具体类型，
/// 因此同一个连接管理器可以驱动真实的 TCP 连接或回环连接。
pub struct ClientConnection {
    /// 用于向服务器异步发送帧的 `Sink`。
    pub ws_sender: FrameSink,
    /// 用于从服务器异步接收帧的 `Stream`。
    pub ws_receiver: FrameStream,
}

impl ClientConnection {
    /// 由任意满足约束的发送端 / 接收端构造连接。
    pub fn new<S, R>(ws_sender: S, ws_receiver: R) -> Self
    where
        S: Sink<Message, Error = WsError> + Send + 'static,
        R: Stream<Item = Result<Message, WsError>> + Send + 'static,
    {
        Self {
            ws_sender: Box::pin(ws_sender),
            ws_receiver: Box::pin(ws_receiver),
        }
    }

    /// 发送一个文本帧。
    pub async fn send_text(&mut self, text: String) -> Result<(), WsError> {
        debug!("客户端：准备发送文本帧 ({} 字节)", text.len());
        self.ws_sender.send(Message::Text(text)).await
    }

    /// 发送一个二进制帧。
    pub async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), WsError> {
        debug!("客户端：准备发送二进制帧 ({} 字节)", data.len());
        self.ws_sender.send(Message::Binary(data)).await
    }

    /// 主动关闭连接：先发送 Close 帧，再关闭发送端。
    ///
    /// 对端已经断开时返回的"已关闭"类错误会被吞掉，关闭操作视为成功。
    pub async fn close(&mut self) -> Result<(), WsError> {
        let result = match self.ws_sender.send(Message::Close(None)).await {
            Ok(()) => self.ws_sender.close().await,
            Err(e) => Err(e),
        };
        match result {
            Err(e) if !e.is_connection_closed() => Err(e),
            _ => Ok(()),
        }
    }
}

/// 从接收端读到的、对应用层有意义的帧。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingFrame {
    /// 文本帧，内容原样保留，由上层决定如何解析。
    Text(String),
    /// 二进制帧。
    Binary(Vec<u8>),
}

/// 连接器抽象：根据 URL 建立一条新的 `ClientConnection`。
#[async_trait]
pub trait Connector: Send + Sync {
    /// 建立连接并完成握手。返回 `Ok` 即表示传输已处于打开状态。
    async fn connect(&self, url: &Url) -> Result<ClientConnection, WsError>;
}

/// 基于 `tokio-tungstenite` 的生产环境连接器。
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector {
    /// 握手的超时时间；`None` 表示不限制。
    connect_timeout: Option<Duration>,
}

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置握手超时时间，超时返回 `WsError::ConnectionTimeout`。
    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout: Some(connect_timeout),
        }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<ClientConnection, WsError> {
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect_client(url))
                .await
                .map_err(|_| WsError::ConnectionTimeout)?,
            None => connect_client(url).await,
        }
    }
}

/// 异步连接到指定的 WebSocket 服务器。
///
/// 只接受 `ws` / `wss` 协议。握手成功后把 `WebSocketStream` 拆分为发送端与接收端，
/// 并把底层的 `tungstenite::Error` 统一映射为 `WsError`。
///
/// # Arguments
/// * `url` - WebSocket 服务器的完整 URL。
///
/// # Returns
/// * `Result<ClientConnection, WsError>` - 握手成功时返回连接；协议不受支持、连接失败或握手失败时返回错误。
pub async fn connect_client(url: &Url) -> Result<ClientConnection, WsError> {
    let printable = redact_query(url, &["at"]);
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(WsError::InvalidUrl(format!(
            "不支持的协议 '{}' (URL: {})",
            url.scheme(),
            printable
        )));
    }

    info!("客户端：开始尝试连接到 WebSocket 服务器，URL: {}", printable);
    match connect_async(url.as_str()).await {
        Ok((ws_stream, response)) => {
            info!("客户端：已成功连接到 {} (HTTP 状态码: {})", printable, response.status());
            let (ws_sender, ws_receiver) = ws_stream.split();
            Ok(ClientConnection::new(
                ws_sender.sink_map_err(WsError::from),
                ws_receiver.map(|item| item.map_err(WsError::from)),
            ))
        }
        Err(e) => {
            error!("客户端：连接到 {} 失败，错误: {}", printable, e);
            Err(WsError::WebSocketProtocolError(e))
        }
    }
}

/// 从接收端异步读取下一个应用层帧。
///
/// Ping / Pong / 原始帧会被跳过 (Pong 由底层库自动回复)。
///
/// # Returns
/// * `Some(Ok(frame))` - 收到文本帧或二进制帧。
/// * `Some(Err(e))` - 接收时发生了传输故障。
/// * `None` - 连接已关闭 (收到 Close 帧、流结束，或底层报告连接已关闭)。
pub async fn receive_frame(ws_receiver: &mut FrameStream) -> Option<Result<IncomingFrame, WsError>> {
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => break Some(Ok(IncomingFrame::Text(text))),
                Message::Binary(data) => break Some(Ok(IncomingFrame::Binary(data))),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                    debug!("客户端：跳过控制帧");
                }
                Message::Close(close_frame) => {
                    debug!("客户端：收到 Close 控制帧，详细信息: {:?}", close_frame);
                    break None;
                }
            },
            Some(Err(e)) if e.is_connection_closed() => {
                debug!("客户端：接收期间检测到连接已关闭: {}", e);
                break None;
            }
            Some(Err(e)) => {
                error!("客户端：从 WebSocket 流接收消息时发生底层错误: {}", e);
                break Some(Err(e));
            }
            None => {
                debug!("客户端：WebSocket 接收流已结束。");
                break None;
            }
        }
    }
}

/// 返回一个适合写入日志的 URL 字符串：`secret_keys` 中列出的查询参数值被替换为 `***`。
pub fn redact_query(url: &Url, secret_keys: &[&str]) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if secret_keys.contains(&&*key) {
                "***".to_string()
            } else {
                value.into_owned()
            };
            (key.into_owned(), value)
        })
        .collect();
    let mut redacted = url.clone();
    redacted
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    // 辅助函数：启动一个只处理单个连接的本地服务器。
    // 服务器把收到的文本帧原样回显，收到二进制帧时回一个 [1]，随后发送 Close。
    async fn spawn_single_connection_server() -> (Url, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
        let addr = listener.local_addr().expect("无法获取本地监听地址");
        let handle = tokio::spawn(async move {
            let (tcp_stream, _) = listener.accept().await.expect("接受连接失败");
            let mut ws = accept_async(tcp_stream).await.expect("握手失败");
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        let _ = ws.send(Message::Text(text)).await;
                    }
                    Message::Binary(_) => {
                        let _ = ws.send(Message::Binary(vec![1])).await;
                        let _ = ws.send(Message::Close(None)).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });
        let url = Url::parse(&format!("ws://{}/thread/7?at=secret", addr)).expect("URL 应合法");
        (url, handle)
    }

    #[tokio::test]
    async fn test_connect_send_and_classify_frames() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (url, server) = spawn_single_connection_server().await;

        let mut conn = TungsteniteConnector::with_timeout(Duration::from_secs(5))
            .connect(&url)
            .await
            .expect("连接测试服务器失败");

        conn.send_text("hello".to_string()).await.expect("发送文本帧失败");
        let echoed = timeout(Duration::from_secs(5), receive_frame(&mut conn.ws_receiver))
            .await
            .expect("等待回显超时");
        assert_eq!(echoed.map(|r| r.ok()), Some(Some(IncomingFrame::Text("hello".to_string()))));

        conn.send_binary(vec![1]).await.expect("发送二进制帧失败");
        let probe = timeout(Duration::from_secs(5), receive_frame(&mut conn.ws_receiver))
            .await
            .expect("等待二进制帧超时");
        assert_eq!(probe.map(|r| r.ok()), Some(Some(IncomingFrame::Binary(vec![1]))));

        // 服务器随后发送 Close，接收端应报告连接结束
        let closed = timeout(Duration::from_secs(5), receive_frame(&mut conn.ws_receiver))
            .await
            .expect("等待关闭超时");
        assert!(closed.is_none(), "收到 Close 后应返回 None");

        let _ = conn.close().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_connect_rejects_non_websocket_scheme() {
        let url = Url::parse("http://127.0.0.1:1/thread/1").unwrap();
        match connect_client(&url).await {
            Err(WsError::InvalidUrl(detail)) => assert!(detail.contains("http")),
            Err(other) => panic!("预期 InvalidUrl，实际为: {:?}", other),
            Ok(_) => panic!("非 ws 协议不应连接成功"),
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported_as_error() {
        // 先绑定再释放，得到一个当前没有监听者的端口
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("ws://{}/thread/1?at=t", addr)).unwrap();
        assert!(connect_client(&url).await.is_err());
    }

    #[test]
    fn test_redact_query_masks_token_only() {
        let url = Url::parse("ws://host:3107/thread/9?at=abc123&lang=zh").unwrap();
        let printable = redact_query(&url, &["at"]);
        assert_eq!(printable, "ws://host:3107/thread/9?at=***&lang=zh");
        assert!(!printable.contains("abc123"));

        let bare = Url::parse("ws://host/thread/9").unwrap();
        assert_eq!(redact_query(&bare, &["at"]), "ws://host/thread/9");
    }
}
