// rust_websocket_utils/src/client/loopback.rs

//! 进程内回环传输。
//!
//! `LoopbackConnector` 实现了 `Connector`，每次 `connect` 都会创建一对无界通道：
//! 客户端拿到标准的 `ClientConnection`，对端 `LoopbackPeer` 则交给 `LoopbackListener`，
//! 由测试代码扮演服务器 (发送文本 / 二进制帧、观察客户端写出的帧、关闭连接)。
//! 对端还可以向客户端接收流注入传输故障，或让客户端的写操作失败 / 永久挂起。
//! 配合 `tokio::time::pause` 可以确定性地驱动心跳超时等时间相关逻辑。

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{sink, stream};
use log::debug;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use crate::client::transport::{ClientConnection, Connector};
use crate::error::WsError;

/// 创建一对回环连接器与监听器。
pub fn loopback() -> (LoopbackConnector, LoopbackListener) {
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    let connector = LoopbackConnector {
        accepted_tx,
        state: Arc::new(Mutex::new(LoopbackState::default())),
    };
    (connector, LoopbackListener { accepted_rx })
}

#[derive(Debug, Default)]
struct LoopbackState {
    /// 待注入的连接失败原因，按 `connect` 调用顺序逐个消费。
    pending_failures: VecDeque<String>,
    /// 已发起的 `connect` 调用次数 (包括失败的)。
    connect_attempts: usize,
}

/// 客户端写操作的表现，由 `LoopbackPeer` 控制。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum WriteBehavior {
    #[default]
    Deliver,
    Fail,
    Stall,
}

/// 回环连接器，可在多个任务间克隆共享。
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    accepted_tx: mpsc::UnboundedSender<LoopbackPeer>,
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackConnector {
    /// 让下一次 `connect` 以 `ConnectionRefused` 失败。
    pub fn fail_next(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.pending_failures.push_back(reason.into());
        }
    }

    /// 迄今为止的 `connect` 调用次数。
    pub fn connect_attempts(&self) -> usize {
        self.state.lock().map(|state| state.connect_attempts).unwrap_or(0)
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, url: &Url) -> Result<ClientConnection, WsError> {
        let injected_failure = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| WsError::Message("回环连接器状态锁已中毒".to_string()))?;
            state.connect_attempts += 1;
            state.pending_failures.pop_front()
        };
        if let Some(reason) = injected_failure {
            debug!("[回环传输] 按预设让连接失败: {}", reason);
            return Err(WsError::IoError(io::Error::new(io::ErrorKind::ConnectionRefused, reason)));
        }

        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel::<Result<Message, WsError>>();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel::<Message>();
        let writes = Arc::new(Mutex::new(WriteBehavior::default()));

        let ws_sender = sink::unfold(
            (from_client_tx, Arc::clone(&writes)),
            |(tx, writes), msg: Message| async move {
                let behavior = writes.lock().map(|b| *b).unwrap_or_default();
                match behavior {
                    WriteBehavior::Deliver => tx.send(msg).map_err(|_| WsError::SendErrorClosed)?,
                    WriteBehavior::Fail => return Err(WsError::Message("回环传输写入失败".to_string())),
                    WriteBehavior::Stall => std::future::pending::<()>().await,
                }
                Ok::<_, WsError>((tx, writes))
            },
        );
        let ws_receiver = stream::unfold(to_client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let peer = LoopbackPeer {
            url: url.clone(),
            to_client: Some(to_client_tx),
            from_client: from_client_rx,
            writes,
        };
        if self.accepted_tx.send(peer).is_err() {
            debug!("[回环传输] 监听器已被丢弃，新连接的对端无人接收");
        }
        Ok(ClientConnection::new(ws_sender, ws_receiver))
    }
}

/// 回环监听器：按连接建立顺序交出对端。
#[derive(Debug)]
pub struct LoopbackListener {
    accepted_rx: mpsc::UnboundedReceiver<LoopbackPeer>,
}

impl LoopbackListener {
    /// 等待下一个被建立的连接。所有连接器都被丢弃后返回 `None`。
    pub async fn accept(&mut self) -> Option<LoopbackPeer> {
        self.accepted_rx.recv().await
    }

    /// 非阻塞地取出一个已建立的连接。
    pub fn try_accept(&mut self) -> Option<LoopbackPeer> {
        self.accepted_rx.try_recv().ok()
    }
}

/// 回环连接的服务器一端。
#[derive(Debug)]
pub struct LoopbackPeer {
    /// 客户端连接时使用的完整 URL。
    pub url: Url,
    to_client: Option<mpsc::UnboundedSender<Result<Message, WsError>>>,
    from_client: mpsc::UnboundedReceiver<Message>,
    writes: Arc<Mutex<WriteBehavior>>,
}

impl LoopbackPeer {
    /// 向客户端发送一个文本帧。
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        self.send(Message::Text(text.into()))
    }

    /// 向客户端发送一个二进制帧。
    pub fn send_binary(&self, data: Vec<u8>) -> Result<(), WsError> {
        self.send(Message::Binary(data))
    }

    /// 发送 Close 帧并停止向客户端发送，客户端接收端随后结束。
    pub fn close(&mut self) {
        if let Some(tx) = self.to_client.take() {
            let _ = tx.send(Ok(Message::Close(None)));
        }
    }

    /// 让客户端的接收流产出一个传输故障 `WsError::Message(reason)`。
    pub fn fail_stream(&self, reason: impl Into<String>) -> Result<(), WsError> {
        self.push(Err(WsError::Message(reason.into())))
    }

    /// 此后客户端的每次写操作都立即失败。
    pub fn fail_writes(&self) {
        self.set_writes(WriteBehavior::Fail);
    }

    /// 此后客户端的每次写操作 (包括 Close 帧) 都永远不会完成。
    pub fn stall_writes(&self) {
        self.set_writes(WriteBehavior::Stall);
    }

    /// 等待客户端写出的下一帧。客户端发送端被丢弃后返回 `None`。
    pub async fn recv(&mut self) -> Option<Message> {
        self.from_client.recv().await
    }

    /// 非阻塞地取出客户端写出的一帧。
    pub fn try_recv(&mut self) -> Option<Message> {
        self.from_client.try_recv().ok()
    }

    /// 客户端是否已经丢弃了它的发送端 (即连接在客户端一侧已被释放)。
    pub fn is_client_gone(&self) -> bool {
        self.from_client.is_closed()
    }

    fn send(&self, msg: Message) -> Result<(), WsError> {
        self.push(Ok(msg))
    }

    fn push(&self, item: Result<Message, WsError>) -> Result<(), WsError> {
        match &self.to_client {
            Some(tx) => tx.send(item).map_err(|_| WsError::SendErrorClosed),
            None => Err(WsError::NotConnected),
        }
    }

    fn set_writes(&self, behavior: WriteBehavior) {
        let mut writes = self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *writes = behavior;
    }
}
