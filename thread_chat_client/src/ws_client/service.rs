// thread_chat_client/src/ws_client/service.rs

//! 线程聊天连接管理器。
//!
//! `ConnectionManager` 管理一条逻辑连接 (一个聊天线程) 的完整生命周期：
//! 获取令牌、构造连接地址、打开 / 替换 / 关闭传输、发送消息，以及把连接状态
//! 转换为系统通知。每条打开的传输由一个独立的连接任务独占，连接任务负责
//! 入站帧分发、心跳看门狗和出站写入。
//!
//! 逻辑连接的槽位带有代数计数器：每次 `init_connection` 或 `close_connection`
//! 都会让代数加一，挂起中的旧 `init_connection` 在提交新传输前比较代数，
//! 已过期时直接关闭自己打开的传输而不是装入槽位。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common_models::{ChatEnvelope, OutboundPayload, ThreadId, UserId};
use log::{debug, error, info, warn};
use rust_websocket_utils::client::transport::{receive_frame, redact_query, ClientConnection, Connector};
use rust_websocket_utils::error::WsError;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;

use crate::config::ChatClientConfig;
use crate::credential::CredentialProvider;
use crate::error::ChatClientError;
use crate::event::{CloseReason, NoticeKind, SystemNotice};
use crate::participants::ParticipantDirectory;
use crate::subscription::{SubscriberRegistry, Subscription};
use crate::ws_client::dispatcher::{DispatchOutcome, FrameDispatcher};
use crate::ws_client::heartbeat::{LivenessWatchdog, LIVENESS_PROBE};
use crate::ws_client::state::{ConnectionEvent, ConnectionState};

/// 发给连接任务的指令。
#[derive(Debug)]
enum ConnectionCommand {
    SendText(String),
    Close,
}

/// 逻辑连接的槽位，至多持有一条存活的传输。
#[derive(Debug, Default)]
struct ConnectionSlot {
    generation: u64,
    state: ConnectionState,
    thread_id: Option<ThreadId>,
    commands: Option<mpsc::UnboundedSender<ConnectionCommand>>,
    task: Option<JoinHandle<()>>,
}

/// 从槽位中取出的一条传输，等待关闭。
struct DetachedTransport {
    commands: mpsc::UnboundedSender<ConnectionCommand>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionSlot {
    fn detach_transport(&mut self) -> Option<DetachedTransport> {
        let task = self.task.take();
        self.commands.take().map(|commands| DetachedTransport { commands, task })
    }
}

/// 连接任务运行所需的共享上下文。
struct ConnectionContext {
    generation: u64,
    thread_id: ThreadId,
    liveness_timeout: Duration,
    write_grace: Duration,
    slot: Arc<TokioMutex<ConnectionSlot>>,
    dispatcher: FrameDispatcher,
    notices: SubscriberRegistry<SystemNotice>,
}

/// 线程聊天连接管理器。
pub struct ConnectionManager {
    config: ChatClientConfig,
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn Connector>,
    participants: Arc<ParticipantDirectory>,
    envelopes: SubscriberRegistry<ChatEnvelope>,
    notices: SubscriberRegistry<SystemNotice>,
    slot: Arc<TokioMutex<ConnectionSlot>>,
}

impl ConnectionManager {
    /// 创建连接管理器。参与者目录由配置中的 `participants` 初始化。
    pub fn new(
        config: ChatClientConfig,
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        info!("[ThreadChat] ConnectionManager: 正在初始化，host={}", config.host);
        let participants = Arc::new(ParticipantDirectory::from_summaries(config.participants.clone()));
        Self {
            config,
            credentials,
            connector,
            participants,
            envelopes: SubscriberRegistry::new(),
            notices: SubscriberRegistry::new(),
            slot: Arc::new(TokioMutex::new(ConnectionSlot::default())),
        }
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }

    /// 用于解析出站用户名的参与者目录，可在运行时补充。
    pub fn participants(&self) -> &Arc<ParticipantDirectory> {
        &self.participants
    }

    /// 订阅投递的聊天信封。
    pub fn subscribe<F>(&self, on_envelope: F) -> Subscription
    where
        F: Fn(&ChatEnvelope) + Send + Sync + 'static,
    {
        self.envelopes.subscribe(on_envelope)
    }

    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<ChatEnvelope>) {
        self.envelopes.subscribe_channel()
    }

    /// 订阅系统通知。
    pub fn subscribe_notices<F>(&self, on_notice: F) -> Subscription
    where
        F: Fn(&SystemNotice) + Send + Sync + 'static,
    {
        self.notices.subscribe(on_notice)
    }

    pub fn subscribe_notices_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<SystemNotice>) {
        self.notices.subscribe_channel()
    }

    pub async fn state(&self) -> ConnectionState {
        self.slot.lock().await.state
    }

    /// 最近一次 `init_connection` 请求的线程。
    pub async fn current_thread(&self) -> Option<ThreadId> {
        self.slot.lock().await.thread_id
    }

    fn notify(&self, kind: NoticeKind) {
        self.notices.publish(&SystemNotice::new(kind));
    }

    /// 为指定线程建立连接。
    ///
    /// 先关闭当前槽位中的传输 (如有)，再获取令牌、构造地址并打开新传输。
    /// 所有失败在返回之前都已经发出了对应的系统通知；被后续请求取代的调用返回
    /// `Superseded` 且不发出通知。
    pub async fn init_connection(&self, thread_id: ThreadId) -> Result<(), ChatClientError> {
        let (generation, previous) = {
            let mut slot = self.slot.lock().await;
            slot.generation += 1;
            slot.state.apply(ConnectionEvent::InitRequested);
            slot.thread_id = Some(thread_id);
            (slot.generation, slot.detach_transport())
        };
        info!("[ThreadChat] 开始为线程 {} 建立连接 (第 {} 代)", thread_id, generation);
        if let Some(previous) = previous {
            info!("[ThreadChat] 关闭被替换的旧传输");
            self.shutdown_transport(previous).await;
        }

        let token = match self.credentials.fetch_token(&self.config.identity).await {
            Ok(token) => token,
            Err(e) => {
                if !self.fail_if_current(generation, ConnectionEvent::CredentialFailed).await {
                    return Err(ChatClientError::Superseded { generation });
                }
                error!("[ThreadChat] 获取身份 '{}' 的令牌失败: {}", self.config.identity, e);
                self.notify(NoticeKind::InitFailed { detail: e.to_string() });
                return Err(e.into());
            }
        };

        let url = match self.config.thread_url(thread_id, &token) {
            Ok(url) => url,
            Err(e) => {
                if !self.fail_if_current(generation, ConnectionEvent::TransportFailed).await {
                    return Err(ChatClientError::Superseded { generation });
                }
                error!("[ThreadChat] 无法构造连接地址: {}", e);
                self.notify(NoticeKind::InitFailed { detail: e.to_string() });
                return Err(e);
            }
        };
        if !self.is_current(generation).await {
            debug!("[ThreadChat] 第 {} 代请求在获取令牌期间已被取代", generation);
            return Err(ChatClientError::Superseded { generation });
        }

        let printable = redact_query(&url, &["at"]);
        let connection = match self.connector.connect(&url).await {
            Ok(connection) => connection,
            Err(e) => {
                if !self.fail_if_current(generation, ConnectionEvent::TransportFailed).await {
                    return Err(ChatClientError::Superseded { generation });
                }
                error!("[ThreadChat] 连接 {} 失败: {}", printable, e);
                self.notify(NoticeKind::TransportError { detail: e.to_string() });
                return Err(e.into());
            }
        };

        let mut slot = self.slot.lock().await;
        if slot.generation != generation {
            drop(slot);
            info!("[ThreadChat] 第 {} 代传输打开时已被取代，立即关闭", generation);
            let mut connection = connection;
            if let Err(e) = connection.close().await {
                warn!("[ThreadChat] 关闭过期传输时出错: {}", e);
            }
            return Err(ChatClientError::Superseded { generation });
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let context = ConnectionContext {
            generation,
            thread_id,
            liveness_timeout: self.config.liveness_timeout(),
            write_grace: self.config.close_grace(),
            slot: Arc::clone(&self.slot),
            dispatcher: FrameDispatcher::new(self.envelopes.clone()),
            notices: self.notices.clone(),
        };
        slot.state.apply(ConnectionEvent::TransportOpened);
        slot.commands = Some(commands_tx);
        info!("[ThreadChat] 已连接到 {}", printable);
        // 先发出"已建立"，再启动连接任务，保证同一传输的"已关闭"一定排在其后
        self.notify(NoticeKind::ConnectionEstablished { thread_id });
        slot.task = Some(tokio::spawn(run_connection(context, connection, commands_rx)));
        Ok(())
    }

    /// 关闭当前传输。没有打开的传输时什么也不做。
    ///
    /// 同时让挂起中的 `init_connection` 失效。连接任务写 Close 帧最多用 `close_grace_ms`，
    /// 两倍宽限内仍未退出则中止该任务。
    pub async fn close_connection(&self) {
        let transport = {
            let mut slot = self.slot.lock().await;
            slot.generation += 1;
            slot.state.apply(ConnectionEvent::CloseRequested);
            slot.detach_transport()
        };
        match transport {
            Some(transport) => {
                info!("[ThreadChat] 正在关闭当前传输");
                self.shutdown_transport(transport).await;
            }
            None => debug!("[ThreadChat] close_connection: 当前没有打开的传输"),
        }
    }

    async fn shutdown_transport(&self, transport: DetachedTransport) {
        let DetachedTransport { commands, task } = transport;
        if commands.send(ConnectionCommand::Close).is_err() {
            debug!("[ThreadChat] 连接任务已经退出");
        }
        drop(commands);
        if let Some(mut task) = task {
            // 连接任务自己的关闭写入也以 close_grace 为限，这里多留一个 close_grace 再中止
            let backstop = self.config.close_grace() * 2;
            match tokio::time::timeout(backstop, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("[ThreadChat] 连接任务异常结束: {}", e),
                Err(_) => {
                    warn!("[ThreadChat] 连接任务在 {:?} 内未退出，强制中止", backstop);
                    task.abort();
                }
            }
        }
    }

    /// 在 OPEN 的传输上发送一条聊天消息，返回实际发出的信封。
    ///
    /// 用户名由参与者目录解析，未知时为 `"unknown"`。传输未打开时不写入任何传输，
    /// 发出 `NotOpen` 通知并返回 `SendOnClosedConnection`；消息不会被缓存或重试。
    pub async fn send_message(
        &self,
        content: impl Into<String>,
        sender_id: UserId,
        thread_id: ThreadId,
    ) -> Result<ChatEnvelope, ChatClientError> {
        let commands = {
            let slot = self.slot.lock().await;
            match (slot.state.can_send(), slot.commands.as_ref()) {
                (true, Some(commands)) => Some(commands.clone()),
                _ => None,
            }
        };
        let Some(commands) = commands else {
            warn!("[ThreadChat] 连接未打开，拒绝发送消息");
            self.notify(NoticeKind::NotOpen);
            return Err(ChatClientError::SendOnClosedConnection);
        };

        let envelope = ChatEnvelope {
            sender_id,
            sender_username: self.participants.resolve(sender_id),
            content: content.into(),
            thread_id,
        };
        let json = match OutboundPayload::Message(envelope.clone()).to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("[ThreadChat] 出站消息序列化失败: {}", e);
                self.notify(NoticeKind::TransportError { detail: e.to_string() });
                return Err(e.into());
            }
        };
        if commands.send(ConnectionCommand::SendText(json)).is_err() {
            warn!("[ThreadChat] 连接任务已退出，消息未发送");
            self.notify(NoticeKind::NotOpen);
            return Err(ChatClientError::SendOnClosedConnection);
        }
        Ok(envelope)
    }

    async fn is_current(&self, generation: u64) -> bool {
        self.slot.lock().await.generation == generation
    }

    /// 请求仍是当前代时把槽位推进到失败状态并返回 `true`。
    async fn fail_if_current(&self, generation: u64, event: ConnectionEvent) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.generation != generation {
            return false;
        }
        slot.state.apply(event);
        true
    }
}

/// 在 `grace` 内完成一次写操作，超时返回 `WsError::WriteTimeout`。
/// 写操作挂起期间 `select!` 不会轮询看门狗，所以每次写入都必须有上限。
async fn bounded_write<F>(grace: Duration, write: F) -> Result<(), WsError>
where
    F: Future<Output = Result<(), WsError>>,
{
    tokio::time::timeout(grace, write)
        .await
        .unwrap_or(Err(WsError::WriteTimeout))
}

/// 连接任务：独占一条传输直到它关闭。
async fn run_connection(
    context: ConnectionContext,
    mut connection: ClientConnection,
    mut commands: mpsc::UnboundedReceiver<ConnectionCommand>,
) {
    let mut watchdog = LivenessWatchdog::new(context.liveness_timeout);
    debug!("[ThreadChat] 线程 {} 的连接任务已启动 (第 {} 代)", context.thread_id, context.generation);

    let reason = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(ConnectionCommand::SendText(text)) => {
                    if let Err(e) = bounded_write(context.write_grace, connection.send_text(text)).await {
                        error!("[ThreadChat] 发送消息失败: {}", e);
                        context.notices.publish(&SystemNotice::new(NoticeKind::TransportError { detail: e.to_string() }));
                        break CloseReason::TransportFailure;
                    }
                }
                Some(ConnectionCommand::Close) | None => {
                    if let Err(e) = bounded_write(context.write_grace, connection.close()).await {
                        warn!("[ThreadChat] 主动关闭传输时出错: {}", e);
                    }
                    break CloseReason::LocalClose;
                }
            },
            frame = receive_frame(&mut connection.ws_receiver) => match frame {
                Some(Ok(frame)) => {
                    if context.dispatcher.dispatch(&frame) == DispatchOutcome::LivenessProbe {
                        watchdog.rearm();
                        let echo = connection.send_binary(LIVENESS_PROBE.to_vec());
                        if let Err(e) = bounded_write(context.write_grace, echo).await {
                            error!("[心跳] 回送探测帧失败: {}", e);
                            context.notices.publish(&SystemNotice::new(NoticeKind::TransportError { detail: e.to_string() }));
                            break CloseReason::TransportFailure;
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("[ThreadChat] 接收帧时发生传输故障: {}", e);
                    context.notices.publish(&SystemNotice::new(NoticeKind::TransportError { detail: e.to_string() }));
                    break CloseReason::TransportFailure;
                }
                None => {
                    info!("[ThreadChat] 对端关闭了线程 {} 的连接", context.thread_id);
                    break CloseReason::PeerClosed;
                }
            },
            _ = watchdog.expired() => {
                warn!("[心跳] {:?} 内没有收到探测帧，强制关闭传输", watchdog.window());
                if let Err(e) = bounded_write(context.write_grace, connection.close()).await {
                    debug!("[心跳] 关闭无响应的传输时出错: {}", e);
                }
                break CloseReason::SilentPeerTimeout;
            }
        }
    };
    watchdog.disarm();
    drop(connection);

    {
        let mut slot = context.slot.lock().await;
        if slot.generation == context.generation {
            let event = match reason {
                CloseReason::PeerClosed => ConnectionEvent::PeerClosed,
                CloseReason::LocalClose => ConnectionEvent::CloseRequested,
                CloseReason::SilentPeerTimeout => ConnectionEvent::LivenessExpired,
                CloseReason::TransportFailure => ConnectionEvent::TransportFailed,
            };
            slot.state.apply(event);
            slot.commands = None;
            slot.task = None;
        }
    }
    info!("[ThreadChat] 线程 {} 的连接已关闭 ({})", context.thread_id, reason);
    context.notices.publish(&SystemNotice::new(NoticeKind::ConnectionClosed {
        thread_id: context.thread_id,
        reason,
    }));
}
