//! `thread_chat_client` 线程聊天客户端核心逻辑。
//!
//! 一个聊天线程对应一条逻辑连接，由 `ConnectionManager` 负责：
//! 通过 `CredentialProvider` 获取令牌，连接 `ws(s)://<host>/thread/<threadId>?at=<token>`，
//! 把入站帧分类并广播给订阅者，维护对端驱动的心跳，并把所有失败转换成系统通知。

pub mod config;
pub mod credential;
pub mod error;
pub mod event;
pub mod participants;
pub mod subscription;
pub mod ws_client;

pub use config::ChatClientConfig;
pub use credential::{CredentialProvider, FileCredentialProvider, StaticCredentialProvider};
pub use error::{ChatClientError, CredentialError};
pub use event::{CloseReason, NoticeKind, SystemNotice};
pub use participants::ParticipantDirectory;
pub use subscription::{SubscriberRegistry, Subscription};
pub use ws_client::{ConnectionManager, ConnectionState};
