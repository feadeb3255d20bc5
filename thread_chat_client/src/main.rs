// thread_chat_client/src/main.rs

//! `thread-chat` 终端客户端。
//!
//! 用法: `thread-chat <thread_id> [sender_id]`
//!
//! 连接到指定线程，把收到的消息和系统通知打印到标准输出，把标准输入的每一行作为聊天消息发送。
//! 标准输入结束或收到 Ctrl-C 时关闭连接并退出。未指定 `sender_id` 时使用凭据文件中
//! 当前身份保存的 `user_id`。

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use common_models::{ThreadId, UserId};
use log::{error, info, LevelFilter};
use rust_websocket_utils::TungsteniteConnector;
use thread_chat_client::{ChatClientConfig, ConnectionManager, FileCredentialProvider};
use tokio::io::{AsyncBufReadExt, BufReader};

const USAGE: &str = "用法: thread-chat <thread_id> [sender_id]";

#[tokio::main]
async fn main() -> Result<()> {
    // 默认级别为 Info，本项目 crate 为 Debug；RUST_LOG 仍可覆盖
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("thread_chat_client", LevelFilter::Debug)
        .filter_module("rust_websocket_utils", LevelFilter::Debug)
        .parse_default_env()
        .try_init()
        .context("初始化 env_logger 日志服务失败")?;

    let mut args = std::env::args().skip(1);
    let thread_id: u64 = args
        .next()
        .ok_or_else(|| anyhow!(USAGE))?
        .parse()
        .with_context(|| format!("thread_id 必须是数字。{}", USAGE))?;
    let explicit_sender = args
        .next()
        .map(|raw| raw.parse::<u64>().with_context(|| format!("sender_id 必须是数字。{}", USAGE)))
        .transpose()?;

    let config = ChatClientConfig::load()?;
    let credentials = Arc::new(FileCredentialProvider::new(config.credentials_path.clone()));
    let sender_id = match explicit_sender {
        Some(id) => UserId(id),
        None => credentials
            .stored_user_id(&config.identity)
            .await
            .context("读取凭据文件失败")?
            .ok_or_else(|| anyhow!("身份 '{}' 没有保存的 user_id，请显式指定 sender_id", config.identity))?,
    };
    let thread_id = ThreadId(thread_id);
    info!("线程聊天客户端正在启动: thread={}, sender={}", thread_id, sender_id);

    let connector = Arc::new(TungsteniteConnector::with_timeout(config.connect_timeout()));
    let manager = ConnectionManager::new(config, credentials, connector);

    let _notices = manager.subscribe_notices(|notice| println!("[系统] {}", notice));
    let _messages = manager.subscribe(|envelope| {
        println!("{} ({}): {}", envelope.sender_username, envelope.sender_id, envelope.content)
    });

    if let Err(e) = manager.init_connection(thread_id).await {
        return Err(anyhow!(e).context(format!("无法连接到线程 {}", thread_id)));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let content = line.trim();
                    if content.is_empty() {
                        continue;
                    }
                    // 失败已经以系统通知的形式打印
                    let _ = manager.send_message(content, sender_id, thread_id).await;
                }
                Ok(None) => {
                    info!("标准输入已结束");
                    break;
                }
                Err(e) => {
                    error!("读取标准输入失败: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("收到 Ctrl-C");
                break;
            }
        }
    }

    manager.close_connection().await;
    info!("线程聊天客户端已退出");
    Ok(())
}
