//! Console adapter for development/testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};

use crate::application::errors::BotError;
use crate::domain::entities::{Alert, MemberInfo, Message, MessageRef, User};
use crate::domain::traits::{BotInfo, Gateway};
use crate::infrastructure::config::ConsoleConfig;

/// Console gateway for local development
///
/// Alerts are printed to stdout, or forwarded to a channel when one is
/// attached. Message ids come from a single counter shared by inbound lines
/// and outbound replies.
pub struct ConsoleGateway {
    info: BotInfo,
    settings: ConsoleConfig,
    next_id: AtomicU64,
    sender: Option<mpsc::Sender<String>>,
    input: Mutex<Option<Lines<BufReader<Stdin>>>>,
}

impl ConsoleGateway {
    pub fn new(name: impl Into<String>, settings: ConsoleConfig) -> Self {
        Self {
            info: BotInfo {
                id: 0,
                name: name.into(),
            },
            settings,
            next_id: AtomicU64::new(1),
            sender: None,
            input: Mutex::new(None),
        }
    }

    pub fn with_sender(mut self, sender: mpsc::Sender<String>) -> Self {
        self.sender = Some(sender);
        self
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Read one line from stdin; `None` at end of input
    pub async fn read_line(&self, prompt: &str) -> Option<String> {
        let mut stdout = tokio::io::stdout();
        let _ = stdout.write_all(prompt.as_bytes()).await;
        let _ = stdout.flush().await;

        let mut input = self.input.lock().await;
        let lines = input.get_or_insert_with(|| BufReader::new(tokio::io::stdin()).lines());
        match lines.next_line().await {
            Ok(Some(line)) => Some(line.trim().to_string()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read console input: {}", e);
                None
            }
        }
    }

    /// Wrap a typed line as an inbound message from the configured console user
    pub fn message(&self, body: impl Into<String>) -> Message {
        let author = User::new(self.settings.user_id).with_username("console");
        let message = Message::new(self.allocate_id(), author, self.settings.channel_id, body);
        match self.settings.guild_id {
            Some(guild_id) => message.in_guild(
                guild_id,
                MemberInfo {
                    roles: self.settings.roles.clone(),
                    administrator: false,
                },
            ),
            None => message,
        }
    }
}

#[async_trait]
impl Gateway for ConsoleGateway {
    async fn send_alert(&self, channel_id: u64, alert: &Alert) -> Result<MessageRef, BotError> {
        let text = alert.render();
        match &self.sender {
            Some(sender) => sender
                .send(text)
                .await
                .map_err(|e| BotError::Transport(e.to_string()))?,
            None => println!("[BOT] {}", text),
        }

        Ok(MessageRef {
            channel_id,
            message_id: self.allocate_id(),
        })
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), BotError> {
        tracing::debug!("Console delete of message {} in channel {}", message.message_id, message.channel_id);
        Ok(())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
