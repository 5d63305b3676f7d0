//! Command dispatcher - resolves, authorizes and executes commands for inbound messages

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use super::parser::MessageParser;
use crate::application::errors::{panic_message, CommandError};
use crate::application::services::{Caller, CommandRegistry, PermissionResolver};
use crate::domain::entities::command::ROOT;
use crate::domain::entities::{Alert, Arguments, Message, MessageRef, NodeId, RootCommand};
use crate::domain::traits::Gateway;

/// Terminal state of a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored,
    /// Stopped early or failed; the alert explains why
    Alerted(Alert),
    /// The handler ran and produced this reply
    Executed(Alert),
}

impl DispatchOutcome {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            DispatchOutcome::Ignored => None,
            DispatchOutcome::Alerted(alert) | DispatchOutcome::Executed(alert) => Some(alert),
        }
    }
}

/// Message dispatcher - routes messages from the gateway to command handlers
pub struct CommandDispatcher {
    parser: MessageParser,
    registry: Arc<CommandRegistry>,
    permissions: Arc<PermissionResolver>,
    gateway: Arc<dyn Gateway>,
    cleanup_delay: Duration,
}

impl CommandDispatcher {
    pub fn new(
        parser: MessageParser,
        registry: Arc<CommandRegistry>,
        permissions: Arc<PermissionResolver>,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        Self {
            parser,
            registry,
            permissions,
            gateway,
            cleanup_delay: Duration::from_secs(10),
        }
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    /// Handle one inbound message and send the reply, if any.
    ///
    /// The reply and any scheduled deletes run in the background; their
    /// failures are logged and never reach the caller.
    pub async fn dispatch(&self, message: &Message) -> DispatchOutcome {
        let (outcome, cleanup) = self.resolve(message).await;

        if let Some(alert) = outcome.alert() {
            self.respond(message, alert.clone(), cleanup);
        }
        outcome
    }

    async fn resolve(&self, message: &Message) -> (DispatchOutcome, bool) {
        if message.author.is_bot {
            return (DispatchOutcome::Ignored, false);
        }

        let Some(parsed) = self.parser.parse(&message.body) else {
            return (DispatchOutcome::Ignored, false);
        };

        let Some(root) = self.registry.get(&parsed.label) else {
            return (DispatchOutcome::Ignored, false);
        };

        if root.owner().map_or(false, |owner| !owner.is_enabled()) {
            tracing::debug!("Ignoring '{}': owning module is disabled", parsed.label);
            return (DispatchOutcome::Ignored, false);
        }

        let mut args = Arguments::new(parsed.args);
        let node = match self.cascade(&root, message, &mut args).await {
            Ok(node) => node,
            Err(alert) => return (DispatchOutcome::Alerted(alert), root.root().cleanup),
        };

        let cleanup = root.root().cleanup || root.node(node).cleanup;
        (self.execute(&root, node, message, &mut args), cleanup)
    }

    /// Walk down the tree one token at a time, checking each node on the way.
    async fn cascade(&self, root: &RootCommand, message: &Message, args: &mut Arguments) -> Result<NodeId, Alert> {
        let caller = Caller::from_message(message);
        let mut current = ROOT;

        loop {
            let node = root.node(current);

            if node.guild_only && !message.is_guild() {
                return Err(Alert::guild_only());
            }

            if let Some(permission) = &node.permission {
                if !self.permissions.has_permission(&caller, permission, message.channel_id).await {
                    tracing::debug!("User {} lacks {} for '{}'", caller.user_id, permission, root.path(current));
                    return Err(Alert::permission_denied(permission));
                }
            }

            let Some(token) = args.next() else {
                return Ok(current);
            };

            match root.find_child(current, &token) {
                Some(child) => current = child,
                None => {
                    args.backtrack();
                    return Ok(current);
                }
            }
        }
    }

    fn execute(&self, root: &RootCommand, node: NodeId, message: &Message, args: &mut Arguments) -> DispatchOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| root.execute(node, message, args)))
            .unwrap_or_else(|panic| Err(CommandError::Execution(format!("handler {}", panic_message(panic.as_ref())))));

        match result {
            Ok(alert) => DispatchOutcome::Executed(alert),
            Err(CommandError::Syntax(reason)) => {
                let usage = format!("{}{}", self.parser.prefix(), root.usage(node));
                DispatchOutcome::Alerted(Alert::syntax(&usage, &reason))
            }
            Err(CommandError::PermissionDenied(permission)) => {
                DispatchOutcome::Alerted(Alert::permission_denied(&permission))
            }
            Err(CommandError::GuildOnly) => DispatchOutcome::Alerted(Alert::guild_only()),
            Err(e) => {
                let reference = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
                tracing::error!(
                    reference = %reference,
                    command = %root.path(node),
                    user = message.author.id,
                    channel = message.channel_id,
                    "Command failed: {}",
                    e
                );
                DispatchOutcome::Alerted(Alert::failure(&reference))
            }
        }
    }

    fn respond(&self, message: &Message, alert: Alert, cleanup: bool) {
        let gateway = self.gateway.clone();
        let trigger = MessageRef {
            channel_id: message.channel_id,
            message_id: message.id,
        };
        let delay = self.cleanup_delay;

        tokio::spawn(async move {
            let reply = match gateway.send_alert(trigger.channel_id, &alert).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!("Failed to send reply in channel {}: {}", trigger.channel_id, e);
                    return;
                }
            };

            if !cleanup {
                return;
            }
            tokio::time::sleep(delay).await;
            for target in [trigger, reply] {
                if let Err(e) = gateway.delete_message(target).await {
                    tracing::warn!("Failed to delete message {}: {}", target.message_id, e);
                }
            }
        });
    }
}
