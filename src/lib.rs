//! modbot - a modular chat-bot runtime
//!
//! Feature packages ("modules") are discovered from a directory, ordered by
//! their dependencies and loaded into isolated loading contexts. Enabled
//! modules contribute command trees that the dispatcher resolves, authorizes
//! and executes for inbound messages.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod modules;

use std::sync::Arc;

use application::errors::BotError;
use application::messaging::{CommandDispatcher, DispatchOutcome, MessageParser};
use application::services::{BatchReport, CommandRegistry, ModuleHandler, PermissionResolver};
use domain::entities::Message;
use domain::traits::{Gateway, PermissionStore};
use infrastructure::config::Config;
use infrastructure::modules::{HostContext, ModuleLoader};
use modules::BaseModule;

/// Everything a running bot needs, wired together
pub struct Runtime {
    registry: Arc<CommandRegistry>,
    handler: Arc<ModuleHandler>,
    dispatcher: CommandDispatcher,
}

impl Runtime {
    /// Build the registry, module handler and dispatcher, and bootstrap the
    /// base module. Nothing from the modules directory is loaded yet.
    pub fn new(
        config: &Config,
        host: Arc<HostContext>,
        store: Arc<dyn PermissionStore>,
        gateway: Arc<dyn Gateway>,
    ) -> Result<Self, BotError> {
        let registry = Arc::new(CommandRegistry::new());
        let loader = ModuleLoader::new(&config.modules.directory, host);
        let handler = Arc::new(ModuleHandler::new(registry.clone(), loader));

        let base = BaseModule::new(&handler, &config.bot.name, &config.bot.prefix);
        handler.bootstrap(modules::base::descriptor(), Box::new(base))?;

        let permissions = PermissionResolver::new(store)
            .with_global_admins(config.bot.global_admins.iter().copied())
            .with_admin_roles(config.bot.admin_roles.iter().copied());

        let mut parser = MessageParser::new(&config.bot.prefix);
        let info = gateway.bot_info();
        if info.id != 0 {
            parser = parser.with_bot_id(info.id);
        }

        let dispatcher = CommandDispatcher::new(parser, registry.clone(), Arc::new(permissions), gateway)
            .with_cleanup_delay(config.cleanup_delay());

        tracing::info!("Runtime ready for {} ({} base command(s))", info.name, registry.len());
        Ok(Self {
            registry,
            handler,
            dispatcher,
        })
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn handler(&self) -> &Arc<ModuleHandler> {
        &self.handler
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Load and enable everything in the modules directory
    pub fn load_modules(&self) -> BatchReport {
        self.handler.load_all()
    }

    pub async fn dispatch(&self, message: &Message) -> DispatchOutcome {
        self.dispatcher.dispatch(message).await
    }
}
