//! Base module - help, diagnostics and module management
//!
//! Loaded through [`ModuleHandler::bootstrap`] before anything else, so its
//! commands are available even when every other module failed.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::application::errors::{CommandError, CommandResult, ModuleResult};
use crate::application::services::{LoadedModule, ModuleContext, ModuleHandler};
use crate::domain::entities::command::ROOT;
use crate::domain::entities::{Alert, Command, CommandContext, ModuleDescriptor};
use crate::domain::traits::Module;

pub const NAME: &str = "base";

/// Required for every `module` subcommand
pub const MODULE_PERMISSION: &str = "base.module";

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::new(NAME, env!("CARGO_PKG_VERSION"), NAME)
        .with_description("Built-in help, diagnostics and module management")
}

struct BaseState {
    handler: Weak<ModuleHandler>,
    started: Instant,
    bot_name: String,
    prefix: String,
}

/// The always-present base module
pub struct BaseModule {
    state: Arc<BaseState>,
}

impl BaseModule {
    pub fn new(handler: &Arc<ModuleHandler>, bot_name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            state: Arc::new(BaseState {
                handler: Arc::downgrade(handler),
                started: Instant::now(),
                bot_name: bot_name.into(),
                prefix: prefix.into(),
            }),
        }
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new("help")
                .with_aliases(["h", "?"])
                .with_description("List commands or describe one")
                .with_args("[command [subcommand...]]")
                .with_handler(self.bind(BaseState::help)),
            Command::new("info")
                .with_aliases(["about"])
                .with_description("Show bot information")
                .with_handler(self.bind(BaseState::info)),
            Command::new("ping")
                .with_description("Check that the bot is responsive")
                .cleanup()
                .with_handler(self.bind(BaseState::ping)),
            Command::new("diagnostics")
                .with_aliases(["diag"])
                .with_description("Show uptime and registry statistics")
                .with_handler(self.bind(BaseState::diagnostics)),
            Command::new("module")
                .with_aliases(["modules", "mod"])
                .with_description("Manage modules")
                .with_permission(MODULE_PERMISSION)
                .with_child(
                    Command::new("list")
                        .with_aliases(["ls"])
                        .with_description("List loaded modules")
                        .with_handler(self.bind(BaseState::list)),
                )
                .with_child(
                    Command::new("info")
                        .with_description("Show details of a module")
                        .with_args("<name>")
                        .with_handler(self.bind(BaseState::module_info)),
                )
                .with_child(
                    Command::new("enable")
                        .with_description("Enable a loaded module")
                        .with_args("<name>")
                        .with_handler(self.bind(BaseState::enable)),
                )
                .with_child(
                    Command::new("disable")
                        .with_description("Disable a module and everything that depends on it")
                        .with_args("<name>")
                        .with_handler(self.bind(BaseState::disable)),
                )
                .with_child(
                    Command::new("load")
                        .with_description("Load and enable a module from the modules directory")
                        .with_args("<name>")
                        .with_handler(self.bind(BaseState::load)),
                )
                .with_child(
                    Command::new("unload")
                        .with_description("Unload a module")
                        .with_args("<name>")
                        .with_handler(self.bind(BaseState::unload)),
                )
                .with_child(
                    Command::new("reload")
                        .with_description("Unload and load a module again")
                        .with_args("<name>")
                        .with_handler(self.bind(BaseState::reload)),
                ),
        ]
    }

    fn bind(
        &self,
        f: fn(&BaseState, &mut CommandContext<'_>) -> CommandResult<Alert>,
    ) -> impl Fn(&mut CommandContext<'_>) -> CommandResult<Alert> + Send + Sync + 'static {
        let state = self.state.clone();
        move |ctx: &mut CommandContext<'_>| f(&state, ctx)
    }
}

impl Module for BaseModule {
    fn on_enable(&self, ctx: &ModuleContext<'_>) -> ModuleResult<()> {
        ctx.register_commands(self.commands())
    }
}

impl BaseState {
    fn handler(&self) -> CommandResult<Arc<ModuleHandler>> {
        self.handler
            .upgrade()
            .ok_or_else(|| CommandError::execution("module handler is no longer running"))
    }

    fn help(&self, ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let registry = handler.registry();

        let Some(label) = ctx.args.next() else {
            let mut alert = Alert::info(format!("Use `{}help <command>` for details.", self.prefix)).with_title("Commands");
            for root in registry.roots() {
                let description = root.root().description.clone().unwrap_or_default();
                alert = alert.with_field(format!("{}{}", self.prefix, root.usage(ROOT)), description);
            }
            return Ok(alert);
        };

        let Some(root) = registry.get(&label) else {
            return Ok(Alert::warning(format!("Unknown command '{}'", label)));
        };

        let rest: Vec<String> = ctx.args.by_ref().collect();
        let (id, used) = root.resolve(rest.iter().map(String::as_str));
        if let Some(unknown) = rest.get(used) {
            return Ok(Alert::warning(format!("`{}` has no subcommand '{}'", root.path(id), unknown)));
        }

        let node = root.node(id);
        let mut alert = Alert::info(node.description.clone().unwrap_or_else(|| "No description".to_string()))
            .with_title(format!("{}{}", self.prefix, root.usage(id)));
        if !node.aliases.is_empty() {
            alert = alert.with_field("Aliases", node.aliases.join(", "));
        }
        if let Some(permission) = &node.permission {
            alert = alert.with_field("Permission", permission.clone());
        }
        if node.guild_only {
            alert = alert.with_field("Guild only", "yes");
        }
        let subcommands: Vec<&str> = node.children().iter().map(|c| root.node(*c).name.as_str()).collect();
        if !subcommands.is_empty() {
            alert = alert.with_field("Subcommands", subcommands.join(", "));
        }
        if let Some(owner) = root.owner() {
            alert = alert.with_field("Module", owner.name());
        }
        Ok(alert)
    }

    fn info(&self, _ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let modules = handler.modules();
        let enabled = modules.iter().filter(|m| m.is_enabled()).count();

        Ok(Alert::info(format!("{} v{}", self.bot_name, env!("CARGO_PKG_VERSION")))
            .with_title("About")
            .with_field("Prefix", self.prefix.clone())
            .with_field("Modules", format!("{} loaded, {} enabled", modules.len(), enabled))
            .with_field("Commands", handler.registry().len().to_string()))
    }

    fn ping(&self, _ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        Ok(Alert::success(format!("Pong! Up for {}", format_uptime(self.started.elapsed()))))
    }

    fn diagnostics(&self, _ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let registry = handler.registry();
        let roots = registry.roots();
        let nodes: usize = roots.iter().map(|r| r.len()).sum();
        let modules = handler.modules();
        let enabled = modules.iter().filter(|m| m.is_enabled()).count();

        Ok(Alert::info(format!("Up for {}", format_uptime(self.started.elapsed())))
            .with_title("Diagnostics")
            .with_field("Root commands", roots.len().to_string())
            .with_field("Command nodes", nodes.to_string())
            .with_field("Modules loaded", modules.len().to_string())
            .with_field("Modules enabled", enabled.to_string())
            .with_field("Host entries", handler.loader().host().entries().len().to_string())
            .with_field("Modules directory", handler.loader().directory().display().to_string()))
    }

    fn list(&self, _ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let modules = handler.modules();

        let mut alert = Alert::info(format!("{} module(s) loaded", modules.len())).with_title("Modules");
        for module in &modules {
            let status = if module.is_enabled() { "enabled" } else { "disabled" };
            let builtin = if module.is_builtin() { ", built-in" } else { "" };
            alert = alert.with_field(
                module.name(),
                format!("v{} ({}{})", module.descriptor().version, status, builtin),
            );
        }
        Ok(alert)
    }

    fn module_info(&self, ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let name = ctx.args.next_required("module name")?;
        let module = match find(&handler, &name) {
            Ok(module) => module,
            Err(alert) => return Ok(alert),
        };

        let descriptor = module.descriptor();
        let commands: Vec<String> = handler
            .registry()
            .owned_by(module.handle())
            .iter()
            .map(|root| root.name().to_string())
            .collect();

        Ok(Alert::info(descriptor.description.clone().unwrap_or_else(|| "No description".to_string()))
            .with_title(descriptor.full_name())
            .with_field("Status", if module.is_enabled() { "enabled" } else { "disabled" })
            .with_field("Authors", join_or_none(&descriptor.authors))
            .with_field("Depends on", join_or_none(&descriptor.depend))
            .with_field("Soft depends on", join_or_none(&descriptor.softdepend))
            .with_field("Commands", join_or_none(&commands))
            .with_field("Loading context", format!("{:?}", module.loading_context())))
    }

    fn enable(&self, ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let name = ctx.args.next_required("module name")?;
        let module = match find(&handler, &name) {
            Ok(module) => module,
            Err(alert) => return Ok(alert),
        };

        if module.is_enabled() {
            return Ok(Alert::info(format!("Module `{}` is already enabled", name)));
        }

        Ok(match handler.enable(&module) {
            Ok(()) => Alert::success(format!("Enabled module `{}`", name)),
            Err(e) => Alert::error(e.to_string()).with_title("Enable failed"),
        })
    }

    fn disable(&self, ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let name = ctx.args.next_required("module name")?;
        let module = match find(&handler, &name) {
            Ok(module) => module,
            Err(alert) => return Ok(alert),
        };

        if module.is_builtin() {
            return Ok(Alert::warning(format!("The built-in module `{}` cannot be disabled", name)));
        }
        if !module.is_enabled() {
            return Ok(Alert::info(format!("Module `{}` is already disabled", name)));
        }

        let mut disabled = Vec::new();
        disable_cascade(&handler, &module, &mut disabled).map_err(CommandError::execution)?;
        Ok(cascade_report(format!("Disabled module `{}`", name), &name, &disabled))
    }

    fn load(&self, ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let name = ctx.args.next_required("module name")?;

        if handler.get(&name).is_some() {
            return Ok(Alert::warning(format!("Module `{}` is already loaded", name)));
        }

        let module = match handler.load_by_name(&name) {
            Ok(module) => module,
            Err(e) => return Ok(Alert::error(e.to_string()).with_title("Load failed")),
        };

        Ok(match handler.enable(&module) {
            Ok(()) => Alert::success(format!("Loaded and enabled module `{}`", name)),
            Err(e) => Alert::warning(format!("Loaded module `{}`, but it stays disabled: {}", name, e)),
        })
    }

    fn unload(&self, ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let name = ctx.args.next_required("module name")?;
        let module = match find(&handler, &name) {
            Ok(module) => module,
            Err(alert) => return Ok(alert),
        };

        if module.is_builtin() {
            return Ok(Alert::warning(format!("The built-in module `{}` cannot be unloaded", name)));
        }

        let mut disabled = Vec::new();
        disable_cascade(&handler, &module, &mut disabled).map_err(CommandError::execution)?;
        handler.unload(&module).map_err(CommandError::execution)?;
        Ok(cascade_report(format!("Unloaded module `{}`", name), &name, &disabled))
    }

    fn reload(&self, ctx: &mut CommandContext<'_>) -> CommandResult<Alert> {
        let handler = self.handler()?;
        let name = ctx.args.next_required("module name")?;
        let module = match find(&handler, &name) {
            Ok(module) => module,
            Err(alert) => return Ok(alert),
        };

        if module.is_builtin() {
            return Ok(Alert::warning(format!("The built-in module `{}` cannot be reloaded", name)));
        }

        let was_enabled = module.is_enabled();
        let mut disabled = Vec::new();
        disable_cascade(&handler, &module, &mut disabled).map_err(CommandError::execution)?;
        handler.unload(&module).map_err(CommandError::execution)?;
        drop(module);

        let module = match handler.load_by_name(&name) {
            Ok(module) => module,
            Err(e) => return Ok(Alert::error(format!("Unloaded `{}` but could not load it again: {}", name, e))),
        };
        if was_enabled {
            if let Err(e) = handler.enable(&module) {
                return Ok(Alert::warning(format!("Reloaded module `{}`, but it stays disabled: {}", name, e)));
            }
        }

        Ok(cascade_report(format!("Reloaded module `{}`", name), &name, &disabled))
    }
}

fn find(handler: &ModuleHandler, name: &str) -> Result<Arc<LoadedModule>, Alert> {
    handler
        .get(name)
        .ok_or_else(|| Alert::warning(format!("No module named `{}` is loaded", name)))
}

/// Disable `module` after every enabled module that requires it, depth first.
/// Names are pushed in the order they were disabled.
fn disable_cascade(handler: &ModuleHandler, module: &LoadedModule, disabled: &mut Vec<String>) -> ModuleResult<()> {
    for dependent in handler.dependents(module.name()) {
        if dependent.is_builtin() || disabled.iter().any(|d| d == dependent.name()) {
            continue;
        }
        disable_cascade(handler, &dependent, disabled)?;
    }

    if module.is_enabled() {
        handler.disable(module)?;
        disabled.push(module.name().to_string());
    }
    Ok(())
}

fn cascade_report(summary: String, name: &str, disabled: &[String]) -> Alert {
    let dependents: Vec<&str> = disabled.iter().map(String::as_str).filter(|d| *d != name).collect();
    let alert = Alert::success(summary);
    if dependents.is_empty() {
        alert
    } else {
        alert.with_field("Also disabled", dependents.join(", "))
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, hours, minutes, seconds) = (secs / 86_400, secs / 3600 % 24, secs / 60 % 60, secs % 60);
    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::CommandRegistry;
    use crate::domain::entities::{AlertKind, Arguments, Message, User};
    use crate::infrastructure::modules::{HostContext, ModuleLoader};
    use std::path::PathBuf;

    struct Stock;

    impl Module for Stock {
        fn on_enable(&self, ctx: &ModuleContext<'_>) -> ModuleResult<()> {
            ctx.register_command(Command::new("stock").with_handler(|_| Ok(Alert::info("42 items"))))
        }
    }

    struct Shop;

    impl Module for Shop {
        fn on_enable(&self, ctx: &ModuleContext<'_>) -> ModuleResult<()> {
            ctx.register_command(Command::new("buy").with_args("<item>").with_handler(|ctx| {
                let item = ctx.args.next_required("item")?;
                Ok(Alert::success(format!("bought {}", item)))
            }))
        }
    }

    fn stock() -> Box<dyn Module> {
        Box::new(Stock)
    }

    fn shop() -> Box<dyn Module> {
        Box::new(Shop)
    }

    fn setup() -> (Arc<ModuleHandler>, PathBuf) {
        let dir = std::env::temp_dir().join(format!("modbot-base-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stock.yml"), "name: stock\nversion: '1.0'\nmain: stock\n").unwrap();
        std::fs::write(dir.join("shop.yml"), "name: shop\nversion: '2.0'\nmain: shop\ndepend: [stock]\n").unwrap();

        let host = Arc::new(HostContext::new().with("stock", stock).with("shop", shop));
        let handler = Arc::new(ModuleHandler::new(
            Arc::new(CommandRegistry::new()),
            ModuleLoader::new(&dir, host),
        ));
        let base = BaseModule::new(&handler, "testbot", "!");
        handler.bootstrap(descriptor(), Box::new(base)).unwrap();
        (handler, dir)
    }

    /// Resolve and run a command line the way the dispatcher walks the tree
    fn run(handler: &ModuleHandler, line: &str) -> CommandResult<Alert> {
        let (label, rest) = line.split_once(' ').unwrap_or((line, ""));
        let root = handler.registry().get(label).expect("command is registered");
        let mut args = Arguments::new(rest);
        let mut node = ROOT;
        while let Some(token) = args.next() {
            match root.find_child(node, &token) {
                Some(child) => node = child,
                None => {
                    args.backtrack();
                    break;
                }
            }
        }
        let message = Message::new(1, User::new(1), 2, line);
        root.execute(node, &message, &mut args)
    }

    #[test]
    fn test_bootstrap_registers_base_commands() {
        let (handler, dir) = setup();
        let base = handler.get(NAME).unwrap();
        assert!(base.is_builtin());
        assert!(base.is_enabled());
        for label in ["help", "?", "info", "ping", "diag", "module", "mod"] {
            assert!(handler.registry().get(label).is_some(), "missing {}", label);
        }
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_help_describes_subcommand() {
        let (handler, dir) = setup();

        let overview = run(&handler, "help").unwrap();
        assert!(overview.fields.iter().any(|(name, _)| name == "!ping"));

        let detail = run(&handler, "help module enable").unwrap();
        assert_eq!(detail.title.as_deref(), Some("!module enable <name>"));

        let group = run(&handler, "help module").unwrap();
        assert!(group.fields.iter().any(|(name, value)| name == "Permission" && value == MODULE_PERMISSION));
        assert!(group.fields.iter().any(|(name, value)| name == "Subcommands" && value.contains("reload")));

        let unknown = run(&handler, "help module frobnicate").unwrap();
        assert_eq!(unknown.kind, AlertKind::Warning);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_name_is_syntax_error() {
        let (handler, dir) = setup();
        assert!(matches!(run(&handler, "module enable"), Err(CommandError::Syntax(_))));
        // group node without a handler
        assert!(matches!(run(&handler, "module"), Err(CommandError::Syntax(_))));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_load_and_cascading_disable() {
        let (handler, dir) = setup();

        let loaded = run(&handler, "module load stock").unwrap();
        assert_eq!(loaded.kind, AlertKind::Success);
        run(&handler, "module load shop").unwrap();
        assert!(handler.is_enabled("shop"));
        assert!(handler.registry().get("buy").is_some());

        let report = run(&handler, "module disable stock").unwrap();
        assert!(report.fields.iter().any(|(name, value)| name == "Also disabled" && value == "shop"));
        assert!(!handler.is_enabled("stock"));
        assert!(!handler.is_enabled("shop"));
        assert!(handler.registry().get("buy").is_none());
        assert!(handler.registry().get("stock").is_none());

        // shop cannot come back before stock
        let refused = run(&handler, "module enable shop").unwrap();
        assert_eq!(refused.kind, AlertKind::Error);
        assert!(refused.body.contains("stock"));

        run(&handler, "module enable stock").unwrap();
        run(&handler, "module enable shop").unwrap();
        assert!(handler.is_enabled("shop"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_load_with_missing_dependency_stays_disabled() {
        let (handler, dir) = setup();
        let alert = run(&handler, "module load shop").unwrap();
        assert_eq!(alert.kind, AlertKind::Warning);
        assert!(handler.get("shop").is_some());
        assert!(!handler.is_enabled("shop"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_builtin_is_protected() {
        let (handler, dir) = setup();
        for line in ["module disable base", "module unload base", "module reload base"] {
            assert_eq!(run(&handler, line).unwrap().kind, AlertKind::Warning);
        }
        assert!(handler.is_enabled(NAME));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_unload_and_reload() {
        let (handler, dir) = setup();
        run(&handler, "module load stock").unwrap();
        let before = handler.get("stock").unwrap();

        run(&handler, "module reload stock").unwrap();
        let after = handler.get("stock").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.is_enabled());
        assert!(handler.registry().get("stock").is_some());

        run(&handler, "module unload stock").unwrap();
        assert!(handler.get("stock").is_none());
        assert!(handler.registry().get("stock").is_none());

        let unknown = run(&handler, "module info stock").unwrap();
        assert_eq!(unknown.kind, AlertKind::Warning);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_list_and_info() {
        let (handler, dir) = setup();
        run(&handler, "module load stock").unwrap();

        let list = run(&handler, "module list").unwrap();
        assert!(list.fields.iter().any(|(name, value)| name == "base" && value.contains("built-in")));
        assert!(list.fields.iter().any(|(name, value)| name == "stock" && value.contains("enabled")));

        let info = run(&handler, "module info stock").unwrap();
        assert_eq!(info.title.as_deref(), Some(handler.get("stock").unwrap().descriptor().full_name().as_str()));
        assert!(info.fields.iter().any(|(name, value)| name == "Commands" && value == "stock"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_ping_and_uptime_format() {
        let (handler, dir) = setup();
        let pong = run(&handler, "ping").unwrap();
        assert!(pong.body.starts_with("Pong!"));
        assert!(run(&handler, "diagnostics").unwrap().fields.iter().any(|(name, _)| name == "Root commands"));

        assert_eq!(format_uptime(Duration::from_secs(5)), "5s");
        assert_eq!(format_uptime(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 1h 1m 1s");
        std::fs::remove_dir_all(dir).ok();
    }
}
