//! Command tree
//!
//! Modules describe commands with the [`Command`] builder. Registration turns a
//! builder into a [`RootCommand`], which owns every node of its subtree in a
//! flat arena. Nodes refer to their parent by [`NodeId`], so walking upwards
//! never needs an owning pointer.

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::{Alert, Arguments, Message, ModuleHandle};
use crate::application::errors::{CommandError, CommandResult};

/// Index of a node inside its [`RootCommand`]
pub type NodeId = usize;

/// The root node always sits at index 0
pub const ROOT: NodeId = 0;

/// Command handler function type
pub type CommandHandler = Arc<dyn Fn(&mut CommandContext<'_>) -> CommandResult<Alert> + Send + Sync>;

/// Declarative description of a command and its subcommands
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    /// Argument hint appended to the usage line, e.g. `<user> [reason]`
    pub arg_info: Option<String>,
    pub permission: Option<String>,
    pub guild_only: bool,
    /// Delete the trigger and the reply after the configured delay
    pub cleanup: bool,
    pub handler: Option<CommandHandler>,
    pub children: Vec<Command>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: None,
            arg_info: None,
            permission: None,
            guild_only: false,
            cleanup: false,
            handler: None,
            children: Vec::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_args(mut self, arg_info: impl Into<String>) -> Self {
        self.arg_info = Some(arg_info.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn guild_only(mut self) -> Self {
        self.guild_only = true;
        self
    }

    pub fn cleanup(mut self) -> Self {
        self.cleanup = true;
        self
    }

    pub fn with_child(mut self, child: Command) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut CommandContext<'_>) -> CommandResult<Alert> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Name followed by aliases, lower-cased
    fn labels(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|label| label.to_lowercase())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("permission", &self.permission)
            .field("children", &self.children)
            .finish()
    }
}

/// Where a node sits in its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Nested { parent: NodeId },
}

/// A node in a registered command tree
pub struct CommandNode {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub arg_info: Option<String>,
    pub permission: Option<String>,
    pub guild_only: bool,
    pub cleanup: bool,
    handler: Option<CommandHandler>,
    kind: NodeKind,
    children: Vec<NodeId>,
    path: OnceCell<String>,
    usage: OnceCell<String>,
}

impl CommandNode {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn matches(&self, input: &str) -> bool {
        self.name.eq_ignore_ascii_case(input) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(input))
    }
}

/// A top-level command, owning its whole subtree
pub struct RootCommand {
    nodes: Vec<CommandNode>,
    owner: Option<ModuleHandle>,
    // Keeps the code behind the handlers mapped. Must stay the last field so
    // the handlers drop first.
    code: Option<Arc<dyn Any + Send + Sync>>,
}

impl RootCommand {
    /// Flatten a builder into an arena, rejecting invalid names and sibling collisions.
    pub fn new(command: Command) -> CommandResult<Self> {
        let mut nodes: Vec<CommandNode> = Vec::new();
        let mut queue: VecDeque<(Command, NodeKind)> = VecDeque::new();
        queue.push_back((command, NodeKind::Root));

        while let Some((command, kind)) = queue.pop_front() {
            validate_name(&command.name)?;
            for alias in &command.aliases {
                validate_name(alias)?;
            }

            let mut sibling_labels = HashSet::new();
            for child in &command.children {
                for label in child.labels() {
                    if !sibling_labels.insert(label.clone()) {
                        return Err(CommandError::DuplicateName(format!("{} {}", command.name, label)));
                    }
                }
            }

            let id = nodes.len();
            if let NodeKind::Nested { parent } = kind {
                nodes[parent].children.push(id);
            }

            let Command {
                name,
                aliases,
                description,
                arg_info,
                permission,
                guild_only,
                cleanup,
                handler,
                children,
            } = command;

            nodes.push(CommandNode {
                name,
                aliases,
                description,
                arg_info,
                permission,
                guild_only,
                cleanup,
                handler,
                kind,
                children: Vec::new(),
                path: OnceCell::new(),
                usage: OnceCell::new(),
            });

            for child in children {
                queue.push_back((child, NodeKind::Nested { parent: id }));
            }
        }

        Ok(Self {
            nodes,
            owner: None,
            code: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.nodes[ROOT].name
    }

    pub fn root(&self) -> &CommandNode {
        &self.nodes[ROOT]
    }

    pub fn node(&self, id: NodeId) -> &CommandNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Lower-cased name and aliases of the root, used as registry keys
    pub fn labels(&self) -> Vec<String> {
        let root = self.root();
        std::iter::once(&root.name)
            .chain(root.aliases.iter())
            .map(|label| label.to_lowercase())
            .collect()
    }

    pub fn owner(&self) -> Option<&ModuleHandle> {
        self.owner.as_ref()
    }

    pub(crate) fn set_owner(&mut self, owner: ModuleHandle) {
        self.owner = Some(owner);
    }

    /// Tie the lifetime of whatever holds the handler code (a module's
    /// loading context) to this command. Outstanding references to the
    /// command keep it alive after the module is unloaded.
    pub fn with_code(mut self, code: Arc<dyn Any + Send + Sync>) -> Self {
        self.code = Some(code);
        self
    }

    pub fn code(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.code.as_ref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        match self.nodes[id].kind {
            NodeKind::Root => None,
            NodeKind::Nested { parent } => Some(parent),
        }
    }

    pub fn find_child(&self, id: NodeId, label: &str) -> Option<NodeId> {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .find(|child| self.nodes[*child].matches(label))
    }

    /// Descend as far as `labels` match, returning the deepest node reached
    /// and how many labels were used.
    pub fn resolve<'a, I>(&self, labels: I) -> (NodeId, usize)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut current = ROOT;
        let mut used = 0;
        for label in labels {
            match self.find_child(current, label) {
                Some(child) => {
                    current = child;
                    used += 1;
                }
                None => break,
            }
        }
        (current, used)
    }

    /// Space-separated names from the root down to `id`
    pub fn path(&self, id: NodeId) -> &str {
        self.nodes[id].path.get_or_init(|| {
            let mut names = vec![self.nodes[id].name.as_str()];
            let mut current = id;
            while let Some(parent) = self.parent(current) {
                names.push(self.nodes[parent].name.as_str());
                current = parent;
            }
            names.reverse();
            names.join(" ")
        })
    }

    /// Path followed by the node's argument hint. Computed once per node.
    pub fn usage(&self, id: NodeId) -> &str {
        self.nodes[id].usage.get_or_init(|| {
            let node = &self.nodes[id];
            let mut usage = self.path(id).to_string();
            if let Some(arg_info) = &node.arg_info {
                usage.push(' ');
                usage.push_str(arg_info);
            } else if !node.children.is_empty() && node.handler.is_none() {
                let names: Vec<&str> = node.children.iter().map(|c| self.nodes[*c].name.as_str()).collect();
                usage.push_str(&format!(" <{}>", names.join("|")));
            }
            usage
        })
    }

    /// Run the handler at `id`. A node without a handler reports its usage.
    pub fn execute(&self, id: NodeId, message: &Message, args: &mut Arguments) -> CommandResult<Alert> {
        match &self.nodes[id].handler {
            Some(handler) => {
                let mut ctx = CommandContext {
                    message,
                    args,
                    root: self,
                    node: id,
                };
                handler(&mut ctx)
            }
            None => Err(CommandError::syntax("a subcommand is required")),
        }
    }
}

impl fmt::Debug for RootCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootCommand")
            .field("name", &self.name())
            .field("nodes", &self.nodes.len())
            .field("owner", &self.owner.as_ref().map(|o| o.name().to_string()))
            .finish()
    }
}

fn validate_name(name: &str) -> CommandResult<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(CommandError::InvalidTree(format!("invalid command name '{}'", name)));
    }
    Ok(())
}

/// What a handler sees while it runs
pub struct CommandContext<'a> {
    pub message: &'a Message,
    pub args: &'a mut Arguments,
    pub root: &'a RootCommand,
    pub node: NodeId,
}

impl CommandContext<'_> {
    pub fn command(&self) -> &CommandNode {
        self.root.node(self.node)
    }

    pub fn usage(&self) -> &str {
        self.root.usage(self.node)
    }

    pub fn author_id(&self) -> u64 {
        self.message.author.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> RootCommand {
        RootCommand::new(
            Command::new("mod")
                .with_aliases(["m"])
                .with_permission("mod")
                .with_child(
                    Command::new("ban")
                        .with_args("<user> [reason]")
                        .with_permission("mod.ban")
                        .with_handler(|_| Ok(Alert::success("banned"))),
                )
                .with_child(
                    Command::new("role")
                        .with_child(Command::new("add").with_args("<user> <role>"))
                        .with_child(Command::new("remove").with_aliases(["rm"])),
                ),
        )
        .expect("valid tree")
    }

    #[test]
    fn test_child_usage_starts_with_parent_path() {
        let root = tree();
        let (role, used) = root.resolve(["role"]);
        assert_eq!(used, 1);
        let (add, _) = root.resolve(["role", "add"]);

        assert_eq!(root.usage(add), "mod role add <user> <role>");
        assert!(root.usage(add).starts_with(root.path(role)));

        for id in 1..root.len() {
            let parent = root.parent(id).expect("nested node has a parent");
            assert!(root.usage(id).starts_with(root.path(parent)));
        }
    }

    #[test]
    fn test_group_usage_lists_children() {
        let root = tree();
        assert_eq!(root.usage(ROOT), "mod <ban|role>");
    }

    #[test]
    fn test_resolve_by_alias_case_insensitive() {
        let root = tree();
        let (node, used) = root.resolve(["ROLE", "rm", "extra"]);
        assert_eq!(used, 2);
        assert_eq!(root.node(node).name, "remove");
    }

    #[test]
    fn test_sibling_collision_rejected() {
        let result = RootCommand::new(
            Command::new("x")
                .with_child(Command::new("a").with_aliases(["b"]))
                .with_child(Command::new("b")),
        );
        assert!(matches!(result, Err(CommandError::DuplicateName(_))));
    }

    #[test]
    fn test_same_name_allowed_in_different_subtrees() {
        let result = RootCommand::new(
            Command::new("x")
                .with_child(Command::new("a").with_child(Command::new("list")))
                .with_child(Command::new("b").with_child(Command::new("list"))),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_name_rejected() {
        let result = RootCommand::new(Command::new("two words"));
        assert!(matches!(result, Err(CommandError::InvalidTree(_))));
    }

    #[test]
    fn test_group_without_handler_is_syntax_error() {
        let root = tree();
        let (role, _) = root.resolve(["role"]);
        let message = Message::new(1, super::super::User::new(2), 3, "!mod role");
        let mut args = Arguments::new("");
        assert!(matches!(root.execute(role, &message, &mut args), Err(CommandError::Syntax(_))));
    }

    #[test]
    fn test_execute_runs_handler() {
        let root = tree();
        let (ban, _) = root.resolve(["ban"]);
        let message = Message::new(1, super::super::User::new(2), 3, "!mod ban 4");
        let mut args = Arguments::new("4");
        assert_eq!(root.execute(ban, &message, &mut args), Ok(Alert::success("banned")));
    }
}
