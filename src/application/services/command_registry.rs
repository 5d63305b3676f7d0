//! Command registry - root commands keyed by lower-cased name and alias

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::application::errors::{CommandError, CommandResult};
use crate::domain::entities::{ModuleHandle, RootCommand};

#[derive(Default)]
struct Inner {
    /// Primary name -> command
    roots: HashMap<String, Arc<RootCommand>>,
    /// Every name and alias -> primary name
    labels: HashMap<String, String>,
}

/// Registry for the root commands of every enabled module.
///
/// All mutation happens under a single write lock, so a lookup either sees
/// a module's full set of commands or none of them.
#[derive(Default)]
pub struct CommandRegistry {
    inner: RwLock<Inner>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a batch of root commands owned by `owner`.
    ///
    /// Either every command is registered or, on the first name clash, none is.
    pub fn register_root_commands(
        &self,
        owner: &ModuleHandle,
        commands: impl IntoIterator<Item = RootCommand>,
    ) -> CommandResult<()> {
        let commands: Vec<RootCommand> = commands.into_iter().collect();
        let mut inner = self.write();

        let mut pending: HashMap<String, String> = HashMap::new();
        for command in &commands {
            let primary = command.name().to_lowercase();
            for label in command.labels() {
                if inner.labels.contains_key(&label) || pending.contains_key(&label) {
                    return Err(CommandError::DuplicateName(label));
                }
                pending.insert(label, primary.clone());
            }
        }

        for mut command in commands {
            command.set_owner(owner.clone());
            let primary = command.name().to_lowercase();
            tracing::debug!("Registered command '{}' for module {}", primary, owner.name());
            inner.roots.insert(primary, Arc::new(command));
        }
        inner.labels.extend(pending);
        Ok(())
    }

    pub fn register(&self, owner: &ModuleHandle, command: RootCommand) -> CommandResult<()> {
        self.register_root_commands(owner, [command])
    }

    /// Remove every root command owned by `owner`, returning how many went.
    pub fn unregister_all(&self, owner: &ModuleHandle) -> usize {
        let mut inner = self.write();

        let removed: Vec<String> = inner
            .roots
            .iter()
            .filter(|(_, command)| command.owner().map_or(false, |o| o.same_module(owner)))
            .map(|(name, _)| name.clone())
            .collect();

        for name in &removed {
            inner.roots.remove(name);
        }
        inner.labels.retain(|_, primary| !removed.contains(primary));

        if !removed.is_empty() {
            tracing::debug!("Unregistered {} command(s) of module {}", removed.len(), owner.name());
        }
        removed.len()
    }

    /// Look up a root command by name or alias, case-insensitively
    pub fn get(&self, label: &str) -> Option<Arc<RootCommand>> {
        let inner = self.read();
        let primary = inner.labels.get(&label.to_lowercase())?;
        inner.roots.get(primary).cloned()
    }

    /// All root commands, sorted by name
    pub fn roots(&self) -> Vec<Arc<RootCommand>> {
        let mut roots: Vec<_> = self.read().roots.values().cloned().collect();
        roots.sort_by(|a, b| a.name().cmp(b.name()));
        roots
    }

    pub fn owned_by(&self, owner: &ModuleHandle) -> Vec<Arc<RootCommand>> {
        self.roots()
            .into_iter()
            .filter(|command| command.owner().map_or(false, |o| o.same_module(owner)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
