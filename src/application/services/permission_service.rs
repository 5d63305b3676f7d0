//! Permission resolution against per-guild overrides

use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::entities::{Message, Override, Subject};
use crate::domain::traits::PermissionStore;

/// The identity a permission check is made for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: u64,
    pub guild_id: Option<u64>,
    pub roles: Vec<u64>,
    pub administrator: bool,
}

impl Caller {
    pub fn from_message(message: &Message) -> Self {
        let member = message.member.clone().unwrap_or_default();
        Self {
            user_id: message.author.id,
            guild_id: message.guild_id,
            roles: member.roles,
            administrator: member.administrator,
        }
    }

    /// Roles including the implicit everyone role, which shares the guild's id
    pub fn effective_roles(&self) -> Vec<u64> {
        let mut roles = self.roles.clone();
        if let Some(guild_id) = self.guild_id {
            if !roles.contains(&guild_id) {
                roles.push(guild_id);
            }
        }
        roles
    }
}

/// Ordering key for matching overrides; larger is more specific
type Rank = (bool, usize, bool);

/// Decide a node from a guild's overrides. No matching override means deny.
///
/// Channel-scoped overrides outrank guild-wide ones, then exact nodes outrank
/// wildcards, then user overrides outrank role overrides. A deny wins a tie.
pub fn evaluate(overrides: &[Override], user_id: u64, roles: &[u64], node: &str, channel_id: u64) -> bool {
    let mut best: Option<(Rank, bool)> = None;

    for o in overrides {
        let applies = match o.subject {
            Subject::User(id) => id == user_id,
            Subject::Role(id) => roles.contains(&id),
        };
        if !applies || o.channel.map_or(false, |c| c != channel_id) {
            continue;
        }
        let Some(specificity) = o.node_specificity(node) else {
            continue;
        };

        let rank = (o.channel.is_some(), specificity, matches!(o.subject, Subject::User(_)));
        best = match best {
            Some((current, allow)) if current > rank => Some((current, allow)),
            Some((current, allow)) if current == rank => Some((current, allow && o.allow)),
            _ => Some((rank, o.allow)),
        };
    }

    best.map_or(false, |(_, allow)| allow)
}

/// Answers `has_permission` queries for dispatch
pub struct PermissionResolver {
    store: Arc<dyn PermissionStore>,
    global_admins: HashSet<u64>,
    admin_roles: HashSet<u64>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self {
            store,
            global_admins: HashSet::new(),
            admin_roles: HashSet::new(),
        }
    }

    pub fn with_global_admins(mut self, admins: impl IntoIterator<Item = u64>) -> Self {
        self.global_admins.extend(admins);
        self
    }

    /// Roles treated as full administrator on top of the gateway's own flag
    pub fn with_admin_roles(mut self, roles: impl IntoIterator<Item = u64>) -> Self {
        self.admin_roles.extend(roles);
        self
    }

    pub fn is_global_admin(&self, user_id: u64) -> bool {
        self.global_admins.contains(&user_id)
    }

    pub async fn has_permission(&self, caller: &Caller, node: &str, channel_id: u64) -> bool {
        if self.is_global_admin(caller.user_id) || caller.administrator {
            return true;
        }
        if caller.roles.iter().any(|role| self.admin_roles.contains(role)) {
            return true;
        }

        let Some(guild_id) = caller.guild_id else {
            return false;
        };

        let overrides = match self.store.fetch_overrides(guild_id).await {
            Ok(overrides) => overrides,
            Err(e) => {
                tracing::warn!("No permission data for guild {}: {}", guild_id, e);
                Vec::new()
            }
        };

        evaluate(&overrides, caller.user_id, &caller.effective_roles(), node, channel_id)
    }
}
