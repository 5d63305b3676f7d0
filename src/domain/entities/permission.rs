use serde::{Deserialize, Serialize};

/// Who an override applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    User(u64),
    Role(u64),
}

impl Subject {
    pub fn kind(&self) -> &str {
        match self {
            Subject::User(_) => "user",
            Subject::Role(_) => "role",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Subject::User(id) | Subject::Role(id) => *id,
        }
    }
}

/// A stored grant or deny for a permission node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    pub subject: Subject,
    /// Exact node (`mod.ban`), a wildcard (`mod.*`), or `*`
    pub node: String,
    pub channel: Option<u64>,
    pub allow: bool,
}

impl Override {
    pub fn grant(subject: Subject, node: impl Into<String>) -> Self {
        Self {
            subject,
            node: node.into(),
            channel: None,
            allow: true,
        }
    }

    pub fn deny(subject: Subject, node: impl Into<String>) -> Self {
        Self {
            allow: false,
            ..Self::grant(subject, node)
        }
    }

    pub fn in_channel(mut self, channel: u64) -> Self {
        self.channel = Some(channel);
        self
    }

    /// How closely this override's node matches `node`, or None if it does not.
    ///
    /// Exact matches rank above every wildcard; longer wildcard prefixes rank
    /// above shorter ones.
    pub fn node_specificity(&self, node: &str) -> Option<usize> {
        if self.node.eq_ignore_ascii_case(node) {
            return Some(usize::MAX);
        }
        if self.node == "*" {
            return Some(0);
        }
        let prefix = self.node.strip_suffix(".*")?;
        let lowered = node.to_ascii_lowercase();
        let prefix = prefix.to_ascii_lowercase();
        if lowered.len() > prefix.len()
            && lowered.starts_with(&prefix)
            && lowered.as_bytes()[prefix.len()] == b'.'
        {
            Some(prefix.len() + 1)
        } else {
            None
        }
    }
}

/// Member data the gateway attaches to guild messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberInfo {
    pub roles: Vec<u64>,
    /// Holds a role with the platform's full administrator flag
    pub administrator: bool,
}
