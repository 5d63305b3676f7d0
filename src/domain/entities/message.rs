use super::{MemberInfo, User};
use chrono::{DateTime, Utc};

/// Normalized inbound message event handed over by the gateway
#[derive(Debug, Clone)]
pub struct Message {
    pub id: u64,
    pub author: User,
    pub body: String,
    pub channel_id: u64,
    /// Group DM or other multi-user channel outside a guild
    pub channel_is_group: bool,
    pub guild_id: Option<u64>,
    /// Present for guild messages
    pub member: Option<MemberInfo>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(id: u64, author: User, channel_id: u64, body: impl Into<String>) -> Self {
        Self {
            id,
            author,
            body: body.into(),
            channel_id,
            channel_is_group: false,
            guild_id: None,
            member: None,
            timestamp: Utc::now(),
        }
    }

    pub fn in_guild(mut self, guild_id: u64, member: MemberInfo) -> Self {
        self.guild_id = Some(guild_id);
        self.member = Some(member);
        self
    }

    pub fn in_group(mut self) -> Self {
        self.channel_is_group = true;
        self
    }

    pub fn is_guild(&self) -> bool {
        self.guild_id.is_some()
    }
}

/// Reference to a message the bot has sent or received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}
