//! Message parser - Splits a message body into a command label and raw arguments

use once_cell::sync::Lazy;
use regex_lite::Regex;

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<@!?(\d+)>").expect("mention pattern is valid"));

/// A command invocation found in a message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub label: String,
    /// Everything after the label, leading whitespace removed
    pub args: String,
}

/// Recognises commands addressed with the prefix or by mentioning the bot
#[derive(Debug, Clone)]
pub struct MessageParser {
    command_prefix: String,
    bot_id: Option<u64>,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
            bot_id: None,
        }
    }

    /// Also accept `<@bot_id> label ...`
    pub fn with_bot_id(mut self, bot_id: u64) -> Self {
        self.bot_id = Some(bot_id);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.command_prefix
    }

    pub fn parse(&self, body: &str) -> Option<ParsedCommand> {
        let body = body.trim_start();
        let rest = self.strip_prefix(body)?;

        let label_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let label = &rest[..label_end];
        if label.is_empty() {
            return None;
        }

        Some(ParsedCommand {
            label: label.to_string(),
            args: rest[label_end..].trim_start().to_string(),
        })
    }

    /// The label must follow the prefix directly; after a mention any
    /// whitespace is allowed.
    fn strip_prefix<'a>(&self, body: &'a str) -> Option<&'a str> {
        if !self.command_prefix.is_empty() {
            if let Some(rest) = body.strip_prefix(self.command_prefix.as_str()) {
                return Some(rest);
            }
        }

        let bot_id = self.bot_id?;
        let caps = MENTION.captures(body)?;
        let whole = caps.get(0)?;
        let id: u64 = caps.get(1)?.as_str().parse().ok()?;
        if id == bot_id {
            Some(body[whole.end()..].trim_start())
        } else {
            None
        }
    }
}
