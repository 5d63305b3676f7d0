//! Lazily tokenized, backtrackable command arguments

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::application::errors::{CommandError, CommandResult};

/// Matches a raw snowflake id or a user / role / channel mention.
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:<(?:@!?|@&|#))?(\d{1,20})>?$").expect("id pattern is valid")
});

#[derive(Debug, Clone)]
struct Token {
    value: String,
    start: usize,
}

/// Argument stream for a single dispatch.
///
/// Tokens are scanned out of the raw string on demand and cached, so the
/// stream can be rewound one step at a time without re-parsing. Whitespace
/// separates tokens; a double-quoted token keeps its inner spaces.
#[derive(Debug, Clone)]
pub struct Arguments {
    raw: String,
    scan_pos: usize,
    tokens: Vec<Token>,
    cursor: usize,
}

impl Arguments {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            scan_pos: 0,
            tokens: Vec::new(),
            cursor: 0,
        }
    }

    /// The untouched input this stream was built from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Number of tokens consumed so far
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Look at the next token without consuming it
    pub fn peek(&mut self) -> Option<&str> {
        if self.fill() {
            Some(self.tokens[self.cursor].value.as_str())
        } else {
            None
        }
    }

    /// Rewind the cursor by one token. Returns false at the start of the stream.
    pub fn backtrack(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn has_next(&mut self) -> bool {
        self.fill()
    }

    /// Consume and return everything left, verbatim, or None if nothing is left
    pub fn rest(&mut self) -> Option<String> {
        let start = if self.fill() {
            self.tokens[self.cursor].start
        } else {
            self.scan_pos
        };
        let rest = self.raw[start..].trim().to_string();

        while self.scan_one() {}
        self.cursor = self.tokens.len();

        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Next token, or a syntax error naming what was expected
    pub fn next_required(&mut self, what: &str) -> CommandResult<String> {
        self.next()
            .ok_or_else(|| CommandError::syntax(format!("missing {}", what)))
    }

    pub fn next_u64(&mut self, what: &str) -> CommandResult<u64> {
        let token = self.next_required(what)?;
        token
            .parse()
            .map_err(|_| CommandError::syntax(format!("{} must be a number, got '{}'", what, token)))
    }

    /// Next token as an id, accepting either a raw id or a mention
    pub fn next_id(&mut self, what: &str) -> CommandResult<u64> {
        let token = self.next_required(what)?;
        parse_id(&token)
            .ok_or_else(|| CommandError::syntax(format!("{} must be an id or mention, got '{}'", what, token)))
    }

    /// Make sure a token exists at the cursor, scanning one more if needed.
    fn fill(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            return true;
        }
        self.scan_one()
    }

    fn scan_one(&mut self) -> bool {
        let bytes = self.raw.as_bytes();
        let mut pos = self.scan_pos;
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            self.scan_pos = pos;
            return false;
        }

        let start = pos;
        let value = if bytes[pos] == b'"' {
            let body_start = pos + 1;
            match self.raw[body_start..].find('"') {
                Some(offset) => {
                    pos = body_start + offset + 1;
                    self.raw[body_start..body_start + offset].to_string()
                }
                // unterminated quote takes the rest of the line
                None => {
                    pos = bytes.len();
                    self.raw[body_start..].to_string()
                }
            }
        } else {
            while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            self.raw[start..pos].to_string()
        };

        self.scan_pos = pos;
        self.tokens.push(Token { value, start });
        true
    }
}

impl Iterator for Arguments {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if !self.fill() {
            return None;
        }
        let value = self.tokens[self.cursor].value.clone();
        self.cursor += 1;
        Some(value)
    }
}

/// Parse a raw id or a `<@id>`, `<@!id>`, `<@&id>`, `<#id>` mention
pub fn parse_id(token: &str) -> Option<u64> {
    let caps = ID_PATTERN.captures(token)?;
    let mentioned = token.starts_with('<');
    if mentioned != token.ends_with('>') {
        return None;
    }
    caps.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_in_order() {
        let args = Arguments::new("a b c");
        let tokens: Vec<String> = args.collect();
        assert_eq!(tokens, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_backtrack_returns_same_token() {
        let mut args = Arguments::new("a b c");
        assert_eq!(args.next().as_deref(), Some("a"));
        assert_eq!(args.next().as_deref(), Some("b"));
        assert!(args.backtrack());
        assert_eq!(args.next().as_deref(), Some("b"));
        assert_eq!(args.next().as_deref(), Some("c"));
        assert_eq!(args.next(), None);
    }

    #[test]
    fn test_next_backtrack_never_loses_tokens() {
        let mut args = Arguments::new("a b c");
        let mut seen = Vec::new();
        while let Some(token) = args.next() {
            assert!(args.backtrack());
            assert_eq!(args.next().as_deref(), Some(token.as_str()));
            seen.push(token);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(args.position(), 3);
    }

    #[test]
    fn test_backtrack_at_start() {
        let mut args = Arguments::new("x");
        assert!(!args.backtrack());
        assert_eq!(args.peek(), Some("x"));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut args = Arguments::new("one two");
        assert_eq!(args.peek(), Some("one"));
        assert_eq!(args.peek(), Some("one"));
        assert_eq!(args.next().as_deref(), Some("one"));
        assert_eq!(args.peek(), Some("two"));
        args.next();
        assert_eq!(args.peek(), None);
    }

    #[test]
    fn test_quoted_token() {
        let mut args = Arguments::new(r#"say "hello world" now"#);
        assert_eq!(args.next().as_deref(), Some("say"));
        assert_eq!(args.next().as_deref(), Some("hello world"));
        assert_eq!(args.next().as_deref(), Some("now"));
    }

    #[test]
    fn test_unterminated_quote_takes_rest() {
        let mut args = Arguments::new(r#"x "open ended"#);
        args.next();
        assert_eq!(args.next().as_deref(), Some("open ended"));
        assert_eq!(args.next(), None);
    }

    #[test]
    fn test_rest_is_verbatim() {
        let mut args = Arguments::new("ban 42   spamming   the   chat ");
        args.next();
        args.next();
        assert_eq!(args.rest().as_deref(), Some("spamming   the   chat"));
        assert_eq!(args.next(), None);
        assert_eq!(args.rest(), None);
    }

    #[test]
    fn test_rest_after_backtrack() {
        let mut args = Arguments::new("a b c");
        args.next();
        args.next();
        args.backtrack();
        assert_eq!(args.rest().as_deref(), Some("b c"));
    }

    #[test]
    fn test_empty_input() {
        let mut args = Arguments::new("   ");
        assert!(!args.has_next());
        assert_eq!(args.next(), None);
    }

    #[test]
    fn test_typed_helpers() {
        let mut args = Arguments::new("12 <@!34> <#56> nope");
        assert_eq!(args.next_u64("count"), Ok(12));
        assert_eq!(args.next_id("user"), Ok(34));
        assert_eq!(args.next_id("channel"), Ok(56));
        assert!(matches!(args.next_id("role"), Err(CommandError::Syntax(_))));
        assert!(matches!(args.next_required("reason"), Err(CommandError::Syntax(_))));
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("123"), Some(123));
        assert_eq!(parse_id("<@&77>"), Some(77));
        assert_eq!(parse_id("<@77"), None);
        assert_eq!(parse_id("77>"), None);
        assert_eq!(parse_id("abc"), None);
    }
}
