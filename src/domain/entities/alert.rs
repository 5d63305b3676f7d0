use serde::Serialize;

/// Severity of a rendered reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Info,
    Success,
    Warning,
    Error,
}

impl AlertKind {
    pub fn as_str(&self) -> &str {
        match self {
            AlertKind::Info => "info",
            AlertKind::Success => "success",
            AlertKind::Warning => "warning",
            AlertKind::Error => "error",
        }
    }

    fn marker(&self) -> &str {
        match self {
            AlertKind::Info => "[i]",
            AlertKind::Success => "[ok]",
            AlertKind::Warning => "[!]",
            AlertKind::Error => "[x]",
        }
    }
}

/// A reply produced by dispatch, rendered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: Option<String>,
    pub body: String,
    pub fields: Vec<(String, String)>,
}

impl Alert {
    fn new(kind: AlertKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: None,
            body: body.into(),
            fields: Vec::new(),
        }
    }

    pub fn info(body: impl Into<String>) -> Self {
        Self::new(AlertKind::Info, body)
    }

    pub fn success(body: impl Into<String>) -> Self {
        Self::new(AlertKind::Success, body)
    }

    pub fn warning(body: impl Into<String>) -> Self {
        Self::new(AlertKind::Warning, body)
    }

    pub fn error(body: impl Into<String>) -> Self {
        Self::new(AlertKind::Error, body)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Shown when a command's arguments do not parse
    pub fn syntax(usage: &str, reason: &str) -> Self {
        Self::warning(format!("Usage: `{}`", usage)).with_title("Invalid syntax").with_field("Reason", reason)
    }

    pub fn permission_denied(node: &str) -> Self {
        Self::error(format!("You need the `{}` permission to do that.", node)).with_title("Missing permission")
    }

    pub fn guild_only() -> Self {
        Self::warning("This command can only be used inside a server.").with_title("Guild only")
    }

    /// Generic failure; never carries internal detail
    pub fn failure(reference: &str) -> Self {
        Self::error(format!(
            "Something went wrong while running that command. Reference: `{}`",
            reference
        ))
        .with_title("Command failed")
    }

    /// Plain-text rendering for transports without rich embeds
    pub fn render(&self) -> String {
        let mut out = String::from(self.kind.marker());
        if let Some(title) = &self.title {
            out.push(' ');
            out.push_str(title);
            out.push('\n');
        } else {
            out.push(' ');
        }
        out.push_str(&self.body);
        for (name, value) in &self.fields {
            out.push_str(&format!("\n{}: {}", name, value));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_title_and_fields() {
        let alert = Alert::success("done").with_title("Module").with_field("Name", "greeter");
        assert_eq!(alert.render(), "[ok] Module\ndone\nName: greeter");
    }

    #[test]
    fn test_render_plain() {
        assert_eq!(Alert::info("hello").render(), "[i] hello");
    }

    #[test]
    fn test_syntax_alert_carries_usage() {
        let alert = Alert::syntax("!mod ban <user>", "missing user");
        assert_eq!(alert.kind, AlertKind::Warning);
        assert!(alert.body.contains("!mod ban <user>"));
    }
}
