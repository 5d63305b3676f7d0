//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub modules: ModulesConfig,
    pub permissions: PermissionsConfig,
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
    /// Delay before cleanup commands delete the trigger and reply
    pub cleanup_delay_secs: u64,
    /// Users that pass every permission check
    #[serde(default)]
    pub global_admins: Vec<u64>,
    /// Roles treated as full administrator in every guild
    #[serde(default)]
    pub admin_roles: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModulesConfig {
    pub directory: PathBuf,
    pub auto_load: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PermissionsConfig {
    /// SQLite database holding overrides; in-memory when unset
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdaptersConfig {
    pub console: Option<ConsoleConfig>,
}

/// Console adapter settings for local development
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Author id used for lines typed into the console
    pub user_id: u64,
    /// Synthetic guild the console pretends to be in; DM when unset
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    #[serde(default)]
    pub roles: Vec<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "modbot".to_string(),
                prefix: "!".to_string(),
                cleanup_delay_secs: 10,
                global_admins: Vec::new(),
                admin_roles: Vec::new(),
            },
            modules: ModulesConfig {
                directory: PathBuf::from("./modules"),
                auto_load: true,
            },
            permissions: PermissionsConfig {
                database: Some(PathBuf::from("modbot.db")),
            },
            adapters: AdaptersConfig {
                console: Some(ConsoleConfig {
                    enabled: true,
                    user_id: 1,
                    guild_id: Some(1000),
                    channel_id: 2000,
                    roles: Vec::new(),
                }),
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(format!("prefix '{}' contains whitespace", self.bot.prefix)));
        }
        if self.bot.name.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.name".to_string()));
        }
        Ok(())
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Environment overrides on top of whatever was loaded
    pub fn apply_env(&mut self) {
        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }

        if let Ok(dir) = std::env::var("BOT_MODULES_DIR") {
            self.modules.directory = PathBuf::from(dir);
        }

        if let Ok(admins) = std::env::var("BOT_GLOBAL_ADMINS") {
            let parsed: Vec<u64> = admins
                .split(',')
                .filter_map(|id| id.trim().parse().ok())
                .collect();
            if !parsed.is_empty() {
                self.bot.global_admins = parsed;
            }
        }
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.bot.cleanup_delay_secs)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_yaml() {
        let yaml = Config::default().to_yaml().unwrap();
        assert!(yaml.contains("cleanup-delay-secs"));
        let parsed = Config::parse(&yaml).unwrap();
        assert_eq!(parsed.bot.prefix, "!");
        assert_eq!(parsed.modules.directory, PathBuf::from("./modules"));
    }

    #[test]
    fn test_optional_lists_default_empty() {
        let yaml = "bot:\n  name: b\n  prefix: '?'\n  cleanup-delay-secs: 5\n\
                    modules:\n  directory: mods\n  auto-load: false\n\
                    permissions:\n  database: null\n\
                    adapters:\n  console: null\n";
        let config = Config::parse(yaml).unwrap();
        assert!(config.bot.global_admins.is_empty());
        assert!(config.permissions.database.is_none());
        assert_eq!(config.cleanup_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_whitespace_prefix_rejected() {
        let mut config = Config::default();
        config.bot.prefix = "! ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }
}
