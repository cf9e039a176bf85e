//! Configuration loading from warden.toml.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use permissions::Caveat;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Permission database. Defaults to the user data directory.
    pub database: Option<PathBuf>,

    /// Grants applied by `warden run` when not already held.
    #[serde(default)]
    pub grants: Vec<GrantConfig>,
}

/// One seeded grant.
#[derive(Debug, Deserialize)]
pub struct GrantConfig {
    pub subject: String,
    pub target: String,
    pub caveats: Option<Vec<Caveat>>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.check_grants()?;
        Ok(config)
    }

    /// Create a default configuration.
    pub fn default_config() -> Self {
        Self::default()
    }

    fn check_grants(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for grant in &self.grants {
            if !seen.insert((grant.subject.as_str(), grant.target.as_str())) {
                return Err(ConfigError::DuplicateGrant {
                    subject: grant.subject.clone(),
                    target: grant.target.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("{target} is granted to {subject} more than once")]
    DuplicateGrant { subject: String, target: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_grants_with_caveats() {
        let config = Config::parse(
            r#"
            database = "/tmp/warden.db"

            [[grants]]
            subject = "npm:weather"
            target = "endowment:network-access"

            [[grants]]
            subject = "npm:weather"
            target = "endowment:cronjob"

            [[grants.caveats]]
            type = "cronjobCaveat"

            [[grants.caveats.value.jobs]]
            expression = "*/5 * * * *"
            request = { method = "refresh" }
            "#,
        )
        .unwrap();

        assert_eq!(config.database, Some(PathBuf::from("/tmp/warden.db")));
        assert_eq!(config.grants.len(), 2);
        assert!(config.grants[0].caveats.is_none());

        let caveats = config.grants[1].caveats.as_ref().unwrap();
        assert_eq!(caveats[0].kind, "cronjobCaveat");
        assert_eq!(
            caveats[0].value["jobs"][0]["request"],
            json!({ "method": "refresh" })
        );
    }

    #[test]
    fn empty_config() {
        let config = Config::parse("").unwrap();
        assert!(config.database.is_none());
        assert!(config.grants.is_empty());
    }

    #[test]
    fn duplicate_grant_rejected() {
        let err = Config::parse(
            r#"
            [[grants]]
            subject = "npm:a"
            target = "endowment:long-running"

            [[grants]]
            subject = "npm:a"
            target = "endowment:long-running"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateGrant { .. }));
    }

    #[test]
    fn malformed_config() {
        let err = Config::parse("[[grants]]\nsubject = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
