//! Layered discovery of cloud API credential files.
//!
//! Only the resolved location is ever logged; credential contents never
//! appear in diagnostic output.

use crate::config::{expand_home, ConfigurationMap};
use crate::error::{EtlError, Result};
use rand::seq::SliceRandom;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable naming the Google service-account key file.
pub const GOOGLE_KEY_ENV_VAR: &str = "GOOGLE_API_KEY";

/// Environment variable naming the Microsoft Graph credential file.
pub const GRAPH_KEY_ENV_VAR: &str = "GRAPH_API_KEY";

/// The two supported cloud credential kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Google service-account JSON key
    Google,
    /// Microsoft Graph client-credentials YAML file
    Graph,
}

impl CredentialKind {
    fn env_var(self) -> &'static str {
        match self {
            Self::Google => GOOGLE_KEY_ENV_VAR,
            Self::Graph => GRAPH_KEY_ENV_VAR,
        }
    }

    fn home_default(self) -> &'static str {
        match self {
            Self::Google => "~/.google-api-key.json",
            Self::Graph => "~/.graph-api-key.yml",
        }
    }

    fn aliases(self, config: &ConfigurationMap) -> &std::collections::BTreeMap<String, String> {
        match self {
            Self::Google => &config.google_api_keys,
            Self::Graph => &config.graph_api_keys,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Google => "google api key",
            Self::Graph => "graph api key",
        }
    }
}

/// A credential file resolved to an existing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialReference {
    /// Which backend this credential belongs to
    pub kind: CredentialKind,
    /// Resolved filesystem path (exists at resolution time)
    pub path: PathBuf,
}

/// Locates a credential file for the given kind.
///
/// Precedence, first existing file wins:
/// 1. explicit path or config alias given on the command line / endpoint
///    parameters
/// 2. the kind's environment variable
/// 3. a uniformly-random choice among all configured aliases
/// 4. the fixed default under the user's home directory
///
/// # Errors
/// Returns `Credentials` when nothing resolves to an existing file.
pub fn locate(
    kind: CredentialKind,
    explicit: Option<&str>,
    config: &ConfigurationMap,
) -> Result<CredentialReference> {
    if let Some(explicit) = explicit {
        let path = expand_home(explicit);
        if path.is_file() {
            debug!("{} found from command option <{}>", kind.label(), path.display());
            return Ok(CredentialReference { kind, path });
        }
        // The explicit value may be an alias into the config section.
        if let Some(aliased) = kind.aliases(config).get(explicit) {
            let path = expand_home(aliased);
            if path.is_file() {
                debug!(
                    "{} found from config file by alias <{}>",
                    kind.label(),
                    explicit
                );
                return Ok(CredentialReference { kind, path });
            }
        }
    }

    if let Ok(env_value) = std::env::var(kind.env_var()) {
        let path = expand_home(&env_value);
        if path.is_file() {
            debug!(
                "{} found from environment variable {}",
                kind.label(),
                kind.env_var()
            );
            return Ok(CredentialReference { kind, path });
        }
    }

    let configured: Vec<&String> = kind.aliases(config).values().collect();
    if let Some(candidate) = configured.choose(&mut rand::thread_rng()) {
        let path = expand_home(candidate);
        if path.is_file() {
            debug!("{} taken randomly from config file", kind.label());
            return Ok(CredentialReference { kind, path });
        }
    }

    let fallback = expand_home(kind.home_default());
    if fallback.is_file() {
        debug!("{} found from user home dir <{}>", kind.label(), fallback.display());
        return Ok(CredentialReference { kind, path: fallback });
    }

    Err(EtlError::credentials(format!(
        "{} file not found; save {} to the home directory or set {}",
        kind.label(),
        kind.home_default(),
        kind.env_var()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn touch(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .and_then(|mut f| f.write_all(b"{}"))
            .expect("touch credential file");
        path
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = touch(&dir, "key.json");
        let config = ConfigurationMap::default();

        temp_env::with_var(GOOGLE_KEY_ENV_VAR, None::<&str>, || {
            let found = locate(
                CredentialKind::Google,
                Some(key.to_str().expect("utf8")),
                &config,
            )
            .expect("locate");
            assert_eq!(found.path, key);
        });
    }

    #[test]
    fn test_explicit_alias_resolves_through_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = touch(&dir, "aliased.json");
        let mut config = ConfigurationMap::default();
        config
            .google_api_keys
            .insert("main".to_string(), key.to_str().expect("utf8").to_string());

        temp_env::with_var(GOOGLE_KEY_ENV_VAR, None::<&str>, || {
            let found = locate(CredentialKind::Google, Some("main"), &config).expect("locate");
            assert_eq!(found.path, key);
        });
    }

    #[test]
    fn test_env_var_fallback() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = touch(&dir, "env.yml");
        let config = ConfigurationMap::default();

        temp_env::with_var(
            GRAPH_KEY_ENV_VAR,
            Some(key.to_str().expect("utf8")),
            || {
                let found = locate(CredentialKind::Graph, None, &config).expect("locate");
                assert_eq!(found.path, key);
            },
        );
    }

    #[test]
    fn test_random_choice_is_among_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key_a = touch(&dir, "a.json");
        let mut config = ConfigurationMap::default();
        config
            .google_api_keys
            .insert("a".to_string(), key_a.to_str().expect("utf8").to_string());

        temp_env::with_var(GOOGLE_KEY_ENV_VAR, None::<&str>, || {
            let found = locate(CredentialKind::Google, None, &config).expect("locate");
            assert_eq!(found.path, key_a);
        });
    }

    #[test]
    fn test_nothing_found_is_fatal() {
        let config = ConfigurationMap::default();
        temp_env::with_var(GOOGLE_KEY_ENV_VAR, None::<&str>, || {
            let err = locate(CredentialKind::Google, Some("/absent/key.json"), &config)
                .expect_err("no credentials");
            assert!(matches!(err, EtlError::Credentials { .. }));
        });
    }
}
