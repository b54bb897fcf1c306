//! Process-wide configuration.
//!
//! Secrets are snapshotted once at startup into a read-only [`SecretStore`];
//! everything else lives in [`Settings`]. Both are built in `main` and passed
//! down explicitly, nothing here is looked up ambiently at request time.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::PipelineError;

/// Name of the credential used to authenticate against Gemini.
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MAX_UPLOAD_MB: usize = 20;

/// Read-only key/value store for secrets.
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    secrets: HashMap<String, String>,
}

impl SecretStore {
    /// Snapshot the named secrets from the environment. Missing ones are
    /// simply absent; the error surfaces when a request asks for them.
    pub fn from_env(names: &[&str]) -> Self {
        let mut secrets = HashMap::new();
        for name in names {
            match std::env::var(name) {
                Ok(value) => {
                    secrets.insert(name.to_string(), value);
                }
                Err(_) => warn!("Secret {} is not set, analysis requests will fail", name),
            }
        }
        info!("Loaded {} of {} secrets", secrets.len(), names.len());
        Self { secrets }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            secrets: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a credential. Missing or blank values are a configuration error.
    pub fn get_credential(&self, name: &str) -> Result<String, PipelineError> {
        match self.secrets.get(name) {
            Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            Some(_) => Err(PipelineError::configuration(format!("{} is empty", name))),
            None => Err(PipelineError::configuration(format!("{} is not set", name))),
        }
    }
}

/// Non-secret service settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub model: String,
    pub api_base: String,
    pub max_upload_bytes: usize,
    pub tmp_dir: PathBuf,
    pub enforce_pdf: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            tmp_dir: std::env::temp_dir(),
            enforce_pdf: true,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_upload_mb: usize = parse_or(&lookup, "MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB)?;
        let enforce_pdf: bool = parse_or(&lookup, "ENFORCE_PDF", defaults.enforce_pdf)?;

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            model: lookup("GEMINI_MODEL").unwrap_or(defaults.model),
            api_base: lookup("GEMINI_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            tmp_dir: lookup("UPLOAD_TMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.tmp_dir),
            enforce_pdf,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_credential() {
        let store = SecretStore::default();
        let err = store.get_credential(GEMINI_API_KEY).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_blank_credential() {
        let store = SecretStore::from_pairs([(GEMINI_API_KEY, "   ")]);
        assert!(matches!(
            store.get_credential(GEMINI_API_KEY),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_credential_is_trimmed() {
        let store = SecretStore::from_pairs([(GEMINI_API_KEY, " abc123\n")]);
        assert_eq!(store.get_credential(GEMINI_API_KEY).unwrap(), "abc123");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.model, "gemini-1.5-flash");
        assert_eq!(settings.max_upload_bytes, 20 * 1024 * 1024);
        assert!(settings.enforce_pdf);
    }

    #[test]
    fn test_settings_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("MAX_UPLOAD_MB", "5"),
            ("ENFORCE_PDF", "false"),
            ("GEMINI_API_BASE", "http://localhost:9999/"),
            ("UPLOAD_TMP_DIR", "/var/tmp/uploads"),
        ]))
        .unwrap();
        assert_eq!(settings.max_upload_bytes, 5 * 1024 * 1024);
        assert!(!settings.enforce_pdf);
        assert_eq!(settings.api_base, "http://localhost:9999");
        assert_eq!(settings.tmp_dir, PathBuf::from("/var/tmp/uploads"));
    }

    #[test]
    fn test_settings_rejects_garbage() {
        assert!(Settings::from_lookup(lookup_from(&[("MAX_UPLOAD_MB", "lots")])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("ENFORCE_PDF", "maybe")])).is_err());
    }
}
