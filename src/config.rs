//! Settings shared by every component: API key handling, transport settings and
//! the small enums the Voyage endpoints accept.

use std::{fmt, str::FromStr, time::Duration};

use clap::ValueEnum;
use serde::{ser::Error as _, Deserialize, Serialize, Serializer};

use crate::error::EmbedderError;

pub const API_KEY_ENV: &str = "VOYAGE_API_KEY";
pub const TIMEOUT_ENV: &str = "VOYAGE_TIMEOUT";
pub const MAX_RETRIES_ENV: &str = "VOYAGE_MAX_RETRIES";
pub const BASE_URL_ENV: &str = "VOYAGE_BASE_URL";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: usize = 5;
pub const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";

/// Models accepting an explicit output dimension, all of them with the same set of sizes.
const FLEXIBLE_DIMENSION_MODELS: &[&str] = &[
    "voyage-context-3",
    "voyage-multimodal-3.5",
    "voyage-3-large",
    "voyage-3.5",
    "voyage-3.5-lite",
    "voyage-code-3",
];
const FLEXIBLE_DIMENSIONS: &[u32] = &[256, 512, 1024, 2048];

/// Resolves a setting in a fixed order: the explicit value, then the environment
/// variable `env_var`, then `default`.
///
/// An environment value that does not parse is reported rather than ignored.
pub fn resolve_setting<T: FromStr>(
    explicit: Option<T>,
    env_var: &str,
    default: T,
) -> Result<T, EmbedderError> {
    resolve_setting_with(explicit, env_var, default, |name| std::env::var(name).ok())
}

/// [`resolve_setting`] with a custom environment lookup.
pub fn resolve_setting_with<T, L>(
    explicit: Option<T>,
    env_var: &str,
    default: T,
    lookup: L,
) -> Result<T, EmbedderError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    if let Some(value) = explicit {
        return Ok(value);
    }
    match lookup(env_var) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            EmbedderError::InvalidParameter(format!(
                "environment variable {env_var} has unparseable value {raw:?}"
            ))
        }),
        None => Ok(default),
    }
}

/// An API key, either given inline or read from an environment variable when the
/// component is built.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Secret {
    Token(String),
    EnvVar(String),
}

impl Secret {
    pub fn from_token<S: Into<String>>(token: S) -> Self {
        Secret::Token(token.into())
    }

    pub fn from_env_var<S: Into<String>>(name: S) -> Self {
        Secret::EnvVar(name.into())
    }

    pub fn resolve(&self) -> Result<String, EmbedderError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with<L: Fn(&str) -> Option<String>>(
        &self,
        lookup: L,
    ) -> Result<String, EmbedderError> {
        match self {
            Secret::Token(token) => Ok(token.clone()),
            Secret::EnvVar(name) => lookup(name.as_str())
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| EmbedderError::MissingApiKey {
                    env_var: name.clone(),
                }),
        }
    }
}

impl Default for Secret {
    fn default() -> Self {
        Secret::EnvVar(API_KEY_ENV.to_string())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Token(_) => write!(f, "Secret::Token(***)"),
            Secret::EnvVar(name) => write!(f, "Secret::EnvVar({name:?})"),
        }
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(tag = "type", content = "value", rename_all = "snake_case")]
        enum Stored<'a> {
            EnvVar(&'a str),
        }

        match self {
            Secret::Token(_) => Err(S::Error::custom(
                "refusing to serialize an inline API key, use an environment variable secret",
            )),
            Secret::EnvVar(name) => Stored::EnvVar(name).serialize(serializer),
        }
    }
}

/// Prompt flavour the endpoint prepends to each input. `None` at the use site
/// means no prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Query,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputDtype {
    #[default]
    Float,
    Int8,
    Uint8,
    Binary,
    Ubinary,
}

/// Transport knobs as configured. Unset values fall back to the environment and
/// then to the defaults, see [`TransportConfig::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Request timeout in seconds.
    pub timeout: Option<u64>,
    pub max_retries: Option<usize>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl TransportConfig {
    pub fn resolve(&self) -> Result<TransportSettings, EmbedderError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with<L: Fn(&str) -> Option<String>>(
        &self,
        lookup: L,
    ) -> Result<TransportSettings, EmbedderError> {
        let timeout =
            resolve_setting_with(self.timeout, TIMEOUT_ENV, DEFAULT_TIMEOUT_SECS, &lookup)?;
        if timeout == 0 {
            return Err(EmbedderError::InvalidParameter(
                "timeout must be at least one second".to_string(),
            ));
        }
        let max_retries =
            resolve_setting_with(self.max_retries, MAX_RETRIES_ENV, DEFAULT_MAX_RETRIES, &lookup)?;
        let base_url = resolve_setting_with(
            self.base_url.clone(),
            BASE_URL_ENV,
            DEFAULT_BASE_URL.to_string(),
            &lookup,
        )?;

        Ok(TransportSettings {
            base_url,
            timeout: Duration::from_secs(timeout),
            max_retries,
        })
    }
}

pub fn validate_model(model: &str) -> Result<(), EmbedderError> {
    if model.trim().is_empty() {
        return Err(EmbedderError::InvalidParameter(
            "model name must not be empty".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_batch_size(batch_size: usize, cap: usize) -> Result<(), EmbedderError> {
    if batch_size == 0 || batch_size > cap {
        return Err(EmbedderError::InvalidParameter(format!(
            "batch_size must be between 1 and {cap}, but got {batch_size}"
        )));
    }
    Ok(())
}

/// Checks a requested output dimension against what the model supports. Models we
/// know nothing about get the value forwarded untouched.
pub fn validate_output_dimension(model: &str, dimension: Option<u32>) -> Result<(), EmbedderError> {
    let Some(dimension) = dimension else {
        return Ok(());
    };
    if dimension == 0 {
        return Err(EmbedderError::InvalidParameter(
            "output_dimension must be > 0".to_string(),
        ));
    }
    if FLEXIBLE_DIMENSION_MODELS.contains(&model) && !FLEXIBLE_DIMENSIONS.contains(&dimension) {
        return Err(EmbedderError::InvalidParameter(format!(
            "{model} supports output dimensions {FLEXIBLE_DIMENSIONS:?}, but got {dimension}"
        )));
    }
    Ok(())
}

/// Any `top_k` that is set must be positive.
pub fn validate_top_k(top_k: Option<usize>) -> Result<(), EmbedderError> {
    match top_k {
        Some(0) => Err(EmbedderError::InvalidParameter(
            "top_k must be > 0, but got 0".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn explicit_value_wins_over_environment() {
        let value = resolve_setting_with(Some(7u64), TIMEOUT_ENV, 30, env(&[(TIMEOUT_ENV, "12")]))
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn environment_wins_over_default() {
        let value =
            resolve_setting_with(None, TIMEOUT_ENV, 30u64, env(&[(TIMEOUT_ENV, " 12 ")])).unwrap();
        assert_eq!(value, 12);
    }

    #[test]
    fn default_used_when_nothing_set() {
        let value = resolve_setting_with(None, TIMEOUT_ENV, 30u64, env(&[])).unwrap();
        assert_eq!(value, 30);
    }

    #[test]
    fn unparseable_environment_value_is_an_error() {
        let result = resolve_setting_with(
            None,
            MAX_RETRIES_ENV,
            5usize,
            env(&[(MAX_RETRIES_ENV, "lots")]),
        );
        assert!(matches!(result, Err(EmbedderError::InvalidParameter(_))));
    }

    #[test]
    fn transport_defaults() {
        let settings = TransportConfig::default().resolve_with(env(&[])).unwrap();
        assert_eq!(
            settings,
            TransportSettings {
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout: Duration::from_secs(30),
                max_retries: 5,
            }
        );
    }

    #[test]
    fn transport_reads_environment() {
        let settings = TransportConfig {
            timeout: None,
            max_retries: Some(1),
            base_url: None,
        }
        .resolve_with(env(&[
            (TIMEOUT_ENV, "90"),
            (MAX_RETRIES_ENV, "9"),
            (BASE_URL_ENV, "http://localhost:9000/v1"),
        ]))
        .unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(90));
        assert_eq!(settings.max_retries, 1);
        assert_eq!(settings.base_url, "http://localhost:9000/v1");
    }

    #[test]
    fn zero_timeout_rejected() {
        let result = TransportConfig {
            timeout: Some(0),
            ..Default::default()
        }
        .resolve_with(env(&[]));
        assert!(matches!(result, Err(EmbedderError::InvalidParameter(_))));
    }

    #[test]
    fn secret_from_environment() {
        let secret = Secret::default();
        assert_eq!(
            secret.resolve_with(env(&[(API_KEY_ENV, "pa-123")])).unwrap(),
            "pa-123"
        );
        match secret.resolve_with(env(&[])) {
            Err(EmbedderError::MissingApiKey { env_var }) => assert_eq!(env_var, API_KEY_ENV),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn secret_token_is_redacted_and_not_serialized() {
        let secret = Secret::from_token("pa-very-secret");
        assert!(!format!("{secret:?}").contains("very-secret"));
        assert!(serde_json::to_string(&secret).is_err());

        let stored = serde_json::to_value(Secret::from_env_var("MY_KEY")).unwrap();
        assert_eq!(stored, serde_json::json!({"type": "env_var", "value": "MY_KEY"}));
        let loaded: Secret = serde_json::from_value(stored).unwrap();
        assert_eq!(loaded, Secret::from_env_var("MY_KEY"));
    }

    #[test]
    fn output_dimension_checked_for_known_models() {
        assert!(validate_output_dimension("voyage-context-3", Some(512)).is_ok());
        assert!(validate_output_dimension("voyage-context-3", Some(300)).is_err());
        assert!(validate_output_dimension("voyage-2", Some(300)).is_ok());
        assert!(validate_output_dimension("voyage-2", Some(0)).is_err());
        assert!(validate_output_dimension("voyage-context-3", None).is_ok());
    }

    #[test]
    fn batch_size_and_top_k_bounds() {
        assert!(validate_batch_size(0, 1000).is_err());
        assert!(validate_batch_size(1001, 1000).is_err());
        assert!(validate_batch_size(32, 1000).is_ok());
        assert!(validate_top_k(Some(0)).is_err());
        assert!(validate_top_k(Some(3)).is_ok());
        assert!(validate_top_k(None).is_ok());
    }
}
