//! Client configuration
//!
//! Values are layered with `figment`: built-in defaults, then
//! `~/.soracom-endorse/endorse.toml`, then `ENDORSE_` prefixed environment
//! variables (nested keys separated by `__`, e.g. `ENDORSE_DEVICE__BAUD_RATE`),
//! then whatever the caller merges on top.

use std::{path::PathBuf, time::Duration};

use endorse_uicc::{InterfaceKind, OpenOptions, SerialConfig, detect::DEFAULT_DETECT_TIMEOUT};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

use crate::signature::DigestAlgorithm;
use crate::{Error, Result};

/// Environment variable holding the key cache passphrase
pub const KEY_STORE_KEY_ENV: &str = "ENDORSE_KEY_STORE_KEY";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "ENDORSE_";

/// Key cache file name under the home directory
pub const KEY_CACHE_FILE: &str = ".soracom-endorse-keycache.json";

/// Serial device settings
pub type DeviceConfig = SerialConfig;

/// SORACOM coverage area hosting the keys API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeysApiEndpoint {
    /// Global coverage
    #[default]
    Global,
    /// Japan coverage
    Japan,
}

impl KeysApiEndpoint {
    /// Base URL of the coverage area
    pub const fn base_url(self) -> &'static str {
        match self {
            Self::Global => "https://g.api.soracom.io",
            Self::Japan => "https://api.soracom.io",
        }
    }
}

fn trim_slash(base: &str) -> &str {
    base.strip_suffix('/').unwrap_or(base)
}

/// `{base}/v1/keys`
pub fn keys_url(base: &str) -> String {
    format!("{}/v1/keys", trim_slash(base))
}

/// `{base}/v1/keys/{key_id}/verify`
pub fn verify_url(base: &str, key_id: &str) -> String {
    format!("{}/v1/keys/{key_id}/verify", trim_slash(base))
}

/// Key cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyCacheConfig {
    /// Cache file; `~/.soracom-endorse-keycache.json` when unset
    pub path: Option<PathBuf>,
    /// Lifetime of a cached key in seconds
    pub ttl_secs: u64,
    /// PBKDF2 rounds used to derive the file key
    pub pbkdf2_rounds: u32,
    /// Passphrase used when `ENDORSE_KEY_STORE_KEY` is not set
    pub passphrase: Option<String>,
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl_secs: 3600,
            pbkdf2_rounds: 100_000,
            passphrase: None,
        }
    }
}

impl KeyCacheConfig {
    /// Cache file location
    pub fn path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(home_dir()?.join(KEY_CACHE_FILE)),
        }
    }

    /// Lifetime of a cached key
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Passphrase from the environment, else from this config
    pub fn passphrase(&self) -> Result<Zeroizing<String>> {
        resolve_passphrase(std::env::var(KEY_STORE_KEY_ENV).ok(), self.passphrase.as_deref())
    }
}

fn resolve_passphrase(env: Option<String>, configured: Option<&str>) -> Result<Zeroizing<String>> {
    match (env, configured) {
        (Some(env), _) if !env.is_empty() => {
            tracing::debug!("Key cache passphrase taken from {KEY_STORE_KEY_ENV}");
            Ok(Zeroizing::new(env))
        }
        (_, Some(configured)) if !configured.is_empty() => {
            tracing::debug!("Key cache passphrase taken from configuration");
            Ok(Zeroizing::new(configured.to_string()))
        }
        _ => Err(Error::PassphraseMissing),
    }
}

/// Everything the client needs to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Coverage area of the keys API
    pub coverage: KeysApiEndpoint,
    /// Custom keys API base URL, overriding `coverage`
    pub api_endpoint_url: Option<Url>,
    /// UICC transport
    pub interface: InterfaceKind,
    /// Serial device for `comm` and auto-detection
    pub device: DeviceConfig,
    /// ModemManager modem index for `mmcli`
    pub modem_index: u32,
    /// Application key length in bytes
    pub key_length: usize,
    /// Digest algorithm name, e.g. `SHA-256`
    pub key_algorithm: String,
    /// Skip the key cache entirely
    pub disable_key_cache: bool,
    /// Clear the key cache before running
    pub clear_key_cache: bool,
    /// Verbose logging
    pub debug: bool,
    /// Key cache settings
    pub key_cache: KeyCacheConfig,
    /// Upper bound on auto-detection in seconds
    pub detect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            coverage: KeysApiEndpoint::default(),
            api_endpoint_url: None,
            interface: InterfaceKind::default(),
            device: DeviceConfig::default(),
            modem_index: 0,
            key_length: 32,
            key_algorithm: DigestAlgorithm::default().to_string(),
            disable_key_cache: false,
            clear_key_cache: false,
            debug: false,
            key_cache: KeyCacheConfig::default(),
            detect_timeout_secs: DEFAULT_DETECT_TIMEOUT.as_secs(),
        }
    }
}

impl ClientConfig {
    /// Defaults, the config file and the environment, without extraction
    pub fn figment() -> Result<Figment> {
        Ok(Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_dir()?.join("endorse.toml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["key_store_key"])))
    }

    /// Load the layered configuration
    pub fn load() -> Result<Self> {
        Ok(Self::figment()?.extract()?)
    }

    /// Keys API base URL without a trailing `/`
    pub fn api_base(&self) -> String {
        let base = self
            .api_endpoint_url
            .as_ref()
            .map_or(self.coverage.base_url(), Url::as_str);
        trim_slash(base).to_string()
    }

    /// Parsed digest algorithm
    pub fn digest_algorithm(&self) -> Result<DigestAlgorithm> {
        self.key_algorithm.parse()
    }

    /// Settings for opening a UICC transport
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            serial: self.device.clone(),
            modem_index: self.modem_index,
            detect_timeout: Duration::from_secs(self.detect_timeout_secs),
        }
    }
}

fn home_dir() -> Result<PathBuf> {
    std::env::home_dir().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "home directory not found",
        ))
    })
}

/// Directory holding `endorse.toml`
pub fn config_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".soracom-endorse"))
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.key_length, 32);
        assert_eq!(config.key_algorithm, "SHA-256");
        assert_eq!(config.interface, InterfaceKind::AutoDetect);
        assert_eq!(config.api_base(), "https://g.api.soracom.io");
        assert_eq!(config.key_cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.open_options().detect_timeout, Duration::from_secs(90));
        assert_eq!(config.device.baud_rate, 57600);
    }

    #[test]
    fn test_endpoint_urls() {
        let mut config = ClientConfig {
            coverage: KeysApiEndpoint::Japan,
            ..ClientConfig::default()
        };
        assert_eq!(keys_url(&config.api_base()), "https://api.soracom.io/v1/keys");

        config.api_endpoint_url = Some(Url::parse("https://keyurl.soracom.io/keyservice/").unwrap());
        let base = config.api_base();
        assert_eq!(base, "https://keyurl.soracom.io/keyservice");
        assert_eq!(
            verify_url(&base, "k1"),
            "https://keyurl.soracom.io/keyservice/v1/keys/k1/verify"
        );
        assert_eq!(keys_url("https://example.com/"), "https://example.com/v1/keys");
    }

    #[test]
    fn test_passphrase_precedence() {
        assert_eq!(
            resolve_passphrase(Some("env".into()), Some("file")).unwrap().as_str(),
            "env"
        );
        assert_eq!(resolve_passphrase(None, Some("file")).unwrap().as_str(), "file");
        assert_eq!(
            resolve_passphrase(Some(String::new()), Some("file")).unwrap().as_str(),
            "file"
        );
        assert!(matches!(resolve_passphrase(None, None), Err(Error::PassphraseMissing)));
        assert!(matches!(resolve_passphrase(None, Some("")), Err(Error::PassphraseMissing)));
    }

    #[test]
    fn test_layered_loading() {
        Jail::expect_with(|jail| {
            let home = jail.directory().to_path_buf();
            jail.set_env("HOME", home.display());
            jail.create_dir(".soracom-endorse")?;
            jail.create_file(
                ".soracom-endorse/endorse.toml",
                r#"
                    interface = "comm"
                    key_length = 16
                    coverage = "japan"

                    [device]
                    port_name = "/dev/ttyUSB2"
                "#,
            )?;
            jail.set_env("ENDORSE_KEY_LENGTH", "24");
            jail.set_env("ENDORSE_DEVICE__BAUD_RATE", "115200");
            jail.set_env("ENDORSE_KEY_STORE_KEY", "secret");

            let config = ClientConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.interface, InterfaceKind::Comm);
            assert_eq!(config.key_length, 24);
            assert_eq!(config.coverage, KeysApiEndpoint::Japan);
            assert_eq!(config.device.port_name, "/dev/ttyUSB2");
            assert_eq!(config.device.baud_rate, 115200);
            assert_eq!(config.key_cache.passphrase, None);
            Ok(())
        });
    }
}
