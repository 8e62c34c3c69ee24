use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use endorse_uicc::{SerialInterface, UiccInterface, interface::serial::list_ports, open_interface};
use serde_json::{Map, Value};
use tracing::info;

use crate::cache::{AuthResult, CacheOptions, EncryptedFileCache, KeyCache, NoOpCache, SystemClock};
use crate::config::ClientConfig;
use crate::engine::KeyAgreement;
use crate::service::HttpKeyService;
use crate::signature::{ServiceRequest, calculate_application_key};
use crate::Result;

/// Open the cache selected by `config`
pub fn open_cache(config: &ClientConfig) -> Result<Box<dyn KeyCache>> {
    if config.disable_key_cache {
        return Ok(Box::new(NoOpCache));
    }

    let passphrase = config.key_cache.passphrase()?;
    let options = CacheOptions {
        ttl: config.key_cache.ttl(),
        rounds: config.key_cache.pbkdf2_rounds,
    };
    Ok(Box::new(EncryptedFileCache::open(
        config.key_cache.path()?,
        &passphrase,
        options,
        Arc::new(SystemClock),
    )?))
}

/// SORACOM Endorse client
#[derive(Debug)]
pub struct EndorseClient {
    config: ClientConfig,
    engine: KeyAgreement<HttpKeyService, Box<dyn KeyCache>>,
}

impl EndorseClient {
    /// Client for `config`, clearing the key cache first if asked to
    pub fn new(config: ClientConfig) -> Result<Self> {
        let cache = open_cache(&config)?;
        let mut client = Self::with_cache(config, cache)?;
        if client.config.clear_key_cache {
            client.clear_key_cache()?;
        }
        Ok(client)
    }

    /// Client using `cache` instead of the configured one
    pub fn with_cache(config: ClientConfig, cache: Box<dyn KeyCache>) -> Result<Self> {
        let service = HttpKeyService::new(config.api_base())?;
        Ok(Self {
            config,
            engine: KeyAgreement::new(service, cache),
        })
    }

    /// Active configuration
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the configured transport and agree on a key
    pub fn do_authentication(&mut self) -> Result<AuthResult> {
        let mut uicc = open_interface(self.config.interface, &self.config.open_options())?;
        let result = self.engine.authenticate(uicc.as_mut());
        uicc.disconnect();
        result
    }

    /// Agree on a key over an already opened transport
    pub fn authenticate_with(&mut self, uicc: &mut dyn UiccInterface) -> Result<AuthResult> {
        self.engine.authenticate(uicc)
    }

    /// Drop every cached key
    pub fn clear_key_cache(&mut self) -> Result<()> {
        let cache = self.engine.cache_mut();
        cache.clear()?;
        cache.persist()?;
        info!("key cache has been cleared.");
        Ok(())
    }

    /// Serial ports present on this machine
    pub fn list_com_ports(&self) -> Result<Vec<String>> {
        Ok(list_ports()?)
    }

    /// Manufacturer, model, revision and serial number of the configured modem
    pub fn device_info(&self) -> Result<String> {
        let mut modem = SerialInterface::serial(self.config.device.clone());
        Ok(modem.query_device()?)
    }

    /// Base64 application key derived from `ck`
    pub fn calculate_application_key(&self, nonce: &[u8], timestamp: i64, ck: &[u8]) -> Result<String> {
        let key = calculate_application_key(
            nonce,
            timestamp,
            ck,
            self.config.key_length,
            self.config.digest_algorithm()?,
        )?;
        Ok(STANDARD.encode(key))
    }

    /// Call a service trusting the agreed key, signing the request with CK
    pub fn request_service(
        &self,
        url: &str,
        auth: &AuthResult,
        extra: Option<&Map<String, Value>>,
    ) -> Result<String> {
        let request = ServiceRequest {
            key_id: &auth.key_id,
            key_length: self.config.key_length,
            algorithm: self.config.digest_algorithm()?,
            timestamp: chrono::Utc::now().timestamp_millis(),
            extra,
        };
        self.engine.service().request_service(url, &auth.ck, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn client(config: ClientConfig) -> EndorseClient {
        EndorseClient::with_cache(config, Box::new(NoOpCache)).unwrap()
    }

    #[test]
    fn test_application_key() {
        let client = client(ClientConfig::default());
        let key = client
            .calculate_application_key(b"nonce", 1_514_764_800_000, &[1, 2, 3])
            .unwrap();
        assert_eq!(STANDARD.decode(key).unwrap().len(), 32);
    }

    #[test]
    fn test_application_key_rejects_bad_settings() {
        let long = client(ClientConfig {
            key_length: 64,
            ..ClientConfig::default()
        });
        assert!(matches!(
            long.calculate_application_key(b"n", 0, &[1]),
            Err(Error::KeyLengthTooLong { .. })
        ));

        let unknown = client(ClientConfig {
            key_algorithm: "MD5".to_string(),
            ..ClientConfig::default()
        });
        assert!(matches!(
            unknown.calculate_application_key(b"n", 0, &[1]),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_disabled_cache_needs_no_passphrase() {
        let config = ClientConfig {
            disable_key_cache: true,
            clear_key_cache: true,
            ..ClientConfig::default()
        };
        let mut client = EndorseClient::new(config).unwrap();
        client.clear_key_cache().unwrap();
    }

    #[test]
    fn test_configured_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::default();
        config.key_cache.path = Some(dir.path().join("keys.json"));
        config.key_cache.passphrase = Some("passphrase".to_string());
        config.key_cache.pbkdf2_rounds = 1_000;

        let cache = open_cache(&config).unwrap();
        assert!(cache.aliases().unwrap().is_empty());
        assert!(dir.path().join("keys.json").exists());
    }
}
