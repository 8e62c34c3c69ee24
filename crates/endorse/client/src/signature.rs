//! Signed requests to services that trust the agreed key
//!
//! Once AKA succeeds both the card holder and the key service know CK.
//! Requests to downstream services are signed with
//! `base64(digest(body || timestamp || CK))`, and application keys are
//! derived as `digest(nonce || timestamp || CK)` truncated to the requested
//! length. The timestamp is always rendered as decimal milliseconds.

use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::{Error, Result};

/// Digest used for signatures and application keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, derive_more::Display)]
pub enum DigestAlgorithm {
    /// SHA-224
    #[display("SHA-224")]
    Sha224,
    /// SHA-256
    #[default]
    #[display("SHA-256")]
    Sha256,
    /// SHA-384
    #[display("SHA-384")]
    Sha384,
    /// SHA-512
    #[display("SHA-512")]
    Sha512,
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA224" => Ok(Self::Sha224),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl DigestAlgorithm {
    /// Digest size in bytes
    pub const fn output_size(self) -> usize {
        match self {
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Digest of the concatenation of `parts`
    pub fn digest(self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            Self::Sha224 => digest_parts::<Sha224>(parts),
            Self::Sha256 => digest_parts::<Sha256>(parts),
            Self::Sha384 => digest_parts::<Sha384>(parts),
            Self::Sha512 => digest_parts::<Sha512>(parts),
        }
    }
}

fn digest_parts<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// `base64(digest(body || timestamp || secret))`
pub fn calculate_signature(
    body: &str,
    timestamp: i64,
    secret: &[u8],
    algorithm: DigestAlgorithm,
) -> String {
    let timestamp = timestamp.to_string();
    STANDARD.encode(algorithm.digest(&[body.as_bytes(), timestamp.as_bytes(), secret]))
}

/// First `key_length` bytes of `digest(nonce || timestamp || secret)`
pub fn calculate_application_key(
    nonce: &[u8],
    timestamp: i64,
    secret: &[u8],
    key_length: usize,
    algorithm: DigestAlgorithm,
) -> Result<Vec<u8>> {
    if key_length > algorithm.output_size() {
        return Err(Error::KeyLengthTooLong {
            requested: key_length,
            available: algorithm.output_size(),
            algorithm: algorithm.to_string(),
        });
    }

    let timestamp = timestamp.to_string();
    let mut key = algorithm.digest(&[nonce, timestamp.as_bytes(), secret]);
    key.truncate(key_length);
    Ok(key)
}

/// Body of a signed service request
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest<'a> {
    /// Key id returned by the key service
    pub key_id: &'a str,
    /// Requested application key length
    pub key_length: usize,
    /// Digest algorithm for the signature
    pub algorithm: DigestAlgorithm,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    /// Extra fields; they win over the standard ones on conflict
    pub extra: Option<&'a Map<String, Value>>,
}

impl ServiceRequest<'_> {
    /// JSON body exactly as it is signed and sent
    pub fn body(&self) -> String {
        let mut body = match json!({
            "keyId": self.key_id,
            "keyLength": self.key_length,
            "algorithm": self.algorithm.to_string(),
            "timestamp": self.timestamp.to_string(),
        }) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Some(extra) = self.extra {
            body.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Value::Object(body).to_string()
    }

    /// Signature of [`Self::body`] under `secret`
    pub fn signature(&self, secret: &[u8]) -> String {
        calculate_signature(&self.body(), self.timestamp, secret, self.algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMESTAMP: i64 = 1_514_764_800_000;

    #[test]
    fn test_algorithm_names() {
        assert_eq!("SHA-256".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha256);
        assert_eq!("sha512".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Sha512);
        assert_eq!(DigestAlgorithm::Sha384.to_string(), "SHA-384");
        assert!(matches!(
            "MD5".parse::<DigestAlgorithm>(),
            Err(Error::UnsupportedAlgorithm(name)) if name == "MD5"
        ));
    }

    #[test]
    fn test_digest_sizes() {
        assert_eq!(
            hex::encode(DigestAlgorithm::Sha224.digest(&[b"a", b"bc"])),
            "23097d223405d8228642a477bda255b32aadbce4bda0b3f7e36c9da7"
        );
        for algorithm in [
            DigestAlgorithm::Sha224,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(algorithm.digest(&[b"abc"]).len(), algorithm.output_size());
        }
    }

    #[test]
    fn test_signature() {
        let signature =
            calculate_signature(r#"{"keyId":"k1"}"#, TIMESTAMP, &[1, 2, 3], DigestAlgorithm::Sha256);
        assert_eq!(signature, "ULdWlV34XJNXod1WEeMNeGSmwQCp//xWRqmi5nit31M=");
    }

    #[test]
    fn test_application_key() {
        let key =
            calculate_application_key(b"nonce", TIMESTAMP, &[1, 2, 3], 32, DigestAlgorithm::Sha256)
                .unwrap();
        assert_eq!(
            hex::encode(key),
            "9448dccbb9850b80fe83c35f79d8d2ee11366f65172ca26edb5500b467e964c1"
        );

        let key =
            calculate_application_key(b"nonce", TIMESTAMP, &[1, 2, 3], 16, DigestAlgorithm::Sha512)
                .unwrap();
        assert_eq!(hex::encode(key), "bc3f87603aa802ec7766dfc839735ace");
    }

    #[test]
    fn test_application_key_too_long() {
        assert!(matches!(
            calculate_application_key(b"nonce", TIMESTAMP, &[1], 33, DigestAlgorithm::Sha256),
            Err(Error::KeyLengthTooLong { requested: 33, available: 32, .. })
        ));
    }

    #[test]
    fn test_request_body_merges_extra_fields() {
        let mut extra = Map::new();
        extra.insert("algorithm".into(), Value::from("custom"));
        extra.insert("deviceId".into(), Value::from("d-1"));

        let request = ServiceRequest {
            key_id: "k1",
            key_length: 16,
            algorithm: DigestAlgorithm::Sha256,
            timestamp: TIMESTAMP,
            extra: Some(&extra),
        };
        let body: Value = serde_json::from_str(&request.body()).unwrap();
        assert_eq!(body["keyId"], "k1");
        assert_eq!(body["keyLength"], 16);
        assert_eq!(body["timestamp"], "1514764800000");
        assert_eq!(body["algorithm"], "custom");
        assert_eq!(body["deviceId"], "d-1");

        assert_eq!(
            request.signature(&[1, 2, 3]),
            calculate_signature(&request.body(), TIMESTAMP, &[1, 2, 3], DigestAlgorithm::Sha256)
        );
    }
}
