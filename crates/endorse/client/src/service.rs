//! Client side of the SORACOM keys API

use std::{fmt, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{StatusCode, blocking::Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{keys_url, verify_url};
use crate::signature::ServiceRequest;
use crate::{Error, Result};

/// Body of `POST /v1/keys`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequest {
    /// IMSI of the card
    pub imsi: String,
    /// Base64 RAND of the challenge being resynchronized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rand: Option<String>,
    /// Base64 AUTS reported by the card
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auts: Option<String>,
}

impl KeyRequest {
    /// First request for `imsi`
    pub fn new(imsi: impl Into<String>) -> Self {
        Self {
            imsi: imsi.into(),
            ..Self::default()
        }
    }

    /// Resynchronization request carrying the previous RAND and the card's AUTS
    pub fn resync(imsi: impl Into<String>, rand: impl Into<String>, auts: &[u8]) -> Self {
        Self {
            imsi: imsi.into(),
            rand: Some(rand.into()),
            auts: Some(STANDARD.encode(auts)),
        }
    }
}

/// Milenage parameters handed out by the keys API, base64 encoded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilenageChallenge {
    /// Key id to verify against
    pub key_id: Option<String>,
    /// RAND
    pub rand: Option<String>,
    /// AUTN
    pub autn: Option<String>,
}

/// A complete, decoded challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Key id to verify against
    pub key_id: String,
    /// RAND exactly as received, reused for resynchronization
    pub rand_b64: String,
    /// RAND
    pub rand: Vec<u8>,
    /// AUTN
    pub autn: Vec<u8>,
}

impl MilenageChallenge {
    /// Check every field is present and decode RAND and AUTN
    pub fn decode(&self, imsi: &str) -> Result<Challenge> {
        let missing = |missing| Error::MissingChallenge {
            imsi: imsi.to_string(),
            missing,
        };
        let rand_b64 = self.rand.clone().ok_or_else(|| missing("rand"))?;
        let autn = self.autn.as_deref().ok_or_else(|| missing("autn"))?;
        let key_id = self.key_id.clone().ok_or_else(|| missing("keyId"))?;

        Ok(Challenge {
            key_id,
            rand: STANDARD.decode(&rand_b64)?,
            autn: STANDARD.decode(autn)?,
            rand_b64,
        })
    }
}

/// Remote side of the key agreement
pub trait KeyService: fmt::Debug {
    /// Ask for a fresh challenge
    fn request_challenge(&self, request: &KeyRequest) -> Result<MilenageChallenge>;

    /// Prove possession of the key with the card's RES
    fn verify(&self, key_id: &str, xres: &[u8]) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest {
    xres: String,
}

/// [`KeyService`] over HTTPS
#[derive(Debug, Clone)]
pub struct HttpKeyService {
    base: String,
    client: Client,
}

impl HttpKeyService {
    /// Service rooted at `base`, e.g. `https://g.api.soracom.io`
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("soracom-endorse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base: base.into(),
            client,
        })
    }

    /// Base URL
    pub fn base(&self) -> &str {
        &self.base
    }

    fn post(&self, url: &str, body: String, headers: &[(&str, String)]) -> Result<(StatusCode, String)> {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        debug!(url, status = status.as_u16(), "Key service replied");
        Ok((status, body))
    }

    /// Post a request signed with `ck` and return the response body
    pub fn request_service(&self, url: &str, ck: &[u8], request: &ServiceRequest<'_>) -> Result<String> {
        let headers = [
            ("x-soracom-timestamp", request.timestamp.to_string()),
            ("x-soracom-digest-algorithm", request.algorithm.to_string()),
            ("x-soracom-signature", request.signature(ck)),
        ];
        let (status, body) = self.post(url, request.body(), &headers)?;
        if status == StatusCode::OK {
            Ok(body)
        } else {
            error!(url, status = status.as_u16(), "Key distribution service call failed");
            Err(Error::RemoteService {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl KeyService for HttpKeyService {
    fn request_challenge(&self, request: &KeyRequest) -> Result<MilenageChallenge> {
        let url = keys_url(&self.base);
        debug!(imsi = %request.imsi, resync = request.auts.is_some(), "Requesting key agreement");

        let (status, body) = self.post(&url, serde_json::to_string(request)?, &[])?;
        // the service answers 401 with a challenge when the card must prove itself
        if (status == StatusCode::OK || status == StatusCode::UNAUTHORIZED) && !body.is_empty() {
            return Ok(serde_json::from_str(&body)?);
        }

        error!(url = %url, status = status.as_u16(), "Key agreement call failed");
        Err(Error::RemoteService {
            url,
            status: status.as_u16(),
            body,
        })
    }

    fn verify(&self, key_id: &str, xres: &[u8]) -> Result<()> {
        let url = verify_url(&self.base, key_id);
        let body = serde_json::to_string(&VerifyRequest {
            xres: STANDARD.encode(xres),
        })?;

        let (status, _) = self.post(&url, body, &[])?;
        if status == StatusCode::OK {
            Ok(())
        } else {
            error!(url = %url, status = status.as_u16(), "Master key verification failed");
            Err(Error::VerificationFailed {
                key_id: key_id.to_string(),
                url,
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_request_json() {
        assert_eq!(
            serde_json::to_string(&KeyRequest::new("001010000000001")).unwrap(),
            r#"{"imsi":"001010000000001"}"#
        );
        assert_eq!(
            serde_json::to_string(&KeyRequest::resync("001010000000001", "AAEC", &[0xAB, 0xCD]))
                .unwrap(),
            r#"{"imsi":"001010000000001","rand":"AAEC","auts":"q80="}"#
        );
    }

    #[test]
    fn test_challenge_decode() {
        let challenge: MilenageChallenge =
            serde_json::from_str(r#"{"keyId":"k1","rand":"AAEC","autn":"AwQF"}"#).unwrap();
        let decoded = challenge.decode("001").unwrap();
        assert_eq!(decoded.key_id, "k1");
        assert_eq!(decoded.rand, vec![0, 1, 2]);
        assert_eq!(decoded.autn, vec![3, 4, 5]);
        assert_eq!(decoded.rand_b64, "AAEC");
    }

    #[test]
    fn test_challenge_missing_fields() {
        let challenge = MilenageChallenge {
            key_id: Some("k1".into()),
            rand: Some("AAEC".into()),
            autn: None,
        };
        assert!(matches!(
            challenge.decode("001"),
            Err(Error::MissingChallenge { missing: "autn", .. })
        ));
        assert!(matches!(
            MilenageChallenge::default().decode("001"),
            Err(Error::MissingChallenge { missing: "rand", .. })
        ));

        let bad = MilenageChallenge {
            key_id: Some("k1".into()),
            rand: Some("not base64!".into()),
            autn: Some("AwQF".into()),
        };
        assert!(matches!(bad.decode("001"), Err(Error::Base64(_))));
    }

    #[test]
    fn test_unreachable_service() {
        let service = HttpKeyService::new("http://127.0.0.1:9").unwrap();
        assert_eq!(service.base(), "http://127.0.0.1:9");
        assert!(matches!(
            service.request_challenge(&KeyRequest::new("001")),
            Err(Error::Http(_))
        ));
    }
}
