//! AKA key agreement with one resynchronization round
//!
//! ```text
//! read IMSI -> cached? -> done
//!           -> request challenge -> AUTHENTICATE
//!                 Success     -> verify RES -> save
//!                 SyncFailure -> request challenge (RAND, AUTS) -> AUTHENTICATE
//!                                     Success -> verify RES -> save
//!                                     else    -> fatal
//!                 Unknown     -> fatal
//! ```
//!
//! The cache is persisted at the end of every successful run, including
//! runs answered from the cache.

use endorse_uicc::{AuthenticationResponse, UiccInterface};
use tracing::{debug, info, instrument};

use crate::cache::{AuthResult, KeyCache};
use crate::service::{Challenge, KeyRequest, KeyService};
use crate::{Error, Result};

/// Runs key agreement between a card and the key service
#[derive(Debug)]
pub struct KeyAgreement<S, C> {
    service: S,
    cache: C,
}

impl<S: KeyService, C: KeyCache> KeyAgreement<S, C> {
    /// Engine over `service`, remembering keys in `cache`
    pub const fn new(service: S, cache: C) -> Self {
        Self { service, cache }
    }

    /// Key service
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// Key cache
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Key cache, mutably
    pub const fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    /// Agree on a key for the card behind `uicc`
    #[instrument(skip_all)]
    pub fn authenticate(&mut self, uicc: &mut dyn UiccInterface) -> Result<AuthResult> {
        let imsi = uicc
            .read_imsi()
            .filter(|imsi| !imsi.is_empty())
            .ok_or(Error::ImsiNotRetrieved)?;
        debug!(imsi = %imsi, "IMSI read");

        let result = match self.cache.lookup(&imsi)? {
            Some(cached) => cached,
            None => self.agree(uicc, &imsi)?,
        };
        self.cache.persist()?;
        Ok(result)
    }

    fn agree(&mut self, uicc: &mut dyn UiccInterface, imsi: &str) -> Result<AuthResult> {
        let challenge = self.challenge(&KeyRequest::new(imsi), imsi)?;

        match run_card(uicc, &challenge)? {
            AuthenticationResponse::Success { res, ck, .. } => {
                self.conclude(imsi, &challenge, &res, ck)
            }
            AuthenticationResponse::SyncFailure { auts } => {
                info!("Card reported a sequence mismatch, resynchronizing");
                let request = KeyRequest::resync(imsi, challenge.rand_b64.as_str(), &auts);
                debug!(rand = %challenge.rand_b64, auts = ?request.auts, "Resynchronization request");

                let challenge = self.challenge(&request, imsi)?;
                match run_card(uicc, &challenge)? {
                    AuthenticationResponse::Success { res, ck, .. } => {
                        self.conclude(imsi, &challenge, &res, ck)
                    }
                    AuthenticationResponse::SyncFailure { .. } => Err(Error::SyncExhausted {
                        imsi: imsi.to_string(),
                    }),
                    AuthenticationResponse::Unknown => Err(Error::AuthenticationFailed(
                        "unrecognized AUTHENTICATE response after resynchronization",
                    )),
                }
            }
            AuthenticationResponse::Unknown => Err(Error::AuthenticationFailed(
                "unrecognized AUTHENTICATE response",
            )),
        }
    }

    fn challenge(&self, request: &KeyRequest, imsi: &str) -> Result<Challenge> {
        let challenge = self.service.request_challenge(request)?.decode(imsi)?;
        debug!(key_id = %challenge.key_id, "Challenge received");
        Ok(challenge)
    }

    fn conclude(
        &mut self,
        imsi: &str,
        challenge: &Challenge,
        res: &[u8],
        ck: Vec<u8>,
    ) -> Result<AuthResult> {
        self.service.verify(&challenge.key_id, res)?;
        info!(key_id = %challenge.key_id, "Master key verified");

        let result = AuthResult {
            ck,
            key_id: challenge.key_id.clone(),
            imsi: imsi.to_string(),
        };
        self.cache.save(&result)?;
        Ok(result)
    }
}

fn run_card(uicc: &mut dyn UiccInterface, challenge: &Challenge) -> Result<AuthenticationResponse> {
    uicc.authenticate(&challenge.rand, &challenge.autn)
        .map(|raw| AuthenticationResponse::decode(&raw))
        .ok_or(Error::AuthenticationFailed("card returned no AUTHENTICATE response"))
}
