//! Key agreement backed by the encrypted file cache

use std::{cell::Cell, sync::Arc, time::Duration};

use endorse_uicc::UiccInterface;
use soracom_endorse::{
    Error, KeyCache, Result,
    cache::{CacheOptions, Clock, EncryptedFileCache, ManualClock},
    engine::KeyAgreement,
    service::{KeyRequest, KeyService, MilenageChallenge},
};

const IMSI: &str = "440103123456789";

/// Card that always accepts the challenge
#[derive(Debug, Default)]
struct AcceptingCard {
    runs: usize,
}

impl UiccInterface for AcceptingCard {
    fn read_imsi(&mut self) -> Option<String> {
        Some(IMSI.to_string())
    }

    fn authenticate(&mut self, _rand: &[u8], _autn: &[u8]) -> Option<Vec<u8>> {
        self.runs += 1;
        let mut raw = vec![0xDB, 0x08];
        raw.extend_from_slice(&[0xA0; 8]);
        raw.push(0x10);
        raw.extend_from_slice(&[self.runs as u8; 16]);
        raw.push(0x10);
        raw.extend_from_slice(&[0xE0; 16]);
        raw.push(0x08);
        raw.extend_from_slice(&[0xF0; 8]);
        Some(raw)
    }

    fn disconnect(&mut self) -> bool {
        true
    }
}

/// Service numbering its key ids
#[derive(Debug, Default)]
struct CountingService {
    issued: Cell<u32>,
}

impl KeyService for CountingService {
    fn request_challenge(&self, request: &KeyRequest) -> Result<MilenageChallenge> {
        assert_eq!(request.imsi, IMSI);
        self.issued.set(self.issued.get() + 1);
        Ok(MilenageChallenge {
            key_id: Some(format!("key-{}", self.issued.get())),
            rand: Some("AAECAwQFBgcICQoLDA0ODw==".to_string()),
            autn: Some("EBESExQVFhcYGRobHB0eHw==".to_string()),
        })
    }

    fn verify(&self, _key_id: &str, xres: &[u8]) -> Result<()> {
        if xres == [0xA0; 8] {
            Ok(())
        } else {
            Err(Error::VerificationFailed {
                key_id: String::new(),
                url: String::new(),
                status: 400,
            })
        }
    }
}

fn options() -> CacheOptions {
    CacheOptions {
        ttl: Duration::from_secs(3600),
        rounds: 1_000,
    }
}

#[test]
fn test_key_is_reused_until_it_expires() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keycache.json");
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let cache =
        EncryptedFileCache::open(&path, "passphrase", options(), Arc::clone(&clock) as Arc<dyn Clock>)
            .unwrap();
    let mut engine = KeyAgreement::new(CountingService::default(), cache);
    let mut card = AcceptingCard::default();

    let first = engine.authenticate(&mut card).unwrap();
    assert_eq!(first.key_id, "key-1");
    assert_eq!(first.ck, vec![1; 16]);

    clock.advance(Duration::from_secs(1800));
    let second = engine.authenticate(&mut card).unwrap();
    assert_eq!(second, first);
    assert_eq!(card.runs, 1);

    clock.advance(Duration::from_secs(1800));
    let third = engine.authenticate(&mut card).unwrap();
    assert_eq!(third.key_id, "key-2");
    assert_eq!(third.ck, vec![2; 16]);
    assert_eq!(
        engine.cache().aliases().unwrap(),
        vec![format!("{IMSI}_key-2")]
    );
}

#[test]
fn test_persisted_key_is_found_by_a_new_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keycache.json");
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_700_000_000_000));

    let cache = EncryptedFileCache::open(&path, "passphrase", options(), Arc::clone(&clock)).unwrap();
    let mut engine = KeyAgreement::new(CountingService::default(), cache);
    let agreed = engine.authenticate(&mut AcceptingCard::default()).unwrap();
    drop(engine);

    let cache = EncryptedFileCache::open(&path, "passphrase", options(), clock).unwrap();
    let mut engine = KeyAgreement::new(CountingService::default(), cache);
    let mut card = AcceptingCard::default();
    assert_eq!(engine.authenticate(&mut card).unwrap(), agreed);
    assert_eq!(card.runs, 0);
    assert_eq!(engine.service().issued.get(), 0);
}
