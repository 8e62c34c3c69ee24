//! Encrypted, time limited cache of agreed keys
//!
//! Entries are stored under the alias `{imsi}_{keyId}` in a JSON file. The
//! file key is derived from a passphrase with PBKDF2-HMAC-SHA256 and a per
//! file salt; every CK is sealed with ChaCha20-Poly1305 under a fresh nonce
//! with the alias as associated data. A verifier sealed with the same key
//! rejects a wrong passphrase when the file is opened.
//!
//! Changes stay in memory until [`KeyCache::persist`] is called.

use std::{
    collections::BTreeMap,
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use chacha20poly1305::{
    ChaCha20Poly1305, Key, KeyInit, Nonce,
    aead::{Aead, Payload},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::{Error, Result};

/// Cache file layout version
const FILE_VERSION: u32 = 1;

/// Plaintext sealed as the passphrase verifier
const VERIFIER: &[u8] = b"soracom-endorse key cache";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Source of the current time in milliseconds since the epoch
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the epoch
    fn now_millis(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Clock stopped at `millis`
    pub const fn new(millis: i64) -> Self {
        Self {
            now: AtomicI64::new(millis),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

mod b64 {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Outcome of a successful key agreement
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[zeroize(drop)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    /// Cipher key CK
    #[serde(with = "b64")]
    pub ck: Vec<u8>,
    /// Key id assigned by the key service
    pub key_id: String,
    /// IMSI of the card
    pub imsi: String,
}

impl fmt::Debug for AuthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResult")
            .field("imsi", &self.imsi)
            .field("key_id", &self.key_id)
            .field("ck", &"<redacted>")
            .finish()
    }
}

impl AuthResult {
    /// Cache alias `{imsi}_{keyId}`
    pub fn alias(&self) -> String {
        format!("{}_{}", self.imsi, self.key_id)
    }
}

/// Split an alias into IMSI and key id
fn parse_alias(alias: &str) -> Option<(&str, &str)> {
    alias
        .split_once('_')
        .filter(|(imsi, key_id)| !imsi.is_empty() && !key_id.is_empty())
}

/// Store of agreed keys
pub trait KeyCache: Send + fmt::Debug {
    /// A still valid entry for `imsi`; expired and malformed entries are purged
    fn lookup(&mut self, imsi: &str) -> Result<Option<AuthResult>>;

    /// Insert or replace the entry for `result`
    fn save(&mut self, result: &AuthResult) -> Result<()>;

    /// Write pending changes
    fn persist(&mut self) -> Result<()>;

    /// Drop every entry
    fn clear(&mut self) -> Result<()>;

    /// Aliases currently held
    fn aliases(&self) -> Result<Vec<String>>;
}

impl<T: KeyCache + ?Sized> KeyCache for Box<T> {
    fn lookup(&mut self, imsi: &str) -> Result<Option<AuthResult>> {
        (**self).lookup(imsi)
    }

    fn save(&mut self, result: &AuthResult) -> Result<()> {
        (**self).save(result)
    }

    fn persist(&mut self) -> Result<()> {
        (**self).persist()
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn aliases(&self) -> Result<Vec<String>> {
        (**self).aliases()
    }
}

/// Cache that never holds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCache;

impl KeyCache for NoOpCache {
    fn lookup(&mut self, _imsi: &str) -> Result<Option<AuthResult>> {
        Ok(None)
    }

    fn save(&mut self, _result: &AuthResult) -> Result<()> {
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }

    fn aliases(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Settings of an [`EncryptedFileCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Lifetime of an entry
    pub ttl: Duration,
    /// PBKDF2 rounds for a new file; existing files keep their own
    pub rounds: u32,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            rounds: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sealed {
    #[serde(with = "b64")]
    nonce: Vec<u8>,
    #[serde(with = "b64")]
    ciphertext: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    created_at: i64,
    #[serde(flatten)]
    sealed: Sealed,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    version: u32,
    #[serde(with = "b64")]
    salt: Vec<u8>,
    rounds: u32,
    verifier: Sealed,
    #[serde(default)]
    entries: BTreeMap<String, StoredEntry>,
}

/// Symmetric key of one cache file
struct FileKey(Zeroizing<[u8; 32]>);

impl FileKey {
    fn derive(passphrase: &str, salt: &[u8], rounds: u32) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, rounds, &mut *key);
        Self(key)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&*self.0))
    }

    fn seal(&self, aad: &[u8], msg: &[u8]) -> Result<Sealed> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), Payload { msg, aad })
            .map_err(|_| Error::cache("failed to seal key"))?;
        Ok(Sealed {
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    fn open(&self, aad: &[u8], sealed: &Sealed) -> Result<Vec<u8>> {
        if sealed.nonce.len() != NONCE_LEN {
            return Err(Error::cache("malformed nonce"));
        }
        self.cipher()
            .decrypt(
                Nonce::from_slice(&sealed.nonce),
                Payload {
                    msg: &sealed.ciphertext,
                    aad,
                },
            )
            .map_err(|_| Error::cache("failed to open sealed key"))
    }
}

/// [`KeyCache`] kept in an encrypted JSON file
pub struct EncryptedFileCache {
    path: PathBuf,
    key: FileKey,
    salt: Vec<u8>,
    rounds: u32,
    verifier: Sealed,
    ttl_millis: i64,
    entries: BTreeMap<String, StoredEntry>,
    clock: Arc<dyn Clock>,
    dirty: bool,
}

impl fmt::Debug for EncryptedFileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedFileCache")
            .field("path", &self.path)
            .field("rounds", &self.rounds)
            .field("ttl_millis", &self.ttl_millis)
            .field("entries", &self.entries.len())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl EncryptedFileCache {
    /// Open the cache at `path`, creating the file if it does not exist
    pub fn open(
        path: impl Into<PathBuf>,
        passphrase: &str,
        options: CacheOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let path = path.into();
        let ttl_millis = i64::try_from(options.ttl.as_millis()).unwrap_or(i64::MAX);

        if path.exists() {
            let raw = fs::read(&path)
                .map_err(|e| Error::cache(format!("cannot read {}: {e}", path.display())))?;
            let file: CacheFile = serde_json::from_slice(&raw)
                .map_err(|e| Error::cache(format!("corrupt key cache {}: {e}", path.display())))?;
            if file.version != FILE_VERSION {
                return Err(Error::cache(format!(
                    "unsupported key cache version {} in {}",
                    file.version,
                    path.display()
                )));
            }

            let key = FileKey::derive(passphrase, &file.salt, file.rounds);
            if !key
                .open(&file.salt, &file.verifier)
                .is_ok_and(|plain| plain == VERIFIER)
            {
                return Err(Error::cache(format!(
                    "wrong passphrase for key cache {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), entries = file.entries.len(), "Key cache loaded");

            return Ok(Self {
                path,
                key,
                salt: file.salt,
                rounds: file.rounds,
                verifier: file.verifier,
                ttl_millis,
                entries: file.entries,
                clock,
                dirty: false,
            });
        }

        let mut salt = vec![0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        let key = FileKey::derive(passphrase, &salt, options.rounds);
        let verifier = key.seal(&salt, VERIFIER)?;

        let mut cache = Self {
            path,
            key,
            salt,
            rounds: options.rounds,
            verifier,
            ttl_millis,
            entries: BTreeMap::new(),
            clock,
            dirty: true,
        };
        cache.persist()?;
        debug!(path = %cache.path.display(), "Key cache created");
        Ok(cache)
    }

    /// Cache file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_valid(&self, entry: &StoredEntry, now: i64) -> bool {
        now < entry.created_at.saturating_add(self.ttl_millis)
    }

    fn purge(&mut self, alias: &str, reason: &str) {
        if self.entries.remove(alias).is_some() {
            debug!(alias, reason, "Purging key cache entry");
            self.dirty = true;
        }
    }

    fn write_file(&self) -> Result<()> {
        let file = CacheFile {
            version: FILE_VERSION,
            salt: self.salt.clone(),
            rounds: self.rounds,
            verifier: self.verifier.clone(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut out = options.open(&tmp)?;
        out.write_all(&json)?;
        out.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyCache for EncryptedFileCache {
    fn lookup(&mut self, imsi: &str) -> Result<Option<AuthResult>> {
        let now = self.clock.now_millis();

        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(alias, entry)| parse_alias(alias).is_none() || !self.is_valid(entry, now))
            .map(|(alias, _)| alias.clone())
            .collect();
        for alias in stale {
            self.purge(&alias, "expired or malformed");
        }

        let candidates: Vec<String> = self
            .entries
            .keys()
            .filter(|alias| parse_alias(alias).is_some_and(|(owner, _)| owner == imsi))
            .cloned()
            .collect();
        for alias in candidates {
            let opened = self
                .entries
                .get(&alias)
                .map(|entry| self.key.open(alias.as_bytes(), &entry.sealed));
            match opened {
                Some(Ok(ck)) => {
                    let key_id = parse_alias(&alias)
                        .map(|(_, key_id)| key_id.to_string())
                        .unwrap_or_default();
                    info!(key_id = %key_id, "Retrieved keyId and CK from key cache");
                    return Ok(Some(AuthResult {
                        ck,
                        key_id,
                        imsi: imsi.to_string(),
                    }));
                }
                Some(Err(e)) => {
                    warn!(alias = %alias, error = %e, "Unreadable key cache entry");
                    self.purge(&alias, "unreadable");
                }
                None => {}
            }
        }

        Ok(None)
    }

    fn save(&mut self, result: &AuthResult) -> Result<()> {
        let alias = result.alias();
        let sealed = self.key.seal(alias.as_bytes(), &result.ck)?;
        self.entries.insert(
            alias,
            StoredEntry {
                created_at: self.clock.now_millis(),
                sealed,
            },
        );
        self.dirty = true;
        Ok(())
    }

    fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.write_file()
            .map_err(|e| Error::cache(format!("cannot write {}: {e}", self.path.display())))?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "Key cache saved");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
        Ok(())
    }

    fn aliases(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}
