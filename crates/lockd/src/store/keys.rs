//! Persistent storage for issued and pending keys.
//!
//! The store holds every credential the lock has issued, together with
//! its shared secret, plus pending keys awaiting redemption with their
//! invitation secrets. State persists to JSON with atomic replace-on-
//! save; secrets serialize as base64 inside the document.
//!
//! A key issued by redemption starts unconfirmed: the pending entry is
//! kept so the redeemer can retry, and each retry re-issues a fresh
//! secret. The first successful authentication with the issued key
//! confirms it and consumes the pending entry. When an invitation
//! expires unconfirmed, both the pending entry and any unconfirmed
//! issued twin are purged.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use protocol::{
    Authentication, Key, KeyData, KeyEntry, KeyType, NewKey, Permission, ProtocolError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An issued credential and its secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IssuedKey {
    key: Key,
    secret: KeyData,
    /// False until the holder first authenticates with the secret.
    confirmed: bool,
}

/// A pending credential and its invitation secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingKey {
    key: NewKey,
    secret: KeyData,
}

/// Wrapper for serializing the key store.
#[derive(Debug, Serialize, Deserialize)]
struct KeyStoreData {
    /// Version of the store format (for future migrations).
    version: u32,
    /// Issued keys.
    keys: Vec<IssuedKey>,
    /// Pending keys awaiting redemption.
    pending: Vec<PendingKey>,
}

impl Default for KeyStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            keys: Vec::new(),
            pending: Vec::new(),
        }
    }
}

/// Thread-safe store for the lock's credentials.
pub struct KeyStore {
    /// The path to the JSON file.
    path: PathBuf,
    /// Issued keys, keyed by key ID.
    keys: RwLock<HashMap<Uuid, IssuedKey>>,
    /// Pending keys, keyed by key ID.
    pending: RwLock<HashMap<Uuid, PendingKey>>,
}

impl KeyStore {
    /// Creates a key store that will persist to the given path.
    ///
    /// This does not load the file; call `load()` to read existing data.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            keys: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a store at `path` and loads any existing data.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    /// Returns the path to the key store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the key store from the JSON file.
    ///
    /// If the file does not exist, the store will be empty.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            tracing::debug!("Key store file not found at {:?}, starting empty", self.path);
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read key store: {}", self.path.display()))?;
        let data: KeyStoreData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse key store: {}", self.path.display()))?;

        let mut keys = self.write_keys()?;
        let mut pending = self.write_pending()?;
        keys.clear();
        pending.clear();
        for entry in data.keys {
            keys.insert(entry.key.id, entry);
        }
        for entry in data.pending {
            pending.insert(entry.key.id, entry);
        }

        tracing::info!(
            "Loaded {} keys and {} pending keys from {:?}",
            keys.len(),
            pending.len(),
            self.path
        );
        Ok(())
    }

    /// Saves the key store to the JSON file.
    ///
    /// Uses atomic write (write to temp file, then rename) to prevent
    /// corruption.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create key store directory: {}", parent.display())
            })?;
        }

        let data = {
            let keys = self.read_keys()?;
            let pending = self.read_pending()?;
            KeyStoreData {
                version: 1,
                keys: keys.values().cloned().collect(),
                pending: pending.values().cloned().collect(),
            }
        };

        let contents = serde_json::to_string_pretty(&data).context("Failed to serialize key store")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)
            .with_context(|| format!("Failed to write temp key store: {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename temp key store {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!("Saved key store to {:?}", self.path);
        Ok(())
    }

    /// Returns true once any key is installed.
    pub fn is_paired(&self) -> bool {
        self.read_keys().map(|keys| !keys.is_empty()).unwrap_or(false)
    }

    /// Returns the number of issued keys.
    pub fn len(&self) -> usize {
        self.read_keys().map(|keys| keys.len()).unwrap_or(0)
    }

    /// Returns true if no key is installed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of pending keys.
    pub fn pending_len(&self) -> usize {
        self.read_pending().map(|pending| pending.len()).unwrap_or(0)
    }

    /// Installs the owner key during setup.
    pub fn install_owner(&self, key: Key, secret: KeyData) -> Result<()> {
        let mut keys = self.write_keys()?;
        tracing::info!("Installing owner key {} ({})", key.id, key.name);
        keys.insert(
            key.id,
            IssuedKey {
                key,
                secret,
                confirmed: true,
            },
        );
        Ok(())
    }

    /// Installs a key issued by redemption, replacing any previous
    /// issuance for the same pending key.
    ///
    /// The key stays unconfirmed until its holder first authenticates.
    pub fn install_issued(&self, key: Key, secret: KeyData) -> Result<()> {
        let mut keys = self.write_keys()?;
        tracing::info!("Issuing key {} ({})", key.id, key.name);
        keys.insert(
            key.id,
            IssuedKey {
                key,
                secret,
                confirmed: false,
            },
        );
        Ok(())
    }

    /// Adds a pending key and its invitation secret.
    pub fn insert_pending(&self, key: NewKey, secret: KeyData) -> Result<()> {
        let mut pending = self.write_pending()?;
        tracing::info!(
            "Offering key {} ({}), redeemable until {}",
            key.id,
            key.name,
            key.expiration
        );
        pending.insert(key.id, PendingKey { key, secret });
        Ok(())
    }

    /// Returns a pending key and its invitation secret.
    pub fn pending(&self, id: Uuid) -> Option<(NewKey, KeyData)> {
        let pending = self.read_pending().ok()?;
        pending
            .get(&id)
            .map(|entry| (entry.key.clone(), entry.secret.clone()))
    }

    /// Returns an issued key by identifier.
    pub fn key(&self, id: Uuid) -> Option<Key> {
        let keys = self.read_keys().ok()?;
        keys.get(&id).map(|entry| entry.key.clone())
    }

    /// Returns the secret of an issued key.
    pub fn secret(&self, id: Uuid) -> Option<KeyData> {
        let keys = self.read_keys().ok()?;
        keys.get(&id).map(|entry| entry.secret.clone())
    }

    /// Returns the lock's owner key, if installed.
    pub fn owner(&self) -> Option<Key> {
        let keys = self.read_keys().ok()?;
        keys.values()
            .find(|entry| entry.key.permission == Permission::Owner)
            .map(|entry| entry.key.clone())
    }

    /// Verifies a proof of possession against an issued key's secret.
    ///
    /// Unknown identifiers and failed proofs yield the same uniform
    /// error. A first successful authentication confirms the key and
    /// consumes its pending twin.
    pub fn authenticate(
        &self,
        id: Uuid,
        authentication: &Authentication,
    ) -> protocol::Result<Key> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| ProtocolError::Transport("key store lock poisoned".to_string()))?;
        let entry = keys.get_mut(&id).ok_or(ProtocolError::InvalidAuthentication)?;

        if !authentication.is_authenticated(&entry.secret) {
            return Err(ProtocolError::InvalidAuthentication);
        }

        if !entry.confirmed {
            entry.confirmed = true;
            tracing::info!("Key {} confirmed by first use", id);
            if let Ok(mut pending) = self.pending.write() {
                pending.remove(&id);
            }
        }
        Ok(entry.key.clone())
    }

    /// Removes an issued or pending key. Returns true if it existed.
    pub fn remove(&self, id: Uuid, kind: KeyType) -> Result<bool> {
        let removed = match kind {
            KeyType::Key => self.write_keys()?.remove(&id).is_some(),
            KeyType::NewKey => self.write_pending()?.remove(&id).is_some(),
        };
        if removed {
            tracing::info!("Removed {:?} {}", kind, id);
        }
        Ok(removed)
    }

    /// Drops expired pending keys and their unconfirmed issued twins.
    ///
    /// Returns the number of pending entries purged.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired: Vec<Uuid> = {
            let pending = self.read_pending()?;
            pending
                .values()
                .filter(|entry| entry.key.is_expired(now))
                .map(|entry| entry.key.id)
                .collect()
        };

        if !expired.is_empty() {
            // Lock order: keys before pending, matching authenticate().
            let mut keys = self.write_keys()?;
            let mut pending = self.write_pending()?;
            for id in &expired {
                pending.remove(id);
                if keys.get(id).is_some_and(|entry| !entry.confirmed) {
                    keys.remove(id);
                }
            }
            tracing::info!("Purged {} expired pending keys", expired.len());
        }
        Ok(expired.len())
    }

    /// Lists every credential, issued and pending, without secrets.
    ///
    /// Entries are sorted by creation time for stable read-back.
    pub fn entries(&self) -> Vec<KeyEntry> {
        let mut entries = Vec::new();
        if let Ok(keys) = self.read_keys() {
            entries.extend(keys.values().map(|entry| KeyEntry::Key(entry.key.clone())));
        }
        if let Ok(pending) = self.read_pending() {
            entries.extend(
                pending
                    .values()
                    .map(|entry| KeyEntry::NewKey(entry.key.clone())),
            );
        }
        entries.sort_by_key(|entry| match entry {
            KeyEntry::Key(key) => (key.created, key.id),
            KeyEntry::NewKey(key) => (key.created, key.id),
        });
        entries
    }

    fn read_keys(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, IssuedKey>>> {
        self.keys
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on key store"))
    }

    fn write_keys(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, IssuedKey>>> {
        self.keys
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on key store"))
    }

    fn read_pending(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, PendingKey>>> {
        self.pending
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on key store"))
    }

    fn write_pending(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, PendingKey>>> {
        self.pending
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on key store"))
    }
}
