//! SQLite-backed snapshot store with AES-GCM encryption of the serialized model payload.
//! Key derived from a local secret (env var; placeholder when unset).

use crate::error::{Error, Result};
use crate::pipeline::Snapshot;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn derive_key(seed: &[u8]) -> [u8; KEY_LEN] {
    use ring::digest;
    let mut out = [0u8; KEY_LEN];
    let h = digest::digest(&digest::SHA256, seed);
    out[..h.as_ref().len().min(KEY_LEN)].copy_from_slice(h.as_ref());
    out
}

fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt((&nonce).into(), plaintext)
        .map_err(|_| Error::Crypto("encryption failed".into()))?;
    let mut out = nonce.to_vec();
    out.extend(ciphertext);
    Ok(BASE64.encode(&out))
}

fn decrypt(key: &[u8; KEY_LEN], encoded: &str) -> Result<Vec<u8>> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    if raw.len() < NONCE_LEN {
        return Err(Error::Crypto("payload too short".into()));
    }
    let (nonce, ct) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| Error::Crypto(e.to_string()))?;
    cipher
        .decrypt(nonce.into(), ct)
        .map_err(|_| Error::Crypto("decryption failed; wrong store secret?".into()))
}

pub struct SecureStore {
    conn: Mutex<Connection>,
    key: [u8; KEY_LEN],
}

impl SecureStore {
    /// Open or create DB at path, creating parent directories.
    pub fn open(path: &Path, secret: &[u8]) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                fingerprint TEXT NOT NULL,
                users INTEGER NOT NULL,
                payload_enc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_created ON snapshots(created_at);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: derive_key(secret),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Store("connection lock poisoned".into()))
    }

    /// Insert snapshot (payload stored encrypted)
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_vec(snapshot)?;
        let enc = encrypt(&self.key, &payload)?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO snapshots (id, created_at, fingerprint, users, payload_enc) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.id,
                snapshot.created_at,
                snapshot.fingerprint,
                snapshot.features.len() as i64,
                enc
            ],
        )?;
        Ok(())
    }

    /// Most recent snapshot, decrypted
    pub fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        let enc: Option<String> = self
            .conn()?
            .query_row(
                "SELECT payload_enc FROM snapshots ORDER BY created_at DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(enc) = enc else {
            return Ok(None);
        };
        let plain = decrypt(&self.key, &enc)?;
        Ok(Some(serde_json::from_slice(&plain)?))
    }

    pub fn snapshot_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Retention: keep the `keep` newest snapshots, delete the rest
    pub fn prune_keep(&self, keep: usize) -> Result<u64> {
        let n = self.conn()?.execute(
            "DELETE FROM snapshots WHERE rowid NOT IN (
                SELECT rowid FROM snapshots ORDER BY created_at DESC, rowid DESC LIMIT ?1
            )",
            params![keep as i64],
        )?;
        Ok(n as u64)
    }
}
