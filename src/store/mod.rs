//! Persistent store: one JSON document holding credentials, sync settings
//! and known devices.
//!
//! The store is constructed once and cloned into every component that needs
//! it. Writes go to a temp file that is renamed over the document, so a crash
//! mid-write leaves the previous version intact.

mod types;

pub use types::*;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::error::Result;
use crate::reconcile;

/// Handle to the persisted document. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: Option<PathBuf>,
    doc: Mutex<StoreDocument>,
}

impl Store {
    /// Open (or create) the document at `path`.
    ///
    /// A missing file is created with defaults. A file that is not a valid
    /// document is moved aside to `db.json.corrupt` and replaced with
    /// defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut doc = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<StoreDocument>(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    let corrupt = path.with_extension("json.corrupt");
                    log::warn!(
                        "[store] {} is not a valid document ({}), moved to {} and starting fresh",
                        path.display(),
                        e,
                        corrupt.display()
                    );
                    fs::rename(&path, &corrupt)?;
                    StoreDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("[store] Creating {}", path.display());
                StoreDocument::default()
            }
            Err(e) => return Err(e.into()),
        };
        doc.devices = reconcile::dedupe(std::mem::take(&mut doc.devices));

        write_atomic(&path, &doc)?;
        log::info!(
            "[store] Loaded {} ({} devices)",
            path.display(),
            doc.devices.len()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                path: Some(path),
                doc: Mutex::new(doc),
            }),
        })
    }

    /// Store without a backing file.
    pub fn in_memory() -> Self {
        Self::with_document(StoreDocument::default())
    }

    /// In-memory store seeded with `doc`.
    pub fn with_document(doc: StoreDocument) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: None,
                doc: Mutex::new(doc),
            }),
        }
    }

    pub fn snapshot(&self) -> StoreDocument {
        self.lock().clone()
    }

    pub fn auth(&self) -> AuthInfo {
        self.lock().auth.clone()
    }

    pub fn config(&self) -> SyncConfig {
        self.lock().config.clone()
    }

    pub fn devices(&self) -> Vec<Device> {
        self.lock().devices.clone()
    }

    /// Read-modify-write. The change is applied to a copy, persisted, and
    /// only then made visible; a failed write leaves the store untouched.
    pub fn update<R>(&self, f: impl FnOnce(&mut StoreDocument) -> R) -> Result<R> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let out = f(&mut next);
        if let Some(path) = &self.inner.path {
            write_atomic(path, &next)?;
        }
        *guard = next;
        Ok(out)
    }

    /// Record a successful login.
    pub fn save_auth_info(
        &self,
        username: &str,
        password: &str,
        token: Option<String>,
    ) -> Result<AuthInfo> {
        let now = Utc::now();
        self.update(|doc| {
            doc.auth = AuthInfo {
                username: username.to_string(),
                password: password.to_string(),
                token,
                token_generated_at: Some(now),
                last_login: Some(now),
            };
            doc.auth.clone()
        })
    }

    /// Save credentials typed by the user. Changing them drops the current
    /// token so the next cycle logs in with the new ones.
    pub fn save_credentials(&self, username: &str, password: &str) -> Result<AuthInfo> {
        self.update(|doc| {
            let auth = &mut doc.auth;
            if auth.username != username || auth.password != password {
                auth.token = None;
                auth.token_generated_at = None;
            }
            auth.username = username.to_string();
            auth.password = password.to_string();
            auth.clone()
        })
    }

    pub fn save_server_url(&self, url: &str) -> Result<()> {
        self.update(|doc| doc.config.server_url = Some(url.to_string()))
    }

    pub fn save_sync_period(&self, period: SyncPeriod) -> Result<SyncConfig> {
        self.update(|doc| {
            doc.config.sync_period = period;
            doc.config.clone()
        })
    }

    /// Flip the persisted running flag. Marking it running also stamps
    /// `last_sync_time`.
    pub fn mark_running(&self, running: bool) -> Result<SyncConfig> {
        let now = Utc::now();
        self.update(|doc| {
            doc.config.is_running = running;
            if running {
                doc.config.last_sync_time = Some(now);
            }
            doc.config.clone()
        })
    }

    pub fn touch_last_sync(&self) -> Result<()> {
        let now = Utc::now();
        self.update(|doc| doc.config.last_sync_time = Some(now))
    }

    /// Assign (or clear) the company id of a device, creating a minimal
    /// record for unknown ids. Returns the updated device.
    pub fn update_device_company_id(
        &self,
        device_id: &str,
        company_id: Option<String>,
    ) -> Result<Device> {
        let id = device_id.trim().to_string();
        self.update(|doc| {
            reconcile::update_company_id(&mut doc.devices, &id, company_id);
            doc.devices
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .unwrap_or_else(|| Device::new(id.clone()))
        })
    }

    pub fn device_company_id(&self, device_id: &str) -> Option<String> {
        reconcile::company_id_of(&self.lock().devices, device_id).map(str::to_string)
    }

    fn lock(&self) -> MutexGuard<'_, StoreDocument> {
        self.inner.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_atomic(path: &Path, doc: &StoreDocument) -> Result<()> {
    let json = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_default_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.json");

        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.snapshot(), StoreDocument::default());
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");

        let store = Store::open(&path).unwrap();
        store.save_auth_info("admin", "secret", Some("jwt".into())).unwrap();
        store.save_sync_period(SyncPeriod::ThirtyMinutes).unwrap();
        store.update_device_company_id("17", Some("ACME".into())).unwrap();

        let reopened = Store::open(&path).unwrap();
        let doc = reopened.snapshot();
        assert_eq!(doc.auth.token.as_deref(), Some("jwt"));
        assert!(doc.auth.token_generated_at.is_some());
        assert_eq!(doc.config.sync_period, SyncPeriod::ThirtyMinutes);
        assert_eq!(reopened.device_company_id("17").as_deref(), Some("ACME"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = Store::open(&path).unwrap();
        assert_eq!(store.snapshot(), StoreDocument::default());
        let on_disk: StoreDocument = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, StoreDocument::default());
        assert_eq!(
            fs::read(path.with_extension("json.corrupt")).unwrap(),
            b"{ not json"
        );
    }

    #[test]
    fn open_resets_invalid_timestamps_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        fs::write(
            &path,
            r#"{"auth": {"username": "u", "password": "p", "tokenGeneratedAt": "yesterday"},
                "devices": [{"id": 1, "companyId": "A"}, {"id": "1", "ipAddress": "10.0.0.1"}]}"#,
        )
        .unwrap();

        let store = Store::open(&path).unwrap();
        assert!(store.auth().token_generated_at.is_none());
        let devices = store.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].company_id.as_deref(), Some("A"));
        assert_eq!(devices[0].ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn changing_credentials_drops_token() {
        let store = Store::in_memory();
        store.save_auth_info("u", "p", Some("tok".into())).unwrap();

        store.save_credentials("u", "p").unwrap();
        assert_eq!(store.auth().token.as_deref(), Some("tok"));

        store.save_credentials("u", "other").unwrap();
        let auth = store.auth();
        assert!(auth.token.is_none());
        assert!(auth.token_generated_at.is_none());
        assert_eq!(auth.password, "other");
    }

    #[test]
    fn mark_running_stamps_last_sync() {
        let store = Store::in_memory();
        let config = store.mark_running(true).unwrap();
        assert!(config.is_running);
        assert!(config.last_sync_time.is_some());

        let stamped = config.last_sync_time;
        let config = store.mark_running(false).unwrap();
        assert!(!config.is_running);
        assert_eq!(config.last_sync_time, stamped);
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let store = Store::open(&path).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        assert!(store.save_server_url("http://10.0.0.1:90").is_err());
        assert_eq!(store.config().server_url, None);
    }
}
