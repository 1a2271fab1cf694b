//! On-disk credential store

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::auth::{Credential, CredentialStore};

const CREDENTIALS_FILE: &str = "credentials.toml";

/// Persisted keys. Each one may be missing independently.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CredentialsFile {
    access_token: Option<String>,
    refresh_token: Option<String>,
    /// User profile JSON (stored as string for TOML compat)
    user: Option<String>,
}

/// Credential store backed by `credentials.toml` in the data directory.
///
/// The file is re-read on every access so that a corrupted or hand-edited
/// file is noticed; unreadable content counts as logged out.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CREDENTIALS_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Store in the platform data directory.
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Self::new(&crate::config::Settings::data_dir()?))
    }

    fn read(&self) -> CredentialsFile {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CredentialsFile::default(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                return CredentialsFile::default();
            }
        };
        toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable {}: {}", self.path.display(), e);
            CredentialsFile::default()
        })
    }

    fn write(&self, file: &CredentialsFile) {
        if let Err(e) = self.try_write(file) {
            tracing::error!("Failed to save credentials: {:#}", e);
        }
    }

    /// Write to a sibling temp file and rename it over the target, so readers
    /// see either the old pair or the new one.
    fn try_write(&self, file: &CredentialsFile) -> anyhow::Result<()> {
        use anyhow::Context;
        use std::io::Write;
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).context("Failed to create data directory")?;
        }
        let content = toml::to_string_pretty(file).context("Failed to serialize credentials")?;

        let tmp_path = self.path.with_file_name(format!(
            "{}.{}.{}.tmp",
            CREDENTIALS_FILE,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed),
        ));

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Contains tokens
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let written = options
            .open(&tmp_path)
            .and_then(|mut f| {
                f.write_all(content.as_bytes())?;
                f.sync_all()
            })
            .context("Failed to write credentials file")
            .and_then(|()| {
                fs::rename(&tmp_path, &self.path).context("Failed to replace credentials file")
            });
        if written.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        written
    }

    fn update(&self, f: impl FnOnce(&mut CredentialsFile)) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = self.read();
        f(&mut file);
        self.write(&file);
    }

    fn snapshot(&self) -> CredentialsFile {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read()
    }
}

impl CredentialStore for FileStore {
    /// Both tokens from one read of the file.
    fn get(&self) -> Option<Credential> {
        let file = self.snapshot();
        Some(Credential {
            access_token: file.access_token.filter(|t| !t.is_empty())?,
            refresh_token: file.refresh_token.filter(|t| !t.is_empty())?,
        })
    }

    fn access_token(&self) -> Option<String> {
        self.snapshot().access_token.filter(|t| !t.is_empty())
    }

    fn refresh_token(&self) -> Option<String> {
        self.snapshot().refresh_token.filter(|t| !t.is_empty())
    }

    fn set(&self, credential: &Credential) {
        self.update(|f| {
            f.access_token = Some(credential.access_token.clone());
            f.refresh_token = Some(credential.refresh_token.clone());
        })
    }

    fn clear(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to remove {}: {}", self.path.display(), e);
                self.write(&CredentialsFile::default());
            }
        }
    }

    fn user_value(&self) -> Option<serde_json::Value> {
        let raw = self.snapshot().user?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring unreadable cached user: {}", e);
                None
            }
        }
    }

    fn set_user_value(&self, user: &serde_json::Value) {
        let raw = user.to_string();
        self.update(|f| f.user = Some(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_missing_file_is_logged_out() {
        let (_dir, store) = temp_store();
        assert!(store.get().is_none());
        assert!(store.user_value().is_none());
    }

    #[test]
    fn test_keys_persist_across_instances() {
        let (dir, store) = temp_store();
        store.set(&Credential::new("a", "r"));
        store.set_user_value(&json!({"id": "u1", "roles": ["admin"]}));

        let reopened = FileStore::new(dir.path());
        assert_eq!(reopened.get(), Some(Credential::new("a", "r")));
        assert_eq!(
            reopened.user_value(),
            Some(json!({"id": "u1", "roles": ["admin"]}))
        );
    }

    #[test]
    fn test_clear_removes_everything() {
        let (dir, store) = temp_store();
        store.set(&Credential::new("a", "r"));
        store.set_user_value(&json!({"id": "u1"}));
        store.clear();
        store.clear();

        assert!(store.get().is_none());
        assert!(store.user_value().is_none());
        assert!(!dir.path().join(CREDENTIALS_FILE).exists());
    }

    #[test]
    fn test_corrupt_file_reads_as_absent() {
        let (dir, store) = temp_store();
        fs::write(dir.path().join(CREDENTIALS_FILE), "access_token = [unterminated").unwrap();
        assert!(store.access_token().is_none());

        // Writing over it recovers.
        store.set(&Credential::new("a", "r"));
        assert_eq!(store.access_token().as_deref(), Some("a"));
    }

    #[test]
    fn test_corrupt_user_does_not_hide_tokens() {
        let (dir, store) = temp_store();
        fs::write(
            dir.path().join(CREDENTIALS_FILE),
            "access_token = \"a\"\nrefresh_token = \"r\"\nuser = \"{not json\"\n",
        )
        .unwrap();
        assert!(store.user_value().is_none());
        assert_eq!(store.get(), Some(Credential::new("a", "r")));
    }

    #[test]
    fn test_half_written_pair_is_absent() {
        let (dir, store) = temp_store();
        fs::write(dir.path().join(CREDENTIALS_FILE), "access_token = \"a\"\n").unwrap();
        assert_eq!(store.access_token().as_deref(), Some("a"));
        assert!(store.get().is_none());
    }

    #[test]
    fn test_pair_never_seen_mixed_across_instances() {
        let (dir, reader) = temp_store();
        reader.set(&Credential::new("a0", "r0"));

        let writer_dir = dir.path().to_path_buf();
        let writer = std::thread::spawn(move || {
            let writer = FileStore::new(&writer_dir);
            for i in 1..=200 {
                writer.set(&Credential::new(format!("a{}", i), format!("r{}", i)));
            }
        });

        for _ in 0..200 {
            let pair = reader.get().expect("pair must always be readable");
            assert_eq!(pair.access_token[1..], pair.refresh_token[1..]);
        }
        writer.join().unwrap();

        assert_eq!(reader.get(), Some(Credential::new("a200", "r200")));
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (dir, store) = temp_store();
        store.set(&Credential::new("a", "r"));
        let mode = fs::metadata(dir.path().join(CREDENTIALS_FILE))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }
}
