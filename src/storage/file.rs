// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem storage. */

use {
    super::{Key, Namespace, Storage},
    serde::Deserialize,
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
        sync::RwLock,
        time::Duration,
    },
    tracing::error,
};

const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Root directory for cached blobs.
    pub path: PathBuf,

    /// Default time to live, in seconds, judged against file mtime.
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Stores one blob per file under a root directory.
///
/// Expiry is judged from file mtime: an entry older than its namespace's
/// TTL is treated as absent. I/O failures are logged and reported as
/// misses so a broken cache directory never breaks request serving.
pub struct FileStorage {
    root: PathBuf,
    default_ttl: Option<Duration>,
    namespace_ttl: RwLock<HashMap<Namespace, Option<Duration>>>,
}

impl FileStorage {
    pub fn new(config: FileConfig) -> Self {
        let default_ttl = match config.ttl {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(DEFAULT_TTL),
        };

        Self {
            root: config.path,
            default_ttl,
            namespace_ttl: RwLock::new(HashMap::new()),
        }
    }

    fn blob_path(&self, key: &Key) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn ttl_for(&self, namespace: &Namespace) -> Option<Duration> {
        self.namespace_ttl
            .read()
            .expect("ttl lock poisoned")
            .get(namespace)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    fn is_expired(path: &Path, ttl: Duration) -> bool {
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(mtime) = metadata.modified() else {
            return false;
        };

        match mtime.elapsed() {
            Ok(age) => age > ttl,
            // Future mtime: clock skew, treat as fresh.
            Err(_) => false,
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &Key) -> Option<Vec<u8>> {
        let path = self.blob_path(key);

        if let Some(ttl) = self.ttl_for(&key.namespace()) {
            if Self::is_expired(&path, ttl) {
                return None;
            }
        }

        match std::fs::read(&path) {
            Ok(data) => Some(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                error!(key = %key, error = %e, "file storage read error");
                None
            }
        }
    }

    fn put(&self, key: &Key, value: Vec<u8>) {
        let path = self.blob_path(key);

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!(key = %key, error = %e, "file storage mkdir error");
                return;
            }
        }

        // Write-then-rename so concurrent readers never observe a torn blob.
        let tmp = path.with_file_name(format!(
            "{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        if let Err(e) = std::fs::write(&tmp, &value) {
            error!(key = %key, error = %e, "file storage write error");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, &path) {
            error!(key = %key, error = %e, "file storage rename error");
        }
    }

    fn set_namespace_ttl(&self, namespace: Namespace, ttl: Option<Duration>) {
        self.namespace_ttl
            .write()
            .expect("ttl lock poisoned")
            .insert(namespace, ttl);
    }
}
