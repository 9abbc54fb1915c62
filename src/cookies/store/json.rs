//! JSON-backed cookie store.
//!
//! `JsonCookieStore` persists a site's cookie jar in a single JSON file.
//!
//! ### I/O characteristics & caveats
//! - Every `persist` rewrites the whole file. Consent state is one cookie, so
//!   this stays small.
//! - Writes go to a sibling temp file first and are renamed into place.
//! - A missing or unreadable file loads as an empty jar.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cookies::cookie_jar::DefaultCookieJar;
use crate::cookies::store::CookieStore;

/// On-disk representation of the jar.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CookieStoreFile {
    jar: DefaultCookieJar,
}

pub struct JsonCookieStore {
    /// Path to the JSON file where cookies are stored.
    path: PathBuf,
}

impl JsonCookieStore {
    /// Opens a JSON cookie store at `path`, creating an empty file if needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        if !store.path.exists() {
            store.save_file(&CookieStoreFile::default())?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_file(&self) -> Result<CookieStoreFile> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading cookie store {}", self.path.display()))?;
        let file = serde_json::from_str(&contents)
            .with_context(|| format!("parsing cookie store {}", self.path.display()))?;
        Ok(file)
    }

    fn save_file(&self, store_file: &CookieStoreFile) -> Result<()> {
        let contents = serde_json::to_string_pretty(store_file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl CookieStore for JsonCookieStore {
    fn load(&self) -> DefaultCookieJar {
        match self.load_file() {
            Ok(file) => file.jar,
            Err(e) => {
                log::warn!("cookie store unreadable, starting empty: {e:#}");
                DefaultCookieJar::new()
            }
        }
    }

    fn persist(&self, snapshot: &DefaultCookieJar) {
        let file = CookieStoreFile { jar: snapshot.clone() };
        if let Err(e) = self.save_file(&file) {
            log::warn!("failed to persist cookies: {e:#}");
        }
    }

    fn clear(&self) {
        if let Err(e) = self.save_file(&CookieStoreFile::default()) {
            log::warn!("failed to clear cookie store: {e:#}");
        }
    }
}
