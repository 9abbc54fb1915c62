//! Cookie store infrastructure.
//!
//! A **cookie store** is the durable side of a site's cookie jar: it survives
//! "page reloads", which in this crate means building a new
//! [`ConsentManager`](crate::cmp::ConsentManager) over the same store.
//!
//! - A [`CookieStore`] loads a [`DefaultCookieJar`] snapshot and writes snapshots back.
//! - [`open_jar`] wraps the loaded snapshot in a [`PersistentCookieJar`] so every
//!   mutation is written through to the store.
//!
//! Reference implementations:
//! - [`InMemoryCookieStore`]: keeps the snapshot in memory (tests, private sessions).
//! - [`JsonCookieStore`]: single JSON file.
//! - [`SqliteCookieStore`]: SQLite database (feature `sqlite_cookie_store`).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tcf_cmp::cookies::{open_jar, read_jar, write_jar, Cookie, InMemoryCookieStore};
//!
//! let store = Arc::new(InMemoryCookieStore::new());
//! write_jar(&open_jar(store.clone())).store(Cookie::new("a", "1"));
//!
//! // A second "page load" sees the persisted cookie.
//! let reloaded = open_jar(store);
//! assert_eq!(read_jar(&reloaded).value("a").as_deref(), Some("1"));
//! ```
mod in_memory;
mod json;
#[cfg(feature = "sqlite_cookie_store")]
mod sqlite;

use std::sync::{Arc, RwLock};

use crate::cookies::cookie_jar::DefaultCookieJar;
use crate::cookies::persistent_cookie_jar::PersistentCookieJar;
use crate::cookies::{CookieJarHandle, CookieStoreHandle};

pub use in_memory::InMemoryCookieStore;
pub use json::JsonCookieStore;
#[cfg(feature = "sqlite_cookie_store")]
pub use sqlite::SqliteCookieStore;

/// Durable storage for a site's cookie jar.
///
/// Implementations must be `Send + Sync` and safe for concurrent use. Persistence
/// is **best-effort**: failures are logged and never panic, so consent handling
/// keeps working with an in-memory view when the disk is unavailable.
pub trait CookieStore: Send + Sync {
    /// Loads the last persisted snapshot, or an empty jar when there is none.
    fn load(&self) -> DefaultCookieJar;

    /// Replaces the persisted state with `snapshot`.
    fn persist(&self, snapshot: &DefaultCookieJar);

    /// Removes all persisted cookie data. Idempotent.
    fn clear(&self);
}

/// Loads the store's snapshot into a jar that writes every mutation back.
pub fn open_jar(store: CookieStoreHandle) -> CookieJarHandle {
    let inner: CookieJarHandle = Arc::new(RwLock::new(store.load()));
    Arc::new(RwLock::new(PersistentCookieJar::new(inner, store)))
}
