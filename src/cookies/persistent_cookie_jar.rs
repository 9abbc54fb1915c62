use crate::cookies::cookie_jar::DefaultCookieJar;
use crate::cookies::{read_jar, write_jar, Cookie, CookieJar, CookieJarHandle, CookieStoreHandle};

/// A `CookieJar` decorator that persists changes after each mutation.
///
/// Reads go straight to the inner jar; every write is followed by a snapshot
/// pushed to the backing store.
pub struct PersistentCookieJar {
    /// Inner cookie jar that holds the actual cookie state.
    pub inner: CookieJarHandle,
    /// Handle to the cookie store responsible for persistence.
    store_handle: CookieStoreHandle,
}

impl PersistentCookieJar {
    pub fn new(jar: CookieJarHandle, store_handle: CookieStoreHandle) -> Self {
        Self {
            inner: jar,
            store_handle,
        }
    }

    /// Snapshots the inner jar and persists it to the backing store.
    ///
    /// Inner jars other than [`DefaultCookieJar`] cannot be snapshotted and are
    /// skipped with a warning.
    fn persist(&self) {
        let snapshot = {
            let inner = read_jar(&self.inner);
            match inner.as_any().downcast_ref::<DefaultCookieJar>() {
                Some(jar) => jar.clone(),
                None => {
                    log::warn!("persistent cookie jar wraps a non-default jar; not persisting");
                    return;
                }
            }
        };

        self.store_handle.persist(&snapshot);
    }
}

impl CookieJar for PersistentCookieJar {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    /// Stores a cookie, then persists the updated state.
    fn store(&mut self, cookie: Cookie) {
        write_jar(&self.inner).store(cookie);
        self.persist();
    }

    fn value(&self, name: &str) -> Option<String> {
        read_jar(&self.inner).value(name)
    }

    /// Removes a cookie, then persists the updated state.
    fn remove(&mut self, name: &str) {
        write_jar(&self.inner).remove(name);
        self.persist();
    }

    /// Clears all cookies in the jar, then persists the updated state.
    fn clear(&mut self) {
        write_jar(&self.inner).clear();
        self.persist();
    }

    fn document_cookie(&self) -> String {
        read_jar(&self.inner).document_cookie()
    }
}
