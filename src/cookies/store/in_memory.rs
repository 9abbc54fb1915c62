use std::sync::{PoisonError, RwLock};

use crate::cookies::cookie_jar::DefaultCookieJar;
use crate::cookies::store::CookieStore;

/// Keeps the persisted snapshot in memory. Lives as long as the store value does,
/// so it outlives individual jars opened from it.
#[derive(Default)]
pub struct InMemoryCookieStore {
    snapshot: RwLock<DefaultCookieJar>,
}

impl InMemoryCookieStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieStore for InMemoryCookieStore {
    fn load(&self) -> DefaultCookieJar {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn persist(&self, snapshot: &DefaultCookieJar) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
    }

    fn clear(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = DefaultCookieJar::new();
    }
}
