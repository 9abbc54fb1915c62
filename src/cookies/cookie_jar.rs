//! Cookie jar abstraction and a simple in-memory implementation.
//!
//! A **cookie jar** holds the cookies visible to one site, the way
//! `document.cookie` exposes them to page scripts. The consent core only ever
//! touches a single named cookie, but the jar is generic so other site cookies
//! coexist with it.
//!
//! ## Notes & limitations
//! - One jar per site: no origin bucketing, domain or path matching.
//! - `max-age` is resolved to an absolute expiry when a cookie is stored;
//!   `max-age <= 0` removes the cookie immediately.
//! - Expired cookies are hidden from reads and dropped on the next write.
//! - Not internally synchronized. Use it through a [`CookieJarHandle`](crate::cookies::CookieJarHandle).
use std::any::Any;

use serde::{Deserialize, Serialize};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::cookies::Cookie;

/// A cookie jar keeps the cookies for a single site.
pub trait CookieJar: Send + Sync {
    /// Returns a type-erased reference to the jar.
    fn as_any(&self) -> &dyn Any;

    /// Stores `cookie`, replacing any cookie with the same name
    /// (last write wins). An already-expired cookie deletes the stored one.
    fn store(&mut self, cookie: Cookie);

    /// Current value of the cookie named `name`, `None` if absent or expired.
    fn value(&self, name: &str) -> Option<String>;

    /// Removes the cookie named `name`.
    fn remove(&mut self, name: &str);

    /// Removes all cookies from the jar.
    fn clear(&mut self);

    /// All live cookies as `"name=value"` pairs joined with `"; "`,
    /// matching what a script reads from `document.cookie`.
    fn document_cookie(&self) -> String;

    /// Parses and stores a `document.cookie` assignment.
    fn set_document_cookie(&mut self, raw: &str) {
        match Cookie::parse(raw) {
            Some(cookie) => self.store(cookie),
            None => log::debug!("ignoring malformed cookie assignment"),
        }
    }
}

/// Expiry used when `max-age` reaches past what a timestamp can hold.
const FAR_FUTURE: OffsetDateTime = datetime!(9999-12-31 23:59:59 UTC);

/// Absolute expiry for a cookie stored at `now` with `max_age` seconds to live.
fn expiry_after(now: OffsetDateTime, max_age: i64) -> OffsetDateTime {
    if max_age <= 0 {
        return OffsetDateTime::UNIX_EPOCH;
    }
    now.checked_add(Duration::seconds(max_age)).unwrap_or(FAR_FUTURE)
}

/// Default in-memory cookie jar. Serializable so stores can snapshot it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultCookieJar {
    pub entries: Vec<Cookie>,
}

impl DefaultCookieJar {
    /// Creates an empty in-memory cookie jar.
    pub fn new() -> Self {
        Self::default()
    }

    fn live(&self, now: OffsetDateTime) -> impl Iterator<Item = &Cookie> {
        self.entries.iter().filter(move |c| !c.is_expired(now))
    }
}

impl CookieJar for DefaultCookieJar {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn store(&mut self, mut cookie: Cookie) {
        let now = OffsetDateTime::now_utc();
        self.entries.retain(|c| !c.is_expired(now));

        if let Some(max_age) = cookie.max_age {
            cookie.expires = Some(expiry_after(now, max_age));
        }

        if cookie.is_expired(now) {
            self.remove(&cookie.name);
            return;
        }

        if let Some(existing) = self.entries.iter_mut().find(|c| c.name == cookie.name) {
            *existing = cookie;
        } else {
            self.entries.push(cookie);
        }
    }

    fn value(&self, name: &str) -> Option<String> {
        self.live(OffsetDateTime::now_utc())
            .find(|c| c.name == name)
            .map(|c| c.value.clone())
    }

    fn remove(&mut self, name: &str) {
        self.entries.retain(|c| c.name != name);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn document_cookie(&self) -> String {
        self.live(OffsetDateTime::now_utc())
            .filter(|c| !c.http_only)
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
