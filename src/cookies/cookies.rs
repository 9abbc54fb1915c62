//! Cookie core types.
//!
//! This module defines the **type-erased handles** used by the consent core
//! and the serializable [`Cookie`] record.
//!
//! # Concurrency model
//! - [`CookieJarHandle`] is `Arc<RwLock<dyn CookieJar + Send + Sync>>`.
//!   Callers take a **read lock** for lookups and a **write lock** for mutations.
//! - [`CookieStoreHandle`] is `Arc<dyn CookieStore + Send + Sync>`. Stores manage
//!   their own synchronization; the trait methods take `&self`.
//!
//! # Wire form
//! [`Cookie::to_set_cookie_string`] renders the same attribute string a page
//! assigns to `document.cookie`; [`Cookie::parse`] reads it back.
//!
//! ```rust
//! use tcf_cmp::cookies::{Cookie, SameSite};
//!
//! let c = Cookie::parse("euconsent-v2=CQabc; max-age=60; path=/; SameSite=Lax; Secure").unwrap();
//! assert_eq!(c.value, "CQabc");
//! assert_eq!(c.max_age, Some(60));
//! assert_eq!(c.same_site, Some(SameSite::Lax));
//! assert!(c.secure);
//! ```

use crate::cookies::store::CookieStore;
use crate::cookies::CookieJar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use time::OffsetDateTime;

/// A handle to a cookie jar.
pub type CookieJarHandle = Arc<RwLock<dyn CookieJar + Send + Sync>>;

/// A handle to a cookie store. Stores must be internally synchronized.
pub type CookieStoreHandle = Arc<dyn CookieStore + Send + Sync>;

/// Read-locks a jar, recovering the guard if a writer panicked.
pub fn read_jar(jar: &CookieJarHandle) -> RwLockReadGuard<'_, dyn CookieJar + Send + Sync + 'static> {
    jar.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-locks a jar, recovering the guard if a writer panicked.
pub fn write_jar(jar: &CookieJarHandle) -> RwLockWriteGuard<'_, dyn CookieJar + Send + Sync + 'static> {
    jar.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn parse(value: &str) -> Option<SameSite> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("lax") {
            Some(SameSite::Lax)
        } else if value.eq_ignore_ascii_case("strict") {
            Some(SameSite::Strict)
        } else if value.eq_ignore_ascii_case("none") {
            Some(SameSite::None)
        } else {
            None
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

/// A cookie as stored/serialized by the jar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Raw cookie value (not URL-decoded).
    pub value: String,

    /// Path scoping (e.g., `"/"`).
    pub path: Option<String>,

    /// Domain scoping (host-only if `None`).
    pub domain: Option<String>,

    /// If `true`, cookie is only sent over HTTPS.
    pub secure: bool,

    /// Lifetime in seconds as given by `max-age`. Zero or negative expires the cookie immediately.
    pub max_age: Option<i64>,

    /// Absolute expiry, resolved by the jar when the cookie is stored.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires: Option<OffsetDateTime>,

    /// SameSite policy.
    pub same_site: Option<SameSite>,

    /// If `true`, cookie is hidden from page scripts.
    pub http_only: bool,
}

impl Cookie {
    /// A session cookie with no attributes.
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            secure: false,
            max_age: None,
            expires: None,
            same_site: None,
            http_only: false,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        matches!(self.expires, Some(at) if at <= now)
    }

    /// Parses a `name=value; attr; attr=value` string.
    ///
    /// Returns `None` when there is no `name=` pair. Unknown attributes are ignored.
    pub fn parse(raw: &str) -> Option<Cookie> {
        let mut parts = raw.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim());

        for part in parts {
            let part = part.trim();
            if let Some((k, v)) = part.split_once('=') {
                match k.trim().to_ascii_lowercase().as_str() {
                    "path" => cookie.path = Some(v.trim().to_string()),
                    "domain" => cookie.domain = Some(v.trim().trim_start_matches('.').to_string()),
                    "max-age" => cookie.max_age = v.trim().parse().ok(),
                    "expires" => {
                        cookie.expires = OffsetDateTime::parse(
                            v.trim(),
                            &time::format_description::well_known::Rfc2822,
                        )
                        .ok()
                    }
                    "samesite" => cookie.same_site = SameSite::parse(v),
                    _ => {}
                }
            } else if part.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            } else if part.eq_ignore_ascii_case("httponly") {
                cookie.http_only = true;
            }
        }

        Some(cookie)
    }

    /// Renders the cookie the way a page writes it to `document.cookie`.
    pub fn to_set_cookie_string(&self) -> String {
        let mut out = vec![format!("{}={}", self.name, self.value)];
        if let Some(max_age) = self.max_age {
            out.push(format!("max-age={max_age}"));
        }
        if let Some(path) = &self.path {
            out.push(format!("path={path}"));
        }
        if let Some(domain) = &self.domain {
            out.push(format!("domain={domain}"));
        }
        if let Some(same_site) = self.same_site {
            out.push(format!("SameSite={same_site}"));
        }
        if self.secure {
            out.push("Secure".to_string());
        }
        if self.http_only {
            out.push("HttpOnly".to_string());
        }
        out.join("; ")
    }
}
