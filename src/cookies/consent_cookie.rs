//! The single persisted consent cookie.
//!
//! Holds the encoded TC string under a fixed name with the attributes the
//! framework prescribes: a 396 day max-age, site-wide path, `SameSite=Lax` and
//! `Secure` when the page is served over HTTPS. The value is opaque here.

use time::Duration;

use crate::config::CmpConfig;
use crate::cookies::{read_jar, write_jar, Cookie, CookieJarHandle, SameSite};

/// Upper bound on consent lifetime recommended by the framework.
pub const CONSENT_MAX_AGE: Duration = Duration::days(396);

/// Default cookie name for TCF v2 consent strings.
pub const CONSENT_COOKIE_NAME: &str = "euconsent-v2";

#[derive(Clone)]
pub struct ConsentCookie {
    jar: CookieJarHandle,
    name: String,
    max_age: Duration,
    secure: bool,
}

impl std::fmt::Debug for ConsentCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentCookie")
            .field("name", &self.name)
            .field("max_age", &self.max_age)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl ConsentCookie {
    pub fn new(jar: CookieJarHandle, config: &CmpConfig) -> Self {
        Self {
            jar,
            name: config.cookie_name.clone(),
            max_age: config.cookie_max_age,
            secure: config.secure_transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn cookie(&self, value: &str, max_age: i64) -> Cookie {
        Cookie {
            max_age: Some(max_age),
            path: Some("/".to_string()),
            same_site: Some(SameSite::Lax),
            secure: self.secure,
            ..Cookie::new(self.name.clone(), value)
        }
    }

    /// Persists `value` for the configured lifetime.
    pub fn set(&self, value: &str) {
        let cookie = self.cookie(value, self.max_age.whole_seconds());
        log::debug!("set cookie: {}", cookie.to_set_cookie_string());
        write_jar(&self.jar).store(cookie);
    }

    /// Currently persisted value, `None` when absent or empty.
    pub fn get(&self) -> Option<String> {
        read_jar(&self.jar).value(&self.name).filter(|v| !v.is_empty())
    }

    /// Removes the cookie by writing an already-expired entry under the same name.
    pub fn delete(&self) {
        let cookie = self.cookie("", 0);
        log::debug!("delete cookie: {}", cookie.to_set_cookie_string());
        write_jar(&self.jar).store(cookie);
    }
}
