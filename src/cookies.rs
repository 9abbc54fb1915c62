//! Cookies: [`CookieJar`], [`CookieStore`] backends and the [`ConsentCookie`].

mod consent_cookie;
mod cookie_jar;
mod cookies;
mod persistent_cookie_jar;
mod store;

pub use consent_cookie::{ConsentCookie, CONSENT_COOKIE_NAME, CONSENT_MAX_AGE};
pub use cookies::{read_jar, write_jar, Cookie, CookieJarHandle, CookieStoreHandle, SameSite};

pub use cookie_jar::{CookieJar, DefaultCookieJar};
pub use persistent_cookie_jar::PersistentCookieJar;

pub use store::{open_jar, CookieStore, InMemoryCookieStore, JsonCookieStore};
#[cfg(feature = "sqlite_cookie_store")]
pub use store::SqliteCookieStore;
