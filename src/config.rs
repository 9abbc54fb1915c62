//! CMP configuration.
//!
//! `CmpConfig` holds the deployment constants of a consent manager: the
//! registered CMP identity written into every TC string, where the vendor list
//! lives and how the consent cookie is persisted.
//!
//! `CmpConfig` provides the deployment defaults via [`Default`] and a fluent
//! [`CmpConfig::builder()`] for customization with validation.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use tcf_cmp::config::CmpConfig;
//! let cfg = CmpConfig::default();
//! assert_eq!(cfg.cmp_id, 2);
//! assert_eq!(cfg.cookie_name, "euconsent-v2");
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use tcf_cmp::config::CmpConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let page = url::Url::parse("http://shop.example/checkout")?;
//! let cfg = CmpConfig::builder()
//!     .cmp_id(300)
//!     .consent_language("de")
//!     .publisher_country_code("DE")
//!     .vendor_list_base_url(url::Url::parse("https://cdn.example/gvl/")?)
//!     .page_url(&page)
//!     .build()?; // returns Result<CmpConfig, CmpConfigError>
//! assert!(!cfg.secure_transport);
//! assert_eq!(cfg.consent_language, "DE");
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `cmp_id`: registered CMP id (default: 2). Ids 0 and 1 are reserved.
//! - `cmp_version`: CMP build version (default: 2).
//! - `consent_language`: two-letter language of the consent UI (default: `PL`).
//! - `publisher_country_code`: two-letter country of the publisher (default: `PL`).
//! - `is_service_specific`: consent scoped to this site only (default: `true`).
//! - `vendor_list_base_url`: directory serving `vendor-list.json`.
//! - `cookie_name`: name of the consent cookie (default: `euconsent-v2`).
//! - `cookie_max_age`: lifetime of the consent cookie (default: 396 days).
//! - `secure_transport`: mark the cookie `Secure` (default: `true`).
//!
//! # Errors
//!
//! Builder validation returns [`CmpConfigError`] for values the TC string
//! format cannot carry (reserved or oversized ids, bad letter codes) and for
//! unusable cookie settings.

use std::fmt;

use time::Duration;
use url::Url;

use crate::cmp::CmpIdentity;
use crate::cookies::{CONSENT_COOKIE_NAME, CONSENT_MAX_AGE};

const DEFAULT_VENDOR_LIST_BASE_URL: &str = "http://localhost:3000/gvl/";

/// Largest value a 12 bit field can hold.
const MAX_12_BIT: u16 = 0x0fff;

#[derive(Debug, Clone)]
pub struct CmpConfig {
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub consent_language: String,
    pub publisher_country_code: String,
    pub is_service_specific: bool,
    pub vendor_list_base_url: Url,
    pub cookie_name: String,
    pub cookie_max_age: Duration,
    pub secure_transport: bool,
}

impl Default for CmpConfig {
    fn default() -> Self {
        Self {
            cmp_id: 2,
            cmp_version: 2,
            consent_language: "PL".to_string(),
            publisher_country_code: "PL".to_string(),
            is_service_specific: true,
            vendor_list_base_url: default_vendor_list_base_url(),
            cookie_name: CONSENT_COOKIE_NAME.to_string(),
            cookie_max_age: CONSENT_MAX_AGE,
            secure_transport: true,
        }
    }
}

fn default_vendor_list_base_url() -> Url {
    Url::parse(DEFAULT_VENDOR_LIST_BASE_URL).expect("default vendor list url is a valid literal")
}

impl CmpConfig {
    pub fn builder() -> CmpConfigBuilder {
        CmpConfigBuilder::default()
    }

    /// Identity fields stamped into every model this CMP creates.
    pub fn identity(&self) -> CmpIdentity {
        CmpIdentity {
            cmp_id: self.cmp_id,
            cmp_version: self.cmp_version,
            consent_language: self.consent_language.clone(),
            publisher_country_code: self.publisher_country_code.clone(),
            is_service_specific: self.is_service_specific,
        }
    }
}

/// Builder for [`CmpConfig`].
#[derive(Debug, Clone, Default)]
pub struct CmpConfigBuilder {
    inner: CmpConfig,
}

impl CmpConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut CmpConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn cmp_id(self, id: u16) -> Self { self.map(|c| c.cmp_id = id) }
    pub fn cmp_version(self, v: u16) -> Self { self.map(|c| c.cmp_version = v) }
    pub fn consent_language<S: Into<String>>(self, lang: S) -> Self { self.map(|c| c.consent_language = lang.into()) }
    pub fn publisher_country_code<S: Into<String>>(self, cc: S) -> Self { self.map(|c| c.publisher_country_code = cc.into()) }
    pub fn is_service_specific(self, on: bool) -> Self { self.map(|c| c.is_service_specific = on) }
    pub fn vendor_list_base_url(self, url: Url) -> Self { self.map(|c| c.vendor_list_base_url = url) }
    pub fn cookie_name<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.cookie_name = name.into()) }
    pub fn cookie_max_age(self, age: Duration) -> Self { self.map(|c| c.cookie_max_age = age) }
    pub fn secure_transport(self, on: bool) -> Self { self.map(|c| c.secure_transport = on) }

    /// Derives `secure_transport` from the scheme of the page hosting the CMP.
    pub fn page_url(self, page: &Url) -> Self {
        let secure = page.scheme() == "https";
        self.map(|c| c.secure_transport = secure)
    }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut CmpConfig)) -> Self { self.map(f) }

    /// Validate and build the final config. Letter codes are normalised to uppercase.
    pub fn build(mut self) -> Result<CmpConfig, CmpConfigError> {
        self.inner.consent_language.make_ascii_uppercase();
        self.inner.publisher_country_code.make_ascii_uppercase();
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmpConfigError {
    ReservedCmpId(u16),
    CmpIdTooLarge(u16),
    CmpVersionTooLarge(u16),
    InvalidLetterCode { field: &'static str, value: String },
    BaseUrlNotDirectory(String),
    InvalidCookieName(String),
    NonPositiveMaxAge,
}

impl fmt::Display for CmpConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpConfigError::ReservedCmpId(id) =>
                write!(f, "cmp_id {id} is reserved (expected 2..=4095)"),
            CmpConfigError::CmpIdTooLarge(id) =>
                write!(f, "cmp_id {id} does not fit in 12 bits"),
            CmpConfigError::CmpVersionTooLarge(v) =>
                write!(f, "cmp_version {v} does not fit in 12 bits"),
            CmpConfigError::InvalidLetterCode { field, value } =>
                write!(f, "{field} must be two ASCII letters, got {value:?}"),
            CmpConfigError::BaseUrlNotDirectory(url) =>
                write!(f, "vendor_list_base_url must end with '/': {url}"),
            CmpConfigError::InvalidCookieName(name) =>
                write!(f, "cookie_name {name:?} is not a valid cookie name"),
            CmpConfigError::NonPositiveMaxAge =>
                write!(f, "cookie_max_age must be positive"),
        }
    }
}
impl std::error::Error for CmpConfigError {}

fn is_letter_code(code: &str) -> bool {
    code.len() == 2 && code.bytes().all(|b| b.is_ascii_alphabetic())
}

fn validate(c: &CmpConfig) -> Result<(), CmpConfigError> {
    if c.cmp_id <= 1 {
        return Err(CmpConfigError::ReservedCmpId(c.cmp_id));
    }
    if c.cmp_id > MAX_12_BIT {
        return Err(CmpConfigError::CmpIdTooLarge(c.cmp_id));
    }
    if c.cmp_version > MAX_12_BIT {
        return Err(CmpConfigError::CmpVersionTooLarge(c.cmp_version));
    }
    if !is_letter_code(&c.consent_language) {
        return Err(CmpConfigError::InvalidLetterCode {
            field: "consent_language",
            value: c.consent_language.clone(),
        });
    }
    if !is_letter_code(&c.publisher_country_code) {
        return Err(CmpConfigError::InvalidLetterCode {
            field: "publisher_country_code",
            value: c.publisher_country_code.clone(),
        });
    }
    if !c.vendor_list_base_url.path().ends_with('/') {
        return Err(CmpConfigError::BaseUrlNotDirectory(c.vendor_list_base_url.to_string()));
    }
    if c.cookie_name.is_empty()
        || c.cookie_name.chars().any(|ch| ch == ';' || ch == '=' || ch.is_whitespace())
    {
        return Err(CmpConfigError::InvalidCookieName(c.cookie_name.clone()));
    }
    if !c.cookie_max_age.is_positive() {
        return Err(CmpConfigError::NonPositiveMaxAge);
    }
    Ok(())
}
