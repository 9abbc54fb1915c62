/// Errors produced while decoding or encoding a TC string.
///
/// The decode variants mean the persisted string is unusable and callers should
/// treat it as "no prior consent". The encode variants are invariant violations:
/// a correctly built model never triggers them.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TcStringError {
    #[error("TC string is empty")]
    Empty,

    #[error("invalid base64url payload: {0}")]
    Base64(String),

    #[error("unsupported TC string version {0}")]
    UnsupportedVersion(u8),

    #[error("truncated segment: needed {needed} bits, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("unknown segment type {0}")]
    UnknownSegment(u8),

    #[error("duplicate segment type {0}")]
    DuplicateSegment(u8),

    #[error("invalid letter code {0}")]
    InvalidLetter(u8),

    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("malformed consent payload: {0}")]
    Malformed(String),

    #[error("no vendor list attached to the model")]
    MissingVendorList,

    #[error("cmp id {0} is reserved")]
    ReservedCmpId(u16),

    #[error("disclosed vendors segment is empty")]
    NoDisclosedVendors,

    #[error("{field}: id {id} out of range")]
    IdOutOfRange { field: &'static str, id: u16 },

    #[error("{field}: value {value} does not fit in {bits} bits")]
    FieldOverflow { field: &'static str, value: u64, bits: u8 },
}

impl TcStringError {
    /// True for failures that come from reading a string rather than writing one.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            TcStringError::Empty
                | TcStringError::Base64(_)
                | TcStringError::UnsupportedVersion(_)
                | TcStringError::Truncated { .. }
                | TcStringError::UnknownSegment(_)
                | TcStringError::DuplicateSegment(_)
                | TcStringError::InvalidLetter(_)
                | TcStringError::InvalidTimestamp
                | TcStringError::Malformed(_)
        )
    }
}

/// Errors while retrieving the Global Vendor List.
#[derive(Debug, thiserror::Error)]
pub enum VendorListError {
    #[error("invalid vendor list url: {0}")]
    Url(#[from] url::ParseError),

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vendor list request failed with status {0}")]
    Status(u16),

    #[error("vendor list is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vendor list source unavailable: {0}")]
    Unavailable(String),
}
