use crate::tcf::{TcStringError, VendorListError};

/// Errors surfaced by the consent manager.
#[derive(Debug, thiserror::Error)]
pub enum CmpError {
    /// The vendor list could not be loaded; initialization may be retried.
    #[error("Vendor list unavailable: {0}")]
    VendorList(#[from] VendorListError),

    /// The model could not be encoded. A correctly built model never gets here.
    #[error("Consent invariant violated: {0}")]
    Invariant(#[from] TcStringError),
}
