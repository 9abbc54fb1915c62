//! Consent codec adapter.
//!
//! The manager never touches the wire format directly. It goes through a
//! [`ConsentCodec`], so the bit-level TC string implementation can be swapped
//! for a fake in tests. Model construction and the disclosed-vendors upgrade
//! are provided methods; implementors only supply `decode` and `encode`.

use time::OffsetDateTime;

use crate::tcf::{TcModel, TcString, TcStringError, VendorList};

/// Fixed identity fields written into every model this CMP builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmpIdentity {
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub consent_language: String,
    pub publisher_country_code: String,
    pub is_service_specific: bool,
}

/// Result of [`ConsentCodec::upgrade_if_needed`].
#[derive(Debug, Clone, PartialEq)]
pub enum Upgrade {
    /// The model was already current.
    Unchanged(TcModel),
    /// The disclosed-vendors segment was populated; the model must be re-encoded and persisted.
    Upgraded(TcModel),
}

impl Upgrade {
    pub fn is_upgraded(&self) -> bool {
        matches!(self, Upgrade::Upgraded(_))
    }

    pub fn into_model(self) -> TcModel {
        match self {
            Upgrade::Unchanged(model) | Upgrade::Upgraded(model) => model,
        }
    }
}

pub trait ConsentCodec: Send + Sync {
    /// A model carrying `identity`, disclosing every vendor in `list` and granting nothing.
    fn create_fresh(&self, identity: &CmpIdentity, list: &VendorList, now: OffsetDateTime) -> TcModel {
        let mut model = TcModel::new(now);
        model.cmp_id = identity.cmp_id;
        model.cmp_version = identity.cmp_version;
        model.consent_language = identity.consent_language.clone();
        model.publisher_country_code = identity.publisher_country_code.clone();
        model.is_service_specific = identity.is_service_specific;
        model.attach_vendor_list(list);
        model.set_all_vendors_disclosed(list);
        model
    }

    /// Decodes a persisted string. Any error means "no prior consent".
    fn decode(&self, encoded: &str) -> Result<TcModel, TcStringError>;

    /// Promotes a model whose disclosed-vendors segment is empty by disclosing
    /// every active vendor of `list`.
    fn upgrade_if_needed(&self, mut model: TcModel, list: &VendorList) -> Upgrade {
        if !model.vendors_disclosed.is_empty() {
            return Upgrade::Unchanged(model);
        }
        model.set_all_vendors_disclosed(list);
        Upgrade::Upgraded(model)
    }

    /// Encodes `model`. An error here is an invariant violation.
    fn encode(&self, model: &TcModel) -> Result<String, TcStringError>;
}

/// Codec backed by the TCF v2 bit format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcfCodec;

impl ConsentCodec for TcfCodec {
    fn decode(&self, encoded: &str) -> Result<TcModel, TcStringError> {
        TcString::decode(encoded)
    }

    fn encode(&self, model: &TcModel) -> Result<String, TcStringError> {
        TcString::encode(model)
    }
}
