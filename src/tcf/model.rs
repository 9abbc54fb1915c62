//! In-memory consent model: everything a TC string carries.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Time, UtcOffset};

use super::id_set::IdSet;
use super::vendor_list::VendorList;

/// Highest purpose id representable in the core segment bitfields.
pub const PURPOSE_BITS: u16 = 24;
/// Highest special feature id representable in the core segment.
pub const SPECIAL_FEATURE_BITS: u16 = 12;

/// Restriction type applied by the publisher to a purpose for a set of vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestrictionType {
    NotAllowed,
    RequireConsent,
    RequireLegitimateInterest,
    Undefined,
}

impl RestrictionType {
    pub fn from_bits(v: u8) -> Self {
        match v {
            0 => RestrictionType::NotAllowed,
            1 => RestrictionType::RequireConsent,
            2 => RestrictionType::RequireLegitimateInterest,
            _ => RestrictionType::Undefined,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            RestrictionType::NotAllowed => 0,
            RestrictionType::RequireConsent => 1,
            RestrictionType::RequireLegitimateInterest => 2,
            RestrictionType::Undefined => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherRestriction {
    pub purpose_id: u8,
    pub restriction_type: RestrictionType,
    pub vendors: IdSet,
}

/// Publisher TC segment (type 3): the publisher's own purposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherSegment {
    pub purpose_consents: IdSet,
    pub purpose_legitimate_interests: IdSet,
    pub num_custom_purposes: u8,
    pub custom_purpose_consents: IdSet,
    pub custom_purpose_legitimate_interests: IdSet,
}

impl PublisherSegment {
    pub fn is_empty(&self) -> bool {
        self.purpose_consents.is_empty()
            && self.purpose_legitimate_interests.is_empty()
            && self.num_custom_purposes == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcModel {
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub consent_screen: u8,
    pub consent_language: String,
    pub publisher_country_code: String,
    pub vendor_list_version: u16,
    pub tcf_policy_version: u8,
    pub is_service_specific: bool,
    pub use_non_standard_texts: bool,
    pub purpose_one_treatment: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    pub purpose_consents: IdSet,
    pub purpose_legitimate_interests: IdSet,
    pub special_feature_optins: IdSet,
    pub vendor_consents: IdSet,
    pub vendor_legitimate_interests: IdSet,
    pub publisher_restrictions: Vec<PublisherRestriction>,
    pub vendors_disclosed: IdSet,
    pub vendors_allowed: IdSet,
    pub publisher: PublisherSegment,
}

/// Truncates a timestamp to UTC midnight. TC strings only carry the day a
/// decision was recorded.
pub fn day_stamp(at: OffsetDateTime) -> OffsetDateTime {
    at.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

impl TcModel {
    /// Empty model stamped with `now`. No vendor list is attached yet, so it
    /// cannot be encoded until [`TcModel::attach_vendor_list`] is called.
    pub fn new(now: OffsetDateTime) -> Self {
        let stamp = day_stamp(now);
        Self {
            cmp_id: 0,
            cmp_version: 0,
            consent_screen: 0,
            consent_language: "EN".to_string(),
            publisher_country_code: "AA".to_string(),
            vendor_list_version: 0,
            tcf_policy_version: 0,
            is_service_specific: false,
            use_non_standard_texts: false,
            purpose_one_treatment: false,
            created: stamp,
            last_updated: stamp,
            purpose_consents: IdSet::new(),
            purpose_legitimate_interests: IdSet::new(),
            special_feature_optins: IdSet::new(),
            vendor_consents: IdSet::new(),
            vendor_legitimate_interests: IdSet::new(),
            publisher_restrictions: Vec::new(),
            vendors_disclosed: IdSet::new(),
            vendors_allowed: IdSet::new(),
            publisher: PublisherSegment::default(),
        }
    }

    pub fn has_vendor_list(&self) -> bool {
        self.vendor_list_version > 0
    }

    /// Binds the model to `list`; the encoded string then references its version.
    pub fn attach_vendor_list(&mut self, list: &VendorList) {
        self.vendor_list_version = list.vendor_list_version;
        self.tcf_policy_version = list.tcf_policy_version;
    }

    pub fn set_all_vendors_disclosed(&mut self, list: &VendorList) {
        self.vendors_disclosed = list.active_vendor_ids();
    }

    pub fn unset_all_purpose_consents(&mut self) {
        self.purpose_consents.clear();
    }

    pub fn unset_all_special_feature_optins(&mut self) {
        self.special_feature_optins.clear();
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.last_updated = day_stamp(now);
    }
}
