//! Global Vendor List (GVL) model and sources.
//!
//! Only the parts of the published `vendor-list.json` the consent core needs are
//! modelled; unknown fields are ignored so newer list revisions keep parsing.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use url::Url;

use super::errors::VendorListError;
use super::id_set::IdSet;
use crate::net;

/// File name of the latest vendor list under the configured base url.
pub const LATEST_VENDOR_LIST: &str = "vendor-list.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub purposes: Vec<u16>,
    #[serde(default)]
    pub leg_int_purposes: Vec<u16>,
    #[serde(default)]
    pub flexible_purposes: Vec<u16>,
    #[serde(default)]
    pub special_purposes: Vec<u16>,
    #[serde(default)]
    pub features: Vec<u16>,
    #[serde(default)]
    pub special_features: Vec<u16>,
    /// Set once a vendor has left the list; such vendors are never disclosed.
    #[serde(default)]
    pub deleted_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorList {
    pub gvl_specification_version: Option<u8>,
    pub vendor_list_version: u16,
    pub tcf_policy_version: u8,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub purposes: BTreeMap<String, Declaration>,
    #[serde(default)]
    pub special_features: BTreeMap<String, Declaration>,
    #[serde(default)]
    pub vendors: BTreeMap<String, Vendor>,
}

impl VendorList {
    /// Ids of every vendor that is still active on the list.
    pub fn active_vendor_ids(&self) -> IdSet {
        self.vendors
            .values()
            .filter(|v| v.deleted_date.is_none())
            .map(|v| v.id)
            .collect()
    }

    pub fn vendor(&self, id: u16) -> Option<&Vendor> {
        self.vendors.get(&id.to_string())
    }
}

/// Anything that can hand out the current vendor list.
///
/// The fetch is the only suspension point of consent initialisation.
pub trait VendorListSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<VendorList, VendorListError>>;
}

/// Fetches `vendor-list.json` relative to a base url.
#[derive(Debug, Clone)]
pub struct HttpVendorListSource {
    base_url: Url,
}

impl HttpVendorListSource {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    pub fn latest_url(&self) -> Result<Url, VendorListError> {
        Ok(self.base_url.join(LATEST_VENDOR_LIST)?)
    }
}

impl VendorListSource for HttpVendorListSource {
    fn fetch(&self) -> BoxFuture<'_, Result<VendorList, VendorListError>> {
        Box::pin(async move {
            let url = self.latest_url()?;
            log::debug!("fetching vendor list from {}", url);

            let response = net::fetch(&url).await?;
            if !response.is_success() {
                return Err(VendorListError::Status(response.status));
            }
            if !response.content_type().is_some_and(|ct| ct.contains("json")) {
                log::debug!("vendor list served as {:?}, parsing as json anyway", response.content_type());
            }

            let list: VendorList = serde_json::from_slice(&response.body)?;
            log::debug!(
                "vendor list v{} loaded ({} vendors)",
                list.vendor_list_version,
                list.vendors.len()
            );
            Ok(list)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "gvlSpecificationVersion": 3,
        "vendorListVersion": 142,
        "tcfPolicyVersion": 5,
        "lastUpdated": "2026-09-01T16:00:00Z",
        "purposes": { "1": { "id": 1, "name": "Store and/or access information on a device" } },
        "specialFeatures": { "1": { "id": 1, "name": "Use precise geolocation data" } },
        "vendors": {
            "2": { "id": 2, "name": "Alpha", "purposes": [1, 7], "legIntPurposes": [2] },
            "8": { "id": 8, "name": "Beta", "purposes": [1] },
            "11": { "id": 11, "name": "Gone", "deletedDate": "2025-01-01T00:00:00Z" }
        },
        "stacks": {}
    }"#;

    #[test]
    fn parses_published_shape_and_ignores_unknown_fields() {
        let list: VendorList = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(list.vendor_list_version, 142);
        assert_eq!(list.tcf_policy_version, 5);
        assert_eq!(list.vendor(2).unwrap().leg_int_purposes, vec![2]);
        assert_eq!(list.purposes.len(), 1);
    }

    #[test]
    fn deleted_vendors_are_not_active() {
        let list: VendorList = serde_json::from_str(SAMPLE).unwrap();
        let ids: Vec<u16> = list.active_vendor_ids().iter().collect();
        assert_eq!(ids, vec![2, 8]);
    }

    #[test]
    fn latest_url_is_relative_to_base() {
        let source = HttpVendorListSource::new(Url::parse("https://cmp.example/gvl/").unwrap());
        assert_eq!(source.latest_url().unwrap().as_str(), "https://cmp.example/gvl/vendor-list.json");
    }
}
