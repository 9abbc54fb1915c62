//! Test doubles for the manager's collaborators.
//!
//! Used by the unit tests, the integration tests and the demo. None of these
//! touch the network.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use futures::future::BoxFuture;
use time::{Duration, OffsetDateTime};

use crate::cmp::clock::Clock;
use crate::cmp::codec::ConsentCodec;
use crate::tcf::{
    Declaration, TcModel, TcStringError, Vendor, VendorList, VendorListError, VendorListSource,
};

/// A small vendor list: active vendors 2, 8, 25 and 755, vendor 11 deleted.
pub fn sample_vendor_list() -> VendorList {
    let vendor = |id: u16, name: &str, purposes: &[u16], deleted: Option<&str>| Vendor {
        id,
        name: name.to_string(),
        purposes: purposes.to_vec(),
        leg_int_purposes: Vec::new(),
        flexible_purposes: Vec::new(),
        special_purposes: Vec::new(),
        features: Vec::new(),
        special_features: Vec::new(),
        deleted_date: deleted.map(str::to_string),
    };
    let vendors = [
        vendor(2, "Captify", &[1, 2, 3, 4], None),
        vendor(8, "Emerse", &[1, 7, 9], None),
        vendor(11, "Quantcast", &[1], Some("2025-01-01T00:00:00Z")),
        vendor(25, "Yahoo", &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], None),
        vendor(755, "Google", &[1, 2, 7, 9, 10], None),
    ];

    let declare = |id: u16, name: &str| {
        (
            id.to_string(),
            Declaration {
                id,
                name: name.to_string(),
                description: String::new(),
            },
        )
    };

    VendorList {
        gvl_specification_version: Some(3),
        vendor_list_version: 142,
        tcf_policy_version: 5,
        last_updated: Some("2026-09-01T16:00:00Z".to_string()),
        purposes: (1..=10).map(|id| declare(id, &format!("Purpose {id}"))).collect(),
        special_features: BTreeMap::from([
            declare(1, "Use precise geolocation data"),
            declare(2, "Actively scan device characteristics for identification"),
        ]),
        vendors: vendors.into_iter().map(|v| (v.id.to_string(), v)).collect(),
    }
}

/// Vendor list source that serves a fixed list and counts fetches.
///
/// Every fetch yields once before resolving so concurrent initializers really
/// overlap. The first `failures` fetches fail.
pub struct StaticVendorList {
    list: VendorList,
    fetches: AtomicUsize,
    failures: AtomicUsize,
}

impl StaticVendorList {
    pub fn new(list: VendorList) -> Self {
        Self {
            list,
            fetches: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn failing(list: VendorList, failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Self::new(list)
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for StaticVendorList {
    fn default() -> Self {
        Self::new(sample_vendor_list())
    }
}

impl VendorListSource for StaticVendorList {
    fn fetch(&self) -> BoxFuture<'_, Result<VendorList, VendorListError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;

            let failed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(VendorListError::Unavailable("static vendor list set to fail".to_string()));
            }
            Ok(self.list.clone())
        })
    }
}

/// Codec fake: base64url of the model as JSON.
///
/// Enforces the same encode invariants as the real codec, so manager logic can
/// be exercised without the bit format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ConsentCodec for JsonCodec {
    fn decode(&self, encoded: &str) -> Result<TcModel, TcStringError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(TcStringError::Empty);
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| TcStringError::Base64(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TcStringError::Malformed(e.to_string()))
    }

    fn encode(&self, model: &TcModel) -> Result<String, TcStringError> {
        if !model.has_vendor_list() {
            return Err(TcStringError::MissingVendorList);
        }
        if model.cmp_id <= 1 {
            return Err(TcStringError::ReservedCmpId(model.cmp_id));
        }
        if model.vendors_disclosed.is_empty() {
            return Err(TcStringError::NoDisclosedVendors);
        }
        let json = serde_json::to_vec(model).map_err(|e| TcStringError::Malformed(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
