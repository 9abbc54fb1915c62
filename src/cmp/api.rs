//! CMP API command handler.
//!
//! Answers the standard `__tcfapi` commands from the state the consent manager
//! pushes in through [`CmpApi::update`]. Responses serialize to the JSON shapes
//! third-party scripts expect (`PingReturn`, `TCData`).
//!
//! Every call ends in exactly one callback invocation, except
//! `addEventListener`, whose callback is kept and invoked again on every
//! update until the listener is removed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

use crate::tcf::{IdSet, TcModel};

/// Version of the CMP API this handler implements.
pub const API_VERSION: &str = "2.3";

/// The only `version` argument accepted by [`CmpApi::handle`].
pub const SUPPORTED_VERSION: u32 = 2;

const PURPOSE_COUNT: u16 = 10;
const SPECIAL_FEATURE_COUNT: u16 = 2;

/// `(data, success)` callback passed to `__tcfapi`.
pub type TcfCallback = Arc<dyn Fn(Option<CmpResponse>, bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcfCommand {
    Ping,
    GetTcData,
    AddEventListener,
    RemoveEventListener,
}

impl FromStr for TcfCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ping" => Ok(TcfCommand::Ping),
            "getTCData" => Ok(TcfCommand::GetTcData),
            "addEventListener" => Ok(TcfCommand::AddEventListener),
            "removeEventListener" => Ok(TcfCommand::RemoveEventListener),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CmpStatus {
    Stub,
    Loading,
    Loaded,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Visible,
    Hidden,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    TcLoaded,
    CmpUiShown,
    UserActionComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReturn {
    pub gdpr_applies: Option<bool>,
    pub cmp_loaded: bool,
    pub cmp_status: CmpStatus,
    pub display_status: DisplayStatus,
    pub api_version: String,
    pub cmp_version: u16,
    pub cmp_id: u16,
    pub gvl_version: Option<u16>,
    pub tcf_policy_version: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentVector {
    pub consents: BTreeMap<String, bool>,
    pub legitimate_interests: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherData {
    pub consents: BTreeMap<String, bool>,
    pub legitimate_interests: BTreeMap<String, bool>,
    pub custom_purpose: ConsentVector,
    /// purpose id -> vendor id -> restriction type
    pub restrictions: BTreeMap<String, BTreeMap<String, u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TcData {
    pub tc_string: String,
    pub tcf_policy_version: u8,
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub gdpr_applies: Option<bool>,
    pub event_status: Option<EventStatus>,
    pub cmp_status: CmpStatus,
    pub listener_id: Option<u32>,
    pub is_service_specific: bool,
    pub use_non_standard_texts: bool,
    #[serde(rename = "publisherCC")]
    pub publisher_cc: String,
    pub purpose_one_treatment: bool,
    pub purpose: ConsentVector,
    pub vendor: ConsentVector,
    pub special_feature_optins: BTreeMap<String, bool>,
    pub publisher: PublisherData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CmpResponse {
    Ping(PingReturn),
    TcData(Box<TcData>),
    Bool(bool),
}

impl CmpResponse {
    pub fn as_tc_data(&self) -> Option<&TcData> {
        match self {
            CmpResponse::TcData(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_ping(&self) -> Option<&PingReturn> {
        match self {
            CmpResponse::Ping(ping) => Some(ping),
            _ => None,
        }
    }
}

/// Snapshot pushed by the manager.
struct Published {
    tc_string: String,
    model: Option<TcModel>,
}

struct ApiState {
    published: Option<Published>,
    ui_visible: bool,
    event_status: Option<EventStatus>,
    listeners: Vec<(u32, TcfCallback)>,
    next_listener_id: u32,
    revision: u64,
}

pub struct CmpApi {
    cmp_id: u16,
    cmp_version: u16,
    is_service_specific: bool,
    state: Mutex<ApiState>,
}

impl fmt::Debug for CmpApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmpApi")
            .field("cmp_id", &self.cmp_id)
            .field("cmp_version", &self.cmp_version)
            .finish_non_exhaustive()
    }
}

impl CmpApi {
    pub fn new(cmp_id: u16, cmp_version: u16, is_service_specific: bool) -> Self {
        Self {
            cmp_id,
            cmp_version,
            is_service_specific,
            state: Mutex::new(ApiState {
                published: None,
                ui_visible: false,
                event_status: None,
                listeners: Vec::new(),
                next_listener_id: 1,
                revision: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a new consent state and notifies every event listener.
    ///
    /// `tc_string` is empty when there is no consent yet; `ui_visible` tells
    /// listeners whether the consent banner is showing.
    pub fn update(&self, tc_string: &str, model: Option<TcModel>, ui_visible: bool) {
        let (revision, notifications) = {
            let mut state = self.state();
            let revision = state.revision + 1;
            (revision, self.record(&mut state, revision, tc_string, model, ui_visible))
        };
        self.notify(revision, notifications);
    }

    /// Like [`CmpApi::update`], tagged with the manager's commit revision.
    ///
    /// Returns `false` and notifies nobody when a newer or equal revision was
    /// already recorded.
    pub fn update_at(&self, revision: u64, tc_string: &str, model: Option<TcModel>, ui_visible: bool) -> bool {
        let notifications = {
            let mut state = self.state();
            if revision <= state.revision {
                log::debug!("dropping stale cmp api update r{revision}, current is r{}", state.revision);
                return false;
            }
            self.record(&mut state, revision, tc_string, model, ui_visible)
        };
        self.notify(revision, notifications);
        true
    }

    fn record(
        &self,
        state: &mut ApiState,
        revision: u64,
        tc_string: &str,
        model: Option<TcModel>,
        ui_visible: bool,
    ) -> Vec<(TcfCallback, TcData)> {
        let status = if ui_visible {
            EventStatus::CmpUiShown
        } else if state.event_status.is_none() {
            EventStatus::TcLoaded
        } else {
            EventStatus::UserActionComplete
        };
        state.revision = revision;
        state.event_status = Some(status);
        state.ui_visible = ui_visible;
        state.published = Some(Published {
            tc_string: tc_string.to_string(),
            model,
        });
        log::debug!("cmp api update: event status {:?}, {} listeners", status, state.listeners.len());

        let state: &ApiState = state;
        state
            .listeners
            .iter()
            .filter_map(|(id, cb)| self.tc_data(state, Some(*id), None).map(|data| (cb.clone(), data)))
            .collect()
    }

    /// Delivers `notifications` until a newer update replaces `revision`.
    fn notify(&self, revision: u64, notifications: Vec<(TcfCallback, TcData)>) {
        for (callback, data) in notifications {
            if self.state().revision != revision {
                log::debug!("cmp api update r{revision} superseded, skipping remaining listeners");
                break;
            }
            callback(Some(CmpResponse::TcData(Box::new(data))), true);
        }
    }

    /// Entry point behind `__tcfapi(command, version, callback, parameter)`.
    pub fn handle(&self, command: &str, version: u32, callback: TcfCallback, parameter: Option<Value>) {
        if version != SUPPORTED_VERSION {
            log::debug!("rejecting {command} for unsupported api version {version}");
            callback(None, false);
            return;
        }

        let command = match command.parse::<TcfCommand>() {
            Ok(command) => command,
            Err(unknown) => {
                log::debug!("unknown cmp api command {unknown:?}");
                callback(None, false);
                return;
            }
        };

        match command {
            TcfCommand::Ping => callback(Some(CmpResponse::Ping(self.ping())), true),
            TcfCommand::GetTcData => {
                let filter = parameter.as_ref().and_then(vendor_filter);
                let data = self.tc_data(&self.state(), None, filter.as_ref());
                match data {
                    Some(data) => callback(Some(CmpResponse::TcData(Box::new(data))), true),
                    None => callback(None, false),
                }
            }
            TcfCommand::AddEventListener => {
                let data = {
                    let mut state = self.state();
                    let id = state.next_listener_id;
                    state.next_listener_id += 1;
                    state.listeners.push((id, callback.clone()));
                    self.tc_data(&state, Some(id), None)
                };
                if let Some(data) = data {
                    callback(Some(CmpResponse::TcData(Box::new(data))), true);
                }
            }
            TcfCommand::RemoveEventListener => {
                let removed = parameter
                    .as_ref()
                    .and_then(Value::as_u64)
                    .map(|id| {
                        let mut state = self.state();
                        let before = state.listeners.len();
                        state.listeners.retain(|(lid, _)| u64::from(*lid) != id);
                        state.listeners.len() != before
                    })
                    .unwrap_or(false);
                callback(Some(CmpResponse::Bool(removed)), removed);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    pub fn ping(&self) -> PingReturn {
        let state = self.state();
        let model = state.published.as_ref().and_then(|p| p.model.as_ref());
        let loaded = state.published.is_some();
        PingReturn {
            gdpr_applies: loaded.then_some(true),
            cmp_loaded: true,
            cmp_status: if loaded { CmpStatus::Loaded } else { CmpStatus::Loading },
            display_status: if state.ui_visible { DisplayStatus::Visible } else { DisplayStatus::Hidden },
            api_version: API_VERSION.to_string(),
            cmp_version: self.cmp_version,
            cmp_id: self.cmp_id,
            gvl_version: model.map(|m| m.vendor_list_version),
            tcf_policy_version: model.map(|m| m.tcf_policy_version),
        }
    }

    /// `None` until the first update.
    fn tc_data(&self, state: &ApiState, listener_id: Option<u32>, vendors: Option<&IdSet>) -> Option<TcData> {
        let published = state.published.as_ref()?;
        let model = published.model.as_ref();

        let mut data = TcData {
            tc_string: published.tc_string.clone(),
            tcf_policy_version: model.map(|m| m.tcf_policy_version).unwrap_or_default(),
            cmp_id: self.cmp_id,
            cmp_version: self.cmp_version,
            gdpr_applies: Some(true),
            event_status: state.event_status,
            cmp_status: CmpStatus::Loaded,
            listener_id,
            is_service_specific: self.is_service_specific,
            use_non_standard_texts: false,
            publisher_cc: String::new(),
            purpose_one_treatment: false,
            purpose: ConsentVector::default(),
            vendor: ConsentVector::default(),
            special_feature_optins: BTreeMap::new(),
            publisher: PublisherData::default(),
        };

        // An empty string means no consent has been given; only the envelope is reported.
        let Some(model) = model.filter(|_| !published.tc_string.is_empty()) else {
            return Some(data);
        };

        data.use_non_standard_texts = model.use_non_standard_texts;
        data.publisher_cc = model.publisher_country_code.clone();
        data.purpose_one_treatment = model.purpose_one_treatment;
        data.purpose = ConsentVector {
            consents: vector(&model.purpose_consents, PURPOSE_COUNT),
            legitimate_interests: vector(&model.purpose_legitimate_interests, PURPOSE_COUNT),
        };
        data.special_feature_optins = vector(&model.special_feature_optins, SPECIAL_FEATURE_COUNT);

        let vendor_ids: IdSet = match vendors {
            Some(filter) => filter.clone(),
            None => model
                .vendor_consents
                .iter()
                .chain(model.vendor_legitimate_interests.iter())
                .chain(model.vendors_disclosed.iter())
                .collect(),
        };
        data.vendor = ConsentVector {
            consents: membership(&model.vendor_consents, &vendor_ids),
            legitimate_interests: membership(&model.vendor_legitimate_interests, &vendor_ids),
        };

        let publisher = &model.publisher;
        let custom = u16::from(publisher.num_custom_purposes);
        data.publisher = PublisherData {
            consents: vector(&publisher.purpose_consents, PURPOSE_COUNT),
            legitimate_interests: vector(&publisher.purpose_legitimate_interests, PURPOSE_COUNT),
            custom_purpose: ConsentVector {
                consents: vector(&publisher.custom_purpose_consents, custom),
                legitimate_interests: vector(&publisher.custom_purpose_legitimate_interests, custom),
            },
            restrictions: model
                .publisher_restrictions
                .iter()
                .fold(BTreeMap::new(), |mut acc: BTreeMap<String, BTreeMap<String, u8>>, r| {
                    let entry = acc.entry(r.purpose_id.to_string()).or_default();
                    for vendor in r.vendors.iter() {
                        entry.insert(vendor.to_string(), r.restriction_type.bits());
                    }
                    acc
                }),
        };

        Some(data)
    }
}

/// `{ "1": true, "2": false, ... }` for ids `1..=max(count, set.max_id())`.
fn vector(set: &IdSet, count: u16) -> BTreeMap<String, bool> {
    (1..=count.max(set.max_id())).map(|id| (id.to_string(), set.has(id))).collect()
}

fn membership(set: &IdSet, ids: &IdSet) -> BTreeMap<String, bool> {
    ids.iter().map(|id| (id.to_string(), set.has(id))).collect()
}

/// `getTCData` takes an optional array of vendor ids to report on.
fn vendor_filter(parameter: &Value) -> Option<IdSet> {
    let ids = parameter.as_array()?;
    Some(
        ids.iter()
            .filter_map(Value::as_u64)
            .filter_map(|id| u16::try_from(id).ok())
            .collect(),
    )
}
