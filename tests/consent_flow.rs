use std::sync::{Arc, Mutex, RwLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::json;
use tcf_cmp::cmp::testing::{sample_vendor_list, FixedClock, StaticVendorList};
use tcf_cmp::cmp::{CmpResponse, ConsentCodec, EventStatus, TcfCallback, TcfCodec};
use tcf_cmp::cookies::{open_jar, read_jar, write_jar, CookieJarHandle, DefaultCookieJar, JsonCookieStore};
use tcf_cmp::tcf::{TcModel, TcString};
use tcf_cmp::{CmpConfig, CmpServices, ConsentManager, ConsentUpdate, LifecycleState, TcfApiStub};
use time::macros::datetime;

const COOKIE: &str = "euconsent-v2";

struct Page {
    manager: Arc<ConsentManager>,
    source: Arc<StaticVendorList>,
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(datetime!(2026-10-16 14:05:00 UTC)))
}

fn empty_jar() -> CookieJarHandle {
    Arc::new(RwLock::new(DefaultCookieJar::new()))
}

fn load_page(jar: CookieJarHandle, stub: TcfApiStub, clock: Arc<FixedClock>) -> Page {
    let config = CmpConfig::default();
    let source = Arc::new(StaticVendorList::default());
    let services = CmpServices::new(&config, jar, stub)
        .with_vendor_lists(source.clone())
        .with_clock(clock);
    Page {
        manager: Arc::new(ConsentManager::new(&config, services)),
        source,
    }
}

fn persisted(jar: &CookieJarHandle) -> Option<TcModel> {
    let value = read_jar(jar).value(COOKIE)?;
    Some(TcString::decode(&value).expect("persisted cookie decodes"))
}

fn ids(model: &TcModel) -> (Vec<u16>, Vec<u16>) {
    (
        model.purpose_consents.iter().collect(),
        model.special_feature_optins.iter().collect(),
    )
}

fn published(update: ConsentUpdate) -> String {
    match update {
        ConsentUpdate::Published(s) => s,
        ConsentUpdate::Deferred => panic!("expected the update to be published"),
    }
}

#[tokio::test]
async fn accept_all_grants_every_purpose_and_special_feature() {
    let jar = empty_jar();
    let page = load_page(jar.clone(), TcfApiStub::new(), clock());
    page.manager.initialize().await.unwrap();

    let encoded = published(page.manager.apply_categories(&["necessary", "analytics", "marketing"]).unwrap());
    let model = TcString::decode(&encoded).unwrap();
    assert_eq!(ids(&model), ((1..=10).collect(), vec![1, 2]));
    assert_eq!(persisted(&jar).unwrap(), model);
    assert_eq!(model.cmp_id, 2);
    assert_eq!(model.consent_language, "PL");
    assert_eq!(model.publisher_country_code, "PL");
    assert!(model.is_service_specific);
    assert_eq!(model.vendor_list_version, 142);
}

#[tokio::test]
async fn necessary_only_grants_purpose_one() {
    let jar = empty_jar();
    let page = load_page(jar.clone(), TcfApiStub::new(), clock());
    page.manager.initialize().await.unwrap();

    page.manager.apply_categories(&["necessary"]).unwrap();
    assert_eq!(ids(&persisted(&jar).unwrap()), (vec![1], vec![]));
}

#[tokio::test]
async fn legacy_cookie_is_upgraded_once_and_keeps_grants() {
    let list = sample_vendor_list();
    let mut legacy = TcfCodec.create_fresh(&CmpConfig::default().identity(), &list, datetime!(2025-06-01 00:00 UTC));
    legacy.purpose_consents.extend([1, 7, 8]);
    let full = TcString::encode(&legacy).unwrap();
    let core_only = full.split('.').next().unwrap().to_string();
    assert!(TcString::decode(&core_only).unwrap().vendors_disclosed.is_empty());

    let jar = empty_jar();
    write_jar(&jar).set_document_cookie(&format!("{COOKIE}={core_only}; max-age=600; path=/"));

    let first = load_page(jar.clone(), TcfApiStub::new(), clock());
    first.manager.initialize().await.unwrap();
    let upgraded = first.manager.current_value();
    assert_ne!(upgraded, core_only);
    assert_eq!(read_jar(&jar).value(COOKIE).as_deref(), Some(upgraded.as_str()));

    let model = persisted(&jar).unwrap();
    assert_eq!(model.vendors_disclosed, list.active_vendor_ids());
    assert_eq!(ids(&model), (vec![1, 7, 8], vec![]));

    // A second page load finds nothing to upgrade.
    let second = load_page(jar.clone(), TcfApiStub::new(), clock());
    second.manager.initialize().await.unwrap();
    assert_eq!(second.manager.current_value(), upgraded);
    assert_eq!(read_jar(&jar).value(COOKIE).as_deref(), Some(upgraded.as_str()));
}

/// Encodes a consent string whose only vendor consent entry has been rewritten to id 0.
fn string_with_vendor_zero() -> String {
    let list = sample_vendor_list();
    let mut model = TcfCodec.create_fresh(&CmpConfig::default().identity(), &list, datetime!(2026-01-10 00:00 UTC));
    model.purpose_consents.extend([1, 2]);
    model.vendor_consents.set(2000);
    let encoded = TcString::encode(&model).unwrap();

    let mut segments: Vec<String> = encoded.split('.').map(str::to_string).collect();
    let mut core = URL_SAFE_NO_PAD.decode(&segments[0]).unwrap();
    // Core fields take 213 bits, then maxVendorId, the range flag, numEntries
    // and the entry's own range flag.
    let start = 213 + 16 + 1 + 12 + 1;
    for bit in start..start + 16 {
        core[bit / 8] &= !(0x80 >> (bit % 8));
    }
    segments[0] = URL_SAFE_NO_PAD.encode(core);
    segments.join(".")
}

#[tokio::test]
async fn cookie_with_vendor_id_zero_is_a_first_visit() {
    let current = string_with_vendor_zero();
    let legacy = current.split('.').next().unwrap().to_string();

    for stored in [current, legacy] {
        let jar = empty_jar();
        write_jar(&jar).set_document_cookie(&format!("{COOKIE}={stored}; max-age=600; path=/"));

        let page = load_page(jar.clone(), TcfApiStub::new(), clock());
        page.manager.apply_categories(&["analytics"]).unwrap();
        page.manager.initialize().await.unwrap();
        assert!(page.manager.is_ready());

        let model = persisted(&jar).unwrap();
        assert_eq!(ids(&model), (vec![1, 7, 8, 9, 10], vec![]));
        assert!(model.vendor_consents.is_empty());
        assert_eq!(read_jar(&jar).value(COOKIE), Some(page.manager.current_value()));

        page.manager.apply_categories(&["marketing"]).unwrap();
        assert_eq!(ids(&persisted(&jar).unwrap()).0, vec![1, 2, 3, 4, 5, 6]);
    }
}

#[tokio::test]
async fn sequential_page_loads_produce_identical_strings() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonCookieStore::new(dir.path().join("cookies.json")).unwrap());
    let clock = clock();

    let first = load_page(open_jar(store.clone()), TcfApiStub::new(), clock.clone());
    first.manager.initialize().await.unwrap();
    let a = published(first.manager.apply_categories(&["necessary", "marketing"]).unwrap());

    clock.advance(time::Duration::hours(3));
    let second = load_page(open_jar(store.clone()), TcfApiStub::new(), clock.clone());
    second.manager.initialize().await.unwrap();
    assert_eq!(second.manager.current_value(), a);
    let b = published(second.manager.apply_categories(&["necessary", "marketing"]).unwrap());

    assert_eq!(a, b);
}

#[tokio::test]
async fn concurrent_initialize_runs_setup_once() {
    let page = load_page(empty_jar(), TcfApiStub::new(), clock());
    let notifications = Arc::new(Mutex::new(0usize));
    let counter = notifications.clone();
    page.manager.subscribe(move |_| *counter.lock().unwrap() += 1);

    let (a, b, c) = tokio::join!(
        page.manager.initialize(),
        page.manager.initialize(),
        page.manager.initialize()
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(page.source.fetch_count(), 1);
    assert_eq!(page.manager.lifecycle(), LifecycleState::Ready);
    assert_eq!(*notifications.lock().unwrap(), 1);
}

#[tokio::test]
async fn concurrent_initialize_across_tasks() {
    let page = load_page(empty_jar(), TcfApiStub::new(), clock());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = page.manager.clone();
            tokio::spawn(async move { manager.initialize().await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert!(page.manager.is_ready());
    assert_eq!(page.source.fetch_count(), 1);
}

#[tokio::test]
async fn early_subscriber_sees_exactly_one_initial_notification() {
    let jar = empty_jar();
    let page = load_page(jar, TcfApiStub::new(), clock());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    page.manager.subscribe(move |v| sink.lock().unwrap().push(v.to_string()));
    assert_eq!(page.manager.current_value(), "");

    page.manager.initialize().await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![String::new()]);
}

#[tokio::test]
async fn reset_then_necessary_grants_only_purpose_one() {
    let jar = empty_jar();
    let page = load_page(jar.clone(), TcfApiStub::new(), clock());
    page.manager.initialize().await.unwrap();
    page.manager.apply_categories(&["necessary", "analytics", "marketing"]).unwrap();

    page.manager.reset();
    assert_eq!(page.manager.current_value(), "");
    assert!(read_jar(&jar).value(COOKIE).is_none());

    let encoded = published(page.manager.apply_categories(&["necessary"]).unwrap());
    assert_eq!(ids(&TcString::decode(&encoded).unwrap()), (vec![1], vec![]));
}

#[tokio::test]
async fn every_published_string_round_trips() {
    let page = load_page(empty_jar(), TcfApiStub::new(), clock());
    page.manager.initialize().await.unwrap();

    let selections: [&[&str]; 5] = [
        &["marketing"],
        &["analytics", "marketing"],
        &[],
        &["necessary", "bogus"],
        &["analytics"],
    ];
    for selection in selections {
        let encoded = published(page.manager.apply_categories(selection).unwrap());
        let decoded = TcString::decode(&encoded).unwrap();
        let model = page.manager.model().unwrap();
        assert_eq!(ids(&decoded), ids(&model));
        assert_eq!(decoded.vendors_disclosed, model.vendors_disclosed);
        assert!(decoded.purpose_consents.has(1));
    }
}

fn recorder() -> (Arc<Mutex<Vec<(Option<CmpResponse>, bool)>>>, TcfCallback) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let callback: TcfCallback = Arc::new(move |data: Option<CmpResponse>, ok: bool| sink.lock().unwrap().push((data, ok)));
    (calls, callback)
}

#[tokio::test]
async fn stub_queues_until_ready_then_forwards() {
    let stub = TcfApiStub::new();
    let (pings, ping_cb) = recorder();
    let (data, data_cb) = recorder();
    let (events, event_cb) = recorder();
    stub.call("ping", 2, ping_cb, None);
    stub.call("getTCData", 2, data_cb, Some(json!([8])));
    stub.call("addEventListener", 2, event_cb, None);

    let page = load_page(empty_jar(), stub.clone(), clock());
    page.manager.apply_categories(&["analytics"]).unwrap();
    assert_eq!(stub.queued(), 3);
    assert!(pings.lock().unwrap().is_empty());

    page.manager.initialize().await.unwrap();
    assert!(stub.is_attached());

    let ping = pings.lock().unwrap()[0].0.clone().unwrap();
    assert!(ping.as_ping().unwrap().cmp_loaded);

    // Queued queries see the state before the pending selection was applied.
    let first = data.lock().unwrap()[0].0.clone().unwrap();
    let first = first.as_tc_data().unwrap();
    assert_eq!(first.tc_string, "");
    assert_eq!(first.event_status, Some(EventStatus::CmpUiShown));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    let update = events[1].0.as_ref().unwrap().as_tc_data().unwrap();
    assert_eq!(update.tc_string, page.manager.current_value());
    assert_eq!(update.event_status, Some(EventStatus::UserActionComplete));
    assert_eq!(update.purpose.consents["7"], true);
    drop(events);

    let (late, late_cb) = recorder();
    stub.call("getTCData", 2, late_cb, None);
    assert_eq!(late.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn restored_consent_reports_tc_loaded() {
    let jar = empty_jar();
    let first = load_page(jar.clone(), TcfApiStub::new(), clock());
    first.manager.initialize().await.unwrap();
    first.manager.apply_categories(&["marketing"]).unwrap();

    let stub = TcfApiStub::new();
    let (events, event_cb) = recorder();
    stub.call("addEventListener", 2, event_cb, None);
    let second = load_page(jar, stub, clock());
    second.manager.initialize().await.unwrap();

    let events = events.lock().unwrap();
    let data = events[0].0.as_ref().unwrap().as_tc_data().unwrap();
    assert_eq!(data.event_status, Some(EventStatus::TcLoaded));
    assert_eq!(data.special_feature_optins["1"], true);
}
