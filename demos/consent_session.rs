use std::sync::Arc;

use tcf_cmp::cmp::testing::StaticVendorList;
use tcf_cmp::cmp::{CmpResponse, TcfCallback};
use tcf_cmp::cookies::{open_jar, read_jar, InMemoryCookieStore};
use tcf_cmp::tcf::TcString;
use tcf_cmp::{CmpConfig, CmpError, CmpServices, ConsentManager, TcfApiStub};

#[tokio::main]
async fn main() -> Result<(), CmpError> {
    env_logger::init();

    // The page hosting the CMP decides whether the consent cookie gets the Secure attribute.
    let page = url::Url::parse("https://shop.example/").expect("valid page url");
    let config = CmpConfig::builder()
        .page_url(&page)
        .build()
        .expect("CmpConfig is not valid");

    // The cookie store outlives a single page load. Every manager we create below opens a
    // fresh jar over the same store, just like a browser reloading the page.
    let store = Arc::new(InMemoryCookieStore::new());

    // The stub has to exist before anything else runs, so third-party scripts can call it
    // straight away. Their calls are queued until the manager is ready.
    let stub = TcfApiStub::new();
    let listener: TcfCallback = Arc::new(|data: Option<CmpResponse>, ok: bool| {
        if let Some(tc) = data.as_ref().and_then(CmpResponse::as_tc_data) {
            println!("[vendor] event {:?} ok={ok} tcString={:?}", tc.event_status, tc.tc_string);
        }
    });
    stub.call("addEventListener", 2, listener, None);

    // A real deployment fetches vendor-list.json from `config.vendor_list_base_url`; here we
    // serve a small built-in list so the demo runs offline.
    let services = CmpServices::new(&config, open_jar(store.clone()), stub.clone())
        .with_vendor_lists(Arc::new(StaticVendorList::default()));
    let manager = ConsentManager::new(&config, services);

    manager.subscribe(|tc| println!("[ui] tc string is now {tc:?}"));

    // The banner may report a choice before initialization has finished. It is kept and
    // applied as soon as the manager is ready.
    manager.apply_categories(&["necessary", "analytics"])?;
    manager.initialize().await?;

    let encoded = manager.current_value();
    println!("persisted cookie: {:?}", read_jar(&open_jar(store.clone())).value(&config.cookie_name));
    if let Ok(model) = TcString::decode(&encoded) {
        let purposes: Vec<u16> = model.purpose_consents.iter().collect();
        println!("granted purposes: {purposes:?}");
    }

    // Reload: a new manager over the same store restores the decision.
    let reloaded = ConsentManager::new(
        &config,
        CmpServices::new(&config, open_jar(store.clone()), TcfApiStub::new())
            .with_vendor_lists(Arc::new(StaticVendorList::default())),
    );
    reloaded.initialize().await?;
    println!("after reload: same string = {}", reloaded.current_value() == encoded);

    // Withdrawing consent clears the cookie. The page would normally reload now.
    reloaded.reset();
    println!("after reset: {:?}", reloaded.current_value());

    Ok(())
}
