//! The consent state manager.
//!
//! [`ConsentManager`] owns the page's single [`TcModel`] and drives everything
//! around it: the one-time asynchronous initialization against the vendor list,
//! translating banner categories into TCF purposes, persisting the encoded
//! string in the consent cookie and announcing every new string to the
//! [`TcStringPublisher`] and the [`CmpApi`].
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --initialize()--> Initializing --ok--> Ready
//!       ^                               |
//!       +------------ error ------------+
//! ```
//!
//! Only `initialize` suspends (on the vendor-list fetch). Every other operation
//! runs to completion synchronously. The state lock is never held across an
//! `.await` or while callbacks run, so subscribers may call back into the
//! manager.
//!
//! Each change to the model is a commit: the model and the consent cookie are
//! updated together under the state lock and the commit gets the next
//! revision. The [`CmpApi`] and the [`TcStringPublisher`] are told about it
//! after the lock is released and ignore revisions older than the one they
//! already hold. A commit made from inside a callback therefore always ends up
//! as the cookie, the API state and the published value at once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cmp::api::CmpApi;
use crate::cmp::categories::{purposes_for, special_features_for, NECESSARY_PURPOSES};
use crate::cmp::clock::{Clock, SystemClock};
use crate::cmp::codec::{CmpIdentity, ConsentCodec, TcfCodec, Upgrade};
use crate::cmp::publisher::{TcStringPublisher, Unsubscribe};
use crate::cmp::stub::TcfApiStub;
use crate::config::CmpConfig;
use crate::cookies::{ConsentCookie, CookieJarHandle};
use crate::errors::CmpError;
use crate::tcf::{HttpVendorListSource, TcModel, VendorList, VendorListSource};

/// Collaborators injected into a [`ConsentManager`].
#[derive(Clone)]
pub struct CmpServices {
    pub codec: Arc<dyn ConsentCodec>,
    pub vendor_lists: Arc<dyn VendorListSource>,
    pub cookie: ConsentCookie,
    pub stub: TcfApiStub,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for CmpServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmpServices")
            .field("cookie", &self.cookie)
            .field("stub", &self.stub)
            .finish_non_exhaustive()
    }
}

impl CmpServices {
    /// Production wiring: the TCF codec, the HTTP vendor list under
    /// `config.vendor_list_base_url` and the system clock.
    pub fn new(config: &CmpConfig, jar: CookieJarHandle, stub: TcfApiStub) -> Self {
        Self {
            codec: Arc::new(TcfCodec),
            vendor_lists: Arc::new(HttpVendorListSource::new(config.vendor_list_base_url.clone())),
            cookie: ConsentCookie::new(jar, config),
            stub,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ConsentCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_vendor_lists(mut self, source: Arc<dyn VendorListSource>) -> Self {
        self.vendor_lists = source;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Outcome of [`ConsentManager::apply_categories`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentUpdate {
    /// Not ready yet; the selection is remembered and applied once initialization completes.
    Deferred,
    /// The new string was persisted and published.
    Published(String),
}

struct Session {
    model: TcModel,
    vendor_list: Arc<VendorList>,
}

enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready(Session),
}

struct ManagerState {
    lifecycle: Lifecycle,
    /// Last selection made before `Ready`. Newer selections replace older ones.
    pending: Option<Vec<String>>,
    /// Revision of the latest commit.
    revision: u64,
}

impl ManagerState {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// Returns the manager to `Uninitialized` if initialization does not complete,
/// including when the `initialize` future is dropped mid-fetch.
struct InitGuard<'a> {
    state: &'a Mutex<ManagerState>,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(state.lifecycle, Lifecycle::Initializing) {
            state.lifecycle = Lifecycle::Uninitialized;
        }
    }
}

pub struct ConsentManager {
    identity: CmpIdentity,
    services: CmpServices,
    api: Arc<CmpApi>,
    publisher: TcStringPublisher,
    state: Mutex<ManagerState>,
}

impl fmt::Debug for ConsentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentManager")
            .field("identity", &self.identity)
            .field("lifecycle", &self.lifecycle())
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl ConsentManager {
    pub fn new(config: &CmpConfig, services: CmpServices) -> Self {
        Self {
            identity: config.identity(),
            api: Arc::new(CmpApi::new(config.cmp_id, config.cmp_version, config.is_service_specific)),
            services,
            publisher: TcStringPublisher::new(),
            state: Mutex::new(ManagerState {
                lifecycle: Lifecycle::Uninitialized,
                pending: None,
                revision: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the vendor list and restores (or creates) the consent model.
    ///
    /// Calls made while another initialization is running, or after the
    /// manager is ready, return immediately without doing anything. On error
    /// the manager goes back to `Uninitialized` and may be initialized again.
    pub async fn initialize(&self) -> Result<(), CmpError> {
        {
            let mut state = self.state();
            match state.lifecycle {
                Lifecycle::Uninitialized => state.lifecycle = Lifecycle::Initializing,
                Lifecycle::Initializing | Lifecycle::Ready(_) => {
                    log::debug!("consent manager already initializing or ready");
                    return Ok(());
                }
            }
        }
        let _guard = InitGuard { state: &self.state };
        log::debug!("consent manager initializing");

        let vendor_list = match self.services.vendor_lists.fetch().await {
            Ok(list) => Arc::new(list),
            Err(e) => {
                log::error!("consent initialization failed: {e}");
                return Err(e.into());
            }
        };

        let (model, initial) = self.restore(&vendor_list).inspect_err(|e| {
            log::error!("consent initialization failed: {e}");
        })?;

        // No consent yet means the banner is showing.
        let revision = self.state().next_revision();
        self.announce(revision, &initial, Some(model.clone()), initial.is_empty());

        // A selection made before `Ready` is committed together with the
        // transition, so a failure leaves the manager out of `Ready` with the
        // selection still pending.
        let applied = {
            let mut guard = self.state();
            let state = &mut *guard;
            let applied = match state.pending.take() {
                Some(categories) => match self.select(&model, &categories) {
                    Ok((selected, encoded)) => {
                        self.services.cookie.set(&encoded);
                        Some((state.next_revision(), categories, selected, encoded))
                    }
                    Err(e) => {
                        log::error!("consent initialization failed: {e}");
                        state.pending = Some(categories);
                        return Err(e);
                    }
                },
                None => None,
            };
            let model = match &applied {
                Some((_, _, selected, _)) => selected.clone(),
                None => model,
            };
            state.lifecycle = Lifecycle::Ready(Session { model, vendor_list });
            applied
        };
        log::info!("consent manager ready");

        self.services.stub.attach(self.api.clone());

        if let Some((revision, categories, model, encoded)) = applied {
            log::debug!("applied categories selected before initialization: {categories:?}");
            self.announce(revision, &encoded, Some(model), false);
        }
        Ok(())
    }

    /// Builds the session model from the consent cookie, returning it with the
    /// string to announce first (empty when there is no usable consent).
    fn restore(&self, vendor_list: &VendorList) -> Result<(TcModel, String), CmpError> {
        let codec = &self.services.codec;

        let Some(existing) = self.services.cookie.get() else {
            log::debug!("no consent cookie, starting fresh");
            return Ok((self.fresh_model(vendor_list), String::new()));
        };

        let mut model = match codec.decode(&existing) {
            Ok(model) => model,
            Err(e) => {
                log::warn!("discarding unreadable consent cookie: {e}");
                return Ok((self.fresh_model(vendor_list), String::new()));
            }
        };
        model.attach_vendor_list(vendor_list);

        match codec.upgrade_if_needed(model, vendor_list) {
            Upgrade::Unchanged(model) => Ok((model, existing)),
            Upgrade::Upgraded(mut model) => {
                self.stamp_writer(&mut model);
                let upgraded = codec.encode(&model)?;
                log::info!("consent cookie upgraded with disclosed vendors segment");
                self.services.cookie.set(&upgraded);
                Ok((model, upgraded))
            }
        }
    }

    fn fresh_model(&self, vendor_list: &VendorList) -> TcModel {
        self.services
            .codec
            .create_fresh(&self.identity, vendor_list, self.services.clock.now())
    }

    /// A re-encoded string carries the id of the CMP that wrote it.
    fn stamp_writer(&self, model: &mut TcModel) {
        model.cmp_id = self.identity.cmp_id;
        model.cmp_version = self.identity.cmp_version;
    }

    /// Replaces the granted purposes and special features with those of
    /// `categories`. Necessary purposes are always granted; unknown category
    /// names are ignored.
    ///
    /// Before the manager is ready the selection is stored and applied when
    /// initialization completes; a later selection replaces an earlier one.
    pub fn apply_categories<S: AsRef<str>>(&self, categories: &[S]) -> Result<ConsentUpdate, CmpError> {
        let categories: Vec<String> = categories.iter().map(|c| c.as_ref().to_string()).collect();

        let (revision, encoded, model) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let session = match &mut state.lifecycle {
                Lifecycle::Ready(session) => session,
                Lifecycle::Uninitialized | Lifecycle::Initializing => {
                    log::debug!("consent manager not ready, deferring {categories:?}");
                    state.pending = Some(categories);
                    return Ok(ConsentUpdate::Deferred);
                }
            };

            let (model, encoded) = self.select(&session.model, &categories)?;
            session.model = model.clone();
            self.services.cookie.set(&encoded);
            (state.next_revision(), encoded, model)
        };

        log::debug!("consent updated for {categories:?} (r{revision}): {encoded}");
        self.announce(revision, &encoded, Some(model), false);
        Ok(ConsentUpdate::Published(encoded))
    }

    /// Builds and encodes the model granting `categories` on top of `current`.
    fn select<S: AsRef<str>>(&self, current: &TcModel, categories: &[S]) -> Result<(TcModel, String), CmpError> {
        let mut model = current.clone();
        model.unset_all_purpose_consents();
        model.unset_all_special_feature_optins();
        model.purpose_consents.extend(NECESSARY_PURPOSES.iter().copied());
        for category in categories {
            model.purpose_consents.extend(purposes_for(category.as_ref()).iter());
            model.special_feature_optins.extend(special_features_for(category.as_ref()).iter());
        }
        model.touch(self.services.clock.now());
        self.stamp_writer(&mut model);

        let encoded = self.services.codec.encode(&model).inspect_err(|e| {
            log::error!("consent model failed to encode: {e}");
        })?;
        Ok((model, encoded))
    }

    /// Hands a commit to the CMP API and the publisher. Both drop it if a
    /// newer commit got there first.
    fn announce(&self, revision: u64, encoded: &str, model: Option<TcModel>, ui_visible: bool) {
        if let Some(model) = model {
            self.api.update_at(revision, encoded, Some(model), ui_visible);
        }
        self.publisher.publish_at(revision, encoded);
    }

    /// Forgets the user's decision: deletes the cookie, clears every grant
    /// on the model and publishes the empty string. The manager stays ready.
    ///
    /// Callers are expected to reload the page afterwards.
    pub fn reset(&self) {
        let (revision, model) = {
            let mut state = self.state();
            self.services.cookie.delete();
            state.pending = None;
            let model = match &mut state.lifecycle {
                Lifecycle::Ready(session) => {
                    session.model.unset_all_purpose_consents();
                    session.model.unset_all_special_feature_optins();
                    Some(session.model.clone())
                }
                Lifecycle::Uninitialized | Lifecycle::Initializing => None,
            };
            (state.next_revision(), model)
        };

        log::info!("consent reset (r{revision})");
        self.announce(revision, "", model, true);
    }

    /// The latest published TC string, `""` when there is no consent.
    pub fn current_value(&self) -> String {
        self.publisher.current_value()
    }

    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.publisher.subscribe(callback)
    }

    pub fn publisher(&self) -> &TcStringPublisher {
        &self.publisher
    }

    pub fn lifecycle(&self) -> LifecycleState {
        match self.state().lifecycle {
            Lifecycle::Uninitialized => LifecycleState::Uninitialized,
            Lifecycle::Initializing => LifecycleState::Initializing,
            Lifecycle::Ready(_) => LifecycleState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle() == LifecycleState::Ready
    }

    /// Snapshot of the current model, `None` before `Ready`.
    pub fn model(&self) -> Option<TcModel> {
        match &self.state().lifecycle {
            Lifecycle::Ready(session) => Some(session.model.clone()),
            _ => None,
        }
    }

    pub fn vendor_list(&self) -> Option<Arc<VendorList>> {
        match &self.state().lifecycle {
            Lifecycle::Ready(session) => Some(session.vendor_list.clone()),
            _ => None,
        }
    }

    pub fn pending_categories(&self) -> Option<Vec<String>> {
        self.state().pending.clone()
    }

    pub fn api(&self) -> &Arc<CmpApi> {
        &self.api
    }

    pub fn stub(&self) -> &TcfApiStub {
        &self.services.stub
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmp::testing::{FixedClock, JsonCodec, StaticVendorList};
    use crate::cookies::{read_jar, DefaultCookieJar};
    use std::sync::RwLock;
    use time::macros::datetime;

    struct Fixture {
        manager: Arc<ConsentManager>,
        source: Arc<StaticVendorList>,
        jar: CookieJarHandle,
        clock: Arc<FixedClock>,
    }

    fn fixture_with(source: StaticVendorList, jar: CookieJarHandle) -> Fixture {
        let config = CmpConfig::default();
        let source = Arc::new(source);
        let clock = Arc::new(FixedClock::new(datetime!(2026-10-16 09:30 UTC)));
        let services = CmpServices::new(&config, jar.clone(), TcfApiStub::new())
            .with_codec(Arc::new(JsonCodec))
            .with_vendor_lists(source.clone())
            .with_clock(clock.clone());
        Fixture {
            manager: Arc::new(ConsentManager::new(&config, services)),
            source,
            jar,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StaticVendorList::default(), Arc::new(RwLock::new(DefaultCookieJar::new())))
    }

    fn cookie(jar: &CookieJarHandle) -> Option<String> {
        read_jar(jar).value("euconsent-v2")
    }

    fn purposes(model: &TcModel) -> Vec<u16> {
        model.purpose_consents.iter().collect()
    }

    #[tokio::test]
    async fn fresh_start_publishes_empty_string() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.manager.subscribe(move |v| sink.lock().unwrap().push(v.to_string()));

        assert_eq!(f.manager.lifecycle(), LifecycleState::Uninitialized);
        f.manager.initialize().await.unwrap();

        assert!(f.manager.is_ready());
        assert_eq!(*seen.lock().unwrap(), vec![String::new()]);
        assert_eq!(f.manager.current_value(), "");
        assert!(cookie(&f.jar).is_none());
        let model = f.manager.model().unwrap();
        assert!(model.purpose_consents.is_empty());
        assert!(!model.vendors_disclosed.is_empty());
    }

    #[tokio::test]
    async fn apply_always_grants_necessary() {
        let f = fixture();
        f.manager.initialize().await.unwrap();

        let update = f.manager.apply_categories(&["analytics", "unknown"]).unwrap();
        let ConsentUpdate::Published(encoded) = update else {
            panic!("expected a published update");
        };
        assert_eq!(cookie(&f.jar).as_deref(), Some(encoded.as_str()));
        assert_eq!(f.manager.current_value(), encoded);
        assert_eq!(purposes(&f.manager.model().unwrap()), vec![1, 7, 8, 9, 10]);

        f.manager.apply_categories::<&str>(&[]).unwrap();
        let model = f.manager.model().unwrap();
        assert_eq!(purposes(&model), vec![1]);
        assert!(model.special_feature_optins.is_empty());
    }

    #[tokio::test]
    async fn apply_replaces_previous_selection() {
        let f = fixture();
        f.manager.initialize().await.unwrap();
        f.manager.apply_categories(&["marketing"]).unwrap();
        assert_eq!(purposes(&f.manager.model().unwrap()), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(f.manager.model().unwrap().special_feature_optins.len(), 2);

        f.manager.apply_categories(&["analytics"]).unwrap();
        let model = f.manager.model().unwrap();
        assert_eq!(purposes(&model), vec![1, 7, 8, 9, 10]);
        assert!(model.special_feature_optins.is_empty());
    }

    #[tokio::test]
    async fn apply_touches_last_updated_only() {
        let f = fixture();
        f.manager.initialize().await.unwrap();
        let created = f.manager.model().unwrap().created;

        f.clock.advance(time::Duration::days(3));
        f.manager.apply_categories(&["necessary"]).unwrap();
        let model = f.manager.model().unwrap();
        assert_eq!(model.created, created);
        assert_eq!(model.last_updated, datetime!(2026-10-19 00:00 UTC));
    }

    #[tokio::test]
    async fn selection_before_ready_is_deferred_last_write_wins() {
        let f = fixture();
        assert_eq!(f.manager.apply_categories(&["marketing"]).unwrap(), ConsentUpdate::Deferred);
        assert_eq!(f.manager.apply_categories(&["analytics"]).unwrap(), ConsentUpdate::Deferred);
        assert_eq!(f.manager.pending_categories(), Some(vec!["analytics".to_string()]));

        f.manager.initialize().await.unwrap();
        assert_eq!(f.manager.pending_categories(), None);
        assert_eq!(purposes(&f.manager.model().unwrap()), vec![1, 7, 8, 9, 10]);
        assert!(!f.manager.current_value().is_empty());
    }

    #[tokio::test]
    async fn failed_initialization_can_be_retried() {
        let f = fixture_with(
            StaticVendorList::failing(crate::cmp::testing::sample_vendor_list(), 1),
            Arc::new(RwLock::new(DefaultCookieJar::new())),
        );
        f.manager.apply_categories(&["necessary"]).unwrap();

        let err = f.manager.initialize().await.unwrap_err();
        assert!(matches!(err, CmpError::VendorList(_)));
        assert_eq!(f.manager.lifecycle(), LifecycleState::Uninitialized);
        assert_eq!(f.manager.current_value(), "");
        assert!(f.manager.pending_categories().is_some());

        f.manager.initialize().await.unwrap();
        assert!(f.manager.is_ready());
        assert_eq!(f.source.fetch_count(), 2);
        assert_eq!(purposes(&f.manager.model().unwrap()), vec![1]);
    }

    #[tokio::test]
    async fn repeated_initialize_is_a_no_op() {
        let f = fixture();
        f.manager.initialize().await.unwrap();
        f.manager.apply_categories(&["analytics"]).unwrap();
        let before = f.manager.current_value();

        f.manager.initialize().await.unwrap();
        assert_eq!(f.source.fetch_count(), 1);
        assert_eq!(f.manager.current_value(), before);
    }

    #[tokio::test]
    async fn concurrent_initialize_fetches_once() {
        let f = fixture();
        let (a, b) = tokio::join!(f.manager.initialize(), f.manager.initialize());
        a.unwrap();
        b.unwrap();
        assert_eq!(f.source.fetch_count(), 1);
        assert!(f.manager.is_ready());
    }

    #[tokio::test]
    async fn dropped_initialize_leaves_manager_retryable() {
        let f = fixture();
        {
            let fut = f.manager.initialize();
            futures::pin_mut!(fut);
            assert!(futures::poll!(fut.as_mut()).is_pending());
            assert_eq!(f.manager.lifecycle(), LifecycleState::Initializing);
        }
        assert_eq!(f.manager.lifecycle(), LifecycleState::Uninitialized);
        f.manager.initialize().await.unwrap();
        assert!(f.manager.is_ready());
    }

    #[tokio::test]
    async fn unreadable_cookie_is_treated_as_first_visit() {
        let jar: CookieJarHandle = Arc::new(RwLock::new(DefaultCookieJar::new()));
        crate::cookies::write_jar(&jar).set_document_cookie("euconsent-v2=@@not-base64@@");
        let f = fixture_with(StaticVendorList::default(), jar);

        f.manager.initialize().await.unwrap();
        assert_eq!(f.manager.current_value(), "");
        assert!(f.manager.model().unwrap().purpose_consents.is_empty());
    }

    #[tokio::test]
    async fn restored_cookie_is_published_unchanged() {
        let jar: CookieJarHandle = Arc::new(RwLock::new(DefaultCookieJar::new()));
        let first = fixture_with(StaticVendorList::default(), jar.clone());
        first.manager.initialize().await.unwrap();
        let ConsentUpdate::Published(encoded) = first.manager.apply_categories(&["analytics"]).unwrap() else {
            panic!("expected a published update");
        };

        let second = fixture_with(StaticVendorList::default(), jar);
        second.manager.initialize().await.unwrap();
        assert_eq!(second.manager.current_value(), encoded);
        assert_eq!(purposes(&second.manager.model().unwrap()), vec![1, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn reset_clears_cookie_and_grants() {
        let f = fixture();
        f.manager.initialize().await.unwrap();
        f.manager.apply_categories(&["marketing", "analytics"]).unwrap();

        f.manager.reset();
        assert!(f.manager.is_ready());
        assert_eq!(f.manager.current_value(), "");
        assert!(cookie(&f.jar).is_none());
        let model = f.manager.model().unwrap();
        assert!(model.purpose_consents.is_empty());
        assert!(model.special_feature_optins.is_empty());
        assert_eq!(model.cmp_id, 2);
    }

    #[tokio::test]
    async fn reset_before_ready_drops_pending_selection() {
        let f = fixture();
        f.manager.apply_categories(&["marketing"]).unwrap();
        f.manager.reset();
        assert_eq!(f.manager.pending_categories(), None);

        f.manager.initialize().await.unwrap();
        assert_eq!(f.manager.current_value(), "");
    }

    #[tokio::test]
    async fn listener_commit_during_apply_wins_everywhere() {
        let f = fixture();
        f.manager.initialize().await.unwrap();

        let inner = Arc::downgrade(&f.manager);
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = fired.clone();
        let listener: crate::cmp::TcfCallback = Arc::new(move |data: Option<crate::cmp::CmpResponse>, _ok: bool| {
            let user_action = data
                .as_ref()
                .and_then(|d| d.as_tc_data())
                .is_some_and(|d| d.event_status == Some(crate::cmp::EventStatus::UserActionComplete));
            if user_action && !flag.swap(true, std::sync::atomic::Ordering::SeqCst) {
                if let Some(manager) = inner.upgrade() {
                    manager.apply_categories(&["analytics"]).unwrap();
                }
            }
        });
        f.manager.api().handle("addEventListener", 2, listener, None);

        f.manager.apply_categories(&["marketing"]).unwrap();
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));

        let current = f.manager.current_value();
        assert_eq!(cookie(&f.jar).as_deref(), Some(current.as_str()));
        assert_eq!(JsonCodec.encode(&f.manager.model().unwrap()).unwrap(), current);
        assert_eq!(purposes(&f.manager.model().unwrap()), vec![1, 7, 8, 9, 10]);

        let (data, cb) = {
            let data = Arc::new(Mutex::new(Vec::new()));
            let sink = data.clone();
            let cb: crate::cmp::TcfCallback = Arc::new(move |d: Option<crate::cmp::CmpResponse>, _ok: bool| {
                sink.lock().unwrap().push(d);
            });
            (data, cb)
        };
        f.manager.api().handle("getTCData", 2, cb, None);
        let data = data.lock().unwrap();
        assert_eq!(data[0].as_ref().unwrap().as_tc_data().unwrap().tc_string, current);
    }

    #[tokio::test]
    async fn concurrent_applies_leave_cookie_and_value_in_step() {
        let f = fixture();
        f.manager.initialize().await.unwrap();

        let selections: [&[&str]; 4] = [&["marketing"], &["analytics"], &["necessary"], &["analytics", "marketing"]];
        std::thread::scope(|scope| {
            for selection in selections {
                let manager = f.manager.clone();
                scope.spawn(move || {
                    for _ in 0..25 {
                        manager.apply_categories(selection).unwrap();
                    }
                });
            }
        });

        let current = f.manager.current_value();
        assert_eq!(cookie(&f.jar).as_deref(), Some(current.as_str()));
        assert_eq!(JsonCodec.encode(&f.manager.model().unwrap()).unwrap(), current);
    }

    #[tokio::test]
    async fn reset_from_a_subscriber_is_not_overwritten() {
        let f = fixture();
        f.manager.initialize().await.unwrap();

        let inner = Arc::downgrade(&f.manager);
        f.manager.subscribe(move |v| {
            if !v.is_empty() {
                if let Some(manager) = inner.upgrade() {
                    manager.reset();
                }
            }
        });

        f.manager.apply_categories(&["marketing"]).unwrap();
        assert_eq!(f.manager.current_value(), "");
        assert!(cookie(&f.jar).is_none());
    }

    #[tokio::test]
    async fn pending_selection_that_fails_keeps_manager_out_of_ready() {
        let jar: CookieJarHandle = Arc::new(RwLock::new(DefaultCookieJar::new()));
        let config = CmpConfig::default();
        let services = CmpServices::new(&config, jar, TcfApiStub::new())
            .with_codec(Arc::new(RejectingCodec))
            .with_vendor_lists(Arc::new(StaticVendorList::default()))
            .with_clock(Arc::new(FixedClock::new(datetime!(2026-10-16 09:30 UTC))));
        let manager = ConsentManager::new(&config, services);

        manager.apply_categories(&["analytics"]).unwrap();
        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, CmpError::Invariant(_)));
        assert_eq!(manager.lifecycle(), LifecycleState::Uninitialized);
        assert_eq!(manager.pending_categories(), Some(vec!["analytics".to_string()]));

        // Retrying runs initialization again instead of returning early.
        assert!(manager.initialize().await.is_err());
        assert_eq!(manager.lifecycle(), LifecycleState::Uninitialized);
    }

    /// Decodes like [`JsonCodec`] but refuses to encode anything.
    struct RejectingCodec;

    impl ConsentCodec for RejectingCodec {
        fn decode(&self, encoded: &str) -> Result<TcModel, crate::tcf::TcStringError> {
            JsonCodec.decode(encoded)
        }

        fn encode(&self, _model: &TcModel) -> Result<String, crate::tcf::TcStringError> {
            Err(crate::tcf::TcStringError::NoDisclosedVendors)
        }
    }

    #[tokio::test]
    async fn subscribers_may_call_back_into_the_manager() {
        let f = fixture();
        let inner = Arc::downgrade(&f.manager);
        let reads = Arc::new(Mutex::new(Vec::new()));
        let sink = reads.clone();
        f.manager.subscribe(move |v| {
            if let Some(manager) = inner.upgrade() {
                assert_eq!(manager.current_value(), v);
                sink.lock().unwrap().push(manager.lifecycle());
            }
        });

        f.manager.initialize().await.unwrap();
        f.manager.apply_categories(&["necessary"]).unwrap();
        assert_eq!(
            *reads.lock().unwrap(),
            vec![LifecycleState::Initializing, LifecycleState::Ready]
        );
    }
}
