mod common;

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use common::*;
use hub_gate::auth::{AuthState, IdentityProvider, LocalIdentity, Session, PASSWORD_PROVIDER};
use hub_gate::config::GateOptions;
use hub_gate::error::{Error, StoreError};
use hub_gate::gate::{AuthGate, ErrorCode, GateOutcome, GateState, Redirect};
use hub_gate::migration::{RoleSchema, CURRENT_SCHEMA_VERSION};
use hub_gate::policy::AccessPolicy;
use hub_gate::store::{MemoryStore, ProfilePatch, ProfileStore, UserProfile};
use hub_gate::ui::{ChannelPrompt, NavLink, NAME_REQUIRED_MESSAGE};

fn central_schema() -> RoleSchema {
    RoleSchema::namespaced(
        "role_central",
        "role",
        &["central_admin", "central_user"],
        "central_user",
    )
}

#[tokio::test]
async fn test_no_session_redirects_to_login_without_code() {
    let harness = Harness::new(None);
    let gate = harness.gate(hub_policy(), GateOptions::default());
    let ready = gate.ready();

    let outcome = gate.run().await;

    assert_eq!(outcome.redirect(), Some(Redirect::Login));
    assert_eq!(outcome.state(), GateState::Unauthenticated);
    assert_eq!(
        harness.surface.redirects(),
        vec![PageEvent::Redirect {
            location: "login.html".to_string(),
            session_active: false
        }]
    );
    assert!(!harness.surface.revealed());
    assert!(ready.get().is_none());
    assert!(ready.wait().await.is_none());
    assert_eq!(harness.store.read_count(), 0);
    assert_eq!(harness.identity.sign_out_count(), 0);
}

#[tokio::test]
async fn test_gate_waits_for_the_provider_to_resolve() {
    let identity = Arc::new(LocalIdentity::new());
    let store = Arc::new(MemoryStore::new());
    let surface = Arc::new(RecordingSurface::watching(identity.clone()));
    let (prompt, _names) = ChannelPrompt::channel();
    let gate = AuthGate::new(
        identity.clone(),
        store,
        hub_policy(),
        surface.clone(),
        Arc::new(prompt),
        GateOptions::default(),
    );

    let run = tokio::spawn(gate.run());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(surface.events(), vec![PageEvent::Hidden]);

    identity.set_session(Some(staff()));
    let outcome = run.await.unwrap();

    assert!(outcome.context().is_some());
    assert!(surface.revealed());
}

#[tokio::test]
async fn test_domain_user_is_provisioned_and_page_unblocked() {
    let harness = Harness::new(Some(staff()));
    let gate = harness.gate(hub_policy(), GateOptions::default());
    let ready = gate.ready();

    let outcome = gate.run().await;

    assert_eq!(outcome.state(), GateState::Ready);
    let context = outcome.context().expect("page unblocked").clone();
    assert_eq!(context.session.uid, "uid-jane");
    assert_eq!(context.role(), Some("viewer"));

    let stored = harness.store.profile("uid-jane").unwrap();
    assert_eq!(stored.field_str("role"), Some("viewer"));
    assert_eq!(stored.display_name, "Jane Q Public");
    assert_eq!(stored.schema_version, CURRENT_SCHEMA_VERSION);
    assert!(stored.created_at.is_some());
    assert_eq!(harness.store.create_count(), 1);
    assert!(harness.store.updates().is_empty());

    assert_eq!(
        harness.surface.events(),
        vec![
            PageEvent::Hidden,
            PageEvent::UserName("Jane".to_string()),
            PageEvent::Initials("JQ".to_string()),
            PageEvent::SignOutBound,
            PageEvent::Revealed,
        ]
    );

    let fired = ready.wait().await.unwrap();
    assert!(Arc::ptr_eq(&fired, &context));
    assert_eq!(harness.identity.sign_out_count(), 0);
}

#[tokio::test]
async fn test_password_sign_in_outside_domain_is_authorized() {
    let harness = Harness::new(Some(contractor()));
    let outcome = harness.gate(hub_policy(), GateOptions::default()).run().await;

    assert!(outcome.context().is_some());
    assert_eq!(harness.identity.sign_out_count(), 0);
}

#[tokio::test]
async fn test_outsider_is_signed_out_before_redirect() {
    let harness = Harness::new(Some(outsider()));
    let gate = harness.gate(hub_policy(), GateOptions::default());
    let ready = gate.ready();

    let outcome = gate.run().await;

    assert_eq!(outcome.redirect(), Some(Redirect::LoginWithError(ErrorCode::Domain)));
    assert_eq!(outcome.state(), GateState::Denied);
    assert_eq!(
        harness.surface.redirects(),
        vec![PageEvent::Redirect {
            location: "login.html?error=domain".to_string(),
            session_active: false
        }]
    );
    assert_eq!(harness.identity.sign_out_count(), 1);
    assert!(!harness.surface.revealed());
    assert!(ready.wait().await.is_none());
}

#[tokio::test]
async fn test_allowlisted_outsider_is_authorized() {
    let harness = Harness::new(Some(outsider()));
    harness.store.allow_email("someone@gmail.com");

    let outcome = harness.gate(hub_policy(), GateOptions::default()).run().await;

    assert!(outcome.context().is_some());
}

#[tokio::test]
async fn test_allowlist_failure_denies() {
    let harness = Harness::new(Some(outsider()));
    harness.store.allow_email("someone@gmail.com");
    harness.store.fail_allowlist(true);

    let outcome = harness.gate(hub_policy(), GateOptions::default()).run().await;

    assert_eq!(outcome.redirect(), Some(Redirect::LoginWithError(ErrorCode::Domain)));
    assert_eq!(harness.identity.sign_out_count(), 1);
}

#[tokio::test]
async fn test_role_outside_allow_list_is_denied_with_access_code() {
    let store = Arc::new(MemoryStore::new());
    let mut profile = UserProfile::for_session(&contractor(), CURRENT_SCHEMA_VERSION);
    profile.set_field("role_central", json!("central_user"));
    store.insert(profile);

    let harness = Harness::with_store(Some(contractor()), store);
    let policy = AccessPolicy::new()
        .with_provider(PASSWORD_PROVIDER)
        .with_role("central_admin");
    let options = GateOptions::default().with_role_schema(central_schema());

    let outcome = harness.gate(policy, options).run().await;

    assert_eq!(outcome.redirect(), Some(Redirect::LoginWithError(ErrorCode::Access)));
    assert_eq!(
        harness.surface.redirects(),
        vec![PageEvent::Redirect {
            location: "login.html?error=access".to_string(),
            session_active: false
        }]
    );
}

#[tokio::test]
async fn test_profile_read_failure_signs_out_with_profile_code() {
    let harness = Harness::new(Some(staff()));
    harness.store.fail_reads(true);

    let outcome = harness.gate(hub_policy(), GateOptions::default()).run().await;

    assert_eq!(outcome.redirect(), Some(Redirect::LoginWithError(ErrorCode::Profile)));
    assert_eq!(outcome.state(), GateState::ProfileError);
    assert_eq!(harness.identity.sign_out_count(), 1);
    assert_eq!(harness.store.create_count(), 0);
}

#[tokio::test]
async fn test_profile_create_failure_signs_out_with_profile_code() {
    let harness = Harness::new(Some(staff()));
    harness.store.fail_writes(true);

    let outcome = harness.gate(hub_policy(), GateOptions::default()).run().await;

    assert_eq!(outcome.redirect(), Some(Redirect::LoginWithError(ErrorCode::Profile)));
    assert_eq!(harness.identity.sign_out_count(), 1);
}

struct HangingStore;

#[async_trait]
impl ProfileStore for HangingStore {
    async fn get_profile(&self, _uid: &str) -> Result<Option<UserProfile>, StoreError> {
        std::future::pending().await
    }

    async fn create_profile(&self, _profile: &UserProfile) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn update_profile(&self, _uid: &str, _patch: &ProfilePatch) -> Result<(), StoreError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_hung_store_is_bounded_by_timeout() {
    let identity = Arc::new(LocalIdentity::signed_in(staff()));
    let surface = Arc::new(RecordingSurface::watching(identity.clone()));
    let (prompt, _names) = ChannelPrompt::channel();
    let options = GateOptions::default().with_request_timeout(Some(Duration::from_millis(30)));

    let outcome = AuthGate::new(
        identity.clone(),
        Arc::new(HangingStore),
        hub_policy(),
        surface.clone(),
        Arc::new(prompt),
        options,
    )
    .run()
    .await;

    assert_eq!(outcome.redirect(), Some(Redirect::LoginWithError(ErrorCode::Profile)));
    assert_eq!(identity.sign_out_count(), 1);
}

#[tokio::test]
async fn test_profile_is_created_once_across_reruns() {
    let store = Arc::new(MemoryStore::new());

    for _ in 0..3 {
        let harness = Harness::with_store(Some(staff()), store.clone());
        let outcome = harness.gate(hub_policy(), GateOptions::default()).run().await;
        assert!(outcome.context().is_some());
    }

    assert_eq!(store.create_count(), 1);
    assert_eq!(store.read_count(), 3);
}

/// Reports the profile as missing once, as if another tab created it between
/// the read and the create
struct RacingStore {
    inner: MemoryStore,
    hidden_once: AtomicBool,
}

#[async_trait]
impl ProfileStore for RacingStore {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        if !self.hidden_once.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get_profile(uid).await
    }

    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.inner.create_profile(profile).await
    }

    async fn update_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        self.inner.update_profile(uid, patch).await
    }
}

#[tokio::test]
async fn test_conflicting_create_reads_the_winner_back() {
    let inner = MemoryStore::new();
    let mut existing = UserProfile::for_session(&staff(), CURRENT_SCHEMA_VERSION);
    existing.set_field("role", json!("editor"));
    inner.insert(existing);
    let store = Arc::new(RacingStore {
        inner,
        hidden_once: AtomicBool::new(false),
    });

    let identity = Arc::new(LocalIdentity::signed_in(staff()));
    let surface = Arc::new(RecordingSurface::watching(identity.clone()));
    let (prompt, _names) = ChannelPrompt::channel();
    let outcome = AuthGate::new(
        identity,
        store.clone(),
        hub_policy(),
        surface,
        Arc::new(prompt),
        GateOptions::default(),
    )
    .run()
    .await;

    let context = outcome.context().expect("page unblocked");
    assert_eq!(context.role(), Some("editor"));
    assert_eq!(store.inner.create_count(), 0);
}

#[tokio::test]
async fn test_legacy_role_is_migrated_once() {
    let store = Arc::new(MemoryStore::new());
    let mut legacy = UserProfile::for_session(&staff(), 0);
    legacy.set_field("role", json!("central_admin"));
    store.insert(legacy);

    let options = GateOptions::default().with_role_schema(central_schema());

    let harness = Harness::with_store(Some(staff()), store.clone());
    let outcome = harness.gate(hub_policy(), options.clone()).run().await;

    let context = outcome.context().expect("page unblocked");
    assert_eq!(context.role(), Some("central_admin"));
    assert_eq!(context.profile.field_str("role"), Some("central_admin"));
    assert_eq!(context.profile.field_str("role_central"), Some("central_admin"));

    let stored = store.profile("uid-jane").unwrap();
    assert_eq!(stored.field_str("role_central"), Some("central_admin"));
    assert_eq!(stored.schema_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(store.updates().len(), 1);

    let harness = Harness::with_store(Some(staff()), store.clone());
    harness.gate(hub_policy(), options).run().await;
    assert_eq!(store.updates().len(), 1);
}

#[tokio::test]
async fn test_namespaced_role_is_not_rewritten_from_stale_legacy_field() {
    let store = Arc::new(MemoryStore::new());
    let mut profile = UserProfile::for_session(&staff(), 0);
    profile.set_field("role", json!("central_admin"));
    profile.set_field("role_central", json!("central_user"));
    store.insert(profile);

    let harness = Harness::with_store(Some(staff()), store.clone());
    let outcome = harness
        .gate(hub_policy(), GateOptions::default().with_role_schema(central_schema()))
        .run()
        .await;

    let context = outcome.context().expect("page unblocked");
    assert_eq!(context.role(), Some("central_user"));
    // Page code reading the old name sees the authoritative role.
    assert_eq!(context.profile.field_str("role"), Some("central_user"));

    let stored = store.profile("uid-jane").unwrap();
    assert_eq!(stored.field_str("role_central"), Some("central_user"));
    assert_eq!(stored.field_str("role"), Some("central_admin"));
}

#[tokio::test]
async fn test_missing_name_is_collected_and_persisted() {
    let session = Session::new("uid-new", "new.staff@eduversal.org").with_provider("google.com");
    let harness = Harness::new(Some(session));
    harness.names.send("".to_string()).unwrap();
    harness.names.send("  Ann Lee ".to_string()).unwrap();

    let outcome = harness.gate(hub_policy(), GateOptions::default()).run().await;

    let context = outcome.context().expect("page unblocked");
    assert_eq!(context.profile.display_name, "Ann Lee");
    assert_eq!(harness.store.profile("uid-new").unwrap().display_name, "Ann Lee");
    assert_eq!(harness.prompt.validation_messages(), vec![NAME_REQUIRED_MESSAGE]);
    assert_eq!(harness.prompt.open_count(), 1);
    assert!(!harness.prompt.is_open());

    let events = harness.surface.events();
    assert!(events.contains(&PageEvent::UserName("Ann".to_string())));
    assert!(events.contains(&PageEvent::Initials("AL".to_string())));
}

#[tokio::test]
async fn test_empty_name_blocks_the_gate() {
    let session = Session::new("uid-new", "z@eduversal.org").with_provider("google.com");
    let harness = Harness::new(Some(session));
    harness.names.send("   ".to_string()).unwrap();

    let gate = harness.gate(hub_policy(), GateOptions::default().with_hide_until_ready(false));
    let ready = gate.ready();
    let pending = tokio::time::timeout(Duration::from_millis(50), gate.run()).await;

    assert!(pending.is_err());
    assert!(ready.get().is_none());
    assert!(harness.prompt.is_open());
    assert_eq!(harness.prompt.validation_messages(), vec![NAME_REQUIRED_MESSAGE]);
    // The overlay hides the page even when the gate itself does not.
    assert_eq!(harness.surface.events(), vec![PageEvent::Hidden]);
}

#[tokio::test]
async fn test_single_word_name_gives_one_initial() {
    let store = Arc::new(MemoryStore::new());
    let session = Session::new("uid-z", "z@x.com").with_provider(PASSWORD_PROVIDER);
    let mut profile = UserProfile::for_session(&session, CURRENT_SCHEMA_VERSION);
    profile.display_name = "Zed".to_string();
    store.insert(profile);

    let harness = Harness::with_store(Some(session), store);
    harness.gate(hub_policy(), GateOptions::default()).run().await;

    let events = harness.surface.events();
    assert!(events.contains(&PageEvent::Initials("Z".to_string())));
    assert!(events.contains(&PageEvent::UserName("Zed".to_string())));
}

#[tokio::test]
async fn test_role_gated_link_is_appended_for_matching_role() {
    let options = GateOptions::default()
        .with_nav_link(NavLink::new("Admin", "admin.html").for_role("central_admin"))
        .with_nav_link(NavLink::new("Reports", "reports.html").for_role("central_user"))
        .with_role_schema(central_schema());

    let store = Arc::new(MemoryStore::new());
    let mut profile = UserProfile::for_session(&staff(), CURRENT_SCHEMA_VERSION);
    profile.set_field("role_central", json!("central_admin"));
    store.insert(profile);

    let harness = Harness::with_store(Some(staff()), store);
    harness.gate(hub_policy(), options).run().await;

    let events = harness.surface.events();
    assert!(events.contains(&PageEvent::Link("admin.html".to_string())));
    assert!(!events.contains(&PageEvent::Link("reports.html".to_string())));
}

#[tokio::test]
async fn test_sign_out_control_clears_session_and_redirects() {
    let harness = Harness::new(Some(staff()));
    harness
        .gate(hub_policy(), GateOptions::default().with_login_page("/login"))
        .run()
        .await;

    let control = harness.surface.sign_out_control().expect("control bound");
    control.trigger().await.unwrap();

    assert_eq!(harness.identity.sign_out_count(), 1);
    assert_eq!(
        harness.surface.redirects(),
        vec![PageEvent::Redirect {
            location: "/login".to_string(),
            session_active: false
        }]
    );
}

#[tokio::test]
async fn test_expired_session_is_treated_as_signed_out() {
    let mut session = staff();
    session.expires_at = Some(chrono::Utc::now().timestamp() - 60);
    let harness = Harness::new(Some(session));

    let outcome = harness.gate(hub_policy(), GateOptions::default()).run().await;

    assert!(matches!(outcome, GateOutcome::Redirected(Redirect::Login)));
    assert_eq!(harness.store.read_count(), 0);
}

#[tokio::test]
async fn test_shared_schema_profile_is_not_written() {
    let store = Arc::new(MemoryStore::new());
    let mut existing = UserProfile::for_session(&staff(), 0);
    existing.set_field("role", json!("viewer"));
    store.insert(existing);
    store.fail_writes(true);

    let harness = Harness::with_store(Some(staff()), store.clone());
    let outcome = harness.gate(hub_policy(), GateOptions::default()).run().await;

    let context = outcome.context().expect("page unblocked");
    assert_eq!(context.role(), Some("viewer"));
    assert!(store.updates().is_empty());
    assert_eq!(store.profile("uid-jane").unwrap().schema_version, 0);
}

/// Identity provider whose remote sign-out never answers
struct StuckSignOut {
    inner: Arc<LocalIdentity>,
}

#[async_trait]
impl IdentityProvider for StuckSignOut {
    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.subscribe()
    }

    async fn sign_out(&self) -> Result<(), Error> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_hung_sign_out_still_redirects() {
    let local = Arc::new(LocalIdentity::signed_in(outsider()));
    let store = Arc::new(MemoryStore::new());
    let surface = Arc::new(RecordingSurface::watching(local.clone()));
    let (prompt, _names) = ChannelPrompt::channel();
    let options = GateOptions::default().with_request_timeout(Some(Duration::from_millis(30)));

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        AuthGate::new(
            Arc::new(StuckSignOut { inner: local }),
            store.clone(),
            hub_policy(),
            surface.clone(),
            Arc::new(prompt),
            options,
        )
        .with_allowlist(store)
        .run(),
    )
    .await
    .expect("gate finished");

    assert_eq!(outcome.redirect(), Some(Redirect::LoginWithError(ErrorCode::Domain)));
    let locations: Vec<PageEvent> = surface.redirects();
    assert!(matches!(
        locations.as_slice(),
        [PageEvent::Redirect { location, .. }] if location == "login.html?error=domain"
    ));
    assert!(!surface.revealed());
}
