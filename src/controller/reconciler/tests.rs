//! State machine tests against an in-memory store and mocked credential managers.

use super::*;
use crate::config::ControllerConfig;
use crate::constants::FINALIZER;
use crate::credential::{
    Credential, CredentialError, CredentialManager, CredentialManagerFactory,
    MockCredentialManager,
};
use crate::crd::{
    AccessRequest, AccessRequestStatus, Condition, DatabaseAccessRequest,
    DatabaseAccessRequestSpec, Lease, RequestPhase, RoleRef, SecretReference, Subject,
    CONDITION_APPROVED, CONDITION_AVAILABLE, CONDITION_DENIED, CONDITION_FAILED,
};
use crate::store::{mutated_status, request_key, RequestStore, StatusMutation, StoreError};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const LEASE_ID: &str = "database/creds/pg-ro/abc123";
const ROLE_NAME: &str = "databaseaccessrequest-demo-app-db";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    latest: Option<DatabaseAccessRequest>,
    status_writes: usize,
    finalizer_added: bool,
    finalizer_removed: bool,
    deleted_secrets: Vec<String>,
    /// Fail the nth status write (1-based) with a conflict
    fail_status_write: Option<usize>,
    fail_delete_secret: bool,
}

#[derive(Default)]
struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    fn latest(&self) -> DatabaseAccessRequest {
        self.state().latest.clone().expect("no object was written")
    }

    fn latest_status(&self) -> AccessRequestStatus {
        self.latest().status.unwrap_or_default()
    }
}

fn bump_resource_version(request: &mut DatabaseAccessRequest) {
    let next = request
        .metadata
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    request.metadata.resource_version = Some(next.to_string());
}

#[async_trait]
impl RequestStore<DatabaseAccessRequest> for FakeStore {
    async fn add_finalizer(
        &self,
        request: &DatabaseAccessRequest,
    ) -> Result<DatabaseAccessRequest, StoreError> {
        let mut updated = request.clone();
        updated
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(FINALIZER.to_string());
        bump_resource_version(&mut updated);
        let mut state = self.state();
        state.finalizer_added = true;
        state.latest = Some(updated.clone());
        Ok(updated)
    }

    async fn remove_finalizer(
        &self,
        request: &DatabaseAccessRequest,
    ) -> Result<DatabaseAccessRequest, StoreError> {
        let mut updated = request.clone();
        if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != FINALIZER);
        }
        let mut state = self.state();
        state.finalizer_removed = true;
        state.latest = Some(updated.clone());
        Ok(updated)
    }

    async fn update_status(
        &self,
        request: &DatabaseAccessRequest,
        mutate: StatusMutation<'_>,
    ) -> Result<DatabaseAccessRequest, StoreError> {
        let Some(status) = mutated_status(request, mutate) else {
            return Ok(request.clone());
        };
        let mut state = self.state();
        state.status_writes += 1;
        if state.fail_status_write == Some(state.status_writes) {
            return Err(StoreError::Conflict {
                key: request_key(request),
            });
        }
        let mut updated = request.clone();
        *updated.access_status_mut() = status;
        bump_resource_version(&mut updated);
        state.latest = Some(updated.clone());
        Ok(updated)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.fail_delete_secret {
            return Err(StoreError::Conflict {
                key: format!("{namespace}/{name}"),
            });
        }
        state.deleted_secrets.push(name.to_string());
        Ok(())
    }
}

/// Forwards to a shared mock so expectations can span several passes
struct SharedManager(Arc<MockCredentialManager>);

#[async_trait]
impl CredentialManager for SharedManager {
    async fn get_credential(&self) -> Result<Credential, CredentialError> {
        self.0.get_credential().await
    }

    async fn create_secret(
        &self,
        name: &str,
        namespace: &str,
        credential: &Credential,
    ) -> Result<(), CredentialError> {
        self.0.create_secret(name, namespace, credential).await
    }

    async fn create_role(
        &self,
        name: &str,
        namespace: &str,
        secret_name: &str,
    ) -> Result<(), CredentialError> {
        self.0.create_role(name, namespace, secret_name).await
    }

    async fn create_role_binding(
        &self,
        name: &str,
        namespace: &str,
        role_name: &str,
        subjects: &[Subject],
    ) -> Result<(), CredentialError> {
        self.0
            .create_role_binding(name, namespace, role_name, subjects)
            .await
    }

    async fn revoke_lease(&self, lease_id: &str) -> Result<(), CredentialError> {
        self.0.revoke_lease(lease_id).await
    }
}

struct FakeFactory {
    manager: Option<Arc<MockCredentialManager>>,
    calls: AtomicUsize,
}

impl FakeFactory {
    fn with(manager: MockCredentialManager) -> Self {
        Self {
            manager: Some(Arc::new(manager)),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            manager: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialManagerFactory<DatabaseAccessRequest> for FakeFactory {
    async fn manager_for(
        &self,
        request: &DatabaseAccessRequest,
    ) -> Result<Box<dyn CredentialManager>, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.manager {
            Some(manager) => Ok(Box::new(SharedManager(Arc::clone(manager)))),
            None => Err(CredentialError::RoleNotFound {
                namespace: "demo".to_string(),
                name: request.spec.role_ref.name.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn request(conditions: &[(&str, bool)]) -> DatabaseAccessRequest {
    let mut request = DatabaseAccessRequest::new(
        "app-db",
        DatabaseAccessRequestSpec {
            role_ref: RoleRef {
                name: "pg-ro".to_string(),
                namespace: None,
            },
            subjects: vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: "app".to_string(),
                namespace: Some("demo".to_string()),
                api_group: None,
            }],
        },
    );
    request.metadata.namespace = Some("demo".to_string());
    request.metadata.uid = Some("0b4a5c7e-uid".to_string());
    request.metadata.generation = Some(1);
    request.metadata.resource_version = Some("1".to_string());
    request.metadata.finalizers = Some(vec![FINALIZER.to_string()]);

    let mut status = AccessRequestStatus::default();
    for (r#type, value) in conditions {
        status.set_condition(Condition::new(r#type, *value, "Test", "set by test"));
    }
    request.status = Some(status);
    request
}

fn approved() -> DatabaseAccessRequest {
    request(&[(CONDITION_APPROVED, true)])
}

fn mark_deleted(request: &mut DatabaseAccessRequest) {
    let meta: ObjectMeta =
        serde_json::from_value(serde_json::json!({"deletionTimestamp": "2024-01-01T00:00:00Z"}))
            .unwrap();
    request.metadata.deletion_timestamp = meta.deletion_timestamp;
}

fn credential() -> Credential {
    Credential {
        data: BTreeMap::from([
            ("username".to_string(), "v-app-ro".to_string()),
            ("password".to_string(), "s3cr3t".to_string()),
        ]),
        lease_id: LEASE_ID.to_string(),
        lease_duration_seconds: 3600,
        renewable: true,
    }
}

fn backend_error() -> CredentialError {
    CredentialError::Backend(crate::vault::VaultError::Status {
        code: 500,
        message: "internal error".to_string(),
    })
}

fn is_issued_secret_name(name: &str) -> bool {
    name.strip_prefix("app-db-")
        .is_some_and(|suffix| suffix.len() == 6)
}

fn context(
    store: &Arc<FakeStore>,
    factory: &Arc<FakeFactory>,
) -> Arc<Context<DatabaseAccessRequest>> {
    let store: Arc<dyn RequestStore<DatabaseAccessRequest>> = store.clone();
    let factory: Arc<dyn CredentialManagerFactory<DatabaseAccessRequest>> = factory.clone();
    Arc::new(Context::new(store, factory, ControllerConfig::default()))
}

/// Manager expecting one issuance up to the durability point
fn issuing_manager() -> MockCredentialManager {
    let mut manager = MockCredentialManager::new();
    manager
        .expect_get_credential()
        .times(1)
        .returning(|| Ok(credential()));
    manager
        .expect_create_secret()
        .withf(|name, namespace, credential| {
            is_issued_secret_name(name)
                && namespace == "demo"
                && credential.data.get("username").map(String::as_str) == Some("v-app-ro")
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    manager
}

fn failed_reason(status: &AccessRequestStatus) -> Option<String> {
    status
        .condition(CONDITION_FAILED)
        .and_then(|c| c.reason.clone())
}

// ---------------------------------------------------------------------------
// Approval gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_new_request_waits_for_approval_without_backend_calls() {
    let store = Arc::new(FakeStore::default());
    let factory = Arc::new(FakeFactory::with(MockCredentialManager::new()));
    let ctx = context(&store, &factory);

    let action = reconcile(Arc::new(request(&[])), ctx.clone()).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(factory.calls(), 0);
    assert_eq!(
        store.latest_status().phase,
        Some(RequestPhase::WaitingForApproval)
    );

    // Phase already set, the next delivery writes nothing
    reconcile(Arc::new(store.latest()), ctx).await.unwrap();
    assert_eq!(store.state().status_writes, 1);
}

#[tokio::test]
async fn test_finalizer_is_added_before_anything_else() {
    let store = Arc::new(FakeStore::default());
    let factory = Arc::new(FakeFactory::with(MockCredentialManager::new()));
    let ctx = context(&store, &factory);

    let mut fresh = approved();
    fresh.metadata.finalizers = None;
    let action = reconcile(Arc::new(fresh), ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    let state = store.state();
    assert!(state.finalizer_added);
    assert_eq!(state.status_writes, 0);
    assert_eq!(factory.calls(), 0);
}

#[tokio::test]
async fn test_denied_request_never_reaches_backend() {
    let store = Arc::new(FakeStore::default());
    let factory = Arc::new(FakeFactory::with(MockCredentialManager::new()));
    let ctx = context(&store, &factory);

    let denied = request(&[(CONDITION_DENIED, true)]);
    for _ in 0..3 {
        let action = reconcile(Arc::new(denied.clone()), ctx.clone()).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    assert_eq!(factory.calls(), 0);
    assert_eq!(store.state().status_writes, 0);
    assert_ne!(
        denied.status.unwrap_or_default().phase,
        Some(RequestPhase::Available)
    );
}

#[tokio::test]
async fn test_conflicting_disposition_is_ignored() {
    let store = Arc::new(FakeStore::default());
    let factory = Arc::new(FakeFactory::with(MockCredentialManager::new()));
    let ctx = context(&store, &factory);

    let conflicting = request(&[(CONDITION_APPROVED, true), (CONDITION_DENIED, true)]);
    let action = reconcile(Arc::new(conflicting), ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(factory.calls(), 0);
    assert_eq!(store.state().status_writes, 0);
}

// ---------------------------------------------------------------------------
// Issuance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_approved_request_is_issued_and_wired_up() {
    let store = Arc::new(FakeStore::default());
    let mut manager = issuing_manager();
    manager
        .expect_create_role()
        .withf(|name, namespace, secret| {
            name == ROLE_NAME && namespace == "demo" && is_issued_secret_name(secret)
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    manager
        .expect_create_role_binding()
        .withf(|name, namespace, role, subjects| {
            name == ROLE_NAME
                && namespace == "demo"
                && role == ROLE_NAME
                && subjects.len() == 1
                && subjects[0].name == "app"
        })
        .times(1)
        .returning(|_, _, _, _| Ok(()));
    manager.expect_revoke_lease().never();
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let action = reconcile(Arc::new(approved()), ctx.clone()).await.unwrap();
    assert_eq!(action, Action::await_change());

    let status = store.latest_status();
    assert!(status.is_condition_true(CONDITION_AVAILABLE));
    assert!(!status.has_condition(CONDITION_FAILED));
    assert_eq!(status.phase, Some(RequestPhase::Available));
    assert_eq!(status.observed_generation, Some(1));
    let lease = status.lease.clone().unwrap();
    assert_eq!(lease.id, LEASE_ID);
    assert_eq!(lease.duration, "3600s");
    assert!(is_issued_secret_name(&status.secret.clone().unwrap().name));
    assert_eq!(
        status
            .condition(CONDITION_AVAILABLE)
            .and_then(|c| c.reason.as_deref()),
        Some(reason::SUCCESSFULLY_ISSUED_CREDENTIAL)
    );
}

#[tokio::test]
async fn test_redelivery_after_success_does_not_issue_again() {
    let store = Arc::new(FakeStore::default());
    let mut manager = issuing_manager();
    manager
        .expect_create_role()
        .times(1)
        .returning(|_, _, _| Ok(()));
    manager
        .expect_create_role_binding()
        .times(1)
        .returning(|_, _, _, _| Ok(()));
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    reconcile(Arc::new(approved()), ctx.clone()).await.unwrap();
    let writes = store.state().status_writes;

    for _ in 0..3 {
        let action = reconcile(Arc::new(store.latest()), ctx.clone()).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    // times(1) on the mock fails the test on a second issuance
    assert_eq!(store.state().status_writes, writes);
}

#[tokio::test]
async fn test_manager_construction_failure_is_recorded() {
    let store = Arc::new(FakeStore::default());
    let factory = Arc::new(FakeFactory::failing());
    let ctx = context(&store, &factory);

    let action = reconcile(Arc::new(approved()), ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    let status = store.latest_status();
    assert_eq!(
        failed_reason(&status).as_deref(),
        Some(reason::FAILED_TO_CREATE_CREDENTIAL_MANAGER)
    );
    assert_eq!(status.phase, Some(RequestPhase::Failed));
    assert_eq!(status.observed_generation, Some(1));
    assert!(status.lease.is_none());
}

#[tokio::test]
async fn test_get_credential_failure_needs_no_compensation() {
    let store = Arc::new(FakeStore::default());
    let mut manager = MockCredentialManager::new();
    manager
        .expect_get_credential()
        .times(1)
        .returning(|| Err(backend_error()));
    manager.expect_create_secret().never();
    manager.expect_revoke_lease().never();
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let err = reconcile(Arc::new(approved()), ctx).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::GetCredential { .. }));
    let status = store.latest_status();
    assert_eq!(
        failed_reason(&status).as_deref(),
        Some(reason::FAILED_TO_GET_CREDENTIAL)
    );
    assert!(status.lease.is_none() && status.secret.is_none());
    assert!(store.state().deleted_secrets.is_empty());
}

#[tokio::test]
async fn test_create_secret_failure_revokes_lease_once() {
    let store = Arc::new(FakeStore::default());
    let mut manager = MockCredentialManager::new();
    manager
        .expect_get_credential()
        .times(1)
        .returning(|| Ok(credential()));
    manager
        .expect_create_secret()
        .times(1)
        .returning(|_, _, _| Err(backend_error()));
    manager
        .expect_revoke_lease()
        .withf(|lease_id| lease_id == LEASE_ID)
        .times(1)
        .returning(|_| Err(backend_error()));
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let err = reconcile(Arc::new(approved()), ctx).await.unwrap_err();

    // A failed best-effort revoke does not change the outcome
    assert!(matches!(err, ReconcilerError::CreateSecret { .. }));
    let status = store.latest_status();
    assert_eq!(
        failed_reason(&status).as_deref(),
        Some(reason::FAILED_TO_CREATE_SECRET)
    );
    assert!(status.lease.is_none() && status.secret.is_none());
}

#[tokio::test]
async fn test_create_role_failure_compensates() {
    let store = Arc::new(FakeStore::default());
    let mut manager = issuing_manager();
    manager
        .expect_create_role()
        .times(1)
        .returning(|_, _, _| Err(backend_error()));
    manager.expect_create_role_binding().never();
    manager
        .expect_revoke_lease()
        .withf(|lease_id| lease_id == LEASE_ID)
        .times(1)
        .returning(|_| Ok(()));
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let err = reconcile(Arc::new(approved()), ctx).await.unwrap_err();

    match &err {
        ReconcilerError::Compensated { cause, .. } => {
            assert!(matches!(**cause, ReconcilerError::CreateRole { .. }));
        }
        other => panic!("expected Compensated, got {other:?}"),
    }
    let state = store.state();
    assert_eq!(state.deleted_secrets.len(), 1);
    assert!(is_issued_secret_name(&state.deleted_secrets[0]));
    drop(state);

    let status = store.latest_status();
    assert!(status.lease.is_none());
    assert!(status.secret.is_none());
    assert_eq!(
        failed_reason(&status).as_deref(),
        Some(reason::FAILED_TO_CREATE_ROLE)
    );
    assert_eq!(status.phase, Some(RequestPhase::Failed));
}

#[tokio::test]
async fn test_create_role_binding_failure_compensates() {
    let store = Arc::new(FakeStore::default());
    let mut manager = issuing_manager();
    manager
        .expect_create_role()
        .times(1)
        .returning(|_, _, _| Ok(()));
    manager
        .expect_create_role_binding()
        .times(1)
        .returning(|_, _, _, _| Err(backend_error()));
    manager
        .expect_revoke_lease()
        .times(1)
        .returning(|_| Ok(()));
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let err = reconcile(Arc::new(approved()), ctx).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Compensated { .. }));
    let status = store.latest_status();
    assert!(status.lease.is_none() && status.secret.is_none());
    assert_eq!(
        failed_reason(&status).as_deref(),
        Some(reason::FAILED_TO_CREATE_ROLE_BINDING)
    );
}

#[tokio::test]
async fn test_failed_compensation_leaves_lease_and_secret_recorded() {
    let store = Arc::new(FakeStore::default());
    let mut manager = issuing_manager();
    manager
        .expect_create_role()
        .times(1)
        .returning(|_, _, _| Err(backend_error()));
    let revokes = AtomicUsize::new(0);
    manager
        .expect_revoke_lease()
        .withf(|lease_id| lease_id == LEASE_ID)
        .times(2)
        .returning(move |_| {
            if revokes.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(backend_error())
            } else {
                Ok(())
            }
        });
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let err = reconcile(Arc::new(approved()), ctx.clone()).await.unwrap_err();

    match &err {
        ReconcilerError::CompensationFailed { cause, failures, .. } => {
            assert!(matches!(**cause, ReconcilerError::CreateRole { .. }));
            assert!(matches!(**failures, ReconcilerError::Aggregate { ref errors, .. } if errors.len() == 1));
        }
        other => panic!("expected CompensationFailed, got {other:?}"),
    }
    let status = store.latest_status();
    assert_eq!(status.lease.as_ref().map(|l| l.id.as_str()), Some(LEASE_ID));
    assert!(status.secret.is_some());
    assert!(status.has_condition(CONDITION_FAILED));

    // Next delivery picks up the compensation from the recorded status
    let err = reconcile(Arc::new(store.latest()), ctx).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::StaleIssuance { .. }));
    let status = store.latest_status();
    assert!(status.lease.is_none() && status.secret.is_none());
    assert_eq!(store.state().deleted_secrets.len(), 2);
}

#[tokio::test]
async fn test_stale_issuance_is_rolled_back_before_issuing() {
    let store = Arc::new(FakeStore::default());
    let mut manager = MockCredentialManager::new();
    manager.expect_get_credential().never();
    manager
        .expect_revoke_lease()
        .withf(|lease_id| lease_id == "database/creds/pg-ro/old")
        .times(1)
        .returning(|_| Ok(()));
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let mut stale = request(&[(CONDITION_APPROVED, true), (CONDITION_FAILED, true)]);
    let status = stale.access_status_mut();
    status.lease = Some(Lease::new("database/creds/pg-ro/old", 60, false));
    status.secret = Some(SecretReference {
        name: "app-db-old123".to_string(),
    });

    let err = reconcile(Arc::new(stale), ctx).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::StaleIssuance { .. }));
    assert_eq!(store.state().deleted_secrets, vec!["app-db-old123".to_string()]);
    let status = store.latest_status();
    assert!(status.lease.is_none() && status.secret.is_none());
}

#[tokio::test]
async fn test_durability_write_failure_rolls_back_this_pass() {
    let store = Arc::new(FakeStore::default());
    store.state().fail_status_write = Some(1);
    let mut manager = issuing_manager();
    manager.expect_create_role().never();
    manager
        .expect_revoke_lease()
        .withf(|lease_id| lease_id == LEASE_ID)
        .times(1)
        .returning(|_| Ok(()));
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let err = reconcile(Arc::new(approved()), ctx).await.unwrap_err();

    match &err {
        ReconcilerError::Compensated { cause, .. } => assert!(cause.is_conflict()),
        other => panic!("expected Compensated, got {other:?}"),
    }
    let state = store.state();
    assert_eq!(state.deleted_secrets.len(), 1);
    assert!(state.latest.is_none());
}

#[tokio::test]
async fn test_exhausted_key_is_dropped_until_generation_changes() {
    let store = Arc::new(FakeStore::default());
    let factory = Arc::new(FakeFactory::with(MockCredentialManager::new()));
    let ctx = context(&store, &factory);
    let key = "demo/app-db";

    for _ in 0..=ctx.config.max_num_requeues {
        ctx.retries.record_failure(key, 1);
    }

    let action = reconcile(Arc::new(approved()), ctx.clone()).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(factory.calls(), 0);

    // New generation is reconciled again
    let mut edited = request(&[]);
    edited.metadata.generation = Some(2);
    reconcile(Arc::new(edited), ctx).await.unwrap();
    assert_eq!(
        store.latest_status().phase,
        Some(RequestPhase::WaitingForApproval)
    );
}

// ---------------------------------------------------------------------------
// Finalizer protocol
// ---------------------------------------------------------------------------

fn deleted_with_lease() -> DatabaseAccessRequest {
    let mut request = request(&[(CONDITION_APPROVED, true), (CONDITION_AVAILABLE, true)]);
    let status = request.access_status_mut();
    status.lease = Some(Lease::new(LEASE_ID, 3600, true));
    status.secret = Some(SecretReference {
        name: "app-db-abc123".to_string(),
    });
    mark_deleted(&mut request);
    request
}

#[tokio::test]
async fn test_deletion_revokes_lease_then_removes_finalizer() {
    let store = Arc::new(FakeStore::default());
    let mut manager = MockCredentialManager::new();
    manager
        .expect_revoke_lease()
        .withf(|lease_id| lease_id == LEASE_ID)
        .times(1)
        .returning(|_| Ok(()));
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let action = reconcile(Arc::new(deleted_with_lease()), ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(store.state().finalizer_removed);
}

#[tokio::test]
async fn test_exhausted_key_still_finalizes_on_deletion() {
    let store = Arc::new(FakeStore::default());
    let mut manager = MockCredentialManager::new();
    manager
        .expect_revoke_lease()
        .withf(|lease_id| lease_id == LEASE_ID)
        .times(1)
        .returning(|_| Ok(()));
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);
    let key = "demo/app-db";

    for _ in 0..=ctx.config.max_num_requeues {
        ctx.retries.record_failure(key, 1);
    }
    assert!(ctx.retries.exhausted(key, 1));

    let action = reconcile(Arc::new(deleted_with_lease()), ctx.clone())
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(factory.calls(), 1);
    assert!(store.state().finalizer_removed);
    assert_eq!(ctx.retries.attempts(key), 0);
}

#[tokio::test]
async fn test_revoke_failure_keeps_finalizer() {
    let store = Arc::new(FakeStore::default());
    let mut manager = MockCredentialManager::new();
    manager
        .expect_revoke_lease()
        .times(1)
        .returning(|_| Err(backend_error()));
    let factory = Arc::new(FakeFactory::with(manager));
    let ctx = context(&store, &factory);

    let err = reconcile(Arc::new(deleted_with_lease()), ctx).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::RevokeLease { ref lease_id, .. } if lease_id == LEASE_ID));
    assert!(!store.state().finalizer_removed);
}

#[tokio::test]
async fn test_deletion_with_unresolvable_manager_removes_finalizer() {
    let store = Arc::new(FakeStore::default());
    let factory = Arc::new(FakeFactory::failing());
    let ctx = context(&store, &factory);

    reconcile(Arc::new(deleted_with_lease()), ctx).await.unwrap();

    assert_eq!(factory.calls(), 1);
    assert!(store.state().finalizer_removed);
}

#[tokio::test]
async fn test_deletion_without_lease_skips_backend() {
    let store = Arc::new(FakeStore::default());
    let factory = Arc::new(FakeFactory::with(MockCredentialManager::new()));
    let ctx = context(&store, &factory);

    let mut pending = request(&[]);
    mark_deleted(&mut pending);
    reconcile(Arc::new(pending), ctx).await.unwrap();

    assert_eq!(factory.calls(), 0);
    assert!(store.state().finalizer_removed);
}

#[tokio::test]
async fn test_deletion_without_finalizer_is_a_no_op() {
    let store = Arc::new(FakeStore::default());
    let factory = Arc::new(FakeFactory::with(MockCredentialManager::new()));
    let ctx = context(&store, &factory);

    let mut foreign = deleted_with_lease();
    foreign.metadata.finalizers = None;
    reconcile(Arc::new(foreign), ctx).await.unwrap();

    assert_eq!(factory.calls(), 0);
    assert!(!store.state().finalizer_removed);
}
