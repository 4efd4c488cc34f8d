use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use wallet_transfer::authorizer::{
    AuthCallError, AuthResponse, Authorizer, DecisionRule, HttpAuthorizer,
};
use wallet_transfer::transfer::DenialCause;
use wallet_transfer::{
    Account, AccountStore, AuthorizationGateway, CircuitState, MemoryAccountStore, OwnerId,
    OwnerKind, ResiliencePolicy, TransferEngine, TransferError, TransferRequest,
};

/// Remote authorizer stand-in with a fixed answer
enum Answer {
    Approve,
    Deny,
    /// Sleeps past any sensible timeout
    Slow,
}

struct FixedAuthorizer {
    answer: Answer,
    calls: AtomicUsize,
}

impl FixedAuthorizer {
    fn new(answer: Answer) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for FixedAuthorizer {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn check(&self, _owner: OwnerId, _amount: Decimal) -> Result<AuthResponse, AuthCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Answer::Approve => Ok(AuthResponse::new(200, Some(json!({"message": "Autorizado"})))),
            Answer::Deny => Ok(AuthResponse::new(403, Some(json!({"message": "Negado"})))),
            Answer::Slow => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(AuthResponse::new(200, Some(json!({"message": "Autorizado"}))))
            }
        }
    }
}

fn fast_policy() -> ResiliencePolicy {
    ResiliencePolicy {
        backoff_base: Duration::from_millis(1),
        attempt_timeout: Duration::from_millis(100),
        ..ResiliencePolicy::default()
    }
}

fn setup(
    authorizer: Arc<dyn Authorizer>,
) -> (
    Arc<TransferEngine>,
    MemoryAccountStore,
    Arc<AuthorizationGateway>,
) {
    let store = MemoryAccountStore::new();
    let gateway = Arc::new(
        AuthorizationGateway::new(authorizer, fast_policy(), DecisionRule::default()).unwrap(),
    );
    let accounts: Arc<dyn AccountStore> = Arc::new(store.clone());
    let engine = Arc::new(TransferEngine::new(accounts, gateway.clone()));
    (engine, store, gateway)
}

fn open(store: &MemoryAccountStore, balance: Decimal) -> Account {
    let account = Account::new(OwnerId::new(), OwnerKind::Personal, balance);
    store.insert(account.clone()).unwrap();
    account
}

/// Scenario 1: 100 → 70, 50 → 80, one record of 30
#[tokio::test]
async fn scenario_approved_transfer_moves_funds() {
    let (engine, store, _) = setup(FixedAuthorizer::new(Answer::Approve));
    let sender = open(&store, dec!(100));
    let receiver = open(&store, dec!(50));

    let record = engine
        .execute(TransferRequest::new(sender.id, receiver.id, dec!(30)))
        .await
        .unwrap();

    assert_eq!(store.account(sender.id).unwrap().balance, dec!(70));
    assert_eq!(store.account(receiver.id).unwrap().balance, dec!(80));
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].amount, dec!(30));
    assert_eq!(records[0], record);
}

/// Scenario 2: no record, no mutation, no lock left behind
#[tokio::test]
async fn scenario_insufficient_balance() {
    let (engine, store, _) = setup(FixedAuthorizer::new(Answer::Approve));
    let sender = open(&store, dec!(10));
    let receiver = open(&store, dec!(0));

    let err = engine
        .execute(TransferRequest::new(sender.id, receiver.id, dec!(30)))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::InsufficientBalance));
    assert!(store.records().is_empty());
    assert_eq!(store.account(sender.id).unwrap().balance, dec!(10));
    assert_eq!(store.account(receiver.id).unwrap().balance, dec!(0));
    assert!(!store.is_locked(sender.id));
    assert!(!store.is_locked(receiver.id));
}

/// Scenario 3: a denial never reaches the lock
#[tokio::test]
async fn scenario_denied_never_locks() {
    let authorizer = FixedAuthorizer::new(Answer::Deny);
    let (engine, store, _) = setup(authorizer.clone());
    let sender = open(&store, dec!(100));
    let receiver = open(&store, dec!(0));

    let err = engine
        .execute(TransferRequest::new(sender.id, receiver.id, dec!(30)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransferError::NotAuthorized {
            cause: DenialCause::Denied
        }
    ));
    assert_eq!(authorizer.calls(), 1);
    assert_eq!(store.lock_requests(), 0);
    assert!(store.records().is_empty());
}

/// Scenario 4: five concurrent 100s against a balance of 100
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_concurrent_spend() {
    let (engine, store, _) = setup(FixedAuthorizer::new(Answer::Approve));
    let sender = open(&store, dec!(100));
    let receiver = open(&store, dec!(0));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let engine = engine.clone();
            let req = TransferRequest::new(sender.id, receiver.id, dec!(100));
            tokio::spawn(async move { engine.execute(req).await })
        })
        .collect();

    let mut ok = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(TransferError::InsufficientBalance) => insufficient += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!((ok, insufficient), (1, 4));
    assert_eq!(store.account(sender.id).unwrap().balance, dec!(0));
    assert_eq!(store.account(receiver.id).unwrap().balance, dec!(100));
}

/// Scenario 5: five timed-out authorizations open the breaker; the sixth
/// is denied without touching the network
#[tokio::test]
async fn scenario_breaker_opens_on_timeouts() {
    let authorizer = FixedAuthorizer::new(Answer::Slow);
    let (engine, store, gateway) = setup(authorizer.clone());
    let sender = open(&store, dec!(100));
    let receiver = open(&store, dec!(0));
    let req = TransferRequest::new(sender.id, receiver.id, dec!(10));

    for _ in 0..5 {
        let err = engine.execute(req).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::NotAuthorized {
                cause: DenialCause::Unavailable
            }
        ));
    }
    assert_eq!(gateway.circuit_state(), CircuitState::Open);
    let before = authorizer.calls();

    assert!(!gateway.authorize(sender.owner_id, dec!(10)).await);
    assert_eq!(authorizer.calls(), before);
    assert_eq!(store.lock_requests(), 0);
}

/// Scenario 1 again, over HTTP against a local authorizer
#[tokio::test]
async fn scenario_approved_over_http() {
    use axum::routing::post;
    use axum::{Json, Router};

    let app = Router::new().route(
        "/authorize",
        post(|| async { Json(json!({"status": "success", "message": "Autorizado"})) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let authorizer =
        HttpAuthorizer::new(format!("http://{addr}/authorize"), Duration::from_secs(1)).unwrap();
    let (engine, store, _) = setup(Arc::new(authorizer));
    let sender = open(&store, dec!(100));
    let receiver = open(&store, dec!(50));

    engine
        .execute(TransferRequest::new(sender.id, receiver.id, dec!(30)))
        .await
        .unwrap();

    assert_eq!(store.account(sender.id).unwrap().balance, dec!(70));
    assert_eq!(store.account(receiver.id).unwrap().balance, dec!(80));
}
