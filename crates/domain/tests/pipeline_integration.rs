//! End-to-end tests of the application service over the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    AggregateRoot, ApplicationError, ApplicationService, DomainEvent, EventHandler, EventLedger,
    EventMediator, EventMetadata, HandlerError, IntegrationEvent, ProjectableEvent, UnitOfWork,
};
use serde::{Deserialize, Serialize};
use storage::InMemoryStore;
use tokio::sync::Mutex;

// ============================================================================
// Test aggregate
// ============================================================================

#[derive(Debug)]
enum AccountEvent {
    Opened { metadata: EventMetadata, owner: String },
    Deposited { metadata: EventMetadata, amount: u64 },
    Audited { metadata: EventMetadata },
}

impl DomainEvent for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::Opened { .. } => "AccountOpened",
            AccountEvent::Deposited { .. } => "MoneyDeposited",
            AccountEvent::Audited { .. } => "AccountAudited",
        }
    }

    fn metadata(&self) -> &EventMetadata {
        match self {
            AccountEvent::Opened { metadata, .. }
            | AccountEvent::Deposited { metadata, .. }
            | AccountEvent::Audited { metadata } => metadata,
        }
    }

    fn as_projectable(&self) -> Option<&dyn ProjectableEvent> {
        match self {
            AccountEvent::Opened { .. } | AccountEvent::Deposited { .. } => Some(self),
            AccountEvent::Audited { .. } => None,
        }
    }
}

impl ProjectableEvent for AccountEvent {
    fn to_integration_event(&self) -> IntegrationEvent {
        let (name, payload) = match self {
            AccountEvent::Opened { owner, .. } => (
                "AccountOpenedIntegrationEvent",
                serde_json::json!({ "owner": owner }),
            ),
            AccountEvent::Deposited { amount, .. } => (
                "MoneyDepositedIntegrationEvent",
                serde_json::json!({ "amount": amount }),
            ),
            AccountEvent::Audited { .. } => ("AccountAuditedIntegrationEvent", serde_json::Value::Null),
        };
        IntegrationEvent::from_metadata(name, self.metadata(), payload)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountRecord {
    owner: String,
    balance: u64,
}

struct Account {
    id: AggregateId,
    owner: String,
    balance: u64,
    events: EventLedger<AccountEvent>,
}

impl Account {
    fn open(owner: &str) -> Self {
        let mut account = Self {
            id: AggregateId::new(),
            owner: owner.to_string(),
            balance: 0,
            events: EventLedger::new(),
        };
        let event = AccountEvent::Opened {
            metadata: EventMetadata::new(account.id),
            owner: owner.to_string(),
        };
        account.record_event(event);
        account
    }

    fn deposit(&mut self, amount: u64) {
        self.balance += amount;
        let event = AccountEvent::Deposited {
            metadata: EventMetadata::new(self.id),
            amount,
        };
        self.record_event(event);
    }

    fn audit(&self) {
        self.events.record(AccountEvent::Audited {
            metadata: EventMetadata::new(self.id),
        });
    }
}

impl AggregateRoot for Account {
    type Event = AccountEvent;

    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn id(&self) -> AggregateId {
        self.id
    }

    fn ledger(&self) -> &EventLedger<AccountEvent> {
        &self.events
    }
}

// ============================================================================
// Repository and handlers
// ============================================================================

type Uow = UnitOfWork<InMemoryStore, AccountEvent>;

struct AccountRepository {
    store: InMemoryStore,
}

impl AccountRepository {
    async fn save(&self, uow: &Uow, account: &Account) -> Result<(), ApplicationError> {
        let record = AccountRecord {
            owner: account.owner.clone(),
            balance: account.balance,
        };
        uow.transaction()
            .await?
            .put("accounts", account.id(), &record)
            .map_err(|e| ApplicationError::DomainEventHandler(HandlerError::with_source("save failed", e)))?;
        uow.register_aggregate(account);
        Ok(())
    }

    async fn committed(&self, id: AggregateId) -> Option<AccountRecord> {
        self.store.committed("accounts", id).await.unwrap()
    }
}

#[derive(Default)]
struct Journal {
    lines: Mutex<Vec<String>>,
}

impl Journal {
    async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

struct DomainJournal(Arc<Journal>);

#[async_trait]
impl EventHandler<AccountEvent> for DomainJournal {
    async fn handle(&self, event: &AccountEvent) -> Result<(), HandlerError> {
        self.0.lines.lock().await.push(event.event_type().to_string());
        Ok(())
    }
}

struct IntegrationJournal(Arc<Journal>);

#[async_trait]
impl EventHandler<IntegrationEvent> for IntegrationJournal {
    async fn handle(&self, event: &IntegrationEvent) -> Result<(), HandlerError> {
        self.0.lines.lock().await.push(event.event_name.clone());
        Ok(())
    }
}

struct RejectLargeDeposits;

#[async_trait]
impl EventHandler<AccountEvent> for RejectLargeDeposits {
    async fn handle(&self, event: &AccountEvent) -> Result<(), HandlerError> {
        match event {
            AccountEvent::Deposited { amount, .. } if *amount > 1_000 => {
                Err(HandlerError::new("deposit exceeds limit"))
            }
            _ => Ok(()),
        }
    }
}

/// Rejects the first opening it sees and accepts every later one.
#[derive(Default)]
struct HoldFirstOpening {
    seen: Mutex<usize>,
}

#[async_trait]
impl EventHandler<AccountEvent> for HoldFirstOpening {
    async fn handle(&self, _event: &AccountEvent) -> Result<(), HandlerError> {
        let mut seen = self.seen.lock().await;
        *seen += 1;
        if *seen == 1 {
            return Err(HandlerError::new("opening on hold"));
        }
        Ok(())
    }
}

/// Records an audit event on the account whenever it is opened.
struct AuditOnOpen(Arc<Account>);

#[async_trait]
impl EventHandler<AccountEvent> for AuditOnOpen {
    async fn handle(&self, _event: &AccountEvent) -> Result<(), HandlerError> {
        self.0.audit();
        Ok(())
    }
}

struct Fixture {
    store: InMemoryStore,
    journal: Arc<Journal>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: InMemoryStore::new(),
            journal: Arc::new(Journal::default()),
        }
    }

    fn mediator(&self) -> EventMediator<AccountEvent> {
        let mut mediator: EventMediator<AccountEvent> = EventMediator::new();
        mediator.register_integration(
            "AccountOpenedIntegrationEvent",
            Arc::new(IntegrationJournal(Arc::clone(&self.journal))),
        );
        mediator.register_integration(
            "MoneyDepositedIntegrationEvent",
            Arc::new(IntegrationJournal(Arc::clone(&self.journal))),
        );
        mediator
    }

    fn service(&self, mediator: EventMediator<AccountEvent>) -> ApplicationService<InMemoryStore, AccountEvent> {
        ApplicationService::new(self.store.clone(), Arc::new(mediator))
    }

    fn repository(&self) -> Arc<AccountRepository> {
        Arc::new(AccountRepository {
            store: self.store.clone(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_only_registered_kinds_reach_handlers() {
    let fixture = Fixture::new();
    let mut mediator = fixture.mediator();
    mediator.register("AccountOpened", Arc::new(DomainJournal(Arc::clone(&fixture.journal))));
    let service = fixture.service(mediator);
    let accounts = fixture.repository();

    let mut account = Account::open("alice");
    account.deposit(10);
    let id = account.id();

    let returned = service
        .run(|uow| async move {
            accounts.save(&uow, &account).await?;
            Ok::<_, ApplicationError>(account.balance)
        })
        .await
        .unwrap();

    assert_eq!(returned, 10);
    assert_eq!(
        fixture.journal.lines().await,
        vec![
            "AccountOpened",
            "AccountOpenedIntegrationEvent",
            "MoneyDepositedIntegrationEvent",
        ]
    );
    assert_eq!(fixture.store.stats().committed, 1);
    assert_eq!(fixture.store.stats().rolled_back, 0);
    assert_eq!(fixture.repository().committed(id).await.unwrap().balance, 10);
}

#[tokio::test]
async fn test_aggregate_saved_twice_is_published_once() {
    let fixture = Fixture::new();
    let mut mediator = fixture.mediator();
    mediator.register("AccountOpened", Arc::new(DomainJournal(Arc::clone(&fixture.journal))));
    mediator.register("MoneyDeposited", Arc::new(DomainJournal(Arc::clone(&fixture.journal))));
    let service = fixture.service(mediator);
    let accounts = fixture.repository();

    service
        .run(|uow| async move {
            let mut account = Account::open("bob");
            accounts.save(&uow, &account).await?;
            account.deposit(5);
            accounts.save(&uow, &account).await?;
            assert_eq!(uow.touched_aggregates().len(), 1);
            Ok::<_, ApplicationError>(())
        })
        .await
        .unwrap();

    assert_eq!(
        fixture.journal.lines().await,
        vec![
            "AccountOpened",
            "MoneyDeposited",
            "AccountOpenedIntegrationEvent",
            "MoneyDepositedIntegrationEvent",
        ]
    );
}

#[tokio::test]
async fn test_sequential_runs_on_same_aggregate_do_not_redeliver() {
    let fixture = Fixture::new();
    let service = fixture.service(fixture.mediator());
    let accounts = fixture.repository();
    let account = Arc::new(Mutex::new(Account::open("carol")));

    let (repo, acc) = (Arc::clone(&accounts), Arc::clone(&account));
    service
        .run(|uow| async move {
            let account = acc.lock().await;
            repo.save(&uow, &account).await?;
            Ok::<_, ApplicationError>(())
        })
        .await
        .unwrap();

    let (repo, acc) = (Arc::clone(&accounts), Arc::clone(&account));
    service
        .run(|uow| async move {
            let mut account = acc.lock().await;
            account.deposit(20);
            repo.save(&uow, &account).await?;
            Ok::<_, ApplicationError>(())
        })
        .await
        .unwrap();

    assert_eq!(
        fixture.journal.lines().await,
        vec![
            "AccountOpenedIntegrationEvent",
            "MoneyDepositedIntegrationEvent",
        ]
    );
    assert_eq!(account.lock().await.ledger().all_events().len(), 2);
    assert!(account.lock().await.ledger().pending_events().is_empty());
}

#[tokio::test]
async fn test_domain_veto_rolls_back_and_skips_integration() {
    let fixture = Fixture::new();
    let mut mediator = fixture.mediator();
    mediator.register("MoneyDeposited", Arc::new(RejectLargeDeposits));
    let service = fixture.service(mediator);
    let accounts = fixture.repository();

    let mut account = Account::open("dave");
    account.deposit(5_000);
    let id = account.id();

    let result = service
        .run(|uow| async move { accounts.save(&uow, &account).await })
        .await;

    match result {
        Err(ApplicationError::DomainEventHandler(e)) => {
            assert_eq!(e.message(), "deposit exceeds limit");
        }
        other => panic!("expected domain handler failure, got {other:?}"),
    }
    assert!(fixture.journal.lines().await.is_empty());
    assert_eq!(fixture.store.stats().committed, 0);
    assert_eq!(fixture.store.stats().rolled_back, 1);
    assert!(fixture.repository().committed(id).await.is_none());
}

#[tokio::test]
async fn test_retry_after_veto_asks_the_handler_again() {
    let fixture = Fixture::new();
    let hold = Arc::new(HoldFirstOpening::default());
    let mut mediator = fixture.mediator();
    mediator.register("AccountOpened", hold.clone());
    let service = fixture.service(mediator);
    let accounts = fixture.repository();
    let account = Arc::new(Account::open("frank"));
    let id = account.id();

    let acc = Arc::clone(&account);
    let repo = accounts.clone();
    let result = service
        .run(|uow| async move { repo.save(&uow, &acc).await })
        .await;

    assert!(matches!(result, Err(ApplicationError::DomainEventHandler(_))));
    assert_eq!(account.ledger().pending_events().len(), 1);
    assert!(accounts.committed(id).await.is_none());

    let acc = Arc::clone(&account);
    let repo = accounts.clone();
    service
        .run(|uow| async move { repo.save(&uow, &acc).await })
        .await
        .unwrap();

    assert_eq!(*hold.seen.lock().await, 2);
    assert!(account.ledger().pending_events().is_empty());
    assert!(accounts.committed(id).await.is_some());
    assert_eq!(fixture.journal.lines().await, vec!["AccountOpenedIntegrationEvent"]);
}

#[tokio::test]
async fn test_events_recorded_by_handlers_are_dispatched_by_the_next_run() {
    let fixture = Fixture::new();
    let account = Arc::new(Account::open("erin"));
    let mut mediator = fixture.mediator();
    mediator.register("AccountOpened", Arc::new(AuditOnOpen(Arc::clone(&account))));
    mediator.register("AccountAudited", Arc::new(DomainJournal(Arc::clone(&fixture.journal))));
    let service = fixture.service(mediator);
    let accounts = fixture.repository();

    let acc = Arc::clone(&account);
    let repo = accounts.clone();
    service
        .run(|uow| async move { repo.save(&uow, &acc).await })
        .await
        .unwrap();

    assert_eq!(fixture.journal.lines().await, vec!["AccountOpenedIntegrationEvent"]);
    assert_eq!(account.ledger().all_events().len(), 2);
    assert_eq!(account.ledger().pending_events().len(), 1);

    let acc = Arc::clone(&account);
    service
        .run(|uow| async move { accounts.save(&uow, &acc).await })
        .await
        .unwrap();

    assert_eq!(
        fixture.journal.lines().await,
        vec!["AccountOpenedIntegrationEvent", "AccountAudited"]
    );
    assert_eq!(account.ledger().all_events().len(), 2);
    assert!(account.ledger().pending_events().is_empty());
}

#[tokio::test]
async fn test_concurrent_runs_use_independent_transactions() {
    let fixture = Fixture::new();
    let service = fixture.service(fixture.mediator());

    let mut tasks = Vec::new();
    for i in 0..8u64 {
        let service = service.clone();
        let accounts = fixture.repository();
        tasks.push(tokio::spawn(async move {
            service
                .run(|uow| async move {
                    let mut account = Account::open(&format!("owner-{i}"));
                    account.deposit(i);
                    accounts.save(&uow, &account).await
                })
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(fixture.store.committed_count("accounts").await, 8);
    assert_eq!(fixture.store.stats().committed, 8);
    assert_eq!(fixture.store.stats().open, 0);
    assert_eq!(fixture.journal.lines().await.len(), 16);
}
