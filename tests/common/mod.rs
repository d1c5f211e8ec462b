//! Shared fixtures for gateway integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use auditgate::budget::{
    BudgetPolicy, LedgerBook, LedgerStore, ManualClock, MemoryLedgerStore, QuotaGuard,
    UsageLedger, DEFAULT_LEDGER_KEY,
};
use auditgate::{
    AuditGateway, ContextAssembler, ContextPurpose, DomainContext, GatewaySettings,
    ModelTransport, TransportError,
};
use chrono::NaiveDate;

/// A call the scripted transport received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_directive: String,
    pub user_content: String,
    pub model_id: String,
}

/// In-process transport that replays canned replies in order.
///
/// Once the script runs out every call gets `fallback`.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<String, TransportError>>>,
    fallback: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
    recorded: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn replying(reply: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: reply.to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, reply: Result<String, TransportError>) -> Self {
        self.script.lock().unwrap().push_back(reply);
        self
    }

    pub fn failing(err: TransportError) -> Self {
        Self::replying("").then(Err(err))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn invoke(
        &self,
        system_directive: &str,
        user_content: &str,
        model_id: &str,
    ) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recorded.lock().unwrap().push(RecordedCall {
            system_directive: system_directive.to_string(),
            user_content: user_content.to_string(),
            model_id: model_id.to_string(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Ledger, clock and gateway wired for a test.
pub struct Harness {
    pub gateway: AuditGateway,
    pub transport: Arc<ScriptedTransport>,
    pub store: MemoryLedgerStore,
    pub clock: ManualClock,
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn harness(policy: BudgetPolicy, transport: ScriptedTransport) -> Harness {
    harness_with(policy, transport, ContextAssembler::default(), GatewaySettings::default())
}

pub fn harness_with(
    policy: BudgetPolicy,
    transport: ScriptedTransport,
    assembler: ContextAssembler,
    settings: GatewaySettings,
) -> Harness {
    let store = MemoryLedgerStore::new();
    let clock = ManualClock::new(day(2026, 3, 1));
    let book = LedgerBook::new(Arc::new(store.clone()), Arc::new(clock.clone()));
    let transport = Arc::new(transport);
    let gateway = AuditGateway::new(
        transport.clone(),
        QuotaGuard::new(policy, book),
        assembler,
        settings,
    );
    Harness {
        gateway,
        transport,
        store,
        clock,
    }
}

/// Write a ledger directly into the store, bypassing the guard.
pub fn seed_ledger(store: &MemoryLedgerStore, date: NaiveDate, used_units: u64) {
    let bytes = serde_json::to_vec(&UsageLedger { date, used_units }).unwrap();
    store.set(DEFAULT_LEDGER_KEY, &bytes).unwrap();
}

pub fn audit_context() -> DomainContext {
    DomainContext::new(ContextPurpose::DocumentAudit, "Motivation letter")
        .fact("mission", "Summer Mission 2026")
        .fact("checkpoints", vec!["motivation", "language level"])
}
