//! The single entry point for AI-assisted features.
//!
//! [`AuditGateway`] is the only code path that invokes the model transport and
//! the only one that spends budget. One dispatch runs:
//!
//! 1. content size check and cost estimate
//! 2. budget reservation ([`QuotaGuard::reserve`])
//! 3. instruction assembly
//! 4. the transport call, bounded by a timeout and a cancellation token
//! 5. response parsing and validation
//! 6. the ledger commit
//!
//! Transport failures, timeouts and cancellations release the reservation
//! without charging. Once the model has answered, the commit always runs,
//! including when the answer fails the response contract.

mod options;
mod stage;

pub use options::{
    DispatchOptions, GatewaySettings, DEFAULT_EXPECTED_MAX_OUTPUT_CHARS, DEFAULT_MODEL_ID,
    DEFAULT_TIMEOUT,
};
pub use stage::DispatchStage;

use std::sync::Arc;

use stage::DispatchTrace;

use crate::budget::{ChargePolicy, LedgerResult, QuotaGuard, QuotaStatus, UnitCount, UnitEstimator};
use crate::config::PipelineConfig;
use crate::context::{ContextAssembler, DomainContext, Instruction};
use crate::contract::{parse_response, AuditResult, ResponseShape};
use crate::error::PipelineError;
use crate::journal::{generate_dispatch_id, DispatchOutcome, DispatchRecord, JournalStore};
use crate::transport::{HttpTransport, HttpTransportConfig, ModelTransport, TransportError};

/// Quota-governed gateway to the model.
///
/// Cheap to clone; clones share the transport, ledger and journal.
#[derive(Clone)]
pub struct AuditGateway {
    transport: Arc<dyn ModelTransport>,
    guard: QuotaGuard,
    assembler: ContextAssembler,
    estimator: UnitEstimator,
    settings: GatewaySettings,
    journal: Option<JournalStore>,
}

impl std::fmt::Debug for AuditGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditGateway")
            .field("guard", &self.guard)
            .field("assembler", &self.assembler)
            .field("settings", &self.settings)
            .field("journal", &self.journal)
            .finish_non_exhaustive()
    }
}

impl AuditGateway {
    /// Assemble a gateway from already-constructed parts.
    pub fn new(
        transport: Arc<dyn ModelTransport>,
        guard: QuotaGuard,
        assembler: ContextAssembler,
        settings: GatewaySettings,
    ) -> Self {
        let estimator = UnitEstimator::from_policy(guard.policy());
        Self {
            transport,
            guard,
            assembler,
            estimator,
            settings,
            journal: None,
        }
    }

    /// Build the process-wide gateway from configuration.
    ///
    /// This is where the HTTP transport client is created; nothing else in
    /// the crate constructs one.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let api_key = config.transport.api_key().unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(
                env = %config.transport.api_key_env,
                "no API key configured, sending unauthenticated requests"
            );
        }
        let transport = HttpTransport::new(HttpTransportConfig {
            endpoint: config.transport.endpoint.clone(),
            api_key,
        });

        let guard = config.quota_guard()?;

        let mut gateway = Self::new(
            Arc::new(transport),
            guard,
            ContextAssembler::new(config.content.max_content_chars),
            config.gateway_settings(),
        );

        if config.journal.enabled {
            match JournalStore::new(config.journal_dir(), &config.journal) {
                Ok(journal) => gateway = gateway.with_journal(journal),
                Err(err) => tracing::warn!(
                    error = %err,
                    "dispatch journal unavailable, continuing without it"
                ),
            }
        }

        Ok(gateway)
    }

    /// Record every terminal dispatch in `journal`.
    pub fn with_journal(mut self, journal: JournalStore) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn guard(&self) -> &QuotaGuard {
        &self.guard
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn journal(&self) -> Option<&JournalStore> {
        self.journal.as_ref()
    }

    /// Today's budget usage.
    pub fn status(&self) -> LedgerResult<QuotaStatus> {
        self.guard.status()
    }

    /// Units a dispatch of `content` would be estimated at.
    pub fn estimate(&self, content: &str) -> u64 {
        self.estimator
            .estimate_call(content, self.settings.expected_max_output_chars)
    }

    /// The instruction a dispatch would send, without reserving budget or
    /// calling the model.
    pub fn preview(
        &self,
        content: &str,
        context: &DomainContext,
        shape: &ResponseShape,
    ) -> Result<Instruction, PipelineError> {
        self.assembler.build(content, context, shape)
    }

    /// Send `content` to the model under `context`, expecting `shape`.
    pub async fn dispatch(
        &self,
        content: &str,
        context: &DomainContext,
        shape: &ResponseShape,
        options: DispatchOptions,
    ) -> Result<AuditResult, PipelineError> {
        let mut trace = DispatchTrace::start(generate_dispatch_id());
        let result = self
            .run(content, context, shape, &options, &mut trace)
            .await;

        match &result {
            Ok(audit) => tracing::info!(
                dispatch_id = %trace.dispatch_id,
                shape = shape.name(),
                charged = audit.estimated_cost,
                "dispatch completed"
            ),
            Err(err) => tracing::info!(
                dispatch_id = %trace.dispatch_id,
                shape = shape.name(),
                error = err.label(),
                charged = err.charged_units(),
                "dispatch ended without a result"
            ),
        }

        self.record(&trace, context, shape, &result);
        result
    }

    async fn run(
        &self,
        content: &str,
        context: &DomainContext,
        shape: &ResponseShape,
        options: &DispatchOptions,
        trace: &mut DispatchTrace,
    ) -> Result<AuditResult, PipelineError> {
        trace.advance(DispatchStage::Admitting);
        if options.cancellation.is_cancelled() {
            trace.advance(DispatchStage::Failed);
            return Err(PipelineError::Cancelled);
        }
        if let Err(err) = self.assembler.check_content(content) {
            trace.advance(DispatchStage::Rejected);
            return Err(err);
        }

        let estimate = self.estimate(content);
        trace.estimated_units = estimate;
        let reservation = match self.guard.reserve(estimate) {
            Ok(reservation) => reservation,
            Err(err) => {
                let stage = match err {
                    PipelineError::QuotaExceeded(_) => DispatchStage::Rejected,
                    _ => DispatchStage::Failed,
                };
                trace.advance(stage);
                return Err(err);
            }
        };

        trace.advance(DispatchStage::Assembling);
        let instruction = match self.assembler.build(content, context, shape) {
            Ok(instruction) => instruction,
            Err(err) => {
                reservation.release();
                trace.advance(DispatchStage::Failed);
                return Err(err);
            }
        };

        trace.advance(DispatchStage::Dispatching);
        let timeout = options.effective_timeout(&self.settings);
        let call = self.transport.invoke(
            &instruction.system_directive,
            &instruction.user_content,
            &self.settings.model_id,
        );

        // Cancellation is only honored while the call is in flight; once the
        // model has answered the commit below always runs.
        let outcome = tokio::select! {
            biased;
            _ = options.cancellation.cancelled() => None,
            outcome = tokio::time::timeout(timeout, call) => Some(outcome),
        };

        let raw = match outcome {
            None => {
                reservation.release();
                trace.advance(DispatchStage::Failed);
                tracing::info!(dispatch_id = %trace.dispatch_id, "dispatch cancelled by caller");
                return Err(PipelineError::Cancelled);
            }
            Some(Err(_elapsed)) => {
                reservation.release();
                trace.advance(DispatchStage::Failed);
                tracing::warn!(
                    dispatch_id = %trace.dispatch_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "model call timed out"
                );
                return Err(PipelineError::Upstream(TransportError::timeout(format!(
                    "no response within {} ms",
                    timeout.as_millis()
                ))));
            }
            Some(Ok(Err(err))) => {
                reservation.release();
                trace.advance(DispatchStage::Failed);
                tracing::warn!(
                    dispatch_id = %trace.dispatch_id,
                    kind = %err.kind,
                    error = %err.message,
                    "model call failed"
                );
                return Err(PipelineError::Upstream(err));
            }
            Some(Ok(Ok(raw))) => raw,
        };

        trace.advance(DispatchStage::Validating);
        let units = self
            .estimator
            .actual_call(instruction.input_chars(), raw.chars().count());
        let parsed = parse_response(&raw, shape);
        let charge = match &parsed {
            Ok(_) => units.total(),
            Err(_) => charged_for_unusable(self.guard.policy().charge_policy, units),
        };

        trace.advance(DispatchStage::Committing);
        if let Err(err) = reservation.commit(charge) {
            trace.advance(DispatchStage::Failed);
            return Err(PipelineError::Ledger(err));
        }
        trace.charged_units = charge;

        match parsed {
            Ok(result) => {
                trace.advance(DispatchStage::Done);
                Ok(result.with_cost(charge))
            }
            Err(source) => {
                trace.advance(DispatchStage::Failed);
                tracing::warn!(
                    dispatch_id = %trace.dispatch_id,
                    shape = shape.name(),
                    error = %source,
                    "model response failed the response contract"
                );
                Err(PipelineError::Contract {
                    source,
                    charged_units: charge,
                })
            }
        }
    }

    fn record(
        &self,
        trace: &DispatchTrace,
        context: &DomainContext,
        shape: &ResponseShape,
        result: &Result<AuditResult, PipelineError>,
    ) {
        let Some(journal) = &self.journal else {
            return;
        };

        let outcome = match result {
            Ok(_) => DispatchOutcome::Done,
            Err(PipelineError::Cancelled) => DispatchOutcome::Cancelled,
            Err(_) if trace.stage == DispatchStage::Rejected => DispatchOutcome::Rejected,
            Err(_) => DispatchOutcome::Failed,
        };

        let mut record = DispatchRecord::new(
            trace.dispatch_id.clone(),
            context.subject_label.clone(),
            shape.name(),
            outcome,
        );
        record.error_label = result.as_ref().err().map(|err| err.label().to_string());
        record.estimated_units = trace.estimated_units;
        record.charged_units = trace.charged_units;
        record.duration_ms = trace.elapsed_ms();

        if let Err(err) = journal.append(&record) {
            tracing::warn!(
                dispatch_id = %trace.dispatch_id,
                error = %err,
                "failed to write dispatch journal"
            );
        }
    }
}

/// Units charged for a completed call whose output is unusable.
fn charged_for_unusable(policy: ChargePolicy, units: UnitCount) -> u64 {
    match policy {
        ChargePolicy::Full => units.total(),
        ChargePolicy::InputOnly => units.input_units,
        ChargePolicy::None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetPolicy, LedgerBook, ManualClock, MemoryLedgerStore};
    use crate::context::ContextPurpose;
    use crate::contract::{FieldSpec, ResponseSchema};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct EchoTransport {
        reply: String,
        calls: AtomicUsize,
    }

    impl EchoTransport {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ModelTransport for EchoTransport {
        async fn invoke(&self, _system: &str, _user: &str, _model: &str) -> Result<String, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn guard(limit: u64) -> QuotaGuard {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        let book = LedgerBook::new(Arc::new(MemoryLedgerStore::new()), Arc::new(clock));
        QuotaGuard::new(BudgetPolicy::new().with_daily_limit(limit), book)
    }

    fn context() -> DomainContext {
        DomainContext::new(ContextPurpose::DocumentAudit, "Motivation letter")
    }

    fn score_shape() -> ResponseShape {
        ResponseShape::structured(
            ResponseSchema::new("score_only").field(FieldSpec::number("score").bounded(0.0, 100.0)),
        )
    }

    #[test]
    fn test_charged_for_unusable() {
        let units = UnitCount::new(70, 30);
        assert_eq!(charged_for_unusable(ChargePolicy::Full, units), 100);
        assert_eq!(charged_for_unusable(ChargePolicy::InputOnly, units), 70);
        assert_eq!(charged_for_unusable(ChargePolicy::None, units), 0);
    }

    #[test]
    fn test_estimate_includes_output_allowance() {
        let gateway = AuditGateway::new(
            EchoTransport::new("ok"),
            guard(1_000),
            ContextAssembler::default(),
            GatewaySettings::new().with_expected_max_output_chars(50),
        );
        assert_eq!(gateway.estimate("0123456789"), 60);
    }

    #[tokio::test]
    async fn test_free_text_dispatch_charges_actual_cost() {
        let transport = EchoTransport::new("Looks good.");
        let gateway = AuditGateway::new(
            transport.clone(),
            guard(100_000),
            ContextAssembler::default(),
            GatewaySettings::default(),
        );

        let result = gateway
            .dispatch("Dear committee", &context(), &ResponseShape::FreeText, DispatchOptions::new())
            .await
            .unwrap();

        assert_eq!(result.raw, "Looks good.");
        assert!(result.parsed.is_none());
        assert!(result.estimated_cost > 0);
        assert_eq!(gateway.status().unwrap().used, result.estimated_cost);
        assert_eq!(gateway.status().unwrap().reserved, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_contract_failure_is_charged_by_default() {
        let gateway = AuditGateway::new(
            EchoTransport::new("not json"),
            guard(100_000),
            ContextAssembler::default(),
            GatewaySettings::default(),
        );

        let err = gateway
            .dispatch("text", &context(), &score_shape(), DispatchOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.label(), "malformed_json");
        assert!(err.charged_units() > 0);
        assert_eq!(gateway.status().unwrap().used, err.charged_units());
    }

    #[tokio::test]
    async fn test_contract_failure_not_charged_under_none_policy() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        let book = LedgerBook::new(Arc::new(MemoryLedgerStore::new()), Arc::new(clock));
        let policy = BudgetPolicy::new().with_charge_policy(ChargePolicy::None);
        let gateway = AuditGateway::new(
            EchoTransport::new(r#"{"score": 150}"#),
            QuotaGuard::new(policy, book),
            ContextAssembler::default(),
            GatewaySettings::default(),
        );

        let err = gateway
            .dispatch("text", &context(), &score_shape(), DispatchOptions::new())
            .await
            .unwrap_err();

        assert_eq!(err.label(), "schema_violation");
        assert_eq!(err.charged_units(), 0);
        assert_eq!(gateway.status().unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_dispatch_never_calls_transport() {
        let transport = EchoTransport::new("unused");
        let gateway = AuditGateway::new(
            transport.clone(),
            guard(100_000),
            ContextAssembler::default(),
            GatewaySettings::default(),
        );
        let token = CancellationToken::new();
        token.cancel();

        let err = gateway
            .dispatch(
                "text",
                &context(),
                &ResponseShape::FreeText,
                DispatchOptions::new().with_cancellation(token),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.status().unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_journal_records_outcomes() {
        let temp_dir = TempDir::new().unwrap();
        let journal =
            JournalStore::new(temp_dir.path(), &crate::journal::JournalConfig::new(30)).unwrap();
        let gateway = AuditGateway::new(
            EchoTransport::new(r#"{"score": 42}"#),
            guard(100_000),
            ContextAssembler::new(10),
            GatewaySettings::default().with_default_timeout(Duration::from_secs(5)),
        )
        .with_journal(journal.clone());
        let first_day = chrono::Utc::now().date_naive();

        gateway
            .dispatch("short", &context(), &score_shape(), DispatchOptions::new())
            .await
            .unwrap();
        gateway
            .dispatch("far too long for ten", &context(), &score_shape(), DispatchOptions::new())
            .await
            .unwrap_err();

        let last_day = chrono::Utc::now().date_naive();
        let mut records = journal.read_day(first_day).unwrap();
        if last_day != first_day {
            records.extend(journal.read_day(last_day).unwrap());
        }
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, DispatchOutcome::Done);
        assert_eq!(records[0].shape, "score_only");
        assert_eq!(records[0].subject_label, "Motivation letter");
        assert!(records[0].charged_units > 0);
        assert_eq!(records[1].outcome, DispatchOutcome::Rejected);
        assert_eq!(records[1].error_label.as_deref(), Some("content_too_large"));
        assert_eq!(records[1].charged_units, 0);
    }
}
