//! Quota-governed AI audit pipeline.
//!
//! Every AI-assisted feature goes through one [`AuditGateway`], which enforces
//! a persisted daily budget, assembles the model instruction from structured
//! domain context, and validates the model's answer against a declared
//! [`ResponseShape`].
//!
//! ```ignore
//! use auditgate::{catalog, AuditGateway, ContextPurpose, DispatchOptions, DomainContext,
//!     PipelineConfig, ResponseShape};
//!
//! let config = PipelineConfig::load(None)?;
//! let gateway = AuditGateway::from_config(&config)?;
//!
//! let context = DomainContext::new(ContextPurpose::DocumentAudit, "Motivation letter")
//!     .fact("mission", "Erasmus exchange 2026")
//!     .fact("checkpoints", vec!["motivation", "language level"]);
//! let shape = ResponseShape::structured(catalog::document_audit());
//!
//! match gateway.dispatch(&letter, &context, &shape, DispatchOptions::new()).await {
//!     Ok(result) => println!("{}", result.raw),
//!     Err(err) if err.is_retryable() => eprintln!("try again later: {err}"),
//!     Err(err) => eprintln!("{err}"),
//! }
//! ```

pub mod budget;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod gateway;
pub mod journal;
pub mod transport;

pub use budget::{BudgetPolicy, ChargePolicy, QuotaExceeded, QuotaGuard, QuotaStatus};
pub use config::{ConfigError, PipelineConfig};
pub use context::{ContextAssembler, ContextPurpose, DomainContext, Instruction};
pub use contract::{catalog, AuditResult, ResponseError, ResponseSchema, ResponseShape};
pub use error::PipelineError;
pub use gateway::{AuditGateway, DispatchOptions, DispatchStage, GatewaySettings};
pub use journal::{DispatchRecord, JournalStore};
pub use transport::{ModelTransport, TransportError, TransportErrorKind};
