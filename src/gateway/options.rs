use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default model identifier sent to the transport.
pub const DEFAULT_MODEL_ID: &str = "gpt-4o-mini";

/// Default output allowance used when estimating a call, in characters.
pub const DEFAULT_EXPECTED_MAX_OUTPUT_CHARS: usize = 2_000;

/// Default transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide gateway settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Model identifier passed to every transport call.
    pub model_id: String,

    /// Output allowance added to the content length when estimating cost.
    /// Default: 2,000 characters
    pub expected_max_output_chars: usize,

    /// Timeout for the transport step when a dispatch does not set its own.
    /// Default: 30 seconds
    pub default_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            expected_max_output_chars: DEFAULT_EXPECTED_MAX_OUTPUT_CHARS,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GatewaySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model identifier.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Sets the output allowance used for estimates.
    pub fn with_expected_max_output_chars(mut self, chars: usize) -> Self {
        self.expected_max_output_chars = chars;
        self
    }

    /// Sets the default transport timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// Per-call options for [`AuditGateway::dispatch`](super::AuditGateway::dispatch).
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Transport timeout for this call. `None` uses the gateway default.
    pub timeout: Option<Duration>,

    /// Cancelling this token before the model answers abandons the call
    /// without charging the ledger.
    pub cancellation: CancellationToken,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the transport timeout in milliseconds.
    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(timeout_ms))
    }

    /// Uses `token` for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub(crate) fn effective_timeout(&self, settings: &GatewaySettings) -> Duration {
        self.timeout.unwrap_or(settings.default_timeout)
    }
}
