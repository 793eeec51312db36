use std::time::Duration;

use super::client::LlmClient;
use super::prompt::SYSTEM_PROMPT;
use super::PipelineError;

/// Bounded retry with exponential backoff: attempt `n` (0-based) that fails
/// waits `base_delay * 2^n` before the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }
}

/// Blocking access to the generative service. Every call is a fresh request;
/// nothing is cached.
pub struct TextServiceClient {
    llm: Box<dyn LlmClient + Send + Sync>,
    model: String,
    policy: RetryPolicy,
}

impl TextServiceClient {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, model: &str, policy: RetryPolicy) -> Self {
        Self {
            llm,
            model: model.to_string(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `prompt`, retrying transient failures. On exhaustion, or on the
    /// first non-retryable failure, returns `PipelineError::Service` carrying
    /// the last underlying error.
    pub fn call(&self, prompt: &str) -> Result<String, PipelineError> {
        let mut attempt = 0;
        loop {
            match self.llm.generate(&self.model, prompt, SYSTEM_PROMPT) {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "Text service call succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Text service call failed, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        attempts = attempt + 1,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Text service call failed"
                    );
                    return Err(PipelineError::Service {
                        attempts: attempt + 1,
                        source: e,
                    });
                }
            }
        }
    }
}
