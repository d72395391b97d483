//! Observer that reports function calls and stream events through `tracing`.

use llmfn_core::error::Error;
use llmfn_core::observer::{Observer, ObserverPhase};
use llmfn_core::types::CallContext;
use llmfn_core::value::Value;

/// Logs call lifecycle and stream events.
///
/// Partial emissions are logged at `trace` level since a stream may emit
/// one per chunk.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    prefix: String,
    log_prompts: bool,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self {
            prefix: "[llmfn]".to_string(),
            log_prompts: false,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Include rendered prompts in call start events
    pub fn with_prompts(mut self, log_prompts: bool) -> Self {
        self.log_prompts = log_prompts;
        self
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for TracingObserver {
    fn name(&self) -> &str {
        "TracingObserver"
    }

    fn enforce(&self) -> ObserverPhase {
        ObserverPhase::Post
    }

    fn on_call_start(&self, ctx: &CallContext, prompt: &str) {
        if self.log_prompts {
            tracing::debug!(
                "{} [{}] {}::{} started on {}: {}",
                self.prefix,
                ctx.request_id,
                ctx.function,
                ctx.version,
                ctx.client,
                prompt
            );
        } else {
            tracing::debug!(
                "{} [{}] {}::{} started on {} (prompt_len={})",
                self.prefix,
                ctx.request_id,
                ctx.function,
                ctx.version,
                ctx.client,
                prompt.len()
            );
        }
    }

    fn on_call_end(&self, ctx: &CallContext, value: &Value) {
        tracing::info!(
            "{} [{}] {} returned {}",
            self.prefix,
            ctx.request_id,
            ctx.function,
            value
        );
    }

    fn on_error(&self, ctx: &CallContext, error: &Error) {
        tracing::error!(
            "{} [{}] {}::{} failed: {}",
            self.prefix,
            ctx.request_id,
            ctx.function,
            ctx.version,
            error
        );
    }

    fn on_partial(&self, ctx: &CallContext, partial: &serde_json::Value) {
        tracing::trace!("{} [{}] partial {}", self.prefix, ctx.request_id, partial);
    }

    fn on_final(&self, ctx: &CallContext, value: &serde_json::Value) {
        tracing::info!(
            "{} [{}] {} completed with {}",
            self.prefix,
            ctx.request_id,
            ctx.function,
            value
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmfn_core::observer::ObserverSet;
    use std::sync::Arc;

    #[test]
    fn test_tracing_observer_runs_last() {
        let set = ObserverSet::new(vec![
            Arc::new(TracingObserver::new().with_prompts(true)) as Arc<dyn Observer>
        ]);
        assert_eq!(set.len(), 1);

        let ctx = CallContext::new("Classify", "v1", "A");
        set.call_start(&ctx, "prompt");
        set.partial(&ctx, &serde_json::json!({"a": null}));
        set.final_value(&ctx, &serde_json::json!({"a": 1}));
        set.error(&ctx, &Error::prompt("missing argument"));
        assert_eq!(TracingObserver::default().enforce(), ObserverPhase::Post);
    }
}
