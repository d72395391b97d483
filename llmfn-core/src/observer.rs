//! Observers for call lifecycle and stream events.
//!
//! Observers never influence a call: hooks return nothing and an empty
//! [`ObserverSet`] behaves exactly like a populated one.

use crate::error::Error;
use crate::types::CallContext;
use crate::value::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Observer execution phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverPhase {
    /// Notified before normal observers
    Pre,
    /// Notified in registration order
    Normal,
    /// Notified after normal observers
    Post,
}

/// Hooks into function calls and streams. All hooks default to no-ops.
pub trait Observer: Send + Sync + Debug + 'static {
    /// Observer name
    fn name(&self) -> &str;

    /// Observer execution phase
    fn enforce(&self) -> ObserverPhase {
        ObserverPhase::Normal
    }

    /// A call or stream was started with the rendered prompt
    fn on_call_start(&self, _ctx: &CallContext, _prompt: &str) {}

    /// A direct call resolved to a value
    fn on_call_end(&self, _ctx: &CallContext, _value: &Value) {}

    /// A call or stream failed
    fn on_error(&self, _ctx: &CallContext, _error: &Error) {}

    /// A stream emitted a new partial value
    fn on_partial(&self, _ctx: &CallContext, _partial: &serde_json::Value) {}

    /// A stream completed with its final value
    fn on_final(&self, _ctx: &CallContext, _value: &serde_json::Value) {}
}

/// Ordered fan-out over observers.
#[derive(Debug, Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn Observer>>,
}

impl ObserverSet {
    /// Create an observer set, ordered by phase
    pub fn new(mut observers: Vec<Arc<dyn Observer>>) -> Self {
        observers.sort_by_key(|o| phase_rank(o.enforce()));
        Self { observers }
    }

    /// Add an observer, keeping phase order
    pub fn push(&mut self, observer: Arc<dyn Observer>) {
        let rank = phase_rank(observer.enforce());
        let at = self
            .observers
            .iter()
            .position(|o| phase_rank(o.enforce()) > rank)
            .unwrap_or(self.observers.len());
        self.observers.insert(at, observer);
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn call_start(&self, ctx: &CallContext, prompt: &str) {
        for observer in &self.observers {
            observer.on_call_start(ctx, prompt);
        }
    }

    pub fn call_end(&self, ctx: &CallContext, value: &Value) {
        for observer in &self.observers {
            observer.on_call_end(ctx, value);
        }
    }

    pub fn error(&self, ctx: &CallContext, error: &Error) {
        for observer in &self.observers {
            observer.on_error(ctx, error);
        }
    }

    pub fn partial(&self, ctx: &CallContext, partial: &serde_json::Value) {
        for observer in &self.observers {
            observer.on_partial(ctx, partial);
        }
    }

    pub fn final_value(&self, ctx: &CallContext, value: &serde_json::Value) {
        for observer in &self.observers {
            observer.on_final(ctx, value);
        }
    }
}

fn phase_rank(phase: ObserverPhase) -> u8 {
    match phase {
        ObserverPhase::Pre => 0,
        ObserverPhase::Normal => 1,
        ObserverPhase::Post => 2,
    }
}
