//! src/controller/traits.rs
//! ============================================================================
//! Collaborator seams between the pump and its host.
//!
//! The pump never interprets filters, payloads or names itself; it asks these
//! traits. All of them take `&self` and are single-threaded: implementors that
//! keep state use `Cell`/`RefCell`.

use crate::controller::messages::BufferedMessage;
use crate::controller::pump::Pump;
use crate::model::handler::Payload;
use crate::model::instance::EventInstance;

/// Decides whether a handler's filter accepts an instance.
pub trait FilterEvaluator {
    fn matches(&self, filter: &Payload, instance: &EventInstance) -> bool;
}

/// Runs a handler's payload. May call back into the pump.
pub trait ActionExecutor {
    /// The return value is informational only; the enclosing context is
    /// marked mutated whether or not the body changed anything.
    fn run(&self, pump: &Pump, payload: &Payload, instance: &EventInstance) -> bool;
}

/// Probe for the host's output surface.
pub trait OutputSurface {
    /// `raise` is a silent no-op until this returns true.
    fn is_ready(&self) -> bool;

    fn is_locked(&self) -> bool {
        false
    }

    /// Receives flushed diagnostics in first-seen order.
    fn show_messages(&self, _messages: &[BufferedMessage]) {}
}

/// Resolves a dynamic (substitution-bearing) name against current state.
pub trait NameInterpolator {
    fn resolve(&self, dynamic_name: &str) -> String;
}

/// Optional per-instance hooks.
pub trait EventHooks {
    /// Drop caches that must not survive an event boundary.
    fn invalidate_caches(&self) {}

    /// Externally-run event body executed before handler lookup. Returns
    /// whether a body actually ran.
    fn run_global_hook(&self, _pump: &Pump, _instance: &EventInstance) -> bool {
        false
    }

    fn bind_subjects(&self, _instance: &EventInstance) {}

    fn unbind_subjects(&self, _instance: &EventInstance) {}
}

/// Filter that accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl FilterEvaluator for AcceptAll {
    fn matches(&self, _filter: &Payload, _instance: &EventInstance) -> bool {
        true
    }
}

/// Executor that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExecutor;

impl ActionExecutor for NoopExecutor {
    fn run(&self, _pump: &Pump, _payload: &Payload, _instance: &EventInstance) -> bool {
        true
    }
}

/// Interpolator that returns dynamic names unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerbatimNames;

impl NameInterpolator for VerbatimNames {
    fn resolve(&self, dynamic_name: &str) -> String {
        dynamic_name.to_string()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl EventHooks for NoHooks {}
