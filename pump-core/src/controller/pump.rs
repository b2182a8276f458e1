//! src/controller/pump.rs
//! ============================================================================
//! Pump: owns the pending-instance queue and drives dispatch.
//!
//! ```text
//! raise() ──► pending ──drain()──► working (private) ──► registry lookup
//!                 ▲                                          │
//!                 └──── payload re-raises / re-fires ◄── process()
//! ```
//!
//! Dispatch is re-entrant but single-threaded: a payload may call back into
//! `raise`, `fire`, `drain` or `execute_on_events`. Correctness rests on two
//! rules:
//! - iteration bounds are captured before iterating and never extended
//! - the registry only deletes storage once both nesting counters are zero
//!
//! Every method takes `&self`; state lives in `Cell`/`RefCell` and no borrow
//! is ever held across a collaborator call.

use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use compact_str::CompactString;
use smallvec::SmallVec;
use tracing::{debug, error, info, trace, warn};

use crate::config::EngineConfig;
use crate::controller::context::{ContextStack, DispatchScope};
use crate::controller::messages::{MessageBuffer, MessageLevel};
use crate::controller::registry::HandlerRegistry;
use crate::controller::traits::{
    AcceptAll, ActionExecutor, EventHooks, FilterEvaluator, NameInterpolator, NoHooks,
    NoopExecutor, OutputSurface, VerbatimNames,
};
use crate::host::output::HeadlessOutput;
use crate::model::handler::{HandlerRef, Payload, standardize_name};
use crate::model::instance::{EventInstance, SubjectRef};
use crate::persistence::PersistedHandler;

type Matches = SmallVec<[HandlerRef; 8]>;

/// Increments a counter for the lifetime of the guard.
struct Nesting<'a> {
    counter: &'a Cell<usize>,
}

impl<'a> Nesting<'a> {
    fn enter(counter: &'a Cell<usize>) -> Self {
        counter.set(counter.get() + 1);
        Self { counter }
    }
}

impl Drop for Nesting<'_> {
    fn drop(&mut self) {
        self.counter.set(self.counter.get() - 1);
    }
}

pub struct Pump {
    config: EngineConfig,
    registry: RefCell<HandlerRegistry>,
    pending: RefCell<Vec<EventInstance>>,
    contexts: RefCell<ContextStack>,
    messages: RefCell<MessageBuffer>,

    /// Names whose buckets may hold dead entries at the next cleanup.
    touched: RefCell<AHashSet<CompactString>>,

    /// Nesting depth of `drain()`.
    instance_count: Cell<usize>,

    /// Nesting depth of `execute_on_events()`.
    iteration_locks: Cell<usize>,

    wml_tracking: Cell<u64>,

    filter: Box<dyn FilterEvaluator>,
    executor: Box<dyn ActionExecutor>,
    output: Box<dyn OutputSurface>,
    interpolator: Box<dyn NameInterpolator>,
    hooks: Box<dyn EventHooks>,
}

impl Pump {
    pub fn builder() -> PumpBuilder {
        PumpBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Handler management ───────────────────────────────────

    /// Registers a handler. Malformed or duplicate registrations are logged
    /// by the registry and yield `None`.
    pub fn add<S: AsRef<str>>(
        &self,
        names: &[S],
        id: &str,
        payload: Payload,
        is_menu_item: bool,
    ) -> Option<HandlerRef> {
        self.registry
            .borrow_mut()
            .add(names, id, payload, is_menu_item)
            .ok()
    }

    /// Registers a handler from a saved-event shaped config object.
    pub fn add_config(&self, cfg: Payload) -> Option<HandlerRef> {
        self.registry.borrow_mut().add_config(cfg).ok()
    }

    /// Disables the handler owning `id`. No-op for empty or unknown ids.
    pub fn remove(&self, id: &str) {
        let removed = self.registry.borrow_mut().remove(id);
        if let Some(handler) = removed {
            let names = handler.borrow().joined_names();
            self.touch(&names);
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<HandlerRef> {
        self.registry.borrow().get_by_id(id)
    }

    /// Visible (non-disabled) handler count.
    pub fn handler_count(&self) -> usize {
        self.registry.borrow().active_len()
    }

    /// Read access to the registry. Do not hold the guard across `fire`.
    pub fn registry(&self) -> Ref<'_, HandlerRegistry> {
        self.registry.borrow()
    }

    /// Reclaims disabled handlers now, unless a dispatch is in progress.
    /// Returns how many were dropped.
    pub fn compact(&self) -> usize {
        self.cleanup_if_idle()
    }

    // ── Queue ────────────────────────────────────────────────

    /// Queues an instance. Silently ignored until the output surface is ready.
    pub fn raise(
        &self,
        name: &str,
        id: &str,
        subject1: SubjectRef,
        subject2: SubjectRef,
        payload: Payload,
    ) {
        self.raise_instance(EventInstance::new(name, id, subject1, subject2, payload));
    }

    pub fn raise_instance(&self, instance: EventInstance) {
        if !self.output.is_ready() {
            trace!(name = %instance.name, "Output surface not ready, dropping raised event");
            return;
        }
        trace!(name = %instance.name, id = %instance.id, "Queued event");
        self.pending.borrow_mut().push(instance);
    }

    pub fn raise_named(&self, name: &str) {
        self.raise_instance(EventInstance::named(name));
    }

    /// `raise` followed by `drain`.
    pub fn fire(
        &self,
        name: &str,
        id: &str,
        subject1: SubjectRef,
        subject2: SubjectRef,
        payload: Payload,
    ) -> bool {
        self.raise(name, id, subject1, subject2, payload);
        self.drain()
    }

    pub fn fire_instance(&self, instance: EventInstance) -> bool {
        self.raise_instance(instance);
        self.drain()
    }

    pub fn fire_named(&self, name: &str) -> bool {
        self.fire_instance(EventInstance::named(name))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Current `drain()` nesting depth.
    pub fn depth(&self) -> usize {
        self.instance_count.get()
    }

    // ── Dispatch ─────────────────────────────────────────────

    /// Processes every instance queued at the moment of the call.
    ///
    /// Instances raised while processing land in a fresh queue and are left
    /// for a later (possibly nested) call. Returns the top context's
    /// `mutated` flag, or `false` if nothing was queued or the depth guard
    /// refused this call.
    pub fn drain(&self) -> bool {
        if self.pending.borrow().is_empty() {
            trace!("Processing queued events, but none found");
            return false;
        }

        let depth = self.instance_count.get();
        if depth >= self.config.max_depth {
            error!(
                depth,
                max_depth = self.config.max_depth,
                queued = self.pending.borrow().len(),
                "Event pump recursion would exceed maximum depth, leaving events queued"
            );
            return false;
        }

        let working: Vec<EventInstance> = std::mem::take(&mut *self.pending.borrow_mut());
        debug!(depth = depth + 1, queued = working.len(), "Draining event queue");

        {
            let _nesting = Nesting::enter(&self.instance_count);
            let _scope = DispatchScope::enter(&self.contexts, false);

            for instance in &working {
                self.dispatch_instance(instance);
            }
        }

        self.cleanup_if_idle();
        self.contexts.borrow().mutated()
    }

    fn dispatch_instance(&self, instance: &EventInstance) {
        if instance.is_empty() {
            trace!("Skipping event with neither name nor id");
            return;
        }

        self.hooks.invalidate_caches();
        debug!(name = %instance.name, id = %instance.id, "Processing event");

        {
            let _scope = DispatchScope::enter(&self.contexts, false);
            if self.hooks.run_global_hook(self, instance) {
                self.bump_tracking();
            }
        }

        if !instance.id.is_empty() {
            let handler = self.registry.borrow().get_by_id(&instance.id);
            if handler.is_none() {
                debug!(id = %instance.id, "No event handler with this id");
            }
            self.process(handler.as_ref(), instance);
        } else {
            self.touch(&instance.name);
            for handler in self.matching_handlers(&instance.name) {
                self.process(Some(&handler), instance);
            }
        }

        self.flush_messages();
    }

    /// Static bucket plus resolved dynamic names, deduplicated and ordered
    /// by insertion index.
    fn matching_handlers(&self, standardized: &str) -> Matches {
        let (mut found, dynamic): (Matches, Matches) = {
            let registry = self.registry.borrow();
            (
                registry
                    .bucket(standardized)
                    .iter()
                    .filter_map(Weak::upgrade)
                    .collect(),
                registry
                    .dynamic_bucket()
                    .iter()
                    .filter_map(Weak::upgrade)
                    .collect(),
            )
        };

        for handler in dynamic {
            let matched = {
                let h = handler.borrow();
                !h.disabled() && h.matches_name(standardized, &*self.interpolator)
            };
            if matched && !found.iter().any(|f| Rc::ptr_eq(f, &handler)) {
                found.push(handler);
            }
        }

        found.sort_by_key(|h| h.borrow().insertion_index());
        found
    }

    /// Filters and runs one handler against one instance.
    ///
    /// Returns `true` when the handler passed its filter and its payload
    /// was handed to the executor.
    pub fn process(&self, handler: Option<&HandlerRef>, instance: &EventInstance) -> bool {
        let Some(handler) = handler else {
            return false;
        };

        let (payload, first_time_only) = {
            let h = handler.borrow();
            if h.disabled() {
                return false;
            }
            (Rc::clone(h.payload()), h.first_time_only())
        };

        self.hooks.bind_subjects(instance);

        let dispatched = if self.filter.matches(&payload, instance) {
            if first_time_only {
                let names = {
                    let mut h = handler.borrow_mut();
                    h.disable();
                    h.joined_names()
                };
                self.touch(&names);
            }

            self.bump_tracking();
            {
                // Reaching the executor marks the scope mutated unconditionally.
                let _scope = DispatchScope::enter(&self.contexts, true);
                if !self.executor.run(self, &payload, instance) {
                    debug!(name = %instance.name, "Event handler body reported failure");
                }
            }
            true
        } else {
            trace!(name = %instance.name, "Event handler filtered out");
            false
        };

        self.hooks.unbind_subjects(instance);
        dispatched
    }

    /// Applies `visitor` to every non-disabled handler matching `name`,
    /// bounded by the owning list's length at call time.
    pub fn execute_on_events<F>(&self, name: &str, mut visitor: F)
    where
        F: FnMut(&Pump, &HandlerRef),
    {
        let standardized = standardize_name(name);
        let saved_end = self.registry.borrow().active_snapshot_len();

        {
            let _lock = Nesting::enter(&self.iteration_locks);

            for i in 0..saved_end {
                let handler = self.registry.borrow().active_at(i);
                let Some(handler) = handler else {
                    continue;
                };

                let matched = {
                    let h = handler.borrow();
                    !h.disabled() && h.matches_name(&standardized, &*self.interpolator)
                };
                if matched {
                    visitor(self, &handler);
                }
            }
        }

        self.touch(&standardized);
        self.cleanup_if_idle();
    }

    fn touch(&self, names: &str) {
        let mut touched = self.touched.borrow_mut();
        for name in names.split(',') {
            let name = standardize_name(name);
            if !name.is_empty() {
                touched.insert(name);
            }
        }
    }

    fn cleanup_if_idle(&self) -> usize {
        if self.instance_count.get() > 0 || self.iteration_locks.get() > 0 {
            return 0;
        }

        let names: Vec<CompactString> = self.touched.borrow_mut().drain().collect();
        self.registry.borrow_mut().cleanup(names)
    }

    // ── Tracking and contexts ────────────────────────────────

    /// Counter bumped per dispatched handler and per externally-run body.
    pub fn wml_tracking(&self) -> u64 {
        self.wml_tracking.get()
    }

    /// Records an event body run outside the engine.
    pub fn record_external_run(&self) {
        self.bump_tracking();
    }

    fn bump_tracking(&self) {
        self.wml_tracking.set(self.wml_tracking.get() + 1);
    }

    pub fn context_mutated(&self) -> bool {
        self.contexts.borrow().mutated()
    }

    pub fn set_context_mutated(&self, mutated: bool) {
        self.contexts.borrow_mut().set_mutated(mutated);
    }

    pub fn context_skip_messages(&self) -> bool {
        self.contexts.borrow().skip_messages()
    }

    pub fn set_context_skip_messages(&self, skip: bool) {
        self.contexts.borrow_mut().set_skip_messages(skip);
    }

    /// Whether anything ran that invalidates undo.
    pub fn undo_disabled(&self) -> bool {
        self.context_mutated()
    }

    /// Number of contexts on the stack, root included.
    pub fn context_depth(&self) -> usize {
        self.contexts.borrow().depth()
    }

    // ── Messages ─────────────────────────────────────────────

    /// Logs a diagnostic and buffers it for the output surface.
    pub fn put_message(&self, level: MessageLevel, text: &str) {
        match level {
            MessageLevel::Info => info!(target: "pump::messages", "{text}"),
            MessageLevel::Warning => warn!(target: "pump::messages", "{text}"),
            MessageLevel::Error => error!(target: "pump::messages", "{text}"),
        }
        self.messages.borrow_mut().push(level, text);
    }

    pub fn buffered_messages(&self) -> usize {
        self.messages.borrow().len()
    }

    /// Hands buffered messages to the output surface when it can take them.
    pub fn flush_messages(&self) {
        if !self.config.flush_messages || !self.output.is_ready() || self.output.is_locked() {
            return;
        }

        let messages = self.messages.borrow_mut().take();
        if !messages.is_empty() {
            self.output.show_messages(&messages);
        }
    }

    // ── Persistence ──────────────────────────────────────────

    /// Non-disabled, non-menu-item handlers in owning-list order.
    pub fn write_events(&self) -> Vec<PersistedHandler> {
        self.registry
            .borrow()
            .iter_active()
            .filter(|h| !h.borrow().is_menu_item())
            .map(|h| PersistedHandler::from_handler(&h.borrow()))
            .collect()
    }

    /// Re-registers saved handlers, rebuilding every index. Returns how many
    /// were accepted.
    pub fn read_events(&self, records: Vec<PersistedHandler>) -> usize {
        let mut registry = self.registry.borrow_mut();
        let total = records.len();
        let accepted = records
            .into_iter()
            .filter_map(|rec| {
                registry
                    .add(&[rec.name.as_str()], &rec.id, rec.payload, false)
                    .ok()
            })
            .count();

        if accepted < total {
            warn!(accepted, total, "Some saved event handlers were rejected");
        }
        accepted
    }
}

impl std::fmt::Debug for Pump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pump")
            .field("config", &self.config)
            .field("registry", &*self.registry.borrow())
            .field("pending", &self.pending.borrow().len())
            .field("depth", &self.instance_count.get())
            .field("wml_tracking", &self.wml_tracking.get())
            .finish()
    }
}

/// Builder wiring collaborators into a [`Pump`]. Unset collaborators fall
/// back to pass-through implementations.
pub struct PumpBuilder {
    config: EngineConfig,
    filter: Box<dyn FilterEvaluator>,
    executor: Box<dyn ActionExecutor>,
    output: Box<dyn OutputSurface>,
    interpolator: Box<dyn NameInterpolator>,
    hooks: Box<dyn EventHooks>,
}

impl PumpBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            filter: Box::new(AcceptAll),
            executor: Box::new(NoopExecutor),
            output: Box::new(HeadlessOutput),
            interpolator: Box::new(VerbatimNames),
            hooks: Box::new(NoHooks),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl FilterEvaluator + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    #[must_use]
    pub fn with_executor(mut self, executor: impl ActionExecutor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: impl OutputSurface + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    #[must_use]
    pub fn with_interpolator(mut self, interpolator: impl NameInterpolator + 'static) -> Self {
        self.interpolator = Box::new(interpolator);
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: impl EventHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn build(self) -> Pump {
        Pump {
            config: self.config,
            registry: RefCell::new(HandlerRegistry::new()),
            pending: RefCell::new(Vec::new()),
            contexts: RefCell::new(ContextStack::new()),
            messages: RefCell::new(MessageBuffer::default()),
            touched: RefCell::new(AHashSet::new()),
            instance_count: Cell::new(0),
            iteration_locks: Cell::new(0),
            wml_tracking: Cell::new(0),
            filter: self.filter,
            executor: self.executor,
            output: self.output,
            interpolator: self.interpolator,
            hooks: self.hooks,
        }
    }
}

impl Default for PumpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::variables::{VariableInterpolator, Variables};
    use crate::test_support::{BlockedFilter, CountingHooks, RecordingExecutor, SwitchableOutput};
    use serde_json::json;

    fn recording() -> (Pump, RecordingExecutor) {
        let recorder = RecordingExecutor::default();
        let pump = Pump::builder().with_executor(recorder.clone()).build();
        (pump, recorder)
    }

    fn tagged(tag: &str) -> Payload {
        json!({ "tag": tag })
    }

    #[test]
    fn test_fire_unknown_name() {
        let (pump, recorder) = recording();
        assert!(!pump.fire_named("nonexistent"));
        assert_eq!(pump.wml_tracking(), 0);
        assert!(recorder.log().is_empty());
        assert_eq!(pump.pending_len(), 0);
    }

    #[test]
    fn test_duplicate_id_rejected_and_each_fire_runs_once() {
        let (pump, recorder) = recording();
        assert!(pump.add(&["turn 1"], "x", tagged("first"), false).is_some());
        assert!(pump.add(&["turn 2"], "x", tagged("second"), false).is_none());

        assert!(pump.fire_named("turn 1"));
        assert_eq!(pump.wml_tracking(), 1);
        assert!(pump.fire_named("turn_1"));
        assert_eq!(pump.wml_tracking(), 2);
        pump.set_context_mutated(false);
        assert!(!pump.fire_named("turn 2"));

        assert_eq!(recorder.log(), ["first", "first"]);
    }

    #[test]
    fn test_first_time_only_survives_reentrant_refire() {
        let (pump, recorder) = recording();
        pump.add(
            &["boom"],
            "",
            json!({"tag": "once", "first_time_only": true}),
            false,
        );
        recorder.on("once", |pump, _| {
            pump.fire_named("boom");
        });

        pump.fire_named("boom");
        pump.fire_named("boom");

        assert_eq!(recorder.log(), ["once"]);
        assert_eq!(pump.wml_tracking(), 1);
        assert_eq!(pump.registry().len(), 0);
        assert!(pump.registry().bucket("boom").is_empty());
    }

    #[test]
    fn test_raise_inside_pass_waits_for_next_drain() {
        let (pump, recorder) = recording();
        pump.add(&["a"], "", tagged("a"), false);
        pump.add(&["b"], "", tagged("b"), false);
        recorder.on("a", |pump, _| pump.raise_named("b"));

        pump.fire_named("a");
        assert_eq!(recorder.log(), ["a"]);
        assert_eq!(pump.pending_len(), 1);

        assert!(pump.drain());
        assert_eq!(recorder.log(), ["a", "b"]);
    }

    #[test]
    fn test_nested_fire_completes_inside_handler() {
        let (pump, recorder) = recording();
        pump.add(&["a"], "", tagged("a"), false);
        pump.add(&["b"], "", tagged("b"), false);

        let log = recorder.log_handle();
        recorder.on("a", move |pump, _| {
            pump.fire_named("b");
            log.borrow_mut().push("a-done".to_string());
        });
        let depths = Rc::new(Cell::new(0));
        let seen = Rc::clone(&depths);
        recorder.on("b", move |pump, _| seen.set(pump.depth()));

        pump.fire_named("a");
        assert_eq!(recorder.log(), ["a", "b", "a-done"]);
        assert_eq!(depths.get(), 2);
        assert_eq!(pump.depth(), 0);
        assert_eq!(pump.context_depth(), 1);
    }

    #[test]
    fn test_remove_mid_pass_skips_and_cleans_up() {
        let (pump, recorder) = recording();
        pump.add(&["go"], "", tagged("first"), false);
        pump.add(&["go"], "second", tagged("second"), false);
        recorder.on("first", |pump, _| {
            pump.remove("second");
            // Storage stays put while the pass is running.
            assert_eq!(pump.registry().len(), 2);
        });

        pump.fire_named("go");
        assert_eq!(recorder.log(), ["first"]);
        assert_eq!(pump.registry().len(), 1);
        assert_eq!(pump.registry().bucket("go").len(), 1);
        assert!(pump.get_by_id("second").is_none());

        pump.fire_named("go");
        assert_eq!(recorder.log(), ["first", "first"]);
    }

    #[test]
    fn test_handler_added_mid_pass_waits_for_next_event() {
        let (pump, recorder) = recording();
        pump.add(&["go"], "", tagged("first"), false);
        recorder.on("first", |pump, _| {
            pump.add(&["go"], "", tagged("late"), false);
        });

        pump.fire_named("go");
        assert_eq!(recorder.log(), ["first"]);

        pump.fire_named("go");
        assert_eq!(recorder.log(), ["first", "first", "late"]);
    }

    #[test]
    fn test_depth_guard_leaves_events_queued() {
        let recorder = RecordingExecutor::default();
        let pump = Pump::builder()
            .with_executor(recorder.clone())
            .with_max_depth(1)
            .build();
        pump.add(&["a"], "", tagged("a"), false);
        pump.add(&["b"], "", tagged("b"), false);
        recorder.on("a", |pump, _| {
            assert!(!pump.fire_named("b"));
        });

        pump.fire_named("a");
        assert_eq!(recorder.log(), ["a"]);
        assert_eq!(pump.pending_len(), 1);

        pump.drain();
        assert_eq!(recorder.log(), ["a", "b"]);
    }

    #[test]
    fn test_raise_ignored_until_output_ready() {
        let output = SwitchableOutput::default();
        output.ready.set(false);
        let pump = Pump::builder().with_output(output.clone()).build();

        pump.raise_named("a");
        assert_eq!(pump.pending_len(), 0);

        output.ready.set(true);
        pump.raise_named("a");
        assert_eq!(pump.pending_len(), 1);
    }

    #[test]
    fn test_dynamic_names_resolve_at_dispatch() {
        let vars = Variables::new();
        vars.set("side", json!("north"));
        let recorder = RecordingExecutor::default();
        let pump = Pump::builder()
            .with_executor(recorder.clone())
            .with_interpolator(VariableInterpolator::new(vars.clone()))
            .build();
        pump.add(&["$side|_ready"], "", tagged("dyn"), false);

        pump.fire_named("north_ready");
        vars.set("side", json!("south"));
        pump.fire_named("north_ready");
        pump.fire_named("south ready");

        assert_eq!(recorder.log(), ["dyn", "dyn"]);
    }

    #[test]
    fn test_handler_with_static_and_dynamic_name_runs_once() {
        let vars = Variables::new();
        vars.set("n", json!("go"));
        let recorder = RecordingExecutor::default();
        let pump = Pump::builder()
            .with_executor(recorder.clone())
            .with_interpolator(VariableInterpolator::new(vars))
            .build();
        pump.add(&["go,$n"], "", tagged("both"), false);
        pump.add(&["go"], "", tagged("plain"), false);

        pump.fire_named("go");
        assert_eq!(recorder.log(), ["both", "plain"]);
    }

    #[test]
    fn test_execute_on_events_ignores_handlers_added_during_iteration() {
        let pump = Pump::builder().build();
        pump.add(&["x"], "", tagged("1"), false);
        pump.add(&["x"], "", tagged("2"), false);
        pump.add(&["y"], "", tagged("3"), false);

        let mut visited = Vec::new();
        pump.execute_on_events("x", |pump, handler| {
            visited.push(crate::test_support::tag_of(handler.borrow().payload()));
            pump.add(&["x"], "", tagged("new"), false);
        });

        assert_eq!(visited, ["1", "2"]);
        assert_eq!(pump.handler_count(), 5);
    }

    #[test]
    fn test_cleanup_deferred_while_iterating() {
        let pump = Pump::builder().build();
        pump.add(&["x"], "keep", tagged("keep"), false);
        pump.add(&["x"], "drop", tagged("drop"), false);

        let mut visits = 0;
        pump.execute_on_events("x", |pump, _| {
            visits += 1;
            pump.remove("drop");
            assert_eq!(pump.compact(), 0);
            assert_eq!(pump.registry().len(), 2);
        });

        // "drop" was still inside the bound but disabled by then.
        assert_eq!(visits, 1);
        assert_eq!(pump.registry().len(), 1);
        assert_eq!(pump.handler_count(), 1);
    }

    #[test]
    fn test_handler_added_mid_pass_serves_later_instance_in_same_pass() {
        let (pump, recorder) = recording();
        pump.add(&["a"], "", tagged("a"), false);
        recorder.on("a", |pump, _| {
            pump.add(&["b"], "", tagged("b"), false);
        });

        pump.raise_named("a");
        pump.raise_named("b");
        assert!(pump.drain());
        assert_eq!(recorder.log(), ["a", "b"]);
    }

    #[test]
    fn test_execute_on_events_inside_pass_sees_new_handler() {
        let (pump, recorder) = recording();
        pump.add(&["go"], "", tagged("go"), false);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let visited = Rc::clone(&seen);
        recorder.on("go", move |pump, _| {
            pump.add(&["later"], "", tagged("later"), false);
            pump.execute_on_events("later", |_, handler| {
                visited
                    .borrow_mut()
                    .push(crate::test_support::tag_of(handler.borrow().payload()));
            });
        });

        pump.fire_named("go");
        assert_eq!(*seen.borrow(), ["later"]);
    }

    #[test]
    fn test_messages_wait_for_unlocked_output() {
        let output = SwitchableOutput::default();
        output.locked.set(true);
        let recorder = RecordingExecutor::default();
        let pump = Pump::builder()
            .with_executor(recorder.clone())
            .with_output(output.clone())
            .build();
        pump.add(&["warn"], "", tagged("w"), false);
        recorder.on("w", |pump, _| {
            pump.put_message(MessageLevel::Warning, "low gold");
        });

        pump.fire_named("warn");
        pump.fire_named("warn");
        assert!(output.shown.borrow().is_empty());
        assert_eq!(pump.buffered_messages(), 1);

        output.locked.set(false);
        pump.fire_named("warn");
        let shown = output.shown.borrow();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].repeats, 3);
        assert_eq!(pump.buffered_messages(), 0);
    }

    #[test]
    fn test_global_hook_counts_toward_tracking() {
        let hooks = CountingHooks::default();
        let pump = Pump::builder().with_hooks(hooks.clone()).build();
        pump.add(&["go"], "", tagged("go"), false);

        pump.fire_named("nothing");
        assert_eq!(pump.wml_tracking(), 1);
        assert_eq!(hooks.invalidations.get(), 1);

        pump.fire_named("go");
        assert_eq!(pump.wml_tracking(), 3);
        assert_eq!(hooks.global_runs.get(), 2);
        assert_eq!(hooks.bound.get(), 0);
    }

    #[test]
    fn test_id_addressed_instance_reaches_only_that_handler() {
        let (pump, recorder) = recording();
        pump.add(&["go"], "a", tagged("a"), false);
        pump.add(&["go"], "b", tagged("b"), false);

        pump.fire_instance(EventInstance::for_id("b"));
        pump.fire("go", "a", SubjectRef::none(), SubjectRef::none(), Payload::Null);
        assert_eq!(recorder.log(), ["b", "a"]);

        pump.set_context_mutated(false);
        assert!(!pump.fire_instance(EventInstance::for_id("missing")));
    }

    #[test]
    fn test_filtered_handler_does_not_mutate() {
        let recorder = RecordingExecutor::default();
        let pump = Pump::builder()
            .with_executor(recorder.clone())
            .with_filter(BlockedFilter)
            .build();
        pump.add(&["go"], "", json!({"tag": "no", "blocked": true}), false);

        assert!(!pump.fire_named("go"));
        assert!(!pump.undo_disabled());
        assert_eq!(pump.wml_tracking(), 0);
        assert!(recorder.log().is_empty());
    }

    #[test]
    fn test_process_without_handler_is_false() {
        let pump = Pump::builder().build();
        assert!(!pump.process(None, &EventInstance::named("go")));
    }

    #[test]
    fn test_skip_messages_inherited_by_nested_dispatch() {
        let (pump, recorder) = recording();
        pump.add(&["outer"], "", tagged("outer"), false);
        pump.add(&["inner"], "", tagged("inner"), false);

        let seen = Rc::new(Cell::new(false));
        let inner_seen = Rc::clone(&seen);
        recorder.on("outer", |pump, _| {
            pump.set_context_skip_messages(true);
            pump.fire_named("inner");
        });
        recorder.on("inner", move |pump, _| {
            inner_seen.set(pump.context_skip_messages());
        });

        pump.fire_named("outer");
        assert!(seen.get());

        // The root's flag is not inherited.
        let fresh = Rc::new(Cell::new(true));
        let fresh_seen = Rc::clone(&fresh);
        recorder.on("inner", move |pump, _| fresh_seen.set(pump.context_skip_messages()));
        pump.set_context_skip_messages(true);
        pump.fire_named("inner");
        assert!(!fresh.get());
    }

    #[test]
    fn test_mutated_flag_resettable_by_host() {
        let (pump, _recorder) = recording();
        pump.add(&["go"], "", tagged("go"), false);

        assert!(pump.fire_named("go"));
        assert!(pump.undo_disabled());
        pump.set_context_mutated(false);
        assert!(!pump.fire_named("other"));
    }

    #[test]
    fn test_write_then_read_events_round_trip() {
        let (pump, _recorder) = recording();
        pump.add(&["a,b"], "ab", tagged("ab"), false);
        pump.add(&["menu"], "", tagged("menu"), true);
        pump.add(&["gone"], "gone", tagged("gone"), false);
        pump.remove("gone");

        let saved = pump.write_events();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "a,b");

        let (restored, recorder) = recording();
        assert_eq!(restored.read_events(saved), 1);
        restored.fire_named("b");
        assert_eq!(recorder.log(), ["ab"]);
    }
}
