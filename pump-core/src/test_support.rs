//! src/test_support.rs
//! ============================================================================
//! Scriptable collaborators shared by unit tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;

use crate::controller::messages::BufferedMessage;
use crate::controller::pump::Pump;
use crate::controller::traits::{ActionExecutor, EventHooks, FilterEvaluator, OutputSurface};
use crate::model::handler::Payload;
use crate::model::instance::EventInstance;

pub(crate) type Script = Rc<dyn Fn(&Pump, &EventInstance)>;

pub(crate) fn tag_of(payload: &Payload) -> String {
    payload
        .get("tag")
        .and_then(Payload::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Logs each run's `tag` and then runs the script registered for it.
#[derive(Clone, Default)]
pub(crate) struct RecordingExecutor {
    log: Rc<RefCell<Vec<String>>>,
    scripts: Rc<RefCell<AHashMap<String, Script>>>,
}

impl RecordingExecutor {
    pub(crate) fn on(&self, tag: &str, script: impl Fn(&Pump, &EventInstance) + 'static) {
        self.scripts
            .borrow_mut()
            .insert(tag.to_string(), Rc::new(script));
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub(crate) fn log_handle(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.log)
    }
}

impl ActionExecutor for RecordingExecutor {
    fn run(&self, pump: &Pump, payload: &Payload, instance: &EventInstance) -> bool {
        let tag = tag_of(payload);
        self.log.borrow_mut().push(tag.clone());

        let script = self.scripts.borrow().get(&tag).cloned();
        if let Some(script) = script {
            script(pump, instance);
        }
        true
    }
}

/// Rejects payloads carrying `"blocked": true`.
#[derive(Clone, Copy, Default)]
pub(crate) struct BlockedFilter;

impl FilterEvaluator for BlockedFilter {
    fn matches(&self, payload: &Payload, _instance: &EventInstance) -> bool {
        !payload
            .get("blocked")
            .and_then(Payload::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Clone)]
pub(crate) struct SwitchableOutput {
    pub(crate) ready: Rc<Cell<bool>>,
    pub(crate) locked: Rc<Cell<bool>>,
    pub(crate) shown: Rc<RefCell<Vec<BufferedMessage>>>,
}

impl Default for SwitchableOutput {
    fn default() -> Self {
        Self {
            ready: Rc::new(Cell::new(true)),
            locked: Rc::new(Cell::new(false)),
            shown: Rc::default(),
        }
    }
}

impl OutputSurface for SwitchableOutput {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    fn is_locked(&self) -> bool {
        self.locked.get()
    }

    fn show_messages(&self, messages: &[BufferedMessage]) {
        self.shown.borrow_mut().extend_from_slice(messages);
    }
}

#[derive(Clone, Default)]
pub(crate) struct CountingHooks {
    pub(crate) invalidations: Rc<Cell<u32>>,
    pub(crate) global_runs: Rc<Cell<u32>>,
    pub(crate) bound: Rc<Cell<u32>>,
}

impl EventHooks for CountingHooks {
    fn invalidate_caches(&self) {
        self.invalidations.set(self.invalidations.get() + 1);
    }

    fn run_global_hook(&self, _pump: &Pump, _instance: &EventInstance) -> bool {
        self.global_runs.set(self.global_runs.get() + 1);
        true
    }

    fn bind_subjects(&self, _instance: &EventInstance) {
        self.bound.set(self.bound.get() + 1);
    }

    fn unbind_subjects(&self, _instance: &EventInstance) {
        self.bound.set(self.bound.get() - 1);
    }
}
