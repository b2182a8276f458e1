//! src/controller/registry.rs
//! ============================================================================
//! HandlerRegistry: the single owning collection of event handlers.
//!
//! - `active` owns every handler (strong `Rc`), in insertion order
//! - `by_name`, `dynamic` and `id_index` hold weak references only
//! - removal only flags a handler; storage is reclaimed by [`HandlerRegistry::cleanup`],
//!   which the pump calls once no dispatch is iterating `active`
//!
//! Registration problems are logged and returned as recoverable
//! [`PumpError`]s; nothing here panics on bad input.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use compact_str::CompactString;
use tracing::{debug, trace, warn};

use crate::error::{PumpError, PumpResult};
use crate::model::handler::{
    Handler, HandlerName, HandlerRef, Payload, WeakHandler, standardize_name,
};

/// Weak references to the handlers filed under one key.
pub type HandlerBucket = Vec<WeakHandler>;

pub struct HandlerRegistry {
    active: Vec<HandlerRef>,
    by_name: AHashMap<CompactString, HandlerBucket>,
    dynamic: HandlerBucket,
    id_index: AHashMap<CompactString, WeakHandler>,
    next_index: u64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            active: Vec::new(),
            by_name: AHashMap::new(),
            dynamic: Vec::new(),
            id_index: AHashMap::new(),
            next_index: 0,
        }
    }

    /// Registers a handler under one or more names.
    ///
    /// Each entry of `names` may itself be a comma-separated list. The
    /// payload's `first_time_only` key (default `false`) sets the
    /// corresponding flag.
    pub fn add<S: AsRef<str>>(
        &mut self,
        names: &[S],
        id: &str,
        payload: Payload,
        is_menu_item: bool,
    ) -> PumpResult<HandlerRef> {
        let id = id.trim();
        let all_names_blank = names.iter().all(|n| n.as_ref().trim().is_empty());

        if all_names_blank && id.is_empty() && payload_is_empty(&payload) {
            warn!("Ignoring event handler with empty config");
            return Err(PumpError::EmptyConfig);
        }

        let parsed = HandlerName::parse_list(names);
        if parsed.is_empty() {
            warn!(id, "Ignoring event handler without a name");
            return Err(PumpError::NoNames);
        }

        if !id.is_empty() && self.has_active_owner(id) {
            warn!(
                id,
                "Ignoring event handler: another active handler already uses this id"
            );
            return Err(PumpError::duplicate_id(id));
        }

        let first_time_only = payload_flag(&payload, "first_time_only").unwrap_or(false);
        let index = self.next_index;
        self.next_index += 1;

        let handler: HandlerRef = Rc::new(RefCell::new(Handler::new(
            CompactString::from(id),
            parsed,
            payload,
            is_menu_item,
            first_time_only,
            index,
        )));
        let weak = Rc::downgrade(&handler);

        {
            let h = handler.borrow();
            if h.has_dynamic_name() {
                self.dynamic.push(weak.clone());
            }
            for name in h.names().iter().filter(|n| !n.is_dynamic()) {
                self.by_name
                    .entry(CompactString::from(name.as_str()))
                    .or_default()
                    .push(weak.clone());
            }

            debug!(
                names = %h.joined_names(),
                id,
                index,
                first_time_only,
                is_menu_item,
                "Registered event handler"
            );
        }

        if !id.is_empty() {
            self.id_index.insert(CompactString::from(id), weak);
        }

        self.active.push(handler.clone());
        Ok(handler)
    }

    /// Registers a handler from a single config object shaped like a saved
    /// event: `name`, `id`, `menu_item`, `first_time_only`. The whole object
    /// becomes the payload.
    pub fn add_config(&mut self, cfg: Payload) -> PumpResult<HandlerRef> {
        let name = cfg
            .get("name")
            .and_then(Payload::as_str)
            .unwrap_or_default()
            .to_string();
        let id = cfg
            .get("id")
            .and_then(Payload::as_str)
            .unwrap_or_default()
            .to_string();
        let is_menu_item = payload_flag(&cfg, "menu_item").unwrap_or(false);

        self.add(&[name], &id, cfg, is_menu_item)
    }

    /// Flags the handler owning `id` as disabled and forgets the id.
    ///
    /// Storage is not reclaimed until the next [`cleanup`](Self::cleanup).
    /// Returns the handler that was disabled, if any.
    pub fn remove(&mut self, id: &str) -> Option<HandlerRef> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }

        let weak = self.id_index.remove(id)?;
        let handler = weak.upgrade()?;
        if !handler.borrow().disabled() {
            handler.borrow_mut().disable();
            debug!(id, "Disabled event handler");
        }
        Some(handler)
    }

    /// Resolves an id; an expired reference counts as not found.
    pub fn get_by_id(&self, id: &str) -> Option<HandlerRef> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        self.id_index.get(id).and_then(|weak| weak.upgrade())
    }

    /// Handlers filed under a static name. Empty slice on a miss.
    pub fn bucket(&self, name: &str) -> &[WeakHandler] {
        let key = standardize_name(name);
        self.by_name
            .get(&key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Handlers with at least one substitution-bearing name.
    pub fn dynamic_bucket(&self) -> &[WeakHandler] {
        &self.dynamic
    }

    /// Length of the owning list, for snapshot-then-iterate callers.
    pub fn active_snapshot_len(&self) -> usize {
        self.active.len()
    }

    pub fn active_at(&self, index: usize) -> Option<HandlerRef> {
        self.active.get(index).cloned()
    }

    /// Raw storage count, including disabled handlers awaiting cleanup.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of handlers that are not disabled.
    pub fn active_len(&self) -> usize {
        self.iter_active().count()
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &HandlerRef> {
        self.active.iter().filter(|h| !h.borrow().disabled())
    }

    /// Drops disabled handlers from the owning list, then purges dead
    /// entries from the buckets of `affected_names`, the dynamic bucket and
    /// the id index. Must not run while any caller iterates the owning list.
    pub fn cleanup<I, S>(&mut self, affected_names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.active.len();
        self.active.retain(|h| !h.borrow().disabled());
        let removed = before - self.active.len();

        for name in affected_names {
            for piece in name.as_ref().split(',') {
                let key = standardize_name(piece);
                if let Some(bucket) = self.by_name.get_mut(&key) {
                    bucket.retain(is_live);
                    if bucket.is_empty() {
                        self.by_name.remove(&key);
                    }
                }
            }
        }

        self.dynamic.retain(is_live);
        self.id_index.retain(|_, weak| weak.strong_count() > 0);

        if removed > 0 {
            trace!(removed, remaining = self.active.len(), "Cleaned up event handlers");
        }
        removed
    }

    fn has_active_owner(&self, id: &str) -> bool {
        self.id_index
            .get(id)
            .and_then(|weak| weak.upgrade())
            .is_some_and(|h| !h.borrow().disabled())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("stored", &self.active.len())
            .field("names", &self.by_name.len())
            .field("dynamic", &self.dynamic.len())
            .field("ids", &self.id_index.len())
            .finish()
    }
}

// Disabled handlers kept alive by an outside strong reference are dead too.
fn is_live(weak: &WeakHandler) -> bool {
    weak.upgrade().is_some_and(|h| !h.borrow().disabled())
}

fn payload_is_empty(payload: &Payload) -> bool {
    match payload {
        Payload::Null => true,
        Payload::Object(map) => map.is_empty(),
        Payload::Array(items) => items.is_empty(),
        Payload::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Reads a boolean-ish key: JSON bools or `yes`/`no`/`true`/`false` strings.
pub(crate) fn payload_flag(payload: &Payload, key: &str) -> Option<bool> {
    match payload.get(key)? {
        Payload::Bool(b) => Some(*b),
        Payload::String(s) => match s.trim() {
            "yes" | "true" => Some(true),
            "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
