//! src/host/variables.rs
//! ============================================================================
//! Shared variable store and `$name` interpolation of dynamic handler names.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use compact_str::CompactString;

use crate::controller::traits::NameInterpolator;
use crate::model::handler::{Payload, SUBSTITUTION_MARKER};

/// Cheaply clonable handle to one variable table. Clones share storage, so a
/// script executor and an interpolator built from the same handle see each
/// other's writes.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    inner: Rc<RefCell<AHashMap<CompactString, Payload>>>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: Payload) {
        self.inner
            .borrow_mut()
            .insert(CompactString::from(name.trim()), value);
    }

    pub fn get(&self, name: &str) -> Option<Payload> {
        self.inner.borrow().get(name.trim()).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Payload> {
        self.inner.borrow_mut().remove(name.trim())
    }

    /// Text form of a variable: strings verbatim, `null`/unset as empty.
    pub fn get_text(&self, name: &str) -> String {
        match self.inner.borrow().get(name.trim()) {
            None | Some(Payload::Null) => String::new(),
            Some(Payload::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Expands every `$name` (optionally terminated by `|`) in `text`.
    ///
    /// Names are ASCII alphanumerics, `_` and `.`. A marker not followed by a
    /// name is kept literally.
    pub fn interpolate(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(pos) = rest.find(SUBSTITUTION_MARKER) {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + SUBSTITUTION_MARKER.len_utf8()..];

            let name_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                .unwrap_or(after.len());

            if name_len == 0 {
                out.push(SUBSTITUTION_MARKER);
                rest = after;
                continue;
            }

            out.push_str(&self.get_text(&after[..name_len]));
            rest = &after[name_len..];
            if let Some(stripped) = rest.strip_prefix('|') {
                rest = stripped;
            }
        }

        out.push_str(rest);
        out
    }
}

/// [`NameInterpolator`] backed by a [`Variables`] handle.
#[derive(Debug, Clone)]
pub struct VariableInterpolator {
    vars: Variables,
}

impl VariableInterpolator {
    pub fn new(vars: Variables) -> Self {
        Self { vars }
    }
}

impl NameInterpolator for VariableInterpolator {
    fn resolve(&self, dynamic_name: &str) -> String {
        self.vars.interpolate(dynamic_name)
    }
}
