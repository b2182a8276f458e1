//! src/model/handler.rs
//! ============================================================================
//! Handler: one registered reaction to named events.
//!
//! A handler is immutable after creation except for its `disabled` flag.
//! The registry's owning list holds the only strong reference
//! ([`HandlerRef`]); every secondary index holds a [`WeakHandler`].

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::controller::traits::NameInterpolator;

/// Opaque action body. Never interpreted by the engine itself.
pub type Payload = serde_json::Value;

pub type HandlerRef = Rc<RefCell<Handler>>;
pub type WeakHandler = Weak<RefCell<Handler>>;
pub type HandlerNames = SmallVec<[HandlerName; 2]>;

/// Marker that turns a name into a dynamic, state-dependent one.
pub const SUBSTITUTION_MARKER: char = '$';

/// Trims surrounding whitespace and replaces internal spaces with underscores.
pub fn standardize_name(name: &str) -> CompactString {
    let trimmed = name.trim();
    if trimmed.contains(' ') {
        CompactString::from(trimmed.replace(' ', "_"))
    } else {
        CompactString::from(trimmed)
    }
}

#[inline]
pub fn is_dynamic_name(name: &str) -> bool {
    name.contains(SUBSTITUTION_MARKER)
}

/// A single topic name, flagged once at registration as static or dynamic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerName {
    text: CompactString,
    dynamic: bool,
}

impl HandlerName {
    /// Returns `None` for a blank name. Static names are standardized,
    /// dynamic ones are kept verbatim for later interpolation.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }

        if is_dynamic_name(raw) {
            Some(Self {
                text: CompactString::from(raw),
                dynamic: true,
            })
        } else {
            Some(Self {
                text: standardize_name(raw),
                dynamic: false,
            })
        }
    }

    /// Splits every supplied entry on commas and parses the pieces,
    /// dropping blanks and duplicates while keeping first-seen order.
    pub fn parse_list<S: AsRef<str>>(raw: &[S]) -> HandlerNames {
        let mut names = HandlerNames::new();
        for entry in raw {
            for piece in entry.as_ref().split(',') {
                if let Some(name) = Self::parse(piece) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Resolves this name against current state and compares it with an
    /// already-standardized event name.
    pub fn matches(&self, standardized: &str, interpolator: &dyn NameInterpolator) -> bool {
        if self.dynamic {
            standardize_name(&interpolator.resolve(&self.text)) == standardized
        } else {
            self.text == standardized
        }
    }
}

#[derive(Debug)]
pub struct Handler {
    id: CompactString,
    names: HandlerNames,
    payload: Rc<Payload>,
    disabled: bool,
    is_menu_item: bool,
    first_time_only: bool,
    insertion_index: u64,
}

impl Handler {
    pub(crate) fn new(
        id: CompactString,
        names: HandlerNames,
        payload: Payload,
        is_menu_item: bool,
        first_time_only: bool,
        insertion_index: u64,
    ) -> Self {
        Self {
            id,
            names,
            payload: Rc::new(payload),
            disabled: false,
            is_menu_item,
            first_time_only,
            insertion_index,
        }
    }

    /// `None` for an anonymous handler.
    pub fn id(&self) -> Option<&str> {
        if self.id.is_empty() {
            None
        } else {
            Some(&self.id)
        }
    }

    pub fn names(&self) -> &[HandlerName] {
        &self.names
    }

    /// Names joined back into the comma-separated form used on disk.
    pub fn joined_names(&self) -> String {
        let mut out = String::new();
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(name.as_str());
        }
        out
    }

    pub fn has_dynamic_name(&self) -> bool {
        self.names.iter().any(HandlerName::is_dynamic)
    }

    pub fn has_static_name(&self, standardized: &str) -> bool {
        self.names
            .iter()
            .any(|n| !n.is_dynamic() && n.as_str() == standardized)
    }

    /// True if any of this handler's names, static or resolved, equals `standardized`.
    pub fn matches_name(&self, standardized: &str, interpolator: &dyn NameInterpolator) -> bool {
        self.names
            .iter()
            .any(|n| n.matches(standardized, interpolator))
    }

    /// Shared handle to the payload so it can outlive a `RefCell` borrow.
    pub fn payload(&self) -> &Rc<Payload> {
        &self.payload
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    pub(crate) fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn is_menu_item(&self) -> bool {
        self.is_menu_item
    }

    pub fn first_time_only(&self) -> bool {
        self.first_time_only
    }

    pub fn insertion_index(&self) -> u64 {
        self.insertion_index
    }
}
