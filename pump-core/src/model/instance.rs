//! src/model/instance.rs
//! ============================================================================
//! EventInstance: one concrete occurrence waiting in the pump's queue.

use std::any::Any;
use std::rc::{Rc, Weak};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::model::handler::{Payload, standardize_name};

/// Location-like filter key carried by a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Optional weak reference to a domain entity plus an optional location.
///
/// The engine never keeps an entity alive; a subject whose entity has been
/// dropped still carries its location.
#[derive(Debug, Clone, Default)]
pub struct SubjectRef {
    location: Option<Location>,
    entity: Option<Weak<dyn Any>>,
}

impl SubjectRef {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn at(x: i32, y: i32) -> Self {
        Self {
            location: Some(Location::new(x, y)),
            entity: None,
        }
    }

    #[must_use]
    pub fn with_entity<T: Any>(mut self, entity: &Rc<T>) -> Self {
        let strong: Rc<dyn Any> = entity.clone();
        self.entity = Some(Rc::downgrade(&strong));
        self
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Whether an entity was attached, alive or not.
    pub fn refers_to_entity(&self) -> bool {
        self.entity.is_some()
    }

    /// Upgrades the entity reference; `None` if absent or dropped.
    pub fn entity(&self) -> Option<Rc<dyn Any>> {
        self.entity.as_ref().and_then(Weak::upgrade)
    }

    pub fn entity_as<T: Any>(&self) -> Option<Rc<T>> {
        self.entity().and_then(|e| e.downcast::<T>().ok())
    }
}

#[derive(Debug, Clone)]
pub struct EventInstance {
    pub name: CompactString,
    pub id: CompactString,
    pub subject1: SubjectRef,
    pub subject2: SubjectRef,
    pub payload: Payload,
}

impl EventInstance {
    pub fn new(
        name: &str,
        id: &str,
        subject1: SubjectRef,
        subject2: SubjectRef,
        payload: Payload,
    ) -> Self {
        Self {
            name: standardize_name(name),
            id: CompactString::from(id.trim()),
            subject1,
            subject2,
            payload,
        }
    }

    /// Instance with only a name.
    pub fn named(name: &str) -> Self {
        Self::new(name, "", SubjectRef::none(), SubjectRef::none(), Payload::Null)
    }

    /// Instance addressed to a single handler id.
    pub fn for_id(id: &str) -> Self {
        Self::new("", id, SubjectRef::none(), SubjectRef::none(), Payload::Null)
    }

    /// Both name and id empty: dropped without lookup.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.id.is_empty()
    }
}
