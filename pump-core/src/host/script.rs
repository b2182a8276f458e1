//! src/host/script.rs
//! ============================================================================
//! Small step interpreter for handler payloads.
//!
//! A payload's `do` array is run in order; each step is a single-key object:
//!
//! | step      | value                                          |
//! |-----------|------------------------------------------------|
//! | `raise`   | event name, or `{name, id, x, y, x2, y2}`      |
//! | `fire`    | same as `raise`, then drains the queue         |
//! | `remove`  | handler id                                     |
//! | `add`     | handler config object (see `Pump::add_config`) |
//! | `set`     | `{name, value}`; a `null` value unsets          |
//! | `message` | text, or `{level, text}`                       |
//!
//! Event names, ids and message text go through `$name` interpolation.

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::controller::messages::MessageLevel;
use crate::controller::pump::Pump;
use crate::controller::traits::ActionExecutor;
use crate::host::variables::Variables;
use crate::model::handler::Payload;
use crate::model::instance::{EventInstance, SubjectRef};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFields {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub id: String,

    pub x: Option<i32>,
    pub y: Option<i32>,
    pub x2: Option<i32>,
    pub y2: Option<i32>,
}

/// An event to raise, written either as a bare name or as a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventSpec {
    Name(String),
    Full(EventFields),
}

impl EventSpec {
    pub fn name(&self) -> &str {
        match self {
            EventSpec::Name(name) => name,
            EventSpec::Full(fields) => &fields.name,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EventSpec::Name(_) => "",
            EventSpec::Full(fields) => &fields.id,
        }
    }

    /// Builds the instance, interpolating the name and id against `vars`.
    pub fn to_instance(&self, vars: &Variables) -> EventInstance {
        let (subject1, subject2) = match self {
            EventSpec::Name(_) => (SubjectRef::none(), SubjectRef::none()),
            EventSpec::Full(f) => (subject(f.x, f.y), subject(f.x2, f.y2)),
        };

        EventInstance::new(
            &vars.interpolate(self.name()),
            &vars.interpolate(self.id()),
            subject1,
            subject2,
            Payload::Null,
        )
    }
}

fn subject(x: Option<i32>, y: Option<i32>) -> SubjectRef {
    match (x, y) {
        (Some(x), Some(y)) => SubjectRef::at(x, y),
        _ => SubjectRef::none(),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageSpec {
    Text(String),
    Full {
        level: Option<MessageLevel>,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Raise(EventSpec),
    Fire(EventSpec),
    Remove(String),
    Add(Payload),
    Set { name: String, value: Payload },
    Message(MessageSpec),
}

/// [`ActionExecutor`] running payload `do` arrays against the pump.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    vars: Variables,
}

impl ScriptExecutor {
    pub fn new(vars: Variables) -> Self {
        Self { vars }
    }

    fn apply(&self, pump: &Pump, step: Step) -> bool {
        match step {
            Step::Raise(spec) => {
                pump.raise_instance(spec.to_instance(&self.vars));
                true
            }
            Step::Fire(spec) => {
                pump.fire_instance(spec.to_instance(&self.vars));
                true
            }
            Step::Remove(id) => {
                pump.remove(&self.vars.interpolate(&id));
                true
            }
            Step::Add(cfg) => pump.add_config(cfg).is_some(),
            Step::Set { name, value } if value.is_null() => {
                self.vars.remove(&name);
                true
            }
            Step::Set { name, value } => {
                self.vars.set(&name, value);
                true
            }
            Step::Message(MessageSpec::Text(text)) => {
                pump.put_message(MessageLevel::Info, &self.vars.interpolate(&text));
                true
            }
            Step::Message(MessageSpec::Full { level, text }) => {
                let level = level.unwrap_or(MessageLevel::Info);
                pump.put_message(level, &self.vars.interpolate(&text));
                true
            }
        }
    }
}

impl ActionExecutor for ScriptExecutor {
    fn run(&self, pump: &Pump, payload: &Payload, instance: &EventInstance) -> bool {
        let Some(steps) = payload.get("do") else {
            return true;
        };
        let Some(steps) = steps.as_array() else {
            warn!(name = %instance.name, "Event handler 'do' must be an array");
            return false;
        };

        let mut ok = true;
        for raw in steps {
            match serde_json::from_value::<Step>(raw.clone()) {
                Ok(step) => {
                    trace!(name = %instance.name, step = ?step, "Running script step");
                    ok &= self.apply(pump, step);
                }
                Err(e) => {
                    warn!(name = %instance.name, step = %raw, error = %e, "Skipping malformed script step");
                    ok = false;
                }
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scripted() -> (Pump, Variables) {
        let vars = Variables::new();
        let pump = Pump::builder()
            .with_executor(ScriptExecutor::new(vars.clone()))
            .build();
        (pump, vars)
    }

    #[test]
    fn test_steps_parse_from_both_shapes() {
        let step: Step = serde_json::from_value(json!({"raise": "turn 2"})).unwrap();
        assert_eq!(step, Step::Raise(EventSpec::Name("turn 2".into())));

        let step: Step =
            serde_json::from_value(json!({"fire": {"name": "moveto", "x": 1, "y": 2}})).unwrap();
        let Step::Fire(spec) = step else {
            panic!("expected a fire step");
        };
        assert_eq!(spec.name(), "moveto");
        assert_eq!(
            spec.to_instance(&Variables::new()).subject1.location(),
            Some(crate::model::instance::Location::new(1, 2))
        );
    }

    #[test]
    fn test_set_then_message_interpolates() {
        let (pump, vars) = scripted();
        pump.add(
            &["start"],
            "",
            json!({"do": [
                {"set": {"name": "who", "value": "Delfador"}},
                {"message": {"level": "warning", "text": "$who arrives"}}
            ]}),
            false,
        );

        pump.fire_named("start");
        assert_eq!(vars.get_text("who"), "Delfador");
    }

    #[test]
    fn test_set_null_unsets_variable() {
        let (pump, vars) = scripted();
        vars.set("who", json!("Konrad"));
        pump.add(
            &["start"],
            "",
            json!({"do": [{"set": {"name": "who", "value": null}}]}),
            false,
        );

        pump.fire_named("start");
        assert!(vars.get("who").is_none());
        assert!(vars.is_empty());
    }

    #[test]
    fn test_add_and_remove_steps_change_the_registry() {
        let (pump, _vars) = scripted();
        pump.add(
            &["start"],
            "",
            json!({"do": [
                {"add": {"name": "victory", "id": "win"}},
                {"remove": "lose"}
            ]}),
            false,
        );
        pump.add(&["defeat"], "lose", json!({}), false);

        pump.fire_named("start");
        assert!(pump.get_by_id("win").is_some());
        assert!(pump.get_by_id("lose").is_none());
    }

    #[test]
    fn test_malformed_step_is_skipped_and_reported() {
        let (pump, _vars) = scripted();
        let ok = ScriptExecutor::new(Variables::new()).run(
            &pump,
            &json!({"do": [{"explode": true}, {"set": {"name": "a", "value": 1}}]}),
            &EventInstance::named("x"),
        );
        assert!(!ok);
    }
}
