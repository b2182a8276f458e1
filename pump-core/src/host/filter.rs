//! src/host/filter.rs
//! ============================================================================
//! Location/liveness filter over an instance's subjects.
//!
//! The payload may carry a `filter` object:
//!
//! ```json
//! { "filter": { "x": "3-5", "y": 2, "x2": 7, "y2": "1,4", "alive": true } }
//! ```
//!
//! `x`/`y` test subject 1 and `x2`/`y2` subject 2. Each coordinate accepts an
//! integer or a comma list of integers and `a-b` ranges. `alive` compares with
//! whether subject 1's entity is still reachable. Keys that are absent match.

use tracing::warn;

use crate::controller::traits::FilterEvaluator;
use crate::model::handler::Payload;
use crate::model::instance::{EventInstance, Location, SubjectRef};

#[derive(Debug, Default, Clone, Copy)]
pub struct SubjectFilter;

impl FilterEvaluator for SubjectFilter {
    fn matches(&self, payload: &Payload, instance: &EventInstance) -> bool {
        let Some(filter) = payload.get("filter") else {
            return true;
        };
        if !filter.is_object() {
            warn!(filter = %filter, "Ignoring malformed event filter");
            return true;
        }

        location_matches(filter, "x", "y", &instance.subject1)
            && location_matches(filter, "x2", "y2", &instance.subject2)
            && alive_matches(filter, &instance.subject1)
    }
}

fn location_matches(filter: &Payload, x_key: &str, y_key: &str, subject: &SubjectRef) -> bool {
    let x = filter.get(x_key);
    let y = filter.get(y_key);
    if x.is_none() && y.is_none() {
        return true;
    }

    let Some(Location { x: sx, y: sy }) = subject.location() else {
        return false;
    };

    x.is_none_or(|spec| coordinate_matches(spec, sx))
        && y.is_none_or(|spec| coordinate_matches(spec, sy))
}

fn alive_matches(filter: &Payload, subject: &SubjectRef) -> bool {
    match filter.get("alive").and_then(Payload::as_bool) {
        Some(expected) => subject.entity().is_some() == expected,
        None => true,
    }
}

fn coordinate_matches(spec: &Payload, value: i32) -> bool {
    match spec {
        Payload::Number(n) => n.as_i64() == Some(i64::from(value)),
        Payload::String(list) => list.split(',').any(|part| range_contains(part, value)),
        _ => false,
    }
}

/// `"4"` or `"2-6"`. Unparsable parts never match.
fn range_contains(part: &str, value: i32) -> bool {
    let part = part.trim();
    // A leading '-' belongs to the number, not the range.
    let split = part
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '-')
        .map(|(i, _)| i);

    match split {
        Some(i) => {
            let lo = part[..i].trim().parse::<i32>();
            let hi = part[i + 1..].trim().parse::<i32>();
            matches!((lo, hi), (Ok(lo), Ok(hi)) if lo <= value && value <= hi)
        }
        None => part.parse::<i32>() == Ok(value),
    }
}
