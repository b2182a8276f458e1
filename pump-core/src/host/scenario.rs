//! src/host/scenario.rs
//! ============================================================================
//! TOML scenario files driven by the `pump` binary.
//!
//! ```toml
//! [variables]
//! side = "north"
//!
//! [[handler]]
//! name = "turn 1"
//! id = "intro"
//! first_time_only = true
//! do = [{ message = "Turn one begins" }, { raise = "$side|_ready" }]
//!
//! [[fire]]
//! name = "turn 1"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, warn};

use crate::controller::pump::Pump;
use crate::host::script::EventSpec;
use crate::host::variables::Variables;
use crate::model::handler::Payload;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Handler config objects, registered in file order.
    pub handler: Vec<Payload>,

    pub variables: BTreeMap<String, Payload>,

    pub fire: Vec<EventSpec>,
}

impl Scenario {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Seeds `vars` and registers every handler. Returns how many handlers
    /// the pump accepted.
    pub fn install(&self, pump: &Pump, vars: &Variables) -> usize {
        for (name, value) in &self.variables {
            vars.set(name, value.clone());
        }

        let accepted = self
            .handler
            .iter()
            .filter(|cfg| pump.add_config((*cfg).clone()).is_some())
            .count();

        if accepted < self.handler.len() {
            warn!(
                accepted,
                total = self.handler.len(),
                "Some scenario handlers were rejected"
            );
        }
        info!(accepted, variables = self.variables.len(), "Scenario installed");
        accepted
    }
}
