//! src/lib.rs
//! ============================================================================
//! Single-threaded, re-entrant event pump.
//!
//! Handlers register under named topics; raised events queue up and are
//! drained against the registry. Handler bodies may raise, fire, add and
//! remove handlers while a dispatch is in progress.

pub mod error;
pub use error::{PumpError, PumpResult};

pub mod config;
pub use config::{EngineConfig, PersistFormat, PersistenceConfig, PumpConfig};

pub mod logging;
pub use logging::{LoggerBuilder, LoggerConfig};

pub mod persistence;
pub use persistence::{EventStore, PersistedHandler};

pub mod model {
    pub mod handler;
    pub use handler::{Handler, HandlerName, HandlerRef, Payload, WeakHandler, standardize_name};

    pub mod instance;
    pub use instance::{EventInstance, Location, SubjectRef};
}

pub mod controller {
    pub mod traits;
    pub use traits::{
        AcceptAll, ActionExecutor, EventHooks, FilterEvaluator, NameInterpolator, NoHooks,
        NoopExecutor, OutputSurface, VerbatimNames,
    };

    pub mod context;
    pub use context::{ContextStack, DispatchContext, DispatchScope};

    pub mod messages;
    pub use messages::{BufferedMessage, MessageLevel};

    pub mod registry;
    pub use registry::HandlerRegistry;

    pub mod pump;
    pub use pump::{Pump, PumpBuilder};
}

pub mod host {
    pub mod filter;
    pub use filter::SubjectFilter;

    pub mod output;
    pub use output::HeadlessOutput;

    pub mod scenario;
    pub use scenario::Scenario;

    pub mod script;
    pub use script::{EventSpec, ScriptExecutor};

    pub mod variables;
    pub use variables::{VariableInterpolator, Variables};
}

#[cfg(test)]
mod test_support;

pub use controller::{MessageLevel, Pump, PumpBuilder};
pub use model::{EventInstance, Payload, SubjectRef};
