mod cli;
mod context;
mod definition;
mod executor;
mod harness;
mod init;
mod monitor;
mod pool;
mod progress;
mod run;
mod shutdown;
mod stage;
mod threshold;
mod types;

pub mod prelude {
    pub use crate::cli::ScenarioCli;
    pub use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
    pub use crate::definition::{
        GlobalHook, GlobalHookMut, HookResult, ScenarioDefinition, ScenarioDefinitionBuilder,
        VuHookMut,
    };
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::{run, RunOutcome, THRESHOLD_BREACH_EXIT_CODE};
    pub use crate::stage::{LoadProfile, RampPolicy, Stage, StopPolicy};
    pub use crate::threshold::{evaluate_thresholds, Aggregation, Comparison, Threshold, ThresholdVerdict};
    pub use crate::types::StampedeResult;

    pub use stampede_core::prelude::*;
    pub use stampede_instruments::{named, Check, Reporter, RunMetrics};
}
