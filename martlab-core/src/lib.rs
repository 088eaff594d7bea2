//! MartLab Core — Monte Carlo engine for martingale position sizing.
//!
//! This crate contains the simulation engine:
//! - Return generators (Bernoulli, uniform, recorded sequences)
//! - Per-trial position state with cooldown
//! - Game policies: one parameterized trial state machine plus the cooldown pool
//! - Simulation driver with sequential and seeded parallel runs
//! - Performance calculator for balance series
//!
//! No I/O happens here. Progress is reported through a caller-supplied
//! [`observer::TrialObserver`].

pub mod driver;
pub mod generator;
pub mod observer;
pub mod performance;
pub mod policy;
pub mod position;
pub mod rng;

pub use driver::{SimError, Simulation, SimulationConfig, SimulationReport, SimulationRun};
pub use generator::{ReturnGenerator, ReturnModel, SampleError};
pub use observer::{NullObserver, TracingObserver, TrialObserver};
pub use performance::{summarize, PerformanceSummary, ReturnMode};
pub use policy::{ConfigError, Policy, PolicyConfig, RebornMode, StepOutcome, Trigger, TrialError};
pub use position::{PositionError, PositionState, ReawakenRule, Tick};
