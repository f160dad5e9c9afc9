//! `fieldpose-vision` – turns two unreliable cameras into at most one pose
//! correction per control cycle.
//!
//! # Modules
//!
//! - [`config`] – [`VisionConfig`]: thresholds, estimator mode, fusion
//!   alignment and the enable flag.
//! - [`gates`] – the [`EstimateGate`] trait, built-in gates and the
//!   short-circuiting [`GateLadder`].
//! - [`fusion`] – inverse-variance fusion of two same-cycle estimates.
//! - [`layout`] – [`FieldLayout`] provider and the JSON-backed [`TagLayout`].
//! - [`transport`] – the [`VisionSource`] seam and fault containment.
//! - [`sim`] – [`ScriptedVisionSource`] for tests and simulation.
//! - [`pipeline`] – [`VisionPipeline`], which runs all of the above once per
//!   cycle and reports the result as a [`CycleReport`].

pub mod config;
pub mod fusion;
pub mod gates;
pub mod layout;
pub mod pipeline;
pub mod sim;
pub mod transport;

pub use config::{EstimatorMode, FusionAlignment, StdDevIndices, VisionConfig};
pub use fusion::fuse_estimates;
pub use gates::{EstimateGate, GateInput, GateLadder, Rejection};
pub use layout::{FieldLayout, TagEntry, TagLayout};
pub use pipeline::{CameraOutcome, CycleReport, EstimatePath, VisionPipeline};
pub use sim::ScriptedVisionSource;
pub use transport::{VisionSource, read_inputs};
