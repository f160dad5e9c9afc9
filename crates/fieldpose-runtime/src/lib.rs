//! `fieldpose-runtime` – process plumbing around the pose ledger.
//!
//! # Modules
//!
//! - [`config`] – [`FieldPoseConfig`], the TOML vault at
//!   `~/.fieldpose/config.toml` with `FIELDPOSE_*` environment overrides.
//! - [`drive`] – the [`DriveSource`] seam and the constant-velocity
//!   [`SimDriveSource`].
//! - [`control_loop`] – [`ControlLoop`], the fixed-cadence tick that records
//!   drive data and runs the vision pipeline.
//! - [`telemetry`] – [`init_tracing`]: `tracing-subscriber` setup with
//!   optional OTLP span export.

pub mod config;
pub mod control_loop;
pub mod drive;
pub mod telemetry;

pub use config::FieldPoseConfig;
pub use control_loop::ControlLoop;
pub use drive::{DriveSample, DriveSource, SimDriveSource};
pub use telemetry::{TracerProviderGuard, init_tracing};
