//! `fieldpose` – runs the pose ledger and vision pipeline against the
//! simulated drivetrain and cameras until Ctrl-C.
//!
//! ```text
//! fieldpose          run the simulation
//! fieldpose init     write the default config to ~/.fieldpose/config.toml
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use fieldpose_runtime::config::{self, FieldPoseConfig};
use fieldpose_runtime::{ControlLoop, SimDriveSource, init_tracing};
use fieldpose_state::RobotState;
use fieldpose_types::{ChassisSpeeds, Pose2d, VisionEstimate};
use fieldpose_vision::{FieldLayout, ScriptedVisionSource, TagLayout, VisionPipeline};
use tracing::{info, warn};

/// Ticks between simulated camera frames.
const SIM_FRAME_EVERY_N_TICKS: u64 = 3;

fn main() {
    let _guard = init_tracing("fieldpose");

    if std::env::args().nth(1).as_deref() == Some("init") {
        write_default_config();
        return;
    }

    print_banner();
    let cfg = load_config();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received, stopping control loop …".yellow().bold());
        shutdown_flag.store(true, Ordering::Release);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let state = Arc::new(RobotState::with_retention(
        cfg.retention_seconds,
        Box::new(|estimate: &VisionEstimate| {
            info!(
                x = estimate.pose.x,
                y = estimate.pose.y,
                heading = estimate.pose.heading,
                timestamp = estimate.timestamp_seconds,
                "pose filter received correction"
            );
        }),
    ));

    let feeder = ScriptedVisionSource::new();
    let drive = SimDriveSource::new(Pose2d::new(2.0, 2.0, 0.0), ChassisSpeeds::new(0.5, 0.0, 0.2))
        .with_drift(1.02)
        .with_vision_feed(feeder.clone(), SIM_FRAME_EVERY_N_TICKS);
    let vision = VisionPipeline::new(
        Box::new(feeder),
        Arc::clone(&state),
        load_layout(&cfg),
        cfg.vision.clone(),
    );

    let mut control =
        ControlLoop::new(Box::new(drive), vision, Arc::clone(&state), cfg.loop_period());
    let ticks = control.run(&shutdown);

    let (_, pose) = state.latest_field_pose().unwrap_or((0.0, Pose2d::identity()));
    println!();
    println!("  {} {}", "Ticks run:".bold(), ticks);
    println!(
        "  {} x={:.3} y={:.3} θ={:.3}",
        "Final odometry:".bold(),
        pose.x,
        pose.y,
        pose.heading
    );
    println!(
        "  {} {:.3}s",
        "Last vision correction:".bold(),
        state.last_accepted_vision_timestamp()
    );
    println!("{}", "  ✓ Exiting FieldPose.".green());
}

fn load_config() -> FieldPoseConfig {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {}; using defaults ({} to create one).",
                config::config_path().display(),
                "fieldpose init".bold()
            );
            let mut cfg = FieldPoseConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            FieldPoseConfig::default()
        }
    }
}

fn load_layout(cfg: &FieldPoseConfig) -> Arc<dyn FieldLayout> {
    let Some(path) = &cfg.layout_path else {
        return Arc::new(TagLayout::empty());
    };
    match TagLayout::load(path) {
        Ok(layout) => {
            info!(tags = layout.len(), path = %path.display(), "field layout loaded");
            Arc::new(layout)
        }
        Err(e) => {
            warn!(error = %e, "field layout unavailable; gyro fallback disabled");
            Arc::new(TagLayout::empty())
        }
    }
}

fn write_default_config() {
    match config::save(&FieldPoseConfig::default()) {
        Ok(()) => println!(
            "{} Config saved to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║   FieldPose · pose ledger simulator  ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!("  {} {}", "Version".bold(), env!("CARGO_PKG_VERSION"));
    println!();
}
