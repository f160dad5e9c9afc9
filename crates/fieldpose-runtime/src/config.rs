//! Configuration vault – reads/writes `~/.fieldpose/config.toml`.
//!
//! ```toml
//! retention_seconds = 1.0
//! loop_period_ms = 20
//! layout_path = "/home/lvuser/tags.json"
//!
//! [vision]
//! estimator_mode = "megatag1"
//! fusion_alignment = "raw"
//! ambiguity_threshold = 0.19
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldpose_state::LOOKBACK_TIME_SEC;
use fieldpose_types::FieldPoseError;
use fieldpose_vision::VisionConfig;
use serde::{Deserialize, Serialize};

/// Persisted runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPoseConfig {
    /// Trailing window kept by every history in the ledger.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: f64,

    /// Control-loop cadence.
    #[serde(default = "default_loop_period_ms")]
    pub loop_period_ms: u64,

    /// JSON tag layout.  Without it the gyro fallback never fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_path: Option<PathBuf>,

    #[serde(default)]
    pub vision: VisionConfig,
}

fn default_retention_seconds() -> f64 {
    LOOKBACK_TIME_SEC
}

fn default_loop_period_ms() -> u64 {
    20
}

impl Default for FieldPoseConfig {
    fn default() -> Self {
        Self {
            retention_seconds: default_retention_seconds(),
            loop_period_ms: default_loop_period_ms(),
            layout_path: None,
            vision: VisionConfig::default(),
        }
    }
}

impl FieldPoseConfig {
    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }
}

/// Return the path to `~/.fieldpose/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".fieldpose").join("config.toml")
}

/// Load the config from the default location.  `Ok(None)` when absent.
pub fn load() -> Result<Option<FieldPoseConfig>, FieldPoseError> {
    load_from(&config_path())
}

/// Load the config from `path` and apply environment overrides.
pub fn load_from(path: &Path) -> Result<Option<FieldPoseConfig>, FieldPoseError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        FieldPoseError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut cfg: FieldPoseConfig = toml::from_str(&raw)
        .map_err(|e| FieldPoseError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `FIELDPOSE_*` environment overrides.  Unparseable values are
/// ignored.
///
/// | Variable | Field |
/// |---|---|
/// | `FIELDPOSE_RETENTION_SECONDS` | `retention_seconds` |
/// | `FIELDPOSE_LOOP_PERIOD_MS` | `loop_period_ms` |
/// | `FIELDPOSE_VISION_ENABLED` | `vision.enabled` |
/// | `FIELDPOSE_LAYOUT_PATH` | `layout_path` |
pub fn apply_env_overrides(cfg: &mut FieldPoseConfig) {
    if let Ok(v) = std::env::var("FIELDPOSE_RETENTION_SECONDS")
        && let Ok(seconds) = v.parse::<f64>()
        && seconds.is_finite()
        && seconds > 0.0
    {
        cfg.retention_seconds = seconds;
    }
    if let Ok(v) = std::env::var("FIELDPOSE_LOOP_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
        && ms > 0
    {
        cfg.loop_period_ms = ms;
    }
    if let Ok(v) = std::env::var("FIELDPOSE_VISION_ENABLED")
        && let Ok(enabled) = v.parse::<bool>()
    {
        cfg.vision.enabled = enabled;
    }
    if let Ok(v) = std::env::var("FIELDPOSE_LAYOUT_PATH")
        && !v.is_empty()
    {
        cfg.layout_path = Some(PathBuf::from(v));
    }
}

/// Save to the default location, creating `~/.fieldpose/` if needed.
pub fn save(cfg: &FieldPoseConfig) -> Result<(), FieldPoseError> {
    save_to(cfg, &config_path())
}

/// Save to `path` with owner-only permissions on Unix.
pub fn save_to(cfg: &FieldPoseConfig, path: &Path) -> Result<(), FieldPoseError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            FieldPoseError::Config(format!("failed to create config directory: {e}"))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                FieldPoseError::Config(format!("failed to set directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| FieldPoseError::Config(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| {
                FieldPoseError::Config(format!("failed to write {}: {e}", path.display()))
            })?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| FieldPoseError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldpose_vision::{EstimatorMode, FusionAlignment};

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&FieldPoseConfig::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");

        assert_eq!(loaded.retention_seconds, 1.0);
        assert_eq!(loaded.loop_period(), Duration::from_millis(20));
        assert_eq!(loaded.vision, VisionConfig::default());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&FieldPoseConfig::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().expect("parent"))
            .expect("meta")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            concat!(
                "loop_period_ms = 10\n",
                "[vision]\n",
                "estimator_mode = \"megatag2\"\n",
                "fusion_alignment = \"project_earlier\"\n",
            ),
        )
        .expect("write");

        let cfg = load_from(&path).expect("load").expect("some");
        assert_eq!(cfg.loop_period_ms, 10);
        assert_eq!(cfg.retention_seconds, 1.0);
        assert_eq!(cfg.vision.estimator_mode, EstimatorMode::Megatag2);
        assert_eq!(cfg.vision.fusion_alignment, FusionAlignment::ProjectEarlier);
        assert_eq!(cfg.vision.ambiguity_threshold, 0.19);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "loop_period_ms = \"fast\"").expect("write");
        assert!(matches!(load_from(&path), Err(FieldPoseError::Config(_))));
    }

    #[test]
    fn config_path_points_to_fieldpose_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".fieldpose"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    // Env-var tests share one function so they cannot race each other.
    #[test]
    fn apply_env_overrides_variants() {
        // SAFETY: only this test touches FIELDPOSE_* variables.
        unsafe {
            std::env::set_var("FIELDPOSE_RETENTION_SECONDS", "2.5");
            std::env::set_var("FIELDPOSE_LOOP_PERIOD_MS", "not-a-number");
            std::env::set_var("FIELDPOSE_VISION_ENABLED", "false");
            std::env::set_var("FIELDPOSE_LAYOUT_PATH", "/tmp/tags.json");
        }
        let mut cfg = FieldPoseConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.retention_seconds, 2.5);
        assert_eq!(cfg.loop_period_ms, 20);
        assert!(!cfg.vision.enabled);
        assert_eq!(cfg.layout_path, Some(PathBuf::from("/tmp/tags.json")));

        unsafe { std::env::set_var("FIELDPOSE_RETENTION_SECONDS", "-1") };
        let mut cfg = FieldPoseConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.retention_seconds, 1.0);

        unsafe {
            std::env::remove_var("FIELDPOSE_RETENTION_SECONDS");
            std::env::remove_var("FIELDPOSE_LOOP_PERIOD_MS");
            std::env::remove_var("FIELDPOSE_VISION_ENABLED");
            std::env::remove_var("FIELDPOSE_LAYOUT_PATH");
        }
    }
}
