//! Daemon configuration – reads `~/.grasp/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use grasp_types::{GraspError, JointSet, Thresholds};
use serde::{Deserialize, Serialize};

/// Persisted controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Gripper joint names, in target order.
    #[serde(default = "default_joints")]
    pub joints: Vec<String>,

    #[serde(default = "default_goal_tolerance")]
    pub goal_tolerance: f32,

    #[serde(default = "default_no_move_tolerance")]
    pub no_move_tolerance: f32,

    #[serde(default = "default_check_rate_hz")]
    pub check_rate_hz: f32,

    /// Stall window in ticks.  Defaults to one second at `check_rate_hz`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_ticks: Option<u32>,

    #[serde(default = "default_max_sensor_errors")]
    pub max_sensor_errors: u32,

    #[serde(default = "default_publish_rate_hz")]
    pub publish_rate_hz: f32,

    #[serde(default = "default_sample_timeout_ms")]
    pub sample_timeout_ms: u64,

    #[serde(default)]
    pub sim: SimConfig,
}

/// Settings for the simulated gripper run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Largest joint motion per actuator publish, in radians.
    #[serde(default = "default_step_rad")]
    pub step_rad: f32,

    /// Goal submitted on startup, one angle per joint.
    #[serde(default = "default_target")]
    pub target: Vec<f32>,

    /// Cancel the goal if it has not finished after this many seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Joint name → angle at which a simulated object blocks the joint.
    #[serde(default)]
    pub contact_limits: BTreeMap<String, f32>,
}

fn default_joints() -> Vec<String> {
    vec!["finger_left_joint".to_string(), "finger_right_joint".to_string()]
}
fn default_goal_tolerance() -> f32 {
    0.02
}
fn default_no_move_tolerance() -> f32 {
    0.002
}
fn default_check_rate_hz() -> f32 {
    10.0
}
fn default_max_sensor_errors() -> u32 {
    Thresholds::DEFAULT_MAX_SENSOR_ERRORS
}
fn default_publish_rate_hz() -> f32 {
    Thresholds::DEFAULT_PUBLISH_RATE_HZ
}
fn default_sample_timeout_ms() -> u64 {
    Thresholds::DEFAULT_SAMPLE_TIMEOUT_MS
}
fn default_step_rad() -> f32 {
    0.02
}
fn default_target() -> Vec<f32> {
    vec![0.8, 0.8]
}
fn default_deadline_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            joints: default_joints(),
            goal_tolerance: default_goal_tolerance(),
            no_move_tolerance: default_no_move_tolerance(),
            check_rate_hz: default_check_rate_hz(),
            stall_ticks: None,
            max_sensor_errors: default_max_sensor_errors(),
            publish_rate_hz: default_publish_rate_hz(),
            sample_timeout_ms: default_sample_timeout_ms(),
            sim: SimConfig::default(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            step_rad: default_step_rad(),
            target: default_target(),
            deadline_secs: default_deadline_secs(),
            contact_limits: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn joint_set(&self) -> Result<JointSet, GraspError> {
        JointSet::new(self.joints.iter().cloned())
    }

    /// Validated controller thresholds.
    pub fn thresholds(&self) -> Result<Thresholds, GraspError> {
        let mut thresholds =
            Thresholds::new(self.goal_tolerance, self.no_move_tolerance, self.check_rate_hz)
                .with_max_sensor_errors(self.max_sensor_errors)
                .with_publish_rate(self.publish_rate_hz)
                .with_sample_timeout(Duration::from_millis(self.sample_timeout_ms));
        if let Some(ticks) = self.stall_ticks {
            thresholds = thresholds.with_stall_ticks(ticks);
        }
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Contact limits as `(joint index, limit)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`GraspError::InvalidConfig`] for a limit on an unknown joint.
    pub fn contacts(&self, joints: &JointSet) -> Result<Vec<(usize, f32)>, GraspError> {
        self.sim
            .contact_limits
            .iter()
            .map(|(name, &limit)| {
                joints
                    .index_of(name)
                    .map(|index| (index, limit))
                    .ok_or_else(|| {
                        GraspError::InvalidConfig(format!("contact limit for unknown joint '{name}'"))
                    })
            })
            .collect()
    }
}

/// Return the path to `~/.grasp/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".grasp").join("config.toml")
}

/// Load the config from `path` and apply environment overrides.
pub fn load(path: &Path) -> Result<Config, String> {
    let mut cfg = load_from(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Like [`load`], but an unreadable or malformed file falls back to the
/// defaults.  Environment overrides apply either way; the load error is
/// returned alongside for reporting.
pub fn load_or_default(path: &Path) -> (Config, Option<String>) {
    let (mut cfg, error) = match load_from(path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (Config::default(), Some(e)),
    };
    apply_env_overrides(&mut cfg);
    (cfg, error)
}

/// Read the config file at `path`, falling back to defaults when it does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `GRASP_*` environment variable overrides to `cfg`.  Values that do
/// not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `GRASP_JOINTS` | `joints` (comma separated) |
/// | `GRASP_GOAL_TOLERANCE` | `goal_tolerance` |
/// | `GRASP_NO_MOVE_TOLERANCE` | `no_move_tolerance` |
/// | `GRASP_CHECK_RATE_HZ` | `check_rate_hz` |
/// | `GRASP_STALL_TICKS` | `stall_ticks` |
/// | `GRASP_MAX_SENSOR_ERRORS` | `max_sensor_errors` |
/// | `GRASP_PUBLISH_RATE_HZ` | `publish_rate_hz` |
/// | `GRASP_SAMPLE_TIMEOUT_MS` | `sample_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("GRASP_JOINTS") {
        let joints: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !joints.is_empty() {
            cfg.joints = joints;
        }
    }
    override_parsed("GRASP_GOAL_TOLERANCE", &mut cfg.goal_tolerance);
    override_parsed("GRASP_NO_MOVE_TOLERANCE", &mut cfg.no_move_tolerance);
    override_parsed("GRASP_CHECK_RATE_HZ", &mut cfg.check_rate_hz);
    if let Ok(v) = std::env::var("GRASP_STALL_TICKS")
        && let Ok(ticks) = v.parse::<u32>()
    {
        cfg.stall_ticks = Some(ticks);
    }
    override_parsed("GRASP_MAX_SENSOR_ERRORS", &mut cfg.max_sensor_errors);
    override_parsed("GRASP_PUBLISH_RATE_HZ", &mut cfg.publish_rate_hz);
    override_parsed("GRASP_SAMPLE_TIMEOUT_MS", &mut cfg.sample_timeout_ms);
}

fn override_parsed<T: std::str::FromStr>(var: &str, field: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(parsed) = v.trim().parse::<T>()
    {
        *field = parsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(raw: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, raw).expect("write");
        (dir, path)
    }

    #[test]
    fn config_path_points_to_grasp_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.grasp/config.toml"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let cfg = load_from(&path).expect("load");
        assert_eq!(cfg.joints, default_joints());
        assert_eq!(cfg.sim.target, vec![0.8, 0.8]);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let (_dir, path) = write_config(
            r#"
joints = ["a", "b", "c"]
goal_tolerance = 0.05
stall_ticks = 4

[sim]
target = [0.1, 0.2, 0.3]

[sim.contact_limits]
b = 0.15
"#,
        );
        let cfg = load_from(&path).expect("load");
        assert_eq!(cfg.joints, vec!["a", "b", "c"]);
        assert_eq!(cfg.stall_ticks, Some(4));
        assert_eq!(cfg.check_rate_hz, 10.0);
        assert_eq!(cfg.sim.step_rad, 0.02);
        assert_eq!(cfg.sim.deadline_secs, 10);

        let joints = cfg.joint_set().expect("joints");
        assert_eq!(cfg.contacts(&joints).expect("contacts"), vec![(1, 0.15)]);

        let thresholds = cfg.thresholds().expect("thresholds");
        assert_eq!(thresholds.stall_ticks, 4);
        assert_eq!(thresholds.goal_tolerance, 0.05);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let (_dir, path) = write_config("goal_tolerance = \"wide\"");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn stall_window_defaults_to_one_second() {
        let cfg = Config {
            check_rate_hz: 25.0,
            ..Config::default()
        };
        assert_eq!(cfg.thresholds().expect("thresholds").stall_ticks, 25);
    }

    #[test]
    fn invalid_rate_fails_validation() {
        let cfg = Config {
            check_rate_hz: 0.0,
            ..Config::default()
        };
        assert!(matches!(cfg.thresholds(), Err(GraspError::InvalidConfig(_))));
    }

    #[test]
    fn contact_on_unknown_joint_is_rejected() {
        let mut cfg = Config::default();
        cfg.sim.contact_limits.insert("thumb".to_string(), 0.2);
        let joints = cfg.joint_set().expect("joints");
        assert!(cfg.contacts(&joints).is_err());
    }

    #[test]
    fn duplicate_joints_are_rejected() {
        let cfg = Config {
            joints: vec!["a".to_string(), "a".to_string()],
            ..Config::default()
        };
        assert!(cfg.joint_set().is_err());
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        // SAFETY: these variables are only touched by this test.
        unsafe {
            std::env::set_var("GRASP_JOINTS", "x, y");
            std::env::set_var("GRASP_STALL_TICKS", "7");
            std::env::set_var("GRASP_CHECK_RATE_HZ", "fast");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("GRASP_JOINTS");
            std::env::remove_var("GRASP_STALL_TICKS");
            std::env::remove_var("GRASP_CHECK_RATE_HZ");
        }
        assert_eq!(cfg.joints, vec!["x", "y"]);
        assert_eq!(cfg.stall_ticks, Some(7));
        assert_eq!(cfg.check_rate_hz, default_check_rate_hz());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults_with_env_overrides() {
        let (_dir, path) = write_config("joints = 42");
        // SAFETY: this variable is only touched by this test.
        unsafe { std::env::set_var("GRASP_MAX_SENSOR_ERRORS", "9") };
        let (cfg, error) = load_or_default(&path);
        unsafe { std::env::remove_var("GRASP_MAX_SENSOR_ERRORS") };

        assert!(error.is_some());
        assert_eq!(cfg.max_sensor_errors, 9);
        assert_eq!(cfg.sim, SimConfig::default());
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let mut cfg = Config::default();
        cfg.sim.contact_limits.insert("finger_left_joint".to_string(), 0.4);
        let raw = toml::to_string_pretty(&cfg).expect("serialize");
        let back: Config = toml::from_str(&raw).expect("parse");
        assert_eq!(back, cfg);
    }
}
