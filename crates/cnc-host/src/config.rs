//! Machine Configuration Loader
//!
//! Parses the INI-style `machine.cfg` into strongly-typed structs: planner
//! limits from the `[planner]` section and motor scaling from `[motors]`.

use anyhow::{Context, Result};
use configparser::ini::Ini;
use motion::{PathMode, PlannerConfig, MOTORS};
use std::path::Path;

/// The entire parsed machine configuration.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub planner: PlannerConfig,
    /// Steps per millimeter for each motor channel.
    pub steps_per_mm: [f64; MOTORS],
    /// Feed rate used for rapid (non-cut) moves, mm/min.
    pub traverse_rate: f64,
}

impl MachineConfig {
    /// Loads and parses the configuration file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("failed to load configuration file: {path:?}"))?;

        let planner = PlannerConfig {
            linear_jerk_max: Self::float(&config, "planner", "linear_jerk_max")?,
            min_segment_len: Self::float(&config, "planner", "min_segment_len")?,
            min_segment_time_us: Self::float(&config, "planner", "min_segment_time_us")?,
            min_line_length: Self::float(&config, "planner", "min_line_length")?,
            path_mode: Self::path_mode(&config)?,
            ..PlannerConfig::default()
        };

        let mut steps_per_mm = [0.0; MOTORS];
        for (i, slot) in steps_per_mm.iter_mut().enumerate() {
            *slot = Self::float(&config, "motors", &format!("steps_per_mm_{}", i + 1))?;
        }

        Ok(Self {
            planner,
            steps_per_mm,
            traverse_rate: Self::float(&config, "planner", "traverse_rate")?,
        })
    }

    fn float(config: &Ini, section: &str, key: &str) -> Result<f64> {
        config
            .getfloat(section, key)
            .map_err(anyhow::Error::msg)?
            .with_context(|| format!("[{section}] {key} not found"))
    }

    fn path_mode(config: &Ini) -> Result<PathMode> {
        match config.get("planner", "path_mode").as_deref() {
            None | Some("continuous") => Ok(PathMode::Continuous),
            Some("exact_path") => Ok(PathMode::ExactPath),
            Some("exact_stop") => Ok(PathMode::ExactStop),
            Some(other) => anyhow::bail!("[planner] unknown path_mode: {other}"),
        }
    }
}
