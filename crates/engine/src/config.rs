use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Longest bounded wait a frame may spend on the GPU.
pub const MAX_GPU_WAIT_BUDGET_MS: u64 = 10_000;

/// Engine tuning knobs. Every field has a default so a config file only needs
/// to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on the frame delta in seconds.
    pub max_frame_dt: f32,
    /// How long a system may block on an outstanding GPU submission before
    /// it skips its work for the frame.
    pub gpu_wait_budget_ms: u64,
    /// Sample count at which accumulation reports convergence.
    pub target_samples: u32,
    /// Keep tracing after convergence.
    pub keep_accumulating: bool,
    /// Frames per stats window (title update and debug log).
    pub frame_stats_window: usize,
    /// Most recent diagnostics kept in memory.
    pub diagnostics_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frame_dt: 0.1,
            gpu_wait_budget_ms: 4,
            target_samples: 256,
            keep_accumulating: false,
            frame_stats_window: 120,
            diagnostics_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_dt.is_nan() || self.max_frame_dt <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_frame_dt must be positive, got {}",
                self.max_frame_dt
            )));
        }
        if self.gpu_wait_budget_ms > MAX_GPU_WAIT_BUDGET_MS {
            return Err(ConfigError::Invalid(format!(
                "gpu_wait_budget_ms must be at most {MAX_GPU_WAIT_BUDGET_MS}, got {}",
                self.gpu_wait_budget_ms
            )));
        }
        if self.target_samples == 0 {
            return Err(ConfigError::Invalid("target_samples must be at least 1".into()));
        }
        Ok(())
    }

    pub fn gpu_wait_budget(&self) -> Duration {
        Duration::from_millis(self.gpu_wait_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "target_samples": 64 }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.target_samples, 64);
        assert_eq!(config.max_frame_dt, 0.1);
        assert_eq!(config.gpu_wait_budget(), Duration::from_millis(4));
    }

    #[test]
    fn rejects_zero_dt_clamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "max_frame_dt": 0.0 }"#).unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_unbounded_wait_budget() {
        let config = EngineConfig {
            gpu_wait_budget_ms: u64::MAX,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig {
            gpu_wait_budget_ms: MAX_GPU_WAIT_BUDGET_MS,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
