use serde::{Deserialize, Serialize};

use crate::error::{FableError, FableResult};
use crate::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cues at or below this offset are revealed synchronously (one frame at 60 fps).
    pub media_tick_ms: f64,
    /// Poll interval of the resource collector.
    pub gc_interval_ms: f64,
    /// Upper bound on holding an instant media cue for its appearance acknowledgement.
    pub appearance_timeout_ms: f64,
    /// Delay before the first automatic advance after start.
    pub start_delay_ms: f64,
    pub auto_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            media_tick_ms: 1000.0 / 60.0,
            gc_interval_ms: 50.0,
            appearance_timeout_ms: 2000.0,
            start_delay_ms: 1000.0,
            auto_start: true,
        }
    }
}

impl EngineConfig {
    pub fn media_tick(&self) -> Duration {
        Duration::from_millis(self.media_tick_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }

    pub fn appearance_timeout(&self) -> Duration {
        Duration::from_millis(self.appearance_timeout_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Directory resource names are resolved against.
    pub root: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String, // EnvFilter directive, e.g. "info,fable_engine=debug"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FableConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FableConfig {
    pub fn load_from_file(path: &std::path::Path) -> FableResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> FableResult<Self> {
        toml::from_str(contents).map_err(|e| FableError::Config(e.to_string()))
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> FableResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| FableError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
