use crate::grid::{GridParams, HighlightParams};
use crate::interaction::InteractionParams;
use crate::plan::PlanParams;
use crate::schedule::SchedulePolicy;
use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_PATH_VAR: &str = "H3GLOBE_CONFIG";
pub const SCHEDULE_VAR: &str = "H3GLOBE_SCHEDULE";

const DEFAULT_DEBOUNCE_MS: u64 = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub plan: PlanParams,
    pub grid: GridParams,
    pub highlight: HighlightParams,
    pub interaction: InteractionParams,
    pub schedule: SchedulePolicy,
    /// Whether the grid overlay starts switched on.
    pub layer_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plan: PlanParams::default(),
            grid: GridParams::default(),
            highlight: HighlightParams::default(),
            interaction: InteractionParams::default(),
            schedule: SchedulePolicy::default(),
            layer_enabled: true,
        }
    }
}

impl Config {
    /// Defaults, overlaid with the JSON file named by `H3GLOBE_CONFIG` and
    /// the schedule named by `H3GLOBE_SCHEDULE`, when those are set.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Ok(schedule) = std::env::var(SCHEDULE_VAR) {
            config.apply_schedule_override(&schedule)?;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn apply_schedule_override(&mut self, value: &str) -> Result<()> {
        self.schedule = match value.trim().to_ascii_lowercase().as_str() {
            "continuous" => SchedulePolicy::Continuous,
            "debounced" => SchedulePolicy::Debounced {
                delay_ms: DEFAULT_DEBOUNCE_MS,
            },
            other => bail!("unknown schedule {other:?}, expected continuous or debounced"),
        };
        Ok(())
    }
}
