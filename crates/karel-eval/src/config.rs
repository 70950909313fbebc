//! Execution configuration and the lesson speed presets.
//!
//! Every field defaults, so a config document only needs to name what it
//! changes:
//!
//! ```
//! let config = karel_eval::ExecutionConfig::from_json(r#"{"step_delay_ms": 0}"#).unwrap();
//! assert_eq!(config.step_delay_ms, 0);
//! assert_eq!(config.max_call_depth, 1000);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::EvalResult;

/// Limits and pacing for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Delay between ticks in continuous mode. `0` runs instantly.
    pub step_delay_ms: u64,
    /// Instructions one tick may execute before reaching a robot command.
    pub gas_per_tick: u64,
    /// Cap on robot commands per run. `None` means unbounded.
    pub max_steps: Option<u64>,
    /// Deepest allowed nesting of user function calls.
    pub max_call_depth: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: Speed::Normal.delay_ms(),
            gas_per_tick: 100_000,
            max_steps: Some(10_000),
            max_call_depth: 1_000,
        }
    }
}

impl ExecutionConfig {
    /// Parse a JSON config document; absent fields keep their defaults.
    pub fn from_json(json: &str) -> EvalResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        tracing::debug!(?config, "loaded execution config");
        Ok(config)
    }

    /// The same limits at a different speed.
    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.step_delay_ms = speed.delay_ms();
        self
    }
}

/// The six positions of the lesson speed slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    Instant,
    VeryFast,
    Fast,
    Normal,
    Slow,
    VerySlow,
}

impl Speed {
    /// Slider order, position 0 first.
    pub const ALL: [Speed; 6] = [
        Speed::Instant,
        Speed::VeryFast,
        Speed::Fast,
        Speed::Normal,
        Speed::Slow,
        Speed::VerySlow,
    ];

    pub fn delay_ms(self) -> u64 {
        match self {
            Speed::Instant => 0,
            Speed::VeryFast => 50,
            Speed::Fast => 150,
            Speed::Normal => 300,
            Speed::Slow => 600,
            Speed::VerySlow => 1000,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Speed::Instant => "Instant",
            Speed::VeryFast => "Very Fast",
            Speed::Fast => "Fast",
            Speed::Normal => "Normal",
            Speed::Slow => "Slow",
            Speed::VerySlow => "Very Slow",
        }
    }

    /// The preset at a slider position, `None` past the last one.
    pub fn from_slider(position: u8) -> Option<Speed> {
        Speed::ALL.get(usize::from(position)).copied()
    }
}

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}ms)", self.label(), self.delay_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_normal_speed() {
        let config = ExecutionConfig::default();
        assert_eq!(config.step_delay_ms, 300);
        assert_eq!(config.gas_per_tick, 100_000);
        assert_eq!(config.max_steps, Some(10_000));
    }

    #[test]
    fn test_slider_positions() {
        let delays: Vec<u64> = (0..6)
            .map(|i| Speed::from_slider(i).unwrap().delay_ms())
            .collect();
        assert_eq!(delays, vec![0, 50, 150, 300, 600, 1000]);
        assert_eq!(Speed::from_slider(6), None);
        assert_eq!(Speed::VeryFast.to_string(), "Very Fast (50ms)");
    }

    #[test]
    fn test_partial_json() {
        let config = ExecutionConfig::from_json(r#"{"max_steps": null, "gas_per_tick": 10}"#)
            .unwrap();
        assert_eq!(config.max_steps, None);
        assert_eq!(config.gas_per_tick, 10);
        assert_eq!(config.step_delay_ms, 300);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = ExecutionConfig::from_json("{\"step_delay_ms\": \"fast\"}").unwrap_err();
        assert!(matches!(err, crate::EvalError::Config(_)));
    }
}
