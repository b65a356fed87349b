//! Engine configuration
//!
//! Configuration is passed explicitly to the components that need it; there is
//! no global engine state.

use crate::forsering::AccelerationPolicy;
use crate::preclusion::PreclusionConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the adjudication engine
///
/// # Examples
///
/// ```
/// use koe_domain::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.preclusion.undue_delay_days, 14);
/// assert_eq!(config.acceleration.max_percent_of_contract, None);
///
/// let config = EngineConfig::strict();
/// assert_eq!(config.preclusion.undue_delay_days, 7);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline thresholds for timeliness verdicts
    #[serde(default)]
    pub preclusion: PreclusionConfig,

    /// Cap on the acceleration cost ceiling
    #[serde(default)]
    pub acceleration: AccelerationPolicy,
}

impl EngineConfig {
    /// Short deadlines
    pub fn strict() -> Self {
        Self {
            preclusion: PreclusionConfig::strict(),
            ..Default::default()
        }
    }

    /// Long deadlines
    pub fn lenient() -> Self {
        Self {
            preclusion: PreclusionConfig::lenient(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(EngineConfig::default().preclusion.undue_delay_days, 14);
        assert_eq!(EngineConfig::strict().preclusion.force_majeure_days, 7);
        assert_eq!(EngineConfig::lenient().preclusion.undue_delay_days, 21);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [preclusion]
            undue_delay_days = 10

            [acceleration]
            max_percent_of_contract = 15.0
            "#,
        )
        .unwrap();
        assert_eq!(config.preclusion.undue_delay_days, 10);
        assert_eq!(config.preclusion.force_majeure_days, 14);
        assert_eq!(config.acceleration.max_percent_of_contract, Some(15.0));

        let empty: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(empty, EngineConfig::default());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = EngineConfig::lenient();
        let text = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
