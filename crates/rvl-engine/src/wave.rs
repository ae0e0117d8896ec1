//! Wave animation configuration.
//!
//! Waves are opaque to the host beyond their fields; the engine renders them.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Maximum number of waves an engine renders at once.
pub const MAX_WAVES: usize = 4;

/// Time period used when a request leaves it out.
pub const DEFAULT_TIME_PERIOD: u32 = 255;

/// Distance period used when a request leaves it out.
pub const DEFAULT_DISTANCE_PERIOD: u32 = 32;

/// One animation primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Wave {
    /// Brightness oscillating over time at a fixed color.
    Pulsing { hue: u8, saturation: u8, speed: u8 },
    /// Constant color.
    SolidColor { hue: u8, saturation: u8, value: u8 },
}

impl Wave {
    pub fn pulsing(hue: u8, saturation: u8, speed: u8) -> Self {
        Wave::Pulsing {
            hue,
            saturation,
            speed,
        }
    }

    pub fn solid_color(hue: u8, saturation: u8, value: u8) -> Self {
        Wave::SolidColor {
            hue,
            saturation,
            value,
        }
    }
}

/// A wave configuration as submitted by a caller. Periods are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveParametersRequest {
    pub waves: Vec<Wave>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_period: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_period: Option<u32>,
}

impl WaveParametersRequest {
    pub fn new(waves: Vec<Wave>) -> Self {
        Self {
            waves,
            ..Self::default()
        }
    }

    pub fn with_time_period(mut self, time_period: u32) -> Self {
        self.time_period = Some(time_period);
        self
    }

    pub fn with_distance_period(mut self, distance_period: u32) -> Self {
        self.distance_period = Some(distance_period);
        self
    }

    /// Validate the wave count and fill in missing periods.
    pub fn resolve(self) -> Result<WaveParameters> {
        let params = WaveParameters {
            waves: self.waves,
            time_period: self.time_period.unwrap_or(DEFAULT_TIME_PERIOD),
            distance_period: self.distance_period.unwrap_or(DEFAULT_DISTANCE_PERIOD),
        };
        params.validate()?;
        Ok(params)
    }
}

/// A fully resolved wave configuration, as handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveParameters {
    pub waves: Vec<Wave>,
    pub time_period: u32,
    pub distance_period: u32,
}

impl WaveParameters {
    /// Check the `waves.len() <= MAX_WAVES` invariant.
    pub fn validate(&self) -> Result<()> {
        if self.waves.len() > MAX_WAVES {
            return Err(EngineError::TooManyWaves {
                count: self.waves.len(),
                max: MAX_WAVES,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_periods_get_their_own_defaults() {
        let params = WaveParametersRequest::new(vec![Wave::pulsing(0, 255, 1)])
            .resolve()
            .unwrap();
        assert_eq!(params.time_period, DEFAULT_TIME_PERIOD);
        assert_eq!(params.distance_period, DEFAULT_DISTANCE_PERIOD);
    }

    #[test]
    fn missing_distance_period_leaves_time_period_alone() {
        let params = WaveParametersRequest::new(vec![])
            .with_time_period(100)
            .resolve()
            .unwrap();
        assert_eq!(params.time_period, 100);
        assert_eq!(params.distance_period, 32);
    }

    #[test]
    fn explicit_periods_kept() {
        let params = WaveParametersRequest::new(vec![Wave::solid_color(180, 255, 255)])
            .with_time_period(10)
            .with_distance_period(20)
            .resolve()
            .unwrap();
        assert_eq!((params.time_period, params.distance_period), (10, 20));
    }

    #[test]
    fn more_than_four_waves_rejected() {
        let waves = vec![Wave::pulsing(0, 0, 0); MAX_WAVES + 1];
        let err = WaveParametersRequest::new(waves).resolve().unwrap_err();
        assert!(matches!(err, EngineError::TooManyWaves { count: 5, max: 4 }));
        assert_eq!(err.to_string(), "only 4 waves max are supported (got 5)");
    }

    #[test]
    fn request_json_shape() {
        let request: WaveParametersRequest = serde_json::from_str(
            r#"{"waves":[{"type":"pulsing","hue":0,"saturation":255,"speed":1},
                         {"type":"solidColor","hue":180,"saturation":255,"value":255}],
                "timePeriod":64}"#,
        )
        .unwrap();

        assert_eq!(
            request.waves,
            vec![Wave::pulsing(0, 255, 1), Wave::solid_color(180, 255, 255)]
        );
        assert_eq!(request.time_period, Some(64));
        assert_eq!(request.distance_period, None);
    }
}
