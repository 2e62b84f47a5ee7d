use crate::{Result, StitchError};
use cv_features::OrbConfig;
use serde::{Deserialize, Serialize};

/// Tunables for one stitching call.
///
/// Every field has a default, so a partial JSON document only needs the keys
/// it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Lowe ratio: a best match survives when `best < ratio * second`.
    pub ratio: f32,
    /// Fewest filtered correspondences for which estimation is attempted.
    pub min_matches: usize,
    /// Reprojection distance (pixels) under which a correspondence is an inlier.
    pub ransac_threshold: f64,
    pub ransac_max_iterations: usize,
    pub ransac_confidence: f64,
    pub ransac_seed: u64,
    /// Width of the linear seam ramp in pixels, before clamping to the
    /// primary width.
    pub smoothing_window: u32,
    /// Side of one sampling tile in pixels.
    pub tile_size: u32,
    /// Share of each image width (percent) searched for features.
    pub sample_percentage: u32,
    pub orb: OrbConfig,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            ratio: 0.85,
            min_matches: 10,
            ransac_threshold: 5.0,
            ransac_max_iterations: 2000,
            ransac_confidence: 0.995,
            ransac_seed: 0x5EED,
            smoothing_window: 800,
            tile_size: 50,
            sample_percentage: 80,
            orb: OrbConfig::default(),
        }
    }
}

impl StitchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(invalid(format!("ratio must lie in (0, 1], got {}", self.ratio)));
        }
        if self.min_matches < 4 {
            return Err(invalid(format!(
                "min_matches must be at least 4, got {}",
                self.min_matches
            )));
        }
        if !(self.ransac_threshold.is_finite() && self.ransac_threshold > 0.0) {
            return Err(invalid(format!(
                "ransac_threshold must be positive, got {}",
                self.ransac_threshold
            )));
        }
        if self.ransac_max_iterations == 0 {
            return Err(invalid("ransac_max_iterations must be non-zero".into()));
        }
        if !(self.ransac_confidence > 0.0 && self.ransac_confidence < 1.0) {
            return Err(invalid(format!(
                "ransac_confidence must lie in (0, 1), got {}",
                self.ransac_confidence
            )));
        }
        if self.tile_size == 0 {
            return Err(invalid("tile_size must be non-zero".into()));
        }
        if self.sample_percentage == 0 || self.sample_percentage > 100 {
            return Err(invalid(format!(
                "sample_percentage must lie in (0, 100], got {}",
                self.sample_percentage
            )));
        }

        let orb = &self.orb;
        if orb.n_features == 0 || orb.n_levels == 0 {
            return Err(invalid("orb.n_features and orb.n_levels must be non-zero".into()));
        }
        if orb.patch_size < 5 {
            return Err(invalid(format!(
                "orb.patch_size must be at least 5, got {}",
                orb.patch_size
            )));
        }
        if orb.n_levels > 1 && !(orb.scale_factor > 1.0) {
            return Err(invalid(format!(
                "orb.scale_factor must exceed 1 for a pyramid, got {}",
                orb.scale_factor
            )));
        }
        Ok(())
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| invalid(format!("malformed JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| invalid(e.to_string()))
    }
}

fn invalid(msg: String) -> StitchError {
    StitchError::InvalidConfig(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StitchErrorKind;

    #[test]
    fn defaults_are_valid() {
        let config = StitchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ratio, 0.85);
        assert_eq!(config.min_matches, 10);
        assert_eq!(config.smoothing_window, 800);
        assert_eq!(config.tile_size, 50);
        assert_eq!(config.sample_percentage, 80);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases: [fn(&mut StitchConfig); 10] = [
            |c| c.ratio = 0.0,
            |c| c.ratio = 1.5,
            |c| c.min_matches = 3,
            |c| c.ransac_threshold = 0.0,
            |c| c.ransac_confidence = 1.0,
            |c| c.tile_size = 0,
            |c| c.sample_percentage = 0,
            |c| c.sample_percentage = 101,
            |c| c.orb.n_features = 0,
            |c| {
                c.orb.n_levels = 3;
                c.orb.scale_factor = 1.0;
            },
        ];

        for mutate in cases {
            let mut config = StitchConfig::default();
            mutate(&mut config);
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), StitchErrorKind::InvalidConfig);
        }
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = StitchConfig::from_json_str(r#"{ "ratio": 0.7, "orb": { "n_features": 500 } }"#)
            .unwrap();
        assert_eq!(config.ratio, 0.7);
        assert_eq!(config.orb.n_features, 500);
        assert_eq!(config.orb.fast_threshold, OrbConfig::default().fast_threshold);
        assert_eq!(config.min_matches, 10);
    }

    #[test]
    fn json_round_trip_and_errors() {
        let config = StitchConfig {
            tile_size: 32,
            ..StitchConfig::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(StitchConfig::from_json_str(&json).unwrap(), config);

        assert!(StitchConfig::from_json_str("{ not json").is_err());
        assert!(StitchConfig::from_json_str(r#"{ "tile_size": 0 }"#).is_err());
    }
}
