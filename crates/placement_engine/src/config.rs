use std::collections::BTreeSet;
use std::env;

use tracing::warn;

use crate::content::TemplateCatalog;
use crate::host::LayerMask;

pub const ROTATION_STEP_ENV_VAR: &str = "PLACEMENT_ROTATION_STEP_DEG";
pub const DEFAULT_ROTATION_STEP_DEGREES: f32 = 45.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub rotation_step_degrees: f32,
    pub query_layers: LayerMask,
    /// Template ids reconciled in place on restore instead of being respawned.
    pub preplaced_template_ids: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rotation_step_degrees: DEFAULT_ROTATION_STEP_DEGREES,
            query_layers: LayerMask::PLACEMENT_BLOCKERS,
            preplaced_template_ids: BTreeSet::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_catalog(catalog: &TemplateCatalog) -> Self {
        Self {
            preplaced_template_ids: catalog.preplaced_ids(),
            ..Self::default()
        }
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.rotation_step_degrees = resolve_rotation_step(self.rotation_step_degrees);
        self
    }

    pub fn rotation_step_radians(&self) -> f32 {
        self.rotation_step_degrees.to_radians()
    }

    pub fn is_preplaced(&self, template_id: &str) -> bool {
        self.preplaced_template_ids.contains(template_id)
    }
}

fn resolve_rotation_step(config_degrees: f32) -> f32 {
    match env::var(ROTATION_STEP_ENV_VAR) {
        Ok(value) => parse_rotation_step(&value).unwrap_or_else(|| {
            warn!(
                env_var = ROTATION_STEP_ENV_VAR,
                value = value.as_str(),
                "invalid rotation step env var value; falling back to config"
            );
            config_degrees
        }),
        Err(env::VarError::NotPresent) => config_degrees,
        Err(err) => {
            warn!(
                env_var = ROTATION_STEP_ENV_VAR,
                error = %err,
                "unable to read rotation step env var; falling back to config"
            );
            config_degrees
        }
    }
}

fn parse_rotation_step(raw: &str) -> Option<f32> {
    let degrees = raw.trim().parse::<f32>().ok()?;
    (degrees.is_finite() && degrees > 0.0 && degrees <= 360.0).then_some(degrees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_step_accepts_positive_angles_only() {
        assert_eq!(parse_rotation_step(" 15 "), Some(15.0));
        assert_eq!(parse_rotation_step("90.5"), Some(90.5));
        assert_eq!(parse_rotation_step("0"), None);
        assert_eq!(parse_rotation_step("-45"), None);
        assert_eq!(parse_rotation_step("720"), None);
        assert_eq!(parse_rotation_step("NaN"), None);
        assert_eq!(parse_rotation_step("quarter"), None);
    }

    #[test]
    fn default_config_blocks_on_solid_layers() {
        let config = EngineConfig::default();
        assert_eq!(config.query_layers, LayerMask::PLACEMENT_BLOCKERS);
        assert!((config.rotation_step_radians() - std::f32::consts::FRAC_PI_4).abs() < 1.0e-6);
        assert!(!config.is_preplaced("counter"));
    }
}
