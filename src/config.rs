//! Workflow settings.
//!
//! Every field has a default matching the production workflow, so an empty
//! TOML file (or none at all) yields a usable configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RiskError;

/// What to do with an infiltration value below zero (upward groundwater flow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeInfiltrationPolicy {
    /// Treat as zero recharge; the row stays with zero flux.
    #[default]
    Clamp,
    /// Drop the row and record it in the filtering audit.
    Exclude,
}

/// How flux contributions from different aquifer layers reaching the same
/// segment with the same substance are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerAggregation {
    /// Add every layer's contribution.
    #[default]
    Sum,
    /// Keep only the largest layer contribution.
    Max,
}

impl LayerAggregation {
    pub fn combine(self, values: impl IntoIterator<Item = f64>) -> f64 {
        match self {
            Self::Sum => values.into_iter().sum(),
            Self::Max => values.into_iter().fold(0.0, f64::max),
        }
    }
}

/// Input file names, relative to the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputFiles {
    pub site_distances: String,
    pub site_areas: String,
    pub layer_mapping: String,
    pub infiltration: String,
    pub flows: String,
    /// Column aliases applied to every input file (source name → expected name).
    pub rename: BTreeMap<String, String>,
}

impl Default for InputFiles {
    fn default() -> Self {
        Self {
            site_distances: "site_distances.csv".to_string(),
            site_areas: "site_areas.csv".to_string(),
            layer_mapping: "layer_mapping.csv".to_string(),
            infiltration: "infiltration.csv".to_string(),
            flows: "flows.csv".to_string(),
            rename: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Universal distance threshold of the general assessment (m).
    pub risk_threshold_m: f64,

    /// Thresholds reported by the multi-threshold analysis (m).
    pub additional_thresholds_m: Vec<f64>,

    /// Infiltration above this is capped (mm/year).
    pub max_infiltration_mm_per_year: f64,

    pub negative_infiltration: NegativeInfiltrationPolicy,

    pub layer_aggregation: LayerAggregation,

    /// Flow scenarios evaluated for every segment, in output order.
    pub flow_scenarios: Vec<String>,

    /// Scenario highlighted in summaries.
    pub primary_flow_scenario: String,

    /// Re-evaluate combinations on landfill sites against landfill thresholds.
    pub apply_landfill_thresholds: bool,

    /// Flows at or below this value count as missing (m³/s).
    pub min_flow_m3_s: f64,

    pub inputs: InputFiles,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            risk_threshold_m: 500.0,
            additional_thresholds_m: vec![250.0, 500.0, 1000.0, 1500.0, 2000.0],
            max_infiltration_mm_per_year: 750.0,
            negative_infiltration: NegativeInfiltrationPolicy::Clamp,
            layer_aggregation: LayerAggregation::Sum,
            flow_scenarios: ["Q95", "Q90", "Q50", "Q10", "Q05"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            primary_flow_scenario: "Q95".to_string(),
            apply_landfill_thresholds: true,
            min_flow_m3_s: 0.0,
            inputs: InputFiles::default(),
        }
    }
}

impl WorkflowSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, RiskError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, RiskError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), RiskError> {
        if !(self.risk_threshold_m.is_finite() && self.risk_threshold_m >= 0.0) {
            return Err(RiskError::Config(format!(
                "risk_threshold_m must be a non-negative number, got {}",
                self.risk_threshold_m
            )));
        }
        if !(self.max_infiltration_mm_per_year > 0.0) {
            return Err(RiskError::Config(format!(
                "max_infiltration_mm_per_year must be positive, got {}",
                self.max_infiltration_mm_per_year
            )));
        }
        if self.flow_scenarios.is_empty() {
            return Err(RiskError::Config(
                "flow_scenarios must name at least one scenario".into(),
            ));
        }
        if !self.flow_scenarios.contains(&self.primary_flow_scenario) {
            return Err(RiskError::Config(format!(
                "primary_flow_scenario '{}' is not in flow_scenarios",
                self.primary_flow_scenario
            )));
        }
        Ok(())
    }
}
