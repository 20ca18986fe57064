//! Site-level pollutant flux: J = A · I · C.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tracing::{info, warn};

use crate::concentration::{ConcentrationQuery, StandardConcentrations};
use crate::config::WorkflowSettings;
use crate::error::RiskError;
use crate::infiltration::{
    clean_infiltration, CleanedInfiltration, InfiltrationSample, InfiltrationSource, LayerMapping,
};
use crate::risk_filter::QualifyingCombination;

/// Flux in µg/year from area (m²), infiltration (mm/year) and concentration (µg/L).
///
/// mm/year → m/year is /1000 and µg/L → µg/m³ is ×1000, so the result equals
/// the plain product of the three inputs. Negative infiltration counts as zero.
pub fn compute_flux(area_m2: f64, infiltration_mm_per_year: f64, concentration_ug_l: f64) -> f64 {
    let infiltration_m_per_year = infiltration_mm_per_year.max(0.0) / 1000.0;
    let volume_m3_per_year = area_m2 * infiltration_m_per_year;
    let concentration_ug_m3 = concentration_ug_l * 1000.0;
    volume_m3_per_year * concentration_ug_m3
}

pub const UG_PER_MG: f64 = 1e3;
pub const UG_PER_G: f64 = 1e6;
pub const UG_PER_KG: f64 = 1e9;

#[derive(Debug, Clone, PartialEq)]
pub struct FluxRecord {
    pub site_id: String,
    pub gvfk: String,
    pub layer: String,
    pub substance: String,
    pub category: String,
    pub segment_id: String,
    pub distance_m: f64,
    pub area_m2: f64,
    pub infiltration_mm_per_year: f64,
    pub concentration_ug_l: f64,
    pub concentration_source: String,
    pub flux_ug_per_year: f64,
}

impl FluxRecord {
    pub fn flux_mg_per_year(&self) -> f64 {
        self.flux_ug_per_year / UG_PER_MG
    }

    pub fn flux_g_per_year(&self) -> f64 {
        self.flux_ug_per_year / UG_PER_G
    }

    pub fn flux_kg_per_year(&self) -> f64 {
        self.flux_ug_per_year / UG_PER_KG
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterStage {
    MissingModellag,
    MissingInfiltration,
    NegativeInfiltration,
    NoConcentration,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MissingModellag => "Filter_1_Missing_Modellag",
            Self::MissingInfiltration => "Filter_2_Missing_Infiltration",
            Self::NegativeInfiltration => "Filter_3_Negative_Infiltration",
            Self::NoConcentration => "Filter_4_No_Concentration",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub site_id: String,
    pub gvfk: String,
    pub category: String,
    pub substance: String,
    pub segment_id: String,
    pub stage: FilterStage,
    pub reason: String,
}

/// Rows removed between risk screening and flux, with the reason.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterAudit {
    entries: Vec<AuditEntry>,
}

impl FilterAudit {
    fn record(&mut self, combo: &QualifyingCombination, stage: FilterStage, reason: String) {
        self.entries.push(AuditEntry {
            site_id: combo.site_id.clone(),
            gvfk: combo.gvfk.clone(),
            category: combo.category.clone(),
            substance: combo.substance.clone(),
            segment_id: combo.segment_id.clone(),
            stage,
            reason,
        });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, stage: FilterStage) -> usize {
        self.entries.iter().filter(|e| e.stage == stage).count()
    }

    pub fn by_stage(&self) -> BTreeMap<FilterStage, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.entries {
            *counts.entry(e.stage).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxOutcome {
    pub records: Vec<FluxRecord>,
    pub audit: FilterAudit,
    /// Negative infiltration values set to zero.
    pub clamped: usize,
    /// Values above the configured maximum.
    pub capped: usize,
}

pub struct FluxCalculator<'a> {
    settings: &'a WorkflowSettings,
    areas: &'a HashMap<String, f64>,
    layers: &'a LayerMapping,
    infiltration: &'a dyn InfiltrationSource,
    concentrations: &'a StandardConcentrations,
}

impl<'a> FluxCalculator<'a> {
    pub fn new(
        settings: &'a WorkflowSettings,
        areas: &'a HashMap<String, f64>,
        layers: &'a LayerMapping,
        infiltration: &'a dyn InfiltrationSource,
        concentrations: &'a StandardConcentrations,
    ) -> Self {
        Self {
            settings,
            areas,
            layers,
            infiltration,
            concentrations,
        }
    }

    fn area(&self, site_id: &str) -> Option<f64> {
        self.areas
            .get(site_id)
            .copied()
            .filter(|a| a.is_finite() && *a >= 0.0)
    }

    /// One record per (combination, model layer). Every site must have an
    /// area; everything else that is missing is audited and skipped.
    pub fn calculate(&self, combos: &[QualifyingCombination]) -> Result<FluxOutcome, RiskError> {
        let missing: BTreeSet<&str> = combos
            .iter()
            .filter(|c| self.area(&c.site_id).is_none())
            .map(|c| c.site_id.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(RiskError::Validation(format!(
                "missing area for {} site(s): {}",
                missing.len(),
                missing.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        let mut out = FluxOutcome::default();

        for combo in combos {
            let Some(area_m2) = self.area(&combo.site_id) else {
                continue;
            };

            let Some(layers) = self.layers.layers(&combo.gvfk) else {
                out.audit.record(
                    combo,
                    FilterStage::MissingModellag,
                    format!("No dkmlag mapping for GVFK {}", combo.gvfk),
                );
                continue;
            };

            for layer in layers {
                let raw = match self.infiltration.sample(&combo.site_id, layer) {
                    InfiltrationSample::Value(v) => v,
                    InfiltrationSample::NoData => {
                        out.audit.record(
                            combo,
                            FilterStage::MissingInfiltration,
                            format!("No infiltration data for layer {layer}"),
                        );
                        continue;
                    }
                };

                let infiltration = match clean_infiltration(
                    raw,
                    self.settings.negative_infiltration,
                    self.settings.max_infiltration_mm_per_year,
                ) {
                    CleanedInfiltration::Usable {
                        mm_per_year,
                        clamped,
                        capped,
                    } => {
                        out.clamped += usize::from(clamped);
                        out.capped += usize::from(capped);
                        mm_per_year
                    }
                    CleanedInfiltration::Excluded(v) => {
                        out.audit.record(
                            combo,
                            FilterStage::NegativeInfiltration,
                            format!("Negative infiltration: {v:.1} mm/yr in layer {layer}"),
                        );
                        continue;
                    }
                };

                let query = ConcentrationQuery {
                    substance: &combo.substance,
                    category: &combo.category,
                    original_category: combo.original_category.as_deref(),
                    branch: combo.branch.as_deref(),
                    activity: combo.activity.as_deref(),
                    landfill: combo.is_landfill_context(),
                };
                let Some(conc) = self.concentrations.resolve(&query) else {
                    out.audit.record(
                        combo,
                        FilterStage::NoConcentration,
                        format!("No valid standard concentration for {}", combo.category),
                    );
                    continue;
                };

                out.records.push(FluxRecord {
                    site_id: combo.site_id.clone(),
                    gvfk: combo.gvfk.clone(),
                    layer: layer.clone(),
                    substance: combo.substance.clone(),
                    category: combo.category.clone(),
                    segment_id: combo.segment_id.clone(),
                    distance_m: combo.distance_m,
                    area_m2,
                    infiltration_mm_per_year: infiltration,
                    concentration_ug_l: conc.value_ug_l,
                    concentration_source: conc.source.to_string(),
                    flux_ug_per_year: compute_flux(area_m2, infiltration, conc.value_ug_l),
                });
            }
        }

        for (stage, count) in out.audit.by_stage() {
            warn!(%stage, rows = count, "rows removed before flux");
        }
        info!(
            combinations = combos.len(),
            flux_rows = out.records.len(),
            clamped = out.clamped,
            capped = out.capped,
            "site flux calculated"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NegativeInfiltrationPolicy;
    use crate::infiltration::InfiltrationTable;

    fn combo(site: &str, gvfk: &str, substance: &str, category: &str) -> QualifyingCombination {
        QualifyingCombination {
            site_id: site.into(),
            gvfk: gvfk.into(),
            substance: substance.into(),
            category: category.into(),
            threshold_m: 200.0,
            distance_m: 10.0,
            segment_id: "seg-1".into(),
            within_threshold: true,
            original_category: None,
            landfill_override: false,
            branch: None,
            activity: None,
        }
    }

    struct Fixture {
        areas: HashMap<String, f64>,
        layers: LayerMapping,
        infiltration: InfiltrationTable,
        concentrations: StandardConcentrations,
    }

    fn fixture(infiltration_ks1: Option<f64>) -> Fixture {
        let mut infiltration = InfiltrationTable::new();
        infiltration.insert("S1", "ks1", infiltration_ks1);
        infiltration.insert("S1", "ks2", Some(100.0));
        Fixture {
            areas: [("S1".to_string(), 100.0)].into_iter().collect(),
            layers: [("G1", "ks1"), ("G2", "ks1/ks2")].into_iter().collect(),
            infiltration,
            concentrations: StandardConcentrations::builtin(),
        }
    }

    fn run(f: &Fixture, settings: &WorkflowSettings, combos: &[QualifyingCombination]) -> FluxOutcome {
        FluxCalculator::new(settings, &f.areas, &f.layers, &f.infiltration, &f.concentrations)
            .calculate(combos)
            .unwrap()
    }

    #[test]
    fn flux_formula_golden_value() {
        let flux = compute_flux(100.0, 200.0, 1000.0);
        assert_eq!(flux, 20_000_000.0);
        let record = FluxRecord {
            site_id: String::new(),
            gvfk: String::new(),
            layer: String::new(),
            substance: String::new(),
            category: String::new(),
            segment_id: String::new(),
            distance_m: 0.0,
            area_m2: 100.0,
            infiltration_mm_per_year: 200.0,
            concentration_ug_l: 1000.0,
            concentration_source: String::new(),
            flux_ug_per_year: flux,
        };
        assert_eq!(record.flux_mg_per_year(), 20_000.0);
        assert_eq!(record.flux_g_per_year(), 20.0);
        assert_eq!(record.flux_kg_per_year(), 0.02);
    }

    #[test]
    fn upward_flow_gives_zero_flux() {
        assert_eq!(compute_flux(100.0, -50.0, 1000.0), 0.0);
        assert_eq!(compute_flux(100.0, 0.0, 1000.0), 0.0);
    }

    #[test]
    fn negative_infiltration_is_clamped_to_zero() {
        let f = fixture(Some(-50.0));
        let settings = WorkflowSettings::default();
        let out = run(&f, &settings, &[combo("S1", "G1", "Benzen", "BTXER")]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].infiltration_mm_per_year, 0.0);
        assert_eq!(out.records[0].flux_ug_per_year, 0.0);
        assert_eq!(out.clamped, 1);
        assert!(out.audit.is_empty());
    }

    #[test]
    fn negative_infiltration_can_exclude_row() {
        let f = fixture(Some(-50.0));
        let settings = WorkflowSettings {
            negative_infiltration: NegativeInfiltrationPolicy::Exclude,
            ..WorkflowSettings::default()
        };
        let out = run(&f, &settings, &[combo("S1", "G1", "Benzen", "BTXER")]);
        assert!(out.records.is_empty());
        assert_eq!(out.audit.count(FilterStage::NegativeInfiltration), 1);
    }

    #[test]
    fn infiltration_is_capped() {
        let f = fixture(Some(2000.0));
        let settings = WorkflowSettings::default();
        let out = run(&f, &settings, &[combo("S1", "G1", "Benzen", "BTXER")]);
        assert_eq!(out.records[0].infiltration_mm_per_year, 750.0);
        assert_eq!(out.records[0].flux_ug_per_year, compute_flux(100.0, 750.0, 400.0));
        assert_eq!(out.capped, 1);
    }

    #[test]
    fn one_record_per_layer() {
        let f = fixture(Some(200.0));
        let settings = WorkflowSettings::default();
        let out = run(&f, &settings, &[combo("S1", "G2", "Benzen", "BTXER")]);
        let layers: Vec<_> = out.records.iter().map(|r| r.layer.as_str()).collect();
        assert_eq!(layers, ["ks1", "ks2"]);
        assert_eq!(out.records[0].flux_ug_per_year, 100.0 * 200.0 * 400.0);
        assert_eq!(out.records[1].flux_ug_per_year, 100.0 * 100.0 * 400.0);
        assert!(out.records.iter().all(|r| r.flux_ug_per_year >= 0.0));
    }

    #[test]
    fn filter_cascade_is_audited() {
        let f = fixture(None);
        let settings = WorkflowSettings::default();
        let out = run(
            &f,
            &settings,
            &[
                combo("S1", "UNMAPPED", "Benzen", "BTXER"),
                combo("S1", "G1", "Benzen", "BTXER"),
                combo("S1", "G2", "PFOS", "PFAS"),
            ],
        );
        // G2/ks1 has no data; G2/ks2 has data but PFAS has no concentration
        assert!(out.records.is_empty());
        assert_eq!(out.audit.count(FilterStage::MissingModellag), 1);
        assert_eq!(out.audit.count(FilterStage::MissingInfiltration), 2);
        assert_eq!(out.audit.count(FilterStage::NoConcentration), 1);
        assert_eq!(out.audit.len(), 4);
        assert_eq!(
            FilterStage::MissingModellag.to_string(),
            "Filter_1_Missing_Modellag"
        );
    }

    #[test]
    fn missing_area_is_fatal() {
        let f = fixture(Some(200.0));
        let settings = WorkflowSettings::default();
        let err = FluxCalculator::new(
            &settings,
            &f.areas,
            &f.layers,
            &f.infiltration,
            &f.concentrations,
        )
        .calculate(&[combo("S9", "G1", "Benzen", "BTXER")])
        .unwrap_err();
        assert!(matches!(err, RiskError::Validation(msg) if msg.contains("S9")));
    }
}
