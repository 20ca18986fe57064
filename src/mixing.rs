//! River mixing concentration (Cmix) and comparison against MKK.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregation::{combined_flux, SegmentFlux};
use crate::classifier::normalize;
use crate::concentration::strip_substance_prefix;
use crate::config::WorkflowSettings;
use crate::error::RiskError;
use crate::flux::{FluxRecord, UG_PER_KG};

pub const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;
pub const LITERS_PER_M3: f64 = 1000.0;

/// µg/L from a flux in µg/year and a flow in m³/s.
pub fn compute_cmix(flux_ug_per_year: f64, flow_m3_s: f64) -> f64 {
    let flux_ug_per_second = flux_ug_per_year / SECONDS_PER_YEAR;
    flux_ug_per_second / (flow_m3_s * LITERS_PER_M3)
}

// ── Flow scenarios ──────────────────────────────────────────────────────────

/// River discharge (m³/s) keyed by (segment, scenario).
#[derive(Debug, Clone, Default)]
pub struct FlowTable {
    flows: HashMap<(String, String), f64>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-finite values are dropped; a later row for the same key replaces
    /// an earlier one.
    pub fn insert(&mut self, segment_id: &str, scenario: &str, flow_m3_s: f64) {
        if flow_m3_s.is_finite() {
            self.flows
                .insert((segment_id.to_string(), scenario.to_string()), flow_m3_s);
        }
    }

    pub fn get(&self, segment_id: &str, scenario: &str) -> Option<f64> {
        self.flows
            .get(&(segment_id.to_string(), scenario.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

// ── MKK thresholds ──────────────────────────────────────────────────────────

/// Surface-water quality thresholds (µg/L).
///
/// Substance entries only exist for modelled substances; every other
/// substance, and a modelled substance without an entry, uses its category.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MkkThresholds {
    substances: BTreeMap<String, f64>,
    categories: BTreeMap<String, f64>,
}

impl MkkThresholds {
    pub fn from_toml_str(text: &str) -> Result<Self, RiskError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, RiskError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn lookup(&self, substance: &str, category: &str) -> Option<f64> {
        let key = normalize(strip_substance_prefix(substance));
        self.substances
            .iter()
            .find(|(name, _)| normalize(name) == key)
            .map(|(_, v)| *v)
            .or_else(|| self.categories.get(category).copied())
    }

    /// AA-EQS for freshwater (BEK 1022/2010, BEK 796/2023).
    pub fn builtin() -> Self {
        let map = |rows: &[(&str, f64)]| -> BTreeMap<String, f64> {
            rows.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        Self {
            // Olie C10-C25 and Chlorbenzen have no EQS of their own.
            substances: map(&[
                ("Benzen", 10.0),
                ("1,1,1-Trichlorethan", 21.0),
                ("Trichlorethylen", 10.0),
                ("Chloroform", 2.5),
                ("Phenol", 7.7),
                ("4-Nonylphenol", 0.3),
                ("2,6-dichlorphenol", 3.4),
                ("MTBE", 10.0),
                ("Fluoranthen", 0.0063),
                ("Mechlorprop", 18.0),
                ("Atrazin", 0.6),
                ("Arsen", 4.3),
                ("Cyanid", 10.0),
                ("COD", 1000.0),
            ]),
            categories: map(&[
                ("BTXER", 10.0),
                ("PAH_FORBINDELSER", 0.1),
                ("PHENOLER", 0.3),
                ("KLOREREDE_PHENOLER", 3.4),
                ("POLARE_FORBINDELSER", 10.0),
                ("KLOREDE_KULBRINTER", 2.5),
                ("PESTICIDER", 0.6),
                ("UORGANISKE_FORBINDELSER", 4.3),
                ("PFAS", 0.0044),
                ("LOSSEPLADS", 10.0),
                ("ANDRE", 10.0),
            ]),
        }
    }
}

// ── Cmix records ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CmixRecord {
    pub segment_id: String,
    pub category: String,
    pub substance: String,
    pub scenario: String,
    pub total_flux_ug_per_year: f64,
    pub flow_m3_s: Option<f64>,
    pub has_flow_data: bool,
    pub cmix_ug_l: Option<f64>,
    pub mkk_ug_l: Option<f64>,
    pub exceedance_ratio: Option<f64>,
    pub exceedance_flag: bool,
}

impl CmixRecord {
    pub fn total_flux_kg_per_year(&self) -> f64 {
        self.total_flux_ug_per_year / UG_PER_KG
    }
}

/// One row per (segment, category, substance, scenario).
///
/// The layer rows of each site are combined with the configured
/// `LayerAggregation`, then sites are summed. Scenarios come from the settings, in order;
/// a scenario without usable flow yields a row with `has_flow_data = false`.
pub fn evaluate(
    segment_flux: &[SegmentFlux],
    flows: &FlowTable,
    mkk: &MkkThresholds,
    settings: &WorkflowSettings,
) -> Vec<CmixRecord> {
    let mut out = Vec::new();
    let mut missing_flow = 0usize;
    for ((segment_id, category, substance), rows) in by_substance(segment_flux) {
        let total = combined_flux(rows, settings.layer_aggregation);
        let mkk_ug_l = mkk.lookup(substance, category);

        for scenario in &settings.flow_scenarios {
            let flow = flows
                .get(segment_id, scenario)
                .filter(|q| *q > settings.min_flow_m3_s && *q > 0.0);
            let cmix = flow.map(|q| compute_cmix(total, q));
            let ratio = match (cmix, mkk_ug_l) {
                (Some(c), Some(m)) if m > 0.0 => Some(c / m),
                _ => None,
            };
            if flow.is_none() {
                missing_flow += 1;
            }
            out.push(CmixRecord {
                segment_id: segment_id.to_string(),
                category: category.to_string(),
                substance: substance.to_string(),
                scenario: scenario.clone(),
                total_flux_ug_per_year: total,
                flow_m3_s: flow,
                has_flow_data: flow.is_some(),
                cmix_ug_l: cmix,
                mkk_ug_l,
                exceedance_ratio: ratio,
                exceedance_flag: ratio.is_some_and(|r| r > 1.0),
            });
        }
    }

    if missing_flow > 0 {
        warn!(rows = missing_flow, "Cmix rows without flow data");
    }
    info!(
        cmix_rows = out.len(),
        exceedances = out.iter().filter(|r| r.exceedance_flag).count(),
        layer_aggregation = ?settings.layer_aggregation,
        "Cmix evaluated"
    );
    out
}

fn by_substance(segment_flux: &[SegmentFlux]) -> BTreeMap<(&str, &str, &str), Vec<&SegmentFlux>> {
    let mut grouped: BTreeMap<(&str, &str, &str), Vec<&SegmentFlux>> = BTreeMap::new();
    for s in segment_flux {
        grouped
            .entry((
                s.key.segment_id.as_str(),
                s.key.category.as_str(),
                s.key.substance.as_str(),
            ))
            .or_default()
            .push(s);
    }
    grouped
}

// ── Segment summary ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSummary {
    pub segment_id: String,
    pub total_flux_kg_per_year: f64,
    pub max_cmix_ug_l: Option<f64>,
    pub max_exceedance_ratio: Option<f64>,
    /// Highest Cmix and ratio under `primary_flow_scenario`.
    pub primary_cmix_ug_l: Option<f64>,
    pub primary_exceedance_ratio: Option<f64>,
    pub categories: Vec<String>,
    /// Scenarios with flow data.
    pub flow_scenarios: Vec<String>,
    pub failing_scenarios: Vec<String>,
    pub site_ids: Vec<String>,
    pub has_exceedance: bool,
}

fn max_opt(acc: Option<f64>, v: Option<f64>) -> Option<f64> {
    match (acc, v) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// One row per segment, highest exceedance ratio first.
///
/// The total flux uses the same layer policy as `evaluate`.
pub fn segment_summary(
    segment_flux: &[SegmentFlux],
    cmix: &[CmixRecord],
    settings: &WorkflowSettings,
) -> Vec<SegmentSummary> {
    let mut by_segment: BTreeMap<&str, SegmentSummary> = BTreeMap::new();
    let mut sites: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for s in segment_flux {
        let entry = by_segment
            .entry(s.key.segment_id.as_str())
            .or_insert_with(|| SegmentSummary {
                segment_id: s.key.segment_id.clone(),
                total_flux_kg_per_year: 0.0,
                max_cmix_ug_l: None,
                max_exceedance_ratio: None,
                primary_cmix_ug_l: None,
                primary_exceedance_ratio: None,
                categories: Vec::new(),
                flow_scenarios: Vec::new(),
                failing_scenarios: Vec::new(),
                site_ids: Vec::new(),
                has_exceedance: false,
            });
        if !entry.categories.contains(&s.key.category) {
            entry.categories.push(s.key.category.clone());
        }
        sites
            .entry(s.key.segment_id.as_str())
            .or_default()
            .extend(s.site_ids());
    }

    for ((segment_id, _, _), rows) in by_substance(segment_flux) {
        if let Some(entry) = by_segment.get_mut(segment_id) {
            entry.total_flux_kg_per_year +=
                combined_flux(rows, settings.layer_aggregation) / UG_PER_KG;
        }
    }

    for r in cmix {
        let Some(entry) = by_segment.get_mut(r.segment_id.as_str()) else {
            continue;
        };
        entry.max_cmix_ug_l = max_opt(entry.max_cmix_ug_l, r.cmix_ug_l);
        entry.max_exceedance_ratio = max_opt(entry.max_exceedance_ratio, r.exceedance_ratio);
        if r.scenario == settings.primary_flow_scenario {
            entry.primary_cmix_ug_l = max_opt(entry.primary_cmix_ug_l, r.cmix_ug_l);
            entry.primary_exceedance_ratio =
                max_opt(entry.primary_exceedance_ratio, r.exceedance_ratio);
        }
        if r.has_flow_data && !entry.flow_scenarios.contains(&r.scenario) {
            entry.flow_scenarios.push(r.scenario.clone());
        }
        if r.exceedance_flag && !entry.failing_scenarios.contains(&r.scenario) {
            entry.failing_scenarios.push(r.scenario.clone());
        }
    }

    let mut out: Vec<SegmentSummary> = by_segment
        .into_iter()
        .map(|(segment, mut s)| {
            s.categories.sort();
            s.flow_scenarios.sort();
            s.failing_scenarios.sort();
            s.site_ids = sites
                .remove(segment)
                .unwrap_or_default()
                .into_iter()
                .map(String::from)
                .collect();
            s.has_exceedance = s.max_exceedance_ratio.is_some_and(|r| r > 1.0);
            s
        })
        .collect();

    out.sort_by(|a, b| match (a.max_exceedance_ratio, b.max_exceedance_ratio) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    out
}

// ── Site exceedance view ────────────────────────────────────────────────────

/// A site-level flux row on a segment/substance/scenario that exceeds MKK.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteExceedance {
    pub site_id: String,
    pub gvfk: String,
    pub layer: String,
    pub category: String,
    pub substance: String,
    pub segment_id: String,
    pub distance_m: f64,
    pub site_flux_kg_per_year: f64,
    pub scenario: String,
    pub flow_m3_s: Option<f64>,
    pub cmix_ug_l: Option<f64>,
    pub mkk_ug_l: Option<f64>,
    pub exceedance_ratio: Option<f64>,
    pub segment_flux_kg_per_year: f64,
}

/// Sorted by exceedance ratio (highest first), then aquifer.
pub fn site_exceedances(flux: &[FluxRecord], cmix: &[CmixRecord]) -> Vec<SiteExceedance> {
    let mut index: HashMap<(&str, &str, &str), Vec<&FluxRecord>> = HashMap::new();
    for f in flux {
        index
            .entry((f.segment_id.as_str(), f.category.as_str(), f.substance.as_str()))
            .or_default()
            .push(f);
    }

    let mut out: Vec<SiteExceedance> = Vec::new();
    for r in cmix.iter().filter(|r| r.exceedance_flag) {
        let key = (r.segment_id.as_str(), r.category.as_str(), r.substance.as_str());
        for f in index.get(&key).into_iter().flatten() {
            out.push(SiteExceedance {
                site_id: f.site_id.clone(),
                gvfk: f.gvfk.clone(),
                layer: f.layer.clone(),
                category: f.category.clone(),
                substance: f.substance.clone(),
                segment_id: f.segment_id.clone(),
                distance_m: f.distance_m,
                site_flux_kg_per_year: f.flux_kg_per_year(),
                scenario: r.scenario.clone(),
                flow_m3_s: r.flow_m3_s,
                cmix_ug_l: r.cmix_ug_l,
                mkk_ug_l: r.mkk_ug_l,
                exceedance_ratio: r.exceedance_ratio,
                segment_flux_kg_per_year: r.total_flux_kg_per_year(),
            });
        }
    }

    out.sort_by(|a, b| {
        let (x, y) = (
            a.exceedance_ratio.unwrap_or(f64::NEG_INFINITY),
            b.exceedance_ratio.unwrap_or(f64::NEG_INFINITY),
        );
        y.total_cmp(&x).then_with(|| a.gvfk.cmp(&b.gvfk))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::SegmentKey;
    use crate::config::LayerAggregation;

    fn seg(segment: &str, layer: &str, category: &str, substance: &str, flux: f64) -> SegmentFlux {
        SegmentFlux {
            key: SegmentKey {
                segment_id: segment.into(),
                gvfk: "G1".into(),
                layer: layer.into(),
                category: category.into(),
                substance: substance.into(),
            },
            total_flux_ug_per_year: flux,
            site_flux_ug_per_year: [("S1".to_string(), flux)].into_iter().collect(),
        }
    }

    fn settings(scenarios: &[&str]) -> WorkflowSettings {
        WorkflowSettings {
            flow_scenarios: scenarios.iter().map(|s| s.to_string()).collect(),
            primary_flow_scenario: scenarios[0].to_string(),
            ..WorkflowSettings::default()
        }
    }

    #[test]
    fn cmix_golden_value() {
        assert_eq!(SECONDS_PER_YEAR, 31_557_600.0);
        assert_eq!(compute_cmix(31_557_600_000.0, 1.0), 1.0);
    }

    #[test]
    fn mkk_lookup_rules() {
        let mkk = MkkThresholds::builtin();
        assert_eq!(mkk.lookup("Benzen", "BTXER"), Some(10.0));
        assert_eq!(mkk.lookup("benzen", "BTXER"), Some(10.0));
        // not modelled -> category
        assert_eq!(mkk.lookup("Toluen", "BTXER"), Some(10.0));
        assert_eq!(mkk.lookup("Naphthalen", "PAH_FORBINDELSER"), Some(0.1));
        // modelled without own value -> category
        assert_eq!(mkk.lookup("Chlorbenzen", "ANDRE_AROMATISKE_FORBINDELSER"), None);
        assert_eq!(mkk.lookup("Olie C10-C25", "BTXER"), Some(10.0));
        assert_eq!(mkk.lookup("Landfill Override: BTXER", "LOSSEPLADS"), Some(10.0));
        assert_eq!(mkk.lookup("Fluoranthen", "PAH_FORBINDELSER"), Some(0.0063));
    }

    #[test]
    fn evaluate_flags_exceedance_per_scenario() {
        let mut flows = FlowTable::new();
        flows.insert("R1", "Q95", 0.05);
        flows.insert("R1", "Q50", 10.0);
        // 1000 µg/s of benzen
        let rows = evaluate(
            &[seg("R1", "ks1", "BTXER", "Benzen", 31_557_600_000.0)],
            &flows,
            &MkkThresholds::builtin(),
            &settings(&["Q95", "Q50"]),
        );
        assert_eq!(rows.len(), 2);
        let q95 = &rows[0];
        assert_eq!(q95.scenario, "Q95");
        assert!((q95.cmix_ug_l.unwrap() - 20.0).abs() < 1e-9);
        assert!((q95.exceedance_ratio.unwrap() - 2.0).abs() < 1e-9);
        assert!(q95.exceedance_flag);
        let q50 = &rows[1];
        assert!((q50.cmix_ug_l.unwrap() - 0.1).abs() < 1e-12);
        assert!(!q50.exceedance_flag);
        for r in &rows {
            assert_eq!(
                r.exceedance_flag,
                r.exceedance_ratio.is_some_and(|x| x > 1.0)
            );
        }
    }

    #[test]
    fn missing_or_zero_flow_is_marked() {
        let mut flows = FlowTable::new();
        flows.insert("R1", "Q90", 0.0);
        flows.insert("R1", "Q50", f64::NAN);
        let rows = evaluate(
            &[seg("R1", "ks1", "BTXER", "Benzen", 1e12)],
            &flows,
            &MkkThresholds::builtin(),
            &settings(&["Q95", "Q90", "Q50"]),
        );
        assert_eq!(rows.len(), 3);
        for r in &rows {
            assert!(!r.has_flow_data);
            assert!(r.cmix_ug_l.is_none());
            assert!(r.exceedance_ratio.is_none());
            assert!(!r.exceedance_flag);
            assert_eq!(r.mkk_ug_l, Some(10.0));
        }
    }

    #[test]
    fn layer_policy_sum_or_max() {
        let mut flows = FlowTable::new();
        flows.insert("R1", "Q95", 1.0);
        let segments = [
            seg("R1", "ks1", "BTXER", "Benzen", 2.0e9),
            seg("R1", "ks2", "BTXER", "Benzen", 3.0e9),
        ];
        let mkk = MkkThresholds::builtin();

        let summed = evaluate(&segments, &flows, &mkk, &settings(&["Q95"]));
        assert_eq!(summed.len(), 1);
        assert_eq!(summed[0].total_flux_ug_per_year, 5.0e9);

        let max_settings = WorkflowSettings {
            layer_aggregation: LayerAggregation::Max,
            ..settings(&["Q95"])
        };
        let maxed = evaluate(&segments, &flows, &mkk, &max_settings);
        assert_eq!(maxed[0].total_flux_ug_per_year, 3.0e9);

        let summary = segment_summary(&segments, &maxed, &max_settings);
        assert!((summary[0].total_flux_kg_per_year - 3.0).abs() < 1e-12);
    }

    #[test]
    fn max_policy_still_sums_separate_sites() {
        let mut flows = FlowTable::new();
        flows.insert("R1", "Q95", 1.0);
        let records: Vec<FluxRecord> = [("S1", "G1", "ks1", 2.0e9), ("S2", "G2", "ks2", 3.0e9)]
            .into_iter()
            .map(|(site, gvfk, layer, flux)| FluxRecord {
                site_id: site.into(),
                gvfk: gvfk.into(),
                layer: layer.into(),
                substance: "Benzen".into(),
                category: "BTXER".into(),
                segment_id: "R1".into(),
                distance_m: 10.0,
                area_m2: 1.0,
                infiltration_mm_per_year: 1.0,
                concentration_ug_l: 1.0,
                concentration_source: String::new(),
                flux_ug_per_year: flux,
            })
            .collect();
        let segments = crate::aggregation::aggregate(&records);
        let max_settings = WorkflowSettings {
            layer_aggregation: LayerAggregation::Max,
            ..settings(&["Q95"])
        };

        let rows = evaluate(&segments, &flows, &MkkThresholds::builtin(), &max_settings);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_flux_ug_per_year, 5.0e9);

        let summary = segment_summary(&segments, &rows, &max_settings);
        assert!((summary[0].total_flux_kg_per_year - 5.0).abs() < 1e-12);
        assert_eq!(summary[0].site_ids, ["S1", "S2"]);
        assert_eq!(summary[0].primary_cmix_ug_l, rows[0].cmix_ug_l);
    }

    #[test]
    fn summary_and_site_view() {
        let mut flows = FlowTable::new();
        flows.insert("R1", "Q95", 0.01);
        flows.insert("R2", "Q95", 1000.0);
        let segments = [
            seg("R1", "ks1", "BTXER", "Benzen", 31_557_600_000.0),
            seg("R2", "ks1", "BTXER", "Benzen", 1.0),
        ];
        let run_settings = settings(&["Q50", "Q95"]);
        let cmix = evaluate(&segments, &flows, &MkkThresholds::builtin(), &run_settings);
        let summary = segment_summary(&segments, &cmix, &run_settings);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].segment_id, "R1");
        assert!(summary[0].has_exceedance);
        assert_eq!(summary[0].failing_scenarios, ["Q95"]);
        assert_eq!(summary[0].flow_scenarios, ["Q95"]);
        assert_eq!(summary[0].site_ids, ["S1"]);
        assert!((summary[0].total_flux_kg_per_year - 31.5576).abs() < 1e-9);
        // primary scenario is Q50, which has no flow on either segment
        assert!(summary[0].primary_cmix_ug_l.is_none());
        assert!(summary[0].primary_exceedance_ratio.is_none());
        assert!(!summary[1].has_exceedance);

        let flux = FluxRecord {
            site_id: "S1".into(),
            gvfk: "G1".into(),
            layer: "ks1".into(),
            substance: "Benzen".into(),
            category: "BTXER".into(),
            segment_id: "R1".into(),
            distance_m: 12.0,
            area_m2: 1.0,
            infiltration_mm_per_year: 1.0,
            concentration_ug_l: 1.0,
            concentration_source: String::new(),
            flux_ug_per_year: 31_557_600_000.0,
        };
        let view = site_exceedances(&[flux], &cmix);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].scenario, "Q95");
        assert!(view[0].exceedance_ratio.unwrap() > 1.0);
    }
}
