use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::config::LayerAggregation;
use crate::flux::{FluxRecord, UG_PER_KG};

/// Sorted distinct values joined by `separator`.
pub fn join_unique<'a>(values: impl IntoIterator<Item = &'a str>, separator: &str) -> String {
    values
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(separator)
}

/// Grouping key of the segment flux table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentKey {
    pub segment_id: String,
    pub gvfk: String,
    pub layer: String,
    pub category: String,
    pub substance: String,
}

impl SegmentKey {
    fn of(record: &FluxRecord) -> Self {
        Self {
            segment_id: record.segment_id.clone(),
            gvfk: record.gvfk.clone(),
            layer: record.layer.clone(),
            category: record.category.clone(),
            substance: record.substance.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFlux {
    pub key: SegmentKey,
    pub total_flux_ug_per_year: f64,
    /// Flux per contributing site, keyed by site id.
    pub site_flux_ug_per_year: BTreeMap<String, f64>,
}

impl SegmentFlux {
    pub fn total_flux_kg_per_year(&self) -> f64 {
        self.total_flux_ug_per_year / UG_PER_KG
    }

    pub fn site_count(&self) -> usize {
        self.site_flux_ug_per_year.len()
    }

    pub fn site_ids(&self) -> impl Iterator<Item = &str> {
        self.site_flux_ug_per_year.keys().map(String::as_str)
    }

    pub fn site_ids_joined(&self) -> String {
        self.site_ids().collect::<Vec<_>>().join(", ")
    }
}

/// Total flux of segment-flux rows that share (segment, category, substance).
///
/// The layer rows of one site are combined with `policy`, then sites are
/// summed. Different sites always add up.
pub fn combined_flux<'a>(
    rows: impl IntoIterator<Item = &'a SegmentFlux>,
    policy: LayerAggregation,
) -> f64 {
    let mut per_site: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for row in rows {
        for (site, flux) in &row.site_flux_ug_per_year {
            per_site.entry(site.as_str()).or_default().push(*flux);
        }
    }
    per_site
        .into_values()
        .map(|layers| policy.combine(layers))
        .sum()
}

/// Sum site flux per (segment, aquifer, layer, category, substance).
///
/// Substances are never mixed: each distinct substance text is its own group.
/// Output is ordered by key.
pub fn aggregate(records: &[FluxRecord]) -> Vec<SegmentFlux> {
    let mut groups: BTreeMap<SegmentKey, (f64, BTreeMap<String, f64>)> = BTreeMap::new();
    for r in records {
        let (total, sites) = groups.entry(SegmentKey::of(r)).or_default();
        *total += r.flux_ug_per_year;
        *sites.entry(r.site_id.clone()).or_insert(0.0) += r.flux_ug_per_year;
    }

    let out: Vec<SegmentFlux> = groups
        .into_iter()
        .map(|(key, (total, sites))| SegmentFlux {
            key,
            total_flux_ug_per_year: total,
            site_flux_ug_per_year: sites,
        })
        .collect();

    info!(
        flux_rows = records.len(),
        segment_rows = out.len(),
        segments = out
            .iter()
            .map(|s| s.key.segment_id.as_str())
            .collect::<BTreeSet<_>>()
            .len(),
        "segment flux aggregated"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(site: &str, segment: &str, substance: &str, flux: f64) -> FluxRecord {
        layered(site, "G1", "ks1", segment, substance, flux)
    }

    fn layered(
        site: &str,
        gvfk: &str,
        layer: &str,
        segment: &str,
        substance: &str,
        flux: f64,
    ) -> FluxRecord {
        FluxRecord {
            site_id: site.into(),
            gvfk: gvfk.into(),
            layer: layer.into(),
            substance: substance.into(),
            category: "BTXER".into(),
            segment_id: segment.into(),
            distance_m: 10.0,
            area_m2: 1.0,
            infiltration_mm_per_year: 1.0,
            concentration_ug_l: flux,
            concentration_source: "compound:Benzen".into(),
            flux_ug_per_year: flux,
        }
    }

    #[test]
    fn join_unique_sorts_and_dedups() {
        assert_eq!(join_unique(["b", "a", "b", ""], ", "), "a, b");
        assert_eq!(join_unique(std::iter::empty(), ", "), "");
    }

    #[test]
    fn totals_are_conserved() {
        let records = vec![
            rec("S1", "R1", "Benzen", 1.5e6),
            rec("S2", "R1", "Benzen", 2.25e6),
            rec("S2", "R1", "Benzen", 0.125e6),
            rec("S3", "R2", "Benzen", 7.0),
        ];
        let segments = aggregate(&records);
        assert_eq!(segments.len(), 2);
        let r1 = &segments[0];
        assert_eq!(r1.key.segment_id, "R1");
        let expected: f64 = records[..3].iter().map(|r| r.flux_ug_per_year).sum();
        assert_eq!(r1.total_flux_ug_per_year, expected);
        assert_eq!(r1.site_count(), 2);
        assert_eq!(r1.site_ids_joined(), "S1, S2");

        let grand: f64 = segments.iter().map(|s| s.total_flux_ug_per_year).sum();
        let direct: f64 = records.iter().map(|r| r.flux_ug_per_year).sum();
        assert!((grand - direct).abs() <= f64::EPSILON * direct);
    }

    #[test]
    fn substances_are_not_summed_together() {
        let records = vec![rec("S1", "R1", "Benzen", 10.0), rec("S1", "R1", "Toluen", 20.0)];
        let segments = aggregate(&records);
        assert_eq!(segments.len(), 2);
        let by_substance: BTreeMap<_, _> = segments
            .iter()
            .map(|s| (s.key.substance.as_str(), s.total_flux_ug_per_year))
            .collect();
        assert_eq!(by_substance["Benzen"], 10.0);
        assert_eq!(by_substance["Toluen"], 20.0);
    }

    #[test]
    fn layers_stay_separate() {
        let mut deep = rec("S1", "R1", "Benzen", 5.0);
        deep.layer = "ks2".into();
        let segments = aggregate(&[rec("S1", "R1", "Benzen", 5.0), deep]);
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.total_flux_ug_per_year == 5.0));
    }

    #[test]
    fn layer_policy_applies_within_a_site_only() {
        let records = [
            layered("S1", "G1", "ks1", "R1", "Benzen", 2.0e9),
            layered("S1", "G1", "ks2", "R1", "Benzen", 1.0e9),
            layered("S2", "G2", "ks2", "R1", "Benzen", 3.0e9),
        ];
        let segments = aggregate(&records);
        assert_eq!(segments.len(), 3);
        assert_eq!(combined_flux(&segments, LayerAggregation::Sum), 6.0e9);
        // S1 keeps its larger layer, S2 is added in full
        assert_eq!(combined_flux(&segments, LayerAggregation::Max), 5.0e9);
    }
}
