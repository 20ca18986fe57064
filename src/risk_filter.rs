//! Distance-based risk screening of site–aquifer–substance combinations.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::classifier::SubstanceClassifier;
use crate::config::WorkflowSettings;
use crate::schema::{category, prefix};

/// One row of the site-distance table: a site in one aquifer, with the
/// distance to its nearest river segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDistanceRecord {
    pub site_id: String,
    pub gvfk: String,
    pub distance_m: f64,
    pub segment_id: String,
    /// `;`-separated substance list.
    pub substances: Option<String>,
    pub branch: Option<String>,
    pub activity: Option<String>,
}

impl SiteDistanceRecord {
    pub fn substance_tokens(&self) -> Vec<&str> {
        self.substances
            .as_deref()
            .map(split_list)
            .unwrap_or_default()
    }
}

pub(crate) fn split_list(text: &str) -> Vec<&str> {
    text.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("nan"))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualifyingCombination {
    pub site_id: String,
    pub gvfk: String,
    pub substance: String,
    pub category: String,
    pub threshold_m: f64,
    pub distance_m: f64,
    pub segment_id: String,
    pub within_threshold: bool,
    pub original_category: Option<String>,
    pub landfill_override: bool,
    pub branch: Option<String>,
    pub activity: Option<String>,
}

impl QualifyingCombination {
    /// Rows assessed as landfill, either directly or through a threshold override.
    pub fn is_landfill_context(&self) -> bool {
        self.category == category::LOSSEPLADS || self.landfill_override
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub combinations: Vec<QualifyingCombination>,
    /// Rows with neither substance data nor landfill branch/activity.
    pub parked: Vec<SiteDistanceRecord>,
    pub assessed_rows: usize,
    pub landfill_overrides: usize,
    pub landfill_dropped: usize,
}

impl FilterOutcome {
    pub fn site_count(&self) -> usize {
        distinct(self.combinations.iter().map(|c| c.site_id.as_str()))
    }

    pub fn aquifer_count(&self) -> usize {
        distinct(self.combinations.iter().map(|c| c.gvfk.as_str()))
    }
}

/// Row counts within one distance threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSummary {
    pub threshold_m: f64,
    pub combinations: usize,
    pub sites: usize,
    pub aquifers: usize,
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values.collect::<BTreeSet<_>>().len()
}

pub struct RiskFilter<'a> {
    classifier: &'a SubstanceClassifier,
    settings: &'a WorkflowSettings,
}

impl<'a> RiskFilter<'a> {
    pub fn new(classifier: &'a SubstanceClassifier, settings: &'a WorkflowSettings) -> Self {
        Self {
            classifier,
            settings,
        }
    }

    pub fn has_qualifying_data(&self, record: &SiteDistanceRecord) -> bool {
        !record.substance_tokens().is_empty() || self.is_landfill_site(record)
    }

    fn is_landfill_site(&self, record: &SiteDistanceRecord) -> bool {
        self.classifier
            .classify_branch_activity(record.branch.as_deref(), record.activity.as_deref())
            .is_some()
    }

    /// Category-specific filter. Every (site, aquifer, substance) triple is
    /// assessed on its own; nothing is collapsed to the closest aquifer.
    pub fn filter_qualifying(&self, records: &[SiteDistanceRecord]) -> FilterOutcome {
        let mut out = FilterOutcome::default();
        let registry = self.classifier.registry();

        for record in records {
            let landfill = self.is_landfill_site(record);
            let tokens = record.substance_tokens();

            if tokens.is_empty() {
                if !landfill {
                    out.parked.push(record.clone());
                    continue;
                }
                out.assessed_rows += 1;
                let threshold = registry.distance_m(category::LOSSEPLADS);
                if record.distance_m <= threshold {
                    out.combinations.push(self.combination(
                        record,
                        format!("{} {}", prefix::BRANCH_ACTIVITY, category::LOSSEPLADS),
                        category::LOSSEPLADS.to_string(),
                        threshold,
                    ));
                }
                continue;
            }

            for token in tokens {
                out.assessed_rows += 1;
                let class = self.classifier.classify(token);

                let landfill_threshold = if landfill
                    && self.settings.apply_landfill_thresholds
                    && class.category != category::LOSSEPLADS
                {
                    registry.landfill_threshold_m(&class.category)
                } else {
                    None
                };

                match landfill_threshold {
                    Some(threshold) if record.distance_m <= threshold => {
                        let mut combo = self.combination(
                            record,
                            format!("{} {}", prefix::LANDFILL_OVERRIDE, class.category),
                            category::LOSSEPLADS.to_string(),
                            threshold,
                        );
                        combo.original_category = Some(class.category);
                        combo.landfill_override = true;
                        out.landfill_overrides += 1;
                        out.combinations.push(combo);
                    }
                    Some(_) => out.landfill_dropped += 1,
                    None => {
                        if record.distance_m <= class.distance_m {
                            out.combinations.push(self.combination(
                                record,
                                token.to_string(),
                                class.category,
                                class.distance_m,
                            ));
                        }
                    }
                }
            }
        }

        info!(
            input_rows = records.len(),
            assessed = out.assessed_rows,
            qualifying = out.combinations.len(),
            sites = out.site_count(),
            aquifers = out.aquifer_count(),
            parked = out.parked.len(),
            "category-specific risk filter"
        );
        if out.landfill_overrides > 0 || out.landfill_dropped > 0 {
            info!(
                overrides = out.landfill_overrides,
                dropped = out.landfill_dropped,
                "landfill thresholds applied"
            );
        }
        out
    }

    fn combination(
        &self,
        record: &SiteDistanceRecord,
        substance: String,
        category: String,
        threshold_m: f64,
    ) -> QualifyingCombination {
        QualifyingCombination {
            site_id: record.site_id.clone(),
            gvfk: record.gvfk.clone(),
            substance,
            category,
            threshold_m,
            distance_m: record.distance_m,
            segment_id: record.segment_id.clone(),
            within_threshold: true,
            original_category: None,
            landfill_override: false,
            branch: record.branch.clone(),
            activity: record.activity.clone(),
        }
    }

    /// General assessment: one universal threshold regardless of substance.
    /// Parked rows are not assessed.
    pub fn filter_universal(
        &self,
        records: &[SiteDistanceRecord],
        threshold_m: f64,
    ) -> Vec<SiteDistanceRecord> {
        let kept: Vec<_> = records
            .iter()
            .filter(|r| self.has_qualifying_data(r) && r.distance_m <= threshold_m)
            .cloned()
            .collect();
        info!(
            threshold_m,
            kept = kept.len(),
            sites = distinct(kept.iter().map(|r| r.site_id.as_str())),
            "universal risk filter"
        );
        kept
    }

    pub fn general_assessment(&self, records: &[SiteDistanceRecord]) -> Vec<SiteDistanceRecord> {
        self.filter_universal(records, self.settings.risk_threshold_m)
    }

    pub fn multi_threshold_analysis(
        &self,
        records: &[SiteDistanceRecord],
    ) -> Vec<ThresholdSummary> {
        let assessed: Vec<_> = records
            .iter()
            .filter(|r| self.has_qualifying_data(r))
            .collect();
        self.settings
            .additional_thresholds_m
            .iter()
            .map(|&threshold_m| {
                let within: Vec<_> = assessed
                    .iter()
                    .filter(|r| r.distance_m <= threshold_m)
                    .collect();
                let summary = ThresholdSummary {
                    threshold_m,
                    combinations: within.len(),
                    sites: distinct(within.iter().map(|r| r.site_id.as_str())),
                    aquifers: distinct(within.iter().map(|r| r.gvfk.as_str())),
                };
                debug!(?summary, "threshold summary");
                summary
            })
            .collect()
    }
}
