use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use polars::prelude::*;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::aggregation::{self, SegmentFlux};
use crate::categories::CategoryRegistry;
use crate::classifier::SubstanceClassifier;
use crate::concentration::StandardConcentrations;
use crate::config::WorkflowSettings;
use crate::error::RiskError;
use crate::flux::{FluxCalculator, FluxOutcome};
use crate::infiltration::{InfiltrationSource, LayerMapping};
use crate::mixing::{self, CmixRecord, FlowTable, MkkThresholds, SegmentSummary, SiteExceedance};
use crate::risk_filter::{FilterOutcome, RiskFilter, SiteDistanceRecord, ThresholdSummary};
use crate::tables;

// ── Stages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadSiteDistances,
    GeneralAssessment,
    QualifyingFilter,
    LoadFluxInputs,
    FluxCalculation,
    SegmentAggregation,
    LoadFlows,
    MixingEvaluation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadSiteDistances => "load_site_distances",
            Self::GeneralAssessment => "general_assessment",
            Self::QualifyingFilter => "qualifying_filter",
            Self::LoadFluxInputs => "load_flux_inputs",
            Self::FluxCalculation => "flux_calculation",
            Self::SegmentAggregation => "segment_aggregation",
            Self::LoadFlows => "load_flows",
            Self::MixingEvaluation => "mixing_evaluation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    pub passed: bool,
    pub rows_in: usize,
    pub rows_out: usize,
    pub message: String,
}

// ── Inputs ──────────────────────────────────────────────────────────────────

/// Everything the flux step needs besides the qualifying combinations.
pub struct FluxInputs {
    pub areas: HashMap<String, f64>,
    pub layers: LayerMapping,
    pub infiltration: Box<dyn InfiltrationSource>,
}

/// Fully loaded inputs for an in-memory run.
pub struct RunInputs {
    pub sites: Vec<SiteDistanceRecord>,
    pub flux: FluxInputs,
    pub flows: FlowTable,
}

// ── Run outcome ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub reports: Vec<StageReport>,
    pub general: Option<Vec<SiteDistanceRecord>>,
    pub thresholds: Option<Vec<ThresholdSummary>>,
    pub filter: Option<FilterOutcome>,
    pub flux: Option<FluxOutcome>,
    pub segments: Option<Vec<SegmentFlux>>,
    pub cmix: Option<Vec<CmixRecord>>,
    pub summary: Option<Vec<SegmentSummary>>,
    pub exceedances: Option<Vec<SiteExceedance>>,
}

impl RunOutcome {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            reports: Vec::new(),
            general: None,
            thresholds: None,
            filter: None,
            flux: None,
            segments: None,
            cmix: None,
            summary: None,
            exceedances: None,
        }
    }

    /// True when every stage passed.
    pub fn passed(&self) -> bool {
        self.reports.iter().all(|r| r.passed)
    }

    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }

    fn record<T>(
        &mut self,
        stage: Stage,
        rows_in: usize,
        result: Result<T, RiskError>,
        rows_out: impl FnOnce(&T) -> usize,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                let rows_out = rows_out(&value);
                info!(%stage, rows_in, rows_out, "stage passed");
                self.reports.push(StageReport {
                    stage,
                    passed: true,
                    rows_in,
                    rows_out,
                    message: format!("{rows_in} -> {rows_out} rows"),
                });
                Some(value)
            }
            Err(err) => {
                error!(%stage, error = %err, "stage failed");
                self.reports.push(StageReport {
                    stage,
                    passed: false,
                    rows_in,
                    rows_out: 0,
                    message: err.to_string(),
                });
                None
            }
        }
    }

    fn skip(&mut self, stage: Stage, missing: Stage) {
        warn!(%stage, %missing, "stage skipped");
        self.reports.push(StageReport {
            stage,
            passed: false,
            rows_in: 0,
            rows_out: 0,
            message: format!("skipped: {missing} did not pass"),
        });
    }

    /// Output tables produced by this run, keyed by file stem.
    pub fn frames(&self) -> PolarsResult<Vec<(&'static str, DataFrame)>> {
        let mut out = vec![("stage_report", stage_report_frame(&self.reports)?)];
        if let Some(general) = &self.general {
            out.push(("general_assessment", tables::site_distances_frame(general)?));
        }
        if let Some(thresholds) = &self.thresholds {
            out.push(("threshold_analysis", tables::threshold_summary_frame(thresholds)?));
        }
        if let Some(filter) = &self.filter {
            out.push((
                "qualifying_combinations",
                tables::combinations_frame(&filter.combinations)?,
            ));
        }
        if let Some(flux) = &self.flux {
            out.push(("site_flux", tables::flux_frame(&flux.records)?));
            out.push(("filter_audit", tables::audit_frame(&flux.audit)?));
        }
        if let Some(segments) = &self.segments {
            out.push(("segment_flux", tables::segment_flux_frame(segments)?));
        }
        if let Some(cmix) = &self.cmix {
            out.push(("cmix", tables::cmix_frame(cmix)?));
        }
        if let Some(summary) = &self.summary {
            out.push(("segment_summary", tables::segment_summary_frame(summary)?));
        }
        if let Some(exceedances) = &self.exceedances {
            out.push(("site_exceedances", tables::site_exceedance_frame(exceedances)?));
        }
        Ok(out)
    }

    /// Write every produced table as `<stem>.csv` under `dir`.
    pub fn write_outputs(&self, dir: &Path) -> Result<Vec<PathBuf>, RiskError> {
        let mut written = Vec::new();
        for (stem, mut df) in self.frames()? {
            let path = dir.join(format!("{stem}.csv"));
            tables::write_csv(&mut df, &path)?;
            written.push(path);
        }
        info!(run_id = %self.run_id, files = written.len(), dir = %dir.display(), "outputs written");
        Ok(written)
    }
}

pub fn stage_report_frame(reports: &[StageReport]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(
            "Stage".into(),
            &reports.iter().map(|r| r.stage.to_string()).collect::<Vec<_>>(),
        ),
        Column::new(
            "Passed".into(),
            &reports.iter().map(|r| r.passed).collect::<Vec<_>>(),
        ),
        Column::new(
            "Rows_In".into(),
            &reports.iter().map(|r| r.rows_in as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "Rows_Out".into(),
            &reports.iter().map(|r| r.rows_out as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "Message".into(),
            &reports.iter().map(|r| r.message.clone()).collect::<Vec<_>>(),
        ),
    ])
}

// ── Model ───────────────────────────────────────────────────────────────────

pub struct RiskModel {
    base_path: PathBuf,
    settings: WorkflowSettings,
    classifier: SubstanceClassifier,
    concentrations: StandardConcentrations,
    mkk: MkkThresholds,
}

impl RiskModel {
    /// Model over the data directory `base_path` with the built-in tables.
    pub fn new(base_path: impl Into<PathBuf>, settings: WorkflowSettings) -> Self {
        Self::with_tables(
            base_path,
            settings,
            CategoryRegistry::builtin(),
            StandardConcentrations::builtin(),
            MkkThresholds::builtin(),
        )
    }

    pub fn with_tables(
        base_path: impl Into<PathBuf>,
        settings: WorkflowSettings,
        registry: CategoryRegistry,
        concentrations: StandardConcentrations,
        mkk: MkkThresholds,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            settings,
            classifier: SubstanceClassifier::new(Arc::new(registry)).with_stats(),
            concentrations,
            mkk,
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn classifier(&self) -> &SubstanceClassifier {
        &self.classifier
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn read(&self, filename: &str) -> Result<DataFrame, RiskError> {
        tables::read_csv_as_strings(
            &self.base_path.join(filename),
            &self.settings.inputs.rename,
        )
    }

    pub fn load_site_distances(&self) -> Result<Vec<SiteDistanceRecord>, RiskError> {
        tables::site_distances_from_frame(&self.read(&self.settings.inputs.site_distances)?)
    }

    pub fn load_flux_inputs(&self) -> Result<FluxInputs, RiskError> {
        let files = &self.settings.inputs;
        Ok(FluxInputs {
            areas: tables::site_areas_from_frame(&self.read(&files.site_areas)?)?,
            layers: tables::layer_mapping_from_frame(&self.read(&files.layer_mapping)?)?,
            infiltration: Box::new(tables::infiltration_from_frame(
                &self.read(&files.infiltration)?,
            )?),
        })
    }

    pub fn load_flows(&self) -> Result<FlowTable, RiskError> {
        tables::flows_from_frame(&self.read(&self.settings.inputs.flows)?)
    }

    /// Load every input from the data directory and run all stages.
    pub fn run(&self) -> RunOutcome {
        let mut run = RunOutcome::new();
        let span = info_span!("run", run_id = %run.run_id);
        let _enter = span.enter();
        info!(base_path = %self.base_path.display(), started_at = %run.started_at, "run started");

        let sites = run.record(
            Stage::LoadSiteDistances,
            0,
            self.load_site_distances(),
            Vec::len,
        );
        let flux_inputs = run.record(Stage::LoadFluxInputs, 0, self.load_flux_inputs(), |f| {
            f.areas.len()
        });
        let flows = run.record(Stage::LoadFlows, 0, self.load_flows(), FlowTable::len);

        self.execute(&mut run, sites, flux_inputs, flows);
        run
    }

    /// Run all stages on inputs that are already loaded.
    pub fn run_with(&self, inputs: RunInputs) -> RunOutcome {
        let mut run = RunOutcome::new();
        let span = info_span!("run", run_id = %run.run_id);
        let _enter = span.enter();
        self.execute(
            &mut run,
            Some(inputs.sites),
            Some(inputs.flux),
            Some(inputs.flows),
        );
        run
    }

    fn execute(
        &self,
        run: &mut RunOutcome,
        sites: Option<Vec<SiteDistanceRecord>>,
        flux_inputs: Option<FluxInputs>,
        flows: Option<FlowTable>,
    ) {
        let filter = RiskFilter::new(&self.classifier, &self.settings);

        // General assessment and the category filter both need site distances.
        let filtered = match &sites {
            Some(sites) => {
                run.thresholds = Some(filter.multi_threshold_analysis(sites));
                run.general = run.record(
                    Stage::GeneralAssessment,
                    sites.len(),
                    Ok(filter.general_assessment(sites)),
                    Vec::len,
                );
                let outcome = filter.filter_qualifying(sites);
                let outcome = if outcome.combinations.is_empty() {
                    Err(RiskError::EmptyDataset(
                        "no site-substance combination within its category threshold".into(),
                    ))
                } else {
                    Ok(outcome)
                };
                if let Some(stats) = self.classifier.stats() {
                    info!(
                        calls = stats.calls,
                        cache_hits = stats.cache_hits,
                        fallbacks = stats.fallbacks,
                        "classifier statistics"
                    );
                }
                run.record(Stage::QualifyingFilter, sites.len(), outcome, |o| {
                    o.combinations.len()
                })
            }
            None => {
                run.skip(Stage::GeneralAssessment, Stage::LoadSiteDistances);
                run.skip(Stage::QualifyingFilter, Stage::LoadSiteDistances);
                None
            }
        };

        let flux = match (&filtered, &flux_inputs) {
            (Some(filtered), Some(inputs)) => {
                let calculator = FluxCalculator::new(
                    &self.settings,
                    &inputs.areas,
                    &inputs.layers,
                    inputs.infiltration.as_ref(),
                    &self.concentrations,
                );
                run.record(
                    Stage::FluxCalculation,
                    filtered.combinations.len(),
                    calculator.calculate(&filtered.combinations),
                    |o| o.records.len(),
                )
            }
            (None, _) => {
                run.skip(Stage::FluxCalculation, Stage::QualifyingFilter);
                None
            }
            (_, None) => {
                run.skip(Stage::FluxCalculation, Stage::LoadFluxInputs);
                None
            }
        };

        let segments = match &flux {
            Some(flux) => run.record(
                Stage::SegmentAggregation,
                flux.records.len(),
                Ok(aggregation::aggregate(&flux.records)),
                Vec::len,
            ),
            None => {
                run.skip(Stage::SegmentAggregation, Stage::FluxCalculation);
                None
            }
        };

        match (&segments, &flows, &flux) {
            (Some(segments), Some(flows), Some(flux)) => {
                let cmix = mixing::evaluate(segments, flows, &self.mkk, &self.settings);
                run.summary = Some(mixing::segment_summary(segments, &cmix, &self.settings));
                run.exceedances = Some(mixing::site_exceedances(&flux.records, &cmix));
                run.cmix = run.record(Stage::MixingEvaluation, segments.len(), Ok(cmix), Vec::len);
            }
            (None, _, _) | (_, _, None) => {
                run.skip(Stage::MixingEvaluation, Stage::SegmentAggregation)
            }
            (_, None, _) => run.skip(Stage::MixingEvaluation, Stage::LoadFlows),
        }

        run.filter = filtered;
        run.flux = flux;
        run.segments = segments;

        let failed = run.reports.iter().filter(|r| !r.passed).count();
        if failed == 0 {
            info!(stages = run.reports.len(), "run passed");
        } else {
            warn!(stages = run.reports.len(), failed, "run finished with failed stages");
        }
    }
}
