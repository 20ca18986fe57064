//! Python bindings (feature `python`).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::config::WorkflowSettings;
use crate::error::RiskError;
use crate::model::{FluxInputs, RiskModel, RunInputs, RunOutcome};
use crate::schema;
use crate::tables;

#[pyclass(name = "RiskModel")]
pub struct PyRiskModel {
    inner: RiskModel,
}

fn outcome_frames(run: &RunOutcome) -> Result<HashMap<String, PyDataFrame>, RiskError> {
    Ok(run
        .frames()?
        .into_iter()
        .map(|(stem, df)| (stem.to_string(), PyDataFrame(df)))
        .collect())
}

#[pymethods]
impl PyRiskModel {
    #[new]
    #[pyo3(signature = (base_path, config=None))]
    fn new(base_path: String, config: Option<String>) -> PyResult<Self> {
        let settings = match config {
            Some(path) => WorkflowSettings::load(Path::new(&path))?,
            None => WorkflowSettings::default(),
        };
        Ok(Self {
            inner: RiskModel::new(base_path, settings),
        })
    }

    /// Load a CSV from the data directory with all columns as strings.
    #[pyo3(signature = (filename, rename=None))]
    fn load_csv(
        &self,
        filename: &str,
        rename: Option<HashMap<String, String>>,
    ) -> PyResult<PyDataFrame> {
        let rename: BTreeMap<String, String> = rename.unwrap_or_default().into_iter().collect();
        let df = tables::read_csv_as_strings(&self.inner.base_path().join(filename), &rename)?;
        Ok(PyDataFrame(df))
    }

    /// `(category, threshold_m)` for one substance text.
    fn classify(&self, substance: &str) -> (String, f64) {
        let c = self.inner.classifier().classify(substance);
        (c.category, c.distance_m)
    }

    fn classifier_stats(&self) -> Option<HashMap<String, usize>> {
        self.inner.classifier().stats().map(|s| {
            let mut out: HashMap<String, usize> = s.per_category.into_iter().collect();
            out.insert("calls".into(), s.calls);
            out.insert("cache_hits".into(), s.cache_hits);
            out.insert("fallbacks".into(), s.fallbacks);
            out
        })
    }

    /// Run every stage on the files of the data directory. Returns the output
    /// tables by name and writes them as CSV when `output_dir` is given.
    #[pyo3(signature = (output_dir=None))]
    fn run(&self, output_dir: Option<String>) -> PyResult<HashMap<String, PyDataFrame>> {
        let run = self.inner.run();
        if let Some(dir) = output_dir {
            run.write_outputs(Path::new(&dir))?;
        }
        Ok(outcome_frames(&run)?)
    }

    /// Run every stage on frames already in memory.
    fn run_frames(
        &self,
        sites: PyDataFrame,
        areas: PyDataFrame,
        layers: PyDataFrame,
        infiltration: PyDataFrame,
        flows: PyDataFrame,
    ) -> PyResult<HashMap<String, PyDataFrame>> {
        let inputs = RunInputs {
            sites: tables::site_distances_from_frame(&sites.0)?,
            flux: FluxInputs {
                areas: tables::site_areas_from_frame(&areas.0)?,
                layers: tables::layer_mapping_from_frame(&layers.0)?,
                infiltration: Box::new(tables::infiltration_from_frame(&infiltration.0)?),
            },
            flows: tables::flows_from_frame(&flows.0)?,
        };
        let run = self.inner.run_with(inputs);
        Ok(outcome_frames(&run)?)
    }
}

/// Export schema constants as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Site distances
    let site = PyModule::new(m.py(), "site")?;
    site.add("SITE_ID", schema::site::SITE_ID)?;
    site.add("GVFK", schema::site::GVFK)?;
    site.add("DISTANCE_TO_RIVER_M", schema::site::DISTANCE_TO_RIVER_M)?;
    site.add("NEAREST_RIVER_OV_ID", schema::site::NEAREST_RIVER_OV_ID)?;
    site.add("SUBSTANCES", schema::site::SUBSTANCES)?;
    site.add("BRANCH", schema::site::BRANCH)?;
    site.add("ACTIVITY", schema::site::ACTIVITY)?;
    site.add("AREA_M2", schema::site::AREA_M2)?;
    m.add_submodule(&site)?;

    // Combinations
    let combination = PyModule::new(m.py(), "combination")?;
    combination.add(
        "QUALIFYING_SUBSTANCE",
        schema::combination::QUALIFYING_SUBSTANCE,
    )?;
    combination.add(
        "QUALIFYING_CATEGORY",
        schema::combination::QUALIFYING_CATEGORY,
    )?;
    combination.add(
        "CATEGORY_THRESHOLD_M",
        schema::combination::CATEGORY_THRESHOLD_M,
    )?;
    combination.add("WITHIN_THRESHOLD", schema::combination::WITHIN_THRESHOLD)?;
    combination.add("ORIGINAL_CATEGORY", schema::combination::ORIGINAL_CATEGORY)?;
    combination.add(
        "LANDFILL_OVERRIDE_APPLIED",
        schema::combination::LANDFILL_OVERRIDE_APPLIED,
    )?;
    m.add_submodule(&combination)?;

    // Layer mapping
    let layer_mapping = PyModule::new(m.py(), "layer_mapping")?;
    layer_mapping.add("GVFK_ID", schema::layer_mapping::GVFK_ID)?;
    layer_mapping.add("MODEL_LAYER", schema::layer_mapping::MODEL_LAYER)?;
    m.add_submodule(&layer_mapping)?;

    // Flux
    let flux = PyModule::new(m.py(), "flux")?;
    flux.add("DK_MODELLAG", schema::flux::DK_MODELLAG)?;
    flux.add(
        "INFILTRATION_MM_PER_YEAR",
        schema::flux::INFILTRATION_MM_PER_YEAR,
    )?;
    flux.add(
        "STANDARD_CONCENTRATION_UG_L",
        schema::flux::STANDARD_CONCENTRATION_UG_L,
    )?;
    flux.add("CONCENTRATION_SOURCE", schema::flux::CONCENTRATION_SOURCE)?;
    flux.add(
        "POLLUTION_FLUX_UG_PER_YEAR",
        schema::flux::POLLUTION_FLUX_UG_PER_YEAR,
    )?;
    flux.add(
        "POLLUTION_FLUX_KG_PER_YEAR",
        schema::flux::POLLUTION_FLUX_KG_PER_YEAR,
    )?;
    m.add_submodule(&flux)?;

    // Segment
    let segment = PyModule::new(m.py(), "segment")?;
    segment.add("TOTAL_FLUX_UG_PER_YEAR", schema::segment::TOTAL_FLUX_UG_PER_YEAR)?;
    segment.add("TOTAL_FLUX_KG_PER_YEAR", schema::segment::TOTAL_FLUX_KG_PER_YEAR)?;
    segment.add(
        "CONTRIBUTING_SITE_COUNT",
        schema::segment::CONTRIBUTING_SITE_COUNT,
    )?;
    segment.add("CONTRIBUTING_SITE_IDS", schema::segment::CONTRIBUTING_SITE_IDS)?;
    m.add_submodule(&segment)?;

    // Flow
    let flow = PyModule::new(m.py(), "flow")?;
    flow.add("OV_ID", schema::flow::OV_ID)?;
    flow.add("SCENARIO", schema::flow::SCENARIO)?;
    flow.add("FLOW_M3_S", schema::flow::FLOW_M3_S)?;
    m.add_submodule(&flow)?;

    // Cmix
    let cmix = PyModule::new(m.py(), "cmix")?;
    cmix.add("FLOW_SCENARIO", schema::cmix::FLOW_SCENARIO)?;
    cmix.add("HAS_FLOW_DATA", schema::cmix::HAS_FLOW_DATA)?;
    cmix.add("CMIX_UG_L", schema::cmix::CMIX_UG_L)?;
    cmix.add("MKK_UG_L", schema::cmix::MKK_UG_L)?;
    cmix.add("EXCEEDANCE_RATIO", schema::cmix::EXCEEDANCE_RATIO)?;
    cmix.add("EXCEEDANCE_FLAG", schema::cmix::EXCEEDANCE_FLAG)?;
    m.add_submodule(&cmix)?;

    // Audit
    let audit = PyModule::new(m.py(), "audit")?;
    audit.add("FILTER_STAGE", schema::audit::FILTER_STAGE)?;
    audit.add("FILTER_REASON", schema::audit::FILTER_REASON)?;
    m.add_submodule(&audit)?;

    Ok(())
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyRiskModel>()?;
    add_schema_exports(m)?;
    Ok(())
}
