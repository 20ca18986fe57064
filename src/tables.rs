//! DataFrame boundary: CSV files and polars frames in, typed records out,
//! and back again for every output table.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use polars::prelude::*;

use crate::aggregation::{join_unique, SegmentFlux};
use crate::error::RiskError;
use crate::flux::{FilterAudit, FluxRecord};
use crate::infiltration::{InfiltrationTable, LayerMapping};
use crate::mixing::{CmixRecord, FlowTable, SegmentSummary, SiteExceedance};
use crate::risk_filter::{QualifyingCombination, SiteDistanceRecord, ThresholdSummary};
use crate::schema::*;

// ── CSV helpers ─────────────────────────────────────────────────────────────

/// Load any CSV with all columns as strings and trimmed column names.
/// `rename` maps source column names to the names used here; aliases for
/// columns the file does not have are ignored.
pub fn read_csv_as_strings(
    path: &Path,
    rename: &BTreeMap<String, String>,
) -> Result<DataFrame, RiskError> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;

    if !rename.is_empty() {
        let old: Vec<&str> = rename.keys().map(String::as_str).collect();
        let new: Vec<&str> = rename.values().map(String::as_str).collect();
        df = df.lazy().rename(old, new, false).collect()?;
    }
    Ok(df)
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), RiskError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), RiskError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(RiskError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

fn require_rows(df: &DataFrame, what: &str) -> Result<(), RiskError> {
    if df.height() == 0 {
        return Err(RiskError::EmptyDataset(what.to_string()));
    }
    Ok(())
}

/// Column as strings regardless of its dtype, so frames coming from Python
/// with numeric columns read the same as CSV input.
fn strings(df: &DataFrame, name: &str) -> Result<StringChunked, RiskError> {
    let col = df
        .column(name)
        .map_err(|_| RiskError::MissingColumn(name.to_string()))?;
    Ok(col.cast(&DataType::String)?.str()?.clone())
}

fn optional_strings(df: &DataFrame, name: &str) -> Result<Option<StringChunked>, RiskError> {
    if df.column(name).is_err() {
        return Ok(None);
    }
    strings(df, name).map(Some)
}

fn cell(ca: &StringChunked, i: usize) -> Option<&str> {
    ca.get(i).map(str::trim).filter(|s| !s.is_empty())
}

fn required_cell<'a>(ca: &'a StringChunked, column: &str, i: usize) -> Result<&'a str, RiskError> {
    cell(ca, i).ok_or_else(|| RiskError::InvalidValue {
        column: column.to_string(),
        row: i,
        value: String::new(),
    })
}

fn parse_f64(text: &str, column: &str, row: usize) -> Result<f64, RiskError> {
    text.parse::<f64>().map_err(|_| RiskError::InvalidValue {
        column: column.to_string(),
        row,
        value: text.to_string(),
    })
}

// ── Inputs ──────────────────────────────────────────────────────────────────

pub fn site_distances_from_frame(df: &DataFrame) -> Result<Vec<SiteDistanceRecord>, RiskError> {
    require_columns(
        df,
        &[
            site::SITE_ID,
            site::GVFK,
            site::DISTANCE_TO_RIVER_M,
            site::NEAREST_RIVER_OV_ID,
        ],
    )?;
    require_rows(df, "site distances")?;

    let ids = strings(df, site::SITE_ID)?;
    let gvfk = strings(df, site::GVFK)?;
    let distance = strings(df, site::DISTANCE_TO_RIVER_M)?;
    let segment = strings(df, site::NEAREST_RIVER_OV_ID)?;
    let substances = optional_strings(df, site::SUBSTANCES)?;
    let branch = optional_strings(df, site::BRANCH)?;
    let activity = optional_strings(df, site::ACTIVITY)?;
    let opt = |ca: &Option<StringChunked>, i: usize| -> Option<String> {
        ca.as_ref().and_then(|c| cell(c, i)).map(String::from)
    };

    (0..df.height())
        .map(|i| {
            let d = required_cell(&distance, site::DISTANCE_TO_RIVER_M, i)?;
            Ok(SiteDistanceRecord {
                site_id: required_cell(&ids, site::SITE_ID, i)?.to_string(),
                gvfk: required_cell(&gvfk, site::GVFK, i)?.to_string(),
                distance_m: parse_f64(d, site::DISTANCE_TO_RIVER_M, i)?,
                segment_id: required_cell(&segment, site::NEAREST_RIVER_OV_ID, i)?.to_string(),
                substances: opt(&substances, i),
                branch: opt(&branch, i),
                activity: opt(&activity, i),
            })
        })
        .collect()
}

/// Site id → area (m²). A later row for the same site wins.
pub fn site_areas_from_frame(df: &DataFrame) -> Result<HashMap<String, f64>, RiskError> {
    require_columns(df, &[site::SITE_ID, site::AREA_M2])?;
    let ids = strings(df, site::SITE_ID)?;
    let areas = strings(df, site::AREA_M2)?;
    let mut out = HashMap::with_capacity(df.height());
    for i in 0..df.height() {
        let id = required_cell(&ids, site::SITE_ID, i)?;
        let area = parse_f64(required_cell(&areas, site::AREA_M2, i)?, site::AREA_M2, i)?;
        out.insert(id.to_string(), area);
    }
    Ok(out)
}

/// Rows with an empty aquifer id are skipped.
pub fn layer_mapping_from_frame(df: &DataFrame) -> Result<LayerMapping, RiskError> {
    require_columns(df, &[layer_mapping::GVFK_ID, layer_mapping::MODEL_LAYER])?;
    let gvfk = strings(df, layer_mapping::GVFK_ID)?;
    let layers = strings(df, layer_mapping::MODEL_LAYER)?;
    let mut mapping = LayerMapping::new();
    for i in 0..df.height() {
        if let Some(g) = cell(&gvfk, i) {
            mapping.insert(g, cell(&layers, i).unwrap_or(""));
        }
    }
    Ok(mapping)
}

/// An empty infiltration cell is an explicit "no data" sample.
pub fn infiltration_from_frame(df: &DataFrame) -> Result<InfiltrationTable, RiskError> {
    require_columns(
        df,
        &[site::SITE_ID, flux::DK_MODELLAG, flux::INFILTRATION_MM_PER_YEAR],
    )?;
    let ids = strings(df, site::SITE_ID)?;
    let layers = strings(df, flux::DK_MODELLAG)?;
    let values = strings(df, flux::INFILTRATION_MM_PER_YEAR)?;
    let mut table = InfiltrationTable::new();
    for i in 0..df.height() {
        let id = required_cell(&ids, site::SITE_ID, i)?;
        let layer = required_cell(&layers, flux::DK_MODELLAG, i)?;
        let value = cell(&values, i)
            .map(|v| parse_f64(v, flux::INFILTRATION_MM_PER_YEAR, i))
            .transpose()?;
        table.insert(id, layer, value);
    }
    Ok(table)
}

/// Empty flow cells are skipped.
pub fn flows_from_frame(df: &DataFrame) -> Result<FlowTable, RiskError> {
    require_columns(df, &[flow::OV_ID, flow::SCENARIO, flow::FLOW_M3_S])?;
    let ids = strings(df, flow::OV_ID)?;
    let scenarios = strings(df, flow::SCENARIO)?;
    let values = strings(df, flow::FLOW_M3_S)?;
    let mut table = FlowTable::new();
    for i in 0..df.height() {
        let id = required_cell(&ids, flow::OV_ID, i)?;
        let scenario = required_cell(&scenarios, flow::SCENARIO, i)?;
        if let Some(v) = cell(&values, i) {
            table.insert(id, scenario, parse_f64(v, flow::FLOW_M3_S, i)?);
        }
    }
    Ok(table)
}

// ── Outputs ─────────────────────────────────────────────────────────────────

fn joined(values: &[String]) -> String {
    join_unique(values.iter().map(String::as_str), ", ")
}

fn text<T>(rows: &[T], f: impl Fn(&T) -> String) -> Vec<String> {
    rows.iter().map(f).collect()
}

pub fn site_distances_frame(rows: &[SiteDistanceRecord]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(site::SITE_ID.into(), &text(rows, |r| r.site_id.clone())),
        Column::new(site::GVFK.into(), &text(rows, |r| r.gvfk.clone())),
        Column::new(
            site::DISTANCE_TO_RIVER_M.into(),
            &rows.iter().map(|r| r.distance_m).collect::<Vec<_>>(),
        ),
        Column::new(site::NEAREST_RIVER_OV_ID.into(), &text(rows, |r| r.segment_id.clone())),
        Column::new(
            site::SUBSTANCES.into(),
            &rows.iter().map(|r| r.substances.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            site::BRANCH.into(),
            &rows.iter().map(|r| r.branch.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            site::ACTIVITY.into(),
            &rows.iter().map(|r| r.activity.clone()).collect::<Vec<_>>(),
        ),
    ])
}

pub fn combinations_frame(rows: &[QualifyingCombination]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(site::SITE_ID.into(), &text(rows, |r| r.site_id.clone())),
        Column::new(site::GVFK.into(), &text(rows, |r| r.gvfk.clone())),
        Column::new(
            combination::QUALIFYING_SUBSTANCE.into(),
            &text(rows, |r| r.substance.clone()),
        ),
        Column::new(
            combination::QUALIFYING_CATEGORY.into(),
            &text(rows, |r| r.category.clone()),
        ),
        Column::new(
            combination::CATEGORY_THRESHOLD_M.into(),
            &rows.iter().map(|r| r.threshold_m).collect::<Vec<_>>(),
        ),
        Column::new(
            site::DISTANCE_TO_RIVER_M.into(),
            &rows.iter().map(|r| r.distance_m).collect::<Vec<_>>(),
        ),
        Column::new(site::NEAREST_RIVER_OV_ID.into(), &text(rows, |r| r.segment_id.clone())),
        Column::new(
            combination::WITHIN_THRESHOLD.into(),
            &rows.iter().map(|r| r.within_threshold).collect::<Vec<_>>(),
        ),
        Column::new(
            combination::ORIGINAL_CATEGORY.into(),
            &rows
                .iter()
                .map(|r| r.original_category.clone())
                .collect::<Vec<_>>(),
        ),
        Column::new(
            combination::LANDFILL_OVERRIDE_APPLIED.into(),
            &rows.iter().map(|r| r.landfill_override).collect::<Vec<_>>(),
        ),
        Column::new(
            site::BRANCH.into(),
            &rows.iter().map(|r| r.branch.clone()).collect::<Vec<_>>(),
        ),
        Column::new(
            site::ACTIVITY.into(),
            &rows.iter().map(|r| r.activity.clone()).collect::<Vec<_>>(),
        ),
    ])
}

pub fn flux_frame(rows: &[FluxRecord]) -> PolarsResult<DataFrame> {
    let num = |f: fn(&FluxRecord) -> f64| rows.iter().map(f).collect::<Vec<f64>>();
    DataFrame::new(vec![
        Column::new(site::SITE_ID.into(), &text(rows, |r| r.site_id.clone())),
        Column::new(site::GVFK.into(), &text(rows, |r| r.gvfk.clone())),
        Column::new(flux::DK_MODELLAG.into(), &text(rows, |r| r.layer.clone())),
        Column::new(
            combination::QUALIFYING_SUBSTANCE.into(),
            &text(rows, |r| r.substance.clone()),
        ),
        Column::new(
            combination::QUALIFYING_CATEGORY.into(),
            &text(rows, |r| r.category.clone()),
        ),
        Column::new(site::NEAREST_RIVER_OV_ID.into(), &text(rows, |r| r.segment_id.clone())),
        Column::new(site::DISTANCE_TO_RIVER_M.into(), &num(|r| r.distance_m)),
        Column::new(site::AREA_M2.into(), &num(|r| r.area_m2)),
        Column::new(
            flux::INFILTRATION_MM_PER_YEAR.into(),
            &num(|r| r.infiltration_mm_per_year),
        ),
        Column::new(
            flux::STANDARD_CONCENTRATION_UG_L.into(),
            &num(|r| r.concentration_ug_l),
        ),
        Column::new(
            flux::CONCENTRATION_SOURCE.into(),
            &text(rows, |r| r.concentration_source.clone()),
        ),
        Column::new(
            flux::POLLUTION_FLUX_UG_PER_YEAR.into(),
            &num(|r| r.flux_ug_per_year),
        ),
        Column::new(
            flux::POLLUTION_FLUX_MG_PER_YEAR.into(),
            &num(FluxRecord::flux_mg_per_year),
        ),
        Column::new(
            flux::POLLUTION_FLUX_G_PER_YEAR.into(),
            &num(FluxRecord::flux_g_per_year),
        ),
        Column::new(
            flux::POLLUTION_FLUX_KG_PER_YEAR.into(),
            &num(FluxRecord::flux_kg_per_year),
        ),
    ])
}

pub fn segment_flux_frame(rows: &[SegmentFlux]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(
            site::NEAREST_RIVER_OV_ID.into(),
            &text(rows, |r| r.key.segment_id.clone()),
        ),
        Column::new(site::GVFK.into(), &text(rows, |r| r.key.gvfk.clone())),
        Column::new(flux::DK_MODELLAG.into(), &text(rows, |r| r.key.layer.clone())),
        Column::new(
            combination::QUALIFYING_CATEGORY.into(),
            &text(rows, |r| r.key.category.clone()),
        ),
        Column::new(
            combination::QUALIFYING_SUBSTANCE.into(),
            &text(rows, |r| r.key.substance.clone()),
        ),
        Column::new(
            segment::TOTAL_FLUX_UG_PER_YEAR.into(),
            &rows
                .iter()
                .map(|r| r.total_flux_ug_per_year)
                .collect::<Vec<_>>(),
        ),
        Column::new(
            segment::TOTAL_FLUX_KG_PER_YEAR.into(),
            &rows
                .iter()
                .map(SegmentFlux::total_flux_kg_per_year)
                .collect::<Vec<_>>(),
        ),
        Column::new(
            segment::CONTRIBUTING_SITE_COUNT.into(),
            &rows.iter().map(|r| r.site_count() as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            segment::CONTRIBUTING_SITE_IDS.into(),
            &text(rows, SegmentFlux::site_ids_joined),
        ),
    ])
}

pub fn cmix_frame(rows: &[CmixRecord]) -> PolarsResult<DataFrame> {
    let opt = |f: fn(&CmixRecord) -> Option<f64>| rows.iter().map(f).collect::<Vec<_>>();
    DataFrame::new(vec![
        Column::new(site::NEAREST_RIVER_OV_ID.into(), &text(rows, |r| r.segment_id.clone())),
        Column::new(
            combination::QUALIFYING_CATEGORY.into(),
            &text(rows, |r| r.category.clone()),
        ),
        Column::new(
            combination::QUALIFYING_SUBSTANCE.into(),
            &text(rows, |r| r.substance.clone()),
        ),
        Column::new(cmix::FLOW_SCENARIO.into(), &text(rows, |r| r.scenario.clone())),
        Column::new(
            segment::TOTAL_FLUX_UG_PER_YEAR.into(),
            &rows
                .iter()
                .map(|r| r.total_flux_ug_per_year)
                .collect::<Vec<_>>(),
        ),
        Column::new(flow::FLOW_M3_S.into(), &opt(|r| r.flow_m3_s)),
        Column::new(
            cmix::HAS_FLOW_DATA.into(),
            &rows.iter().map(|r| r.has_flow_data).collect::<Vec<_>>(),
        ),
        Column::new(cmix::CMIX_UG_L.into(), &opt(|r| r.cmix_ug_l)),
        Column::new(cmix::MKK_UG_L.into(), &opt(|r| r.mkk_ug_l)),
        Column::new(cmix::EXCEEDANCE_RATIO.into(), &opt(|r| r.exceedance_ratio)),
        Column::new(
            cmix::EXCEEDANCE_FLAG.into(),
            &rows.iter().map(|r| r.exceedance_flag).collect::<Vec<_>>(),
        ),
    ])
}

pub fn segment_summary_frame(rows: &[SegmentSummary]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(site::NEAREST_RIVER_OV_ID.into(), &text(rows, |r| r.segment_id.clone())),
        Column::new(
            segment::TOTAL_FLUX_KG_PER_YEAR.into(),
            &rows
                .iter()
                .map(|r| r.total_flux_kg_per_year)
                .collect::<Vec<_>>(),
        ),
        Column::new(
            summary::MAX_CMIX_UG_L.into(),
            &rows.iter().map(|r| r.max_cmix_ug_l).collect::<Vec<_>>(),
        ),
        Column::new(
            summary::MAX_EXCEEDANCE_RATIO.into(),
            &rows
                .iter()
                .map(|r| r.max_exceedance_ratio)
                .collect::<Vec<_>>(),
        ),
        Column::new(
            summary::PRIMARY_CMIX_UG_L.into(),
            &rows.iter().map(|r| r.primary_cmix_ug_l).collect::<Vec<_>>(),
        ),
        Column::new(
            summary::PRIMARY_EXCEEDANCE_RATIO.into(),
            &rows
                .iter()
                .map(|r| r.primary_exceedance_ratio)
                .collect::<Vec<_>>(),
        ),
        Column::new(summary::CATEGORIES.into(), &text(rows, |r| joined(&r.categories))),
        Column::new(summary::FLOW_SCENARIOS.into(), &text(rows, |r| joined(&r.flow_scenarios))),
        Column::new(
            summary::FAILING_SCENARIOS.into(),
            &text(rows, |r| joined(&r.failing_scenarios)),
        ),
        Column::new(
            summary::SITE_COUNT.into(),
            &rows.iter().map(|r| r.site_ids.len() as u64).collect::<Vec<_>>(),
        ),
        Column::new(summary::SITE_IDS.into(), &text(rows, |r| joined(&r.site_ids))),
        Column::new(
            summary::HAS_MKK_EXCEEDANCE.into(),
            &rows.iter().map(|r| r.has_exceedance).collect::<Vec<_>>(),
        ),
    ])
}

pub fn site_exceedance_frame(rows: &[SiteExceedance]) -> PolarsResult<DataFrame> {
    let opt = |f: fn(&SiteExceedance) -> Option<f64>| rows.iter().map(f).collect::<Vec<_>>();
    DataFrame::new(vec![
        Column::new(site::GVFK.into(), &text(rows, |r| r.gvfk.clone())),
        Column::new(site::SITE_ID.into(), &text(rows, |r| r.site_id.clone())),
        Column::new(flux::DK_MODELLAG.into(), &text(rows, |r| r.layer.clone())),
        Column::new(
            combination::QUALIFYING_CATEGORY.into(),
            &text(rows, |r| r.category.clone()),
        ),
        Column::new(
            combination::QUALIFYING_SUBSTANCE.into(),
            &text(rows, |r| r.substance.clone()),
        ),
        Column::new(
            flux::POLLUTION_FLUX_KG_PER_YEAR.into(),
            &rows
                .iter()
                .map(|r| r.site_flux_kg_per_year)
                .collect::<Vec<_>>(),
        ),
        Column::new(site::NEAREST_RIVER_OV_ID.into(), &text(rows, |r| r.segment_id.clone())),
        Column::new(cmix::FLOW_SCENARIO.into(), &text(rows, |r| r.scenario.clone())),
        Column::new(flow::FLOW_M3_S.into(), &opt(|r| r.flow_m3_s)),
        Column::new(cmix::CMIX_UG_L.into(), &opt(|r| r.cmix_ug_l)),
        Column::new(cmix::MKK_UG_L.into(), &opt(|r| r.mkk_ug_l)),
        Column::new(cmix::EXCEEDANCE_RATIO.into(), &opt(|r| r.exceedance_ratio)),
        Column::new(
            segment::TOTAL_FLUX_KG_PER_YEAR.into(),
            &rows
                .iter()
                .map(|r| r.segment_flux_kg_per_year)
                .collect::<Vec<_>>(),
        ),
        Column::new(
            site::DISTANCE_TO_RIVER_M.into(),
            &rows.iter().map(|r| r.distance_m).collect::<Vec<_>>(),
        ),
    ])
}

pub fn audit_frame(audit: &FilterAudit) -> PolarsResult<DataFrame> {
    let rows = audit.entries();
    DataFrame::new(vec![
        Column::new(site::SITE_ID.into(), &text(rows, |r| r.site_id.clone())),
        Column::new(site::GVFK.into(), &text(rows, |r| r.gvfk.clone())),
        Column::new(
            combination::QUALIFYING_CATEGORY.into(),
            &text(rows, |r| r.category.clone()),
        ),
        Column::new(
            combination::QUALIFYING_SUBSTANCE.into(),
            &text(rows, |r| r.substance.clone()),
        ),
        Column::new(site::NEAREST_RIVER_OV_ID.into(), &text(rows, |r| r.segment_id.clone())),
        Column::new(audit::FILTER_STAGE.into(), &text(rows, |r| r.stage.to_string())),
        Column::new(audit::FILTER_REASON.into(), &text(rows, |r| r.reason.clone())),
    ])
}

pub fn threshold_summary_frame(rows: &[ThresholdSummary]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new(
            "Threshold_m".into(),
            &rows.iter().map(|r| r.threshold_m).collect::<Vec<_>>(),
        ),
        Column::new(
            "Combinations".into(),
            &rows.iter().map(|r| r.combinations as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "Sites".into(),
            &rows.iter().map(|r| r.sites as u64).collect::<Vec<_>>(),
        ),
        Column::new(
            "GVFKs".into(),
            &rows.iter().map(|r| r.aquifers as u64).collect::<Vec<_>>(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(cols: &[(&str, &[&str])]) -> DataFrame {
        DataFrame::new(
            cols.iter()
                .map(|(name, values)| {
                    let v: Vec<String> = values.iter().map(|s| s.to_string()).collect();
                    Column::new((*name).into(), &v)
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn site_distances_parse_optional_columns() {
        let df = frame(&[
            (site::SITE_ID, &["S1", "S2"]),
            (site::GVFK, &["G1", "G2"]),
            (site::DISTANCE_TO_RIVER_M, &["12.5", " 300 "]),
            (site::NEAREST_RIVER_OV_ID, &["R1", "R2"]),
            (site::SUBSTANCES, &["Benzen; Toluen", ""]),
        ]);
        let rows = site_distances_from_frame(&df).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].distance_m, 12.5);
        assert_eq!(rows[0].substance_tokens(), ["Benzen", "Toluen"]);
        assert_eq!(rows[1].distance_m, 300.0);
        assert!(rows[1].substances.is_none());
        assert!(rows[1].branch.is_none());
    }

    #[test]
    fn missing_column_and_bad_value() {
        let df = frame(&[(site::SITE_ID, &["S1"]), (site::GVFK, &["G1"])]);
        assert!(matches!(
            site_distances_from_frame(&df),
            Err(RiskError::MissingColumn(c)) if c == site::DISTANCE_TO_RIVER_M
        ));

        let df = frame(&[
            (site::SITE_ID, &["S1"]),
            (site::GVFK, &["G1"]),
            (site::DISTANCE_TO_RIVER_M, &["far"]),
            (site::NEAREST_RIVER_OV_ID, &["R1"]),
        ]);
        assert!(matches!(
            site_distances_from_frame(&df),
            Err(RiskError::InvalidValue { row: 0, .. })
        ));
    }

    #[test]
    fn numeric_columns_are_accepted() {
        let df = DataFrame::new(vec![
            Column::new(site::SITE_ID.into(), &["S1".to_string()]),
            Column::new(site::AREA_M2.into(), &[250.0f64]),
        ])
        .unwrap();
        let areas = site_areas_from_frame(&df).unwrap();
        assert_eq!(areas["S1"], 250.0);
    }

    #[test]
    fn empty_infiltration_cell_is_no_data() {
        use crate::infiltration::{InfiltrationSample, InfiltrationSource};
        let df = frame(&[
            (site::SITE_ID, &["S1", "S1"]),
            (flux::DK_MODELLAG, &["ks1", "ks2"]),
            (flux::INFILTRATION_MM_PER_YEAR, &["-12", ""]),
        ]);
        let table = infiltration_from_frame(&df).unwrap();
        assert_eq!(table.sample("S1", "ks1"), InfiltrationSample::Value(-12.0));
        assert_eq!(table.sample("S1", "ks2"), InfiltrationSample::NoData);
    }

    #[test]
    fn output_frames_carry_stable_columns() {
        let df = cmix_frame(&[]).unwrap();
        let names: Vec<&str> = df.get_column_names_str();
        for required in [
            site::NEAREST_RIVER_OV_ID,
            combination::QUALIFYING_SUBSTANCE,
            cmix::CMIX_UG_L,
            cmix::MKK_UG_L,
            cmix::EXCEEDANCE_RATIO,
        ] {
            assert!(names.contains(&required), "{required}");
        }
    }
}
