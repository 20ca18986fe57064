/// Column-name constants for the risk and flux tables.
/// Single source of truth - shared by CSV I/O and the Python bindings.

// ── Site-distance input columns ─────────────────────────────────────────────
pub mod site {
    pub const SITE_ID: &str = "Lokalitet_ID";
    pub const GVFK: &str = "GVFK";
    pub const DISTANCE_TO_RIVER_M: &str = "Distance_to_River_m";
    pub const NEAREST_RIVER_OV_ID: &str = "Nearest_River_ov_id";
    pub const SUBSTANCES: &str = "Lokalitetensstoffer";
    pub const BRANCH: &str = "Lokalitetensbranche";
    pub const ACTIVITY: &str = "Lokalitetensaktivitet";
    pub const AREA_M2: &str = "Area_m2";
}

// ── Qualifying-combination columns ──────────────────────────────────────────
pub mod combination {
    pub const QUALIFYING_SUBSTANCE: &str = "Qualifying_Substance";
    pub const QUALIFYING_CATEGORY: &str = "Qualifying_Category";
    pub const CATEGORY_THRESHOLD_M: &str = "Category_Threshold_m";
    pub const WITHIN_THRESHOLD: &str = "Within_Threshold";
    pub const ORIGINAL_CATEGORY: &str = "Original_Category";
    pub const LANDFILL_OVERRIDE_APPLIED: &str = "Landfill_Override_Applied";
}

// ── Layer mapping columns ───────────────────────────────────────────────────
pub mod layer_mapping {
    pub const GVFK_ID: &str = "GVForekom";
    pub const MODEL_LAYER: &str = "dkmlag";
}

// ── Site-level flux columns ─────────────────────────────────────────────────
pub mod flux {
    pub const DK_MODELLAG: &str = "DK-modellag";
    pub const INFILTRATION_MM_PER_YEAR: &str = "Infiltration_mm_per_year";
    pub const STANDARD_CONCENTRATION_UG_L: &str = "Standard_Concentration_ug_L";
    pub const CONCENTRATION_SOURCE: &str = "Concentration_Source";
    pub const POLLUTION_FLUX_UG_PER_YEAR: &str = "Pollution_Flux_ug_per_year";
    pub const POLLUTION_FLUX_MG_PER_YEAR: &str = "Pollution_Flux_mg_per_year";
    pub const POLLUTION_FLUX_G_PER_YEAR: &str = "Pollution_Flux_g_per_year";
    pub const POLLUTION_FLUX_KG_PER_YEAR: &str = "Pollution_Flux_kg_per_year";
}

// ── Segment aggregation columns ─────────────────────────────────────────────
pub mod segment {
    pub const TOTAL_FLUX_UG_PER_YEAR: &str = "Total_Flux_ug_per_year";
    pub const TOTAL_FLUX_KG_PER_YEAR: &str = "Total_Flux_kg_per_year";
    pub const CONTRIBUTING_SITE_COUNT: &str = "Contributing_Site_Count";
    pub const CONTRIBUTING_SITE_IDS: &str = "Contributing_Site_IDs";
}

// ── Flow input columns ──────────────────────────────────────────────────────
pub mod flow {
    pub const OV_ID: &str = "ov_id";
    pub const SCENARIO: &str = "Scenario";
    pub const FLOW_M3_S: &str = "Flow_m3_s";
}

// ── Cmix / exceedance columns ───────────────────────────────────────────────
pub mod cmix {
    pub const FLOW_SCENARIO: &str = "Flow_Scenario";
    pub const HAS_FLOW_DATA: &str = "Has_Flow_Data";
    pub const CMIX_UG_L: &str = "Cmix_ug_L";
    pub const MKK_UG_L: &str = "MKK_ug_L";
    pub const EXCEEDANCE_RATIO: &str = "Exceedance_Ratio";
    pub const EXCEEDANCE_FLAG: &str = "Exceedance_Flag";
}

// ── Segment summary columns ─────────────────────────────────────────────────
pub mod summary {
    pub const MAX_CMIX_UG_L: &str = "Max_Cmix_ug_L";
    pub const MAX_EXCEEDANCE_RATIO: &str = "Max_Exceedance_Ratio";
    pub const PRIMARY_CMIX_UG_L: &str = "Primary_Cmix_ug_L";
    pub const PRIMARY_EXCEEDANCE_RATIO: &str = "Primary_Exceedance_Ratio";
    pub const CATEGORIES: &str = "Categories";
    pub const FLOW_SCENARIOS: &str = "Flow_Scenarios";
    pub const FAILING_SCENARIOS: &str = "Failing_Scenarios";
    pub const SITE_COUNT: &str = "Site_Count";
    pub const SITE_IDS: &str = "Site_IDs";
    pub const HAS_MKK_EXCEEDANCE: &str = "Has_MKK_Exceedance";
}

// ── Filtering audit columns ─────────────────────────────────────────────────
pub mod audit {
    pub const FILTER_STAGE: &str = "Filter_Stage";
    pub const FILTER_REASON: &str = "Filter_Reason";
}

// ── Category names with special handling ────────────────────────────────────
pub mod category {
    pub const ANDRE: &str = "ANDRE";
    pub const LOSSEPLADS: &str = "LOSSEPLADS";
}

// ── Substance label prefixes written by the risk filter ─────────────────────
pub mod prefix {
    pub const LANDFILL_OVERRIDE: &str = "Landfill Override:";
    pub const BRANCH_ACTIVITY: &str = "Branch/Activity:";
}
