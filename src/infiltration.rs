//! Infiltration inputs: aquifer → model-layer mapping and sampled
//! infiltration rates, plus the cleaning rules applied before flux.

use std::collections::HashMap;

use crate::config::NegativeInfiltrationPolicy;

/// Result of sampling infiltration for one site and model layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InfiltrationSample {
    /// mm/year, raw as sampled (may be negative).
    Value(f64),
    NoData,
}

/// Supplier of infiltration values, typically backed by raster sampling
/// done outside this crate.
pub trait InfiltrationSource {
    fn sample(&self, site_id: &str, layer: &str) -> InfiltrationSample;
}

/// Pre-sampled infiltration values keyed by (site, layer).
#[derive(Debug, Clone, Default)]
pub struct InfiltrationTable {
    values: HashMap<(String, String), Option<f64>>,
}

impl InfiltrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` records an explicit "no data" sample. Layer codes are matched
    /// case-insensitively.
    pub fn insert(&mut self, site_id: &str, layer: &str, value: Option<f64>) {
        let value = value.filter(|v| v.is_finite());
        self.values
            .insert((site_id.to_string(), layer.trim().to_lowercase()), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl InfiltrationSource for InfiltrationTable {
    fn sample(&self, site_id: &str, layer: &str) -> InfiltrationSample {
        match self
            .values
            .get(&(site_id.to_string(), layer.to_lowercase()))
        {
            Some(Some(v)) => InfiltrationSample::Value(*v),
            _ => InfiltrationSample::NoData,
        }
    }
}

/// Split a DK-modellag string into distinct lower-case layer codes.
///
/// Accepts `"ks2"`, `"kvs_0200/kvs_0400"` and `"Kalk: kalk; Ks2: ks2"`.
pub fn parse_dk_modellag(text: &str) -> Vec<String> {
    let text = text.trim();
    let parts: Vec<&str> = if text.contains(';') {
        text.split(';').collect()
    } else if text.contains('/') {
        text.split('/').collect()
    } else {
        vec![text]
    };

    let mut layers: Vec<String> = Vec::new();
    for part in parts {
        let code = match part.split_once(':') {
            Some((_, code)) => code,
            None => part,
        };
        let code = code.trim().to_lowercase();
        if !code.is_empty() && !layers.contains(&code) {
            layers.push(code);
        }
    }
    layers
}

/// Aquifer (GVFK) → model layers.
#[derive(Debug, Clone, Default)]
pub struct LayerMapping {
    layers: HashMap<String, Vec<String>>,
}

impl LayerMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one mapping row; repeated rows for an aquifer are merged.
    pub fn insert(&mut self, gvfk: &str, dk_modellag: &str) {
        let entry = self.layers.entry(gvfk.trim().to_string()).or_default();
        for layer in parse_dk_modellag(dk_modellag) {
            if !entry.contains(&layer) {
                entry.push(layer);
            }
        }
    }

    /// `None` when the aquifer is unmapped or maps to no usable layer code.
    pub fn layers(&self, gvfk: &str) -> Option<&[String]> {
        self.layers
            .get(gvfk)
            .filter(|l| !l.is_empty())
            .map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for LayerMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (gvfk, layers) in iter {
            mapping.insert(gvfk.as_ref(), layers.as_ref());
        }
        mapping
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CleanedInfiltration {
    Usable {
        mm_per_year: f64,
        clamped: bool,
        capped: bool,
    },
    /// Negative value under the exclude policy.
    Excluded(f64),
}

/// Apply the negative-value policy and the upper cap.
pub fn clean_infiltration(
    raw: f64,
    policy: NegativeInfiltrationPolicy,
    max_mm_per_year: f64,
) -> CleanedInfiltration {
    if raw < 0.0 {
        return match policy {
            NegativeInfiltrationPolicy::Clamp => CleanedInfiltration::Usable {
                mm_per_year: 0.0,
                clamped: true,
                capped: false,
            },
            NegativeInfiltrationPolicy::Exclude => CleanedInfiltration::Excluded(raw),
        };
    }
    if raw > max_mm_per_year {
        return CleanedInfiltration::Usable {
            mm_per_year: max_mm_per_year,
            clamped: false,
            capped: true,
        };
    }
    CleanedInfiltration::Usable {
        mm_per_year: raw,
        clamped: false,
        capped: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dk_modellag_formats() {
        assert_eq!(parse_dk_modellag("ks2"), vec!["ks2"]);
        assert_eq!(
            parse_dk_modellag("kvs_0200/kvs_0400"),
            vec!["kvs_0200", "kvs_0400"]
        );
        assert_eq!(
            parse_dk_modellag("Kalk: kalk; Ks2: ks2; Kalk: KALK"),
            vec!["kalk", "ks2"]
        );
        assert!(parse_dk_modellag("  ").is_empty());
    }

    #[test]
    fn layer_mapping_merges_rows() {
        let mapping: LayerMapping = [("dkmj_1", "ks1"), ("dkmj_1", "ks1/ks2"), ("dkmj_2", "")]
            .into_iter()
            .collect();
        assert_eq!(mapping.layers("dkmj_1").unwrap(), ["ks1", "ks2"]);
        assert!(mapping.layers("dkmj_2").is_none());
        assert!(mapping.layers("missing").is_none());
    }

    #[test]
    fn table_reports_no_data() {
        let mut table = InfiltrationTable::new();
        table.insert("S1", "KS1", Some(120.0));
        table.insert("S1", "ks2", None);
        table.insert("S1", "ks3", Some(f64::NAN));
        assert_eq!(table.sample("S1", "ks1"), InfiltrationSample::Value(120.0));
        assert_eq!(table.sample("S1", "ks2"), InfiltrationSample::NoData);
        assert_eq!(table.sample("S1", "ks3"), InfiltrationSample::NoData);
        assert_eq!(table.sample("S2", "ks1"), InfiltrationSample::NoData);
    }

    #[test]
    fn cleaning_clamps_caps_or_excludes() {
        use NegativeInfiltrationPolicy::*;
        assert_eq!(
            clean_infiltration(-50.0, Clamp, 750.0),
            CleanedInfiltration::Usable {
                mm_per_year: 0.0,
                clamped: true,
                capped: false
            }
        );
        assert_eq!(
            clean_infiltration(-50.0, Exclude, 750.0),
            CleanedInfiltration::Excluded(-50.0)
        );
        assert_eq!(
            clean_infiltration(900.0, Clamp, 750.0),
            CleanedInfiltration::Usable {
                mm_per_year: 750.0,
                clamped: false,
                capped: true
            }
        );
        assert_eq!(
            clean_infiltration(200.0, Exclude, 750.0),
            CleanedInfiltration::Usable {
                mm_per_year: 200.0,
                clamped: false,
                capped: false
            }
        );
    }
}
