//! Standard source concentrations (µg/L) used by the flux calculation.
//!
//! Resolution order, first hit wins:
//!   1. branch/activity + substance
//!   2. landfill context: substance, then category
//!   3. modelled compound named by the substance text
//!   4. category scenario (a modelled substance standing in for the category)
//!   5. category fallback
//!
//! A value `<= 0` at any level means "no valid concentration".

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::normalize;
use crate::error::RiskError;
use crate::risk_filter::split_list;
use crate::schema::prefix;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityConcentration {
    pub industry: String,
    pub substance: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScenario {
    pub category: String,
    /// Modelled substances, in preference order. Each must be in `compounds`.
    pub substances: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConcentrationSource {
    ActivitySubstance { industry: String, substance: String },
    LandfillSubstance(String),
    LandfillCategory(String),
    Compound(String),
    CategoryScenario { category: String, substance: String },
    Category(String),
}

impl fmt::Display for ConcentrationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActivitySubstance {
                industry,
                substance,
            } => write!(f, "activity:{industry}_{substance}"),
            Self::LandfillSubstance(s) => write!(f, "landfill:{s}"),
            Self::LandfillCategory(c) => write!(f, "landfill:{c}"),
            Self::Compound(s) => write!(f, "compound:{s}"),
            Self::CategoryScenario {
                category,
                substance,
            } => write!(f, "scenario:{category}__via_{substance}"),
            Self::Category(c) => write!(f, "category:{c}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConcentration {
    pub value_ug_l: f64,
    pub source: ConcentrationSource,
}

/// Lookup context for one combination row.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcentrationQuery<'a> {
    pub substance: &'a str,
    pub category: &'a str,
    /// Category before a landfill override relabelled the row.
    pub original_category: Option<&'a str>,
    pub branch: Option<&'a str>,
    pub activity: Option<&'a str>,
    pub landfill: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardConcentrations {
    #[serde(rename = "activity")]
    activities: Vec<ActivityConcentration>,
    landfill_substances: BTreeMap<String, f64>,
    landfill_categories: BTreeMap<String, f64>,
    compounds: BTreeMap<String, f64>,
    #[serde(rename = "scenario")]
    scenarios: Vec<CategoryScenario>,
    category_fallback: BTreeMap<String, f64>,
}

/// Remove the labels the risk filter puts in front of derived substances.
pub fn strip_substance_prefix(substance: &str) -> &str {
    let s = substance.trim();
    for p in [prefix::LANDFILL_OVERRIDE, prefix::BRANCH_ACTIVITY] {
        if let Some(rest) = s.strip_prefix(p) {
            return rest.trim();
        }
    }
    s
}

impl StandardConcentrations {
    pub fn from_toml_str(text: &str) -> Result<Self, RiskError> {
        let table: Self = toml::from_str(text)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, RiskError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), RiskError> {
        for scenario in &self.scenarios {
            for s in &scenario.substances {
                if self.compound(s).is_none() {
                    return Err(RiskError::Config(format!(
                        "scenario substance {s} of {} has no compound concentration",
                        scenario.category
                    )));
                }
            }
        }
        Ok(())
    }

    /// Modelled substances of a category, in preference order.
    pub fn scenarios(&self, category: &str) -> &[String] {
        self.scenarios
            .iter()
            .find(|s| s.category == category)
            .map(|s| s.substances.as_slice())
            .unwrap_or(&[])
    }

    fn compound(&self, substance: &str) -> Option<(&str, f64)> {
        let key = normalize(substance);
        self.compounds
            .iter()
            .find(|(name, _)| normalize(name) == key)
            .map(|(name, v)| (name.as_str(), *v))
    }

    fn activity(&self, industry: &str, substance: &str) -> Option<&ActivityConcentration> {
        let (i, s) = (normalize(industry), normalize(substance));
        self.activities
            .iter()
            .find(|a| normalize(&a.industry) == i && normalize(&a.substance) == s)
    }

    fn landfill_substance(&self, substance: &str) -> Option<(&str, f64)> {
        let key = normalize(substance);
        self.landfill_substances
            .iter()
            .find(|(name, _)| normalize(name) == key)
            .map(|(name, v)| (name.as_str(), *v))
    }

    pub fn resolve(&self, q: &ConcentrationQuery<'_>) -> Option<ResolvedConcentration> {
        let substance = strip_substance_prefix(q.substance);
        let category = q.original_category.unwrap_or(q.category);
        let normalized = normalize(substance);

        let compound = self.compound(substance);
        // Landfill rows carry a category label, not a substance, so they only
        // get a scenario when the text names one.
        let scenario = {
            let names = self.scenarios(category);
            names
                .iter()
                .find(|name| normalized.contains(&normalize(name)))
                .or_else(|| if q.landfill { None } else { names.first() })
        };
        let modelled = compound
            .map(|(name, _)| name)
            .or(scenario.map(String::as_str));

        let found = |value: f64, source: ConcentrationSource| {
            (value > 0.0).then_some(ResolvedConcentration {
                value_ug_l: value,
                source,
            })
        };

        // 1. branch/activity + substance
        let industries = [q.branch, q.activity]
            .into_iter()
            .flatten()
            .flat_map(split_list);
        for industry in industries {
            for name in std::iter::once(substance).chain(modelled) {
                if let Some(a) = self.activity(industry, name) {
                    return found(
                        a.value,
                        ConcentrationSource::ActivitySubstance {
                            industry: a.industry.clone(),
                            substance: a.substance.clone(),
                        },
                    );
                }
            }
        }

        // 2. landfill context
        if q.landfill {
            let lookup = modelled.unwrap_or(substance);
            if let Some((name, v)) = self.landfill_substance(lookup) {
                return found(v, ConcentrationSource::LandfillSubstance(name.to_string()));
            }
            if let Some(v) = self.landfill_categories.get(category) {
                return found(*v, ConcentrationSource::LandfillCategory(category.to_string()));
            }
        }

        // 3. compound named directly
        if let Some((name, v)) = compound {
            return found(v, ConcentrationSource::Compound(name.to_string()));
        }

        // 4. category scenario
        if let Some(name) = scenario {
            if let Some((name, v)) = self.compound(name) {
                return found(
                    v,
                    ConcentrationSource::CategoryScenario {
                        category: category.to_string(),
                        substance: name.to_string(),
                    },
                );
            }
        }

        // 5. category fallback
        self.category_fallback
            .get(category)
            .and_then(|v| found(*v, ConcentrationSource::Category(category.to_string())))
    }

    /// Delprojekt 3 (Bilag D3) standard concentrations.
    pub fn builtin() -> Self {
        let map = |rows: &[(&str, f64)]| -> BTreeMap<String, f64> {
            rows.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        let activities = [
            ("Servicestationer", "Benzen", 8000.0),
            ("Benzin og olie, salg af", "Benzen", 8000.0),
            ("Villaolietank", "Olie C10-C25", 6000.0),
            ("Renserier", "Trichlorethylen", 42000.0),
            ("Renserier", "Tetrachlorethylen", 2500.0),
            ("Maskinindustri", "Toluen", 1200.0),
        ]
        .iter()
        .map(|(i, s, v)| ActivityConcentration {
            industry: i.to_string(),
            substance: s.to_string(),
            value: *v,
        })
        .collect();

        let scenarios = [
            ("BTXER", &["Benzen", "Olie C10-C25"][..]),
            (
                "KLOREDE_KULBRINTER",
                &["1,1,1-Trichlorethan", "Trichlorethylen", "Chloroform", "Chlorbenzen"][..],
            ),
            ("POLARE_FORBINDELSER", &["MTBE", "4-Nonylphenol"][..]),
            ("PHENOLER", &["Phenol"][..]),
            ("KLOREREDE_PHENOLER", &["2,6-dichlorphenol"][..]),
            ("PESTICIDER", &["Mechlorprop", "Atrazin"][..]),
            ("PAH_FORBINDELSER", &["Fluoranthen"][..]),
            ("UORGANISKE_FORBINDELSER", &["Arsen", "Cyanid"][..]),
        ]
        .iter()
        .map(|(c, s)| CategoryScenario {
            category: c.to_string(),
            substances: s.iter().map(|x| x.to_string()).collect(),
        })
        .collect();

        Self {
            activities,
            landfill_substances: map(&[
                ("Benzen", 17.0),
                ("Olie C10-C25", 2500.0),
                ("Trichlorethylen", 2.2),
                ("Phenol", 6.4),
                ("Arsen", 25.0),
                ("COD", 380000.0),
            ]),
            landfill_categories: map(&[
                ("BTXER", 3000.0),
                ("PAH_FORBINDELSER", 2500.0),
                ("UORGANISKE_FORBINDELSER", 1800.0),
                ("PHENOLER", 1500.0),
                ("KLOREDE_KULBRINTER", 2800.0),
                ("PESTICIDER", 1000.0),
            ]),
            compounds: map(&[
                ("Olie C10-C25", 3000.0),
                ("Benzen", 400.0),
                ("1,1,1-Trichlorethan", 100.0),
                ("Trichlorethylen", 42000.0),
                ("Chloroform", 100.0),
                ("Chlorbenzen", 100.0),
                ("Phenol", 1300.0),
                ("4-Nonylphenol", 9.0),
                ("2,6-dichlorphenol", 10000.0),
                ("MTBE", 50000.0),
                ("Fluoranthen", 30.0),
                ("Mechlorprop", 1000.0),
                ("Atrazin", 12.0),
                ("Arsen", 100.0),
                ("Cyanid", 3500.0),
                ("COD", 380000.0),
            ]),
            scenarios,
            category_fallback: map(&[("LOSSEPLADS", -1.0), ("ANDRE", -1.0), ("PFAS", -1.0)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query<'a>(substance: &'a str, category: &'a str) -> ConcentrationQuery<'a> {
        ConcentrationQuery {
            substance,
            category,
            ..Default::default()
        }
    }

    #[test]
    fn compound_named_directly() {
        let t = StandardConcentrations::builtin();
        let r = t.resolve(&query("benzen", "BTXER")).unwrap();
        assert_eq!(r.value_ug_l, 400.0);
        assert_eq!(r.source, ConcentrationSource::Compound("Benzen".into()));
        assert_eq!(r.source.to_string(), "compound:Benzen");
    }

    #[test]
    fn activity_beats_compound() {
        let t = StandardConcentrations::builtin();
        let q = ConcentrationQuery {
            branch: Some("Autoværksteder; Servicestationer"),
            ..query("Benzen", "BTXER")
        };
        assert_eq!(t.resolve(&q).unwrap().value_ug_l, 8000.0);

        let q = ConcentrationQuery {
            activity: Some("Maskinindustri"),
            ..query("Toluen", "BTXER")
        };
        assert_eq!(t.resolve(&q).unwrap().value_ug_l, 1200.0);
    }

    #[test]
    fn category_scenario_by_name_or_first() {
        let t = StandardConcentrations::builtin();
        let r = t.resolve(&query("Toluen", "BTXER")).unwrap();
        assert_eq!(r.value_ug_l, 400.0);
        assert_eq!(r.source.to_string(), "scenario:BTXER__via_Benzen");

        let r = t.resolve(&query("Total olie C10-C25 fraktion", "BTXER")).unwrap();
        assert_eq!(r.value_ug_l, 3000.0);

        let r = t.resolve(&query("Tetrachlorethylen", "KLOREDE_KULBRINTER")).unwrap();
        assert_eq!(r.value_ug_l, 100.0);
    }

    #[test]
    fn landfill_context_uses_landfill_table() {
        let t = StandardConcentrations::builtin();
        let q = ConcentrationQuery {
            landfill: true,
            ..query("Arsen", "UORGANISKE_FORBINDELSER")
        };
        assert_eq!(t.resolve(&q).unwrap().value_ug_l, 25.0);

        let q = ConcentrationQuery {
            substance: "Landfill Override: BTXER",
            category: "LOSSEPLADS",
            original_category: Some("BTXER"),
            landfill: true,
            ..Default::default()
        };
        let r = t.resolve(&q).unwrap();
        assert_eq!(r.value_ug_l, 3000.0);
        assert_eq!(r.source, ConcentrationSource::LandfillCategory("BTXER".into()));
    }

    #[test]
    fn categories_without_valid_concentration() {
        let t = StandardConcentrations::builtin();
        assert!(t.resolve(&query("PFOS", "PFAS")).is_none());
        assert!(t.resolve(&query("ukendt", "ANDRE")).is_none());
        let q = ConcentrationQuery {
            substance: "Branch/Activity: LOSSEPLADS",
            category: "LOSSEPLADS",
            landfill: true,
            ..Default::default()
        };
        assert!(t.resolve(&q).is_none());
        assert!(t.resolve(&query("x", "NOT_A_CATEGORY")).is_none());
    }

    #[test]
    fn prefixes_are_stripped() {
        assert_eq!(strip_substance_prefix("Landfill Override: BTXER"), "BTXER");
        assert_eq!(strip_substance_prefix("Branch/Activity: LOSSEPLADS"), "LOSSEPLADS");
        assert_eq!(strip_substance_prefix(" Benzen "), "Benzen");
    }

    #[test]
    fn toml_table_is_validated() {
        let t = StandardConcentrations::from_toml_str(
            r#"
            [compounds]
            Benzen = 400

            [[scenario]]
            category = "BTXER"
            substances = ["Benzen"]
            "#,
        )
        .unwrap();
        assert_eq!(t.scenarios("BTXER"), ["Benzen"]);

        let err = StandardConcentrations::from_toml_str(
            r#"
            [[scenario]]
            category = "BTXER"
            substances = ["Benzen"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));
    }
}
