//! Substance category registry.
//!
//! The registry is immutable once built. Keywords are stored both as written
//! and in normalized form so the classifier never re-normalizes them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::normalize;
use crate::error::RiskError;
use crate::schema::category::{ANDRE, LOSSEPLADS};

/// How an override compound must appear in the substance text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMatch {
    /// The whole text, or the text starting with the compound followed by
    /// a space, hyphen, comma or semicolon.
    Token,
    #[default]
    Substring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundOverride {
    pub compound: String,
    pub distance_m: f64,
    #[serde(default)]
    pub matching: OverrideMatch,
}

impl CompoundOverride {
    /// `normalized` must already be normalized.
    pub fn matches(&self, normalized: &str) -> bool {
        match self.matching {
            OverrideMatch::Substring => normalized.contains(self.compound.as_str()),
            OverrideMatch::Token => match normalized.strip_prefix(self.compound.as_str()) {
                Some("") => true,
                Some(rest) => rest.starts_with([' ', '-', ',', ';']),
                None => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub distance_m: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// On-disk form of a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(rename = "category")]
    categories: Vec<Category>,
    #[serde(default, rename = "override")]
    overrides: Vec<CompoundOverride>,
    #[serde(default)]
    landfill_thresholds: BTreeMap<String, f64>,
    #[serde(default)]
    landfill_context_keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
    /// (normalized keyword, index into `categories`) in registry order.
    keyword_index: Vec<(String, usize)>,
    overrides: Vec<CompoundOverride>,
    landfill_thresholds: BTreeMap<String, f64>,
    landfill_context_keywords: Vec<String>,
    fallback: usize,
}

impl CategoryRegistry {
    pub fn new(
        mut categories: Vec<Category>,
        overrides: Vec<CompoundOverride>,
        landfill_thresholds: BTreeMap<String, f64>,
        landfill_context_keywords: Vec<String>,
    ) -> Result<Self, RiskError> {
        if categories.is_empty() {
            return Err(RiskError::Config("category registry is empty".into()));
        }
        for (i, cat) in categories.iter().enumerate() {
            if cat.name.trim().is_empty() {
                return Err(RiskError::Config(format!("category #{i} has no name")));
            }
            if !(cat.distance_m.is_finite() && cat.distance_m >= 0.0) {
                return Err(RiskError::Config(format!(
                    "category {} has invalid distance {}",
                    cat.name, cat.distance_m
                )));
            }
            if categories[..i].iter().any(|c| c.name == cat.name) {
                return Err(RiskError::Config(format!(
                    "category {} is defined twice",
                    cat.name
                )));
            }
        }

        let fallback = match categories.iter().position(|c| c.name == ANDRE) {
            Some(i) => i,
            None => {
                categories.push(Category {
                    name: ANDRE.to_string(),
                    distance_m: 500.0,
                    keywords: Vec::new(),
                    description: "Uncategorized substances".to_string(),
                });
                categories.len() - 1
            }
        };

        let keyword_index = categories
            .iter()
            .enumerate()
            .flat_map(|(i, cat)| {
                cat.keywords
                    .iter()
                    .map(|kw| normalize(kw))
                    .filter(|kw| !kw.is_empty())
                    .map(move |kw| (kw, i))
            })
            .collect();

        let overrides = overrides
            .into_iter()
            .map(|o| CompoundOverride {
                compound: normalize(&o.compound),
                ..o
            })
            .filter(|o| !o.compound.is_empty())
            .collect();

        for name in landfill_thresholds.keys() {
            if !categories.iter().any(|c| &c.name == name) {
                return Err(RiskError::Config(format!(
                    "landfill threshold given for unknown category {name}"
                )));
            }
        }

        Ok(Self {
            categories,
            keyword_index,
            overrides,
            landfill_thresholds,
            landfill_context_keywords: landfill_context_keywords
                .iter()
                .map(|k| normalize(k))
                .collect(),
            fallback,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RiskError> {
        let file: RegistryFile = toml::from_str(text)?;
        Self::new(
            file.categories,
            file.overrides,
            file.landfill_thresholds,
            file.landfill_context_keywords,
        )
    }

    pub fn load(path: &Path) -> Result<Self, RiskError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn keywords(&self, name: &str) -> Option<&[String]> {
        self.get(name).map(|c| c.keywords.as_slice())
    }

    /// Default distance of a category; unknown names get the fallback distance.
    pub fn distance_m(&self, name: &str) -> f64 {
        self.get(name)
            .map(|c| c.distance_m)
            .unwrap_or_else(|| self.fallback().distance_m)
    }

    pub fn fallback(&self) -> &Category {
        &self.categories[self.fallback]
    }

    pub fn overrides(&self) -> &[CompoundOverride] {
        &self.overrides
    }

    pub(crate) fn keyword_index(&self) -> &[(String, usize)] {
        &self.keyword_index
    }

    pub fn landfill_threshold_m(&self, category: &str) -> Option<f64> {
        self.landfill_thresholds.get(category).copied()
    }

    pub fn landfill_context_keywords(&self) -> &[String] {
        &self.landfill_context_keywords
    }

    /// Categories grouped by default distance, ascending.
    pub fn distance_distribution(&self) -> Vec<(f64, Vec<&str>)> {
        let mut groups: Vec<(f64, Vec<&str>)> = Vec::new();
        for cat in &self.categories {
            match groups.iter_mut().find(|(d, _)| *d == cat.distance_m) {
                Some((_, names)) => names.push(cat.name.as_str()),
                None => groups.push((cat.distance_m, vec![cat.name.as_str()])),
            }
        }
        groups.sort_by(|a, b| a.0.total_cmp(&b.0));
        groups
    }

    /// The literature-based registry used by the risk assessment.
    pub fn builtin() -> Self {
        let categories = BUILTIN_CATEGORIES
            .iter()
            .map(|(name, distance_m, description, keywords)| Category {
                name: name.to_string(),
                distance_m: *distance_m,
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                description: description.to_string(),
            })
            .collect();
        let overrides = vec![
            CompoundOverride {
                compound: "benzen".into(),
                distance_m: 200.0,
                matching: OverrideMatch::Token,
            },
            CompoundOverride {
                compound: "cod".into(),
                distance_m: 500.0,
                matching: OverrideMatch::Substring,
            },
            CompoundOverride {
                compound: "cyanid".into(),
                distance_m: 100.0,
                matching: OverrideMatch::Substring,
            },
        ];
        let landfill_thresholds = [
            ("BTXER", 70.0),
            ("KLOREDE_KULBRINTER", 100.0),
            ("PHENOLER", 35.0),
            ("PESTICIDER", 180.0),
            ("UORGANISKE_FORBINDELSER", 50.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let landfill_keywords = ["losseplads", "affald", "depon", "fyldplads", "skraldeplads"]
            .iter()
            .map(|k| k.to_string())
            .collect();

        // The built-in table is static data; a failure here is a programming error.
        match Self::new(categories, overrides, landfill_thresholds, landfill_keywords) {
            Ok(registry) => registry,
            Err(e) => panic!("built-in category registry is invalid: {e}"),
        }
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

type CategoryRow = (&'static str, f64, &'static str, &'static [&'static str]);

const BUILTIN_CATEGORIES: &[CategoryRow] = &[
    (
        "BTXER",
        50.0,
        "BTX compounds and oil products (diesel, heating oil, petroleum)",
        &[
            "btx", "btex", "benzen", "toluene", "toluen", "xylen", "xylene", "benzin",
            "olie-benzen", "aromater", "aromat", "c5-c10", "c10-c25", "kulbrintefraktion",
            "monocyk", "bicyk", "tex (sum)", "styren", "olieprodukter", "olie", "fyringsolie",
            "dieselolie", "petroleum", "diesel", "fyring", "fedt", "smøreolie", "c25-c35",
            "terpentin", "white spirit",
        ],
    ),
    (
        "KLOREDE_KULBRINTER",
        500.0,
        "Chlorinated hydrocarbons and solvents",
        &[
            "chloroform", "kloroform", "kulbrinter", "klorede", "bromoform", "dibromethane",
            "bromerede", "1,1,1-tca", "tce", "tetrachlorethylen", "trichlorethylen", "trichlor",
            "tetrachlor", "vinylchlorid", "dichlorethylen", "dichlorethan", "chlorerede",
            "opl.midl", "opløsningsmidl", "cis-1,2-dichlorethyl", "trans-1,2-dichloreth",
            "chlorethan", "dichlormethan", "pcb", "polychloreret", "polykloreret",
        ],
    ),
    (
        "POLARE_FORBINDELSER",
        300.0,
        "Polar compounds (MTBE, alcohols, phthalates)",
        &[
            "mtbe", "methyl tert-butyl ether", "acetone", "keton", "methanol", "ethanol",
            "alkohol", "phthalat", "dehp", "diethylphthalat", "formaldehyd",
        ],
    ),
    (
        "PHENOLER",
        100.0,
        "Phenolic compounds",
        &["phenol", "fenol", "klorofenol"],
    ),
    (
        "ANDRE_AROMATISKE_FORBINDELSER",
        150.0,
        "Other aromatic compounds (chlorobenzenes)",
        &[
            "chlorbenzen", "chlorobenzene", "monochlorbenzen", "dichlorbenzen", "trichlorbenzen",
            "tetrachlorbenzen", "pentachlorbenzen", "hexachlorbenzen",
        ],
    ),
    (
        "KLOREREDE_PHENOLER",
        200.0,
        "Chlorinated phenolic compounds",
        &["dichlorophenol", "chlorphenol", "diklorofenol", "klorofenol"],
    ),
    (
        "PAH_FORBINDELSER",
        30.0,
        "Polycyclic aromatic hydrocarbons (low mobility, high sorption)",
        &[
            "pah", "fluoranthen", "benzo", "naftalen", "naphtalen", "naphthalen", "naphthacen",
            "pyren", "anthracen", "antracen", "tjære", "tar", "phenanthren", "fluoren",
            "acenaphthen", "acenaphthylen", "chrysen", "chrysene", "benzfluranthen",
            "methylnaphthalen", "benz(ghi)perylen",
        ],
    ),
    (
        "PESTICIDER",
        500.0,
        "Pesticides, herbicides and fungicides (high mobility)",
        &[
            "pesticid", "herbicid", "fungicid", "mechlorprop", "mcpp", "atrazin", "glyphosat",
            "mcpa", "dichlorprop", "2,4-d", "diuron", "simazin", "fluazifop", "ampa", "ddt",
            "triazol", "dichlorbenzamid", "desphenyl chloridazon", "chloridazon", "dde", "ddd",
            "bentazon", "dithiocarbamat", "dithiocarbamater", "4-cpp", "2-(2,6-dichlorphenoxy)",
            "hexazinon", "isoproturon", "lenacil", "malathion", "parathion", "terbuthylazin",
            "metribuzin", "deltamethrin", "cypermethrin", "dieldrin", "aldrin", "clopyralid",
            "tebuconazol", "propiconazol", "dichlobenil", "triadimenol", "dimethachlor",
            "pirimicarb", "dimethoat", "phenoxysyrer", "tfmp", "propachlor", "gamma lindan",
            "thiamethoxam", "clothianidin", "metazachlor", "diflufenican", "monuron",
            "metamitron", "propyzamid", "azoxystrobin", "alachlor", "chlorothalonil", "asulam",
            "metsulfuron", "boscalid", "glufosinat", "carbofuran", "picloram", "sulfosulfuron",
            "epoxiconazol", "clomazon", "prothioconazol", "aminopyralid", "metalaxyl",
            "dichlorvos", "dicamba", "triadimefon", "haloxyfop", "quintozen", "endosulfan",
            "dichlorfluanid", "florasulam", "aldicarb", "imidacloprid", "pendimethalin",
            "dinoseb", "dinoterb", "amitrol", "ethofumesat", "benazolin", "deet",
            "N,N-Dimethylsulfamid (DMS)", "dms",
        ],
    ),
    (
        "PFAS",
        500.0,
        "PFAS compounds (very high mobility and persistence)",
        &[
            "perfluor", "pfos", "pfoa", "pfas", "perfluoroctansulfonsyre", "perfluoroctansyre",
            "perfluorhexansulfonsyre", "pfhxs", "perfluorheptansyre", "pfhpa",
            "perfluorpentansyre", "pfpea", "perfluorhexansyre", "pfhxa", "perfluorbutansyre",
            "pfba", "perfluoroctansulfonamid", "pfosa", "perfluorbutansulfonsyre", "pfbs",
            "1h,1h,2h,2h-perfluoroctansulfonsyre", "perfluornonansyre", "pfna",
            "perfluorpentansulfonsyre", "pfpes", "perfluorheptansulfonsyre", "pfhps",
        ],
    ),
    (
        "UORGANISKE_FORBINDELSER",
        150.0,
        "Inorganic compounds (heavy metals, salts)",
        &[
            "arsen", "arsenic", "cyanid", "cyanide", "tungmetal", "bly", "cadmium", "krom",
            "chrom", "nikkel", "zink", "kobber", "kviksølv", "jern", "mangan", "aluminium",
            "sølv", "barium", "kobolt", "metaller", "tributyltin", "tbt", "tin", "molybden",
            "antimon", "calcium", "natrium", "kalium", "magnesium", "thallium", "bor", "chlorid",
            "sulfat", "nitrat", "fluorid", "fluor", "ammoniak", "ammonium", "phosphor",
            "tributhyltinacetat", "tributhyltinnaphth", "nitrit",
        ],
    ),
    (
        LOSSEPLADS,
        100.0,
        "Landfill leachate and landfill gas",
        &[
            "lossepladsperkolat", "perkolat", "lossepladsgas", "methan", "deponigas", "biogas",
        ],
    ),
    (ANDRE, 500.0, "Uncategorized substances", &[]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_fallback_last() {
        let reg = CategoryRegistry::builtin();
        assert_eq!(reg.categories().len(), 12);
        assert_eq!(reg.fallback().name, ANDRE);
        assert_eq!(reg.distance_m("ANDRE"), 500.0);
        assert_eq!(reg.distance_m("BTXER"), 50.0);
        assert_eq!(reg.distance_m("NOT_A_CATEGORY"), 500.0);
    }

    #[test]
    fn keywords_are_listed_as_written() {
        let reg = CategoryRegistry::builtin();
        let kws = reg.keywords("UORGANISKE_FORBINDELSER").unwrap();
        assert!(kws.iter().any(|k| k == "kviksølv"));
        // normalized form drops the non-decomposable ø
        assert!(reg
            .keyword_index()
            .iter()
            .any(|(kw, _)| kw == "kvikslv"));
    }

    #[test]
    fn token_override_rejects_embedded_compound() {
        let o = CompoundOverride {
            compound: "benzen".into(),
            distance_m: 200.0,
            matching: OverrideMatch::Token,
        };
        assert!(o.matches("benzen"));
        assert!(o.matches("benzen, total"));
        assert!(o.matches("benzen-holdigt"));
        assert!(!o.matches("trichlorbenzen"));
        assert!(!o.matches("benzensulfonat"));
    }

    #[test]
    fn distance_distribution_groups_and_sorts() {
        let reg = CategoryRegistry::builtin();
        let dist = reg.distance_distribution();
        assert_eq!(dist.first().map(|d| d.0), Some(30.0));
        let five_hundred = dist.iter().find(|(d, _)| *d == 500.0).unwrap();
        assert!(five_hundred.1.contains(&"PESTICIDER"));
        assert!(five_hundred.1.contains(&"PFAS"));
        assert!(five_hundred.1.contains(&"ANDRE"));
        let total: usize = dist.iter().map(|(_, n)| n.len()).sum();
        assert_eq!(total, reg.categories().len());
    }

    #[test]
    fn registry_from_toml() {
        let reg = CategoryRegistry::from_toml_str(
            r#"
            [[category]]
            name = "METALS"
            distance_m = 150
            keywords = ["bly", "zink"]

            [[override]]
            compound = "Zink"
            distance_m = 75

            [landfill_thresholds]
            METALS = 40
            "#,
        )
        .unwrap();
        assert_eq!(reg.categories().len(), 2);
        assert_eq!(reg.fallback().name, ANDRE);
        assert_eq!(reg.overrides()[0].compound, "zink");
        assert_eq!(reg.landfill_threshold_m("METALS"), Some(40.0));
    }

    #[test]
    fn duplicate_category_is_rejected() {
        let cat = Category {
            name: "X".into(),
            distance_m: 1.0,
            keywords: vec![],
            description: String::new(),
        };
        let err = CategoryRegistry::new(
            vec![cat.clone(), cat],
            vec![],
            BTreeMap::new(),
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, RiskError::Config(_)));
    }
}
