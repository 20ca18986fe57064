//! Keyword-based substance classification.
//!
//! Resolution order for a substance text:
//!   1. compound-specific overrides (distance from the override, category
//!      from the first registry category with any keyword hit)
//!   2. longest matching keyword across all categories
//!   3. the fallback category (ANDRE)

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::categories::CategoryRegistry;

/// Lower-case, trim and strip diacritics. Characters without an ASCII
/// decomposition (e.g. `ø`, `æ`) are dropped, for keywords and inputs alike.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchKind {
    Override { compound: String },
    Keyword { keyword: String },
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: String,
    pub distance_m: f64,
    pub matched: MatchKind,
}

impl Classification {
    pub fn is_fallback(&self) -> bool {
        self.matched == MatchKind::Fallback
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierStats {
    pub calls: usize,
    pub cache_hits: usize,
    pub fallbacks: usize,
    pub per_category: BTreeMap<String, usize>,
}

/// Memoizing classifier bound to one registry.
///
/// The cache lives in the instance, so two classifiers over different
/// registries never see each other's results. `classify` takes `&self` and
/// the type is `Sync`; rows may be classified from several threads.
#[derive(Debug)]
pub struct SubstanceClassifier {
    registry: Arc<CategoryRegistry>,
    cache: RwLock<HashMap<String, Classification>>,
    stats: Option<Mutex<ClassifierStats>>,
}

impl SubstanceClassifier {
    pub fn new(registry: Arc<CategoryRegistry>) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
            stats: None,
        }
    }

    pub fn with_stats(mut self) -> Self {
        self.stats = Some(Mutex::new(ClassifierStats::default()));
        self
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// `None` behaves like an empty string.
    pub fn classify_opt(&self, substance: Option<&str>) -> Classification {
        self.classify(substance.unwrap_or(""))
    }

    pub fn classify(&self, substance: &str) -> Classification {
        let normalized = normalize(substance);

        let cached = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&normalized)
            .cloned();

        let (result, hit) = match cached {
            Some(c) => (c, true),
            None => {
                let c = self.resolve(&normalized);
                self.cache
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(normalized, c.clone());
                (c, false)
            }
        };

        if let Some(stats) = &self.stats {
            let mut stats = stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.calls += 1;
            if hit {
                stats.cache_hits += 1;
            }
            if result.is_fallback() {
                stats.fallbacks += 1;
            }
            *stats.per_category.entry(result.category.clone()).or_insert(0) += 1;
        }

        result
    }

    /// Landfill classification from branch/activity text, used for sites
    /// without substance data and for the landfill threshold override.
    pub fn classify_branch_activity(
        &self,
        branch: Option<&str>,
        activity: Option<&str>,
    ) -> Option<Classification> {
        let keywords = self.registry.landfill_context_keywords();
        let hit = [branch, activity].into_iter().flatten().find_map(|text| {
            let normalized = normalize(text);
            keywords
                .iter()
                .find(|kw| normalized.contains(kw.as_str()))
                .cloned()
        })?;
        let category = crate::schema::category::LOSSEPLADS;
        Some(Classification {
            category: category.to_string(),
            distance_m: self.registry.distance_m(category),
            matched: MatchKind::Keyword { keyword: hit },
        })
    }

    pub fn stats(&self) -> Option<ClassifierStats> {
        self.stats
            .as_ref()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    pub fn cache_len(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn resolve(&self, normalized: &str) -> Classification {
        let registry = &*self.registry;

        if normalized.is_empty() {
            return self.fallback();
        }

        for ov in registry.overrides() {
            if !ov.matches(normalized) {
                continue;
            }
            let owner = registry
                .keyword_index()
                .iter()
                .find(|(kw, _)| normalized.contains(kw.as_str()));
            if let Some((_, idx)) = owner {
                return Classification {
                    category: registry.categories()[*idx].name.clone(),
                    distance_m: ov.distance_m,
                    matched: MatchKind::Override {
                        compound: ov.compound.clone(),
                    },
                };
            }
        }

        // Longest keyword wins; on equal length the earlier category wins.
        let mut best: Option<(&str, usize)> = None;
        for (kw, idx) in registry.keyword_index() {
            if !normalized.contains(kw.as_str()) {
                continue;
            }
            let better = match best {
                None => true,
                Some((b, b_idx)) => kw.len() > b.len() || (kw.len() == b.len() && *idx < b_idx),
            };
            if better {
                best = Some((kw.as_str(), *idx));
            }
        }

        match best {
            Some((kw, idx)) => {
                let cat = &registry.categories()[idx];
                Classification {
                    category: cat.name.clone(),
                    distance_m: cat.distance_m,
                    matched: MatchKind::Keyword {
                        keyword: kw.to_string(),
                    },
                }
            }
            None => {
                debug!(substance = normalized, "no keyword match, using fallback category");
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> Classification {
        let cat = self.registry.fallback();
        Classification {
            category: cat.name.clone(),
            distance_m: cat.distance_m,
            matched: MatchKind::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::{Category, CompoundOverride};

    fn classifier() -> SubstanceClassifier {
        SubstanceClassifier::new(Arc::new(CategoryRegistry::builtin()))
    }

    fn pair(c: &Classification) -> (&str, f64) {
        (c.category.as_str(), c.distance_m)
    }

    #[test]
    fn normalize_strips_diacritics_and_case() {
        assert_eq!(normalize("  Tjære  "), "tjre");
        assert_eq!(normalize("Chloroéthane"), "chloroethane");
        assert_eq!(normalize("BENZEN"), "benzen");
    }

    #[test]
    fn benzen_uses_compound_override() {
        let c = classifier();
        assert_eq!(pair(&c.classify("benzen")), ("BTXER", 200.0));
        assert_eq!(pair(&c.classify("Benzen")), ("BTXER", 200.0));
        assert_eq!(pair(&c.classify("benzen, total")), ("BTXER", 200.0));
    }

    #[test]
    fn embedded_benzen_does_not_trigger_override() {
        let c = classifier();
        let tri = c.classify("trichlorbenzen");
        assert_eq!(pair(&tri), ("ANDRE_AROMATISKE_FORBINDELSER", 150.0));
        assert!(matches!(tri.matched, MatchKind::Keyword { .. }));
        assert_eq!(
            pair(&c.classify("Chlorbenzen")),
            ("ANDRE_AROMATISKE_FORBINDELSER", 150.0)
        );
    }

    #[test]
    fn category_default_when_no_override() {
        let c = classifier();
        assert_eq!(pair(&c.classify("Toluen")), ("BTXER", 50.0));
        assert_eq!(pair(&c.classify("toluene")), ("BTXER", 50.0));
        assert_eq!(
            pair(&c.classify("Tetrachlorethylen (PCE)")),
            ("KLOREDE_KULBRINTER", 500.0)
        );
        assert_eq!(pair(&c.classify("Fluoranthen")), ("PAH_FORBINDELSER", 30.0));
    }

    #[test]
    fn cyanid_override_keeps_owning_category() {
        let c = classifier();
        assert_eq!(
            pair(&c.classify("Cyanid")),
            ("UORGANISKE_FORBINDELSER", 100.0)
        );
    }

    #[test]
    fn override_without_category_falls_through() {
        let c = classifier();
        assert_eq!(pair(&c.classify("COD")), ("ANDRE", 500.0));
    }

    #[test]
    fn fallback_for_unknown_and_empty() {
        let c = classifier();
        assert_eq!(
            pair(&c.classify("qqq zzz")),
            ("ANDRE", 500.0)
        );
        assert_eq!(pair(&c.classify("")), ("ANDRE", 500.0));
        assert_eq!(pair(&c.classify("   ")), ("ANDRE", 500.0));
        assert_eq!(pair(&c.classify_opt(None)), ("ANDRE", 500.0));
        assert!(c.classify("").is_fallback());
    }

    #[test]
    fn longest_keyword_wins() {
        let c = classifier();
        // also hits "benzen" (BTXER) and "chlorbenzen"; "dichlorbenzen" is longest
        assert_eq!(
            pair(&c.classify("1,2-dichlorbenzen")),
            ("ANDRE_AROMATISKE_FORBINDELSER", 150.0)
        );
        // "diklorofenol" (12) beats "klorofenol" (10) and "fenol" (5)
        assert_eq!(
            pair(&c.classify("2,4-diklorofenol")),
            ("KLOREREDE_PHENOLER", 200.0)
        );
    }

    #[test]
    fn equal_length_tie_goes_to_earlier_category() {
        let c = classifier();
        // "klorofenol" is a keyword of both PHENOLER and KLOREREDE_PHENOLER
        assert_eq!(pair(&c.classify("klorofenol")), ("PHENOLER", 100.0));
    }

    #[test]
    fn classification_is_deterministic_and_cached() {
        let c = classifier().with_stats();
        let first = c.classify("Xylener");
        let second = c.classify("  XYLENER ");
        assert_eq!(first, second);
        assert_eq!(c.cache_len(), 1);
        let stats = c.stats().unwrap();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.per_category.get("BTXER"), Some(&2));
    }

    #[test]
    fn cache_does_not_leak_between_registries() {
        let custom = CategoryRegistry::new(
            vec![Category {
                name: "SOLVENTS".into(),
                distance_m: 42.0,
                keywords: vec!["toluen".into()],
                description: String::new(),
            }],
            vec![CompoundOverride {
                compound: "toluen".into(),
                distance_m: 7.0,
                matching: crate::categories::OverrideMatch::Token,
            }],
            Default::default(),
            vec![],
        )
        .unwrap();
        let a = classifier();
        let b = SubstanceClassifier::new(Arc::new(custom));
        assert_eq!(pair(&a.classify("toluen")), ("BTXER", 50.0));
        assert_eq!(pair(&b.classify("toluen")), ("SOLVENTS", 7.0));
        assert_eq!(pair(&a.classify("toluen")), ("BTXER", 50.0));
    }

    #[test]
    fn landfill_context_from_branch_or_activity() {
        let c = classifier();
        let hit = c
            .classify_branch_activity(Some("Affaldsbehandling"), None)
            .unwrap();
        assert_eq!(pair(&hit), ("LOSSEPLADS", 100.0));
        assert!(c
            .classify_branch_activity(None, Some("Losseplads; Kompostering"))
            .is_some());
        assert!(c
            .classify_branch_activity(Some("Servicestationer"), Some("Benzin og olie, salg af"))
            .is_none());
    }
}
