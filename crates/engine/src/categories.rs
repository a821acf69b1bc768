//! Category registry per ledger and the tiered category resolver.

use std::collections::BTreeSet;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    matching::{input_in_phrase, phrase_in_input, similarity},
    util::normalize_key,
};

/// A spending or income classification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub synonyms: BTreeSet<String>,
    pub is_income: bool,
    pub active: bool,
}

impl CategoryEntry {
    /// `true` when `phrase` already names this category.
    pub fn knows(&self, phrase: &str) -> bool {
        let key = normalize_key(phrase);
        normalize_key(&self.name) == key || self.synonyms.iter().any(|s| normalize_key(s) == key)
    }

    fn phrases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

/// Which rule produced a category match, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    ExactName,
    ExactSynonym,
    /// A registry phrase occurs inside the subject.
    PhraseInInput,
    /// The subject occurs inside a registry phrase.
    InputInPhrase,
    Fuzzy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CategoryMatch<'a> {
    pub entry: &'a CategoryEntry,
    pub tier: MatchTier,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CategoryResolution<'a> {
    Matched(CategoryMatch<'a>),
    RequiresClassification { subject: String },
}

/// Resolve `subject` against the active categories of `registry`.
///
/// The first tier with a hit wins: exact name, exact synonym, containment
/// (both directions compete on score, then coverage), then fuzzy similarity
/// strictly above `fuzzy_threshold`. Remaining ties keep registry order.
pub fn resolve_category<'a>(
    subject: &str,
    registry: &'a [CategoryEntry],
    fuzzy_threshold: f64,
) -> CategoryResolution<'a> {
    let key = normalize_key(subject);
    let active: Vec<&CategoryEntry> = registry.iter().filter(|c| c.active).collect();

    if !key.is_empty() {
        if let Some(entry) = active.iter().find(|c| normalize_key(&c.name) == key) {
            return matched(entry, MatchTier::ExactName, 1.0);
        }
        if let Some(entry) = active
            .iter()
            .find(|c| c.synonyms.iter().any(|s| normalize_key(s) == key))
        {
            return matched(entry, MatchTier::ExactSynonym, 1.0);
        }
        if let Some(hit) = best_containment(&key, &active) {
            return CategoryResolution::Matched(hit);
        }
        if let Some(hit) = best_fuzzy(&key, &active, fuzzy_threshold) {
            return CategoryResolution::Matched(hit);
        }
    }

    CategoryResolution::RequiresClassification {
        subject: subject.trim().to_string(),
    }
}

fn matched(entry: &CategoryEntry, tier: MatchTier, score: f64) -> CategoryResolution<'_> {
    CategoryResolution::Matched(CategoryMatch { entry, tier, score })
}

fn best_containment<'a>(key: &str, active: &[&'a CategoryEntry]) -> Option<CategoryMatch<'a>> {
    let mut best: Option<(CategoryMatch<'a>, f64)> = None;
    for entry in active {
        for phrase in entry.phrases() {
            let phrase = normalize_key(phrase);
            let hits = [
                phrase_in_input(key, &phrase).map(|c| (MatchTier::PhraseInInput, c)),
                input_in_phrase(key, &phrase).map(|c| (MatchTier::InputInPhrase, c)),
            ];
            for (tier, hit) in hits.into_iter().flatten() {
                let better = best.as_ref().is_none_or(|(current, coverage)| {
                    hit.score > current.score
                        || (hit.score == current.score && hit.coverage > *coverage)
                });
                if better {
                    best = Some((
                        CategoryMatch {
                            entry,
                            tier,
                            score: hit.score,
                        },
                        hit.coverage,
                    ));
                }
            }
        }
    }
    best.map(|(hit, _)| hit)
}

fn best_fuzzy<'a>(
    key: &str,
    active: &[&'a CategoryEntry],
    threshold: f64,
) -> Option<CategoryMatch<'a>> {
    let mut best: Option<CategoryMatch<'a>> = None;
    for entry in active {
        let score = best_similarity(key, entry);
        if score <= threshold {
            continue;
        }
        if best.as_ref().is_none_or(|current| score > current.score) {
            best = Some(CategoryMatch {
                entry,
                tier: MatchTier::Fuzzy,
                score,
            });
        }
    }
    best
}

fn best_similarity(key: &str, entry: &CategoryEntry) -> f64 {
    entry
        .phrases()
        .map(|phrase| similarity(key, &normalize_key(phrase)))
        .fold(0.0, f64::max)
}

/// Active categories ordered by how close they are to `subject`.
///
/// Used to fill the classification menu; registry order breaks ties.
pub fn rank_categories<'a>(subject: &str, registry: &'a [CategoryEntry]) -> Vec<&'a CategoryEntry> {
    let key = normalize_key(subject);
    let mut scored: Vec<(f64, &CategoryEntry)> = registry
        .iter()
        .filter(|c| c.active)
        .map(|entry| {
            let containment = entry
                .phrases()
                .filter_map(|phrase| {
                    let phrase = normalize_key(phrase);
                    let forward = phrase_in_input(&key, &phrase).map(|c| c.score);
                    let backward = input_in_phrase(&key, &phrase).map(|c| c.score);
                    forward.into_iter().chain(backward).reduce(f64::max)
                })
                .fold(0.0, f64::max);
            (containment.max(best_similarity(&key, entry)), entry)
        })
        .collect();
    // Stable sort keeps registry order among equal scores.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, entry)| entry).collect()
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub ledger_id: String,
    pub name: String,
    pub parent_id: Option<String>,
    /// Comma-delimited synonym list.
    pub synonyms: String,
    pub is_income: bool,
    pub active: bool,
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for CategoryEntry {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            parent_id: model.parent_id,
            synonyms: crate::store::split_synonyms(&model.synonyms),
            is_income: model.is_income,
            active: model.active,
        }
    }
}
