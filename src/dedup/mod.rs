//! Probable-duplicate detection over an entity store.
//!
//! Candidate pairs are restricted to individuals sharing at least one
//! normalized name token (blocking), then scored 0-100 from name
//! similarity, birth/death year proximity and place agreement. This is a
//! heuristic: the contract is the scoring shape, not ground truth.

use crate::model::{name, place::NormalizedPlace, place::place_similarity, Individual};
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Component weights of the duplicate score. Policy, not structure: any
/// non-negative weights summing to 100 are valid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DuplicateWeights {
    pub name: f64,
    pub dates: f64,
    pub place: f64,
}

impl Default for DuplicateWeights {
    fn default() -> Self {
        Self {
            name: 50.0,
            dates: 30.0,
            place: 20.0,
        }
    }
}

impl DuplicateWeights {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name < 0.0 || self.dates < 0.0 || self.place < 0.0 {
            return Err("duplicate score weights must be non-negative".to_string());
        }
        let total = self.name + self.dates + self.place;
        if (total - 100.0).abs() > 1e-6 {
            return Err(format!("duplicate score weights must sum to 100, got {}", total));
        }
        Ok(())
    }
}

/// A scored candidate pair, identifiers in ascending order.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCandidate {
    pub person_a: String,
    pub person_b: String,
    pub score: f64,
}

/// Find pairs scoring at or above `threshold`, ordered descending by score,
/// ties broken by ascending identifier pair.
pub fn find_potential_duplicates(
    store: &EntityStore,
    weights: &DuplicateWeights,
    threshold: f64,
) -> Vec<DuplicateCandidate> {
    // Name-token blocking: only pairs sharing a token are compared
    let mut blocks: HashMap<String, Vec<&Individual>> = HashMap::new();
    for indi in store.individuals() {
        for token in name::name_tokens(&indi.name) {
            blocks.entry(token).or_default().push(indi);
        }
    }

    let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
    for members in blocks.values() {
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                let pair = if a.id < b.id {
                    (a.id.as_str(), b.id.as_str())
                } else {
                    (b.id.as_str(), a.id.as_str())
                };
                seen.insert(pair);
            }
        }
    }

    let mut out: Vec<DuplicateCandidate> = seen
        .into_iter()
        .filter_map(|(id_a, id_b)| {
            let a = store.individual(id_a)?;
            let b = store.individual(id_b)?;
            let score = score_pair(a, b, weights);
            (score >= threshold).then(|| DuplicateCandidate {
                person_a: id_a.to_string(),
                person_b: id_b.to_string(),
                score,
            })
        })
        .collect();

    out.sort_by(|x, y| {
        y.score
            .total_cmp(&x.score)
            .then_with(|| (&x.person_a, &x.person_b).cmp(&(&y.person_a, &y.person_b)))
    });
    out
}

/// Score a pair of individuals in [0, 100]. Symmetric in its arguments.
pub fn score_pair(a: &Individual, b: &Individual, weights: &DuplicateWeights) -> f64 {
    let name_score = name::name_similarity(&a.name, &b.name);
    let date_score = date_proximity(a, b);
    let place_score = birth_place_agreement(a, b);
    weights.name * name_score + weights.dates * date_score + weights.place * place_score
}

/// Average of birth and death year proximity. A comparison with a missing
/// year contributes a neutral 0.5, not zero: absence of data is not
/// evidence of difference.
fn date_proximity(a: &Individual, b: &Individual) -> f64 {
    let birth = year_proximity(a.birth_year(), b.birth_year());
    let death = year_proximity(a.death_year(), b.death_year());
    (birth + death) / 2.0
}

fn year_proximity(a: Option<i32>, b: Option<i32>) -> f64 {
    match (a, b) {
        (Some(x), Some(y)) => match (x - y).abs() {
            0 => 1.0,
            1..=2 => 0.8,
            3..=5 => 0.5,
            6..=10 => 0.2,
            _ => 0.0,
        },
        _ => 0.5,
    }
}

fn birth_place_agreement(a: &Individual, b: &Individual) -> f64 {
    let place_a = a.birth().and_then(|e| e.place.as_deref());
    let place_b = b.birth().and_then(|e| e.place.as_deref());
    match (place_a, place_b) {
        (Some(x), Some(y)) => {
            place_similarity(&NormalizedPlace::parse(x), &NormalizedPlace::parse(y))
        }
        _ => 0.5,
    }
}
