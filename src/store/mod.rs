//! Immutable entity store for one loaded source document.
//!
//! Built once per load, read concurrently thereafter. Relationship accessors
//! resolve parent/spouse/child links through family membership; nothing here
//! mutates after construction.

use crate::model::{name, Family, Individual, ParsedDocument, Sex};
use serde::Serialize;
use std::collections::HashMap;

/// Id-keyed record maps for one source document.
#[derive(Debug)]
pub struct EntityStore {
    individuals: HashMap<String, Individual>,
    families: HashMap<String, Family>,
    weight: usize,
}

impl EntityStore {
    pub fn new(doc: ParsedDocument) -> Self {
        let weight = estimate_weight(&doc);
        let individuals = doc
            .individuals
            .into_iter()
            .map(|i| (i.id.clone(), i))
            .collect();
        let families = doc
            .families
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();
        Self {
            individuals,
            families,
            weight,
        }
    }

    pub fn individual(&self, id: &str) -> Option<&Individual> {
        self.individuals.get(id)
    }

    pub fn family(&self, id: &str) -> Option<&Family> {
        self.families.get(id)
    }

    pub fn individuals(&self) -> impl Iterator<Item = &Individual> {
        self.individuals.values()
    }

    pub fn families(&self) -> impl Iterator<Item = &Family> {
        self.families.values()
    }

    pub fn individual_count(&self) -> usize {
        self.individuals.len()
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    /// Estimated memory footprint in bytes, used for cache capacity accounting.
    pub fn weight(&self) -> usize {
        self.weight
    }

    /// Parents of an individual, via its family-as-child links. Multiple
    /// families contribute multiple parent sets (step-relationships).
    pub fn parents_of(&self, id: &str) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(indi) = self.individual(id) {
            for fam_id in &indi.famc {
                if let Some(fam) = self.family(fam_id) {
                    out.extend(fam.spouses());
                }
            }
        }
        out
    }

    /// Children of an individual, via its family-as-spouse links.
    pub fn children_of(&self, id: &str) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(indi) = self.individual(id) {
            for fam_id in &indi.fams {
                if let Some(fam) = self.family(fam_id) {
                    out.extend(fam.children.iter().map(String::as_str));
                }
            }
        }
        out
    }

    /// Co-spouses of an individual across its family-as-spouse links.
    pub fn spouses_of(&self, id: &str) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(indi) = self.individual(id) {
            for fam_id in &indi.fams {
                if let Some(fam) = self.family(fam_id) {
                    out.extend(fam.spouses().filter(|s| *s != id));
                }
            }
        }
        out
    }

    /// Store-wide statistics report.
    pub fn statistics(&self) -> Statistics {
        let mut stats = Statistics {
            total_individuals: self.individuals.len(),
            total_families: self.families.len(),
            ..Default::default()
        };

        let mut surname_counts: HashMap<String, usize> = HashMap::new();
        for indi in self.individuals.values() {
            match indi.sex {
                Sex::Male => stats.males += 1,
                Sex::Female => stats.females += 1,
                Sex::Unknown => stats.unknown_sex += 1,
            }
            for event in &indi.events {
                *stats
                    .event_counts
                    .entry(event.kind.label().to_string())
                    .or_default() += 1;
            }
            if let Some(year) = indi.birth_year() {
                widen(&mut stats.birth_year_range, year);
            }
            if let Some(year) = indi.death_year() {
                widen(&mut stats.death_year_range, year);
            }
            let surname = name::parse_name(&indi.name).surname;
            if !surname.is_empty() {
                *surname_counts.entry(surname).or_default() += 1;
            }
        }

        let mut surnames: Vec<(String, usize)> = surname_counts.into_iter().collect();
        surnames.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        surnames.truncate(20);
        stats.top_surnames = surnames;

        stats
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Statistics {
    pub total_individuals: usize,
    pub total_families: usize,
    pub males: usize,
    pub females: usize,
    pub unknown_sex: usize,
    pub event_counts: HashMap<String, usize>,
    /// Top 20 surnames by count, descending.
    pub top_surnames: Vec<(String, usize)>,
    pub birth_year_range: Option<(i32, i32)>,
    pub death_year_range: Option<(i32, i32)>,
}

fn widen(range: &mut Option<(i32, i32)>, year: i32) {
    *range = match *range {
        None => Some((year, year)),
        Some((lo, hi)) => Some((lo.min(year), hi.max(year))),
    };
}

fn estimate_weight(doc: &ParsedDocument) -> usize {
    let mut weight = 0;
    for indi in &doc.individuals {
        weight += std::mem::size_of::<Individual>();
        weight += indi.id.len() + indi.name.len();
        weight += indi.famc.iter().map(String::len).sum::<usize>();
        weight += indi.fams.iter().map(String::len).sum::<usize>();
        for event in &indi.events {
            weight += 64;
            weight += event.place.as_deref().map_or(0, str::len);
            weight += event.note.as_deref().map_or(0, str::len);
        }
    }
    for fam in &doc.families {
        weight += std::mem::size_of::<Family>();
        weight += fam.id.len();
        weight += fam.children.iter().map(String::len).sum::<usize>();
        weight += fam.events.len() * 64;
    }
    weight
}

#[cfg(test)]
pub mod fixtures {
    use super::*;
    use crate::model::{Event, EventKind, GedDate};

    /// Build a store from (id, name, sex, birth) individuals and
    /// (id, husband, wife, children) families.
    pub fn store(
        individuals: &[(&str, &str, Sex, Option<&str>)],
        families: &[(&str, Option<&str>, Option<&str>, &[&str])],
    ) -> EntityStore {
        let mut doc = ParsedDocument::default();
        for (id, name, sex, birth) in individuals {
            let mut events = Vec::new();
            if let Some(date) = birth {
                events.push(Event {
                    kind: EventKind::Birth,
                    date: GedDate::parse(date),
                    place: None,
                    note: None,
                });
            }
            doc.individuals.push(Individual {
                id: id.to_string(),
                name: name.to_string(),
                sex: *sex,
                events,
                famc: Vec::new(),
                fams: Vec::new(),
            });
        }
        for (id, husband, wife, children) in families {
            for spouse in [husband, wife].into_iter().flatten() {
                if let Some(indi) = doc.individuals.iter_mut().find(|i| i.id == *spouse) {
                    indi.fams.push(id.to_string());
                }
            }
            for child in *children {
                if let Some(indi) = doc.individuals.iter_mut().find(|i| i.id == *child) {
                    indi.famc.push(id.to_string());
                }
            }
            doc.families.push(Family {
                id: id.to_string(),
                husband: husband.map(str::to_string),
                wife: wife.map(str::to_string),
                children: children.iter().map(|c| c.to_string()).collect(),
                events: Vec::new(),
            });
        }
        EntityStore::new(doc)
    }

    /// Three generations: I1+I2 -> I3; I3+I4 -> I5.
    pub fn three_generations() -> EntityStore {
        store(
            &[
                ("@I1@", "John /Smith/", Sex::Male, Some("1900")),
                ("@I2@", "Mary /Jones/", Sex::Female, Some("1902")),
                ("@I3@", "Peter /Smith/", Sex::Male, Some("1925")),
                ("@I4@", "Anna /Brown/", Sex::Female, Some("1927")),
                ("@I5@", "Paul /Smith/", Sex::Male, Some("1950")),
            ],
            &[
                ("@F1@", Some("@I1@"), Some("@I2@"), &["@I3@"]),
                ("@F2@", Some("@I3@"), Some("@I4@"), &["@I5@"]),
            ],
        )
    }
}
