//! Genealogy date parsing and ordering.
//!
//! GEDCOM dates are partially specified: exact day, year only, approximate
//! (ABT/EST/CAL), bounded (BEF/AFT), or a range (BET .. AND ..). All parsed
//! dates are totally ordered so event lists can be sorted; callers sort
//! unknown (unparseable) dates last.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A parsed genealogy date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GedDate {
    /// Fully or partially specified calendar date ("15 MAR 1850", "MAR 1850", "1850").
    Exact {
        year: i32,
        month: Option<u32>,
        day: Option<u32>,
    },
    /// Approximate date (ABT/ABOUT, EST/ESTIMATED, CAL/CALCULATED).
    About { year: i32 },
    /// Upper bound (BEF/BEFORE).
    Before { year: i32 },
    /// Lower bound (AFT/AFTER).
    After { year: i32 },
    /// Closed range (BET .. AND ..).
    Between { start: i32, end: i32 },
}

impl GedDate {
    /// Parse a GEDCOM date value. Returns None when no year can be extracted.
    pub fn parse(text: &str) -> Option<GedDate> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let upper = trimmed.to_uppercase();

        let bet = Regex::new(r"(?:BETWEEN|BET)\s+(\d{3,4})\s+(?:AND|&)\s+(\d{3,4})")
            .expect("Invalid regex pattern");
        if let Some(cap) = bet.captures(&upper) {
            let a: i32 = cap[1].parse().ok()?;
            let b: i32 = cap[2].parse().ok()?;
            return Some(GedDate::Between {
                start: a.min(b),
                end: a.max(b),
            });
        }

        let qualified = Regex::new(r"(?:(BEFORE|BEF)|(AFTER|AFT)|(ABOUT|ABT|ESTIMATED|EST|CALCULATED|CAL))\s*(\d{3,4})")
            .expect("Invalid regex pattern");
        if let Some(cap) = qualified.captures(&upper) {
            let year: i32 = cap[4].parse().ok()?;
            if cap.get(1).is_some() {
                return Some(GedDate::Before { year });
            }
            if cap.get(2).is_some() {
                return Some(GedDate::After { year });
            }
            return Some(GedDate::About { year });
        }

        // "DD MMM YYYY" or "MMM YYYY"
        let dmy = Regex::new(r"(?:(\d{1,2})\s+)?([A-Z]{3})\s+(\d{3,4})")
            .expect("Invalid regex pattern");
        if let Some(cap) = dmy.captures(&upper) {
            if let Some(month) = cap.get(2).and_then(|m| month_number(m.as_str())) {
                let year: i32 = cap[3].parse().ok()?;
                let day = cap.get(1).and_then(|d| d.as_str().parse().ok());
                return Some(GedDate::Exact {
                    year,
                    month: Some(month),
                    day,
                });
            }
        }

        // "MM/DD/YYYY" or "DD/MM/YYYY" (first part > 12 means day-first)
        let slashed = Regex::new(r"(\d{1,2})[/-](\d{1,2})[/-](\d{3,4})")
            .expect("Invalid regex pattern");
        if let Some(cap) = slashed.captures(&upper) {
            let part1: u32 = cap[1].parse().ok()?;
            let part2: u32 = cap[2].parse().ok()?;
            let year: i32 = cap[3].parse().ok()?;
            let (month, day) = if part1 > 12 { (part2, part1) } else { (part1, part2) };
            return Some(GedDate::Exact {
                year,
                month: Some(month),
                day: Some(day),
            });
        }

        // Bare year
        let year_only = Regex::new(r"\b(\d{3,4})\b").expect("Invalid regex pattern");
        if let Some(cap) = year_only.captures(&upper) {
            let year: i32 = cap[1].parse().ok()?;
            return Some(GedDate::Exact {
                year,
                month: None,
                day: None,
            });
        }

        None
    }

    /// Primary year used for proximity comparisons (range start for Between).
    pub fn year(&self) -> i32 {
        match *self {
            GedDate::Exact { year, .. }
            | GedDate::About { year }
            | GedDate::Before { year }
            | GedDate::After { year } => year,
            GedDate::Between { start, .. } => start,
        }
    }

    fn sort_key(&self) -> (i32, u32, u32, u8) {
        match *self {
            GedDate::Before { year } => (year, 0, 0, 0),
            GedDate::Exact { year, month, day } => {
                (year, month.unwrap_or(0), day.unwrap_or(0), 1)
            }
            GedDate::About { year } => (year, 0, 0, 2),
            GedDate::Between { start, .. } => (start, 0, 0, 3),
            GedDate::After { year } => (year, 0, 0, 4),
        }
    }
}

impl Ord for GedDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for GedDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for GedDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            GedDate::Exact { year, month, day } => match (month, day) {
                (Some(m), Some(d)) => write!(f, "{:02}/{:02}/{}", d, m, year),
                (Some(m), None) => write!(f, "{:02}/{}", m, year),
                _ => write!(f, "{}", year),
            },
            GedDate::About { year } => write!(f, "About {}", year),
            GedDate::Before { year } => write!(f, "Before {}", year),
            GedDate::After { year } => write!(f, "After {}", year),
            GedDate::Between { start, end } => write!(f, "Between {} and {}", start, end),
        }
    }
}

/// Sort dates with None (unknown) last.
pub fn cmp_optional(a: &Option<GedDate>, b: &Option<GedDate>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn month_number(abbrev: &str) -> Option<u32> {
    match abbrev {
        "JAN" => Some(1),
        "FEB" => Some(2),
        "MAR" => Some(3),
        "APR" => Some(4),
        "MAY" => Some(5),
        "JUN" => Some(6),
        "JUL" => Some(7),
        "AUG" => Some(8),
        "SEP" => Some(9),
        "OCT" => Some(10),
        "NOV" => Some(11),
        "DEC" => Some(12),
        _ => None,
    }
}
