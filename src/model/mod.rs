//! Record types for a decoded genealogy document.
//!
//! Record kinds are resolved once at decode time into closed enums; queries
//! never re-inspect raw GEDCOM tags.

pub mod date;
pub mod name;
pub mod place;

pub use date::GedDate;
pub use name::ParsedName;
pub use place::NormalizedPlace;

use serde::{Deserialize, Serialize};

/// Sex of an individual as recorded (SEX tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

/// Closed set of event kinds, resolved from GEDCOM tags at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Birth,
    Death,
    Marriage,
    Divorce,
    Burial,
    Baptism,
    Residence,
    Occupation,
    Other,
}

impl EventKind {
    /// Map a GEDCOM tag to its event kind. Unrecognized event-bearing tags
    /// become `Other`.
    pub fn from_tag(tag: &str) -> EventKind {
        match tag {
            "BIRT" => EventKind::Birth,
            "DEAT" => EventKind::Death,
            "MARR" => EventKind::Marriage,
            "DIV" => EventKind::Divorce,
            "BURI" => EventKind::Burial,
            "BAPM" | "CHR" => EventKind::Baptism,
            "RESI" => EventKind::Residence,
            "OCCU" => EventKind::Occupation,
            _ => EventKind::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Birth => "birth",
            EventKind::Death => "death",
            EventKind::Marriage => "marriage",
            EventKind::Divorce => "divorce",
            EventKind::Burial => "burial",
            EventKind::Baptism => "baptism",
            EventKind::Residence => "residence",
            EventKind::Occupation => "occupation",
            EventKind::Other => "other",
        }
    }
}

/// A life or family event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub date: Option<GedDate>,
    pub place: Option<String>,
    pub note: Option<String>,
}

/// An individual record. Immutable after document load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub id: String,
    /// Raw name as recorded ("John /Smith/").
    pub name: String,
    pub sex: Sex,
    /// Events in document order.
    pub events: Vec<Event>,
    /// Families this individual appears in as a child (FAMC).
    pub famc: Vec<String>,
    /// Families this individual appears in as a spouse (FAMS).
    pub fams: Vec<String>,
}

impl Individual {
    pub fn parsed_name(&self) -> ParsedName {
        name::parse_name(&self.name)
    }

    pub fn display_name(&self) -> String {
        let display = self.parsed_name().display();
        if display.is_empty() {
            "Unknown".to_string()
        } else {
            display
        }
    }

    fn event(&self, kind: EventKind) -> Option<&Event> {
        self.events.iter().find(|e| e.kind == kind)
    }

    pub fn birth(&self) -> Option<&Event> {
        self.event(EventKind::Birth)
    }

    pub fn death(&self) -> Option<&Event> {
        self.event(EventKind::Death)
    }

    pub fn birth_year(&self) -> Option<i32> {
        self.birth().and_then(|e| e.date.as_ref()).map(GedDate::year)
    }

    pub fn death_year(&self) -> Option<i32> {
        self.death().and_then(|e| e.date.as_ref()).map(GedDate::year)
    }

    pub fn occupation(&self) -> Option<&str> {
        self.event(EventKind::Occupation)
            .and_then(|e| e.note.as_deref())
    }
}

/// A family record linking spouses and children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
    pub id: String,
    pub husband: Option<String>,
    pub wife: Option<String>,
    /// Children in document order.
    pub children: Vec<String>,
    pub events: Vec<Event>,
}

impl Family {
    /// Spouse references that are present, husband first.
    pub fn spouses(&self) -> impl Iterator<Item = &str> {
        self.husband
            .as_deref()
            .into_iter()
            .chain(self.wife.as_deref())
    }
}

/// Output of the decoder: all entities of one source document.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub individuals: Vec<Individual>,
    pub families: Vec<Family>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str, name: &str) -> Individual {
        Individual {
            id: id.to_string(),
            name: name.to_string(),
            sex: Sex::Unknown,
            events: Vec::new(),
            famc: Vec::new(),
            fams: Vec::new(),
        }
    }

    #[test]
    fn test_event_kind_from_tag() {
        assert_eq!(EventKind::from_tag("BIRT"), EventKind::Birth);
        assert_eq!(EventKind::from_tag("CHR"), EventKind::Baptism);
        assert_eq!(EventKind::from_tag("XYZZY"), EventKind::Other);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(person("@I1@", "John /Smith/").display_name(), "John Smith");
        assert_eq!(person("@I2@", "").display_name(), "Unknown");
    }

    #[test]
    fn test_birth_year() {
        let mut p = person("@I1@", "John /Smith/");
        p.events.push(Event {
            kind: EventKind::Birth,
            date: GedDate::parse("15 MAR 1850"),
            place: None,
            note: None,
        });
        assert_eq!(p.birth_year(), Some(1850));
        assert_eq!(p.death_year(), None);
    }

    #[test]
    fn test_family_spouses() {
        let fam = Family {
            id: "@F1@".to_string(),
            husband: Some("@I1@".to_string()),
            wife: None,
            children: Vec::new(),
            events: Vec::new(),
        };
        let spouses: Vec<&str> = fam.spouses().collect();
        assert_eq!(spouses, vec!["@I1@"]);
    }
}
