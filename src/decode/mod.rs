//! GEDCOM document decoder.
//!
//! Turns raw GEDCOM 5.5 text into individual/family records. Any decode
//! error is a load failure for the whole document, never a partial result.
//! The decoder sits behind a trait so the cache and tests can substitute
//! their own implementation.

use crate::error::{GedmcpError, Result};
use crate::model::{Event, EventKind, Family, Individual, ParsedDocument, Sex};
use crate::model::date::GedDate;
use std::collections::HashSet;

/// Trait for document decoders.
pub trait Decoder: Send + Sync {
    /// Decode raw source bytes into entity records.
    fn parse(&self, bytes: &[u8]) -> Result<ParsedDocument>;
}

/// GEDCOM 5.5 line-syntax decoder.
pub struct GedcomDecoder;

/// One GEDCOM line: `LEVEL [@XREF@] TAG [VALUE]`.
struct Line {
    level: u32,
    xref: Option<String>,
    tag: String,
    value: String,
}

impl GedcomDecoder {
    fn parse_line(raw: &str, number: usize) -> Result<Option<Line>> {
        let trimmed = raw.trim_start_matches('\u{feff}').trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let mut parts = trimmed.splitn(2, ' ');
        let level: u32 = parts
            .next()
            .unwrap_or_default()
            .parse()
            .map_err(|_| GedmcpError::Parse(format!("Line {}: invalid level: {}", number, trimmed)))?;
        let rest = parts.next().unwrap_or_default().trim_start();

        let (xref, rest) = if rest.starts_with('@') {
            match rest[1..].find('@') {
                Some(end) => {
                    let xref = rest[..end + 2].to_string();
                    (Some(xref), rest[end + 2..].trim_start())
                }
                None => {
                    return Err(GedmcpError::Parse(format!(
                        "Line {}: unterminated cross-reference: {}",
                        number, trimmed
                    )))
                }
            }
        } else {
            (None, rest)
        };

        let mut tag_value = rest.splitn(2, ' ');
        let tag = tag_value.next().unwrap_or_default().to_string();
        if tag.is_empty() {
            return Err(GedmcpError::Parse(format!("Line {}: missing tag: {}", number, trimmed)));
        }
        let value = tag_value.next().unwrap_or_default().to_string();

        Ok(Some(Line {
            level,
            xref,
            tag,
            value,
        }))
    }
}

/// Accumulator for the event currently being decoded.
struct EventBuilder {
    kind: EventKind,
    date: Option<GedDate>,
    place: Option<String>,
    note: Option<String>,
}

impl EventBuilder {
    fn new(kind: EventKind, value: &str) -> Self {
        // Attribute-style tags (OCCU, RESI) carry their value on the tag
        // line; the bare "Y" occurrence marker carries no information
        let note = if value.is_empty() || value == "Y" {
            None
        } else {
            Some(value.to_string())
        };
        EventBuilder {
            kind,
            date: None,
            place: None,
            note,
        }
    }

    fn finish(self) -> Event {
        Event {
            kind: self.kind,
            date: self.date,
            place: self.place,
            note: self.note,
        }
    }
}

enum Record {
    Individual(Individual),
    Family(Family),
    Skip,
}

impl Decoder for GedcomDecoder {
    fn parse(&self, bytes: &[u8]) -> Result<ParsedDocument> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| GedmcpError::Parse(format!("Source is not valid UTF-8: {}", e)))?;

        let mut doc = ParsedDocument::default();
        let mut record: Option<Record> = None;
        let mut event: Option<EventBuilder> = None;
        let mut in_note = false;

        for (idx, raw) in text.lines().enumerate() {
            let line = match Self::parse_line(raw, idx + 1)? {
                Some(line) => line,
                None => continue,
            };

            if line.level == 0 {
                flush(&mut doc, &mut record, &mut event);
                in_note = false;
                record = match (line.xref, line.tag.as_str()) {
                    (Some(xref), "INDI") => Some(Record::Individual(Individual {
                        id: xref,
                        name: String::new(),
                        sex: Sex::Unknown,
                        events: Vec::new(),
                        famc: Vec::new(),
                        fams: Vec::new(),
                    })),
                    (Some(xref), "FAM") => Some(Record::Family(Family {
                        id: xref,
                        husband: None,
                        wife: None,
                        children: Vec::new(),
                        events: Vec::new(),
                    })),
                    _ => Some(Record::Skip),
                };
                continue;
            }

            if line.level == 1 {
                finish_event(&mut record, &mut event);
                in_note = false;
            }

            match record {
                Some(Record::Individual(ref mut indi)) => match (line.level, line.tag.as_str()) {
                    (1, "NAME") => indi.name = line.value,
                    (1, "SEX") => {
                        indi.sex = match line.value.as_str() {
                            "M" => Sex::Male,
                            "F" => Sex::Female,
                            _ => Sex::Unknown,
                        }
                    }
                    (1, "FAMC") => indi.famc.push(line.value),
                    (1, "FAMS") => indi.fams.push(line.value),
                    (1, "BIRT" | "DEAT" | "BURI" | "BAPM" | "CHR" | "RESI" | "OCCU") => {
                        event = Some(EventBuilder::new(EventKind::from_tag(&line.tag), &line.value));
                    }
                    _ => decode_event_detail(&mut event, &mut in_note, &line),
                },
                Some(Record::Family(ref mut fam)) => match (line.level, line.tag.as_str()) {
                    (1, "HUSB") => fam.husband = Some(line.value),
                    (1, "WIFE") => fam.wife = Some(line.value),
                    (1, "CHIL") => fam.children.push(line.value),
                    (1, "MARR" | "DIV") => {
                        event = Some(EventBuilder::new(EventKind::from_tag(&line.tag), &line.value));
                    }
                    _ => decode_event_detail(&mut event, &mut in_note, &line),
                },
                _ => {}
            }
        }
        flush(&mut doc, &mut record, &mut event);

        validate(&doc)?;
        Ok(doc)
    }
}

fn decode_event_detail(event: &mut Option<EventBuilder>, in_note: &mut bool, line: &Line) {
    let Some(ev) = event.as_mut() else {
        return;
    };
    match line.tag.as_str() {
        "DATE" => ev.date = GedDate::parse(&line.value),
        "PLAC" => ev.place = Some(line.value.clone()),
        "NOTE" => {
            append_note(ev, &line.value, false);
            *in_note = true;
        }
        // Continuations apply to the preceding NOTE value
        "CONT" if *in_note => append_note(ev, &line.value, true),
        "CONC" if *in_note => {
            if let Some(note) = ev.note.as_mut() {
                note.push_str(&line.value);
            }
        }
        _ => {}
    }
}

fn append_note(ev: &mut EventBuilder, value: &str, newline: bool) {
    match ev.note.as_mut() {
        Some(note) => {
            if newline {
                note.push('\n');
            }
            note.push_str(value);
        }
        None => ev.note = Some(value.to_string()),
    }
}

fn finish_event(record: &mut Option<Record>, event: &mut Option<EventBuilder>) {
    if let Some(builder) = event.take() {
        match record {
            Some(Record::Individual(indi)) => indi.events.push(builder.finish()),
            Some(Record::Family(fam)) => fam.events.push(builder.finish()),
            _ => {}
        }
    }
}

fn flush(doc: &mut ParsedDocument, record: &mut Option<Record>, event: &mut Option<EventBuilder>) {
    finish_event(record, event);
    match record.take() {
        Some(Record::Individual(indi)) => doc.individuals.push(indi),
        Some(Record::Family(fam)) => doc.families.push(fam),
        _ => {}
    }
}

/// Child references must resolve to an individual of the same document.
fn validate(doc: &ParsedDocument) -> Result<()> {
    let known: HashSet<&str> = doc.individuals.iter().map(|i| i.id.as_str()).collect();
    for fam in &doc.families {
        for child in &fam.children {
            if !known.contains(child.as_str()) {
                return Err(GedmcpError::Parse(format!(
                    "Family {} references unknown child {}",
                    fam.id, child
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
0 HEAD
1 SOUR gedmcp-test
0 @I1@ INDI
1 NAME John /Smith/
1 SEX M
1 BIRT
2 DATE 15 MAR 1850
2 PLAC Berlin, Germany
1 FAMS @F1@
0 @I2@ INDI
1 NAME Mary /Jones/
1 SEX F
1 FAMS @F1@
0 @I3@ INDI
1 NAME Peter /Smith/
1 SEX M
1 FAMC @F1@
0 @F1@ FAM
1 HUSB @I1@
1 WIFE @I2@
1 CHIL @I3@
1 MARR
2 DATE 1848
0 TRLR
";

    #[test]
    fn test_decode_sample() {
        let doc = GedcomDecoder.parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.individuals.len(), 3);
        assert_eq!(doc.families.len(), 1);

        let john = &doc.individuals[0];
        assert_eq!(john.id, "@I1@");
        assert_eq!(john.name, "John /Smith/");
        assert_eq!(john.sex, Sex::Male);
        assert_eq!(john.birth_year(), Some(1850));
        assert_eq!(john.birth().unwrap().place.as_deref(), Some("Berlin, Germany"));
        assert_eq!(john.fams, vec!["@F1@"]);

        let fam = &doc.families[0];
        assert_eq!(fam.husband.as_deref(), Some("@I1@"));
        assert_eq!(fam.wife.as_deref(), Some("@I2@"));
        assert_eq!(fam.children, vec!["@I3@"]);
        assert_eq!(fam.events.len(), 1);
        assert_eq!(fam.events[0].kind, EventKind::Marriage);
    }

    #[test]
    fn test_decode_note_continuations() {
        let text = "\
0 @I1@ INDI
1 NAME A /B/
1 BIRT
2 NOTE first part
3 CONT second line
3 CONC  continued
";
        let doc = GedcomDecoder.parse(text.as_bytes()).unwrap();
        let note = doc.individuals[0].birth().unwrap().note.as_deref().unwrap();
        assert_eq!(note, "first part\nsecond line continued");
    }

    #[test]
    fn test_decode_occupation_value_on_tag_line() {
        let text = "\
0 @I1@ INDI
1 NAME A /B/
1 OCCU Blacksmith
";
        let doc = GedcomDecoder.parse(text.as_bytes()).unwrap();
        assert_eq!(doc.individuals[0].occupation(), Some("Blacksmith"));
    }

    #[test]
    fn test_decode_unknown_tags_tolerated() {
        let text = "\
0 @I1@ INDI
1 NAME A /B/
1 _CUSTOM whatever
2 _SUB more
";
        let doc = GedcomDecoder.parse(text.as_bytes()).unwrap();
        assert_eq!(doc.individuals.len(), 1);
    }

    #[test]
    fn test_decode_dangling_child_rejected() {
        let text = "\
0 @I1@ INDI
1 NAME A /B/
0 @F1@ FAM
1 CHIL @I99@
";
        let err = GedcomDecoder.parse(text.as_bytes()).unwrap_err();
        assert!(matches!(err, GedmcpError::Parse(_)));
        assert!(err.to_string().contains("@I99@"));
    }

    #[test]
    fn test_decode_invalid_level_is_failure() {
        let text = "zero @I1@ INDI\n";
        assert!(GedcomDecoder.parse(text.as_bytes()).is_err());
    }

    #[test]
    fn test_decode_empty_document() {
        let doc = GedcomDecoder.parse(b"").unwrap();
        assert!(doc.individuals.is_empty());
        assert!(doc.families.is_empty());
    }
}
