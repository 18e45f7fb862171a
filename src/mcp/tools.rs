//! MCP tool definitions and handlers.
//!
//! Each tool maps 1:1 onto a service operation. Handlers parse arguments,
//! call the service and render a text result; expected query failures
//! (unknown person, unknown source, load problems) become tool-level
//! failures with their stable message, not protocol errors.

use crate::error::{GedmcpError, Result};
use crate::mcp::types::{Tool, ToolsCallResult};
use crate::service::{GedmcpService, TreeReport};
use serde::Deserialize;
use serde_json::{json, Value};

/// Get all tool definitions for tools/list
pub fn get_tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "gedmcp_find_path".to_string(),
            description: "Find the shortest relationship path between two people in a GEDCOM source".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_id": {
                        "type": "string",
                        "description": "Source identifier of the GEDCOM file (e.g. 'family.ged')"
                    },
                    "person_a": {
                        "type": "string",
                        "description": "Identifier of the first person (e.g. '@I1@')"
                    },
                    "person_b": {
                        "type": "string",
                        "description": "Identifier of the second person"
                    }
                },
                "required": ["source_id", "person_a", "person_b"]
            }),
        },
        Tool {
            name: "gedmcp_common_ancestors".to_string(),
            description: "Find ancestors shared by two people, closest first".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_id": {
                        "type": "string",
                        "description": "Source identifier of the GEDCOM file"
                    },
                    "person_a": {
                        "type": "string",
                        "description": "Identifier of the first person"
                    },
                    "person_b": {
                        "type": "string",
                        "description": "Identifier of the second person"
                    },
                    "max_generations": {
                        "type": "integer",
                        "description": "Maximum ancestor generations to search",
                        "default": 20,
                        "minimum": 1,
                        "maximum": 100
                    }
                },
                "required": ["source_id", "person_a", "person_b"]
            }),
        },
        Tool {
            name: "gedmcp_ancestor_tree".to_string(),
            description: "Enumerate a person's ancestors as a tree, bounded by generation count. Cycles from malformed data are flagged, not dropped.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_id": {
                        "type": "string",
                        "description": "Source identifier of the GEDCOM file"
                    },
                    "person_id": {
                        "type": "string",
                        "description": "Identifier of the root person"
                    },
                    "generations": {
                        "type": "integer",
                        "description": "Number of generations to enumerate",
                        "default": 4,
                        "minimum": 1,
                        "maximum": 50
                    }
                },
                "required": ["source_id", "person_id"]
            }),
        },
        Tool {
            name: "gedmcp_descendant_tree".to_string(),
            description: "Enumerate a person's descendants as a tree, bounded by generation count".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_id": {
                        "type": "string",
                        "description": "Source identifier of the GEDCOM file"
                    },
                    "person_id": {
                        "type": "string",
                        "description": "Identifier of the root person"
                    },
                    "generations": {
                        "type": "integer",
                        "description": "Number of generations to enumerate",
                        "default": 4,
                        "minimum": 1,
                        "maximum": 50
                    }
                },
                "required": ["source_id", "person_id"]
            }),
        },
        Tool {
            name: "gedmcp_find_duplicates".to_string(),
            description: "Find probable duplicate person records, scored 0-100 from name, date and place similarity".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_id": {
                        "type": "string",
                        "description": "Source identifier of the GEDCOM file"
                    },
                    "threshold": {
                        "type": "number",
                        "description": "Minimum score to report (0-100). Defaults to the configured threshold.",
                        "minimum": 0,
                        "maximum": 100
                    }
                },
                "required": ["source_id"]
            }),
        },
        Tool {
            name: "gedmcp_invalidate".to_string(),
            description: "Discard the cached copy of a source so the next query reloads it".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_id": {
                        "type": "string",
                        "description": "Source identifier of the GEDCOM file"
                    }
                },
                "required": ["source_id"]
            }),
        },
        Tool {
            name: "gedmcp_get_person".to_string(),
            description: "Get one person's record: names, vital events, parents, spouses and children".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_id": {
                        "type": "string",
                        "description": "Source identifier of the GEDCOM file"
                    },
                    "person_id": {
                        "type": "string",
                        "description": "Identifier of the person"
                    }
                },
                "required": ["source_id", "person_id"]
            }),
        },
        Tool {
            name: "gedmcp_timeline".to_string(),
            description: "Get a person's events in chronological order (undated events last)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_id": {
                        "type": "string",
                        "description": "Source identifier of the GEDCOM file"
                    },
                    "person_id": {
                        "type": "string",
                        "description": "Identifier of the person"
                    }
                },
                "required": ["source_id", "person_id"]
            }),
        },
        Tool {
            name: "gedmcp_statistics".to_string(),
            description: "Get store-wide statistics: record counts, sex breakdown, event counts, top surnames, year ranges".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_id": {
                        "type": "string",
                        "description": "Source identifier of the GEDCOM file"
                    }
                },
                "required": ["source_id"]
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct PathParams {
    source_id: String,
    person_a: String,
    person_b: String,
}

#[derive(Debug, Deserialize)]
struct CommonAncestorsParams {
    source_id: String,
    person_a: String,
    person_b: String,
    #[serde(default = "default_max_generations")]
    max_generations: u32,
}

#[derive(Debug, Deserialize)]
struct TreeParams {
    source_id: String,
    person_id: String,
    #[serde(default = "default_tree_generations")]
    generations: u32,
}

#[derive(Debug, Deserialize)]
struct DuplicatesParams {
    source_id: String,
    threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SourceParams {
    source_id: String,
}

#[derive(Debug, Deserialize)]
struct PersonParams {
    source_id: String,
    person_id: String,
}

fn default_max_generations() -> u32 {
    20
}

fn default_tree_generations() -> u32 {
    4
}

fn parse_params<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| GedmcpError::InvalidInput(format!("Invalid tool arguments: {}", e)))
}

/// Query failures a caller can act on become tool-level failures with their
/// stable message; everything else propagates as a protocol error.
fn query_failure(err: GedmcpError) -> Result<ToolsCallResult> {
    match err {
        GedmcpError::PersonNotFound { .. }
        | GedmcpError::SourceNotFound(_)
        | GedmcpError::SourceLoadFailed { .. }
        | GedmcpError::CacheLoadTimeout(_)
        | GedmcpError::InvalidInput(_) => Ok(ToolsCallResult::failure(err.to_string())),
        other => Err(other),
    }
}

pub async fn handle_find_path(service: &GedmcpService, arguments: &Value) -> Result<ToolsCallResult> {
    let params: PathParams = parse_params(arguments)?;
    let report = match service
        .find_shortest_path(&params.source_id, &params.person_a, &params.person_b)
        .await
    {
        Ok(report) => report,
        Err(e) => return query_failure(e),
    };

    if !report.found {
        return Ok(ToolsCallResult::text(format!(
            "No relationship path exists between {} and {} in {}",
            params.person_a, params.person_b, params.source_id
        )));
    }

    let length = report.length.unwrap_or(0);
    let mut text = format!(
        "Found a path of {} step{} between {} and {}:\n\n",
        length,
        if length == 1 { "" } else { "s" },
        params.person_a,
        params.person_b
    );
    for step in &report.steps {
        match &step.relation_to_next {
            Some(relation) => {
                text.push_str(&format!("{} ({}) is the {} ", step.name, step.person, relation))
            }
            None => text.push_str(&format!("{} ({})\n", step.name, step.person)),
        }
    }
    Ok(ToolsCallResult::text(text))
}

pub async fn handle_common_ancestors(
    service: &GedmcpService,
    arguments: &Value,
) -> Result<ToolsCallResult> {
    let params: CommonAncestorsParams = parse_params(arguments)?;
    let shared = match service
        .find_common_ancestors(
            &params.source_id,
            &params.person_a,
            &params.person_b,
            params.max_generations,
        )
        .await
    {
        Ok(shared) => shared,
        Err(e) => return query_failure(e),
    };

    if shared.is_empty() {
        return Ok(ToolsCallResult::text(format!(
            "No common ancestors of {} and {} within {} generations",
            params.person_a, params.person_b, params.max_generations
        )));
    }

    let mut text = format!(
        "Found {} common ancestor{} of {} and {}:\n\n",
        shared.len(),
        if shared.len() == 1 { "" } else { "s" },
        params.person_a,
        params.person_b
    );
    for (idx, entry) in shared.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} ({}) - {} generation(s) from {}, {} from {}\n",
            idx + 1,
            entry.name,
            entry.id,
            entry.distance_a,
            params.person_a,
            entry.distance_b,
            params.person_b
        ));
    }
    Ok(ToolsCallResult::text(text))
}

pub async fn handle_ancestor_tree(
    service: &GedmcpService,
    arguments: &Value,
) -> Result<ToolsCallResult> {
    let params: TreeParams = parse_params(arguments)?;
    match service
        .ancestor_tree(&params.source_id, &params.person_id, params.generations)
        .await
    {
        Ok(report) => Ok(ToolsCallResult::text(render_tree(&report, "Ancestor"))),
        Err(e) => query_failure(e),
    }
}

pub async fn handle_descendant_tree(
    service: &GedmcpService,
    arguments: &Value,
) -> Result<ToolsCallResult> {
    let params: TreeParams = parse_params(arguments)?;
    match service
        .descendant_tree(&params.source_id, &params.person_id, params.generations)
        .await
    {
        Ok(report) => Ok(ToolsCallResult::text(render_tree(&report, "Descendant"))),
        Err(e) => query_failure(e),
    }
}

fn render_tree(report: &TreeReport, kind: &str) -> String {
    fn render_node(node: &crate::service::NamedTreeNode, text: &mut String) {
        let indent = "  ".repeat(node.depth as usize);
        let marker = if node.cycle { " [cycle detected]" } else { "" };
        text.push_str(&format!("{}{} ({}){}\n", indent, node.name, node.id, marker));
        for branch in &node.branches {
            render_node(branch, text);
        }
    }

    let mut text = format!(
        "{} tree of {} ({} generation(s)):\n\n",
        kind, report.root.id, report.generations
    );
    render_node(&report.root, &mut text);
    if report.malformed_data {
        text.push_str(
            "\nWarning: the source data contains a relationship cycle; affected branches were cut.\n",
        );
    }
    text
}

pub async fn handle_find_duplicates(
    service: &GedmcpService,
    arguments: &Value,
) -> Result<ToolsCallResult> {
    let params: DuplicatesParams = parse_params(arguments)?;
    let duplicates = match service
        .find_potential_duplicates(&params.source_id, params.threshold)
        .await
    {
        Ok(duplicates) => duplicates,
        Err(e) => return query_failure(e),
    };

    if duplicates.is_empty() {
        return Ok(ToolsCallResult::text("No potential duplicates found."));
    }

    let mut text = format!("Potential duplicates found ({}):\n\n", duplicates.len());
    for (idx, dup) in duplicates.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} / {} (score: {:.1})\n",
            idx + 1,
            dup.person_a,
            dup.person_b,
            dup.score
        ));
    }
    Ok(ToolsCallResult::text(text))
}

pub async fn handle_invalidate(service: &GedmcpService, arguments: &Value) -> Result<ToolsCallResult> {
    let params: SourceParams = parse_params(arguments)?;
    service.invalidate(&params.source_id);
    Ok(ToolsCallResult::text(format!(
        "Cache entry for {} invalidated; the next query will reload it.",
        params.source_id
    )))
}

pub async fn handle_get_person(service: &GedmcpService, arguments: &Value) -> Result<ToolsCallResult> {
    let params: PersonParams = parse_params(arguments)?;
    let person = match service.get_person(&params.source_id, &params.person_id).await {
        Ok(person) => person,
        Err(e) => return query_failure(e),
    };

    let mut text = format!("{} ({})\n", person.name, person.id);
    if person.birth_date.is_some() || person.birth_place.is_some() {
        text.push_str(&format!(
            "Born: {}{}\n",
            person.birth_date.as_deref().unwrap_or("unknown date"),
            person
                .birth_place
                .as_deref()
                .map(|p| format!(" in {}", p))
                .unwrap_or_default()
        ));
    }
    if person.death_date.is_some() || person.death_place.is_some() {
        text.push_str(&format!(
            "Died: {}{}\n",
            person.death_date.as_deref().unwrap_or("unknown date"),
            person
                .death_place
                .as_deref()
                .map(|p| format!(" in {}", p))
                .unwrap_or_default()
        ));
    }
    if let Some(occupation) = &person.occupation {
        text.push_str(&format!("Occupation: {}\n", occupation));
    }
    text.push_str(&format!("Parents: {}\n", join_or_none(&person.parents)));
    text.push_str(&format!("Spouses: {}\n", join_or_none(&person.spouses)));
    text.push_str(&format!("Children: {}\n", join_or_none(&person.children)));
    Ok(ToolsCallResult::text(text))
}

fn join_or_none(ids: &[String]) -> String {
    if ids.is_empty() {
        "none recorded".to_string()
    } else {
        ids.join(", ")
    }
}

pub async fn handle_timeline(service: &GedmcpService, arguments: &Value) -> Result<ToolsCallResult> {
    let params: PersonParams = parse_params(arguments)?;
    let timeline = match service.get_timeline(&params.source_id, &params.person_id).await {
        Ok(timeline) => timeline,
        Err(e) => return query_failure(e),
    };

    if timeline.is_empty() {
        return Ok(ToolsCallResult::text(format!(
            "No events recorded for {}",
            params.person_id
        )));
    }

    let mut text = format!("Timeline for {}:\n\n", params.person_id);
    for event in &timeline {
        text.push_str(&format!(
            "- {}: {}{}\n",
            event.date.as_deref().unwrap_or("undated"),
            event.event,
            event
                .place
                .as_deref()
                .map(|p| format!(" in {}", p))
                .unwrap_or_default()
        ));
    }
    Ok(ToolsCallResult::text(text))
}

pub async fn handle_statistics(service: &GedmcpService, arguments: &Value) -> Result<ToolsCallResult> {
    let params: SourceParams = parse_params(arguments)?;
    let stats = match service.get_statistics(&params.source_id).await {
        Ok(stats) => stats,
        Err(e) => return query_failure(e),
    };

    let mut text = format!("Statistics for {}:\n\n", params.source_id);
    text.push_str(&format!("Individuals: {}\n", stats.total_individuals));
    text.push_str(&format!("Families: {}\n", stats.total_families));
    text.push_str(&format!(
        "Sex: {} male, {} female, {} unknown\n",
        stats.males, stats.females, stats.unknown_sex
    ));
    if let Some((lo, hi)) = stats.birth_year_range {
        text.push_str(&format!("Birth years: {} - {}\n", lo, hi));
    }
    if let Some((lo, hi)) = stats.death_year_range {
        text.push_str(&format!("Death years: {} - {}\n", lo, hi));
    }
    if !stats.event_counts.is_empty() {
        let mut events: Vec<(&String, &usize)> = stats.event_counts.iter().collect();
        events.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        text.push_str("Events:\n");
        for (kind, count) in events {
            text.push_str(&format!("  {}: {}\n", kind, count));
        }
    }
    if !stats.top_surnames.is_empty() {
        text.push_str("Top surnames:\n");
        for (surname, count) in &stats.top_surnames {
            text.push_str(&format!("  {}: {}\n", surname, count));
        }
    }
    Ok(ToolsCallResult::text(text))
}
