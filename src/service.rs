//! Query service: the one layer transports talk to.
//!
//! Binds storage, decoder and the two caches behind the exposed operations.
//! Every operation resolves the source through the document cache, reuses
//! the relationship graph where one applies, and returns serializable
//! reports; no transport knowledge lives here.

use crate::cache::{DocumentCache, GraphCache};
use crate::dedup::{self, DuplicateCandidate, DuplicateWeights};
use crate::error::{GedmcpError, Result};
use crate::graph::{
    self, ancestors, describe_path, shortest_path, LabeledStep, PathOutcome, RelationGraph, Tree,
    TreeNode,
};
use crate::model::{date, EventKind, GedDate, Sex};
use crate::store::{EntityStore, Statistics};
use serde::Serialize;
use std::sync::Arc;

pub struct GedmcpService {
    cache: Arc<DocumentCache>,
    graphs: GraphCache,
    weights: DuplicateWeights,
    default_threshold: f64,
}

/// Result of a shortest-path query. `NoPath` is a normal outcome.
#[derive(Debug, Serialize)]
pub struct PathReport {
    pub found: bool,
    /// Edge count, present when a path was found.
    pub length: Option<usize>,
    pub steps: Vec<LabeledStep>,
}

#[derive(Debug, Serialize)]
pub struct CommonAncestorEntry {
    pub id: String,
    pub name: String,
    pub distance_a: u32,
    pub distance_b: u32,
}

/// A tree node decorated with the person's display name.
#[derive(Debug, Serialize)]
pub struct NamedTreeNode {
    pub id: String,
    pub name: String,
    pub depth: u32,
    pub cycle: bool,
    pub branches: Vec<NamedTreeNode>,
}

#[derive(Debug, Serialize)]
pub struct TreeReport {
    pub root: NamedTreeNode,
    pub generations: u32,
    /// True when cycle pruning fired: the source data is malformed.
    pub malformed_data: bool,
}

/// Full person record resolved through family membership.
#[derive(Debug, Serialize)]
pub struct PersonDetails {
    pub id: String,
    pub name: String,
    pub sex: Sex,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub death_date: Option<String>,
    pub death_place: Option<String>,
    pub occupation: Option<String>,
    pub parents: Vec<String>,
    pub spouses: Vec<String>,
    pub children: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TimelineEvent {
    pub event: String,
    pub date: Option<String>,
    pub place: Option<String>,
    pub note: Option<String>,
}

impl GedmcpService {
    pub fn new(
        cache: Arc<DocumentCache>,
        graph_cache_entries: usize,
        weights: DuplicateWeights,
        default_threshold: f64,
    ) -> Self {
        Self {
            cache,
            graphs: GraphCache::new(graph_cache_entries),
            weights,
            default_threshold,
        }
    }

    async fn resolve(&self, source_id: &str) -> Result<(Arc<EntityStore>, Arc<RelationGraph>)> {
        let (store, fingerprint) = self.cache.get_with_fingerprint(source_id).await?;
        let graph = self.graphs.get_or_build(source_id, &fingerprint, &store);
        Ok((store, graph))
    }

    pub async fn find_shortest_path(
        &self,
        source_id: &str,
        person_a: &str,
        person_b: &str,
    ) -> Result<PathReport> {
        let (store, graph) = self.resolve(source_id).await?;
        graph::require_person(&graph, person_a, source_id)?;
        graph::require_person(&graph, person_b, source_id)?;

        match shortest_path(&graph, person_a, person_b) {
            PathOutcome::Path { steps } => Ok(PathReport {
                found: true,
                length: Some(steps.len().saturating_sub(1)),
                steps: describe_path(&steps, &store),
            }),
            PathOutcome::NoPath => Ok(PathReport {
                found: false,
                length: None,
                steps: Vec::new(),
            }),
        }
    }

    pub async fn find_common_ancestors(
        &self,
        source_id: &str,
        person_a: &str,
        person_b: &str,
        max_generations: u32,
    ) -> Result<Vec<CommonAncestorEntry>> {
        let (store, graph) = self.resolve(source_id).await?;
        graph::require_person(&graph, person_a, source_id)?;
        graph::require_person(&graph, person_b, source_id)?;

        Ok(
            ancestors::common_ancestors(&graph, person_a, person_b, max_generations)
                .into_iter()
                .map(|shared| CommonAncestorEntry {
                    name: display_name(&store, &shared.id),
                    id: shared.id,
                    distance_a: shared.distance_a,
                    distance_b: shared.distance_b,
                })
                .collect(),
        )
    }

    pub async fn ancestor_tree(
        &self,
        source_id: &str,
        person_id: &str,
        generations: u32,
    ) -> Result<TreeReport> {
        let (store, graph) = self.resolve(source_id).await?;
        graph::require_person(&graph, person_id, source_id)?;
        Ok(named_tree(
            graph::ancestor_tree(&graph, person_id, generations),
            &store,
        ))
    }

    pub async fn descendant_tree(
        &self,
        source_id: &str,
        person_id: &str,
        generations: u32,
    ) -> Result<TreeReport> {
        let (store, graph) = self.resolve(source_id).await?;
        graph::require_person(&graph, person_id, source_id)?;
        Ok(named_tree(
            graph::descendant_tree(&graph, person_id, generations),
            &store,
        ))
    }

    pub async fn find_potential_duplicates(
        &self,
        source_id: &str,
        threshold: Option<f64>,
    ) -> Result<Vec<DuplicateCandidate>> {
        let threshold = threshold.unwrap_or(self.default_threshold);
        if !(0.0..=100.0).contains(&threshold) {
            return Err(GedmcpError::InvalidInput(format!(
                "Similarity threshold must be within 0-100, got {}",
                threshold
            )));
        }
        let (store, _) = self.resolve(source_id).await?;
        Ok(dedup::find_potential_duplicates(
            &store,
            &self.weights,
            threshold,
        ))
    }

    /// Explicit cache-bust for one source.
    pub fn invalidate(&self, source_id: &str) {
        self.cache.invalidate(source_id);
        self.graphs.clear();
    }

    pub async fn get_person(&self, source_id: &str, person_id: &str) -> Result<PersonDetails> {
        let (store, _) = self.resolve(source_id).await?;
        let indi = store
            .individual(person_id)
            .ok_or_else(|| GedmcpError::PersonNotFound {
                id: person_id.to_string(),
                source_id: source_id.to_string(),
            })?;

        let birth = indi.birth();
        let death = indi.death();
        Ok(PersonDetails {
            id: indi.id.clone(),
            name: indi.display_name(),
            sex: indi.sex,
            birth_date: birth.and_then(|e| e.date.as_ref()).map(GedDate::to_string),
            birth_place: birth.and_then(|e| e.place.clone()),
            death_date: death.and_then(|e| e.date.as_ref()).map(GedDate::to_string),
            death_place: death.and_then(|e| e.place.clone()),
            occupation: indi.occupation().map(str::to_string),
            parents: unique_in_order(store.parents_of(person_id)),
            spouses: unique_in_order(store.spouses_of(person_id)),
            children: unique_in_order(store.children_of(person_id)),
        })
    }

    /// Person's events plus the marriage/divorce events of their families,
    /// in chronological order with unknown dates last.
    pub async fn get_timeline(
        &self,
        source_id: &str,
        person_id: &str,
    ) -> Result<Vec<TimelineEvent>> {
        let (store, _) = self.resolve(source_id).await?;
        let indi = store
            .individual(person_id)
            .ok_or_else(|| GedmcpError::PersonNotFound {
                id: person_id.to_string(),
                source_id: source_id.to_string(),
            })?;

        let mut events: Vec<(Option<GedDate>, TimelineEvent)> = indi
            .events
            .iter()
            .map(|e| {
                (
                    e.date.clone(),
                    TimelineEvent {
                        event: e.kind.label().to_string(),
                        date: e.date.as_ref().map(GedDate::to_string),
                        place: e.place.clone(),
                        note: e.note.clone(),
                    },
                )
            })
            .collect();

        for fam_id in &indi.fams {
            if let Some(fam) = store.family(fam_id) {
                for e in &fam.events {
                    if matches!(e.kind, EventKind::Marriage | EventKind::Divorce) {
                        events.push((
                            e.date.clone(),
                            TimelineEvent {
                                event: e.kind.label().to_string(),
                                date: e.date.as_ref().map(GedDate::to_string),
                                place: e.place.clone(),
                                note: e.note.clone(),
                            },
                        ));
                    }
                }
            }
        }

        events.sort_by(|a, b| date::cmp_optional(&a.0, &b.0));
        Ok(events.into_iter().map(|(_, e)| e).collect())
    }

    pub async fn get_statistics(&self, source_id: &str) -> Result<Statistics> {
        let (store, _) = self.resolve(source_id).await?;
        Ok(store.statistics())
    }
}

fn display_name(store: &EntityStore, id: &str) -> String {
    store
        .individual(id)
        .map(|i| i.display_name())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn unique_in_order(ids: Vec<&str>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

fn named_tree(tree: Tree, store: &EntityStore) -> TreeReport {
    fn convert(node: &TreeNode, store: &EntityStore) -> NamedTreeNode {
        NamedTreeNode {
            id: node.id.clone(),
            name: display_name(store, &node.id),
            depth: node.depth,
            cycle: node.cycle,
            branches: node.branches.iter().map(|b| convert(b, store)).collect(),
        }
    }
    TreeReport {
        root: convert(&tree.root, store),
        generations: tree.generations,
        malformed_data: tree.malformed_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::decode::GedcomDecoder;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    const GED: &str = "\
0 @I1@ INDI
1 NAME John /Smith/
1 SEX M
1 BIRT
2 DATE 1900
1 FAMS @F1@
0 @I2@ INDI
1 NAME Mary /Jones/
1 SEX F
1 FAMS @F1@
0 @I3@ INDI
1 NAME Peter /Smith/
1 SEX M
1 BIRT
2 DATE 1925
1 FAMC @F1@
1 FAMS @F2@
0 @I4@ INDI
1 NAME Paul /Smith/
1 SEX M
1 FAMC @F2@
0 @F1@ FAM
1 HUSB @I1@
1 WIFE @I2@
1 CHIL @I3@
1 MARR
2 DATE 1924
0 @F2@ FAM
1 HUSB @I3@
1 CHIL @I4@
";

    fn service(temp_dir: &TempDir) -> GedmcpService {
        std::fs::write(temp_dir.path().join("family.ged"), GED).unwrap();
        let cache = Arc::new(DocumentCache::new(
            Arc::new(LocalStorage::new(temp_dir.path())),
            Arc::new(GedcomDecoder),
            CacheConfig::default(),
        ));
        GedmcpService::new(cache, 4, DuplicateWeights::default(), 75.0)
    }

    #[tokio::test]
    async fn test_find_shortest_path() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir);

        let report = svc
            .find_shortest_path("family.ged", "@I1@", "@I4@")
            .await
            .unwrap();
        assert!(report.found);
        assert_eq!(report.length, Some(2));
        assert_eq!(report.steps[0].name, "John Smith");
        assert_eq!(report.steps[0].relation_to_next.as_deref(), Some("father_of"));
    }

    #[tokio::test]
    async fn test_person_not_found_names_both_ids() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir);

        let err = svc
            .find_shortest_path("family.ged", "@I1@", "@I99@")
            .await
            .unwrap_err();
        match err {
            GedmcpError::PersonNotFound { id, source_id } => {
                assert_eq!(id, "@I99@");
                assert_eq!(source_id, "family.ged");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_common_ancestors() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir);

        // Parent/child pair share nothing at depth 1
        let shared = svc
            .find_common_ancestors("family.ged", "@I3@", "@I4@", 1)
            .await
            .unwrap();
        assert!(shared.is_empty());
    }

    #[tokio::test]
    async fn test_ancestor_tree_named() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir);

        let report = svc.ancestor_tree("family.ged", "@I4@", 2).await.unwrap();
        assert!(!report.malformed_data);
        assert_eq!(report.root.name, "Paul Smith");
        assert_eq!(report.root.branches.len(), 1);
        assert_eq!(report.root.branches[0].name, "Peter Smith");
        assert_eq!(report.root.branches[0].branches.len(), 2);
    }

    #[tokio::test]
    async fn test_get_person() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir);

        let person = svc.get_person("family.ged", "@I3@").await.unwrap();
        assert_eq!(person.name, "Peter Smith");
        assert_eq!(person.birth_date.as_deref(), Some("1925"));
        assert_eq!(person.parents, vec!["@I1@", "@I2@"]);
        assert_eq!(person.children, vec!["@I4@"]);
    }

    #[tokio::test]
    async fn test_timeline_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir);

        let timeline = svc.get_timeline("family.ged", "@I1@").await.unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].event, "birth");
        assert_eq!(timeline[0].date.as_deref(), Some("1900"));
        assert_eq!(timeline[1].event, "marriage");
        assert_eq!(timeline[1].date.as_deref(), Some("1924"));
    }

    #[tokio::test]
    async fn test_duplicates_threshold_validation() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir);

        let err = svc
            .find_potential_duplicates("family.ged", Some(150.0))
            .await
            .unwrap_err();
        assert!(matches!(err, GedmcpError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_statistics() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir);

        let stats = svc.get_statistics("family.ged").await.unwrap();
        assert_eq!(stats.total_individuals, 4);
        assert_eq!(stats.total_families, 2);
    }

    #[tokio::test]
    async fn test_invalidate_then_requery() {
        let temp_dir = TempDir::new().unwrap();
        let svc = service(&temp_dir);

        svc.get_statistics("family.ged").await.unwrap();
        svc.invalidate("family.ged");
        let stats = svc.get_statistics("family.ged").await.unwrap();
        assert_eq!(stats.total_individuals, 4);
    }
}
