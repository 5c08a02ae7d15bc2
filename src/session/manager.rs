//! Query session: model, compiler and requests tied together.
//!
//! Mutations apply immediately; fetched data is merged back through the
//! request lifecycle so superseded responses never touch the graph. Each
//! fetch is split into a synchronous `begin_*` that compiles and issues it
//! and an `apply_*` that merges its response, so callers may interleave
//! several requests. Mutations follow the same split: `begin_select_value`
//! and friends change the graph at once and hand back the [`PendingUpdate`]
//! they issued; a later mutation supersedes it. The async helpers run both
//! halves in sequence.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::model::{
    row_constraint_value, row_count, GraphError, NodeId, NodeType, Position, QueryGraph,
    RelationshipSegment, Row, SchemaNode,
};
use crate::provider::LabelProvider;
use crate::query::{QueryCompiler, QueryConfig};
use crate::runner::{StatementBatch, StatementRunner};

use super::events::{SessionEvent, SessionEventBus, SessionEventKind};
use super::lifecycle::{Concern, FetchOutcome, FetchResponse, PendingFetch, RequestLifecycle};

/// Outcome of starting relation discovery for a node.
pub enum RelationDiscovery {
    /// Relations came from a static schema; holds auto-expanded children
    Loaded(Vec<NodeId>),
    /// A discovery query is in flight
    Pending(PendingFetch<NodeId>),
}

/// Count, auto-load and result requests issued together.
///
/// Holds no borrow of the session, so it can be awaited while further
/// mutations go through. Dropping it cancels nothing.
#[derive(Default)]
pub struct PendingUpdate {
    counts: Option<PendingFetch<Vec<NodeId>>>,
    auto_load: Option<PendingFetch<Vec<NodeId>>>,
    results: Option<PendingFetch<bool>>,
}

impl PendingUpdate {
    /// Whether no request was issued (e.g. the mutation changed nothing).
    pub fn is_empty(&self) -> bool {
        self.counts.is_none() && self.auto_load.is_none() && self.results.is_none()
    }

    pub async fn wait(self) -> UpdateResponses {
        let (counts, auto_load, results) = futures::join!(
            wait(self.counts),
            wait(self.auto_load),
            wait(self.results)
        );
        UpdateResponses {
            counts,
            auto_load,
            results,
        }
    }
}

/// Finished requests of a [`PendingUpdate`], merged by `apply_update`.
pub struct UpdateResponses {
    counts: Option<FetchResponse<Vec<NodeId>>>,
    auto_load: Option<FetchResponse<Vec<NodeId>>>,
    results: Option<FetchResponse<bool>>,
}

/// What clicking a query node did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChooseOutcome {
    /// Its value nodes were showing and are now hidden
    Collapsed,
    /// This many value nodes are now showing
    Expanded(usize),
    /// The node does not offer values (immutable or group)
    Ignored,
    /// Another value fetch is still pending
    Rejected,
}

pub struct QuerySession {
    graph: QueryGraph,
    compiler: QueryCompiler,
    provider: Arc<dyn LabelProvider>,
    requests: RequestLifecycle,
    events: SessionEventBus,
    results: Vec<Row>,
    graph_results: Vec<Row>,
}

impl QuerySession {
    pub fn new(
        provider: Arc<dyn LabelProvider>,
        config: QueryConfig,
        runner: Arc<dyn StatementRunner>,
    ) -> Self {
        Self {
            graph: QueryGraph::new(provider.clone(), config.page_size),
            compiler: QueryCompiler::new(provider.clone(), config),
            provider,
            requests: RequestLifecycle::new(runner),
            events: SessionEventBus::default(),
            results: Vec::new(),
            graph_results: Vec::new(),
        }
    }

    pub fn graph(&self) -> &QueryGraph {
        &self.graph
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    pub fn events(&self) -> &SessionEventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Flat rows of the last merged result query.
    pub fn results(&self) -> &[Row] {
        &self.results
    }

    /// Graph-shaped rows of the last merged result query.
    pub fn graph_results(&self) -> &[Row] {
        &self.graph_results
    }

    pub fn is_value_fetch_in_progress(&self) -> bool {
        self.requests.is_value_busy()
    }

    // ========================================================================
    // Session creation
    // ========================================================================

    /// Start a new query on `label`, discover its relations and refresh.
    pub async fn start(&mut self, label: &str, anchor: Option<Position>) -> Result<NodeId> {
        self.prepare_new_graph();
        let root = self.graph.add_root(label, anchor);
        self.events.emit(SessionEventKind::GraphChanged);
        self.load_relationships(root).await?;
        self.update().await?;
        Ok(root)
    }

    /// Start a new query pre-populated from a static schema.
    pub async fn start_from_schema(
        &mut self,
        schema: &SchemaNode,
        anchor: Option<Position>,
    ) -> Result<NodeId> {
        self.prepare_new_graph();
        let root = self.graph.add_from_schema(schema, anchor);
        self.events.emit(SessionEventKind::GraphChanged);
        self.update().await?;
        Ok(root)
    }

    fn prepare_new_graph(&mut self) {
        if !self.graph.is_empty() {
            warn!("Starting a new query over a non-empty graph, resetting");
            self.reset();
        }
    }

    /// Cancel every request and clear the graph and its label table.
    pub fn reset(&mut self) {
        self.requests.cancel_all();
        self.graph.clear();
        self.results.clear();
        self.graph_results.clear();
        self.events.emit(SessionEventKind::GraphChanged);
    }

    // ========================================================================
    // Relation discovery
    // ========================================================================

    /// Load `node`'s relationship segments from the schema, or issue discovery.
    pub fn begin_relation_discovery(&mut self, node: NodeId) -> Result<RelationDiscovery> {
        let label = self.graph.require(node)?.label.clone();

        if let Some(schema) = self.provider.schema(&label) {
            self.graph.set_relationships(node, schema.segments())?;
            self.events.emit(SessionEventKind::RelationsLoaded { node });
            return Ok(RelationDiscovery::Loaded(self.auto_expand(node)?));
        }

        let statement = self.compiler.node_relation_query(&self.graph, node)?;
        Ok(RelationDiscovery::Pending(
            self.requests
                .issue_discovery(node, StatementBatch::single(statement)),
        ))
    }

    /// Merge discovered relations. Returns the auto-expanded children.
    ///
    /// A failed discovery means "no relations".
    pub fn apply_relation_discovery(&mut self, response: FetchResponse<NodeId>) -> Result<Vec<NodeId>> {
        if !self.requests.accept_discovery(&response) {
            return Ok(vec![]);
        }
        let node = response.context;
        if self.graph.node(node).is_none() {
            debug!("Discovered relations for removed node {}", node);
            return Ok(vec![]);
        }

        let segments = match response.outcome {
            FetchOutcome::Completed(results) => results
                .into_iter()
                .next()
                .unwrap_or_default()
                .iter()
                .filter_map(segment_from_row)
                .collect(),
            FetchOutcome::Failed(e) => {
                warn!("Relation discovery for {} failed: {}", node, e);
                vec![]
            }
            FetchOutcome::Aborted => return Ok(vec![]),
        };

        self.graph.set_relationships(node, segments)?;
        self.events.emit(SessionEventKind::RelationsLoaded { node });
        self.auto_expand(node)
    }

    /// Expand every segment of an auto-expand node.
    ///
    /// A node whose label already occurs among its ancestors is left alone,
    /// otherwise self-referencing schemas would expand forever.
    fn auto_expand(&mut self, node: NodeId) -> Result<Vec<NodeId>> {
        let current = self.graph.require(node)?;
        if !self.provider.is_auto_expand_relations(&current.label) {
            return Ok(vec![]);
        }
        if self.has_ancestor_labeled(current.parent, &current.label) {
            warn!(
                "Not auto-expanding {}, {} already occurs on its path",
                node, current.label
            );
            return Ok(vec![]);
        }

        let mut children = Vec::new();
        for index in 0..current.relationships.len() {
            children.push(self.graph.expand_relationship(node, index)?);
        }
        if !children.is_empty() {
            self.events.emit(SessionEventKind::GraphChanged);
        }
        Ok(children)
    }

    fn has_ancestor_labeled(&self, mut current: Option<NodeId>, label: &str) -> bool {
        while let Some(id) = current {
            match self.graph.node(id) {
                Some(node) if node.label == label => return true,
                Some(node) => current = node.parent,
                None => return false,
            }
        }
        false
    }

    /// Load relations of `node`, then of every node auto-expanded from it.
    pub async fn load_relationships(&mut self, node: NodeId) -> Result<()> {
        let mut worklist = vec![node];
        while let Some(id) = worklist.pop() {
            match self.begin_relation_discovery(id)? {
                RelationDiscovery::Loaded(children) => worklist.extend(children),
                RelationDiscovery::Pending(pending) => {
                    let response = pending.wait().await;
                    worklist.extend(self.apply_relation_discovery(response)?);
                }
            }
        }
        Ok(())
    }

    /// Add a `CHOOSE` child along one of `node`'s segments, load its relations
    /// and refresh.
    pub async fn expand_relationship(&mut self, node: NodeId, segment_index: usize) -> Result<NodeId> {
        let child = self.graph.expand_relationship(node, segment_index)?;
        self.events.emit(SessionEventKind::GraphChanged);
        self.load_relationships(child).await?;
        self.update().await?;
        Ok(child)
    }

    /// Add the child at once, issue its relation discovery and the refresh.
    ///
    /// Children auto-expanded when the discovery is merged are not covered
    /// by the returned update; issue another one if any come back.
    pub fn begin_expand_relationship(
        &mut self,
        node: NodeId,
        segment_index: usize,
    ) -> Result<(NodeId, RelationDiscovery, PendingUpdate)> {
        let child = self.graph.expand_relationship(node, segment_index)?;
        self.events.emit(SessionEventKind::GraphChanged);
        let discovery = self.begin_relation_discovery(child)?;
        Ok((child, discovery, self.begin_update()?))
    }

    // ========================================================================
    // Counts
    // ========================================================================

    /// Issue one count statement per countable node, superseding the last batch.
    pub fn begin_count_refresh(&mut self) -> Result<Option<PendingFetch<Vec<NodeId>>>> {
        let nodes: Vec<NodeId> = self
            .graph
            .nodes()
            .iter()
            .filter(|n| n.is_countable())
            .map(|n| n.id)
            .collect();
        if nodes.is_empty() {
            return Ok(None);
        }

        let statements = nodes
            .iter()
            .map(|id| self.compiler.node_count_query(&self.graph, *id))
            .collect::<Result<Vec<_>, GraphError>>()?;
        Ok(Some(self.requests.issue(
            Concern::Count,
            StatementBatch::new(statements),
            nodes,
        )))
    }

    /// Merge counts; a failure zeroes them. Returns whether anything merged.
    pub fn apply_count_refresh(&mut self, response: FetchResponse<Vec<NodeId>>) -> bool {
        if !self.requests.accept(&response) {
            return false;
        }

        let counts: Vec<u64> = match response.outcome {
            FetchOutcome::Completed(results) => results
                .iter()
                .map(|rows| rows.first().map(row_count).unwrap_or(0))
                .collect(),
            FetchOutcome::Failed(e) => {
                warn!("Count refresh failed: {}", e);
                vec![]
            }
            FetchOutcome::Aborted => return false,
        };

        for (index, id) in response.context.iter().enumerate() {
            if let Some(node) = self.graph.node_mut(*id) {
                node.count = counts.get(index).copied().unwrap_or(0);
            }
        }
        self.events.emit(SessionEventKind::CountsUpdated);
        true
    }

    // ========================================================================
    // Auto-load values
    // ========================================================================

    /// Prefetch candidate values of every auto-load node.
    pub fn begin_auto_load(&mut self) -> Result<Option<PendingFetch<Vec<NodeId>>>> {
        let nodes: Vec<NodeId> = self
            .graph
            .nodes()
            .iter()
            .filter(|n| n.is_countable() && n.is_auto_load_value)
            .map(|n| n.id)
            .collect();
        if nodes.is_empty() {
            return Ok(None);
        }

        let statements = nodes
            .iter()
            .map(|id| self.compiler.node_value_query(&self.graph, *id))
            .collect::<Result<Vec<_>, GraphError>>()?;
        Ok(Some(self.requests.issue(
            Concern::AutoLoad,
            StatementBatch::new(statements),
            nodes,
        )))
    }

    pub fn apply_auto_load(&mut self, response: FetchResponse<Vec<NodeId>>) -> Result<bool> {
        if !self.requests.accept(&response) {
            return Ok(false);
        }

        let mut results = match response.outcome {
            FetchOutcome::Completed(results) => results,
            FetchOutcome::Failed(e) => {
                warn!("Auto-load failed: {}", e);
                vec![]
            }
            FetchOutcome::Aborted => return Ok(false),
        };
        results.resize(response.context.len(), Vec::new());

        for (id, rows) in response.context.into_iter().zip(results) {
            if self.graph.node(id).is_none() {
                continue;
            }
            let rows = self.unselected_rows(id, rows)?;
            self.graph.set_data(id, rows)?;
            if self.graph.require(id)?.value_expanded {
                self.graph.expand_values(id)?;
            }
            self.events.emit(SessionEventKind::ValuesLoaded { node: id });
        }
        Ok(true)
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// Issue the result query; graph mode joins the batch while anyone
    /// listens for graph results.
    pub fn begin_results(&mut self) -> Result<Option<PendingFetch<bool>>> {
        if self.graph.is_empty() {
            return Ok(None);
        }

        let graph_mode = self.events.has_graph_result_listeners();
        let mut statements = vec![self.compiler.result_query(&self.graph, false)?];
        if graph_mode {
            statements.push(self.compiler.result_query(&self.graph, true)?);
        }
        Ok(Some(self.requests.issue(
            Concern::Results,
            StatementBatch::new(statements),
            graph_mode,
        )))
    }

    pub fn apply_results(&mut self, response: FetchResponse<bool>) -> bool {
        if !self.requests.accept(&response) {
            return false;
        }

        let mut results = match response.outcome {
            FetchOutcome::Completed(results) => results.into_iter(),
            FetchOutcome::Failed(e) => {
                warn!("Result query failed: {}", e);
                Vec::new().into_iter()
            }
            FetchOutcome::Aborted => return false,
        };

        self.results = results.next().unwrap_or_default();
        self.events.emit(SessionEventKind::ResultsUpdated {
            rows: self.results.len(),
        });

        if response.context {
            self.graph_results = results.next().unwrap_or_default();
            self.events.emit_graph_results(self.graph_results.clone());
        }
        true
    }

    /// Issue counts, auto-loaded values and results, superseding the
    /// previous update.
    pub fn begin_update(&mut self) -> Result<PendingUpdate> {
        Ok(PendingUpdate {
            counts: self.begin_count_refresh()?,
            auto_load: self.begin_auto_load()?,
            results: self.begin_results()?,
        })
    }

    /// Merge whatever is still current. Returns whether anything merged.
    pub fn apply_update(&mut self, responses: UpdateResponses) -> Result<bool> {
        let mut merged = false;
        if let Some(response) = responses.counts {
            merged |= self.apply_count_refresh(response);
        }
        if let Some(response) = responses.auto_load {
            merged |= self.apply_auto_load(response)?;
        }
        if let Some(response) = responses.results {
            merged |= self.apply_results(response);
        }
        Ok(merged)
    }

    /// Refresh counts, auto-loaded values and results concurrently.
    pub async fn update(&mut self) -> Result<()> {
        let pending = self.begin_update()?;
        self.finish_update(pending).await?;
        Ok(())
    }

    async fn finish_update(&mut self, pending: PendingUpdate) -> Result<bool> {
        if pending.is_empty() {
            return Ok(false);
        }
        let responses = pending.wait().await;
        self.apply_update(responses)
    }

    // ========================================================================
    // Value selection
    // ========================================================================

    /// Fetch candidate values of `node`. Fails while another fetch is pending.
    ///
    /// The returned fetch holds the busy guard; dropping it unmerged
    /// releases the guard and cancels the request.
    pub fn begin_value_fetch(&mut self, node: NodeId) -> Result<PendingFetch<NodeId>, GraphError> {
        self.graph.require(node)?;
        if self.requests.is_value_busy() {
            return Err(GraphError::ValueFetchInProgress);
        }

        let statement = self.compiler.node_value_query(&self.graph, node)?;
        self.requests
            .issue_value_fetch(StatementBatch::single(statement), node)
    }

    /// Merge fetched values and show their first page.
    ///
    /// Values already selected on the node are left out. Returns the number
    /// of value nodes shown; a failure leaves the node collapsed.
    pub fn apply_value_fetch(&mut self, response: FetchResponse<NodeId>) -> Result<usize> {
        if !self.requests.accept(&response) {
            return Ok(0);
        }
        let node = response.context;
        if self.graph.node(node).is_none() {
            debug!("Fetched values for removed node {}", node);
            return Ok(0);
        }

        let rows = match response.outcome {
            FetchOutcome::Completed(results) => results.into_iter().next().unwrap_or_default(),
            FetchOutcome::Failed(e) => {
                warn!("Value fetch for {} failed: {}", node, e);
                return Ok(0);
            }
            FetchOutcome::Aborted => return Ok(0),
        };

        let rows = self.unselected_rows(node, rows)?;
        self.graph.set_data(node, rows)?;
        let shown = self.graph.expand_values(node)?;
        self.events.emit(SessionEventKind::ValuesLoaded { node });
        Ok(shown)
    }

    fn unselected_rows(&self, node: NodeId, rows: Vec<Row>) -> Result<Vec<Row>, GraphError> {
        let node = self.graph.require(node)?;
        let attribute = self.provider.constraint_attribute(&node.label);
        let selected: Vec<Value> = node
            .value
            .iter()
            .map(|v| v.constraint_value(&attribute))
            .collect();
        Ok(rows
            .into_iter()
            .filter(|row| !selected.contains(&row_constraint_value(row, &attribute)))
            .collect())
    }

    /// Click on a query node: toggle its value nodes, fetching them if needed.
    pub async fn choose(&mut self, node: NodeId) -> Result<ChooseOutcome> {
        let current = self.graph.require(node)?;

        if current.value_expanded {
            self.graph.collapse_values(node)?;
            self.events.emit(SessionEventKind::GraphChanged);
            return Ok(ChooseOutcome::Collapsed);
        }
        if current.immutable || !matches!(current.node_type, NodeType::Root | NodeType::Choose) {
            return Ok(ChooseOutcome::Ignored);
        }
        if current.is_auto_load_value && current.data.is_some() {
            let shown = self.graph.expand_values(node)?;
            self.events.emit(SessionEventKind::GraphChanged);
            return Ok(ChooseOutcome::Expanded(shown));
        }

        let pending = match self.begin_value_fetch(node) {
            Ok(pending) => pending,
            Err(GraphError::ValueFetchInProgress) => {
                debug!("Value fetch in progress, ignoring click on {}", node);
                return Ok(ChooseOutcome::Rejected);
            }
            Err(e) => return Err(e.into()),
        };
        let response = pending.wait().await;
        Ok(ChooseOutcome::Expanded(self.apply_value_fetch(response)?))
    }

    /// Select a value node as a constraint on its parent and issue the
    /// refresh. Returns the parent.
    pub fn begin_select_value(&mut self, value_node: NodeId) -> Result<(NodeId, PendingUpdate)> {
        let parent = self.graph.select_value(value_node)?;
        self.events.emit(SessionEventKind::GraphChanged);
        Ok((parent, self.begin_update()?))
    }

    /// Unselect a value of `node`; the update is empty when it was not
    /// selected.
    pub fn begin_remove_value(&mut self, node: NodeId, value: NodeId) -> Result<(bool, PendingUpdate)> {
        let removed = self.graph.remove_value(node, value)?;
        if !removed {
            return Ok((false, PendingUpdate::default()));
        }
        self.events.emit(SessionEventKind::GraphChanged);
        Ok((true, self.begin_update()?))
    }

    pub fn begin_negate(&mut self, node: NodeId) -> Result<(bool, PendingUpdate)> {
        let changed = self.graph.negate(node)?;
        if !changed {
            return Ok((false, PendingUpdate::default()));
        }
        self.events.emit(SessionEventKind::GraphChanged);
        Ok((true, self.begin_update()?))
    }

    /// Remove `node` with its subtree. Removing the root resets the session
    /// and issues nothing.
    ///
    /// Returns whether a removed node held a value or a negation.
    pub fn begin_remove_node(&mut self, node: NodeId) -> Result<(bool, PendingUpdate)> {
        let held = self.graph.remove_node(node)?;
        if self.graph.is_empty() {
            self.reset();
            return Ok((held, PendingUpdate::default()));
        }
        self.events.emit(SessionEventKind::GraphChanged);
        Ok((held, self.begin_update()?))
    }

    /// Select a value node as a constraint on its parent, then refresh.
    pub async fn select_value(&mut self, value_node: NodeId) -> Result<NodeId> {
        let (parent, pending) = self.begin_select_value(value_node)?;
        self.finish_update(pending).await?;
        Ok(parent)
    }

    pub async fn remove_value(&mut self, node: NodeId, value: NodeId) -> Result<bool> {
        let (removed, pending) = self.begin_remove_value(node, value)?;
        self.finish_update(pending).await?;
        Ok(removed)
    }

    pub async fn negate(&mut self, node: NodeId) -> Result<bool> {
        let (changed, pending) = self.begin_negate(node)?;
        self.finish_update(pending).await?;
        Ok(changed)
    }

    pub async fn remove_node(&mut self, node: NodeId) -> Result<bool> {
        let (held, pending) = self.begin_remove_node(node)?;
        self.finish_update(pending).await?;
        Ok(held)
    }

    pub fn next_page(&mut self, node: NodeId) -> Result<bool, GraphError> {
        let moved = self.graph.next_page(node)?;
        if moved {
            self.events.emit(SessionEventKind::GraphChanged);
        }
        Ok(moved)
    }

    pub fn previous_page(&mut self, node: NodeId) -> Result<bool, GraphError> {
        let moved = self.graph.previous_page(node)?;
        if moved {
            self.events.emit(SessionEventKind::GraphChanged);
        }
        Ok(moved)
    }

    // ========================================================================
    // Taxonomy
    // ========================================================================

    /// Instance counts per label, independent of the graph.
    pub async fn taxonomy_counts(&self, labels: &[String]) -> Result<Vec<(String, u64)>> {
        let statements = labels
            .iter()
            .map(|label| self.compiler.taxonomy_count_query(label))
            .collect();
        let response = self
            .requests
            .runner()
            .run(StatementBatch::new(statements))
            .await?;
        let results = crate::runner::parse_results(&response, labels.len());

        Ok(labels
            .iter()
            .cloned()
            .zip(results.iter().map(|rows| rows.first().map(row_count).unwrap_or(0)))
            .collect())
    }
}

async fn wait<T>(pending: Option<PendingFetch<T>>) -> Option<FetchResponse<T>> {
    match pending {
        Some(pending) => Some(pending.wait().await),
        None => None,
    }
}

/// Relationship segment from a relation discovery row.
fn segment_from_row(row: &Row) -> Option<RelationshipSegment> {
    let label = row.get("label")?.as_str()?;
    let target = row.get("target")?.as_str()?;
    Some(RelationshipSegment::new(label, target, row_count(row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::provider::{ConfigProvider, ProviderConfig};
    use crate::runner::mock::MockRunner;
    use crate::test_helpers::{assert_tree_invariant, name_rows, relation_rows, row, test_provider};

    fn new_session(runner: MockRunner) -> (QuerySession, Arc<MockRunner>) {
        let runner = Arc::new(runner);
        let session = QuerySession::new(test_provider(), QueryConfig::default(), runner.clone());
        (session, runner)
    }

    fn movie_db() -> MockRunner {
        MockRunner::new()
            .with_rows("type(r)", relation_rows(&[("FOLLOWS", "Person", 3), ("ACTED_IN", "Movie", 5)]))
            .with_rows("count(DISTINCT", vec![count_row(2)])
            .with_rows("count(person) AS count", name_rows(12))
    }

    #[tokio::test]
    async fn test_start_discovers_relations() {
        let (mut session, runner) = new_session(movie_db());
        let root = session.start("Person", None).await.unwrap();

        let node = session.graph().node(root).unwrap();
        assert!(node.relationships_loaded);
        assert_eq!(node.relationships.len(), 2);
        assert_eq!(node.relationships[1].label, "ACTED_IN");
        assert_eq!(node.relationships[1].count, 5);
        // Person auto-loads its values
        assert_eq!(node.data.as_ref().unwrap().len(), 12);
        assert!(!runner.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_schema_skips_discovery() {
        let (mut session, runner) = new_session(MockRunner::new());
        let root = session.start("Team", None).await.unwrap();

        let node = session.graph().node(root).unwrap();
        assert_eq!(node.relationships.len(), 1);
        assert_eq!(node.relationships[0].label, "HAS_MEMBER");
        let statements = runner.statements().await;
        assert!(statements.iter().all(|s| !s.contains("type(r)")));
    }

    #[tokio::test]
    async fn test_choose_fetches_and_expands_values() {
        let (mut session, _runner) = new_session(movie_db());
        let root = session.start("Person", None).await.unwrap();
        let child = session.expand_relationship(root, 0).await.unwrap();

        // Person children auto-load too, so the click expands from data
        assert_eq!(session.choose(child).await.unwrap(), ChooseOutcome::Expanded(10));
        assert!(session.next_page(child).unwrap());
        assert_eq!(session.graph().value_nodes(child).len(), 2);
        assert_eq!(session.choose(child).await.unwrap(), ChooseOutcome::Collapsed);
    }

    #[tokio::test]
    async fn test_select_value_filters_selected_rows() {
        let (mut session, _runner) = new_session(movie_db());
        let root = session.start("Person", None).await.unwrap();
        session.choose(root).await.unwrap();
        let value = session.graph().value_nodes(root)[0].id;

        assert_eq!(session.select_value(value).await.unwrap(), root);
        let node = session.graph().node(root).unwrap();
        assert_eq!(node.value.len(), 1);
        // the refreshed auto-load leaves the selected row out
        assert_eq!(node.data.as_ref().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn test_value_fetch_guard_rejects_second_click() {
        let (runner, gate) = MockRunner::new()
            .with_rows("count(movie) AS count", name_rows(3))
            .gated();
        let (mut session, _runner) = new_session(runner);
        let root = session.start_schema_free("Movie");

        let pending = session.begin_value_fetch(root).unwrap();
        assert!(session.is_value_fetch_in_progress());
        assert_eq!(session.choose(root).await.unwrap(), ChooseOutcome::Rejected);

        gate.add_permits(1);
        let response = pending.wait().await;
        assert_eq!(session.apply_value_fetch(response).unwrap(), 3);
        assert!(!session.is_value_fetch_in_progress());
    }

    #[tokio::test]
    async fn test_abandoned_choose_releases_value_guard() {
        let (runner, gate) = MockRunner::new()
            .with_rows("count(movie) AS count", name_rows(3))
            .gated();
        let (mut session, _runner) = new_session(runner);
        let root = session.start_schema_free("Movie");

        let abandoned = tokio::time::timeout(Duration::from_millis(50), session.choose(root)).await;
        assert!(abandoned.is_err());
        assert!(!session.is_value_fetch_in_progress());

        gate.add_permits(1);
        assert_eq!(session.choose(root).await.unwrap(), ChooseOutcome::Expanded(3));
        assert!(!session.is_value_fetch_in_progress());
    }

    #[tokio::test]
    async fn test_dropped_value_fetch_allows_next_click() {
        let (runner, gate) = MockRunner::new()
            .with_rows("count(movie) AS count", name_rows(2))
            .gated();
        let (mut session, _runner) = new_session(runner);
        let root = session.start_schema_free("Movie");

        drop(session.begin_value_fetch(root).unwrap());
        let pending = session.begin_value_fetch(root).unwrap();
        gate.add_permits(1);
        assert_eq!(session.apply_value_fetch(pending.wait().await).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_value_fetch_leaves_node_collapsed() {
        let (mut session, runner) = new_session(MockRunner::new());
        let root = session.start_schema_free("Movie");
        runner.set_failing(true);

        assert_eq!(session.choose(root).await.unwrap(), ChooseOutcome::Expanded(0));
        assert!(!session.graph().node(root).unwrap().value_expanded);
        assert!(!session.is_value_fetch_in_progress());
    }

    #[tokio::test]
    async fn test_superseded_count_refresh_is_not_merged() {
        let (runner, gate) = MockRunner::new()
            .with_rows("count(DISTINCT", vec![count_row(9)])
            .gated();
        let (mut session, _runner) = new_session(runner);
        let root = session.start_schema_free("Movie");

        let first = session.begin_count_refresh().unwrap().unwrap();
        let second = session.begin_count_refresh().unwrap().unwrap();
        let first = first.wait().await;
        assert!(!session.apply_count_refresh(first));
        assert_eq!(session.graph().node(root).unwrap().count, 0);

        gate.add_permits(1);
        let second = second.wait().await;
        assert!(session.apply_count_refresh(second));
        assert_eq!(session.graph().node(root).unwrap().count, 9);
    }

    #[tokio::test]
    async fn test_failed_count_refresh_zeroes_counts() {
        let (mut session, runner) =
            new_session(MockRunner::new().with_rows("count(DISTINCT", vec![count_row(4)]));
        let root = session.start_schema_free("Movie");
        session.update().await.unwrap();
        assert_eq!(session.graph().node(root).unwrap().count, 4);

        runner.set_failing(true);
        session.update().await.unwrap();
        assert_eq!(session.graph().node(root).unwrap().count, 0);
        assert!(session.results().is_empty());
    }

    #[tokio::test]
    async fn test_graph_results_only_with_listeners() {
        let (mut session, runner) = new_session(MockRunner::new());
        session.start_schema_free("Movie");
        session.update().await.unwrap();
        let flat_only = runner.statements().await;
        assert_eq!(flat_only.iter().filter(|s| s.contains("RETURN DISTINCT")).count(), 1);

        let mut graph_rows = session.events().subscribe_graph_results();
        session.update().await.unwrap();
        let all = runner.statements().await;
        assert_eq!(all.iter().filter(|s| s.contains("RETURN DISTINCT")).count(), 3);
        assert!(graph_rows.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_mutation_supersedes_pending_update() {
        let mut heat = row(&[("title", "Heat")]);
        heat.insert("count".into(), serde_json::json!(2));
        let (runner, gate) = MockRunner::new()
            .with_rows("count(DISTINCT", vec![count_row(9)])
            .with_rows("count(movie) AS count", vec![heat])
            .gated();
        let (mut session, runner) = new_session(runner);
        let root = session.start_schema_free("Movie");

        let values = session.begin_value_fetch(root).unwrap();
        gate.add_permits(1);
        assert_eq!(session.apply_value_fetch(values.wait().await).unwrap(), 1);
        let value = session.graph().value_nodes(root)[0].id;

        // both mutations land before any refresh returns
        let (parent, first) = session.begin_select_value(value).unwrap();
        assert_eq!(parent, root);
        assert!(session.graph().node(root).unwrap().has_value());
        let (removed, second) = session.begin_remove_value(root, value).unwrap();
        assert!(removed);
        assert!(!session.graph().node(root).unwrap().has_value());

        let first = first.wait().await;
        assert!(!session.apply_update(first).unwrap());
        assert_eq!(session.graph().node(root).unwrap().count, 0);

        gate.add_permits(2);
        let second = second.wait().await;
        assert!(session.apply_update(second).unwrap());
        assert_eq!(session.graph().node(root).unwrap().count, 9);

        // the merged result query no longer carries the removed constraint
        let statements = runner.statements().await;
        let last = statements
            .iter()
            .rev()
            .find(|s| s.contains("RETURN DISTINCT"))
            .unwrap();
        assert!(!last.contains("$movie_title"), "{}", last);
    }

    #[tokio::test]
    async fn test_expand_applies_before_discovery_returns() {
        let (runner, gate) = movie_db().gated();
        let (mut session, _runner) = new_session(runner);
        let root = session.start_schema_free("Movie");
        session
            .graph
            .set_relationships(root, vec![RelationshipSegment::new("ACTED_IN", "Person", 4)])
            .unwrap();

        let (child, discovery, update) = session.begin_expand_relationship(root, 0).unwrap();
        assert_eq!(session.graph().children(root), vec![child]);
        let RelationDiscovery::Pending(discovery) = discovery else {
            panic!("Person relations are discovered");
        };
        assert!(!update.is_empty());

        gate.add_permits(4);
        let response = discovery.wait().await;
        assert!(session.apply_relation_discovery(response).unwrap().is_empty());
        assert_eq!(session.graph().node(child).unwrap().relationships.len(), 2);
        assert!(session.apply_update(update.wait().await).unwrap());
    }

    #[tokio::test]
    async fn test_unchanged_mutation_issues_nothing() {
        let (mut session, runner) = new_session(MockRunner::new());
        let root = session.start_schema_free("Movie");

        let (removed, pending) = session.begin_remove_value(root, NodeId(99)).unwrap();
        assert!(!removed);
        assert!(pending.is_empty());
        let (changed, pending) = session.begin_negate(root).unwrap();
        assert!(!changed);
        assert!(pending.is_empty());
        assert!(runner.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_self_referencing_auto_expand_terminates() {
        let config: ProviderConfig = serde_yaml::from_str(
            r#"
labels:
  Unit:
    auto_expand_relations: true
    schema:
      label: Unit
      rel:
        - label: PART_OF
          target:
            label: Unit
"#,
        )
        .unwrap();
        let runner = Arc::new(MockRunner::new());
        let mut session = QuerySession::new(
            Arc::new(ConfigProvider::new(config)),
            QueryConfig::default(),
            runner,
        );

        let root = tokio::time::timeout(Duration::from_secs(5), session.start("Unit", None))
            .await
            .expect("auto-expansion must terminate")
            .unwrap();

        let graph = session.graph();
        assert_eq!(graph.nodes().len(), 2);
        let child = graph.children(root)[0];
        assert_eq!(graph.node(child).unwrap().label, "Unit");
        assert!(graph.node(child).unwrap().relationships_loaded);
        assert!(graph.children(child).is_empty());
        assert_tree_invariant(graph);
    }

    #[tokio::test]
    async fn test_remove_root_resets() {
        let (mut session, _runner) = new_session(movie_db());
        let root = session.start("Person", None).await.unwrap();
        let mut events = session.subscribe();

        session.remove_node(root).await.unwrap();
        assert!(session.graph().is_empty());
        assert!(session.results().is_empty());
        assert_eq!(events.try_recv().unwrap().kind, SessionEventKind::GraphChanged);
    }

    #[tokio::test]
    async fn test_taxonomy_counts() {
        let (session, _runner) = new_session(
            MockRunner::new().with_rows("MATCH (n:`Team`)", vec![count_row(7)]),
        );
        let counts = session
            .taxonomy_counts(&["Team".to_string(), "Movie".to_string()])
            .await
            .unwrap();
        assert_eq!(counts, vec![("Team".to_string(), 7), ("Movie".to_string(), 0)]);
    }

    fn count_row(count: u64) -> Row {
        let mut row = Row::new();
        row.insert("count".into(), serde_json::json!(count));
        row
    }

    impl QuerySession {
        /// Root without discovery or refresh.
        fn start_schema_free(&mut self, label: &str) -> NodeId {
            let root = self.graph.add_root(label, None);
            self.graph.set_relationships(root, vec![]).unwrap();
            root
        }
    }
}
