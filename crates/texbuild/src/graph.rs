//! The dependency graph.
//!
//! Every file involved in a build is a node of the graph.
//! Files that are inputs of the build, like the LaTeX source or a `.bib` database, are *leaves*.
//! All other nodes carry an [Action] that produces the node's *products* from its *sources*:
//!     running the typesetter, converting a figure, compressing the final output.
//!
//! The graph is generic over the build state `S` that actions operate on.
//! An action receives the whole state while it runs, so that it can inspect the graph,
//!     add sources to its own node or create new nodes.
//! To make this possible the action is temporarily taken out of its node while it runs.
//!
//! [make] brings a node up to date by making its sources first and then running the node's action
//!     if needed. [clean] removes the products of a node and of everything it depends on.
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::files;
use crate::logparse::Message;
use crate::{Error, Result};

/// Identifier of a node in a [Graph].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Result of making a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The node or one of its dependencies failed.
    Error,
    /// Nothing needed to be done.
    Unchanged,
    /// The node's action ran and its products were rebuilt.
    Changed,
}

/// The kind of build step a node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Shell,
    Converter,
    Typesetter,
    Compressed,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::Leaf => "leaf",
            NodeKind::Shell => "shell",
            NodeKind::Converter => "converter",
            NodeKind::Typesetter => "typesetter",
            NodeKind::Compressed => "compressed",
        };
        write!(f, "{s}")
    }
}

/// State that owns a dependency graph.
pub trait BuildState: Sized + 'static {
    fn graph(&self) -> &Graph<Self>;

    fn graph_mut(&mut self) -> &mut Graph<Self>;
}

/// The build step of a non-leaf node.
pub trait Action<S: BuildState> {
    fn kind(&self) -> NodeKind;

    /// Whether the node must be rebuilt even though none of its sources changed in this build.
    ///
    /// The default implementation returns true if the node was never built,
    ///     a product is missing, or some source is more recent than the node.
    fn should_run(&mut self, state: &mut S, node: NodeId) -> Result<bool> {
        Ok(state.graph().is_stale(node))
    }

    /// Produces the node's products.
    fn run(&mut self, state: &mut S, node: NodeId) -> Result<()>;

    /// Produces the node's products when the user asked for the build to be forced.
    fn force_run(&mut self, state: &mut S, node: NodeId) -> Result<()> {
        self.run(state, node)
    }

    /// Removes intermediate files beyond the node's declared products.
    fn clean(&mut self, state: &mut S, node: NodeId) {
        _ = (state, node);
    }

    /// Structured diagnostics explaining the last failure.
    fn messages(&self) -> Vec<Message> {
        Vec::new()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A node of the graph.
pub struct Node<S> {
    products: Vec<PathBuf>,
    sources: Vec<PathBuf>,
    date: Option<i64>,
    making: bool,
    failed_dep: Option<NodeId>,
    failure: Option<Error>,
    kind: NodeKind,
    action: Option<Box<dyn Action<S>>>,
}

impl<S> Node<S> {
    pub fn products(&self) -> &[PathBuf] {
        &self.products
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Time of the last successful build in seconds since the epoch, or [None] if unknown.
    pub fn date(&self) -> Option<i64> {
        self.date
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    /// The node whose failure caused the last make of this node to fail.
    pub fn failed_dep(&self) -> Option<NodeId> {
        self.failed_dep
    }

    /// The error this node itself failed with.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Short description of the node for messages.
    pub fn describe(&self) -> String {
        match self.products.first() {
            Some(product) => files::display(product),
            None => "<empty node>".to_string(),
        }
    }
}

/// The dependency graph.
pub struct Graph<S> {
    nodes: Vec<Node<S>>,
    by_path: HashMap<PathBuf, NodeId>,
}

impl<S: BuildState> Default for Graph<S> {
    fn default() -> Self {
        Graph {
            nodes: Vec::new(),
            by_path: HashMap::new(),
        }
    }
}

impl<S: BuildState> Graph<S> {
    pub fn new() -> Graph<S> {
        Default::default()
    }

    /// Returns the node producing a path.
    pub fn lookup(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(&files::absolute(path)).copied()
    }

    pub fn node(&self, id: NodeId) -> &Node<S> {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the path is the product of a node that is not a leaf.
    pub fn is_built(&self, path: &Path) -> bool {
        match self.lookup(path) {
            None => false,
            Some(id) => !self.nodes[id.0].is_leaf(),
        }
    }

    /// Returns the node for a path, creating a leaf if no node produces it.
    pub fn leaf(&mut self, path: &Path) -> NodeId {
        let path = files::absolute(path);
        if let Some(id) = self.by_path.get(&path) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            products: vec![path.clone()],
            sources: Vec::new(),
            date: None,
            making: false,
            failed_dep: None,
            failure: None,
            kind: NodeKind::Leaf,
            action: None,
        });
        self.by_path.insert(path, id);
        id
    }

    /// Adds a node with an action.
    ///
    /// A product that is currently a leaf is taken over by the new node.
    /// It is an error for a product to belong to another node with an action.
    pub fn add_node(
        &mut self,
        products: Vec<PathBuf>,
        sources: Vec<PathBuf>,
        action: Box<dyn Action<S>>,
    ) -> Result<NodeId> {
        let products: Vec<PathBuf> = products.iter().map(|p| files::absolute(p)).collect();
        for product in &products {
            if let Some(id) = self.by_path.get(product) {
                if !self.nodes[id.0].is_leaf() {
                    return Err(Error::DuplicateProduct(product.clone()));
                }
            }
        }
        let date = products
            .iter()
            .map(|p| files::mtime_secs(p))
            .collect::<Option<Vec<i64>>>()
            .and_then(|dates| dates.into_iter().max());
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            products: products.clone(),
            sources: Vec::new(),
            date,
            making: false,
            failed_dep: None,
            failure: None,
            kind: action.kind(),
            action: Some(action),
        });
        for product in products {
            self.by_path.insert(product, id);
        }
        for source in sources {
            self.add_source(id, &source);
        }
        Ok(id)
    }

    /// Adds a source to a node, creating a leaf for it if no node produces it.
    pub fn add_source(&mut self, id: NodeId, path: &Path) {
        let path = files::absolute(path);
        let node = &self.nodes[id.0];
        if node.sources.contains(&path) {
            return;
        }
        if node.products.contains(&path) {
            tracing::warn!(
                "ignoring `{}` as a source of itself",
                files::display(&path)
            );
            return;
        }
        self.leaf(&path);
        self.nodes[id.0].sources.push(path);
    }

    /// The nodes producing the sources of a node.
    pub fn source_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.0]
            .sources
            .iter()
            .filter_map(|p| self.by_path.get(p).copied())
            .collect()
    }

    /// Whether the node was never built, misses a product, or has a source more recent than itself.
    pub fn is_stale(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        let date = match node.date {
            None => return true,
            Some(date) => date,
        };
        if node.products.iter().any(|p| !p.exists()) {
            return true;
        }
        self.source_ids(id)
            .into_iter()
            .any(|s| self.nodes[s.0].date.map_or(false, |d| d > date))
    }

    /// Takes the action out of a node. It must be put back with [Graph::put_action].
    pub fn take_action(&mut self, id: NodeId) -> Option<Box<dyn Action<S>>> {
        self.nodes[id.0].action.take()
    }

    pub fn put_action(&mut self, id: NodeId, action: Box<dyn Action<S>>) {
        self.nodes[id.0].action = Some(action);
    }

    /// Returns the node's action if it has type `T`.
    pub fn action_mut<T: 'static>(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes[id.0]
            .action
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// The node that ultimately caused a failure of the given node.
    pub fn failure_source(&self, id: NodeId) -> NodeId {
        self.nodes[id.0].failed_dep.unwrap_or(id)
    }

    /// Diagnostics of a node's action.
    pub fn messages(&self, id: NodeId) -> Vec<Message> {
        match &self.nodes[id.0].action {
            Some(action) => action.messages(),
            None => Vec::new(),
        }
    }

    /// Paths of all leaves the node depends on, in depth-first order.
    pub fn leaves(&self, id: NodeId) -> Vec<PathBuf> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.visit(id, &mut visited, &mut |node| {
            if node.is_leaf() {
                result.extend(node.products.iter().cloned());
            }
        });
        result
    }

    /// All nodes with actions the node depends on, each after its sources.
    pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.visit_ids(id, &mut visited, &mut result);
        result
    }

    fn visit_ids(&self, id: NodeId, visited: &mut HashSet<NodeId>, result: &mut Vec<NodeId>) {
        if !visited.insert(id) {
            return;
        }
        for source in self.source_ids(id) {
            self.visit_ids(source, visited, result);
        }
        if !self.nodes[id.0].is_leaf() {
            result.push(id);
        }
    }

    fn visit<F: FnMut(&Node<S>)>(&self, id: NodeId, visited: &mut HashSet<NodeId>, f: &mut F) {
        if !visited.insert(id) {
            return;
        }
        for source in self.source_ids(id) {
            self.visit(source, visited, f);
        }
        f(&self.nodes[id.0]);
    }
}

/// Brings a node up to date.
///
/// The node's sources are made first.
/// If any of them changed, or `force` is set, or the action's [should_run](Action::should_run) says so,
///     the action runs.
/// Forcing a node does not force its sources.
///
/// A leaf is up to date if its file exists; a missing leaf is an error.
/// If the node or one of its dependencies fails the result is [Outcome::Error]
///     and [Node::failed_dep] names the node that failed first.
pub fn make<S: BuildState>(state: &mut S, id: NodeId, force: bool) -> Outcome {
    let graph = state.graph_mut();
    let node = &mut graph.nodes[id.0];
    if node.making {
        tracing::error!("cyclic dependency involving {}", node.describe());
        return Outcome::Unchanged;
    }
    if node.is_leaf() {
        return make_leaf(node, id);
    }
    node.making = true;
    node.failed_dep = None;
    node.failure = None;
    let outcome = make_node(state, id, force);
    state.graph_mut().nodes[id.0].making = false;
    outcome
}

fn make_leaf<S>(node: &mut Node<S>, id: NodeId) -> Outcome {
    let path = &node.products[0];
    match files::mtime_secs(path) {
        Some(date) => {
            node.date = Some(date);
            node.failure = None;
            node.failed_dep = None;
            Outcome::Unchanged
        }
        None => {
            node.failure = Some(Error::MissingSource(path.clone()));
            node.failed_dep = Some(id);
            Outcome::Error
        }
    }
}

fn make_node<S: BuildState>(state: &mut S, id: NodeId, force: bool) -> Outcome {
    let mut sources_changed = false;
    for source in state.graph().source_ids(id) {
        match make(state, source, false) {
            Outcome::Error => {
                let graph = state.graph_mut();
                let culprit = graph.failure_source(source);
                graph.nodes[id.0].failed_dep = Some(culprit);
                return Outcome::Error;
            }
            Outcome::Changed => sources_changed = true,
            Outcome::Unchanged => {}
        }
    }
    let mut action = match state.graph_mut().take_action(id) {
        Some(action) => action,
        None => {
            tracing::error!("node {} is already running", state.graph().node(id).describe());
            return Outcome::Unchanged;
        }
    };
    let result = run_action(action.as_mut(), state, id, force, sources_changed);
    state.graph_mut().put_action(id, action);
    let node = &mut state.graph_mut().nodes[id.0];
    match result {
        Ok(false) => Outcome::Unchanged,
        Ok(true) => {
            node.date = Some(files::now_secs());
            Outcome::Changed
        }
        Err(err) => {
            node.failure = Some(err);
            node.failed_dep = Some(id);
            Outcome::Error
        }
    }
}

fn run_action<S: BuildState>(
    action: &mut dyn Action<S>,
    state: &mut S,
    id: NodeId,
    force: bool,
    sources_changed: bool,
) -> Result<bool> {
    if force {
        action.force_run(state, id)?;
        return Ok(true);
    }
    if !sources_changed && !action.should_run(state, id)? {
        return Ok(false);
    }
    action.run(state, id)?;
    Ok(true)
}

/// Removes the products of a node and of all nodes it depends on.
///
/// Leaves are never removed.
pub fn clean<S: BuildState>(state: &mut S, id: NodeId) {
    let mut visited = HashSet::new();
    clean_node(state, id, &mut visited);
}

fn clean_node<S: BuildState>(state: &mut S, id: NodeId, visited: &mut HashSet<NodeId>) {
    if !visited.insert(id) || state.graph().node(id).is_leaf() {
        return;
    }
    for product in state.graph().node(id).products.clone() {
        files::remove(&product);
    }
    if let Some(mut action) = state.graph_mut().take_action(id) {
        action.clean(state, id);
        state.graph_mut().put_action(id, action);
    }
    state.graph_mut().nodes[id.0].date = None;
    for source in state.graph().source_ids(id) {
        clean_node(state, source, visited);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::{Duration, SystemTime};

    #[derive(Default)]
    struct State {
        graph: Graph<State>,
    }

    impl BuildState for State {
        fn graph(&self) -> &Graph<Self> {
            &self.graph
        }
        fn graph_mut(&mut self) -> &mut Graph<Self> {
            &mut self.graph
        }
    }

    /// Writes the concatenation of the sources to every product.
    struct Concat {
        runs: Rc<Cell<usize>>,
        fail: bool,
    }

    impl Action<State> for Concat {
        fn kind(&self) -> NodeKind {
            NodeKind::Shell
        }

        fn run(&mut self, state: &mut State, node: NodeId) -> Result<()> {
            self.runs.set(self.runs.get() + 1);
            if self.fail {
                return Err(Error::Tool {
                    program: "concat".to_string(),
                    status: Some(1),
                });
            }
            let node = state.graph().node(node);
            let mut content = String::new();
            for source in node.sources() {
                content.push_str(&std::fs::read_to_string(source).map_err(|e| Error::io(source, e))?);
            }
            for product in node.products() {
                std::fs::write(product, &content).map_err(|e| Error::io(product, e))?;
            }
            Ok(())
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn concat(runs: &Rc<Cell<usize>>) -> Box<Concat> {
        Box::new(Concat {
            runs: runs.clone(),
            fail: false,
        })
    }

    fn touch_later(path: &Path) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(10))
            .unwrap();
    }

    #[test]
    fn chain_is_built_in_order_then_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("c"));
        std::fs::write(&a, "content").unwrap();
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        state
            .graph
            .add_node(vec![b.clone()], vec![a.clone()], concat(&runs))
            .unwrap();
        let top = state
            .graph
            .add_node(vec![c.clone()], vec![b.clone()], concat(&runs))
            .unwrap();

        assert_eq!(make(&mut state, top, false), Outcome::Changed);
        assert_eq!(runs.get(), 2);
        assert_eq!(std::fs::read_to_string(&c).unwrap(), "content");

        assert_eq!(make(&mut state, top, false), Outcome::Unchanged);
        assert_eq!(runs.get(), 2);

        touch_later(&a);
        assert_eq!(make(&mut state, top, false), Outcome::Changed);
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn missing_leaf_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        let top = state
            .graph
            .add_node(
                vec![dir.path().join("out")],
                vec![dir.path().join("missing.tex")],
                concat(&runs),
            )
            .unwrap();
        assert_eq!(make(&mut state, top, false), Outcome::Error);
        assert_eq!(runs.get(), 0);
        let culprit = state.graph.failure_source(top);
        assert_eq!(
            state.graph.node(culprit).products(),
            &[dir.path().join("missing.tex")]
        );
        assert!(matches!(
            state.graph.node(culprit).failure(),
            Some(Error::MissingSource(_))
        ));
    }

    #[test]
    fn failure_propagates_to_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("c"));
        std::fs::write(&a, "content").unwrap();
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        let failing = state
            .graph
            .add_node(
                vec![b.clone()],
                vec![a],
                Box::new(Concat {
                    runs: runs.clone(),
                    fail: true,
                }),
            )
            .unwrap();
        let top = state.graph.add_node(vec![c], vec![b], concat(&runs)).unwrap();
        assert_eq!(make(&mut state, top, false), Outcome::Error);
        assert_eq!(runs.get(), 1);
        assert_eq!(state.graph.failure_source(top), failing);
        assert!(matches!(
            state.graph.node(failing).failure(),
            Some(Error::Tool { .. })
        ));
    }

    #[test]
    fn force_reruns_only_the_top_node() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("c"));
        std::fs::write(&a, "content").unwrap();
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        state.graph.add_node(vec![b.clone()], vec![a], concat(&runs)).unwrap();
        let top = state.graph.add_node(vec![c], vec![b], concat(&runs)).unwrap();
        make(&mut state, top, false);
        assert_eq!(runs.get(), 2);
        assert_eq!(make(&mut state, top, true), Outcome::Changed);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn duplicate_products_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        let out = dir.path().join("out");
        state.graph.add_node(vec![out.clone()], vec![], concat(&runs)).unwrap();
        let result = state.graph.add_node(vec![out.clone()], vec![], concat(&runs));
        assert!(matches!(result, Err(Error::DuplicateProduct(path)) if path == out));
    }

    #[test]
    fn date_is_the_latest_product_time() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        let (a, b) = (dir.path().join("a"), dir.path().join("b"));
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();
        touch_later(&b);
        let id = state.graph.add_node(vec![a.clone(), b.clone()], vec![], concat(&runs)).unwrap();
        assert_ne!(files::mtime_secs(&a), files::mtime_secs(&b));
        assert_eq!(state.graph.node(id).date(), files::mtime_secs(&b));
    }

    #[test]
    fn leaf_is_superseded_by_node() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        let (a, b, c) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("c"));
        std::fs::write(&a, "content").unwrap();
        let top = state
            .graph
            .add_node(vec![c.clone()], vec![b.clone()], concat(&runs))
            .unwrap();
        assert!(state.graph.node(state.graph.lookup(&b).unwrap()).is_leaf());
        let middle = state.graph.add_node(vec![b.clone()], vec![a], concat(&runs)).unwrap();
        assert_eq!(state.graph.lookup(&b), Some(middle));
        assert_eq!(make(&mut state, top, false), Outcome::Changed);
        assert_eq!(std::fs::read_to_string(&c).unwrap(), "content");
    }

    #[test]
    fn cycles_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        let (a, b) = (dir.path().join("a"), dir.path().join("b"));
        let first = state
            .graph
            .add_node(vec![a.clone()], vec![b.clone()], concat(&runs))
            .unwrap();
        state.graph.add_node(vec![b], vec![a], concat(&runs)).unwrap();
        let _ = make(&mut state, first, false);
        assert!(runs.get() <= 2);
    }

    #[test]
    fn clean_removes_products_but_not_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("c"));
        std::fs::write(&a, "content").unwrap();
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        state
            .graph
            .add_node(vec![b.clone()], vec![a.clone()], concat(&runs))
            .unwrap();
        let top = state
            .graph
            .add_node(vec![c.clone()], vec![b.clone()], concat(&runs))
            .unwrap();
        make(&mut state, top, false);
        clean(&mut state, top);
        assert!(a.exists());
        assert!(!b.exists());
        assert!(!c.exists());
        assert_eq!(state.graph.node(top).date(), None);
    }

    #[test]
    fn leaves_and_post_order() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, c, d) = (
            dir.path().join("a"),
            dir.path().join("b"),
            dir.path().join("c"),
            dir.path().join("d"),
        );
        let runs = Rc::new(Cell::new(0));
        let mut state = State::default();
        let middle = state
            .graph
            .add_node(vec![b.clone()], vec![a.clone()], concat(&runs))
            .unwrap();
        let top = state
            .graph
            .add_node(vec![c], vec![b, d.clone()], concat(&runs))
            .unwrap();
        assert_eq!(state.graph.leaves(top), vec![a, d]);
        assert_eq!(state.graph.post_order(top), vec![middle, top]);
    }
}
