//! Label normalization and dependency-aware batch ordering.

use ensemble_core::Schedulable;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, warn};

/// Score bonus per dependent.
const DEPENDENT_BONUS: f64 = 0.1;

/// A prioritized batch.
#[derive(Debug, Clone)]
pub struct PrioritizedBatch<T> {
    /// Items in execution order, each with its batch score set.
    pub items: Vec<T>,
    /// The dependency graph had a cycle; `items` keep submission order.
    pub cycle_detected: bool,
    /// Dependencies that lie on a cycle, as `(dependent, dependency)` id
    /// pairs in submission order. Empty when the graph is acyclic.
    pub cyclic_dependencies: Vec<(String, String)>,
}

impl<T: Schedulable> PrioritizedBatch<T> {
    /// Item ids in batch order.
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(Schedulable::id).collect()
    }

    /// Whether `dependent -> dependency` was found on a cycle.
    pub fn is_cyclic_dependency(&self, dependent: &str, dependency: &str) -> bool {
        self.cyclic_dependencies
            .iter()
            .any(|(a, b)| a == dependent && b == dependency)
    }
}

/// Ready node in the Kahn frontier. Higher score first; ties go to the
/// item submitted earlier.
struct Ready {
    score: f64,
    index: usize,
}

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Maps priority labels to numbers and orders batches of dependent items.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskPrioritizer;

impl TaskPrioritizer {
    /// A prioritizer. It holds no state.
    pub fn new() -> Self {
        Self
    }

    /// Set `priority` from the item's label: high 0.7, medium 0.5, low 0.3,
    /// anything else 0.5.
    pub fn prioritize<T: Schedulable>(&self, mut item: T) -> T {
        let p = item.label().score();
        item.set_priority(p);
        item
    }

    /// Order a batch so that no item precedes one of its dependencies, and
    /// among items that are free to run, higher scores come first.
    ///
    /// Each item's score is `importance * urgency * (1 + 0.1 * dependents)`.
    /// Dependencies on ids outside the batch are ignored. When the graph has
    /// a cycle the batch keeps submission order, `cycle_detected` is set and
    /// the offending edges are listed in `cyclic_dependencies`.
    pub fn prioritize_all<T: Schedulable>(&self, items: Vec<T>) -> PrioritizedBatch<T> {
        let items: Vec<T> = items.into_iter().map(|i| self.prioritize(i)).collect();

        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(items.len(), items.len());
        let mut by_id: HashMap<&str, NodeIndex> = HashMap::new();
        let nodes: Vec<NodeIndex> = (0..items.len()).map(|i| graph.add_node(i)).collect();
        for (item, &node) in items.iter().zip(&nodes) {
            by_id.entry(item.id()).or_insert(node);
        }
        for (item, &node) in items.iter().zip(&nodes) {
            for dep in item.dependencies() {
                match by_id.get(dep.as_str()) {
                    Some(&from) => {
                        graph.add_edge(from, node, ());
                    }
                    None => debug!(item = item.id(), dependency = %dep, "Ignoring dependency outside batch"),
                }
            }
        }

        let scores: Vec<f64> = items
            .iter()
            .zip(&nodes)
            .map(|(item, &node)| {
                let dependents = graph.neighbors_directed(node, Direction::Outgoing).count();
                item.importance() * item.urgency() * (1.0 + DEPENDENT_BONUS * dependents as f64)
            })
            .collect();

        let mut slots: Vec<Option<T>> = items
            .into_iter()
            .zip(&scores)
            .map(|(mut item, &s)| {
                item.set_score(s);
                Some(item)
            })
            .collect();

        let cyclic = cyclic_edges(&graph);
        let cycle_detected = !cyclic.is_empty();
        let order: Vec<usize> = if cycle_detected {
            warn!(
                items = slots.len(),
                cyclic_edges = cyclic.len(),
                "Dependency cycle detected, keeping submission order"
            );
            (0..slots.len()).collect()
        } else {
            kahn_by_score(&graph, &scores)
        };

        let cyclic_dependencies = cyclic
            .into_iter()
            .filter_map(|(from, to)| {
                let dependent = slots[graph[to]].as_ref()?.id().to_string();
                let dependency = slots[graph[from]].as_ref()?.id().to_string();
                Some((dependent, dependency))
            })
            .collect();

        let items = order.into_iter().filter_map(|i| slots[i].take()).collect();
        PrioritizedBatch {
            items,
            cycle_detected,
            cyclic_dependencies,
        }
    }
}

/// Edges whose endpoints share a strongly connected component, self-loops
/// included. Ordered by target, then source, node index.
fn cyclic_edges(graph: &DiGraph<usize, ()>) -> Vec<(NodeIndex, NodeIndex)> {
    let mut component = vec![0usize; graph.node_count()];
    for (c, scc) in tarjan_scc(graph).into_iter().enumerate() {
        for node in scc {
            component[node.index()] = c;
        }
    }
    let mut edges: Vec<(NodeIndex, NodeIndex)> = graph
        .edge_references()
        .filter(|e| component[e.source().index()] == component[e.target().index()])
        .map(|e| (e.source(), e.target()))
        .collect();
    edges.sort_by_key(|&(from, to)| (to.index(), from.index()));
    edges.dedup();
    edges
}

/// Topological order that always releases the best-scoring ready node next.
fn kahn_by_score(graph: &DiGraph<usize, ()>, scores: &[f64]) -> Vec<usize> {
    let mut indegree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();

    let mut frontier: BinaryHeap<Ready> = graph
        .node_indices()
        .filter(|n| indegree[n.index()] == 0)
        .map(|n| Ready {
            score: scores[graph[n]],
            index: graph[n],
        })
        .collect();

    let mut order = Vec::with_capacity(indegree.len());
    while let Some(Ready { index, .. }) = frontier.pop() {
        order.push(index);
        let node = NodeIndex::new(index);
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            let d = &mut indegree[next.index()];
            *d -= 1;
            if *d == 0 {
                frontier.push(Ready {
                    score: scores[graph[next]],
                    index: graph[next],
                });
            }
        }
    }
    order
}
