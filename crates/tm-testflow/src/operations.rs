//! Graph passes that turn the expanded steps into the final flow shape.
//!
//! The passes run in order: [`create_initial_dag`], [`reorder_children_of_nodes`],
//! [`apply_output_scope`], [`apply_config_scope`] and [`set_serial_nodes`].

use crate::error::{FlowError, Result};
use crate::node::{Direction, Graph, Node, NodeId, NodeSet};
use crate::step::Step;
use std::collections::{BTreeMap, BTreeSet};
use tm_core::elements::{ConfigSet, Element, Level};

/// Wires the nodes of every step below the nodes of its dependencies, or below `root`.
///
/// Dependencies that expanded into no nodes are skipped in favour of their own dependencies.
pub fn create_initial_dag(
    graph: &mut Graph,
    steps: &BTreeMap<String, Step>,
    root: NodeId,
) -> Result<()> {
    for step in steps.values() {
        if step.nodes.is_empty() {
            continue;
        }
        let parents = if step.info.depends_on.is_empty() {
            [root].into_iter().collect()
        } else {
            let mut parents = NodeSet::new();
            let mut seen = BTreeSet::new();
            for dependency in &step.info.depends_on {
                parents.extend(&dependency_nodes(
                    steps,
                    &step.info.name,
                    dependency,
                    root,
                    &mut seen,
                )?);
            }
            parents
        };
        for id in step.nodes.iter() {
            graph.add_parents(id, &parents);
        }
    }
    Ok(())
}

fn dependency_nodes(
    steps: &BTreeMap<String, Step>,
    step: &str,
    dependency: &str,
    root: NodeId,
    seen: &mut BTreeSet<String>,
) -> Result<NodeSet> {
    let dep = steps.get(dependency).ok_or_else(|| FlowError::UnknownStep {
        step: step.to_string(),
        dependency: dependency.to_string(),
    })?;
    if !dep.nodes.is_empty() {
        return Ok(dep.nodes.clone());
    }
    if !seen.insert(dependency.to_string()) {
        return Ok(NodeSet::new());
    }
    if dep.info.depends_on.is_empty() {
        return Ok([root].into_iter().collect());
    }
    let mut nodes = NodeSet::new();
    for next in &dep.info.depends_on {
        nodes.extend(&dependency_nodes(steps, dependency, next, root, seen)?);
    }
    Ok(nodes)
}

/// Reorders every sibling group reachable from `start`, generation by generation.
pub fn reorder_children_of_nodes(graph: &mut Graph, start: &NodeSet) {
    let mut generation = start.clone();
    let mut rounds = 0;
    while !generation.is_empty() {
        if rounds > graph.len() {
            tracing::warn!("Reordering did not terminate after {} generations", rounds);
            return;
        }
        rounds += 1;

        let mut next = NodeSet::new();
        for id in graph.list(&generation) {
            reorder_children_of_node(graph, id);
            next.extend(graph.node(id).children());
        }
        generation = next;
    }
}

/// Moves the serial children of `root` into a chain behind the parallel ones.
///
/// ```text
///        root                  root
///      /  |  \                /    \
///     P1  P2  S1     =>      P1    P2
///      \  |  /                \    /
///        G                      S1
///                               |
///                               G
/// ```
pub fn reorder_children_of_node(graph: &mut Graph, root: NodeId) {
    let children = graph.node(root).children().clone();
    if children.len() <= 1 {
        return;
    }
    let grandchildren = graph.children_of(&children);

    let (serial, parallel): (Vec<NodeId>, Vec<NodeId>) = graph
        .list(&children)
        .into_iter()
        .partition(|id| graph.node(*id).has_serial_behavior());
    let Some((&first, rest)) = serial.split_first() else {
        return;
    };
    tracing::debug!(
        "Reordering children of '{}': {} parallel, {} serial",
        graph.node(root).name(),
        parallel.len(),
        serial.len()
    );

    graph.clear_children(root);
    graph.clear_parents(first);
    if parallel.is_empty() {
        graph.link(root, first);
    }
    for &p in &parallel {
        graph.link(root, p);
        graph.clear_children(p);
        graph.link(p, first);
    }

    let mut previous = first;
    for &s in rest {
        graph.clear_children(previous);
        graph.clear_parents(s);
        graph.link(previous, s);
        previous = s;
    }

    graph.clear_children(previous);
    for gc in grandchildren.iter() {
        graph.clear_parents(gc);
        graph.link(previous, gc);
    }
}

/// Walks `direction` from `id` to the nearest node that every path passes through
/// and that satisfies `filter`.
///
/// Returns `None` when the branches never converge.
pub fn next_join<F>(graph: &Graph, id: NodeId, direction: Direction, filter: F) -> Option<NodeId>
where
    F: Fn(&Node) -> bool,
{
    let mut current = id;
    for _ in 0..=graph.len() {
        let candidate = immediate_join(graph, current, direction, 0)?;
        if filter(graph.node(candidate)) {
            return Some(candidate);
        }
        current = candidate;
    }
    tracing::warn!(
        "No join point found for '{}' within {} steps",
        graph.node(id).name(),
        graph.len()
    );
    None
}

fn immediate_join(graph: &Graph, id: NodeId, direction: Direction, depth: usize) -> Option<NodeId> {
    if depth > graph.len() {
        tracing::warn!("Join search exceeded the graph size at '{}'", graph.node(id).name());
        return None;
    }
    let neighbours = graph.list(graph.node(id).neighbours(direction));
    match neighbours.as_slice() {
        [] => None,
        [single] => Some(*single),
        many => frontier_join(graph, many, direction, depth),
    }
}

struct Branch {
    head: Option<NodeId>,
    visited: Vec<NodeId>,
    seen: BTreeSet<NodeId>,
}

impl Branch {
    fn new(start: NodeId) -> Self {
        Self {
            head: Some(start),
            visited: vec![start],
            seen: BTreeSet::from([start]),
        }
    }
}

/// Advances one branch per start node in lockstep until a node is common to all.
fn frontier_join(
    graph: &Graph,
    starts: &[NodeId],
    direction: Direction,
    depth: usize,
) -> Option<NodeId> {
    let mut branches: Vec<Branch> = starts.iter().map(|s| Branch::new(*s)).collect();

    for _ in 0..=graph.len() {
        if let Some((first, others)) = branches.split_first() {
            let common = first
                .visited
                .iter()
                .find(|id| others.iter().all(|b| b.seen.contains(*id)));
            if let Some(common) = common {
                return Some(*common);
            }
        }

        let mut advanced = false;
        for branch in branches.iter_mut() {
            let Some(head) = branch.head else {
                continue;
            };
            branch.head = immediate_join(graph, head, direction, depth + 1);
            if let Some(next) = branch.head {
                if branch.seen.insert(next) {
                    branch.visited.push(next);
                }
                advanced = true;
            }
        }
        if !advanced {
            return None;
        }
    }
    None
}

fn is_output_source(node: &Node) -> bool {
    node.step.is_none() || (!node.continue_on_error() && !node.is_untrusted())
}

/// Selects the artifact source of every node and enables the source's outputs.
///
/// An explicit `artifactsFrom` wins. Otherwise the nearest join point that neither
/// continues on error nor is untrusted is used.
pub fn apply_output_scope(graph: &mut Graph, steps: &BTreeMap<String, Step>) -> Result<()> {
    for step in steps.values() {
        let explicit = match &step.info.artifacts_from {
            Some(from) => {
                let source_step = steps.get(from).ok_or_else(|| FlowError::UnknownStep {
                    step: step.info.name.clone(),
                    dependency: from.clone(),
                })?;
                Some(graph.list(&source_step.nodes).first().copied())
            }
            None => None,
        };

        for id in graph.list(&step.nodes) {
            let source = match explicit {
                Some(source) => source,
                None => next_join(graph, id, Direction::Up, is_output_source),
            };
            match source {
                Some(source) => {
                    graph.set_output(source);
                    graph.set_input_source(id, source);
                }
                None => tracing::warn!("No artifact source found for '{}'", graph.node(id).name()),
            }
        }
    }
    Ok(())
}

/// Merges the shared config of all join points above a node into its definition.
///
/// Nearer join points override farther ones. Private elements are not shared.
pub fn apply_config_scope(graph: &mut Graph, steps: &BTreeMap<String, Step>) {
    for step in steps.values() {
        for id in graph.list(&step.nodes) {
            let mut chain = Vec::new();
            let mut current = id;
            while let Some(join) = next_join(graph, current, Direction::Up, |n| n.step.is_some()) {
                if chain.len() > graph.len() {
                    break;
                }
                chain.push(join);
                current = join;
            }

            let mut scope = ConfigSet::new();
            for join in chain.iter().rev() {
                let Some(join_step) = &graph.node(*join).step else {
                    continue;
                };
                for config in join_step.definition.config.iter().filter(|c| !c.private) {
                    scope.set(Element::new(config.clone(), Level::Shared));
                }
            }
            if scope.is_empty() {
                continue;
            }
            let elements: Vec<Element> = scope.list().into_iter().cloned().collect();
            graph.node_mut(id).test_definition.add_config(elements);
        }
    }
}

/// Marks every node all paths from `root` converge on.
pub fn set_serial_nodes(graph: &mut Graph, root: NodeId) {
    let mut current = root;
    let mut rounds = 0;
    while let Some(next) = next_join(graph, current, Direction::Down, |_| true) {
        if rounds > graph.len() {
            tracing::warn!("Serial marking did not terminate after {} nodes", rounds);
            return;
        }
        rounds += 1;
        tracing::debug!("Node '{}' is serial", graph.node(next).name());
        graph.set_serial(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_core::config::Settings;
    use tm_core::model::{Behavior, DagStep, TestDefinitionSpec};
    use tm_core::testdefinition::TestDefinition;

    fn add(graph: &mut Graph, name: &str, serial: bool) -> NodeId {
        let mut spec = TestDefinitionSpec {
            name: name.to_string(),
            ..Default::default()
        };
        if serial {
            spec.behavior.insert(Behavior::Serial);
        }
        let td = TestDefinition::new(spec, None, None, &Settings::default());
        let step = DagStep {
            name: name.to_string(),
            ..Default::default()
        };
        graph.add(Node::new(td, Some(step), "testflow"))
    }

    fn set(ids: &[NodeId]) -> NodeSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_join_of_diamond_is_top() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", false);
        let b = add(&mut graph, "b", false);
        let c = add(&mut graph, "c", false);
        let d = add(&mut graph, "d", false);
        graph.add_children(a, &set(&[b, c]));
        graph.add_parents(d, &set(&[b, c]));

        assert_eq!(next_join(&graph, d, Direction::Up, |_| true), Some(a));
        assert_eq!(next_join(&graph, b, Direction::Up, |_| true), Some(a));
        assert_eq!(next_join(&graph, a, Direction::Down, |_| true), Some(d));
        assert_eq!(next_join(&graph, a, Direction::Up, |_| true), None);
    }

    #[test]
    fn test_join_with_uneven_branches() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", false);
        let b = add(&mut graph, "b", false);
        let c = add(&mut graph, "c", false);
        let d = add(&mut graph, "d", false);
        graph.link(a, b);
        graph.link(b, c);
        graph.link(a, d);
        graph.link(c, d);

        assert_eq!(next_join(&graph, d, Direction::Up, |_| true), Some(a));
    }

    #[test]
    fn test_join_without_convergence() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", false);
        let b = add(&mut graph, "b", false);
        let c = add(&mut graph, "c", false);
        graph.add_parents(c, &set(&[a, b]));

        assert_eq!(next_join(&graph, c, Direction::Up, |_| true), None);
    }

    #[test]
    fn test_join_skips_filtered_nodes() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", false);
        let b = add(&mut graph, "b", false);
        let c = add(&mut graph, "c", false);
        graph.link(a, b);
        graph.link(b, c);

        let skip_b = |n: &Node| n.name() != graph.node(b).name();
        assert_eq!(next_join(&graph, c, Direction::Up, skip_b), Some(a));
    }

    #[test]
    fn test_join_terminates_on_cycle() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", false);
        let b = add(&mut graph, "b", false);
        graph.link(a, b);
        graph.link(b, a);

        assert_eq!(next_join(&graph, a, Direction::Up, |_| false), None);
    }

    #[test]
    fn test_reorder_single_serial_child_is_untouched() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", false);
        let s = add(&mut graph, "s", true);
        let c = add(&mut graph, "c", false);
        graph.link(a, s);
        graph.link(s, c);

        reorder_children_of_node(&mut graph, a);
        assert_eq!(graph.list(graph.node(a).children()), vec![s]);
        assert_eq!(graph.list(graph.node(s).children()), vec![c]);
    }

    #[test]
    fn test_reorder_only_serial_children_are_chained() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", false);
        let s1 = add(&mut graph, "s1", true);
        let s2 = add(&mut graph, "s2", true);
        let d = add(&mut graph, "d", false);
        graph.add_children(a, &set(&[s1, s2]));
        graph.add_parents(d, &set(&[s1, s2]));

        reorder_children_of_node(&mut graph, a);
        assert_eq!(graph.list(graph.node(a).children()), vec![s1]);
        assert_eq!(graph.list(graph.node(s1).children()), vec![s2]);
        assert_eq!(graph.list(graph.node(s2).children()), vec![d]);
        assert_eq!(graph.list(graph.node(d).parents()), vec![s2]);
    }

    #[test]
    fn test_reorder_walks_below_serial_chain() {
        let mut graph = Graph::new();
        let root = add(&mut graph, "root", false);
        let s = add(&mut graph, "s", true);
        let p = add(&mut graph, "p", false);
        let x = add(&mut graph, "x", false);
        let y = add(&mut graph, "y", true);
        graph.add_children(root, &set(&[s, p]));
        graph.add_parents(x, &set(&[s, p]));
        graph.add_parents(y, &set(&[s, p]));

        reorder_children_of_nodes(&mut graph, &set(&[root]));
        // root -> p -> s -> {x, y} is reordered again into s -> x -> y
        assert_eq!(graph.list(graph.node(root).children()), vec![p]);
        assert_eq!(graph.list(graph.node(p).children()), vec![s]);
        assert_eq!(graph.list(graph.node(s).children()), vec![x]);
        assert_eq!(graph.list(graph.node(x).children()), vec![y]);
    }

    #[test]
    fn test_serial_marker_marks_whole_chain() {
        let mut graph = Graph::new();
        let a = add(&mut graph, "a", false);
        let b = add(&mut graph, "b", false);
        let c = add(&mut graph, "c", false);
        let d = add(&mut graph, "d", false);
        graph.link(a, b);
        graph.link(b, c);
        graph.link(c, d);

        set_serial_nodes(&mut graph, a);
        assert!(!graph.node(a).is_serial());
        assert!(graph.node(b).is_serial());
        assert!(graph.node(c).is_serial());
        assert!(graph.node(d).is_serial());
    }

    #[test]
    fn test_serial_marker_marks_convergence_below_root() {
        let mut graph = Graph::new();
        let root = add(&mut graph, "root", false);
        let a = add(&mut graph, "a", false);
        let b = add(&mut graph, "b", false);
        let c = add(&mut graph, "c", false);
        let d = add(&mut graph, "d", false);
        graph.link(root, a);
        graph.add_children(a, &set(&[b, c]));
        graph.add_parents(d, &set(&[b, c]));

        set_serial_nodes(&mut graph, root);
        assert!(graph.node(a).is_serial());
        assert!(!graph.node(b).is_serial());
        assert!(!graph.node(c).is_serial());
        assert!(graph.node(d).is_serial());
    }
}
