//! Topology of the passive line graph.
//!
//! Buses are nodes and lines are edges of an undirected multigraph (parallel
//! lines between the same buses are distinct edges). Links are controllable
//! and do not participate: they neither join sub-networks nor close cycles.
//!
//! Two products are derived from one breadth-first spanning forest:
//!
//! - [`sub_networks`]: connected components, each needing its own angle
//!   reference in an angle-based formulation.
//! - [`cycle_basis`]: one fundamental cycle per non-tree edge, the index set
//!   of the Kirchhoff voltage law constraints (see doi:10.1109/TPWRS.2017.2709245
//!   for the cycle-based flow formulation).

use crate::Network;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

/// A connected set of buses joined by lines.
#[derive(Debug, Clone, PartialEq)]
pub struct SubNetwork {
    /// Bus indices in breadth-first order; the first one is the reference bus
    pub buses: Vec<usize>,
    /// Line indices inside this sub-network
    pub lines: Vec<usize>,
}

impl SubNetwork {
    pub fn reference_bus(&self) -> Option<usize> {
        self.buses.first().copied()
    }
}

/// A fundamental cycle of the line graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    /// `(line index, direction)`; direction is `+1.0` when the cycle
    /// traverses the line from bus0 to bus1 and `-1.0` otherwise
    pub branches: Vec<(usize, f64)>,
}

struct SpanningForest {
    graph: UnGraph<usize, usize>,
    roots: Vec<NodeIndex>,
    order: HashMap<NodeIndex, Vec<NodeIndex>>,
    parent: HashMap<NodeIndex, (NodeIndex, EdgeIndex)>,
    depth: HashMap<NodeIndex, usize>,
    tree_edges: HashSet<EdgeIndex>,
}

fn line_graph(network: &Network) -> UnGraph<usize, usize> {
    let mut graph = UnGraph::<usize, usize>::with_capacity(network.buses.len(), network.lines.len());
    let nodes: Vec<NodeIndex> = (0..network.buses.len()).map(|i| graph.add_node(i)).collect();
    let index: HashMap<&str, usize> = network
        .buses
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();

    for (line_idx, line) in network.lines.iter().enumerate() {
        // Dangling lines are reported by `Network::validate_references`
        if let (Some(&a), Some(&b)) = (index.get(line.bus0.as_str()), index.get(line.bus1.as_str())) {
            graph.add_edge(nodes[a], nodes[b], line_idx);
        }
    }
    graph
}

fn spanning_forest(network: &Network) -> SpanningForest {
    let graph = line_graph(network);
    let mut roots = Vec::new();
    let mut order: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    let mut parent = HashMap::new();
    let mut depth = HashMap::new();
    let mut tree_edges = HashSet::new();
    let mut visited = HashSet::new();

    for start in graph.node_indices() {
        if !visited.insert(start) {
            continue;
        }
        roots.push(start);
        depth.insert(start, 0);
        let mut members = vec![start];
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            let node_depth = depth[&node];
            for edge in graph.edges(node) {
                let other = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                if visited.insert(other) {
                    parent.insert(other, (node, edge.id()));
                    depth.insert(other, node_depth + 1);
                    tree_edges.insert(edge.id());
                    members.push(other);
                    queue.push_back(other);
                }
            }
        }
        order.insert(start, members);
    }

    SpanningForest {
        graph,
        roots,
        order,
        parent,
        depth,
        tree_edges,
    }
}

/// Connected components of the line graph, one per island.
///
/// Buses without any line form single-bus sub-networks.
pub fn sub_networks(network: &Network) -> Vec<SubNetwork> {
    let forest = spanning_forest(network);
    let mut component_of: HashMap<usize, usize> = HashMap::new();
    let mut result: Vec<SubNetwork> = Vec::with_capacity(forest.roots.len());

    for root in &forest.roots {
        let buses: Vec<usize> = forest.order[root]
            .iter()
            .map(|n| forest.graph[*n])
            .collect();
        for &bus in &buses {
            component_of.insert(bus, result.len());
        }
        result.push(SubNetwork {
            buses,
            lines: Vec::new(),
        });
    }

    for edge in forest.graph.edge_references() {
        let bus = forest.graph[edge.source()];
        if let Some(&c) = component_of.get(&bus) {
            result[c].lines.push(*edge.weight());
        }
    }
    for sub in &mut result {
        sub.lines.sort_unstable();
    }
    result
}

/// Fundamental cycles of the line graph.
///
/// Every line not in the breadth-first spanning forest closes exactly one
/// cycle through the forest; together they form a basis of the cycle space.
/// Self-loops carry no voltage difference and are skipped.
pub fn cycle_basis(network: &Network) -> Vec<Cycle> {
    let forest = spanning_forest(network);
    let graph = &forest.graph;
    let mut cycles = Vec::new();

    for edge in graph.edge_references() {
        if forest.tree_edges.contains(&edge.id()) {
            continue;
        }
        let (u, v) = (edge.source(), edge.target());
        if u == v {
            continue;
        }

        // Lowest common ancestor of u and v
        let (mut a, mut b) = (u, v);
        while forest.depth[&a] > forest.depth[&b] {
            a = forest.parent[&a].0;
        }
        while forest.depth[&b] > forest.depth[&a] {
            b = forest.parent[&b].0;
        }
        while a != b {
            a = forest.parent[&a].0;
            b = forest.parent[&b].0;
        }
        let lca = a;

        // u -> v over the closing edge, v up to the ancestor, then down to u
        let mut walk: Vec<(EdgeIndex, NodeIndex)> = vec![(edge.id(), u)];
        let mut node = v;
        while node != lca {
            let (up, via) = forest.parent[&node];
            walk.push((via, node));
            node = up;
        }
        let mut descent = Vec::new();
        let mut node = u;
        while node != lca {
            let (up, via) = forest.parent[&node];
            descent.push((via, up));
            node = up;
        }
        walk.extend(descent.into_iter().rev());

        let branches = walk
            .into_iter()
            .filter_map(|(e, from)| {
                let (src, _) = graph.edge_endpoints(e)?;
                let direction = if src == from { 1.0 } else { -1.0 };
                Some((graph[e], direction))
            })
            .collect();
        cycles.push(Cycle { branches });
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bus, Line};

    fn network(buses: &[&str], lines: &[(&str, &str)]) -> Network {
        let mut n = Network::new("topology");
        for b in buses {
            n.buses.push(Bus::new(*b, 220.0));
        }
        for (i, (a, b)) in lines.iter().enumerate() {
            n.lines.push(Line::new(format!("l{}", i), *a, *b).with_impedance(0.0, 1.0));
        }
        n
    }

    /// Sum of signed bus potentials around a cycle must vanish for any
    /// potential assignment; this checks the orientation bookkeeping.
    fn assert_closed(n: &Network, cycle: &Cycle) {
        let potential = |bus: &str| -> f64 {
            n.bus_index(bus).map(|i| (i as f64 + 1.0).powi(2)).unwrap_or(0.0)
        };
        let total: f64 = cycle
            .branches
            .iter()
            .map(|(l, dir)| dir * (potential(&n.lines[*l].bus0) - potential(&n.lines[*l].bus1)))
            .sum();
        assert!(total.abs() < 1e-12, "cycle {:?} is not closed", cycle);
    }

    #[test]
    fn test_tree_has_no_cycles() {
        let n = network(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        assert!(cycle_basis(&n).is_empty());
        assert_eq!(sub_networks(&n).len(), 1);
    }

    #[test]
    fn test_triangle_has_one_cycle() {
        let n = network(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("a", "c")]);
        let cycles = cycle_basis(&n);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].branches.len(), 3);
        assert_closed(&n, &cycles[0]);
    }

    #[test]
    fn test_parallel_lines_form_two_cycle() {
        let n = network(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let cycles = cycle_basis(&n);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].branches.len(), 2);
        assert_closed(&n, &cycles[0]);
    }

    #[test]
    fn test_cycle_count_matches_circuit_rank() {
        // Two squares sharing an edge plus a separate island
        let n = network(
            &["a", "b", "c", "d", "e", "f", "x", "y"],
            &[
                ("a", "b"),
                ("b", "c"),
                ("c", "d"),
                ("d", "a"),
                ("b", "e"),
                ("e", "f"),
                ("f", "c"),
                ("x", "y"),
            ],
        );
        let cycles = cycle_basis(&n);
        // edges - nodes + components = 8 - 8 + 2
        assert_eq!(cycles.len(), 2);
        for cycle in &cycles {
            assert_closed(&n, cycle);
        }
        let subs = sub_networks(&n);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].buses.len(), 6);
        assert_eq!(subs[1].lines, vec![7]);
    }

    #[test]
    fn test_isolated_bus_is_own_sub_network() {
        let n = network(&["a", "b", "lonely"], &[("a", "b")]);
        let subs = sub_networks(&n);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].buses, vec![2]);
        assert!(subs[1].lines.is_empty());
        assert_eq!(subs[1].reference_bus(), Some(2));
    }
}
