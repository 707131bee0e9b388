//! Execution planning over a workflow's node/edge set.
//!
//! Pure functions, no I/O. A plan is an ordered list of layers; nodes within
//! one layer have no dependency on each other and may run concurrently.

use std::collections::{HashMap, HashSet, VecDeque};

use weft_core::error::{Result, WeftError};
use weft_core::types::{Edge, Node, NodeId, Workflow};

/// Ordered layers of mutually independent node ids.
pub type Layers = Vec<Vec<NodeId>>;

/// Structural checks that must hold before a run is created.
pub fn validate(workflow: &Workflow) -> Result<()> {
    if workflow.nodes.is_empty() {
        return Err(WeftError::Validation("Workflow has no nodes".to_string()));
    }

    let mut seen = HashSet::with_capacity(workflow.nodes.len());
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(WeftError::Validation(format!(
                "Duplicate node id '{}'",
                node.id
            )));
        }
    }

    for edge in &workflow.edges {
        for end in [&edge.source, &edge.target] {
            if !seen.contains(end.as_str()) {
                return Err(WeftError::Validation(format!(
                    "Edge '{}' references unknown node '{}'",
                    edge.id, end
                )));
            }
        }
    }
    Ok(())
}

/// Layer the graph with Kahn's algorithm.
///
/// Layer 0 holds every node without incoming edges; each following layer holds
/// the nodes whose last dependency was placed in the previous one. Within a
/// layer nodes keep their definition order. Fails with `Cycle` when some nodes
/// can never be placed.
pub fn build_layers(nodes: &[Node], edges: &[Edge]) -> Result<Layers> {
    let order: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree: HashMap<&str, usize> = order.keys().map(|id| (*id, 0)).collect();
    let mut targets: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in edges {
        let (src, dst) = (edge.source.as_str(), edge.target.as_str());
        if !order.contains_key(src) || !order.contains_key(dst) {
            continue;
        }
        targets.entry(src).or_default().push(dst);
        if let Some(d) = in_degree.get_mut(dst) {
            *d += 1;
        }
    }

    let mut current: Vec<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut placed: HashSet<&str> = current.iter().copied().collect();
    let mut layers: Layers = Vec::new();

    while !current.is_empty() {
        let mut next: Vec<&str> = Vec::new();
        for id in &current {
            for &target in targets.get(id).map(Vec::as_slice).unwrap_or_default() {
                let Some(d) = in_degree.get_mut(target) else {
                    continue;
                };
                *d = d.saturating_sub(1);
                if *d == 0 && placed.insert(target) {
                    next.push(target);
                }
            }
        }
        next.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));

        layers.push(current.iter().map(|id| id.to_string()).collect());
        current = next;
    }

    if placed.len() < nodes.len() {
        return Err(WeftError::Cycle {
            placed: placed.len(),
            total: nodes.len(),
        });
    }
    Ok(layers)
}

/// Every node that can influence `start`, including `start` itself.
pub fn ancestors_of(start: &str, edges: &[Edge]) -> HashSet<NodeId> {
    let mut sources: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        sources
            .entry(edge.target.as_str())
            .or_default()
            .push(edge.source.as_str());
    }

    let mut visited: HashSet<NodeId> = HashSet::new();
    visited.insert(start.to_string());
    let mut queue: VecDeque<&str> = VecDeque::from([start]);

    while let Some(id) = queue.pop_front() {
        for &src in sources.get(id).map(Vec::as_slice).unwrap_or_default() {
            if visited.insert(src.to_string()) {
                queue.push_back(src);
            }
        }
    }
    visited
}

/// Keep only `allowed` ids, dropping layers that end up empty.
pub fn restrict_layers(layers: Layers, allowed: &HashSet<NodeId>) -> Layers {
    layers
        .into_iter()
        .map(|layer| {
            layer
                .into_iter()
                .filter(|id| allowed.contains(id))
                .collect::<Vec<_>>()
        })
        .filter(|layer| !layer.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;
    use weft_core::types::{InputSlot, NodeKind, UserId};

    fn nodes(ids: &[&str]) -> Vec<Node> {
        ids.iter().map(|id| Node::new(*id, NodeKind::ImageGen)).collect()
    }

    fn edge(src: &str, dst: &str) -> Edge {
        Edge::new(src, dst, InputSlot::Input0)
    }

    fn layers_of(ids: &[&str], edges: &[Edge]) -> Result<Layers> {
        build_layers(&nodes(ids), edges)
    }

    fn assert_valid_layering(ids: &[String], edges: &[Edge], layers: &Layers) {
        let flat: Vec<&String> = layers.iter().flatten().collect();
        assert_eq!(flat.len(), ids.len(), "every node exactly once");
        let unique: HashSet<&String> = flat.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());

        let layer_of: HashMap<&str, usize> = layers
            .iter()
            .enumerate()
            .flat_map(|(i, l)| l.iter().map(move |id| (id.as_str(), i)))
            .collect();
        for e in edges {
            assert!(
                layer_of[e.source.as_str()] < layer_of[e.target.as_str()],
                "{} must come before {}",
                e.source,
                e.target
            );
        }
    }

    #[test]
    fn test_linear_chain_is_three_layers() {
        let layers = layers_of(&["u", "g1", "g2"], &[edge("u", "g1"), edge("g1", "g2")]).unwrap();
        assert_eq!(layers, vec![vec!["u"], vec!["g1"], vec!["g2"]]);
    }

    #[test]
    fn test_fan_out_is_two_layers() {
        let layers = layers_of(
            &["u", "a", "b", "c"],
            &[edge("u", "a"), edge("u", "b"), edge("u", "c")],
        )
        .unwrap();
        assert_eq!(layers, vec![vec!["u"], vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_fan_in_waits_for_all_sources() {
        let layers = layers_of(
            &["x", "p", "s", "mid"],
            &[edge("p", "mid"), edge("mid", "x"), edge("s", "x")],
        )
        .unwrap();
        assert_eq!(layers, vec![vec!["p", "s"], vec!["mid"], vec!["x"]]);
    }

    #[test]
    fn test_disconnected_nodes_share_first_layer() {
        let layers = layers_of(&["a", "b", "c"], &[]).unwrap();
        assert_eq!(layers, vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_cycle_detected() {
        let err = layers_of(
            &["u", "a", "b"],
            &[edge("u", "a"), edge("a", "b"), edge("b", "a")],
        )
        .unwrap_err();
        assert!(matches!(err, WeftError::Cycle { placed: 1, total: 3 }));
    }

    #[test]
    fn test_self_loop_is_cycle() {
        assert!(layers_of(&["a"], &[edge("a", "a")]).is_err());
    }

    /// Edges of an `n`-node graph taken from the upper triangle of `matrix`.
    fn forward_edges(ids: &[String], matrix: &[bool]) -> Vec<Edge> {
        let n = ids.len();
        let mut edges = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if matrix[i * n + j] {
                    edges.push(edge(&ids[i], &ids[j]));
                }
            }
        }
        edges
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("n{i}")).collect()
    }

    /// Node count, edge matrix, and a shuffled definition order.
    fn dag() -> impl Strategy<Value = (usize, Vec<bool>, Vec<usize>)> {
        (1usize..12).prop_flat_map(|n| {
            (
                Just(n),
                vec(any::<bool>(), n * n),
                Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            )
        })
    }

    /// Node count, edge matrix, and a pair `a < b` to join both ways.
    fn cyclic() -> impl Strategy<Value = (usize, Vec<bool>, usize, usize)> {
        (2usize..12)
            .prop_flat_map(|n| (Just(n), vec(any::<bool>(), n * n), 0..n - 1))
            .prop_flat_map(|(n, matrix, a)| (Just(n), Just(matrix), Just(a), (a + 1)..n))
    }

    proptest! {
        #[test]
        fn test_random_dags_layer_correctly((n, matrix, order) in dag()) {
            let ids = ids(n);
            let edges = forward_edges(&ids, &matrix);
            // Definition order must not matter
            let defs: Vec<Node> = order
                .iter()
                .map(|&i| Node::new(ids[i].clone(), NodeKind::AiAgent))
                .collect();

            let layers = build_layers(&defs, &edges).unwrap();
            assert_valid_layering(&ids, &edges, &layers);
        }

        #[test]
        fn test_random_cyclic_graphs_fail((n, matrix, a, b) in cyclic()) {
            let ids = ids(n);
            let mut edges = forward_edges(&ids, &matrix);
            edges.push(edge(&ids[a], &ids[b]));
            edges.push(edge(&ids[b], &ids[a]));

            let defs: Vec<Node> = ids.iter().map(|id| Node::new(id.clone(), NodeKind::AiAgent)).collect();
            prop_assert!(matches!(build_layers(&defs, &edges), Err(WeftError::Cycle { .. })), "expected a cycle error");
        }
    }

    #[test]
    fn test_ancestors_include_start_and_are_closed() {
        let edges = vec![edge("u", "g1"), edge("g1", "g2"), edge("t", "g2"), edge("g2", "z"), edge("x", "z")];
        let set = ancestors_of("g2", &edges);
        let expected: HashSet<NodeId> = ["g2", "g1", "u", "t"].iter().map(|s| s.to_string()).collect();
        assert_eq!(set, expected);

        for e in &edges {
            if set.contains(&e.target) {
                assert!(set.contains(&e.source));
            }
        }
        assert_eq!(ancestors_of("lonely", &edges).len(), 1);
    }

    #[test]
    fn test_restrict_layers_drops_empty_and_keeps_order() {
        let layers = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
            vec!["d".to_string(), "e".to_string()],
        ];
        let allowed: HashSet<NodeId> = ["b", "e"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            restrict_layers(layers, &allowed),
            vec![vec!["b".to_string()], vec!["e".to_string()]]
        );
    }

    #[test]
    fn test_validate_rejects_bad_structure() {
        let owner = UserId::from_string("u");
        let empty = Workflow::new(owner.clone(), "empty", vec![], vec![]);
        assert!(matches!(validate(&empty), Err(WeftError::Validation(_))));

        let dup = Workflow::new(owner.clone(), "dup", nodes(&["a", "a"]), vec![]);
        assert!(matches!(validate(&dup), Err(WeftError::Validation(_))));

        let dangling = Workflow::new(owner.clone(), "dangling", nodes(&["a"]), vec![edge("a", "ghost")]);
        assert!(matches!(validate(&dangling), Err(WeftError::Validation(_))));

        let ok = Workflow::new(owner, "ok", nodes(&["a", "b"]), vec![edge("a", "b")]);
        assert!(validate(&ok).is_ok());
    }
}
