// SPDX-License-Identifier: MIT

//! Structural validation of the pipeline graph.
//!
//! Checks run in a fixed order so each stage can assume the previous one
//! passed: unique ids, then resolvable input references, then acyclicity.
//! Cycle detection uses DFS with a recursion stack so the reported error
//! carries the actual cycle path.

use std::collections::{HashMap, HashSet};

use crate::errors::PipelineError;
use crate::pipeline::Block;

/// Validates a block list for structural integrity and executability.
///
/// Returns the first problem found, in check order: duplicate ids, then
/// unresolved input references, then cycles. Cycle detection requires a
/// structurally valid graph, so it only runs once the earlier checks pass.
pub fn validate_blocks(blocks: &[Block]) -> Result<(), PipelineError> {
    validate_unique_ids(blocks)?;
    validate_input_references(blocks)?;
    validate_acyclic(blocks)
}

fn validate_unique_ids(blocks: &[Block]) -> Result<(), PipelineError> {
    let mut seen = HashSet::new();
    for block in blocks {
        if !seen.insert(&block.id) {
            return Err(PipelineError::DuplicateBlockId {
                block_id: block.id.clone(),
            });
        }
    }
    Ok(())
}

fn validate_input_references(blocks: &[Block]) -> Result<(), PipelineError> {
    let ids: HashSet<&String> = blocks.iter().map(|b| &b.id).collect();
    for block in blocks {
        for input in &block.inputs {
            if !ids.contains(input) {
                return Err(PipelineError::UnresolvedInput {
                    block_id: block.id.clone(),
                    missing_input: input.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_acyclic(blocks: &[Block]) -> Result<(), PipelineError> {
    // Forward adjacency: upstream -> [downstream]
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for block in blocks {
        graph.entry(&block.id).or_default();
    }
    for block in blocks {
        for input in &block.inputs {
            graph
                .get_mut(input.as_str())
                .expect("references validated")
                .push(&block.id);
        }
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    // Iterate in declaration order for a deterministic cycle report.
    for block in blocks {
        if !visited.contains(block.id.as_str()) {
            if let Some(cycle) =
                dfs_cycle(&block.id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Err(PipelineError::CyclicDependency { cycle });
            }
        }
    }
    Ok(())
}

/// DFS with recursion-stack tracking. Returns the cycle path when a back
/// edge to a gray node is found.
fn dfs_cycle(
    node: &str,
    graph: &HashMap<&str, Vec<&str>>,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if let Some(cycle) = dfs_cycle(neighbor, graph, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(neighbor) {
                let start = path
                    .iter()
                    .position(|x| x == neighbor)
                    .expect("gray node is on the current path");
                let mut cycle = path[start..].to_vec();
                cycle.push(neighbor.to_string());
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str, inputs: Vec<&str>) -> Block {
        let mut b = Block::new(id, "test");
        b.inputs = inputs.iter().map(|s| s.to_string()).collect();
        b
    }

    #[test]
    fn test_empty_pipeline_is_valid() {
        assert!(validate_blocks(&[]).is_ok());
    }

    #[test]
    fn test_linear_chain_is_valid() {
        let blocks = vec![
            block("a", vec![]),
            block("b", vec!["a"]),
            block("c", vec!["b"]),
        ];
        assert!(validate_blocks(&blocks).is_ok());
    }

    #[test]
    fn test_diamond_is_valid() {
        let blocks = vec![
            block("a", vec![]),
            block("b", vec!["a"]),
            block("c", vec!["a"]),
            block("d", vec!["b", "c"]),
        ];
        assert!(validate_blocks(&blocks).is_ok());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let blocks = vec![block("a", vec![]), block("a", vec![])];
        assert!(matches!(
            validate_blocks(&blocks),
            Err(PipelineError::DuplicateBlockId { block_id }) if block_id == "a"
        ));
    }

    #[test]
    fn test_unresolved_input_rejected() {
        let blocks = vec![block("a", vec![]), block("b", vec!["ghost"])];
        assert!(matches!(
            validate_blocks(&blocks),
            Err(PipelineError::UnresolvedInput { block_id, missing_input })
                if block_id == "b" && missing_input == "ghost"
        ));
    }

    #[test]
    fn test_self_loop_rejected() {
        let blocks = vec![block("a", vec!["a"])];
        assert!(matches!(
            validate_blocks(&blocks),
            Err(PipelineError::CyclicDependency { cycle }) if cycle == vec!["a", "a"]
        ));
    }

    #[test]
    fn test_two_node_cycle_rejected() {
        let blocks = vec![block("a", vec!["b"]), block("b", vec!["a"])];
        assert!(matches!(
            validate_blocks(&blocks),
            Err(PipelineError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_longer_cycle_reports_path() {
        let blocks = vec![
            block("a", vec![]),
            block("b", vec!["a", "d"]),
            block("c", vec!["b"]),
            block("d", vec!["c"]),
        ];
        match validate_blocks(&blocks) {
            Err(PipelineError::CyclicDependency { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.len() >= 4);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }
}
