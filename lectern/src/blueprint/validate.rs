//! Blueprint validation at ingestion: tool membership and DAG acyclicity.
//!
//! `dependsOn` edges form a DAG by contract; a cyclic or dangling edge is
//! rejected here, before anything executes. The topological order computed
//! by [`toposort`] is also the executor's execution order.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use super::{Blueprint, BindingSource, ComputeNodeType};

/// Why a blueprint was rejected at ingestion.
#[derive(Debug, Error)]
pub enum BlueprintError {
    #[error("unknown tool '{name}' referenced by '{site}'")]
    UnknownTool { name: String, site: String },
    #[error("duplicate id '{id}' in {section}")]
    DuplicateId { id: String, section: String },
    #[error("'{id}' depends on unknown id '{dep}'")]
    UnknownDependency { id: String, dep: String },
    #[error("dependency cycle in {section} involving {ids:?}")]
    Cycle { section: String, ids: Vec<String> },
    #[error("compute node '{id}' of type tool has no toolName")]
    MissingToolName { id: String },
    #[error("blueprint does not match the schema: {0}")]
    Schema(String),
}

/// Kahn's algorithm over `(id, depends_on)` pairs. Returns a valid execution
/// order, or the ids stuck in a cycle.
pub fn toposort(
    nodes: &[(String, Vec<String>)],
    section: &str,
) -> Result<Vec<String>, BlueprintError> {
    let ids: HashSet<&str> = nodes.iter().map(|(id, _)| id.as_str()).collect();
    for (id, deps) in nodes {
        for dep in deps {
            if !ids.contains(dep.as_str()) {
                return Err(BlueprintError::UnknownDependency {
                    id: id.clone(),
                    dep: dep.clone(),
                });
            }
        }
    }

    let mut indegree: HashMap<&str, usize> = nodes
        .iter()
        .map(|(id, deps)| (id.as_str(), deps.len()))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (id, deps) in nodes {
        for dep in deps {
            dependents.entry(dep.as_str()).or_default().push(id.as_str());
        }
    }

    // Seed with declaration order so independent nodes keep a stable order.
    let mut ready: VecDeque<&str> = nodes
        .iter()
        .filter(|(id, _)| indegree[id.as_str()] == 0)
        .map(|(id, _)| id.as_str())
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = ready.pop_front() {
        order.push(id.to_string());
        for &next in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
            if let Some(entry) = indegree.get_mut(next) {
                *entry -= 1;
                if *entry == 0 {
                    ready.push_back(next);
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<String> = nodes
            .iter()
            .filter(|(id, _)| !order.contains(id))
            .map(|(id, _)| id.clone())
            .collect();
        return Err(BlueprintError::Cycle {
            section: section.to_string(),
            ids: stuck,
        });
    }
    Ok(order)
}

impl Blueprint {
    /// Validates structure against the registered tool names. Called by the
    /// planner on every LLM output and by the executor at ingestion.
    pub fn validate(&self, tool_names: &HashSet<String>) -> Result<(), BlueprintError> {
        let mut seen = HashSet::new();
        for b in &self.data_contract.bindings {
            if !seen.insert(b.id.as_str()) {
                return Err(BlueprintError::DuplicateId {
                    id: b.id.clone(),
                    section: "bindings".into(),
                });
            }
            if matches!(b.source_type, BindingSource::Tool | BindingSource::Api) {
                let name = b.tool_name.as_deref().unwrap_or_default();
                if !tool_names.contains(name) {
                    return Err(BlueprintError::UnknownTool {
                        name: name.to_string(),
                        site: format!("binding '{}'", b.id),
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        for n in &self.compute_graph.nodes {
            if !seen.insert(n.id.as_str()) {
                return Err(BlueprintError::DuplicateId {
                    id: n.id.clone(),
                    section: "computeGraph".into(),
                });
            }
            if n.node_type == ComputeNodeType::Tool {
                let Some(name) = n.tool_name.as_deref() else {
                    return Err(BlueprintError::MissingToolName { id: n.id.clone() });
                };
                if !tool_names.contains(name) {
                    return Err(BlueprintError::UnknownTool {
                        name: name.to_string(),
                        site: format!("compute node '{}'", n.id),
                    });
                }
            }
        }

        self.binding_order()?;
        self.compute_order()?;
        Ok(())
    }

    /// Topological order of the data bindings.
    pub fn binding_order(&self) -> Result<Vec<String>, BlueprintError> {
        let nodes: Vec<(String, Vec<String>)> = self
            .data_contract
            .bindings
            .iter()
            .map(|b| (b.id.clone(), b.depends_on.clone()))
            .collect();
        toposort(&nodes, "bindings")
    }

    /// Topological order of the compute nodes (all kinds; the executor
    /// filters tool-type nodes when running phase B).
    pub fn compute_order(&self) -> Result<Vec<String>, BlueprintError> {
        let nodes: Vec<(String, Vec<String>)> = self
            .compute_graph
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.depends_on.clone()))
            .collect();
        toposort(&nodes, "computeGraph")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn toposort_respects_dependencies() {
        let nodes = vec![
            ("c".to_string(), vec!["b".to_string()]),
            ("a".to_string(), vec![]),
            ("b".to_string(), vec!["a".to_string()]),
        ];
        let order = toposort(&nodes, "t").unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn toposort_rejects_cycles() {
        let nodes = vec![
            ("a".to_string(), vec!["b".to_string()]),
            ("b".to_string(), vec!["a".to_string()]),
        ];
        let err = toposort(&nodes, "bindings").unwrap_err();
        assert!(matches!(err, BlueprintError::Cycle { .. }));
    }

    #[test]
    fn toposort_rejects_dangling_edges() {
        let nodes = vec![("a".to_string(), vec!["ghost".to_string()])];
        let err = toposort(&nodes, "t").unwrap_err();
        assert!(matches!(err, BlueprintError::UnknownDependency { .. }));
    }

    #[test]
    fn validate_accepts_known_tools() {
        let bp = crate::blueprint::tests::minimal_blueprint();
        let tools = names(&["get_assignment_submissions", "summary_stats"]);
        assert!(bp.validate(&tools).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_tool() {
        let bp = crate::blueprint::tests::minimal_blueprint();
        let tools = names(&["summary_stats"]);
        let err = bp.validate(&tools).unwrap_err();
        assert!(matches!(err, BlueprintError::UnknownTool { .. }));
    }
}
