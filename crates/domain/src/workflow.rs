//! Cron workflow graphs.
//!
//! A workflow is a small node graph: one `start` node, followed by
//! `text` / `delay` / `if` nodes connected by directed edges. The graph
//! must be acyclic; `if` nodes pick a branch by comparing a stored env
//! value. Execution lives in the gateway; this module owns the shape and
//! the structural validation.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowNodeKind {
    Start,
    /// Dispatch a text turn through the orchestrator.
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
    /// Sleep before continuing.
    Delay { duration_ms: u64 },
    /// Branch on a stored env value: follow the edge to `then_to` when
    /// `env[var] == equals`, otherwise `else_to` (either may be absent,
    /// ending that branch).
    If {
        var: String,
        equals: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        then_to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_to: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: WorkflowNodeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowGraph {
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The single start node id, if well-formed.
    pub fn start(&self) -> Option<&WorkflowNode> {
        self.nodes
            .iter()
            .find(|n| matches!(n.kind, WorkflowNodeKind::Start))
    }

    /// Outgoing edges of a node, in declaration order. `if` branch targets
    /// count as edges too.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .edges
            .iter()
            .filter(|e| e.from == id)
            .map(|e| e.to.as_str())
            .collect();
        if let Some(node) = self.node(id) {
            if let WorkflowNodeKind::If {
                then_to, else_to, ..
            } = &node.kind
            {
                out.extend(then_to.as_deref());
                out.extend(else_to.as_deref());
            }
        }
        out
    }

    /// Structural validation: exactly one start node, unique node ids,
    /// edges reference known nodes, and the graph is acyclic.
    pub fn validate(&self) -> Result<(), String> {
        let starts = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, WorkflowNodeKind::Start))
            .count();
        if starts != 1 {
            return Err(format!("workflow must have exactly one start node, found {starts}"));
        }

        let mut ids = HashSet::new();
        for n in &self.nodes {
            if !ids.insert(n.id.as_str()) {
                return Err(format!("duplicate node id: {}", n.id));
            }
        }

        for e in &self.edges {
            for endpoint in [&e.from, &e.to] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(format!("edge references unknown node: {endpoint}"));
                }
            }
        }
        for n in &self.nodes {
            if let WorkflowNodeKind::If {
                then_to, else_to, ..
            } = &n.kind
            {
                for target in [then_to, else_to].into_iter().flatten() {
                    if !ids.contains(target.as_str()) {
                        return Err(format!("if node {} targets unknown node: {target}", n.id));
                    }
                }
            }
        }

        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), String> {
        // Colored DFS: 0 = unvisited, 1 = on stack, 2 = done.
        let mut color: HashMap<&str, u8> = HashMap::new();
        for n in &self.nodes {
            color.insert(n.id.as_str(), 0);
        }

        fn visit<'a>(
            graph: &'a WorkflowGraph,
            id: &'a str,
            color: &mut HashMap<&'a str, u8>,
        ) -> Result<(), String> {
            match color.get(id) {
                Some(1) => return Err(format!("workflow contains a cycle through node {id}")),
                Some(2) => return Ok(()),
                _ => {}
            }
            color.insert(id, 1);
            for next in graph.successors(id) {
                visit(graph, next, color)?;
            }
            color.insert(id, 2);
            Ok(())
        }

        let node_ids: Vec<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        for id in node_ids {
            visit(self, id, &mut color)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_node(id: &str, text: &str) -> WorkflowNode {
        WorkflowNode {
            id: id.into(),
            kind: WorkflowNodeKind::Text {
                text: text.into(),
                session_id: None,
                user_id: None,
                channel: None,
            },
        }
    }

    fn start_node() -> WorkflowNode {
        WorkflowNode {
            id: "start".into(),
            kind: WorkflowNodeKind::Start,
        }
    }

    fn edge(from: &str, to: &str) -> WorkflowEdge {
        WorkflowEdge {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn linear_graph_validates() {
        let g = WorkflowGraph {
            nodes: vec![start_node(), text_node("t1", "hello"), text_node("t2", "bye")],
            edges: vec![edge("start", "t1"), edge("t1", "t2")],
        };
        assert!(g.validate().is_ok());
    }

    #[test]
    fn cycle_is_rejected() {
        let g = WorkflowGraph {
            nodes: vec![start_node(), text_node("t1", "a"), text_node("t2", "b")],
            edges: vec![edge("start", "t1"), edge("t1", "t2"), edge("t2", "t1")],
        };
        let err = g.validate().unwrap_err();
        assert!(err.contains("cycle"), "{err}");
    }

    #[test]
    fn missing_start_is_rejected() {
        let g = WorkflowGraph {
            nodes: vec![text_node("t1", "a")],
            edges: vec![],
        };
        assert!(g.validate().is_err());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let g = WorkflowGraph {
            nodes: vec![start_node(), text_node("t1", "a"), text_node("t1", "b")],
            edges: vec![],
        };
        assert!(g.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn edge_to_unknown_node_rejected() {
        let g = WorkflowGraph {
            nodes: vec![start_node()],
            edges: vec![edge("start", "ghost")],
        };
        assert!(g.validate().unwrap_err().contains("unknown node"));
    }

    #[test]
    fn if_branches_count_as_edges() {
        let g = WorkflowGraph {
            nodes: vec![
                start_node(),
                WorkflowNode {
                    id: "cond".into(),
                    kind: WorkflowNodeKind::If {
                        var: "mode".into(),
                        equals: "on".into(),
                        then_to: Some("cond".into()),
                        else_to: None,
                    },
                },
            ],
            edges: vec![edge("start", "cond")],
        };
        // self-loop through the then branch
        assert!(g.validate().is_err());
    }

    #[test]
    fn serde_tagged_shape() {
        let g = WorkflowGraph {
            nodes: vec![
                start_node(),
                WorkflowNode {
                    id: "d".into(),
                    kind: WorkflowNodeKind::Delay { duration_ms: 500 },
                },
            ],
            edges: vec![edge("start", "d")],
        };
        let v = serde_json::to_value(&g).unwrap();
        assert_eq!(v["nodes"][0]["type"], "start");
        assert_eq!(v["nodes"][1]["type"], "delay");
        assert_eq!(v["nodes"][1]["duration_ms"], 500);
        let back: WorkflowGraph = serde_json::from_value(v).unwrap();
        assert_eq!(back, g);
    }
}
