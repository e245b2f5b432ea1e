//! Pre-execution graph validation
//!
//! The validator is pure and ordering-stable: the same graph always yields
//! the same report, byte for byte. Structural invariant violations and
//! data-flow cycles are errors and block execution; execution-flow cycles,
//! unbound inputs, and unreachable callable nodes are reported but tolerated
//! (exec cycles are enforced at run time by the call-depth guard).

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::model::{ConnectionData, NodeData};

/// Severity of a validation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks execution
    Error,
    /// Reported; execution proceeds
    Warning,
    /// Advisory only
    Info,
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Finding severity
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Node the finding is anchored to, when there is a single one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl Diagnostic {
    fn error(message: impl Into<String>, node_id: Option<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            node_id,
        }
    }

    fn warning(message: impl Into<String>, node_id: Option<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            node_id,
        }
    }

    fn info(message: impl Into<String>, node_id: Option<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            node_id,
        }
    }
}

/// The full validation outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// All findings, in check order
    pub messages: Vec<Diagnostic>,
}

impl ValidationReport {
    /// Whether any finding blocks execution
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    /// First error message, for run results and CLI output
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.messages.iter().find(|m| m.severity == Severity::Error)
    }
}

/// Stateless graph validator
pub struct GraphValidator;

impl GraphValidator {
    /// Validate a graph's nodes and connections
    pub fn validate(nodes: &[NodeData], connections: &[ConnectionData]) -> ValidationReport {
        let mut report = ValidationReport::default();

        Self::check_structure(nodes, connections, &mut report);
        Self::check_cycles(nodes, connections, false, &mut report);
        Self::check_cycles(nodes, connections, true, &mut report);
        Self::check_unbound_inputs(nodes, connections, &mut report);
        Self::check_reachability(nodes, connections, &mut report);

        report
    }

    /// Structural invariants: socket uniqueness, endpoint existence,
    /// execution-flag agreement, single data source per input
    fn check_structure(
        nodes: &[NodeData],
        connections: &[ConnectionData],
        report: &mut ValidationReport,
    ) {
        let by_id: HashMap<&str, &NodeData> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        for node in nodes {
            if !node.sockets_unique() {
                report.messages.push(Diagnostic::error(
                    format!("node '{}' declares duplicate sockets", node.name),
                    Some(node.id.clone()),
                ));
            }
            for socket in node.inputs.iter().chain(node.outputs.iter()) {
                if socket.is_execution
                    && (socket.type_name != crate::model::EXEC_TYPE || socket.value.is_some())
                {
                    report.messages.push(Diagnostic::error(
                        format!(
                            "execution socket '{}' of node '{}' must be typed '{}' and carry no value",
                            socket.name,
                            node.name,
                            crate::model::EXEC_TYPE
                        ),
                        Some(node.id.clone()),
                    ));
                }
            }
        }

        let mut seen_data_inputs: HashSet<(&str, &str)> = HashSet::new();
        for conn in connections {
            let source = by_id.get(conn.output_node_id.as_str());
            let target = by_id.get(conn.input_node_id.as_str());

            let (Some(source), Some(target)) = (source, target) else {
                report.messages.push(Diagnostic::error(
                    format!(
                        "connection {}:{} -> {}:{} references a missing node",
                        conn.output_node_id,
                        conn.output_socket_name,
                        conn.input_node_id,
                        conn.input_socket_name
                    ),
                    None,
                ));
                continue;
            };

            let out_socket = source.output(&conn.output_socket_name);
            let in_socket = target.input(&conn.input_socket_name);
            match (out_socket, in_socket) {
                (Some(out), Some(inp)) => {
                    if out.is_execution != conn.is_execution || inp.is_execution != conn.is_execution
                    {
                        report.messages.push(Diagnostic::error(
                            format!(
                                "connection {}:{} -> {}:{} mixes execution and data sockets",
                                conn.output_node_id,
                                conn.output_socket_name,
                                conn.input_node_id,
                                conn.input_socket_name
                            ),
                            None,
                        ));
                    }
                }
                _ => {
                    report.messages.push(Diagnostic::error(
                        format!(
                            "connection {}:{} -> {}:{} references a missing socket",
                            conn.output_node_id,
                            conn.output_socket_name,
                            conn.input_node_id,
                            conn.input_socket_name
                        ),
                        None,
                    ));
                    continue;
                }
            }

            if !conn.is_execution
                && !seen_data_inputs.insert((
                    conn.input_node_id.as_str(),
                    conn.input_socket_name.as_str(),
                ))
            {
                report.messages.push(Diagnostic::warning(
                    format!(
                        "data input {}:{} has multiple sources; only the first is used",
                        conn.input_node_id, conn.input_socket_name
                    ),
                    Some(conn.input_node_id.clone()),
                ));
            }
        }
    }

    /// Kahn's algorithm over one edge family
    ///
    /// Data-flow survivors are an error; execution-flow survivors only a
    /// warning, since the runtime depth guard breaks exec cycles.
    fn check_cycles(
        nodes: &[NodeData],
        connections: &[ConnectionData],
        execution: bool,
        report: &mut ValidationReport,
    ) {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut in_family: HashSet<&str> = HashSet::new();

        for node in nodes {
            in_degree.insert(&node.id, 0);
            adjacency.insert(&node.id, Vec::new());
        }
        for conn in connections {
            if conn.is_execution != execution {
                continue;
            }
            let (from, to) = (conn.output_node_id.as_str(), conn.input_node_id.as_str());
            let (Some(neighbors), Some(degree)) = (adjacency.get_mut(from), in_degree.get_mut(to))
            else {
                continue; // dangling; reported by the structure check
            };
            neighbors.push(to);
            *degree += 1;
            in_family.insert(from);
            in_family.insert(to);
        }
        for neighbors in adjacency.values_mut() {
            neighbors.sort_unstable();
        }

        let mut queue: VecDeque<&str> = nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| in_degree[*id] == 0)
            .collect();
        let mut visited = 0usize;
        while let Some(current) = queue.pop_front() {
            visited += 1;
            for &next in &adjacency[current] {
                let degree = in_degree.get_mut(next).expect("known node");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next);
                }
            }
        }

        if visited == nodes.len() {
            return;
        }
        // Survivors in insertion order, restricted to this edge family.
        let survivors: Vec<&str> = nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| in_degree[*id] > 0 && in_family.contains(id))
            .collect();
        if survivors.is_empty() {
            return;
        }

        let family = if execution { "execution-flow" } else { "data-flow" };
        let message = format!("{} cycle involving nodes: {}", family, survivors.join(", "));
        if execution {
            report.messages.push(Diagnostic::warning(message, None));
        } else {
            report.messages.push(Diagnostic::error(message, None));
        }
    }

    /// Every non-execution input must be connected or defaulted
    fn check_unbound_inputs(
        nodes: &[NodeData],
        connections: &[ConnectionData],
        report: &mut ValidationReport,
    ) {
        let connected: HashSet<(&str, &str)> = connections
            .iter()
            .filter(|c| !c.is_execution)
            .map(|c| (c.input_node_id.as_str(), c.input_socket_name.as_str()))
            .collect();

        for node in nodes {
            for socket in node.data_inputs() {
                let bound = connected.contains(&(node.id.as_str(), socket.name.as_str()))
                    || socket.value.is_some();
                if !bound {
                    report.messages.push(Diagnostic::warning(
                        format!(
                            "input '{}' of node '{}' has no connection and no default",
                            socket.name, node.name
                        ),
                        Some(node.id.clone()),
                    ));
                }
            }
        }
    }

    /// BFS on execution edges from every initiator; unreached callable
    /// nodes are advisory
    fn check_reachability(
        nodes: &[NodeData],
        connections: &[ConnectionData],
        report: &mut ValidationReport,
    ) {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for conn in connections.iter().filter(|c| c.is_execution) {
            adjacency
                .entry(conn.output_node_id.as_str())
                .or_default()
                .push(conn.input_node_id.as_str());
        }
        for neighbors in adjacency.values_mut() {
            neighbors.sort_unstable();
        }

        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = nodes
            .iter()
            .filter(|n| n.exec_init)
            .map(|n| n.id.as_str())
            .collect();
        reached.extend(queue.iter().copied());

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = adjacency.get(current) {
                for &next in neighbors {
                    if reached.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }

        for node in nodes {
            if node.callable && !reached.contains(node.id.as_str()) {
                report.messages.push(Diagnostic::info(
                    format!("callable node '{}' is not reachable from any initiator", node.name),
                    Some(node.id.clone()),
                ));
            }
        }
    }
}
