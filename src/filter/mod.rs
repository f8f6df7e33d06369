//! Node filter language
//!
//! A node filter selects a subset of cluster nodes for a scoped value
//! (environment variable, label, volume, port mapping or k3s argument).
//!
//! Grammar (role tokens are case-insensitive):
//!
//! ```text
//! filter  := role | role ":" index | role "[" index "]"
//! role    := "server" | "servers" | "agent" | "agents" | "loadbalancer" | "all"
//! index   := "*" | item ("," item)*
//! item    := N | N "-" M          (inclusive range, N <= M)
//! ```
//!
//! A bare role selects every node of that role. An empty filter list selects
//! every server node: values without filters land on the control plane only.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static FILTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<role>[A-Za-z]+)(?::(?P<colon>[^:\[\]]+)|\[(?P<bracket>[^\[\]]+)\])?$")
        .expect("node filter regex is valid")
});

/// Errors produced while parsing or resolving node filters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid node filter syntax '{0}': expected <role>, <role>:<index> or <role>[<index>]")]
    InvalidFilterSyntax(String),

    #[error("Unknown role '{role}' in node filter '{filter}': expected one of server, agent, loadbalancer, all")]
    UnknownRole { filter: String, role: String },

    #[error("Node filter '{filter}' does not match the cluster topology: {reason}")]
    NoSuchNode { filter: String, reason: String },
}

/// Role of a node in a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Server,
    Agent,
    #[serde(rename = "loadbalancer")]
    LoadBalancer,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Server => "server",
            NodeRole::Agent => "agent",
            NodeRole::LoadBalancer => "loadbalancer",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" | "servers" => Ok(NodeRole::Server),
            "agent" | "agents" => Ok(NodeRole::Agent),
            "loadbalancer" => Ok(NodeRole::LoadBalancer),
            _ => Err(FilterError::UnknownRole {
                filter: s.to_string(),
                role: s.to_string(),
            }),
        }
    }
}

/// Which roles a filter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSelector {
    Role(NodeRole),
    All,
}

/// Which indices within the selected role(s) a filter applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSelector {
    /// `*` or a bare role
    Every,
    Indices(BTreeSet<u32>),
}

/// A parsed node filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFilter {
    pub roles: RoleSelector,
    pub index: IndexSelector,
    raw: String,
}

impl NodeFilter {
    /// The filter text as it was written
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Nodes of `topology` matched by this filter.
    ///
    /// Explicit indices must exist in the topology; `*` matches whatever is
    /// there at resolution time, including nothing.
    pub fn matches(&self, topology: &Topology) -> Result<BTreeSet<NodeRef>, FilterError> {
        let roles: Vec<NodeRole> = match self.roles {
            RoleSelector::Role(role) => vec![role],
            RoleSelector::All => vec![NodeRole::Server, NodeRole::Agent, NodeRole::LoadBalancer],
        };

        let mut matched = BTreeSet::new();
        for role in roles {
            let count = topology.count(role);
            match &self.index {
                IndexSelector::Every => {
                    matched.extend((0..count).map(|index| NodeRef { role, index }));
                }
                IndexSelector::Indices(indices) => {
                    if role == NodeRole::LoadBalancer && count == 0 {
                        return Err(FilterError::NoSuchNode {
                            filter: self.raw.clone(),
                            reason: "the load balancer is disabled".to_string(),
                        });
                    }
                    for &index in indices {
                        if index >= count {
                            return Err(FilterError::NoSuchNode {
                                filter: self.raw.clone(),
                                reason: format!(
                                    "index {} out of range, cluster has {} {} node(s)",
                                    index, count, role
                                ),
                            });
                        }
                        matched.insert(NodeRef { role, index });
                    }
                }
            }
        }
        Ok(matched)
    }
}

impl fmt::Display for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for NodeFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_filter(s)
    }
}

/// A concrete node within a topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub role: NodeRole,
    pub index: u32,
}

impl NodeRef {
    pub fn new(role: NodeRole, index: u32) -> Self {
        Self { role, index }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            NodeRole::LoadBalancer => f.write_str("loadbalancer"),
            role => write!(f, "{}:{}", role, self.index),
        }
    }
}

/// Node layout of a cluster, known once server/agent counts are fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Topology {
    pub servers: u32,
    pub agents: u32,
    pub load_balancer: bool,
}

impl Topology {
    pub fn new(servers: u32, agents: u32, load_balancer: bool) -> Self {
        Self {
            servers,
            agents,
            load_balancer,
        }
    }

    pub fn count(&self, role: NodeRole) -> u32 {
        match role {
            NodeRole::Server => self.servers,
            NodeRole::Agent => self.agents,
            NodeRole::LoadBalancer => u32::from(self.load_balancer),
        }
    }

    /// Every node in the topology, servers first
    pub fn nodes(&self) -> Vec<NodeRef> {
        [NodeRole::Server, NodeRole::Agent, NodeRole::LoadBalancer]
            .into_iter()
            .flat_map(|role| (0..self.count(role)).map(move |index| NodeRef { role, index }))
            .collect()
    }

    /// Nodes selected when a value carries no filters
    pub fn default_targets(&self) -> BTreeSet<NodeRef> {
        (0..self.servers)
            .map(|index| NodeRef::new(NodeRole::Server, index))
            .collect()
    }
}

// ============================================================================
// SBIO: Pure parsing and resolution (no I/O)
// ============================================================================

/// Parse a single filter expression
pub fn parse_filter(input: &str) -> Result<NodeFilter, FilterError> {
    let trimmed = input.trim();
    let caps = FILTER_RE
        .captures(trimmed)
        .ok_or_else(|| FilterError::InvalidFilterSyntax(input.to_string()))?;

    let role_token = &caps["role"];
    let roles = if role_token.eq_ignore_ascii_case("all") {
        RoleSelector::All
    } else {
        let role = role_token
            .parse::<NodeRole>()
            .map_err(|_| FilterError::UnknownRole {
                filter: input.to_string(),
                role: role_token.to_string(),
            })?;
        RoleSelector::Role(role)
    };

    let index = match caps.name("colon").or_else(|| caps.name("bracket")) {
        None => IndexSelector::Every,
        Some(spec) => parse_index(spec.as_str(), input)?,
    };

    if roles == RoleSelector::All && index != IndexSelector::Every {
        return Err(FilterError::InvalidFilterSyntax(input.to_string()));
    }
    if let (RoleSelector::Role(NodeRole::LoadBalancer), IndexSelector::Indices(indices)) =
        (&roles, &index)
    {
        if indices.iter().any(|&i| i != 0) {
            return Err(FilterError::InvalidFilterSyntax(input.to_string()));
        }
    }

    Ok(NodeFilter {
        roles,
        index,
        raw: trimmed.to_string(),
    })
}

fn parse_index(spec: &str, filter: &str) -> Result<IndexSelector, FilterError> {
    let syntax = || FilterError::InvalidFilterSyntax(filter.to_string());

    let spec = spec.trim();
    if spec == "*" {
        return Ok(IndexSelector::Every);
    }

    let mut indices = BTreeSet::new();
    for item in spec.split(',') {
        let item = item.trim();
        match item.split_once('-') {
            Some((start, end)) => {
                let start = parse_number(start).ok_or_else(syntax)?;
                let end = parse_number(end).ok_or_else(syntax)?;
                if start > end {
                    return Err(syntax());
                }
                indices.extend(start..=end);
            }
            None => {
                indices.insert(parse_number(item).ok_or_else(syntax)?);
            }
        }
    }
    Ok(IndexSelector::Indices(indices))
}

fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Resolve a list of filter strings against a topology.
///
/// An empty list resolves to every server node. `*` is expanded against the
/// topology passed in, so callers must resolve again whenever it changes.
pub fn resolve<S: AsRef<str>>(
    filters: &[S],
    topology: &Topology,
) -> Result<BTreeSet<NodeRef>, FilterError> {
    if filters.is_empty() {
        return Ok(topology.default_targets());
    }

    let mut targets = BTreeSet::new();
    for filter in filters {
        let parsed = parse_filter(filter.as_ref())?;
        targets.extend(parsed.matches(topology)?);
    }
    Ok(targets)
}

/// Render a node set in the canonical `role:index,...` form understood by k3d.
///
/// Roles fully covered by the set collapse to `role:*`.
pub fn to_filter_strings(targets: &BTreeSet<NodeRef>, topology: &Topology) -> Vec<String> {
    let mut out = Vec::new();
    for role in [NodeRole::Server, NodeRole::Agent] {
        let indices: Vec<u32> = targets
            .iter()
            .filter(|n| n.role == role)
            .map(|n| n.index)
            .collect();
        if indices.is_empty() {
            continue;
        }
        if indices.len() as u32 == topology.count(role) {
            out.push(format!("{}:*", role));
        } else {
            let list: Vec<String> = indices.iter().map(u32::to_string).collect();
            out.push(format!("{}:{}", role, list.join(",")));
        }
    }
    if targets.iter().any(|n| n.role == NodeRole::LoadBalancer) {
        out.push("loadbalancer".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topo() -> Topology {
        Topology::new(3, 2, true)
    }

    #[test]
    fn test_parse_colon_and_bracket_forms() {
        let a = parse_filter("server:0").unwrap();
        let b = parse_filter("server[0]").unwrap();
        assert_eq!(a.roles, b.roles);
        assert_eq!(a.index, b.index);
        assert_eq!(a.raw(), "server:0");
    }

    #[test]
    fn test_parse_plural_and_case() {
        let f = parse_filter("Agents:*").unwrap();
        assert_eq!(f.roles, RoleSelector::Role(NodeRole::Agent));
        assert_eq!(f.index, IndexSelector::Every);
    }

    #[test]
    fn test_parse_lists_and_ranges() {
        let f = parse_filter("server:0,2-3").unwrap();
        let expected: BTreeSet<u32> = [0, 2, 3].into_iter().collect();
        assert_eq!(f.index, IndexSelector::Indices(expected));
    }

    #[test]
    fn test_negative_index_is_syntax_error() {
        assert!(matches!(
            parse_filter("server:-1"),
            Err(FilterError::InvalidFilterSyntax(_))
        ));
        assert!(matches!(
            parse_filter("agent[3-1]"),
            Err(FilterError::InvalidFilterSyntax(_))
        ));
    }

    #[test]
    fn test_malformed_filters() {
        for bad in ["", "server:", "server[0", "0:server", "server:0:1", "all:0", "loadbalancer:1"] {
            assert!(
                matches!(parse_filter(bad), Err(FilterError::InvalidFilterSyntax(_))),
                "expected syntax error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_unknown_role() {
        let err = parse_filter("worker:0").unwrap_err();
        assert!(matches!(err, FilterError::UnknownRole { ref role, .. } if role == "worker"));
    }

    #[test]
    fn test_empty_filters_default_to_servers() {
        let targets = resolve::<&str>(&[], &topo()).unwrap();
        assert_eq!(targets.len(), 3);
        assert!(targets.iter().all(|n| n.role == NodeRole::Server));
    }

    #[test]
    fn test_wildcard_expands_to_current_count() {
        let targets = resolve(&["agent:*"], &topo()).unwrap();
        assert_eq!(targets.len(), 2);

        let grown = Topology::new(3, 5, true);
        assert_eq!(resolve(&["agent:*"], &grown).unwrap().len(), 5);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let filters = vec!["server:0".to_string(), "agent[*]".to_string(), "loadbalancer".to_string()];
        let first = resolve(&filters, &topo()).unwrap();
        let second = resolve(&filters, &topo()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_all_includes_load_balancer() {
        let targets = resolve(&["all"], &topo()).unwrap();
        assert_eq!(targets.len(), 6);
        let no_lb = Topology::new(1, 1, false);
        assert_eq!(resolve(&["all"], &no_lb).unwrap().len(), 2);
    }

    #[test]
    fn test_index_out_of_range() {
        let err = resolve(&["agent:7"], &topo()).unwrap_err();
        assert!(matches!(err, FilterError::NoSuchNode { .. }));
    }

    #[test]
    fn test_loadbalancer_when_disabled() {
        let no_lb = Topology::new(1, 0, false);
        assert!(resolve(&["loadbalancer"], &no_lb).unwrap().is_empty());
        assert!(matches!(
            resolve(&["loadbalancer:0"], &no_lb),
            Err(FilterError::NoSuchNode { .. })
        ));
    }

    #[test]
    fn test_to_filter_strings() {
        let t = topo();
        let targets = resolve(&["server:0,1", "agent:*", "loadbalancer"], &t).unwrap();
        assert_eq!(
            to_filter_strings(&targets, &t),
            vec!["server:0,1", "agent:*", "loadbalancer"]
        );
    }

    #[test]
    fn test_node_ref_display() {
        assert_eq!(NodeRef::new(NodeRole::Agent, 1).to_string(), "agent:1");
        assert_eq!(NodeRef::new(NodeRole::LoadBalancer, 0).to_string(), "loadbalancer");
    }
}
