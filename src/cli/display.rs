//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use serde::Serialize;

use super::commands::{CommandError, CommandResult};
use crate::identity::ResourceIdentity;
use crate::pipeline::Outcome;
use crate::spec::ClusterSpec;

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();
    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            output.push_str("   ");
        }
        output.push_str(&format!(
            "{:width$}",
            header.to_uppercase(),
            width = widths[i]
        ));
    }
    output.push('\n');

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str("   ");
            }
            if i < widths.len() {
                output.push_str(&format!("{:width$}", cell, width = widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }

    output
}

// ============================================================================
// Resource output
// ============================================================================

pub fn format_yaml<T: Serialize>(value: &T) -> CommandResult<String> {
    serde_yaml::to_string(value).map_err(|e| CommandError::Output(e.to_string()))
}

/// Identity, attributes and warnings of an operation, as YAML
pub fn format_outcome<T: Serialize>(outcome: &Outcome<T>) -> CommandResult<String> {
    format_yaml(outcome)
}

pub fn format_deleted(id: &ResourceIdentity) -> String {
    format!("Deleted {}\n", id)
}

fn join_or_dash(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(",")
    }
}

/// Summary of a resolved cluster with one row per node
pub fn format_plan_table(spec: &ClusterSpec) -> String {
    let mut output = format!("Cluster:  {} ({})\n", spec.name, spec.identity);
    output.push_str(&format!("Image:    {}\n", spec.image));
    if let Some(network) = &spec.network {
        let owner = if network.external { "existing" } else { "managed" };
        output.push_str(&format!("Network:  {} ({})\n", network.name, owner));
    }
    output.push_str(&format!(
        "API:      {}:{}\n\n",
        spec.kube_api
            .host_ip
            .as_deref()
            .or(spec.kube_api.host.as_deref())
            .unwrap_or("0.0.0.0"),
        spec.kube_api.host_port
    ));

    let headers = &["NAME", "ROLE", "MEMORY", "PORTS", "VOLUMES", "ENV", "ARGS"];
    let rows: Vec<Vec<String>> = spec
        .nodes
        .iter()
        .map(|node| {
            vec![
                node.name.clone(),
                node.node.role.to_string(),
                node.memory.clone().unwrap_or_else(|| "-".to_string()),
                join_or_dash(&node.ports),
                join_or_dash(&node.volumes),
                join_or_dash(&node.env),
                join_or_dash(&node.args),
            ]
        })
        .collect();

    output.push_str(&format_table(headers, rows));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{derive_id, ResourceKind};

    #[test]
    fn test_format_table_alignment() {
        let out = format_table(
            &["name", "role"],
            vec![
                vec!["k3d-bar-server-0".to_string(), "server".to_string()],
                vec!["k3d-bar-serverlb".to_string(), "loadbalancer".to_string()],
            ],
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("NAME"));
        assert_eq!(lines[0].find("ROLE"), Some(19));
        assert_eq!(lines[1].rfind("server"), Some(19));
        assert_eq!(lines[2].find("loadbalancer"), Some(19));
    }

    #[test]
    fn test_format_table_empty() {
        assert_eq!(format_table(&["name"], vec![]), "No resources found.\n");
    }

    #[test]
    fn test_format_outcome_omits_empty_warnings() {
        let outcome = Outcome::new(derive_id(ResourceKind::Registry, "cache"), "value");
        let out = format_outcome(&outcome).unwrap();
        assert!(out.contains("id: k3d-cache"));
        assert!(!out.contains("warnings"));
    }

    #[test]
    fn test_format_deleted() {
        assert_eq!(
            format_deleted(&derive_id(ResourceKind::Node, "extra")),
            "Deleted k3d-extra\n"
        );
    }
}
