//! Outcome policy
//!
//! Shared rules for turning node-level results into task-level outcomes:
//! aggregate error messages, inaccessible-node warnings and detection of
//! nodes that never answered.

use std::collections::{BTreeSet, HashSet};

use tracing::warn;

use crate::db::UnitOfWork;
use crate::models::{NewNotification, Node, NodeErrorType, NodeId};

/// Fallback text wherever an error has no better description
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// How failed nodes are listed in an aggregate error message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorListFormat {
    /// `'name': message`, one node per line
    Detailed,
    /// `'name'`, comma separated
    NamesOnly,
}

/// Format failed nodes into one message
///
/// Nothing to list yields [`UNKNOWN_ERROR`].
pub fn format_node_errors(nodes: &[Node], format: ErrorListFormat) -> String {
    if nodes.is_empty() {
        return UNKNOWN_ERROR.to_string();
    }

    match format {
        ErrorListFormat::Detailed => nodes
            .iter()
            .map(|node| {
                format!(
                    "'{}': {}",
                    node.name,
                    node.error_msg.as_deref().unwrap_or(UNKNOWN_ERROR)
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ErrorListFormat::NamesOnly => nodes
            .iter()
            .map(|node| format!("'{}'", node.name))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Aggregate error message for a cluster's failed nodes
///
/// A node is included when it is in error or offline and its error type is
/// one of `error_types`.
pub async fn compose_node_errors(
    uow: &mut UnitOfWork,
    cluster_id: i64,
    error_types: &[NodeErrorType],
    format: ErrorListFormat,
) -> Result<String, sqlx::Error> {
    let failed = uow.nodes().failed_in_cluster(cluster_id, error_types).await?;
    Ok(format_node_errors(&failed, format))
}

pub fn inaccessible_message(action: &str, names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|name| format!("'{}'", name)).collect();
    format!(
        "Couldn't reach these nodes during {}: {}. Manual check may be needed.",
        action,
        quoted.join(", ")
    )
}

/// Warn that some of a cluster's nodes did not answer during `action`
pub async fn notify_inaccessible(
    uow: &mut UnitOfWork,
    cluster_id: i64,
    uids: &[NodeId],
    action: &str,
) -> Result<(), sqlx::Error> {
    let names: Vec<String> = uow
        .nodes()
        .get_many(uids)
        .await?
        .into_iter()
        .filter(|node| node.cluster_id == Some(cluster_id))
        .map(|node| node.name)
        .collect();

    let message = inaccessible_message(action, &names);
    warn!(cluster_id, action, "{}", message);
    uow.notify(NewNotification::warning(message).for_cluster(Some(cluster_id)))
        .await
}

/// Nodes expected to answer that are missing from the answers, sorted
pub fn forgotten_nodes(
    expected: impl IntoIterator<Item = NodeId>,
    answered: impl IntoIterator<Item = NodeId>,
) -> Vec<NodeId> {
    let answered: HashSet<NodeId> = answered.into_iter().collect();
    expected
        .into_iter()
        .filter(|uid| !answered.contains(uid))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
