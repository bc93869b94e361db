//! Report receiver integration tests
//!
//! Each test seeds a fresh database, feeds reports to the receiver and
//! checks the reconciled state.

use rstest::rstest;
use serde_json::json;

use deployd::models::{
    ClusterChange, ClusterMode, ClusterStatus, NewNode, NodeErrorType, NodeRole, NodeStatus,
    NotificationTopic, PendingChange, ReleaseState, TaskKind, TaskStatus,
};
use deployd::services::Disposition;
use deployd::utils::ReceiverError;

use crate::common::fixtures::*;
use crate::common::{TestApp, ADMIN_MAC};

// ============================================================================
// Report handling
// ============================================================================

#[tokio::test]
async fn test_report_for_unknown_task_is_rejected() {
    let app = TestApp::new().await;

    let result = app
        .handle(json!({
            "method": "deploy_resp",
            "args": {"task_uuid": "no-such-task", "status": "running", "progress": 10}
        }))
        .await;

    assert!(matches!(result, Err(ReceiverError::TaskNotFound(ref uuid)) if uuid == "no-such-task"));
}

#[tokio::test]
async fn test_report_for_finished_task_is_ignored() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let node = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Compute])).await;
    let task = create_task(app.db(), TaskKind::Deploy, Some(cluster.id)).await;

    app.apply(json!({
        "method": "deploy_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "nodes": [{"uid": node.id, "status": "ready", "progress": 100}]
        }
    }))
    .await;
    let finished = self::task(app.db(), &task.uuid).await;
    let notes_before = notifications(app.db()).await.len();

    let disposition = app
        .handle(json!({
            "method": "deploy_resp",
            "args": {
                "task_uuid": task.uuid,
                "status": "error",
                "error": "late failure",
                "nodes": [{"uid": node.id, "status": "error", "error_msg": "late"}]
            }
        }))
        .await
        .unwrap();

    assert_eq!(disposition, Disposition::Ignored);
    let after = self::task(app.db(), &task.uuid).await;
    assert_eq!(after.status, TaskStatus::Ready);
    assert_eq!(after.message, finished.message);
    assert_eq!(self::node(app.db(), node.id).await.status, NodeStatus::Ready);
    assert_eq!(notifications(app.db()).await.len(), notes_before);
}

#[tokio::test]
async fn test_failed_report_leaves_no_partial_state() {
    let app = TestApp::new().await;
    let task = create_task(app.db(), TaskKind::Deploy, None).await;

    let result = app
        .handle(json!({
            "method": "deploy_resp",
            "args": {"task_uuid": task.uuid, "status": "ready", "progress": 100}
        }))
        .await;

    assert!(matches!(result, Err(ReceiverError::ClusterNotFound(_))));
    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.progress, 0);
    assert!(notifications(app.db()).await.is_empty());
}

// ============================================================================
// Deployment and provisioning
// ============================================================================

#[tokio::test]
async fn test_deploy_progress_is_recalculated_from_nodes() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let n1 = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Controller])).await;
    let n2 = create_node(app.db(), deploying_node(cluster.id, "n2", vec![NodeRole::Compute])).await;
    let task = create_task(app.db(), TaskKind::Deploy, Some(cluster.id)).await;

    app.apply(json!({
        "method": "deploy_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "running",
            "nodes": [
                {"uid": n1.id, "status": "deploying", "progress": 40},
                {"uid": n2.id.to_string(), "progress": 60}
            ]
        }
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.progress, 50);
    assert_eq!(self::node(app.db(), n1.id).await.progress, 40);
    assert_eq!(self::node(app.db(), n2.id).await.progress, 60);
}

#[tokio::test]
async fn test_deploy_node_failure_is_notified_once() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let node = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Compute])).await;
    let task = create_task(app.db(), TaskKind::Deploy, Some(cluster.id)).await;

    let report = json!({
        "method": "deploy_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "running",
            "progress": 30,
            "nodes": [{"uid": node.id, "status": "error", "error_type": "deploy", "error_msg": "puppet failed"}]
        }
    });
    app.apply(report.clone()).await;
    app.apply(report).await;

    let node = self::node(app.db(), node.id).await;
    assert_eq!(node.status, NodeStatus::Error);
    assert_eq!(node.progress, 100);
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Error).await,
        vec!["Failed to deploy node 'n1': puppet failed".to_string()]
    );

    let stored = notifications(app.db()).await;
    assert_eq!(stored[0].node_id, Some(node.id));
    assert_eq!(stored[0].cluster_id, Some(cluster.id));
}

#[tokio::test]
async fn test_deploy_ready_with_failed_node_fails_task() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let n1 = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Controller])).await;
    let n2 = create_node(app.db(), deploying_node(cluster.id, "n2", vec![NodeRole::Compute])).await;
    mark_node_failed(app.db(), n2.id, NodeErrorType::Deploy, "disk full").await;
    let task = create_task(app.db(), TaskKind::Deploy, Some(cluster.id)).await;

    app.apply(json!({
        "method": "deploy_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "nodes": [{"uid": n1.id, "status": "ready", "progress": 100}]
        }
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(task.progress, 100);
    assert_eq!(
        task.message.as_deref(),
        Some("Deployment has failed. Check these nodes:\n'n2'")
    );
    assert_eq!(self::cluster(app.db(), cluster.id).await.status, ClusterStatus::Error);
}

#[tokio::test]
async fn test_deploy_error_uses_reported_error() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let task = create_task(app.db(), TaskKind::Deploy, Some(cluster.id)).await;

    app.apply(json!({
        "method": "deploy_resp",
        "args": {"task_uuid": task.uuid, "status": "error", "error": "orchestrator crashed"}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(
        task.message.as_deref(),
        Some("Deployment has failed. orchestrator crashed")
    );
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Error).await,
        vec!["Deployment has failed. orchestrator crashed".to_string()]
    );
}

#[tokio::test]
async fn test_deploy_success_points_at_controller_dashboard() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let controller = create_node(
        app.db(),
        NewNode {
            ip: Some("10.20.0.3".to_string()),
            ..deploying_node(cluster.id, "ctrl", vec![NodeRole::Controller])
        },
    )
    .await;
    assign_network_ip(app.db(), cluster.id, controller.id, "public", "172.16.0.2/24").await;
    let task = create_task(app.db(), TaskKind::Deploy, Some(cluster.id)).await;

    app.apply(json!({
        "method": "deploy_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "nodes": [{"uid": controller.id, "status": "ready", "progress": 100}]
        }
    }))
    .await;

    let expected = "Deployment of environment 'env' is done. Access the dashboard at \
                    http://172.16.0.2/ or via internal network at http://10.20.0.3/";
    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.message.as_deref(), Some(expected));
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Done).await,
        vec![expected.to_string()]
    );

    assert_eq!(
        self::cluster(app.db(), cluster.id).await.status,
        ClusterStatus::Operational
    );
    assert!(!self::node(app.db(), controller.id).await.pending_addition);
}

#[rstest]
#[case(Some("192.168.0.10"), "Deployment of environment 'ha' is done. Access the dashboard at http://192.168.0.10/")]
#[case(None, "Deployment of environment 'ha' is done")]
#[tokio::test]
async fn test_deploy_success_on_ha_cluster(#[case] vip: Option<&str>, #[case] expected: &str) {
    let app = TestApp::new().await;
    let cluster = create_ha_cluster(app.db(), "ha", vip).await;
    let task = create_task(app.db(), TaskKind::Deploy, Some(cluster.id)).await;

    app.apply(json!({
        "method": "deploy_resp",
        "args": {"task_uuid": task.uuid, "status": "ready", "progress": 100}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.message.as_deref(), Some(expected));
}

#[tokio::test]
async fn test_provision_error_node_gets_defaults() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let n1 = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Compute])).await;
    let n2 = create_node(app.db(), deploying_node(cluster.id, "n2", vec![NodeRole::Compute])).await;
    let task = create_task(app.db(), TaskKind::Provision, Some(cluster.id)).await;

    app.apply(json!({
        "method": "provision_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "running",
            "nodes": [
                {"uid": n1.id, "status": "error"},
                {"uid": n2.id, "status": "provisioning", "progress": 20}
            ]
        }
    }))
    .await;

    let n1 = self::node(app.db(), n1.id).await;
    assert_eq!(n1.status, NodeStatus::Error);
    assert_eq!(n1.progress, 100);
    assert_eq!(n1.error_type, Some(NodeErrorType::Provision));
    assert_eq!(n1.error_msg.as_deref(), Some("Unknown error"));

    let n2 = self::node(app.db(), n2.id).await;
    assert_eq!(n2.status, NodeStatus::Provisioning);
    assert_eq!(n2.progress, 20);

    assert_eq!(self::task(app.db(), &task.uuid).await.progress, 60);
}

#[tokio::test]
async fn test_provision_offline_node_is_failed() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let n1 = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Compute])).await;
    let task = create_task(app.db(), TaskKind::Provision, Some(cluster.id)).await;

    app.apply(json!({
        "method": "provision_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "running",
            "nodes": [{"uid": n1.id, "online": false, "progress": 30}]
        }
    }))
    .await;

    let n1 = self::node(app.db(), n1.id).await;
    assert!(!n1.online);
    assert_eq!(n1.progress, 100);
    assert_eq!(n1.error_msg.as_deref(), Some("Node is offline"));
    assert!(n1.is_failed());
}

#[tokio::test]
async fn test_provision_applies_reported_error_fields() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let n1 = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Compute])).await;
    let task = create_task(app.db(), TaskKind::Provision, Some(cluster.id)).await;

    app.apply(json!({
        "method": "provision_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "running",
            "nodes": [{"uid": n1.id, "status": "error", "error_type": "deploy", "error_msg": "disk full"}]
        }
    }))
    .await;

    let n1 = self::node(app.db(), n1.id).await;
    assert_eq!(n1.error_type, Some(NodeErrorType::Deploy));
    assert_eq!(n1.error_msg.as_deref(), Some("disk full"));
    assert_eq!(n1.progress, 100);
}

#[tokio::test]
async fn test_child_failure_fails_parent() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let parent = create_task(app.db(), TaskKind::Deploy, Some(cluster.id)).await;
    let child = insert_task(
        app.db(),
        deployd::models::NewTask::new(TaskKind::Provision, Some(cluster.id)).with_parent(parent.id),
    )
    .await;

    app.apply(json!({
        "method": "provision_resp",
        "args": {"task_uuid": child.uuid, "status": "error", "error": "image build failed"}
    }))
    .await;

    let parent = self::task(app.db(), &parent.uuid).await;
    assert_eq!(parent.status, TaskStatus::Error);
    assert_eq!(parent.progress, 100);
    assert_eq!(parent.message.as_deref(), Some("image build failed"));
    assert_eq!(self::cluster(app.db(), cluster.id).await.status, ClusterStatus::Error);
}

// ============================================================================
// Removal
// ============================================================================

#[tokio::test]
async fn test_remove_nodes_with_failed_node() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let removed = create_node(
        app.db(),
        NewNode {
            pending_deletion: true,
            ..deploying_node(cluster.id, "gone", vec![NodeRole::Compute])
        },
    )
    .await;
    let failed = create_node(
        app.db(),
        NewNode {
            pending_deletion: true,
            ..deploying_node(cluster.id, "stuck", vec![NodeRole::Compute])
        },
    )
    .await;
    let task = create_task(app.db(), TaskKind::RemoveNodes, Some(cluster.id)).await;

    app.apply(json!({
        "method": "remove_nodes_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "error",
            "progress": 100,
            "nodes": [{"uid": removed.id}],
            "error_nodes": [{"uid": failed.id}]
        }
    }))
    .await;

    assert!(get_node(app.db(), removed.id).await.is_none());

    let failed = self::node(app.db(), failed.id).await;
    assert!(!failed.pending_deletion);
    assert_eq!(failed.status, NodeStatus::Error);
    assert_eq!(failed.error_type, Some(NodeErrorType::Deletion));

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(
        task.message.as_deref(),
        Some("Successfully removed 1 node(s). Failed to remove 1 node(s): stuck")
    );
}

#[tokio::test]
async fn test_remove_nodes_skips_unknown_nodes() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let task = create_task(app.db(), TaskKind::RemoveNodes, Some(cluster.id)).await;

    app.apply(json!({
        "method": "remove_nodes_resp",
        "args": {"task_uuid": task.uuid, "status": "ready", "nodes": [{"uid": 4242}]}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(
        task.message.as_deref(),
        Some("No nodes were removed. No errors occurred")
    );
    assert!(notifications_of(app.db(), NotificationTopic::Done).await.is_empty());
}

#[tokio::test]
async fn test_redelivered_removal_report_notifies_once() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let removed = create_node(
        app.db(),
        NewNode {
            pending_deletion: true,
            ..deploying_node(cluster.id, "gone", vec![NodeRole::Compute])
        },
    )
    .await;
    let failed = create_node(
        app.db(),
        NewNode {
            pending_deletion: true,
            ..deploying_node(cluster.id, "stuck", vec![NodeRole::Compute])
        },
    )
    .await;
    let task = create_task(app.db(), TaskKind::RemoveNodes, Some(cluster.id)).await;

    let report = json!({
        "method": "remove_nodes_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "running",
            "progress": 50,
            "nodes": [{"uid": removed.id}],
            "error_nodes": [{"uid": failed.id}]
        }
    });
    app.apply(report.clone()).await;
    app.apply(report).await;

    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Done).await,
        vec!["Successfully removed 1 node(s)".to_string()]
    );
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Error).await,
        vec!["Failed to remove 1 node(s): stuck".to_string()]
    );

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(
        task.message.as_deref(),
        Some("No nodes were removed. Failed to remove 1 node(s): stuck")
    );
}

#[tokio::test]
async fn test_unnamed_failed_node_is_named_by_id() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let failed = create_node(
        app.db(),
        NewNode {
            pending_deletion: true,
            ..deploying_node(cluster.id, "", vec![NodeRole::Compute])
        },
    )
    .await;
    let task = create_task(app.db(), TaskKind::RemoveNodes, Some(cluster.id)).await;

    app.apply(json!({
        "method": "remove_nodes_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "error",
            "progress": 100,
            "error_nodes": [{"uid": failed.id}, {"uid": 4242}]
        }
    }))
    .await;

    let expected = format!("Failed to remove 2 node(s): ID: {}, ID: 4242", failed.id);
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Error).await,
        vec![expected]
    );
}

#[tokio::test]
async fn test_remove_cluster_ready_deletes_environment() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "doomed", ClusterMode::Multinode).await;
    let node = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Compute])).await;
    assign_network_ip(app.db(), cluster.id, node.id, "management", "192.168.0.2").await;
    let task = create_task(app.db(), TaskKind::RemoveCluster, Some(cluster.id)).await;

    app.apply(json!({
        "method": "remove_cluster_resp",
        "args": {"task_uuid": task.uuid, "status": "ready", "progress": 100, "nodes": [{"uid": node.id}]}
    }))
    .await;

    assert!(get_cluster(app.db(), cluster.id).await.is_none());
    assert!(get_node(app.db(), node.id).await.is_none());
    assert_eq!(self::task(app.db(), &task.uuid).await.status, TaskStatus::Ready);
    assert!(notifications_of(app.db(), NotificationTopic::Done)
        .await
        .contains(&"Environment 'doomed' and all its nodes are deleted".to_string()));
}

#[tokio::test]
async fn test_remove_cluster_error_lists_failed_nodes() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let node = create_node(
        app.db(),
        NewNode {
            pending_deletion: true,
            ..deploying_node(cluster.id, "n1", vec![NodeRole::Compute])
        },
    )
    .await;
    mark_node_failed(app.db(), node.id, NodeErrorType::Deletion, "ssh timeout").await;
    let task = create_task(app.db(), TaskKind::RemoveCluster, Some(cluster.id)).await;

    app.apply(json!({
        "method": "remove_cluster_resp",
        "args": {"task_uuid": task.uuid, "status": "error", "progress": 100}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(
        task.message.as_deref(),
        Some("Failed to delete nodes:\n'n1': ssh timeout")
    );
    assert_eq!(self::cluster(app.db(), cluster.id).await.status, ClusterStatus::Error);
}

// ============================================================================
// Stop and reset
// ============================================================================

#[tokio::test]
async fn test_stop_deployment_returns_nodes_to_discovery() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let node = create_node(
        app.db(),
        NewNode {
            pending_roles: vec![NodeRole::Controller],
            ..deploying_node(cluster.id, "n1", vec![])
        },
    )
    .await;
    let deploy = create_task(app.db(), TaskKind::Deploy, Some(cluster.id)).await;
    let stop = create_task(app.db(), TaskKind::StopDeployment, Some(cluster.id)).await;

    app.apply(json!({
        "method": "stop_deployment_resp",
        "args": {"task_uuid": stop.uuid, "status": "ready", "progress": 100, "nodes": [{"uid": node.id}]}
    }))
    .await;

    assert!(get_task(app.db(), &deploy.uuid).await.is_none());
    assert_eq!(self::cluster(app.db(), cluster.id).await.status, ClusterStatus::Stopped);

    let node = self::node(app.db(), node.id).await;
    assert_eq!(node.status, NodeStatus::Discover);
    assert!(!node.online);
    assert!(node.pending_addition);
    assert_eq!(node.roles, vec![NodeRole::Controller]);
    assert!(node.pending_roles.is_empty());

    let stop = self::task(app.db(), &stop.uuid).await;
    assert_eq!(stop.status, TaskStatus::Ready);
    assert_eq!(
        stop.message.as_deref(),
        Some("Deployment of environment 'env' was successfully stopped")
    );
}

#[tokio::test]
async fn test_stop_deployment_failure_is_notified() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let stop = create_task(app.db(), TaskKind::StopDeployment, Some(cluster.id)).await;

    app.apply(json!({
        "method": "stop_deployment_resp",
        "args": {"task_uuid": stop.uuid, "status": "error"}
    }))
    .await;

    assert_eq!(self::task(app.db(), &stop.uuid).await.status, TaskStatus::Error);
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Error).await,
        vec!["Unknown error".to_string()]
    );
}

#[tokio::test]
async fn test_reset_environment_marks_changes_and_warns_about_unreachable_nodes() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let reached = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Controller])).await;
    let unreachable = create_node(app.db(), deploying_node(cluster.id, "n2", vec![NodeRole::Compute])).await;
    let task = create_task(app.db(), TaskKind::ResetEnvironment, Some(cluster.id)).await;

    app.apply(json!({
        "method": "reset_environment_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "nodes": [{"uid": reached.id}],
            "inaccessible_nodes": [{"uid": unreachable.id}]
        }
    }))
    .await;

    assert_eq!(self::cluster(app.db(), cluster.id).await.status, ClusterStatus::New);

    let changes = pending_changes(app.db(), cluster.id).await;
    for expected in [
        ClusterChange { name: PendingChange::Attributes, node_id: None },
        ClusterChange { name: PendingChange::Networks, node_id: None },
        ClusterChange { name: PendingChange::Disks, node_id: Some(reached.id) },
        ClusterChange { name: PendingChange::Disks, node_id: Some(unreachable.id) },
    ] {
        assert!(changes.contains(&expected), "missing change {:?}", expected);
    }

    for id in [reached.id, unreachable.id] {
        assert_eq!(self::node(app.db(), id).await.status, NodeStatus::Discover);
    }

    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Warning).await,
        vec!["Couldn't reach these nodes during environment resetting: 'n2'. Manual check may be needed."
            .to_string()]
    );
    assert_eq!(
        self::task(app.db(), &task.uuid).await.message.as_deref(),
        Some("Environment 'env' was successfully reset")
    );
}

// ============================================================================
// Network verification
// ============================================================================

#[tokio::test]
async fn test_verify_networks_reports_absent_vlans() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let node = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Compute])).await;
    add_interface(app.db(), node.id, "eth0", "aa:aa:aa:aa:aa:01").await;
    let task = create_verify_task(app.db(), cluster.id, &[(node.id, "eth0", vec![1, 2, 3])]).await;

    app.apply(json!({
        "method": "verify_networks_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "nodes": [{"uid": node.id, "networks": [{"iface": "eth0", "vlans": [1, 2]}]}]
        }
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(
        task.result,
        json!([{
            "uid": node.id,
            "interface": "eth0",
            "absent_vlans": [3],
            "name": "n1",
            "mac": "aa:aa:aa:aa:aa:01"
        }])
    );
}

#[tokio::test]
async fn test_verify_networks_names_silent_nodes() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let a = create_node(app.db(), deploying_node(cluster.id, "node-a", vec![NodeRole::Compute])).await;
    let b = create_node(app.db(), deploying_node(cluster.id, "node-b", vec![NodeRole::Compute])).await;
    let task = create_verify_task(
        app.db(),
        cluster.id,
        &[(a.id, "eth0", vec![100]), (b.id, "eth0", vec![100])],
    )
    .await;

    app.apply(json!({
        "method": "verify_networks_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "nodes": [{"uid": a.id, "networks": [{"iface": "eth0", "vlans": [100]}]}]
        }
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(task.message.as_deref(), Some("Node(s) node-b didn't return data."));
}

#[tokio::test]
async fn test_verify_networks_clean_run_clears_result() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let node = create_node(app.db(), deploying_node(cluster.id, "n1", vec![NodeRole::Compute])).await;
    let task = create_verify_task(app.db(), cluster.id, &[(node.id, "eth1", vec![10, 20])]).await;

    app.apply(json!({
        "method": "verify_networks_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "nodes": [{"uid": node.id, "networks": [{"iface": "eth1", "vlans": [20, 10]}]}]
        }
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.result, json!([]));
    assert!(task.message.is_none());
}

#[tokio::test]
async fn test_verify_networks_malformed_nodes_fails_task() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let task = create_verify_task(app.db(), cluster.id, &[]).await;

    app.apply(json!({
        "method": "verify_networks_resp",
        "args": {"task_uuid": task.uuid, "status": "ready", "nodes": "garbage"}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(
        task.message.as_deref(),
        Some("verify_networks_resp: argument \"nodes\" have incorrect type")
    );
}

#[tokio::test]
async fn test_verify_networks_progress_only_update() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let task = create_verify_task(app.db(), cluster.id, &[]).await;

    app.apply(json!({
        "method": "verify_networks_resp",
        "args": {"task_uuid": task.uuid, "progress": 30}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.progress, 30);
}

#[tokio::test]
async fn test_check_dhcp_flags_foreign_server() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let node = create_node(app.db(), deploying_node(cluster.id, "node-1", vec![NodeRole::Compute])).await;
    let task = create_task(app.db(), TaskKind::CheckDhcp, Some(cluster.id)).await;

    app.apply(json!({
        "method": "check_dhcp_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "nodes": [{
                "uid": node.id.to_string(),
                "status": "ready",
                "data": [
                    {"iface": "eth0", "server_id": "10.20.0.2", "mac": ADMIN_MAC.to_uppercase()},
                    {"iface": "eth1", "server_id": "10.20.0.9", "mac": "de:ad:be:ef:00:01"}
                ]
            }]
        }
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    let message = task.message.unwrap_or_default();
    assert!(message.contains("node-1"));
    assert!(message.contains("de:ad:be:ef:00:01"));
    assert!(!message.contains("10.20.0.2"));

    let key = node.id.to_string();
    assert_eq!(task.result[&key].as_array().map(Vec::len), Some(1));
    assert_eq!(task.result[&key][0]["iface"], "eth1");
}

#[tokio::test]
async fn test_check_dhcp_only_master_answers() {
    let app = TestApp::new().await;
    let cluster = create_cluster(app.db(), "env", ClusterMode::Multinode).await;
    let node = create_node(app.db(), deploying_node(cluster.id, "node-1", vec![NodeRole::Compute])).await;
    let task = create_task(app.db(), TaskKind::CheckDhcp, Some(cluster.id)).await;

    app.apply(json!({
        "method": "check_dhcp_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "nodes": [{
                "uid": node.id,
                "status": "ready",
                "data": [{"iface": "eth0", "server_id": "10.20.0.2", "mac": ADMIN_MAC}]
            }]
        }
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.result, json!({}));
}

// ============================================================================
// Release pipeline
// ============================================================================

#[rstest]
#[case("check_redhat_credentials_resp", "Failed to check release credentials")]
#[case("redhat_check_licenses_resp", "Failed to check release licenses")]
#[tokio::test]
async fn test_release_check_unknown_error_uses_fallback(#[case] method: &str, #[case] fallback: &str) {
    let app = TestApp::new().await;
    let release = create_release(app.db(), "RHOS", ReleaseState::NotAvailable).await;
    let task = create_release_task(app.db(), TaskKind::RedhatCheck, release.id).await;

    app.apply(json!({
        "method": method,
        "args": {"task_uuid": task.uuid, "status": "error", "error": "Unknown error: exit 1"}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(task.message.as_deref(), Some(fallback));
    assert_eq!(task.result, json!({"release_info": {"release_id": release.id}}));
    assert_eq!(self::release(app.db(), release.id).await.state, ReleaseState::Error);
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Error).await,
        vec![fallback.to_string()]
    );
}

#[tokio::test]
async fn test_aborted_release_check_is_not_notified() {
    let app = TestApp::new().await;
    let release = create_release(app.db(), "RHOS", ReleaseState::NotAvailable).await;
    let task = create_release_task(app.db(), TaskKind::RedhatCheck, release.id).await;

    app.apply(json!({
        "method": "check_redhat_credentials_resp",
        "args": {"task_uuid": task.uuid, "status": "error", "error": "Task aborted"}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(task.message.as_deref(), Some("Task aborted"));
    assert!(notifications(app.db()).await.is_empty());
}

#[tokio::test]
async fn test_license_notice_is_forwarded() {
    let app = TestApp::new().await;
    let release = create_release(app.db(), "RHOS", ReleaseState::NotAvailable).await;
    let task = create_release_task(app.db(), TaskKind::RedhatCheck, release.id).await;

    app.apply(json!({
        "method": "redhat_check_licenses_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "msg": "Only 2 of 5 nodes are covered by licenses"
        }
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Error).await,
        vec!["Only 2 of 5 nodes are covered by licenses".to_string()]
    );
    assert_eq!(
        self::release(app.db(), release.id).await.state,
        ReleaseState::NotAvailable
    );
}

#[tokio::test]
async fn test_download_release_completes() {
    let app = TestApp::new().await;
    let release = create_release(app.db(), "RHOS", ReleaseState::Downloading).await;
    let task = create_release_task(app.db(), TaskKind::DownloadRelease, release.id).await;

    app.apply(json!({
        "method": "download_release_resp",
        "args": {"task_uuid": task.uuid, "status": "running", "progress": 50}
    }))
    .await;
    assert_eq!(
        self::release(app.db(), release.id).await.state,
        ReleaseState::Downloading
    );

    app.apply(json!({
        "method": "download_release_resp",
        "args": {"task_uuid": task.uuid, "status": "ready", "progress": 100}
    }))
    .await;

    assert_eq!(self::release(app.db(), release.id).await.state, ReleaseState::Available);
    assert_eq!(self::task(app.db(), &task.uuid).await.status, TaskStatus::Ready);
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Done).await,
        vec!["Successfully downloaded RHOS".to_string()]
    );
}

#[tokio::test]
async fn test_download_release_failure() {
    let app = TestApp::new().await;
    let release = create_release(app.db(), "RHOS", ReleaseState::Downloading).await;
    let task = create_release_task(app.db(), TaskKind::DownloadRelease, release.id).await;

    app.apply(json!({
        "method": "download_release_resp",
        "args": {"task_uuid": task.uuid, "status": "running", "error": "mirror unreachable"}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(
        task.message.as_deref(),
        Some("RHOS download and preparation has failed.")
    );
    assert_eq!(self::release(app.db(), release.id).await.state, ReleaseState::Error);
}

#[tokio::test]
async fn test_report_for_deleted_release_is_dropped() {
    let app = TestApp::new().await;
    let task = create_release_task(app.db(), TaskKind::DownloadRelease, 9999).await;

    let disposition = app
        .handle(json!({
            "method": "download_release_resp",
            "args": {"task_uuid": task.uuid, "status": "ready", "progress": 100}
        }))
        .await
        .unwrap();

    assert_eq!(disposition, Disposition::Dropped);
    assert_eq!(self::task(app.db(), &task.uuid).await.status, TaskStatus::Running);
}

#[tokio::test]
async fn test_release_task_without_release_info_is_malformed() {
    let app = TestApp::new().await;
    let task = create_task(app.db(), TaskKind::DownloadRelease, None).await;

    let result = app
        .handle(json!({
            "method": "download_release_resp",
            "args": {"task_uuid": task.uuid, "status": "ready", "progress": 100}
        }))
        .await;

    assert!(matches!(result, Err(ReceiverError::MalformedReport(_))));
}

// ============================================================================
// Environment dumps
// ============================================================================

#[tokio::test]
async fn test_dump_ready_exposes_download_url() {
    let app = TestApp::new().await;
    let task = create_task(app.db(), TaskKind::DumpEnvironment, None).await;

    app.apply(json!({
        "method": "dump_environment_resp",
        "args": {
            "task_uuid": task.uuid,
            "status": "ready",
            "progress": 100,
            "msg": "/var/dump/env-snapshot-2024.tar.xz"
        }
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.message.as_deref(), Some("/dump/env-snapshot-2024.tar.xz"));
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Done).await,
        vec!["Snapshot is ready. Visit Support page to download".to_string()]
    );
}

#[tokio::test]
async fn test_dump_error_is_notified() {
    let app = TestApp::new().await;
    let task = create_task(app.db(), TaskKind::DumpEnvironment, None).await;

    app.apply(json!({
        "method": "dump_environment_resp",
        "args": {"task_uuid": task.uuid, "status": "error", "error": "no space left on device"}
    }))
    .await;

    let task = self::task(app.db(), &task.uuid).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(task.progress, 100);
    assert_eq!(task.message.as_deref(), Some("no space left on device"));
    assert_eq!(
        notifications_of(app.db(), NotificationTopic::Error).await,
        vec!["no space left on device".to_string()]
    );
}
