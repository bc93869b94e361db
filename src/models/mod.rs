//! Data models

mod cluster;
mod node;
mod notification;
mod release;
pub mod report;
mod task;

pub use cluster::*;
pub use node::*;
pub use notification::*;
pub use release::*;
pub use report::{
    CheckDhcpReport, DeploymentReport, DhcpNodeReport, DhcpProbeRow, MessageReport,
    NetworkNodeReport, NodeRef, NodeReport, RemovalReport, ReportHeader, ReportedNetwork,
    ReportedNodes, ResetReport, RpcReport, VerifyNetworksReport,
};
pub use task::*;
