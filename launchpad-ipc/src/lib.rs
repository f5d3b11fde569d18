//! Types for inspecting a running launchpad host.
//!
//! Everything here is plain data: snapshots of the task hierarchy and reports about finished
//! launch requests. The types serialize with serde so they can be printed as JSON or sent to a
//! monitoring tool.
//!
//! Snapshots are produced under the host lock and are immediately stale, they never feed back
//! into the host.
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

/// Kind of a node in the task hierarchy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Physical or virtual display.
    Display,
    /// Area of a display that owns root tasks.
    TaskDisplayArea,
    /// Task directly owned by a task display area.
    RootTask,
    /// Task nested in another task.
    Task,
    /// Sub-region of a task that owns activities.
    TaskFragment,
    /// Single presentable UI unit.
    Activity,
}

/// Lifecycle state of an activity as seen in a snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityStateSnapshot {
    /// Created, nothing shown yet.
    Initializing,
    /// Visible and receiving input.
    Resumed,
    /// Visible but not receiving input.
    Paused,
    /// Not visible.
    Stopped,
    /// Torn down.
    Destroyed,
}

/// Snapshot of one node and its subtree.
///
/// Children are ordered bottom to top, the same way they are stored in the hierarchy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    /// Kind of this node.
    pub kind: NodeKind,
    /// Human readable label: display id, task id or component name.
    pub label: String,
    /// Whether this node is on the focus path of the top focused display.
    pub focused: bool,
    /// Windowing mode name for root tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windowing_mode: Option<String>,
    /// Label of the adjacent task or task fragment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjacent: Option<String>,
    /// Activity details, set only for activity nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<ActivitySnapshot>,
    /// Child nodes, bottom to top.
    #[serde(default)]
    pub children: Vec<HierarchyNode>,
}

/// Activity-specific data of a [`HierarchyNode`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActivitySnapshot {
    /// Lifecycle state.
    pub state: ActivityStateSnapshot,
    /// Whether the host wants this activity visible.
    pub visible_requested: bool,
    /// Whether the activity is finishing.
    pub finishing: bool,
    /// Whether a backing process is attached.
    pub attached: bool,
}

/// Outcome of a single launch request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StartReport {
    /// Reason string given by the caller.
    pub reason: String,
    /// Internal result name.
    pub result: String,
    /// Platform numeric result code.
    pub code: i32,
    /// Whether the caller sees this as a successful start.
    pub external_success: bool,
    /// Component of the activity that was started or reused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
}

impl HierarchyNode {
    /// Returns an iterator over this node and all its descendants, depth first.
    pub fn iter(&self) -> impl Iterator<Item = &HierarchyNode> + '_ {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Returns the number of activity nodes in this subtree.
    pub fn activity_count(&self) -> usize {
        self.iter()
            .filter(|node| node.kind == NodeKind::Activity)
            .count()
    }
}
