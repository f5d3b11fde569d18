//! Task hierarchy stored in a slotmap arena.
//!
//! The hierarchy is a forest of displays:
//! - a display owns task display areas, the first one being the default area,
//! - a task display area owns root tasks,
//! - a task owns nested tasks, task fragments or activities,
//! - a task fragment owns activities.
//!
//! Children are kept in z-order, bottom first. Every node lives in one `SlotMap` and refers to
//! its relatives by [`NodeKey`], so removing a subtree through [`Hierarchy::remove`] never
//! leaves a dangling parent, child or adjacency link behind.

use std::fmt;
use std::fmt::Write as _;

use launchpad_ipc::{ActivitySnapshot, HierarchyNode, NodeKind};
use slotmap::{new_key_type, SlotMap};

pub use self::activity::{ActivityRecord, ActivityState, ConfigChanges};
use crate::intent::{ActivityType, ComponentName, UserId, VoiceSession};
use crate::utils::Rect;

mod activity;


// ============================================================================
// Keys and identifiers
// ============================================================================

new_key_type! {
    /// Key of a node in the hierarchy.
    pub struct NodeKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(pub u32);

impl DisplayId {
    pub const DEFAULT: DisplayId = DisplayId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub i32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Node types
// ============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowingMode {
    /// Inherit from the parent task.
    #[default]
    Undefined,
    Fullscreen,
    SplitPrimary,
    SplitSecondary,
    Pinned,
    Freeform,
}

impl WindowingMode {
    pub fn is_split(self) -> bool {
        matches!(self, Self::SplitPrimary | Self::SplitSecondary)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Fullscreen => "fullscreen",
            Self::SplitPrimary => "split-primary",
            Self::SplitSecondary => "split-secondary",
            Self::Pinned => "pinned",
            Self::Freeform => "freeform",
        }
    }
}

/// Where a child goes among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Top,
    Bottom,
    /// Index counted from the bottom, clamped to the number of siblings.
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("node {0:?} does not exist")]
    MissingNode(NodeKey),
    #[error("a {child} cannot be placed in a {parent}")]
    InvalidParent {
        parent: &'static str,
        child: &'static str,
    },
    #[error("node {0:?} already has a parent")]
    AlreadyAttached(NodeKey),
    #[error("node {0:?} would become its own ancestor")]
    Cycle(NodeKey),
    #[error("display already has a pinned root task")]
    PinnedRootTaskExists,
    #[error("pinned root task already hosts a task")]
    PinnedRootTaskFull,
    #[error("node {0:?} cannot be made adjacent")]
    InvalidAdjacency(NodeKey),
}

#[derive(Debug)]
pub struct Node {
    parent: Option<NodeKey>,
    /// Children in z-order, bottom first.
    children: Vec<NodeKey>,
    data: NodeData,
}

impl Node {
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }
}

#[derive(Debug)]
pub enum NodeData {
    Display(DisplayData),
    TaskDisplayArea(TaskDisplayAreaData),
    Task(TaskData),
    TaskFragment(TaskFragmentData),
    Activity(ActivityRecord),
}

impl NodeData {
    fn kind_name(&self) -> &'static str {
        match self {
            NodeData::Display(_) => "display",
            NodeData::TaskDisplayArea(_) => "task display area",
            NodeData::Task(_) => "task",
            NodeData::TaskFragment(_) => "task fragment",
            NodeData::Activity(_) => "activity",
        }
    }

    fn can_contain(&self, child: &NodeData) -> bool {
        matches!(
            (self, child),
            (NodeData::Display(_), NodeData::TaskDisplayArea(_))
                | (NodeData::TaskDisplayArea(_), NodeData::Task(_))
                | (
                    NodeData::Task(_),
                    NodeData::Task(_) | NodeData::TaskFragment(_) | NodeData::Activity(_)
                )
                | (NodeData::TaskFragment(_), NodeData::Activity(_))
        )
    }
}

#[derive(Debug)]
pub struct DisplayData {
    pub id: DisplayId,
    pub bounds: Rect,
}

#[derive(Debug)]
pub struct TaskDisplayAreaData {
    pub name: String,
}

#[derive(Debug)]
pub struct TaskData {
    pub id: TaskId,
    pub affinity: Option<String>,
    pub user_id: UserId,
    /// Component of the activity that created the task.
    pub root_component: Option<ComponentName>,
    pub windowing_mode: WindowingMode,
    pub activity_type: ActivityType,
    /// `None` fills the parent.
    pub bounds: Option<Rect>,
    pub voice_session: Option<VoiceSession>,
    adjacent: Option<NodeKey>,
}

#[derive(Debug)]
pub struct TaskFragmentData {
    /// `None` fills the parent.
    pub bounds: Option<Rect>,
    adjacent: Option<NodeKey>,
}

/// Parameters of a new task.
#[derive(Debug, Default, Clone)]
pub struct TaskSpec {
    pub affinity: Option<String>,
    pub user_id: UserId,
    pub root_component: Option<ComponentName>,
    pub windowing_mode: WindowingMode,
    pub activity_type: ActivityType,
    pub bounds: Option<Rect>,
    pub voice_session: Option<VoiceSession>,
}

#[derive(Debug)]
pub struct Hierarchy {
    nodes: SlotMap<NodeKey, Node>,
    /// Displays in z-order, the last one is the top focused display.
    displays: Vec<NodeKey>,
    next_task_id: i32,
}

// ============================================================================
// Node access
// ============================================================================

impl Hierarchy {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            displays: Vec::new(),
            next_task_id: 1,
        }
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(key)?.parent
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.nodes.get(key).map_or(&[], |node| &node.children)
    }

    pub fn activity(&self, key: NodeKey) -> Option<&ActivityRecord> {
        match &self.nodes.get(key)?.data {
            NodeData::Activity(record) => Some(record),
            _ => None,
        }
    }

    pub fn activity_mut(&mut self, key: NodeKey) -> Option<&mut ActivityRecord> {
        match &mut self.nodes.get_mut(key)?.data {
            NodeData::Activity(record) => Some(record),
            _ => None,
        }
    }

    pub fn task(&self, key: NodeKey) -> Option<&TaskData> {
        match &self.nodes.get(key)?.data {
            NodeData::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn task_mut(&mut self, key: NodeKey) -> Option<&mut TaskData> {
        match &mut self.nodes.get_mut(key)?.data {
            NodeData::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn task_fragment(&self, key: NodeKey) -> Option<&TaskFragmentData> {
        match &self.nodes.get(key)?.data {
            NodeData::TaskFragment(fragment) => Some(fragment),
            _ => None,
        }
    }

    pub fn display_data(&self, key: NodeKey) -> Option<&DisplayData> {
        match &self.nodes.get(key)?.data {
            NodeData::Display(display) => Some(display),
            _ => None,
        }
    }

    pub fn is_activity(&self, key: NodeKey) -> bool {
        self.activity(key).is_some()
    }

    pub fn is_task(&self, key: NodeKey) -> bool {
        self.task(key).is_some()
    }

    /// Tasks and task fragments both host activities and take part in occlusion.
    pub fn is_fragment_like(&self, key: NodeKey) -> bool {
        matches!(
            self.nodes.get(key).map(|node| &node.data),
            Some(NodeData::Task(_) | NodeData::TaskFragment(_))
        )
    }

    pub fn is_root_task(&self, key: NodeKey) -> bool {
        self.is_task(key)
            && matches!(
                self.parent(key).and_then(|parent| self.nodes.get(parent)),
                Some(Node {
                    data: NodeData::TaskDisplayArea(_),
                    ..
                })
            )
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Hierarchy {
    /// Adds a display on top of the others, together with its default task display area.
    pub fn add_display(&mut self, id: DisplayId, bounds: Rect) -> NodeKey {
        if let Some(existing) = self.display(id) {
            warn!("display {id:?} already exists");
            return existing;
        }

        let display = self.insert_detached(NodeData::Display(DisplayData { id, bounds }));
        self.displays.push(display);

        let area = self.insert_detached(NodeData::TaskDisplayArea(TaskDisplayAreaData {
            name: String::from("DefaultTaskDisplayArea"),
        }));
        self.link(display, area, Position::Top);

        debug!("added display {id:?} {bounds}");
        display
    }

    pub fn create_root_task(
        &mut self,
        area: NodeKey,
        windowing_mode: WindowingMode,
        activity_type: ActivityType,
        position: Position,
    ) -> Result<NodeKey, HierarchyError> {
        let windowing_mode = match windowing_mode {
            WindowingMode::Undefined => WindowingMode::Fullscreen,
            mode => mode,
        };
        let spec = TaskSpec {
            windowing_mode,
            activity_type,
            ..Default::default()
        };
        self.create_task(area, spec, position)
    }

    pub fn create_task(
        &mut self,
        parent: NodeKey,
        spec: TaskSpec,
        position: Position,
    ) -> Result<NodeKey, HierarchyError> {
        let id = TaskId(self.next_task_id);
        let key = self.insert_detached(NodeData::Task(TaskData {
            id,
            affinity: spec.affinity,
            user_id: spec.user_id,
            root_component: spec.root_component,
            windowing_mode: spec.windowing_mode,
            activity_type: spec.activity_type,
            bounds: spec.bounds,
            voice_session: spec.voice_session,
            adjacent: None,
        }));

        if let Err(err) = self.attach(parent, key, position) {
            self.nodes.remove(key);
            return Err(err);
        }

        self.next_task_id += 1;
        Ok(key)
    }

    pub fn create_task_fragment(
        &mut self,
        task: NodeKey,
        bounds: Option<Rect>,
        position: Position,
    ) -> Result<NodeKey, HierarchyError> {
        let key = self.insert_detached(NodeData::TaskFragment(TaskFragmentData {
            bounds,
            adjacent: None,
        }));

        if let Err(err) = self.attach(task, key, position) {
            self.nodes.remove(key);
            return Err(err);
        }

        Ok(key)
    }

    /// Creates an activity node without a parent.
    ///
    /// The node must be attached with [`Hierarchy::attach`] or dropped with
    /// [`Hierarchy::remove`].
    pub fn create_activity(&mut self, record: ActivityRecord) -> NodeKey {
        self.insert_detached(NodeData::Activity(record))
    }

    pub fn add_activity(
        &mut self,
        parent: NodeKey,
        record: ActivityRecord,
        position: Position,
    ) -> Result<NodeKey, HierarchyError> {
        let key = self.create_activity(record);
        if let Err(err) = self.attach(parent, key, position) {
            self.nodes.remove(key);
            return Err(err);
        }
        Ok(key)
    }

    /// Creates two adjacent root tasks splitting the area's display in halves.
    pub fn create_split_pair(
        &mut self,
        area: NodeKey,
    ) -> Result<(NodeKey, NodeKey), HierarchyError> {
        let bounds = self.bounds(area);

        let secondary = self.create_task(
            area,
            TaskSpec {
                windowing_mode: WindowingMode::SplitSecondary,
                bounds: Some(bounds.right_half()),
                ..Default::default()
            },
            Position::Top,
        )?;
        let primary = self.create_task(
            area,
            TaskSpec {
                windowing_mode: WindowingMode::SplitPrimary,
                bounds: Some(bounds.left_half()),
                ..Default::default()
            },
            Position::Top,
        )?;
        self.set_adjacent(primary, secondary)?;

        Ok((primary, secondary))
    }

    fn insert_detached(&mut self, data: NodeData) -> NodeKey {
        self.nodes.insert(Node {
            parent: None,
            children: Vec::new(),
            data,
        })
    }
}

// ============================================================================
// Structure mutation
// ============================================================================

impl Hierarchy {
    /// Attaches a parentless node under `parent`.
    pub fn attach(
        &mut self,
        parent: NodeKey,
        child: NodeKey,
        position: Position,
    ) -> Result<(), HierarchyError> {
        let parent_node = self
            .nodes
            .get(parent)
            .ok_or(HierarchyError::MissingNode(parent))?;
        let child_node = self
            .nodes
            .get(child)
            .ok_or(HierarchyError::MissingNode(child))?;

        if child_node.parent.is_some() {
            return Err(HierarchyError::AlreadyAttached(child));
        }
        if !parent_node.data.can_contain(&child_node.data) {
            return Err(HierarchyError::InvalidParent {
                parent: parent_node.data.kind_name(),
                child: child_node.data.kind_name(),
            });
        }
        if parent == child || self.is_descendant_of(parent, child) {
            return Err(HierarchyError::Cycle(child));
        }

        if let NodeData::Task(task) = &child_node.data {
            if task.windowing_mode == WindowingMode::Pinned
                && matches!(parent_node.data, NodeData::TaskDisplayArea(_))
            {
                let display = self.display_of(parent);
                let has_pinned = display.is_some_and(|display| {
                    self.root_tasks(display)
                        .into_iter()
                        .any(|root| self.windowing_mode(root) == WindowingMode::Pinned)
                });
                if has_pinned {
                    return Err(HierarchyError::PinnedRootTaskExists);
                }
            }
        }

        if matches!(child_node.data, NodeData::Task(_))
            && self.is_root_task(parent)
            && self.windowing_mode(parent) == WindowingMode::Pinned
            && self.children(parent).iter().any(|&key| self.is_task(key))
        {
            return Err(HierarchyError::PinnedRootTaskFull);
        }

        self.link(parent, child, position);
        Ok(())
    }

    fn link(&mut self, parent: NodeKey, child: NodeKey, position: Position) {
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return;
        };
        let idx = match position {
            Position::Top => parent_node.children.len(),
            Position::Bottom => 0,
            Position::Index(idx) => idx.min(parent_node.children.len()),
        };
        parent_node.children.insert(idx, child);

        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.parent = Some(parent);
        }
    }

    /// Unlinks a node from its parent, keeping its subtree intact.
    pub fn detach(&mut self, child: NodeKey) -> Result<(), HierarchyError> {
        let node = self
            .nodes
            .get_mut(child)
            .ok_or(HierarchyError::MissingNode(child))?;
        let Some(parent) = node.parent.take() else {
            return Ok(());
        };

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|&key| key != child);
        }
        Ok(())
    }

    pub fn reparent(
        &mut self,
        child: NodeKey,
        new_parent: NodeKey,
        position: Position,
    ) -> Result<(), HierarchyError> {
        let old_parent = self.parent(child);
        let old_idx = old_parent.and_then(|parent| {
            self.children(parent)
                .iter()
                .position(|&key| key == child)
        });

        self.detach(child)?;
        if let Err(err) = self.attach(new_parent, child, position) {
            if let (Some(parent), Some(idx)) = (old_parent, old_idx) {
                self.link(parent, child, Position::Index(idx));
            }
            return Err(err);
        }

        Ok(())
    }

    /// Moves a node among its siblings.
    pub fn position_child(
        &mut self,
        child: NodeKey,
        position: Position,
    ) -> Result<(), HierarchyError> {
        let parent = self
            .nodes
            .get(child)
            .ok_or(HierarchyError::MissingNode(child))?
            .parent;
        let Some(parent) = parent else {
            return Ok(());
        };

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|&key| key != child);
        }
        self.link(parent, child, position);
        Ok(())
    }

    /// Removes a node and its whole subtree. Returns the number of removed nodes.
    pub fn remove(&mut self, key: NodeKey) -> usize {
        if !self.nodes.contains_key(key) {
            return 0;
        }

        let _ = self.detach(key);

        let mut stack = vec![key];
        let mut removed = 0;
        while let Some(current) = stack.pop() {
            self.clear_adjacent(current);
            self.displays.retain(|&display| display != current);

            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
                removed += 1;
            }
        }

        removed
    }

    /// Links two tasks or task fragments as adjacent. Any previous links of either side are
    /// cleared.
    pub fn set_adjacent(&mut self, a: NodeKey, b: NodeKey) -> Result<(), HierarchyError> {
        if a == b {
            return Err(HierarchyError::InvalidAdjacency(a));
        }
        for key in [a, b] {
            if !self.is_fragment_like(key) {
                return Err(HierarchyError::InvalidAdjacency(key));
            }
        }

        self.clear_adjacent(a);
        self.clear_adjacent(b);
        self.set_adjacent_field(a, Some(b));
        self.set_adjacent_field(b, Some(a));
        Ok(())
    }

    /// Clears the adjacency of `key` and of its partner.
    pub fn clear_adjacent(&mut self, key: NodeKey) {
        if let Some(other) = self.adjacent(key) {
            self.set_adjacent_field(other, None);
        }
        self.set_adjacent_field(key, None);
    }

    pub fn adjacent(&self, key: NodeKey) -> Option<NodeKey> {
        match &self.nodes.get(key)?.data {
            NodeData::Task(task) => task.adjacent,
            NodeData::TaskFragment(fragment) => fragment.adjacent,
            _ => None,
        }
    }

    fn set_adjacent_field(&mut self, key: NodeKey, value: Option<NodeKey>) {
        match self.nodes.get_mut(key).map(|node| &mut node.data) {
            Some(NodeData::Task(task)) => task.adjacent = value,
            Some(NodeData::TaskFragment(fragment)) => fragment.adjacent = value,
            _ => (),
        }
    }

    pub fn move_display_to_top(&mut self, display: NodeKey) -> bool {
        if self.displays.last() == Some(&display) || !self.displays.contains(&display) {
            return false;
        }

        self.displays.retain(|&key| key != display);
        self.displays.push(display);
        true
    }

    /// Raises `key` and every ancestor up to its root task to the top of their siblings, then
    /// raises the display. Returns whether anything moved.
    pub fn move_task_to_front(&mut self, key: NodeKey) -> bool {
        let mut changed = false;
        let mut current = key;

        while let Some(parent) = self.parent(current) {
            if self.children(parent).last() != Some(&current) {
                let _ = self.position_child(current, Position::Top);
                changed = true;
            }

            if !self.is_fragment_like(parent) {
                break;
            }
            current = parent;
        }

        if let Some(display) = self.display_of(key) {
            changed |= self.move_display_to_top(display);
        }

        changed
    }
}

// ============================================================================
// Navigation
// ============================================================================

impl Hierarchy {
    /// Displays in z-order, bottom first.
    pub fn displays(&self) -> &[NodeKey] {
        &self.displays
    }

    pub fn display(&self, id: DisplayId) -> Option<NodeKey> {
        self.displays
            .iter()
            .copied()
            .find(|&key| self.display_data(key).is_some_and(|data| data.id == id))
    }

    pub fn display_id(&self, display: NodeKey) -> Option<DisplayId> {
        self.display_data(display).map(|data| data.id)
    }

    pub fn top_focused_display(&self) -> Option<NodeKey> {
        self.displays.last().copied()
    }

    pub fn default_task_display_area(&self, display: NodeKey) -> Option<NodeKey> {
        self.display_data(display)?;
        self.children(display).first().copied()
    }

    /// Strict ancestors of `key`, nearest first.
    pub fn ancestors(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        let mut current = self.parent(key);
        std::iter::from_fn(move || {
            let key = current?;
            current = self.parent(key);
            Some(key)
        })
    }

    pub fn is_descendant_of(&self, key: NodeKey, ancestor: NodeKey) -> bool {
        self.ancestors(key).any(|key| key == ancestor)
    }

    fn self_and_ancestors(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.contains(key)
            .then_some(key)
            .into_iter()
            .chain(self.ancestors(key))
    }

    pub fn display_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.self_and_ancestors(key)
            .find(|&key| self.display_data(key).is_some())
    }

    pub fn task_display_area_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.self_and_ancestors(key).find(|&key| {
            matches!(
                self.nodes.get(key).map(|node| &node.data),
                Some(NodeData::TaskDisplayArea(_))
            )
        })
    }

    pub fn root_task_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.self_and_ancestors(key)
            .find(|&key| self.is_root_task(key))
    }

    /// Nearest task containing `key`, or `key` itself when it is a task.
    pub fn task_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.self_and_ancestors(key).find(|&key| self.is_task(key))
    }

    /// Root tasks of every task display area of `display`, topmost first.
    pub fn root_tasks(&self, display: NodeKey) -> Vec<NodeKey> {
        let mut roots = Vec::new();
        for &area in self.children(display).iter().rev() {
            roots.extend(
                self.children(area)
                    .iter()
                    .rev()
                    .copied()
                    .filter(|&key| self.is_task(key)),
            );
        }
        roots
    }

    /// Tasks under `root` (inclusive) that have no nested tasks, topmost first.
    pub fn leaf_tasks(&self, root: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        self.collect_leaf_tasks(root, &mut out);
        out
    }

    fn collect_leaf_tasks(&self, key: NodeKey, out: &mut Vec<NodeKey>) {
        if !self.is_task(key) {
            return;
        }

        let child_tasks: Vec<_> = self
            .children(key)
            .iter()
            .rev()
            .copied()
            .filter(|&child| self.is_task(child))
            .collect();
        if child_tasks.is_empty() {
            out.push(key);
        } else {
            for child in child_tasks {
                self.collect_leaf_tasks(child, out);
            }
        }
    }

    /// Topmost leaf task of `root`.
    pub fn top_most_task(&self, root: NodeKey) -> Option<NodeKey> {
        self.leaf_tasks(root).first().copied()
    }

    fn find_activity_from_top(
        &self,
        key: NodeKey,
        pred: &mut dyn FnMut(NodeKey, &ActivityRecord) -> bool,
    ) -> Option<NodeKey> {
        let node = self.nodes.get(key)?;
        if let NodeData::Activity(record) = &node.data {
            return pred(key, record).then_some(key);
        }

        for &child in node.children.iter().rev() {
            if let Some(found) = self.find_activity_from_top(child, pred) {
                return Some(found);
            }
        }
        None
    }

    /// Every activity in the subtree of `key`, topmost first.
    pub fn activities(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        self.find_activity_from_top(key, &mut |key, _| {
            out.push(key);
            false
        });
        out
    }

    pub fn top_running_activity(&self, key: NodeKey) -> Option<NodeKey> {
        self.find_activity_from_top(key, &mut |_, record| record.is_running())
    }

    pub fn has_running_activity(&self, key: NodeKey) -> bool {
        self.top_running_activity(key).is_some()
    }

    /// Topmost running instance of `component` inside `container`.
    pub fn find_activity_in(&self, container: NodeKey, component: &ComponentName) -> Option<NodeKey> {
        self.find_activity_from_top(container, &mut |_, record| {
            record.is_running() && record.component() == component
        })
    }

    /// Topmost running instance of `component` for `user` on any display.
    pub fn find_activity(&self, component: &ComponentName, user: UserId) -> Option<NodeKey> {
        self.displays.iter().rev().find_map(|&display| {
            self.root_tasks(display).into_iter().find_map(|root| {
                self.find_activity_from_top(root, &mut |_, record| {
                    record.is_running()
                        && record.user_id == user
                        && record.component() == component
                })
            })
        })
    }

    /// Finds a task to reuse for a launch of `component`.
    ///
    /// A task created by the same component wins; otherwise the topmost task with the same
    /// affinity is returned. Pinned tasks and tasks without running activities are skipped.
    pub fn find_task(
        &self,
        component: &ComponentName,
        affinity: &str,
        user: UserId,
    ) -> Option<NodeKey> {
        let mut affinity_match = None;

        for &display in self.displays.iter().rev() {
            for root in self.root_tasks(display) {
                if self.windowing_mode(root) == WindowingMode::Pinned {
                    continue;
                }

                for task in self.leaf_tasks(root) {
                    let Some(data) = self.task(task) else {
                        continue;
                    };
                    if data.user_id != user || !self.has_running_activity(task) {
                        continue;
                    }

                    if data.root_component.as_ref() == Some(component) {
                        return Some(task);
                    }
                    if affinity_match.is_none() && data.affinity.as_deref() == Some(affinity) {
                        affinity_match = Some(task);
                    }
                }
            }
        }

        affinity_match
    }

    /// The root task holding focus on `display`: the topmost non-pinned root task with a running
    /// activity, or the topmost non-pinned root task if none has one.
    pub fn focused_root_task(&self, display: NodeKey) -> Option<NodeKey> {
        let roots = self.root_tasks(display);
        let focusable = |&root: &NodeKey| self.windowing_mode(root) != WindowingMode::Pinned;

        roots
            .iter()
            .copied()
            .filter(focusable)
            .find(|&root| self.has_running_activity(root))
            .or_else(|| roots.iter().copied().find(focusable))
    }

    /// Returns the effective windowing mode, inherited from the nearest task that defines one.
    pub fn windowing_mode(&self, key: NodeKey) -> WindowingMode {
        self.self_and_ancestors(key)
            .filter_map(|key| self.task(key))
            .map(|task| task.windowing_mode)
            .find(|&mode| mode != WindowingMode::Undefined)
            .unwrap_or(WindowingMode::Fullscreen)
    }

    pub fn activity_type(&self, key: NodeKey) -> ActivityType {
        if let Some(root) = self.root_task_of(key) {
            if let Some(task) = self.task(root) {
                if task.activity_type != ActivityType::Undefined {
                    return task.activity_type;
                }
            }
        }

        self.activity(key)
            .map_or(ActivityType::Standard, |record| record.info.activity_type)
    }

    pub fn bounds(&self, key: NodeKey) -> Rect {
        let Some(node) = self.nodes.get(key) else {
            return Rect::default();
        };

        let own = match &node.data {
            NodeData::Display(display) => return display.bounds,
            NodeData::Task(task) => task.bounds,
            NodeData::TaskFragment(fragment) => fragment.bounds,
            NodeData::TaskDisplayArea(_) | NodeData::Activity(_) => None,
        };

        own.unwrap_or_else(|| node.parent.map_or(Rect::default(), |parent| self.bounds(parent)))
    }

    /// Whether `activity` is the bottom-most running activity of its task.
    pub fn is_root_of_task(&self, activity: NodeKey) -> bool {
        let Some(task) = self.parent(activity).and_then(|parent| self.task_of(parent)) else {
            return false;
        };

        let root = self
            .activities(task)
            .into_iter()
            .rev()
            .find(|&key| self.activity(key).is_some_and(ActivityRecord::is_running));
        root == Some(activity)
    }

    /// A container is translucent when nothing in it is an opaque running activity.
    pub fn is_translucent(&self, key: NodeKey, starting: Option<NodeKey>) -> bool {
        self.find_activity_from_top(key, &mut |key, record| {
            (record.is_running() || Some(key) == starting) && record.occludes_parent()
        })
        .is_none()
    }

    /// Whether a task or task fragment should be visible, ignoring the keyguard.
    ///
    /// A container needs something to show and must not be covered by an opaque sibling that
    /// fills the parent or by an opaque adjacent pair, at any level up to its root task. Root
    /// tasks are only covered by fullscreen root tasks or by split pairs.
    pub fn should_be_visible(&self, key: NodeKey, starting: Option<NodeKey>) -> bool {
        let hosts_starting = starting.is_some_and(|starting| self.is_descendant_of(starting, key));
        if !self.has_running_activity(key) && !hosts_starting {
            return false;
        }

        let mut current = key;
        while let Some(parent) = self.parent(current) {
            match self.nodes.get(parent).map(|node| &node.data) {
                Some(NodeData::TaskDisplayArea(_)) => {
                    return self.is_root_task_uncovered(current, starting);
                }
                Some(NodeData::Task(_) | NodeData::TaskFragment(_)) => {
                    if self.is_covered_by_siblings(parent, current, starting) {
                        return false;
                    }
                    current = parent;
                }
                _ => return false,
            }
        }

        false
    }

    fn siblings_above(&self, parent: NodeKey, child: NodeKey) -> Vec<NodeKey> {
        let siblings = self.children(parent);
        let idx = siblings
            .iter()
            .position(|&key| key == child)
            .map_or(siblings.len(), |idx| idx + 1);
        siblings[idx..].iter().rev().copied().collect()
    }

    fn is_covered_by_siblings(
        &self,
        parent: NodeKey,
        child: NodeKey,
        starting: Option<NodeKey>,
    ) -> bool {
        let parent_bounds = self.bounds(parent);
        let mut adjacent_seen = Vec::new();

        for sibling in self.siblings_above(parent, child) {
            if let Some(record) = self.activity(sibling) {
                if record.is_running() && record.occludes_parent() {
                    return true;
                }
                continue;
            }

            if !self.has_running_activity(sibling) || self.is_translucent(sibling, starting) {
                continue;
            }
            if self.bounds(sibling) == parent_bounds {
                return true;
            }
            if adjacent_seen.contains(&sibling) {
                return true;
            }
            if let Some(adjacent) = self.adjacent(sibling) {
                adjacent_seen.push(adjacent);
            }
        }

        false
    }

    fn is_root_task_uncovered(&self, root: NodeKey, starting: Option<NodeKey>) -> bool {
        if self.windowing_mode(root) == WindowingMode::Pinned {
            return true;
        }

        let Some(area) = self.parent(root) else {
            return false;
        };

        let mut adjacent_seen = Vec::new();
        for sibling in self.siblings_above(area, root) {
            if !self.has_running_activity(sibling) || self.is_translucent(sibling, starting) {
                continue;
            }

            match self.windowing_mode(sibling) {
                WindowingMode::Fullscreen => return false,
                mode if mode.is_split() => {
                    if adjacent_seen.contains(&sibling) {
                        return false;
                    }
                    if let Some(adjacent) = self.adjacent(sibling) {
                        adjacent_seen.push(adjacent);
                    }
                }
                _ => (),
            }
        }

        true
    }

    /// Returns the topmost root task of `area` with the given mode and type, creating one on top
    /// when none exists. The flag tells whether the root task was created.
    pub fn get_or_create_root_task(
        &mut self,
        area: NodeKey,
        windowing_mode: WindowingMode,
        activity_type: ActivityType,
    ) -> Result<(NodeKey, bool), HierarchyError> {
        let windowing_mode = match windowing_mode {
            WindowingMode::Undefined => WindowingMode::Fullscreen,
            mode => mode,
        };
        let activity_type = match activity_type {
            ActivityType::Undefined => ActivityType::Standard,
            ty => ty,
        };

        let existing = self.children(area).iter().rev().copied().find(|&key| {
            self.task(key).is_some_and(|task| {
                task.windowing_mode == windowing_mode && task.activity_type == activity_type
            })
        });
        if let Some(key) = existing {
            return Ok((key, false));
        }

        let key = self.create_root_task(area, windowing_mode, activity_type, Position::Top)?;
        Ok((key, true))
    }
}

// ============================================================================
// Output
// ============================================================================

impl Hierarchy {
    /// Nodes on the focus path: top display, its focused root task and that root task's top
    /// running activity with its ancestors.
    fn focus_path(&self) -> Vec<NodeKey> {
        let Some(display) = self.top_focused_display() else {
            return Vec::new();
        };

        let mut path = vec![display];
        if let Some(root) = self.focused_root_task(display) {
            path.push(root);
            if let Some(top) = self.top_running_activity(root) {
                path.push(top);
                path.extend(self.ancestors(top).take_while(|&key| key != root));
            }
        }
        path
    }

    pub fn snapshot(&self) -> Vec<HierarchyNode> {
        let focused = self.focus_path();
        self.displays
            .iter()
            .map(|&display| self.snapshot_node(display, &focused))
            .collect()
    }

    fn snapshot_node(&self, key: NodeKey, focused: &[NodeKey]) -> HierarchyNode {
        let mut node = HierarchyNode {
            kind: NodeKind::Display,
            label: String::new(),
            focused: focused.contains(&key),
            windowing_mode: None,
            adjacent: None,
            activity: None,
            children: self
                .children(key)
                .iter()
                .map(|&child| self.snapshot_node(child, focused))
                .collect(),
        };

        match self.nodes.get(key).map(|node| &node.data) {
            Some(NodeData::Display(display)) => {
                node.label = display.id.0.to_string();
            }
            Some(NodeData::TaskDisplayArea(area)) => {
                node.kind = NodeKind::TaskDisplayArea;
                node.label = area.name.clone();
            }
            Some(NodeData::Task(task)) => {
                if self.is_root_task(key) {
                    node.kind = NodeKind::RootTask;
                    node.windowing_mode = Some(task.windowing_mode.name().to_owned());
                } else {
                    node.kind = NodeKind::Task;
                }
                node.label = task.id.to_string();
                node.adjacent = task.adjacent.map(|adjacent| self.label(adjacent));
            }
            Some(NodeData::TaskFragment(fragment)) => {
                node.kind = NodeKind::TaskFragment;
                node.label = self.label(key);
                node.adjacent = fragment.adjacent.map(|adjacent| self.label(adjacent));
            }
            Some(NodeData::Activity(record)) => {
                node.kind = NodeKind::Activity;
                node.label = record.component().to_string();
                node.activity = Some(ActivitySnapshot {
                    state: record.state.to_snapshot(),
                    visible_requested: record.visible_requested,
                    finishing: record.finishing,
                    attached: record.attached,
                });
            }
            None => node.label = String::from("(missing)"),
        }

        node
    }

    fn label(&self, key: NodeKey) -> String {
        match self.nodes.get(key).map(|node| &node.data) {
            Some(NodeData::Task(task)) => task.id.to_string(),
            Some(NodeData::TaskFragment(_)) => {
                let idx = self
                    .parent(key)
                    .and_then(|parent| self.children(parent).iter().position(|&k| k == key))
                    .unwrap_or(0);
                let task = self.task_of(key).and_then(|task| self.task(task));
                task.map_or_else(|| format!("fragment {idx}"), |task| format!("{}:{idx}", task.id))
            }
            Some(NodeData::Activity(record)) => record.component().to_string(),
            _ => String::from("?"),
        }
    }

    /// Renders the whole hierarchy as indented text, topmost children last.
    pub fn debug_tree(&self) -> String {
        let mut out = String::new();
        if self.displays.is_empty() {
            out.push_str("(empty)\n");
            return out;
        }

        let focused = self.focus_path();
        for &display in &self.displays {
            self.debug_tree_node(display, 0, &focused, &mut out);
        }
        out
    }

    fn debug_tree_node(&self, key: NodeKey, depth: usize, focused: &[NodeKey], out: &mut String) {
        let indent = "  ".repeat(depth);
        let mark = if focused.contains(&key) { " *" } else { "" };

        match self.nodes.get(key).map(|node| &node.data) {
            Some(NodeData::Display(display)) => {
                let _ = writeln!(out, "{indent}Display {}{mark}", display.id.0);
            }
            Some(NodeData::TaskDisplayArea(area)) => {
                let _ = writeln!(out, "{indent}{}", area.name);
            }
            Some(NodeData::Task(task)) => {
                let mut line = if self.is_root_task(key) {
                    format!(
                        "{indent}RootTask {} {}",
                        task.id,
                        task.windowing_mode.name()
                    )
                } else {
                    format!("{indent}Task {}", task.id)
                };
                if task.activity_type != ActivityType::Standard
                    && task.activity_type != ActivityType::Undefined
                {
                    let _ = write!(line, " {:?}", task.activity_type);
                }
                if let Some(adjacent) = task.adjacent {
                    let _ = write!(line, " adjacent={}", self.label(adjacent));
                }
                let _ = writeln!(out, "{line}{mark}");
            }
            Some(NodeData::TaskFragment(fragment)) => {
                let mut line = format!("{indent}TaskFragment {}", self.label(key));
                if let Some(adjacent) = fragment.adjacent {
                    let _ = write!(line, " adjacent={}", self.label(adjacent));
                }
                let _ = writeln!(out, "{line}{mark}");
            }
            Some(NodeData::Activity(record)) => {
                let mut line = format!("{indent}{} {:?}", record.component(), record.state);
                if record.visible_requested {
                    line.push_str(" visible");
                }
                if record.finishing {
                    line.push_str(" finishing");
                }
                let _ = writeln!(out, "{line}{mark}");
                return;
            }
            None => {
                let _ = writeln!(out, "{indent}(missing)");
                return;
            }
        }

        for &child in self.children(key) {
            self.debug_tree_node(child, depth + 1, focused, out);
        }
    }

    #[cfg(test)]
    pub fn verify_invariants(&self) {
        for (key, node) in &self.nodes {
            for &child in &node.children {
                let child_node = &self.nodes[child];
                assert_eq!(child_node.parent, Some(key), "child must point back to parent");
                assert!(node.data.can_contain(&child_node.data));
                assert_eq!(
                    node.children.iter().filter(|&&k| k == child).count(),
                    1,
                    "child must appear once"
                );
            }

            if let Some(parent) = node.parent {
                assert!(self.nodes[parent].children.contains(&key));
            }

            if let Some(adjacent) = self.adjacent(key) {
                assert_ne!(adjacent, key);
                assert_eq!(self.adjacent(adjacent), Some(key), "adjacency must be symmetric");
            }

            if let NodeData::Display(_) = node.data {
                assert!(node.parent.is_none());
                assert_eq!(self.displays.iter().filter(|&&k| k == key).count(), 1);
            }
        }

        for &display in &self.displays {
            let pinned = self
                .root_tasks(display)
                .into_iter()
                .filter(|&root| self.windowing_mode(root) == WindowingMode::Pinned)
                .count();
            assert!(pinned <= 1, "at most one pinned root task per display");

            for root in self.root_tasks(display) {
                if self.windowing_mode(root) == WindowingMode::Pinned {
                    let tasks = self.children(root).iter().filter(|&&k| self.is_task(k)).count();
                    assert!(tasks <= 1, "pinned root task hosts at most one task");
                }
            }
        }
    }
}
