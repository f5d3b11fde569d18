//! Interfaces of the collaborators the host consults or notifies.
//!
//! Everything behind these traits lives outside the launch core: process creation, package
//! resolution, the recents store, lock-task policy, metrics, task change listeners and the
//! keyguard. Calls that push work to the process layer are one-way notifications.

use crate::background::ProcessImportance;
use crate::hierarchy::{ActivityRecord, DisplayId, NodeKey, TaskId, WindowingMode};
use crate::intent::{ActivityInfo, CallerToken, ComponentName, Intent, Uid, UserId};
use crate::starter::StartResult;
use crate::utils::Rect;

#[derive(Debug, Clone, thiserror::Error)]
#[error("remote call failed: {0}")]
pub struct RemoteError(pub String);

/// Process-side view of a client that issued a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowProcess {
    pub pid: u32,
    pub uid: Uid,
    pub has_foreground_activities: bool,
    /// Holds a temporary token allowing activity starts from the background.
    pub has_background_start_token: bool,
    pub instrumenting_with_background_start_privileges: bool,
}

impl WindowProcess {
    pub fn new(pid: u32, uid: Uid) -> Self {
        Self {
            pid,
            uid,
            has_foreground_activities: false,
            has_background_start_token: false,
            instrumenting_with_background_start_privileges: false,
        }
    }
}

/// Message sent to the client that hosts an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTransaction {
    Configuration { preserve_windows: bool },
    Visibility(bool),
    MakeActive,
    Resume,
    Pause,
    Stop,
    NewIntent,
}

pub trait ProcessLifecycle: Send {
    fn get_process_controller(&self, caller: CallerToken) -> Option<WindowProcess>;
    fn has_active_visible_window(&self, uid: Uid) -> bool;
    fn process_importance(&self, uid: Uid) -> ProcessImportance;
    /// Starts or attaches the process backing `record`.
    fn start_specific_activity(
        &mut self,
        activity: NodeKey,
        record: &ActivityRecord,
        and_resume: bool,
        check_config: bool,
    );
    fn schedule_transaction(
        &mut self,
        activity: NodeKey,
        record: &ActivityRecord,
        transaction: ClientTransaction,
    );
}

/// Arguments of the global start permission check.
#[derive(Debug, Clone, Copy)]
pub struct StartPermissionCheck<'a> {
    pub intent: &'a Intent,
    pub info: &'a ActivityInfo,
    pub calling_uid: Uid,
    pub real_calling_uid: Uid,
    pub calling_package: Option<&'a str>,
    pub has_result_to: bool,
}

pub trait PackageAuthority: Send {
    fn resolve_activity(&self, intent: &Intent, user: UserId) -> Option<ActivityInfo>;
    fn check_start_any_activity_permission(&self, check: &StartPermissionCheck<'_>) -> bool;
    fn activity_supports_intent(
        &self,
        component: &ComponentName,
        intent: &Intent,
    ) -> Result<bool, RemoteError>;
    fn is_device_owner(&self, uid: Uid) -> bool;
    fn current_input_method_uid(&self) -> Option<Uid>;
}

pub trait RecentTasks: Send {
    fn is_caller_recents(&self, uid: Uid) -> bool;
    fn add(&mut self, task: TaskId);
    fn set_freeze_task_list_reordering(&mut self);
    fn is_freeze_task_list_reordering_set(&self) -> bool;
    fn reset_freeze_task_list_reordering_on_timeout(&mut self);
}

pub trait LockTaskController: Send {
    fn is_new_task_lock_task_mode_violation(&self, record: &ActivityRecord) -> bool;
}

/// Stage of a launch the layout modifiers are asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchPhase {
    /// Picking the display.
    Display,
    /// Estimating bounds before the task exists.
    Bounds,
    /// Final layout once the task is known.
    TaskLayout,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub display: Option<DisplayId>,
    pub windowing_mode: WindowingMode,
    pub bounds: Option<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierResult {
    /// The modifier had nothing to say, its output is dropped.
    Skip,
    /// Keep the output and let later modifiers refine it.
    Continue,
    /// Keep the output and stop the chain.
    Done,
}

/// Inputs shared by every modifier of one chain run.
#[derive(Debug, Clone, Copy)]
pub struct LaunchParamsRequest<'a> {
    pub phase: LaunchPhase,
    pub info: &'a ActivityInfo,
    pub task: Option<TaskId>,
    pub source_display: Option<DisplayId>,
    pub requested_bounds: Option<Rect>,
}

pub trait LaunchParamsModifier: Send {
    fn on_calculate(
        &mut self,
        request: &LaunchParamsRequest<'_>,
        current: &LaunchParams,
        out: &mut LaunchParams,
    ) -> ModifierResult;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityStartLog {
    pub reason: String,
    pub calling_uid: Uid,
    pub calling_package: Option<String>,
    pub real_calling_uid: Uid,
    pub component: Option<ComponentName>,
    /// The start was stopped by the background-start gate.
    pub aborted_background_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityLaunched {
    pub result: StartResult,
    pub new_activity_created: bool,
    pub activity: Option<NodeKey>,
    pub component: Option<ComponentName>,
    pub has_options: bool,
}

pub trait ActivityMetrics: Send {
    fn log_activity_start(&mut self, log: &ActivityStartLog);
    fn notify_activity_launched(&mut self, launched: &ActivityLaunched);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartAttempt {
    pub task: TaskId,
    pub home_task_visible: bool,
    pub cleared_task: bool,
    /// Whether the task showed a running activity before the launch brought it forward.
    pub was_visible: bool,
}

pub trait TaskChangeNotifier: Send {
    fn notify_activity_restart_attempt(&mut self, attempt: &RestartAttempt);
}

pub trait KeyguardState: Send {
    fn is_keyguard_locked(&self, display: DisplayId) -> bool;
}

/// Every collaborator the host needs.
pub struct Services {
    pub process: Box<dyn ProcessLifecycle>,
    pub packages: Box<dyn PackageAuthority>,
    pub recents: Box<dyn RecentTasks>,
    pub lock_task: Box<dyn LockTaskController>,
    pub metrics: Box<dyn ActivityMetrics>,
    pub task_changes: Box<dyn TaskChangeNotifier>,
    pub keyguard: Box<dyn KeyguardState>,
}

impl Services {
    /// Collaborators that know no processes or packages, grant every permission and drop every
    /// notification.
    pub fn inert() -> Self {
        Self {
            process: Box::new(Inert),
            packages: Box::new(Inert),
            recents: Box::new(Inert),
            lock_task: Box::new(Inert),
            metrics: Box::new(Inert),
            task_changes: Box::new(Inert),
            keyguard: Box::new(Inert),
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

struct Inert;

impl ProcessLifecycle for Inert {
    fn get_process_controller(&self, _caller: CallerToken) -> Option<WindowProcess> {
        None
    }

    fn has_active_visible_window(&self, _uid: Uid) -> bool {
        false
    }

    fn process_importance(&self, _uid: Uid) -> ProcessImportance {
        ProcessImportance::NonExistent
    }

    fn start_specific_activity(&mut self, _: NodeKey, _: &ActivityRecord, _: bool, _: bool) {}

    fn schedule_transaction(&mut self, _: NodeKey, _: &ActivityRecord, _: ClientTransaction) {}
}

impl PackageAuthority for Inert {
    fn resolve_activity(&self, _intent: &Intent, _user: UserId) -> Option<ActivityInfo> {
        None
    }

    fn check_start_any_activity_permission(&self, _check: &StartPermissionCheck<'_>) -> bool {
        true
    }

    fn activity_supports_intent(
        &self,
        _component: &ComponentName,
        _intent: &Intent,
    ) -> Result<bool, RemoteError> {
        Ok(true)
    }

    fn is_device_owner(&self, _uid: Uid) -> bool {
        false
    }

    fn current_input_method_uid(&self) -> Option<Uid> {
        None
    }
}

impl RecentTasks for Inert {
    fn is_caller_recents(&self, _uid: Uid) -> bool {
        false
    }

    fn add(&mut self, _task: TaskId) {}

    fn set_freeze_task_list_reordering(&mut self) {}

    fn is_freeze_task_list_reordering_set(&self) -> bool {
        false
    }

    fn reset_freeze_task_list_reordering_on_timeout(&mut self) {}
}

impl LockTaskController for Inert {
    fn is_new_task_lock_task_mode_violation(&self, _record: &ActivityRecord) -> bool {
        false
    }
}

impl ActivityMetrics for Inert {
    fn log_activity_start(&mut self, _log: &ActivityStartLog) {}

    fn notify_activity_launched(&mut self, _launched: &ActivityLaunched) {}
}

impl TaskChangeNotifier for Inert {
    fn notify_activity_restart_attempt(&mut self, _attempt: &RestartAttempt) {}
}

impl KeyguardState for Inert {
    fn is_keyguard_locked(&self, _display: DisplayId) -> bool {
        false
    }
}
