use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::atm::{ActivityTaskManager, GlobalState, Options};
use crate::background::ProcessImportance;
use crate::hierarchy::{
    ActivityRecord, ActivityState, DisplayId, Hierarchy, NodeKey, Position, TaskSpec,
    WindowingMode,
};
use crate::intent::{
    ActivityInfo, ActivityType, CallerToken, ComponentName, Intent, Uid, UserId,
};
use crate::services::{
    ActivityLaunched, ActivityMetrics, ActivityStartLog, ClientTransaction, KeyguardState,
    LockTaskController, PackageAuthority, ProcessLifecycle, RecentTasks, RemoteError,
    RestartAttempt, Services, StartPermissionCheck, TaskChangeNotifier, WindowProcess,
};
use crate::starter::ActivityStarter;
use crate::utils::Rect;
use crate::visibility::{self, VisibilityParams};

pub const APP_UID: Uid = Uid(10_001);
pub const RECENTS_UID: Uid = Uid(10_077);

/// Something a collaborator was told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartSpecificActivity {
        activity: NodeKey,
        and_resume: bool,
    },
    Transaction(NodeKey, ClientTransaction),
    AddRecent(i32),
    SetFreeze,
    ResetFreeze,
    LogStart(ActivityStartLog),
    Launched(ActivityLaunched),
    RestartAttempt(RestartAttempt),
}

/// State behind every fake collaborator.
#[derive(Debug)]
pub struct FakeHost {
    pub processes: HashMap<CallerToken, WindowProcess>,
    pub importance: HashMap<Uid, ProcessImportance>,
    pub visible_windows: HashSet<Uid>,
    pub packages: HashMap<ComponentName, ActivityInfo>,
    pub permission_granted: bool,
    pub supports_voice: Result<bool, RemoteError>,
    pub device_owner: Option<Uid>,
    pub input_method: Option<Uid>,
    pub recents_uid: Option<Uid>,
    pub frozen: bool,
    pub lock_task_violation: bool,
    pub keyguard_locked: bool,
    pub journal: Vec<Event>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            processes: HashMap::new(),
            importance: HashMap::new(),
            visible_windows: HashSet::new(),
            packages: HashMap::new(),
            permission_granted: true,
            supports_voice: Ok(true),
            device_owner: None,
            input_method: None,
            recents_uid: Some(RECENTS_UID),
            frozen: false,
            lock_task_violation: false,
            keyguard_locked: false,
            journal: Vec::new(),
        }
    }
}

impl FakeHost {
    /// Returns the shared host state and services backed by it.
    pub fn new_shared() -> (Arc<Mutex<FakeHost>>, Services) {
        let host = Arc::new(Mutex::new(FakeHost::default()));
        let fake = || Box::new(Fake(host.clone()));
        let services = Services {
            process: fake(),
            packages: fake(),
            recents: fake(),
            lock_task: fake(),
            metrics: fake(),
            task_changes: fake(),
            keyguard: fake(),
        };
        (host, services)
    }
}

struct Fake(Arc<Mutex<FakeHost>>);

impl Fake {
    fn record(&self, event: Event) {
        self.0.lock().journal.push(event);
    }
}

impl ProcessLifecycle for Fake {
    fn get_process_controller(&self, caller: CallerToken) -> Option<WindowProcess> {
        self.0.lock().processes.get(&caller).cloned()
    }

    fn has_active_visible_window(&self, uid: Uid) -> bool {
        self.0.lock().visible_windows.contains(&uid)
    }

    fn process_importance(&self, uid: Uid) -> ProcessImportance {
        self.0
            .lock()
            .importance
            .get(&uid)
            .copied()
            .unwrap_or_default()
    }

    fn start_specific_activity(
        &mut self,
        activity: NodeKey,
        _record: &ActivityRecord,
        and_resume: bool,
        _check_config: bool,
    ) {
        self.record(Event::StartSpecificActivity {
            activity,
            and_resume,
        });
    }

    fn schedule_transaction(
        &mut self,
        activity: NodeKey,
        _record: &ActivityRecord,
        transaction: ClientTransaction,
    ) {
        self.record(Event::Transaction(activity, transaction));
    }
}

impl PackageAuthority for Fake {
    fn resolve_activity(&self, intent: &Intent, _user: UserId) -> Option<ActivityInfo> {
        let component = intent.component.as_ref()?;
        self.0.lock().packages.get(component).cloned()
    }

    fn check_start_any_activity_permission(&self, _check: &StartPermissionCheck<'_>) -> bool {
        self.0.lock().permission_granted
    }

    fn activity_supports_intent(
        &self,
        _component: &ComponentName,
        _intent: &Intent,
    ) -> Result<bool, RemoteError> {
        self.0.lock().supports_voice.clone()
    }

    fn is_device_owner(&self, uid: Uid) -> bool {
        self.0.lock().device_owner == Some(uid)
    }

    fn current_input_method_uid(&self) -> Option<Uid> {
        self.0.lock().input_method
    }
}

impl RecentTasks for Fake {
    fn is_caller_recents(&self, uid: Uid) -> bool {
        self.0.lock().recents_uid == Some(uid)
    }

    fn add(&mut self, task: crate::hierarchy::TaskId) {
        self.record(Event::AddRecent(task.0));
    }

    fn set_freeze_task_list_reordering(&mut self) {
        self.0.lock().frozen = true;
        self.record(Event::SetFreeze);
    }

    fn is_freeze_task_list_reordering_set(&self) -> bool {
        self.0.lock().frozen
    }

    fn reset_freeze_task_list_reordering_on_timeout(&mut self) {
        self.record(Event::ResetFreeze);
    }
}

impl LockTaskController for Fake {
    fn is_new_task_lock_task_mode_violation(&self, _record: &ActivityRecord) -> bool {
        self.0.lock().lock_task_violation
    }
}

impl ActivityMetrics for Fake {
    fn log_activity_start(&mut self, log: &ActivityStartLog) {
        self.record(Event::LogStart(log.clone()));
    }

    fn notify_activity_launched(&mut self, launched: &ActivityLaunched) {
        self.record(Event::Launched(launched.clone()));
    }
}

impl TaskChangeNotifier for Fake {
    fn notify_activity_restart_attempt(&mut self, attempt: &RestartAttempt) {
        self.record(Event::RestartAttempt(attempt.clone()));
    }
}

impl KeyguardState for Fake {
    fn is_keyguard_locked(&self, _display: DisplayId) -> bool {
        self.0.lock().keyguard_locked
    }
}

pub fn component(class: &str) -> ComponentName {
    ComponentName::new("org.example", class)
}

/// Metadata of `class` in its own task affinity.
pub fn info(class: &str) -> ActivityInfo {
    ActivityInfo {
        task_affinity: Some(format!("org.example.{}", class.to_lowercase())),
        ..ActivityInfo::new(component(class), APP_UID)
    }
}

/// A record as a client would have it after it was started and shown.
pub fn running(info: ActivityInfo) -> ActivityRecord {
    let intent = Intent::for_component(info.component.clone());
    let mut record = ActivityRecord::new(info, intent);
    record.state = ActivityState::Resumed;
    record.attached = true;
    record.visible_requested = true;
    record.visible = true;
    record
}

pub struct Fixture {
    pub atm: ActivityTaskManager,
    pub host: Arc<Mutex<FakeHost>>,
    pub display: NodeKey,
    pub area: NodeKey,
}

impl Fixture {
    /// A single 1920x1080 display, background starts allowed.
    pub fn new() -> Self {
        Self::with_options(Options {
            background_activity_starts_enabled: true,
            ..Options::default()
        })
    }

    pub fn with_options(options: Options) -> Self {
        let (host, services) = FakeHost::new_shared();

        let mut hierarchy = Hierarchy::new();
        let display = hierarchy.add_display(DisplayId::DEFAULT, Rect::from_size(1920, 1080));
        let area = hierarchy.default_task_display_area(display).unwrap();

        Self {
            atm: ActivityTaskManager::new(hierarchy, services, options),
            host,
            display,
            area,
        }
    }

    pub fn host(&self) -> parking_lot::MutexGuard<'_, FakeHost> {
        self.host.lock()
    }

    pub fn register(&self, info: &ActivityInfo) {
        self.host()
            .packages
            .insert(info.component.clone(), info.clone());
    }

    pub fn add_process(&self, token: CallerToken, process: WindowProcess) {
        self.host().processes.insert(token, process);
    }

    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut self.host().journal)
    }

    pub fn events(&self) -> Vec<Event> {
        self.host().journal.clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.host().journal.iter().filter(|event| pred(event)).count()
    }

    pub fn starter(&self) -> ActivityStarter<'_> {
        self.atm.starter().set_reason("test")
    }

    pub fn with_hierarchy<T>(&self, f: impl FnOnce(&mut Hierarchy) -> T) -> T {
        self.atm.with_hierarchy(f)
    }

    pub fn add_root_task(&self, mode: WindowingMode, activity_type: ActivityType) -> NodeKey {
        let area = self.area;
        self.with_hierarchy(|h| {
            h.create_root_task(area, mode, activity_type, Position::Top)
                .unwrap()
        })
    }

    /// Adds a task created by `info`'s component under `root`, hosting a running instance of it.
    pub fn add_task_with(&self, root: NodeKey, info: &ActivityInfo) -> (NodeKey, NodeKey) {
        self.with_hierarchy(|h| {
            let spec = TaskSpec {
                affinity: Some(info.affinity().to_owned()),
                user_id: info.uid.user_id(),
                root_component: Some(info.component.clone()),
                ..Default::default()
            };
            let task = h.create_task(root, spec, Position::Top).unwrap();
            let activity = h
                .add_activity(task, running(info.clone()), Position::Top)
                .unwrap();
            (task, activity)
        })
    }

    pub fn add_activity(&self, parent: NodeKey, record: ActivityRecord) -> NodeKey {
        self.with_hierarchy(|h| h.add_activity(parent, record, Position::Top).unwrap())
    }

    pub fn activity(&self, key: NodeKey) -> ActivityRecord {
        self.with_hierarchy(|h| h.activity(key).unwrap().clone())
    }

    /// Runs a visibility pass over the default display, as the host does after a layout change.
    pub fn ensure_display_visible(&self) {
        let display = self.display;
        let mut guard = self.atm.lock();
        let GlobalState {
            hierarchy,
            services,
            ..
        } = &mut *guard;
        visibility::ensure_display_visible(
            hierarchy,
            services,
            display,
            &VisibilityParams::default(),
        );
    }

    pub fn debug_tree(&self) -> String {
        self.with_hierarchy(|h| h.debug_tree())
    }

    #[track_caller]
    pub fn verify_invariants(&self) {
        self.with_hierarchy(|h| h.verify_invariants());
    }
}
