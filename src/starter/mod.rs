//! Launch request resolution.
//!
//! An [`ActivityStarter`] collects the parameters of one launch through its setters, then
//! [`ActivityStarter::execute`] runs the whole pipeline under the global lock:
//!
//! 1. resolve the caller and engage the recents freeze if asked to,
//! 2. check the preconditions and the background-start policy,
//! 3. pick the display, a task to reuse or the place for a new task,
//! 4. mutate the hierarchy,
//! 5. propagate visibility and resume the focused top activity,
//! 6. finalize recents, metrics and restart notifications.
//!
//! Every step that fails produces a [`StartResult`]; only misuse of the starter itself is an
//! error.

use crate::atm::{ActivityTaskManager, GlobalState};
use crate::background::{self, BackgroundStartQuery, BackgroundStartVerdict};
use crate::hierarchy::{
    ActivityRecord, Hierarchy, HierarchyError, NodeKey, Position, TaskSpec, WindowingMode,
};
use crate::intent::{
    ActivityInfo, ActivityType, CallerToken, ComponentName, Intent, IntentFlags, LaunchCookie,
    LaunchMode, Uid, VoiceSession, CATEGORY_VOICE,
};
use crate::services::{
    ActivityLaunched, ActivityStartLog, ClientTransaction, LaunchParams, LaunchParamsRequest,
    LaunchPhase, RestartAttempt, Services, StartPermissionCheck, WindowProcess,
};
use crate::visibility::{self, VisibilityParams};

pub mod launch_params;
mod request;
mod result;

pub use self::request::{ActivityOptions, Request};
pub use self::result::{get_external_result, StartError, StartResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarterState {
    /// Setters may still be called.
    Building,
    Validated,
    ResolvingTarget,
    MutatingHierarchy,
    PropagatingVisibility,
    Finalizing,
    Done(StartResult),
}

/// Identity of the caller, resolved once per request.
#[derive(Debug)]
struct Caller {
    uid: Uid,
    real_uid: Uid,
    process: Option<WindowProcess>,
}

/// Launch inputs resolved before touching the hierarchy.
#[derive(Debug)]
struct Launch {
    flags: IntentFlags,
    source: Option<NodeKey>,
    display: NodeKey,
    /// Display asked for by the options or the launch params, if any.
    preferred_display: Option<NodeKey>,
    launch_root_task: Option<NodeKey>,
    launch_task_behind: bool,
    avoid_move_to_front: bool,
    launch_cookie: Option<LaunchCookie>,
    trace_visibility: bool,
}

/// Single-use launch request.
#[derive(Debug)]
pub struct ActivityStarter<'a> {
    atm: &'a ActivityTaskManager,
    request: Request,
    state: StarterState,
    out_activity: Option<NodeKey>,
    /// Nodes created by this request, removed again if it fails.
    created: Vec<NodeKey>,
    froze_task_list: bool,
    caller_is_recents: bool,
    cleared_task: bool,
    /// Whether the reused task showed anything before the request touched it.
    task_was_visible: Option<bool>,
}

impl<'a> ActivityStarter<'a> {
    pub fn new(atm: &'a ActivityTaskManager) -> Self {
        Self {
            atm,
            request: Request::default(),
            state: StarterState::Building,
            out_activity: None,
            created: Vec::new(),
            froze_task_list: false,
            caller_is_recents: false,
            cleared_task: false,
            task_was_visible: None,
        }
    }

    pub fn set_caller(mut self, caller: CallerToken) -> Self {
        self.request.caller = Some(caller);
        self
    }

    pub fn set_calling_uid(mut self, uid: Uid) -> Self {
        self.request.calling_uid = Some(uid);
        self
    }

    pub fn set_real_calling_uid(mut self, uid: Uid) -> Self {
        self.request.real_calling_uid = Some(uid);
        self
    }

    pub fn set_calling_package(mut self, package: impl Into<String>) -> Self {
        self.request.calling_package = Some(package.into());
        self
    }

    pub fn set_intent(mut self, intent: Intent) -> Self {
        self.request.intent = intent;
        self
    }

    pub fn set_activity_info(mut self, info: ActivityInfo) -> Self {
        self.request.activity_info = Some(info);
        self
    }

    pub fn set_result_to(mut self, activity: NodeKey) -> Self {
        self.request.result_to = Some(activity);
        self
    }

    pub fn set_request_code(mut self, code: i32) -> Self {
        self.request.request_code = Some(code);
        self
    }

    pub fn set_voice_session(mut self, session: VoiceSession) -> Self {
        self.request.voice_session = Some(session);
        self
    }

    pub fn set_activity_options(mut self, options: ActivityOptions) -> Self {
        self.request.options = Some(options);
        self
    }

    pub fn set_in_task(mut self, task: NodeKey) -> Self {
        self.request.in_task = Some(task);
        self
    }

    pub fn set_in_task_fragment(mut self, fragment: NodeKey) -> Self {
        self.request.in_task_fragment = Some(fragment);
        self
    }

    pub fn set_reason(mut self, reason: impl Into<String>) -> Self {
        self.request.reason = reason.into();
        self
    }

    pub fn intent(&self) -> &Intent {
        &self.request.intent
    }

    pub fn reason(&self) -> &str {
        &self.request.reason
    }

    /// The activity that was started or brought forward.
    pub fn out_activity(&self) -> Option<NodeKey> {
        self.out_activity
    }

    pub fn state(&self) -> StarterState {
        self.state
    }

    /// Runs the request. A starter can only be executed once.
    pub fn execute(&mut self) -> Result<StartResult, StartError> {
        if self.state != StarterState::Building {
            return Err(StartError::AlreadyExecuted);
        }

        if self.request.intent.has_file_descriptors() {
            warn!("refusing to start an intent carrying file descriptors");
            self.state = StarterState::Done(StartResult::Canceled);
            return Err(StartError::FileDescriptorsInIntent);
        }

        let atm = self.atm;
        let mut guard = atm.lock();
        let result = self.execute_request(&mut guard);
        self.state = StarterState::Done(result);

        debug!(
            "start {} ({}): {result}",
            self.request
                .intent
                .component
                .as_ref()
                .map_or_else(|| String::from("<unresolved>"), ToString::to_string),
            self.request.reason,
        );
        Ok(result)
    }

    /// Finalizes bookkeeping for a start that ended with `result`.
    ///
    /// [`ActivityStarter::execute`] runs this itself. It is exposed for hosts that finish a start
    /// on their own and must be called at most once per request.
    pub fn post_start_activity_processing(
        &mut self,
        activity: Option<NodeKey>,
        result: StartResult,
        root_task: Option<NodeKey>,
    ) {
        let atm = self.atm;
        let mut guard = atm.lock();
        self.post_start(&mut guard, activity, result, root_task);
    }

    fn freeze_requested(&self) -> bool {
        self.request
            .options
            .as_ref()
            .is_some_and(|options| options.freeze_recent_tasks_reordering)
    }

    fn execute_request(&mut self, g: &mut GlobalState) -> StartResult {
        let caller = self.resolve_caller(g);
        self.engage_freeze(g, &caller);

        let result = match self.check_preconditions(g, &caller) {
            Err(result) => result,
            Ok(info) => {
                self.state = StarterState::Validated;

                let aborted = self.is_background_start_aborted(g, &caller, &info);
                if g.options.activity_starts_logging_enabled {
                    g.services.metrics.log_activity_start(&ActivityStartLog {
                        reason: self.request.reason.clone(),
                        calling_uid: caller.uid,
                        calling_package: self.request.calling_package.clone(),
                        real_calling_uid: caller.real_uid,
                        component: Some(info.component.clone()),
                        aborted_background_start: aborted,
                    });
                }

                if aborted {
                    StartResult::Aborted
                } else {
                    self.start_activity(g, &caller, info)
                }
            }
        };

        self.state = StarterState::Finalizing;
        let activity = self.out_activity;
        let root_task = activity.and_then(|key| g.hierarchy.root_task_of(key));
        self.post_start(g, activity, result, root_task);
        result
    }

    fn resolve_caller(&self, g: &GlobalState) -> Caller {
        let process = self
            .request
            .caller
            .and_then(|token| g.services.process.get_process_controller(token));
        let uid = self
            .request
            .calling_uid
            .or_else(|| process.as_ref().map(|process| process.uid))
            .unwrap_or(Uid::SYSTEM);
        let real_uid = self.request.real_calling_uid.unwrap_or(uid);

        Caller {
            uid,
            real_uid,
            process,
        }
    }

    fn engage_freeze(&mut self, g: &mut GlobalState, caller: &Caller) {
        let recents = &mut g.services.recents;
        self.caller_is_recents = recents.is_caller_recents(caller.uid);

        if !self.freeze_requested()
            || !self.caller_is_recents
            || recents.is_freeze_task_list_reordering_set()
        {
            return;
        }

        debug!("freezing recent tasks reordering");
        recents.set_freeze_task_list_reordering();
        self.froze_task_list = true;
    }

    fn check_preconditions(
        &mut self,
        g: &mut GlobalState,
        caller: &Caller,
    ) -> Result<ActivityInfo, StartResult> {
        let GlobalState {
            hierarchy: h,
            services,
            ..
        } = g;
        let request = &mut self.request;

        if request.caller.is_some() && caller.process.is_none() {
            warn!("no process for caller {:?}", request.caller);
            return Err(StartResult::PermissionDenied);
        }

        let source = request.result_to.filter(|&key| h.is_activity(key));
        if request.intent.flags.contains(IntentFlags::FORWARD_RESULT)
            && source.is_some()
            && request.request_code.is_some_and(|code| code >= 0)
        {
            return Err(StartResult::ForwardAndRequestConflict);
        }

        let Some(component) = request.intent.component.clone() else {
            return Err(StartResult::IntentNotResolved);
        };

        let info = match request.activity_info.clone() {
            Some(info) => info,
            None => services
                .packages
                .resolve_activity(&request.intent, caller.uid.user_id())
                .ok_or(StartResult::ClassNotFound)?,
        };
        request.activity_info = Some(info.clone());

        let source_voice_session = source
            .and_then(|key| h.parent(key))
            .and_then(|parent| h.task_of(parent))
            .and_then(|task| h.task(task))
            .and_then(|task| task.voice_session);
        if source_voice_session.is_some()
            && !request.intent.flags.contains(IntentFlags::NEW_TASK)
        {
            let source_uid = source
                .and_then(|key| h.activity(key))
                .map(|record| record.info.uid);
            if source_uid != Some(info.uid) {
                request.intent.add_category(CATEGORY_VOICE);
                if !supports_voice(services, &component, &request.intent) {
                    return Err(StartResult::NotVoiceCompatible);
                }
            }
        }

        if request.voice_session.is_some() && !supports_voice(services, &component, &request.intent)
        {
            return Err(StartResult::NotVoiceCompatible);
        }

        let check = StartPermissionCheck {
            intent: &request.intent,
            info: &info,
            calling_uid: caller.uid,
            real_calling_uid: caller.real_uid,
            calling_package: request.calling_package.as_deref(),
            has_result_to: source.is_some(),
        };
        if !services.packages.check_start_any_activity_permission(&check) {
            warn!("permission denied starting {} from uid {}", info.component, caller.uid);
            return Err(StartResult::Aborted);
        }

        Ok(info)
    }

    fn is_background_start_aborted(
        &self,
        g: &GlobalState,
        caller: &Caller,
        info: &ActivityInfo,
    ) -> bool {
        if g.options.background_activity_starts_enabled {
            return false;
        }

        let h = &g.hierarchy;
        let process = &g.services.process;
        let packages = &g.services.packages;

        let mut query = BackgroundStartQuery::new(caller.uid, caller.real_uid);
        query.calling_importance = process.process_importance(caller.uid);
        query.calling_has_visible_window = process.has_active_visible_window(caller.uid);
        query.real_calling_importance = process.process_importance(caller.real_uid);
        query.real_calling_has_visible_window = process.has_active_visible_window(caller.real_uid);
        if let Some(process) = &caller.process {
            query.has_foreground_activities = process.has_foreground_activities;
            query.has_background_start_token = process.has_background_start_token;
            query.instrumenting_with_background_start_privileges =
                process.instrumenting_with_background_start_privileges;
        }
        query.caller_is_recents = self.caller_is_recents;
        query.calling_uid_is_device_owner = packages.is_device_owner(caller.uid);
        query.calling_uid_is_input_method = packages.current_input_method_uid() == Some(caller.uid);
        query.target_is_pinned_single_instance = info.launch_mode == LaunchMode::SingleInstance
            && h.find_activity(&info.component, info.uid.user_id())
                .and_then(|key| h.root_task_of(key))
                .is_some_and(|root| h.windowing_mode(root) == WindowingMode::Pinned);

        match background::check(false, &query) {
            BackgroundStartVerdict::Allowed(reason) => {
                debug!("background start of {} allowed: {reason}", info.component);
                false
            }
            BackgroundStartVerdict::Aborted => {
                warn!(
                    "aborting background start of {} from uid {} (real uid {})",
                    info.component, caller.uid, caller.real_uid
                );
                true
            }
        }
    }

    fn start_activity(
        &mut self,
        g: &mut GlobalState,
        caller: &Caller,
        info: ActivityInfo,
    ) -> StartResult {
        self.state = StarterState::ResolvingTarget;

        match self.start_activity_inner(g, caller, info) {
            Ok(result) => result,
            Err(err) => {
                warn!("error starting activity: {err}");
                self.rollback(&mut g.hierarchy);
                self.out_activity = None;
                StartResult::Canceled
            }
        }
    }

    fn rollback(&mut self, h: &mut Hierarchy) {
        for key in self.created.drain(..).rev() {
            h.remove(key);
        }
    }

    fn start_activity_inner(
        &mut self,
        g: &mut GlobalState,
        caller: &Caller,
        info: ActivityInfo,
    ) -> Result<StartResult, HierarchyError> {
        let GlobalState {
            hierarchy: h,
            services,
            options: host_options,
            launch_params,
        } = g;

        let source = self.request.result_to.filter(|&key| h.is_activity(key));
        let wants_result = source.is_some() && self.request.request_code.is_some_and(|code| code >= 0);
        let in_task = self.request.in_task.filter(|&key| h.is_task(key));
        let in_task_fragment = self
            .request
            .in_task_fragment
            .filter(|&key| h.is_fragment_like(key));
        let launch_mode = info.launch_mode;

        let mut flags = self.request.intent.flags;
        let source_is_single_instance = source
            .and_then(|key| h.activity(key))
            .is_some_and(|record| record.launch_mode() == LaunchMode::SingleInstance);
        if (source.is_none() && in_task.is_none() && in_task_fragment.is_none())
            || launch_mode.requires_new_task()
            || source_is_single_instance
            || flags.contains(IntentFlags::LAUNCH_ADJACENT)
        {
            flags |= IntentFlags::NEW_TASK;
        }
        self.request.intent.flags = flags;

        let options = self.request.options.as_ref();
        let option_display = options.and_then(|o| o.launch_display_id);
        let requested_bounds = options.and_then(|o| o.launch_bounds);
        let requested_mode = options.map_or(WindowingMode::Undefined, |o| o.launch_windowing_mode);
        let launch_root_task = options
            .and_then(|o| o.launch_root_task)
            .filter(|&key| h.is_task(key));
        let launch_task_behind = options.is_some_and(|o| o.launch_task_behind);
        let avoid_move_to_front = options.is_some_and(|o| o.avoid_move_to_front);
        let launch_cookie = options.and_then(|o| o.launch_cookie);

        let mut record = ActivityRecord::new(info, self.request.intent.clone());
        record.launched_from_uid = caller.uid;
        record.launched_from_package = self.request.calling_package.clone();
        record.launch_task_behind = launch_task_behind;
        record.launch_cookie = launch_cookie;

        let source_display = source
            .and_then(|key| h.display_of(key))
            .and_then(|display| h.display_id(display));
        let mut layout = LaunchParamsRequest {
            phase: LaunchPhase::Display,
            info: &record.info,
            task: None,
            source_display,
            requested_bounds,
        };
        let params = launch_params.calculate(
            &layout,
            LaunchParams {
                display: option_display,
                windowing_mode: requested_mode,
                bounds: requested_bounds,
            },
        );

        let preferred_display = option_display.or(params.display).and_then(|id| h.display(id));
        let display = preferred_display
            .or_else(|| source_display.and_then(|id| h.display(id)))
            .or_else(|| h.top_focused_display());
        let Some(display) = display else {
            warn!("no display to start {} on", record.component());
            return Ok(StartResult::Canceled);
        };

        let user = record.user_id;
        let reusable = if in_task.is_none()
            && in_task_fragment.is_none()
            && !wants_result
            && ((flags.contains(IntentFlags::NEW_TASK) && !flags.contains(IntentFlags::MULTIPLE_TASK))
                || launch_mode.requires_new_task())
        {
            if launch_mode == LaunchMode::SingleInstance {
                h.find_activity(record.component(), user)
                    .and_then(|key| h.parent(key))
                    .and_then(|parent| h.task_of(parent))
            } else {
                h.find_task(record.component(), record.info.affinity(), user)
            }
        } else {
            None
        };

        layout.phase = LaunchPhase::Bounds;
        layout.task = reusable.and_then(|task| h.task(task)).map(|task| task.id);
        let params = launch_params.calculate(&layout, params);

        let launch = Launch {
            flags,
            source,
            display,
            preferred_display,
            launch_root_task,
            launch_task_behind,
            avoid_move_to_front,
            launch_cookie,
            trace_visibility: host_options.trace_visibility,
        };

        if let Some(task) = reusable {
            debug!("reusing task {:?} for {}", h.task(task).map(|t| t.id), record.component());
            self.state = StarterState::MutatingHierarchy;
            return self.recycle_task(h, services, task, record, &launch);
        }

        if !wants_result && in_task.is_none() && in_task_fragment.is_none() {
            if let Some(top) = deliverable_top(h, display, &record, flags) {
                debug!("delivering to current top {}", record.component());
                self.state = StarterState::MutatingHierarchy;
                self.task_was_visible = h
                    .parent(top)
                    .and_then(|parent| h.task_of(parent))
                    .map(|task| has_visible_activity(h, task));
                deliver_new_intent(h, services, top, record.intent, launch_cookie);
                self.out_activity = Some(top);
                self.state = StarterState::PropagatingVisibility;
                propagate_visibility(h, services, display, None, launch.trace_visibility);
                return Ok(StartResult::DeliveredToTop);
            }
        }

        self.state = StarterState::MutatingHierarchy;
        let parent = if let Some(fragment) = in_task_fragment {
            fragment
        } else if let Some(task) = in_task {
            task
        } else if let Some(fragment) = adjacent_fragment_of_source(h, &launch) {
            debug!("launching into the fragment adjacent to the source");
            fragment
        } else if let Some(parent) = source
            .filter(|_| !flags.contains(IntentFlags::NEW_TASK))
            .and_then(|key| h.parent(key))
        {
            parent
        } else {
            let root = self.resolve_launch_root(
                h,
                &launch,
                params.windowing_mode,
                record.info.activity_type,
            )?;

            let position = if launch_task_behind || avoid_move_to_front {
                Position::Bottom
            } else {
                Position::Top
            };
            let spec = TaskSpec {
                affinity: Some(record.info.affinity().to_owned()),
                user_id: user,
                root_component: Some(record.component().clone()),
                voice_session: self.request.voice_session,
                ..Default::default()
            };
            let task = h.create_task(root, spec, position)?;
            self.created.push(task);

            layout.phase = LaunchPhase::TaskLayout;
            layout.task = h.task(task).map(|data| data.id);
            let params = launch_params.calculate(&layout, params.clone());
            if h.windowing_mode(task) == WindowingMode::Freeform {
                if let (Some(bounds), Some(data)) = (params.bounds, h.task_mut(task)) {
                    data.bounds = Some(bounds);
                }
            }

            if services.lock_task.is_new_task_lock_task_mode_violation(&record) {
                warn!("starting {} would violate lock task mode", record.component());
                self.rollback(h);
                return Ok(StartResult::LockTaskModeViolation);
            }

            task
        };

        let key = h.add_activity(parent, record, Position::Top)?;
        self.created.push(key);
        self.out_activity = Some(key);

        if !launch_task_behind && !avoid_move_to_front {
            h.move_task_to_front(parent);
        }

        self.state = StarterState::PropagatingVisibility;
        let display = h.display_of(key).unwrap_or(display);
        propagate_visibility(h, services, display, Some(key), launch.trace_visibility);

        Ok(StartResult::Success)
    }

    fn resolve_launch_root(
        &mut self,
        h: &mut Hierarchy,
        launch: &Launch,
        requested_mode: WindowingMode,
        activity_type: ActivityType,
    ) -> Result<NodeKey, HierarchyError> {
        if let Some(root) = launch.launch_root_task {
            return Ok(root);
        }

        if launch.flags.contains(IntentFlags::LAUNCH_ADJACENT) {
            let anchor = launch
                .source
                .and_then(|key| h.root_task_of(key))
                .or_else(|| h.focused_root_task(launch.display));
            if let Some(adjacent) = anchor.and_then(|root| h.adjacent(root)) {
                debug!("launching into the root task adjacent to {anchor:?}");
                return Ok(adjacent);
            }
        }

        let area = h
            .default_task_display_area(launch.display)
            .ok_or(HierarchyError::MissingNode(launch.display))?;

        let mut mode = requested_mode;
        let has_pairing = h
            .root_tasks(launch.display)
            .into_iter()
            .any(|root| h.adjacent(root).is_some());
        if mode.is_split() && !has_pairing {
            debug!("no split pairing on the display, launching fullscreen");
            mode = WindowingMode::Fullscreen;
        }

        let (root, created) = h.get_or_create_root_task(area, mode, activity_type)?;
        if created {
            self.created.push(root);
        }
        Ok(root)
    }

    /// Brings an existing task forward and places the new intent in it.
    fn recycle_task(
        &mut self,
        h: &mut Hierarchy,
        services: &mut Services,
        task: NodeKey,
        record: ActivityRecord,
        launch: &Launch,
    ) -> Result<StartResult, HierarchyError> {
        let flags = launch.flags;
        let component = record.component().clone();
        let launch_mode = record.launch_mode();

        let current_root = h.root_task_of(task).ok_or(HierarchyError::MissingNode(task))?;
        self.task_was_visible = Some(has_visible_activity(h, task));
        let task_display = h.display_of(task);
        let target_display = launch.preferred_display.or(task_display);

        let focused_root = h
            .top_focused_display()
            .and_then(|display| h.focused_root_task(display));
        let different_top_task = target_display != task_display
            || focused_root != Some(current_root)
            || h.top_most_task(current_root) != Some(task);

        let mut moved = false;
        if different_top_task && !launch.avoid_move_to_front {
            let launch_root = match (launch.launch_root_task, target_display) {
                (Some(root), _) => Some(root),
                (None, Some(display)) if Some(display) != task_display => {
                    let area = h
                        .default_task_display_area(display)
                        .ok_or(HierarchyError::MissingNode(display))?;
                    let (root, created) = h.get_or_create_root_task(
                        area,
                        h.windowing_mode(current_root),
                        h.activity_type(current_root),
                    )?;
                    if created {
                        self.created.push(root);
                    }
                    Some(root)
                }
                (None, _) => None,
            };

            match launch_root.filter(|&root| root != current_root) {
                None => {
                    let split_top = h.windowing_mode(current_root).is_split()
                        && h.top_most_task(current_root) == Some(task);
                    h.move_task_to_front(task);
                    moved = !split_top;
                }
                Some(root)
                    if h.display_of(root) == task_display
                        && h.adjacent(root).is_some_and(|adjacent| h.parent(task) == Some(adjacent)) =>
                {
                    debug!("keeping task in the root task adjacent to the launch root");
                    h.move_task_to_front(task);
                    moved = true;
                }
                Some(root) => {
                    debug!("reparenting task to the launch root task");
                    h.reparent(task, root, Position::Top)?;
                    h.move_task_to_front(task);
                    moved = true;
                }
            }
        }

        let single_top =
            flags.contains(IntentFlags::SINGLE_TOP) || launch_mode.is_single_top_like();
        let mut add = false;
        let mut delivered = None;

        if flags.contains(IntentFlags::NEW_TASK | IntentFlags::CLEAR_TASK) {
            for activity in h.activities(task) {
                h.remove(activity);
            }
            self.cleared_task = true;
            add = true;
        } else if flags.contains(IntentFlags::CLEAR_TOP) || launch_mode.requires_new_task() {
            match h.find_activity_in(task, &component) {
                Some(existing) => {
                    let above: Vec<_> = h
                        .activities(task)
                        .into_iter()
                        .take_while(|&key| key != existing)
                        .collect();
                    for key in above {
                        h.remove(key);
                    }

                    let replace = flags.contains(IntentFlags::CLEAR_TOP)
                        && !flags.contains(IntentFlags::SINGLE_TOP)
                        && launch_mode == LaunchMode::Multiple;
                    if replace {
                        h.remove(existing);
                        add = true;
                    } else {
                        delivered = Some(existing);
                    }
                }
                None => add = true,
            }
        } else if let Some(top) = h
            .top_running_activity(task)
            .filter(|&top| single_top && is_same_activity(h, top, &record))
        {
            delivered = Some(top);
        } else if h
            .task(task)
            .is_some_and(|data| data.root_component.as_ref() == Some(&component))
        {
            let root_intent = h
                .activities(task)
                .into_iter()
                .rev()
                .find_map(|key| h.activity(key).filter(|r| r.is_running()))
                .map(|root| root.intent.clone());
            add = !root_intent.is_some_and(|intent| intent.filter_equals(&record.intent));
        } else {
            add = !flags.contains(IntentFlags::RESET_TASK_IF_NEEDED);
        }

        let display = h.display_of(task).unwrap_or(launch.display);

        if add {
            let key = h.add_activity(task, record, Position::Top)?;
            self.created.push(key);
            self.out_activity = Some(key);
            if !launch.launch_task_behind && !launch.avoid_move_to_front {
                h.move_task_to_front(task);
            }

            self.state = StarterState::PropagatingVisibility;
            propagate_visibility(h, services, display, Some(key), launch.trace_visibility);
            return Ok(StartResult::Success);
        }

        let top = match delivered {
            Some(key) => {
                deliver_new_intent(h, services, key, record.intent, launch.launch_cookie);
                Some(key)
            }
            None => {
                let top = h.top_running_activity(task);
                if let (Some(cookie), Some(record)) =
                    (launch.launch_cookie, top.and_then(|key| h.activity_mut(key)))
                {
                    record.launch_cookie = Some(cookie);
                }
                top
            }
        };
        self.out_activity = top;

        self.state = StarterState::PropagatingVisibility;
        propagate_visibility(h, services, display, None, launch.trace_visibility);

        Ok(if moved {
            StartResult::TaskToFront
        } else {
            StartResult::DeliveredToTop
        })
    }

    fn post_start(
        &mut self,
        g: &mut GlobalState,
        activity: Option<NodeKey>,
        result: StartResult,
        root_task: Option<NodeKey>,
    ) {
        if !result.is_successful() {
            if self.froze_task_list {
                self.froze_task_list = false;
                g.services
                    .recents
                    .reset_freeze_task_list_reordering_on_timeout();
            }
            if let Some(options) = self.request.options.as_mut() {
                options.abort();
            }
        }

        let h = &g.hierarchy;
        let task = activity
            .and_then(|key| h.parent(key))
            .and_then(|parent| h.task_of(parent));
        let task_id = task.and_then(|task| h.task(task)).map(|data| data.id);

        if matches!(
            result,
            StartResult::TaskToFront | StartResult::DeliveredToTop
        ) {
            if let (Some(task), Some(id)) = (task, task_id) {
                let display = root_task.or(Some(task)).and_then(|key| h.display_of(key));
                let attempt = RestartAttempt {
                    task: id,
                    home_task_visible: display.is_some_and(|display| is_home_visible(h, display)),
                    cleared_task: self.cleared_task,
                    was_visible: self
                        .task_was_visible
                        .unwrap_or_else(|| has_visible_activity(h, task)),
                };
                g.services
                    .task_changes
                    .notify_activity_restart_attempt(&attempt);
            }
        }

        if matches!(result, StartResult::Success | StartResult::TaskToFront)
            && !self.caller_is_recents
            && !self.freeze_requested()
        {
            if let Some(id) = task_id {
                g.services.recents.add(id);
            }
        }

        let component = self
            .request
            .activity_info
            .as_ref()
            .map(|info| info.component.clone())
            .or_else(|| self.request.intent.component.clone());
        g.services.metrics.notify_activity_launched(&ActivityLaunched {
            result,
            new_activity_created: result == StartResult::Success,
            activity,
            component,
            has_options: self.request.options.is_some(),
        });
    }
}

fn supports_voice(services: &Services, component: &ComponentName, intent: &Intent) -> bool {
    match services.packages.activity_supports_intent(component, intent) {
        Ok(supported) => supported,
        Err(err) => {
            warn!("error checking voice support of {component}: {err}");
            false
        }
    }
}

/// Whether `task` has a running activity the host wants visible.
fn has_visible_activity(h: &Hierarchy, task: NodeKey) -> bool {
    h.activities(task).into_iter().any(|key| {
        h.activity(key)
            .is_some_and(|record| record.is_running() && record.visible_requested)
    })
}

fn is_same_activity(h: &Hierarchy, key: NodeKey, record: &ActivityRecord) -> bool {
    h.activity(key).is_some_and(|existing| {
        existing.component() == record.component() && existing.user_id == record.user_id
    })
}

/// Top activity of the focused root task of `display` if the launch can go to it instead of
/// creating a new instance.
fn deliverable_top(
    h: &Hierarchy,
    display: NodeKey,
    record: &ActivityRecord,
    flags: IntentFlags,
) -> Option<NodeKey> {
    if !flags.contains(IntentFlags::SINGLE_TOP) && !record.launch_mode().is_single_top_like() {
        return None;
    }

    let root = h.focused_root_task(display)?;
    let top = h.top_running_activity(root)?;
    let attached = h.activity(top)?.attached;
    (attached && is_same_activity(h, top, record)).then_some(top)
}

fn adjacent_fragment_of_source(h: &Hierarchy, launch: &Launch) -> Option<NodeKey> {
    if !launch.flags.contains(IntentFlags::LAUNCH_ADJACENT) || launch.launch_root_task.is_some() {
        return None;
    }

    let parent = h.parent(launch.source?)?;
    h.task_fragment(parent)?;
    h.adjacent(parent)
}

fn deliver_new_intent(
    h: &mut Hierarchy,
    services: &mut Services,
    key: NodeKey,
    intent: Intent,
    cookie: Option<LaunchCookie>,
) {
    let Some(record) = h.activity_mut(key) else {
        return;
    };

    record.deliver_new_intent(intent);
    if cookie.is_some() {
        record.launch_cookie = cookie;
    }
    services
        .process
        .schedule_transaction(key, record, ClientTransaction::NewIntent);
}

fn is_home_visible(h: &Hierarchy, display: NodeKey) -> bool {
    h.root_tasks(display).into_iter().any(|root| {
        h.activity_type(root) == ActivityType::Home && h.should_be_visible(root, None)
    })
}

fn propagate_visibility(
    h: &mut Hierarchy,
    services: &mut Services,
    display: NodeKey,
    starting: Option<NodeKey>,
    trace: bool,
) {
    let params = VisibilityParams {
        starting,
        preserve_windows: false,
        ..VisibilityParams::default()
    };
    visibility::ensure_display_visible(h, services, display, &params);
    visibility::resume_focused_top_activity(h, services, display);

    if trace {
        debug!("hierarchy after visibility update:\n{}", h.debug_tree());
    }
}
