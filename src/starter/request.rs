use std::fmt;

use crate::hierarchy::{DisplayId, NodeKey, WindowingMode};
use crate::intent::{ActivityInfo, CallerToken, Intent, LaunchCookie, Uid, VoiceSession};
use crate::utils::Rect;

/// Parameters of one launch, filled by the starter's setters.
#[derive(Debug, Default)]
pub struct Request {
    pub caller: Option<CallerToken>,
    /// Falls back to the caller process' uid, then to the system uid.
    pub calling_uid: Option<Uid>,
    /// Falls back to the calling uid.
    pub real_calling_uid: Option<Uid>,
    pub calling_package: Option<String>,
    pub intent: Intent,
    /// Resolved through the package authority when missing.
    pub activity_info: Option<ActivityInfo>,
    /// Activity that started this one and may receive its result.
    pub result_to: Option<NodeKey>,
    pub request_code: Option<i32>,
    pub voice_session: Option<VoiceSession>,
    pub options: Option<ActivityOptions>,
    pub in_task: Option<NodeKey>,
    pub in_task_fragment: Option<NodeKey>,
    pub reason: String,
}

/// Caller-supplied launch options.
#[derive(Default)]
pub struct ActivityOptions {
    pub launch_bounds: Option<Rect>,
    pub launch_display_id: Option<DisplayId>,
    pub launch_root_task: Option<NodeKey>,
    pub launch_windowing_mode: WindowingMode,
    pub freeze_recent_tasks_reordering: bool,
    pub launch_cookie: Option<LaunchCookie>,
    /// Start the task behind the current one and leave focus alone.
    pub launch_task_behind: bool,
    pub avoid_move_to_front: bool,
    pub(crate) abort_hook: Option<Box<dyn FnOnce() + Send>>,
}

impl ActivityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a callback releasing whatever the caller tied to this launch. It runs at most once,
    /// when the launch does not go through.
    pub fn with_abort_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.abort_hook = Some(Box::new(hook));
        self
    }

    pub fn abort(&mut self) {
        if let Some(hook) = self.abort_hook.take() {
            debug!("aborting launch options");
            hook();
        }
    }
}

impl fmt::Debug for ActivityOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityOptions")
            .field("launch_bounds", &self.launch_bounds)
            .field("launch_display_id", &self.launch_display_id)
            .field("launch_root_task", &self.launch_root_task)
            .field("launch_windowing_mode", &self.launch_windowing_mode)
            .field(
                "freeze_recent_tasks_reordering",
                &self.freeze_recent_tasks_reordering,
            )
            .field("launch_cookie", &self.launch_cookie)
            .field("launch_task_behind", &self.launch_task_behind)
            .field("avoid_move_to_front", &self.avoid_move_to_front)
            .field("abort_hook", &self.abort_hook.is_some())
            .finish()
    }
}
