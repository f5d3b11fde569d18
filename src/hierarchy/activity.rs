use bitflags::bitflags;
use launchpad_ipc::ActivityStateSnapshot;

use crate::intent::{
    ActivityInfo, ActivityType, ComponentName, Intent, LaunchCookie, LaunchMode, Uid, UserId,
};

bitflags! {
    /// Configuration fields that changed and still need to reach the client.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConfigChanges: u32 {
        const LOCALE = 0x0004;
        const ORIENTATION = 0x0080;
        const UI_MODE = 0x0200;
        const SCREEN_SIZE = 0x0400;
        const SMALLEST_SCREEN_SIZE = 0x0800;
        const DENSITY = 0x1000;
        const LAYOUT_DIRECTION = 0x2000;
        const WINDOW_CONFIGURATION = 0x2000_0000;
        const FONT_SCALE = 0x4000_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Initializing,
    Resumed,
    Paused,
    Stopped,
    Destroyed,
}

impl ActivityState {
    pub fn to_snapshot(self) -> ActivityStateSnapshot {
        match self {
            ActivityState::Initializing => ActivityStateSnapshot::Initializing,
            ActivityState::Resumed => ActivityStateSnapshot::Resumed,
            ActivityState::Paused => ActivityStateSnapshot::Paused,
            ActivityState::Stopped => ActivityStateSnapshot::Stopped,
            ActivityState::Destroyed => ActivityStateSnapshot::Destroyed,
        }
    }
}

/// One presentable UI unit hosted in a task or task fragment.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub info: ActivityInfo,
    pub intent: Intent,
    pub user_id: UserId,
    pub launched_from_uid: Uid,
    pub launched_from_package: Option<String>,
    pub state: ActivityState,
    pub finishing: bool,
    /// Whether the host wants the activity visible.
    pub visible_requested: bool,
    /// Visibility last committed by the client.
    pub visible: bool,
    pub visible_ignoring_keyguard: bool,
    /// Visibility was requested without telling the client yet.
    pub client_visibility_deferred: bool,
    pub launch_task_behind: bool,
    /// A process start was requested so the activity can come back.
    pub restarting: bool,
    /// Whether a backing process is attached.
    pub attached: bool,
    pub config_change_flags: ConfigChanges,
    /// Set while the screen is frozen for this activity's restart.
    pub frozen_config_changes: Option<ConfigChanges>,
    pub launch_cookie: Option<LaunchCookie>,
    pub new_intents: Vec<Intent>,
}

impl ActivityRecord {
    pub fn new(info: ActivityInfo, intent: Intent) -> Self {
        Self {
            user_id: info.uid.user_id(),
            launched_from_uid: info.uid,
            launched_from_package: None,
            info,
            intent,
            state: ActivityState::Initializing,
            finishing: false,
            visible_requested: false,
            visible: false,
            visible_ignoring_keyguard: false,
            client_visibility_deferred: false,
            launch_task_behind: false,
            restarting: false,
            attached: false,
            config_change_flags: ConfigChanges::empty(),
            frozen_config_changes: None,
            launch_cookie: None,
            new_intents: Vec::new(),
        }
    }

    pub fn component(&self) -> &ComponentName {
        &self.info.component
    }

    pub fn launch_mode(&self) -> LaunchMode {
        self.info.launch_mode
    }

    pub fn is_activity_type_home(&self) -> bool {
        self.info.activity_type == ActivityType::Home
    }

    pub fn is_state(&self, state: ActivityState) -> bool {
        self.state == state
    }

    /// Whether the activity can still be shown: not finishing and not torn down.
    pub fn is_running(&self) -> bool {
        !self.finishing && self.state != ActivityState::Destroyed
    }

    pub fn occludes_parent(&self) -> bool {
        !self.finishing && !self.info.translucent
    }

    pub fn set_state(&mut self, state: ActivityState, reason: &str) {
        if self.state == state {
            return;
        }

        trace!(
            "{}: {:?} -> {:?} ({reason})",
            self.info.component,
            self.state,
            state
        );
        self.state = state;
    }

    pub fn deliver_new_intent(&mut self, intent: Intent) {
        debug!("delivering new intent to {}", self.info.component);
        self.new_intents.push(intent);
    }

    /// Drops the pending initialization of an activity that will not be shown after all.
    pub fn cancel_initializing(&mut self) {
        if self.state == ActivityState::Initializing {
            self.set_state(ActivityState::Stopped, "cancel initializing");
        }
    }

    pub fn start_freezing_screen(&mut self, config_changes: ConfigChanges) {
        let frozen = self.frozen_config_changes.get_or_insert(ConfigChanges::empty());
        *frozen |= config_changes;
    }

    pub fn finish(&mut self, reason: &str) {
        if self.finishing {
            return;
        }

        debug!("finishing {} ({reason})", self.info.component);
        self.finishing = true;
        self.visible_requested = false;
    }
}
