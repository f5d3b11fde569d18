//! Descriptors shared by launch requests and activity records.

use std::fmt;

use bitflags::bitflags;

/// Category added to an intent before asking whether a target accepts voice interaction.
pub const CATEGORY_VOICE: &str = "category.VOICE";

/// Number of uids reserved per user.
const PER_USER_RANGE: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub u32);

impl Uid {
    pub const ROOT: Uid = Uid(0);
    pub const SYSTEM: Uid = Uid(1000);
    pub const NFC: Uid = Uid(1027);

    pub fn user_id(self) -> UserId {
        UserId(self.0 / PER_USER_RANGE)
    }

    /// Uid of the same app id under another user.
    pub fn for_user(self, user: UserId) -> Uid {
        Uid(user.0 * PER_USER_RANGE + self.0 % PER_USER_RANGE)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u32);

/// Handle of a client process as presented by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerToken(pub u64);

/// Handle of a voice interaction session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceSession(pub u64);

/// Opaque value a launcher attaches to a launch so it can recognize the resulting activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchCookie(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class)
    }
}

bitflags! {
    /// Launch flags carried by an intent.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IntentFlags: u32 {
        const LAUNCH_ADJACENT = 0x0000_1000;
        const CLEAR_TASK = 0x0000_8000;
        const NO_ANIMATION = 0x0001_0000;
        const REORDER_TO_FRONT = 0x0002_0000;
        const RESET_TASK_IF_NEEDED = 0x0020_0000;
        const FORWARD_RESULT = 0x0200_0000;
        const CLEAR_TOP = 0x0400_0000;
        const MULTIPLE_TASK = 0x0800_0000;
        const NEW_TASK = 0x1000_0000;
        const SINGLE_TOP = 0x2000_0000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extra {
    Text { key: String, value: String },
    /// Raw descriptor number. Never allowed through a launch request.
    FileDescriptor { key: String, fd: i32 },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Intent {
    pub component: Option<ComponentName>,
    pub flags: IntentFlags,
    pub categories: Vec<String>,
    pub data: Option<String>,
    pub extras: Vec<Extra>,
}

impl Intent {
    pub fn for_component(component: ComponentName) -> Self {
        Self {
            component: Some(component),
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: IntentFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn has_file_descriptors(&self) -> bool {
        self.extras
            .iter()
            .any(|extra| matches!(extra, Extra::FileDescriptor { .. }))
    }

    pub fn add_category(&mut self, category: &str) {
        if !self.has_category(category) {
            self.categories.push(category.to_owned());
        }
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// Whether two intents address the same thing, ignoring flags and extras.
    pub fn filter_equals(&self, other: &Intent) -> bool {
        self.component == other.component
            && self.data == other.data
            && self.categories == other.categories
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchMode {
    #[default]
    Multiple,
    SingleTop,
    SingleTask,
    SingleInstance,
}

impl LaunchMode {
    /// Whether a matching activity on top receives the intent instead of a new instance.
    pub fn is_single_top_like(self) -> bool {
        matches!(self, Self::SingleTop | Self::SingleTask)
    }

    /// Whether the activity always lives in its own task.
    pub fn requires_new_task(self) -> bool {
        matches!(self, Self::SingleTask | Self::SingleInstance)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityType {
    Undefined,
    #[default]
    Standard,
    Home,
    Recents,
    Assistant,
}

/// Preferred initial size declared by an activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowLayout {
    pub width: Option<i32>,
    pub height: Option<i32>,
}

/// Resolved metadata of an activity component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityInfo {
    pub component: ComponentName,
    /// Uid of the application that owns the component.
    pub uid: Uid,
    pub launch_mode: LaunchMode,
    /// Task affinity, defaults to the package name.
    pub task_affinity: Option<String>,
    pub activity_type: ActivityType,
    pub window_layout: Option<WindowLayout>,
    pub translucent: bool,
    pub show_when_locked: bool,
}

impl ActivityInfo {
    pub fn new(component: ComponentName, uid: Uid) -> Self {
        Self {
            component,
            uid,
            launch_mode: LaunchMode::Multiple,
            task_affinity: None,
            activity_type: ActivityType::Standard,
            window_layout: None,
            translucent: false,
            show_when_locked: false,
        }
    }

    pub fn with_launch_mode(mut self, launch_mode: LaunchMode) -> Self {
        self.launch_mode = launch_mode;
        self
    }

    pub fn affinity(&self) -> &str {
        self.task_affinity
            .as_deref()
            .unwrap_or(&self.component.package)
    }
}
