//! Policy for activity starts coming from apps the user is not looking at.

use std::fmt;

use crate::intent::{Uid, UserId};

/// How important a process currently is, most important first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessImportance {
    Persistent,
    /// Hosts the activity the user is interacting with.
    Top,
    BoundTop,
    ForegroundService,
    Service,
    Cached,
    #[default]
    NonExistent,
}

impl ProcessImportance {
    pub fn is_top(self) -> bool {
        self == Self::Top
    }
}

/// Everything the gate looks at for one start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundStartQuery {
    pub calling_uid: Uid,
    pub calling_importance: ProcessImportance,
    pub calling_has_visible_window: bool,
    pub real_calling_uid: Uid,
    pub real_calling_importance: ProcessImportance,
    pub real_calling_has_visible_window: bool,
    pub has_foreground_activities: bool,
    pub caller_is_recents: bool,
    pub has_background_start_token: bool,
    pub instrumenting_with_background_start_privileges: bool,
    pub calling_uid_is_device_owner: bool,
    pub calling_uid_is_input_method: bool,
    /// The start would land on a single-instance activity in a pinned root task.
    pub target_is_pinned_single_instance: bool,
}

impl BackgroundStartQuery {
    /// A caller with nothing going for it.
    pub fn new(calling_uid: Uid, real_calling_uid: Uid) -> Self {
        Self {
            calling_uid,
            calling_importance: ProcessImportance::NonExistent,
            calling_has_visible_window: false,
            real_calling_uid,
            real_calling_importance: ProcessImportance::NonExistent,
            real_calling_has_visible_window: false,
            has_foreground_activities: false,
            caller_is_recents: false,
            has_background_start_token: false,
            instrumenting_with_background_start_privileges: false,
            calling_uid_is_device_owner: false,
            calling_uid_is_input_method: false,
            target_is_pinned_single_instance: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    StartsEnabled,
    PinnedSingleInstance,
    PrivilegedUid,
    TopProcess,
    VisibleWindow,
    ForegroundActivities,
    Recents,
    StartToken,
    Instrumentation,
    DeviceOwner,
    InputMethod,
}

impl fmt::Display for AllowReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AllowReason::StartsEnabled => "background starts enabled",
            AllowReason::PinnedSingleInstance => "pinned single instance target",
            AllowReason::PrivilegedUid => "privileged uid",
            AllowReason::TopProcess => "top process",
            AllowReason::VisibleWindow => "visible window",
            AllowReason::ForegroundActivities => "foreground activities",
            AllowReason::Recents => "recents",
            AllowReason::StartToken => "background start token",
            AllowReason::Instrumentation => "instrumentation",
            AllowReason::DeviceOwner => "device owner",
            AllowReason::InputMethod => "input method",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundStartVerdict {
    Allowed(AllowReason),
    Aborted,
}

impl BackgroundStartVerdict {
    pub fn is_aborted(self) -> bool {
        self == Self::Aborted
    }
}

fn is_privileged_uid(uid: Uid) -> bool {
    matches!(uid.for_user(UserId(0)), Uid::ROOT | Uid::SYSTEM | Uid::NFC)
}

/// Decides a start, returning the first reason that allows it.
pub fn check(starts_enabled: bool, q: &BackgroundStartQuery) -> BackgroundStartVerdict {
    use AllowReason::*;

    let reason = if starts_enabled {
        StartsEnabled
    } else if q.target_is_pinned_single_instance {
        PinnedSingleInstance
    } else if is_privileged_uid(q.calling_uid) || is_privileged_uid(q.real_calling_uid) {
        PrivilegedUid
    } else if q.calling_importance.is_top() || q.real_calling_importance.is_top() {
        TopProcess
    } else if q.calling_has_visible_window || q.real_calling_has_visible_window {
        VisibleWindow
    } else if q.has_foreground_activities {
        ForegroundActivities
    } else if q.caller_is_recents {
        Recents
    } else if q.has_background_start_token {
        StartToken
    } else if q.instrumenting_with_background_start_privileges {
        Instrumentation
    } else if q.calling_uid_is_device_owner {
        DeviceOwner
    } else if q.calling_uid_is_input_method {
        InputMethod
    } else {
        return BackgroundStartVerdict::Aborted;
    };

    BackgroundStartVerdict::Allowed(reason)
}

pub fn should_abort(starts_enabled: bool, q: &BackgroundStartQuery) -> bool {
    check(starts_enabled, q).is_aborted()
}
