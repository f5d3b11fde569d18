//! Host context owning the hierarchy and the global lock.

use std::time::Duration;

use launchpad_config::Config;
use launchpad_ipc::HierarchyNode;
use parking_lot::{Mutex, MutexGuard};

use crate::hierarchy::{ConfigChanges, Hierarchy, NodeKey};
use crate::services::{LaunchParamsModifier, Services};
use crate::starter::launch_params::LaunchParamsController;
use crate::starter::ActivityStarter;
use crate::visibility::{self, VisibilityParams};

/// Runtime switches derived from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub background_activity_starts_enabled: bool,
    pub activity_starts_logging_enabled: bool,
    pub recents_freeze_timeout: Duration,
    pub recents_max_tasks: usize,
    /// Log the hierarchy after every visibility pass.
    pub trace_visibility: bool,
}

impl Options {
    pub fn from_config(config: &Config) -> Self {
        Self {
            background_activity_starts_enabled: config.allow_background_activity_starts,
            activity_starts_logging_enabled: config.log_activity_starts,
            recents_freeze_timeout: config.recents.freeze_timeout(),
            recents_max_tasks: config.recents.max_tasks.max(1),
            trace_visibility: config.debug.trace_visibility,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything guarded by the global lock.
#[derive(Debug)]
pub struct GlobalState {
    pub hierarchy: Hierarchy,
    pub services: Services,
    pub options: Options,
    pub launch_params: LaunchParamsController,
}

#[derive(Debug)]
pub struct ActivityTaskManager {
    global: Mutex<GlobalState>,
}

impl ActivityTaskManager {
    pub fn new(hierarchy: Hierarchy, services: Services, options: Options) -> Self {
        Self {
            global: Mutex::new(GlobalState {
                hierarchy,
                services,
                options,
                launch_params: LaunchParamsController::new(),
            }),
        }
    }

    /// Acquires the global lock. It is released when the guard goes out of scope.
    pub fn lock(&self) -> MutexGuard<'_, GlobalState> {
        self.global.lock()
    }

    /// Returns a new single-use launch request.
    pub fn starter(&self) -> ActivityStarter<'_> {
        ActivityStarter::new(self)
    }

    pub fn register_launch_params_modifier(&self, modifier: Box<dyn LaunchParamsModifier>) {
        self.lock().launch_params.register(modifier);
    }

    pub fn with_hierarchy<T>(&self, f: impl FnOnce(&mut Hierarchy) -> T) -> T {
        f(&mut self.lock().hierarchy)
    }

    pub fn ensure_activities_visible(
        &self,
        container: NodeKey,
        params: &VisibilityParams,
    ) -> ConfigChanges {
        let mut guard = self.lock();
        let GlobalState {
            hierarchy,
            services,
            ..
        } = &mut *guard;
        visibility::ensure_activities_visible(hierarchy, services, container, params)
    }

    pub fn snapshot(&self) -> Vec<HierarchyNode> {
        self.lock().hierarchy.snapshot()
    }

    pub fn into_inner(self) -> GlobalState {
        self.global.into_inner()
    }
}
