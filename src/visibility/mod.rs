//! Visibility propagation over task and task fragment subtrees.
//!
//! One pass walks the children of a container from the top down, keeping track of whether
//! everything below has already been occluded. Nested containers that host a running activity
//! are processed first, so the outer occlusion bookkeeping sees their final state. Each activity
//! is then made visible, restarted or made invisible, and the client is told about it through
//! the process collaborator.

use crate::hierarchy::{ActivityState, ConfigChanges, Hierarchy, NodeKey};
use crate::intent::ActivityType;
use crate::services::{ClientTransaction, Services};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityParams {
    /// Activity being started or resumed. Callers make sure it ends up visible.
    pub starting: Option<NodeKey>,
    /// Configuration changes accumulated so far.
    pub config_changes: ConfigChanges,
    pub preserve_windows: bool,
    /// Whether configuration and visibility changes are sent to the clients.
    pub notify_clients: bool,
}

impl Default for VisibilityParams {
    fn default() -> Self {
        Self {
            starting: None,
            config_changes: ConfigChanges::empty(),
            preserve_windows: false,
            notify_clients: true,
        }
    }
}

impl VisibilityParams {
    pub fn starting(starting: NodeKey) -> Self {
        Self {
            starting: Some(starting),
            ..Self::default()
        }
    }
}

/// Updates the visibility of every activity below `container`, which must be a task or a task
/// fragment.
///
/// Returns the configuration changes of the visited visible activities combined with the ones
/// passed in.
pub fn ensure_activities_visible(
    hierarchy: &mut Hierarchy,
    services: &mut Services,
    container: NodeKey,
    params: &VisibilityParams,
) -> ConfigChanges {
    if !hierarchy.is_fragment_like(container) {
        warn!("ignoring visibility update for a node that is not a task or task fragment");
        return params.config_changes;
    }

    let mut pass = VisibilityPass::new(hierarchy, services, container, *params, false);
    pass.process(hierarchy, services);
    pass.config_changes
}

/// Runs [`ensure_activities_visible`] over every root task of `display`, top to bottom.
pub fn ensure_display_visible(
    hierarchy: &mut Hierarchy,
    services: &mut Services,
    display: NodeKey,
    params: &VisibilityParams,
) -> ConfigChanges {
    let mut config_changes = params.config_changes;
    for root in hierarchy.root_tasks(display) {
        config_changes |= ensure_activities_visible(hierarchy, services, root, params);
    }
    config_changes
}

/// Runs [`ensure_display_visible`] over every display.
pub fn ensure_all_visible(
    hierarchy: &mut Hierarchy,
    services: &mut Services,
    params: &VisibilityParams,
) -> ConfigChanges {
    let mut config_changes = params.config_changes;
    for display in hierarchy.displays().to_vec() {
        config_changes |= ensure_display_visible(hierarchy, services, display, params);
    }
    config_changes
}

/// State of one pass over the direct children of a container.
#[derive(Debug)]
struct VisibilityPass {
    container: NodeKey,
    top: Option<NodeKey>,
    /// Still walking activities stacked above `top`.
    above_top: bool,
    container_should_be_visible: bool,
    /// Everything further down is hidden behind what was already visited.
    behind_fully_occluded: bool,
    /// A visible home activity hides the rest of its root task.
    home_occludes_below: bool,
    keyguard_locked: bool,
    is_home: bool,
    config_changes: ConfigChanges,
    params: VisibilityParams,
}

impl VisibilityPass {
    fn new(
        hierarchy: &Hierarchy,
        services: &Services,
        container: NodeKey,
        params: VisibilityParams,
        occluded: bool,
    ) -> Self {
        let top = hierarchy.top_running_activity(container);
        let container_should_be_visible = hierarchy.should_be_visible(container, params.starting);
        let keyguard_locked = hierarchy
            .display_of(container)
            .and_then(|display| hierarchy.display_id(display))
            .is_some_and(|id| services.keyguard.is_keyguard_locked(id));

        Self {
            container,
            top,
            above_top: top.is_some(),
            container_should_be_visible,
            behind_fully_occluded: !container_should_be_visible || occluded,
            home_occludes_below: false,
            keyguard_locked,
            is_home: hierarchy.activity_type(container) == ActivityType::Home,
            config_changes: params.config_changes,
            params,
        }
    }

    fn process(&mut self, hierarchy: &mut Hierarchy, services: &mut Services) {
        let starting = self.params.starting;

        // Activities launched behind are kept visible under other fullscreen activities and must
        // not be resumed.
        let resume_top_activity = self.top.is_some_and(|top| {
            hierarchy
                .activity(top)
                .is_some_and(|record| !record.launch_task_behind)
        }) && self.container_should_be_visible
            && !starting.is_some_and(|starting| hierarchy.is_descendant_of(starting, self.container));

        let container_bounds = hierarchy.bounds(self.container);
        let mut adjacent_fragments: Vec<NodeKey> = Vec::new();

        let children = hierarchy.children(self.container).to_vec();
        for &child in children.iter().rev() {
            if hierarchy.is_fragment_like(child) {
                if !hierarchy.has_running_activity(child) {
                    continue;
                }

                let mut nested = VisibilityPass::new(
                    hierarchy,
                    services,
                    child,
                    self.params,
                    self.behind_fully_occluded,
                );
                nested.process(hierarchy, services);
                self.config_changes |= nested.config_changes;
                self.home_occludes_below |= nested.home_occludes_below;
                self.behind_fully_occluded |= nested.home_occludes_below;

                self.behind_fully_occluded |= hierarchy.bounds(child) == container_bounds
                    && !hierarchy.is_translucent(child, starting);

                if self.above_top
                    && self
                        .top
                        .is_some_and(|top| hierarchy.is_descendant_of(top, child))
                {
                    self.above_top = false;
                }

                if self.behind_fully_occluded {
                    continue;
                }

                if adjacent_fragments.contains(&child) {
                    let pair_opaque = !hierarchy.is_translucent(child, starting)
                        && hierarchy
                            .adjacent(child)
                            .is_some_and(|adjacent| !hierarchy.is_translucent(adjacent, starting));
                    if pair_opaque {
                        self.behind_fully_occluded = true;
                    }
                    continue;
                }

                if let Some(adjacent) = hierarchy.adjacent(child) {
                    adjacent_fragments.push(adjacent);
                }
            } else if hierarchy.is_activity(child) {
                self.set_activity_visibility_state(
                    hierarchy,
                    services,
                    child,
                    resume_top_activity,
                );
            }
        }
    }

    fn set_activity_visibility_state(
        &mut self,
        hierarchy: &mut Hierarchy,
        services: &mut Services,
        key: NodeKey,
        resume_top_activity: bool,
    ) {
        let is_top = self.top == Some(key);
        if self.above_top && !is_top {
            return;
        }
        self.above_top = false;

        let behind_fully_occluded = self.behind_fully_occluded;
        let container_should_be_visible = self.container_should_be_visible;
        let keyguard_locked = self.keyguard_locked;

        let Some(record) = hierarchy.activity_mut(key) else {
            return;
        };

        record.visible_ignoring_keyguard = !behind_fully_occluded || record.launch_task_behind;
        let really_visible = record.visible_ignoring_keyguard
            && container_should_be_visible
            && (!keyguard_locked || record.info.show_when_locked);

        if record.visible_ignoring_keyguard {
            self.behind_fully_occluded = record.occludes_parent();
        } else if record.is_state(ActivityState::Initializing) {
            record.cancel_initializing();
        }

        trace!(
            "{}: visible={really_visible} occluded_below={}",
            record.component(),
            self.behind_fully_occluded
        );

        if really_visible {
            if record.finishing {
                return;
            }
            self.make_visible(hierarchy, services, key, is_top, resume_top_activity);
        } else {
            make_invisible(hierarchy, services, key);
        }

        if !self.behind_fully_occluded && self.is_home && hierarchy.is_root_of_task(key) {
            // Nothing else in the home root task shows through behind the home activity.
            self.behind_fully_occluded = true;
            self.home_occludes_below = true;
        }
    }

    fn make_visible(
        &mut self,
        hierarchy: &mut Hierarchy,
        services: &mut Services,
        key: NodeKey,
        is_top: bool,
        resume_top_activity: bool,
    ) {
        let VisibilityParams {
            starting,
            preserve_windows,
            notify_clients,
            ..
        } = self.params;
        let is_starting = starting == Some(key);

        let Some(record) = hierarchy.activity(key) else {
            return;
        };

        if !is_starting && notify_clients {
            services.process.schedule_transaction(
                key,
                record,
                ClientTransaction::Configuration { preserve_windows },
            );
        }

        if !record.attached {
            self.make_visible_and_restart_if_needed(
                hierarchy,
                services,
                key,
                is_top,
                resume_top_activity && is_top,
            );
        } else if record.visible_requested {
            if record.client_visibility_deferred && notify_clients {
                make_active_if_needed(hierarchy, services, key);
                if let Some(record) = hierarchy.activity_mut(key) {
                    record.client_visibility_deferred = false;
                }
            }
            if notify_clients {
                make_active_if_needed(hierarchy, services, key);
            }
        } else {
            make_visible_if_needed(hierarchy, services, key, is_starting, notify_clients);
        }

        if let Some(record) = hierarchy.activity(key) {
            self.config_changes |= record.config_change_flags;
        }
    }

    fn make_visible_and_restart_if_needed(
        &self,
        hierarchy: &mut Hierarchy,
        services: &mut Services,
        key: NodeKey,
        is_top: bool,
        and_resume: bool,
    ) {
        let is_starting = self.params.starting == Some(key);
        let Some(record) = hierarchy.activity_mut(key) else {
            return;
        };

        // A visible activity that lost its process below the top stays dead on screen rather
        // than being restarted over and over.
        if !is_top && record.visible_requested && !record.is_state(ActivityState::Initializing) {
            return;
        }

        if !is_starting {
            record.start_freezing_screen(self.config_changes);
        }
        if !record.visible_requested || record.launch_task_behind {
            debug!("making {} visible before starting it", record.component());
            record.visible_requested = true;
        }
        if !is_starting {
            record.restarting = true;
            services
                .process
                .start_specific_activity(key, record, and_resume, true);
        }
    }
}

fn make_visible_if_needed(
    hierarchy: &mut Hierarchy,
    services: &mut Services,
    key: NodeKey,
    is_starting: bool,
    notify_clients: bool,
) {
    let Some(record) = hierarchy.activity_mut(key) else {
        return;
    };
    if record.is_state(ActivityState::Resumed) || is_starting {
        return;
    }

    record.visible_requested = true;
    if notify_clients {
        record.client_visibility_deferred = false;
        services
            .process
            .schedule_transaction(key, record, ClientTransaction::Visibility(true));
        make_active_if_needed(hierarchy, services, key);
    } else {
        record.client_visibility_deferred = true;
    }
}

/// Brings a stopped activity that is requested visible back to the paused state.
fn make_active_if_needed(hierarchy: &mut Hierarchy, services: &mut Services, key: NodeKey) {
    let Some(record) = hierarchy.activity_mut(key) else {
        return;
    };
    if !record.visible_requested || !record.is_state(ActivityState::Stopped) {
        return;
    }

    record.set_state(ActivityState::Paused, "make active");
    services
        .process
        .schedule_transaction(key, record, ClientTransaction::MakeActive);
}

fn make_invisible(hierarchy: &mut Hierarchy, services: &mut Services, key: NodeKey) {
    let Some(record) = hierarchy.activity_mut(key) else {
        return;
    };
    if !record.visible_requested {
        return;
    }

    debug!("making {} invisible", record.component());
    record.visible_requested = false;
    record.client_visibility_deferred = false;
    services
        .process
        .schedule_transaction(key, record, ClientTransaction::Visibility(false));

    if matches!(record.state, ActivityState::Resumed | ActivityState::Paused) {
        record.set_state(ActivityState::Stopped, "make invisible");
        services
            .process
            .schedule_transaction(key, record, ClientTransaction::Stop);
    }
}

/// Resumes the top running activity of the focused root task on `display` and moves every other
/// resumed activity there to paused, or to stopped when it is no longer requested visible.
///
/// Returns the activity that was resumed or asked to start.
pub fn resume_focused_top_activity(
    hierarchy: &mut Hierarchy,
    services: &mut Services,
    display: NodeKey,
) -> Option<NodeKey> {
    let root = hierarchy.focused_root_task(display)?;
    let top = hierarchy.top_running_activity(root)?;

    for other in hierarchy
        .root_tasks(display)
        .into_iter()
        .flat_map(|root| hierarchy.activities(root))
        .collect::<Vec<_>>()
    {
        if other == top {
            continue;
        }
        let Some(record) = hierarchy.activity_mut(other) else {
            continue;
        };
        if !record.is_state(ActivityState::Resumed) {
            continue;
        }

        let (state, transaction) = if record.visible_requested {
            (ActivityState::Paused, ClientTransaction::Pause)
        } else {
            (ActivityState::Stopped, ClientTransaction::Stop)
        };
        record.set_state(state, "another activity resumed");
        services
            .process
            .schedule_transaction(other, record, transaction);
    }

    let record = hierarchy.activity_mut(top)?;
    if !record.visible_requested {
        return None;
    }

    if record.attached {
        if !record.is_state(ActivityState::Resumed) {
            record.set_state(ActivityState::Resumed, "resume top activity");
            services
                .process
                .schedule_transaction(top, record, ClientTransaction::Resume);
        }
    } else if !record.restarting {
        record.restarting = true;
        services
            .process
            .start_specific_activity(top, record, true, true);
    }

    Some(top)
}
