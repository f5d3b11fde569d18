use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use clap::{Parser, Subcommand};
use launchpad_config::Config;
use launchpad_ipc::{HierarchyNode, StartReport};
use parking_lot::Mutex;
use serde::Serialize;

use crate::atm::{ActivityTaskManager, Options};
use crate::background::ProcessImportance;
use crate::hierarchy::{
    ActivityRecord, ActivityState, DisplayId, Hierarchy, NodeKey, Position, TaskSpec,
    WindowingMode,
};
use crate::intent::{
    ActivityInfo, ActivityType, CallerToken, ComponentName, Intent, IntentFlags, LaunchMode, Uid,
    UserId,
};
use crate::recents::RecentTasksList;
use crate::services::{
    ActivityLaunched, ActivityMetrics, ActivityStartLog, ClientTransaction, PackageAuthority,
    ProcessLifecycle, RemoteError, RestartAttempt, Services, StartPermissionCheck,
    TaskChangeNotifier, WindowProcess,
};
use crate::starter::{get_external_result, ActivityStarter, StartResult};
use crate::utils::Rect;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub subcommand: Sub,
}

#[derive(Subcommand)]
pub enum Sub {
    /// Validate the config file.
    Validate {
        /// Path to config file (default: built-in defaults).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run a scripted launch scenario and print the results.
    Demo {
        /// Path to config file (default: built-in defaults).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the results as JSON.
        #[arg(short, long)]
        json: bool,
    },
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path).map_err(|err| anyhow!("{err:?}")),
        None => Ok(Config::default()),
    }
}

pub fn validate(path: Option<&Path>) -> anyhow::Result<()> {
    load_config(path)?;
    info!("config is valid");
    Ok(())
}

// ============================================================================
// Demo collaborators
// ============================================================================

const PACKAGE: &str = "org.example";
const APP_UID: Uid = Uid(10_010);
const SYNC_UID: Uid = Uid(10_050);
const SYNC_CALLER: CallerToken = CallerToken(50);

/// Process layer that only logs what it is asked to do.
struct LoggingProcesses {
    processes: HashMap<CallerToken, WindowProcess>,
}

impl ProcessLifecycle for LoggingProcesses {
    fn get_process_controller(&self, caller: CallerToken) -> Option<WindowProcess> {
        self.processes.get(&caller).cloned()
    }

    fn has_active_visible_window(&self, _uid: Uid) -> bool {
        false
    }

    fn process_importance(&self, uid: Uid) -> ProcessImportance {
        if uid == SYNC_UID {
            ProcessImportance::Cached
        } else {
            ProcessImportance::NonExistent
        }
    }

    fn start_specific_activity(
        &mut self,
        _activity: NodeKey,
        record: &ActivityRecord,
        and_resume: bool,
        _check_config: bool,
    ) {
        info!("starting process for {} (resume: {and_resume})", record.info.component);
    }

    fn schedule_transaction(
        &mut self,
        _activity: NodeKey,
        record: &ActivityRecord,
        transaction: ClientTransaction,
    ) {
        debug!("{}: {transaction:?}", record.info.component);
    }
}

/// Package registry resolving components by exact name.
struct StaticPackages {
    activities: HashMap<ComponentName, ActivityInfo>,
}

impl PackageAuthority for StaticPackages {
    fn resolve_activity(&self, intent: &Intent, _user: UserId) -> Option<ActivityInfo> {
        self.activities.get(intent.component.as_ref()?).cloned()
    }

    fn check_start_any_activity_permission(&self, _check: &StartPermissionCheck<'_>) -> bool {
        true
    }

    fn activity_supports_intent(
        &self,
        _component: &ComponentName,
        _intent: &Intent,
    ) -> Result<bool, RemoteError> {
        Ok(false)
    }

    fn is_device_owner(&self, _uid: Uid) -> bool {
        false
    }

    fn current_input_method_uid(&self) -> Option<Uid> {
        None
    }
}

struct LoggingMetrics;

impl ActivityMetrics for LoggingMetrics {
    fn log_activity_start(&mut self, log: &ActivityStartLog) {
        info!(
            "start from uid {} ({}): {:?}, aborted: {}",
            log.calling_uid, log.reason, log.component, log.aborted_background_start
        );
    }

    fn notify_activity_launched(&mut self, launched: &ActivityLaunched) {
        debug!(
            "launched {:?}: {}, new activity: {}",
            launched.component, launched.result, launched.new_activity_created
        );
    }
}

struct LoggingTaskChanges;

impl TaskChangeNotifier for LoggingTaskChanges {
    fn notify_activity_restart_attempt(&mut self, attempt: &RestartAttempt) {
        debug!("restart attempt in {}", attempt.task);
    }
}

// ============================================================================
// Demo scenario
// ============================================================================

#[derive(Serialize)]
struct DemoOutput {
    starts: Vec<StartReport>,
    recents: Vec<i32>,
    hierarchy: Vec<HierarchyNode>,
}

fn demo_info(class: &str, launch_mode: LaunchMode) -> ActivityInfo {
    ActivityInfo {
        task_affinity: Some(format!("{PACKAGE}.{}", class.to_lowercase())),
        ..ActivityInfo::new(ComponentName::new(PACKAGE, class), APP_UID)
            .with_launch_mode(launch_mode)
    }
}

fn build_host(
    config: &Config,
) -> anyhow::Result<(ActivityTaskManager, Arc<Mutex<RecentTasksList>>)> {
    let options = Options::from_config(config);

    let launcher = ActivityInfo {
        activity_type: ActivityType::Home,
        ..demo_info("Launcher", LaunchMode::SingleTask)
    };
    let activities = [
        launcher.clone(),
        demo_info("Mail", LaunchMode::SingleTop),
        demo_info("Browser", LaunchMode::Multiple),
        demo_info("Sync", LaunchMode::Multiple),
    ]
    .into_iter()
    .map(|info| (info.component.clone(), info))
    .collect();

    let sync = WindowProcess::new(4242, SYNC_UID);

    let recents = Arc::new(Mutex::new(RecentTasksList::new(
        options.recents_max_tasks,
        options.recents_freeze_timeout,
    )));

    let services = Services {
        process: Box::new(LoggingProcesses {
            processes: HashMap::from([(SYNC_CALLER, sync)]),
        }),
        packages: Box::new(StaticPackages { activities }),
        recents: Box::new(recents.clone()),
        metrics: Box::new(LoggingMetrics),
        task_changes: Box::new(LoggingTaskChanges),
        ..Services::inert()
    };

    let mut hierarchy = Hierarchy::new();
    let display = hierarchy.add_display(DisplayId::DEFAULT, Rect::from_size(1920, 1080));
    let area = hierarchy
        .default_task_display_area(display)
        .context("display without a task display area")?;

    let home = hierarchy.create_root_task(
        area,
        WindowingMode::Fullscreen,
        ActivityType::Home,
        Position::Top,
    )?;
    let spec = TaskSpec {
        affinity: Some(launcher.affinity().to_owned()),
        root_component: Some(launcher.component.clone()),
        activity_type: ActivityType::Home,
        ..Default::default()
    };
    let task = hierarchy.create_task(home, spec, Position::Top)?;

    let intent = Intent::for_component(launcher.component.clone());
    let mut record = ActivityRecord::new(launcher, intent);
    record.state = ActivityState::Resumed;
    record.attached = true;
    record.visible_requested = true;
    record.visible = true;
    hierarchy.add_activity(task, record, Position::Top)?;

    Ok((ActivityTaskManager::new(hierarchy, services, options), recents))
}

fn report(
    atm: &ActivityTaskManager,
    mut starter: ActivityStarter<'_>,
) -> anyhow::Result<StartReport> {
    let reason = starter.reason().to_owned();
    let result = starter.execute()?;

    let activity = starter.out_activity().and_then(|key| {
        atm.with_hierarchy(|h| h.activity(key).map(|record| record.info.component.to_string()))
    });

    info!("{reason}: {result}");
    Ok(StartReport {
        reason,
        result: result.name().to_owned(),
        code: result.code(),
        external_success: get_external_result(result) == StartResult::Success,
        activity,
    })
}

pub fn run_demo(config: &Config, json: bool) -> anyhow::Result<()> {
    let (atm, recents) = build_host(config)?;

    let new_task = |class: &str, flags: IntentFlags| {
        Intent::for_component(ComponentName::new(PACKAGE, class))
            .with_flags(IntentFlags::NEW_TASK | flags)
    };

    let starts = [
        atm.starter()
            .set_reason("open mail")
            .set_intent(new_task("Mail", IntentFlags::empty())),
        atm.starter()
            .set_reason("open mail again")
            .set_intent(new_task("Mail", IntentFlags::SINGLE_TOP)),
        atm.starter()
            .set_reason("open browser")
            .set_intent(new_task("Browser", IntentFlags::empty())),
        atm.starter()
            .set_reason("back to mail")
            .set_intent(new_task("Mail", IntentFlags::empty())),
        atm.starter()
            .set_reason("sync from background")
            .set_caller(SYNC_CALLER)
            .set_intent(new_task("Sync", IntentFlags::empty())),
    ];

    let mut reports = Vec::with_capacity(starts.len());
    for starter in starts {
        reports.push(report(&atm, starter)?);
    }

    let recents: Vec<i32> = recents.lock().tasks().map(|id| id.0).collect();

    if json {
        let output = DemoOutput {
            starts: reports,
            recents,
            hierarchy: atm.snapshot(),
        };
        let text = serde_json::to_string_pretty(&output).context("error serializing output")?;
        println!("{text}");
        return Ok(());
    }

    for report in &reports {
        let activity = report.activity.as_deref().unwrap_or("-");
        println!(
            "{:<24} {:<20} {:>4}  {activity}",
            report.reason, report.result, report.code
        );
    }
    println!();
    println!("recents: {recents:?}");
    println!();
    print!("{}", atm.with_hierarchy(|h| h.debug_tree()));

    Ok(())
}
