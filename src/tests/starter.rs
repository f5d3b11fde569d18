use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use insta::assert_snapshot;
use parking_lot::Mutex;

use super::fixture::{component, info, running, Event, APP_UID, RECENTS_UID};
use super::*;
use crate::atm::Options;
use crate::hierarchy::{NodeKey, Position, TaskSpec, WindowingMode};
use crate::intent::{
    ActivityInfo, ActivityType, CallerToken, Extra, Intent, IntentFlags, LaunchCookie, LaunchMode,
    Uid, VoiceSession, CATEGORY_VOICE,
};
use crate::services::{
    ActivityLaunched, ActivityStartLog, ClientTransaction, LaunchParams, LaunchParamsModifier,
    LaunchParamsRequest, LaunchPhase, ModifierResult, RemoteError, RestartAttempt,
    WindowProcess,
};
use crate::starter::{ActivityOptions, StartError, StartResult, StarterState};
use crate::utils::Rect;

fn intent(class: &str) -> Intent {
    Intent::for_component(component(class))
}

fn start(f: &Fixture, intent: Intent) -> (StartResult, Option<NodeKey>) {
    let mut starter = f.starter().set_intent(intent);
    let result = starter.execute().unwrap();
    (result, starter.out_activity())
}

/// Options whose abort hook counts its calls.
fn counted_options() -> (ActivityOptions, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let hook_calls = calls.clone();
    let options = ActivityOptions::new().with_abort_hook(move || {
        hook_calls.fetch_add(1, Ordering::SeqCst);
    });
    (options, calls)
}

fn execute_counting_aborts(starter: crate::starter::ActivityStarter<'_>) -> (StartResult, usize) {
    let (options, calls) = counted_options();
    let result = starter.set_activity_options(options).execute().unwrap();
    (result, calls.load(Ordering::SeqCst))
}

fn launched(f: &Fixture) -> Vec<ActivityLaunched> {
    f.events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Launched(launched) => Some(launched),
            _ => None,
        })
        .collect()
}

fn task_id(f: &Fixture, task: NodeKey) -> crate::hierarchy::TaskId {
    f.with_hierarchy(|h| h.task(task).unwrap().id)
}

fn parent(f: &Fixture, key: NodeKey) -> NodeKey {
    f.with_hierarchy(|h| h.parent(key).unwrap())
}

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn caller_without_process_is_denied() {
    let f = Fixture::new();
    f.register(&info("C"));

    let starter = f
        .starter()
        .set_caller(CallerToken(7))
        .set_intent(intent("C"));
    assert_eq!(
        execute_counting_aborts(starter),
        (StartResult::PermissionDenied, 1)
    );
}

#[test]
fn forward_result_with_request_code_conflicts() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let (_, source) = f.add_task_with(root, &info("Source"));
    f.register(&info("C"));

    let starter = f
        .starter()
        .set_intent(intent("C").with_flags(IntentFlags::FORWARD_RESULT))
        .set_result_to(source)
        .set_request_code(0);
    assert_eq!(
        execute_counting_aborts(starter),
        (StartResult::ForwardAndRequestConflict, 1)
    );

    // A negative request code asks for no result.
    let starter = f
        .starter()
        .set_intent(intent("C").with_flags(IntentFlags::FORWARD_RESULT))
        .set_result_to(source)
        .set_request_code(-1);
    assert_eq!(execute_counting_aborts(starter), (StartResult::Success, 0));
}

#[test]
fn intent_without_component_is_not_resolved() {
    let f = Fixture::new();
    let starter = f.starter().set_intent(Intent::default());
    assert_eq!(
        execute_counting_aborts(starter),
        (StartResult::IntentNotResolved, 1)
    );
}

#[test]
fn unknown_component_is_class_not_found() {
    let f = Fixture::new();
    let starter = f.starter().set_intent(intent("Missing"));
    assert_eq!(
        execute_counting_aborts(starter),
        (StartResult::ClassNotFound, 1)
    );
    f.verify_invariants();
}

#[test]
fn supplied_activity_info_skips_resolution() {
    let f = Fixture::new();
    let (result, out) = {
        let mut starter = f
            .starter()
            .set_intent(intent("Unregistered"))
            .set_activity_info(info("Unregistered"));
        let result = starter.execute().unwrap();
        (result, starter.out_activity())
    };
    assert_eq!(result, StartResult::Success);
    assert_eq!(
        f.activity(out.unwrap()).component(),
        &component("Unregistered")
    );
}

#[test]
fn voice_session_needs_voice_support() {
    let f = Fixture::new();
    f.register(&info("C"));

    f.host().supports_voice = Ok(false);
    let starter = f
        .starter()
        .set_intent(intent("C"))
        .set_voice_session(VoiceSession(1));
    assert_eq!(
        execute_counting_aborts(starter),
        (StartResult::NotVoiceCompatible, 1)
    );

    f.host().supports_voice = Err(RemoteError(String::from("dead object")));
    let starter = f
        .starter()
        .set_intent(intent("C"))
        .set_voice_session(VoiceSession(1));
    assert_eq!(
        execute_counting_aborts(starter),
        (StartResult::NotVoiceCompatible, 1)
    );
}

#[test]
fn launch_from_voice_task_adds_voice_category() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let (task, source) = f.add_task_with(root, &info("Assistant"));
    f.with_hierarchy(|h| h.task_mut(task).unwrap().voice_session = Some(VoiceSession(3)));

    let other_app = ActivityInfo::new(component("Timer"), Uid(10_002));
    f.register(&other_app);

    f.host().supports_voice = Ok(false);
    let mut starter = f
        .starter()
        .set_intent(intent("Timer"))
        .set_result_to(source);
    assert_eq!(starter.execute(), Ok(StartResult::NotVoiceCompatible));
    assert!(starter.intent().has_category(CATEGORY_VOICE));

    f.host().supports_voice = Ok(true);
    let mut starter = f
        .starter()
        .set_intent(intent("Timer"))
        .set_result_to(source);
    assert_eq!(starter.execute(), Ok(StartResult::Success));
    assert_eq!(parent(&f, starter.out_activity().unwrap()), task);
}

#[test]
fn failed_permission_check_is_aborted() {
    let f = Fixture::new();
    f.register(&info("C"));
    f.host().permission_granted = false;

    let starter = f.starter().set_intent(intent("C"));
    assert_eq!(execute_counting_aborts(starter), (StartResult::Aborted, 1));
    assert_snapshot!(f.debug_tree(), @r"
    Display 0 *
      DefaultTaskDisplayArea
    ");
}

#[test]
fn successful_start_keeps_options() {
    let f = Fixture::new();
    f.register(&info("C"));

    let starter = f.starter().set_intent(intent("C"));
    assert_eq!(execute_counting_aborts(starter), (StartResult::Success, 0));
}

#[test]
fn background_caller_is_aborted_when_starts_are_disabled() {
    let f = Fixture::with_options(Options {
        background_activity_starts_enabled: false,
        ..Options::default()
    });
    f.register(&info("C"));
    f.add_process(CallerToken(1), WindowProcess::new(100, APP_UID));

    let starter = f
        .starter()
        .set_caller(CallerToken(1))
        .set_intent(intent("C"));
    assert_eq!(execute_counting_aborts(starter), (StartResult::Aborted, 1));

    f.host().visible_windows.insert(APP_UID);
    let mut starter = f
        .starter()
        .set_caller(CallerToken(1))
        .set_intent(intent("C"));
    assert_eq!(starter.execute(), Ok(StartResult::Success));
}

#[test]
fn file_descriptors_are_refused() {
    let f = Fixture::new();
    f.register(&info("C"));

    let mut with_fd = intent("C");
    with_fd.extras.push(Extra::FileDescriptor {
        key: String::from("log"),
        fd: 3,
    });

    let mut starter = f.starter().set_intent(with_fd);
    assert_eq!(starter.execute(), Err(StartError::FileDescriptorsInIntent));
    assert_eq!(starter.state(), StarterState::Done(StartResult::Canceled));
    assert!(f.events().is_empty());

    assert_eq!(starter.execute(), Err(StartError::AlreadyExecuted));
}

#[test]
fn starter_runs_once() {
    let f = Fixture::new();
    f.register(&info("C"));

    let mut starter = f.starter().set_intent(intent("C"));
    assert_eq!(starter.state(), StarterState::Building);
    assert_eq!(starter.execute(), Ok(StartResult::Success));
    assert_eq!(starter.state(), StarterState::Done(StartResult::Success));
    assert_eq!(starter.execute(), Err(StartError::AlreadyExecuted));

    assert_eq!(launched(&f).len(), 1);
}

#[test]
fn post_processing_can_be_driven_by_the_host() {
    let f = Fixture::new();
    let (options, calls) = counted_options();

    let mut starter = f
        .starter()
        .set_intent(intent("C"))
        .set_activity_options(options);
    starter.post_start_activity_processing(None, StartResult::Canceled, None);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        launched(&f),
        [ActivityLaunched {
            result: StartResult::Canceled,
            new_activity_created: false,
            activity: None,
            component: Some(component("C")),
            has_options: true,
        }]
    );
}

// ============================================================================
// Logging
// ============================================================================

#[test]
fn starts_are_logged_when_enabled() {
    let f = Fixture::with_options(Options {
        background_activity_starts_enabled: true,
        activity_starts_logging_enabled: true,
        ..Options::default()
    });
    f.register(&info("C"));

    let mut starter = f
        .starter()
        .set_calling_uid(APP_UID)
        .set_calling_package("org.caller")
        .set_intent(intent("C"));
    assert_eq!(starter.execute(), Ok(StartResult::Success));

    assert_eq!(
        f.count(|event| matches!(event, Event::LogStart(_))),
        1
    );
    assert!(f.events().contains(&Event::LogStart(ActivityStartLog {
        reason: String::from("test"),
        calling_uid: APP_UID,
        calling_package: Some(String::from("org.caller")),
        real_calling_uid: APP_UID,
        component: Some(component("C")),
        aborted_background_start: false,
    })));
}

#[test]
fn aborted_background_start_is_logged() {
    let f = Fixture::with_options(Options {
        background_activity_starts_enabled: false,
        activity_starts_logging_enabled: true,
        ..Options::default()
    });
    f.register(&info("C"));

    let mut starter = f
        .starter()
        .set_calling_uid(APP_UID)
        .set_real_calling_uid(Uid(10_003))
        .set_intent(intent("C"));
    assert_eq!(starter.execute(), Ok(StartResult::Aborted));

    let logged: Vec<_> = f
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::LogStart(log) => Some(log),
            _ => None,
        })
        .collect();
    assert_eq!(logged.len(), 1);
    assert!(logged[0].aborted_background_start);
    assert_eq!(logged[0].real_calling_uid, Uid(10_003));
}

#[test]
fn starts_are_not_logged_by_default() {
    let f = Fixture::new();
    f.register(&info("C"));
    start(&f, intent("C"));
    assert_eq!(f.count(|event| matches!(event, Event::LogStart(_))), 0);
}

// ============================================================================
// New tasks
// ============================================================================

#[test]
fn new_task_lands_in_focused_fullscreen_root_task() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("C"));

    let (result, out) = start(&f, intent("C").with_flags(IntentFlags::NEW_TASK));
    assert_eq!(result, StartResult::Success);

    let c = out.unwrap();
    let task = parent(&f, c);
    assert_eq!(parent(&f, task), root);
    assert_eq!(f.with_hierarchy(|h| h.children(task).to_vec()), [c]);
    assert!(f.activity(c).visible_requested);

    assert_snapshot!(f.debug_tree(), @r"
    Display 0 *
      DefaultTaskDisplayArea
        RootTask #1 fullscreen *
          Task #2 *
            org.example/C Initializing visible *
    ");

    let id = task_id(&f, task);
    let events = f.events();
    assert!(events.contains(&Event::StartSpecificActivity {
        activity: c,
        and_resume: true,
    }));
    assert!(events.contains(&Event::AddRecent(id.0)));
    assert_eq!(
        launched(&f),
        [ActivityLaunched {
            result: StartResult::Success,
            new_activity_created: true,
            activity: Some(c),
            component: Some(component("C")),
            has_options: false,
        }]
    );
    f.verify_invariants();
}

#[test]
fn new_task_creates_missing_root_task() {
    let f = Fixture::new();
    f.register(&info("C"));

    let (result, out) = start(&f, intent("C"));
    assert_eq!(result, StartResult::Success);

    let root = f.with_hierarchy(|h| h.root_task_of(out.unwrap()).unwrap());
    assert_eq!(
        f.with_hierarchy(|h| h.windowing_mode(root)),
        WindowingMode::Fullscreen
    );
    f.verify_invariants();
}

#[test]
fn new_task_hides_previous_top() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let (_, y) = f.add_task_with(root, &info("Y"));
    f.register(&info("C"));

    let (result, out) = start(&f, intent("C"));
    assert_eq!(result, StartResult::Success);

    let y = f.activity(y);
    assert!(!y.visible_requested);
    assert_eq!(y.state, crate::hierarchy::ActivityState::Stopped);
    assert!(f.activity(out.unwrap()).visible_requested);
}

#[test]
fn launch_task_behind_stays_below() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let (top_task, y) = f.add_task_with(root, &info("Y"));
    f.register(&info("C"));

    let options = ActivityOptions {
        launch_task_behind: true,
        ..ActivityOptions::new()
    };
    let mut starter = f
        .starter()
        .set_intent(intent("C"))
        .set_activity_options(options);
    assert_eq!(starter.execute(), Ok(StartResult::Success));
    let c = starter.out_activity().unwrap();

    let children = f.with_hierarchy(|h| h.children(root).to_vec());
    assert_eq!(children, [parent(&f, c), top_task]);
    assert!(f.activity(y).visible_requested);
    assert_eq!(f.activity(y).state, crate::hierarchy::ActivityState::Resumed);
}

#[test]
fn in_task_places_activity_in_that_task() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let (task, _) = f.add_task_with(root, &info("Y"));
    f.register(&info("C"));

    let mut starter = f.starter().set_intent(intent("C")).set_in_task(task);
    assert_eq!(starter.execute(), Ok(StartResult::Success));
    assert_eq!(parent(&f, starter.out_activity().unwrap()), task);
}

#[test]
fn launch_cookie_is_stamped_on_new_activity() {
    let f = Fixture::new();
    f.register(&info("C"));

    let options = ActivityOptions {
        launch_cookie: Some(LaunchCookie(9)),
        ..ActivityOptions::new()
    };
    let mut starter = f
        .starter()
        .set_intent(intent("C"))
        .set_activity_options(options);
    assert_eq!(starter.execute(), Ok(StartResult::Success));
    assert_eq!(
        f.activity(starter.out_activity().unwrap()).launch_cookie,
        Some(LaunchCookie(9))
    );
}

#[test]
fn lock_task_violation_rolls_back() {
    let f = Fixture::new();
    f.register(&info("C"));
    f.host().lock_task_violation = true;

    let before = f.debug_tree();
    let mut starter = f.starter().set_intent(intent("C"));
    let (options, calls) = counted_options();
    starter = starter.set_activity_options(options);

    assert_eq!(starter.execute(), Ok(StartResult::LockTaskModeViolation));
    assert_eq!(starter.out_activity(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.debug_tree(), before);
    assert_eq!(f.count(|event| matches!(event, Event::AddRecent(_))), 0);
    f.verify_invariants();
}

// ============================================================================
// Reuse
// ============================================================================

#[test]
fn single_top_relaunch_is_delivered_to_top() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let x_info = info("X").with_launch_mode(LaunchMode::SingleTop);
    f.register(&x_info);
    let (task, x) = f.add_task_with(root, &x_info);

    let (result, out) = start(&f, intent("X").with_flags(IntentFlags::SINGLE_TOP));
    assert_eq!(result, StartResult::DeliveredToTop);
    assert_eq!(out, Some(x));

    assert_eq!(f.with_hierarchy(|h| h.activities(root)), [x]);
    assert_eq!(f.activity(x).new_intents.len(), 1);

    let events = f.events();
    assert!(events.contains(&Event::Transaction(x, ClientTransaction::NewIntent)));
    assert!(events.contains(&Event::RestartAttempt(RestartAttempt {
        task: task_id(&f, task),
        home_task_visible: false,
        cleared_task: false,
        was_visible: true,
    })));
    assert_eq!(f.count(|event| matches!(event, Event::AddRecent(_))), 0);
}

#[test]
fn single_top_launch_from_top_is_delivered_to_it() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let x_info = info("X").with_launch_mode(LaunchMode::SingleTop);
    f.register(&x_info);
    let (_, x) = f.add_task_with(root, &x_info);

    let mut starter = f.starter().set_intent(intent("X")).set_result_to(x);
    assert_eq!(starter.execute(), Ok(StartResult::DeliveredToTop));
    assert_eq!(starter.out_activity(), Some(x));
    assert_eq!(f.with_hierarchy(|h| h.activities(root)), [x]);
}

#[test]
fn standard_launch_from_top_adds_instance() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (task, x) = f.add_task_with(root, &info("X"));

    let mut starter = f.starter().set_intent(intent("X")).set_result_to(x);
    assert_eq!(starter.execute(), Ok(StartResult::Success));
    let out = starter.out_activity().unwrap();
    assert_ne!(out, x);
    assert_eq!(parent(&f, out), task);
}

#[test]
fn existing_task_in_background_is_brought_to_front() {
    let f = Fixture::new();
    let bottom = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (task, x) = f.add_task_with(bottom, &info("X"));
    let top = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.add_task_with(top, &info("Y"));
    f.ensure_display_visible();
    assert!(!f.activity(x).visible_requested);
    f.take_events();

    let (result, out) = start(&f, intent("X"));
    assert_eq!(result, StartResult::TaskToFront);
    assert_eq!(out, Some(x));

    assert_snapshot!(f.debug_tree(), @r"
    Display 0 *
      DefaultTaskDisplayArea
        RootTask #3 fullscreen
          Task #4
            org.example/Y Stopped
        RootTask #1 fullscreen *
          Task #2 *
            org.example/X Resumed visible *
    ");

    let id = task_id(&f, task);
    let events = f.events();
    assert!(events.contains(&Event::RestartAttempt(RestartAttempt {
        task: id,
        home_task_visible: false,
        cleared_task: false,
        was_visible: false,
    })));
    assert!(events.contains(&Event::AddRecent(id.0)));
}

#[test]
fn launch_root_adjacent_to_current_root_keeps_task() {
    let f = Fixture::new();
    let area = f.area;
    let (primary, secondary) = f.with_hierarchy(|h| h.create_split_pair(area).unwrap());
    f.register(&info("X"));
    let (task, _) = f.add_task_with(secondary, &info("X"));
    f.add_task_with(primary, &info("Y"));

    let options = ActivityOptions {
        launch_root_task: Some(primary),
        ..ActivityOptions::new()
    };
    let mut starter = f
        .starter()
        .set_intent(intent("X"))
        .set_activity_options(options);
    assert_eq!(starter.execute(), Ok(StartResult::TaskToFront));
    assert_eq!(parent(&f, task), secondary);
    assert_eq!(f.with_hierarchy(|h| h.top_most_task(secondary)), Some(task));
    f.verify_invariants();
}

#[test]
fn reused_top_gets_the_launch_cookie() {
    let f = Fixture::new();
    let bottom = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (_, x) = f.add_task_with(bottom, &info("X"));
    let top = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.add_task_with(top, &info("Y"));

    let options = ActivityOptions {
        launch_cookie: Some(LaunchCookie(4)),
        ..ActivityOptions::new()
    };
    let mut starter = f
        .starter()
        .set_intent(intent("X"))
        .set_activity_options(options);
    assert_eq!(starter.execute(), Ok(StartResult::TaskToFront));
    assert_eq!(f.activity(x).launch_cookie, Some(LaunchCookie(4)));
}

#[test]
fn avoid_move_to_front_leaves_task_in_place() {
    let f = Fixture::new();
    let bottom = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    f.add_task_with(bottom, &info("X"));
    let top = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.add_task_with(top, &info("Y"));

    let options = ActivityOptions {
        avoid_move_to_front: true,
        ..ActivityOptions::new()
    };
    let mut starter = f
        .starter()
        .set_intent(intent("X"))
        .set_activity_options(options);
    assert_eq!(starter.execute(), Ok(StartResult::DeliveredToTop));

    let display = f.display;
    assert_eq!(f.with_hierarchy(|h| h.focused_root_task(display)), Some(top));
}

#[test]
fn clear_task_replaces_task_contents() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (task, x) = f.add_task_with(root, &info("X"));
    f.add_activity(task, running(info("Detail")));

    let (result, out) = start(
        &f,
        intent("X").with_flags(IntentFlags::NEW_TASK | IntentFlags::CLEAR_TASK),
    );
    assert_eq!(result, StartResult::Success);

    let out = out.unwrap();
    assert_ne!(out, x);
    assert_eq!(f.with_hierarchy(|h| h.activities(task)), [out]);
    f.verify_invariants();
}

#[test]
fn clear_top_replaces_standard_instance() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (task, x) = f.add_task_with(root, &info("X"));
    f.add_activity(task, running(info("Detail")));

    let (result, out) = start(&f, intent("X").with_flags(IntentFlags::CLEAR_TOP));
    assert_eq!(result, StartResult::Success);

    let out = out.unwrap();
    assert_ne!(out, x);
    assert_eq!(f.with_hierarchy(|h| h.activities(task)), [out]);
}

#[test]
fn clear_top_with_single_top_delivers_to_instance() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (task, x) = f.add_task_with(root, &info("X"));
    f.add_activity(task, running(info("Detail")));

    let (result, out) = start(
        &f,
        intent("X").with_flags(IntentFlags::CLEAR_TOP | IntentFlags::SINGLE_TOP),
    );
    assert_eq!(result, StartResult::DeliveredToTop);
    assert_eq!(out, Some(x));
    assert_eq!(f.with_hierarchy(|h| h.activities(task)), [x]);
    assert_eq!(f.activity(x).new_intents.len(), 1);
}

#[test]
fn single_task_clears_above_existing_instance() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let x_info = info("X").with_launch_mode(LaunchMode::SingleTask);
    f.register(&x_info);
    let (task, x) = f.add_task_with(root, &x_info);
    f.add_activity(task, running(info("Detail")));

    let (result, out) = start(&f, intent("X"));
    assert_eq!(result, StartResult::DeliveredToTop);
    assert_eq!(out, Some(x));
    assert_eq!(f.with_hierarchy(|h| h.activities(task)), [x]);
}

#[test]
fn different_intent_for_task_root_adds_to_task() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (task, x) = f.add_task_with(root, &info("X"));

    let mut other = intent("X");
    other.data = Some(String::from("content://notes/7"));
    let (result, out) = start(&f, other);
    assert_eq!(result, StartResult::Success);

    let out = out.unwrap();
    assert_eq!(f.with_hierarchy(|h| h.activities(task)), [out, x]);
}

#[test]
fn shared_affinity_reuses_task() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let inbox = ActivityInfo::new(component("Inbox"), APP_UID);
    let compose = ActivityInfo::new(component("Compose"), APP_UID);
    f.register(&compose);
    let (task, _) = f.add_task_with(root, &inbox);

    let (result, out) = start(&f, intent("Compose"));
    assert_eq!(result, StartResult::Success);
    assert_eq!(parent(&f, out.unwrap()), task);
}

#[test]
fn multiple_task_skips_reuse() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (task, _) = f.add_task_with(root, &info("X"));

    let (result, out) = start(
        &f,
        intent("X").with_flags(IntentFlags::NEW_TASK | IntentFlags::MULTIPLE_TASK),
    );
    assert_eq!(result, StartResult::Success);
    assert_ne!(parent(&f, out.unwrap()), task);
}

#[test]
fn single_instance_reuses_instance_anywhere() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let x_info = ActivityInfo {
        task_affinity: Some(String::from("org.example.call")),
        ..info("Call").with_launch_mode(LaunchMode::SingleInstance)
    };
    f.register(&x_info);
    let (_, x) = f.add_task_with(root, &x_info);
    let other = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.add_task_with(other, &info("Y"));

    let (result, out) = start(&f, intent("Call"));
    assert_eq!(result, StartResult::TaskToFront);
    assert_eq!(out, Some(x));
    assert_eq!(f.with_hierarchy(|h| h.activities(root)), [x]);
}

#[test]
fn launch_root_task_option_reparents_reused_task() {
    let f = Fixture::new();
    let fullscreen = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (task, _) = f.add_task_with(fullscreen, &info("X"));
    let freeform = f.add_root_task(WindowingMode::Freeform, ActivityType::Standard);
    let top = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.add_task_with(top, &info("Y"));

    let options = ActivityOptions {
        launch_root_task: Some(freeform),
        ..ActivityOptions::new()
    };
    let mut starter = f
        .starter()
        .set_intent(intent("X"))
        .set_activity_options(options);
    assert_eq!(starter.execute(), Ok(StartResult::TaskToFront));
    assert_eq!(parent(&f, task), freeform);
    f.verify_invariants();
}

#[test]
fn preferred_display_moves_reused_task() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("X"));
    let (task, _) = f.add_task_with(root, &info("X"));

    let secondary = f.with_hierarchy(|h| {
        h.add_display(crate::hierarchy::DisplayId(1), Rect::from_size(1280, 720))
    });
    // Keep the default display focused.
    let display = f.display;
    f.with_hierarchy(|h| h.move_display_to_top(display));

    let options = ActivityOptions {
        launch_display_id: Some(crate::hierarchy::DisplayId(1)),
        ..ActivityOptions::new()
    };
    let mut starter = f
        .starter()
        .set_intent(intent("X"))
        .set_activity_options(options);
    assert_eq!(starter.execute(), Ok(StartResult::TaskToFront));
    assert_eq!(f.with_hierarchy(|h| h.display_of(task)), Some(secondary));
    f.verify_invariants();
}

// ============================================================================
// Split screen
// ============================================================================

#[test]
fn launch_adjacent_lands_in_adjacent_fragment() {
    let f = Fixture::new();
    let root = f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    let (primary, secondary) = f.with_hierarchy(|h| {
        let task = h.create_task(root, TaskSpec::default(), Position::Top).unwrap();
        let bounds = h.bounds(task);
        let primary = h
            .create_task_fragment(task, Some(bounds.left_half()), Position::Top)
            .unwrap();
        let secondary = h
            .create_task_fragment(task, Some(bounds.right_half()), Position::Top)
            .unwrap();
        h.set_adjacent(primary, secondary).unwrap();
        (primary, secondary)
    });
    let source = f.add_activity(primary, running(info("List")));
    f.register(&info("Detail"));

    let mut starter = f
        .starter()
        .set_intent(intent("Detail").with_flags(IntentFlags::LAUNCH_ADJACENT))
        .set_result_to(source);
    assert_eq!(starter.execute(), Ok(StartResult::Success));

    let out = starter.out_activity().unwrap();
    assert_eq!(parent(&f, out), secondary);
    assert!(f.activity(out).visible_requested);
    assert!(f.activity(source).visible_requested);
}

#[test]
fn launch_adjacent_lands_in_adjacent_root_task() {
    let f = Fixture::new();
    let area = f.area;
    let (primary, secondary) = f.with_hierarchy(|h| h.create_split_pair(area).unwrap());
    let (_, source) = {
        let task = f.with_hierarchy(|h| {
            h.create_task(primary, TaskSpec::default(), Position::Top)
                .unwrap()
        });
        (task, f.add_activity(task, running(info("List"))))
    };
    f.register(&info("Detail"));

    let mut starter = f
        .starter()
        .set_intent(intent("Detail").with_flags(IntentFlags::LAUNCH_ADJACENT))
        .set_result_to(source);
    assert_eq!(starter.execute(), Ok(StartResult::Success));

    let out = starter.out_activity().unwrap();
    assert_eq!(f.with_hierarchy(|h| h.root_task_of(out)), Some(secondary));
    assert_eq!(
        f.with_hierarchy(|h| h.windowing_mode(out)),
        WindowingMode::SplitSecondary
    );
    assert!(f.activity(source).visible_requested);
    f.verify_invariants();
}

#[test]
fn split_top_task_is_delivered_to_top() {
    let f = Fixture::new();
    let area = f.area;
    let (primary, secondary) = f.with_hierarchy(|h| h.create_split_pair(area).unwrap());
    f.register(&info("X"));
    let (task, x) = f.add_task_with(secondary, &info("X"));
    f.add_task_with(primary, &info("Y"));

    let (result, out) = start(&f, intent("X"));
    assert_eq!(result, StartResult::DeliveredToTop);
    assert_eq!(out, Some(x));
    assert_eq!(parent(&f, task), secondary);
    assert_eq!(f.with_hierarchy(|h| h.activities(task)), [x]);
    f.verify_invariants();
}

#[test]
fn split_task_below_top_is_brought_to_front() {
    let f = Fixture::new();
    let area = f.area;
    let (primary, secondary) = f.with_hierarchy(|h| h.create_split_pair(area).unwrap());
    f.register(&info("X"));
    let (task, x) = f.add_task_with(secondary, &info("X"));
    f.add_task_with(secondary, &info("Z"));
    f.add_task_with(primary, &info("Y"));

    let (result, out) = start(&f, intent("X"));
    assert_eq!(result, StartResult::TaskToFront);
    assert_eq!(out, Some(x));
    assert_eq!(f.with_hierarchy(|h| h.top_most_task(secondary)), Some(task));
    f.verify_invariants();
}

#[test]
fn split_launch_without_pairing_is_fullscreen() {
    let f = Fixture::new();
    f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    f.register(&info("Detail"));

    let options = ActivityOptions {
        launch_windowing_mode: WindowingMode::SplitSecondary,
        ..ActivityOptions::new()
    };
    let mut starter = f
        .starter()
        .set_intent(intent("Detail").with_flags(IntentFlags::LAUNCH_ADJACENT))
        .set_activity_options(options);
    assert_eq!(starter.execute(), Ok(StartResult::Success));

    let out = starter.out_activity().unwrap();
    let mode = f.with_hierarchy(|h| h.windowing_mode(out));
    assert!(!mode.is_split());
    assert_eq!(mode, WindowingMode::Fullscreen);
}

// ============================================================================
// Launch params
// ============================================================================

struct Recorder {
    id: u8,
    calls: Arc<Mutex<Vec<(u8, LaunchPhase)>>>,
}

impl LaunchParamsModifier for Recorder {
    fn on_calculate(
        &mut self,
        request: &LaunchParamsRequest<'_>,
        _current: &LaunchParams,
        _out: &mut LaunchParams,
    ) -> ModifierResult {
        self.calls.lock().push((self.id, request.phase));
        ModifierResult::Skip
    }
}

struct Freeform(Rect);

impl LaunchParamsModifier for Freeform {
    fn on_calculate(
        &mut self,
        _request: &LaunchParamsRequest<'_>,
        _current: &LaunchParams,
        out: &mut LaunchParams,
    ) -> ModifierResult {
        out.windowing_mode = WindowingMode::Freeform;
        out.bounds = Some(self.0);
        ModifierResult::Continue
    }
}

#[test]
fn modifiers_run_in_order_for_each_phase() {
    let f = Fixture::new();
    f.register(&info("C"));

    let calls = Arc::new(Mutex::new(Vec::new()));
    for id in [1, 2] {
        f.atm.register_launch_params_modifier(Box::new(Recorder {
            id,
            calls: calls.clone(),
        }));
    }

    let (result, _) = start(&f, intent("C"));
    assert_eq!(result, StartResult::Success);

    use LaunchPhase::*;
    assert_eq!(
        *calls.lock(),
        [
            (1, Display),
            (2, Display),
            (1, Bounds),
            (2, Bounds),
            (1, TaskLayout),
            (2, TaskLayout),
        ]
    );
}

#[test]
fn freeform_modifier_sizes_new_task() {
    let f = Fixture::new();
    f.register(&info("C"));
    let bounds = Rect::new(100, 100, 800, 600);
    f.atm.register_launch_params_modifier(Box::new(Freeform(bounds)));

    let (result, out) = start(&f, intent("C"));
    assert_eq!(result, StartResult::Success);

    let task = parent(&f, out.unwrap());
    assert_eq!(
        f.with_hierarchy(|h| h.windowing_mode(task)),
        WindowingMode::Freeform
    );
    assert_eq!(f.with_hierarchy(|h| h.bounds(task)), bounds);
}

// ============================================================================
// Recents freeze
// ============================================================================

fn freeze_options() -> ActivityOptions {
    ActivityOptions {
        freeze_recent_tasks_reordering: true,
        ..ActivityOptions::new()
    }
}

fn freeze_counts(f: &Fixture) -> (usize, usize) {
    (
        f.count(|event| matches!(event, Event::SetFreeze)),
        f.count(|event| matches!(event, Event::ResetFreeze)),
    )
}

#[test]
fn freeze_is_kept_after_successful_start() {
    let f = Fixture::new();
    f.register(&info("C"));

    let mut starter = f
        .starter()
        .set_calling_uid(RECENTS_UID)
        .set_intent(intent("C"))
        .set_activity_options(freeze_options());
    assert_eq!(starter.execute(), Ok(StartResult::Success));

    assert_eq!(freeze_counts(&f), (1, 0));
    assert_eq!(f.count(|event| matches!(event, Event::AddRecent(_))), 0);
}

#[test]
fn freeze_is_reset_once_after_failed_start() {
    let f = Fixture::new();

    let mut starter = f
        .starter()
        .set_calling_uid(RECENTS_UID)
        .set_intent(intent("Missing"))
        .set_activity_options(freeze_options());
    assert_eq!(starter.execute(), Ok(StartResult::ClassNotFound));

    assert_eq!(freeze_counts(&f), (1, 1));
}

#[test]
fn freeze_is_reset_after_rolled_back_start() {
    let f = Fixture::new();
    f.register(&info("C"));
    f.host().lock_task_violation = true;

    let mut starter = f
        .starter()
        .set_calling_uid(RECENTS_UID)
        .set_intent(intent("C"))
        .set_activity_options(freeze_options());
    assert_eq!(starter.execute(), Ok(StartResult::LockTaskModeViolation));

    assert_eq!(freeze_counts(&f), (1, 1));
}

#[test]
fn existing_freeze_is_left_alone() {
    let f = Fixture::new();
    f.host().frozen = true;

    let mut starter = f
        .starter()
        .set_calling_uid(RECENTS_UID)
        .set_intent(intent("Missing"))
        .set_activity_options(freeze_options());
    assert_eq!(starter.execute(), Ok(StartResult::ClassNotFound));

    assert_eq!(freeze_counts(&f), (0, 0));
}

#[test]
fn freeze_needs_recents_caller() {
    let f = Fixture::new();
    f.register(&info("C"));

    let mut starter = f
        .starter()
        .set_calling_uid(APP_UID)
        .set_intent(intent("C"))
        .set_activity_options(freeze_options());
    assert_eq!(starter.execute(), Ok(StartResult::Success));

    assert_eq!(freeze_counts(&f), (0, 0));
}

#[test]
fn recents_caller_does_not_reorder_recents() {
    let f = Fixture::new();
    f.register(&info("C"));

    let mut starter = f
        .starter()
        .set_calling_uid(RECENTS_UID)
        .set_intent(intent("C"));
    assert_eq!(starter.execute(), Ok(StartResult::Success));
    assert_eq!(f.count(|event| matches!(event, Event::AddRecent(_))), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_starts_are_serialized() {
    let f = Fixture::new();
    f.add_root_task(WindowingMode::Fullscreen, ActivityType::Standard);
    for class in ["A", "B", "C", "D"] {
        f.register(&info(class));
    }

    std::thread::scope(|s| {
        for class in ["A", "B", "C", "D"] {
            let f = &f;
            s.spawn(move || {
                let (result, _) = start(f, intent(class));
                assert_eq!(result, StartResult::Success);
            });
        }
    });

    assert_eq!(launched(&f).len(), 4);
    let display = f.display;
    let root = f.with_hierarchy(|h| h.focused_root_task(display).unwrap());
    assert_eq!(f.with_hierarchy(|h| h.leaf_tasks(root).len()), 4);
    f.verify_invariants();
}
