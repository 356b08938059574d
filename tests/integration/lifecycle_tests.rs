//! Task registry and lifecycle: start, tiered stop, start failure, inbox
//! overflow.

use std::sync::Arc;
use std::time::Duration;

use cellnode::adapters::sim::{SimBroker, SimModem};
use cellnode::error::{Error, Result};
use cellnode::events::EventQueue;
use cellnode::runtime::{AppContext, AppTask, Lifecycle, StopTier, TaskRegistry, TaskState};
use cellnode::status::ApplicationStatus;
use cellnode::tasks::indicator::IndicatorTask;
use cellnode::tasks::registration::RegistrationTask;
use cellnode::tasks::session::SessionTask;

use crate::mock_hw::{RecordingIndicator, WAIT, fast_context, wait_until};

/// Task whose start always fails.
struct Broken {
    lifecycle: Lifecycle,
}

impl AppTask for Broken {
    fn name(&self) -> &'static str {
        "Broken"
    }

    fn start(&mut self) -> Result<()> {
        Err(Error::ConfigurationInvalid("broken task"))
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

fn three_task_registry(ctx: &Arc<AppContext>) -> TaskRegistry {
    let modem = SimModem::new("1");
    let mut registry = TaskRegistry::new(Arc::clone(ctx));
    registry.register(
        IndicatorTask::new(Arc::clone(ctx), RecordingIndicator::new()),
        StopTier::Indicator,
    );
    registry.register(
        RegistrationTask::new(Arc::clone(ctx), modem.clone(), modem),
        StopTier::Network,
    );
    registry.register(
        SessionTask::new(Arc::clone(ctx), SimBroker::new(), "1"),
        StopTier::Consumer,
    );
    registry
}

// ── Cold start ────────────────────────────────────────────────

#[test]
fn cold_start_runs_all_and_stops_all() {
    let ctx = fast_context();
    let mut registry = three_task_registry(&ctx);
    assert_eq!(registry.len(), 3);
    assert!(!registry.any_running());

    registry.start_all().unwrap();
    for name in ["Indicator", "Registration", "Session"] {
        assert_eq!(registry.is_running(name), Some(true), "{name} should be running");
    }

    ctx.shutdown.request();
    registry.stop_all().unwrap();
    for name in ["Indicator", "Registration", "Session"] {
        assert_eq!(registry.is_running(name), Some(false), "{name} should be stopped");
    }
}

#[test]
fn start_all_is_idempotent_for_running_tasks() {
    let ctx = fast_context();
    let mut registry = three_task_registry(&ctx);
    registry.start_all().unwrap();
    registry.start_all().unwrap();
    registry.stop_all().unwrap();
}

#[test]
fn start_failure_sets_error_and_skips_the_rest() {
    let ctx = fast_context();
    let mut registry = TaskRegistry::new(Arc::clone(&ctx));
    registry.register(
        IndicatorTask::new(Arc::clone(&ctx), RecordingIndicator::new()),
        StopTier::Indicator,
    );
    registry.register(
        Broken {
            lifecycle: Lifecycle::new("Broken"),
        },
        StopTier::Consumer,
    );
    registry.register(
        SessionTask::new(Arc::clone(&ctx), SimBroker::new(), "1"),
        StopTier::Consumer,
    );

    assert_eq!(registry.start_all(), Err(Error::ConfigurationInvalid("broken task")));
    assert_eq!(ctx.status.get(), ApplicationStatus::Error);
    assert_eq!(registry.is_running("Indicator"), Some(true));
    assert_eq!(registry.is_running("Session"), Some(false));

    registry.stop_all().unwrap();
    assert!(!registry.any_running());
}

// ── isRunning never flickers ──────────────────────────────────

#[test]
fn is_running_tracks_lifecycle_without_flicker() {
    let ctx = fast_context();
    let mut task = IndicatorTask::new(Arc::clone(&ctx), RecordingIndicator::new());
    assert!(!task.is_running());
    assert_eq!(task.lifecycle().state(), TaskState::NotStarted);

    task.start().unwrap();
    assert!(task.is_running());

    task.request_stop();
    assert!(task.lifecycle().wait_until_stopped(WAIT));
    assert!(!task.is_running());

    // Stopped is terminal: no restart, and it stays false.
    assert_eq!(task.start(), Err(Error::ConfigurationInvalid("task already started")));
    std::thread::sleep(Duration::from_millis(30));
    assert!(!task.is_running());
    assert_eq!(task.lifecycle().state(), TaskState::Stopped);
}

#[test]
fn stopped_task_reported_by_poll_loop() {
    let ctx = fast_context();
    let mut task = IndicatorTask::new(Arc::clone(&ctx), RecordingIndicator::new());
    task.start().unwrap();
    task.request_stop();
    assert!(wait_until(WAIT, || !task.is_running()));
}

// ── Inbox overflow ────────────────────────────────────────────

#[test]
fn capacity_two_inbox_rejects_third_send() {
    let inbox: EventQueue<&str, 2> = EventQueue::new();
    inbox.open();
    assert_eq!(inbox.send("first"), Ok(()));
    assert_eq!(inbox.send("second"), Ok(()));
    assert_eq!(inbox.send("third"), Err(Error::ResourceExhausted("inbox full")));

    let mut seen = Vec::new();
    inbox.drain(|m| seen.push(m));
    assert_eq!(seen, vec!["first", "second"]);
}

#[test]
fn task_inbox_closed_before_start_and_after_stop() {
    let ctx = fast_context();
    let mut task = IndicatorTask::new(Arc::clone(&ctx), RecordingIndicator::new());
    let handle = task.handle();
    assert_eq!(handle.copy_to_manual(), Err(Error::QueueClosed));

    task.start().unwrap();
    assert_eq!(handle.copy_to_manual(), Ok(()));

    task.request_stop();
    assert!(task.lifecycle().wait_until_stopped(WAIT));
    assert_eq!(handle.copy_to_manual(), Err(Error::QueueClosed));
}
