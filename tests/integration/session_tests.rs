//! Session manager against the loopback broker: topic dispatch, publish
//! guard, reconnect policy and the control topic.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cellnode::adapters::sim::SimBroker;
use cellnode::app::control::ControlRouter;
use cellnode::app::ports::{BrokerPort, QoS};
use cellnode::error::Error;
use cellnode::runtime::{AppContext, AppTask};
use cellnode::status::ApplicationStatus;
use cellnode::tasks::scan::ScanQueue;
use cellnode::tasks::session::SessionTask;
use cellnode::tasks::signal::{SignalMsg, SignalQueue};
use cellnode::tasks::topics::TopicCallback;

use crate::mock_hw::{WAIT, fast_context, wait_until};

const SERIAL: &str = "8899";

fn counting_callback() -> (Arc<AtomicUsize>, TopicCallback) {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    (hits, Box::new(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    }))
}

fn online_context() -> Arc<AppContext> {
    let ctx = fast_context();
    ctx.network.record_transition(true);
    ctx
}

fn stop(task: &SessionTask<SimBroker>) {
    task.request_stop();
    assert!(task.lifecycle().wait_until_stopped(WAIT));
}

// ── Topic dispatch ────────────────────────────────────────────

#[test]
fn unregistered_topic_is_discarded() {
    let ctx = online_context();
    let broker = SimBroker::new();
    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    let (hits, callback) = counting_callback();
    task.register_topic_callback("A", QoS::AtLeastOnce, callback).unwrap();
    task.start().unwrap();

    assert!(wait_until(WAIT, || broker.subscriptions().iter().any(|(t, _)| t == "A")));
    broker.inject("B", b"not for A");
    broker.inject("A", b"for A");

    assert!(wait_until(WAIT, || hits.load(Ordering::SeqCst) == 1));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(task.is_running());
    stop(&task);
}

#[test]
fn reads_exactly_the_announced_messages() {
    let ctx = online_context();
    let broker = SimBroker::new();
    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    let (hits, callback) = counting_callback();
    task.register_topic_callback("A", QoS::AtMostOnce, callback).unwrap();
    task.start().unwrap();
    assert!(wait_until(WAIT, || broker.is_connected()));

    for _ in 0..3 {
        broker.inject("A", b"x");
    }
    assert!(wait_until(WAIT, || hits.load(Ordering::SeqCst) == 3));
    stop(&task);
}

#[test]
fn topic_registered_after_start_is_subscribed() {
    let ctx = online_context();
    let broker = SimBroker::new();
    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    let handle = task.handle();
    task.start().unwrap();
    assert!(wait_until(WAIT, || broker.is_connected()));

    let (hits, callback) = counting_callback();
    handle.register_topic_callback("late", QoS::AtMostOnce, callback).unwrap();
    assert!(wait_until(WAIT, || broker.subscriptions().iter().any(|(t, _)| t == "late")));

    handle.publish("late", b"hello".to_vec(), QoS::AtMostOnce, false).unwrap();
    assert!(wait_until(WAIT, || hits.load(Ordering::SeqCst) == 1));
    stop(&task);
}

// ── Publish guard and reconnect policy ────────────────────────

#[test]
fn offline_publish_is_dropped_and_no_connect_attempted() {
    let ctx = fast_context();
    let broker = SimBroker::new();
    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    let handle = task.handle();
    task.start().unwrap();

    handle.publish("/8899/SignalQuality", b"{}".to_vec(), QoS::AtMostOnce, false).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    assert!(broker.published().is_empty());
    assert_eq!(broker.connects(), 0);
    assert_eq!(ctx.status.get(), ApplicationStatus::SessionDisconnected);
    stop(&task);
}

#[test]
fn reconnects_after_broker_drop_and_resubscribes_control() {
    let ctx = online_context();
    let broker = SimBroker::new();
    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    let control = task.control_topic();
    task.start().unwrap();
    assert!(wait_until(WAIT, || broker.is_connected()));
    assert_eq!(broker.connects(), 1);

    broker.drop_session();
    assert_eq!(ctx.status.get(), ApplicationStatus::SessionDisconnected);

    assert!(wait_until(WAIT, || broker.connects() == 2 && broker.is_connected()));
    assert!(broker.subscriptions().iter().any(|(t, _)| *t == control));
    stop(&task);
    assert!(!broker.is_connected());
}

#[test]
fn refused_connect_is_retried_every_dwell() {
    let ctx = online_context();
    let broker = SimBroker::new();
    broker.refuse_connections(true);
    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    task.start().unwrap();

    assert!(wait_until(WAIT, || broker.connects() >= 2));
    broker.refuse_connections(false);
    assert!(wait_until(WAIT, || broker.is_connected()));
    stop(&task);
}

#[test]
fn announced_messages_after_drop_do_not_hurry_reconnects() {
    let ctx = online_context();
    let broker = SimBroker::new();
    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    task.start().unwrap();
    assert!(wait_until(WAIT, || broker.is_connected()));

    broker.drop_session();
    broker.refuse_connections(true);
    broker.inject("/8899/Other", b"x");
    std::thread::sleep(Duration::from_millis(500));

    // One dwell is 1 s: the first connect plus at most one retry.
    assert!(broker.connects() <= 2, "{} connect attempts", broker.connects());
    assert!(task.is_running());

    broker.refuse_connections(false);
    assert!(wait_until(WAIT, || broker.is_connected()));
    stop(&task);
}

#[test]
fn rejected_credentials_set_error_and_stop_retrying() {
    let ctx = online_context();
    let broker = SimBroker::new();
    broker.fail_connections_with(Error::ConfigurationInvalid("bad credentials"));
    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    task.start().unwrap();

    assert!(wait_until(WAIT, || ctx.status.get() == ApplicationStatus::Error));
    std::thread::sleep(Duration::from_millis(1500));
    assert_eq!(broker.connects(), 1);
    assert_eq!(ctx.status.get(), ApplicationStatus::Error);
    stop(&task);
}

#[test]
fn duplicate_registration_through_handle_keeps_first_callback() {
    let ctx = online_context();
    let broker = SimBroker::new();
    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    let (first, callback) = counting_callback();
    task.register_topic_callback("A", QoS::AtMostOnce, callback).unwrap();
    let handle = task.handle();
    task.start().unwrap();
    assert!(wait_until(WAIT, || broker.is_connected()));

    // Queued fine; the worker rejects the duplicate.
    let (second, callback) = counting_callback();
    assert_eq!(handle.register_topic_callback("A", QoS::AtMostOnce, callback), Ok(()));
    broker.inject("A", b"x");

    assert!(wait_until(WAIT, || first.load(Ordering::SeqCst) == 1));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(second.load(Ordering::SeqCst), 0);
    assert_eq!(broker.subscriptions().iter().filter(|(t, _)| t == "A").count(), 1);
    stop(&task);
}

// ── Control topic ─────────────────────────────────────────────

#[test]
fn control_topic_routes_measure_now() {
    let ctx = online_context();
    let broker = SimBroker::new();
    let signal = SignalQueue::new();
    signal.open();
    let scan = ScanQueue::new();

    let mut task = SessionTask::new(Arc::clone(&ctx), broker.clone(), SERIAL);
    task.set_control_router(ControlRouter::new(ctx.shutdown.clone(), signal.clone(), scan));
    assert_eq!(task.control_topic(), "/8899/Control");
    task.start().unwrap();
    assert!(wait_until(WAIT, || broker.subscriptions().iter().any(|(t, _)| t == "/8899/Control")));
    assert!(broker.subscriptions().contains(&("/8899/Control".to_string(), QoS::AtMostOnce)));

    broker.inject("/8899/Control", b"MEASURE_NOW");
    assert!(wait_until(WAIT, || signal.len() == 1));
    let mut got = Vec::new();
    signal.drain(|m| got.push(m));
    assert_eq!(got, vec![SignalMsg::MeasureNow]);

    broker.inject("/8899/Control", b"SHUTDOWN");
    assert!(wait_until(WAIT, || ctx.shutdown.is_requested()));
    // The application flag alone ends the session worker.
    assert!(task.lifecycle().wait_until_stopped(WAIT));
}
