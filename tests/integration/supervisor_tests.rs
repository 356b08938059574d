//! Registration supervisor, signal report and indicator tasks.

use std::sync::Arc;
use std::time::Duration;

use cellnode::adapters::log_sink::format_prefix;
use cellnode::adapters::sim::{SimBroker, SimModem};
use cellnode::app::ports::{BrokerPort, SignalQuality};
use cellnode::drivers::led_patterns::{BLUE, ChannelPattern, GREEN, RED};
use cellnode::error::Error;
use cellnode::runtime::AppTask;
use cellnode::status::ApplicationStatus;
use cellnode::tasks::indicator::IndicatorTask;
use cellnode::tasks::registration::{RegistrationTask, on_link_status};
use cellnode::tasks::session::SessionTask;
use cellnode::tasks::signal::{SignalMsg, SignalTask};

use crate::mock_hw::{RecordingIndicator, WAIT, fast_context, wait_until};

const GOOD_TIME: i64 = 1_700_000_000;

// ── Registration ──────────────────────────────────────────────

#[test]
fn repeated_up_report_counts_once() {
    let ctx = fast_context();
    on_link_status(&ctx, true);
    on_link_status(&ctx, true);
    assert_eq!(ctx.network.up_transitions(), 1);
    on_link_status(&ctx, false);
    on_link_status(&ctx, true);
    assert_eq!(ctx.network.up_transitions(), 2);
}

#[test]
fn bring_up_retried_until_success() {
    let ctx = fast_context();
    let modem = SimModem::new("1")
        .with_bring_up_failures(2)
        .with_network_time(Some(GOOD_TIME));
    let mut task = RegistrationTask::new(Arc::clone(&ctx), modem.clone(), modem.clone());
    task.start().unwrap();

    assert!(wait_until(Duration::from_secs(8), || ctx.network.is_up()));
    assert_eq!(modem.bring_up_attempts(), 3);
    // Status callback and supervisor both saw the edge; counted once.
    assert_eq!(ctx.network.up_transitions(), 1);
    assert!(wait_until(WAIT, || ctx.network.wall_clock_offset().is_some()));
    assert_eq!(modem.time_server_queries(), 0);

    task.request_stop();
    assert!(task.lifecycle().wait_until_stopped(WAIT));
    assert!(!modem.is_up());
    assert!(!ctx.network.is_up());
}

#[test]
fn implausible_time_falls_back_once_and_logs_uptime() {
    let ctx = fast_context();
    let modem = SimModem::new("1")
        .with_network_time(Some(86_400))
        .with_time_server(Err(Error::Timeout));
    let mut task = RegistrationTask::new(Arc::clone(&ctx), modem.clone(), modem.clone());
    task.start().unwrap();

    assert!(wait_until(WAIT, || modem.time_server_queries() == 1));
    assert_eq!(ctx.network.wall_clock_offset(), None);
    assert_eq!(format_prefix(8412, ctx.network.wall_clock_offset()), "8412");

    // A later re-registration does not query again.
    modem.drop_link();
    assert!(wait_until(WAIT, || modem.bring_up_attempts() == 2 && ctx.network.is_up()));
    assert_eq!(modem.time_server_queries(), 1);
    assert_eq!(ctx.network.up_transitions(), 2);

    task.request_stop();
    assert!(task.lifecycle().wait_until_stopped(WAIT));
}

#[test]
fn registration_outlives_application_flag_until_stopped() {
    let ctx = fast_context();
    let modem = SimModem::new("1");
    let mut task = RegistrationTask::new(Arc::clone(&ctx), modem.clone(), modem.clone());
    task.start().unwrap();
    assert!(wait_until(WAIT, || ctx.network.is_up()));

    ctx.shutdown.request();
    std::thread::sleep(Duration::from_millis(100));
    assert!(task.is_running());
    assert!(modem.is_up());

    task.request_stop();
    assert!(task.lifecycle().wait_until_stopped(WAIT));
    assert!(!modem.is_up());
}

// ── Signal report ─────────────────────────────────────────────

#[test]
fn measure_now_publishes_without_waiting_for_dwell() {
    let ctx = fast_context();
    ctx.network.record_transition(true);
    let broker = SimBroker::new();
    let mut session = SessionTask::new(Arc::clone(&ctx), broker.clone(), "77");
    session.start().unwrap();
    assert!(wait_until(WAIT, || broker.is_connected()));

    let modem = SimModem::new("77").with_signal(SignalQuality { rsrp: -101, rsrq: -12 });
    let mut device = modem.clone();
    cellnode::app::device::open_device(&mut device, "").unwrap();
    let mut signal = SignalTask::new(Arc::clone(&ctx), modem, session.handle(), "77");
    let inbox = signal.inbox();
    signal.start().unwrap();

    let topic = "/77/SignalQuality";
    assert!(wait_until(WAIT, || broker.published_on(topic).len() == 1));
    inbox.send(SignalMsg::MeasureNow).unwrap();
    assert!(wait_until(Duration::from_millis(700), || broker.published_on(topic).len() == 2));
    assert_eq!(broker.published_on(topic)[0], br#"{"rsrp":-101,"rsrq":-12}"#.to_vec());
    // Transient status restored after the report.
    assert!(wait_until(WAIT, || ctx.status.get() == ApplicationStatus::SessionConnected));

    signal.request_stop();
    session.request_stop();
    assert!(signal.lifecycle().wait_until_stopped(WAIT));
    assert!(session.lifecycle().wait_until_stopped(WAIT));
}

// ── Indicator ─────────────────────────────────────────────────

#[test]
fn indicator_follows_status_and_turns_off_on_exit() {
    let ctx = fast_context();
    let led = RecordingIndicator::new();
    let mut task = IndicatorTask::new(Arc::clone(&ctx), led.clone());
    ctx.status.set(ApplicationStatus::ShuttingDown);
    task.start().unwrap();
    assert!(wait_until(WAIT, || led.current() == [true, true, true]));

    // The application flag does not stop the indicator.
    ctx.shutdown.request();
    std::thread::sleep(Duration::from_millis(50));
    assert!(task.is_running());

    task.request_stop();
    assert!(task.lifecycle().wait_until_stopped(WAIT));
    assert_eq!(led.current(), [false, false, false]);
}

#[test]
fn manual_override_switches_status_and_output() {
    let ctx = fast_context();
    let led = RecordingIndicator::new();
    let mut task = IndicatorTask::new(Arc::clone(&ctx), led.clone());
    let handle = task.handle();
    ctx.status.set(ApplicationStatus::Registered);
    task.start().unwrap();
    assert!(wait_until(WAIT, || led.current() == [false, false, true]));

    handle.set_manual(ChannelPattern::ON, ChannelPattern::OFF, ChannelPattern::OFF).unwrap();
    assert!(wait_until(WAIT, || led.current() == [true, false, false]));
    assert_eq!(ctx.status.get(), ApplicationStatus::Manual);

    // Priority channel silences the others while it is on.
    handle.add_to_manual(GREEN, ChannelPattern::new(1000, 1000).prioritised()).unwrap();
    assert!(wait_until(WAIT, || led.current() == [false, true, false]));

    handle.set_manual_channel(BLUE, ChannelPattern::ON).unwrap();
    handle.set_manual_channel(GREEN, ChannelPattern::OFF).unwrap();
    handle.set_manual_channel(RED, ChannelPattern::OFF).unwrap();
    assert!(wait_until(WAIT, || led.current() == [false, false, true]));

    task.request_stop();
    assert!(task.lifecycle().wait_until_stopped(WAIT));
}
