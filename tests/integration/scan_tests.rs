//! Network scan task: results, toggle-to-cancel, stop during a scan.

use std::sync::Arc;
use std::time::Duration;

use cellnode::adapters::sim::{SimBroker, SimModem};
use cellnode::app::ports::{BrokerPort, ScanResult};
use cellnode::runtime::{AppContext, AppTask};
use cellnode::status::ApplicationStatus;
use cellnode::tasks::scan::ScanTask;
use cellnode::tasks::session::SessionTask;

use crate::mock_hw::{WAIT, fast_context, wait_until};

const TOPIC: &str = "/5/NetworkScan";

fn networks(n: usize) -> Vec<ScanResult> {
    (0..n)
        .map(|i| ScanResult {
            operator: format!("Op{i}"),
            mcc_mnc: format!("001-{i:02}"),
        })
        .collect()
}

fn online_session(ctx: &Arc<AppContext>) -> (SessionTask<SimBroker>, SimBroker) {
    ctx.network.record_transition(true);
    let broker = SimBroker::new();
    let mut session = SessionTask::new(Arc::clone(ctx), broker.clone(), "5");
    session.start().unwrap();
    assert!(wait_until(WAIT, || broker.is_connected()));
    (session, broker)
}

fn last_summary(broker: &SimBroker) -> Option<String> {
    let published = broker.published_on(TOPIC);
    let last = published.last()?;
    let text = String::from_utf8(last.clone()).ok()?;
    text.contains("\"result\"").then_some(text)
}

#[test]
fn completed_scan_publishes_results_then_summary() {
    let ctx = fast_context();
    let (session, broker) = online_session(&ctx);
    let modem = SimModem::new("5").with_networks(networks(2), Duration::from_millis(20));
    let mut scan = ScanTask::new(Arc::clone(&ctx), modem, session.handle(), "5");
    let handle = scan.handle();
    scan.start().unwrap();

    ctx.status.set(ApplicationStatus::SessionConnected);
    handle.toggle().unwrap();
    assert!(wait_until(WAIT, || last_summary(&broker).is_some()));

    let published = broker.published_on(TOPIC);
    assert_eq!(published.len(), 3);
    assert_eq!(published[0], br#"{"operator":"Op0","mcc_mnc":"001-00"}"#.to_vec());
    assert_eq!(last_summary(&broker).unwrap(), r#"{"result":"completed","found":2}"#);
    assert!(wait_until(WAIT, || !scan.is_scanning()));
    assert_eq!(ctx.status.get(), ApplicationStatus::SessionConnected);

    scan.request_stop();
    session.request_stop();
    assert!(scan.lifecycle().wait_until_stopped(WAIT));
    assert!(session.lifecycle().wait_until_stopped(WAIT));
}

#[test]
fn empty_scan_reports_none_found() {
    let ctx = fast_context();
    let (session, broker) = online_session(&ctx);
    let modem = SimModem::new("5").with_networks(Vec::new(), Duration::from_millis(1));
    let mut scan = ScanTask::new(Arc::clone(&ctx), modem, session.handle(), "5");
    let handle = scan.handle();
    scan.start().unwrap();

    handle.toggle().unwrap();
    assert!(wait_until(WAIT, || last_summary(&broker).is_some()));
    assert_eq!(last_summary(&broker).unwrap(), r#"{"result":"none_found"}"#);

    scan.request_stop();
    session.request_stop();
    assert!(scan.lifecycle().wait_until_stopped(WAIT));
}

#[test]
fn second_start_cancels_running_scan() {
    let ctx = fast_context();
    let (session, broker) = online_session(&ctx);
    let modem = SimModem::new("5").with_networks(networks(20), Duration::from_millis(100));
    let mut scan = ScanTask::new(Arc::clone(&ctx), modem, session.handle(), "5");
    let handle = scan.handle();
    scan.start().unwrap();

    handle.toggle().unwrap();
    assert!(wait_until(WAIT, || scan.is_scanning()));

    handle.toggle().unwrap();
    assert!(wait_until(WAIT, || !scan.is_scanning()));
    assert!(wait_until(WAIT, || last_summary(&broker).is_some()));
    assert_eq!(last_summary(&broker).unwrap(), r#"{"result":"cancelled"}"#);
    assert!(broker.published_on(TOPIC).len() < 21);

    scan.request_stop();
    session.request_stop();
    assert!(scan.lifecycle().wait_until_stopped(WAIT));
}

#[test]
fn stop_during_scan_finishes_promptly() {
    let ctx = fast_context();
    let (session, _broker) = online_session(&ctx);
    let modem = SimModem::new("5").with_networks(networks(50), Duration::from_millis(100));
    let mut scan = ScanTask::new(Arc::clone(&ctx), modem, session.handle(), "5");
    let handle = scan.handle();
    scan.start().unwrap();
    handle.toggle().unwrap();
    assert!(wait_until(WAIT, || scan.is_scanning()));

    scan.request_stop();
    assert!(scan.lifecycle().wait_until_stopped(Duration::from_secs(2)));
    assert!(!scan.is_scanning());
    assert_eq!(handle.toggle(), Err(cellnode::error::Error::QueueClosed));

    session.request_stop();
    assert!(session.lifecycle().wait_until_stopped(WAIT));
}
