//! Messaging session manager.
//!
//! Owns the broker client and the topic table.  Nothing else touches
//! either: publishes and topic registrations from other tasks arrive
//! through the inbox and run on this worker.
//!
//! ## Loop
//!
//! ```text
//!  ┌─▶ not connected? ── network up ──▶ connect + resubscribe every topic
//!  │        │            network down ─▶ log, do nothing
//!  │        └─ connected, N pending ───▶ read exactly N, dispatch by topic
//!  │
//!  └── dwell (drains inbox; ends early when connected with messages pending)
//! ```
//!
//! A connect failure that is not retryable (rejected credentials) sets
//! status `Error` and the session stops trying until the task is stopped.
//!
//! Publishing while disconnected is skipped and logged; there is no outbox.
//! Messages on topics without a registration are dropped silently.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::topics::{TopicCallback, TopicTable};
use super::{LARGE_STACK, device_topic};
use crate::app::control::ControlRouter;
use crate::app::ports::{BrokerPort, Credentials, QoS};
use crate::error::{Error, Result};
use crate::events::EventQueue;
use crate::runtime::{AppContext, AppTask, Lifecycle, StopToken, TaskState, dwell};
use crate::status::ApplicationStatus;

pub const SESSION_INBOX: usize = 8;

/// Leaf of the reserved control topic, `/<serial>/Control`.
pub const CONTROL_TOPIC: &str = "Control";

pub enum SessionMsg {
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
    RegisterTopic {
        topic: String,
        max_qos: QoS,
        callback: TopicCallback,
    },
}

pub type SessionQueue = EventQueue<SessionMsg, SESSION_INBOX>;

/// Cloneable front used by other tasks to publish and subscribe.
#[derive(Clone)]
pub struct SessionHandle {
    inbox: SessionQueue,
}

impl SessionHandle {
    /// Queue a publish.  It runs on the session worker; if the session is
    /// down at that point the message is dropped.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>, qos: QoS, retain: bool) -> Result<()> {
        self.inbox.send(SessionMsg::Publish {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        })
    }

    /// Queue a topic registration.
    ///
    /// `Ok` only means the request was queued.  The table is owned by the
    /// session worker, so a duplicate topic or a full table is rejected
    /// there and logged; the earlier registration stays in place.  Use
    /// [`SessionTask::register_topic_callback`] before start to get the
    /// outcome directly.
    pub fn register_topic_callback(&self, topic: &str, max_qos: QoS, callback: TopicCallback) -> Result<()> {
        self.inbox.send(SessionMsg::RegisterTopic {
            topic: topic.into(),
            max_qos,
            callback,
        })
    }
}

pub struct SessionTask<B: BrokerPort + 'static> {
    lifecycle: Lifecycle,
    ctx: Arc<AppContext>,
    inbox: SessionQueue,
    serial: String,
    broker: Option<B>,
    topics: TopicTable,
    control: Option<ControlRouter>,
}

impl<B: BrokerPort + 'static> SessionTask<B> {
    pub const NAME: &'static str = "Session";

    pub fn new(ctx: Arc<AppContext>, broker: B, serial: &str) -> Self {
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
            ctx,
            inbox: SessionQueue::new(),
            serial: serial.into(),
            broker: Some(broker),
            topics: TopicTable::new(),
            control: None,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            inbox: self.inbox.clone(),
        }
    }

    /// Route commands on the control topic to `router`.
    pub fn set_control_router(&mut self, router: ControlRouter) {
        self.control = Some(router);
    }

    pub fn control_topic(&self) -> String {
        device_topic(&self.serial, CONTROL_TOPIC)
    }

    /// Register a topic before the task starts.  Subscribed on connect.
    pub fn register_topic_callback(&mut self, topic: &str, max_qos: QoS, callback: TopicCallback) -> Result<()> {
        self.topics.register(topic, max_qos, callback)
    }

    fn control_callback(&self) -> TopicCallback {
        let router = self.control.clone();
        Box::new(move |message| {
            let text = String::from_utf8_lossy(&message.payload);
            match &router {
                Some(router) => router.handle_text(&text),
                None => warn!("Control command '{}' ignored, no router", text.trim()),
            }
        })
    }
}

impl<B: BrokerPort + 'static> AppTask for SessionTask<B> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn start(&mut self) -> Result<()> {
        if self.lifecycle.state() != TaskState::NotStarted {
            return Err(Error::ConfigurationInvalid("task already started"));
        }
        let control_topic = self.control_topic();
        if !self.topics.contains(&control_topic) {
            let callback = self.control_callback();
            self.topics.register(&control_topic, QoS::AtMostOnce, callback)?;
        }
        let broker = self.broker.take().ok_or(Error::ResourceExhausted("broker port"))?;

        let worker = SessionWorker {
            ctx: Arc::clone(&self.ctx),
            inbox: self.inbox.clone(),
            token: StopToken::new(self.ctx.shutdown.clone(), self.lifecycle.clone()),
            broker,
            topics: core::mem::take(&mut self.topics),
            pending: Arc::new(AtomicUsize::new(0)),
            credentials: Credentials {
                broker: self.ctx.config.broker_name.clone(),
                username: self.ctx.config.broker_username.clone(),
                password: self.ctx.config.broker_password.clone(),
            },
            fatal: None,
        };
        self.inbox.open();
        if let Err(e) = self.lifecycle.spawn(LARGE_STACK, move || worker.run()) {
            self.inbox.close();
            return Err(e);
        }
        Ok(())
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }
}

struct SessionWorker<B: BrokerPort> {
    ctx: Arc<AppContext>,
    inbox: SessionQueue,
    token: StopToken,
    broker: B,
    topics: TopicTable,
    /// Messages the broker says are waiting; written by its callback.
    pending: Arc<AtomicUsize>,
    credentials: Credentials,
    /// A non-retryable connect failure; no further attempts are made.
    fatal: Option<Error>,
}

impl<B: BrokerPort> SessionWorker<B> {
    fn run(mut self) {
        let dwell_total = Duration::from_secs(u64::from(self.ctx.config.session_dwell_secs));
        let slice = self.ctx.dwell_slice();

        while self.token.keep_going() {
            if let Some(e) = self.fatal {
                debug!("Session idle after fatal error: {}", e);
            } else if !self.broker.is_connected() {
                self.ctx.status.set(ApplicationStatus::SessionDisconnected);
                if self.ctx.network.is_up() {
                    info!("Session disconnected, trying to connect...");
                    self.connect();
                } else {
                    info!("Can't connect to the broker, network is not registered at the moment.");
                }
            } else if self.pending.load(Ordering::Acquire) > 0 {
                self.read_messages();
            }

            // Announced messages cut the dwell short only while they can be read.
            let inbox = self.inbox.clone();
            let pending = Arc::clone(&self.pending);
            dwell(dwell_total, slice, || {
                inbox.drain(|msg| self.handle(msg));
                let readable = pending.load(Ordering::Acquire) > 0 && self.broker.is_connected();
                self.token.keep_going() && !readable
            });
        }

        self.disconnect();
        self.topics.clear();
        self.inbox.close();
        info!("Session Manager Task finished.");
    }

    fn handle(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::Publish {
                topic,
                payload,
                qos,
                retain,
            } => self.publish(&topic, &payload, qos, retain),
            SessionMsg::RegisterTopic {
                topic,
                max_qos,
                callback,
            } => {
                if let Err(e) = self.register_topic(&topic, max_qos, callback) {
                    warn!("Topic '{}' not registered: {}", topic, e);
                }
            }
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) {
        if !self.broker.is_connected() {
            info!("Session is not online, not publishing message on {}", topic);
            return;
        }
        self.ctx.status.set(ApplicationStatus::SessionConnected);
        match self.broker.publish(topic, payload, qos, retain) {
            Ok(()) => info!("Published message on {}", topic),
            Err(e) => warn!("Failed to publish message on {}: {}", topic, e),
        }
    }

    fn register_topic(&mut self, topic: &str, max_qos: QoS, callback: TopicCallback) -> Result<()> {
        self.topics.register(topic, max_qos, callback)?;
        if self.broker.is_connected() {
            if let Err(e) = self.broker.subscribe(topic, max_qos) {
                self.topics.unregister_last(topic);
                return Err(e);
            }
        }
        Ok(())
    }

    fn connect(&mut self) {
        self.ctx.status.set(ApplicationStatus::SessionConnecting);
        info!("Connecting to broker {}...", self.credentials.broker);
        if let Err(e) = self.broker.connect(&self.credentials) {
            if e.is_retryable() {
                self.ctx.status.set(ApplicationStatus::SessionDisconnected);
                warn!("Failed to connect to the broker: {}", e);
            } else {
                self.ctx.status.set(ApplicationStatus::Error);
                error!("Broker refused the session for good: {}", e);
                self.fatal = Some(e);
            }
            return;
        }

        // Announcements from a previous session are stale.
        self.pending.store(0, Ordering::Release);
        let ctx = Arc::clone(&self.ctx);
        self.broker.set_disconnect_callback(Box::new(move || {
            ctx.status.set(ApplicationStatus::SessionDisconnected);
            warn!("Broker dropped the session");
        }));
        let pending = Arc::clone(&self.pending);
        self.broker.set_message_available_callback(Box::new(move |count| {
            debug!("Broker has {} messages available to read", count);
            pending.store(count, Ordering::Release);
        }));

        for (topic, qos) in self.topics.subscriptions() {
            if let Err(e) = self.broker.subscribe(topic, qos) {
                warn!("Failed to subscribe to {}: {}", topic, e);
            }
        }
        self.ctx.status.set(ApplicationStatus::SessionConnected);
        info!("Connected to broker");
    }

    /// Read exactly the number of messages the broker announced.
    fn read_messages(&mut self) {
        let count = self.pending.swap(0, Ordering::AcqRel);
        for _ in 0..count {
            match self.broker.read_next_message() {
                Ok(message) => {
                    debug!("Read message on {} [{} bytes]", message.topic, message.payload.len());
                    if !self.topics.dispatch(&message) {
                        debug!("No callback for {}, discarded", message.topic);
                    }
                }
                Err(e) => warn!("Failed to read a message: {}", e),
            }
        }
    }

    fn disconnect(&mut self) {
        if !self.broker.is_connected() {
            return;
        }
        info!("Disconnecting from the broker...");
        match self.broker.disconnect() {
            Ok(()) => info!("Disconnected from the broker"),
            Err(e) => warn!("Failed to disconnect from the broker: {}", e),
        }
    }
}
