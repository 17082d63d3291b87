//! Connection lifecycle state machine
//!
//! All link operations, transport callbacks and timer expiries are funneled
//! into [`LinkMachine::handle`] one at a time. The machine never blocks: it
//! asks its [`Connector`] to open connections and its [`Scheduler`] to arm
//! reconnect timers, and learns the outcome through later inputs.

use control_protocol::{Command, ControlMessage, ControlSurfaceState, encode_frames};
use tracing::{debug, info, warn};

use crate::{
    CloseReason, ConnectionId, Connector, EndpointDescriptor, LinkConfig, LinkError, LinkEvent,
    LinkState, LinkStatus, MessageObserver, Scheduler, StateObserver, TimerToken, resolve,
};

/// Everything the link reacts to, in arrival order
pub enum LinkInput {
    Configure(String),
    Open,
    Close,
    Send(Command, ControlSurfaceState),
    SubscribeState(StateObserver),
    SubscribeMessages(MessageObserver),
    TransportOpened(ConnectionId),
    TransportClosed(ConnectionId, CloseReason),
    Inbound(ConnectionId, String),
    TimerFired(TimerToken),
    Shutdown,
}

pub struct LinkMachine<C: Connector, S: Scheduler> {
    config: LinkConfig,
    connector: C,
    scheduler: S,
    endpoint_raw: Option<String>,
    descriptor: Option<EndpointDescriptor>,
    state: LinkState,
    attempt: u32,
    current: Option<ConnectionId>,
    next_connection: u64,
    pending_timer: Option<TimerToken>,
    next_timer: u64,
    state_observers: Vec<StateObserver>,
    message_observers: Vec<MessageObserver>,
}

impl<C: Connector, S: Scheduler> LinkMachine<C, S> {
    pub fn new(config: LinkConfig, connector: C, scheduler: S) -> Self {
        Self {
            config,
            connector,
            scheduler,
            endpoint_raw: None,
            descriptor: None,
            state: LinkState::Idle,
            attempt: 0,
            current: None,
            next_connection: 0,
            pending_timer: None,
            next_timer: 0,
            state_observers: Vec::new(),
            message_observers: Vec::new(),
        }
    }

    /// Apply one input. Returns false once the link has shut down.
    pub fn handle(&mut self, input: LinkInput) -> bool {
        match input {
            LinkInput::Configure(raw) => self.configure(raw),
            LinkInput::Open => self.open(),
            LinkInput::Close => self.close(),
            LinkInput::Send(command, state) => {
                self.send(command, &state);
            }
            LinkInput::SubscribeState(observer) => self.state_observers.push(observer),
            LinkInput::SubscribeMessages(observer) => self.message_observers.push(observer),
            LinkInput::TransportOpened(id) => self.transport_opened(id),
            LinkInput::TransportClosed(id, reason) => self.transport_closed(id, reason),
            LinkInput::Inbound(id, text) => self.inbound(id, &text),
            LinkInput::TimerFired(token) => self.timer_fired(token),
            LinkInput::Shutdown => {
                self.close();
                return false;
            }
        }
        true
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.state.clone(),
            attempt: self.attempt,
            endpoint: self.descriptor.clone(),
        }
    }

    /// Set the endpoint. Replaces a live connection without retrying it.
    pub fn configure(&mut self, raw: String) {
        let unchanged = self.endpoint_raw.as_deref() == Some(raw.as_str());
        if unchanged && matches!(self.state, LinkState::Connecting | LinkState::Open) {
            debug!("Endpoint unchanged, keeping current connection");
            return;
        }

        let was_active = self.state != LinkState::Idle;

        self.cancel_timer();
        self.release_connection();
        self.attempt = 0;

        self.descriptor = match resolve(&raw, &self.config.resolver) {
            Ok(descriptor) => {
                info!("Endpoint set to {}", descriptor);
                Some(descriptor)
            }
            Err(e) => {
                warn!("Endpoint {:?} does not resolve: {}", raw, e);
                None
            }
        };
        self.endpoint_raw = Some(raw);

        if was_active {
            self.set_state(LinkState::Idle);
            self.open();
        }
    }

    /// Start connecting unless a connection is already pending or open
    pub fn open(&mut self) {
        if self.current.is_some() {
            debug!("Open ignored, link is {}", self.state);
            return;
        }

        let raw = self.endpoint_raw.as_deref().unwrap_or("");
        match resolve(raw, &self.config.resolver) {
            Ok(descriptor) => self.descriptor = Some(descriptor),
            Err(e) => {
                warn!("Cannot open link: {}", e);
                self.cancel_timer();
                self.descriptor = None;
                self.set_state(LinkState::Idle);
                self.emit(LinkEvent::Error(LinkError::InvalidEndpoint(e)));
                return;
            }
        }

        self.cancel_timer();
        self.attempt = 0;
        self.connect();
    }

    /// Operator close: not a failure, never retried
    pub fn close(&mut self) {
        self.cancel_timer();
        self.release_connection();
        self.attempt = 0;
        self.set_state(LinkState::Idle);
    }

    /// Transmit a command. Returns whether anything was handed to the
    /// transport; nothing is buffered while the link is not open.
    pub fn send(&mut self, command: Command, state: &ControlSurfaceState) -> bool {
        let Some(id) = self.current.filter(|_| self.state.is_open()) else {
            debug!("Dropping {:?}, link is {}", command, self.state);
            return false;
        };

        let frames = match encode_frames(command, state) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("Failed to encode {:?}: {}", command, e);
                return false;
            }
        };

        for frame in frames {
            if let Err(e) = self.connector.send(id, frame) {
                debug!("Send on {} failed: {}", id, e);
                return false;
            }
        }
        true
    }

    pub fn subscribe_state(&mut self, observer: StateObserver) {
        self.state_observers.push(observer);
    }

    pub fn subscribe_messages(&mut self, observer: MessageObserver) {
        self.message_observers.push(observer);
    }

    pub fn transport_opened(&mut self, id: ConnectionId) {
        if self.current != Some(id) || self.state != LinkState::Connecting {
            debug!("Ignoring open from stale connection {}", id);
            return;
        }

        self.attempt = 0;
        self.cancel_timer();
        self.set_state(LinkState::Open);
    }

    pub fn transport_closed(&mut self, id: ConnectionId, reason: CloseReason) {
        if self.current != Some(id) {
            debug!("Ignoring close from stale connection {}", id);
            return;
        }

        self.current = None;
        self.connector.close(id);

        info!("Connection {} closed: {}", id, reason);
        let error = reason.to_error();
        self.set_state(LinkState::Closed(reason));
        if let Some(error) = error {
            self.emit(LinkEvent::Error(error));
        }

        self.schedule_reconnect();
    }

    pub fn inbound(&mut self, id: ConnectionId, text: &str) {
        if self.current != Some(id) {
            debug!("Ignoring record from stale connection {}", id);
            return;
        }

        match control_protocol::decode(text) {
            Ok(decoded) => {
                if let ControlMessage::Unrecognized { kind } = &decoded.message {
                    debug!("Ignoring unrecognized record {:?}", kind);
                    return;
                }
                for observer in &self.message_observers {
                    observer(&decoded);
                }
            }
            Err(e) => warn!("Dropping inbound record: {}", e),
        }
    }

    pub fn timer_fired(&mut self, token: TimerToken) {
        if self.pending_timer != Some(token) {
            debug!("Ignoring stale timer {:?}", token);
            return;
        }
        self.pending_timer = None;

        let reconnectable = matches!(self.state, LinkState::Closed(_)) && !self.state.is_exhausted();
        if self.current.is_none() && reconnectable {
            info!("Reconnecting, attempt {}", self.attempt);
            self.connect();
        }
    }

    fn connect(&mut self) {
        let Some(url) = self.descriptor.as_ref().map(|d| d.control_url.clone()) else {
            return;
        };

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.current = Some(id);

        self.set_state(LinkState::Connecting);
        self.connector.connect(id, &url);
    }

    fn schedule_reconnect(&mut self) {
        if self.pending_timer.is_some() {
            return;
        }

        let policy = self.config.policy;
        if !policy.allows(self.attempt) {
            let attempts = self.attempt + 1;
            warn!("Giving up after {} connection attempts", attempts);
            self.set_state(LinkState::Closed(CloseReason::Exhausted));
            self.emit(LinkEvent::Error(LinkError::ExhaustedRetries { attempts }));
            return;
        }

        let delay = policy.delay_for(self.attempt);
        self.attempt += 1;

        let token = TimerToken(self.next_timer);
        self.next_timer += 1;
        self.pending_timer = Some(token);
        self.scheduler.schedule(token, delay);

        info!("Reconnect {} scheduled in {:?}", self.attempt, delay);
        self.emit(LinkEvent::ReconnectScheduled {
            attempt: self.attempt,
            delay,
        });
    }

    fn cancel_timer(&mut self) {
        if let Some(token) = self.pending_timer.take() {
            self.scheduler.cancel(token);
        }
    }

    fn release_connection(&mut self) {
        if let Some(id) = self.current.take() {
            self.set_state(LinkState::Closing);
            self.connector.close(id);
        }
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state == state {
            return;
        }
        info!("Link {} -> {}", self.state, state);
        self.state = state.clone();
        self.emit(LinkEvent::StateChanged {
            state,
            attempt: self.attempt,
        });
    }

    fn emit(&self, event: LinkEvent) {
        for observer in &self.state_observers {
            observer(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use control_protocol::Decoded;
    use parking_lot::Mutex;

    use crate::{EndpointError, TransportError, TransportResult};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Connect(ConnectionId, String),
        Send(ConnectionId, String),
        Close(ConnectionId),
        Schedule(TimerToken, Duration),
        Cancel(TimerToken),
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    struct FakeConnector {
        log: Log,
    }

    impl Connector for FakeConnector {
        fn connect(&mut self, id: ConnectionId, url: &str) {
            self.log.lock().push(Call::Connect(id, url.to_string()));
        }

        fn send(&mut self, id: ConnectionId, frame: String) -> TransportResult<()> {
            self.log.lock().push(Call::Send(id, frame));
            Ok(())
        }

        fn close(&mut self, id: ConnectionId) {
            self.log.lock().push(Call::Close(id));
        }
    }

    struct FakeScheduler {
        log: Log,
    }

    impl Scheduler for FakeScheduler {
        fn schedule(&mut self, token: TimerToken, delay: Duration) {
            self.log.lock().push(Call::Schedule(token, delay));
        }

        fn cancel(&mut self, token: TimerToken) {
            self.log.lock().push(Call::Cancel(token));
        }
    }

    struct Harness {
        link: LinkMachine<FakeConnector, FakeScheduler>,
        calls: Log,
        events: Arc<Mutex<Vec<LinkEvent>>>,
        messages: Arc<Mutex<Vec<Decoded>>>,
    }

    impl Harness {
        fn new() -> Self {
            let calls: Log = Arc::default();
            let events = Arc::new(Mutex::new(Vec::new()));
            let messages = Arc::new(Mutex::new(Vec::new()));

            let mut link = LinkMachine::new(
                LinkConfig::default(),
                FakeConnector { log: calls.clone() },
                FakeScheduler { log: calls.clone() },
            );

            let sink = events.clone();
            link.subscribe_state(Box::new(move |event| sink.lock().push(event.clone())));
            let sink = messages.clone();
            link.subscribe_messages(Box::new(move |decoded| sink.lock().push(decoded.clone())));

            Self {
                link,
                calls,
                events,
                messages,
            }
        }

        fn connects(&self) -> Vec<(ConnectionId, String)> {
            self.calls
                .lock()
                .iter()
                .filter_map(|call| match call {
                    Call::Connect(id, url) => Some((*id, url.clone())),
                    _ => None,
                })
                .collect()
        }

        fn last_connection(&self) -> ConnectionId {
            self.connects().last().map(|(id, _)| *id).unwrap()
        }

        fn scheduled(&self) -> Vec<(TimerToken, Duration)> {
            self.calls
                .lock()
                .iter()
                .filter_map(|call| match call {
                    Call::Schedule(token, delay) => Some((*token, *delay)),
                    _ => None,
                })
                .collect()
        }

        fn last_timer(&self) -> TimerToken {
            self.scheduled().last().map(|(token, _)| *token).unwrap()
        }

        fn sends(&self) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .filter_map(|call| match call {
                    Call::Send(_, frame) => Some(frame.clone()),
                    _ => None,
                })
                .collect()
        }

        fn errors(&self) -> Vec<LinkError> {
            self.events
                .lock()
                .iter()
                .filter_map(|event| match event {
                    LinkEvent::Error(e) => Some(e.clone()),
                    _ => None,
                })
                .collect()
        }

        fn fail_current(&mut self) {
            let id = self.last_connection();
            self.link
                .transport_closed(id, CloseReason::Unreachable("refused".to_string()));
        }

        fn open_connected(&mut self, raw: &str) -> ConnectionId {
            self.link.configure(raw.to_string());
            self.link.open();
            let id = self.last_connection();
            self.link.transport_opened(id);
            id
        }
    }

    #[test]
    fn test_open_connects_to_resolved_url() {
        let mut h = Harness::new();
        h.link.configure("http://192.168.1.100/".to_string());
        h.link.open();

        assert_eq!(h.link.state(), &LinkState::Connecting);
        assert_eq!(
            h.connects(),
            vec![(ConnectionId(0), "ws://192.168.1.100:8765".to_string())]
        );

        h.link.transport_opened(ConnectionId(0));
        assert_eq!(h.link.state(), &LinkState::Open);
        assert_eq!(h.link.status().endpoint.unwrap().control_url, "ws://192.168.1.100:8765");
    }

    #[test]
    fn test_invalid_endpoint_stays_idle() {
        let mut h = Harness::new();
        h.link.configure("[::1".to_string());
        h.link.open();

        assert_eq!(h.link.state(), &LinkState::Idle);
        assert!(h.connects().is_empty());
        assert!(h.scheduled().is_empty());
        assert_eq!(
            h.errors(),
            vec![LinkError::InvalidEndpoint(EndpointError::UnterminatedBracket(
                "[::1".to_string()
            ))]
        );
    }

    #[test]
    fn test_open_without_endpoint() {
        let mut h = Harness::new();
        h.link.open();

        assert_eq!(h.link.state(), &LinkState::Idle);
        assert_eq!(h.errors(), vec![LinkError::InvalidEndpoint(EndpointError::Empty)]);
    }

    #[test]
    fn test_send_dropped_unless_open() {
        let mut h = Harness::new();
        let surface = ControlSurfaceState::default();

        assert!(!h.link.send(Command::Throttle(42), &surface));

        h.link.configure("192.168.1.100".to_string());
        h.link.open();
        assert!(!h.link.send(Command::Throttle(42), &surface));
        assert!(h.sends().is_empty());

        let id = h.last_connection();
        h.link.transport_opened(id);
        assert!(h.link.send(Command::Throttle(42), &surface));

        let sends = h.sends();
        assert_eq!(sends.len(), 2);
        assert!(sends[0].contains(r#""type":"throttle_forward","value":42"#));
        assert!(sends[1].contains(r#""type":"throttle_backward","value":0"#));
    }

    #[test]
    fn test_retries_exhaust_then_configure_resumes() {
        let mut h = Harness::new();
        h.link.configure("192.168.1.100".to_string());
        h.link.open();
        h.fail_current();

        for _ in 0..4 {
            assert!(!h.link.state().is_exhausted());
            let token = h.last_timer();
            h.link.timer_fired(token);
            assert_eq!(h.link.state(), &LinkState::Connecting);
            h.fail_current();
        }

        let delays: Vec<u64> = h
            .scheduled()
            .iter()
            .map(|(_, delay)| delay.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![3000, 5000, 7000, 9000]);
        assert_eq!(h.connects().len(), 5);
        assert_eq!(h.link.state(), &LinkState::Closed(CloseReason::Exhausted));
        assert_eq!(
            h.errors().last(),
            Some(&LinkError::ExhaustedRetries { attempts: 5 })
        );

        h.link.configure("192.168.1.101".to_string());
        assert_eq!(h.link.state(), &LinkState::Connecting);
        assert_eq!(h.link.attempt(), 0);
        assert_eq!(h.connects().last().unwrap().1, "ws://192.168.1.101:8765");
    }

    #[test]
    fn test_fifth_failure_arms_no_timer() {
        let mut h = Harness::new();
        h.link.configure("192.168.1.100".to_string());
        h.link.open();

        for failure in 1..=5 {
            h.fail_current();
            if failure < 5 {
                let token = h.last_timer();
                h.link.timer_fired(token);
            }
        }

        assert!(h.link.state().is_exhausted());
        assert_eq!(h.scheduled().len(), 4);

        // Stale fires and closes change nothing once exhausted
        let token = h.last_timer();
        h.link.timer_fired(token);
        assert!(h.link.state().is_exhausted());
        assert_eq!(h.connects().len(), 5);
    }

    #[test]
    fn test_open_after_exhaustion_resets_counter() {
        let mut h = Harness::new();
        h.link.configure("rover.local".to_string());
        h.link.open();
        h.fail_current();
        for _ in 0..4 {
            let token = h.last_timer();
            h.link.timer_fired(token);
            h.fail_current();
        }
        assert!(h.link.state().is_exhausted());

        h.link.open();
        assert_eq!(h.link.state(), &LinkState::Connecting);
        h.fail_current();

        assert_eq!(h.scheduled().last().unwrap().1, Duration::from_millis(3000));
        assert_eq!(h.link.attempt(), 1);
    }

    #[test]
    fn test_success_resets_attempts() {
        let mut h = Harness::new();
        h.link.configure("rover.local".to_string());
        h.link.open();
        h.fail_current();
        let token = h.last_timer();
        h.link.timer_fired(token);
        h.fail_current();
        assert_eq!(h.link.attempt(), 2);

        let token = h.last_timer();
        h.link.timer_fired(token);
        let id = h.last_connection();
        h.link.transport_opened(id);
        assert_eq!(h.link.attempt(), 0);

        h.link.transport_closed(id, CloseReason::from_close_code(Some(1000)));
        assert_eq!(h.scheduled().last().unwrap().1, Duration::from_millis(3000));
    }

    #[test]
    fn test_single_pending_timer() {
        let mut h = Harness::new();
        h.link.configure("rover.local".to_string());
        h.link.open();
        let first = h.last_connection();
        h.fail_current();

        // Late duplicate from the same dead connection
        h.link
            .transport_closed(first, CloseReason::ClosedByPeer { code: None });
        assert_eq!(h.scheduled().len(), 1);

        // Manual open while a reconnect is pending replaces the timer
        let pending = h.last_timer();
        h.link.open();
        assert!(h.calls.lock().contains(&Call::Cancel(pending)));
        assert_eq!(h.connects().len(), 2);

        h.link.timer_fired(pending);
        assert_eq!(h.connects().len(), 2);
    }

    #[test]
    fn test_cancelled_timer_never_reconnects() {
        let mut h = Harness::new();
        h.link.configure("rover.local".to_string());
        h.link.open();
        h.fail_current();
        let pending = h.last_timer();

        h.link.close();
        assert_eq!(h.link.state(), &LinkState::Idle);
        assert!(h.calls.lock().contains(&Call::Cancel(pending)));

        h.link.timer_fired(pending);
        assert_eq!(h.link.state(), &LinkState::Idle);
        assert_eq!(h.connects().len(), 1);
    }

    #[test]
    fn test_close_is_not_a_failure() {
        let mut h = Harness::new();
        let id = h.open_connected("rover.local");

        h.link.close();
        assert_eq!(h.link.state(), &LinkState::Idle);
        assert!(h.calls.lock().contains(&Call::Close(id)));

        // Transport reporting after release is stale
        h.link.transport_closed(id, CloseReason::Normal);
        assert!(h.scheduled().is_empty());
        assert!(h.errors().is_empty());
    }

    #[test]
    fn test_configure_while_open_switches_endpoint() {
        let mut h = Harness::new();
        let old = h.open_connected("192.168.1.100");

        h.link.configure("abc123.ngrok-free.app".to_string());
        assert!(h.calls.lock().contains(&Call::Close(old)));
        assert_eq!(h.link.state(), &LinkState::Connecting);
        assert_eq!(h.connects().last().unwrap().1, "wss://abc123.ngrok-free.app");

        h.link
            .transport_closed(old, CloseReason::Unreachable("reset".to_string()));
        assert!(h.scheduled().is_empty());
        assert_eq!(
            h.link.status().endpoint.unwrap().media_base_url,
            "https://abc123.ngrok-free.app/camera"
        );
    }

    #[test]
    fn test_configure_same_endpoint_keeps_connection() {
        let mut h = Harness::new();
        h.open_connected("192.168.1.100");

        h.link.configure("192.168.1.100".to_string());
        assert_eq!(h.link.state(), &LinkState::Open);
        assert_eq!(h.connects().len(), 1);
    }

    #[test]
    fn test_configure_while_idle_does_not_connect() {
        let mut h = Harness::new();
        h.link.configure("192.168.1.100:9000".to_string());

        assert_eq!(h.link.state(), &LinkState::Idle);
        assert!(h.connects().is_empty());
        assert_eq!(
            h.link.status().endpoint.unwrap().media_base_url,
            "http://192.168.1.100:9000/camera"
        );
    }

    #[test]
    fn test_close_reason_surfaces_error() {
        let mut h = Harness::new();
        let id = h.open_connected("rover.local");

        h.link
            .transport_closed(id, CloseReason::from_close_code(Some(1002)));

        assert_eq!(
            h.link.state(),
            &LinkState::Closed(CloseReason::ProtocolError { code: 1002 })
        );
        assert_eq!(h.errors(), vec![LinkError::ProtocolError { code: 1002 }]);
        assert!(h.events.lock().contains(&LinkEvent::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_millis(3000),
        }));
    }

    #[test]
    fn test_inbound_records_reach_observers() {
        let mut h = Harness::new();
        let id = h.open_connected("rover.local");

        h.link.inbound(id, r#"{"type":"honk","value":true}"#);
        h.link.inbound(id, "not json");
        h.link.inbound(id, r#"{"type":"telemetry","value":1}"#);
        h.link.inbound(ConnectionId(99), r#"{"type":"brake","value":10}"#);

        let messages = h.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message, ControlMessage::Honk(true));
        assert_eq!(h.link.state(), &LinkState::Open);
    }

    #[test]
    fn test_state_events_in_order() {
        let mut h = Harness::new();
        h.open_connected("rover.local");
        h.link.close();

        let states: Vec<LinkState> = h
            .events
            .lock()
            .iter()
            .filter_map(|event| match event {
                LinkEvent::StateChanged { state, .. } => Some(state.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                LinkState::Connecting,
                LinkState::Open,
                LinkState::Closing,
                LinkState::Idle
            ]
        );
    }

    #[test]
    fn test_transport_send_errors_are_swallowed() {
        struct Broken;
        impl Connector for Broken {
            fn connect(&mut self, _: ConnectionId, _: &str) {}
            fn send(&mut self, _: ConnectionId, _: String) -> TransportResult<()> {
                Err(TransportError::NotConnected)
            }
            fn close(&mut self, _: ConnectionId) {}
        }

        let calls: Log = Arc::default();
        let mut link = LinkMachine::new(LinkConfig::default(), Broken, FakeScheduler { log: calls });
        link.configure("rover.local".to_string());
        link.open();
        link.transport_opened(ConnectionId(0));

        assert!(!link.send(Command::Brake(50), &ControlSurfaceState::default()));
        assert_eq!(link.state(), &LinkState::Open);
    }
}
