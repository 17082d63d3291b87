//! Control link handle
//!
//! [`ControlLink`] owns the single link actor task. Every public call is a
//! message onto the actor's channel, so calls never block on the network and
//! observers run on the actor task in the order events happened.

use std::sync::Arc;

use control_protocol::{Command, ControlSurfaceState, Decoded};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{
    Connector, EndpointDescriptor, LinkConfig, LinkEvent, LinkInput, LinkMachine, LinkState,
    LinkStatus, Scheduler, TokioScheduler, WebSocketConnector,
};

/// The operator's connection to the vehicle
pub struct ControlLink {
    tx: mpsc::UnboundedSender<LinkInput>,
    status: Arc<RwLock<LinkStatus>>,
    task: Option<JoinHandle<()>>,
}

impl ControlLink {
    /// Start a link over WebSocket. Must be called within a tokio runtime.
    pub fn spawn(config: LinkConfig) -> Self {
        let handshake_timeout = config.handshake_timeout();
        Self::spawn_with(config, |tx| {
            (
                WebSocketConnector::new(tx.clone(), handshake_timeout),
                TokioScheduler::new(tx),
            )
        })
    }

    /// Start a link with custom transport and timers. `build` receives the
    /// actor's input channel for reporting transport and timer events.
    pub fn spawn_with<C, S, F>(config: LinkConfig, build: F) -> Self
    where
        C: Connector + 'static,
        S: Scheduler + 'static,
        F: FnOnce(mpsc::UnboundedSender<LinkInput>) -> (C, S),
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (connector, scheduler) = build(tx.clone());
        let machine = LinkMachine::new(config, connector, scheduler);

        let status = Arc::new(RwLock::new(LinkStatus::default()));
        let task = tokio::spawn(run_actor(machine, rx, status.clone()));

        Self {
            tx,
            status,
            task: Some(task),
        }
    }

    pub fn configure(&self, raw: impl Into<String>) {
        self.post(LinkInput::Configure(raw.into()));
    }

    pub fn open(&self) {
        self.post(LinkInput::Open);
    }

    pub fn close(&self) {
        self.post(LinkInput::Close);
    }

    /// Queue a command; dropped silently unless the link is open when the
    /// actor gets to it.
    pub fn send(&self, command: Command, state: ControlSurfaceState) {
        self.post(LinkInput::Send(command, state));
    }

    pub fn on_state_change<F>(&self, observer: F)
    where
        F: Fn(&LinkEvent) + Send + 'static,
    {
        self.post(LinkInput::SubscribeState(Box::new(observer)));
    }

    pub fn on_message<F>(&self, observer: F)
    where
        F: Fn(&Decoded) + Send + 'static,
    {
        self.post(LinkInput::SubscribeMessages(Box::new(observer)));
    }

    /// Snapshot as of the last processed input
    pub fn status(&self) -> LinkStatus {
        self.status.read().clone()
    }

    pub fn state(&self) -> LinkState {
        self.status.read().state.clone()
    }

    pub fn endpoint(&self) -> Option<EndpointDescriptor> {
        self.status.read().endpoint.clone()
    }

    /// Close the link and wait for the actor to finish
    pub async fn shutdown(mut self) {
        self.post(LinkInput::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn post(&self, input: LinkInput) {
        if self.tx.send(input).is_err() {
            debug!("Link actor has stopped");
        }
    }
}

impl Drop for ControlLink {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.tx.send(LinkInput::Shutdown);
        }
    }
}

async fn run_actor<C: Connector, S: Scheduler>(
    mut machine: LinkMachine<C, S>,
    mut rx: mpsc::UnboundedReceiver<LinkInput>,
    status: Arc<RwLock<LinkStatus>>,
) {
    info!("Control link started");

    while let Some(input) = rx.recv().await {
        let running = machine.handle(input);
        *status.write() = machine.status();
        if !running {
            break;
        }
    }

    info!("Control link stopped");
}
