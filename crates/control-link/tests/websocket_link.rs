//! Control link against a local WebSocket vehicle

use std::time::Duration;

use control_link::{
    ControlLink, LinkConfig, LinkError, LinkEvent, LinkState, ReconnectPolicy,
};
use control_protocol::{Command, ControlMessage, ControlSurfaceState, Decoded, Gear, decode};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn fast_config() -> LinkConfig {
    LinkConfig {
        policy: ReconnectPolicy {
            max_attempts: 3,
            base_delay_ms: 50,
            step_ms: 10,
            cap_ms: 200,
        },
        handshake_timeout_ms: 2000,
        ..Default::default()
    }
}

async fn next_matching<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    mut pred: impl FnMut(&T) -> bool,
) -> T {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let item = rx.recv().await.expect("observer channel closed");
            if pred(&item) {
                return item;
            }
        }
    })
    .await
    .expect("timed out waiting for link event")
}

fn watch(link: &ControlLink) -> mpsc::UnboundedReceiver<LinkEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    link.on_state_change(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

fn is_open(event: &LinkEvent) -> bool {
    matches!(event, LinkEvent::StateChanged { state: LinkState::Open, .. })
}

#[tokio::test]
async fn test_throttle_reaches_vehicle() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = frames_tx.send(text.as_str().to_owned());
            }
        }
    });

    let link = ControlLink::spawn(fast_config());
    let mut events = watch(&link);
    link.configure(format!("ws://127.0.0.1:{port}/"));
    link.open();
    next_matching(&mut events, is_open).await;

    let surface = ControlSurfaceState::default()
        .with_gear(Gear::Third)
        .with_throttle(42);
    link.send(Command::Throttle(surface.throttle), surface);

    let forward = decode(&next_matching(&mut frames_rx, |_| true).await).unwrap();
    let backward = decode(&next_matching(&mut frames_rx, |_| true).await).unwrap();

    assert_eq!(forward.message, ControlMessage::ThrottleForward(42));
    assert_eq!(backward.message, ControlMessage::ThrottleBackward(0));
    assert_eq!(forward.settings.unwrap().gear, Gear::Third);

    link.shutdown().await;
}

#[tokio::test]
async fn test_vehicle_records_reach_observer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text("garbage".into())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"honk","value":true}"#.into()))
            .await
            .unwrap();
        while ws.next().await.is_some() {}
    });

    let link = ControlLink::spawn(fast_config());
    let (tx, mut messages) = mpsc::unbounded_channel::<Decoded>();
    link.on_message(move |decoded| {
        let _ = tx.send(decoded.clone());
    });
    link.configure(format!("127.0.0.1:{port}"));
    link.open();

    let decoded = next_matching(&mut messages, |_| true).await;
    assert_eq!(decoded.message, ControlMessage::Honk(true));
    assert_eq!(link.state(), LinkState::Open);

    link.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_vehicle_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut first = accept_async(stream).await.unwrap();
        first.close(None).await.unwrap();
        while first.next().await.is_some() {}

        let (stream, _) = listener.accept().await.unwrap();
        let mut second = accept_async(stream).await.unwrap();
        while second.next().await.is_some() {}
    });

    let link = ControlLink::spawn(fast_config());
    let mut events = watch(&link);
    link.configure(format!("127.0.0.1:{port}"));
    link.open();
    next_matching(&mut events, is_open).await;

    let error = next_matching(&mut events, |e| matches!(e, LinkEvent::Error(_))).await;
    assert!(matches!(error, LinkEvent::Error(LinkError::ClosedByPeer { .. })));

    let scheduled =
        next_matching(&mut events, |e| matches!(e, LinkEvent::ReconnectScheduled { .. })).await;
    assert_eq!(
        scheduled,
        LinkEvent::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_millis(50)
        }
    );

    let reopened = next_matching(&mut events, is_open).await;
    assert_eq!(
        reopened,
        LinkEvent::StateChanged {
            state: LinkState::Open,
            attempt: 0
        }
    );

    link.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_vehicle_exhausts_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let link = ControlLink::spawn(fast_config());
    let mut events = watch(&link);
    link.configure(format!("127.0.0.1:{port}"));
    link.open();

    let error = next_matching(&mut events, |e| matches!(e, LinkEvent::Error(_))).await;
    assert!(matches!(
        error,
        LinkEvent::Error(LinkError::TransportUnreachable(_))
    ));

    let mut reconnects = 0;
    next_matching(&mut events, |e| {
        if matches!(e, LinkEvent::ReconnectScheduled { .. }) {
            reconnects += 1;
        }
        matches!(e, LinkEvent::StateChanged { state, .. } if state.is_exhausted())
    })
    .await;
    // Three connection attempts in total: the first plus two reconnects
    assert_eq!(reconnects, 2);

    let exhausted = next_matching(&mut events, |e| matches!(e, LinkEvent::Error(_))).await;
    assert_eq!(
        exhausted,
        LinkEvent::Error(LinkError::ExhaustedRetries { attempts: 3 })
    );

    link.shutdown().await;
}
