//! Common test harness utilities for integration tests.
//!
//! Builds a full runtime over the in-memory store and the recording
//! transport, and drives it through gateway frames the way a transport
//! front-end would.

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use courier::config::Config;
use courier::protocol::{ClientFrame, CommandEnvelope, ResultEnvelope, ServerFrame};
use courier::runtime::Runtime;
use courier::store::MemoryStore;
use courier::time::SystemClock;
use courier::transport::RecordingTransport;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Harness {
    pub runtime: Runtime<SystemClock>,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<RecordingTransport>,
}

/// One client socket bound to a session.
pub struct Client {
    pub session_id: String,
    pub sender: String,
    pub tx: mpsc::Sender<ServerFrame>,
    pub rx: mpsc::Receiver<ServerFrame>,
}

pub fn harness() -> Harness {
    harness_with(Config {
        domain: "example.org".to_string(),
        ..Default::default()
    })
}

pub fn harness_with(config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let runtime = Runtime::new(
        config,
        store.clone(),
        transport.clone(),
        SystemClock,
        None,
    )
    .expect("runtime construction");
    runtime.init().expect("cache warm");
    Harness {
        runtime,
        store,
        transport,
    }
}

/// Establish a session for `principal` (full form, e.g.
/// `alice@example.org/mobile`) and swallow the connect frames.
pub async fn connect(harness: &Harness, principal: &str) -> Client {
    let (tx, mut rx) = mpsc::channel(64);
    let session_id = harness
        .runtime
        .handle_frame(
            None,
            ClientFrame::HConnect {
                principal: principal.to_string(),
                credential: "secret".to_string(),
            },
            &tx,
        )
        .await
        .expect("session established");
    drain(&mut rx);
    let sender = principal
        .split_once('/')
        .map_or(principal, |(bare, _)| bare)
        .to_string();
    Client {
        session_id,
        sender,
        tx,
        rx,
    }
}

/// Submit one command on the client's session and return its result
/// envelope from the client's socket.
pub async fn command(
    harness: &Harness,
    client: &mut Client,
    cmd: &str,
    params: Value,
) -> ResultEnvelope {
    let envelope = CommandEnvelope::new(cmd)
        .with_sender(&client.sender)
        .with_params(params);
    harness
        .runtime
        .handle_frame(
            Some(&client.session_id),
            ClientFrame::Command { envelope },
            &client.tx,
        )
        .await;
    result_frame(&mut client.rx).expect("result frame delivered")
}

pub fn drain(rx: &mut mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

/// Last result envelope currently queued on a socket.
pub fn result_frame(rx: &mut mpsc::Receiver<ServerFrame>) -> Option<ResultEnvelope> {
    drain(rx).into_iter().rev().find_map(|frame| match frame {
        ServerFrame::Result { envelope } => Some(envelope),
        _ => None,
    })
}
