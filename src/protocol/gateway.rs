use serde::{Deserialize, Serialize};

use super::envelope::{CommandEnvelope, ResultEnvelope, Status};
use super::message::Message;

/// Session lifecycle as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reattached,
    Disconnecting,
    Disconnected,
    Error,
}

/// Session attributes handed to the socket currently bound to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAttrs {
    pub session_id: String,
    pub principal: String,
    pub rid: u64,
}

/// Frames a transport gateway submits on behalf of a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Initial connect with credential material (verified by the gateway).
    HConnect {
        principal: String,
        credential: String,
    },
    /// Rebind an existing session to this socket.
    Attach {
        session_id: String,
        rid: u64,
        principal: String,
    },
    /// Command submission on an established session.
    Command { envelope: CommandEnvelope },
    Disconnect,
}

/// Frames emitted to the transport socket currently bound to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    Status {
        state: ConnectionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Status>,
    },
    Attrs { attrs: SessionAttrs },
    Result { envelope: ResultEnvelope },
    /// Live message delivery to a subscriber.
    Event { message: Message },
    /// Instruction to an old socket displaced by reattachment.
    Close,
}
