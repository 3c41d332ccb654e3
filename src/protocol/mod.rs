//! Wire-facing protocol types.
//!
//! Everything a gateway or handler exchanges with the middleware:
//! - `principal` - bare/resourceful addressable identities
//! - `envelope` - command/result envelopes and the status taxonomy
//! - `message` - published messages and their headers
//! - `channel` - channel documents
//! - `gateway` - session front-end frames

pub mod channel;
pub mod envelope;
pub mod gateway;
pub mod message;
pub mod principal;

pub use channel::{Channel, HEADER_MAX_MSG_RETRIEVAL, HEADER_RELEVANCE_OFFSET};
pub use envelope::{CommandEnvelope, ExecError, ResultEnvelope, Status};
pub use gateway::{ClientFrame, ConnectionStatus, ServerFrame, SessionAttrs};
pub use message::{Header, Location, Message, TYPE_ALERT, TYPE_CONV_STATE};
pub use principal::{Principal, PrincipalError};
