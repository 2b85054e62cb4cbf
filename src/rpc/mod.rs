//! Bidirectional JSON-RPC over a `Content-Length` framed byte stream.
//!
//! Either end of a connection can send requests and notifications; both ends
//! use the same pieces:
//!
//! - `codec`: [`ContentLengthCodec`](codec::ContentLengthCodec) framing for
//!   `FramedRead` / `FramedWrite`.
//! - `message`: the [`Message`](message::Message) model and its wire shape.
//! - `peer`: [`Peer`](peer::Peer), the outbound handle with the pending
//!   request table.
//! - `registry`: [`MethodRegistry`](registry::MethodRegistry), the typed
//!   request/notification handler tables.
//! - `router`: [`MessageRouter`](router::MessageRouter), the read loop that
//!   dispatches inbound messages.
//! - `writer`: the task that serialises outbound frames.

pub mod codec;
pub mod message;
pub mod peer;
pub mod registry;
pub mod router;
mod writer;

pub use message::{Message, RequestId};
pub use peer::{Outbound, Peer};
pub use registry::MethodRegistry;
pub use router::{ConnectionEnd, MessageRouter};
