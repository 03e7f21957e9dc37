//! Parley client crate - the UI session model and its HTTP transport.
//!
//! `ChatSession` is a synchronous state machine a front end can drive
//! directly; the async helpers in [`session`] pair it with a
//! [`ChatTransport`].

pub mod error;
pub mod session;
pub mod transport;

pub use error::ClientError;
pub use session::{ChatSession, LocalConversation, LocalMessage, PendingSend, SendOutcome};
pub use transport::{ChatTransport, HttpChatClient, RemoteConversation, RemoteMessage, SendReply};
