//! One-shot signed document exchange over a [`crate::channel`] session.
//!
//! The sender signs the document, opens a mutually-authenticated session and
//! sends the document and the detached signature as two separate parts. The
//! receiver verifies the signature against the sender's published certificate
//! and answers with a status and a message.

pub mod receiver;
pub mod sender;
pub mod wire;

pub use receiver::{DocumentSink, FileSink, Receiver};
pub use sender::Sender;
pub use wire::{ExchangeRequest, ExchangeResponse, Part, PartLayout};
