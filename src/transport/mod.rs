//! Transport seam between the session engine and the network.
//!
//! The engine drives a `Transport` rather than a socket directly so the pump
//! can be tested against a stub that feeds scripted events.

pub mod rest;
pub mod ws;

use async_trait::async_trait;

use crate::protocol::{ClientEvent, ServerEvent};
use crate::Result;

#[async_trait]
pub trait Transport: Send {
    /// Serialize and send one client frame.
    async fn send(&mut self, event: ClientEvent) -> Result<()>;

    /// Await the next inbound event. `Ok(None)` means the peer closed the
    /// connection cleanly. A frame that fails to parse is skipped, not
    /// returned as an error.
    async fn next_event(&mut self) -> Result<Option<ServerEvent>>;

    /// Close the connection. Best-effort; safe to call more than once.
    async fn close(&mut self);
}
