//! Transport-facing capability traits.
//!
//! # Responsibilities
//! - `RawInput`: what the pipeline may read from a protocol's request
//! - `RawOutput`: what the pipeline and sentinels may read or augment on a response
//!
//! # Design Decisions
//! - One implementation per protocol, living next to its foyer
//! - The pipeline only ever borrows the input (shared through `Arc`)
//! - `native_reference` lets protocol-aware sentinels downcast to the concrete type

use std::any::Any;

use crate::model::Scheme;

/// A request exactly as the transport delivered it.
pub trait RawInput: Send + Sync + 'static {
    /// The protocol this input arrived on.
    fn scheme(&self) -> Scheme;

    /// Opaque handle to the protocol-specific value, for downcasting.
    fn native_reference(&self) -> &dyn Any;

    /// Raw payload bytes.
    fn body(&self) -> &[u8];

    /// Who sent it (peer address, session id, publisher name).
    fn source(&self) -> &str;
}

/// A response ready to be written back by the foyer.
pub trait RawOutput: Send + 'static {
    fn content(&self) -> &[u8];

    /// Protocol-neutral status, expressed on the HTTP scale.
    fn status_code(&self) -> u16;

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code())
    }

    /// Attach metadata to the response. Protocols without headers ignore it.
    fn set_header(&mut self, _name: &str, _value: &str) {}

    /// Read back metadata previously attached, if the protocol keeps it.
    fn header(&self, _name: &str) -> Option<&str> {
        None
    }
}
