//! Wire layer of the stdio protocol.
//!
//! Everything that crosses the process boundary lives here:
//!
//! - **protocol**: message types (Envelope out; Response/Event in) and the
//!   fixed prefix markers
//! - **codec**: line framing plus prefix classification for the remote's
//!   stdout, and terminator handling for its stdin

pub mod codec;
pub mod protocol;
