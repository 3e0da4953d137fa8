//! Wire-level pieces of the Debug Adapter Protocol: framing, envelopes and typed bodies.

pub mod codec;
pub mod messages;
pub mod requests;
pub mod types;

/// Upper bound for an incoming `Content-Length`, checked before the body buffer is allocated.
pub const MAX_DAP_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Upper bound for one header line, including its line terminator.
pub const MAX_DAP_HEADER_LINE_BYTES: usize = 8 * 1024;
