//! Session persistence: WAV/JSON encoding and on-disk session management.

pub mod codec;
mod store;

pub use codec::CodecError;
pub use store::SessionStore;
