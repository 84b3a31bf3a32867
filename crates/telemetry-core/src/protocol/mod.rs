//! Protocol module containing frame types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_frame, encode_frame, encode_message, read_frame, write_frame, DecodeError,
    ProtocolError, DEFAULT_READ_DEADLINE,
};
pub use messages::*;
