//! MySQL client wire protocol, limited to what status polling needs

pub mod codec;
pub mod handshake;
pub mod packet;
pub mod resultset;

pub use codec::PacketCodec;
pub use handshake::{
    compute_auth_response, is_eof_packet, is_err_packet, is_ok_packet, ErrPacket,
    HandshakeResponse, InitialHandshake, NATIVE_PASSWORD_PLUGIN,
};
pub use packet::{capabilities, Packet};
pub use resultset::{read_lenenc_int, ResultSet, ResultSetError};
