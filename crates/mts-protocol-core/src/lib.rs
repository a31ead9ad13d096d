pub mod codec;
pub mod connection;
pub mod handshake;

pub use codec::*;
pub use connection::{Connection, ConnectionReader, ConnectionWriter};
pub use handshake::*;

/// Channel name the relay's payloads travel on.
pub const CHANNEL: &str = "mts:wrapper";

/// Version both peers must agree on before any relay traffic.
pub const PROTOCOL_VERSION: &str = "22.18.0";
