//! Packets the relay itself depends on. They always take the first tags so
//! application packets start at [`FIRST_APPLICATION_TAG`].

mod entity_handshake;

pub use entity_handshake::{EntityHandshakeRequest, EntityHandshakeResponse};

use crate::error::RegistryError;
use crate::packet::ThreadAffinity;
use crate::registry::RegistryBuilder;

pub const FIRST_APPLICATION_TAG: u8 = 2;

pub(crate) fn register_builtin(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder.register_at::<EntityHandshakeRequest>(0, ThreadAffinity::MainThread)?;
    builder.register_at::<EntityHandshakeResponse>(1, ThreadAffinity::MainThread)?;
    Ok(())
}
