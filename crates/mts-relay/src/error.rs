use mts_protocol_core::CodecError;
use mts_types::PlayerId;
use thiserror::Error;

/// Registration failures. All of them abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Packet tag {tag} already registered to {existing}, cannot register {new}")]
    DuplicateTag {
        tag: u8,
        existing: &'static str,
        new: &'static str,
    },
    #[error("Packet type {name} already registered under tag {tag}")]
    DuplicateType { name: &'static str, tag: u8 },
    #[error("No packet tags left for {0}")]
    TagSpaceExhausted(&'static str),
}

/// Per-message decode failures. The message is dropped, the connection lives on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Packet relay not initialized")]
    NotInitialized,
    #[error("Empty payload, no packet tag")]
    Empty,
    #[error("No packet registered for tag {tag}. Registered tags: {registered:?}")]
    UnknownTag { tag: u8, registered: Vec<u8> },
    #[error("Malformed {name} (tag {tag}): {source}")]
    Malformed {
        tag: u8,
        name: &'static str,
        #[source]
        source: CodecError,
    },
}

/// Host transport failures. Never retried at this layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Cannot send {0} from this side")]
    WrongSide(&'static str),
    #[error("Player {0} is not connected")]
    UnknownPlayer(PlayerId),
    #[error("Connection closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Packet relay not initialized")]
    NotInitialized,
    #[error("Packet type {0} is not registered")]
    Unregistered(&'static str),
    #[error("Cannot encode {name}: {source}")]
    Encode {
        name: &'static str,
        #[source]
        source: CodecError,
    },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
