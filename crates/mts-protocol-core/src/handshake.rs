//! Channel hello exchanged once per connection, before any relay payload.
//!
//! The client opens with [`Hello`]; the server answers with [`HelloAck`] and
//! closes the connection if the channel or version differs from its own.

use crate::codec::*;
use bytes::BytesMut;
use mts_types::PlayerId;
use uuid::Uuid;

const MAX_NAME_LEN: usize = 64;
const MAX_REASON_LEN: usize = 256;

/// First frame sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub channel: String,
    pub version: String,
    pub player_name: String,
}

/// Server answer to a [`Hello`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelloAck {
    Accepted {
        player: PlayerId,
        /// Frames of at least this many bytes are compressed. Negative disables compression.
        compression_threshold: i32,
    },
    Rejected {
        reason: String,
    },
}

impl Hello {
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            channel: crate::CHANNEL.to_string(),
            version: crate::PROTOCOL_VERSION.to_string(),
            player_name: player_name.into(),
        }
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        write_string(&mut buf, &self.channel);
        write_string(&mut buf, &self.version);
        write_string(&mut buf, &self.player_name);
        buf
    }

    pub fn decode(buf: &mut BytesMut) -> CodecResult<Self> {
        Ok(Self {
            channel: read_string(buf, MAX_NAME_LEN)?,
            version: read_string(buf, MAX_NAME_LEN)?,
            player_name: read_string(buf, MAX_NAME_LEN)?,
        })
    }

    /// Check this hello against what the server speaks.
    /// Returns the rejection reason on mismatch.
    pub fn verify(&self, channel: &str, version: &str) -> Result<(), String> {
        if self.channel != channel {
            return Err(format!(
                "Unknown channel '{}', server uses '{}'",
                self.channel, channel
            ));
        }
        if self.version != version {
            return Err(format!(
                "Version mismatch: client {}, server {}",
                self.version, version
            ));
        }
        if self.player_name.is_empty() {
            return Err("Empty player name".to_string());
        }
        Ok(())
    }
}

impl HelloAck {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        match self {
            HelloAck::Accepted {
                player,
                compression_threshold,
            } => {
                write_bool(&mut buf, true);
                write_uuid(&mut buf, &player.0);
                write_varint(&mut buf, *compression_threshold);
            }
            HelloAck::Rejected { reason } => {
                write_bool(&mut buf, false);
                write_string(&mut buf, reason);
            }
        }
        buf
    }

    pub fn decode(buf: &mut BytesMut) -> CodecResult<Self> {
        if read_bool(buf)? {
            let uuid: Uuid = read_uuid(buf)?;
            Ok(HelloAck::Accepted {
                player: PlayerId::new(uuid),
                compression_threshold: read_varint(buf)?,
            })
        } else {
            Ok(HelloAck::Rejected {
                reason: read_string(buf, MAX_REASON_LEN)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_roundtrip_and_verify() {
        let hello = Hello::new("don_bruce");
        let mut buf = hello.encode();
        let decoded = Hello::decode(&mut buf).unwrap();
        assert_eq!(decoded, hello);
        assert!(decoded.verify(crate::CHANNEL, crate::PROTOCOL_VERSION).is_ok());
    }

    #[test]
    fn test_hello_version_mismatch() {
        let mut hello = Hello::new("player");
        hello.version = "21.0.0".into();
        let reason = hello
            .verify(crate::CHANNEL, crate::PROTOCOL_VERSION)
            .unwrap_err();
        assert!(reason.contains("21.0.0"));
    }

    #[test]
    fn test_ack_variants() {
        let player = PlayerId::offline("player");
        let accepted = HelloAck::Accepted {
            player,
            compression_threshold: 256,
        };
        assert_eq!(HelloAck::decode(&mut accepted.encode()).unwrap(), accepted);

        let rejected = HelloAck::Rejected {
            reason: "Server full".into(),
        };
        assert_eq!(HelloAck::decode(&mut rejected.encode()).unwrap(), rejected);
    }

    #[test]
    fn test_ack_bad_flag() {
        let mut buf = BytesMut::from(&[7u8][..]);
        assert!(HelloAck::decode(&mut buf).is_err());
    }
}
