// LNP wire library implementing lightning network peer protocol messages
// (BOLT-1, 2, 9) and payment invoices (BOLT-11)
//
// Written in 2020-2024 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::io::{Read, Write};

use amplify::Slice32;
use internet2::tlv;
use lightning_encoding::{LightningDecode, LightningEncode};

use crate::bolt9::Features;
use crate::ChannelId;

/// List of chain genesis hashes for parsing as a TLV field type 1 inside
/// [`Init`] message
#[derive(Wrapper, Clone, Eq, PartialEq, Default, Debug, From)]
#[derive(NetworkEncode, NetworkDecode)]
pub struct ChainList(HashSet<Slice32>);

impl LightningEncode for ChainList {
    fn lightning_encode<E: Write>(
        &self,
        mut e: E,
    ) -> Result<usize, lightning_encoding::Error> {
        self.0.iter().try_fold(0usize, |len, chain| {
            Ok(len + chain.lightning_encode(&mut e)?)
        })
    }
}

impl LightningDecode for ChainList {
    fn lightning_decode<D: Read>(
        mut d: D,
    ) -> Result<Self, lightning_encoding::Error> {
        let mut vec = Vec::with_capacity(32);
        let len = d.read_to_end(&mut vec)?;
        if len % 32 != 0 {
            return Err(lightning_encoding::Error::DataIntegrityError(
                format!(
                    "init/networks length {} is not proportional to 32 bytes",
                    len
                ),
            ));
        }
        let chains = vec
            .chunks(32)
            .map(Slice32::from_slice)
            .collect::<Option<HashSet<Slice32>>>()
            .expect("chunks are always 32 bytes here");
        Ok(ChainList(chains))
    }
}

/// Once authentication is complete, the first message reveals the features
/// supported or required by this node, even if this is a reconnection.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/01-messaging.md#the-init-message>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[derive(NetworkEncode, NetworkDecode)]
#[network_encoding(use_tlv)]
#[lightning_encoding(use_tlv)]
#[display("init({global_features}, {local_features})")]
pub struct Init {
    pub global_features: Features,
    pub local_features: Features,

    /// Chains the node is interested in operating on
    #[lightning_encoding(tlv = 1)]
    #[network_encoding(tlv = 1)]
    pub networks: ChainList,

    #[lightning_encoding(unknown_tlvs)]
    #[network_encoding(unknown_tlvs)]
    pub unknown_tlvs: tlv::Stream,
}

/// In order to allow for the existence of long-lived TCP connections, at
/// times it may be required that both ends keep alive the TCP connection
/// at the application level. Such messages also allow obfuscation of
/// traffic patterns.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/01-messaging.md#the-ping-and-pong-messages>
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[derive(NetworkEncode, NetworkDecode)]
#[display("ping({pong_size})")]
pub struct Ping {
    pub pong_size: u16,
    pub ignored: Vec<u8>,
}

/// For simplicity of diagnosis, it's often useful to tell a peer that
/// something is incorrect.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/01-messaging.md#the-error-and-warning-messages>
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[derive(LightningEncode, LightningDecode)]
#[derive(NetworkEncode, NetworkDecode)]
pub struct Error {
    /// The channel is referred to by channel_id, unless channel_id is 0
    /// (i.e. all bytes are 0), in which case it refers to all channels.
    pub channel_id: ChannelId,

    /// Any specific error details, either as string or binary data
    pub data: Vec<u8>,
}

impl Error {
    /// Constructs an error message from a human-readable description
    pub fn with(channel_id: ChannelId, message: impl ToString) -> Error {
        Error {
            channel_id,
            data: message.to_string().into_bytes(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Error")?;
        if self.channel_id.is_wildcard() {
            f.write_str(" on all channels")?;
        } else {
            write!(f, " on channel {}", self.channel_id)?;
        }
        // NB: if data is not composed solely of printable ASCII characters
        // (byte values 32 through 126 inclusive) it must not be printed out
        // verbatim
        if self.data.iter().all(|b| (32..=126).contains(b)) {
            if let Ok(msg) = String::from_utf8(self.data.clone()) {
                write!(f, ": {}", msg)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;
    use lightning_encoding::LightningDecode;

    use super::*;
    use crate::Messages;

    #[test]
    fn init_roundtrip() {
        let init = Init {
            global_features: none!(),
            local_features: none!(),
            networks: none!(),
            unknown_tlvs: none!(),
        };
        let encoded = init.lightning_serialize().unwrap();
        assert_eq!(encoded, Vec::<u8>::from_hex("00000000").unwrap());
        assert_eq!(Init::lightning_deserialize(&encoded).unwrap(), init);
    }

    #[test]
    fn init_as_message() {
        let init_msg = Messages::Init(Init {
            global_features: none!(),
            local_features: none!(),
            networks: none!(),
            unknown_tlvs: none!(),
        });
        assert_eq!(
            init_msg.lightning_serialize().unwrap(),
            Vec::<u8>::from_hex("001000000000").unwrap()
        );
    }

    #[test]
    fn error_display_non_ascii() {
        let err = Error {
            channel_id: ChannelId::default(),
            data: vec![0x00, 0xff],
        };
        assert_eq!(err.to_string(), "Error on all channels");
        let err = Error::with(ChannelId::default(), "sig check failed");
        assert_eq!(err.to_string(), "Error on all channels: sig check failed");
    }
}
