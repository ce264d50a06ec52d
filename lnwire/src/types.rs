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

use std::io;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde_with::{As, DisplayFromStr};

use amplify::hex::{self, FromHex};
use amplify::{DumbDefault, Slice32, Wrapper};
use bitcoin::hashes::Hash;
use bitcoin::{OutPoint, Txid};
use strict_encoding::{StrictDecode, StrictEncode};

/// Lightning network channel id: 256-bit number representing funding txid
/// XOR'ed with 16-bit funding output number
#[cfg_attr(
    feature = "serde",
    serde_as,
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From,
    LightningEncode,
    LightningDecode,
    StrictEncode,
    StrictDecode,
)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct ChannelId(
    #[cfg_attr(feature = "serde", serde(with = "As::<DisplayFromStr>"))]
    Slice32,
);

impl FromHex for ChannelId {
    fn from_byte_iter<I>(iter: I) -> Result<Self, hex::Error>
    where
        I: Iterator<Item = Result<u8, hex::Error>>
            + ExactSizeIterator
            + DoubleEndedIterator,
    {
        Ok(Self(Slice32::from_byte_iter(iter)?))
    }
}

impl ChannelId {
    /// Computes final channel id out of the funding transaction outpoint,
    /// as defined in BOLT-2
    pub fn with(funding_txid: Txid, funding_vout: u16) -> Self {
        let mut slice = funding_txid.into_inner();
        let vout = funding_vout.to_be_bytes();
        slice[30] ^= vout[0];
        slice[31] ^= vout[1];
        ChannelId::from_inner(Slice32::from_inner(slice))
    }

    #[inline]
    pub fn from_outpoint(outpoint: OutPoint) -> Self {
        ChannelId::with(outpoint.txid, outpoint.vout as u16)
    }

    /// With some lightning messages (like `error`) a channel id consisting
    /// of all zeros has a special meaning of "applicable to all opened
    /// channels". This function detects this kind of [`ChannelId`]
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        self.to_inner().to_inner() == [0u8; 32]
    }

    #[inline]
    pub fn as_slice32(&self) -> Slice32 {
        self.to_inner()
    }
}

/// Lightning network temporary channel id, used during the initial part of
/// the channel negotiation before the funding transaction is constructed
#[cfg_attr(
    feature = "serde",
    serde_as,
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(
    Wrapper,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    From,
    LightningEncode,
    LightningDecode,
    StrictEncode,
    StrictDecode,
)]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct TempChannelId(
    #[cfg_attr(feature = "serde", serde(with = "As::<DisplayFromStr>"))]
    Slice32,
);

impl From<TempChannelId> for ChannelId {
    fn from(temp: TempChannelId) -> Self {
        Self(temp.into_inner())
    }
}

impl From<ChannelId> for TempChannelId {
    fn from(id: ChannelId) -> Self {
        Self(id.into_inner())
    }
}

impl FromHex for TempChannelId {
    fn from_byte_iter<I>(iter: I) -> Result<Self, hex::Error>
    where
        I: Iterator<Item = Result<u8, hex::Error>>
            + ExactSizeIterator
            + DoubleEndedIterator,
    {
        Ok(Self(Slice32::from_byte_iter(iter)?))
    }
}

impl TempChannelId {
    pub fn random() -> Self {
        TempChannelId::from_inner(Slice32::random())
    }
}

impl DumbDefault for TempChannelId {
    fn dumb_default() -> Self {
        Self(Default::default())
    }
}

/// Channel id covering the whole lifetime of a channel: temporary before the
/// funding transaction is constructed, and final after
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    From,
    StrictEncode,
    StrictDecode,
)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[display(inner)]
pub enum ActiveChannelId {
    /// Channel does not have a permanent id yet
    #[from]
    Temporary(TempChannelId),

    /// Channel has a funding outpoint and the final id derived from it
    #[from]
    Static(ChannelId),
}

impl ActiveChannelId {
    /// Generates new random temporary channel id
    #[inline]
    pub fn random() -> Self {
        ActiveChannelId::Temporary(TempChannelId::random())
    }

    /// Assigns the final channel id basing on the funding transaction
    /// outpoint
    #[inline]
    pub fn with(funding_txid: Txid, funding_vout: u16) -> Self {
        ActiveChannelId::Static(ChannelId::with(funding_txid, funding_vout))
    }

    /// Returns the underlying 32-byte entropy independently from the id
    /// stage
    #[inline]
    pub fn as_slice32(&self) -> Slice32 {
        match self {
            ActiveChannelId::Temporary(id) => id.to_inner(),
            ActiveChannelId::Static(id) => id.to_inner(),
        }
    }

    /// Returns [`ChannelId`], if the channel already has one
    #[inline]
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            ActiveChannelId::Temporary(_) => None,
            ActiveChannelId::Static(id) => Some(*id),
        }
    }

    /// Returns [`TempChannelId`], if the channel still operates with it
    #[inline]
    pub fn temp_channel_id(&self) -> Option<TempChannelId> {
        match self {
            ActiveChannelId::Temporary(id) => Some(*id),
            ActiveChannelId::Static(_) => None,
        }
    }
}

/// Lightning network short channel id, locating the funding output within
/// the blockchain, as per BOLT-7
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Display,
    Default,
    From,
    Getters,
)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[display("{block_height}x{tx_index}x{output_index}")]
pub struct ShortChannelId {
    #[getter(as_copy)]
    block_height: u32,
    #[getter(as_copy)]
    tx_index: u32,
    #[getter(as_copy)]
    output_index: u16,
}

impl ShortChannelId {
    /// Constructs short channel id, checking that block height and
    /// transaction index fit into 24 bits
    pub fn new(
        block_height: u32,
        tx_index: u32,
        output_index: u16,
    ) -> Option<Self> {
        if block_height >= 1 << 24 || tx_index >= 1 << 24 {
            return None;
        }
        Some(Self {
            block_height,
            tx_index,
            output_index,
        })
    }

    /// Converts to the single `u64` used on the wire and inside invoice
    /// routing hints
    pub fn into_u64(self) -> u64 {
        ((self.block_height as u64) << 40)
            | ((self.tx_index as u64) << 16)
            | self.output_index as u64
    }

    /// Reconstructs from the wire representation
    pub fn from_u64(value: u64) -> Self {
        ShortChannelId {
            block_height: (value >> 40) as u32 & 0x00FF_FFFF,
            tx_index: (value >> 16) as u32 & 0x00FF_FFFF,
            output_index: value as u16,
        }
    }
}

impl From<ShortChannelId> for u64 {
    fn from(scid: ShortChannelId) -> Self {
        scid.into_u64()
    }
}

#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error,
)]
#[display(doc_comments)]
pub enum ShortChannelIdParseError {
    /// wrong block height data
    WrongBlockHeight,
    /// wrong transaction index number
    WrongTxIndex,
    /// wrong output index number
    WrongOutputIndex,
    /// too many short channel id components; expected three (block height,
    /// tx index and output index)
    ExcessiveComponents,
}

impl FromStr for ShortChannelId {
    type Err = ShortChannelIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.split('x');
        match (split.next(), split.next(), split.next(), split.next()) {
            (Some(block_height), Some(tx_index), Some(output_index), None) => {
                Ok(ShortChannelId {
                    block_height: block_height.parse().map_err(|_| {
                        ShortChannelIdParseError::WrongBlockHeight
                    })?,
                    tx_index: tx_index
                        .parse()
                        .map_err(|_| ShortChannelIdParseError::WrongTxIndex)?,
                    output_index: output_index.parse().map_err(|_| {
                        ShortChannelIdParseError::WrongOutputIndex
                    })?,
                })
            }
            _ => Err(ShortChannelIdParseError::ExcessiveComponents),
        }
    }
}

impl StrictEncode for ShortChannelId {
    fn strict_encode<E: io::Write>(
        &self,
        mut e: E,
    ) -> Result<usize, strict_encoding::Error> {
        let value = self.into_u64();
        e.write_all(&value.to_be_bytes())?;
        Ok(8)
    }
}

impl StrictDecode for ShortChannelId {
    fn strict_decode<D: io::Read>(
        mut d: D,
    ) -> Result<Self, strict_encoding::Error> {
        let mut buf = [0u8; 8];
        d.read_exact(&mut buf)?;
        Ok(ShortChannelId::from_u64(u64::from_be_bytes(buf)))
    }
}

impl lightning_encoding::Strategy for ShortChannelId {
    type Strategy = lightning_encoding::strategies::AsStrict;
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn channel_id_from_outpoint() {
        let txid = Txid::from_str(
            "8984484a580b825b9972d7adb15050b3ab624ccd731946b3eeddb92f4e7ef6be",
        )
        .unwrap();
        let channel_id = ChannelId::with(txid, 0);
        // vout 0 does not change the txid bytes
        assert_eq!(&channel_id.as_slice32()[..], &txid.into_inner()[..]);

        let channel_id = ChannelId::with(txid, 1);
        let mut expected = txid.into_inner();
        expected[31] ^= 1;
        assert_eq!(&channel_id.as_slice32()[..], &expected[..]);
        assert!(!channel_id.is_wildcard());
        assert!(ChannelId::default().is_wildcard());
    }

    #[test]
    fn short_channel_id_u64() {
        let scid = ShortChannelId::new(501_000, 42, 1).unwrap();
        assert_eq!(scid, ShortChannelId::from_u64(scid.into_u64()));
        assert_eq!(scid.to_string(), "501000x42x1");
        assert_eq!(ShortChannelId::from_str("501000x42x1").unwrap(), scid);
        assert_eq!(ShortChannelId::new(1 << 24, 0, 0), None);
    }
}
