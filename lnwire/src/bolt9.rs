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

use std::fmt::{self, Display, Formatter};
use std::io;
use std::str::FromStr;

use amplify::flags::FlagVec;
use lightning_encoding::{LightningDecode, LightningEncode};
use strict_encoding::{StrictDecode, StrictEncode};

/// Feature-flags-related errors
#[derive(
    Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash, Debug, Display, Error
)]
#[display(doc_comments)]
pub enum Error {
    /// unknown even feature flag with number {0}
    UnknownEvenFeature(u16),

    /// feature flag number {bit} exceeds the allowed maximum {ceiling}
    FeatureBitExceedsCeiling { bit: u16, ceiling: u16 },
}

/// Specific named feature flags as assigned by BOLT-9.
///
/// Flags are numbered from the least-significant bit, at bit 0 (i.e. 0x1, an
/// even bit). They are generally assigned in pairs so that features can be
/// introduced as optional (odd bits) and later upgraded to be compulsory
/// (even bits), which will be refused by outdated nodes.
///
/// # Specification
/// <https://github.com/lightning/bolts/blob/master/09-features.md>
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[non_exhaustive]
#[repr(u16)]
pub enum Feature {
    /// Requires or supports extra `channel_reestablish` fields
    #[display("option_data_loss_protect", alt = "0/1")]
    OptionDataLossProtect = 0,

    /// Sending node needs a complete routing information dump
    #[display("initial_routing_sync", alt = "3")]
    InitialRoutingSync = 2,

    /// Commits to a shutdown scriptpubkey when opening channel
    #[display("option_upfront_shutdown_script", alt = "4/5")]
    OptionUpfrontShutdownScript = 4,

    /// More sophisticated gossip control
    #[display("gossip_queries", alt = "6/7")]
    GossipQueries = 6,

    /// Requires/supports variable-length routing onion payloads
    #[display("var_onion_optin", alt = "8/9")]
    VarOnionOptin = 8,

    /// Gossip queries can include additional information
    #[display("gossip_queries_ex", alt = "10/11")]
    GossipQueriesEx = 10,

    /// Static key for remote output
    #[display("option_static_remotekey", alt = "12/13")]
    OptionStaticRemotekey = 12,

    /// Node supports `payment_secret` field
    #[display("payment_secret", alt = "14/15")]
    PaymentSecret = 14,

    /// Node can receive basic multi-part payments
    #[display("basic_mpp", alt = "16/17")]
    BasicMpp = 16,

    /// Can create large channels
    #[display("option_support_large_channel", alt = "18/19")]
    OptionSupportLargeChannel = 18,

    /// Anchor outputs
    #[display("option_anchor_outputs", alt = "20/21")]
    OptionAnchorOutputs = 20,

    /// Anchor commitment type with zero fee HTLC transactions
    #[display("option_anchors_zero_fee_htlc_tx", alt = "22/23")]
    OptionAnchorZeroFeeHtlcTx = 22,

    /// Future segwit versions allowed in shutdown
    #[display("option_shutdown_anysegwit", alt = "26/27")]
    OptionShutdownAnySegwit = 26,

    /// Node supports the channel_type field in open/accept
    #[display("option_channel_type", alt = "44/45")]
    OptionChannelType = 44,

    /// Supply channel aliases for routing
    #[display("option_scid_alias", alt = "46/47")]
    OptionScidAlias = 46,

    /// Payment metadata in tlv record
    #[display("option_payment_metadata", alt = "48/49")]
    OptionPaymentMetadata = 48,

    /// Understands zeroconf channel types
    #[display("option_zeroconf", alt = "50/51")]
    OptionZeroConf = 50,
    // NB: When adding new feature INCLUDE it into Feature::all
}

impl Feature {
    pub fn all() -> &'static [Feature] {
        &[
            Feature::OptionDataLossProtect,
            Feature::InitialRoutingSync,
            Feature::OptionUpfrontShutdownScript,
            Feature::GossipQueries,
            Feature::VarOnionOptin,
            Feature::GossipQueriesEx,
            Feature::OptionStaticRemotekey,
            Feature::PaymentSecret,
            Feature::BasicMpp,
            Feature::OptionSupportLargeChannel,
            Feature::OptionAnchorOutputs,
            Feature::OptionAnchorZeroFeeHtlcTx,
            Feature::OptionShutdownAnySegwit,
            Feature::OptionChannelType,
            Feature::OptionScidAlias,
            Feature::OptionPaymentMetadata,
            Feature::OptionZeroConf,
        ]
    }

    /// Returns number of bit that is set by the flag
    ///
    /// # Arguments
    /// `required`: which type of flag bit should be returned:
    /// - `true` for even (mandatory) bit variant
    /// - `false` for odd (optional) bit variant
    ///
    /// # Returns
    /// Bit number in the feature vector if the feature is allowed for the
    /// provided `required` condition; `None` otherwise.
    pub fn bit(self, required: bool) -> Option<u16> {
        // `initial_routing_sync` exists only as the odd bit 3
        if self == Feature::InitialRoutingSync && required {
            return None;
        }
        Some(self as u16 + !required as u16)
    }

    /// Resolves a bit number (either of the pair) into a named feature
    pub fn from_bit(bit: u16) -> Option<Feature> {
        let even = bit & !1;
        Feature::all().iter().copied().find(|f| *f as u16 == even)
    }
}

/// Error reporting unrecognized feature name
#[derive(
    Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error, From
)]
#[display("the provided feature name is not known: {0}")]
pub struct UnknownFeatureError(pub String);

impl FromStr for Feature {
    type Err = UnknownFeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::all()
            .iter()
            .copied()
            .find(|f| f.to_string() == s)
            .ok_or_else(|| UnknownFeatureError(s.to_owned()))
    }
}

/// Feature vector: a set of feature bits used in `init` messages, channel
/// announcements and BOLT-11 invoices.
///
/// Unlike a named-field representation this keeps the exact bit pattern,
/// including bits unknown to the current implementation, so that messages
/// and invoices round-trip without loss.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct Features(FlagVec);

impl Features {
    /// Constructs empty feature vector
    #[inline]
    pub fn new() -> Features {
        Features(FlagVec::new())
    }

    /// Sets a named feature in its mandatory (even) or optional (odd)
    /// position. Returns `false` if the feature does not have the requested
    /// bit (the only such case is `initial_routing_sync`).
    pub fn set(&mut self, feature: Feature, required: bool) -> bool {
        match feature.bit(required) {
            Some(bit) => {
                self.0.set(bit);
                true
            }
            None => false,
        }
    }

    /// Sets a raw feature bit
    #[inline]
    pub fn set_bit(&mut self, bit: u16) {
        self.0.set(bit);
    }

    /// Detects whether a raw bit is set
    #[inline]
    pub fn is_bit_set(&self, bit: u16) -> bool {
        self.0.is_set(bit)
    }

    /// Detects whether the feature is present in its mandatory form
    #[inline]
    pub fn requires(&self, feature: Feature) -> bool {
        feature
            .bit(true)
            .map(|bit| self.0.is_set(bit))
            .unwrap_or_default()
    }

    /// Detects whether the feature is present in either form
    #[inline]
    pub fn supports(&self, feature: Feature) -> bool {
        self.requires(feature)
            || feature
                .bit(false)
                .map(|bit| self.0.is_set(bit))
                .unwrap_or_default()
    }

    /// Iterates over all set bit numbers, lowest first
    #[inline]
    pub fn iter_bits(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter()
    }

    /// The highest set bit, if any
    #[inline]
    pub fn max_bit(&self) -> Option<u16> {
        Iterator::max(self.0.iter())
    }

    /// Detects an empty feature vector
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.iter().next().is_none()
    }

    /// Iterates over set bits which do not correspond to any known named
    /// feature
    pub fn unknown_bits(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().filter(|bit| Feature::from_bit(*bit).is_none())
    }

    /// The first unknown even (mandatory) bit, which renders the feature
    /// vector unsupportable by this implementation
    pub fn unknown_even(&self) -> Option<u16> {
        self.unknown_bits().find(|bit| bit % 2 == 0)
    }

    /// Fails on unknown even bits
    pub fn check_supported(&self) -> Result<(), Error> {
        if let Some(bit) = self.unknown_even() {
            return Err(Error::UnknownEvenFeature(bit));
        }
        Ok(())
    }

    /// Fails if any bit exceeds the provided ceiling (used at invoice
    /// construction time)
    pub fn check_ceiling(&self, ceiling: u16) -> Result<(), Error> {
        if let Some(bit) = self.max_bit() {
            if bit > ceiling {
                return Err(Error::FeatureBitExceedsCeiling { bit, ceiling });
            }
        }
        Ok(())
    }

    /// Converts into the underlying flag vector, minimally shrunk
    pub fn into_flags(self) -> FlagVec {
        self.0.shrunk()
    }
}

impl From<FlagVec> for Features {
    fn from(mut flags: FlagVec) -> Self {
        flags.shrink();
        Features(flags)
    }
}

impl From<Features> for FlagVec {
    fn from(features: Features) -> Self {
        features.into_flags()
    }
}

impl Display for Features {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for bit in self.0.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match Feature::from_bit(bit) {
                Some(feature) => {
                    Display::fmt(&feature, f)?;
                    if bit % 2 == 1 {
                        f.write_str("?")?;
                    }
                }
                None => write!(f, "unknown#{}", bit)?,
            }
        }
        Ok(())
    }
}

impl LightningEncode for Features {
    fn lightning_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, lightning_encoding::Error> {
        self.0.shrunk().lightning_encode(e)
    }
}

impl LightningDecode for Features {
    fn lightning_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, lightning_encoding::Error> {
        let flags = FlagVec::lightning_decode(d)?;
        Ok(Features::from(flags))
    }
}

impl StrictEncode for Features {
    fn strict_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, strict_encoding::Error> {
        self.0.shrunk().strict_encode(e)
    }
}

impl StrictDecode for Features {
    fn strict_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, strict_encoding::Error> {
        let flags = FlagVec::strict_decode(d)?;
        Ok(Features::from(flags))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn feature_pair_bits() {
        assert_eq!(Feature::PaymentSecret.bit(true), Some(14));
        assert_eq!(Feature::PaymentSecret.bit(false), Some(15));
        assert_eq!(Feature::InitialRoutingSync.bit(true), None);
        assert_eq!(Feature::InitialRoutingSync.bit(false), Some(3));
        assert_eq!(Feature::from_bit(14), Some(Feature::PaymentSecret));
        assert_eq!(Feature::from_bit(15), Some(Feature::PaymentSecret));
        assert_eq!(Feature::from_bit(200), None);
    }

    #[test]
    fn set_and_query() {
        let mut features = Features::new();
        assert!(features.is_empty());
        features.set(Feature::VarOnionOptin, true);
        features.set(Feature::PaymentSecret, true);
        assert!(features.requires(Feature::PaymentSecret));
        assert!(features.supports(Feature::PaymentSecret));
        assert!(!features.requires(Feature::BasicMpp));
        assert_eq!(features.max_bit(), Some(14));
        assert_eq!(features.iter_bits().collect::<Vec<_>>(), vec![8, 14]);
    }

    #[test]
    fn unknown_even_detection() {
        let mut features = Features::new();
        features.set_bit(101);
        assert_eq!(features.unknown_even(), None);
        assert!(features.check_supported().is_ok());
        features.set_bit(100);
        assert_eq!(features.unknown_even(), Some(100));
        assert_eq!(
            features.check_supported(),
            Err(Error::UnknownEvenFeature(100))
        );
    }

    #[test]
    fn ceiling() {
        let mut features = Features::new();
        features.set(Feature::PaymentSecret, true);
        assert!(features.check_ceiling(127).is_ok());
        assert!(features.check_ceiling(14).is_ok());
        assert_eq!(
            features.check_ceiling(13),
            Err(Error::FeatureBitExceedsCeiling {
                bit: 14,
                ceiling: 13
            })
        );
    }

    #[test]
    fn display() {
        let mut features = Features::new();
        features.set(Feature::VarOnionOptin, true);
        features.set(Feature::PaymentSecret, false);
        features.set_bit(99);
        assert_eq!(
            features.to_string(),
            "var_onion_optin, payment_secret?, unknown#99"
        );
    }
}
