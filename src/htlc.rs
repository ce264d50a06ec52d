// LNP Channel Library implementing lightning network channel operation:
// per-channel state machines, commitment transactions and on-chain
// enforcement
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

use amplify::{DumbDefault, Slice32};
use bitcoin_scripts::hlc::{HashLock, HashPreimage};
use lnwire::bolt2::{OnionPacket, UpdateAddHtlc};

/// Base weight of the commitment transaction (BOLT-3)
pub const COMMITMENT_TX_BASE_WEIGHT: u64 = 724;

/// Additional commitment transaction weight per untrimmed HTLC output
/// (BOLT-3)
pub const COMMITMENT_TX_WEIGHT_PER_HTLC: u64 = 172;

/// Weight of the HTLC-timeout transaction claiming an expired offered HTLC
pub const HTLC_TIMEOUT_WEIGHT: u64 = 663;

/// Weight of the HTLC-success transaction claiming a received HTLC with a
/// known preimage
pub const HTLC_SUCCESS_WEIGHT: u64 = 703;

/// Maximal CLTV expiry accepted in an incoming HTLC; larger values are
/// block timestamps, not heights
pub const CLTV_EXPIRY_MAX: u32 = 500_000_000;

/// HTLC direction from the viewpoint of one channel party
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum Direction {
    /// HTLC proposed by the local node, claimable by the remote one with a
    /// preimage
    #[display("offered")]
    Offered,

    /// HTLC proposed by the remote node, claimable by the local one with a
    /// preimage
    #[display("received")]
    Received,
}

impl Direction {
    #[inline]
    pub fn is_offered(self) -> bool {
        self == Direction::Offered
    }

    #[inline]
    pub fn is_received(self) -> bool {
        self == Direction::Received
    }

    /// The same HTLC as seen by the counterparty
    #[inline]
    pub fn swapped(self) -> Direction {
        match self {
            Direction::Offered => Direction::Received,
            Direction::Received => Direction::Offered,
        }
    }
}

/// In-flight HTLC whose preimage is not yet known
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct HtlcSecret {
    /// Value in millisatoshi
    pub amount_msat: u64,
    /// Hash whose preimage unlocks the contract
    pub hashlock: HashLock,
    /// Id assigned by the proposing side, monotone per side
    pub id: u64,
    /// Block height after which the offerer reclaims the funds
    pub cltv_expiry: u32,
    /// Routing instructions for the next hop, opaque at the channel level
    pub onion: OnionPacket,
}

impl HtlcSecret {
    /// Extracts the HTLC information from the wire message which carried it
    pub fn with(update_add_htlc: &UpdateAddHtlc) -> HtlcSecret {
        HtlcSecret {
            amount_msat: update_add_htlc.amount_msat,
            hashlock: update_add_htlc.payment_hash,
            id: update_add_htlc.htlc_id,
            cltv_expiry: update_add_htlc.cltv_expiry,
            onion: update_add_htlc.onion_routing_packet.clone(),
        }
    }
}

impl DumbDefault for HtlcSecret {
    fn dumb_default() -> Self {
        HtlcSecret {
            amount_msat: 0,
            hashlock: HashLock::from(Slice32::default()),
            id: 0,
            cltv_expiry: 0,
            onion: OnionPacket::dumb_default(),
        }
    }
}

/// Resolved HTLC with a known preimage
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct HtlcKnown {
    pub amount_msat: u64,
    pub preimage: HashPreimage,
    pub id: u64,
    pub cltv_expiry: u32,
    pub direction: Direction,
}

/// Fee paid by an output claiming transaction of the given weight at the
/// given commitment feerate
#[inline]
pub fn weight_to_fee(weight: u64, feerate_per_kw: u32) -> u64 {
    weight * feerate_per_kw as u64 / 1000
}

/// Detects whether an HTLC output is trimmed from the commitment
/// transaction: the output value minus the fee of its second-stage claim
/// transaction must stay above the commitment holder's dust limit.
///
/// Trimmed HTLCs still participate in the balance bookkeeping; their value
/// is added to the commitment transaction fee.
pub fn is_trimmed(
    direction: Direction,
    amount_msat: u64,
    feerate_per_kw: u32,
    dust_limit_sat: u64,
) -> bool {
    let claim_weight = match direction {
        Direction::Offered => HTLC_TIMEOUT_WEIGHT,
        Direction::Received => HTLC_SUCCESS_WEIGHT,
    };
    let claim_fee = weight_to_fee(claim_weight, feerate_per_kw);
    amount_msat / 1000 < dust_limit_sat + claim_fee
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn direction_swap() {
        assert_eq!(Direction::Offered.swapped(), Direction::Received);
        assert_eq!(Direction::Received.swapped(), Direction::Offered);
        assert!(Direction::Offered.is_offered());
        assert!(Direction::Received.is_received());
    }

    #[test]
    fn trim_boundary() {
        let feerate = 1000u32;
        let dust = 546u64;
        // timeout claim fee at 1000 sat/kw is 663 sats
        let boundary_sat = dust + 663;
        assert!(is_trimmed(
            Direction::Offered,
            boundary_sat * 1000 - 1,
            feerate,
            dust
        ));
        assert!(!is_trimmed(
            Direction::Offered,
            boundary_sat * 1000,
            feerate,
            dust
        ));
        // success claim is heavier, so the received boundary is higher
        assert!(is_trimmed(
            Direction::Received,
            boundary_sat * 1000,
            feerate,
            dust
        ));
        assert!(!is_trimmed(
            Direction::Received,
            (dust + 703) * 1000,
            feerate,
            dust
        ));
    }

    #[test]
    fn zero_feerate_trims_only_dust() {
        assert!(is_trimmed(Direction::Offered, 545_999, 0, 546));
        assert!(!is_trimmed(Direction::Offered, 546_000, 0, 546));
    }
}
