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

//! Channel negotiation policy.
//!
//! Incoming `open_channel` and `accept_channel` proposals are screened in
//! two layers: hard protocol invariants which no implementation may break,
//! and node-local preferences (caps and floors) which merely make a peer
//! incompatible with this node. The extracted [`PeerParams`] are the only
//! negotiation data the commitment engine ever sees.

use std::ops::Range;

#[cfg(feature = "serde")]
use amplify::ToYamlString;
use lnwire::bolt2::{AcceptChannel, ChannelType, OpenChannel};

/// No commitment transaction may carry more HTLC outputs per direction
pub const PROTOCOL_MAX_HTLC_SLOTS: u16 = 483;

/// Smallest dust limit any commitment output is allowed to clear
pub const PROTOCOL_DUST_FLOOR: u64 = 354;

/// Reasons for refusing a channel proposal or a feerate change.
///
/// Naming convention: `got` is what the peer asked for, the second field
/// is the boundary it crashed into.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Display,
    Error,
    StrictEncode,
    StrictDecode
)]
#[display(doc_comments)]
pub enum PolicyError {
    /// peer wants our funds locked for {got} blocks after a unilateral
    /// close; this node tolerates at most {max}
    ToSelfDelayTooLong { got: u16, max: u16 },

    /// {0} concurrent HTLCs break the protocol ceiling of 483 per
    /// direction
    HtlcCountOverProtocolLimit(u16),

    /// commitment feerate of {got} sat/kw lies outside this node's
    /// corridor of {min}..{max} sat/kw
    FeerateOutOfCorridor { got: u32, min: u32, max: u32 },

    /// dust limit of {dust} sat overshoots the channel reserve of
    /// {reserve} sat, so the reserve itself could never appear as an
    /// output
    DustAboveReserve { dust: u64, reserve: u64 },

    /// dust limit of {0} sat sits below the 354 sat floor required of
    /// every commitment output
    DustBelowProtocolFloor(u64),

    /// channel of {got} sat is not worth its on-chain footprint; this
    /// node opens and accepts channels from {min} sat
    FundingTooLow { got: u64, min: u64 },

    /// peer refuses HTLCs under {got} msat; payments this node routes
    /// require acceptance from {max} msat down
    HtlcMinimumExcessive { got: u64, max: u64 },

    /// in-flight allowance of {got} msat would throttle the channel
    /// below the {min} msat this node requires to route
    InFlightAllowanceTooTight { got: u64, min: u64 },

    /// reserve demand of {got} sat overcollateralizes the channel; at
    /// most {max} sat is granted
    ReserveExcessive { got: u64, max: u64 },

    /// {got} HTLC slots are not enough; this node requires at least
    /// {min} to operate the channel
    HtlcSlotsTooFew { got: u16, min: u16 },

    /// dust limit of {got} sat would silently burn outputs this node
    /// considers spendable; the cap is {max} sat
    DustExcessive { got: u64, max: u64 },

    /// peer demands {got} confirmations before the channel opens; this
    /// node waits for at most {max}
    ConfirmationDepthExcessive { got: u32, max: u32 },

    /// peer reserve of {reserve} sat cannot host an output by our dust
    /// standard of {dust} sat, leaving our balance unenforceable
    ReserveBelowOurDust { reserve: u64, dust: u64 },

    /// our reserve of {reserve} sat cannot host an output by the peer
    /// dust standard of {dust} sat
    ReserveBelowTheirDust { reserve: u64, dust: u64 },

    /// `update_fee` to {got} sat/kw sinks below the mempool floor of
    /// {floor} sat/kw and would strand the commitment unconfirmed
    FeeUpdateUnderMempoolFloor { got: u32, floor: u32 },

    /// `update_fee` to {got} sat/kw trails the local estimate of
    /// {estimate} sat/kw beyond tolerance
    FeeUpdateLagsEstimate { got: u32, estimate: u32 },

    /// `update_fee` to {got} sat/kw overshoots the acceptance cap of
    /// {cap} sat/kw
    FeeUpdateOverCap { got: u32, cap: u32 },
}

/// Acceptance corridor for remote `update_fee` proposals relative to the
/// local feerate estimate, in percents.
///
/// Proposals under `ratio_low`% of the estimate risk an unconfirmable
/// commitment; proposals over `ratio_high`% siphon the funder balance
/// into fees. Everything in between is accepted even when it disagrees
/// with the local view.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Debug, StrictEncode, StrictDecode,
)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct FeerateTolerance {
    pub ratio_low: u32,
    pub ratio_high: u32,
}

impl Default for FeerateTolerance {
    fn default() -> Self {
        FeerateTolerance {
            ratio_low: 50,
            ratio_high: 1000,
        }
    }
}

/// Node-local screening rules for channel negotiation.
///
/// `Option` fields are preferences a node may choose not to enforce;
/// plain fields are always checked.
#[derive(Clone, Eq, PartialEq, Hash, Debug, StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Display, Serialize, Deserialize),
    serde(crate = "serde_crate"),
    display(Policy::to_yaml_string)
)]
pub struct Policy {
    /// Commitment feerates this node will co-sign at channel opening,
    /// sat/kw
    pub feerate_corridor: Range<u32>,

    /// Longest `to_self_delay` we let a peer impose on our unilateral
    /// exits, blocks
    pub to_self_delay_max: u16,

    /// Funding depth we demand before sending `funding_locked` on
    /// channels opened towards us
    pub minimum_depth: u32,

    /// Feerate under which the local mempool drops transactions;
    /// `update_fee` below it is refused outright
    pub mempool_feerate_floor: u32,

    /// Acceptance corridor for `update_fee` relative to the local
    /// estimate
    pub feerate_tolerance: FeerateTolerance,

    /// Blocks an unconfirmed channel opening may linger before it is
    /// abandoned
    pub funding_timeout_blocks: u32,

    /// Deepest confirmation demand we accept from a peer for channels we
    /// fund
    pub depth_demand_max: Option<u32>,

    /// Smallest channel worth opening or accepting, sat
    pub funding_floor_sat: Option<u64>,

    /// Cap on the `htlc_minimum_msat` a peer may demand of us
    pub htlc_minimum_cap_msat: Option<u64>,

    /// Floor for the in-flight HTLC value allowance a peer grants us
    pub in_flight_floor_msat: Option<u64>,

    /// Floor for the number of HTLC slots a peer grants us
    pub htlc_slots_floor: Option<u16>,

    /// Cap on the peer's reserve demand, absolute sat
    pub reserve_cap_sat: Option<u64>,

    /// Cap on the peer's reserve demand as a percentage of the funding
    pub reserve_cap_percent: Option<u8>,

    /// Cap on the dust limit a peer may declare
    pub dust_cap_sat: Option<u64>,
}

#[cfg(feature = "serde")]
impl ToYamlString for Policy {}

impl Default for Policy {
    fn default() -> Policy {
        Policy {
            // wide enough for fee spikes without co-signing absurdities
            feerate_corridor: 253..30_000,
            // two weeks of blocks
            to_self_delay_max: 2016,
            minimum_depth: 3,
            mempool_feerate_floor: 253,
            feerate_tolerance: FeerateTolerance::default(),
            // roughly one day
            funding_timeout_blocks: 144,
            depth_demand_max: Some(12),
            // channels under this are all closing-fee overhead
            funding_floor_sat: Some(25_000),
            htlc_minimum_cap_msat: Some(100_000),
            in_flight_floor_msat: Some(50_000),
            htlc_slots_floor: Some(6),
            reserve_cap_sat: None,
            reserve_cap_percent: Some(5),
            dust_cap_sat: Some(1_200),
        }
    }
}

/// `Some(cap)` when `value` breaks through it
fn exceeded<T: PartialOrd + Copy>(cap: Option<T>, value: T) -> Option<T> {
    cap.filter(|cap| value > *cap)
}

/// `Some(floor)` when `value` falls short of it
fn short_of<T: PartialOrd + Copy>(floor: Option<T>, value: T) -> Option<T> {
    floor.filter(|floor| value < *floor)
}

/// Each side's reserve must be able to host an output by the *other*
/// side's dust standard; a reserve below it would make that balance
/// unenforceable on chain.
fn cross_check_dust(
    ours: PeerParams,
    theirs: PeerParams,
) -> Result<(), PolicyError> {
    if theirs.reserve_sat < ours.dust_limit {
        return Err(PolicyError::ReserveBelowOurDust {
            reserve: theirs.reserve_sat,
            dust: ours.dust_limit,
        });
    }
    if ours.reserve_sat < theirs.dust_limit {
        return Err(PolicyError::ReserveBelowTheirDust {
            reserve: ours.reserve_sat,
            dust: theirs.dust_limit,
        });
    }
    Ok(())
}

impl Policy {
    /// Screens the per-peer requirements common to both negotiation
    /// directions: hard protocol invariants first, node preferences
    /// after, so a broken peer is reported as broken rather than merely
    /// incompatible.
    fn check_peer_bounds(
        &self,
        params: PeerParams,
    ) -> Result<(), PolicyError> {
        if params.dust_limit < PROTOCOL_DUST_FLOOR {
            return Err(PolicyError::DustBelowProtocolFloor(
                params.dust_limit,
            ));
        }
        if params.htlc_slots_max > PROTOCOL_MAX_HTLC_SLOTS {
            return Err(PolicyError::HtlcCountOverProtocolLimit(
                params.htlc_slots_max,
            ));
        }
        if params.reserve_sat < params.dust_limit {
            return Err(PolicyError::DustAboveReserve {
                dust: params.dust_limit,
                reserve: params.reserve_sat,
            });
        }

        if params.to_self_delay > self.to_self_delay_max {
            return Err(PolicyError::ToSelfDelayTooLong {
                got: params.to_self_delay,
                max: self.to_self_delay_max,
            });
        }
        if let Some(max) = exceeded(self.dust_cap_sat, params.dust_limit) {
            return Err(PolicyError::DustExcessive {
                got: params.dust_limit,
                max,
            });
        }
        if let Some(max) =
            exceeded(self.htlc_minimum_cap_msat, params.htlc_minimum_msat)
        {
            return Err(PolicyError::HtlcMinimumExcessive {
                got: params.htlc_minimum_msat,
                max,
            });
        }
        if let Some(max) = exceeded(self.reserve_cap_sat, params.reserve_sat)
        {
            return Err(PolicyError::ReserveExcessive {
                got: params.reserve_sat,
                max,
            });
        }
        if let Some(min) = short_of(
            self.in_flight_floor_msat,
            params.htlc_in_flight_max_msat,
        ) {
            return Err(PolicyError::InFlightAllowanceTooTight {
                got: params.htlc_in_flight_max_msat,
                min,
            });
        }
        if let Some(min) =
            short_of(self.htlc_slots_floor, params.htlc_slots_max)
        {
            return Err(PolicyError::HtlcSlotsTooFew {
                got: params.htlc_slots_max,
                min,
            });
        }
        Ok(())
    }

    /// Screens an inbound `open_channel` proposal.
    ///
    /// On success returns the peer requirements to build and sign
    /// commitment transactions against.
    pub fn validate_open_channel(
        &self,
        open_channel: &OpenChannel,
    ) -> Result<PeerParams, PolicyError> {
        let params = PeerParams::from(open_channel);
        self.check_peer_bounds(params)?;

        // message-level data only `open_channel` carries
        if !self
            .feerate_corridor
            .contains(&open_channel.feerate_per_kw)
        {
            return Err(PolicyError::FeerateOutOfCorridor {
                got: open_channel.feerate_per_kw,
                min: self.feerate_corridor.start,
                max: self.feerate_corridor.end,
            });
        }
        if let Some(min) =
            short_of(self.funding_floor_sat, open_channel.funding_satoshis)
        {
            return Err(PolicyError::FundingTooLow {
                got: open_channel.funding_satoshis,
                min,
            });
        }
        // the relative reserve cap only makes sense here, where the
        // funding amount is known
        if let Some(percent) = self.reserve_cap_percent {
            let max = open_channel.funding_satoshis * percent as u64 / 100;
            if params.reserve_sat > max {
                return Err(PolicyError::ReserveExcessive {
                    got: params.reserve_sat,
                    max,
                });
            }
        }
        Ok(params)
    }

    /// Screens the `accept_channel` reply to our own proposal.
    ///
    /// `our_params` are the requirements we stated in `open_channel`;
    /// they take part in the dust/reserve cross-check.
    pub fn validate_accept_channel(
        &self,
        our_params: PeerParams,
        accept_channel: &AcceptChannel,
    ) -> Result<PeerParams, PolicyError> {
        let their_params = PeerParams::from(accept_channel);
        self.check_peer_bounds(their_params)?;
        cross_check_dust(our_params, their_params)?;

        if let Some(max) =
            exceeded(self.depth_demand_max, accept_channel.minimum_depth)
        {
            return Err(PolicyError::ConfirmationDepthExcessive {
                got: accept_channel.minimum_depth,
                max,
            });
        }
        Ok(their_params)
    }

    /// Judges a received `update_fee` proposal against the local feerate
    /// estimate.
    ///
    /// Whether the funder can still afford its reserve at the new rate
    /// is a balance question answered by the commitment engine, not
    /// here.
    pub fn validate_update_fee(
        &self,
        proposed: u32,
        local_estimate: u32,
    ) -> Result<u32, PolicyError> {
        if proposed < self.mempool_feerate_floor {
            return Err(PolicyError::FeeUpdateUnderMempoolFloor {
                got: proposed,
                floor: self.mempool_feerate_floor,
            });
        }
        let lag_floor = local_estimate as u64
            * self.feerate_tolerance.ratio_low as u64
            / 100;
        if (proposed as u64) < lag_floor {
            return Err(PolicyError::FeeUpdateLagsEstimate {
                got: proposed,
                estimate: local_estimate,
            });
        }
        let cap = local_estimate as u64
            * self.feerate_tolerance.ratio_high as u64
            / 100;
        if proposed as u64 > cap {
            return Err(PolicyError::FeeUpdateOverCap {
                got: proposed,
                cap: cap.min(u32::MAX as u64) as u32,
            });
        }
        Ok(proposed)
    }
}

/// Parameters negotiated once at opening and shared by both commitment
/// transactions for the whole channel lifetime (the feerate, which does
/// change, lives in the commitment state).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Display, Serialize, Deserialize),
    serde(crate = "serde_crate"),
    display(CommonParams::to_yaml_string)
)]
pub struct CommonParams {
    /// Feerate the funder proposed for the initial commitments, sat/kw
    pub feerate_per_kw: u32,

    /// Funding depth after which the channel becomes operational
    pub minimum_depth: u32,

    /// Commitment flavour negotiated through the `channel_type` TLV
    pub channel_type: ChannelType,

    /// Whether the funder wants the channel gossiped to the network
    pub announce_channel: bool,
}

#[cfg(feature = "serde")]
impl ToYamlString for CommonParams {}

impl Default for CommonParams {
    fn default() -> Self {
        CommonParams {
            feerate_per_kw: 256,
            minimum_depth: 3,
            channel_type: ChannelType::default(),
            announce_channel: true,
        }
    }
}

impl CommonParams {
    /// Fixes the channel-wide parameters from an accepted `open_channel`
    /// and the acceptor's own depth demand
    #[inline]
    pub fn negotiated(
        open_channel: &OpenChannel,
        minimum_depth: u32,
    ) -> Self {
        CommonParams {
            feerate_per_kw: open_channel.feerate_per_kw,
            minimum_depth,
            channel_type: open_channel.channel_type.unwrap_or_default(),
            announce_channel: open_channel.should_announce_channel(),
        }
    }
}

/// Requirements one side imposes on the other, stated in `open_channel`
/// or `accept_channel` and enforced by every commitment the *demanding*
/// side signs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Display, Serialize, Deserialize),
    serde(crate = "serde_crate"),
    display(PeerParams::to_yaml_string)
)]
pub struct PeerParams {
    /// Outputs below this value are trimmed from the demanding side's
    /// commitment, sat
    pub dust_limit: u64,

    /// Balance the other side must keep unencumbered, sat
    pub reserve_sat: u64,

    /// Blocks the other side waits before claiming its own unilateral
    /// close
    pub to_self_delay: u16,

    /// Smallest HTLC the demanding side accepts, msat
    pub htlc_minimum_msat: u64,

    /// Total value the other side may lock in unresolved HTLCs, msat
    pub htlc_in_flight_max_msat: u64,

    /// Unresolved HTLCs the other side may keep open at once
    pub htlc_slots_max: u16,
}

#[cfg(feature = "serde")]
impl ToYamlString for PeerParams {}

impl Default for PeerParams {
    /// Requirements this node states towards its peers when no explicit
    /// configuration overrides them
    fn default() -> Self {
        PeerParams {
            dust_limit: PROTOCOL_DUST_FLOOR,
            reserve_sat: 10_000,
            to_self_delay: 144,
            htlc_minimum_msat: 1,
            htlc_in_flight_max_msat: 500_000_000,
            htlc_slots_max: 30,
        }
    }
}

impl From<&OpenChannel> for PeerParams {
    /// What the funder demands of us
    fn from(open_channel: &OpenChannel) -> Self {
        PeerParams {
            dust_limit: open_channel.dust_limit_satoshis,
            reserve_sat: open_channel.channel_reserve_satoshis,
            to_self_delay: open_channel.to_self_delay,
            htlc_minimum_msat: open_channel.htlc_minimum_msat,
            htlc_in_flight_max_msat: open_channel
                .max_htlc_value_in_flight_msat,
            htlc_slots_max: open_channel.max_accepted_htlcs,
        }
    }
}

impl From<&AcceptChannel> for PeerParams {
    /// What the acceptor demands of us
    fn from(accept_channel: &AcceptChannel) -> Self {
        PeerParams {
            dust_limit: accept_channel.dust_limit_satoshis,
            reserve_sat: accept_channel.channel_reserve_satoshis,
            to_self_delay: accept_channel.to_self_delay,
            htlc_minimum_msat: accept_channel.htlc_minimum_msat,
            htlc_in_flight_max_msat: accept_channel
                .max_htlc_value_in_flight_msat,
            htlc_slots_max: accept_channel.max_accepted_htlcs,
        }
    }
}

#[cfg(test)]
mod test {
    use amplify::DumbDefault;

    use super::*;

    /// A proposal passing every default-policy check, with values kept
    /// distinct from each other so mapping mistakes show up
    fn open_proposal() -> OpenChannel {
        let mut open_channel = OpenChannel::dumb_default();
        open_channel.funding_satoshis = 2_000_000;
        open_channel.feerate_per_kw = 2_500;
        open_channel.dust_limit_satoshis = 600;
        open_channel.channel_reserve_satoshis = 20_000;
        open_channel.to_self_delay = 720;
        open_channel.htlc_minimum_msat = 1_000;
        open_channel.max_htlc_value_in_flight_msat = 200_000_000;
        open_channel.max_accepted_htlcs = 100;
        open_channel
    }

    fn accept_reply() -> AcceptChannel {
        let mut accept_channel = AcceptChannel::dumb_default();
        accept_channel.minimum_depth = 6;
        accept_channel.dust_limit_satoshis = 500;
        accept_channel.channel_reserve_satoshis = 30_000;
        accept_channel.to_self_delay = 1_008;
        accept_channel.htlc_minimum_msat = 500;
        accept_channel.max_htlc_value_in_flight_msat = 100_000_000;
        accept_channel.max_accepted_htlcs = 50;
        accept_channel
    }

    #[test]
    fn sound_proposal_maps_into_peer_params() {
        let params = Policy::default()
            .validate_open_channel(&open_proposal())
            .unwrap();
        assert_eq!(params, PeerParams {
            dust_limit: 600,
            reserve_sat: 20_000,
            to_self_delay: 720,
            htlc_minimum_msat: 1_000,
            htlc_in_flight_max_msat: 200_000_000,
            htlc_slots_max: 100,
        });
    }

    #[test]
    fn open_channel_rejections() {
        let policy = Policy::default();
        let cases: Vec<(fn(&mut OpenChannel), PolicyError)> = vec![
            (
                |o| o.dust_limit_satoshis = PROTOCOL_DUST_FLOOR - 1,
                PolicyError::DustBelowProtocolFloor(353),
            ),
            (
                |o| o.max_accepted_htlcs = PROTOCOL_MAX_HTLC_SLOTS + 1,
                PolicyError::HtlcCountOverProtocolLimit(484),
            ),
            (
                |o| o.channel_reserve_satoshis = 400,
                PolicyError::DustAboveReserve {
                    dust: 600,
                    reserve: 400,
                },
            ),
            (
                |o| o.to_self_delay = 2_017,
                PolicyError::ToSelfDelayTooLong {
                    got: 2_017,
                    max: 2_016,
                },
            ),
            (
                |o| o.dust_limit_satoshis = 1_201,
                PolicyError::DustExcessive {
                    got: 1_201,
                    max: 1_200,
                },
            ),
            (
                |o| o.htlc_minimum_msat = 100_001,
                PolicyError::HtlcMinimumExcessive {
                    got: 100_001,
                    max: 100_000,
                },
            ),
            (
                |o| o.max_htlc_value_in_flight_msat = 49_999,
                PolicyError::InFlightAllowanceTooTight {
                    got: 49_999,
                    min: 50_000,
                },
            ),
            (
                |o| o.max_accepted_htlcs = 5,
                PolicyError::HtlcSlotsTooFew { got: 5, min: 6 },
            ),
            (
                |o| o.feerate_per_kw = 100,
                PolicyError::FeerateOutOfCorridor {
                    got: 100,
                    min: 253,
                    max: 30_000,
                },
            ),
            (
                |o| o.feerate_per_kw = 30_000,
                PolicyError::FeerateOutOfCorridor {
                    got: 30_000,
                    min: 253,
                    max: 30_000,
                },
            ),
            // the funding floor is reported before the relative reserve
            // cap, which would also fire on so small a channel
            (
                |o| o.funding_satoshis = 24_999,
                PolicyError::FundingTooLow {
                    got: 24_999,
                    min: 25_000,
                },
            ),
        ];
        for (mutate, want) in cases {
            let mut open_channel = open_proposal();
            mutate(&mut open_channel);
            assert_eq!(
                policy.validate_open_channel(&open_channel).unwrap_err(),
                want
            );
        }
    }

    #[test]
    fn reserve_cap_scales_with_funding() {
        let policy = Policy::default();
        // 5% of 2M sat
        let mut open_channel = open_proposal();
        open_channel.channel_reserve_satoshis = 100_000;
        assert!(policy.validate_open_channel(&open_channel).is_ok());

        open_channel.channel_reserve_satoshis = 100_001;
        assert_eq!(
            policy.validate_open_channel(&open_channel).unwrap_err(),
            PolicyError::ReserveExcessive {
                got: 100_001,
                max: 100_000,
            }
        );

        // an absolute cap fires already at the bounds level
        let mut policy = policy;
        policy.reserve_cap_sat = Some(15_000);
        assert_eq!(
            policy.validate_open_channel(&open_proposal()).unwrap_err(),
            PolicyError::ReserveExcessive {
                got: 20_000,
                max: 15_000,
            }
        );
    }

    #[test]
    fn accept_channel_cross_checks_go_both_ways() {
        let policy = Policy::default();
        let our_params =
            policy.validate_open_channel(&open_proposal()).unwrap();

        assert!(policy
            .validate_accept_channel(our_params, &accept_reply())
            .is_ok());

        // their reserve cannot host an output by our 600 sat standard
        let mut accept_channel = accept_reply();
        accept_channel.channel_reserve_satoshis = 599;
        accept_channel.dust_limit_satoshis = 400;
        assert_eq!(
            policy
                .validate_accept_channel(our_params, &accept_channel)
                .unwrap_err(),
            PolicyError::ReserveBelowOurDust {
                reserve: 599,
                dust: 600,
            }
        );

        // our reserve cannot host an output by their standard
        let mut lean_ours = our_params;
        lean_ours.reserve_sat = 450;
        assert_eq!(
            policy
                .validate_accept_channel(lean_ours, &accept_reply())
                .unwrap_err(),
            PolicyError::ReserveBelowTheirDust {
                reserve: 450,
                dust: 500,
            }
        );
    }

    #[test]
    fn excessive_depth_demand_is_refused() {
        let policy = Policy::default();
        let our_params =
            policy.validate_open_channel(&open_proposal()).unwrap();
        let mut accept_channel = accept_reply();
        accept_channel.minimum_depth = 13;
        assert_eq!(
            policy
                .validate_accept_channel(our_params, &accept_channel)
                .unwrap_err(),
            PolicyError::ConfirmationDepthExcessive { got: 13, max: 12 }
        );
    }

    #[test]
    fn broken_peer_reported_before_incompatible_one() {
        // a proposal breaking a protocol invariant *and* a node
        // preference is reported for the invariant
        let mut open_channel = open_proposal();
        open_channel.dust_limit_satoshis = 100;
        open_channel.to_self_delay = 5_000;
        assert_eq!(
            Policy::default()
                .validate_open_channel(&open_channel)
                .unwrap_err(),
            PolicyError::DustBelowProtocolFloor(100)
        );
    }

    #[test]
    fn fee_update_corridor() {
        let policy = Policy::default();
        assert_eq!(
            policy.validate_update_fee(200, 1_000),
            Err(PolicyError::FeeUpdateUnderMempoolFloor {
                got: 200,
                floor: 253,
            })
        );
        assert_eq!(
            policy.validate_update_fee(400, 1_000),
            Err(PolicyError::FeeUpdateLagsEstimate {
                got: 400,
                estimate: 1_000,
            })
        );
        // over-estimates pass until the cap
        assert_eq!(policy.validate_update_fee(5_000, 1_000), Ok(5_000));
        assert_eq!(
            policy.validate_update_fee(10_001, 1_000),
            Err(PolicyError::FeeUpdateOverCap {
                got: 10_001,
                cap: 10_000,
            })
        );
        assert_eq!(policy.validate_update_fee(1_000, 1_000), Ok(1_000));
    }
}
