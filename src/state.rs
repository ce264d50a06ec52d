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

//! Per-stage channel state records.
//!
//! The state machine data is a tagged union with one record per lifecycle
//! stage; transitions construct the next variant from the previous one.
//! Every record is strict-encodable and is what the channels database
//! stores; serialization writes HTLC origins in their cold form, so a
//! read-after-write round trip observes the [`ChannelState::freeze`]d
//! value.

use std::io;

use amplify::Slice32;
use bitcoin::Txid;
use bitcoin_scripts::PubkeyScript;
use lnwire::{ActiveChannelId, ChannelId, ShortChannelId, TempChannelId};
use secp256k1::PublicKey;
use strict_encoding::{StrictDecode, StrictEncode};

use crate::close::{ClosingNegotiation, OnChainClose};
use crate::commitments::Commitments;
use crate::funding::Funding;
use crate::keyset::{LocalKeyset, RemoteKeyset};
use crate::policy::{CommonParams, PeerParams, Policy};

/// Configuration fixed before any peer message is exchanged
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct PreopenData {
    pub active_channel_id: ActiveChannelId,
    pub chain_hash: Slice32,
    pub policy: Policy,
    pub common_params: CommonParams,
    pub local_params: PeerParams,
    pub local_keys: LocalKeyset,
}

/// Negotiated parameters available once `open_channel`/`accept_channel`
/// have been exchanged but before the funding transaction exists
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct NegotiatedData {
    pub preopen: PreopenData,
    pub remote_params: PeerParams,
    pub remote_keys: RemoteKeyset,
    pub funding_satoshis: u64,
    pub push_msat: u64,
    pub minimum_depth: u32,
}

/// The full record of an operating channel
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct ChannelData {
    pub active_channel_id: ActiveChannelId,
    pub chain_hash: Slice32,
    pub policy: Policy,
    pub common_params: CommonParams,
    pub local_keys: LocalKeyset,
    pub remote_keys: RemoteKeyset,
    pub funding: Funding,
    pub commitments: Commitments,
    pub short_channel_id: Option<ShortChannelId>,
    pub minimum_depth: u32,
}

impl ChannelData {
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.active_channel_id.channel_id()
    }
}

/// Reestablish data received from a peer proven to be ahead of our state;
/// we wait for them to publish their newer commitment
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct RemoteAhead {
    pub next_commitment_number: u64,
    pub next_revocation_number: u64,
    pub their_current_point: PublicKey,
}

/// The channel state machine data: a tagged variant per lifecycle stage.
///
/// Exceptional shadow stages (`Offline` and
/// `WaitForRemotePublishFutureCommitment`) preserve the data of the stage
/// they interrupted.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
pub enum ChannelState {
    /// Waiting for the local `init` handshake to complete
    #[display("WAIT_FOR_INIT")]
    WaitForInit,

    /// Fundee waiting for `open_channel`
    #[display("WAIT_FOR_OPEN_CHANNEL")]
    WaitForOpenChannel { preopen: PreopenData },

    /// Funder sent `open_channel`, waiting for `accept_channel`
    #[display("WAIT_FOR_ACCEPT_CHANNEL")]
    WaitForAcceptChannel {
        preopen: PreopenData,
        funding_satoshis: u64,
        push_msat: u64,
    },

    /// Funder waiting for the wallet to construct the funding transaction
    #[display("WAIT_FOR_FUNDING_INTERNAL")]
    WaitForFundingInternal { negotiated: NegotiatedData },

    /// Fundee waiting for `funding_created`
    #[display("WAIT_FOR_FUNDING_CREATED")]
    WaitForFundingCreated { negotiated: NegotiatedData },

    /// Funder sent `funding_created`, waiting for `funding_signed`
    #[display("WAIT_FOR_FUNDING_SIGNED")]
    WaitForFundingSigned { data: ChannelData },

    /// Waiting for the funding transaction to reach its minimum depth
    #[display("WAIT_FOR_FUNDING_CONFIRMED")]
    WaitForFundingConfirmed {
        data: ChannelData,
        /// Whether the local node has broadcast the funding transaction
        /// (funder only); governs UTXO abandoning on timeout
        funding_broadcast: bool,
    },

    /// Funding is confirmed locally, waiting for the remote
    /// `funding_locked`
    #[display("WAIT_FOR_FUNDING_LOCKED")]
    WaitForFundingLocked { data: ChannelData },

    /// Channel is operational
    #[display("NORMAL")]
    Normal {
        data: ChannelData,
        /// Set once a local or remote `shutdown` was observed while HTLCs
        /// are still in flight
        local_shutdown: Option<PubkeyScript>,
        remote_shutdown: Option<PubkeyScript>,
    },

    /// `shutdown` exchanged; draining the remaining HTLCs before fee
    /// negotiation
    #[display("SHUTDOWN")]
    ShuttingDown {
        data: ChannelData,
        local_script: PubkeyScript,
        remote_script: PubkeyScript,
    },

    /// Negotiating the cooperative closing fee
    #[display("NEGOTIATING")]
    Negotiating {
        data: ChannelData,
        negotiation: ClosingNegotiation,
    },

    /// A closing transaction (cooperative or not) is on chain, waiting for
    /// its confirmation depth
    #[display("CLOSING")]
    Closing {
        data: ChannelData,
        close: OnChainClose,
    },

    /// Terminal state
    #[display("CLOSED")]
    Closed {
        channel_id: Option<ChannelId>,
        spending_txid: Option<Txid>,
    },

    /// Shadow state entered on peer disconnection; preserves the
    /// interrupted stage
    #[display("OFFLINE({inner})")]
    Offline { inner: Box<ChannelState> },

    /// The peer has proven (via `channel_reestablish`) to hold a newer
    /// commitment than we ever signed: our state is stale and the only
    /// safe action is to wait for them to close with it
    #[display("WAIT_FOR_REMOTE_PUBLISH_FUTURE_COMMITMENT")]
    WaitForRemotePublishFutureCommitment {
        data: ChannelData,
        remote: RemoteAhead,
    },
}

impl StrictEncode for Box<ChannelState> {
    fn strict_encode<E: io::Write>(&self, e: E) -> Result<usize, strict_encoding::Error> {
        self.as_ref().strict_encode(e)
    }
}

impl StrictDecode for Box<ChannelState> {
    fn strict_decode<D: io::Read>(d: D) -> Result<Self, strict_encoding::Error> {
        Ok(Box::new(ChannelState::strict_decode(d)?))
    }
}

impl ChannelState {
    /// Single-byte tag stored alongside the serialized blob in the
    /// channels database
    pub fn state_tag(&self) -> u8 {
        match self {
            ChannelState::WaitForInit => 0x00,
            ChannelState::WaitForOpenChannel { .. } => 0x01,
            ChannelState::WaitForAcceptChannel { .. } => 0x02,
            ChannelState::WaitForFundingInternal { .. } => 0x03,
            ChannelState::WaitForFundingCreated { .. } => 0x04,
            ChannelState::WaitForFundingSigned { .. } => 0x05,
            ChannelState::WaitForFundingConfirmed { .. } => 0x06,
            ChannelState::WaitForFundingLocked { .. } => 0x07,
            ChannelState::Normal { .. } => 0x08,
            ChannelState::ShuttingDown { .. } => 0x09,
            ChannelState::Negotiating { .. } => 0x0a,
            ChannelState::Closing { .. } => 0x0b,
            ChannelState::Closed { .. } => 0x0c,
            ChannelState::Offline { .. } => 0x0d,
            ChannelState::WaitForRemotePublishFutureCommitment { .. } => 0x0e,
        }
    }

    /// Detects the terminal state
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelState::Closed { .. })
    }

    /// Detects states which have a commitment structure to protect and
    /// therefore survive disconnection in the `Offline` shadow state
    pub fn has_commitments(&self) -> bool {
        self.channel_data().is_some()
    }

    /// Access to the operating-channel record, where present
    pub fn channel_data(&self) -> Option<&ChannelData> {
        match self {
            ChannelState::WaitForFundingSigned { data }
            | ChannelState::WaitForFundingConfirmed { data, .. }
            | ChannelState::WaitForFundingLocked { data }
            | ChannelState::Normal { data, .. }
            | ChannelState::ShuttingDown { data, .. }
            | ChannelState::Negotiating { data, .. }
            | ChannelState::Closing { data, .. }
            | ChannelState::WaitForRemotePublishFutureCommitment {
                data,
                ..
            } => Some(data),
            ChannelState::Offline { inner } => inner.channel_data(),
            _ => None,
        }
    }

    pub fn channel_data_mut(&mut self) -> Option<&mut ChannelData> {
        match self {
            ChannelState::WaitForFundingSigned { data }
            | ChannelState::WaitForFundingConfirmed { data, .. }
            | ChannelState::WaitForFundingLocked { data }
            | ChannelState::Normal { data, .. }
            | ChannelState::ShuttingDown { data, .. }
            | ChannelState::Negotiating { data, .. }
            | ChannelState::Closing { data, .. }
            | ChannelState::WaitForRemotePublishFutureCommitment {
                data,
                ..
            } => Some(data),
            ChannelState::Offline { inner } => inner.channel_data_mut(),
            _ => None,
        }
    }

    /// Channel id at whatever stage of its evolution
    pub fn active_channel_id(&self) -> Option<ActiveChannelId> {
        match self {
            ChannelState::WaitForInit => None,
            ChannelState::WaitForOpenChannel { preopen }
            | ChannelState::WaitForAcceptChannel { preopen, .. } => {
                Some(preopen.active_channel_id)
            }
            ChannelState::WaitForFundingInternal { negotiated }
            | ChannelState::WaitForFundingCreated { negotiated } => {
                Some(negotiated.preopen.active_channel_id)
            }
            ChannelState::Closed { channel_id, .. } => {
                channel_id.map(ActiveChannelId::Static)
            }
            ChannelState::Offline { inner } => inner.active_channel_id(),
            other => {
                other.channel_data().map(|data| data.active_channel_id)
            }
        }
    }

    /// Normalizes every hot origin inside the state to its cold form: the
    /// exact value a deserialization of this state's serialization yields
    pub fn freeze(self) -> ChannelState {
        match self {
            ChannelState::Offline { inner } => ChannelState::Offline {
                inner: Box::new(inner.freeze()),
            },
            mut state => {
                if let Some(data) = state.channel_data_mut() {
                    data.commitments =
                        data.commitments.clone().freeze_origins();
                }
                state
            }
        }
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        ChannelState::WaitForInit
    }
}

/// Constructs the pre-open configuration for a new channel
pub fn preopen(
    chain_hash: Slice32,
    policy: Policy,
    common_params: CommonParams,
    local_params: PeerParams,
    local_keys: LocalKeyset,
) -> PreopenData {
    PreopenData {
        active_channel_id: ActiveChannelId::Temporary(
            TempChannelId::random(),
        ),
        chain_hash,
        policy,
        common_params,
        local_params,
        local_keys,
    }
}

#[cfg(test)]
mod test {
    use amplify::DumbDefault;
    use strict_encoding::{strict_deserialize, strict_serialize};

    use super::*;
    use crate::commitments::ChannelDirection;
    use crate::origin::{Origin, Upstream};

    fn channel_data() -> ChannelData {
        ChannelData {
            active_channel_id: ActiveChannelId::random(),
            chain_hash: Slice32::default(),
            policy: Policy::default(),
            common_params: CommonParams::default(),
            local_keys: LocalKeyset::dumb_default(),
            remote_keys: RemoteKeyset::dumb_default(),
            funding: Funding::preliminary(1_000_000),
            commitments: Commitments::dumb_default(),
            short_channel_id: None,
            minimum_depth: 3,
        }
    }

    fn state_with_hot_origin() -> ChannelState {
        let mut data = channel_data();
        let commitments = Commitments::with(
            ChannelDirection::Inbound,
            1_000_000,
            0,
            1000,
            PeerParams::default(),
            PeerParams::default(),
            dumb_pubkey!(),
            dumb_pubkey!(),
        );
        let update = lnwire::bolt2::UpdateAddHtlc {
            channel_id: ChannelId::default(),
            htlc_id: 0,
            amount_msat: 10_000_000,
            payment_hash: bitcoin_scripts::hlc::HashLock::from(
                Slice32::default(),
            ),
            cltv_expiry: 500_000,
            onion_routing_packet:
                lnwire::bolt2::OnionPacket::dumb_default(),
            unknown_tlvs: none!(),
        };
        let hot = Origin::Hot {
            reply_token: 99,
            upstream: Upstream::Local {
                payment_id: Slice32::default(),
            },
        };
        data.commitments = commitments.receive_add(&update, hot).unwrap();
        ChannelState::Normal {
            data,
            local_shutdown: None,
            remote_shutdown: None,
        }
    }

    #[test]
    fn state_tags_are_distinct() {
        let states = [
            ChannelState::WaitForInit,
            ChannelState::Closed {
                channel_id: None,
                spending_txid: None,
            },
            ChannelState::Normal {
                data: channel_data(),
                local_shutdown: None,
                remote_shutdown: None,
            },
            ChannelState::Offline {
                inner: Box::new(ChannelState::WaitForInit),
            },
        ];
        let mut tags: Vec<u8> =
            states.iter().map(ChannelState::state_tag).collect();
        tags.dedup();
        assert_eq!(tags.len(), states.len());
    }

    #[test]
    fn serialization_freezes_origins() {
        let state = state_with_hot_origin();
        let encoded = strict_serialize(&state).unwrap();
        let decoded: ChannelState = strict_deserialize(&encoded).unwrap();
        assert_ne!(decoded, state, "hot origin must not survive the store");
        assert_eq!(decoded, state.clone().freeze());
        // second round trip is the identity: cold is a fixed point
        let encoded2 = strict_serialize(&decoded).unwrap();
        let decoded2: ChannelState = strict_deserialize(&encoded2).unwrap();
        assert_eq!(decoded2, decoded);
    }

    #[test]
    fn offline_preserves_inner_state() {
        let state = state_with_hot_origin();
        let offline = ChannelState::Offline {
            inner: Box::new(state.clone()),
        };
        assert!(offline.has_commitments());
        assert_eq!(
            offline.active_channel_id(),
            state.active_channel_id()
        );
        let encoded = strict_serialize(&offline).unwrap();
        let decoded: ChannelState = strict_deserialize(&encoded).unwrap();
        assert_eq!(decoded, offline.freeze());
    }
}
