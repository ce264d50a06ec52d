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

//! The synchronized commitment state shared between two channel peers and
//! the update/signature/revocation protocol driving it.
//!
//! Every operation is a pure function: it takes the current [`Commitments`]
//! value by reference and returns the next value together with the message
//! (if any) to transmit. Callers persist the new value before transmitting
//! anything derived from it.

use std::collections::BTreeMap;

use amplify::{DumbDefault, Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::util::sighash::SighashCache;
use bitcoin::EcdsaSighashType;
use bitcoin::OutPoint;
use bitcoin_scripts::hlc::{HashLock, HashPreimage};
use bitcoin_scripts::WitnessScript;
use lnwire::bolt2::{
    CommitmentSigned, OnionPacket, RevokeAndAck, UpdateAddHtlc,
    UpdateFailHtlc, UpdateFee, UpdateFulfillHtlc,
};
use lnwire::ChannelId;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use wallet::psbt::{self, Psbt};

use crate::funding::Funding;
use crate::htlc::{
    is_trimmed, weight_to_fee, Direction, HtlcKnown, HtlcSecret,
    CLTV_EXPIRY_MAX, COMMITMENT_TX_BASE_WEIGHT, COMMITMENT_TX_WEIGHT_PER_HTLC,
    HTLC_SUCCESS_WEIGHT, HTLC_TIMEOUT_WEIGHT,
};
use crate::keyset::{
    derive_pubkey, derive_revocation_pubkey, LocalKeyset, RemoteKeyset,
};
use crate::origin::Origin;
use crate::policy::{PeerParams, Policy, PolicyError};
use crate::scripts::{ScriptGenerators, TxGenerators};
use crate::secrets::{CommitmentSeed, SecretStore};
use crate::tx_graph::{TxGraph, TxType};

/// Which side has funded the channel and pays the commitment fee
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum ChannelDirection {
    /// Channel accepted from a remote peer which acts as the funder
    #[display("inbound")]
    Inbound,

    /// Channel funded by the local node
    #[display("outbound")]
    Outbound,
}

impl ChannelDirection {
    #[inline]
    pub fn is_outbound(self) -> bool {
        self == ChannelDirection::Outbound
    }
}

/// Commitment protocol position of an in-flight HTLC
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum HtlcStage {
    /// Announced with `update_add_htlc` but not covered by any commitment
    /// signature yet
    #[display("proposed")]
    Proposed,

    /// Covered by a `commitment_signed` whose revocation is still pending
    #[display("signed")]
    Signed,

    /// Irrevocably committed on both sides
    #[display("acked")]
    Acked,
}

/// In-flight HTLC together with its protocol position and upstream
/// bookkeeping
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct InFlightHtlc {
    pub stage: HtlcStage,
    pub htlc: HtlcSecret,
    /// Why this HTLC was created; present on the receiving side and for
    /// locally originated payments
    pub origin: Option<Origin>,
}

/// Protocol errors of the commitment state machine. Any of them voids the
/// channel: the caller must send a `wire.Error` and force-close.
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ChannelError {
    /// policy violation: {0}
    #[from]
    Policy(PolicyError),

    /// HTLC amount {amount_msat} msat is below the receiving party minimum
    /// of {minimum_msat} msat
    HtlcBelowMinimum {
        amount_msat: u64,
        minimum_msat: u64,
    },

    /// adding the HTLC would exceed the limit of {0} in-flight HTLCs
    /// accepted by the receiving party
    TooManyHtlcs(u16),

    /// adding the HTLC of {amount_msat} msat would bring the total
    /// in-flight value over the limit of {limit_msat} msat
    HtlcValueInFlightExceeded {
        amount_msat: u64,
        limit_msat: u64,
    },

    /// HTLC CLTV expiry {0} is not a block height
    CltvOutOfRange(u32),

    /// insufficient balance: {available_msat} msat available, {required_msat}
    /// msat required to add the HTLC and keep the reserve
    InsufficientBalance {
        available_msat: u64,
        required_msat: u64,
    },

    /// received `update_add_htlc` with id {received} while {expected} was
    /// expected
    UnexpectedHtlcId { received: u64, expected: u64 },

    /// unknown HTLC with id {0}
    UnknownHtlc(u64),

    /// HTLC {0} can not be resolved before it is irrevocably committed
    HtlcNotCommitted(u64),

    /// preimage provided for HTLC {0} does not match its payment hash
    PreimageMismatch(u64),

    /// `update_fee` may be sent only by the channel funder
    UpdateFeeFromFundee,

    /// new feerate would drop the funder balance below its channel reserve
    FundersBalanceBelowReserve,

    /// there are no updates to commit to; signing now would duplicate the
    /// previous signature
    NothingToSign,

    /// a `commitment_signed` is already in flight; a new one may not be
    /// sent before `revoke_and_ack` is received
    AwaitingRevocation,

    /// received `commitment_signed` without any pending updates
    NothingSigned,

    /// received `commitment_signed` carries {received} HTLC signatures
    /// while the commitment transaction has {expected} HTLC outputs
    WrongHtlcSigCount { received: usize, expected: usize },

    /// signature on the commitment transaction is invalid
    InvalidCommitmentSignature,

    /// signature on the HTLC transaction #{0} is invalid
    InvalidHtlcSignature(usize),

    /// received `revoke_and_ack` while no revocation is due
    UnexpectedRevocation,

    /// revealed per-commitment secret does not match the revoked
    /// commitment point
    RevocationSecretMismatch,

    /// per-commitment secret chain is broken: {0}
    #[from]
    SecretChain(crate::secrets::SecretChainError),

    /// operation is not allowed at the current channel lifecycle stage
    WrongState,
}

/// A transaction of the commitment family prepared for signing or
/// verification
#[derive(Clone, Debug)]
pub struct HtlcTx {
    /// Direction from the commitment holder's viewpoint
    pub direction: Direction,
    pub htlc_id: u64,
    pub cltv_expiry: u32,
    pub amount_msat: u64,
    /// Script of the commitment output this transaction spends
    pub redeem_script: WitnessScript,
    pub psbt: Psbt,
}

/// Fully built commitment transaction of one of the parties, together with
/// its second-stage HTLC transactions
#[derive(Clone, Debug)]
pub struct CommitmentTx {
    /// Commitment number this transaction corresponds to
    pub commitment_number: u64,
    pub obscured_number: u64,
    pub psbt: Psbt,
    /// Second-stage transactions, ordered as the HTLC outputs within the
    /// commitment transaction
    pub htlc_txs: Vec<HtlcTx>,
    /// Funding witness script (the redeem script of the single input)
    pub funding_script: WitnessScript,
}

impl CommitmentTx {
    #[inline]
    pub fn txid(&self) -> bitcoin::Txid {
        self.psbt.to_txid()
    }
}

/// The synchronized shared state of a channel: balances, in-flight HTLCs,
/// commitment numbers and per-commitment points of both sides.
#[derive(Getters, Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
pub struct Commitments {
    /// Who funded the channel (and pays commitment fees)
    #[getter(as_copy)]
    direction: ChannelDirection,

    /// Channel capacity: value of the funding output, in satoshi
    #[getter(as_copy)]
    capacity_sat: u64,

    /// Spendable balance of the local node, millisatoshi
    #[getter(as_copy)]
    local_amount_msat: u64,

    /// Spendable balance of the remote node, millisatoshi
    #[getter(as_copy)]
    remote_amount_msat: u64,

    /// Feerate committed to the current commitment transactions, sat per
    /// kiloweight
    #[getter(as_copy)]
    feerate_per_kw: u32,

    /// Number of the current valid local commitment transaction
    #[getter(as_copy)]
    local_commitment_number: u64,

    /// Number of the newest remote commitment transaction we have signed
    #[getter(as_copy)]
    remote_commitment_number: u64,

    /// Limits the remote node imposes on HTLCs we offer
    #[getter(as_copy)]
    remote_params: PeerParams,

    /// Limits we impose on HTLCs the remote node offers
    #[getter(as_copy)]
    local_params: PeerParams,

    /// Per-commitment point of the current local commitment
    #[getter(as_copy)]
    local_per_commitment_point: PublicKey,

    /// Per-commitment point of the oldest unrevoked remote commitment
    #[getter(as_copy)]
    remote_per_commitment_point: PublicKey,

    /// Per-commitment point the remote node disclosed for its next
    /// commitment
    #[getter(as_copy)]
    remote_next_per_commitment_point: PublicKey,

    /// HTLCs offered by the local node, by local HTLC id
    offered: BTreeMap<u64, InFlightHtlc>,

    /// HTLCs received from the remote node, by remote HTLC id
    received: BTreeMap<u64, InFlightHtlc>,

    /// Recently resolved HTLCs with known preimages, kept for on-chain
    /// claims until the resolving commitments are revoked on both sides
    resolved: BTreeMap<u64, HtlcKnown>,

    #[getter(as_copy)]
    next_offered_htlc_id: u64,

    #[getter(as_copy)]
    next_received_htlc_id: u64,

    /// Local updates announced but not yet covered by an outgoing
    /// `commitment_signed`
    #[getter(as_copy)]
    local_updates_proposed: u16,

    /// Local updates covered by an in-flight `commitment_signed` awaiting
    /// the remote revocation
    #[getter(as_copy)]
    local_updates_signed: u16,

    /// Local updates acknowledged by a remote revocation but not yet
    /// covered by a returning remote `commitment_signed`
    #[getter(as_copy)]
    local_updates_acked: u16,

    /// Remote updates announced but not yet covered by an incoming
    /// `commitment_signed`
    #[getter(as_copy)]
    remote_updates_proposed: u16,

    /// Remote updates we have acknowledged with our revocation but not yet
    /// covered by our returning `commitment_signed`
    #[getter(as_copy)]
    remote_updates_acked: u16,

    /// Remote updates covered by our in-flight `commitment_signed`
    #[getter(as_copy)]
    remote_updates_signed: u16,

    /// An outgoing `commitment_signed` is in flight and the matching
    /// `revoke_and_ack` has not come back yet
    #[getter(as_copy)]
    awaiting_remote_revocation: bool,

    /// Latest remote signature for our commitment transaction; required to
    /// force-close
    #[getter(as_copy)]
    remote_commitment_sig: Option<Signature>,

    /// Remote signatures for our second-stage HTLC transactions
    remote_htlc_sigs: Vec<Signature>,

    /// Per-commitment secrets the remote node has released
    remote_secrets: SecretStore,
}

impl DumbDefault for Commitments {
    fn dumb_default() -> Self {
        Commitments::with(
            ChannelDirection::Outbound,
            0,
            0,
            0,
            PeerParams::default(),
            PeerParams::default(),
            dumb_pubkey!(),
            dumb_pubkey!(),
        )
    }
}

impl Commitments {
    /// Initializes the commitment state at channel negotiation time
    #[allow(clippy::too_many_arguments)]
    pub fn with(
        direction: ChannelDirection,
        capacity_sat: u64,
        push_msat: u64,
        feerate_per_kw: u32,
        local_params: PeerParams,
        remote_params: PeerParams,
        local_first_point: PublicKey,
        remote_first_point: PublicKey,
    ) -> Commitments {
        let total_msat = capacity_sat * 1000;
        let (local_amount_msat, remote_amount_msat) = match direction {
            ChannelDirection::Outbound => {
                (total_msat - push_msat, push_msat)
            }
            ChannelDirection::Inbound => (push_msat, total_msat - push_msat),
        };
        Commitments {
            direction,
            capacity_sat,
            local_amount_msat,
            remote_amount_msat,
            feerate_per_kw,
            local_commitment_number: 0,
            remote_commitment_number: 0,
            remote_params,
            local_params,
            local_per_commitment_point: local_first_point,
            remote_per_commitment_point: remote_first_point,
            remote_next_per_commitment_point: remote_first_point,
            offered: bmap! {},
            received: bmap! {},
            resolved: bmap! {},
            next_offered_htlc_id: 0,
            next_received_htlc_id: 0,
            local_updates_proposed: 0,
            local_updates_signed: 0,
            local_updates_acked: 0,
            remote_updates_proposed: 0,
            remote_updates_acked: 0,
            remote_updates_signed: 0,
            awaiting_remote_revocation: false,
            remote_commitment_sig: None,
            remote_htlc_sigs: vec![],
            remote_secrets: SecretStore::new(),
        }
    }

    /// Detects whether we have anything new to commit to: either our own
    /// proposals or remote updates we have acknowledged with a revocation
    #[inline]
    pub fn can_send_commitment(&self) -> bool {
        self.local_updates_proposed > 0 || self.remote_updates_acked > 0
    }

    /// Detects whether the remote node legitimately has something to sign;
    /// a `commitment_signed` violating this duplicates its predecessor
    #[inline]
    pub fn remote_has_changes(&self) -> bool {
        self.remote_updates_proposed > 0 || self.local_updates_acked > 0
    }

    /// Normalizes all HTLC origins to their cold form (used before
    /// persistence equality checks; the serialization itself always writes
    /// cold forms)
    pub fn freeze_origins(mut self) -> Commitments {
        for entry in self.offered.values_mut() {
            entry.origin = entry.origin.take().map(Origin::freeze);
        }
        for entry in self.received.values_mut() {
            entry.origin = entry.origin.take().map(Origin::freeze);
        }
        self
    }

    /// Commitment fee at the current feerate with the given number of
    /// untrimmed HTLC outputs, in satoshi
    #[inline]
    pub fn commitment_fee(&self, untrimmed_htlcs: u64) -> u64 {
        weight_to_fee(
            COMMITMENT_TX_BASE_WEIGHT
                + COMMITMENT_TX_WEIGHT_PER_HTLC * untrimmed_htlcs,
            self.feerate_per_kw,
        )
    }

    /// Total value captured by in-flight HTLCs, millisatoshi
    pub fn htlc_value_in_flight_msat(&self) -> u64 {
        self.offered
            .values()
            .chain(self.received.values())
            .map(|entry| entry.htlc.amount_msat)
            .sum()
    }

    /// Conservation law: balances plus in-flight HTLC values always equal
    /// the channel capacity. The commitment fee is carved out of the funder
    /// output at transaction construction and never leaves the balance
    /// bookkeeping.
    pub fn balance_invariant_holds(&self) -> bool {
        self.local_amount_msat
            + self.remote_amount_msat
            + self.htlc_value_in_flight_msat()
            == self.capacity_sat * 1000
    }

    /// BOLT-3 obscured commitment number: the 48-bit commitment number
    /// XOR'ed with the lower 48 bits of the hash of both payment
    /// basepoints, funder's first
    pub fn obscured_commitment_number(
        &self,
        commitment_number: u64,
        local_keys: &LocalKeyset,
        remote_keys: &RemoteKeyset,
    ) -> u64 {
        const LOWER_48_BITS: u64 = 0x00_00_FF_FF_FF_FF_FF_FF;

        let mut engine = sha256::Hash::engine();
        match self.direction {
            ChannelDirection::Outbound => {
                engine.input(&local_keys.payment_basepoint.key.serialize());
                engine.input(&remote_keys.payment_basepoint.serialize());
            }
            ChannelDirection::Inbound => {
                engine.input(&remote_keys.payment_basepoint.serialize());
                engine.input(&local_keys.payment_basepoint.key.serialize());
            }
        }
        let obscuring_hash = sha256::Hash::from_engine(engine);

        let mut buf = [0u8; 8];
        buf.copy_from_slice(&obscuring_hash[24..]);
        let obscuring_factor = u64::from_be_bytes(buf) & LOWER_48_BITS;

        (commitment_number & LOWER_48_BITS) ^ obscuring_factor
    }

    // --------------------------------------------------------------------
    // Update operations

    /// Offers a new HTLC to the remote node
    pub fn send_add(
        &self,
        amount_msat: u64,
        payment_hash: HashLock,
        cltv_expiry: u32,
        onion: OnionPacket,
        origin: Option<Origin>,
        channel_id: ChannelId,
    ) -> Result<(Commitments, UpdateAddHtlc), ChannelError> {
        self.check_add(
            amount_msat,
            cltv_expiry,
            self.remote_params,
            &self.offered,
            self.local_amount_msat,
            true,
        )?;

        let mut next = self.clone();
        let htlc_id = next.next_offered_htlc_id;
        next.next_offered_htlc_id += 1;
        next.local_amount_msat -= amount_msat;
        next.offered.insert(htlc_id, InFlightHtlc {
            stage: HtlcStage::Proposed,
            htlc: HtlcSecret {
                amount_msat,
                hashlock: payment_hash,
                id: htlc_id,
                cltv_expiry,
                onion: onion.clone(),
            },
            origin,
        });
        next.local_updates_proposed += 1;
        debug_assert!(next.balance_invariant_holds());

        let message = UpdateAddHtlc {
            channel_id,
            htlc_id,
            amount_msat,
            payment_hash,
            cltv_expiry,
            onion_routing_packet: onion,
            unknown_tlvs: none!(),
        };
        Ok((next, message))
    }

    /// Accepts an HTLC offered by the remote node
    pub fn receive_add(
        &self,
        message: &UpdateAddHtlc,
        origin: Origin,
    ) -> Result<Commitments, ChannelError> {
        if message.htlc_id != self.next_received_htlc_id {
            return Err(ChannelError::UnexpectedHtlcId {
                received: message.htlc_id,
                expected: self.next_received_htlc_id,
            });
        }
        self.check_add(
            message.amount_msat,
            message.cltv_expiry,
            self.local_params,
            &self.received,
            self.remote_amount_msat,
            self.direction == ChannelDirection::Inbound,
        )?;

        let mut next = self.clone();
        next.next_received_htlc_id += 1;
        next.remote_amount_msat -= message.amount_msat;
        next.received.insert(message.htlc_id, InFlightHtlc {
            stage: HtlcStage::Proposed,
            htlc: HtlcSecret::with(message),
            origin: Some(origin),
        });
        next.remote_updates_proposed += 1;
        debug_assert!(next.balance_invariant_holds());
        Ok(next)
    }

    /// Common admission checks for a new HTLC against the receiving party's
    /// limits. `sender_pays_fee` marks whether the HTLC sender is also the
    /// channel funder paying the commitment fee.
    fn check_add(
        &self,
        amount_msat: u64,
        cltv_expiry: u32,
        receiver_params: PeerParams,
        in_flight: &BTreeMap<u64, InFlightHtlc>,
        sender_balance_msat: u64,
        sender_pays_fee: bool,
    ) -> Result<(), ChannelError> {
        if amount_msat == 0
            || amount_msat < receiver_params.htlc_minimum_msat
        {
            return Err(ChannelError::HtlcBelowMinimum {
                amount_msat,
                minimum_msat: receiver_params.htlc_minimum_msat.max(1),
            });
        }
        if cltv_expiry > CLTV_EXPIRY_MAX {
            return Err(ChannelError::CltvOutOfRange(cltv_expiry));
        }
        if in_flight.len() >= receiver_params.htlc_slots_max as usize {
            return Err(ChannelError::TooManyHtlcs(
                receiver_params.htlc_slots_max,
            ));
        }
        let in_flight_msat: u64 =
            in_flight.values().map(|e| e.htlc.amount_msat).sum();
        if in_flight_msat + amount_msat
            > receiver_params.htlc_in_flight_max_msat
        {
            return Err(ChannelError::HtlcValueInFlightExceeded {
                amount_msat,
                limit_msat: receiver_params.htlc_in_flight_max_msat,
            });
        }

        // sender must keep its reserve and, when it is the funder, afford
        // the commitment fee with one more HTLC output
        let mut required_msat =
            amount_msat + receiver_params.reserve_sat * 1000;
        if sender_pays_fee {
            required_msat +=
                self.commitment_fee(self.untrimmed_count() + 1) * 1000;
        }
        if sender_balance_msat < required_msat {
            return Err(ChannelError::InsufficientBalance {
                available_msat: sender_balance_msat,
                required_msat,
            });
        }
        Ok(())
    }

    fn untrimmed_count(&self) -> u64 {
        let dust_limit = match self.direction {
            ChannelDirection::Outbound => {
                self.local_params.dust_limit
            }
            ChannelDirection::Inbound => {
                self.remote_params.dust_limit
            }
        };
        self.offered
            .values()
            .map(|e| (Direction::Offered, e))
            .chain(self.received.values().map(|e| (Direction::Received, e)))
            .filter(|(direction, e)| {
                !is_trimmed(
                    *direction,
                    e.htlc.amount_msat,
                    self.feerate_per_kw,
                    dust_limit,
                )
            })
            .count() as u64
    }

    /// Settles a received HTLC by revealing its preimage, crediting the
    /// local balance
    pub fn send_fulfill(
        &self,
        htlc_id: u64,
        payment_preimage: HashPreimage,
        channel_id: ChannelId,
    ) -> Result<(Commitments, UpdateFulfillHtlc), ChannelError> {
        let entry = self
            .received
            .get(&htlc_id)
            .ok_or(ChannelError::UnknownHtlc(htlc_id))?;
        if entry.stage != HtlcStage::Acked {
            return Err(ChannelError::HtlcNotCommitted(htlc_id));
        }
        if entry.htlc.hashlock != HashLock::from(payment_preimage) {
            return Err(ChannelError::PreimageMismatch(htlc_id));
        }

        let mut next = self.clone();
        let entry = next
            .received
            .remove(&htlc_id)
            .expect("presence checked above");
        next.local_amount_msat += entry.htlc.amount_msat;
        next.resolved.insert(htlc_id, HtlcKnown {
            amount_msat: entry.htlc.amount_msat,
            preimage: payment_preimage,
            id: htlc_id,
            cltv_expiry: entry.htlc.cltv_expiry,
            direction: Direction::Received,
        });
        next.local_updates_proposed += 1;
        debug_assert!(next.balance_invariant_holds());

        let message = UpdateFulfillHtlc {
            channel_id,
            htlc_id,
            payment_preimage,
        };
        Ok((next, message))
    }

    /// Processes the remote settlement of an HTLC we offered; returns the
    /// resolved HTLC so the caller can propagate the preimage upstream
    pub fn receive_fulfill(
        &self,
        message: &UpdateFulfillHtlc,
    ) -> Result<(Commitments, InFlightHtlc), ChannelError> {
        let entry = self
            .offered
            .get(&message.htlc_id)
            .ok_or(ChannelError::UnknownHtlc(message.htlc_id))?;
        if entry.stage != HtlcStage::Acked {
            return Err(ChannelError::HtlcNotCommitted(message.htlc_id));
        }
        if entry.htlc.hashlock != HashLock::from(message.payment_preimage) {
            return Err(ChannelError::PreimageMismatch(message.htlc_id));
        }

        let mut next = self.clone();
        let entry = next
            .offered
            .remove(&message.htlc_id)
            .expect("presence checked above");
        next.remote_amount_msat += entry.htlc.amount_msat;
        next.resolved.insert(message.htlc_id, HtlcKnown {
            amount_msat: entry.htlc.amount_msat,
            preimage: message.payment_preimage,
            id: message.htlc_id,
            cltv_expiry: entry.htlc.cltv_expiry,
            direction: Direction::Offered,
        });
        next.remote_updates_proposed += 1;
        debug_assert!(next.balance_invariant_holds());
        Ok((next, entry))
    }

    /// Fails a received HTLC, returning its value to the remote balance
    pub fn send_fail(
        &self,
        htlc_id: u64,
        reason: Vec<u8>,
        channel_id: ChannelId,
    ) -> Result<(Commitments, UpdateFailHtlc), ChannelError> {
        let entry = self
            .received
            .get(&htlc_id)
            .ok_or(ChannelError::UnknownHtlc(htlc_id))?;
        if entry.stage != HtlcStage::Acked {
            return Err(ChannelError::HtlcNotCommitted(htlc_id));
        }

        let mut next = self.clone();
        let entry = next
            .received
            .remove(&htlc_id)
            .expect("presence checked above");
        next.remote_amount_msat += entry.htlc.amount_msat;
        next.local_updates_proposed += 1;
        debug_assert!(next.balance_invariant_holds());

        let message = UpdateFailHtlc {
            channel_id,
            htlc_id,
            reason,
        };
        Ok((next, message))
    }

    /// Processes remote failure of an HTLC we offered; the value returns to
    /// the local balance and the failure propagates upstream
    pub fn receive_fail(
        &self,
        message: &UpdateFailHtlc,
    ) -> Result<(Commitments, InFlightHtlc), ChannelError> {
        let entry = self
            .offered
            .get(&message.htlc_id)
            .ok_or(ChannelError::UnknownHtlc(message.htlc_id))?;
        if entry.stage != HtlcStage::Acked {
            return Err(ChannelError::HtlcNotCommitted(message.htlc_id));
        }

        let mut next = self.clone();
        let entry = next
            .offered
            .remove(&message.htlc_id)
            .expect("presence checked above");
        next.local_amount_msat += entry.htlc.amount_msat;
        next.remote_updates_proposed += 1;
        debug_assert!(next.balance_invariant_holds());
        Ok((next, entry))
    }

    /// Proposes a feerate change; allowed for the channel funder only
    pub fn send_fee(
        &self,
        feerate_per_kw: u32,
        channel_id: ChannelId,
    ) -> Result<(Commitments, UpdateFee), ChannelError> {
        if self.direction != ChannelDirection::Outbound {
            return Err(ChannelError::UpdateFeeFromFundee);
        }
        let mut next = self.clone();
        next.feerate_per_kw = feerate_per_kw;
        let fee_msat = next.commitment_fee(next.untrimmed_count()) * 1000;
        let reserve_msat = self.remote_params.reserve_sat * 1000;
        if next.local_amount_msat < fee_msat + reserve_msat {
            return Err(ChannelError::FundersBalanceBelowReserve);
        }
        next.local_updates_proposed += 1;
        Ok((next, UpdateFee {
            channel_id,
            feerate_per_kw,
        }))
    }

    /// Validates and applies a feerate change proposed by the remote funder
    pub fn receive_fee(
        &self,
        message: &UpdateFee,
        policy: &Policy,
        local_estimate: u32,
    ) -> Result<Commitments, ChannelError> {
        if self.direction != ChannelDirection::Inbound {
            // we are the funder; the fundee must never send update_fee
            return Err(ChannelError::UpdateFeeFromFundee);
        }
        policy.validate_update_fee(message.feerate_per_kw, local_estimate)?;

        let mut next = self.clone();
        next.feerate_per_kw = message.feerate_per_kw;
        let fee_msat = next.commitment_fee(next.untrimmed_count()) * 1000;
        let reserve_msat = self.local_params.reserve_sat * 1000;
        if next.remote_amount_msat < fee_msat + reserve_msat {
            return Err(ChannelError::FundersBalanceBelowReserve);
        }
        next.remote_updates_proposed += 1;
        Ok(next)
    }

    // --------------------------------------------------------------------
    // Commitment transaction construction

    /// Builds the commitment transaction owned by one of the parties.
    ///
    /// `holder_local` selects the viewpoint; `per_commitment_point` must be
    /// the point of the commitment number being built.
    pub fn commitment_tx(
        &self,
        funding: &Funding,
        local_keys: &LocalKeyset,
        remote_keys: &RemoteKeyset,
        holder_local: bool,
        commitment_number: u64,
        per_commitment_point: PublicKey,
    ) -> CommitmentTx {
        let (holder_dust_limit, holder_delay) = if holder_local {
            (
                self.local_params.dust_limit,
                self.remote_params.to_self_delay,
            )
        } else {
            (
                self.remote_params.dust_limit,
                self.local_params.to_self_delay,
            )
        };

        // Key material from the holder's viewpoint
        let (
            delayed_basepoint,
            holder_htlc_basepoint,
            other_htlc_basepoint,
            other_revocation_basepoint,
            other_payment_basepoint,
            static_remotekey,
        ) = if holder_local {
            (
                local_keys.delayed_payment_basepoint.key,
                local_keys.htlc_basepoint.key,
                remote_keys.htlc_basepoint,
                remote_keys.revocation_basepoint,
                remote_keys.payment_basepoint,
                remote_keys.static_remotekey,
            )
        } else {
            (
                remote_keys.delayed_payment_basepoint,
                remote_keys.htlc_basepoint,
                local_keys.htlc_basepoint.key,
                local_keys.revocation_basepoint.key,
                local_keys.payment_basepoint.key,
                local_keys.static_remotekey,
            )
        };

        let revocation_pubkey = derive_revocation_pubkey(
            other_revocation_basepoint,
            per_commitment_point,
        );
        let delayed_pubkey =
            derive_pubkey(delayed_basepoint, per_commitment_point);
        let holder_htlc_pubkey =
            derive_pubkey(holder_htlc_basepoint, per_commitment_point);
        let other_htlc_pubkey =
            derive_pubkey(other_htlc_basepoint, per_commitment_point);
        let remote_pubkey = if static_remotekey {
            other_payment_basepoint
        } else {
            derive_pubkey(other_payment_basepoint, per_commitment_point)
        };

        // Balance viewpoint
        let (mut to_local_msat, mut to_remote_msat) = if holder_local {
            (self.local_amount_msat, self.remote_amount_msat)
        } else {
            (self.remote_amount_msat, self.local_amount_msat)
        };

        // HTLCs from the holder's viewpoint. Trimmed HTLCs produce no
        // output: their value is neither ours nor theirs until resolution,
        // so on this transaction it is absorbed by the mining fee.
        let mut untrimmed: Vec<(Direction, &HtlcSecret)> = Vec::new();
        for (direction, entry) in self
            .offered
            .values()
            .map(|e| (Direction::Offered, e))
            .chain(self.received.values().map(|e| (Direction::Received, e)))
        {
            let holder_direction = if holder_local {
                direction
            } else {
                direction.swapped()
            };
            if !is_trimmed(
                holder_direction,
                entry.htlc.amount_msat,
                self.feerate_per_kw,
                holder_dust_limit,
            ) {
                untrimmed.push((holder_direction, &entry.htlc));
            }
        }

        // The commitment fee is carved from the funder's output
        let fee_msat = self.commitment_fee(untrimmed.len() as u64) * 1000;
        let holder_is_funder = holder_local
            == (self.direction == ChannelDirection::Outbound);
        if holder_is_funder {
            to_local_msat = to_local_msat.saturating_sub(fee_msat);
        } else {
            to_remote_msat = to_remote_msat.saturating_sub(fee_msat);
        }

        let obscured_number = self.obscured_commitment_number(
            commitment_number,
            local_keys,
            remote_keys,
        );
        let lock_time =
            (0x20u32 << 24) | (obscured_number as u32 & 0x00FF_FFFF);
        let sequence = (0x80u32 << 24) | (obscured_number >> 24) as u32;

        let mut graph = TxGraph::from_funding(funding);
        graph.cmt_locktime = lock_time;
        graph.cmt_sequence = sequence;

        // Outputs with BIP-69 ordering; equal HTLC outputs are
        // disambiguated by CLTV expiry
        struct OutSlot {
            txout: bitcoin::TxOut,
            out: psbt::Output,
            htlc: Option<(Direction, u64, u32, u64, WitnessScript)>,
        }
        let mut slots: Vec<OutSlot> = Vec::new();

        if to_local_msat / 1000 >= holder_dust_limit {
            let (txout, out) = <(bitcoin::TxOut, psbt::Output)>::ln_to_local(
                to_local_msat / 1000,
                revocation_pubkey,
                delayed_pubkey,
                holder_delay,
            );
            slots.push(OutSlot {
                txout,
                out,
                htlc: None,
            });
        }
        if to_remote_msat / 1000 >= holder_dust_limit {
            let (txout, out) = <(bitcoin::TxOut, psbt::Output)>::ln_to_remote_v1(
                to_remote_msat / 1000,
                remote_pubkey,
            );
            slots.push(OutSlot {
                txout,
                out,
                htlc: None,
            });
        }
        for (direction, htlc) in untrimmed {
            let amount_sat = htlc.amount_msat / 1000;
            let (txout, out, witness_script) = match direction {
                Direction::Offered => {
                    let ws = WitnessScript::ln_offered_htlc(
                        amount_sat,
                        revocation_pubkey,
                        holder_htlc_pubkey,
                        other_htlc_pubkey,
                        htlc.hashlock,
                    );
                    let pair = <(bitcoin::TxOut, psbt::Output)>::ln_offered_htlc(
                        amount_sat,
                        revocation_pubkey,
                        holder_htlc_pubkey,
                        other_htlc_pubkey,
                        htlc.hashlock,
                    );
                    (pair.0, pair.1, ws)
                }
                Direction::Received => {
                    let ws = WitnessScript::ln_received_htlc(
                        amount_sat,
                        revocation_pubkey,
                        holder_htlc_pubkey,
                        other_htlc_pubkey,
                        htlc.cltv_expiry,
                        htlc.hashlock,
                    );
                    let pair =
                        <(bitcoin::TxOut, psbt::Output)>::ln_received_htlc(
                            amount_sat,
                            revocation_pubkey,
                            holder_htlc_pubkey,
                            other_htlc_pubkey,
                            htlc.cltv_expiry,
                            htlc.hashlock,
                        );
                    (pair.0, pair.1, ws)
                }
            };
            slots.push(OutSlot {
                txout,
                out,
                htlc: Some((
                    direction,
                    htlc.id,
                    htlc.cltv_expiry,
                    htlc.amount_msat,
                    witness_script,
                )),
            });
        }

        slots.sort_by(|a, b| {
            (
                a.txout.value,
                a.txout.script_pubkey.to_bytes(),
                a.htlc.as_ref().map(|h| h.2),
            )
                .cmp(&(
                    b.txout.value,
                    b.txout.script_pubkey.to_bytes(),
                    b.htlc.as_ref().map(|h| h.2),
                ))
        });

        graph.cmt_outs = slots
            .iter()
            .map(|slot| (slot.txout.clone(), slot.out.clone()))
            .collect();
        let cmt_psbt = graph.render_cmt();
        let cmt_txid = cmt_psbt.to_txid();

        // Second-stage transactions for every untrimmed HTLC, in output
        // order
        let mut htlc_txs = Vec::new();
        for (vout, slot) in slots.iter().enumerate() {
            let (direction, htlc_id, cltv_expiry, amount_msat, ref script) =
                match &slot.htlc {
                    Some(htlc) => (htlc.0, htlc.1, htlc.2, htlc.3, &htlc.4),
                    None => continue,
                };
            let claim_weight = match direction {
                Direction::Offered => HTLC_TIMEOUT_WEIGHT,
                Direction::Received => HTLC_SUCCESS_WEIGHT,
            };
            let claim_fee = weight_to_fee(claim_weight, self.feerate_per_kw);
            let lock = match direction {
                // HTLC-timeout transactions carry the HTLC CLTV
                Direction::Offered => cltv_expiry,
                // HTLC-success transactions are not time-locked
                Direction::Received => 0,
            };
            let psbt = Psbt::ln_htlc(
                amount_msat / 1000 - claim_fee,
                OutPoint::new(cmt_txid, vout as u32),
                lock,
                revocation_pubkey,
                delayed_pubkey,
                holder_delay,
            );
            let role = match direction {
                Direction::Offered => TxType::HtlcTimeout,
                Direction::Received => TxType::HtlcSuccess,
            };
            graph.insert_tx(role, htlc_id, psbt.clone());
            htlc_txs.push(HtlcTx {
                direction,
                htlc_id,
                cltv_expiry,
                amount_msat,
                redeem_script: (*script).clone(),
                psbt,
            });
        }

        CommitmentTx {
            commitment_number,
            obscured_number,
            psbt: cmt_psbt,
            htlc_txs,
            funding_script: WitnessScript::ln_funding(
                funding.amount(),
                &local_keys.funding_pubkey,
                remote_keys.funding_pubkey,
            ),
        }
    }

    /// Current local commitment transaction
    pub fn local_commitment(
        &self,
        funding: &Funding,
        local_keys: &LocalKeyset,
        remote_keys: &RemoteKeyset,
    ) -> CommitmentTx {
        self.commitment_tx(
            funding,
            local_keys,
            remote_keys,
            true,
            self.local_commitment_number,
            self.local_per_commitment_point,
        )
    }

    // --------------------------------------------------------------------
    // Signature exchange

    /// Commits to all pending updates: builds the next remote commitment,
    /// signs it and every HTLC transaction on it.
    pub fn send_commitment(
        &self,
        funding: &Funding,
        local_keys: &LocalKeyset,
        remote_keys: &RemoteKeyset,
        funding_seckey: &SecretKey,
        htlc_base_seckey: &SecretKey,
        channel_id: ChannelId,
    ) -> Result<(Commitments, CommitmentSigned), ChannelError> {
        if self.awaiting_remote_revocation {
            return Err(ChannelError::AwaitingRevocation);
        }
        if !self.can_send_commitment() {
            return Err(ChannelError::NothingToSign);
        }

        let commitment = self.commitment_tx(
            funding,
            local_keys,
            remote_keys,
            false,
            self.remote_commitment_number + 1,
            self.remote_next_per_commitment_point,
        );

        let signature =
            sign_commitment(&commitment, funding, funding_seckey);
        let htlc_seckey = crate::keyset::derive_seckey(
            htlc_base_seckey,
            self.remote_next_per_commitment_point,
        );
        let htlc_signatures = commitment
            .htlc_txs
            .iter()
            .map(|htlc_tx| sign_htlc_tx(htlc_tx, &htlc_seckey))
            .collect();

        let mut next = self.clone();
        next.remote_commitment_number += 1;
        next.awaiting_remote_revocation = true;
        next.local_updates_signed = next.local_updates_proposed;
        next.local_updates_proposed = 0;
        next.remote_updates_signed = next.remote_updates_acked;
        next.remote_updates_acked = 0;
        for entry in next.offered.values_mut() {
            if entry.stage == HtlcStage::Proposed {
                entry.stage = HtlcStage::Signed;
            }
        }

        Ok((next, CommitmentSigned {
            channel_id,
            signature,
            htlc_signatures,
        }))
    }

    /// Verifies an incoming `commitment_signed` against our next commitment
    /// transaction, advances the local commitment number and produces the
    /// revocation of the previous commitment.
    ///
    /// The caller must persist the returned state *before* transmitting the
    /// `revoke_and_ack`: the message releases the revocation secret.
    pub fn receive_commitment(
        &self,
        message: &CommitmentSigned,
        funding: &Funding,
        local_keys: &LocalKeyset,
        remote_keys: &RemoteKeyset,
        seed: &CommitmentSeed,
    ) -> Result<(Commitments, RevokeAndAck), ChannelError> {
        if !self.remote_has_changes() {
            return Err(ChannelError::NothingSigned);
        }

        let new_number = self.local_commitment_number + 1;
        let new_point = seed.point(new_number);
        let commitment = self.commitment_tx(
            funding,
            local_keys,
            remote_keys,
            true,
            new_number,
            new_point,
        );

        verify_commitment_sig(
            &commitment,
            funding,
            &message.signature,
            remote_keys.funding_pubkey,
        )?;
        if message.htlc_signatures.len() != commitment.htlc_txs.len() {
            return Err(ChannelError::WrongHtlcSigCount {
                received: message.htlc_signatures.len(),
                expected: commitment.htlc_txs.len(),
            });
        }
        let remote_htlc_pubkey =
            derive_pubkey(remote_keys.htlc_basepoint, new_point);
        for (no, (htlc_tx, sig)) in commitment
            .htlc_txs
            .iter()
            .zip(&message.htlc_signatures)
            .enumerate()
        {
            verify_htlc_sig(htlc_tx, sig, remote_htlc_pubkey)
                .map_err(|_| ChannelError::InvalidHtlcSignature(no))?;
        }

        let mut next = self.clone();
        next.local_commitment_number = new_number;
        next.local_per_commitment_point = new_point;
        next.remote_commitment_sig = Some(message.signature);
        next.remote_htlc_sigs = message.htlc_signatures.clone();
        // remote proposals are now signed into our commitment and, with the
        // revocation we are about to send, acknowledged; our previously
        // acked updates are covered by this signature
        next.remote_updates_acked += next.remote_updates_proposed;
        next.remote_updates_proposed = 0;
        next.local_updates_acked = 0;
        for entry in next.received.values_mut() {
            if entry.stage == HtlcStage::Proposed {
                entry.stage = HtlcStage::Signed;
            }
        }

        let revocation = RevokeAndAck {
            channel_id: message.channel_id,
            per_commitment_secret: seed.secret(new_number - 1),
            next_per_commitment_point: seed.point(new_number + 1),
        };
        Ok((next, revocation))
    }

    /// Processes the counterparty revocation of its previous commitment
    pub fn receive_revocation(
        &self,
        message: &RevokeAndAck,
    ) -> Result<Commitments, ChannelError> {
        if !self.awaiting_remote_revocation {
            return Err(ChannelError::UnexpectedRevocation);
        }
        let released_point = PublicKey::from_secret_key(
            SECP256K1,
            &message.per_commitment_secret,
        );
        if released_point != self.remote_per_commitment_point {
            return Err(ChannelError::RevocationSecretMismatch);
        }

        let mut next = self.clone();
        next.remote_secrets.insert(
            self.remote_commitment_number - 1,
            Slice32::from_inner(message.per_commitment_secret.secret_bytes()),
        )?;
        next.remote_per_commitment_point =
            self.remote_next_per_commitment_point;
        next.remote_next_per_commitment_point =
            message.next_per_commitment_point;
        next.awaiting_remote_revocation = false;
        next.local_updates_acked += next.local_updates_signed;
        next.local_updates_signed = 0;
        next.remote_updates_signed = 0;
        // the revocation completes cross-signing for everything the
        // in-flight commitment covered
        for entry in next
            .offered
            .values_mut()
            .chain(next.received.values_mut())
        {
            if entry.stage == HtlcStage::Signed {
                entry.stage = HtlcStage::Acked;
            }
        }
        Ok(next)
    }

    /// Registers the next per-commitment point disclosed by the remote node
    /// in `funding_locked`
    pub fn set_remote_next_point(&mut self, point: PublicKey) {
        self.remote_next_per_commitment_point = point;
    }

    /// Commitment number of the next `commitment_signed` we expect to
    /// receive (the `channel_reestablish` field)
    pub fn next_local_commitment_number(&self) -> u64 {
        self.local_commitment_number + 1
    }

    /// Commitment number of the next `revoke_and_ack` we expect to receive
    pub fn next_revocation_number(&self) -> u64 {
        self.remote_secrets
            .latest_revoked_commitment()
            .map(|n| n + 1)
            .unwrap_or(0)
    }
}

// ------------------------------------------------------------------------
// Signature plumbing

fn sighash_all(
    psbt: &Psbt,
    witness_script: &WitnessScript,
    value: u64,
    sighash_type: EcdsaSighashType,
) -> Message {
    let tx = psbt.clone().into_unsigned_tx();
    let mut cache = SighashCache::new(&tx);
    let sighash = cache
        .segwit_signature_hash(
            0,
            &witness_script.to_inner(),
            value,
            sighash_type,
        )
        .expect("input zero always exists in channel transactions");
    Message::from_slice(&sighash[..]).expect("sighash is a valid message")
}

/// Signs the commitment transaction with the funding key
pub fn sign_commitment(
    commitment: &CommitmentTx,
    funding: &Funding,
    funding_seckey: &SecretKey,
) -> Signature {
    let msg = sighash_all(
        &commitment.psbt,
        &commitment.funding_script,
        funding.amount(),
        EcdsaSighashType::All,
    );
    SECP256K1.sign_ecdsa(&msg, funding_seckey)
}

/// Verifies the counterparty signature on a commitment transaction
pub fn verify_commitment_sig(
    commitment: &CommitmentTx,
    funding: &Funding,
    signature: &Signature,
    funding_pubkey: PublicKey,
) -> Result<(), ChannelError> {
    let msg = sighash_all(
        &commitment.psbt,
        &commitment.funding_script,
        funding.amount(),
        EcdsaSighashType::All,
    );
    SECP256K1
        .verify_ecdsa(&msg, signature, &funding_pubkey)
        .map_err(|_| ChannelError::InvalidCommitmentSignature)
}

/// Signs an arbitrary single-input spend of the funding output (the
/// cooperative closing transaction) with the funding key
pub fn sign_funding_spend(
    psbt: &Psbt,
    funding: &Funding,
    funding_script: &WitnessScript,
    funding_seckey: &SecretKey,
) -> Signature {
    let msg = sighash_all(
        psbt,
        funding_script,
        funding.amount(),
        EcdsaSighashType::All,
    );
    SECP256K1.sign_ecdsa(&msg, funding_seckey)
}

/// Verifies a counterparty signature over a funding-output spend
pub fn verify_funding_spend(
    psbt: &Psbt,
    funding: &Funding,
    funding_script: &WitnessScript,
    signature: &Signature,
    funding_pubkey: PublicKey,
) -> Result<(), ChannelError> {
    let msg = sighash_all(
        psbt,
        funding_script,
        funding.amount(),
        EcdsaSighashType::All,
    );
    SECP256K1
        .verify_ecdsa(&msg, signature, &funding_pubkey)
        .map_err(|_| ChannelError::InvalidCommitmentSignature)
}

/// Signs a second-stage HTLC transaction with the per-commitment HTLC key.
/// HTLC transactions use `SIGHASH_SINGLE | SIGHASH_ANYONECANPAY` so they
/// can be fee-bumped by appending inputs and outputs.
pub fn sign_htlc_tx(htlc_tx: &HtlcTx, htlc_seckey: &SecretKey) -> Signature {
    let msg = sighash_all(
        &htlc_tx.psbt,
        &htlc_tx.redeem_script,
        htlc_tx.amount_msat / 1000,
        EcdsaSighashType::SinglePlusAnyoneCanPay,
    );
    SECP256K1.sign_ecdsa(&msg, htlc_seckey)
}

/// Verifies a counterparty HTLC transaction signature
pub fn verify_htlc_sig(
    htlc_tx: &HtlcTx,
    signature: &Signature,
    htlc_pubkey: PublicKey,
) -> Result<(), secp256k1::Error> {
    let msg = sighash_all(
        &htlc_tx.psbt,
        &htlc_tx.redeem_script,
        htlc_tx.amount_msat / 1000,
        EcdsaSighashType::SinglePlusAnyoneCanPay,
    );
    SECP256K1.verify_ecdsa(&msg, signature, &htlc_pubkey)
}
