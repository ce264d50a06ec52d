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

//! The per-channel state machine.
//!
//! One [`ChannelMachine`] value exists per channel and must be driven by a
//! single consumer: the host delivers events from the channel's serial
//! queue and executes the returned actions in order. Transitions are
//! synchronous and never wait for other actors; responses from the wallet,
//! the watcher and the peer arrive as fresh events.
//!
//! Action ordering within a transition is part of the contract: a
//! [`Action::Persist`] always precedes any message send or broadcast which
//! would release a secret or commit the channel irreversibly.

use amplify::{Slice32, Wrapper};
use bitcoin::{Transaction, Txid};
use bitcoin_scripts::hlc::{HashLock, HashPreimage};
use bitcoin_scripts::{PubkeyScript, WitnessScript};
use lnwire::bolt1;
use lnwire::bolt2::*;
use lnwire::{ActiveChannelId, ChannelId, Messages};
use wallet::psbt::Psbt;

use crate::close::{
    self, closing_tx, respond_to_local_commit, respond_to_remote_commit,
    respond_to_revoked_commit, ClosingNegotiation, NegotiationStep,
    OnChainClose, CLOSING_CONFIRMATION_DEPTH, CLOSING_TX_WEIGHT,
};
use crate::commitments::{
    sign_commitment, sign_funding_spend, sign_htlc_tx, verify_commitment_sig,
    verify_funding_spend, ChannelDirection, ChannelError, Commitments,
};
use crate::funding::{Funding, PsbtChannelFunding};
use crate::htlc::weight_to_fee;
use crate::keyset::{derive_seckey, ChannelDerivation, RemoteKeyset};
use crate::origin::{Origin, Upstream};
use crate::scripts::ScriptGenerators;
use crate::state::{
    ChannelData, ChannelState, NegotiatedData, PreopenData, RemoteAhead,
};
use crate::wallet::{WalletError, WalletResponse};
use crate::watch::{WatchEvent, WatchHint, WatchRequest};

/// User commands consumed by the channel queue
#[derive(Clone, Debug, Display)]
pub enum Command {
    /// Open the channel towards the connected peer (funder side)
    #[display("open({funding_satoshis})")]
    Open {
        funding_satoshis: u64,
        push_msat: u64,
        origin: Origin,
    },

    /// Offer a new HTLC
    #[display("add_htlc({amount_msat})")]
    AddHtlc {
        amount_msat: u64,
        payment_hash: HashLock,
        cltv_expiry: u32,
        onion: OnionPacket,
        origin: Origin,
    },

    /// Settle a received HTLC with its preimage
    #[display("fulfill_htlc({htlc_id})")]
    FulfillHtlc {
        htlc_id: u64,
        preimage: HashPreimage,
    },

    /// Fail a received HTLC
    #[display("fail_htlc({htlc_id})")]
    FailHtlc { htlc_id: u64, reason: Vec<u8> },

    /// Propose a feerate change (funder only)
    #[display("update_fee({feerate_per_kw})")]
    UpdateFee { feerate_per_kw: u32 },

    /// Commit to all pending updates
    #[display("sign")]
    Sign,

    /// Begin cooperative close
    #[display("close")]
    Close {
        script_pubkey: Option<PubkeyScript>,
    },

    /// Immediately publish the current commitment
    #[display("force_close")]
    ForceClose,
}

/// Timer events
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Timer {
    /// The channel opening did not reach funding confirmation in time
    #[display("channel_open_timeout")]
    ChannelOpenTimeout,
}

/// Everything a channel consumes, in one serial queue
#[derive(Clone, Debug)]
pub enum Event {
    /// Wire message from the peer
    Message(Messages),
    /// Local user command
    Command(Command),
    /// Blockchain watcher notification
    Watch(WatchEvent),
    /// Funding wallet round-trip result
    Wallet(WalletResponse),
    /// Timer tick
    Timer(Timer),
    /// The peer connection dropped
    Disconnected,
    /// The peer connection is back
    Reconnected,
}

/// Side-table records appended by transitions; the payments and audit
/// databases are multi-writer and append-only
#[derive(Clone, PartialEq, Eq, Debug, Display)]
pub enum SideRecord {
    /// Payment resolution record
    #[display("payment({channel_id}, {htlc_id}, {amount_msat}, {outcome})")]
    Payment {
        channel_id: ChannelId,
        htlc_id: u64,
        amount_msat: u64,
        outcome: PaymentOutcome,
    },

    /// Free-form audit trail entry
    #[display("audit({0})")]
    Audit(String),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum PaymentOutcome {
    #[display("settled")]
    Settled,
    #[display("failed")]
    Failed,
}

/// Notifications delivered to command originators and the host
#[derive(Clone, Debug, Display)]
pub enum Notification {
    /// channel opening failed: {reason}
    #[display("open_failed({reason})")]
    OpenFailed {
        origin: Option<Origin>,
        reason: String,
    },

    /// the channel is operational
    #[display("channel_opened({channel_id})")]
    ChannelOpened { channel_id: ChannelId },

    /// an offered HTLC was settled downstream
    #[display("htlc_settled({htlc_id})")]
    HtlcSettled {
        htlc_id: u64,
        preimage: HashPreimage,
        origin: Option<Origin>,
    },

    /// an offered HTLC failed downstream
    #[display("htlc_failed({htlc_id})")]
    HtlcFailed {
        htlc_id: u64,
        reason: Vec<u8>,
        origin: Option<Origin>,
    },

    /// a command could not be executed; the channel continues unaffected
    #[display("command_failed({reason})")]
    CommandFailed { reason: String },

    /// the channel reached its terminal state
    #[display("channel_closed")]
    ChannelClosed {
        channel_id: Option<ChannelId>,
        spending_txid: Option<Txid>,
    },
}

/// Calls the host must perform against the funding wallet
#[derive(Clone, Debug, Display)]
pub enum WalletCall {
    /// construct the funding transaction
    #[display("make_funding_tx({amount})")]
    MakeFundingTx {
        script: PubkeyScript,
        amount: u64,
        feerate_per_kw: u32,
    },

    /// commit and broadcast the funding transaction
    #[display("commit")]
    Commit(Psbt),

    /// roll back a never-broadcast funding transaction
    #[display("rollback")]
    Rollback(Psbt),

    /// mark the UTXOs of an abandoned funding transaction as reusable
    #[display("abandon({0})")]
    Abandon(Txid),
}

/// Effects of a transition, executed by the host in order
#[derive(Clone, Debug, Display)]
pub enum Action {
    /// Write the machine state to the channels database. Must complete
    /// before any subsequent action of the same transition is executed.
    #[display("persist")]
    Persist,

    /// Transmit a message to the peer
    #[display("send({0})")]
    Send(Messages),

    /// Register a watch with the blockchain watcher
    #[display("watch({0})")]
    Watch(WatchRequest),

    /// Perform a wallet call
    #[display("wallet({0})")]
    Wallet(WalletCall),

    /// Broadcast a channel transaction (the host signer finalizes
    /// witnesses)
    #[display("broadcast")]
    Broadcast(Psbt),

    /// Deliver a notification to the command originator / host
    #[display("notify({0})")]
    Notify(Notification),

    /// Append to the payments or audit side tables
    #[display("side_table({0})")]
    SideTable(SideRecord),
}

/// The channel state machine
pub struct ChannelMachine {
    state: ChannelState,
    derivation: ChannelDerivation,
    /// Destination for unilateral-close sweeps
    sweep_destination: PubkeyScript,
    /// Local feerate estimate used to judge `update_fee` and closing fees
    feerate_estimate: u32,
    /// Origin of the channel-open command, notified on failure
    open_origin: Option<Origin>,
    /// `funding_locked` received before our own funding confirmation
    early_funding_locked: Option<FundingLocked>,
}

impl ChannelMachine {
    /// Creates a funder-side machine; channel opening starts with
    /// [`Command::Open`]
    pub fn new_outbound(
        preopen: PreopenData,
        derivation: ChannelDerivation,
        sweep_destination: PubkeyScript,
        feerate_estimate: u32,
    ) -> ChannelMachine {
        ChannelMachine {
            state: ChannelState::WaitForOpenChannel { preopen },
            derivation,
            sweep_destination,
            feerate_estimate,
            open_origin: None,
            early_funding_locked: None,
        }
    }

    /// Creates a fundee-side machine ready to accept `open_channel`
    pub fn new_inbound(
        preopen: PreopenData,
        derivation: ChannelDerivation,
        sweep_destination: PubkeyScript,
        feerate_estimate: u32,
    ) -> ChannelMachine {
        ChannelMachine {
            state: ChannelState::WaitForOpenChannel { preopen },
            derivation,
            sweep_destination,
            feerate_estimate,
            open_origin: None,
            early_funding_locked: None,
        }
    }

    /// Restores a machine from its persisted state; called at node
    /// startup, after which the host delivers [`Event::Reconnected`] once
    /// the peer connection is back
    pub fn restore(
        state: ChannelState,
        derivation: ChannelDerivation,
        sweep_destination: PubkeyScript,
        feerate_estimate: u32,
    ) -> ChannelMachine {
        let state = match state {
            // a restart always begins offline
            offline @ ChannelState::Offline { .. } => offline,
            other if other.has_commitments() && !other.is_closed() => {
                ChannelState::Offline {
                    inner: Box::new(other),
                }
            }
            other => other,
        };
        ChannelMachine {
            state,
            derivation,
            sweep_destination,
            feerate_estimate,
            open_origin: None,
            early_funding_locked: None,
        }
    }

    #[inline]
    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    #[inline]
    pub fn update_feerate_estimate(&mut self, feerate_per_kw: u32) {
        self.feerate_estimate = feerate_per_kw;
    }

    /// Consumes the next event from the channel queue.
    ///
    /// Local command errors surface as [`Notification::CommandFailed`];
    /// remote protocol violations send a wire error and force-close; the
    /// machine never panics on adversarial input.
    pub fn process(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::Command(command) => match self.handle_command(command) {
                Ok(actions) => actions,
                Err(err) => {
                    vec![Action::Notify(Notification::CommandFailed {
                        reason: err.to_string(),
                    })]
                }
            },
            Event::Message(message) => match self.handle_message(message) {
                Ok(actions) => actions,
                Err(err) => self.abort_on_protocol_error(err),
            },
            Event::Watch(event) => self.handle_watch(event),
            Event::Wallet(response) => self.handle_wallet(response),
            Event::Timer(timer) => self.handle_timer(timer),
            Event::Disconnected => self.handle_disconnect(),
            Event::Reconnected => self.handle_reconnect(),
        }
    }

    fn channel_id(&self) -> ChannelId {
        self.state
            .active_channel_id()
            .and_then(|id| id.channel_id())
            .unwrap_or_default()
    }

    // ----------------------------------------------------------------
    // Commands

    fn handle_command(
        &mut self,
        command: Command,
    ) -> Result<Vec<Action>, ChannelError> {
        match command {
            Command::Open {
                funding_satoshis,
                push_msat,
                origin,
            } => self.cmd_open(funding_satoshis, push_msat, origin),
            Command::AddHtlc {
                amount_msat,
                payment_hash,
                cltv_expiry,
                onion,
                origin,
            } => self.cmd_add_htlc(
                amount_msat,
                payment_hash,
                cltv_expiry,
                onion,
                origin,
            ),
            Command::FulfillHtlc { htlc_id, preimage } => {
                self.cmd_fulfill(htlc_id, preimage)
            }
            Command::FailHtlc { htlc_id, reason } => {
                self.cmd_fail(htlc_id, reason)
            }
            Command::UpdateFee { feerate_per_kw } => {
                self.cmd_update_fee(feerate_per_kw)
            }
            Command::Sign => self.cmd_sign(),
            Command::Close { script_pubkey } => {
                self.cmd_close(script_pubkey)
            }
            Command::ForceClose => {
                Ok(self.force_close("force-close command"))
            }
        }
    }

    fn cmd_open(
        &mut self,
        funding_satoshis: u64,
        push_msat: u64,
        origin: Origin,
    ) -> Result<Vec<Action>, ChannelError> {
        let preopen = match &self.state {
            ChannelState::WaitForOpenChannel { preopen } => preopen.clone(),
            _ => return Err(ChannelError::WrongState),
        };
        self.open_origin = Some(origin);

        let temp_channel_id = preopen
            .active_channel_id
            .temp_channel_id()
            .expect("pre-open state always has a temporary channel id");
        let local_params = preopen.local_params;
        let common = preopen.common_params;
        let keys = &preopen.local_keys;
        let message = OpenChannel {
            chain_hash: preopen.chain_hash,
            temporary_channel_id: temp_channel_id,
            funding_satoshis,
            push_msat,
            dust_limit_satoshis: local_params.dust_limit,
            max_htlc_value_in_flight_msat: local_params.htlc_in_flight_max_msat,
            channel_reserve_satoshis: local_params.reserve_sat,
            htlc_minimum_msat: local_params.htlc_minimum_msat,
            feerate_per_kw: common.feerate_per_kw,
            to_self_delay: local_params.to_self_delay,
            max_accepted_htlcs: local_params.htlc_slots_max,
            funding_pubkey: keys.funding_pubkey.key,
            revocation_basepoint: keys.revocation_basepoint.key,
            payment_point: keys.payment_basepoint.key,
            delayed_payment_basepoint: keys.delayed_payment_basepoint.key,
            htlc_basepoint: keys.htlc_basepoint.key,
            first_per_commitment_point: keys.first_per_commitment_point.key,
            channel_flags: common.announce_channel as u8,
            shutdown_scriptpubkey: keys.shutdown_scriptpubkey.clone(),
            channel_type: common.channel_type.into_option(),
            unknown_tlvs: none!(),
        };

        self.state = ChannelState::WaitForAcceptChannel {
            preopen,
            funding_satoshis,
            push_msat,
        };
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::OpenChannel(message)),
        ])
    }

    fn cmd_add_htlc(
        &mut self,
        amount_msat: u64,
        payment_hash: HashLock,
        cltv_expiry: u32,
        onion: OnionPacket,
        origin: Origin,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let data = match &mut self.state {
            ChannelState::Normal {
                data,
                local_shutdown: None,
                remote_shutdown: None,
            } => data,
            _ => return Err(ChannelError::WrongState),
        };
        let (next, message) = data.commitments.send_add(
            amount_msat,
            payment_hash,
            cltv_expiry,
            onion,
            Some(origin),
            channel_id,
        )?;
        data.commitments = next;
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::UpdateAddHtlc(message)),
        ])
    }

    fn cmd_fulfill(
        &mut self,
        htlc_id: u64,
        preimage: HashPreimage,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let data = self
            .state
            .channel_data_mut()
            .ok_or(ChannelError::WrongState)?;
        let (next, message) =
            data.commitments.send_fulfill(htlc_id, preimage, channel_id)?;
        let amount_msat = next.resolved()[&htlc_id].amount_msat;
        data.commitments = next;
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::UpdateFulfillHtlc(message)),
            Action::SideTable(SideRecord::Payment {
                channel_id,
                htlc_id,
                amount_msat,
                outcome: PaymentOutcome::Settled,
            }),
        ])
    }

    fn cmd_fail(
        &mut self,
        htlc_id: u64,
        reason: Vec<u8>,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let data = self
            .state
            .channel_data_mut()
            .ok_or(ChannelError::WrongState)?;
        let (next, message) =
            data.commitments.send_fail(htlc_id, reason, channel_id)?;
        data.commitments = next;
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::UpdateFailHtlc(message)),
            Action::SideTable(SideRecord::Payment {
                channel_id,
                htlc_id,
                amount_msat: 0,
                outcome: PaymentOutcome::Failed,
            }),
        ])
    }

    fn cmd_update_fee(
        &mut self,
        feerate_per_kw: u32,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let data = match &mut self.state {
            ChannelState::Normal { data, .. } => data,
            _ => return Err(ChannelError::WrongState),
        };
        let (next, message) =
            data.commitments.send_fee(feerate_per_kw, channel_id)?;
        data.commitments = next;
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::UpdateFee(message)),
        ])
    }

    fn cmd_sign(&mut self) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let derivation = self.derivation.clone();
        let data = self
            .state
            .channel_data_mut()
            .ok_or(ChannelError::WrongState)?;
        let (next, message) = data.commitments.send_commitment(
            &data.funding,
            &data.local_keys,
            &data.remote_keys,
            &derivation.funding_seckey,
            &derivation.htlc_base_seckey,
            channel_id,
        )?;
        data.commitments = next;
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::CommitmentSigned(message)),
        ])
    }

    fn cmd_close(
        &mut self,
        script_pubkey: Option<PubkeyScript>,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let fallback = self.sweep_destination.clone();
        let shutdown = match &mut self.state {
            ChannelState::Normal {
                data,
                local_shutdown,
                ..
            } if local_shutdown.is_none() => {
                let script = script_pubkey
                    .or_else(|| {
                        data.local_keys.shutdown_scriptpubkey.clone()
                    })
                    .unwrap_or(fallback);
                *local_shutdown = Some(script.clone());
                Shutdown {
                    channel_id,
                    scriptpubkey: script,
                }
            }
            _ => return Err(ChannelError::WrongState),
        };
        let mut actions = vec![
            Action::Persist,
            Action::Send(Messages::Shutdown(shutdown)),
        ];
        actions.extend(self.try_advance_shutdown());
        Ok(actions)
    }

    // ----------------------------------------------------------------
    // Peer messages

    fn handle_message(
        &mut self,
        message: Messages,
    ) -> Result<Vec<Action>, ChannelError> {
        match message {
            Messages::OpenChannel(msg) => self.on_open_channel(msg),
            Messages::AcceptChannel(msg) => self.on_accept_channel(msg),
            Messages::FundingCreated(msg) => self.on_funding_created(msg),
            Messages::FundingSigned(msg) => self.on_funding_signed(msg),
            Messages::FundingLocked(msg) => self.on_funding_locked(msg),
            Messages::UpdateAddHtlc(msg) => self.on_update_add_htlc(msg),
            Messages::UpdateFulfillHtlc(msg) => self.on_update_fulfill(msg),
            Messages::UpdateFailHtlc(msg) => self.on_update_fail(msg),
            Messages::UpdateFailMalformedHtlc(msg) => {
                let substitute = UpdateFailHtlc {
                    channel_id: msg.channel_id,
                    htlc_id: msg.htlc_id,
                    reason: msg.failure_code.to_be_bytes().to_vec(),
                };
                self.on_update_fail(substitute)
            }
            Messages::CommitmentSigned(msg) => {
                self.on_commitment_signed(msg)
            }
            Messages::RevokeAndAck(msg) => self.on_revoke_and_ack(msg),
            Messages::UpdateFee(msg) => self.on_update_fee(msg),
            Messages::Shutdown(msg) => self.on_shutdown(msg),
            Messages::ClosingSigned(msg) => self.on_closing_signed(msg),
            Messages::ChannelReestablish(msg) => self.on_reestablish(msg),
            Messages::Error(_) => {
                // the peer already considers the channel failed
                Ok(self.force_close("peer error message"))
            }
            // BOLT-1 connection-level messages are handled by the peer
            // connection manager; ignoring them here is safe
            _ => Ok(vec![]),
        }
    }

    fn on_open_channel(
        &mut self,
        msg: OpenChannel,
    ) -> Result<Vec<Action>, ChannelError> {
        let preopen = match &self.state {
            ChannelState::WaitForOpenChannel { preopen } => preopen.clone(),
            _ => return Ok(vec![]), // not for us at this stage
        };
        let remote_params = preopen.policy.validate_open_channel(&msg)?;
        let remote_keys = RemoteKeyset::from(&msg);

        let mut preopen = preopen;
        preopen.active_channel_id =
            ActiveChannelId::Temporary(msg.temporary_channel_id);
        preopen.common_params.feerate_per_kw = msg.feerate_per_kw;
        preopen.common_params.channel_type =
            msg.channel_type.unwrap_or_default();
        let local_params = preopen.local_params;
        let keys = preopen.local_keys.clone();
        let minimum_depth = preopen.policy.minimum_depth;

        let accept = AcceptChannel {
            temporary_channel_id: msg.temporary_channel_id,
            dust_limit_satoshis: local_params.dust_limit,
            max_htlc_value_in_flight_msat: local_params.htlc_in_flight_max_msat,
            channel_reserve_satoshis: local_params.reserve_sat,
            htlc_minimum_msat: local_params.htlc_minimum_msat,
            minimum_depth,
            to_self_delay: local_params.to_self_delay,
            max_accepted_htlcs: local_params.htlc_slots_max,
            funding_pubkey: keys.funding_pubkey.key,
            revocation_basepoint: keys.revocation_basepoint.key,
            payment_point: keys.payment_basepoint.key,
            delayed_payment_basepoint: keys.delayed_payment_basepoint.key,
            htlc_basepoint: keys.htlc_basepoint.key,
            first_per_commitment_point: keys.first_per_commitment_point.key,
            shutdown_scriptpubkey: keys.shutdown_scriptpubkey.clone(),
            channel_type: msg.channel_type,
            unknown_tlvs: none!(),
        };

        self.state = ChannelState::WaitForFundingCreated {
            negotiated: NegotiatedData {
                preopen,
                remote_params,
                remote_keys,
                funding_satoshis: msg.funding_satoshis,
                push_msat: msg.push_msat,
                minimum_depth,
            },
        };
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::AcceptChannel(accept)),
        ])
    }

    fn on_accept_channel(
        &mut self,
        msg: AcceptChannel,
    ) -> Result<Vec<Action>, ChannelError> {
        let (preopen, funding_satoshis, push_msat) = match &self.state {
            ChannelState::WaitForAcceptChannel {
                preopen,
                funding_satoshis,
                push_msat,
            } => (preopen.clone(), *funding_satoshis, *push_msat),
            _ => return Ok(vec![]),
        };
        let remote_params = preopen
            .policy
            .validate_accept_channel(preopen.local_params, &msg)?;
        let remote_keys = RemoteKeyset::from(&msg);

        let funding_script = PubkeyScript::ln_funding(
            funding_satoshis,
            &preopen.local_keys.funding_pubkey,
            remote_keys.funding_pubkey,
        );
        let feerate = preopen.common_params.feerate_per_kw;
        let minimum_depth = msg.minimum_depth;

        self.state = ChannelState::WaitForFundingInternal {
            negotiated: NegotiatedData {
                preopen,
                remote_params,
                remote_keys,
                funding_satoshis,
                push_msat,
                minimum_depth,
            },
        };
        Ok(vec![
            Action::Persist,
            Action::Wallet(WalletCall::MakeFundingTx {
                script: funding_script,
                amount: funding_satoshis,
                feerate_per_kw: feerate,
            }),
        ])
    }

    fn on_funding_created(
        &mut self,
        msg: FundingCreated,
    ) -> Result<Vec<Action>, ChannelError> {
        let negotiated = match &self.state {
            ChannelState::WaitForFundingCreated { negotiated } => {
                negotiated.clone()
            }
            _ => return Ok(vec![]),
        };
        let funding = Funding::with_outpoint(
            msg.funding_txid,
            msg.funding_output_index,
            negotiated.funding_satoshis,
        );
        let channel_id =
            ChannelId::with(msg.funding_txid, msg.funding_output_index);

        let commitments = Commitments::with(
            ChannelDirection::Inbound,
            negotiated.funding_satoshis,
            negotiated.push_msat,
            negotiated.preopen.common_params.feerate_per_kw,
            negotiated.preopen.local_params,
            negotiated.remote_params,
            self.derivation.commitment_seed.point(0),
            negotiated.remote_keys.first_per_commitment_point,
        );

        // their signature covers our first commitment
        let local_keys = negotiated.preopen.local_keys.clone();
        let local_commitment = commitments.commitment_tx(
            &funding,
            &local_keys,
            &negotiated.remote_keys,
            true,
            0,
            self.derivation.commitment_seed.point(0),
        );
        verify_commitment_sig(
            &local_commitment,
            &funding,
            &msg.signature,
            negotiated.remote_keys.funding_pubkey,
        )?;

        // we sign their first commitment
        let remote_commitment = commitments.commitment_tx(
            &funding,
            &local_keys,
            &negotiated.remote_keys,
            false,
            0,
            negotiated.remote_keys.first_per_commitment_point,
        );
        let signature = sign_commitment(
            &remote_commitment,
            &funding,
            &self.derivation.funding_seckey,
        );

        let funding_txid = funding.txid();
        let minimum_depth = negotiated.minimum_depth;
        let data = ChannelData {
            active_channel_id: ActiveChannelId::Static(channel_id),
            chain_hash: negotiated.preopen.chain_hash,
            policy: negotiated.preopen.policy.clone(),
            common_params: negotiated.preopen.common_params,
            local_keys,
            remote_keys: negotiated.remote_keys.clone(),
            funding,
            commitments,
            short_channel_id: None,
            minimum_depth,
        };
        self.state = ChannelState::WaitForFundingConfirmed {
            data,
            funding_broadcast: false,
        };
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::FundingSigned(FundingSigned {
                channel_id,
                signature,
            })),
            Action::Watch(WatchRequest::Confirmed {
                txid: funding_txid,
                min_depth: minimum_depth,
                hint: WatchHint::Funding,
            }),
        ])
    }

    fn on_funding_signed(
        &mut self,
        msg: FundingSigned,
    ) -> Result<Vec<Action>, ChannelError> {
        let data = match &self.state {
            ChannelState::WaitForFundingSigned { data } => data.clone(),
            _ => return Ok(vec![]),
        };
        let local_commitment = data.commitments.local_commitment(
            &data.funding,
            &data.local_keys,
            &data.remote_keys,
        );
        verify_commitment_sig(
            &local_commitment,
            &data.funding,
            &msg.signature,
            data.remote_keys.funding_pubkey,
        )?;

        let funding_psbt = data.funding.psbt().clone();
        let funding_txid = data.funding.txid();
        let minimum_depth = data.minimum_depth;
        self.state = ChannelState::WaitForFundingConfirmed {
            data,
            funding_broadcast: true,
        };
        Ok(vec![
            Action::Persist,
            Action::Wallet(WalletCall::Commit(funding_psbt)),
            Action::Watch(WatchRequest::Confirmed {
                txid: funding_txid,
                min_depth: minimum_depth,
                hint: WatchHint::Funding,
            }),
        ])
    }

    fn on_funding_locked(
        &mut self,
        msg: FundingLocked,
    ) -> Result<Vec<Action>, ChannelError> {
        match &mut self.state {
            ChannelState::WaitForFundingConfirmed { .. } => {
                // remote node confirmed earlier than us; replay after our
                // own confirmation
                self.early_funding_locked = Some(msg);
                Ok(vec![])
            }
            ChannelState::WaitForFundingLocked { data } => {
                data.commitments
                    .set_remote_next_point(msg.next_per_commitment_point);
                let channel_id = data
                    .channel_id()
                    .expect("funded channel always has a final id");
                let data = data.clone();
                self.state = ChannelState::Normal {
                    data,
                    local_shutdown: None,
                    remote_shutdown: None,
                };
                Ok(vec![
                    Action::Persist,
                    Action::Notify(Notification::ChannelOpened {
                        channel_id,
                    }),
                ])
            }
            _ => Ok(vec![]),
        }
    }

    fn on_update_add_htlc(
        &mut self,
        msg: UpdateAddHtlc,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let data = match &mut self.state {
            ChannelState::Normal {
                data,
                remote_shutdown: None,
                ..
            } => data,
            // adding HTLCs after shutdown is a protocol violation
            ChannelState::Normal { .. }
            | ChannelState::ShuttingDown { .. } => {
                return Err(ChannelError::WrongState)
            }
            _ => return Ok(vec![]),
        };
        let origin = Origin::Cold(Upstream::Relayed {
            channel_id,
            htlc_id: msg.htlc_id,
            amount_in_msat: msg.amount_msat,
            amount_out_msat: msg.amount_msat,
        });
        data.commitments = data.commitments.receive_add(&msg, origin)?;
        Ok(vec![Action::Persist])
    }

    fn on_update_fulfill(
        &mut self,
        msg: UpdateFulfillHtlc,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let data = self
            .state
            .channel_data_mut()
            .ok_or(ChannelError::UnknownHtlc(msg.htlc_id))?;
        let (next, resolved) = data.commitments.receive_fulfill(&msg)?;
        data.commitments = next;
        Ok(vec![
            Action::Persist,
            Action::Notify(Notification::HtlcSettled {
                htlc_id: msg.htlc_id,
                preimage: msg.payment_preimage,
                origin: resolved.origin.clone(),
            }),
            Action::SideTable(SideRecord::Payment {
                channel_id,
                htlc_id: msg.htlc_id,
                amount_msat: resolved.htlc.amount_msat,
                outcome: PaymentOutcome::Settled,
            }),
        ])
    }

    fn on_update_fail(
        &mut self,
        msg: UpdateFailHtlc,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let data = self
            .state
            .channel_data_mut()
            .ok_or(ChannelError::UnknownHtlc(msg.htlc_id))?;
        let (next, resolved) = data.commitments.receive_fail(&msg)?;
        data.commitments = next;
        Ok(vec![
            Action::Persist,
            Action::Notify(Notification::HtlcFailed {
                htlc_id: msg.htlc_id,
                reason: msg.reason.clone(),
                origin: resolved.origin.clone(),
            }),
            Action::SideTable(SideRecord::Payment {
                channel_id,
                htlc_id: msg.htlc_id,
                amount_msat: resolved.htlc.amount_msat,
                outcome: PaymentOutcome::Failed,
            }),
        ])
    }

    fn on_commitment_signed(
        &mut self,
        msg: CommitmentSigned,
    ) -> Result<Vec<Action>, ChannelError> {
        let derivation = self.derivation.clone();
        let data = self
            .state
            .channel_data_mut()
            .ok_or(ChannelError::WrongState)?;
        let (next, revocation) = data.commitments.receive_commitment(
            &msg,
            &data.funding,
            &data.local_keys,
            &data.remote_keys,
            &derivation.commitment_seed,
        )?;
        data.commitments = next;
        // the revocation secret leaves the node only after the new state
        // is durably persisted
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::RevokeAndAck(revocation)),
        ])
    }

    fn on_revoke_and_ack(
        &mut self,
        msg: RevokeAndAck,
    ) -> Result<Vec<Action>, ChannelError> {
        let data = self
            .state
            .channel_data_mut()
            .ok_or(ChannelError::UnexpectedRevocation)?;
        data.commitments = data.commitments.receive_revocation(&msg)?;
        let mut actions = vec![Action::Persist];
        actions.extend(self.try_advance_shutdown());
        Ok(actions)
    }

    fn on_update_fee(
        &mut self,
        msg: UpdateFee,
    ) -> Result<Vec<Action>, ChannelError> {
        let estimate = self.feerate_estimate;
        let data = match &mut self.state {
            ChannelState::Normal { data, .. }
            | ChannelState::ShuttingDown { data, .. } => data,
            _ => return Ok(vec![]),
        };
        data.commitments =
            data.commitments.receive_fee(&msg, &data.policy, estimate)?;
        Ok(vec![Action::Persist])
    }

    fn on_shutdown(
        &mut self,
        msg: Shutdown,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let fallback = self.sweep_destination.clone();
        let own_shutdown = match &mut self.state {
            ChannelState::Normal {
                data,
                local_shutdown,
                remote_shutdown,
            } => {
                *remote_shutdown = Some(msg.scriptpubkey.clone());
                if local_shutdown.is_none() {
                    let script = data
                        .local_keys
                        .shutdown_scriptpubkey
                        .clone()
                        .unwrap_or(fallback);
                    *local_shutdown = Some(script.clone());
                    Some(Shutdown {
                        channel_id,
                        scriptpubkey: script,
                    })
                } else {
                    None
                }
            }
            _ => return Ok(vec![]),
        };
        let mut actions = vec![Action::Persist];
        if let Some(shutdown) = own_shutdown {
            actions.push(Action::Send(Messages::Shutdown(shutdown)));
        }
        actions.extend(self.try_advance_shutdown());
        Ok(actions)
    }

    /// Moves `Normal` with both shutdown scripts and no in-flight HTLCs
    /// into fee negotiation; the funder makes the opening proposal
    fn try_advance_shutdown(&mut self) -> Vec<Action> {
        let channel_id = self.channel_id();
        let (data, local_script, remote_script) = match &self.state {
            ChannelState::Normal {
                data,
                local_shutdown: Some(local),
                remote_shutdown: Some(remote),
            } if data.commitments.offered().is_empty()
                && data.commitments.received().is_empty() =>
            {
                (data.clone(), local.clone(), remote.clone())
            }
            _ => return vec![],
        };

        let fee_estimate =
            weight_to_fee(CLOSING_TX_WEIGHT, self.feerate_estimate);
        let mut negotiation = ClosingNegotiation::start(
            local_script,
            remote_script,
            (fee_estimate / 2).max(1),
            fee_estimate * 2,
        );

        let mut actions = vec![Action::Persist];
        if data.commitments.direction().is_outbound() {
            let fee = negotiation.initial_proposal();
            let (_, signature) = self.closing_proposal(&data, &negotiation, fee);
            actions.push(Action::Send(Messages::ClosingSigned(
                ClosingSigned {
                    channel_id,
                    fee_satoshis: fee,
                    signature,
                },
            )));
        }
        self.state = ChannelState::Negotiating { data, negotiation };
        actions
    }

    /// Builds and signs the cooperative closing transaction at the given
    /// fee
    fn closing_proposal(
        &self,
        data: &ChannelData,
        negotiation: &ClosingNegotiation,
        fee: u64,
    ) -> (Psbt, secp256k1::ecdsa::Signature) {
        let funder_local = data.commitments.direction().is_outbound();
        let psbt = closing_tx(
            &data.funding,
            negotiation.local_script.clone(),
            negotiation.remote_script.clone(),
            data.commitments.local_amount_msat() / 1000,
            data.commitments.remote_amount_msat() / 1000,
            fee,
            funder_local,
            data.commitments.local_params().dust_limit,
        );
        let funding_script = WitnessScript::ln_funding(
            data.funding.amount(),
            &data.local_keys.funding_pubkey,
            data.remote_keys.funding_pubkey,
        );
        let signature = sign_funding_spend(
            &psbt,
            &data.funding,
            &funding_script,
            &self.derivation.funding_seckey,
        );
        (psbt, signature)
    }

    fn on_closing_signed(
        &mut self,
        msg: ClosingSigned,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let (data, mut negotiation) = match &self.state {
            ChannelState::Negotiating { data, negotiation } => {
                (data.clone(), negotiation.clone())
            }
            _ => return Ok(vec![]),
        };
        match negotiation.on_remote_proposal(msg.fee_satoshis) {
            NegotiationStep::Agree(fee) => {
                let (closing, signature) =
                    self.closing_proposal(&data, &negotiation, fee);
                // the remote signature must match the same transaction
                let funding_script = WitnessScript::ln_funding(
                    data.funding.amount(),
                    &data.local_keys.funding_pubkey,
                    data.remote_keys.funding_pubkey,
                );
                verify_funding_spend(
                    &closing,
                    &data.funding,
                    &funding_script,
                    &msg.signature,
                    data.remote_keys.funding_pubkey,
                )?;
                let txid = closing.to_txid();
                self.state = ChannelState::Closing {
                    data,
                    close: OnChainClose::Mutual { txid },
                };
                Ok(vec![
                    Action::Persist,
                    Action::Send(Messages::ClosingSigned(ClosingSigned {
                        channel_id,
                        fee_satoshis: fee,
                        signature,
                    })),
                    Action::Broadcast(closing),
                    Action::Watch(WatchRequest::Confirmed {
                        txid,
                        min_depth: CLOSING_CONFIRMATION_DEPTH,
                        hint: WatchHint::Closing,
                    }),
                ])
            }
            NegotiationStep::Propose(fee) => {
                let (_, signature) =
                    self.closing_proposal(&data, &negotiation, fee);
                self.state =
                    ChannelState::Negotiating { data, negotiation };
                Ok(vec![
                    Action::Persist,
                    Action::Send(Messages::ClosingSigned(ClosingSigned {
                        channel_id,
                        fee_satoshis: fee,
                        signature,
                    })),
                ])
            }
            NegotiationStep::Failed => {
                Ok(self.force_close("closing fee negotiation failed"))
            }
        }
    }

    // ----------------------------------------------------------------
    // Reestablishment

    fn on_reestablish(
        &mut self,
        msg: ChannelReestablish,
    ) -> Result<Vec<Action>, ChannelError> {
        let channel_id = self.channel_id();
        let derivation = self.derivation.clone();
        let data = match self.state.channel_data() {
            Some(data) => data.clone(),
            None => return Ok(vec![]),
        };
        let commitments = &data.commitments;
        let our_released = commitments.local_commitment_number();

        let mut actions = vec![];
        if msg.next_revocation_number + 1 == our_released {
            // peer is missing our last revocation: retransmit it
            let number = msg.next_revocation_number;
            actions.push(Action::Send(Messages::RevokeAndAck(
                RevokeAndAck {
                    channel_id,
                    per_commitment_secret: derivation
                        .commitment_seed
                        .secret(number),
                    next_per_commitment_point: derivation
                        .commitment_seed
                        .point(number + 2),
                },
            )));
        } else if msg.next_revocation_number > our_released {
            // They claim revocations we never produced. If they can show
            // our future secret, our state is stale: the only safe action
            // is waiting for their unilateral close.
            let claimed = derivation
                .commitment_seed
                .secret_bytes(msg.next_revocation_number - 1);
            if Slice32::from_inner(claimed)
                == msg.your_last_per_commitment_secret
            {
                self.state =
                    ChannelState::WaitForRemotePublishFutureCommitment {
                        data,
                        remote: RemoteAhead {
                            next_commitment_number: msg
                                .next_commitment_number,
                            next_revocation_number: msg
                                .next_revocation_number,
                            their_current_point: msg
                                .my_current_per_commitment_point,
                        },
                    };
                return Ok(vec![
                    Action::Persist,
                    Action::SideTable(SideRecord::Audit(s!(
                        "remote proved a future commitment; local state is \
                         stale, awaiting their unilateral close"
                    ))),
                ]);
            }
            return Err(ChannelError::RevocationSecretMismatch);
        } else if msg.next_revocation_number + 1 < our_released {
            // a revocation gap of more than one cannot be recovered
            return Err(ChannelError::UnexpectedRevocation);
        }

        if commitments.awaiting_remote_revocation()
            && msg.next_commitment_number
                == commitments.remote_commitment_number()
        {
            // peer never received our last commitment_signed: rebuild and
            // retransmit it
            let commitment = commitments.commitment_tx(
                &data.funding,
                &data.local_keys,
                &data.remote_keys,
                false,
                commitments.remote_commitment_number(),
                commitments.remote_next_per_commitment_point(),
            );
            let signature = sign_commitment(
                &commitment,
                &data.funding,
                &derivation.funding_seckey,
            );
            let htlc_seckey = derive_seckey(
                &derivation.htlc_base_seckey,
                commitments.remote_next_per_commitment_point(),
            );
            let htlc_signatures = commitment
                .htlc_txs
                .iter()
                .map(|htlc_tx| sign_htlc_tx(htlc_tx, &htlc_seckey))
                .collect();
            actions.push(Action::Send(Messages::CommitmentSigned(
                CommitmentSigned {
                    channel_id,
                    signature,
                    htlc_signatures,
                },
            )));
        } else if msg.next_commitment_number
            > commitments.remote_commitment_number() + 1
        {
            // they claim commitments we never signed
            return Err(ChannelError::NothingSigned);
        }

        Ok(actions)
    }

    fn handle_disconnect(&mut self) -> Vec<Action> {
        if matches!(
            self.state,
            ChannelState::Offline { .. }
                | ChannelState::Closed { .. }
                | ChannelState::WaitForInit
                | ChannelState::WaitForOpenChannel { .. }
        ) {
            return vec![];
        }
        if self.state.has_commitments() {
            let inner = std::mem::replace(
                &mut self.state,
                ChannelState::WaitForInit,
            );
            self.state = ChannelState::Offline {
                inner: Box::new(inner),
            };
            vec![Action::Persist]
        } else {
            // pre-funding negotiation does not survive disconnection
            let origin = self.open_origin.take();
            self.state = ChannelState::Closed {
                channel_id: None,
                spending_txid: None,
            };
            vec![
                Action::Persist,
                Action::Notify(Notification::OpenFailed {
                    origin,
                    reason: s!("peer disconnected during negotiation"),
                }),
            ]
        }
    }

    fn handle_reconnect(&mut self) -> Vec<Action> {
        let inner = match &mut self.state {
            ChannelState::Offline { inner } => std::mem::replace(
                inner.as_mut(),
                ChannelState::WaitForInit,
            ),
            _ => return vec![],
        };
        self.state = inner;
        let channel_id = self.channel_id();
        let commitments = match self.state.channel_data() {
            Some(data) => &data.commitments,
            None => return vec![],
        };
        let last_secret = commitments
            .remote_secrets()
            .latest_revoked_commitment()
            .and_then(|number| {
                commitments.remote_secrets().secret_for(number).ok()
            })
            .unwrap_or_default();
        let reestablish = ChannelReestablish {
            channel_id,
            next_commitment_number: commitments
                .next_local_commitment_number(),
            next_revocation_number: commitments.next_revocation_number(),
            your_last_per_commitment_secret: last_secret,
            my_current_per_commitment_point: commitments
                .local_per_commitment_point(),
        };
        vec![
            Action::Persist,
            Action::Send(Messages::ChannelReestablish(reestablish)),
        ]
    }

    // ----------------------------------------------------------------
    // Chain events, wallet, timers

    fn handle_watch(&mut self, event: WatchEvent) -> Vec<Action> {
        match event {
            WatchEvent::Confirmed {
                txid,
                hint: WatchHint::Funding,
                ..
            } => self.on_funding_confirmed(txid),
            WatchEvent::Confirmed {
                txid,
                hint: WatchHint::Closing,
                ..
            } => self.on_closing_confirmed(txid),
            WatchEvent::Confirmed { .. } => vec![],
            WatchEvent::Spent {
                outpoint,
                spending_tx,
            } => self.on_spent(outpoint, spending_tx),
            WatchEvent::Height(_) => vec![],
        }
    }

    fn on_funding_confirmed(&mut self, txid: Txid) -> Vec<Action> {
        let data = match &self.state {
            ChannelState::WaitForFundingConfirmed { data, .. }
                if data.funding.txid() == txid =>
            {
                data.clone()
            }
            _ => return vec![],
        };
        let channel_id = self.channel_id();
        let funding_outpoint = data.funding.outpoint();
        let funding_script = PubkeyScript::ln_funding(
            data.funding.amount(),
            &data.local_keys.funding_pubkey,
            data.remote_keys.funding_pubkey,
        );
        let next_point = self.derivation.commitment_seed.point(1);
        let early = self.early_funding_locked.take();

        self.state = ChannelState::WaitForFundingLocked { data };
        let mut actions = vec![
            Action::Persist,
            Action::Send(Messages::FundingLocked(FundingLocked {
                channel_id,
                next_per_commitment_point: next_point,
            })),
            Action::Watch(WatchRequest::Spent {
                outpoint: funding_outpoint,
                script: funding_script,
            }),
        ];
        if let Some(msg) = early {
            match self.on_funding_locked(msg) {
                Ok(more) => actions.extend(more),
                Err(err) => {
                    actions.extend(self.abort_on_protocol_error(err))
                }
            }
        }
        actions
    }

    fn on_closing_confirmed(&mut self, txid: Txid) -> Vec<Action> {
        let matches = match &self.state {
            ChannelState::Closing { close, .. } => {
                close.spending_txid() == txid
            }
            _ => false,
        };
        if !matches {
            return vec![];
        }
        let channel_id = self
            .state
            .channel_data()
            .and_then(ChannelData::channel_id);
        self.state = ChannelState::Closed {
            channel_id,
            spending_txid: Some(txid),
        };
        vec![
            Action::Persist,
            Action::Notify(Notification::ChannelClosed {
                channel_id,
                spending_txid: Some(txid),
            }),
        ]
    }

    fn on_spent(
        &mut self,
        outpoint: bitcoin::OutPoint,
        spending_tx: Transaction,
    ) -> Vec<Action> {
        let data = match self.state.channel_data() {
            Some(data) if data.funding.outpoint() == outpoint => {
                data.clone()
            }
            _ => return vec![],
        };
        let commitments = &data.commitments;
        let txid = spending_tx.txid();

        // our own commitment?
        let local_commitment = commitments.local_commitment(
            &data.funding,
            &data.local_keys,
            &data.remote_keys,
        );
        if local_commitment.txid() == txid {
            return self.enter_local_close(&data, "own commitment on chain");
        }

        // the current (or just-signed, not yet revoked) remote commitment?
        let mut candidates = vec![];
        if commitments.awaiting_remote_revocation() {
            // a commitment_signed is in flight: both the new commitment
            // and the still-unrevoked previous one are publishable
            candidates.push((
                commitments.remote_commitment_number(),
                commitments.remote_next_per_commitment_point(),
            ));
            if commitments.remote_commitment_number() > 0 {
                candidates.push((
                    commitments.remote_commitment_number() - 1,
                    commitments.remote_per_commitment_point(),
                ));
            }
        } else {
            candidates.push((
                commitments.remote_commitment_number(),
                commitments.remote_per_commitment_point(),
            ));
        }
        for (number, point) in candidates {
            let remote_commitment = commitments.commitment_tx(
                &data.funding,
                &data.local_keys,
                &data.remote_keys,
                false,
                number,
                point,
            );
            if remote_commitment.txid() == txid {
                let published = respond_to_remote_commit(
                    commitments,
                    &spending_tx,
                    point,
                    &data.local_keys,
                    &data.remote_keys,
                    self.sweep_destination.clone(),
                    self.feerate_estimate,
                );
                let claims = published
                    .claim_main
                    .iter()
                    .chain(&published.claim_preimage)
                    .chain(&published.claim_timeout)
                    .cloned()
                    .collect::<Vec<_>>();
                self.state = ChannelState::Closing {
                    data: data.clone(),
                    close: OnChainClose::RemoteCommit(published),
                };
                let mut actions = vec![Action::Persist];
                actions.extend(claims.into_iter().map(Action::Broadcast));
                actions.push(Action::Watch(WatchRequest::Confirmed {
                    txid,
                    min_depth: CLOSING_CONFIRMATION_DEPTH,
                    hint: WatchHint::Closing,
                }));
                return actions;
            }
        }

        // a revoked commitment, then; punish it
        if let Some(number) = close::extract_commitment_number(
            &spending_tx,
            commitments,
            &data.local_keys,
            &data.remote_keys,
        ) {
            if let Some((published, _revocation_seckey)) =
                respond_to_revoked_commit(
                    commitments,
                    &spending_tx,
                    number,
                    &self.derivation.revocation_base_seckey,
                    self.sweep_destination.clone(),
                    self.feerate_estimate,
                )
            {
                let penalty = published.penalty.clone();
                self.state = ChannelState::Closing {
                    data: data.clone(),
                    close: OnChainClose::Revoked(published),
                };
                return vec![
                    Action::Persist,
                    Action::SideTable(SideRecord::Audit(format!(
                        "revoked commitment {} published as {}; penalty \
                         broadcast",
                        number, txid
                    ))),
                    Action::Broadcast(penalty),
                    Action::Watch(WatchRequest::Confirmed {
                        txid,
                        min_depth: CLOSING_CONFIRMATION_DEPTH,
                        hint: WatchHint::Closing,
                    }),
                ];
            }
        }

        // unknown spend: it can only be the negotiated closing transaction
        self.state = ChannelState::Closing {
            data,
            close: OnChainClose::Mutual { txid },
        };
        vec![
            Action::Persist,
            Action::Watch(WatchRequest::Confirmed {
                txid,
                min_depth: CLOSING_CONFIRMATION_DEPTH,
                hint: WatchHint::Closing,
            }),
        ]
    }

    fn handle_wallet(&mut self, response: WalletResponse) -> Vec<Action> {
        match response {
            WalletResponse::FundingConstructed { psbt, output_index } => {
                match self.on_funding_constructed(psbt, output_index) {
                    Ok(actions) => actions,
                    Err(err) => self.abort_opening(err.to_string()),
                }
            }
            WalletResponse::FundingFailed(err) => {
                self.abort_opening(wallet_error_text(&err))
            }
        }
    }

    fn on_funding_constructed(
        &mut self,
        mut psbt: Psbt,
        output_index: u16,
    ) -> Result<Vec<Action>, ChannelError> {
        let negotiated = match &self.state {
            ChannelState::WaitForFundingInternal { negotiated } => {
                negotiated.clone()
            }
            _ => return Ok(vec![]),
        };
        psbt.set_channel_funding_output(output_index)
            .map_err(|_| ChannelError::WrongState)?;
        let funding =
            Funding::with(psbt).map_err(|_| ChannelError::WrongState)?;
        let channel_id = ChannelId::with(funding.txid(), funding.output());

        let commitments = Commitments::with(
            ChannelDirection::Outbound,
            negotiated.funding_satoshis,
            negotiated.push_msat,
            negotiated.preopen.common_params.feerate_per_kw,
            negotiated.preopen.local_params,
            negotiated.remote_params,
            self.derivation.commitment_seed.point(0),
            negotiated.remote_keys.first_per_commitment_point,
        );

        // sign the fundee's first commitment
        let local_keys = negotiated.preopen.local_keys.clone();
        let remote_commitment = commitments.commitment_tx(
            &funding,
            &local_keys,
            &negotiated.remote_keys,
            false,
            0,
            negotiated.remote_keys.first_per_commitment_point,
        );
        let signature = sign_commitment(
            &remote_commitment,
            &funding,
            &self.derivation.funding_seckey,
        );

        let temporary_channel_id = negotiated
            .preopen
            .active_channel_id
            .temp_channel_id()
            .expect("pre-funding channel keeps its temporary id");
        let message = FundingCreated {
            temporary_channel_id,
            funding_txid: funding.txid(),
            funding_output_index: funding.output(),
            signature,
        };

        let data = ChannelData {
            active_channel_id: ActiveChannelId::Static(channel_id),
            chain_hash: negotiated.preopen.chain_hash,
            policy: negotiated.preopen.policy.clone(),
            common_params: negotiated.preopen.common_params,
            local_keys,
            remote_keys: negotiated.remote_keys.clone(),
            funding,
            commitments,
            short_channel_id: None,
            minimum_depth: negotiated.minimum_depth,
        };
        self.state = ChannelState::WaitForFundingSigned { data };
        Ok(vec![
            Action::Persist,
            Action::Send(Messages::FundingCreated(message)),
        ])
    }

    fn handle_timer(&mut self, timer: Timer) -> Vec<Action> {
        match timer {
            Timer::ChannelOpenTimeout => self.on_open_timeout(),
        }
    }

    fn on_open_timeout(&mut self) -> Vec<Action> {
        match &self.state {
            ChannelState::WaitForAcceptChannel { .. }
            | ChannelState::WaitForFundingInternal { .. }
            | ChannelState::WaitForFundingCreated { .. } => {
                self.abort_opening(s!("channel open timed out"))
            }
            ChannelState::WaitForFundingSigned { data } => {
                let psbt = data.funding.psbt().clone();
                let mut actions =
                    self.abort_opening(s!("channel open timed out"));
                actions.push(Action::Wallet(WalletCall::Rollback(psbt)));
                actions
            }
            ChannelState::WaitForFundingConfirmed {
                data,
                funding_broadcast,
            } => {
                let txid = data.funding.txid();
                let broadcast = *funding_broadcast;
                let mut actions = self
                    .abort_opening(s!("funding confirmation timed out"));
                if broadcast {
                    // the UTXOs may be re-used once the transaction is
                    // evicted
                    actions.push(Action::Wallet(WalletCall::Abandon(txid)));
                }
                actions
            }
            _ => vec![],
        }
    }

    // ----------------------------------------------------------------
    // Closure helpers

    fn abort_opening(&mut self, reason: String) -> Vec<Action> {
        let origin = self.open_origin.take();
        let channel_id = self
            .state
            .active_channel_id()
            .and_then(|id| id.channel_id());
        self.state = ChannelState::Closed {
            channel_id,
            spending_txid: None,
        };
        vec![
            Action::Persist,
            Action::Notify(Notification::OpenFailed { origin, reason }),
        ]
    }

    /// Remote protocol violation: notify the peer and close unilaterally
    fn abort_on_protocol_error(&mut self, err: ChannelError) -> Vec<Action> {
        let channel_id = self.channel_id();
        let mut actions = vec![Action::Send(Messages::Error(
            bolt1::Error::with(channel_id, &err),
        ))];
        actions.extend(self.force_close(&err.to_string()));
        actions
    }

    /// Publishes our commitment transaction; pending commands fail and
    /// later ones will be rejected by the `Closing` state
    fn force_close(&mut self, reason: &str) -> Vec<Action> {
        let data = match self.state.channel_data() {
            Some(data) => data.clone(),
            None => {
                // nothing on chain yet: aborting the opening is enough
                return self
                    .abort_opening(format!("channel failed: {}", reason));
            }
        };
        self.enter_local_close(&data, reason)
    }

    fn enter_local_close(
        &mut self,
        data: &ChannelData,
        reason: &str,
    ) -> Vec<Action> {
        let published = respond_to_local_commit(
            &data.commitments,
            &data.funding,
            &data.local_keys,
            &data.remote_keys,
            self.sweep_destination.clone(),
            self.feerate_estimate,
        );
        let commitment_psbt = data
            .commitments
            .local_commitment(
                &data.funding,
                &data.local_keys,
                &data.remote_keys,
            )
            .psbt;
        let commit_txid = published.commit_txid;
        let stage_claims = published
            .claim_main_delayed
            .iter()
            .chain(&published.htlc_timeout)
            .chain(&published.htlc_success)
            .cloned()
            .collect::<Vec<_>>();
        let watches = published
            .htlc_stage_outputs
            .iter()
            .map(|outpoint| {
                Action::Watch(WatchRequest::Spent {
                    outpoint: *outpoint,
                    script: self.sweep_destination.clone(),
                })
            })
            .collect::<Vec<_>>();

        self.state = ChannelState::Closing {
            data: data.clone(),
            close: OnChainClose::LocalCommit(published),
        };
        let mut actions = vec![
            Action::Persist,
            Action::SideTable(SideRecord::Audit(format!(
                "unilateral close: {}",
                reason
            ))),
            Action::Broadcast(commitment_psbt),
        ];
        actions.extend(stage_claims.into_iter().map(Action::Broadcast));
        actions.push(Action::Watch(WatchRequest::Confirmed {
            txid: commit_txid,
            min_depth: CLOSING_CONFIRMATION_DEPTH,
            hint: WatchHint::Closing,
        }));
        actions.extend(watches);
        actions
    }
}

fn wallet_error_text(err: &WalletError) -> String {
    err.to_string()
}

#[cfg(test)]
mod test {
    use amplify::{DumbDefault, Wrapper};
    use bitcoin::util::bip32::{ExtendedPrivKey, KeySource};
    use bitcoin::{Transaction, TxOut};
    use secp256k1::Secp256k1;
    use std::str::FromStr;
    use wallet::psbt::PsbtVersion;

    use super::*;
    use crate::policy::{CommonParams, PeerParams, Policy};
    use crate::state::preopen;

    fn derivation(tag: u8) -> ChannelDerivation {
        let secp = Secp256k1::new();
        ChannelDerivation::with(
            &secp,
            KeySource::default(),
            ExtendedPrivKey::new_master(bitcoin::Network::Regtest, &[
                tag; 32
            ])
            .unwrap(),
            None,
        )
    }

    fn sweep_script(tag: u8) -> PubkeyScript {
        use amplify::hex::ToHex;
        PubkeyScript::from_inner(
            bitcoin::Script::from_str(&format!(
                "0014{}",
                [tag; 20].to_hex()
            ))
            .unwrap(),
        )
    }

    fn machine(tag: u8) -> ChannelMachine {
        let derivation = derivation(tag);
        let preopen = preopen(
            Slice32::default(),
            Policy::default(),
            CommonParams::default(),
            PeerParams::default(),
            derivation.keyset.clone(),
        );
        ChannelMachine::new_inbound(
            preopen,
            derivation,
            sweep_script(tag),
            1000,
        )
    }

    fn origin() -> Origin {
        Origin::Hot {
            reply_token: 1,
            upstream: Upstream::Local {
                payment_id: Slice32::default(),
            },
        }
    }

    /// Extracts the single sent message from an action list
    fn sent(actions: &[Action]) -> Vec<Messages> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Send(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    fn persist_precedes_send(actions: &[Action]) -> bool {
        let persist = actions
            .iter()
            .position(|a| matches!(a, Action::Persist));
        let send = actions.iter().position(|a| matches!(a, Action::Send(_)));
        match (persist, send) {
            (Some(p), Some(s)) => p < s,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }

    /// Runs the full funding handshake between two machines and returns
    /// them in `Normal` state
    fn open_channel() -> (ChannelMachine, ChannelMachine) {
        let mut alice = machine(1);
        let mut bob = machine(2);

        // open_channel -> accept_channel
        let actions = alice.process(Event::Command(Command::Open {
            funding_satoshis: 1_000_000,
            push_msat: 200_000_000,
            origin: origin(),
        }));
        assert!(persist_precedes_send(&actions));
        let open_msg = sent(&actions).remove(0);
        let actions = bob.process(Event::Message(open_msg));
        let accept_msg = sent(&actions).remove(0);

        // accept_channel -> wallet round trip -> funding_created
        let actions = alice.process(Event::Message(accept_msg));
        let (script, amount) = match &actions[1] {
            Action::Wallet(WalletCall::MakeFundingTx {
                script,
                amount,
                ..
            }) => (script.clone(), *amount),
            other => panic!("expected wallet call, got {}", other),
        };
        let funding_tx = Transaction {
            version: 2,
            lock_time: bitcoin::PackedLockTime(0),
            input: vec![],
            output: vec![TxOut {
                value: amount,
                script_pubkey: script.into(),
            }],
        };
        let psbt = Psbt::with(funding_tx, PsbtVersion::V0).unwrap();
        let actions =
            alice.process(Event::Wallet(WalletResponse::FundingConstructed {
                psbt,
                output_index: 0,
            }));
        assert!(persist_precedes_send(&actions));
        let funding_created = sent(&actions).remove(0);

        // funding_created -> funding_signed
        let actions = bob.process(Event::Message(funding_created));
        let funding_signed = sent(&actions).remove(0);
        assert!(matches!(
            bob.state(),
            ChannelState::WaitForFundingConfirmed { .. }
        ));

        // funding_signed -> broadcast
        let actions = alice.process(Event::Message(funding_signed));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Wallet(WalletCall::Commit(_)))));
        let funding_txid = match alice.state() {
            ChannelState::WaitForFundingConfirmed { data, .. } => {
                data.funding.txid()
            }
            other => panic!("unexpected state {}", other),
        };

        // both sides observe the confirmation and exchange funding_locked
        let confirmation = |txid| WatchEvent::Confirmed {
            txid,
            block_height: 500_000,
            tx: Transaction {
                version: 2,
                lock_time: bitcoin::PackedLockTime(0),
                input: vec![],
                output: vec![],
            },
            hint: WatchHint::Funding,
        };
        let actions = alice.process(Event::Watch(confirmation(funding_txid)));
        let alice_locked = sent(&actions).remove(0);
        let actions = bob.process(Event::Watch(confirmation(funding_txid)));
        let bob_locked = sent(&actions).remove(0);

        let actions = alice.process(Event::Message(bob_locked));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(Notification::ChannelOpened { .. })
        )));
        bob.process(Event::Message(alice_locked));

        assert!(matches!(alice.state(), ChannelState::Normal { .. }));
        assert!(matches!(bob.state(), ChannelState::Normal { .. }));
        (alice, bob)
    }

    /// One HTLC offered by alice, fully cross-signed
    fn committed_htlc(
        alice: &mut ChannelMachine,
        bob: &mut ChannelMachine,
        preimage: [u8; 32],
        amount_msat: u64,
    ) -> u64 {
        let hashlock = HashLock::from(HashPreimage::from(
            Slice32::from_inner(preimage),
        ));
        let actions = alice.process(Event::Command(Command::AddHtlc {
            amount_msat,
            payment_hash: hashlock,
            cltv_expiry: 500_100,
            onion: OnionPacket::dumb_default(),
            origin: origin(),
        }));
        let add_msg = sent(&actions).remove(0);
        let htlc_id = match &add_msg {
            Messages::UpdateAddHtlc(msg) => msg.htlc_id,
            _ => panic!("expected update_add_htlc"),
        };
        bob.process(Event::Message(add_msg));

        // alice signs; bob revokes; bob signs back; alice revokes
        let actions = alice.process(Event::Command(Command::Sign));
        let commit = sent(&actions).remove(0);
        let actions = bob.process(Event::Message(commit));
        assert!(persist_precedes_send(&actions));
        let revocation = sent(&actions).remove(0);
        alice.process(Event::Message(revocation));

        let actions = bob.process(Event::Command(Command::Sign));
        let commit = sent(&actions).remove(0);
        let actions = alice.process(Event::Message(commit));
        let revocation = sent(&actions).remove(0);
        bob.process(Event::Message(revocation));
        htlc_id
    }

    #[test]
    fn funding_handshake_reaches_normal() {
        let (alice, bob) = open_channel();
        let alice_data = alice.state().channel_data().unwrap();
        let bob_data = bob.state().channel_data().unwrap();
        assert_eq!(
            alice_data.commitments.local_amount_msat(),
            bob_data.commitments.remote_amount_msat()
        );
        assert_eq!(alice_data.channel_id(), bob_data.channel_id());
    }

    #[test]
    fn htlc_lifecycle_over_machines() {
        let (mut alice, mut bob) = open_channel();
        let preimage = [0x55; 32];
        let htlc_id =
            committed_htlc(&mut alice, &mut bob, preimage, 10_000_000);

        // bob fulfills and both commit the resolution
        let actions = bob.process(Event::Command(Command::FulfillHtlc {
            htlc_id,
            preimage: HashPreimage::from(Slice32::from_inner(preimage)),
        }));
        let fulfill = sent(&actions).remove(0);
        let actions = alice.process(Event::Message(fulfill));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(Notification::HtlcSettled { .. })
        )));

        let actions = bob.process(Event::Command(Command::Sign));
        let commit = sent(&actions).remove(0);
        let actions = alice.process(Event::Message(commit));
        let revocation = sent(&actions).remove(0);
        bob.process(Event::Message(revocation));

        let alice_data = alice.state().channel_data().unwrap();
        let bob_data = bob.state().channel_data().unwrap();
        assert!(alice_data.commitments.offered().is_empty());
        assert_eq!(
            bob_data.commitments.local_amount_msat(),
            210_000_000
        );
        assert!(alice_data.commitments.balance_invariant_holds());
        assert!(bob_data.commitments.balance_invariant_holds());
    }

    #[test]
    fn wallet_failure_aborts_opening() {
        let mut alice = machine(1);
        let mut bob = machine(2);
        let actions = alice.process(Event::Command(Command::Open {
            funding_satoshis: 1_000_000,
            push_msat: 0,
            origin: origin(),
        }));
        let open_msg = sent(&actions).remove(0);
        let accept_msg = sent(&bob.process(Event::Message(open_msg)))
            .remove(0);
        alice.process(Event::Message(accept_msg));

        let actions = alice.process(Event::Wallet(
            WalletResponse::FundingFailed(WalletError::InsufficientFunds(
                s!("insufficient funds"),
            )),
        ));
        assert!(matches!(alice.state(), ChannelState::Closed { .. }));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(Notification::OpenFailed { .. })
        )));
        // nothing was ever broadcast
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::Broadcast(_))));
    }

    #[test]
    fn open_timeout_closes_and_notifies() {
        let mut alice = machine(1);
        let mut bob = machine(2);
        let actions = alice.process(Event::Command(Command::Open {
            funding_satoshis: 1_000_000,
            push_msat: 0,
            origin: origin(),
        }));
        let open_msg = sent(&actions).remove(0);
        let accept_msg =
            sent(&bob.process(Event::Message(open_msg))).remove(0);
        alice.process(Event::Message(accept_msg));
        assert!(matches!(
            alice.state(),
            ChannelState::WaitForFundingInternal { .. }
        ));

        let actions =
            alice.process(Event::Timer(Timer::ChannelOpenTimeout));
        assert!(matches!(alice.state(), ChannelState::Closed { .. }));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(Notification::OpenFailed { .. })
        )));
    }

    #[test]
    fn force_close_rejects_further_commands() {
        let (mut alice, mut bob) = open_channel();
        committed_htlc(&mut alice, &mut bob, [0x66; 32], 10_000_000);

        let actions = alice.process(Event::Command(Command::ForceClose));
        assert!(matches!(alice.state(), ChannelState::Closing { .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Broadcast(_))));

        let actions = alice.process(Event::Command(Command::AddHtlc {
            amount_msat: 1_000_000,
            payment_hash: HashLock::from(Slice32::default()),
            cltv_expiry: 500_200,
            onion: OnionPacket::dumb_default(),
            origin: origin(),
        }));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(Notification::CommandFailed { .. })
        )));
    }

    #[test]
    fn reestablish_retransmits_lost_commitment() {
        let (mut alice, mut bob) = open_channel();

        // alice proposes an HTLC and signs, but the commitment is lost
        let hashlock = HashLock::from(HashPreimage::from(
            Slice32::from_inner([0x77; 32]),
        ));
        let actions = alice.process(Event::Command(Command::AddHtlc {
            amount_msat: 5_000_000,
            payment_hash: hashlock,
            cltv_expiry: 500_100,
            onion: OnionPacket::dumb_default(),
            origin: origin(),
        }));
        bob.process(Event::Message(sent(&actions).remove(0)));
        let _lost_commitment =
            sent(&alice.process(Event::Command(Command::Sign)));

        // both peers lose the connection
        alice.process(Event::Disconnected);
        bob.process(Event::Disconnected);
        assert!(matches!(alice.state(), ChannelState::Offline { .. }));
        assert!(matches!(bob.state(), ChannelState::Offline { .. }));

        // reconnection: both send channel_reestablish
        let alice_actions = alice.process(Event::Reconnected);
        let bob_actions = bob.process(Event::Reconnected);
        let alice_reestablish = sent(&alice_actions).remove(0);
        let bob_reestablish = sent(&bob_actions).remove(0);

        // alice detects the lost commitment and retransmits it
        let actions = alice.process(Event::Message(bob_reestablish));
        let retransmissions = sent(&actions);
        assert_eq!(retransmissions.len(), 1);
        assert!(matches!(
            retransmissions[0],
            Messages::CommitmentSigned(_)
        ));

        // bob needs nothing retransmitted
        let actions = bob.process(Event::Message(alice_reestablish));
        assert!(sent(&actions).is_empty());

        // the retransmitted commitment completes the round
        let actions =
            bob.process(Event::Message(retransmissions[0].clone()));
        let revocation = sent(&actions).remove(0);
        alice.process(Event::Message(revocation));

        let alice_data = alice.state().channel_data().unwrap();
        let bob_data = bob.state().channel_data().unwrap();
        assert_eq!(alice_data.commitments.offered().len(), 1);
        assert_eq!(bob_data.commitments.received().len(), 1);
        assert!(!alice_data.commitments.awaiting_remote_revocation());
    }

    #[test]
    fn reestablish_retransmits_lost_revocation() {
        let (mut alice, mut bob) = open_channel();

        // alice adds and signs; bob processes the commitment but his
        // revocation is lost on the way back
        let hashlock = HashLock::from(HashPreimage::from(
            Slice32::from_inner([0x88; 32]),
        ));
        let actions = alice.process(Event::Command(Command::AddHtlc {
            amount_msat: 5_000_000,
            payment_hash: hashlock,
            cltv_expiry: 500_100,
            onion: OnionPacket::dumb_default(),
            origin: origin(),
        }));
        bob.process(Event::Message(sent(&actions).remove(0)));
        let commit = sent(&alice.process(Event::Command(Command::Sign)))
            .remove(0);
        let _lost_revocation = sent(&bob.process(Event::Message(commit)));

        alice.process(Event::Disconnected);
        bob.process(Event::Disconnected);
        let alice_reestablish =
            sent(&alice.process(Event::Reconnected)).remove(0);
        let bob_reestablish =
            sent(&bob.process(Event::Reconnected)).remove(0);

        // bob sees that alice is missing his revocation and replays it
        let actions = bob.process(Event::Message(alice_reestablish));
        let retransmissions = sent(&actions);
        assert_eq!(retransmissions.len(), 1);
        assert!(matches!(retransmissions[0], Messages::RevokeAndAck(_)));

        // alice needs to retransmit nothing: bob holds her commitment
        let actions = alice.process(Event::Message(bob_reestablish));
        assert!(sent(&actions).is_empty());

        alice.process(Event::Message(retransmissions[0].clone()));
        let alice_data = alice.state().channel_data().unwrap();
        assert!(!alice_data.commitments.awaiting_remote_revocation());
        // no duplicate HTLC appeared anywhere
        assert_eq!(alice_data.commitments.offered().len(), 1);
        assert_eq!(
            bob.state()
                .channel_data()
                .unwrap()
                .commitments
                .received()
                .len(),
            1
        );
    }

    #[test]
    fn cooperative_close_negotiates_and_closes() {
        let (mut alice, mut bob) = open_channel();

        let actions = alice
            .process(Event::Command(Command::Close { script_pubkey: None }));
        let shutdown = sent(&actions).remove(0);
        let actions = bob.process(Event::Message(shutdown));
        let mut msgs = sent(&actions);
        // bob responds with its own shutdown; no HTLCs are in flight so
        // negotiation starts right away on the funder side
        assert!(matches!(msgs[0], Messages::Shutdown(_)));
        let bob_shutdown = msgs.remove(0);

        let actions = alice.process(Event::Message(bob_shutdown));
        let closing_signed = sent(&actions)
            .into_iter()
            .find(|msg| matches!(msg, Messages::ClosingSigned(_)))
            .expect("funder opens the fee negotiation");

        let actions = bob.process(Event::Message(closing_signed));
        // bob agrees immediately: the fee comes from the same estimate
        assert!(matches!(bob.state(), ChannelState::Closing { .. }));
        let reply = sent(&actions)
            .into_iter()
            .find(|msg| matches!(msg, Messages::ClosingSigned(_)))
            .expect("agreement is signalled back");
        let broadcast = actions
            .iter()
            .find_map(|a| match a {
                Action::Broadcast(psbt) => Some(psbt.clone()),
                _ => None,
            })
            .expect("closing transaction is broadcast");

        let actions = alice.process(Event::Message(reply));
        assert!(matches!(alice.state(), ChannelState::Closing { .. }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Broadcast(_))));

        // confirmation finishes both sides
        let txid = broadcast.to_txid();
        let confirm = WatchEvent::Confirmed {
            txid,
            block_height: 500_010,
            tx: broadcast.into_unsigned_tx(),
            hint: WatchHint::Closing,
        };
        let actions = alice.process(Event::Watch(confirm.clone()));
        assert!(matches!(alice.state(), ChannelState::Closed { .. }));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(Notification::ChannelClosed { .. })
        )));
        let actions = bob.process(Event::Watch(confirm));
        assert!(matches!(bob.state(), ChannelState::Closed { .. }));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(Notification::ChannelClosed { .. })
        )));
    }

    #[test]
    fn update_fee_is_funder_only_end_to_end() {
        let (mut alice, mut bob) = open_channel();

        // bob (fundee) cannot propose fees
        let actions = bob.process(Event::Command(Command::UpdateFee {
            feerate_per_kw: 2000,
        }));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(Notification::CommandFailed { .. })
        )));

        // alice can; bob validates within tolerance
        let actions = alice.process(Event::Command(Command::UpdateFee {
            feerate_per_kw: 2000,
        }));
        let update = sent(&actions).remove(0);
        bob.process(Event::Message(update));
        assert_eq!(
            bob.state()
                .channel_data()
                .unwrap()
                .commitments
                .feerate_per_kw(),
            2000
        );
    }
}
