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

#![recursion_limit = "256"]
// Coding conventions
#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    unused_imports,
    dead_code,
    //missing_docs
)]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate strict_encoding;

#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_with;
#[cfg(feature = "serde")]
extern crate serde_crate as serde;

pub extern crate lnwire as wire;

macro_rules! dumb_pubkey {
    () => {
        secp256k1::PublicKey::from_secret_key(
            secp256k1::SECP256K1,
            &secp256k1::ONE_KEY,
        )
    };
}

pub mod close;
mod commitments;
mod funding;
pub mod htlc;
mod keyset;
pub mod machine;
mod origin;
pub mod policy;
pub mod scripts;
mod secrets;
pub mod state;
pub mod store;
mod tx_graph;
pub mod wallet;
pub mod watch;

pub use commitments::{
    ChannelDirection, ChannelError, Commitments, HtlcStage, InFlightHtlc,
};
pub use funding::{Funding, PsbtChannelFunding};
pub use htlc::{Direction, HtlcKnown, HtlcSecret};
pub use keyset::{ChannelDerivation, LocalKeyset, LocalPubkey, RemoteKeyset};
pub use machine::{
    Action, ChannelMachine, Command, Event, Notification, Timer,
};
pub use origin::{Origin, ReplyRegistry, Upstream};
pub use policy::{CommonParams, PeerParams, Policy, PolicyError};
pub use secrets::{CommitmentSeed, SecretStore, COMMITMENT_NUMBER_MAX};
pub use state::ChannelState;
pub use tx_graph::{TxGraph, TxRole, TxType};
