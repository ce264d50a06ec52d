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

//! Interface to the blockchain watcher: the channel emits watch requests
//! and consumes watch events; the watcher itself is an external service.

use bitcoin::{OutPoint, Transaction, Txid};
use bitcoin_scripts::PubkeyScript;

/// A request to the blockchain watcher
#[derive(Clone, PartialEq, Eq, Debug, Display)]
pub enum WatchRequest {
    /// Notify when `txid` reaches `min_depth` confirmations
    #[display("watch_confirmed({txid}, {min_depth})")]
    Confirmed {
        txid: Txid,
        min_depth: u32,
        /// Free-form label reported back with the event; used to
        /// distinguish funding from closing confirmations
        hint: WatchHint,
    },

    /// Notify when `outpoint` is spent by any transaction
    #[display("watch_spent({outpoint})")]
    Spent {
        outpoint: OutPoint,
        /// Script of the watched output, allowing compact-filter watchers
        /// to match spends
        script: PubkeyScript,
    },
}

/// Why a confirmation watch was requested
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
pub enum WatchHint {
    /// Funding transaction confirmation, leading to `funding_locked`
    #[display("funding")]
    Funding,

    /// Cooperative or unilateral closing transaction confirmation,
    /// leading to the terminal state
    #[display("closing")]
    Closing,

    /// Second-stage or sweep transaction confirmation
    #[display("claim")]
    Claim,
}

/// An event delivered by the blockchain watcher
#[derive(Clone, PartialEq, Eq, Debug, Display)]
pub enum WatchEvent {
    /// A watched transaction reached the requested depth
    #[display("confirmed({txid}, {block_height})")]
    Confirmed {
        txid: Txid,
        block_height: u32,
        tx: Transaction,
        hint: WatchHint,
    },

    /// A watched outpoint was spent
    #[display("spent({outpoint})")]
    Spent {
        outpoint: OutPoint,
        spending_tx: Transaction,
    },

    /// A new block was connected; used for CLTV timeout processing and
    /// funding timeouts
    #[display("height({0})")]
    Height(u32),
}
