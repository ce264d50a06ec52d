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

//! Interface to the on-chain wallet funding channels. The wallet is an
//! external collaborator; the channel state machine talks to it through
//! emitted actions and response events.

use bitcoin::Txid;
use bitcoin_scripts::PubkeyScript;
use wallet::psbt::Psbt;

/// Errors returned by the funding wallet
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum WalletError {
    /// wallet does not have enough confirmed funds: {0}
    InsufficientFunds(String),

    /// wallet RPC failure: {0}
    Rpc(String),

    /// funding was cancelled by the wallet operator
    Cancelled,
}

/// The funding wallet as seen from a channel.
///
/// Implementations are allowed to block on I/O: the state machine never
/// calls the wallet directly, the host executes these calls between
/// machine transitions and feeds results back as events.
pub trait FundingWallet {
    /// Creates (but does not broadcast) a transaction paying `amount` to
    /// the funding `script`; returns the transaction with the funding
    /// output index
    fn make_funding_tx(
        &mut self,
        script: PubkeyScript,
        amount: u64,
        feerate_per_kw: u32,
    ) -> Result<(Psbt, u16), WalletError>;

    /// Marks the transaction UTXOs as reusable after an aborted opening
    fn abandon(&mut self, txid: Txid) -> Result<(), WalletError>;

    /// Commits the funding transaction to the wallet and broadcasts it
    fn commit(&mut self, psbt: Psbt) -> Result<(), WalletError>;

    /// Rolls back a funding transaction which was never broadcast
    fn rollback(&mut self, psbt: Psbt) -> Result<(), WalletError>;
}

/// Response of a wallet funding round trip, delivered to the state machine
/// as an event
#[derive(Clone, Debug)]
pub enum WalletResponse {
    /// The funding transaction was constructed
    FundingConstructed { psbt: Psbt, output_index: u16 },

    /// The wallet refused to construct the funding transaction
    FundingFailed(WalletError),
}
