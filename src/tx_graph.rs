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

//! Graph of channel transactions: the commitment transaction spending the
//! funding output plus second-stage transactions keyed by their role and
//! index.

use std::collections::BTreeMap;

use bitcoin::{Transaction, TxIn, TxOut};
use wallet::psbt::{self, Psbt, PsbtVersion};

use crate::funding::Funding;

pub trait TxRole: Clone + From<u16> + Into<u16> {}
pub trait TxIndex: Clone + From<u64> + Into<u64> {}

impl TxRole for u16 {}
impl TxIndex for u64 {}

/// Roles of the second-stage channel transactions
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[display(Debug)]
pub enum TxType {
    /// Claims a received HTLC output with a known preimage
    HtlcSuccess,
    /// Claims an offered HTLC output after its CLTV expiry
    HtlcTimeout,
    /// Sweeps an output spendable by us without counterparty cooperation
    Claim,
    /// Punishes publication of a revoked commitment
    Penalty,
    Unknown(u16),
}

impl From<TxType> for u16 {
    fn from(ty: TxType) -> Self {
        match ty {
            TxType::HtlcSuccess => 0x0,
            TxType::HtlcTimeout => 0x1,
            TxType::Claim => 0x2,
            TxType::Penalty => 0x3,
            TxType::Unknown(x) => x,
        }
    }
}

impl From<u16> for TxType {
    fn from(ty: u16) -> Self {
        match ty {
            0x00 => TxType::HtlcSuccess,
            0x01 => TxType::HtlcTimeout,
            0x02 => TxType::Claim,
            0x03 => TxType::Penalty,
            x => TxType::Unknown(x),
        }
    }
}

impl TxRole for TxType {}

#[derive(Getters, Clone, PartialEq)]
pub struct TxGraph<'channel> {
    /// Read-only funding data shared by all transactions of the graph
    funding: &'channel Funding,
    pub cmt_version: i32,
    pub cmt_locktime: u32,
    pub cmt_sequence: u32,
    pub cmt_outs: Vec<(TxOut, psbt::Output)>,
    graph: BTreeMap<u16, BTreeMap<u64, Psbt>>,
}

impl<'channel> TxGraph<'channel>
where
    Self: 'channel,
{
    pub fn from_funding(funding: &'channel Funding) -> TxGraph<'channel> {
        TxGraph {
            funding,
            cmt_version: 2,
            cmt_locktime: 0,
            cmt_sequence: 0,
            cmt_outs: vec![],
            graph: bmap! {},
        }
    }

    pub fn tx<R, I>(&self, role: R, index: I) -> Option<&Psbt>
    where
        R: TxRole,
        I: TxIndex,
    {
        self.graph
            .get(&role.into())
            .and_then(|v| v.get(&index.into()))
    }

    pub fn tx_mut<R, I>(&mut self, role: R, index: I) -> Option<&mut Psbt>
    where
        R: TxRole,
        I: TxIndex,
    {
        self.graph
            .get_mut(&role.into())
            .and_then(|v| v.get_mut(&index.into()))
    }

    pub fn insert_tx<R, I>(
        &mut self,
        role: R,
        index: I,
        psbt: Psbt,
    ) -> Option<Psbt>
    where
        R: TxRole,
        I: TxIndex,
    {
        self.graph
            .entry(role.into())
            .or_insert_with(Default::default)
            .insert(index.into(), psbt)
    }

    pub fn len(&self) -> usize {
        self.graph
            .iter()
            .fold(0usize, |sum, (_, map)| sum + map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn last_index<R>(&self, role: R) -> usize
    where
        R: TxRole,
    {
        match self.graph.get(&role.into()) {
            Some(map) => map.len(),
            None => 0usize,
        }
    }

    /// Renders the whole graph with the commitment transaction first
    pub fn render(&self) -> Vec<Psbt> {
        let mut txes = Vec::with_capacity(self.len() + 1);
        let cmt_tx = self.render_cmt();
        txes.push(cmt_tx);
        txes.extend(self.graph.values().flat_map(|v| v.values().cloned()));
        txes
    }

    /// Renders the commitment transaction spending the funding output
    pub fn render_cmt(&self) -> Psbt {
        let outputs = self
            .cmt_outs
            .clone()
            .into_iter()
            .map(|(txout, _)| txout)
            .collect();
        let cmt_tx = Transaction {
            version: self.cmt_version,
            lock_time: bitcoin::PackedLockTime(self.cmt_locktime),
            input: vec![TxIn {
                previous_output: self.funding.outpoint(),
                script_sig: empty!(),
                sequence: bitcoin::Sequence(self.cmt_sequence),
                witness: empty!(),
            }],
            output: outputs,
        };
        let mut psbt = Psbt::with(cmt_tx, PsbtVersion::V0).expect(
            "PSBT construction fails only if script_sig and witness are not \
             empty; which is not the case here",
        );
        let funding_psbt = self.funding.psbt();
        let funding_output = self.funding.output() as usize;
        psbt.inputs[0].witness_utxo = Some(
            funding_psbt.to_unsigned_tx().output[funding_output].clone(),
        );
        psbt.inputs[0].witness_script =
            funding_psbt.outputs[funding_output].witness_script.clone();
        psbt.inputs[0].bip32_derivation = funding_psbt.outputs
            [funding_output]
            .bip32_derivation
            .clone();
        for (index, output) in psbt.outputs.iter_mut().enumerate() {
            *output = self.cmt_outs[index].1.clone();
        }
        psbt
    }

    pub fn vec_mut(&mut self) -> Vec<(u16, u64, &mut Psbt)> {
        let vec = self
            .graph
            .iter_mut()
            .flat_map(|(role, map)| {
                map.iter_mut().map(move |(index, tx)| (*role, *index, tx))
            })
            .collect::<Vec<_>>();
        vec
    }
}
