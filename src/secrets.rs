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

//! Per-commitment secret chain (BOLT-3).
//!
//! Each commitment number has its own secret producing the per-commitment
//! point which tweaks every key of the commitment transaction. Secrets are
//! derived from a single 32-byte channel seed; releasing the secret of a
//! revoked commitment lets the counterparty punish any future publication
//! of it. Counterparty-released secrets are kept in a compact 49-slot store
//! which can reproduce the secret of *every* revoked commitment.

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash};
use secp256k1::{PublicKey, SecretKey, SECP256K1};

/// Largest valid 48-bit commitment number
pub const COMMITMENT_NUMBER_MAX: u64 = (1 << 48) - 1;

/// Errors of the released-secret store
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error
)]
#[display(doc_comments)]
pub enum SecretChainError {
    /// commitment number {0} exceeds the 48-bit protocol limit
    NumberOverflow(u64),

    /// released per-commitment secret for commitment {0} does not derive
    /// the previously released secrets; the peer is lying about its
    /// commitment chain
    ChainMismatch(u64),

    /// per-commitment secret for commitment {0} was never released
    Unknown(u64),
}

/// Flips bit `bit` of `secret` and hashes it, the BOLT-3 chain step
fn chain_step(secret: &mut [u8; 32], bit: u8) {
    secret[bit as usize / 8] ^= 1 << (bit & 7);
    *secret = sha256::Hash::hash(&secret[..]).into_inner();
}

/// Derives a downstream secret from a chain element covering `bits` low
/// bits, for the downward index `index`
fn derive_from(base: [u8; 32], bits: u8, index: u64) -> [u8; 32] {
    let mut secret = base;
    for bit in (0..bits).rev() {
        if (index >> bit) & 1 == 1 {
            chain_step(&mut secret, bit);
        }
    }
    secret
}

/// Local per-commitment secret generator seeded at channel creation.
///
/// Commitment numbers count *up* from zero; internally they are mapped onto
/// the downward-counting BOLT-3 index so that later secrets can not be
/// derived from earlier ones.
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct CommitmentSeed {
    seed: Slice32,
}

impl CommitmentSeed {
    #[inline]
    pub fn with(seed: Slice32) -> CommitmentSeed {
        CommitmentSeed { seed }
    }

    #[inline]
    pub fn random() -> CommitmentSeed {
        CommitmentSeed {
            seed: Slice32::random(),
        }
    }

    /// Raw 32-byte secret for the given commitment number
    pub fn secret_bytes(&self, commitment_number: u64) -> [u8; 32] {
        let index = COMMITMENT_NUMBER_MAX
            - (commitment_number & COMMITMENT_NUMBER_MAX);
        derive_from(self.seed.to_inner(), 48, index)
    }

    /// Per-commitment secret for the given commitment number
    pub fn secret(&self, commitment_number: u64) -> SecretKey {
        SecretKey::from_slice(&self.secret_bytes(commitment_number))
            .expect("negligible probability")
    }

    /// Per-commitment point: `G · secret`
    pub fn point(&self, commitment_number: u64) -> PublicKey {
        PublicKey::from_secret_key(
            SECP256K1,
            &self.secret(commitment_number),
        )
    }
}

/// Compact store of counterparty-released per-commitment secrets.
///
/// Exploits the chain structure: a secret whose downward index ends in `n`
/// zero bits derives the secrets of all indexes sharing its high bits, so
/// 49 slots reproduce the whole revoked history.
/// One stored chain element: a released secret and its downward index
#[derive(Copy, Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
struct SecretSlot {
    secret: Slice32,
    index: u64,
}

#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub struct SecretStore {
    /// Slot per bucket; bucket number is the count of low zero bits the
    /// downward index stored in it must have
    slots: Vec<Option<SecretSlot>>,

    /// Smallest downward index seen so far, i.e. the latest revoked
    /// commitment
    next_index: u64,
}

impl SecretStore {
    pub fn new() -> SecretStore {
        SecretStore {
            slots: vec![None; 49],
            next_index: COMMITMENT_NUMBER_MAX,
        }
    }

    fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Highest commitment number for which a secret has been released
    pub fn latest_revoked_commitment(&self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        Some(COMMITMENT_NUMBER_MAX - self.next_index)
    }

    /// Inserts the secret released for `commitment_number`, verifying that
    /// it is consistent with all secrets stored so far
    pub fn insert(
        &mut self,
        commitment_number: u64,
        secret: Slice32,
    ) -> Result<(), SecretChainError> {
        if commitment_number > COMMITMENT_NUMBER_MAX {
            return Err(SecretChainError::NumberOverflow(commitment_number));
        }
        if self.slots.len() != 49 {
            self.slots.resize(49, None);
        }
        let index = COMMITMENT_NUMBER_MAX - commitment_number;
        let bucket = index.trailing_zeros().min(48) as usize;

        // All finer-grained slots must be derivable from the new secret
        for slot in self.slots[..bucket].iter().flatten() {
            let derived =
                derive_from(secret.to_inner(), bucket as u8, slot.index);
            if derived != slot.secret.to_inner() {
                return Err(SecretChainError::ChainMismatch(
                    commitment_number,
                ));
            }
        }

        self.slots[bucket] = Some(SecretSlot { secret, index });
        self.next_index = self.next_index.min(index);
        Ok(())
    }

    /// Reproduces the secret for any commitment number whose secret has
    /// been released (directly or derivable)
    pub fn secret_for(
        &self,
        commitment_number: u64,
    ) -> Result<Slice32, SecretChainError> {
        if commitment_number > COMMITMENT_NUMBER_MAX {
            return Err(SecretChainError::NumberOverflow(commitment_number));
        }
        let index = COMMITMENT_NUMBER_MAX - commitment_number;
        for (bucket, slot) in self.slots.iter().enumerate() {
            let slot = match slot {
                Some(slot) => slot,
                None => continue,
            };
            let mask = u64::MAX.checked_shl(bucket as u32).unwrap_or(0);
            if index & mask == slot.index {
                let derived =
                    derive_from(slot.secret.to_inner(), bucket as u8, index);
                return Ok(Slice32::from_inner(derived));
            }
        }
        Err(SecretChainError::Unknown(commitment_number))
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;

    fn seed(hex: &str) -> CommitmentSeed {
        CommitmentSeed::with(Slice32::from_hex(hex).unwrap())
    }

    fn secret_hex(seed: &CommitmentSeed, commitment_number: u64) -> String {
        use amplify::hex::ToHex;
        seed.secret_bytes(commitment_number).to_hex()
    }

    #[test]
    fn bolt3_generation_vectors() {
        // commitment number 0 maps to the all-ones downward index
        let zero_seed = seed(
            "0000000000000000000000000000000000000000000000000000000000000000",
        );
        assert_eq!(
            secret_hex(&zero_seed, 0),
            "02a40c85b6f28da08dfdbe0926c53fab2de6d28c10301f8f7c4073d5e42e3148"
        );

        let ones_seed = seed(
            "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        );
        assert_eq!(
            secret_hex(&ones_seed, 0),
            "7cc854b54e3e0dcdb010d7a3fee464a9687be6e8db3be6854c475621e007a5dc"
        );
        // downward index 0xaaaaaaaaaaa
        assert_eq!(
            secret_hex(&ones_seed, COMMITMENT_NUMBER_MAX - 0xaaaaaaaaaaa),
            "56f4008fb007ca9acf0e15b054d5c9fd12ee06cea347914ddbaed70d1c13a528"
        );
        // downward index 0x555555555555
        assert_eq!(
            secret_hex(&ones_seed, COMMITMENT_NUMBER_MAX - 0x555555555555),
            "9015daaeb06dba4ccc05b91b2f73bd54405f2be9f217fbacd3c5ac2e62327d31"
        );

        let pattern_seed = seed(
            "0101010101010101010101010101010101010101010101010101010101010101",
        );
        // downward index 1
        assert_eq!(
            secret_hex(&pattern_seed, COMMITMENT_NUMBER_MAX - 1),
            "915c75942a26bb3a433a8ce2cb0427c29ec6c1775cfc78328b57f6ba7bfeaa9c"
        );
    }

    #[test]
    fn point_matches_secret() {
        let seed = CommitmentSeed::random();
        for number in [0u64, 1, 2, 42, 1000] {
            let point = seed.point(number);
            assert_eq!(
                point,
                PublicKey::from_secret_key(SECP256K1, &seed.secret(number))
            );
        }
    }

    #[test]
    fn store_reproduces_all_released_secrets() {
        let seed = CommitmentSeed::random();
        let mut store = SecretStore::new();
        for number in 0..=100u64 {
            store
                .insert(number, Slice32::from_inner(seed.secret_bytes(number)))
                .unwrap();
            assert_eq!(store.latest_revoked_commitment(), Some(number));
        }
        // every revoked secret is reproducible, including ones living only
        // as chain derivations
        for number in 0..=100u64 {
            assert_eq!(
                store.secret_for(number).unwrap().to_inner(),
                seed.secret_bytes(number)
            );
        }
        assert_eq!(
            store.secret_for(101),
            Err(SecretChainError::Unknown(101))
        );
    }

    #[test]
    fn store_rejects_inconsistent_chain() {
        let seed = CommitmentSeed::random();
        let mut store = SecretStore::new();
        for number in 0..8u64 {
            store
                .insert(number, Slice32::from_inner(seed.secret_bytes(number)))
                .unwrap();
        }
        // a secret from a different chain fails the consistency check at
        // the first bucket-compressing insert
        let bogus = CommitmentSeed::random();
        let mut failed = false;
        for number in 8..24u64 {
            if store
                .insert(
                    number,
                    Slice32::from_inner(bogus.secret_bytes(number)),
                )
                .is_err()
            {
                failed = true;
                break;
            }
        }
        assert!(failed);
    }

    #[test]
    fn number_overflow() {
        let mut store = SecretStore::new();
        assert_eq!(
            store.insert(1 << 48, Slice32::default()),
            Err(SecretChainError::NumberOverflow(1 << 48))
        );
        assert_eq!(
            store.secret_for(1 << 48),
            Err(SecretChainError::NumberOverflow(1 << 48))
        );
    }
}
