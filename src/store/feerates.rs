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

//! Feerate estimations store: a single row keyed by confirmation target
//! column, refreshed on every estimator poll.

use strict_encoding::{strict_deserialize, strict_serialize};

use super::{open_versioned, Driver, StoreError};

/// Namespace and schema name of the feerates store
pub const FEERATES_SCHEMA: &str = "feerates";

/// Current schema version: v2 widened the row with the `blocks_1008`
/// column
pub const FEERATES_VERSION: u16 = 2;

const ROW_KEY: &[u8] = b"current";

/// Feerates per confirmation target, in satoshi per kiloweight
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Feerates {
    pub block_1: u32,
    pub blocks_2: u32,
    pub blocks_6: u32,
    pub blocks_12: u32,
    pub blocks_36: u32,
    pub blocks_72: u32,
    pub blocks_144: u32,
    pub blocks_1008: u32,
}

/// The v1 row shape, kept only for the migration path
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[derive(StrictEncode, StrictDecode)]
pub(super) struct FeeratesV1 {
    pub block_1: u32,
    pub blocks_2: u32,
    pub blocks_6: u32,
    pub blocks_12: u32,
    pub blocks_36: u32,
    pub blocks_72: u32,
    pub blocks_144: u32,
}

/// v1 → v2: widen the row; the new 1008-blocks column starts as a copy of
/// the slowest estimation v1 had
fn migrate_v1_to_v2<D: Driver>(driver: &mut D) -> Result<(), StoreError> {
    let row = match driver.read(FEERATES_SCHEMA, ROW_KEY)? {
        None => return Ok(()),
        Some(row) => row,
    };
    let old: FeeratesV1 = strict_deserialize(&row)?;
    let new = Feerates {
        block_1: old.block_1,
        blocks_2: old.blocks_2,
        blocks_6: old.blocks_6,
        blocks_12: old.blocks_12,
        blocks_36: old.blocks_36,
        blocks_72: old.blocks_72,
        blocks_144: old.blocks_144,
        blocks_1008: old.blocks_144,
    };
    driver.write(FEERATES_SCHEMA, ROW_KEY, strict_serialize(&new)?)
}

/// Single-row feerates store with versioned schema
pub struct FeeratesStore<D: Driver> {
    driver: D,
}

impl<D: Driver> FeeratesStore<D> {
    /// Opens the store, migrating older layouts
    pub fn open(mut driver: D) -> Result<FeeratesStore<D>, StoreError> {
        open_versioned(&mut driver, FEERATES_SCHEMA, FEERATES_VERSION, &[
            migrate_v1_to_v2::<D>,
        ])?;
        Ok(FeeratesStore { driver })
    }

    /// The current feerate row
    pub fn get_feerates(&self) -> Result<Feerates, StoreError> {
        let row = self
            .driver
            .read(FEERATES_SCHEMA, ROW_KEY)?
            .ok_or_else(|| StoreError::MissingRow(FEERATES_SCHEMA.to_string()))?;
        Ok(strict_deserialize(&row)?)
    }

    /// Replaces the row on a feerate refresh
    pub fn set_feerates(
        &mut self,
        feerates: Feerates,
    ) -> Result<(), StoreError> {
        self.driver.write(
            FEERATES_SCHEMA,
            ROW_KEY,
            strict_serialize(&feerates)?,
        )
    }
}
