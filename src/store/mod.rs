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

//! Persistence interfaces of the channel core.
//!
//! The stores operate over a namespaced key-value [`Driver`]; production
//! deployments provide SQL-backed drivers, tests and embedded setups use
//! [`MemDriver`]. Every store keeps a `version` row inside the shared
//! `versions` namespace; on open a linear chain of migrations upgrades
//! older layouts, and a version newer than the code supports is a fatal
//! open error.

mod feerates;
mod lock;

pub use feerates::{Feerates, FeeratesStore, FEERATES_SCHEMA};
pub use lock::{
    LeaseGuard, LockAction, LockFailureHandler, LogAndFailHandler,
};

use std::collections::BTreeMap;

use amplify::Wrapper;
use lnwire::ChannelId;
use strict_encoding::{strict_deserialize, strict_serialize};

use crate::state::ChannelState;

/// Namespace of the schema-version metadata rows shared by all stores
pub const VERSIONS_NAMESPACE: &str = "versions";

/// Namespace and schema name of the channels store
pub const CHANNELS_SCHEMA: &str = "channels";

/// Current schema version of the channels store
pub const CHANNELS_VERSION: u16 = 1;

/// Errors of the persistence layer
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum StoreError {
    /// storage driver failure: {0}
    Driver(String),

    /// state serialization failure: {0}
    #[from]
    Encoding(strict_encoding::Error),

    /// database schema `{schema}` has version {found} which is newer than
    /// the highest supported version {supported}; refusing to open
    FutureVersion {
        schema: String,
        found: u16,
        supported: u16,
    },

    /// no migration path from version {from} of schema `{schema}`
    NoMigrationPath { schema: String, from: u16 },

    /// stored row for schema `{0}` is missing
    MissingRow(String),

    /// the database lease lock is held by another process
    LockLost,
}

/// Namespaced key-value storage driver. Writes must be atomic per key and
/// durable once the call returns.
pub trait Driver {
    fn read(
        &self,
        namespace: &str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError>;
    fn write(
        &mut self,
        namespace: &str,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), StoreError>;
    fn delete(&mut self, namespace: &str, key: &[u8])
        -> Result<(), StoreError>;
    fn list(&self, namespace: &str) -> Result<Vec<Vec<u8>>, StoreError>;
}

/// In-memory driver backing tests and throwaway setups
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MemDriver {
    rows: BTreeMap<(String, Vec<u8>), Vec<u8>>,
}

impl MemDriver {
    pub fn new() -> MemDriver {
        MemDriver::default()
    }
}

impl Driver for MemDriver {
    fn read(
        &self,
        namespace: &str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .rows
            .get(&(namespace.to_owned(), key.to_vec()))
            .cloned())
    }

    fn write(
        &mut self,
        namespace: &str,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.rows
            .insert((namespace.to_owned(), key.to_vec()), value);
        Ok(())
    }

    fn delete(
        &mut self,
        namespace: &str,
        key: &[u8],
    ) -> Result<(), StoreError> {
        self.rows.remove(&(namespace.to_owned(), key.to_vec()));
        Ok(())
    }

    fn list(&self, namespace: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .rows
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect())
    }
}

/// Reads the stored version of a schema, if the schema was initialized
pub fn schema_version<D: Driver>(
    driver: &D,
    schema: &str,
) -> Result<Option<u16>, StoreError> {
    Ok(driver
        .read(VERSIONS_NAMESPACE, schema.as_bytes())?
        .map(|row| {
            let mut buf = [0u8; 2];
            buf.copy_from_slice(&row[..2.min(row.len())]);
            u16::from_be_bytes(buf)
        }))
}

fn set_schema_version<D: Driver>(
    driver: &mut D,
    schema: &str,
    version: u16,
) -> Result<(), StoreError> {
    driver.write(
        VERSIONS_NAMESPACE,
        schema.as_bytes(),
        version.to_be_bytes().to_vec(),
    )
}

/// Opens a schema, applying the linear migration chain when the stored
/// version is older than `current` and failing when it is newer.
///
/// `migrations[i]` upgrades version `i + 1` to `i + 2`; a fresh database
/// is initialized straight at `current`.
pub fn open_versioned<D: Driver>(
    driver: &mut D,
    schema: &str,
    current: u16,
    migrations: &[fn(&mut D) -> Result<(), StoreError>],
) -> Result<(), StoreError> {
    let stored = match schema_version(driver, schema)? {
        None => {
            set_schema_version(driver, schema, current)?;
            return Ok(());
        }
        Some(stored) => stored,
    };
    if stored > current {
        return Err(StoreError::FutureVersion {
            schema: schema.to_owned(),
            found: stored,
            supported: current,
        });
    }
    let mut version = stored;
    while version < current {
        let step = migrations.get(version as usize - 1).ok_or_else(|| {
            StoreError::NoMigrationPath {
                schema: schema.to_owned(),
                from: version,
            }
        })?;
        step(driver)?;
        version += 1;
        set_schema_version(driver, schema, version)?;
    }
    Ok(())
}

/// The channels database: one row per channel holding the state tag plus
/// the strict-encoded state blob.
///
/// Rows are single-writer: only the channel machine owning a channel id may
/// write its row. Serialization goes through the state's cold-origin
/// normalization, so a read-after-write round trip always observes
/// [`ChannelState::freeze`]d data.
pub struct ChannelStore<D: Driver> {
    driver: D,
}

impl<D: Driver> ChannelStore<D> {
    /// Opens the store, initializing or migrating the schema
    pub fn open(mut driver: D) -> Result<ChannelStore<D>, StoreError> {
        open_versioned(&mut driver, CHANNELS_SCHEMA, CHANNELS_VERSION, &[])?;
        Ok(ChannelStore { driver })
    }

    pub fn put(
        &mut self,
        channel_id: ChannelId,
        state: &ChannelState,
    ) -> Result<(), StoreError> {
        let mut row = vec![state.state_tag()];
        row.extend(strict_serialize(state)?);
        self.driver
            .write(CHANNELS_SCHEMA, channel_id.as_slice32().as_ref(), row)
    }

    pub fn get(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<ChannelState>, StoreError> {
        let row = match self
            .driver
            .read(CHANNELS_SCHEMA, channel_id.as_slice32().as_ref())?
        {
            None => return Ok(None),
            Some(row) => row,
        };
        let state: ChannelState = strict_deserialize(&row[1..])?;
        debug_assert_eq!(row[0], state.state_tag());
        Ok(Some(state))
    }

    pub fn delete(
        &mut self,
        channel_id: ChannelId,
    ) -> Result<(), StoreError> {
        self.driver
            .delete(CHANNELS_SCHEMA, channel_id.as_slice32().as_ref())
    }

    /// Channel ids of every persisted channel
    pub fn list(&self) -> Result<Vec<ChannelId>, StoreError> {
        Ok(self
            .driver
            .list(CHANNELS_SCHEMA)?
            .into_iter()
            .filter_map(|key| {
                amplify::Slice32::from_slice(&key).map(ChannelId::from_inner)
            })
            .collect())
    }

    /// Raw state tag of a row, without decoding the blob
    pub fn state_tag(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<u8>, StoreError> {
        Ok(self
            .driver
            .read(CHANNELS_SCHEMA, channel_id.as_slice32().as_ref())?
            .and_then(|row| row.first().copied()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::ChannelState;

    #[test]
    fn fresh_schema_is_initialized_at_current_version() {
        let mut driver = MemDriver::new();
        open_versioned(&mut driver, "test", 3, &[]).unwrap();
        assert_eq!(schema_version(&driver, "test").unwrap(), Some(3));
    }

    #[test]
    fn future_version_is_fatal() {
        let mut driver = MemDriver::new();
        open_versioned(&mut driver, "test", 5, &[]).unwrap();
        let err = open_versioned(&mut driver, "test", 4, &[]).unwrap_err();
        assert_eq!(err, StoreError::FutureVersion {
            schema: s!("test"),
            found: 5,
            supported: 4,
        });
    }

    #[test]
    fn missing_migration_step_is_detected() {
        let mut driver = MemDriver::new();
        open_versioned(&mut driver, "test", 1, &[]).unwrap();
        let err = open_versioned(&mut driver, "test", 2, &[]).unwrap_err();
        assert_eq!(err, StoreError::NoMigrationPath {
            schema: s!("test"),
            from: 1,
        });
    }

    #[test]
    fn channel_roundtrip_observes_cold_state() {
        let mut store = ChannelStore::open(MemDriver::new()).unwrap();
        let channel_id = ChannelId::default();
        let state = ChannelState::Closed {
            channel_id: Some(channel_id),
            spending_txid: None,
        };
        store.put(channel_id, &state).unwrap();
        assert_eq!(store.get(channel_id).unwrap(), Some(state.clone()));
        assert_eq!(
            store.state_tag(channel_id).unwrap(),
            Some(state.state_tag())
        );
        assert_eq!(store.list().unwrap(), vec![channel_id]);
        store.delete(channel_id).unwrap();
        assert_eq!(store.get(channel_id).unwrap(), None);
    }
}
