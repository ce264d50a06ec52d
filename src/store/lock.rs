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

//! Lease lock guarding exclusive write access to a shared database
//! backend: a single row holding the holder id and the lease expiry. Only
//! the lease holder may write; on lock loss the process must stop writing
//! rather than diverge.

use amplify::Slice32;
use strict_encoding::{strict_deserialize, strict_serialize};

use super::{Driver, StoreError};

const LOCK_NAMESPACE: &str = "lease_lock";
const LOCK_KEY: &[u8] = b"lock";

/// The lease row
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[derive(StrictEncode, StrictDecode)]
struct LeaseRow {
    holder: Slice32,
    expires_at: i64,
}

/// What to do after a failed lock check; consulted through
/// [`LockFailureHandler`] on every check
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum LockAction {
    /// Log the failure and keep operating (dangerous; only for read-only
    /// tooling)
    #[display("log-and-continue")]
    LogAndContinue,

    /// Log and propagate the failure to the caller (the default)
    #[display("log-and-fail")]
    LogAndFail,

    /// The host must terminate the process
    #[display("exit")]
    Exit,
}

/// Decides the reaction to a lock failure; consulted on every lock check
pub trait LockFailureHandler {
    fn on_lock_failure(&self, error: &StoreError) -> LockAction;
}

/// The default handler: every lock failure is an error
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct LogAndFailHandler;

impl LockFailureHandler for LogAndFailHandler {
    fn on_lock_failure(&self, _error: &StoreError) -> LockAction {
        LockAction::LogAndFail
    }
}

/// Holder-side lease management. The host calls
/// [`LeaseGuard::check_and_renew`] before every write batch; wall-clock
/// time is passed in so the guard itself stays deterministic.
#[derive(Clone, Debug)]
pub struct LeaseGuard {
    holder: Slice32,
    lease_seconds: i64,
}

impl LeaseGuard {
    pub fn new(lease_seconds: i64) -> LeaseGuard {
        LeaseGuard {
            holder: Slice32::random(),
            lease_seconds,
        }
    }

    #[inline]
    pub fn holder(&self) -> Slice32 {
        self.holder
    }

    /// Takes the lease if it is free or expired
    pub fn acquire<D: Driver>(
        &self,
        driver: &mut D,
        now: i64,
    ) -> Result<(), StoreError> {
        if let Some(row) = driver.read(LOCK_NAMESPACE, LOCK_KEY)? {
            let lease: LeaseRow = strict_deserialize(&row)?;
            if lease.holder != self.holder && lease.expires_at > now {
                return Err(StoreError::LockLost);
            }
        }
        self.write_lease(driver, now)
    }

    /// Verifies we still hold the lease and extends it; on failure the
    /// handler decides whether the caller may proceed
    pub fn check_and_renew<D: Driver>(
        &self,
        driver: &mut D,
        now: i64,
        handler: &dyn LockFailureHandler,
    ) -> Result<LockAction, StoreError> {
        let held = match driver.read(LOCK_NAMESPACE, LOCK_KEY)? {
            None => false,
            Some(row) => {
                let lease: LeaseRow = strict_deserialize(&row)?;
                lease.holder == self.holder && lease.expires_at > now
            }
        };
        if held {
            self.write_lease(driver, now)?;
            return Ok(LockAction::LogAndContinue);
        }
        let error = StoreError::LockLost;
        match handler.on_lock_failure(&error) {
            LockAction::LogAndContinue => Ok(LockAction::LogAndContinue),
            LockAction::LogAndFail => Err(error),
            LockAction::Exit => Ok(LockAction::Exit),
        }
    }

    /// Releases the lease cooperatively (at clean shutdown)
    pub fn release<D: Driver>(
        &self,
        driver: &mut D,
    ) -> Result<(), StoreError> {
        driver.delete(LOCK_NAMESPACE, LOCK_KEY)
    }

    fn write_lease<D: Driver>(
        &self,
        driver: &mut D,
        now: i64,
    ) -> Result<(), StoreError> {
        let row = LeaseRow {
            holder: self.holder,
            expires_at: now + self.lease_seconds,
        };
        driver.write(LOCK_NAMESPACE, LOCK_KEY, strict_serialize(&row)?)
    }
}

#[cfg(test)]
mod test {
    use super::super::MemDriver;
    use super::*;

    #[test]
    fn lease_lifecycle() {
        let mut driver = MemDriver::new();
        let ours = LeaseGuard::new(60);
        let theirs = LeaseGuard::new(60);

        ours.acquire(&mut driver, 1000).unwrap();
        // a second process can not steal a live lease
        assert_eq!(
            theirs.acquire(&mut driver, 1010),
            Err(StoreError::LockLost)
        );
        // but takes over once it expires
        theirs.acquire(&mut driver, 1070).unwrap();

        // the original holder now fails its check with the default handler
        assert_eq!(
            ours.check_and_renew(&mut driver, 1080, &LogAndFailHandler),
            Err(StoreError::LockLost)
        );
    }

    #[test]
    fn renew_extends_the_lease() {
        let mut driver = MemDriver::new();
        let ours = LeaseGuard::new(60);
        ours.acquire(&mut driver, 1000).unwrap();
        assert_eq!(
            ours.check_and_renew(&mut driver, 1050, &LogAndFailHandler)
                .unwrap(),
            LockAction::LogAndContinue
        );
        // renewal at 1050 extends expiry to 1110
        let other = LeaseGuard::new(60);
        assert_eq!(
            other.acquire(&mut driver, 1100),
            Err(StoreError::LockLost)
        );
    }

    #[test]
    fn handler_decides_on_failure() {
        struct Continue;
        impl LockFailureHandler for Continue {
            fn on_lock_failure(&self, _: &StoreError) -> LockAction {
                LockAction::LogAndContinue
            }
        }
        struct Exit;
        impl LockFailureHandler for Exit {
            fn on_lock_failure(&self, _: &StoreError) -> LockAction {
                LockAction::Exit
            }
        }

        let mut driver = MemDriver::new();
        let stranger = LeaseGuard::new(60);
        // no lease was ever taken: every check fails
        assert_eq!(
            stranger
                .check_and_renew(&mut driver, 0, &Continue)
                .unwrap(),
            LockAction::LogAndContinue
        );
        assert_eq!(
            stranger.check_and_renew(&mut driver, 0, &Exit).unwrap(),
            LockAction::Exit
        );
        assert_eq!(
            stranger.check_and_renew(&mut driver, 0, &LogAndFailHandler),
            Err(StoreError::LockLost)
        );
    }

    #[test]
    fn release_frees_the_lease() {
        let mut driver = MemDriver::new();
        let ours = LeaseGuard::new(60);
        let theirs = LeaseGuard::new(60);
        ours.acquire(&mut driver, 1000).unwrap();
        ours.release(&mut driver).unwrap();
        theirs.acquire(&mut driver, 1001).unwrap();
    }
}
