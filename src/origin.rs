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

//! Per-HTLC origin bookkeeping: why we accepted an HTLC and where its
//! eventual resolution must be delivered.
//!
//! Origins exist in two forms. The *hot* form carries a live reply token of
//! the command or relay context which created the HTLC; it can not cross a
//! persistence boundary. The *cold* form ([`Upstream`]) carries only the
//! data needed to resolve a downstream result back to its upstream and is
//! what every database write stores. After a restart the hot form is
//! reconstructed lazily through a [`ReplyRegistry`] keyed by the cold
//! form's identity.

use std::collections::BTreeMap;
use std::io;

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::{sha256, Hash};
use lnwire::ChannelId;
use strict_encoding::{StrictDecode, StrictEncode};

/// The persistable explanation of an accepted HTLC
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum Upstream {
    /// Payment initiated by the local node; `payment_id` is assigned by the
    /// sending application
    #[display("local({payment_id})")]
    Local { payment_id: Slice32 },

    /// HTLC relayed from another channel
    #[display("relayed({channel_id}, {htlc_id})")]
    Relayed {
        channel_id: ChannelId,
        htlc_id: u64,
        amount_in_msat: u64,
        amount_out_msat: u64,
    },

    /// Aggregate of several incoming HTLCs relayed as a single trampoline
    /// payment
    #[display("trampoline(...)")]
    Trampoline { incoming: Vec<(ChannelId, u64)> },
}

impl Upstream {
    /// Stable identity of the origin used for keying reply endpoints; the
    /// hash of the cold serialization
    pub fn identity(&self) -> Slice32 {
        let encoded = self
            .strict_serialize()
            .expect("in-memory strict encoding of origin data");
        Slice32::from_inner(sha256::Hash::hash(&encoded).into_inner())
    }
}

/// An origin as tracked inside the channel state: hot while the creating
/// context is live, cold after persistence or restart.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
pub enum Origin {
    /// Live origin with a reply token registered in the host's
    /// [`ReplyRegistry`]
    #[display("hot({upstream})")]
    Hot {
        /// Host-issued handle of the live reply endpoint
        reply_token: u64,
        upstream: Upstream,
    },

    /// Origin reconstructed from (or destined to) the database
    #[display("cold({0})")]
    Cold(Upstream),
}

impl Origin {
    #[inline]
    pub fn upstream(&self) -> &Upstream {
        match self {
            Origin::Hot { upstream, .. } => upstream,
            Origin::Cold(upstream) => upstream,
        }
    }

    #[inline]
    pub fn is_hot(&self) -> bool {
        matches!(self, Origin::Hot { .. })
    }

    /// Normalizes to the persistable form, dropping the transient reply
    /// token
    #[inline]
    pub fn freeze(self) -> Origin {
        match self {
            Origin::Hot { upstream, .. } => Origin::Cold(upstream),
            cold => cold,
        }
    }

    /// Reply token, present only in the hot form
    #[inline]
    pub fn reply_token(&self) -> Option<u64> {
        match self {
            Origin::Hot { reply_token, .. } => Some(*reply_token),
            Origin::Cold(_) => None,
        }
    }
}

// Persistence always writes the cold form: the serialization of a hot
// origin and of its frozen counterpart are byte-identical, and
// deserialization always produces the cold form.
impl StrictEncode for Origin {
    fn strict_encode<E: io::Write>(
        &self,
        e: E,
    ) -> Result<usize, strict_encoding::Error> {
        self.upstream().strict_encode(e)
    }
}

impl StrictDecode for Origin {
    fn strict_decode<D: io::Read>(
        d: D,
    ) -> Result<Self, strict_encoding::Error> {
        Ok(Origin::Cold(Upstream::strict_decode(d)?))
    }
}

/// Host-side lookup reconstructing live reply endpoints for cold origins.
///
/// `R` is the host's reply endpoint type (an actor address, a oneshot
/// sender etc). The registry is rebuilt on restart from the in-flight
/// command context and never persisted.
#[derive(Clone, Debug)]
pub struct ReplyRegistry<R> {
    endpoints: BTreeMap<Slice32, R>,
}

impl<R> Default for ReplyRegistry<R> {
    fn default() -> Self {
        ReplyRegistry {
            endpoints: bmap! {},
        }
    }
}

impl<R> ReplyRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live endpoint for the origin, replacing any previous one
    pub fn register(&mut self, upstream: &Upstream, endpoint: R) {
        self.endpoints.insert(upstream.identity(), endpoint);
    }

    /// Looks up the endpoint to deliver a resolution to
    pub fn resolve(&self, upstream: &Upstream) -> Option<&R> {
        self.endpoints.get(&upstream.identity())
    }

    /// Removes the endpoint once the HTLC is fully resolved
    pub fn forget(&mut self, upstream: &Upstream) -> Option<R> {
        self.endpoints.remove(&upstream.identity())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod test {
    use strict_encoding::{strict_deserialize, strict_serialize};

    use super::*;

    fn upstream() -> Upstream {
        Upstream::Relayed {
            channel_id: ChannelId::default(),
            htlc_id: 7,
            amount_in_msat: 100_000,
            amount_out_msat: 99_000,
        }
    }

    #[test]
    fn hot_origin_persists_as_cold() {
        let hot = Origin::Hot {
            reply_token: 42,
            upstream: upstream(),
        };
        let encoded = strict_serialize(&hot).unwrap();
        let decoded: Origin = strict_deserialize(&encoded).unwrap();
        // read-after-write observes the frozen form
        assert_eq!(decoded, hot.clone().freeze());
        assert!(!decoded.is_hot());
        assert_eq!(decoded.reply_token(), None);
        // and the blob is identical to what the cold form writes
        assert_eq!(
            encoded,
            strict_serialize(&Origin::Cold(upstream())).unwrap()
        );
    }

    #[test]
    fn identity_is_stable_and_distinct() {
        let a = upstream();
        let b = Upstream::Relayed {
            channel_id: ChannelId::default(),
            htlc_id: 8,
            amount_in_msat: 100_000,
            amount_out_msat: 99_000,
        };
        assert_eq!(a.identity(), upstream().identity());
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn registry_resolves_after_freeze() {
        let mut registry = ReplyRegistry::new();
        let hot = Origin::Hot {
            reply_token: 1,
            upstream: upstream(),
        };
        registry.register(hot.upstream(), "reply-endpoint");

        let cold = hot.freeze();
        assert_eq!(registry.resolve(cold.upstream()), Some(&"reply-endpoint"));
        assert_eq!(registry.forget(cold.upstream()), Some("reply-endpoint"));
        assert!(registry.is_empty());
    }
}
