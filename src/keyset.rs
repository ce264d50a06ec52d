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

//! Channel base keys and the per-commitment key tweaks of BOLT-3.

use std::collections::BTreeMap;

use amplify::{DumbDefault, Slice32, Wrapper};
#[cfg(feature = "serde")]
use amplify::ToYamlString;
use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::util::bip32::{ChildNumber, ExtendedPrivKey, KeySource};
use bitcoin_scripts::PubkeyScript;
use lnwire::bolt2::{AcceptChannel, ChannelType, OpenChannel};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey, SECP256K1};
use wallet::hd::HardenedIndex;

use crate::secrets::CommitmentSeed;

/// Key + information about its derivation
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Display, Serialize, Deserialize),
    serde(crate = "serde_crate"),
    display(LocalPubkey::to_yaml_string)
)]
pub struct LocalPubkey {
    pub key: PublicKey,
    pub source: KeySource,
}

impl LocalPubkey {
    #[inline]
    pub fn to_bip32_derivation_map(&self) -> BTreeMap<PublicKey, KeySource> {
        bmap! { self.key => self.source.clone() }
    }

    #[inline]
    pub fn to_bitcoin_pk(&self) -> bitcoin::PublicKey {
        bitcoin::PublicKey::new(self.key)
    }
}

/// Set of locally-controlled base keys used in channel transaction
/// construction
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Display, Serialize, Deserialize),
    serde(crate = "serde_crate"),
    display(LocalKeyset::to_yaml_string)
)]
pub struct LocalKeyset {
    /// Public key used in the funding outpoint multisig
    pub funding_pubkey: LocalPubkey,
    /// Base point for deriving keys used for penalty spending paths
    pub revocation_basepoint: LocalPubkey,
    /// Base point for deriving keys in `to_remote`
    pub payment_basepoint: LocalPubkey,
    /// Base point for deriving keys in `to_local` time-locked spending
    /// paths
    pub delayed_payment_basepoint: LocalPubkey,
    /// Base point for deriving HTLC-related keys
    pub htlc_basepoint: LocalPubkey,
    /// Commitment point to be used for the first commitment transaction
    pub first_per_commitment_point: LocalPubkey,
    /// Allows the sending node to commit to where funds will go on mutual
    /// close, which the remote node should enforce even if a node is
    /// compromised later.
    pub shutdown_scriptpubkey: Option<PubkeyScript>,
    /// If `option_static_remotekey` or `option_anchors` is negotiated, the
    /// remotepubkey is simply the remote node's payment_basepoint,
    /// otherwise it is calculated as above using the remote node's
    /// payment_basepoint.
    pub static_remotekey: bool,
}

/// Set of remote-controlled base keys, learned from `open_channel` or
/// `accept_channel`
#[derive(Clone, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
#[cfg_attr(
    feature = "serde",
    derive(Display, Serialize, Deserialize),
    serde(crate = "serde_crate"),
    display(RemoteKeyset::to_yaml_string)
)]
pub struct RemoteKeyset {
    /// Public key used in the funding outpoint multisig
    pub funding_pubkey: PublicKey,
    /// Base point for deriving keys used for penalty spending paths
    pub revocation_basepoint: PublicKey,
    /// Base point for deriving keys in `to_remote`
    pub payment_basepoint: PublicKey,
    /// Base point for deriving keys in `to_local` time-locked spending
    /// paths
    pub delayed_payment_basepoint: PublicKey,
    /// Base point for deriving HTLC-related keys
    pub htlc_basepoint: PublicKey,
    /// Commitment point for the first commitment transaction of the remote
    /// node
    pub first_per_commitment_point: PublicKey,
    /// Allows the sending node to commit to where funds will go on mutual
    /// close, which the remote node should enforce even if a node is
    /// compromised later.
    pub shutdown_scriptpubkey: Option<PubkeyScript>,
    /// If `option_static_remotekey` or `option_anchors` is negotiated, the
    /// remotepubkey is simply the remote node's payment_basepoint,
    /// otherwise it is calculated as above using the remote node's
    /// payment_basepoint.
    pub static_remotekey: bool,
}

#[cfg(feature = "serde")]
impl ToYamlString for LocalPubkey {}

#[cfg(feature = "serde")]
impl ToYamlString for LocalKeyset {}

#[cfg(feature = "serde")]
impl ToYamlString for RemoteKeyset {}

impl From<&OpenChannel> for RemoteKeyset {
    fn from(open_channel: &OpenChannel) -> Self {
        Self {
            funding_pubkey: open_channel.funding_pubkey,
            revocation_basepoint: open_channel.revocation_basepoint,
            payment_basepoint: open_channel.payment_point,
            delayed_payment_basepoint: open_channel.delayed_payment_basepoint,
            htlc_basepoint: open_channel.htlc_basepoint,
            first_per_commitment_point: open_channel
                .first_per_commitment_point,
            shutdown_scriptpubkey: open_channel.shutdown_scriptpubkey.clone(),
            static_remotekey: open_channel.has_static_remotekey(),
        }
    }
}

impl From<&AcceptChannel> for RemoteKeyset {
    fn from(accept_channel: &AcceptChannel) -> Self {
        Self {
            funding_pubkey: accept_channel.funding_pubkey,
            revocation_basepoint: accept_channel.revocation_basepoint,
            payment_basepoint: accept_channel.payment_point,
            delayed_payment_basepoint: accept_channel
                .delayed_payment_basepoint,
            htlc_basepoint: accept_channel.htlc_basepoint,
            first_per_commitment_point: accept_channel
                .first_per_commitment_point,
            shutdown_scriptpubkey: accept_channel
                .shutdown_scriptpubkey
                .clone(),
            static_remotekey: accept_channel
                .channel_type
                .map(ChannelType::has_static_remotekey)
                .unwrap_or_default(),
        }
    }
}

impl DumbDefault for LocalPubkey {
    fn dumb_default() -> Self {
        LocalPubkey {
            key: dumb_pubkey!(),
            source: KeySource::default(),
        }
    }
}

impl DumbDefault for LocalKeyset {
    fn dumb_default() -> Self {
        Self {
            funding_pubkey: DumbDefault::dumb_default(),
            revocation_basepoint: DumbDefault::dumb_default(),
            payment_basepoint: DumbDefault::dumb_default(),
            delayed_payment_basepoint: DumbDefault::dumb_default(),
            htlc_basepoint: DumbDefault::dumb_default(),
            first_per_commitment_point: DumbDefault::dumb_default(),
            shutdown_scriptpubkey: None,
            static_remotekey: false,
        }
    }
}

impl DumbDefault for RemoteKeyset {
    fn dumb_default() -> Self {
        Self {
            funding_pubkey: dumb_pubkey!(),
            revocation_basepoint: dumb_pubkey!(),
            payment_basepoint: dumb_pubkey!(),
            delayed_payment_basepoint: dumb_pubkey!(),
            htlc_basepoint: dumb_pubkey!(),
            first_per_commitment_point: dumb_pubkey!(),
            shutdown_scriptpubkey: None,
            static_remotekey: false,
        }
    }
}

/// Full set of channel-level secrets: base keys, their public keyset and
/// the per-commitment secret chain seed. Derived from a *channel extended
/// key* using hardened children 0..=5.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChannelDerivation {
    pub keyset: LocalKeyset,
    pub commitment_seed: CommitmentSeed,
    pub funding_seckey: SecretKey,
    pub payment_base_seckey: SecretKey,
    pub delayed_base_seckey: SecretKey,
    pub revocation_base_seckey: SecretKey,
    pub htlc_base_seckey: SecretKey,
}

impl ChannelDerivation {
    /// Derives the channel keyset from a channel extended private key
    pub fn with<C: secp256k1::Signing>(
        secp: &Secp256k1<C>,
        channel_source: KeySource,
        channel_xpriv: ExtendedPrivKey,
        shutdown_scriptpubkey: Option<PubkeyScript>,
    ) -> Self {
        let fingerprint = channel_source.0;

        let derive = |index: u16| -> (SecretKey, LocalPubkey) {
            let path = [ChildNumber::from(HardenedIndex::from(index))];
            let derivation_path =
                channel_source.1.clone().extend(path);
            let seckey = channel_xpriv
                .derive_priv(secp, &path)
                .expect("negligible probability")
                .private_key;
            let pubkey = LocalPubkey {
                key: PublicKey::from_secret_key(secp, &seckey),
                source: (fingerprint, derivation_path),
            };
            (seckey, pubkey)
        };

        let (funding_seckey, funding_pubkey) = derive(0);
        let (payment_base_seckey, payment_basepoint) = derive(1);
        let (delayed_base_seckey, delayed_payment_basepoint) = derive(2);
        let (revocation_base_seckey, revocation_basepoint) = derive(3);
        let (seed_seckey, _) = derive(4);
        let (htlc_base_seckey, htlc_basepoint) = derive(5);

        let commitment_seed = CommitmentSeed::with(Slice32::from_inner(
            seed_seckey.secret_bytes(),
        ));
        let first_point = commitment_seed.point(0);

        let keyset = LocalKeyset {
            funding_pubkey,
            revocation_basepoint,
            payment_basepoint,
            delayed_payment_basepoint,
            htlc_basepoint,
            first_per_commitment_point: LocalPubkey {
                key: first_point,
                source: (fingerprint, channel_source.1.clone()),
            },
            shutdown_scriptpubkey,
            static_remotekey: false,
        };

        ChannelDerivation {
            keyset,
            commitment_seed,
            funding_seckey,
            payment_base_seckey,
            delayed_base_seckey,
            revocation_base_seckey,
            htlc_base_seckey,
        }
    }
}

fn tweak_hash(
    per_commitment_point: &PublicKey,
    basepoint: &PublicKey,
) -> Scalar {
    let mut engine = sha256::Hash::engine();
    engine.input(&per_commitment_point.serialize());
    engine.input(&basepoint.serialize());
    let hash = sha256::Hash::from_engine(engine);
    Scalar::from_be_bytes(hash.into_inner()).expect("negligible probability")
}

/// `pubkey = basepoint + SHA256(per_commitment_point ‖ basepoint) · G`,
/// used for payment, delayed-payment and HTLC keys (BOLT-3)
pub fn derive_pubkey(
    basepoint: PublicKey,
    per_commitment_point: PublicKey,
) -> PublicKey {
    basepoint
        .add_exp_tweak(
            SECP256K1,
            &tweak_hash(&per_commitment_point, &basepoint),
        )
        .expect("negligible probability")
}

/// Private counterpart of [`derive_pubkey`]
pub fn derive_seckey(
    base_seckey: &SecretKey,
    per_commitment_point: PublicKey,
) -> SecretKey {
    let basepoint = PublicKey::from_secret_key(SECP256K1, base_seckey);
    base_seckey
        .add_tweak(&tweak_hash(&per_commitment_point, &basepoint))
        .expect("negligible probability")
}

/// `revocationpubkey = revocation_basepoint · SHA256(revocation_basepoint ‖
/// per_commitment_point) + per_commitment_point ·
/// SHA256(per_commitment_point ‖ revocation_basepoint)` (BOLT-3)
pub fn derive_revocation_pubkey(
    revocation_basepoint: PublicKey,
    per_commitment_point: PublicKey,
) -> PublicKey {
    let tweaked_basepoint = revocation_basepoint
        .mul_tweak(
            SECP256K1,
            &tweak_hash(&revocation_basepoint, &per_commitment_point),
        )
        .expect("negligible probability");
    let tweaked_point = per_commitment_point
        .mul_tweak(
            SECP256K1,
            &tweak_hash(&per_commitment_point, &revocation_basepoint),
        )
        .expect("negligible probability");
    tweaked_basepoint
        .combine(&tweaked_point)
        .expect("negligible probability")
}

/// Private counterpart of [`derive_revocation_pubkey`], computable only
/// with both the revocation base secret and the released per-commitment
/// secret of the counterparty
pub fn derive_revocation_seckey(
    revocation_base_seckey: &SecretKey,
    per_commitment_seckey: &SecretKey,
) -> SecretKey {
    let revocation_basepoint =
        PublicKey::from_secret_key(SECP256K1, revocation_base_seckey);
    let per_commitment_point =
        PublicKey::from_secret_key(SECP256K1, per_commitment_seckey);
    let part1 = revocation_base_seckey
        .mul_tweak(&tweak_hash(
            &revocation_basepoint,
            &per_commitment_point,
        ))
        .expect("negligible probability");
    let part2 = per_commitment_seckey
        .mul_tweak(&tweak_hash(
            &per_commitment_point,
            &revocation_basepoint,
        ))
        .expect("negligible probability");
    part1
        .add_tweak(
            &Scalar::from_be_bytes(part2.secret_bytes())
                .expect("secret key is always a valid scalar"),
        )
        .expect("negligible probability")
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use amplify::hex::FromHex;

    use super::*;

    fn sk(hex: &str) -> SecretKey {
        SecretKey::from_slice(&Vec::<u8>::from_hex(hex).unwrap()).unwrap()
    }

    fn pk(hex: &str) -> PublicKey {
        PublicKey::from_str(hex).unwrap()
    }

    // BOLT-3 key derivation test vectors
    fn base_secret() -> SecretKey {
        sk("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
    }

    fn per_commitment_secret() -> SecretKey {
        sk("1f1e1d1c1b1a191817161514131211100f0e0d0c0b0a09080706050403020100")
    }

    fn base_point() -> PublicKey {
        pk("036d6caac248af96f6afa7f904f550253a0f3ef3f5aa2fe6838a95b216691468e2")
    }

    fn per_commitment_point() -> PublicKey {
        pk("025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486")
    }

    #[test]
    fn bolt3_basepoints() {
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &base_secret()),
            base_point()
        );
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &per_commitment_secret()),
            per_commitment_point()
        );
    }

    #[test]
    fn bolt3_localpubkey_derivation() {
        assert_eq!(
            derive_pubkey(base_point(), per_commitment_point()),
            pk("0235f2dbfaa89b57ec7b055afe29849ef7ddfeb1cefdb9ebdc43f5494984db29e5")
        );
    }

    #[test]
    fn bolt3_localprivkey_derivation() {
        let seckey = derive_seckey(&base_secret(), per_commitment_point());
        assert_eq!(
            seckey,
            sk("cbced912d3b21bf196a766651e436aff192362621ce317704ea2f75d87e7be0f")
        );
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &seckey),
            derive_pubkey(base_point(), per_commitment_point())
        );
    }

    #[test]
    fn bolt3_revocationpubkey_derivation() {
        assert_eq!(
            derive_revocation_pubkey(base_point(), per_commitment_point()),
            pk("02916e326636d19c33f13e8c0c3a03dd157f332f3e99c317c141dd865eb01f8ff0")
        );
    }

    #[test]
    fn bolt3_revocationprivkey_derivation() {
        let seckey = derive_revocation_seckey(
            &base_secret(),
            &per_commitment_secret(),
        );
        assert_eq!(
            seckey,
            sk("d09ffff62ddb2297ab000cc85bcb4283fdeb6aa052affbc9dddcf33b61078110")
        );
        assert_eq!(
            PublicKey::from_secret_key(SECP256K1, &seckey),
            derive_revocation_pubkey(base_point(), per_commitment_point())
        );
    }

    #[test]
    fn channel_derivation_is_deterministic() {
        let secp = Secp256k1::new();
        let xpriv = ExtendedPrivKey::new_master(
            bitcoin::Network::Regtest,
            &[42u8; 32],
        )
        .unwrap();
        let d1 = ChannelDerivation::with(
            &secp,
            KeySource::default(),
            xpriv,
            None,
        );
        let d2 = ChannelDerivation::with(
            &secp,
            KeySource::default(),
            xpriv,
            None,
        );
        assert_eq!(d1, d2);
        assert_eq!(
            d1.keyset.first_per_commitment_point.key,
            d1.commitment_seed.point(0)
        );
        assert_eq!(
            d1.keyset.funding_pubkey.key,
            PublicKey::from_secret_key(&secp, &d1.funding_seckey)
        );
    }
}
