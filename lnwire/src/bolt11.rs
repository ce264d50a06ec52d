// LNP wire library implementing lightning network peer protocol messages
// (BOLT-1, 2, 9) and payment invoices (BOLT-11)
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

//! BOLT-11 payment invoice codec.
//!
//! The parser is written for round-trip fidelity: everything which is read
//! from an invoice string — including fields with tags unknown to this
//! implementation and known tags with invalid payload lengths — is preserved
//! and re-serialized byte-exactly. Semantic accessors operate only on the
//! recognized, valid fields, first occurrence winning.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use amplify::Slice32;
use bech32::Variant;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::{PubkeyHash, ScriptHash};
use chrono::Utc;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use crate::bolt9::{self, Feature, Features};
use crate::ShortChannelId;

/// Default ceiling for feature bits which may be set on a newly constructed
/// invoice. The value is a local safety policy, not a protocol constant, and
/// can be overridden with [`InvoiceBuilder::feature_ceiling`].
pub const MAX_INVOICE_FEATURE_BIT: u16 = 127;

/// Default invoice expiry when no `x` field is present, in seconds
pub const DEFAULT_EXPIRY: u64 = 3600;

/// Default `min_final_cltv_expiry` when no `c` field is present, in blocks
pub const DEFAULT_MIN_FINAL_CLTV_EXPIRY: u64 = 18;

/// One bitcoin in millisatoshis; invoice amounts may never have finer than
/// millisatoshi precision
const MSAT_PER_BTC: u64 = 100_000_000_000;

// Tag values are bech32 character indexes of the human-readable tag letters
const TAG_PAYMENT_HASH: u8 = 1; // p
const TAG_ROUTE_HINT: u8 = 3; // r
const TAG_FEATURES: u8 = 5; // 9
const TAG_EXPIRY: u8 = 6; // x
const TAG_FALLBACK: u8 = 9; // f
const TAG_DESCRIPTION: u8 = 13; // d
const TAG_PAYMENT_SECRET: u8 = 16; // s
const TAG_NODE_ID: u8 = 19; // n
const TAG_DESCRIPTION_HASH: u8 = 23; // h
const TAG_MIN_FINAL_CLTV: u8 = 24; // c
const TAG_METADATA: u8 = 27; // m

/// Errors happening during invoice string parsing
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ParseError {
    /// invalid bech32 string: {0}
    #[from]
    Bech32(bech32::Error),

    /// invoice checksum uses bech32m variant not allowed by BOLT-11
    Bech32m,

    /// invoice string mixes character cases
    MixedCase,

    /// invoice human-readable part `{0}` does not start with a known chain
    /// prefix
    BadPrefix(String),

    /// invoice amount `{0}` is not a valid decimal number
    BadAmount(String),

    /// unknown amount multiplier `{0}`
    UnknownUnit(char),

    /// invoice amount has a sub-millisatoshi precision
    SubMillisatoshi,

    /// invoice amount overflows 64-bit millisatoshi value
    AmountOverflow,

    /// invoice data part is too short to contain a timestamp and a signature
    TooShort,

    /// tagged field length exceeds the rest of the data part
    InvalidTagLength,

    /// byte-aligned tag payload has non-zero padding bits
    BadPadding,

    /// signature recovery id {0} is out of the supported 0..=3 range
    BadRecoveryId(u8),

    /// invalid invoice signature: {0}
    #[from]
    Signature(secp256k1::Error),

    /// node id recovered from the invoice signature does not match the `n`
    /// field
    NodeIdMismatch,
}

/// Errors happening during construction of a new invoice
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum CreationError {
    /// invoices require a payment secret (BOLT-9 `payment_secret` feature is
    /// mandatory)
    NoPaymentSecret,

    /// invoices require a payment hash
    NoPaymentHash,

    /// either a description or a description hash must be provided
    NoDescription,

    /// description and description hash are mutually exclusive
    DescriptionConflict,

    /// tagged field payload of {0} 5-bit symbols does not fit into the
    /// 10-bit length
    OversizedField(usize),

    /// invoice feature problem: {0}
    #[from]
    Features(bolt9::Error),

    /// invoice is not signed
    Unsigned,
}

/// Network prefix of the invoice human-readable part
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum Network {
    /// Bitcoin mainnet (`lnbc`)
    #[display("bc")]
    Bitcoin,

    /// Bitcoin testnet (`lntb`)
    #[display("tb")]
    Testnet,

    /// Bitcoin signet (`lntbs`)
    #[display("tbs")]
    Signet,

    /// Bitcoin regtest (`lnbcrt`)
    #[display("bcrt")]
    Regtest,
}

impl Network {
    /// Splits the part of the HRP after `ln` into the network prefix and the
    /// remaining amount string. Longer prefixes must match first since
    /// `bcrt` shadows `bc` and `tbs` shadows `tb`.
    fn split_hrp(hrp: &str) -> Result<(Network, &str), ParseError> {
        for (prefix, network) in [
            ("bcrt", Network::Regtest),
            ("bc", Network::Bitcoin),
            ("tbs", Network::Signet),
            ("tb", Network::Testnet),
        ] {
            if let Some(rest) = hrp.strip_prefix(prefix) {
                return Ok((network, rest));
            }
        }
        Err(ParseError::BadPrefix(format!("ln{}", hrp)))
    }
}

impl From<bitcoin::Network> for Network {
    fn from(network: bitcoin::Network) -> Self {
        match network {
            bitcoin::Network::Bitcoin => Network::Bitcoin,
            bitcoin::Network::Testnet => Network::Testnet,
            bitcoin::Network::Signet => Network::Signet,
            bitcoin::Network::Regtest => Network::Regtest,
        }
    }
}

impl From<Network> for bitcoin::Network {
    fn from(network: Network) -> Self {
        match network {
            Network::Bitcoin => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

/// On-chain fallback address from the `f` tagged field
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Fallback {
    /// Pay-to-pubkey-hash address (version symbol 17)
    PubkeyHash(PubkeyHash),

    /// Pay-to-script-hash address (version symbol 18)
    ScriptHash(ScriptHash),

    /// Native segwit program of versions 0..=16
    SegWit { version: u8, program: Vec<u8> },
}

/// A single hop of a private routing hint from the `r` tagged field
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RouteHop {
    /// Node at the start of the channel
    pub src_node_id: PublicKey,

    /// Channel to route through
    pub short_channel_id: ShortChannelId,

    /// Base routing fee, in millisatoshi
    pub fee_base_msat: u32,

    /// Proportional routing fee, in millionths of the payment amount
    pub fee_proportional_millionths: u32,

    /// CLTV difference this hop requires
    pub cltv_expiry_delta: u16,
}

/// Tagged field of the invoice data part.
///
/// `Unknown` covers three reader situations mandated by BOLT-11: tags this
/// implementation does not recognize, recognized tags with invalid payload
/// lengths, and duplicates of already-seen recognized tags. All of them
/// round-trip through parse/encode without loss.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Field {
    /// `p`: sha256 hash locking all HTLCs of the payment
    PaymentHash(sha256::Hash),

    /// `s`: payment secret expected inside the final onion payload
    PaymentSecret(Slice32),

    /// `d`: short human-readable description of the payment purpose
    Description(String),

    /// `h`: sha256 hash of a longer out-of-band description
    DescriptionHash(sha256::Hash),

    /// `n`: explicit node id of the payee
    NodeId(PublicKey),

    /// `x`: invoice expiry in seconds since the timestamp
    Expiry(u64),

    /// `c`: minimal CLTV expiry delta for the final HTLC
    MinFinalCltvExpiry(u64),

    /// `f`: on-chain fallback address
    Fallback(Fallback),

    /// `r`: private routing hint
    Route(Vec<RouteHop>),

    /// `m`: additional metadata to put into the payment onion
    Metadata(Vec<u8>),

    /// `9`: feature bits applying to the payment
    Features(Features),

    /// Preserved raw field: unknown tag, invalid payload length of a known
    /// tag, or a duplicate of a previously seen tag
    Unknown {
        /// 5-bit tag value
        tag: u8,
        /// Raw payload as 5-bit symbols
        payload: Vec<u8>,
    },
}

/// Recoverable invoice signature: 64 compact signature bytes plus one
/// recovery id byte.
///
/// An all-zero value is the *unsigned* intermediate form which may exist
/// only while an invoice is being constructed; [`Invoice::serialize_signed`]
/// refuses to produce a string for it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct InvoiceSignature([u8; 65]);

impl InvoiceSignature {
    /// The unsigned placeholder
    pub fn zero() -> InvoiceSignature {
        InvoiceSignature([0u8; 65])
    }

    /// Detects the unsigned placeholder
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 65]
    }

    pub fn from_bytes(bytes: [u8; 65]) -> InvoiceSignature {
        InvoiceSignature(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn from_recoverable(sig: RecoverableSignature) -> InvoiceSignature {
        let (recid, compact) = sig.serialize_compact();
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = recid.to_i32() as u8;
        InvoiceSignature(bytes)
    }

    pub fn to_recoverable(
        &self,
    ) -> Result<RecoverableSignature, ParseError> {
        let recid = self.0[64];
        if recid > 3 {
            return Err(ParseError::BadRecoveryId(recid));
        }
        let recid = RecoveryId::from_i32(recid as i32)?;
        Ok(RecoverableSignature::from_compact(&self.0[..64], recid)?)
    }
}

/// Structured BOLT-11 invoice.
///
/// Equality covers the full information content of the invoice string, so
/// `parse(encode(i)) == i` for every valid invoice.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Invoice {
    network: Network,
    amount_msat: Option<u64>,
    timestamp: u64,
    fields: Vec<Field>,
    signature: InvoiceSignature,
}

impl Invoice {
    #[inline]
    pub fn network(&self) -> Network {
        self.network
    }

    /// Amount in millisatoshi; `None` for donation-style invoices with
    /// unspecified amount
    #[inline]
    pub fn amount_msat(&self) -> Option<u64> {
        self.amount_msat
    }

    /// Invoice creation time, in seconds since the epoch (35-bit value)
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// All tagged fields in their original order
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[inline]
    pub fn signature(&self) -> InvoiceSignature {
        self.signature
    }

    /// Detects whether the invoice carries a real signature
    #[inline]
    pub fn is_signed(&self) -> bool {
        !self.signature.is_zero()
    }

    pub fn payment_hash(&self) -> Option<sha256::Hash> {
        self.fields.iter().find_map(|field| match field {
            Field::PaymentHash(hash) => Some(*hash),
            _ => None,
        })
    }

    pub fn payment_secret(&self) -> Option<Slice32> {
        self.fields.iter().find_map(|field| match field {
            Field::PaymentSecret(secret) => Some(*secret),
            _ => None,
        })
    }

    pub fn description(&self) -> Option<&str> {
        self.fields.iter().find_map(|field| match field {
            Field::Description(d) => Some(d.as_str()),
            _ => None,
        })
    }

    pub fn description_hash(&self) -> Option<sha256::Hash> {
        self.fields.iter().find_map(|field| match field {
            Field::DescriptionHash(hash) => Some(*hash),
            _ => None,
        })
    }

    /// Node id from the explicit `n` field, if present
    pub fn node_id_field(&self) -> Option<PublicKey> {
        self.fields.iter().find_map(|field| match field {
            Field::NodeId(id) => Some(*id),
            _ => None,
        })
    }

    /// Expiry in seconds after [`Invoice::timestamp`]
    pub fn expiry(&self) -> u64 {
        self.fields
            .iter()
            .find_map(|field| match field {
                Field::Expiry(x) => Some(*x),
                _ => None,
            })
            .unwrap_or(DEFAULT_EXPIRY)
    }

    pub fn min_final_cltv_expiry(&self) -> u64 {
        self.fields
            .iter()
            .find_map(|field| match field {
                Field::MinFinalCltvExpiry(c) => Some(*c),
                _ => None,
            })
            .unwrap_or(DEFAULT_MIN_FINAL_CLTV_EXPIRY)
    }

    pub fn features(&self) -> Option<&Features> {
        self.fields.iter().find_map(|field| match field {
            Field::Features(features) => Some(features),
            _ => None,
        })
    }

    pub fn route_hints(&self) -> Vec<&[RouteHop]> {
        self.fields
            .iter()
            .filter_map(|field| match field {
                Field::Route(hops) => Some(hops.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn fallbacks(&self) -> Vec<&Fallback> {
        self.fields
            .iter()
            .filter_map(|field| match field {
                Field::Fallback(fallback) => Some(fallback),
                _ => None,
            })
            .collect()
    }

    pub fn metadata(&self) -> Option<&[u8]> {
        self.fields.iter().find_map(|field| match field {
            Field::Metadata(m) => Some(m.as_slice()),
            _ => None,
        })
    }

    /// An invoice is payable by this node when its feature vector does not
    /// demand anything we do not implement (odd unknown bits are tolerated,
    /// even unknown bits are not)
    pub fn is_payable(&self) -> bool {
        self.features()
            .map(|features| features.check_supported().is_ok())
            .unwrap_or(true)
    }

    /// Human-readable part of the serialized invoice
    pub fn hrp(&self) -> String {
        let mut hrp = format!("ln{}", self.network);
        if let Some(msat) = self.amount_msat {
            hrp.push_str(&amount_to_hrp(msat));
        }
        hrp
    }

    /// Data part of the serialized invoice (without the signature), as
    /// 5-bit symbols
    fn data_part(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(128);
        for shift in (0..7).rev() {
            data.push(((self.timestamp >> (shift * 5)) & 31) as u8);
        }
        for field in &self.fields {
            let (tag, payload) = serialize_field(field);
            data.push(tag);
            data.push((payload.len() >> 5) as u8);
            data.push((payload.len() & 31) as u8);
            data.extend(payload);
        }
        data
    }

    /// Message which the invoice signature commits to:
    /// `sha256(hrp ‖ data-part-bits-packed-into-bytes)`
    pub fn signable_hash(&self) -> sha256::Hash {
        let mut engine = sha256::Hash::engine();
        use bitcoin::hashes::HashEngine;
        engine.input(self.hrp().as_bytes());
        engine.input(&pack_u5(&self.data_part()));
        sha256::Hash::from_engine(engine)
    }

    /// Signs the invoice with the provided key using deterministic
    /// recoverable ECDSA
    pub fn sign(mut self, key: &SecretKey) -> Invoice {
        let msg = Message::from_slice(&self.signable_hash()[..])
            .expect("sha256 is a valid 32-byte message");
        let sig = SECP256K1.sign_ecdsa_recoverable(&msg, key);
        self.signature = InvoiceSignature::from_recoverable(sig);
        self
    }

    /// Verifies the signature, returning the payee node id recovered from
    /// it. If the invoice carries an `n` field the recovered id must match.
    pub fn check_signature(&self) -> Result<PublicKey, ParseError> {
        let sig = self.signature.to_recoverable()?;
        let msg = Message::from_slice(&self.signable_hash()[..])
            .expect("sha256 is a valid 32-byte message");
        let node_id = SECP256K1.recover_ecdsa(&msg, &sig)?;
        if let Some(stated) = self.node_id_field() {
            if stated != node_id {
                return Err(ParseError::NodeIdMismatch);
            }
        }
        Ok(node_id)
    }

    /// Node id of the payee: the explicit `n` field if present, otherwise
    /// the id recovered from the signature
    pub fn payee_node_id(&self) -> Result<PublicKey, ParseError> {
        if let Some(node_id) = self.node_id_field() {
            return Ok(node_id);
        }
        self.check_signature()
    }

    /// Serializes the invoice, failing if it is still in the unsigned
    /// intermediate form. This is the only form which may leave the node.
    pub fn serialize_signed(&self) -> Result<String, CreationError> {
        if !self.is_signed() {
            return Err(CreationError::Unsigned);
        }
        Ok(self.to_string())
    }
}

impl Display for Invoice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut data = self.data_part();
        data.extend(unpack_u5(&self.signature.0[..]));
        let data = data
            .into_iter()
            .map(|sym| {
                bech32::u5::try_from_u8(sym)
                    .expect("serializer produces only 5-bit values")
            })
            .collect::<Vec<_>>();
        let s = bech32::encode(&self.hrp(), data, Variant::Bech32)
            .expect("HRP is always non-empty and valid");
        f.write_str(&s)
    }
}

impl FromStr for Invoice {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let has_lower = s.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = s.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper {
            return Err(ParseError::MixedCase);
        }
        let s = s.to_ascii_lowercase();

        let (hrp, data, variant) = bech32::decode(&s)?;
        if variant != Variant::Bech32 {
            return Err(ParseError::Bech32m);
        }
        let data = data.into_iter().map(|u| u.to_u8()).collect::<Vec<u8>>();

        let rest = hrp
            .strip_prefix("ln")
            .ok_or_else(|| ParseError::BadPrefix(hrp.clone()))?;
        let (network, amount_str) = Network::split_hrp(rest)?;
        let amount_msat = amount_from_hrp(amount_str)?;

        if data.len() < 7 + 104 {
            return Err(ParseError::TooShort);
        }
        let timestamp = data[..7]
            .iter()
            .fold(0u64, |acc, &sym| (acc << 5) | sym as u64);

        let sig_bytes = strict_bytes_from_u5(&data[data.len() - 104..])
            .expect("520 bits are byte-aligned");
        let mut signature = [0u8; 65];
        signature.copy_from_slice(&sig_bytes);

        let fields = parse_fields(&data[7..data.len() - 104])?;

        let invoice = Invoice {
            network,
            amount_msat,
            timestamp,
            fields,
            signature: InvoiceSignature::from_bytes(signature),
        };

        // The unsigned intermediate form is accepted for locally produced
        // data; anything else must carry a recoverable signature matching
        // the stated node id
        if invoice.is_signed() {
            invoice.check_signature()?;
        }

        Ok(invoice)
    }
}

/// Summary of an invoice in the form used for route construction and HTLC
/// composition
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[display("pay {amount_msat} msat to {node_id} locked by {payment_hash}")]
pub struct PaymentRequest {
    /// Amount to pay
    pub amount_msat: u64,

    /// The hash lock for the payment
    pub payment_hash: sha256::Hash,

    /// Destination node id
    pub node_id: PublicKey,

    /// Minimal CLTV expiry that should be used at the destination.
    ///
    /// The actual CLTV used in the offered HTLC may be larger due to
    /// `cltv_delta`s on a route.
    pub min_final_cltv_expiry: u32,
}

// ------------------------------------------------------------------------
// Field serialization

fn serialize_field(field: &Field) -> (u8, Vec<u8>) {
    match field {
        Field::PaymentHash(hash) => (TAG_PAYMENT_HASH, unpack_u5(&hash[..])),
        Field::PaymentSecret(secret) => {
            (TAG_PAYMENT_SECRET, unpack_u5(secret.as_ref()))
        }
        Field::Description(d) => (TAG_DESCRIPTION, unpack_u5(d.as_bytes())),
        Field::DescriptionHash(hash) => {
            (TAG_DESCRIPTION_HASH, unpack_u5(&hash[..]))
        }
        Field::NodeId(node_id) => {
            (TAG_NODE_ID, unpack_u5(&node_id.serialize()))
        }
        Field::Expiry(x) => (TAG_EXPIRY, unpack_int(*x)),
        Field::MinFinalCltvExpiry(c) => (TAG_MIN_FINAL_CLTV, unpack_int(*c)),
        Field::Fallback(fallback) => {
            let (version, program) = match fallback {
                Fallback::PubkeyHash(hash) => (17u8, hash[..].to_vec()),
                Fallback::ScriptHash(hash) => (18u8, hash[..].to_vec()),
                Fallback::SegWit { version, program } => {
                    (*version, program.clone())
                }
            };
            let mut payload = vec![version];
            payload.extend(unpack_u5(&program));
            (TAG_FALLBACK, payload)
        }
        Field::Route(hops) => {
            let mut bytes = Vec::with_capacity(hops.len() * 51);
            for hop in hops {
                bytes.extend(hop.src_node_id.serialize());
                bytes.extend(hop.short_channel_id.into_u64().to_be_bytes());
                bytes.extend(hop.fee_base_msat.to_be_bytes());
                bytes.extend(hop.fee_proportional_millionths.to_be_bytes());
                bytes.extend(hop.cltv_expiry_delta.to_be_bytes());
            }
            (TAG_ROUTE_HINT, unpack_u5(&bytes))
        }
        Field::Metadata(m) => (TAG_METADATA, unpack_u5(m)),
        Field::Features(features) => {
            (TAG_FEATURES, features_to_u5(features))
        }
        Field::Unknown { tag, payload } => (*tag, payload.clone()),
    }
}

fn parse_fields(mut data: &[u8]) -> Result<Vec<Field>, ParseError> {
    let mut fields = Vec::new();
    while !data.is_empty() {
        if data.len() < 3 {
            return Err(ParseError::InvalidTagLength);
        }
        let tag = data[0];
        let len = ((data[1] as usize) << 5) | data[2] as usize;
        if data.len() < 3 + len {
            return Err(ParseError::InvalidTagLength);
        }
        let payload = &data[3..3 + len];
        data = &data[3 + len..];

        let duplicate = fields.iter().any(|known| field_tag(known) == tag);
        let field = if duplicate {
            Field::Unknown {
                tag,
                payload: payload.to_vec(),
            }
        } else {
            parse_field(tag, payload)?
        };
        fields.push(field);
    }
    Ok(fields)
}

/// Tag of the *recognized* field variants; raw fields return an always
/// non-matching sentinel so duplicates of unknown tags stay untouched
fn field_tag(field: &Field) -> u8 {
    match field {
        Field::PaymentHash(_) => TAG_PAYMENT_HASH,
        Field::PaymentSecret(_) => TAG_PAYMENT_SECRET,
        Field::Description(_) => TAG_DESCRIPTION,
        Field::DescriptionHash(_) => TAG_DESCRIPTION_HASH,
        Field::NodeId(_) => TAG_NODE_ID,
        Field::Expiry(_) => TAG_EXPIRY,
        Field::MinFinalCltvExpiry(_) => TAG_MIN_FINAL_CLTV,
        Field::Fallback(_) => TAG_FALLBACK,
        Field::Route(_) => TAG_ROUTE_HINT,
        Field::Metadata(_) => TAG_METADATA,
        Field::Features(_) => TAG_FEATURES,
        Field::Unknown { .. } => 0xFF,
    }
}

fn parse_field(tag: u8, payload: &[u8]) -> Result<Field, ParseError> {
    let raw = |payload: &[u8]| Field::Unknown {
        tag,
        payload: payload.to_vec(),
    };
    Ok(match tag {
        TAG_PAYMENT_HASH | TAG_PAYMENT_SECRET | TAG_DESCRIPTION_HASH
            if payload.len() != 52 =>
        {
            raw(payload)
        }
        TAG_NODE_ID if payload.len() != 53 => raw(payload),

        TAG_PAYMENT_HASH => {
            let bytes = strict_bytes_from_u5(payload)?;
            sha256::Hash::from_slice(&bytes)
                .map(Field::PaymentHash)
                .unwrap_or_else(|_| raw(payload))
        }
        TAG_PAYMENT_SECRET => {
            let bytes = strict_bytes_from_u5(payload)?;
            Slice32::from_slice(&bytes)
                .map(Field::PaymentSecret)
                .unwrap_or_else(|| raw(payload))
        }
        TAG_DESCRIPTION_HASH => {
            let bytes = strict_bytes_from_u5(payload)?;
            sha256::Hash::from_slice(&bytes)
                .map(Field::DescriptionHash)
                .unwrap_or_else(|_| raw(payload))
        }
        TAG_NODE_ID => {
            let bytes = strict_bytes_from_u5(payload)?;
            PublicKey::from_slice(&bytes)
                .map(Field::NodeId)
                .unwrap_or_else(|_| raw(payload))
        }
        TAG_DESCRIPTION => {
            let bytes = strict_bytes_from_u5(payload)?;
            String::from_utf8(bytes)
                .map(Field::Description)
                .unwrap_or_else(|_| raw(payload))
        }
        TAG_EXPIRY => match pack_int(payload) {
            Some(x) => Field::Expiry(x),
            None => raw(payload),
        },
        TAG_MIN_FINAL_CLTV => match pack_int(payload) {
            Some(c) => Field::MinFinalCltvExpiry(c),
            None => raw(payload),
        },
        TAG_FALLBACK => {
            if payload.is_empty() {
                return Ok(raw(payload));
            }
            let version = payload[0];
            let program = strict_bytes_from_u5(&payload[1..])?;
            match version {
                17 if program.len() == 20 => Field::Fallback(
                    Fallback::PubkeyHash(
                        PubkeyHash::from_slice(&program)
                            .expect("20-byte slice"),
                    ),
                ),
                18 if program.len() == 20 => Field::Fallback(
                    Fallback::ScriptHash(
                        ScriptHash::from_slice(&program)
                            .expect("20-byte slice"),
                    ),
                ),
                0..=16 if (2..=40).contains(&program.len()) => {
                    Field::Fallback(Fallback::SegWit { version, program })
                }
                _ => raw(payload),
            }
        }
        TAG_ROUTE_HINT => {
            let bytes = strict_bytes_from_u5(payload)?;
            if bytes.len() % 51 != 0 {
                return Ok(raw(payload));
            }
            let mut hops = Vec::with_capacity(bytes.len() / 51);
            for chunk in bytes.chunks(51) {
                let src_node_id = match PublicKey::from_slice(&chunk[..33]) {
                    Ok(pk) => pk,
                    Err(_) => return Ok(raw(payload)),
                };
                let mut scid = [0u8; 8];
                scid.copy_from_slice(&chunk[33..41]);
                let mut base = [0u8; 4];
                base.copy_from_slice(&chunk[41..45]);
                let mut prop = [0u8; 4];
                prop.copy_from_slice(&chunk[45..49]);
                let mut delta = [0u8; 2];
                delta.copy_from_slice(&chunk[49..51]);
                hops.push(RouteHop {
                    src_node_id,
                    short_channel_id: ShortChannelId::from_u64(
                        u64::from_be_bytes(scid),
                    ),
                    fee_base_msat: u32::from_be_bytes(base),
                    fee_proportional_millionths: u32::from_be_bytes(prop),
                    cltv_expiry_delta: u16::from_be_bytes(delta),
                });
            }
            Field::Route(hops)
        }
        TAG_METADATA => Field::Metadata(strict_bytes_from_u5(payload)?),
        TAG_FEATURES => Field::Features(features_from_u5(payload)),
        _ => raw(payload),
    })
}

// ------------------------------------------------------------------------
// Bit juggling

/// Converts 5-bit symbols into bytes requiring all padding bits to be zero
fn strict_bytes_from_u5(payload: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::with_capacity(payload.len() * 5 / 8);
    let mut acc = 0u16;
    let mut bits = 0u8;
    for &sym in payload {
        acc = (acc << 5) | sym as u16;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    if bits > 0 && acc != 0 {
        return Err(ParseError::BadPadding);
    }
    Ok(out)
}

/// Converts bytes into 5-bit symbols, zero-padding the tail
fn unpack_u5(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut acc = 0u16;
    let mut bits = 0u8;
    for &byte in bytes {
        acc = (acc << 8) | byte as u16;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(((acc >> bits) & 31) as u8);
        }
    }
    if bits > 0 {
        out.push(((acc << (5 - bits)) & 31) as u8);
    }
    out
}

/// Packs 5-bit symbols into a byte vector for signature hashing (tail
/// zero-padded)
fn pack_u5(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 8 + 1);
    let mut acc = 0u16;
    let mut bits = 0u8;
    for &sym in data {
        acc = (acc << 5) | sym as u16;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    if bits > 0 {
        out.push((acc << (8 - bits)) as u8);
    }
    out
}

/// Big-endian base-32 integer from a variable-length payload
fn pack_int(payload: &[u8]) -> Option<u64> {
    payload.iter().try_fold(0u64, |acc, &sym| {
        acc.checked_mul(32)?.checked_add(sym as u64)
    })
}

/// Minimal big-endian base-32 representation of an integer
fn unpack_int(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(13);
    while value > 0 {
        out.push((value & 31) as u8);
        value >>= 5;
    }
    out.reverse();
    out
}

fn features_from_u5(payload: &[u8]) -> Features {
    let len = payload.len();
    let mut features = Features::new();
    for (no, &sym) in payload.iter().enumerate() {
        for bit in 0..5u16 {
            if sym & (1 << bit) != 0 {
                features.set_bit((len - 1 - no) as u16 * 5 + bit);
            }
        }
    }
    features
}

fn features_to_u5(features: &Features) -> Vec<u8> {
    let max = match features.max_bit() {
        None => return vec![],
        Some(max) => max as usize,
    };
    let len = max / 5 + 1;
    let mut out = vec![0u8; len];
    for bit in features.iter_bits() {
        out[len - 1 - bit as usize / 5] |= 1 << (bit % 5);
    }
    out
}

// ------------------------------------------------------------------------
// Amounts

/// Canonical amount rendering: the largest unit which preserves the exact
/// value
fn amount_to_hrp(msat: u64) -> String {
    debug_assert_ne!(msat, 0, "zero amounts are encoded as no amount");
    if msat % MSAT_PER_BTC == 0 {
        format!("{}", msat / MSAT_PER_BTC)
    } else if msat % (MSAT_PER_BTC / 1_000) == 0 {
        format!("{}m", msat / (MSAT_PER_BTC / 1_000))
    } else if msat % (MSAT_PER_BTC / 1_000_000) == 0 {
        format!("{}u", msat / (MSAT_PER_BTC / 1_000_000))
    } else if msat % (MSAT_PER_BTC / 1_000_000_000) == 0 {
        format!("{}n", msat / (MSAT_PER_BTC / 1_000_000_000))
    } else {
        // 1 msat is exactly 10 pico-bitcoin
        format!("{}p", msat * 10)
    }
}

/// Parses the amount part of the HRP. Accepts non-canonical unit choices;
/// rejects unknown units and sub-millisatoshi precision. Zero in any unit
/// (and the empty string) means "amount not specified".
fn amount_from_hrp(s: &str) -> Result<Option<u64>, ParseError> {
    if s.is_empty() {
        return Ok(None);
    }
    let (digits, unit) = match s.chars().last() {
        Some(unit @ ('m' | 'u' | 'n' | 'p')) => {
            (&s[..s.len() - 1], Some(unit))
        }
        Some(c) if c.is_ascii_digit() => (s, None),
        Some(c) => return Err(ParseError::UnknownUnit(c)),
        None => unreachable!("emptiness is checked above"),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::BadAmount(s.to_owned()));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| ParseError::AmountOverflow)?;
    if value == 0 {
        return Ok(None);
    }
    let msat = match unit {
        None => value.checked_mul(MSAT_PER_BTC),
        Some('m') => value.checked_mul(MSAT_PER_BTC / 1_000),
        Some('u') => value.checked_mul(MSAT_PER_BTC / 1_000_000),
        Some('n') => value.checked_mul(MSAT_PER_BTC / 1_000_000_000),
        Some('p') => {
            if value % 10 != 0 {
                return Err(ParseError::SubMillisatoshi);
            }
            Some(value / 10)
        }
        Some(_) => unreachable!("unit chars are filtered above"),
    };
    msat.map(Some).ok_or(ParseError::AmountOverflow)
}

// ------------------------------------------------------------------------
// Construction

/// Incremental invoice constructor enforcing BOLT-11 construction rules:
/// payment hash and payment secret are required, `payment_secret` and
/// `var_onion_optin` feature bits are always set as mandatory, feature bits
/// above the ceiling are rejected.
#[derive(Clone, Debug)]
pub struct InvoiceBuilder {
    network: Network,
    amount_msat: Option<u64>,
    timestamp: Option<u64>,
    payment_hash: Option<sha256::Hash>,
    payment_secret: Option<Slice32>,
    description: Option<String>,
    description_hash: Option<sha256::Hash>,
    node_id: Option<PublicKey>,
    expiry: Option<u64>,
    min_final_cltv_expiry: Option<u64>,
    fallbacks: Vec<Fallback>,
    route_hints: Vec<Vec<RouteHop>>,
    metadata: Option<Vec<u8>>,
    extra_features: Vec<(Feature, bool)>,
    feature_ceiling: u16,
}

impl InvoiceBuilder {
    pub fn new(network: Network) -> InvoiceBuilder {
        InvoiceBuilder {
            network,
            amount_msat: None,
            timestamp: None,
            payment_hash: None,
            payment_secret: None,
            description: None,
            description_hash: None,
            node_id: None,
            expiry: None,
            min_final_cltv_expiry: None,
            fallbacks: vec![],
            route_hints: vec![],
            metadata: None,
            extra_features: vec![],
            feature_ceiling: MAX_INVOICE_FEATURE_BIT,
        }
    }

    pub fn amount_msat(mut self, msat: u64) -> Self {
        self.amount_msat = if msat == 0 { None } else { Some(msat) };
        self
    }

    /// Explicit creation time in seconds since the epoch (lower 35 bits are
    /// used)
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp & 0x07_FFFF_FFFF);
        self
    }

    pub fn current_timestamp(self) -> Self {
        let now = Utc::now().timestamp().max(0) as u64;
        self.timestamp(now)
    }

    pub fn payment_hash(mut self, hash: sha256::Hash) -> Self {
        self.payment_hash = Some(hash);
        self
    }

    pub fn payment_secret(mut self, secret: Slice32) -> Self {
        self.payment_secret = Some(secret);
        self
    }

    pub fn description(mut self, description: impl ToString) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn description_hash(mut self, hash: sha256::Hash) -> Self {
        self.description_hash = Some(hash);
        self
    }

    /// Adds an explicit `n` field. Without it the payee is identified by
    /// signature recovery alone.
    pub fn node_id(mut self, node_id: PublicKey) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn expiry(mut self, seconds: u64) -> Self {
        self.expiry = Some(seconds);
        self
    }

    pub fn min_final_cltv_expiry(mut self, blocks: u64) -> Self {
        self.min_final_cltv_expiry = Some(blocks);
        self
    }

    pub fn fallback(mut self, fallback: Fallback) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn route_hint(mut self, hops: Vec<RouteHop>) -> Self {
        self.route_hints.push(hops);
        self
    }

    pub fn metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Adds a feature bit on top of the always-present `payment_secret` and
    /// `var_onion_optin`
    pub fn feature(mut self, feature: Feature, required: bool) -> Self {
        self.extra_features.push((feature, required));
        self
    }

    /// Overrides the maximum feature bit the builder will accept
    pub fn feature_ceiling(mut self, ceiling: u16) -> Self {
        self.feature_ceiling = ceiling;
        self
    }

    /// Constructs the unsigned invoice; use [`Invoice::sign`] afterwards
    pub fn build(self) -> Result<Invoice, CreationError> {
        let payment_hash =
            self.payment_hash.ok_or(CreationError::NoPaymentHash)?;
        let payment_secret =
            self.payment_secret.ok_or(CreationError::NoPaymentSecret)?;
        match (&self.description, &self.description_hash) {
            (None, None) => return Err(CreationError::NoDescription),
            (Some(_), Some(_)) => {
                return Err(CreationError::DescriptionConflict)
            }
            _ => {}
        }

        let mut features = Features::new();
        features.set(Feature::VarOnionOptin, true);
        features.set(Feature::PaymentSecret, true);
        for (feature, required) in self.extra_features {
            features.set(feature, required);
        }
        features.check_ceiling(self.feature_ceiling)?;

        let mut fields = Vec::with_capacity(8);
        fields.push(Field::PaymentSecret(payment_secret));
        fields.push(Field::PaymentHash(payment_hash));
        if let Some(description) = self.description {
            fields.push(Field::Description(description));
        }
        if let Some(hash) = self.description_hash {
            fields.push(Field::DescriptionHash(hash));
        }
        if let Some(node_id) = self.node_id {
            fields.push(Field::NodeId(node_id));
        }
        if let Some(x) = self.expiry {
            fields.push(Field::Expiry(x));
        }
        if let Some(c) = self.min_final_cltv_expiry {
            fields.push(Field::MinFinalCltvExpiry(c));
        }
        for fallback in self.fallbacks {
            fields.push(Field::Fallback(fallback));
        }
        for hops in self.route_hints {
            fields.push(Field::Route(hops));
        }
        if let Some(metadata) = self.metadata {
            fields.push(Field::Metadata(metadata));
        }
        fields.push(Field::Features(features));

        for field in &fields {
            let (_, payload) = serialize_field(field);
            if payload.len() >= 1024 {
                return Err(CreationError::OversizedField(payload.len()));
            }
        }

        Ok(Invoice {
            network: self.network,
            amount_msat: self.amount_msat,
            timestamp: self.timestamp.unwrap_or_default(),
            fields,
            signature: InvoiceSignature::zero(),
        })
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;

    // Key behind all published BOLT-11 example invoices
    fn test_key() -> SecretKey {
        SecretKey::from_slice(
            &Vec::<u8>::from_hex(
                "e126f68f7eafcc8b74f54d269fe206be715000f94dac067d1c04a8ca3b2db734",
            )
            .unwrap(),
        )
        .unwrap()
    }

    fn test_node_id() -> PublicKey {
        PublicKey::from_str(
            "03e7156ae33b0a208d0744199163177e909e80176e55d97a2f221ede0f934dd9ad",
        )
        .unwrap()
    }

    fn test_payment_hash() -> sha256::Hash {
        sha256::Hash::from_slice(
            &Vec::<u8>::from_hex(
                "0001020304050607080900010203040506070809000102030405060708090102",
            )
            .unwrap(),
        )
        .unwrap()
    }

    fn test_payment_secret() -> Slice32 {
        Slice32::from_inner([0x11; 32])
    }

    const DONATION: &str = "lnbc1pvjluezsp5zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3z\
        yg3zyg3zyg3zyg3zygspp5qqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqqqsyqcyq5rqwzq\
        fqypqdpl2pkx2ctnv5sxxmmwwd5kgetjypeh2ursdae8g6twvus8g6rfwvs8qun0dfjkx\
        aq9qrsgq357wnc5r2ueh7ck6q93dj32dlqnls087fxdwk8qakdyafkq3yap9us6v52vjj\
        srvywa6rt52cm9r9zqt8r2t7mlcwspyetp5h2tztugp9lfyql";

    const COFFEE: &str = "lnbc2500u1pvjluezsp5zyg3zyg3zyg3zyg3zyg3zyg3zyg3zy\
        g3zyg3zyg3zyg3zyg3zygspp5qqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqqqsyqcyq5rq\
        wzqfqypqdq5xysxxatsyp3k7enxv4jsxqzpu9qrsgquk0rl77nj30yxdy8j9vdx85fkpm\
        dla2087ne0xh8nhedh8w27kyke0lp53ut353s06fv3qfegext0eh0ymjpf39tuven09sa\
        m30g4vgpfna3rh";

    fn donation() -> String {
        DONATION.replace(char::is_whitespace, "")
    }

    fn coffee() -> String {
        COFFEE.replace(char::is_whitespace, "")
    }

    #[test]
    fn parse_donation_vector() {
        let invoice = Invoice::from_str(&donation()).unwrap();
        assert_eq!(invoice.network(), Network::Bitcoin);
        assert_eq!(invoice.amount_msat(), None);
        assert_eq!(invoice.timestamp(), 1496314658);
        assert_eq!(invoice.payment_hash(), Some(test_payment_hash()));
        assert_eq!(invoice.payment_secret(), Some(test_payment_secret()));
        assert_eq!(
            invoice.description(),
            Some("Please consider supporting this project")
        );
        assert_eq!(invoice.check_signature().unwrap(), test_node_id());
        assert_eq!(invoice.payee_node_id().unwrap(), test_node_id());
        let features = invoice.features().unwrap();
        assert!(features.requires(Feature::PaymentSecret));
        assert!(features.requires(Feature::VarOnionOptin));
        assert!(invoice.is_payable());
        // default expiry and CLTV when no x/c fields are present
        assert_eq!(invoice.expiry(), DEFAULT_EXPIRY);
        assert_eq!(
            invoice.min_final_cltv_expiry(),
            DEFAULT_MIN_FINAL_CLTV_EXPIRY
        );
    }

    #[test]
    fn parse_coffee_vector() {
        let invoice = Invoice::from_str(&coffee()).unwrap();
        assert_eq!(invoice.amount_msat(), Some(250_000_000));
        assert_eq!(invoice.description(), Some("1 cup coffee"));
        assert_eq!(invoice.expiry(), 60);
        assert_eq!(invoice.check_signature().unwrap(), test_node_id());
    }

    #[test]
    fn reencode_is_bit_exact() {
        for vector in [donation(), coffee()] {
            let invoice = Invoice::from_str(&vector).unwrap();
            assert_eq!(invoice.to_string(), vector);
            assert_eq!(
                Invoice::from_str(&invoice.to_string()).unwrap(),
                invoice
            );
        }
    }

    #[test]
    fn uppercase_is_accepted_mixed_rejected() {
        let upper = donation().to_ascii_uppercase();
        let invoice = Invoice::from_str(&upper).unwrap();
        assert_eq!(invoice.to_string(), donation());

        let mut mixed = donation();
        mixed.replace_range(0..1, "L");
        assert_eq!(Invoice::from_str(&mixed), Err(ParseError::MixedCase));
    }

    #[test]
    fn checksum_corruption_is_rejected() {
        let mut s = donation();
        let last = if s.ends_with('l') { "m" } else { "l" };
        s.replace_range(s.len() - 1.., last);
        assert!(matches!(
            Invoice::from_str(&s),
            Err(ParseError::Bech32(_))
        ));
    }

    #[test]
    fn amount_decoding() {
        assert_eq!(amount_from_hrp("").unwrap(), None);
        assert_eq!(amount_from_hrp("0").unwrap(), None);
        assert_eq!(amount_from_hrp("0p").unwrap(), None);
        assert_eq!(amount_from_hrp("0m").unwrap(), None);
        assert_eq!(amount_from_hrp("2500u").unwrap(), Some(250_000_000));
        // non-canonical unit choices decode to the same value
        assert_eq!(amount_from_hrp("2500000n").unwrap(), Some(250_000_000));
        assert_eq!(
            amount_from_hrp("2500000000p").unwrap(),
            Some(250_000_000)
        );
        assert_eq!(amount_from_hrp("1000u").unwrap(), Some(100_000_000));
        assert_eq!(amount_from_hrp("1").unwrap(), Some(MSAT_PER_BTC));
        assert_eq!(amount_from_hrp("10p").unwrap(), Some(1));
        assert_eq!(
            amount_from_hrp("2500000001p"),
            Err(ParseError::SubMillisatoshi)
        );
        assert_eq!(amount_from_hrp("2500x"), Err(ParseError::UnknownUnit('x')));
        assert_eq!(
            amount_from_hrp("2x500u"),
            Err(ParseError::BadAmount("2x500u".to_owned()))
        );
        assert_eq!(amount_from_hrp("u"), Err(ParseError::BadAmount("u".to_owned())));
    }

    #[test]
    fn amount_encoding_picks_largest_unit() {
        assert_eq!(amount_to_hrp(MSAT_PER_BTC), "1");
        assert_eq!(amount_to_hrp(250_000_000), "2500u");
        assert_eq!(amount_to_hrp(2_000_000_000_000), "20m");
        assert_eq!(amount_to_hrp(100), "1n");
        assert_eq!(amount_to_hrp(1), "10p");
        assert_eq!(amount_to_hrp(25), "250p");
    }

    #[test]
    fn unknown_multiplier_in_real_string() {
        // same data as the coffee vector but with an `x` unit in the HRP;
        // the checksum is valid so the failure comes from the amount parser
        let s = "lnbc2500x1pvjluezsp5zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zy\
            g3zyg3zyg3zygspp5qqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqf\
            qypqdq5xysxxatsyp3k7enxv4jsxqzpu9qrsgqjwp6fhsvvpdx2pt709h9m6t2d2j\
            jrzsvf6u2dxlamnxhgdfdcnp3tly63ns8dlm9rf90jj45ac6gxhuw2khh3phkt0y8\
            e7tfy0jeydgpqrhv8m"
            .replace(char::is_whitespace, "");
        assert_eq!(Invoice::from_str(&s), Err(ParseError::UnknownUnit('x')));
    }

    #[test]
    fn sub_millisatoshi_in_real_string() {
        let s = "lnbc2500000001p1pvjluezsp5zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3\
            zyg3zyg3zyg3zyg3zygspp5qqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqqqsyqcyq5\
            rqwzqfqypqdq5xysxxatsyp3k7enxv4jsxqzpu9qrsgqj4dfu92g0jzjtd92puthv\
            clqgu0vl4a7la3z7e0kfp3g8755g6myxqmtsjvdef3m6twpc420pvdpg8sm2clvqz\
            z4akx3at6c5kdgrscqq4p8x9"
            .replace(char::is_whitespace, "");
        assert_eq!(Invoice::from_str(&s), Err(ParseError::SubMillisatoshi));
    }

    #[test]
    fn zero_amount_unit_means_unspecified() {
        let s = "lnbc0p1pvjluezsp5zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3zyg3z\
            yg3zyg3zygspp5qqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqqqsyqcyq5rqwzqfqyp\
            qdq5xysxxatsyp3k7enxv4jsxqzpu9qrsgqwwh40465fxdf23v5et39qgf5f8tdar\
            ddukjthx6g53vtmwj20cyp0cn8h2nlttfx8znhf9nk9wvud2wzhge8z3v4yum4ltz\
            6nlx37zcqsfgtzn"
            .replace(char::is_whitespace, "");
        let invoice = Invoice::from_str(&s).unwrap();
        assert_eq!(invoice.amount_msat(), None);
        assert_eq!(invoice.description(), Some("1 cup coffee"));
    }

    #[test]
    fn builder_requirements() {
        let builder = InvoiceBuilder::new(Network::Bitcoin)
            .payment_hash(test_payment_hash())
            .description("test");
        assert_eq!(
            builder.clone().build(),
            Err(CreationError::NoPaymentSecret)
        );
        assert_eq!(
            InvoiceBuilder::new(Network::Bitcoin)
                .payment_secret(test_payment_secret())
                .description("test")
                .build(),
            Err(CreationError::NoPaymentHash)
        );
        assert_eq!(
            InvoiceBuilder::new(Network::Bitcoin)
                .payment_hash(test_payment_hash())
                .payment_secret(test_payment_secret())
                .build(),
            Err(CreationError::NoDescription)
        );
        assert_eq!(
            builder
                .clone()
                .payment_secret(test_payment_secret())
                .description_hash(test_payment_hash())
                .build(),
            Err(CreationError::DescriptionConflict)
        );

        let invoice = builder
            .payment_secret(test_payment_secret())
            .build()
            .unwrap();
        assert!(!invoice.is_signed());
        assert!(invoice.features().unwrap().requires(Feature::PaymentSecret));
        assert_eq!(
            invoice.serialize_signed(),
            Err(CreationError::Unsigned)
        );
    }

    #[test]
    fn builder_feature_ceiling() {
        let result = InvoiceBuilder::new(Network::Bitcoin)
            .payment_hash(test_payment_hash())
            .payment_secret(test_payment_secret())
            .description("test")
            .feature_ceiling(13)
            .build();
        assert_eq!(
            result,
            Err(CreationError::Features(
                bolt9::Error::FeatureBitExceedsCeiling {
                    bit: 14,
                    ceiling: 13
                }
            ))
        );
    }

    #[test]
    fn reconstructs_donation_vector() {
        let invoice = InvoiceBuilder::new(Network::Bitcoin)
            .timestamp(1496314658)
            .payment_hash(test_payment_hash())
            .payment_secret(test_payment_secret())
            .description("Please consider supporting this project")
            .build()
            .unwrap()
            .sign(&test_key());
        assert_eq!(invoice.serialize_signed().unwrap(), donation());
    }

    #[test]
    fn reconstructs_coffee_vector() {
        let invoice = InvoiceBuilder::new(Network::Bitcoin)
            .amount_msat(250_000_000)
            .timestamp(1496314658)
            .payment_hash(test_payment_hash())
            .payment_secret(test_payment_secret())
            .description("1 cup coffee")
            .expiry(60)
            .build()
            .unwrap()
            .sign(&test_key());
        assert_eq!(invoice.serialize_signed().unwrap(), coffee());
    }

    #[test]
    fn self_signed_roundtrip_with_all_fields() {
        let hop = RouteHop {
            src_node_id: test_node_id(),
            short_channel_id: ShortChannelId::new(66051, 263430, 1800)
                .unwrap(),
            fee_base_msat: 1,
            fee_proportional_millionths: 20,
            cltv_expiry_delta: 3,
        };
        let invoice = InvoiceBuilder::new(Network::Testnet)
            .amount_msat(2_000_000_000)
            .timestamp(1496314658)
            .payment_hash(test_payment_hash())
            .payment_secret(test_payment_secret())
            .description_hash(sha256::Hash::hash(b"One piece of cake"))
            .node_id(test_node_id())
            .min_final_cltv_expiry(12)
            .fallback(Fallback::SegWit {
                version: 0,
                program: vec![0x11; 20],
            })
            .route_hint(vec![hop, hop])
            .metadata(vec![0x01, 0xfe, 0x41])
            .build()
            .unwrap()
            .sign(&test_key());
        let s = invoice.serialize_signed().unwrap();
        let parsed = Invoice::from_str(&s).unwrap();
        assert_eq!(parsed, invoice);
        assert_eq!(parsed.route_hints(), vec![&[hop, hop][..]]);
        assert_eq!(parsed.metadata(), Some(&[0x01, 0xfe, 0x41][..]));
        assert_eq!(parsed.fallbacks().len(), 1);
        assert_eq!(parsed.min_final_cltv_expiry(), 12);
        assert_eq!(parsed.payee_node_id().unwrap(), test_node_id());
    }

    #[test]
    fn wrong_node_id_field_is_rejected() {
        let other = PublicKey::from_secret_key(
            SECP256K1,
            &SecretKey::from_slice(&[0x42; 32]).unwrap(),
        );
        let invoice = InvoiceBuilder::new(Network::Bitcoin)
            .timestamp(1496314658)
            .payment_hash(test_payment_hash())
            .payment_secret(test_payment_secret())
            .description("test")
            .node_id(other)
            .build()
            .unwrap()
            .sign(&test_key());
        assert_eq!(
            invoice.check_signature(),
            Err(ParseError::NodeIdMismatch)
        );
        assert_eq!(
            Invoice::from_str(&invoice.to_string()),
            Err(ParseError::NodeIdMismatch)
        );
    }

    #[test]
    fn bad_recovery_id_is_rejected() {
        let mut invoice = InvoiceBuilder::new(Network::Bitcoin)
            .timestamp(1496314658)
            .payment_hash(test_payment_hash())
            .payment_secret(test_payment_secret())
            .description("test")
            .build()
            .unwrap()
            .sign(&test_key());
        let mut raw = *invoice.signature.as_bytes();
        raw[64] = 4;
        invoice.signature = InvoiceSignature::from_bytes(raw);
        assert_eq!(
            invoice.check_signature(),
            Err(ParseError::BadRecoveryId(4))
        );
        assert_eq!(
            Invoice::from_str(&invoice.to_string()),
            Err(ParseError::BadRecoveryId(4))
        );
    }

    #[test]
    fn unknown_and_invalid_fields_roundtrip() {
        let mut invoice = InvoiceBuilder::new(Network::Bitcoin)
            .timestamp(1496314658)
            .payment_hash(test_payment_hash())
            .payment_secret(test_payment_secret())
            .description("test")
            .build()
            .unwrap();
        // a tag nobody knows and a `p` field with an invalid 51-symbol
        // length
        invoice.fields.push(Field::Unknown {
            tag: 2,
            payload: vec![1, 2, 3, 4],
        });
        invoice.fields.push(Field::Unknown {
            tag: TAG_PAYMENT_HASH,
            payload: vec![0; 51],
        });
        let invoice = invoice.sign(&test_key());

        let parsed = Invoice::from_str(&invoice.to_string()).unwrap();
        assert_eq!(parsed, invoice);
        // the malformed duplicate did not overwrite the recognized hash
        assert_eq!(parsed.payment_hash(), Some(test_payment_hash()));
    }

    #[test]
    fn duplicate_recognized_tag_first_wins() {
        let mut invoice = InvoiceBuilder::new(Network::Bitcoin)
            .timestamp(1496314658)
            .payment_hash(test_payment_hash())
            .payment_secret(test_payment_secret())
            .description("first")
            .build()
            .unwrap();
        invoice.fields.push(Field::Description("second".to_owned()));
        let s = invoice.sign(&test_key()).to_string();

        let parsed = Invoice::from_str(&s).unwrap();
        assert_eq!(parsed.description(), Some("first"));
        // the duplicate survives as a raw field and re-encodes identically
        assert!(matches!(
            parsed.fields().last(),
            Some(Field::Unknown { tag, .. }) if *tag == TAG_DESCRIPTION
        ));
        assert_eq!(parsed.to_string(), s);
    }

    #[test]
    fn nonzero_padding_is_rejected() {
        assert_eq!(
            strict_bytes_from_u5(&[3, 31]),
            Err(ParseError::BadPadding)
        );
        assert_eq!(strict_bytes_from_u5(&[3, 16]).unwrap(), vec![0x70]);
        assert_eq!(
            strict_bytes_from_u5(&unpack_u5(b"abc")).unwrap(),
            b"abc".to_vec()
        );
    }

    #[test]
    fn features_u5_roundtrip() {
        let mut features = Features::new();
        features.set(Feature::VarOnionOptin, true);
        features.set(Feature::PaymentSecret, true);
        // "sgq" from the published vectors
        assert_eq!(features_to_u5(&features), vec![16, 8, 0]);
        assert_eq!(features_from_u5(&[16, 8, 0]), features);
        assert_eq!(features_to_u5(&Features::new()), Vec::<u8>::new());
    }

    #[test]
    fn payment_request_from_invoice() {
        let invoice = Invoice::from_str(&coffee()).unwrap();
        let request = PaymentRequest {
            amount_msat: invoice.amount_msat().unwrap_or_default(),
            payment_hash: invoice.payment_hash().unwrap(),
            node_id: invoice.payee_node_id().unwrap(),
            min_final_cltv_expiry: invoice.min_final_cltv_expiry() as u32,
        };
        assert_eq!(request.amount_msat, 250_000_000);
        assert_eq!(request.node_id, test_node_id());
    }
}
