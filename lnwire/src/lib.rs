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

#![recursion_limit = "256"]
// Coding conventions
#![deny(
    non_upper_case_globals,
    non_camel_case_types,
    non_snake_case,
    unused_mut,
    unused_imports,
    dead_code,
    //missing_docs
)]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate lightning_encoding;
#[macro_use]
extern crate strict_encoding;
#[cfg(feature = "serde")]
extern crate serde_crate as serde;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_with;

macro_rules! dumb_pubkey {
    () => {
        secp256k1::PublicKey::from_secret_key(
            secp256k1::SECP256K1,
            &secp256k1::ONE_KEY,
        )
    };
}

pub mod bolt1;
pub mod bolt11;
pub mod bolt2;
pub mod bolt9;
mod msg;
mod types;

pub use msg::Messages;
pub use types::{
    ActiveChannelId, ChannelId, ShortChannelId, ShortChannelIdParseError,
    TempChannelId,
};

/// Default port on which lightning network nodes listen for incoming
/// BOLT-8 transport connections
pub const LNP2P_PORT: u16 = 9735;
