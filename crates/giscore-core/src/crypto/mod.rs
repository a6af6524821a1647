// SPDX-License-Identifier: Apache-2.0

//! Symmetric encryption and the signed, expiring token codec.
//!
//! Only OAuth `state` and `session` values pass through here; the
//! installation token cache stores its entries in the clear.

pub mod cipher;
pub mod token;

pub use cipher::{decrypt, encrypt};
pub use token::{TokenCodec, TokenPolicy, decode_token, encode_token};
