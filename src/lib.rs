//! Implementation of the [secret-handshake](https://github.com/auditdrivencrypto/secret-handshake)
//! protocol version 1.
//!
//! The handshake is a mutually authenticating key exchange: both peers prove
//! possession of their longterm signing keys and of the shared network
//! identifier, and derive a symmetric session (a key and a starting nonce per
//! direction) with forward secrecy. A passive observer learns neither identity,
//! and a failing handshake does not reveal why it failed.
//!
//! This library uses libsodium internally. In application code, call
//! [`sodiumoxide::init()`](https://docs.rs/sodiumoxide) before performing any
//! handshakes.

#![deny(missing_docs)]
extern crate futures;
extern crate libc;
extern crate sodiumoxide;
extern crate tokio_io;
extern crate void;

pub mod crypto;
mod ffi;
mod client;
mod server;

pub use client::*;
pub use server::*;
pub use crypto::{Outcome, NETWORK_IDENTIFIER_BYTES};

#[cfg(test)]
extern crate async_ringbuffer;
#[cfg(test)]
extern crate partial_io;
#[cfg(test)]
#[macro_use]
extern crate quickcheck;
#[cfg(test)]
extern crate rand;
