//! Bindings to the two ed25519-to-curve25519 conversions of libsodium, which
//! sodiumoxide does not expose. They link against the libsodium that
//! libsodium-sys already builds.

use libc::c_int;
use sodiumoxide::crypto::box_;
use sodiumoxide::crypto::sign;

extern "C" {
    fn crypto_sign_ed25519_pk_to_curve25519(curve25519_pk: *mut [u8; box_::PUBLICKEYBYTES],
                                            ed25519_pk: *const [u8; sign::PUBLICKEYBYTES])
                                            -> c_int;

    fn crypto_sign_ed25519_sk_to_curve25519(curve25519_sk: *mut [u8; box_::SECRETKEYBYTES],
                                            ed25519_sk: *const [u8; sign::SECRETKEYBYTES])
                                            -> c_int;
}

/// Converts an ed25519 public key to curve25519. Returns `None` if the key is
/// not the encoding of a curve point.
pub fn ed25519_pk_to_curve25519(ed25519_pk: &sign::PublicKey) -> Option<box_::PublicKey> {
    let mut curve = [0u8; box_::PUBLICKEYBYTES];
    let ret = unsafe { crypto_sign_ed25519_pk_to_curve25519(&mut curve, &ed25519_pk.0) };
    if ret == 0 {
        Some(box_::PublicKey(curve))
    } else {
        None
    }
}

/// Converts an ed25519 secret key to curve25519. Returns `None` if the key is
/// malformed.
pub fn ed25519_sk_to_curve25519(ed25519_sk: &sign::SecretKey) -> Option<box_::SecretKey> {
    let mut curve = [0u8; box_::SECRETKEYBYTES];
    let ret = unsafe { crypto_sign_ed25519_sk_to_curve25519(&mut curve, &ed25519_sk.0) };
    if ret == 0 {
        Some(box_::SecretKey(curve))
    } else {
        None
    }
}
