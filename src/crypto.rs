//! The cryptographic core of the handshake: the client and server state
//! machines, and the derivation of the session keys and nonces.
//!
//! The types in this module perform no IO. Unless you are implementing your
//! own transport layer, you probably want the handshakers in the crate root
//! rather than this module.
//!
//! Step methods must be called in protocol order, each exactly once. Every
//! verification failure is terminal for the session: drop the state and close
//! the connection.

use sodiumoxide::crypto::auth;
use sodiumoxide::crypto::box_;
use sodiumoxide::crypto::hash::sha256;
use sodiumoxide::crypto::scalarmult::{scalarmult, GroupElement, Scalar, GROUPELEMENTBYTES};
use sodiumoxide::crypto::secretbox;
use sodiumoxide::crypto::sign;
use sodiumoxide::utils::memzero;

use ffi::{ed25519_pk_to_curve25519, ed25519_sk_to_curve25519};

/// Length of a network identifier in bytes.
pub const NETWORK_IDENTIFIER_BYTES: usize = auth::KEYBYTES;

/// Length of msg1 (the client challenge) in bytes.
pub const MSG1_BYTES: usize = auth::TAGBYTES + box_::PUBLICKEYBYTES;
/// Length of msg2 (the server challenge) in bytes.
pub const MSG2_BYTES: usize = auth::TAGBYTES + box_::PUBLICKEYBYTES;
/// Length of msg3 (the client authentication) in bytes.
pub const MSG3_BYTES: usize = HELLO_BYTES + secretbox::MACBYTES;
/// Length of msg4 (the server acknowledgement) in bytes.
pub const MSG4_BYTES: usize = sign::SIGNATUREBYTES + secretbox::MACBYTES;

// H = sign_{A_s}(K | B_p | hash(a_s * b_p)) | A_p
const HELLO_BYTES: usize = sign::SIGNATUREBYTES + sign::PUBLICKEYBYTES;

// Every secretbox in the protocol uses the zero nonce: each box key is derived
// from fresh ephemeral material and used exactly once per session.
static ZERO_NONCE: secretbox::Nonce = secretbox::Nonce([0; secretbox::NONCEBYTES]);

/// The data resulting from a handshake: keys and nonces suitable for encrypted
/// two-way communication with the peer, and the longterm public key of the
/// peer.
#[derive(Debug)]
pub struct Outcome {
    encryption_key: [u8; secretbox::KEYBYTES],
    encryption_nonce: [u8; secretbox::NONCEBYTES],
    decryption_key: [u8; secretbox::KEYBYTES],
    decryption_nonce: [u8; secretbox::NONCEBYTES],
    peer_longterm_pk: [u8; sign::PUBLICKEYBYTES],
}

impl Outcome {
    /// The negotiated key that should be used to encrypt messages to the peer.
    pub fn encryption_key(&self) -> secretbox::Key {
        secretbox::Key(self.encryption_key)
    }

    /// The negotiated initial nonce that should be used to encrypt messages to the peer.
    pub fn encryption_nonce(&self) -> secretbox::Nonce {
        secretbox::Nonce(self.encryption_nonce)
    }

    /// The negotiated key that should be used to decrypt messages from the peer.
    pub fn decryption_key(&self) -> secretbox::Key {
        secretbox::Key(self.decryption_key)
    }

    /// The negotiated initial nonce that should be used to decrypt messages from the peer.
    pub fn decryption_nonce(&self) -> secretbox::Nonce {
        secretbox::Nonce(self.decryption_nonce)
    }

    /// The longterm public key of the peer.
    pub fn peer_longterm_pk(&self) -> sign::PublicKey {
        sign::PublicKey(self.peer_longterm_pk)
    }
}

/// Zero out all sensitive data when going out of scope.
impl Drop for Outcome {
    fn drop(&mut self) {
        memzero(&mut self.encryption_key);
        memzero(&mut self.encryption_nonce);
        memzero(&mut self.decryption_key);
        memzero(&mut self.decryption_nonce);
    }
}

// hash(K | part | part | ...), the key of each secretbox in the protocol.
fn derive_box_key(app: &auth::Key, parts: &[&[u8; GROUPELEMENTBYTES]]) -> secretbox::Key {
    let mut key_material = [0u8; auth::KEYBYTES + 3 * GROUPELEMENTBYTES];
    key_material[..auth::KEYBYTES].copy_from_slice(&app.0);

    let mut len = auth::KEYBYTES;
    for part in parts {
        key_material[len..len + GROUPELEMENTBYTES].copy_from_slice(&part[..]);
        len += GROUPELEMENTBYTES;
    }

    let digest = sha256::hash(&key_material[..len]);
    memzero(&mut key_material);
    secretbox::Key(digest.0)
}

// The first secretbox::NONCEBYTES bytes of hmac_{K}(eph_pk). The challenge
// hmacs are recomputed here rather than stored across the whole handshake.
fn nonce_from_challenge_hmac(eph_pk: &box_::PublicKey,
                             app: &auth::Key)
                             -> [u8; secretbox::NONCEBYTES] {
    let auth::Tag(tag) = auth::authenticate(&eph_pk.0, app);
    let mut nonce = [0u8; secretbox::NONCEBYTES];
    nonce.copy_from_slice(&tag[..secretbox::NONCEBYTES]);
    nonce
}

// hash(hash(box_key) | longterm_pk), one session key per direction.
fn session_key(box_key: &secretbox::Key,
               longterm_pk: &sign::PublicKey)
               -> [u8; secretbox::KEYBYTES] {
    let double_hash = sha256::hash(&box_key.0);

    let mut key_material = [0u8; sha256::DIGESTBYTES + sign::PUBLICKEYBYTES];
    key_material[..sha256::DIGESTBYTES].copy_from_slice(&double_hash.0);
    key_material[sha256::DIGESTBYTES..].copy_from_slice(&longterm_pk.0);

    sha256::hash(&key_material).0
}

/// The state of the client side of a handshake.
pub struct Client {
    // inputs
    app: auth::Key,              // K
    pub_: sign::PublicKey,       // A_p
    sec: sign::SecretKey,        // A_s
    eph_pub: box_::PublicKey,    // a_p
    eph_sec: box_::SecretKey,    // a_s
    server_pub: sign::PublicKey, // B_p
    // intermediate results
    shared_secret: GroupElement,       // (a_s * b_p)
    server_lterm_shared: GroupElement, // (a_s * B_p)
    hello: [u8; HELLO_BYTES], // H = sign_{A_s}(K | B_p | hash(a_s * b_p)) | A_p
    shared_hash: sha256::Digest, // hash(a_s * b_p)
    server_eph_pub: box_::PublicKey, // b_p
    box_sec: secretbox::Key, // hash(K | a_s * b_p | a_s * B_p | A_s * b_p)
}

impl Client {
    /// Creates and initializes a new `Client`.
    ///
    /// The ephemeral keypair must be freshly generated for this session.
    pub fn new(network_identifier: &[u8; NETWORK_IDENTIFIER_BYTES],
               client_longterm_pk: &sign::PublicKey,
               client_longterm_sk: &sign::SecretKey,
               client_ephemeral_pk: &box_::PublicKey,
               client_ephemeral_sk: &box_::SecretKey,
               server_longterm_pk: &sign::PublicKey)
               -> Client {
        Client {
            app: auth::Key(*network_identifier),
            pub_: client_longterm_pk.clone(),
            sec: client_longterm_sk.clone(),
            eph_pub: client_ephemeral_pk.clone(),
            eph_sec: client_ephemeral_sk.clone(),
            server_pub: server_longterm_pk.clone(),
            shared_secret: GroupElement([0; GROUPELEMENTBYTES]),
            server_lterm_shared: GroupElement([0; GROUPELEMENTBYTES]),
            hello: [0; HELLO_BYTES],
            shared_hash: sha256::Digest([0; sha256::DIGESTBYTES]),
            server_eph_pub: box_::PublicKey([0; box_::PUBLICKEYBYTES]),
            box_sec: secretbox::Key([0; secretbox::KEYBYTES]),
        }
    }

    /// Returns the client challenge.
    pub fn create_msg1(&mut self) -> [u8; MSG1_BYTES] {
        let mut msg = [0u8; MSG1_BYTES];

        // hmac_{K}(a_p) | a_p
        let auth::Tag(tag) = auth::authenticate(&self.eph_pub.0, &self.app);
        msg[..auth::TAGBYTES].copy_from_slice(&tag);
        msg[auth::TAGBYTES..].copy_from_slice(&self.eph_pub.0);

        msg
    }

    /// Verifies the server challenge and stores the server's ephemeral public
    /// key in the client state.
    pub fn verify_msg2(&mut self, msg: &[u8]) -> bool {
        if msg.len() != MSG2_BYTES {
            return false;
        }

        let mut tag = [0u8; auth::TAGBYTES];
        tag.copy_from_slice(&msg[..auth::TAGBYTES]);
        if !auth::verify(&auth::Tag(tag), &msg[auth::TAGBYTES..], &self.app) {
            return false;
        }

        // b_p
        self.server_eph_pub.0.copy_from_slice(&msg[auth::TAGBYTES..]);

        true
    }

    /// Computes the client authentication, or `None` if the key material from
    /// msg2 admits none (a low-order ephemeral, or a server longterm key
    /// without a curve25519 counterpart).
    pub fn create_msg3(&mut self) -> Option<[u8; MSG3_BYTES]> {
        // (a_s * b_p)
        let shared_secret = match scalarmult(&Scalar(self.eph_sec.0),
                                             &GroupElement(self.server_eph_pub.0)) {
            Ok(s) => s,
            Err(()) => return None,
        };

        let curve_server_pub = match ed25519_pk_to_curve25519(&self.server_pub) {
            Some(pk) => pk,
            None => return None,
        };

        // (a_s * B_p)
        let server_lterm_shared = match scalarmult(&Scalar(self.eph_sec.0),
                                                   &GroupElement(curve_server_pub.0)) {
            Ok(s) => s,
            Err(()) => return None,
        };

        // hash(a_s * b_p)
        self.shared_hash = sha256::hash(&shared_secret.0);

        // K | B_p | hash(a_s * b_p)
        let mut to_sign = [0u8; auth::KEYBYTES + sign::PUBLICKEYBYTES + sha256::DIGESTBYTES];
        to_sign[..auth::KEYBYTES].copy_from_slice(&self.app.0);
        to_sign[auth::KEYBYTES..auth::KEYBYTES + sign::PUBLICKEYBYTES]
            .copy_from_slice(&self.server_pub.0);
        to_sign[auth::KEYBYTES + sign::PUBLICKEYBYTES..].copy_from_slice(&self.shared_hash.0);

        // H = sign_{A_s}(K | B_p | hash(a_s * b_p)) | A_p
        let sign::Signature(sig) = sign::sign_detached(&to_sign, &self.sec);
        self.hello[..sign::SIGNATUREBYTES].copy_from_slice(&sig);
        self.hello[sign::SIGNATUREBYTES..].copy_from_slice(&self.pub_.0);

        // secretbox_{hash(K | a_s * b_p | a_s * B_p)}(H)
        let box_key = derive_box_key(&self.app, &[&shared_secret.0, &server_lterm_shared.0]);
        let boxed = secretbox::seal(&self.hello, &ZERO_NONCE, &box_key);

        let mut msg = [0u8; MSG3_BYTES];
        msg.copy_from_slice(&boxed);

        self.shared_secret = shared_secret;
        self.server_lterm_shared = server_lterm_shared;

        Some(msg)
    }

    /// Verifies the server acknowledgement: the server must prove possession
    /// of the longterm secret key matching the public key this client was
    /// initialized with.
    pub fn verify_msg4(&mut self, msg: &[u8]) -> bool {
        if msg.len() != MSG4_BYTES {
            return false;
        }

        let curve_sec = match ed25519_sk_to_curve25519(&self.sec) {
            Some(sk) => sk,
            None => return false,
        };

        // (A_s * b_p)
        let client_lterm_shared = match scalarmult(&Scalar(curve_sec.0),
                                                   &GroupElement(self.server_eph_pub.0)) {
            Ok(s) => s,
            Err(()) => return false,
        };

        // hash(K | a_s * b_p | a_s * B_p | A_s * b_p), kept for the outcome
        self.box_sec = derive_box_key(&self.app,
                                      &[&self.shared_secret.0,
                                        &self.server_lterm_shared.0,
                                        &client_lterm_shared.0]);

        let sig_plain = match secretbox::open(msg, &ZERO_NONCE, &self.box_sec) {
            Ok(plain) => plain,
            Err(()) => return false,
        };
        let sig = match sign::Signature::from_slice(&sig_plain) {
            Some(sig) => sig,
            None => return false,
        };

        // K | H | hash(a_s * b_p)
        let mut expected = [0u8; auth::KEYBYTES + HELLO_BYTES + sha256::DIGESTBYTES];
        expected[..auth::KEYBYTES].copy_from_slice(&self.app.0);
        expected[auth::KEYBYTES..auth::KEYBYTES + HELLO_BYTES].copy_from_slice(&self.hello);
        expected[auth::KEYBYTES + HELLO_BYTES..].copy_from_slice(&self.shared_hash.0);

        sign::verify_detached(&sig, &expected, &self.server_pub)
    }

    /// Computes the outcome of the handshake. Only meaningful after
    /// `verify_msg4` returned true.
    pub fn outcome(&self) -> Outcome {
        Outcome {
            encryption_key: session_key(&self.box_sec, &self.server_pub),
            // hmac_{K}(b_p)
            encryption_nonce: nonce_from_challenge_hmac(&self.server_eph_pub, &self.app),
            decryption_key: session_key(&self.box_sec, &self.pub_),
            // hmac_{K}(a_p)
            decryption_nonce: nonce_from_challenge_hmac(&self.eph_pub, &self.app),
            peer_longterm_pk: self.server_pub.0,
        }
    }
}

/// Zero out all sensitive data when going out of scope.
impl Drop for Client {
    fn drop(&mut self) {
        memzero(&mut self.shared_secret.0);
        memzero(&mut self.server_lterm_shared.0);
        memzero(&mut self.hello);
        memzero(&mut self.shared_hash.0);
    }
}

/// The state of the server side of a handshake.
pub struct Server {
    // inputs
    app: auth::Key,           // K
    pub_: sign::PublicKey,    // B_p
    sec: sign::SecretKey,     // B_s
    eph_pub: box_::PublicKey, // b_p
    eph_sec: box_::SecretKey, // b_s
    // intermediate results
    client_hello: [u8; HELLO_BYTES], // H = sign_{A_s}(K | B_p | hash(a_s * b_p)) | A_p
    shared_hash: sha256::Digest,     // hash(b_s * a_p)
    client_eph_pub: box_::PublicKey, // a_p
    client_pub: sign::PublicKey,     // A_p
    box_sec: secretbox::Key, // hash(K | b_s * a_p | B_s * a_p | b_s * A_p)
}

impl Server {
    /// Creates and initializes a new `Server`.
    ///
    /// The ephemeral keypair must be freshly generated for this session.
    pub fn new(network_identifier: &[u8; NETWORK_IDENTIFIER_BYTES],
               server_longterm_pk: &sign::PublicKey,
               server_longterm_sk: &sign::SecretKey,
               server_ephemeral_pk: &box_::PublicKey,
               server_ephemeral_sk: &box_::SecretKey)
               -> Server {
        Server {
            app: auth::Key(*network_identifier),
            pub_: server_longterm_pk.clone(),
            sec: server_longterm_sk.clone(),
            eph_pub: server_ephemeral_pk.clone(),
            eph_sec: server_ephemeral_sk.clone(),
            client_hello: [0; HELLO_BYTES],
            shared_hash: sha256::Digest([0; sha256::DIGESTBYTES]),
            client_eph_pub: box_::PublicKey([0; box_::PUBLICKEYBYTES]),
            client_pub: sign::PublicKey([0; sign::PUBLICKEYBYTES]),
            box_sec: secretbox::Key([0; secretbox::KEYBYTES]),
        }
    }

    /// Verifies the client challenge and stores the client's ephemeral public
    /// key in the server state.
    pub fn verify_msg1(&mut self, msg: &[u8]) -> bool {
        if msg.len() != MSG1_BYTES {
            return false;
        }

        let mut tag = [0u8; auth::TAGBYTES];
        tag.copy_from_slice(&msg[..auth::TAGBYTES]);
        if !auth::verify(&auth::Tag(tag), &msg[auth::TAGBYTES..], &self.app) {
            return false;
        }

        // a_p
        self.client_eph_pub.0.copy_from_slice(&msg[auth::TAGBYTES..]);

        true
    }

    /// Returns the server challenge.
    pub fn create_msg2(&mut self) -> [u8; MSG2_BYTES] {
        let mut msg = [0u8; MSG2_BYTES];

        // hmac_{K}(b_p) | b_p
        let auth::Tag(tag) = auth::authenticate(&self.eph_pub.0, &self.app);
        msg[..auth::TAGBYTES].copy_from_slice(&tag);
        msg[auth::TAGBYTES..].copy_from_slice(&self.eph_pub.0);

        msg
    }

    /// Verifies the client authentication: opens the boxed hello, recovers the
    /// client's longterm public key and checks the client's signature over the
    /// network identifier, this server's identity and the shared hash.
    pub fn verify_msg3(&mut self, msg: &[u8]) -> bool {
        if msg.len() != MSG3_BYTES {
            return false;
        }

        // (b_s * a_p)
        let shared_secret = match scalarmult(&Scalar(self.eph_sec.0),
                                             &GroupElement(self.client_eph_pub.0)) {
            Ok(s) => s,
            Err(()) => return false,
        };

        let curve_sec = match ed25519_sk_to_curve25519(&self.sec) {
            Some(sk) => sk,
            None => return false,
        };

        // (B_s * a_p)
        let client_eph_lterm_shared = match scalarmult(&Scalar(curve_sec.0),
                                                       &GroupElement(self.client_eph_pub.0)) {
            Ok(s) => s,
            Err(()) => return false,
        };

        // H = sign_{A_s}(K | B_p | hash(a_s * b_p)) | A_p
        let opening_key = derive_box_key(&self.app,
                                         &[&shared_secret.0, &client_eph_lterm_shared.0]);
        let hello = match secretbox::open(msg, &ZERO_NONCE, &opening_key) {
            Ok(hello) => hello,
            Err(()) => return false,
        };
        self.client_hello.copy_from_slice(&hello);

        // A_p
        self.client_pub.0.copy_from_slice(&self.client_hello[sign::SIGNATUREBYTES..]);

        let curve_client_pub = match ed25519_pk_to_curve25519(&self.client_pub) {
            Some(pk) => pk,
            None => return false,
        };

        // (b_s * A_p)
        let lterm_eph_shared = match scalarmult(&Scalar(self.eph_sec.0),
                                                &GroupElement(curve_client_pub.0)) {
            Ok(s) => s,
            Err(()) => return false,
        };

        // hash(b_s * a_p)
        self.shared_hash = sha256::hash(&shared_secret.0);

        // K | B_p | hash(a_s * b_p)
        let mut expected = [0u8; auth::KEYBYTES + sign::PUBLICKEYBYTES + sha256::DIGESTBYTES];
        expected[..auth::KEYBYTES].copy_from_slice(&self.app.0);
        expected[auth::KEYBYTES..auth::KEYBYTES + sign::PUBLICKEYBYTES]
            .copy_from_slice(&self.pub_.0);
        expected[auth::KEYBYTES + sign::PUBLICKEYBYTES..].copy_from_slice(&self.shared_hash.0);

        let sig = match sign::Signature::from_slice(&self.client_hello[..sign::SIGNATUREBYTES]) {
            Some(sig) => sig,
            None => return false,
        };
        if !sign::verify_detached(&sig, &expected, &self.client_pub) {
            return false;
        }

        // hash(K | b_s * a_p | B_s * a_p | b_s * A_p), the key of msg4
        self.box_sec = derive_box_key(&self.app,
                                      &[&shared_secret.0,
                                        &client_eph_lterm_shared.0,
                                        &lterm_eph_shared.0]);

        true
    }

    /// Returns the server acknowledgement.
    pub fn create_msg4(&mut self) -> [u8; MSG4_BYTES] {
        // K | H | hash(b_s * a_p)
        let mut to_sign = [0u8; auth::KEYBYTES + HELLO_BYTES + sha256::DIGESTBYTES];
        to_sign[..auth::KEYBYTES].copy_from_slice(&self.app.0);
        to_sign[auth::KEYBYTES..auth::KEYBYTES + HELLO_BYTES].copy_from_slice(&self.client_hello);
        to_sign[auth::KEYBYTES + HELLO_BYTES..].copy_from_slice(&self.shared_hash.0);

        // secretbox_{box_sec}(sign_{B_s}(K | H | hash(b_s * a_p)))
        let sign::Signature(sig) = sign::sign_detached(&to_sign, &self.sec);
        let boxed = secretbox::seal(&sig, &ZERO_NONCE, &self.box_sec);

        let mut msg = [0u8; MSG4_BYTES];
        msg.copy_from_slice(&boxed);
        msg
    }

    /// Computes the outcome of the handshake. Only meaningful after
    /// `verify_msg3` returned true.
    pub fn outcome(&self) -> Outcome {
        Outcome {
            encryption_key: session_key(&self.box_sec, &self.client_pub),
            // hmac_{K}(a_p)
            encryption_nonce: nonce_from_challenge_hmac(&self.client_eph_pub, &self.app),
            decryption_key: session_key(&self.box_sec, &self.pub_),
            // hmac_{K}(b_p)
            decryption_nonce: nonce_from_challenge_hmac(&self.eph_pub, &self.app),
            peer_longterm_pk: self.client_pub.0,
        }
    }

    /// Returns the longterm public key of the client. All zeros until the
    /// server verified msg3.
    pub fn client_longterm_pk(&self) -> sign::PublicKey {
        sign::PublicKey(self.client_pub.0)
    }
}

/// Zero out all sensitive data when going out of scope.
impl Drop for Server {
    fn drop(&mut self) {
        memzero(&mut self.client_hello);
        memzero(&mut self.shared_hash.0);
    }
}
