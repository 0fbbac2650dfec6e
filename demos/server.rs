// This file serves both as an example of using the `ServerHandshaker` struct,
// and as the server test executable for the shs1 interop testsuite: it reads
// the network identifier and the server's longterm keypair from the command
// line, accepts a handshake over stdin/stdout and writes the resulting
// session to stdout.
extern crate futures;
extern crate shs1;
extern crate sodiumoxide;
extern crate tokio_io;

use std::env;
use std::io;
use std::io::{Read, Write};

use futures::{Async, Future, Poll};
use shs1::*;
use sodiumoxide::crypto::{box_, sign};
use tokio_io::{AsyncRead, AsyncWrite};

static SERVER_EPHEMERAL_PK: box_::PublicKey =
    box_::PublicKey([166, 12, 63, 218, 235, 136, 61, 99, 232, 142, 165, 147, 88, 93, 79, 177, 23,
                     148, 129, 57, 179, 24, 192, 174, 90, 62, 40, 83, 51, 9, 97, 82]);
static SERVER_EPHEMERAL_SK: box_::SecretKey =
    box_::SecretKey([176, 248, 210, 185, 226, 76, 162, 153, 239, 144, 57, 206, 218, 97, 2, 215,
                     155, 5, 223, 189, 22, 28, 137, 85, 228, 233, 93, 79, 217, 203, 63, 125]);

/// Implements Read and Write by delegating to stdin and stdout. The blocking
/// reads and writes are fine here, the handshaker future is simply driven to
/// completion with `wait`.
struct StdDuplex {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl Read for StdDuplex {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        self.stdin.read(buf)
    }
}

impl Write for StdDuplex {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        self.stdout.write(buf)
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        self.stdout.flush()
    }
}

impl AsyncRead for StdDuplex {}

impl AsyncWrite for StdDuplex {
    fn shutdown(&mut self) -> Poll<(), io::Error> {
        Ok(Async::Ready(()))
    }
}

fn main() {
    // parse cli arguments
    let mut network_identifier = [0u8; NETWORK_IDENTIFIER_BYTES];
    let mut server_longterm_sk_bytes = [0u8; sign::SECRETKEYBYTES];
    let mut server_longterm_pk_bytes = [0u8; sign::PUBLICKEYBYTES];

    let args: Vec<_> = env::args().collect();
    let network_identifier_vec = from_hex(&args[1]);
    let server_longterm_sk_vec = from_hex(&args[2]);
    let server_longterm_pk_vec = from_hex(&args[3]);

    network_identifier.copy_from_slice(&network_identifier_vec[..NETWORK_IDENTIFIER_BYTES]);
    server_longterm_sk_bytes.copy_from_slice(&server_longterm_sk_vec[..sign::SECRETKEYBYTES]);
    server_longterm_pk_bytes.copy_from_slice(&server_longterm_pk_vec[..sign::PUBLICKEYBYTES]);
    let server_longterm_sk = sign::SecretKey(server_longterm_sk_bytes);
    let server_longterm_pk = sign::PublicKey(server_longterm_pk_bytes);

    // Always initialize libsodium before using this crate.
    sodiumoxide::init().unwrap();

    let stream = StdDuplex {
        stdin: io::stdin(),
        stdout: io::stdout(),
    };

    // Set up the handshaker.
    let handshaker = ServerHandshaker::new(stream,
                                           &network_identifier,
                                           &server_longterm_pk,
                                           &server_longterm_sk,
                                           &SERVER_EPHEMERAL_PK,
                                           &SERVER_EPHEMERAL_SK);

    match handshaker.wait() {
        Ok((Ok(outcome), _)) => {
            let mut stdout = io::stdout();

            stdout.write_all(&outcome.encryption_key().0).unwrap();
            stdout.write_all(&outcome.encryption_nonce().0).unwrap();
            stdout.write_all(&outcome.decryption_key().0).unwrap();
            stdout.write_all(&outcome.decryption_nonce().0).unwrap();
        }
        Ok((Err(ServerHandshakeFailure::InvalidMsg1), _)) => {
            std::process::exit(1);
        }
        Ok((Err(ServerHandshakeFailure::InvalidMsg3), _)) => {
            std::process::exit(3);
        }
        Err(_) => panic!("stdin/stdout failed"),
    }
}

fn from_hex(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len() / 2);
    let mut buf = 0u8;
    let mut modulus = 0;

    for byte in s.bytes() {
        buf <<= 4;

        match byte {
            b'A'..=b'F' => buf |= byte - b'A' + 10,
            b'a'..=b'f' => buf |= byte - b'a' + 10,
            b'0'..=b'9' => buf |= byte - b'0',
            b' ' | b'\r' | b'\n' | b'\t' => {
                buf >>= 4;
                continue;
            }
            _ => panic!("invalid hex character"),
        }

        modulus += 1;
        if modulus == 2 {
            modulus = 0;
            bytes.push(buf);
        }
    }

    assert_eq!(modulus, 0, "invalid hex length");
    bytes
}
