// This file serves both as an example of using the `ClientHandshaker` struct,
// and as the client test executable for the shs1 interop testsuite: it reads
// the network identifier and the server's longterm public key from the command
// line, performs a handshake over stdin/stdout and writes the resulting
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

static CLIENT_LONGTERM_PK: sign::PublicKey =
    sign::PublicKey([225, 162, 73, 136, 73, 119, 94, 84, 208, 102, 233, 120, 23, 46, 225, 245,
                     198, 79, 176, 0, 151, 208, 70, 146, 111, 23, 94, 101, 25, 192, 30, 35]);
static CLIENT_LONGTERM_SK: sign::SecretKey =
    sign::SecretKey([243, 168, 6, 50, 44, 78, 192, 183, 210, 241, 189, 36, 183, 154, 132, 119,
                     115, 84, 47, 151, 32, 32, 26, 237, 64, 180, 69, 20, 95, 133, 92, 176, 225,
                     162, 73, 136, 73, 119, 94, 84, 208, 102, 233, 120, 23, 46, 225, 245, 198,
                     79, 176, 0, 151, 208, 70, 146, 111, 23, 94, 101, 25, 192, 30, 35]);
static CLIENT_EPHEMERAL_PK: box_::PublicKey =
    box_::PublicKey([79, 79, 77, 238, 254, 215, 129, 197, 235, 41, 185, 208, 47, 32, 146, 37,
                     255, 237, 208, 215, 182, 92, 201, 106, 85, 86, 157, 41, 53, 165, 177, 32]);
static CLIENT_EPHEMERAL_SK: box_::SecretKey =
    box_::SecretKey([80, 169, 55, 157, 134, 142, 219, 152, 125, 240, 174, 209, 225, 109, 46, 188,
                     97, 224, 193, 187, 198, 58, 226, 193, 24, 235, 213, 214, 49, 55, 213, 104]);

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
    let mut server_longterm_pk_bytes = [0u8; sign::PUBLICKEYBYTES];

    let args: Vec<_> = env::args().collect();
    let network_identifier_vec = from_hex(&args[1]);
    let server_longterm_pk_vec = from_hex(&args[2]);

    network_identifier.copy_from_slice(&network_identifier_vec[..NETWORK_IDENTIFIER_BYTES]);
    server_longterm_pk_bytes.copy_from_slice(&server_longterm_pk_vec[..sign::PUBLICKEYBYTES]);
    let server_longterm_pk = sign::PublicKey(server_longterm_pk_bytes);

    // Always initialize libsodium before using this crate.
    sodiumoxide::init().unwrap();

    let stream = StdDuplex {
        stdin: io::stdin(),
        stdout: io::stdout(),
    };

    // Set up the handshaker.
    let handshaker = ClientHandshaker::new(stream,
                                           &network_identifier,
                                           &CLIENT_LONGTERM_PK,
                                           &CLIENT_LONGTERM_SK,
                                           &CLIENT_EPHEMERAL_PK,
                                           &CLIENT_EPHEMERAL_SK,
                                           &server_longterm_pk);

    match handshaker.wait() {
        Ok((Ok(outcome), _)) => {
            let mut stdout = io::stdout();

            stdout.write_all(&outcome.encryption_key().0).unwrap();
            stdout.write_all(&outcome.encryption_nonce().0).unwrap();
            stdout.write_all(&outcome.decryption_key().0).unwrap();
            stdout.write_all(&outcome.decryption_nonce().0).unwrap();
        }
        Ok((Err(ClientHandshakeFailure::InvalidMsg2), _)) => {
            std::process::exit(2);
        }
        Ok((Err(ClientHandshakeFailure::InvalidMsg4), _)) => {
            std::process::exit(4);
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
