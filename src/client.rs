//! Asynchronously initiate handshakes.

use std::io::Error;
use std::io::ErrorKind::{Interrupted, UnexpectedEof, WouldBlock, WriteZero};
use std::io::{Read, Write};

use futures::{Async, Future, Poll};
use sodiumoxide::crypto::{box_, sign};
use sodiumoxide::utils::memzero;
use tokio_io::{AsyncRead, AsyncWrite};

use crypto::*;

/// Performs the client side of a handshake.
pub struct ClientHandshaker<S> {
    stream: Option<S>,
    client: Client,
    state: State,
    data: [u8; MSG3_BYTES], // holds the message currently being written or read
    offset: usize, // offset into the data array at which to read/write
}

impl<S: AsyncRead + AsyncWrite> ClientHandshaker<S> {
    /// Creates a new ClientHandshaker to connect to a server with known public
    /// key and network identifier over the given `stream`.
    pub fn new(stream: S,
               network_identifier: &[u8; NETWORK_IDENTIFIER_BYTES],
               client_longterm_pk: &sign::PublicKey,
               client_longterm_sk: &sign::SecretKey,
               client_ephemeral_pk: &box_::PublicKey,
               client_ephemeral_sk: &box_::SecretKey,
               server_longterm_pk: &sign::PublicKey)
               -> ClientHandshaker<S> {
        let mut client = Client::new(network_identifier,
                                     client_longterm_pk,
                                     client_longterm_sk,
                                     client_ephemeral_pk,
                                     client_ephemeral_sk,
                                     server_longterm_pk);

        let mut data = [0; MSG3_BYTES];
        data[..MSG1_BYTES].copy_from_slice(&client.create_msg1());

        ClientHandshaker {
            stream: Some(stream),
            client,
            state: WriteMsg1,
            data,
            offset: 0,
        }
    }
}

// Zero buffered handshake data on dropping.
impl<S> Drop for ClientHandshaker<S> {
    fn drop(&mut self) {
        memzero(&mut self.data);
    }
}

/// Future implementation to asynchronously drive a handshake.
impl<S: AsyncRead + AsyncWrite> Future for ClientHandshaker<S> {
    type Item = (Result<Outcome, ClientHandshakeFailure>, S);
    type Error = (Error, S);

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        let mut stream = self.stream
            .take()
            .expect("Polled ClientHandshaker after completion");

        match self.state {
            WriteMsg1 => {
                while self.offset < MSG1_BYTES {
                    match stream.write(&self.data[self.offset..MSG1_BYTES]) {
                        Ok(written) => {
                            if written == 0 {
                                return Err((Error::new(WriteZero, "failed to write msg1"), stream));
                            }
                            self.offset += written;
                        }
                        Err(ref e) if e.kind() == WouldBlock => {
                            self.stream = Some(stream);
                            return Ok(Async::NotReady);
                        }
                        Err(ref e) if e.kind() == Interrupted => {}
                        Err(e) => return Err((e, stream)),
                    }
                }

                self.stream = Some(stream);
                self.offset = 0;
                self.state = FlushMsg1;

                return self.poll();
            }

            FlushMsg1 => {
                match stream.flush() {
                    Ok(_) => {}
                    Err(ref e) if e.kind() == WouldBlock => {
                        self.stream = Some(stream);
                        return Ok(Async::NotReady);
                    }
                    Err(ref e) if e.kind() == Interrupted => {}
                    Err(e) => return Err((e, stream)),
                }

                self.stream = Some(stream);
                self.state = ReadMsg2;
                return self.poll();
            }

            ReadMsg2 => {
                while self.offset < MSG2_BYTES {
                    match stream.read(&mut self.data[self.offset..MSG2_BYTES]) {
                        Ok(read) => {
                            if read == 0 {
                                return Err((Error::new(UnexpectedEof, "failed to read msg2"),
                                            stream));
                            }
                            self.offset += read;
                        }
                        Err(ref e) if e.kind() == WouldBlock => {
                            self.stream = Some(stream);
                            return Ok(Async::NotReady);
                        }
                        Err(ref e) if e.kind() == Interrupted => {}
                        Err(e) => return Err((e, stream)),
                    }
                }

                if !self.client.verify_msg2(&self.data[..MSG2_BYTES]) {
                    return Ok(Async::Ready((Err(ClientHandshakeFailure::InvalidMsg2), stream)));
                }

                match self.client.create_msg3() {
                    Some(msg3) => self.data.copy_from_slice(&msg3),
                    // the server's challenge carried key material msg3 cannot
                    // be derived from
                    None => {
                        return Ok(Async::Ready((Err(ClientHandshakeFailure::InvalidMsg2),
                                                stream)))
                    }
                }

                self.stream = Some(stream);
                self.offset = 0;
                self.state = WriteMsg3;
                return self.poll();
            }

            WriteMsg3 => {
                while self.offset < MSG3_BYTES {
                    match stream.write(&self.data[self.offset..MSG3_BYTES]) {
                        Ok(written) => {
                            if written == 0 {
                                return Err((Error::new(WriteZero, "failed to write msg3"), stream));
                            }
                            self.offset += written;
                        }
                        Err(ref e) if e.kind() == WouldBlock => {
                            self.stream = Some(stream);
                            return Ok(Async::NotReady);
                        }
                        Err(ref e) if e.kind() == Interrupted => {}
                        Err(e) => return Err((e, stream)),
                    }
                }

                self.stream = Some(stream);
                self.offset = 0;
                self.state = FlushMsg3;
                return self.poll();
            }

            FlushMsg3 => {
                match stream.flush() {
                    Ok(_) => {}
                    Err(ref e) if e.kind() == WouldBlock => {
                        self.stream = Some(stream);
                        return Ok(Async::NotReady);
                    }
                    Err(ref e) if e.kind() == Interrupted => {}
                    Err(e) => return Err((e, stream)),
                }

                self.stream = Some(stream);
                self.state = ReadMsg4;
                return self.poll();
            }

            ReadMsg4 => {
                while self.offset < MSG4_BYTES {
                    match stream.read(&mut self.data[self.offset..MSG4_BYTES]) {
                        Ok(read) => {
                            if read == 0 {
                                return Err((Error::new(UnexpectedEof, "failed to read msg4"),
                                            stream));
                            }
                            self.offset += read;
                        }
                        Err(ref e) if e.kind() == WouldBlock => {
                            self.stream = Some(stream);
                            return Ok(Async::NotReady);
                        }
                        Err(ref e) if e.kind() == Interrupted => {}
                        Err(e) => return Err((e, stream)),
                    }
                }

                if !self.client.verify_msg4(&self.data[..MSG4_BYTES]) {
                    return Ok(Async::Ready((Err(ClientHandshakeFailure::InvalidMsg4), stream)));
                }

                return Ok(Async::Ready((Ok(self.client.outcome()), stream)));
            }
        }
    }
}

/// Reason why a client might reject the server although the handshake itself
/// was executed without IO errors.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ClientHandshakeFailure {
    /// Received invalid msg2 from the server.
    InvalidMsg2,
    /// Received invalid msg4 from the server.
    InvalidMsg4,
}

// State for the future state machine.
enum State {
    WriteMsg1,
    FlushMsg1,
    ReadMsg2,
    WriteMsg3,
    FlushMsg3,
    ReadMsg4,
}
use client::State::*;
