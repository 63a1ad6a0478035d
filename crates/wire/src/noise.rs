// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutually authenticated, encrypted sessions over any byte stream.
//!
//! Both peers prove possession of a static Curve25519 key during a Noise XX
//! handshake. Afterwards every [`Message`] travels as one encrypted frame.

use std::sync::Arc;

use parking_lot::Mutex;
use snow::{HandshakeState, TransportState};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use crate::frame::{decode, encode, read_frame, write_frame, ProtocolError, MAX_FRAME_LEN};
use crate::keys::{AuthorizedKeys, Keypair, PublicKey};
use crate::Message;

/// Handshake pattern and primitives.
pub const NOISE_PARAMS: &str = "Noise_XX_25519_ChaChaPoly_BLAKE2s";

const TAG_LEN: usize = 16;

/// Largest plaintext that fits in one encrypted frame.
pub const MAX_PLAINTEXT_LEN: usize = MAX_FRAME_LEN - TAG_LEN;

fn builder(local: &Keypair) -> Result<snow::Builder<'_>, ProtocolError> {
    let params: snow::params::NoiseParams = NOISE_PARAMS.parse()?;
    Ok(snow::Builder::new(params).local_private_key(local.private_bytes()))
}

/// Run the responder side of the handshake and admit only authorized peers.
pub async fn accept<S>(
    mut stream: S,
    local: &Keypair,
    authorized: &AuthorizedKeys,
) -> Result<SecureStream<S>, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut hs = builder(local)?.build_responder()?;
    let mut buf = vec![0u8; MAX_FRAME_LEN];

    // -> e
    let msg = read_frame(&mut stream).await?;
    hs.read_message(&msg, &mut buf)?;

    // <- e, ee, s, es
    let len = hs.write_message(&[], &mut buf)?;
    write_frame(&mut stream, &buf[..len]).await?;

    // -> s, se
    let msg = read_frame(&mut stream).await?;
    hs.read_message(&msg, &mut buf)?;

    let peer = remote_static(&hs)?;
    if !authorized.contains(&peer) {
        return Err(ProtocolError::Unauthorized(peer.to_string()));
    }

    Ok(SecureStream::new(stream, hs.into_transport_mode()?, peer))
}

/// Run the initiator side of the handshake.
///
/// When `expected` is set the responder must present exactly that key.
pub async fn connect<S>(
    mut stream: S,
    local: &Keypair,
    expected: Option<&PublicKey>,
) -> Result<SecureStream<S>, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut hs = builder(local)?.build_initiator()?;
    let mut buf = vec![0u8; MAX_FRAME_LEN];

    // -> e
    let len = hs.write_message(&[], &mut buf)?;
    write_frame(&mut stream, &buf[..len]).await?;

    // <- e, ee, s, es
    let msg = read_frame(&mut stream).await?;
    hs.read_message(&msg, &mut buf)?;

    let peer = remote_static(&hs)?;
    if let Some(expected) = expected {
        if *expected != peer {
            return Err(ProtocolError::Unauthorized(peer.to_string()));
        }
    }

    // -> s, se
    let len = hs.write_message(&[], &mut buf)?;
    write_frame(&mut stream, &buf[..len]).await?;

    Ok(SecureStream::new(stream, hs.into_transport_mode()?, peer))
}

fn remote_static(hs: &HandshakeState) -> Result<PublicKey, ProtocolError> {
    let raw = hs
        .get_remote_static()
        .ok_or_else(|| ProtocolError::Handshake("peer presented no static key".into()))?;
    PublicKey::from_bytes(raw).map_err(|e| ProtocolError::Handshake(e.to_string()))
}

/// An established session.
pub struct SecureStream<S> {
    stream: S,
    transport: TransportState,
    peer: PublicKey,
    buf: Vec<u8>,
}

impl<S> SecureStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(stream: S, transport: TransportState, peer: PublicKey) -> Self {
        Self { stream, transport, peer, buf: vec![0u8; MAX_FRAME_LEN] }
    }

    /// The authenticated static key of the other side.
    pub fn peer(&self) -> &PublicKey {
        &self.peer
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let plain = encode(msg)?;
        check_plaintext(&plain)?;
        let len = self.transport.write_message(&plain, &mut self.buf)?;
        write_frame(&mut self.stream, &self.buf[..len]).await
    }

    pub async fn recv(&mut self) -> Result<Message, ProtocolError> {
        let frame = read_frame(&mut self.stream).await?;
        let len = self.transport.read_message(&frame, &mut self.buf)?;
        decode(&self.buf[..len])
    }

    /// Split into independently owned halves so reads and writes can
    /// proceed from different tasks.
    pub fn split(self) -> (SecureReader<ReadHalf<S>>, SecureWriter<WriteHalf<S>>) {
        let (read, write) = tokio::io::split(self.stream);
        let transport = Arc::new(Mutex::new(self.transport));
        (
            SecureReader {
                inner: read,
                transport: Arc::clone(&transport),
                peer: self.peer,
                buf: self.buf,
            },
            SecureWriter { inner: write, transport, buf: vec![0u8; MAX_FRAME_LEN] },
        )
    }
}

/// Receiving half of a [`SecureStream`].
pub struct SecureReader<R> {
    inner: R,
    transport: Arc<Mutex<TransportState>>,
    peer: PublicKey,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    pub fn peer(&self) -> &PublicKey {
        &self.peer
    }

    /// Not cancel safe: a dropped call may leave a partial frame unread.
    pub async fn recv(&mut self) -> Result<Message, ProtocolError> {
        let frame = read_frame(&mut self.inner).await?;
        let len = self.transport.lock().read_message(&frame, &mut self.buf)?;
        decode(&self.buf[..len])
    }
}

/// Sending half of a [`SecureStream`].
pub struct SecureWriter<W> {
    inner: W,
    transport: Arc<Mutex<TransportState>>,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    pub async fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let plain = encode(msg)?;
        check_plaintext(&plain)?;
        let len = self.transport.lock().write_message(&plain, &mut self.buf)?;
        write_frame(&mut self.inner, &self.buf[..len]).await
    }
}

fn check_plaintext(plain: &[u8]) -> Result<(), ProtocolError> {
    if plain.len() > MAX_PLAINTEXT_LEN {
        return Err(ProtocolError::MessageTooLarge { size: plain.len(), max: MAX_PLAINTEXT_LEN });
    }
    Ok(())
}

#[cfg(test)]
#[path = "noise_tests.rs"]
mod tests;
