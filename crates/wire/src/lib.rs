// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secure session protocol between the agent and its clients.
//!
//! Wire format: 4-byte length prefix (big-endian) + body. During the Noise
//! handshake the body is a raw handshake message; afterwards it is one
//! encrypted JSON [`Message`].

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod keys;
mod message;
mod noise;

pub use frame::{
    decode, encode, read_frame, with_timeout, write_frame, ProtocolError, MAX_FRAME_LEN,
};
pub use keys::{AuthorizedKeys, KeyError, Keypair, PublicKey, KEY_LEN};
pub use message::{
    decode_exit_status, decode_string, encode_string, ChannelId, Message, OpenFailureReason,
    EXEC_REQUEST, EXIT_STATUS_REQUEST, MAX_DATA_CHUNK, SESSION_CHANNEL,
};
pub use noise::{
    accept, connect, SecureReader, SecureStream, SecureWriter, MAX_PLAINTEXT_LEN, NOISE_PARAMS,
};
