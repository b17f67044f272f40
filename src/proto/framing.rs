// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{BufMut, BytesMut};
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::proto::messages::Envelope;

/// Hard cap on the payload of a single frame. Anything larger (or empty) is
/// a protocol violation and tears down the connection.
pub const MAX_FRAME_LEN: u32 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid message length: {0}")]
    InvalidLength(u32),
    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Framing violations (as opposed to plain transport errors) indicate a
    /// misbehaving peer; both close the connection, but callers log them
    /// differently.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::InvalidLength(_) | Self::Decode(_))
    }
}

/// Reads one `u32_be length || payload` frame and decodes the envelope.
///
/// Reads exactly `length` payload bytes, never touching the next frame.
pub async fn read_envelope<R>(r: &mut R) -> Result<Envelope, FrameError>
where R: AsyncRead + Unpin {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf);
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(FrameError::InvalidLength(len));
    }

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await?;

    Ok(Envelope::decode(payload.as_slice())?)
}

/// Encodes the envelope and writes it as a single frame.
///
/// The length header and the body share one buffer and one `write_all`, so a
/// concurrent writer serialized behind the same lock can never interleave
/// inside a frame.
pub async fn write_envelope<W>(w: &mut W, env: &Envelope) -> Result<(), FrameError>
where W: AsyncWrite + Unpin {
    let body = env.encode_to_vec();

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(body.len() as u32);
    frame.extend_from_slice(&body);

    w.write_all(&frame).await?;
    Ok(())
}
