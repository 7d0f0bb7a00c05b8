// ABOUTME: Owns one connected Stream and performs length-prefixed, magic-resynchronizing frame I/O
// ABOUTME: Blocking and non-blocking modes are a session-level property the caller toggles

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

use crate::codec::{CodecError, FrameHeader, MessageType, MAGIC};
use crate::error::RompError;
use crate::registry::ObjectId;
use crate::transport::Stream;

/// Upper bound on how many bytes a resync may discard while hunting for
/// the magic marker before giving up. A legitimate frame's `payload_len`
/// is itself bounded by `u16::MAX`, so a resync budget an order of
/// magnitude larger than that comfortably covers any honest retransmit
/// while still bounding a malicious or corrupted peer.
const RESYNC_BUDGET: usize = 1 << 20;

/// One accepted or outbound connection, decorated with frame-level I/O.
///
/// `Session` never looks inside a payload; callers (`server::dispatch`,
/// `client::proxy`) invoke [`crate::codec::encode_value`]/
/// [`crate::codec::decode_value`] themselves.
pub struct Session {
    stream: Stream,
    non_blocking: bool,
    read_buf: BytesMut,
}

impl Session {
    pub fn new(stream: Stream) -> Self {
        Session {
            stream,
            non_blocking: false,
            read_buf: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Selects between blocking (plain `.await`) and non-blocking
    /// (`try_read`/`try_write` retried on readiness) I/O for subsequent
    /// frame operations.
    pub fn set_non_blocking(&mut self, non_blocking: bool) {
        self.non_blocking = non_blocking;
    }

    /// Writes one frame: header then payload.
    pub async fn write_frame(
        &mut self,
        msg_type: MessageType,
        obj_id: ObjectId,
        payload: &[u8],
    ) -> Result<(), RompError> {
        if payload.len() > u16::MAX as usize {
            return Err(RompError::Protocol(format!(
                "payload of {} bytes exceeds the {}-byte frame limit",
                payload.len(),
                u16::MAX
            )));
        }

        let header = FrameHeader::new(msg_type, obj_id, payload.len() as u16);
        let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + payload.len());
        header.encode(&mut buf);
        buf.put_slice(payload);

        self.write_all(&buf).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), RompError> {
        if !self.non_blocking {
            return self.stream.write_all(buf).await.map_err(downgrade_clean_disconnect);
        }

        let mut written = 0;
        while written < buf.len() {
            self.stream.writable().await?;
            match self.stream.try_write(&buf[written..]) {
                Ok(0) => return Err(RompError::ConnectionClosed),
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(RompError::from(e)),
            }
        }
        Ok(())
    }

    /// Reads one frame: 8-byte header (resynchronizing on the magic marker
    /// if necessary), then `payload_len` bytes of payload.
    pub async fn read_frame(&mut self) -> Result<(MessageType, ObjectId, Bytes), RompError> {
        let header = self.read_header().await?;
        let payload = self.read_exact_bytes(header.payload_len as usize).await?;
        Ok((header.msg_type, header.obj_id, payload))
    }

    async fn read_header(&mut self) -> Result<FrameHeader, RompError> {
        let mut header_buf = [0u8; FrameHeader::SIZE];
        self.read_exact(&mut header_buf).await?;

        match FrameHeader::decode(&mut Cursor::new(&header_buf[..])) {
            Ok(header) if header.magic == MAGIC => Ok(header),
            _ => self.resync(header_buf).await,
        }
    }

    /// Having failed to parse a valid header at the current position,
    /// slides a one-byte-at-a-time window forward until the two leading
    /// bytes match `MAGIC` again, then re-reads the remaining header
    /// fields.
    async fn resync(&mut self, mut window: [u8; FrameHeader::SIZE]) -> Result<FrameHeader, RompError> {
        tracing::warn!("frame magic mismatch, resynchronizing");
        let mut discarded = 0usize;

        loop {
            if discarded > RESYNC_BUDGET {
                return Err(RompError::Protocol(CodecError::ResyncExhausted.to_string()));
            }

            let candidate = u16::from_be_bytes([window[0], window[1]]);
            if candidate == MAGIC {
                if let Ok(header) = FrameHeader::decode(&mut Cursor::new(&window[..])) {
                    return Ok(header);
                }
            }

            window.copy_within(1.., 0);
            let mut next_byte = [0u8; 1];
            self.read_exact(&mut next_byte).await?;
            window[FrameHeader::SIZE - 1] = next_byte[0];
            discarded += 1;
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), RompError> {
        if !self.non_blocking {
            return self.stream.read_exact(buf).await.map_err(downgrade_clean_disconnect);
        }

        let mut filled = 0;
        while filled < buf.len() {
            self.stream.readable().await?;
            match self.stream.try_read(&mut buf[filled..]) {
                Ok(0) => return Err(RompError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(RompError::from(e)),
            }
        }
        Ok(())
    }

    async fn read_exact_bytes(&mut self, len: usize) -> Result<Bytes, RompError> {
        // `read_exact` reborrows all of `*self`, so it can't also take
        // `&mut self.read_buf` — a field of that same `*self` — as an
        // argument while the call is live. Taking the buffer out of
        // `self` first gives `read_exact` a disjoint borrow; it's put
        // back (resized, so its allocation survives) once the read
        // completes or fails.
        let mut buf = std::mem::take(&mut self.read_buf);
        buf.clear();
        buf.resize(len, 0);
        let result = self.read_exact(&mut buf).await;
        let payload = buf.split().freeze();
        self.read_buf = buf;
        result?;
        Ok(payload)
    }
}

/// A peer that closes its write half mid-frame surfaces as
/// `UnexpectedEof` from `AsyncReadExt::read_exact` and as `WriteZero`
/// from `AsyncWriteExt::write_all` — both are a graceful disconnect, not
/// a transport failure, so both fold into [`RompError::ConnectionClosed`]
/// instead of the generic `RompError::Transport` variant.
fn downgrade_clean_disconnect(err: RompError) -> RompError {
    match err {
        RompError::Transport(io_err)
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::WriteZero
            ) =>
        {
            RompError::ConnectionClosed
        }
        other => other,
    }
}
