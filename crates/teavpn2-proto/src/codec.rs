// ============================================
// File: crates/teavpn2-proto/src/codec.rs
// ============================================
//! # Frame Codec
//!
//! ## Creation Reason
//! Frames the TeaVPN2 packet protocol on top of a TCP byte stream:
//! encoding outbound frames and carving inbound frames out of a sliding
//! per-connection receive buffer.
//!
//! ## Main Functionality
//! - `encode_frame` and typed wrappers: header + payload serialization
//! - `FrameBuffer`: fixed-size receive buffer with partial-read support
//! - `Decoded` / `FrameRef`: decode outcomes over the buffered prefix
//!
//! ## Decoding Strategy
//! 1. Fewer than 4 buffered bytes → `NeedMore`
//! 2. Claimed length above `PAYLOAD_MAX` → `Corrupt` (caller discards the
//!    whole buffer; there is no resynchronization point in the stream)
//! 3. Frame longer than the buffered prefix → `NeedMore`
//! 4. Otherwise → `Frame`; after handling, `consume()` slides any tail
//!    bytes to the front and decoding repeats
//!
//! ## ⚠️ Important Note for Next Developer
//! - `FrameBuffer` holds at most one maximum-size frame; feeding it is
//!   only guaranteed to make progress if every complete frame is consumed
//!   before more bytes are pushed
//! - A `Corrupt` outcome poisons the buffer; `reset()` is the only way out
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use bytes::{BufMut, BytesMut};

use crate::error::{ProtoError, Result};
use crate::messages::{
    AuthPayload, Banner, ClientPacketKind, IfaceAssign, ServerPacketKind,
    AUTH_PAYLOAD_SIZE, BANNER_SIZE, FRAME_HEADER_SIZE, FRAME_MAX_SIZE, IFACE_ASSIGN_SIZE,
    PAYLOAD_MAX,
};

// ============================================
// Encoder
// ============================================

/// Writes one frame (`kind`, zero pad, big-endian length, payload).
///
/// # Errors
/// Returns `PayloadTooLarge` if `payload` exceeds `PAYLOAD_MAX`.
pub fn encode_frame(kind: u8, payload: &[u8], buf: &mut BytesMut) -> Result<()> {
    if payload.len() > PAYLOAD_MAX {
        return Err(ProtoError::PayloadTooLarge {
            len: payload.len(),
            max: PAYLOAD_MAX,
        });
    }

    buf.reserve(FRAME_HEADER_SIZE + payload.len());
    buf.put_u8(kind);
    buf.put_u8(0);
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
    Ok(())
}

/// Writes one server-sourced frame.
///
/// # Errors
/// Returns `PayloadTooLarge` if `payload` exceeds `PAYLOAD_MAX`.
pub fn encode_server_frame(
    kind: ServerPacketKind,
    payload: &[u8],
    buf: &mut BytesMut,
) -> Result<()> {
    encode_frame(kind.as_byte(), payload, buf)
}

/// Writes one client-sourced frame.
///
/// # Errors
/// Returns `PayloadTooLarge` if `payload` exceeds `PAYLOAD_MAX`.
pub fn encode_client_frame(
    kind: ClientPacketKind,
    payload: &[u8],
    buf: &mut BytesMut,
) -> Result<()> {
    encode_frame(kind.as_byte(), payload, buf)
}

// ============================================
// Typed Frame Builders
// ============================================

/// Builds a complete `BANNER` frame.
#[must_use]
pub fn banner_frame(banner: &Banner) -> BytesMut {
    let mut payload = BytesMut::with_capacity(BANNER_SIZE);
    banner.encode(&mut payload);

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + BANNER_SIZE);
    encode_server_frame(ServerPacketKind::Banner, &payload, &mut frame)
        .expect("banner payload is below PAYLOAD_MAX");
    frame
}

/// Builds a complete `AUTH_OK` frame carrying an interface assignment.
#[must_use]
pub fn auth_ok_frame(assign: &IfaceAssign) -> BytesMut {
    let mut payload = BytesMut::with_capacity(IFACE_ASSIGN_SIZE);
    assign.encode(&mut payload);

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + IFACE_ASSIGN_SIZE);
    encode_server_frame(ServerPacketKind::AuthOk, &payload, &mut frame)
        .expect("iface assignment payload is below PAYLOAD_MAX");
    frame
}

/// Builds a complete `AUTH_REJECT` frame (empty payload).
#[must_use]
pub fn auth_reject_frame() -> BytesMut {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE);
    encode_server_frame(ServerPacketKind::AuthReject, &[], &mut frame)
        .expect("empty payload is below PAYLOAD_MAX");
    frame
}

/// Builds a complete server `DATA` frame around one IP datagram.
///
/// # Errors
/// Returns `PayloadTooLarge` if the datagram exceeds `PAYLOAD_MAX`.
pub fn data_frame(datagram: &[u8]) -> Result<BytesMut> {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + datagram.len());
    encode_server_frame(ServerPacketKind::Data, datagram, &mut frame)?;
    Ok(frame)
}

/// Builds a complete client `HELLO` frame (empty payload).
#[must_use]
pub fn client_hello_frame() -> BytesMut {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE);
    encode_client_frame(ClientPacketKind::Hello, &[], &mut frame)
        .expect("empty payload is below PAYLOAD_MAX");
    frame
}

/// Builds a complete client `AUTH` frame.
#[must_use]
pub fn client_auth_frame(auth: &AuthPayload) -> BytesMut {
    let mut payload = BytesMut::with_capacity(AUTH_PAYLOAD_SIZE);
    auth.encode(&mut payload);

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + AUTH_PAYLOAD_SIZE);
    encode_client_frame(ClientPacketKind::Auth, &payload, &mut frame)
        .expect("auth payload is below PAYLOAD_MAX");
    frame
}

/// Builds a complete client `IFACE_DATA` frame around one IP datagram.
///
/// # Errors
/// Returns `PayloadTooLarge` if the datagram exceeds `PAYLOAD_MAX`.
pub fn client_data_frame(datagram: &[u8]) -> Result<BytesMut> {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + datagram.len());
    encode_client_frame(ClientPacketKind::IfaceData, datagram, &mut frame)?;
    Ok(frame)
}

// ============================================
// Decoded
// ============================================

/// Outcome of one decode attempt over the buffered prefix.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// The prefix does not yet hold a complete frame.
    NeedMore,
    /// The header claims a length above `PAYLOAD_MAX`.
    Corrupt {
        /// The impossible length the peer claimed.
        claimed: usize,
    },
    /// A complete frame view over the buffer head.
    Frame(FrameRef<'a>),
}

/// Borrowed view of one decoded frame.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameRef<'a> {
    /// Raw wire type byte. Unknown values are the state machine's problem,
    /// not the codec's.
    pub kind: u8,
    /// Payload bytes.
    pub payload: &'a [u8],
}

impl FrameRef<'_> {
    /// On-wire size of this frame, header included.
    #[must_use]
    pub const fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }
}

// ============================================
// FrameBuffer
// ============================================

/// Sliding receive buffer sized for exactly one maximum frame.
///
/// Bytes from the socket are appended with `extend`; `decode` inspects the
/// valid prefix without consuming it; `consume` slides any tail bytes back
/// to the front once a frame has been handled.
pub struct FrameBuffer {
    /// Backing storage; only `buf[..fill]` is valid.
    buf: [u8; FRAME_MAX_SIZE],
    /// Valid prefix length.
    fill: u16,
}

impl FrameBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0u8; FRAME_MAX_SIZE],
            fill: 0,
        }
    }

    /// Returns the valid prefix length.
    #[must_use]
    pub fn fill(&self) -> usize {
        usize::from(self.fill)
    }

    /// Returns `true` if no bytes are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    /// Returns how many more bytes fit.
    #[must_use]
    pub fn capacity_left(&self) -> usize {
        FRAME_MAX_SIZE - self.fill()
    }

    /// Returns the valid prefix.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.fill()]
    }

    /// Appends as much of `chunk` as fits; returns the number of bytes
    /// taken.
    pub fn extend(&mut self, chunk: &[u8]) -> usize {
        let take = chunk.len().min(self.capacity_left());
        let fill = self.fill();
        self.buf[fill..fill + take].copy_from_slice(&chunk[..take]);
        self.fill += take as u16;
        take
    }

    /// Attempts to decode one frame from the buffer head.
    #[must_use]
    pub fn decode(&self) -> Decoded<'_> {
        let fill = self.fill();
        if fill < FRAME_HEADER_SIZE {
            return Decoded::NeedMore;
        }

        let claimed = usize::from(u16::from_be_bytes([self.buf[2], self.buf[3]]));
        if claimed > PAYLOAD_MAX {
            return Decoded::Corrupt { claimed };
        }

        if FRAME_HEADER_SIZE + claimed > fill {
            return Decoded::NeedMore;
        }

        Decoded::Frame(FrameRef {
            kind: self.buf[0],
            payload: &self.buf[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + claimed],
        })
    }

    /// Discards the first `n` bytes, sliding any tail to the front.
    ///
    /// # Panics
    /// Panics if `n` exceeds the valid prefix; that indicates a caller bug,
    /// not peer input.
    pub fn consume(&mut self, n: usize) {
        let fill = self.fill();
        assert!(n <= fill, "consume({n}) beyond valid prefix ({fill})");

        let rest = fill - n;
        if rest > 0 {
            self.buf.copy_within(n..fill, 0);
        }
        self.fill = rest as u16;
    }

    /// Discards the whole buffer. Used after a `Corrupt` outcome.
    pub fn reset(&mut self) {
        self.fill = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("fill", &self.fill)
            .field("capacity", &FRAME_MAX_SIZE)
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds `stream` into a fresh buffer in `step`-byte slices and
    /// collects every decoded frame as `(kind, payload)`.
    fn drain_in_steps(stream: &[u8], step: usize) -> Vec<(u8, Vec<u8>)> {
        let mut fb = FrameBuffer::new();
        let mut frames = Vec::new();

        for chunk in stream.chunks(step) {
            let mut rest = chunk;
            while !rest.is_empty() {
                let taken = fb.extend(rest);
                rest = &rest[taken..];

                loop {
                    let decoded = match fb.decode() {
                        Decoded::NeedMore => None,
                        Decoded::Corrupt { .. } => panic!("unexpected corruption"),
                        Decoded::Frame(frame) => {
                            Some((frame.kind, frame.payload.to_vec(), frame.wire_size()))
                        }
                    };
                    let Some((kind, payload, n)) = decoded else {
                        break;
                    };
                    frames.push((kind, payload));
                    fb.consume(n);
                }
            }
        }

        frames
    }

    #[test]
    fn test_encode_layout() {
        let mut buf = BytesMut::new();
        encode_frame(4, b"\x45\x00", &mut buf).unwrap();

        // type, pad, big-endian length, payload.
        assert_eq!(&buf[..], &[0x04, 0x00, 0x00, 0x02, 0x45, 0x00]);
    }

    #[test]
    fn test_encode_rejects_oversize() {
        let huge = vec![0u8; PAYLOAD_MAX + 1];
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_frame(4, &huge, &mut buf),
            Err(ProtoError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_roundtrip() {
        let payload = b"some ip datagram".as_slice();
        let mut wire = BytesMut::new();
        encode_client_frame(ClientPacketKind::IfaceData, payload, &mut wire).unwrap();

        let mut fb = FrameBuffer::new();
        fb.extend(&wire);

        match fb.decode() {
            Decoded::Frame(frame) => {
                assert_eq!(frame.kind, ClientPacketKind::IfaceData.as_byte());
                assert_eq!(frame.payload, payload);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_empty_payload_frame() {
        let wire = client_hello_frame();

        let mut fb = FrameBuffer::new();
        fb.extend(&wire);

        match fb.decode() {
            Decoded::Frame(frame) => {
                assert_eq!(frame.kind, ClientPacketKind::Hello.as_byte());
                assert!(frame.payload.is_empty());
                assert_eq!(frame.wire_size(), FRAME_HEADER_SIZE);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_needs_header() {
        let mut fb = FrameBuffer::new();
        assert_eq!(fb.decode(), Decoded::NeedMore);

        fb.extend(&[0x00, 0x00, 0x00]);
        assert_eq!(fb.decode(), Decoded::NeedMore);
    }

    #[test]
    fn test_decode_needs_payload() {
        let mut fb = FrameBuffer::new();
        // Header claims 16 payload bytes, only 2 present.
        fb.extend(&[0x04, 0x00, 0x00, 0x10, 0xAA, 0xBB]);
        assert_eq!(fb.decode(), Decoded::NeedMore);
        assert_eq!(fb.fill(), 6);
    }

    #[test]
    fn test_decode_corrupt_length() {
        let mut fb = FrameBuffer::new();
        fb.extend(&[0x04, 0x00, 0xFF, 0xFF]);

        match fb.decode() {
            Decoded::Corrupt { claimed } => assert_eq!(claimed, 0xFFFF),
            other => panic!("expected corrupt, got {other:?}"),
        }

        fb.reset();
        assert!(fb.is_empty());
        assert_eq!(fb.decode(), Decoded::NeedMore);
    }

    #[test]
    fn test_max_payload_is_not_corrupt() {
        let payload = vec![0x42u8; PAYLOAD_MAX];
        let mut wire = BytesMut::new();
        encode_frame(4, &payload, &mut wire).unwrap();

        let mut fb = FrameBuffer::new();
        assert_eq!(fb.extend(&wire), FRAME_MAX_SIZE);
        assert_eq!(fb.capacity_left(), 0);

        let n = match fb.decode() {
            Decoded::Frame(frame) => {
                assert_eq!(frame.payload.len(), PAYLOAD_MAX);
                frame.wire_size()
            }
            other => panic!("expected frame, got {other:?}"),
        };
        fb.consume(n);
        assert!(fb.is_empty());
    }

    #[test]
    fn test_tail_compaction() {
        let mut wire = BytesMut::new();
        encode_frame(0, &[], &mut wire).unwrap();
        encode_frame(4, b"abcd", &mut wire).unwrap();

        let mut fb = FrameBuffer::new();
        fb.extend(&wire);

        let n = match fb.decode() {
            Decoded::Frame(frame) => {
                assert_eq!(frame.kind, 0);
                frame.wire_size()
            }
            other => panic!("expected frame, got {other:?}"),
        };
        fb.consume(n);

        // The second frame slid to the buffer head.
        match fb.decode() {
            Decoded::Frame(frame) => {
                assert_eq!(frame.kind, 4);
                assert_eq!(frame.payload, b"abcd");
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_byte_at_a_time_equals_bulk() {
        let mut stream = BytesMut::new();
        encode_frame(0, &[], &mut stream).unwrap();
        encode_frame(1, &[0xAA; 128], &mut stream).unwrap();
        encode_frame(4, &[0x55; 1500], &mut stream).unwrap();
        encode_frame(6, &[], &mut stream).unwrap();

        let bulk = drain_in_steps(&stream, stream.len());
        let trickle = drain_in_steps(&stream, 1);
        let odd = drain_in_steps(&stream, 7);

        assert_eq!(bulk.len(), 4);
        assert_eq!(bulk, trickle);
        assert_eq!(bulk, odd);
    }

    #[test]
    #[should_panic(expected = "beyond valid prefix")]
    fn test_consume_beyond_fill_panics() {
        let mut fb = FrameBuffer::new();
        fb.extend(&[1, 2, 3]);
        fb.consume(4);
    }
}
