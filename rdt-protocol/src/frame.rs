//! RDT Frame Structures and Serialization
//!
//! Every datagram starts with an 8-byte header of two 32-bit big-endian
//! fields. Data frames carry `(sequence, secondary)` followed by the payload;
//! control messages sent back by the receiver carry
//! `(cumulative_ack, advertised_window)` and nothing else.
//!
//! The meaning of `secondary` is fixed per session by the [`HeaderMode`]:
//! either the sequence number expected after this frame, or a keepalive flag.

use crate::sequence::{SeqNumber, SeqSpace};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Size of the data frame header in bytes (2 fields × 4 bytes each)
pub const HEADER_SIZE: usize = 8;

/// Size of a control message in bytes
pub const CONTROL_SIZE: usize = 8;

/// Largest payload that still fits a UDP datagram (65507 - header)
pub const MAX_FRAME_SIZE: usize = 65_507 - HEADER_SIZE;

/// `secondary` value of a data frame in keepalive-flag mode
const DATA_FLAG: u32 = 0;

/// `secondary` value of a keepalive frame in keepalive-flag mode
const KEEPALIVE_FLAG: u32 = 1;

/// Frame errors
///
/// A frame that fails to decode is treated as lost.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Truncated frame: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Payload of {size} bytes exceeds frame size {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Sequence number {seq} outside [0, {modulus})")]
    SequenceOutOfRange { seq: u32, modulus: u32 },

    #[error("Frame {seq} declares next sequence {declared}, payload implies {expected}")]
    InconsistentLength {
        seq: SeqNumber,
        declared: u32,
        expected: SeqNumber,
    },

    #[error("Invalid keepalive flag: {0}")]
    InvalidFlag(u32),

    #[error("Keepalive frame carries {0} payload bytes")]
    KeepalivePayload(usize),

    #[error("Control message must be 8 bytes, got {0}")]
    ControlLength(usize),

    #[error("Header mode {0:?} has no keepalive frames")]
    KeepaliveUnsupported(HeaderMode),
}

/// Kind of data-layout frame
///
/// Acknowledgements never use this layout; they travel as a
/// [`ControlMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFlag {
    /// Carries payload bytes
    Data,
    /// Zero-length probe asking the receiver for a fresh ack
    Keepalive,
}

/// Interpretation of the second header field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    /// `secondary = (seq + payload_len) mod maxseqnum`
    ExpectedNext,
    /// `secondary` is 0 for data and 1 for keepalive
    KeepaliveFlag,
}

/// Decoded data or keepalive frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number of the first payload byte
    pub seq: SeqNumber,
    /// Frame kind
    pub flag: FrameFlag,
    /// Payload data
    pub payload: Bytes,
}

impl Frame {
    /// Create a data frame
    pub fn data(seq: SeqNumber, payload: Bytes) -> Self {
        Frame {
            seq,
            flag: FrameFlag::Data,
            payload,
        }
    }

    /// Create a keepalive frame
    pub fn keepalive(seq: SeqNumber) -> Self {
        Frame {
            seq,
            flag: FrameFlag::Keepalive,
            payload: Bytes::new(),
        }
    }

    /// Check if this is a keepalive frame
    #[inline]
    pub fn is_keepalive(&self) -> bool {
        self.flag == FrameFlag::Keepalive
    }

    /// Total size on the wire (header + payload)
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.flag {
            FrameFlag::Keepalive => write!(f, "keepalive@{}", self.seq),
            FrameFlag::Data => write!(f, "data@{}+{}", self.seq, self.payload.len()),
        }
    }
}

/// Receiver to sender control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage {
    /// All bytes before this sequence number have been received
    pub cumulative_ack: SeqNumber,
    /// Free space in the receive buffer, in bytes
    pub window: u32,
}

/// Encoder/decoder bound to one session's frame size, sequence space and
/// header mode
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    frame_size: usize,
    space: SeqSpace,
    header_mode: HeaderMode,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new(frame_size: usize, space: SeqSpace, header_mode: HeaderMode) -> Self {
        FrameCodec {
            frame_size,
            space,
            header_mode,
        }
    }

    /// Maximum payload per frame
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Sequence space of the session
    pub fn space(&self) -> SeqSpace {
        self.space
    }

    /// Header mode of the session
    pub fn header_mode(&self) -> HeaderMode {
        self.header_mode
    }

    /// Largest datagram a valid data frame can occupy
    pub fn max_datagram_size(&self) -> usize {
        HEADER_SIZE + self.frame_size
    }

    /// Serialize a data frame
    pub fn encode_data(&self, seq: SeqNumber, payload: &[u8]) -> Result<Bytes, FrameError> {
        if payload.len() > self.frame_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.frame_size,
            });
        }
        self.check_range(seq)?;

        let secondary = match self.header_mode {
            HeaderMode::ExpectedNext => self.space.add(seq, payload.len() as u64).as_raw(),
            HeaderMode::KeepaliveFlag => DATA_FLAG,
        };

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u32(seq.as_raw());
        buf.put_u32(secondary);
        buf.put_slice(payload);
        Ok(buf.freeze())
    }

    /// Serialize a zero-length keepalive frame
    pub fn encode_keepalive(&self, seq: SeqNumber) -> Result<Bytes, FrameError> {
        if self.header_mode != HeaderMode::KeepaliveFlag {
            return Err(FrameError::KeepaliveUnsupported(self.header_mode));
        }
        self.check_range(seq)?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_u32(seq.as_raw());
        buf.put_u32(KEEPALIVE_FLAG);
        Ok(buf.freeze())
    }

    /// Serialize any data-layout frame
    pub fn encode(&self, frame: &Frame) -> Result<Bytes, FrameError> {
        match frame.flag {
            FrameFlag::Data => self.encode_data(frame.seq, &frame.payload),
            FrameFlag::Keepalive if frame.payload.is_empty() => self.encode_keepalive(frame.seq),
            FrameFlag::Keepalive => Err(FrameError::KeepalivePayload(frame.payload.len())),
        }
    }

    /// Parse a data or keepalive frame
    pub fn decode_data(&self, bytes: &[u8]) -> Result<Frame, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let payload_len = bytes.len() - HEADER_SIZE;
        if payload_len > self.frame_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: self.frame_size,
            });
        }

        let mut header = &bytes[..HEADER_SIZE];
        let seq = SeqNumber::new(header.get_u32());
        let secondary = header.get_u32();
        self.check_range(seq)?;

        let flag = match self.header_mode {
            HeaderMode::ExpectedNext => {
                let expected = self.space.add(seq, payload_len as u64);
                if secondary != expected.as_raw() {
                    return Err(FrameError::InconsistentLength {
                        seq,
                        declared: secondary,
                        expected,
                    });
                }
                FrameFlag::Data
            }
            HeaderMode::KeepaliveFlag => match secondary {
                DATA_FLAG => FrameFlag::Data,
                KEEPALIVE_FLAG if payload_len == 0 => FrameFlag::Keepalive,
                KEEPALIVE_FLAG => return Err(FrameError::KeepalivePayload(payload_len)),
                other => return Err(FrameError::InvalidFlag(other)),
            },
        };

        Ok(Frame {
            seq,
            flag,
            payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
        })
    }

    /// Serialize a control message
    pub fn encode_control(&self, msg: &ControlMessage) -> Bytes {
        let mut buf = BytesMut::with_capacity(CONTROL_SIZE);
        buf.put_u32(msg.cumulative_ack.as_raw());
        buf.put_u32(msg.window);
        buf.freeze()
    }

    /// Parse a control message
    pub fn decode_control(&self, bytes: &[u8]) -> Result<ControlMessage, FrameError> {
        if bytes.len() != CONTROL_SIZE {
            return Err(FrameError::ControlLength(bytes.len()));
        }

        let mut buf = bytes;
        let cumulative_ack = SeqNumber::new(buf.get_u32());
        let window = buf.get_u32();
        self.check_range(cumulative_ack)?;

        Ok(ControlMessage {
            cumulative_ack,
            window,
        })
    }

    fn check_range(&self, seq: SeqNumber) -> Result<(), FrameError> {
        if self.space.contains(seq) {
            Ok(())
        } else {
            Err(FrameError::SequenceOutOfRange {
                seq: seq.as_raw(),
                modulus: self.space.modulus(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(mode: HeaderMode) -> FrameCodec {
        FrameCodec::new(10, SeqSpace::new(256), mode)
    }

    #[test]
    fn test_data_frame_expected_next() {
        let codec = codec(HeaderMode::ExpectedNext);
        let bytes = codec.encode_data(SeqNumber::new(250), b"0123456789").unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 10);
        assert_eq!(&bytes[..4], &250u32.to_be_bytes());
        // 250 + 10 wraps to 4
        assert_eq!(&bytes[4..8], &4u32.to_be_bytes());

        let frame = codec.decode_data(&bytes).unwrap();
        assert_eq!(frame.seq, SeqNumber::new(250));
        assert_eq!(frame.flag, FrameFlag::Data);
        assert_eq!(&frame.payload[..], b"0123456789");
    }

    #[test]
    fn test_keepalive_flag_mode() {
        let codec = codec(HeaderMode::KeepaliveFlag);

        let data = codec.encode_data(SeqNumber::new(20), b"abc").unwrap();
        assert_eq!(&data[4..8], &0u32.to_be_bytes());
        assert_eq!(codec.decode_data(&data).unwrap().flag, FrameFlag::Data);

        let keepalive = codec.encode_keepalive(SeqNumber::new(23)).unwrap();
        assert_eq!(keepalive.len(), HEADER_SIZE);
        let frame = codec.decode_data(&keepalive).unwrap();
        assert!(frame.is_keepalive());
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_keepalive_unsupported_in_expected_next() {
        let codec = codec(HeaderMode::ExpectedNext);
        assert_eq!(
            codec.encode_keepalive(SeqNumber::new(0)),
            Err(FrameError::KeepaliveUnsupported(HeaderMode::ExpectedNext))
        );
    }

    #[test]
    fn test_decode_truncated() {
        let codec = codec(HeaderMode::KeepaliveFlag);
        assert_eq!(
            codec.decode_data(&[0, 0, 0, 1]),
            Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                actual: 4
            })
        );
    }

    #[test]
    fn test_payload_too_large() {
        let codec = codec(HeaderMode::KeepaliveFlag);
        assert!(matches!(
            codec.encode_data(SeqNumber::new(0), &[0u8; 11]),
            Err(FrameError::PayloadTooLarge { size: 11, max: 10 })
        ));

        let mut raw = vec![0u8; HEADER_SIZE + 11];
        raw[3] = 1;
        assert!(matches!(
            codec.decode_data(&raw),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_sequence_out_of_range() {
        let codec = codec(HeaderMode::KeepaliveFlag);
        let mut raw = BytesMut::new();
        raw.put_u32(256);
        raw.put_u32(0);
        assert!(matches!(
            codec.decode_data(&raw),
            Err(FrameError::SequenceOutOfRange { seq: 256, .. })
        ));
    }

    #[test]
    fn test_inconsistent_length() {
        let codec = codec(HeaderMode::ExpectedNext);
        let mut raw = BytesMut::new();
        raw.put_u32(10);
        raw.put_u32(25); // claims 15 bytes
        raw.put_slice(b"short");
        assert!(matches!(
            codec.decode_data(&raw),
            Err(FrameError::InconsistentLength { declared: 25, .. })
        ));
    }

    #[test]
    fn test_invalid_flag_and_keepalive_payload() {
        let codec = codec(HeaderMode::KeepaliveFlag);

        let mut raw = BytesMut::new();
        raw.put_u32(0);
        raw.put_u32(7);
        assert_eq!(codec.decode_data(&raw), Err(FrameError::InvalidFlag(7)));

        let mut raw = BytesMut::new();
        raw.put_u32(0);
        raw.put_u32(KEEPALIVE_FLAG);
        raw.put_slice(b"x");
        assert_eq!(codec.decode_data(&raw), Err(FrameError::KeepalivePayload(1)));
    }

    #[test]
    fn test_control_message() {
        let codec = codec(HeaderMode::KeepaliveFlag);
        let msg = ControlMessage {
            cumulative_ack: SeqNumber::new(30),
            window: 1024,
        };

        let bytes = codec.encode_control(&msg);
        assert_eq!(bytes.len(), CONTROL_SIZE);
        assert_eq!(codec.decode_control(&bytes).unwrap(), msg);

        assert_eq!(
            codec.decode_control(&bytes[..7]),
            Err(FrameError::ControlLength(7))
        );

        let mut raw = BytesMut::new();
        raw.put_u32(300);
        raw.put_u32(0);
        assert!(matches!(
            codec.decode_control(&raw),
            Err(FrameError::SequenceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_encode_frame() {
        let codec = codec(HeaderMode::KeepaliveFlag);
        let frame = Frame::data(SeqNumber::new(5), Bytes::from_static(b"hello"));
        let bytes = codec.encode(&frame).unwrap();
        assert_eq!(codec.decode_data(&bytes).unwrap(), frame);

        let keepalive = Frame {
            seq: SeqNumber::new(0),
            flag: FrameFlag::Keepalive,
            payload: Bytes::from_static(b"x"),
        };
        assert_eq!(
            codec.encode(&keepalive),
            Err(FrameError::KeepalivePayload(1))
        );
    }
}
