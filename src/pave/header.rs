//! PaVE header decoding
//!
//! Fixed-schema decoder for the Parrot Video Encapsulation record that
//! precedes every encoded video payload. All multi-byte fields are
//! little-endian.

use std::fmt;

/// Frame start marker
pub const PAVE_SIGNATURE: [u8; 4] = *b"PaVE";

/// Bytes covered by named fields (everything up to `advertised_size`).
/// A header that declares less than this cannot be genuine.
pub const PAVE_FIELDS_LEN: usize = 52;

/// Header length emitted by the drone firmware (fields plus reserved padding)
pub const PAVE_DEFAULT_HEADER_LEN: u16 = 64;

/// Codec identifier carried in the `video_codec` byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Unknown,
    Vlib,
    P264,
    Mpeg4Visual,
    /// MPEG4-AVC, i.e. H.264
    H264,
    Other(u8),
}

impl VideoCodec {
    pub fn from_id(id: u8) -> Self {
        match id {
            0 => VideoCodec::Unknown,
            1 => VideoCodec::Vlib,
            2 => VideoCodec::P264,
            3 => VideoCodec::Mpeg4Visual,
            4 => VideoCodec::H264,
            other => VideoCodec::Other(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            VideoCodec::Unknown => 0,
            VideoCodec::Vlib => 1,
            VideoCodec::P264 => 2,
            VideoCodec::Mpeg4Visual => 3,
            VideoCodec::H264 => 4,
            VideoCodec::Other(id) => *id,
        }
    }

    /// Only H.264 and MPEG4-visual are republished downstream
    pub fn is_supported(&self) -> bool {
        matches!(self, VideoCodec::H264 | VideoCodec::Mpeg4Visual)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H.264",
            VideoCodec::Mpeg4Visual => "MPEG4-visual",
            _ => "unsupported",
        }
    }

    /// File extension for a raw elementary stream of this codec
    pub fn stream_extension(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::Mpeg4Visual => "m4v",
            _ => "bin",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Frame kind carried in the `frame_type` byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Unknown,
    /// Parameter sets followed by an I-frame
    Idr,
    I,
    P,
    Headers,
}

impl FrameType {
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => FrameType::Idr,
            2 => FrameType::I,
            3 => FrameType::P,
            4 => FrameType::Headers,
            _ => FrameType::Unknown,
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            FrameType::Unknown => 0,
            FrameType::Idr => 1,
            FrameType::I => 2,
            FrameType::P => 3,
            FrameType::Headers => 4,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, FrameType::Idr | FrameType::I)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Unknown => write!(f, "unknown"),
            FrameType::Idr => write!(f, "IDR"),
            FrameType::I => write!(f, "I"),
            FrameType::P => write!(f, "P"),
            FrameType::Headers => write!(f, "headers"),
        }
    }
}

/// Why a header could not be decoded at an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderParse {
    /// Signature mismatch, or a signature with an impossible `header_size`
    NotAHeader,
    /// Signature present but fewer than [`PAVE_FIELDS_LEN`] bytes follow
    Truncated { available: usize },
}

/// Decoded PaVE header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub codec: VideoCodec,
    /// Offset of the payload from the header start
    pub header_size: u16,
    pub payload_size: u32,
    pub encoded_width: u16,
    pub encoded_height: u16,
    pub display_width: u16,
    pub display_height: u16,
    pub frame_number: u32,
    /// Vehicle clock, milliseconds
    pub timestamp_ms: u32,
    pub total_chunks: u8,
    pub chunk_index: u8,
    pub frame_type: FrameType,
    pub control: u8,
    pub stream_byte_position: u64,
    pub stream_id: u16,
    pub total_slices: u8,
    pub slice_index: u8,
    /// H.264 only: SPS bytes at the start of the payload, zero if absent
    pub sps_size: u8,
    /// H.264 only: PPS bytes following the SPS, zero if absent
    pub pps_size: u8,
    pub advertised_size: u32,
}

impl FrameHeader {
    /// Decode the header starting at `offset`.
    pub fn try_parse(buffer: &[u8], offset: usize) -> Result<Self, HeaderParse> {
        let record = buffer.get(offset..).unwrap_or(&[]);

        let sig_len = record.len().min(PAVE_SIGNATURE.len());
        if record[..sig_len] != PAVE_SIGNATURE[..sig_len] {
            return Err(HeaderParse::NotAHeader);
        }
        if record.len() < PAVE_FIELDS_LEN {
            return Err(HeaderParse::Truncated { available: record.len() });
        }

        let header_size = u16_at(record, 6);
        if (header_size as usize) < PAVE_FIELDS_LEN {
            return Err(HeaderParse::NotAHeader);
        }

        let position_low = u32_at(record, 32) as u64;
        let position_high = u32_at(record, 36) as u64;

        Ok(Self {
            version: record[4],
            codec: VideoCodec::from_id(record[5]),
            header_size,
            payload_size: u32_at(record, 8),
            encoded_width: u16_at(record, 12),
            encoded_height: u16_at(record, 14),
            display_width: u16_at(record, 16),
            display_height: u16_at(record, 18),
            frame_number: u32_at(record, 20),
            timestamp_ms: u32_at(record, 24),
            total_chunks: record[28],
            chunk_index: record[29],
            frame_type: FrameType::from_id(record[30]),
            control: record[31],
            stream_byte_position: (position_high << 32) | position_low,
            stream_id: u16_at(record, 40),
            total_slices: record[42],
            slice_index: record[43],
            sps_size: record[44],
            pps_size: record[45],
            advertised_size: u32_at(record, 48),
        })
    }

    /// Total bytes occupied by header and payload, widened so corrupt sizes cannot overflow
    pub fn frame_len(&self) -> u64 {
        u64::from(self.header_size) + u64::from(self.payload_size)
    }

    /// Append the wire form of this header, padded to `header_size`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&PAVE_SIGNATURE);
        out.push(self.version);
        out.push(self.codec.id());
        out.extend_from_slice(&self.header_size.to_le_bytes());
        out.extend_from_slice(&self.payload_size.to_le_bytes());
        out.extend_from_slice(&self.encoded_width.to_le_bytes());
        out.extend_from_slice(&self.encoded_height.to_le_bytes());
        out.extend_from_slice(&self.display_width.to_le_bytes());
        out.extend_from_slice(&self.display_height.to_le_bytes());
        out.extend_from_slice(&self.frame_number.to_le_bytes());
        out.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        out.push(self.total_chunks);
        out.push(self.chunk_index);
        out.push(self.frame_type.id());
        out.push(self.control);
        out.extend_from_slice(&(self.stream_byte_position as u32).to_le_bytes());
        out.extend_from_slice(&((self.stream_byte_position >> 32) as u32).to_le_bytes());
        out.extend_from_slice(&self.stream_id.to_le_bytes());
        out.push(self.total_slices);
        out.push(self.slice_index);
        out.push(self.sps_size);
        out.push(self.pps_size);
        out.extend_from_slice(&[0u8; 2]);
        out.extend_from_slice(&self.advertised_size.to_le_bytes());

        let declared = (self.header_size as usize).max(PAVE_FIELDS_LEN);
        out.resize(start + declared, 0);
    }
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            version: 2,
            codec: VideoCodec::H264,
            header_size: PAVE_DEFAULT_HEADER_LEN,
            payload_size: 0,
            encoded_width: 640,
            encoded_height: 368,
            display_width: 640,
            display_height: 360,
            frame_number: 0,
            timestamp_ms: 0,
            total_chunks: 1,
            chunk_index: 0,
            frame_type: FrameType::P,
            control: 0,
            stream_byte_position: 0,
            stream_id: 0,
            total_slices: 1,
            slice_index: 0,
            sps_size: 0,
            pps_size: 0,
            advertised_size: 0,
        }
    }
}

fn u16_at(record: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([record[at], record[at + 1]])
}

fn u32_at(record: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> FrameHeader {
        FrameHeader {
            payload_size: 1234,
            frame_number: 77,
            timestamp_ms: 123_456,
            frame_type: FrameType::Idr,
            stream_byte_position: 0x0000_0001_0000_0002,
            sps_size: 10,
            pps_size: 4,
            ..FrameHeader::default()
        }
    }

    #[test]
    fn test_parse_known_layout() {
        let mut raw = vec![0u8; 64];
        raw[0..4].copy_from_slice(b"PaVE");
        raw[4] = 3;
        raw[5] = 4;
        raw[6..8].copy_from_slice(&64u16.to_le_bytes());
        raw[8..12].copy_from_slice(&100u32.to_le_bytes());
        raw[12..14].copy_from_slice(&640u16.to_le_bytes());
        raw[14..16].copy_from_slice(&368u16.to_le_bytes());
        raw[16..18].copy_from_slice(&640u16.to_le_bytes());
        raw[18..20].copy_from_slice(&360u16.to_le_bytes());
        raw[24..28].copy_from_slice(&5000u32.to_le_bytes());
        raw[30] = 1;

        let header = FrameHeader::try_parse(&raw, 0).unwrap();
        assert_eq!(header.version, 3);
        assert_eq!(header.codec, VideoCodec::H264);
        assert_eq!(header.header_size, 64);
        assert_eq!(header.payload_size, 100);
        assert_eq!(header.encoded_width, 640);
        assert_eq!(header.encoded_height, 368);
        assert_eq!(header.display_height, 360);
        assert_eq!(header.timestamp_ms, 5000);
        assert_eq!(header.frame_type, FrameType::Idr);
        assert_eq!(header.frame_len(), 164);
    }

    #[test]
    fn test_encode_then_parse_at_offset() {
        let header = sample_header();
        let mut raw = vec![0xAA; 7];
        header.encode(&mut raw);
        assert_eq!(raw.len(), 7 + 64);

        let parsed = FrameHeader::try_parse(&raw, 7).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.stream_byte_position, 0x0000_0001_0000_0002);
    }

    #[test]
    fn test_signature_mismatch() {
        let mut raw = Vec::new();
        sample_header().encode(&mut raw);
        raw[3] = b'e';
        assert_eq!(FrameHeader::try_parse(&raw, 0), Err(HeaderParse::NotAHeader));
        assert_eq!(FrameHeader::try_parse(b"xxxx", 0), Err(HeaderParse::NotAHeader));
    }

    #[test]
    fn test_truncated_header() {
        let mut raw = Vec::new();
        sample_header().encode(&mut raw);
        raw.truncate(30);
        assert_eq!(
            FrameHeader::try_parse(&raw, 0),
            Err(HeaderParse::Truncated { available: 30 })
        );
        // A partial signature at the very end is also a truncated header
        assert_eq!(
            FrameHeader::try_parse(b"zzPa", 2),
            Err(HeaderParse::Truncated { available: 2 })
        );
        assert_eq!(
            FrameHeader::try_parse(b"zz", 2),
            Err(HeaderParse::Truncated { available: 0 })
        );
    }

    #[test]
    fn test_impossible_header_size_rejected() {
        let header = FrameHeader { header_size: 12, ..sample_header() };
        let mut raw = Vec::new();
        header.encode(&mut raw);
        assert_eq!(FrameHeader::try_parse(&raw, 0), Err(HeaderParse::NotAHeader));
    }

    #[test]
    fn test_codec_mapping() {
        assert_eq!(VideoCodec::from_id(4).as_str(), "H.264");
        assert_eq!(VideoCodec::from_id(3).as_str(), "MPEG4-visual");
        assert!(!VideoCodec::from_id(2).is_supported());
        assert_eq!(VideoCodec::from_id(9), VideoCodec::Other(9));
        assert_eq!(VideoCodec::Other(9).as_str(), "unsupported");
    }
}
