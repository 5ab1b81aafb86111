//! Wire packet layout and CRC.
//!
//! ```text
//! SOH(2) || crc16(2) || chunk_number(2) || total_chunks(2) || sequence_no(2)
//!        || packet_type(1) || timestamp(4) || payload_length(1) || payload
//! ```
//!
//! All integers big-endian. The CRC-16/XMODEM covers everything after the
//! checksum field, with two zero bytes appended in place of the checksum
//! itself.

use x1_sdk::codec::crc16;

pub const START_OF_HEADER: u16 = 0x5555;
pub const HEADER_LEN: usize = 16;
pub const MAX_PACKET_LEN: usize = 64;
pub const MAX_PAYLOAD_LEN: usize = MAX_PACKET_LEN - HEADER_LEN;
/// Upper bound for one reassembled command.
pub const REASSEMBLY_LIMIT: usize = 6 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Cmd = 1,
    Abort = 2,
    StatusReq = 3,
    StatusAck = 4,
    Error = 5,
}

impl TryFrom<u8> for PacketType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            1 => Ok(PacketType::Cmd),
            2 => Ok(PacketType::Abort),
            3 => Ok(PacketType::StatusReq),
            4 => Ok(PacketType::StatusAck),
            5 => Ok(PacketType::Error),
            _ => Err(FrameError::InvalidPacketType),
        }
    }
}

/// Error sub-codes sent back in an `Error` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    NoError = 0,
    ChecksumError = 1,
    BusyPreviousCmd = 2,
    OutOfOrderChunk = 3,
    InvalidChunkCount = 4,
    InvalidSequenceNo = 5,
    InvalidPayloadLength = 6,
    AppBufferBlocked = 7,
    NoMoreChunks = 8,
    InvalidPacketType = 9,
    InvalidChunkNo = 10,
    IncompletePacket = 11,
    AppBusyWithOtherInterface = 12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    BadStartOfHeader,
    Incomplete,
    PayloadTooLong,
    ChecksumMismatch,
    InvalidPacketType,
}

impl FrameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FrameError::BadStartOfHeader | FrameError::Incomplete => ErrorCode::IncompletePacket,
            FrameError::PayloadTooLong => ErrorCode::InvalidPayloadLength,
            FrameError::ChecksumMismatch => ErrorCode::ChecksumError,
            FrameError::InvalidPacketType => ErrorCode::InvalidPacketType,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub chunk_number: u16,
    pub total_chunks: u16,
    pub sequence_no: u16,
    pub packet_type: PacketType,
    pub timestamp: u32,
    pub payload_length: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: PacketType, sequence_no: u16) -> Packet {
        Packet {
            header: Header {
                chunk_number: 1,
                total_chunks: 1,
                sequence_no,
                packet_type,
                timestamp: 0,
                payload_length: 0,
            },
            payload: Vec::new(),
        }
    }
}

fn crc_of(header_after_crc: &[u8], payload: &[u8]) -> u16 {
    crc16::checksum_parts(&[header_after_crc, payload, &[0u8, 0u8]])
}

/// Serializes a packet, computing the checksum.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let h = &packet.header;
    debug_assert!(packet.payload.len() <= MAX_PAYLOAD_LEN);

    let mut after_crc = [0u8; HEADER_LEN - 4];
    after_crc[0..2].copy_from_slice(&h.chunk_number.to_be_bytes());
    after_crc[2..4].copy_from_slice(&h.total_chunks.to_be_bytes());
    after_crc[4..6].copy_from_slice(&h.sequence_no.to_be_bytes());
    after_crc[6] = h.packet_type as u8;
    after_crc[7..11].copy_from_slice(&h.timestamp.to_be_bytes());
    after_crc[11] = packet.payload.len() as u8;

    let crc = crc_of(&after_crc, &packet.payload);

    let mut out = Vec::with_capacity(HEADER_LEN + packet.payload.len());
    out.extend_from_slice(&START_OF_HEADER.to_be_bytes());
    out.extend_from_slice(&crc.to_be_bytes());
    out.extend_from_slice(&after_crc);
    out.extend_from_slice(&packet.payload);
    out
}

/// Parses and validates one wire packet.
pub fn decode(data: &[u8]) -> Result<Packet, FrameError> {
    if data.len() < HEADER_LEN {
        return Err(FrameError::Incomplete);
    }
    if u16::from_be_bytes([data[0], data[1]]) != START_OF_HEADER {
        return Err(FrameError::BadStartOfHeader);
    }
    let claimed_crc = u16::from_be_bytes([data[2], data[3]]);
    let payload_length = data[15] as usize;
    if payload_length > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLong);
    }
    if data.len() < HEADER_LEN + payload_length {
        return Err(FrameError::Incomplete);
    }
    let payload = &data[HEADER_LEN..HEADER_LEN + payload_length];

    if crc_of(&data[4..HEADER_LEN], payload) != claimed_crc {
        return Err(FrameError::ChecksumMismatch);
    }

    Ok(Packet {
        header: Header {
            chunk_number: u16::from_be_bytes([data[4], data[5]]),
            total_chunks: u16::from_be_bytes([data[6], data[7]]),
            sequence_no: u16::from_be_bytes([data[8], data[9]]),
            packet_type: PacketType::try_from(data[10])?,
            timestamp: u32::from_be_bytes([data[11], data[12], data[13], data[14]]),
            payload_length: payload_length as u8,
        },
        payload: payload.to_vec(),
    })
}

/// Splits a command payload into wire frames.
pub fn chunk_command(
    packet_type: PacketType,
    sequence_no: u16,
    timestamp: u32,
    payload: &[u8],
) -> Vec<Vec<u8>> {
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![&[][..]]
    } else {
        payload.chunks(MAX_PAYLOAD_LEN).collect()
    };
    let total = chunks.len() as u16;

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            encode(&Packet {
                header: Header {
                    chunk_number: i as u16 + 1,
                    total_chunks: total,
                    sequence_no,
                    packet_type,
                    timestamp,
                    payload_length: chunk.len() as u8,
                },
                payload: chunk.to_vec(),
            })
        })
        .collect()
}
