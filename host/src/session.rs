//! Command reassembly, interface pinning and status handling.

use log::{debug, warn};

use crate::frame::{self, ErrorCode, Packet, PacketType, MAX_PAYLOAD_LEN, REASSEMBLY_LIMIT};

/// The two USB bulk endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    A,
    B,
}

/// Command lifecycle, reported in status responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmdState {
    None = 0,
    Receiving = 1,
    Received = 2,
    Executing = 3,
    Done = 4,
    Failed = 5,
    InvalidReq = 6,
}

/// What the main loop should do after feeding a frame in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A command payload is fully reassembled.
    CommandReady { sequence_no: u16, payload: Vec<u8> },
    /// The in-flight flow must be aborted and its cleanup run.
    Aborted,
}

/// Frames to transmit plus an optional event for the main loop.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HostOutput {
    pub replies: Vec<Vec<u8>>,
    pub event: Option<HostEvent>,
}

impl HostOutput {
    fn reply(frame: Vec<u8>) -> HostOutput {
        HostOutput {
            replies: vec![frame],
            event: None,
        }
    }
}

/// Single in-flight command session over the host link.
pub struct HostSession {
    buffer: Vec<u8>,
    state: CmdState,
    active_interface: Option<Interface>,
    sequence_no: u16,
    next_chunk: u16,
    expected_total: u16,
    flow_status: u8,
    timestamp: u32,
}

impl HostSession {
    pub fn new() -> HostSession {
        HostSession {
            buffer: Vec::new(),
            state: CmdState::None,
            active_interface: None,
            sequence_no: 0,
            next_chunk: 1,
            expected_total: 0,
            flow_status: 0,
            timestamp: 0,
        }
    }

    pub fn state(&self) -> CmdState {
        self.state
    }

    pub fn active_interface(&self) -> Option<Interface> {
        self.active_interface
    }

    /// Flow progress counter surfaced through status responses.
    pub fn set_flow_status(&mut self, status: u8) {
        self.flow_status = status;
    }

    pub fn mark_executing(&mut self) {
        if self.state == CmdState::Received {
            self.state = CmdState::Executing;
        }
    }

    /// Feeds one raw frame from an interface into the session.
    pub fn handle_frame(&mut self, raw: &[u8], interface: Interface) -> HostOutput {
        let packet = match frame::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("host frame rejected: {:?}", e);
                return HostOutput::reply(self.error_frame(e.code()));
            }
        };
        self.timestamp = packet.header.timestamp;

        // Status and abort packets bypass the pinning rule so the host can
        // always poll and always cancel.
        match packet.header.packet_type {
            PacketType::StatusReq => return HostOutput::reply(self.status_frame()),
            PacketType::Abort => return self.handle_abort(interface),
            PacketType::Cmd => {}
            _ => return HostOutput::reply(self.error_frame(ErrorCode::InvalidPacketType)),
        }

        if let Some(active) = self.active_interface {
            if active != interface {
                return HostOutput::reply(self.error_frame(ErrorCode::AppBusyWithOtherInterface));
            }
        }

        self.handle_cmd_chunk(packet, interface)
    }

    fn handle_cmd_chunk(&mut self, packet: Packet, interface: Interface) -> HostOutput {
        let header = packet.header;

        match self.state {
            CmdState::None | CmdState::Done | CmdState::Failed | CmdState::InvalidReq => {
                // New command: must start at chunk 1.
                if header.chunk_number != 1 {
                    return HostOutput::reply(self.error_frame(ErrorCode::InvalidChunkNo));
                }
                if header.total_chunks == 0
                    || header.total_chunks as usize * MAX_PAYLOAD_LEN > REASSEMBLY_LIMIT
                {
                    return HostOutput::reply(self.error_frame(ErrorCode::InvalidChunkCount));
                }
                self.buffer.clear();
                self.state = CmdState::Receiving;
                self.active_interface = Some(interface);
                self.sequence_no = header.sequence_no;
                self.expected_total = header.total_chunks;
                self.next_chunk = 1;
            }
            CmdState::Receiving => {
                if header.sequence_no != self.sequence_no {
                    return HostOutput::reply(self.error_frame(ErrorCode::InvalidSequenceNo));
                }
                if header.total_chunks != self.expected_total {
                    return HostOutput::reply(self.error_frame(ErrorCode::InvalidChunkCount));
                }
            }
            CmdState::Received | CmdState::Executing => {
                return HostOutput::reply(self.error_frame(ErrorCode::BusyPreviousCmd));
            }
        }

        if header.chunk_number != self.next_chunk {
            // Out-of-order chunk: report and reset reassembly entirely.
            warn!(
                "out-of-order chunk {} (expected {})",
                header.chunk_number, self.next_chunk
            );
            self.reset_reassembly();
            return HostOutput::reply(self.error_frame(ErrorCode::OutOfOrderChunk));
        }
        if self.buffer.len() + packet.payload.len() > REASSEMBLY_LIMIT {
            self.reset_reassembly();
            return HostOutput::reply(self.error_frame(ErrorCode::AppBufferBlocked));
        }

        self.buffer.extend_from_slice(&packet.payload);

        if header.chunk_number == self.expected_total {
            self.state = CmdState::Received;
            debug!(
                "command {} reassembled ({} bytes)",
                self.sequence_no,
                self.buffer.len()
            );
            let payload = core::mem::take(&mut self.buffer);
            return HostOutput {
                replies: vec![self.status_frame()],
                event: Some(HostEvent::CommandReady {
                    sequence_no: self.sequence_no,
                    payload,
                }),
            };
        }

        self.next_chunk += 1;
        HostOutput {
            replies: vec![self.status_frame()],
            event: None,
        }
    }

    fn handle_abort(&mut self, _interface: Interface) -> HostOutput {
        let was_active = self.state != CmdState::None;
        self.reset_reassembly();
        self.active_interface = None;
        self.state = CmdState::None;
        HostOutput {
            replies: vec![self.status_frame()],
            event: was_active.then_some(HostEvent::Aborted),
        }
    }

    /// Sends the final result of a command and unpins the interface.
    pub fn send_response(&mut self, payload: &[u8]) -> Vec<Vec<u8>> {
        let frames = frame::chunk_command(
            PacketType::Cmd,
            self.sequence_no,
            self.timestamp,
            payload,
        );
        self.state = CmdState::Done;
        self.active_interface = None;
        self.reset_reassembly();
        frames
    }

    /// Sends an error result and unpins the interface.
    pub fn send_failure(&mut self, payload: &[u8]) -> Vec<Vec<u8>> {
        let frames = frame::chunk_command(
            PacketType::Cmd,
            self.sequence_no,
            self.timestamp,
            payload,
        );
        self.state = CmdState::Failed;
        self.active_interface = None;
        self.reset_reassembly();
        frames
    }

    fn reset_reassembly(&mut self) {
        self.buffer.clear();
        self.next_chunk = 1;
        self.expected_total = 0;
        if self.state == CmdState::Receiving {
            self.state = CmdState::None;
            self.active_interface = None;
        }
    }

    /// `[busy, cmd_state, flow_status, seq_hi, seq_lo]`
    fn status_frame(&self) -> Vec<u8> {
        let busy = matches!(self.state, CmdState::Receiving | CmdState::Executing) as u8;
        let payload = [
            busy,
            self.state as u8,
            self.flow_status,
            (self.sequence_no >> 8) as u8,
            self.sequence_no as u8,
        ];
        encode_single(PacketType::StatusAck, self.sequence_no, self.timestamp, &payload)
    }

    fn error_frame(&self, code: ErrorCode) -> Vec<u8> {
        encode_single(
            PacketType::Error,
            self.sequence_no,
            self.timestamp,
            &[code as u8],
        )
    }
}

impl Default for HostSession {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_single(
    packet_type: PacketType,
    sequence_no: u16,
    timestamp: u32,
    payload: &[u8],
) -> Vec<u8> {
    frame::encode(&Packet {
        header: crate::frame::Header {
            chunk_number: 1,
            total_chunks: 1,
            sequence_no,
            packet_type,
            timestamp,
            payload_length: payload.len() as u8,
        },
        payload: payload.to_vec(),
    })
}

/// Convenience used by tests and the frame-level error path.
pub fn frame_error_code(raw: &[u8]) -> Option<ErrorCode> {
    let packet = frame::decode(raw).ok()?;
    if packet.header.packet_type != PacketType::Error {
        return None;
    }
    match packet.payload.first()? {
        1 => Some(ErrorCode::ChecksumError),
        2 => Some(ErrorCode::BusyPreviousCmd),
        3 => Some(ErrorCode::OutOfOrderChunk),
        4 => Some(ErrorCode::InvalidChunkCount),
        5 => Some(ErrorCode::InvalidSequenceNo),
        6 => Some(ErrorCode::InvalidPayloadLength),
        7 => Some(ErrorCode::AppBufferBlocked),
        8 => Some(ErrorCode::NoMoreChunks),
        9 => Some(ErrorCode::InvalidPacketType),
        10 => Some(ErrorCode::InvalidChunkNo),
        11 => Some(ErrorCode::IncompletePacket),
        12 => Some(ErrorCode::AppBusyWithOtherInterface),
        _ => Some(ErrorCode::NoError),
    }
}
