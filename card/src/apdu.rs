//! APDU construction and parsing, including the TLV payload format used by
//! the wallet applet.

use crate::error::CardError;

pub const CLA_ISO7816: u8 = 0x00;

/// Applet instruction codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    Select = 0xA4,
    Pair = 0x12,
    Unpair = 0x13,
    EstablishSession = 0x14,
    AddWallet = 0xC1,
    RetrieveWallet = 0xC2,
    DeleteWallet = 0xC3,
    ListWallets = 0xC4,
    SignEcdsa = 0xC6,
    ProofOfWork = 0xCB,
}

/// P1 selectors for the proof-of-work instruction.
pub const P1_POW_GET_CHALLENGE: u8 = 0x00;
pub const P1_POW_VERIFY_CHALLENGE: u8 = 0x01;

/// TLV tags shared with the applet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Name = 0xE0,
    ShareX = 0xE2,
    WalletShare = 0xE5,
    WalletInfo = 0xE8,
    WalletId = 0xEC,
    ShareIv = 0xEE,
    ShareMac = 0xEF,
    SignedData = 0xEB,

    Version = 0xB0,
    FamilyId = 0xB1,
    CardNumber = 0xB2,
    CardKeyId = 0xB3,
    RecoveryMode = 0xB5,

    PowRandomNumber = 0xD1,
    PowTarget = 0xD2,
    PowNonce = 0xD3,

    SessionNonce = 0xD8,
}

/// 2-byte ISO 7816 status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const NO_ERROR: StatusWord = StatusWord(0x9000);
    pub const WARNING_STATE_UNCHANGED: StatusWord = StatusWord(0x6200);
    pub const FILE_INVALID: StatusWord = StatusWord(0x6983);
    pub const FILE_NOT_FOUND: StatusWord = StatusWord(0x6A82);
    pub const RECORD_NOT_FOUND: StatusWord = StatusWord(0x6A83);
    pub const FILE_FULL: StatusWord = StatusWord(0x6A84);
    pub const WRONG_DATA: StatusWord = StatusWord(0x6A80);
    pub const SECURITY_CONDITIONS_NOT_SATISFIED: StatusWord = StatusWord(0x6982);
    pub const CONDITIONS_NOT_SATISFIED: StatusWord = StatusWord(0x6985);
    pub const NOT_PAIRED: StatusWord = StatusWord(0x7985);
    pub const INCOMPATIBLE_APPLET: StatusWord = StatusWord(0x1000);
    pub const INVALID_INS: StatusWord = StatusWord(0x6D00);
    pub const INS_BLOCKED: StatusWord = StatusWord(0x7E00);
    pub const POW_WALLET_LOCKED: StatusWord = StatusWord(0x7D00);
    pub const POW_CHALLENGE_FAILED: StatusWord = StatusWord(0x6A88);

    pub fn is_success(&self) -> bool {
        *self == StatusWord::NO_ERROR || *self == StatusWord::WARNING_STATE_UNCHANGED
    }
}

impl core::fmt::Display for StatusWord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Command APDU: `CLA INS P1 P2 Lc data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    pub ins: Instruction,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl Apdu {
    pub fn new(ins: Instruction) -> Apdu {
        Apdu {
            ins,
            p1: 0,
            p2: 0,
            data: Vec::new(),
        }
    }

    pub fn with_p1(mut self, p1: u8) -> Apdu {
        self.p1 = p1;
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Apdu {
        self.data = data;
        self
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.data.len());
        out.push(CLA_ISO7816);
        out.push(self.ins as u8);
        out.push(self.p1);
        out.push(self.p2);
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Response APDU split into payload and status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    pub status: StatusWord,
}

impl Response {
    pub fn parse(raw: &[u8]) -> Result<Response, CardError> {
        if raw.len() < 2 {
            return Err(CardError::MalformedResponse);
        }
        let (data, sw) = raw.split_at(raw.len() - 2);
        Ok(Response {
            data: data.to_vec(),
            status: StatusWord(u16::from_be_bytes([sw[0], sw[1]])),
        })
    }
}

/// Appends `[tag, len, value]`.
pub fn push_tlv(out: &mut Vec<u8>, tag: Tag, value: &[u8]) {
    debug_assert!(value.len() <= u8::MAX as usize);
    out.push(tag as u8);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
}

/// Finds the first occurrence of `tag` and returns its value.
pub fn find_tlv<'a>(data: &'a [u8], tag: Tag) -> Option<&'a [u8]> {
    let mut offset = 0;
    while offset + 2 <= data.len() {
        let current = data[offset];
        let len = data[offset + 1] as usize;
        let value = data.get(offset + 2..offset + 2 + len)?;
        if current == tag as u8 {
            return Some(value);
        }
        offset += 2 + len;
    }
    None
}

/// Collects every occurrence of `tag` in order.
pub fn find_all_tlv<'a>(data: &'a [u8], tag: Tag) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset + 2 <= data.len() {
        let current = data[offset];
        let len = data[offset + 1] as usize;
        match data.get(offset + 2..offset + 2 + len) {
            Some(value) => {
                if current == tag as u8 {
                    out.push(value);
                }
                offset += 2 + len;
            }
            None => break,
        }
    }
    out
}
