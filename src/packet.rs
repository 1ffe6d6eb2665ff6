use std::sync::LazyLock;

use crate::constants::MAX_PLAUSIBLE_PLAYERS;

pub const HEADER_LEN: usize = 20;

const PLAYER_COUNT_OFFSET: usize = 20;
const CLIENT_VERSION: &str = "1802";
const AUTH_TYPE_ACCOUNT: u32 = 0x0000_0002;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PacketFlags(pub u32);

impl PacketFlags {
    pub const LOGIN_REQUEST: Self = Self(0x0001_0000);
    pub const CONNECT_RESPONSE: Self = Self(0x0080_0000);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for PacketFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Fixed packet header, packed little-endian with no padding.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: u32,
    pub flags: PacketFlags,
    pub checksum: u32,
    pub id: u16,
    pub time: u16,
    pub size: u16,
    pub table: u16,
}

impl PacketHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.sequence.to_le_bytes());
        out[4..8].copy_from_slice(&self.flags.bits().to_le_bytes());
        out[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        out[12..14].copy_from_slice(&self.id.to_le_bytes());
        out[14..16].copy_from_slice(&self.time.to_le_bytes());
        out[16..18].copy_from_slice(&self.size.to_le_bytes());
        out[18..20].copy_from_slice(&self.table.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }

        Some(Self {
            sequence: read_u32(buf, 0)?,
            flags: PacketFlags(read_u32(buf, 4)?),
            checksum: read_u32(buf, 8)?,
            id: read_u16(buf, 12)?,
            time: read_u16(buf, 14)?,
            size: read_u16(buf, 16)?,
            table: read_u16(buf, 18)?,
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_le_bytes(bytes.try_into().ok()?))
}

const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

pub fn checksum(data: &[u8]) -> u32 {
    let crc = data.iter().fold(0xFFFF_FFFFu32, |crc, &byte| {
        CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
    });
    !crc
}

static LOGIN_PACKET: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let mut payload = Vec::with_capacity(32);
    write_string16(&mut payload, CLIENT_VERSION);

    let mut body = Vec::with_capacity(24);
    body.extend_from_slice(&AUTH_TYPE_ACCOUNT.to_le_bytes());
    // auth flags and timestamp
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    write_string16(&mut body, "");
    write_string16(&mut body, "");
    // empty ticket
    body.extend_from_slice(&0u32.to_le_bytes());

    payload.extend_from_slice(&(body.len() as u32).to_le_bytes());
    payload.extend_from_slice(&body);

    let mut header = PacketHeader {
        flags: PacketFlags::LOGIN_REQUEST,
        size: payload.len() as u16,
        ..Default::default()
    };
    header.checksum = checksum(&header.encode()).wrapping_add(checksum(&payload));

    let mut packet = header.encode().to_vec();
    packet.extend_from_slice(&payload);
    packet
});

/// Length-prefixed string padded to a four byte boundary.
fn write_string16(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    let written = 2 + value.len();
    out.resize(out.len() + (4 - written % 4) % 4, 0);
}

/// The canned login request sent as a liveness ping.
pub fn build_login_packet() -> Vec<u8> {
    LOGIN_PACKET.clone()
}

pub fn try_extract_player_count(buffer: &[u8]) -> Option<u32> {
    if buffer.len() < PLAYER_COUNT_OFFSET + 4 {
        return None;
    }

    let header = PacketHeader::decode(buffer)?;
    if !header.flags.contains(PacketFlags::CONNECT_RESPONSE) {
        return None;
    }

    let count = read_u32(buffer, PLAYER_COUNT_OFFSET)?;
    (count <= MAX_PLAUSIBLE_PLAYERS).then_some(count)
}
