// Base block and hive bin headers.
//
// +--------------------+------------------------------+
// |     Base block     |        Hive bins data        |
// +--------------------+------------------------------+
//
// Only the first 0x200 bytes of the 4096-byte base block carry anything we need:
// the signature, the timestamp and the XOR-32 checksum stored at 0x1FC.
use std::fmt;

use bincode::Decode;
use tracing::debug;

use super::{
    decode,
    error::{HeaderFault, RegError, Result},
    source::ByteSource,
};

pub const HEADER_SIZE: usize = 0x200;
pub const CHECKSUM_OFFSET: usize = 0x1FC;
pub const HBIN_HEADER_SIZE: usize = 32;

const REGF_SIGNATURE: &[u8; 4] = b"regf";
pub(crate) const HBIN_SIGNATURE: &[u8; 4] = b"hbin";

// 100ns ticks since 1601-01-01
const WINDOWS_TICK: u64 = 10_000_000;
const SEC_TO_UNIX_EPOCH: i64 = 11_644_473_600;

/// A FILETIME: count of 100-nanosecond ticks since 1601-01-01 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Decode)]
pub struct Filetime(pub u64);

impl Filetime {
    /// Seconds since the Unix epoch, negative for dates before 1970.
    pub fn to_unix(self) -> i64 {
        (self.0 / WINDOWS_TICK) as i64 - SEC_TO_UNIX_EPOCH
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Decode)]
pub struct HiveVersion {
    pub major: u32,
    pub minor: u32,
    pub release: u32,
    pub build: u32,
}

#[derive(Debug, Clone, Decode)]
pub struct HiveHeader {
    // ASCII string
    pub signature: [u8; 4],

    // incremented at the beginning and at the end of a write, equal on a clean hive
    pub update_count1: u32,
    pub update_count2: u32,

    pub modified: Filetime,
    pub version: HiveVersion,

    // offset of the root cell, relative to the hive bins data
    pub data_offset: u32,

    // size of the hive bins data
    pub last_block: u32,

    // always 1
    pub unknown: u32,

    _padding: [u8; 0x1CC],

    // XOR-32 of the previous 508 bytes
    pub checksum: u32,
}

impl HiveHeader {
    /// Reads and validates the header at the start of `source`.
    pub fn read<S: ByteSource + ?Sized>(source: &mut S) -> Result<Self> {
        let bytes = source.read_exact_at(0, HEADER_SIZE)?;
        check(&bytes).map_err(RegError::InvalidHeader)?;

        let header: HiveHeader = decode(&bytes)?;
        debug!(
            "hive header: version {}.{}, data size {:#x}, sequence {}/{}",
            header.version.major,
            header.version.minor,
            header.last_block,
            header.update_count1,
            header.update_count2
        );
        Ok(header)
    }

    /// A hive whose two update counters differ was not cleanly written back.
    pub fn is_dirty(&self) -> bool {
        self.update_count1 != self.update_count2
    }
}

impl fmt::Display for HiveHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "signature: {}", self.signature.escape_ascii())?;
        writeln!(
            f,
            "version: {}.{}.{}.{}",
            self.version.major, self.version.minor, self.version.release, self.version.build
        )?;
        writeln!(f, "root cell offset: {:#x}", self.data_offset)?;
        write!(f, "hive bins data size: {:#x}", self.last_block)
    }
}

/// XOR of the first 0x7F little-endian words.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes[..CHECKSUM_OFFSET.min(bytes.len())]
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .fold(0, |acc, w| acc ^ w)
}

/// Checks the signature and checksum of a raw header.
pub fn check(bytes: &[u8]) -> std::result::Result<(), HeaderFault> {
    if bytes.len() < HEADER_SIZE {
        return Err(HeaderFault::Short(bytes.len()));
    }

    if &bytes[..4] != REGF_SIGNATURE {
        return Err(HeaderFault::BadSignature([
            bytes[0], bytes[1], bytes[2], bytes[3],
        ]));
    }

    let c = &bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4];
    let stored = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
    let computed = checksum(bytes);
    if stored != computed {
        return Err(HeaderFault::BadChecksum { stored, computed });
    }

    Ok(())
}

pub fn validate(bytes: &[u8]) -> bool {
    check(bytes).is_ok()
}

// Hive bin header, found at every 4096-byte boundary where a block starts
#[derive(Debug, Clone, Decode)]
pub struct BlockHeader {
    // ASCII string
    pub signature: [u8; 4],

    // offset of this hive bin, relative to the first one
    pub offset: u32,

    // offset of the next hive bin
    pub next: u32,

    _reserved: [u32; 2],

    pub modified: Filetime,

    pub size: u32,
}

impl BlockHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

impl fmt::Display for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signature: {} ", self.signature.escape_ascii())?;
        write!(f, "offset: {:#x} ", self.offset)?;
        write!(f, "size: {:#x}", self.size)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::reg::testing::base_block;

    #[test]
    fn valid_header_passes() {
        let bytes = base_block(0x01D9_0000_0000_0000, 0x1000);
        assert!(validate(&bytes[..HEADER_SIZE]));

        let header = HiveHeader::read(&mut Cursor::new(bytes.to_vec())).unwrap();
        assert_eq!(&header.signature, b"regf");
        assert_eq!(header.modified, Filetime(0x01D9_0000_0000_0000));
        assert_eq!(header.version.major, 1);
        assert_eq!(header.version.minor, 5);
        assert_eq!(header.unknown, 1);
        assert_eq!(header.checksum, checksum(&bytes));
        assert!(!header.is_dirty());
    }

    #[test]
    fn any_flipped_bit_fails_validation() {
        let bytes = base_block(0x01D9_0000_0000_0000, 0x1000);

        for byte in 0..CHECKSUM_OFFSET {
            for bit in 0..8 {
                let mut corrupt = bytes[..HEADER_SIZE].to_vec();
                corrupt[byte] ^= 1 << bit;
                assert!(!validate(&corrupt), "bit {bit} of byte {byte:#x}");
            }
        }
    }

    #[test]
    fn bad_signature_is_reported() {
        let mut bytes = base_block(0, 0x1000);
        bytes[..4].copy_from_slice(b"REGF");

        match check(&bytes) {
            Err(HeaderFault::BadSignature(sig)) => assert_eq!(&sig, b"REGF"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn bad_checksum_stops_reading() {
        let mut bytes = base_block(0, 0x1000);
        bytes[CHECKSUM_OFFSET] ^= 0xFF;

        let err = HiveHeader::read(&mut Cursor::new(bytes.to_vec())).unwrap_err();
        assert!(matches!(
            err,
            RegError::InvalidHeader(HeaderFault::BadChecksum { .. })
        ));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn short_input_is_rejected() {
        assert_eq!(check(&[0u8; 16]), Err(HeaderFault::Short(16)));
        assert!(matches!(
            HiveHeader::read(&mut Cursor::new(b"regf".to_vec())),
            Err(RegError::TruncatedRead { .. })
        ));
    }

    #[test]
    fn filetime_converts_to_unix_seconds() {
        assert_eq!(Filetime(116_444_736_000_000_000).to_unix(), 0);
        // sub-second ticks are dropped
        assert_eq!(Filetime(128_920_928_801_234_567).to_unix(), 1_247_619_280);
        assert!(Filetime(0).to_unix() < 0);
    }

    #[test]
    fn block_header_decodes() {
        let mut raw = [0u8; HBIN_HEADER_SIZE];
        raw[..4].copy_from_slice(HBIN_SIGNATURE);
        raw[4..8].copy_from_slice(&0x1000u32.to_le_bytes());
        raw[8..12].copy_from_slice(&0x2000u32.to_le_bytes());
        raw[28..32].copy_from_slice(&0x1000u32.to_le_bytes());

        let block = BlockHeader::parse(&raw).unwrap();
        assert_eq!(&block.signature, HBIN_SIGNATURE);
        assert_eq!(block.offset, 0x1000);
        assert_eq!(block.next, 0x2000);
        assert_eq!(block.size, 0x1000);
    }
}
