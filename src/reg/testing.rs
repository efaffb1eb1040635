// Synthetic hives for tests.
use super::header::{CHECKSUM_OFFSET, checksum};

const MODIFIED: u64 = 0x01D6_9A3B_5C00_0000;

/// A base block with a valid checksum.
pub fn base_block(modified: u64, data_size: u32) -> Vec<u8> {
    let mut b = vec![0u8; 0x1000];
    b[0..4].copy_from_slice(b"regf");
    b[4..8].copy_from_slice(&1u32.to_le_bytes());
    b[8..12].copy_from_slice(&1u32.to_le_bytes());
    b[12..20].copy_from_slice(&modified.to_le_bytes());
    for (i, v) in [1u32, 5, 0, 1].into_iter().enumerate() {
        b[20 + i * 4..24 + i * 4].copy_from_slice(&v.to_le_bytes());
    }
    b[36..40].copy_from_slice(&0x20u32.to_le_bytes());
    b[40..44].copy_from_slice(&data_size.to_le_bytes());
    b[44..48].copy_from_slice(&1u32.to_le_bytes());

    let sum = checksum(&b);
    b[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&sum.to_le_bytes());
    b
}

/// Payload of an nk cell.
pub fn key_payload(kind: u16, name: &str, num_subkeys: i32, subkeys: u32) -> Vec<u8> {
    let mut p = Vec::with_capacity(76 + name.len());
    p.extend_from_slice(b"nk");
    p.extend_from_slice(&kind.to_le_bytes());
    p.extend_from_slice(&MODIFIED.to_le_bytes());
    p.extend_from_slice(&0u32.to_le_bytes()); // u1
    p.extend_from_slice(&0u32.to_le_bytes()); // parent
    p.extend_from_slice(&num_subkeys.to_le_bytes());
    p.extend_from_slice(&0u32.to_le_bytes()); // u2
    p.extend_from_slice(&subkeys.to_le_bytes());
    p.extend_from_slice(&u32::MAX.to_le_bytes()); // u3
    p.extend_from_slice(&0i32.to_le_bytes()); // number of values
    p.extend_from_slice(&u32::MAX.to_le_bytes()); // value list
    p.extend_from_slice(&0x78u32.to_le_bytes()); // security
    p.extend_from_slice(&u32::MAX.to_le_bytes()); // class name
    p.extend_from_slice(&[0u8; 20]);
    p.extend_from_slice(&(name.len() as u16).to_le_bytes());
    p.extend_from_slice(&0u16.to_le_bytes());
    p.extend_from_slice(name.as_bytes());
    p
}

/// Lays out cells after a single hive bin header, handing back their relative offsets.
pub struct HiveBuilder {
    data: Vec<u8>,
}

impl HiveBuilder {
    pub fn new() -> Self {
        let mut hive = Self { data: Vec::new() };
        hive.block_header();
        hive
    }

    fn block_header(&mut self) {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(b"hbin");
        self.data.extend_from_slice(&offset.to_le_bytes());
        self.data.extend_from_slice(&(offset + 0x1000).to_le_bytes());
        self.data.extend_from_slice(&[0u8; 8]);
        self.data.extend_from_slice(&MODIFIED.to_le_bytes());
        self.data.extend_from_slice(&0x1000u32.to_le_bytes());
    }

    /// Appends an allocated cell, padded to 8 bytes.
    pub fn raw_cell(&mut self, payload: &[u8]) -> u32 {
        let offset = self.data.len() as u32;
        let total = (4 + payload.len() + 7) & !7;
        self.data.extend_from_slice(&(-(total as i32)).to_le_bytes());
        self.data.extend_from_slice(payload);
        self.data.resize(offset as usize + total, 0);
        offset
    }

    /// Appends an 8-byte cell carrying an arbitrary size field.
    pub fn raw_size(&mut self, size: i32) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(&size.to_le_bytes());
        self.data.extend_from_slice(&[0u8; 4]);
        offset
    }

    pub fn key(&mut self, kind: u16, name: &str, num_subkeys: i32, subkeys: u32) -> u32 {
        self.raw_cell(&key_payload(kind, name, num_subkeys, subkeys))
    }

    pub fn hash_list(&mut self, sig: &[u8; 2], keys: &[u32]) -> u32 {
        let mut p = sig.to_vec();
        p.extend_from_slice(&(keys.len() as i16).to_le_bytes());
        for (i, key) in keys.iter().enumerate() {
            p.extend_from_slice(&key.to_le_bytes());
            p.extend_from_slice(&(i as u32).to_le_bytes());
        }
        self.raw_cell(&p)
    }

    pub fn offset_list(&mut self, sig: &[u8; 2], offsets: &[u32]) -> u32 {
        let mut p = sig.to_vec();
        p.extend_from_slice(&(offsets.len() as i16).to_le_bytes());
        for offset in offsets {
            p.extend_from_slice(&offset.to_le_bytes());
        }
        self.raw_cell(&p)
    }

    /// Points an existing key at another subkey list.
    pub fn set_subkeys(&mut self, key: u32, num_subkeys: i32, subkeys: u32) {
        let pos = key as usize + 4;
        self.data[pos + 20..pos + 24].copy_from_slice(&num_subkeys.to_le_bytes());
        self.data[pos + 28..pos + 32].copy_from_slice(&subkeys.to_le_bytes());
    }

    /// Fills the rest of the current block with an allocated cell.
    pub fn fill_block(&mut self) {
        let used = self.data.len() % 0x1000;
        if used != 0 {
            let remaining = 0x1000 - used;
            self.raw_cell(&vec![0u8; remaining - 4]);
        }
    }

    /// Fills the current block and opens a new one.
    pub fn start_block(&mut self) {
        self.fill_block();
        self.block_header();
    }

    /// The full file, with the last block closed by a free cell.
    pub fn finish(mut self) -> Vec<u8> {
        let used = self.data.len() % 0x1000;
        if used != 0 {
            let remaining = 0x1000 - used;
            self.data.extend_from_slice(&(remaining as i32).to_le_bytes());
            self.data.resize(self.data.len() + remaining - 4, 0);
        }
        self.finish_unpadded()
    }

    /// The full file, ending right after the last cell.
    pub fn finish_unpadded(self) -> Vec<u8> {
        let mut bytes = base_block(MODIFIED, self.data.len() as u32);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}
