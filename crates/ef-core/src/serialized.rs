//! Self-describing serialized payloads
//!
//! Scenes, probe batches and baked data travel between tools and the
//! runtime as byte buffers with a fixed envelope: magic number, major and
//! minor version, and a CRC-32 of the payload. Readers refuse unknown
//! major versions; minor additions are ignored.

use crate::error::{CoreError, CoreResult};

/// Envelope magic number
pub const MAGIC: [u8; 4] = *b"EFSB";

/// Envelope size in bytes
const HEADER_SIZE: usize = 4 + 4 + 4 + 4;

/// CRC-32 (IEEE 802.3, reflected) over a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

/// Little-endian byte writer used by all `save` paths
#[derive(Debug, Default)]
pub struct SerializedWriter {
    data: Vec<u8>,
}

impl SerializedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32_slice(&mut self, values: &[f32]) {
        self.write_u64(values.len() as u64);
        for &v in values {
            self.write_f32(v);
        }
    }

    pub fn write_u32_slice(&mut self, values: &[u32]) {
        self.write_u64(values.len() as u64);
        for &v in values {
            self.write_u32(v);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u64(bytes.len() as u64);
        self.data.extend_from_slice(bytes);
    }

    /// Wrap the accumulated payload in the envelope and return the bytes.
    pub fn finish(self, major: u32, minor: u32) -> Vec<u8> {
        let checksum = crc32(&self.data);
        let mut out = Vec::with_capacity(HEADER_SIZE + self.data.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&major.to_le_bytes());
        out.extend_from_slice(&minor.to_le_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Checked little-endian reader over an enveloped payload
#[derive(Debug)]
pub struct SerializedReader<'a> {
    data: &'a [u8],
    cursor: usize,
    minor: u32,
}

impl<'a> SerializedReader<'a> {
    /// Validate the envelope and position the reader at the payload start.
    pub fn open(bytes: &'a [u8], supported_major: u32) -> CoreResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CoreError::MalformedPayload("truncated header".into()));
        }
        if bytes[..4] != MAGIC {
            return Err(CoreError::MalformedPayload("bad magic number".into()));
        }
        let major = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let minor = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let checksum = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        if major > supported_major {
            return Err(CoreError::UnsupportedVersion {
                got: major,
                supported: supported_major,
            });
        }
        let payload = &bytes[HEADER_SIZE..];
        if crc32(payload) != checksum {
            return Err(CoreError::ChecksumMismatch);
        }
        Ok(Self {
            data: payload,
            cursor: 0,
            minor,
        })
    }

    pub fn minor_version(&self) -> u32 {
        self.minor
    }

    fn take(&mut self, count: usize) -> CoreResult<&'a [u8]> {
        if self.cursor + count > self.data.len() {
            return Err(CoreError::MalformedPayload("unexpected end of payload".into()));
        }
        let slice = &self.data[self.cursor..self.cursor + count];
        self.cursor += count;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> CoreResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> CoreResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> CoreResult<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_f32_vec(&mut self) -> CoreResult<Vec<f32>> {
        let len = self.read_u64()? as usize;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_f32()?);
        }
        Ok(out)
    }

    pub fn read_u32_vec(&mut self) -> CoreResult<Vec<u32>> {
        let len = self.read_u64()? as usize;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_u32()?);
        }
        Ok(out)
    }

    pub fn read_bytes(&mut self) -> CoreResult<&'a [u8]> {
        let len = self.read_u64()? as usize;
        self.take(len)
    }
}
