//! Binary KV reader
//!
//! Each entry is a type byte, a NUL-terminated key and a little-endian value.
//! shortcuts.vdf uses this directly; appinfo.vdf embeds one payload per app.

use super::{VdfMap, VdfValue};
use crate::error::VdfError;

const TYPE_MAP: u8 = 0x00;
const TYPE_STRING: u8 = 0x01;
const TYPE_INT32: u8 = 0x02;
const TYPE_FLOAT32: u8 = 0x03;
const TYPE_POINTER: u8 = 0x04;
const TYPE_WIDE_STRING: u8 = 0x05;
const TYPE_COLOR: u8 = 0x06;
const TYPE_UINT64: u8 = 0x07;
const TYPE_END: u8 = 0x08;
const TYPE_INT64: u8 = 0x0A;
const TYPE_END_ALT: u8 = 0x0B;

/// Decode a complete binary KV document
pub fn decode_binary(bytes: &[u8]) -> Result<VdfMap, VdfError> {
    Reader::new(bytes).read_map(true)
}

/// Cursor over little-endian data
pub(super) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    key_table: Option<&'a [String]>,
}

impl<'a> Reader<'a> {
    pub(super) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            key_table: None,
        }
    }

    /// Keys are u32 indices into `table` instead of inline strings (appinfo v29)
    pub(super) fn with_key_table(data: &'a [u8], table: &'a [String]) -> Self {
        Self {
            data,
            pos: 0,
            key_table: Some(table),
        }
    }

    pub(super) fn pos(&self) -> usize {
        self.pos
    }

    pub(super) fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(super) fn bytes<const N: usize>(&mut self) -> Result<[u8; N], VdfError> {
        let end = self.pos + N;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(VdfError::Truncated(self.pos))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    pub(super) fn take(&mut self, len: usize) -> Result<&'a [u8], VdfError> {
        let end = self.pos.checked_add(len).ok_or(VdfError::Truncated(self.pos))?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(VdfError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    pub(super) fn u8(&mut self) -> Result<u8, VdfError> {
        Ok(self.bytes::<1>()?[0])
    }

    pub(super) fn u32(&mut self) -> Result<u32, VdfError> {
        Ok(u32::from_le_bytes(self.bytes()?))
    }

    pub(super) fn u64(&mut self) -> Result<u64, VdfError> {
        Ok(u64::from_le_bytes(self.bytes()?))
    }

    pub(super) fn i64(&mut self) -> Result<i64, VdfError> {
        Ok(i64::from_le_bytes(self.bytes()?))
    }

    fn i32(&mut self) -> Result<i32, VdfError> {
        Ok(i32::from_le_bytes(self.bytes()?))
    }

    fn f32(&mut self) -> Result<f32, VdfError> {
        Ok(f32::from_le_bytes(self.bytes()?))
    }

    /// NUL-terminated string, lossy UTF-8
    pub(super) fn cstring(&mut self) -> Result<String, VdfError> {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(VdfError::Truncated(self.data.len()))?;
        let s = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(s)
    }

    /// NUL-terminated UTF-16LE string
    fn wide_string(&mut self) -> Result<String, VdfError> {
        let mut units = Vec::new();
        loop {
            let unit = u16::from_le_bytes(self.bytes()?);
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Ok(String::from_utf16_lossy(&units))
    }

    fn key(&mut self) -> Result<String, VdfError> {
        match self.key_table {
            Some(table) => {
                let index = self.u32()?;
                table
                    .get(index as usize)
                    .cloned()
                    .ok_or(VdfError::BadStringIndex(index))
            }
            None => self.cstring(),
        }
    }

    /// Read entries until an end marker. At the top level running out of
    /// data also ends the map.
    pub(super) fn read_map(&mut self, top_level: bool) -> Result<VdfMap, VdfError> {
        let mut map = VdfMap::new();

        loop {
            if top_level && self.at_end() {
                break;
            }

            let offset = self.pos;
            let kind = self.u8()?;
            if kind == TYPE_END || kind == TYPE_END_ALT {
                break;
            }

            let key = self.key()?;
            let value = match kind {
                TYPE_MAP => VdfValue::Map(self.read_map(false)?),
                TYPE_STRING => VdfValue::String(self.cstring()?),
                TYPE_WIDE_STRING => VdfValue::String(self.wide_string()?),
                TYPE_INT32 => VdfValue::Int(i64::from(self.i32()?)),
                TYPE_POINTER | TYPE_COLOR => VdfValue::Int(i64::from(self.u32()?)),
                TYPE_FLOAT32 => VdfValue::Float(self.f32()?),
                // Stored as the same bit pattern; only IDs and tokens use it
                TYPE_UINT64 => VdfValue::Int(self.u64()? as i64),
                TYPE_INT64 => VdfValue::Int(self.i64()?),
                other => return Err(VdfError::UnknownType { kind: other, offset }),
            };
            map.insert(key, value);
        }

        Ok(map)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal writer used to build fixtures in tests

    pub struct BinaryWriter {
        pub data: Vec<u8>,
    }

    impl BinaryWriter {
        pub fn new() -> Self {
            Self { data: Vec::new() }
        }

        pub fn begin(&mut self, key: &str) -> &mut Self {
            self.data.push(0x00);
            self.data.extend_from_slice(key.as_bytes());
            self.data.push(0x00);
            self
        }

        pub fn string(&mut self, key: &str, value: &str) -> &mut Self {
            self.data.push(0x01);
            self.data.extend_from_slice(key.as_bytes());
            self.data.push(0x00);
            self.data.extend_from_slice(value.as_bytes());
            self.data.push(0x00);
            self
        }

        pub fn int(&mut self, key: &str, value: u32) -> &mut Self {
            self.data.push(0x02);
            self.data.extend_from_slice(key.as_bytes());
            self.data.push(0x00);
            self.data.extend_from_slice(&value.to_le_bytes());
            self
        }

        pub fn end(&mut self) -> &mut Self {
            self.data.push(0x08);
            self
        }
    }
}
