//! appinfo.vdf reader
//!
//! Layout (all little endian):
//!
//! ```text
//! header:  magic u32, universe u32, [v29: string_table_offset i64]
//! record:  appid u32 (0 ends the list), size u32, info_state u32,
//!          last_updated u32, access_token u64, sha1 [u8; 20],
//!          change_number u32, [v28+: binary_sha1 [u8; 20]], binary KV payload
//! v29:     string table at string_table_offset: count u32, count NUL-terminated keys
//! ```
//!
//! `size` counts every byte after itself, so the payload is whatever the fixed
//! fields leave over.

use std::fs;
use std::path::Path;

use super::binary::Reader;
use super::VdfMap;
use crate::error::{Error, VdfError};

const MAGIC_V27: u32 = 0x0756_4427;
const MAGIC_V28: u32 = 0x0756_4428;
const MAGIC_V29: u32 = 0x0756_4429;

#[derive(Debug, Clone)]
pub struct AppInfoEntry {
    pub appid: u32,
    pub info_state: u32,
    pub last_updated: u32,
    pub access_token: u64,
    pub sha1: [u8; 20],
    pub change_number: u32,
    pub binary_sha1: Option<[u8; 20]>,
    pub data: VdfMap,
}

#[derive(Debug, Clone)]
pub struct AppInfo {
    pub version: u32,
    pub universe: u32,
    pub entries: Vec<AppInfoEntry>,
}

impl AppInfo {
    /// Read and parse `appcache/appinfo.vdf`
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = fs::read(path)?;
        Self::parse(&data).map_err(|source| Error::MalformedConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(data: &[u8]) -> Result<Self, VdfError> {
        let mut header = Reader::new(data);
        let magic = header.u32()?;
        let version = match magic {
            MAGIC_V27 => 27,
            MAGIC_V28 => 28,
            MAGIC_V29 => 29,
            other => return Err(VdfError::UnsupportedVersion(other)),
        };
        let universe = header.u32()?;

        let (records, key_table) = if version >= 29 {
            let offset = header.i64()?;
            let offset = usize::try_from(offset)
                .ok()
                .filter(|o| *o >= header.pos() && *o <= data.len())
                .ok_or(VdfError::Truncated(header.pos()))?;
            let table = read_key_table(&data[offset..])?;
            (&data[header.pos()..offset], Some(table))
        } else {
            (&data[header.pos()..], None)
        };

        let mut reader = Reader::new(records);
        let mut entries = Vec::new();

        loop {
            let appid = reader.u32()?;
            if appid == 0 {
                break;
            }
            let size = reader.u32()? as usize;
            let record_start = reader.pos();
            let record = reader.take(size)?;

            let mut fields = Reader::new(record);
            let info_state = fields.u32()?;
            let last_updated = fields.u32()?;
            let access_token = fields.u64()?;
            let sha1 = fields.bytes::<20>()?;
            let change_number = fields.u32()?;
            let binary_sha1 = if version >= 28 {
                Some(fields.bytes::<20>()?)
            } else {
                None
            };

            let payload = &record[fields.pos()..];
            let data = match &key_table {
                Some(table) => Reader::with_key_table(payload, table).read_map(true),
                None => Reader::new(payload).read_map(true),
            }
            .map_err(|e| offset_error(e, record_start + fields.pos()))?;

            entries.push(AppInfoEntry {
                appid,
                info_state,
                last_updated,
                access_token,
                sha1,
                change_number,
                binary_sha1,
                data,
            });
        }

        Ok(Self {
            version,
            universe,
            entries,
        })
    }

    pub fn entry(&self, appid: u32) -> Option<&AppInfoEntry> {
        self.entries.iter().find(|e| e.appid == appid)
    }
}

fn read_key_table(data: &[u8]) -> Result<Vec<String>, VdfError> {
    let mut reader = Reader::new(data);
    let count = reader.u32()?;
    let mut keys = Vec::with_capacity(count.min(1 << 16) as usize);
    for _ in 0..count {
        keys.push(reader.cstring()?);
    }
    Ok(keys)
}

/// Payload offsets are relative to the payload; make them file-relative-ish
fn offset_error(error: VdfError, base: usize) -> VdfError {
    match error {
        VdfError::Truncated(pos) => VdfError::Truncated(base + pos),
        VdfError::UnknownType { kind, offset } => VdfError::UnknownType {
            kind,
            offset: base + offset,
        },
        other => other,
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::vdf::{VdfMapExt, VdfValue};

    #[test]
    fn test_parse_v27() {
        let payload = compat_tools_payload(&[("proton_7", 1887720, Some("proton-7"))]);
        let data = appinfo_v27(&[(891390, payload), (10, vec![0x08])]);

        let info = AppInfo::parse(&data).unwrap();
        assert_eq!(info.version, 27);
        assert_eq!(info.universe, 1);
        assert_eq!(info.entries.len(), 2);

        let entry = info.entry(891390).unwrap();
        assert_eq!(entry.change_number, 42);
        assert_eq!(entry.sha1, [0xab; 20]);
        assert!(entry.binary_sha1.is_none());
        let tool = entry
            .data
            .lookup(&["appinfo", "extended", "compat_tools", "proton_7"])
            .unwrap();
        assert_eq!(tool.get("appid").and_then(VdfValue::as_u32), Some(1887720));
        assert!(info.entry(10).unwrap().data.is_empty());
    }

    #[test]
    fn test_parse_v29_string_table() {
        // Payload: { "appinfo" { "name" "Proton 7.0" } } with keys 0 = appinfo, 1 = name
        let mut payload = vec![0x00];
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(0x01);
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(b"Proton 7.0\0");
        payload.extend_from_slice(&[0x08, 0x08]);

        let mut records = Vec::new();
        records.extend_from_slice(&1887720u32.to_le_bytes());
        records.extend_from_slice(&((60 + payload.len()) as u32).to_le_bytes());
        records.extend_from_slice(&[0u8; 16]);
        records.extend_from_slice(&[0x11; 20]);
        records.extend_from_slice(&7u32.to_le_bytes());
        records.extend_from_slice(&[0x22; 20]);
        records.extend_from_slice(&payload);
        records.extend_from_slice(&0u32.to_le_bytes());

        let mut data = Vec::new();
        data.extend_from_slice(&MAGIC_V29.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&((16 + records.len()) as i64).to_le_bytes());
        data.extend_from_slice(&records);
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(b"appinfo\0name\0");

        let info = AppInfo::parse(&data).unwrap();
        assert_eq!(info.version, 29);
        let entry = info.entry(1887720).unwrap();
        assert_eq!(entry.change_number, 7);
        assert_eq!(entry.binary_sha1, Some([0x22; 20]));
        assert_eq!(
            entry.data.lookup(&["appinfo", "name"]).and_then(VdfValue::as_str),
            Some("Proton 7.0")
        );
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let mut data = appinfo_v27(&[]);
        data[0] = 0x2a; // magic 0x0756442a
        assert!(matches!(
            AppInfo::parse(&data),
            Err(VdfError::UnsupportedVersion(0x0756_442a))
        ));
    }

    #[test]
    fn test_truncated_record() {
        let payload = compat_tools_payload(&[("proton_7", 1887720, None)]);
        let mut data = appinfo_v27(&[(891390, payload)]);
        data.truncate(data.len() - 10);
        assert!(matches!(AppInfo::parse(&data), Err(VdfError::Truncated(_))));
    }
}
