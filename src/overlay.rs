//! Overlay table codec
//!
//! Each processor has an overlay table of 32-byte entries describing code
//! overlays: eight little-endian u32 words (id, RAM address, RAM size, BSS
//! size, static initialiser range, file ID, and a compressed-size-plus-flags
//! word). Overlay payloads are ordinary FAT files occupying the low file
//! IDs; the file ID word is reassigned on every build, everything else is
//! carried through verbatim.

use std::collections::BTreeSet;

use crate::error::RomError;
use crate::OVT_ENTRY_SIZE;

/// A raw overlay table entry as stored in the ROM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OvtEntry {
    /// Overlay ID
    pub id: u32,
    /// RAM load address
    pub ram_address: u32,
    /// Loaded size in RAM
    pub ram_size: u32,
    /// BSS size appended after the loaded data
    pub bss_size: u32,
    /// Start of the static initialiser pointer range
    pub static_init_start: u32,
    /// End of the static initialiser pointer range
    pub static_init_end: u32,
    /// FAT file ID of the payload
    pub file_id: u32,
    /// Compressed size plus flag bits, carried verbatim
    pub flags: u32,
}

/// An overlay with its payload, detached from the file table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    /// Overlay ID
    pub id: u32,
    /// RAM load address
    pub ram_address: u32,
    /// Loaded size in RAM
    pub ram_size: u32,
    /// BSS size appended after the loaded data
    pub bss_size: u32,
    /// Start of the static initialiser pointer range
    pub static_init_start: u32,
    /// End of the static initialiser pointer range
    pub static_init_end: u32,
    /// Compressed size plus flag bits, carried verbatim
    pub flags: u32,
    /// Payload bytes
    pub data: Vec<u8>,
}

fn malformed(reason: impl Into<String>) -> RomError {
    RomError::MalformedOvt {
        reason: reason.into(),
    }
}

/// Decode an OVT region into raw entries
pub fn parse_ovt(table: &[u8]) -> Result<Vec<OvtEntry>, RomError> {
    if table.len() % OVT_ENTRY_SIZE != 0 {
        return Err(malformed(format!(
            "table length 0x{:X} is not a multiple of 32",
            table.len()
        )));
    }
    Ok(table
        .chunks_exact(OVT_ENTRY_SIZE)
        .map(|entry| {
            let word =
                |i: usize| u32::from_le_bytes(entry[i * 4..i * 4 + 4].try_into().unwrap());
            OvtEntry {
                id: word(0),
                ram_address: word(1),
                ram_size: word(2),
                bss_size: word(3),
                static_init_start: word(4),
                static_init_end: word(5),
                file_id: word(6),
                flags: word(7),
            }
        })
        .collect())
}

/// Decode an OVT region and claim each entry's payload.
///
/// `claimed_ids` accumulates the file IDs consumed by overlay tables so a
/// file ID claimed twice (within one table or across both processors) is
/// rejected, and so the caller can withhold those payloads from the named
/// file set.
pub fn get_overlays(
    table: &[u8],
    payloads: &[Vec<u8>],
    claimed_ids: &mut BTreeSet<usize>,
) -> Result<Vec<Overlay>, RomError> {
    let entries = parse_ovt(table)?;
    let mut overlays = Vec::with_capacity(entries.len());
    for entry in entries {
        let file_id = entry.file_id as usize;
        if file_id >= payloads.len() {
            return Err(malformed(format!(
                "overlay {} references nonexistent file id {}",
                entry.id, entry.file_id
            )));
        }
        if !claimed_ids.insert(file_id) {
            return Err(malformed(format!(
                "file id {} claimed by more than one overlay",
                entry.file_id
            )));
        }
        overlays.push(Overlay {
            id: entry.id,
            ram_address: entry.ram_address,
            ram_size: entry.ram_size,
            bss_size: entry.bss_size,
            static_init_start: entry.static_init_start,
            static_init_end: entry.static_init_end,
            flags: entry.flags,
            data: payloads[file_id].clone(),
        });
    }
    Ok(overlays)
}

/// Encode an overlay table, assigning file IDs sequentially from
/// `first_file_id` in sequence order.
///
/// Payloads are expected to be placed in the same order, immediately after
/// the table.
pub fn encode_ovt(overlays: &[Overlay], first_file_id: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(overlays.len() * OVT_ENTRY_SIZE);
    for (index, overlay) in overlays.iter().enumerate() {
        out.extend_from_slice(&overlay.id.to_le_bytes());
        out.extend_from_slice(&overlay.ram_address.to_le_bytes());
        out.extend_from_slice(&overlay.ram_size.to_le_bytes());
        out.extend_from_slice(&overlay.bss_size.to_le_bytes());
        out.extend_from_slice(&overlay.static_init_start.to_le_bytes());
        out.extend_from_slice(&overlay.static_init_end.to_le_bytes());
        out.extend_from_slice(&(first_file_id + index as u32).to_le_bytes());
        out.extend_from_slice(&overlay.flags.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(id: u32, data: &[u8]) -> Overlay {
        Overlay {
            id,
            ram_address: 0x0200_0000 + id * 0x1000,
            ram_size: data.len() as u32,
            bss_size: 0x40,
            static_init_start: 0x0200_0100,
            static_init_end: 0x0200_0110,
            flags: data.len() as u32,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_encode_assigns_sequential_file_ids() {
        let overlays = vec![overlay(0, b"one"), overlay(1, b"two")];
        let table = encode_ovt(&overlays, 7);
        let entries = parse_ovt(&table).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].file_id, 7);
        assert_eq!(entries[1].file_id, 8);
        assert_eq!(entries[0].ram_address, 0x0200_0000);
        assert_eq!(entries[1].flags, 3);
    }

    #[test]
    fn test_parse_rejects_partial_entry() {
        assert!(matches!(
            parse_ovt(&[0u8; 40]),
            Err(RomError::MalformedOvt { .. })
        ));
    }

    #[test]
    fn test_get_overlays_detaches_payloads() {
        let overlays = vec![overlay(0, b"code0"), overlay(1, b"code1")];
        let table = encode_ovt(&overlays, 0);
        let payloads = vec![b"code0".to_vec(), b"code1".to_vec(), b"file".to_vec()];

        let mut claimed = BTreeSet::new();
        let decoded = get_overlays(&table, &payloads, &mut claimed).unwrap();
        assert_eq!(decoded, overlays);
        assert_eq!(claimed.into_iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_get_overlays_rejects_missing_file() {
        let table = encode_ovt(&[overlay(0, b"x")], 3);
        let payloads = vec![b"a".to_vec()];
        let mut claimed = BTreeSet::new();
        assert!(matches!(
            get_overlays(&table, &payloads, &mut claimed),
            Err(RomError::MalformedOvt { .. })
        ));
    }

    #[test]
    fn test_get_overlays_rejects_duplicate_file_id() {
        // Two tables claiming the same payload, as with a shared file id
        // across processors
        let table = encode_ovt(&[overlay(0, b"x")], 0);
        let payloads = vec![b"x".to_vec()];
        let mut claimed = BTreeSet::new();
        get_overlays(&table, &payloads, &mut claimed).unwrap();
        assert!(matches!(
            get_overlays(&table, &payloads, &mut claimed),
            Err(RomError::MalformedOvt { .. })
        ));
    }
}
