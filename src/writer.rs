//! ROM image writer
//!
//! Recomposes a [`Rom`] into a flat cartridge image. Regions are laid out
//! in a fixed order, each starting on a 512-byte boundary: header, ARM9
//! binary, ARM9 overlay table and payloads, ARM7 binary, ARM7 overlay
//! table and payloads, filename table, file allocation table, banner, then
//! the named files in placement order. Derived header fields are written
//! from the finished layout, and the header CRC is computed last so it
//! covers them.
//!
//! File IDs are assigned fresh on every build: ARM9 overlays take
//! `0..N9`, ARM7 overlays `N9..N9+N7`, and the named files follow.

use std::collections::BTreeSet;

use tracing::debug;

use crate::crc::{crc16, CRC16_SEED};
use crate::error::RomError;
use crate::fat::{pad_to, FatLayout};
use crate::fnt::build_fnt;
use crate::header::HeaderField;
use crate::overlay::encode_ovt;
use crate::rom::Rom;
use crate::{
    BANNER_SIZE, CHIP_CAPACITY_BASE, DEFAULT_FILL, HEADER_SIZE, MAX_CHIP_CAPACITY, NITROCODE,
    ROM_ALIGN,
};

/// Largest cartridge the capacity field can describe
const MAX_CAPACITY_BYTES: u64 = (CHIP_CAPACITY_BASE as u64) << MAX_CHIP_CAPACITY;

/// Cartridge storage type.
///
/// Selects the gamecard control words and secure-area delay written into
/// the header, and how far the tail fill pads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageType {
    /// Mask ROM, the commercial cartridge medium
    #[default]
    Mrom,
    /// Programmable media
    Prom,
}

impl StorageType {
    /// Gamecard control word for decrypted transfers
    const fn rom_ctrl_dec(self) -> u32 {
        match self {
            StorageType::Mrom => 0x0058_6000,
            StorageType::Prom => 0x0041_6657,
        }
    }

    /// Gamecard control word for KEY1-encrypted transfers
    const fn rom_ctrl_enc(self) -> u32 {
        match self {
            StorageType::Mrom => 0x0018_08F8,
            StorageType::Prom => 0x0818_08F8,
        }
    }

    /// Secure-area transfer delay
    const fn secure_delay(self) -> u16 {
        match self {
            StorageType::Mrom => 0x051E,
            StorageType::Prom => 0x0D7E,
        }
    }
}

/// Options for [`write_rom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Storage type the header constants are derived from
    pub storage: StorageType,
    /// Pad the image out after the last payload region: to the full chip
    /// capacity on mask ROM, to the next region boundary on programmable
    /// media
    pub fill_tail: bool,
    /// Byte used for alignment padding and tail fill
    pub fill_with: u8,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            storage: StorageType::Mrom,
            fill_tail: false,
            fill_with: DEFAULT_FILL,
        }
    }
}

/// Recompose a cartridge image from its structural components
pub fn write_rom(rom: &Rom, options: &BuildOptions) -> Result<Vec<u8>, RomError> {
    if rom.banner.len() != BANNER_SIZE {
        return Err(RomError::BadBanner {
            found: rom.banner.len(),
        });
    }

    let fill = options.fill_with;
    let n9 = rom.arm9_overlays.len();
    let n7 = rom.arm7_overlays.len();

    // Refuse inputs that cannot fit any cartridge before buffering them
    let payload_total: u64 = rom.arm9.len() as u64
        + rom.arm7.len() as u64
        + rom.arm9_overlays.iter().map(|o| o.data.len() as u64).sum::<u64>()
        + rom.arm7_overlays.iter().map(|o| o.data.len() as u64).sum::<u64>()
        + rom.files.values().map(|f| f.len() as u64).sum::<u64>();
    if payload_total > MAX_CAPACITY_BYTES {
        return Err(RomError::CapacityExceeded {
            size: payload_total as usize,
        });
    }

    // Placement order: file_order first, then any files it does not cover,
    // in map iteration order
    let mut order: Vec<&str> = Vec::with_capacity(rom.files.len());
    let mut seen = BTreeSet::new();
    for path in &rom.file_order {
        if !rom.files.contains_key(path) {
            return Err(RomError::InvalidPath { path: path.clone() });
        }
        if !seen.insert(path.as_str()) {
            return Err(RomError::DuplicatePath { path: path.clone() });
        }
        order.push(path);
    }
    for path in rom.files.keys() {
        if !seen.contains(path.as_str()) {
            order.push(path);
        }
    }

    let first_file_id = u16::try_from(n9 + n7).map_err(|_| RomError::MalformedFnt {
        reason: "file ids exceed 16 bits".to_string(),
    })?;
    let (fnt, name_map) = build_fnt(order.iter().copied(), first_file_id)?;
    let ovt9 = encode_ovt(&rom.arm9_overlays, 0);
    let ovt7 = encode_ovt(&rom.arm7_overlays, n9 as u32);

    let mut fat = FatLayout::new(n9 + n7 + order.len());
    let mut out = Vec::new();

    // Header placeholder; the finished block is spliced in at the end
    out.extend_from_slice(rom.header.as_slice());

    // ARM9 binary. The load size excludes a trailing nitrocode footer so
    // the parser re-attaches it on the way back in.
    let arm9_offset = out.len();
    out.extend_from_slice(&rom.arm9);
    let arm9_load_size = arm9_load_size(&rom.arm9);

    // ARM9 overlay table, payloads immediately after
    let ovt9_offset = if n9 > 0 {
        pad_to(&mut out, ROM_ALIGN, fill);
        let offset = out.len();
        out.extend_from_slice(&ovt9);
        for (index, overlay) in rom.arm9_overlays.iter().enumerate() {
            fat.place(&mut out, index, &overlay.data, fill);
        }
        offset
    } else {
        0
    };

    // ARM7 binary
    pad_to(&mut out, ROM_ALIGN, fill);
    let arm7_offset = out.len();
    out.extend_from_slice(&rom.arm7);

    // ARM7 overlay table, payloads immediately after
    let ovt7_offset = if n7 > 0 {
        pad_to(&mut out, ROM_ALIGN, fill);
        let offset = out.len();
        out.extend_from_slice(&ovt7);
        for (index, overlay) in rom.arm7_overlays.iter().enumerate() {
            fat.place(&mut out, n9 + index, &overlay.data, fill);
        }
        offset
    } else {
        0
    };

    // Filename table
    pad_to(&mut out, ROM_ALIGN, fill);
    let fnt_offset = out.len();
    out.extend_from_slice(&fnt);

    // File allocation table, zeroed until every payload is placed
    pad_to(&mut out, ROM_ALIGN, fill);
    let fat_offset = out.len();
    let fat_size = fat.entries().len() * crate::FAT_ENTRY_SIZE;
    out.resize(fat_offset + fat_size, 0);

    // Banner
    pad_to(&mut out, ROM_ALIGN, fill);
    let banner_offset = out.len();
    out.extend_from_slice(&rom.banner);

    // Named files in placement order
    for path in &order {
        let id = name_map[*path] as usize;
        fat.place(&mut out, id, &rom.files[*path], fill);
    }

    // The ROM size describes the image up to the end of the last payload,
    // before any tail fill
    let rom_size = out.len();
    out[fat_offset..fat_offset + fat_size].copy_from_slice(&fat.encode());

    let capacity = chip_capacity(rom_size)?;
    if options.fill_tail {
        match options.storage {
            StorageType::Mrom => out.resize(CHIP_CAPACITY_BASE << capacity, fill),
            StorageType::Prom => pad_to(&mut out, ROM_ALIGN, fill),
        }
    }

    // Derived header fields, then the CRC over everything before it
    let mut header = rom.header.clone();
    header.set_uint(HeaderField::Arm9RomOffset, arm9_offset as u64)?;
    header.set_uint(HeaderField::Arm9LoadSize, arm9_load_size as u64)?;
    header.set_uint(HeaderField::Arm7RomOffset, arm7_offset as u64)?;
    header.set_uint(HeaderField::Arm7LoadSize, rom.arm7.len() as u64)?;
    header.set_uint(HeaderField::FntRomOffset, fnt_offset as u64)?;
    header.set_uint(HeaderField::FntSize, fnt.len() as u64)?;
    header.set_uint(HeaderField::FatRomOffset, fat_offset as u64)?;
    header.set_uint(HeaderField::FatSize, fat_size as u64)?;
    header.set_uint(HeaderField::Ovt9RomOffset, ovt9_offset as u64)?;
    header.set_uint(HeaderField::Ovt9Size, ovt9.len() as u64)?;
    header.set_uint(HeaderField::Ovt7RomOffset, ovt7_offset as u64)?;
    header.set_uint(HeaderField::Ovt7Size, ovt7.len() as u64)?;
    header.set_uint(
        HeaderField::RomCtrlDec,
        options.storage.rom_ctrl_dec() as u64,
    )?;
    header.set_uint(
        HeaderField::RomCtrlEnc,
        options.storage.rom_ctrl_enc() as u64,
    )?;
    header.set_uint(HeaderField::BannerRomOffset, banner_offset as u64)?;
    header.set_uint(
        HeaderField::SecureDelay,
        options.storage.secure_delay() as u64,
    )?;
    header.set_uint(HeaderField::RomSize, rom_size as u64)?;
    header.set_uint(HeaderField::HeaderSize, HEADER_SIZE as u64)?;
    header.set_uint(HeaderField::ChipCapacity, capacity as u64)?;

    let crc = crc16(
        &header.as_slice()[..HeaderField::HeaderCrc.offset()],
        CRC16_SEED,
    );
    header.set_uint(HeaderField::HeaderCrc, crc as u64)?;
    out[..HEADER_SIZE].copy_from_slice(header.as_slice());

    debug!(
        "composed image: 0x{:X} bytes used, capacity class {}, {} file ids",
        rom_size,
        capacity,
        n9 + n7 + order.len()
    );
    Ok(out)
}

/// The load size of an ARM9 payload: its length, minus the 12-byte
/// nitrocode footer when the magic word sits at the footer boundary
fn arm9_load_size(arm9: &[u8]) -> usize {
    if arm9.len() >= 12 && arm9[arm9.len() - 12..arm9.len() - 8] == NITROCODE.to_le_bytes() {
        arm9.len() - 12
    } else {
        arm9.len()
    }
}

/// Smallest capacity class whose cartridge holds `size` bytes
fn chip_capacity(size: usize) -> Result<u32, RomError> {
    let mut class = 0;
    while ((CHIP_CAPACITY_BASE as u64) << class) < size as u64 {
        class += 1;
        if class > MAX_CHIP_CAPACITY {
            return Err(RomError::CapacityExceeded { size });
        }
    }
    Ok(class)
}
