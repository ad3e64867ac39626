//! ROM image parser
//!
//! Decomposes a flat cartridge image into a [`Rom`]. Every region the
//! header references is bounds-checked before it is read, and every output
//! buffer is owned, so the input image can be dropped as soon as parsing
//! returns.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::RomError;
use crate::fat::{parse_fat, physical_order};
use crate::fnt::parse_fnt;
use crate::header::{Header, HeaderField};
use crate::overlay::get_overlays;
use crate::rom::Rom;
use crate::{BANNER_SIZE, HEADER_SIZE, NITROCODE};

/// Decompose a cartridge image into its structural components
pub fn parse_rom(image: &[u8]) -> Result<Rom, RomError> {
    if image.len() < HEADER_SIZE {
        return Err(RomError::Truncated { region: "header" });
    }
    let header = Header::new(image[..HEADER_SIZE].to_vec())?;

    // FAT first: it materialises every payload the other tables refer to
    let fat_bytes = region(
        &header,
        image,
        HeaderField::FatRomOffset,
        HeaderField::FatSize,
        "file allocation table",
    )?;
    let fat = parse_fat(fat_bytes)?;
    let mut payloads = Vec::with_capacity(fat.len());
    for entry in &fat {
        let (start, end) = (entry.start as usize, entry.end as usize);
        if start > end || end > image.len() {
            return Err(RomError::Truncated {
                region: "file payload",
            });
        }
        payloads.push(image[start..end].to_vec());
    }

    let fnt_bytes = region(
        &header,
        image,
        HeaderField::FntRomOffset,
        HeaderField::FntSize,
        "filename table",
    )?;
    let names = parse_fnt(fnt_bytes, fat.len())?;

    // Overlay payloads sit in the FAT alongside named files; claim their
    // file IDs so they are split off from the file mapping below
    let mut claimed = BTreeSet::new();
    let ovt9 = region(
        &header,
        image,
        HeaderField::Ovt9RomOffset,
        HeaderField::Ovt9Size,
        "ARM9 overlay table",
    )?;
    let arm9_overlays = get_overlays(ovt9, &payloads, &mut claimed)?;
    let ovt7 = region(
        &header,
        image,
        HeaderField::Ovt7RomOffset,
        HeaderField::Ovt7Size,
        "ARM7 overlay table",
    )?;
    let arm7_overlays = get_overlays(ovt7, &payloads, &mut claimed)?;

    // ARM9 binary, re-attaching the trailing nitrocode footer when the
    // magic word follows the load size
    let arm9_start = header.get_le(HeaderField::Arm9RomOffset);
    let mut arm9_len = header.get_le(HeaderField::Arm9LoadSize);
    if arm9_start + arm9_len > image.len() as u64 {
        return Err(RomError::Truncated {
            region: "ARM9 binary",
        });
    }
    let arm9_end = (arm9_start + arm9_len) as usize;
    if arm9_end + 12 <= image.len() && image[arm9_end..arm9_end + 4] == NITROCODE.to_le_bytes() {
        arm9_len += 12;
    }
    let arm9 = image[arm9_start as usize..(arm9_start + arm9_len) as usize].to_vec();

    let arm7 = region(
        &header,
        image,
        HeaderField::Arm7RomOffset,
        HeaderField::Arm7LoadSize,
        "ARM7 binary",
    )?
    .to_vec();

    let banner_offset = header.get_le(HeaderField::BannerRomOffset);
    if banner_offset + BANNER_SIZE as u64 > image.len() as u64 {
        return Err(RomError::Truncated { region: "banner" });
    }
    let banner = image[banner_offset as usize..][..BANNER_SIZE].to_vec();

    // Named files, minus the payloads the overlay tables claimed, plus
    // their physical placement order
    let mut files = BTreeMap::new();
    let mut id_to_path: BTreeMap<usize, &str> = BTreeMap::new();
    for (path, id) in &names {
        let id = *id as usize;
        if claimed.contains(&id) {
            continue;
        }
        id_to_path.insert(id, path.as_str());
        files.insert(path.clone(), payloads[id].clone());
    }
    let mut file_order = Vec::with_capacity(files.len());
    for index in physical_order(&fat) {
        if let Some(path) = id_to_path.get(&index) {
            file_order.push(path.to_string());
        }
    }

    debug!(
        "parsed image: arm9 0x{:X} bytes, arm7 0x{:X} bytes, {}+{} overlays, {} files",
        arm9.len(),
        arm7.len(),
        arm9_overlays.len(),
        arm7_overlays.len(),
        files.len()
    );

    Ok(Rom {
        header,
        arm9,
        arm7,
        arm9_overlays,
        arm7_overlays,
        files,
        file_order,
        banner,
    })
}

/// Slice a header-described region, reporting it by name when it does not
/// fit the image
fn region<'a>(
    header: &Header,
    image: &'a [u8],
    offset_field: HeaderField,
    size_field: HeaderField,
    name: &'static str,
) -> Result<&'a [u8], RomError> {
    header
        .rom_region(image, offset_field, size_field)
        .map_err(|_| RomError::Truncated { region: name })
}
