//! DS cartridge header field schema and accessor
//!
//! The header is an opaque 0x4000-byte block with a fixed field layout.
//! Each field's length is implicit: it runs up to the offset of the next
//! field in declaration order. [`HeaderField`] encodes the schema and
//! [`Header`] is the typed view over the block, with little-endian integer
//! reads and writes for the numeric fields.

use crate::error::RomError;
use crate::HEADER_SIZE;

/// A field of the cartridge header.
///
/// Declaration order matches the wire layout. `HeaderCrcEnd` and
/// `EntireHeader` are sentinels: they give the preceding real field a
/// well-defined length. `EntireHeader` addresses the whole block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderField {
    /// Game title, NUL-padded ASCII
    Title,
    /// Serial / game code
    Serial,
    /// Maker code
    Maker,
    /// Chip capacity class (128 KiB << n), reserved tail zeroed
    ChipCapacity,
    /// ROM revision
    Revision,
    /// ROM offset of the ARM9 binary
    Arm9RomOffset,
    /// ARM9 entry point (RAM address)
    Arm9EntryPoint,
    /// ARM9 load address (RAM address)
    Arm9LoadAddr,
    /// Byte count loaded from ROM for the ARM9
    Arm9LoadSize,
    /// ROM offset of the ARM7 binary
    Arm7RomOffset,
    /// ARM7 entry point (RAM address)
    Arm7EntryPoint,
    /// ARM7 load address (RAM address)
    Arm7LoadAddr,
    /// Byte count loaded from ROM for the ARM7
    Arm7LoadSize,
    /// ROM offset of the filename table
    FntRomOffset,
    /// Byte size of the filename table
    FntSize,
    /// ROM offset of the file allocation table
    FatRomOffset,
    /// Byte size of the file allocation table
    FatSize,
    /// ROM offset of the ARM9 overlay table
    Ovt9RomOffset,
    /// Byte size of the ARM9 overlay table
    Ovt9Size,
    /// ROM offset of the ARM7 overlay table
    Ovt7RomOffset,
    /// Byte size of the ARM7 overlay table
    Ovt7Size,
    /// Gamecard control word for decrypted transfers
    RomCtrlDec,
    /// Gamecard control word for KEY1-encrypted transfers
    RomCtrlEnc,
    /// ROM offset of the banner block
    BannerRomOffset,
    /// CRC of the secure area (carried, never recomputed)
    SecureCrc,
    /// Secure-area transfer delay
    SecureDelay,
    /// ARM9 autoload callback address
    Arm9Autoload,
    /// ARM7 autoload callback address
    Arm7Autoload,
    /// Total used ROM size
    RomSize,
    /// Header size (always 0x4000)
    HeaderSize,
    /// Static footer: reserved zone, logo and logo CRC
    StaticFooter,
    /// Header CRC over everything before this field
    HeaderCrc,
    /// Sentinel closing the CRC field
    HeaderCrcEnd,
    /// Sentinel addressing the whole 0x4000-byte block
    EntireHeader,
}

impl HeaderField {
    /// Every field in declaration (= offset) order, sentinels included
    pub const ALL: [HeaderField; 34] = [
        HeaderField::Title,
        HeaderField::Serial,
        HeaderField::Maker,
        HeaderField::ChipCapacity,
        HeaderField::Revision,
        HeaderField::Arm9RomOffset,
        HeaderField::Arm9EntryPoint,
        HeaderField::Arm9LoadAddr,
        HeaderField::Arm9LoadSize,
        HeaderField::Arm7RomOffset,
        HeaderField::Arm7EntryPoint,
        HeaderField::Arm7LoadAddr,
        HeaderField::Arm7LoadSize,
        HeaderField::FntRomOffset,
        HeaderField::FntSize,
        HeaderField::FatRomOffset,
        HeaderField::FatSize,
        HeaderField::Ovt9RomOffset,
        HeaderField::Ovt9Size,
        HeaderField::Ovt7RomOffset,
        HeaderField::Ovt7Size,
        HeaderField::RomCtrlDec,
        HeaderField::RomCtrlEnc,
        HeaderField::BannerRomOffset,
        HeaderField::SecureCrc,
        HeaderField::SecureDelay,
        HeaderField::Arm9Autoload,
        HeaderField::Arm7Autoload,
        HeaderField::RomSize,
        HeaderField::HeaderSize,
        HeaderField::StaticFooter,
        HeaderField::HeaderCrc,
        HeaderField::HeaderCrcEnd,
        HeaderField::EntireHeader,
    ];

    /// Byte offset of this field within the header block
    pub const fn offset(self) -> usize {
        match self {
            HeaderField::Title => 0x000,
            HeaderField::Serial => 0x00C,
            HeaderField::Maker => 0x010,
            HeaderField::ChipCapacity => 0x014,
            HeaderField::Revision => 0x01E,
            HeaderField::Arm9RomOffset => 0x020,
            HeaderField::Arm9EntryPoint => 0x024,
            HeaderField::Arm9LoadAddr => 0x028,
            HeaderField::Arm9LoadSize => 0x02C,
            HeaderField::Arm7RomOffset => 0x030,
            HeaderField::Arm7EntryPoint => 0x034,
            HeaderField::Arm7LoadAddr => 0x038,
            HeaderField::Arm7LoadSize => 0x03C,
            HeaderField::FntRomOffset => 0x040,
            HeaderField::FntSize => 0x044,
            HeaderField::FatRomOffset => 0x048,
            HeaderField::FatSize => 0x04C,
            HeaderField::Ovt9RomOffset => 0x050,
            HeaderField::Ovt9Size => 0x054,
            HeaderField::Ovt7RomOffset => 0x058,
            HeaderField::Ovt7Size => 0x05C,
            HeaderField::RomCtrlDec => 0x060,
            HeaderField::RomCtrlEnc => 0x064,
            HeaderField::BannerRomOffset => 0x068,
            HeaderField::SecureCrc => 0x06C,
            HeaderField::SecureDelay => 0x06E,
            HeaderField::Arm9Autoload => 0x070,
            HeaderField::Arm7Autoload => 0x074,
            HeaderField::RomSize => 0x080,
            HeaderField::HeaderSize => 0x084,
            HeaderField::StaticFooter => 0x088,
            HeaderField::HeaderCrc => 0x15E,
            HeaderField::HeaderCrcEnd => 0x160,
            HeaderField::EntireHeader => 0x4000,
        }
    }

    /// The next field in declaration order.
    ///
    /// `EntireHeader` is its own successor, which terminates the schema.
    pub const fn succ(self) -> HeaderField {
        match self {
            HeaderField::Title => HeaderField::Serial,
            HeaderField::Serial => HeaderField::Maker,
            HeaderField::Maker => HeaderField::ChipCapacity,
            HeaderField::ChipCapacity => HeaderField::Revision,
            HeaderField::Revision => HeaderField::Arm9RomOffset,
            HeaderField::Arm9RomOffset => HeaderField::Arm9EntryPoint,
            HeaderField::Arm9EntryPoint => HeaderField::Arm9LoadAddr,
            HeaderField::Arm9LoadAddr => HeaderField::Arm9LoadSize,
            HeaderField::Arm9LoadSize => HeaderField::Arm7RomOffset,
            HeaderField::Arm7RomOffset => HeaderField::Arm7EntryPoint,
            HeaderField::Arm7EntryPoint => HeaderField::Arm7LoadAddr,
            HeaderField::Arm7LoadAddr => HeaderField::Arm7LoadSize,
            HeaderField::Arm7LoadSize => HeaderField::FntRomOffset,
            HeaderField::FntRomOffset => HeaderField::FntSize,
            HeaderField::FntSize => HeaderField::FatRomOffset,
            HeaderField::FatRomOffset => HeaderField::FatSize,
            HeaderField::FatSize => HeaderField::Ovt9RomOffset,
            HeaderField::Ovt9RomOffset => HeaderField::Ovt9Size,
            HeaderField::Ovt9Size => HeaderField::Ovt7RomOffset,
            HeaderField::Ovt7RomOffset => HeaderField::Ovt7Size,
            HeaderField::Ovt7Size => HeaderField::RomCtrlDec,
            HeaderField::RomCtrlDec => HeaderField::RomCtrlEnc,
            HeaderField::RomCtrlEnc => HeaderField::BannerRomOffset,
            HeaderField::BannerRomOffset => HeaderField::SecureCrc,
            HeaderField::SecureCrc => HeaderField::SecureDelay,
            HeaderField::SecureDelay => HeaderField::Arm9Autoload,
            HeaderField::Arm9Autoload => HeaderField::Arm7Autoload,
            HeaderField::Arm7Autoload => HeaderField::RomSize,
            HeaderField::RomSize => HeaderField::HeaderSize,
            HeaderField::HeaderSize => HeaderField::StaticFooter,
            HeaderField::StaticFooter => HeaderField::HeaderCrc,
            HeaderField::HeaderCrc => HeaderField::HeaderCrcEnd,
            HeaderField::HeaderCrcEnd => HeaderField::EntireHeader,
            HeaderField::EntireHeader => HeaderField::EntireHeader,
        }
    }

    /// Implicit field length: distance to the successor field.
    ///
    /// `EntireHeader` reports the full block length.
    pub const fn len(self) -> usize {
        match self {
            HeaderField::EntireHeader => HEADER_SIZE,
            _ => self.succ().offset() - self.offset(),
        }
    }

    /// Wire-schema name of this field
    pub const fn name(self) -> &'static str {
        match self {
            HeaderField::Title => "TITLE",
            HeaderField::Serial => "SERIAL",
            HeaderField::Maker => "MAKER",
            HeaderField::ChipCapacity => "CHIPCAPACITY",
            HeaderField::Revision => "REVISION",
            HeaderField::Arm9RomOffset => "ARM9_ROMOFFSET",
            HeaderField::Arm9EntryPoint => "ARM9_ENTRYPOINT",
            HeaderField::Arm9LoadAddr => "ARM9_LOADADDR",
            HeaderField::Arm9LoadSize => "ARM9_LOADSIZE",
            HeaderField::Arm7RomOffset => "ARM7_ROMOFFSET",
            HeaderField::Arm7EntryPoint => "ARM7_ENTRYPOINT",
            HeaderField::Arm7LoadAddr => "ARM7_LOADADDR",
            HeaderField::Arm7LoadSize => "ARM7_LOADSIZE",
            HeaderField::FntRomOffset => "FNT_ROMOFFSET",
            HeaderField::FntSize => "FNT_BSIZE",
            HeaderField::FatRomOffset => "FAT_ROMOFFSET",
            HeaderField::FatSize => "FAT_BSIZE",
            HeaderField::Ovt9RomOffset => "OVT9_ROMOFFSET",
            HeaderField::Ovt9Size => "OVT9_BSIZE",
            HeaderField::Ovt7RomOffset => "OVT7_ROMOFFSET",
            HeaderField::Ovt7Size => "OVT7_BSIZE",
            HeaderField::RomCtrlDec => "ROMCTRL_DEC",
            HeaderField::RomCtrlEnc => "ROMCTRL_ENC",
            HeaderField::BannerRomOffset => "BANNER_ROMOFFSET",
            HeaderField::SecureCrc => "SECURECRC",
            HeaderField::SecureDelay => "SECURE_DELAY",
            HeaderField::Arm9Autoload => "ARM9_AUTOLOADCB",
            HeaderField::Arm7Autoload => "ARM7_AUTOLOADCB",
            HeaderField::RomSize => "ROMSIZE",
            HeaderField::HeaderSize => "HEADERSIZE",
            HeaderField::StaticFooter => "STATICFOOTER",
            HeaderField::HeaderCrc => "HEADERCRC",
            HeaderField::HeaderCrcEnd => "HEADERCRC_END",
            HeaderField::EntireHeader => "ENTIRE_HEADER",
        }
    }

    /// Concrete (start, length) range within the block.
    ///
    /// `EntireHeader` maps to the whole block rather than its sentinel
    /// offset.
    const fn range(self) -> (usize, usize) {
        match self {
            HeaderField::EntireHeader => (0, HEADER_SIZE),
            _ => (self.offset(), self.len()),
        }
    }
}

/// The cartridge header: an owned 0x4000-byte block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    data: Vec<u8>,
}

impl Header {
    /// Wrap an exact 0x4000-byte block
    pub fn new(data: Vec<u8>) -> Result<Self, RomError> {
        if data.len() != HEADER_SIZE {
            return Err(RomError::SizeMismatch {
                expected: HEADER_SIZE,
                found: data.len(),
            });
        }
        Ok(Self { data })
    }

    /// An all-zero header
    pub fn zeroed() -> Self {
        Self {
            data: vec![0; HEADER_SIZE],
        }
    }

    /// Raw bytes of a field
    pub fn bytes(&self, field: HeaderField) -> &[u8] {
        let (off, len) = field.range();
        &self.data[off..off + len]
    }

    /// The whole block
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite a field with raw bytes of exactly the field length
    pub fn set_bytes(&mut self, field: HeaderField, value: &[u8]) -> Result<(), RomError> {
        let (off, len) = field.range();
        if value.len() != len {
            return Err(RomError::SizeMismatch {
                expected: len,
                found: value.len(),
            });
        }
        self.data[off..off + len].copy_from_slice(value);
        Ok(())
    }

    /// Write an unsigned integer little-endian across the whole field,
    /// zero-filling beyond the eighth byte
    pub fn set_uint(&mut self, field: HeaderField, value: u64) -> Result<(), RomError> {
        let (off, len) = field.range();
        if len < 8 && value >> (len * 8) != 0 {
            return Err(RomError::Overflow {
                field: field.name(),
                len,
                value,
            });
        }
        let le = value.to_le_bytes();
        let n = len.min(8);
        self.data[off..off + n].copy_from_slice(&le[..n]);
        for byte in &mut self.data[off + n..off + len] {
            *byte = 0;
        }
        Ok(())
    }

    /// Read a field as a little-endian unsigned integer.
    ///
    /// Fields longer than 8 bytes yield their low 8 bytes.
    pub fn get_le(&self, field: HeaderField) -> u64 {
        let (off, len) = field.range();
        let mut le = [0u8; 8];
        let n = len.min(8);
        le[..n].copy_from_slice(&self.data[off..off + n]);
        u64::from_le_bytes(le)
    }

    /// Slice the region of `image` described by an (offset, size) field pair
    pub fn rom_region<'a>(
        &self,
        image: &'a [u8],
        offset_field: HeaderField,
        size_field: HeaderField,
    ) -> Result<&'a [u8], RomError> {
        let offset = self.get_le(offset_field);
        let len = self.get_le(size_field);
        let end = offset.checked_add(len).filter(|&e| e <= image.len() as u64);
        if end.is_none() {
            return Err(RomError::OutOfBounds {
                offset,
                len,
                size: image.len(),
            });
        }
        Ok(&image[offset as usize..(offset + len) as usize])
    }

    /// Header-defined game title, up to the first NUL
    pub fn title(&self) -> String {
        let raw = self.bytes(HeaderField::Title);
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    /// Set the game title, truncated to the field length and NUL-padded
    pub fn set_title(&mut self, title: &str) {
        let (off, len) = HeaderField::Title.range();
        let bytes = title.as_bytes();
        let n = bytes.len().min(len);
        self.data[off..off + n].copy_from_slice(&bytes[..n]);
        for byte in &mut self.data[off + n..off + len] {
            *byte = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_monotonic() {
        for pair in HeaderField::ALL.windows(2) {
            assert!(
                pair[0].offset() < pair[1].offset(),
                "{} and {} out of order",
                pair[0].name(),
                pair[1].name()
            );
        }
    }

    #[test]
    fn test_succ_terminates() {
        // succ() must reach the EntireHeader fixed point from every field
        for field in HeaderField::ALL {
            let mut cur = field;
            for _ in 0..HeaderField::ALL.len() {
                cur = cur.succ();
            }
            assert_eq!(cur, HeaderField::EntireHeader);
        }
        assert_eq!(
            HeaderField::EntireHeader.succ(),
            HeaderField::EntireHeader
        );
    }

    #[test]
    fn test_field_lengths() {
        assert_eq!(HeaderField::Title.len(), 12);
        assert_eq!(HeaderField::Serial.len(), 4);
        assert_eq!(HeaderField::ChipCapacity.len(), 10);
        assert_eq!(HeaderField::Arm9RomOffset.len(), 4);
        assert_eq!(HeaderField::SecureDelay.len(), 2);
        assert_eq!(HeaderField::HeaderCrc.len(), 2);
        assert_eq!(HeaderField::EntireHeader.len(), HEADER_SIZE);
        // Field lengths tile the block up to the CRC sentinel
        let covered: usize = HeaderField::ALL
            .iter()
            .take_while(|f| **f != HeaderField::HeaderCrcEnd)
            .map(|f| f.len())
            .sum();
        assert_eq!(covered, HeaderField::HeaderCrcEnd.offset());
    }

    #[test]
    fn test_new_rejects_wrong_size() {
        assert!(matches!(
            Header::new(vec![0; 0x200]),
            Err(RomError::SizeMismatch {
                expected: HEADER_SIZE,
                found: 0x200
            })
        ));
        assert!(Header::new(vec![0; HEADER_SIZE]).is_ok());
    }

    #[test]
    fn test_uint_roundtrip() {
        let mut header = Header::zeroed();
        header
            .set_uint(HeaderField::Arm9RomOffset, 0x0000_4000)
            .unwrap();
        assert_eq!(header.get_le(HeaderField::Arm9RomOffset), 0x4000);
        assert_eq!(
            header.bytes(HeaderField::Arm9RomOffset),
            &[0x00, 0x40, 0x00, 0x00]
        );
    }

    #[test]
    fn test_uint_overflow() {
        let mut header = Header::zeroed();
        assert!(matches!(
            header.set_uint(HeaderField::SecureDelay, 0x1_0000),
            Err(RomError::Overflow { field: "SECURE_DELAY", .. })
        ));
        // Exactly at the limit is fine
        header.set_uint(HeaderField::SecureDelay, 0xFFFF).unwrap();
    }

    #[test]
    fn test_uint_zero_fills_long_field() {
        let mut header = Header::zeroed();
        header
            .set_bytes(HeaderField::ChipCapacity, &[0xAA; 10])
            .unwrap();
        header.set_uint(HeaderField::ChipCapacity, 7).unwrap();
        assert_eq!(
            header.bytes(HeaderField::ChipCapacity),
            &[7, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(header.get_le(HeaderField::ChipCapacity), 7);
    }

    #[test]
    fn test_set_bytes_rejects_wrong_length() {
        let mut header = Header::zeroed();
        assert!(matches!(
            header.set_bytes(HeaderField::Serial, b"TOOLONGVALUE"),
            Err(RomError::SizeMismatch { expected: 4, .. })
        ));
    }

    #[test]
    fn test_rom_region() {
        let mut header = Header::zeroed();
        header.set_uint(HeaderField::FatRomOffset, 4).unwrap();
        header.set_uint(HeaderField::FatSize, 8).unwrap();

        let image: Vec<u8> = (0..16).collect();
        let region = header
            .rom_region(&image, HeaderField::FatRomOffset, HeaderField::FatSize)
            .unwrap();
        assert_eq!(region, &[4, 5, 6, 7, 8, 9, 10, 11]);

        header.set_uint(HeaderField::FatSize, 13).unwrap();
        assert!(matches!(
            header.rom_region(&image, HeaderField::FatRomOffset, HeaderField::FatSize),
            Err(RomError::OutOfBounds { offset: 4, len: 13, size: 16 })
        ));
    }

    #[test]
    fn test_entire_header_addresses_whole_block() {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0x3FFF] = 0xAB;
        let header = Header::new(data).unwrap();
        assert_eq!(header.bytes(HeaderField::EntireHeader).len(), HEADER_SIZE);
        assert_eq!(header.bytes(HeaderField::EntireHeader)[0x3FFF], 0xAB);
    }

    #[test]
    fn test_title() {
        let mut header = Header::zeroed();
        header.set_title("POKEMON D");
        assert_eq!(header.title(), "POKEMON D");
        assert_eq!(&header.bytes(HeaderField::Title)[9..], &[0, 0, 0]);

        header.set_title("A VERY LONG GAME TITLE");
        assert_eq!(header.title(), "A VERY LONG ");
    }
}
