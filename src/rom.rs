//! ROM data model
//!
//! A [`Rom`] is the decomposed form of a cartridge image: the header block,
//! the two processor binaries, their overlays, the named file payloads, and
//! the banner. All fields are public; callers mutate freely between
//! [`Rom::from_bytes`] and [`Rom::to_bytes`].
//!
//! `file_order` records the physical placement order of the named files
//! within the image. Files present in `files` but missing from
//! `file_order` are appended at the tail of the file region on build, so
//! the map alone is enough to get a file into the image.

use std::collections::BTreeMap;

use crate::error::RomError;
use crate::header::Header;
use crate::overlay::Overlay;
use crate::writer::BuildOptions;
use crate::{parser, writer, BANNER_SIZE};

/// A decomposed cartridge image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    /// The 0x4000-byte header block
    pub header: Header,
    /// ARM9 binary, including a trailing nitrocode footer when present
    pub arm9: Vec<u8>,
    /// ARM7 binary
    pub arm7: Vec<u8>,
    /// ARM9 overlays in table order
    pub arm9_overlays: Vec<Overlay>,
    /// ARM7 overlays in table order
    pub arm7_overlays: Vec<Overlay>,
    /// Named file payloads, keyed by absolute path
    pub files: BTreeMap<String, Vec<u8>>,
    /// Physical placement order of the paths in `files`
    pub file_order: Vec<String>,
    /// Banner block, exactly 0xA00 bytes
    pub banner: Vec<u8>,
}

impl Rom {
    /// A blank, immediately-buildable ROM: zeroed header, no binaries, no
    /// files, zeroed banner
    pub fn new() -> Self {
        Self {
            header: Header::zeroed(),
            arm9: Vec::new(),
            arm7: Vec::new(),
            arm9_overlays: Vec::new(),
            arm7_overlays: Vec::new(),
            files: BTreeMap::new(),
            file_order: Vec::new(),
            banner: vec![0; BANNER_SIZE],
        }
    }

    /// Decompose a cartridge image.
    ///
    /// The returned `Rom` owns all of its buffers; `image` can be dropped
    /// immediately.
    pub fn from_bytes(image: &[u8]) -> Result<Self, RomError> {
        parser::parse_rom(image)
    }

    /// Recompose a cartridge image with all derived header fields and the
    /// header CRC filled in
    pub fn to_bytes(&self, options: &BuildOptions) -> Result<Vec<u8>, RomError> {
        writer::write_rom(self, options)
    }

    /// Insert a file payload, appending new paths to the placement order
    pub fn add_file(&mut self, path: impl Into<String>, data: Vec<u8>) {
        let path = path.into();
        if self.files.insert(path.clone(), data).is_none() {
            self.file_order.push(path);
        }
    }

    /// Remove a file payload and its placement-order entry
    pub fn remove_file(&mut self, path: &str) -> Option<Vec<u8>> {
        let data = self.files.remove(path);
        if data.is_some() {
            self.file_order.retain(|p| p != path);
        }
        data
    }
}

impl Default for Rom {
    fn default() -> Self {
        Self::new()
    }
}
