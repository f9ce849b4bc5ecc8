// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use apkcheck_common::*;
use deku::prelude::*;
use log::debug;

use crate::source::ByteSource;

pub const EOCD_MAGIC: &[u8; 4] = &[0x50, 0x4B, 0x05, 0x06];
pub const CENTRAL_DIRECTORY_MAGIC: &[u8; 4] = &[0x50, 0x4B, 0x01, 0x02];

// Fixed part of the EOCD, magic included
pub const EOCD_MIN_SIZE: usize = 22;
// The only variable part of the EOCD is its comment, capped by a u16 length
const EOCD_MAX_COMMENT_LENGTH: usize = 0xFFFF;

// Named according to APPNOTE.TXT section 4.3.16
#[derive(Debug, PartialEq, Eq, Clone, Copy, DekuRead)]
#[deku(endian = "little", magic = b"PK\x05\x06")]
pub struct EndOfCentralDirectory {
    pub this_disk: u16,
    pub central_directory_disk: u16,
    pub entries_this_disk: u16,
    pub total_entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32
}

/// Where the central directory lives, as recorded by the EOCD.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CentralDirectory {
    /// Central Directory (from start of file)
    pub offset: usize,
    pub size: usize,
    /// End of Central Directory (from start of file)
    pub eocd_offset: usize,
    pub this_disk: u16,
    pub central_directory_disk: u16,
    pub total_entries: u16
}

/// Scans backwards from the end of the package for the EOCD record.
///
/// The first signature found from the true end wins: an earlier
/// `PK\x05\x06` may just be bytes inside an entry or the archive comment.
/// Multi-disk archives are rejected outright.
pub fn find_central_directory<S: ByteSource + ?Sized>(source: &S) -> Result<CentralDirectory> {
    let len = source.len();
    if len < EOCD_MIN_SIZE {
        return Err(ApkCheckError::broken("no end-of-central-directory"));
    }

    // One read covers every position the record could start at
    let window_start = (len - EOCD_MIN_SIZE).saturating_sub(EOCD_MAX_COMMENT_LENGTH);
    let window = source.read_at(window_start, len - window_start)?;

    for i in (0..=(window.len() - EOCD_MIN_SIZE)).rev() {
        if &window[i..(i + 4)] != EOCD_MAGIC {
            continue;
        }
        let (_rest, eocd) = EndOfCentralDirectory::from_bytes((&window[i..], 0))?;
        let eocd_offset = window_start + i;
        debug!("found end of central directory at {eocd_offset}: {eocd:?}");
        return central_directory_from_eocd(source, eocd, eocd_offset);
    }

    Err(ApkCheckError::broken("no end-of-central-directory"))
}

fn central_directory_from_eocd<S: ByteSource + ?Sized>(
    source: &S,
    eocd: EndOfCentralDirectory,
    eocd_offset: usize
) -> Result<CentralDirectory> {
    if eocd.this_disk != 0 || eocd.central_directory_disk != 0 {
        return Err(ApkCheckError::broken(format!(
            "multi-disk zip (disk {}, central directory on disk {})",
            eocd.this_disk, eocd.central_directory_disk
        )));
    }

    let offset = eocd.central_directory_offset as usize;
    let size = eocd.central_directory_size as usize;
    match offset.checked_add(size) {
        Some(end) if end <= eocd_offset => {}
        _ => {
            return Err(ApkCheckError::broken(format!(
                "central directory {offset}+{size} overlaps end record at {eocd_offset}"
            )))
        }
    }

    // An empty archive has nothing to point at
    if size > 0 && source.read_at(offset, 4)? != CENTRAL_DIRECTORY_MAGIC {
        return Err(ApkCheckError::broken(format!(
            "no central directory at specified offset {offset}"
        )));
    }

    Ok(CentralDirectory {
        offset,
        size,
        eocd_offset,
        this_disk: eocd.this_disk,
        central_directory_disk: eocd.central_directory_disk,
        total_entries: eocd.total_entries
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ApkBytes;

    fn eocd(this_disk: u16, cd_disk: u16, cd_size: u32, cd_offset: u32, comment: &[u8]) -> Vec<u8> {
        let mut record = EOCD_MAGIC.to_vec();
        record.extend(this_disk.to_le_bytes());
        record.extend(cd_disk.to_le_bytes());
        record.extend(1u16.to_le_bytes());
        record.extend(1u16.to_le_bytes());
        record.extend(cd_size.to_le_bytes());
        record.extend(cd_offset.to_le_bytes());
        record.extend((comment.len() as u16).to_le_bytes());
        record.extend(comment);
        record
    }

    // Some local data, then a fake 46 byte central directory entry, then the EOCD
    fn archive_with(this_disk: u16, cd_disk: u16, comment: &[u8]) -> Vec<u8> {
        let mut buf = vec![0xAA; 100];
        buf.extend(CENTRAL_DIRECTORY_MAGIC);
        buf.extend([0u8; 42]);
        buf.extend(eocd(this_disk, cd_disk, 46, 100, comment));
        buf
    }

    #[test]
    fn finds_single_disk_eocd() {
        let source = ApkBytes::from(archive_with(0, 0, b""));
        let cd = find_central_directory(&source).unwrap();
        assert_eq!(cd.offset, 100);
        assert_eq!(cd.size, 46);
        assert_eq!(cd.eocd_offset, 146);
        assert_eq!(cd.this_disk, 0);
        assert_eq!(cd.central_directory_disk, 0);
        assert_eq!(source.read_at(cd.offset, 4).unwrap(), CENTRAL_DIRECTORY_MAGIC);
    }

    #[test]
    fn eocd_nearest_the_end_wins() {
        // Entry data that happens to look like an EOCD must not be picked
        let mut buf = eocd(0, 0, 0, 0, b"");
        buf.extend(vec![0xAA; 78]);
        buf.extend(CENTRAL_DIRECTORY_MAGIC);
        buf.extend([0u8; 42]);
        buf.extend(eocd(0, 0, 46, 100, b"comment"));
        let cd = find_central_directory(&ApkBytes::from(buf)).unwrap();
        assert_eq!(cd.offset, 100);
        assert_eq!(cd.eocd_offset, 146);
    }

    #[test]
    fn rejects_multi_disk_archives() {
        for (this_disk, cd_disk) in [(1, 0), (0, 1), (2, 2)] {
            let source = ApkBytes::from(archive_with(this_disk, cd_disk, b""));
            let err = find_central_directory(&source).unwrap_err();
            assert!(err.is_broken(), "{this_disk}/{cd_disk} accepted");
        }
    }

    #[test]
    fn missing_eocd_is_broken() {
        let source = ApkBytes::from(vec![0u8; 4096]);
        let err = find_central_directory(&source).unwrap_err();
        assert!(matches!(err, ApkCheckError::Broken(ref reason) if reason == "no end-of-central-directory"));

        let tiny = ApkBytes::from(EOCD_MAGIC.to_vec());
        assert!(find_central_directory(&tiny).unwrap_err().is_broken());
    }

    #[test]
    fn offset_must_point_at_a_central_directory_entry() {
        let mut buf = vec![0xAA; 146];
        buf.extend(eocd(0, 0, 46, 100, b""));
        let err = find_central_directory(&ApkBytes::from(buf)).unwrap_err();
        assert!(err.is_broken());
    }

    #[test]
    fn empty_archive_has_empty_directory() {
        let source = ApkBytes::from(eocd(0, 0, 0, 0, b""));
        let cd = find_central_directory(&source).unwrap();
        assert_eq!(cd.offset, 0);
        assert_eq!(cd.size, 0);
        assert_eq!(cd.eocd_offset, 0);
    }
}
