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

use std::collections::HashMap;

use apkcheck_common::*;
use apkcheck_zip::ByteSource;
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::length_prefixed::LengthPrefixedReader;

pub const SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109871A;
pub const SIGNATURE_SCHEME_V3_BLOCK_ID: u32 = 0xF05368C0;
// Only ever seen inside v2 signed data's additional attributes
pub const STRIPPING_PROTECTION_ATTR_ID: u32 = 0xBEEFF00D;
pub const APK_SIGNING_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";

// size_of_block (u64) + magic, found right before the Central Directory
const FOOTER_SIZE: usize = 8 + 16;

/// A validated APK Signing Block, split into its ID/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningBlock {
    /// Start of the block (from start of file)
    pub offset: usize,
    /// Size of the block MINUS its leading size field, as recorded twice
    pub size_of_block: u64,
    pub pairs: HashMap<u32, Vec<u8>>
}

impl SigningBlock {
    pub fn get(&self, id: u32) -> Option<&[u8]> {
        self.pairs.get(&id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.pairs.contains_key(&id)
    }

    /// Pair IDs in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.pairs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Looks for the APK Signing Block ending at `cd_offset`.
///
/// Returns `Ok(None)` when the magic isn't there, which just means the APK
/// has no v2/v3 signature. A block with the magic but inconsistent sizes or
/// pairs is [ApkCheckError::Broken].
pub fn find_signing_block<S: ByteSource + ?Sized>(
    source: &S,
    cd_offset: usize
) -> Result<Option<SigningBlock>> {
    // The layout, working backwards from the Central Directory:
    //   @-24 u64   size_of_block, counting everything after the first copy
    //   @-16 [16]  magic
    //   ...        pairs of (u64 size, u32 id, value)
    //   @+0  u64   size_of_block again
    if cd_offset < FOOTER_SIZE {
        return Ok(None);
    }
    let footer = source.read_at(cd_offset - FOOTER_SIZE, FOOTER_SIZE)?;
    if &footer[8..] != APK_SIGNING_BLOCK_MAGIC {
        debug!("no APK Signing Block before central directory at {cd_offset}");
        return Ok(None);
    }
    let size_of_block = LittleEndian::read_u64(&footer[..8]);

    // The leading size field isn't counted by itself
    let total_size = usize::try_from(size_of_block)
        .ok()
        .and_then(|size| size.checked_add(8))
        .filter(|total| *total >= 8 + FOOTER_SIZE)
        .ok_or_else(|| ApkCheckError::broken(format!("bad signing block size {size_of_block}")))?;
    let offset = cd_offset.checked_sub(total_size).ok_or_else(|| {
        ApkCheckError::broken(format!(
            "signing block size {size_of_block} is larger than the {cd_offset} bytes before it"
        ))
    })?;

    let block = source.read_at(offset, total_size)?;
    let size_at_start = LittleEndian::read_u64(&block[..8]);
    if size_at_start != size_of_block {
        return Err(ApkCheckError::broken(format!(
            "signing block sizes at start and end do not match: {size_at_start} != {size_of_block}"
        )));
    }

    let pairs = read_pairs(&block[8..(total_size - FOOTER_SIZE)])?;
    debug!(
        "found APK Signing Block at {offset}, {} bytes, {} pairs",
        total_size,
        pairs.len()
    );

    Ok(Some(SigningBlock {
        offset,
        size_of_block,
        pairs
    }))
}

// Each pair is exactly 8 + size bytes and the last one must end on the footer
fn read_pairs(region: &[u8]) -> Result<HashMap<u32, Vec<u8>>> {
    let mut reader = LengthPrefixedReader::new(region, "signing block pair");
    let mut pairs = HashMap::new();

    while !reader.is_empty() {
        let size = reader.read_u64()?;
        if size < 4 {
            return Err(ApkCheckError::broken(format!(
                "signing block pair of {size} bytes has no room for its id"
            )));
        }
        let size = usize::try_from(size)
            .map_err(|_| ApkCheckError::broken(format!("signing block pair of {size} bytes")))?;
        let pair = reader.take(size)?;
        let id = LittleEndian::read_u32(&pair[..4]);

        match id {
            SIGNATURE_SCHEME_V2_BLOCK_ID | SIGNATURE_SCHEME_V3_BLOCK_ID => {}
            other => debug!("ignoring unknown signing block id {other:#x}")
        }
        if pairs.insert(id, pair[4..].to_vec()).is_some() {
            return Err(ApkCheckError::broken(format!(
                "duplicate signing block id {id:#x}"
            )));
        }
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use apkcheck_zip::ApkBytes;

    use super::*;
    use crate::fixtures::signing_block;

    const CD: &[u8] = b"PK\x01\x02 central directory";

    // Zip entries, then the signing block, then a central directory
    fn apk_with(block: &[u8]) -> (ApkBytes, usize) {
        let mut buf = vec![0x11; 64];
        buf.extend(block);
        let cd_offset = buf.len();
        buf.extend(CD);
        (ApkBytes::from(buf), cd_offset)
    }

    #[test]
    fn reads_pairs() {
        let block = signing_block(&[
            (SIGNATURE_SCHEME_V2_BLOCK_ID, vec![1, 2, 3]),
            (0x42726577, vec![0; 100]),
            (SIGNATURE_SCHEME_V3_BLOCK_ID, vec![])
        ])
        .unwrap();
        let (source, cd_offset) = apk_with(&block);

        let found = find_signing_block(&source, cd_offset).unwrap().unwrap();
        assert_eq!(found.offset, 64);
        assert_eq!(found.size_of_block as usize, block.len() - 8);
        assert_eq!(found.get(SIGNATURE_SCHEME_V2_BLOCK_ID), Some(&[1u8, 2, 3][..]));
        assert_eq!(found.get(SIGNATURE_SCHEME_V3_BLOCK_ID), Some(&[][..]));
        assert_eq!(found.get(0x42726577).map(<[u8]>::len), Some(100));
        assert_eq!(
            found.ids(),
            vec![0x42726577, SIGNATURE_SCHEME_V2_BLOCK_ID, SIGNATURE_SCHEME_V3_BLOCK_ID]
        );
    }

    #[test]
    fn missing_magic_is_not_an_error() {
        let (source, cd_offset) = apk_with(&[0x22; 48]);
        assert_eq!(find_signing_block(&source, cd_offset).unwrap(), None);
        // Too close to the start of the file to hold a footer
        assert_eq!(find_signing_block(&source, 10).unwrap(), None);
    }

    #[test]
    fn mismatched_sizes_are_broken() {
        let mut block = signing_block(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, vec![9; 8])]).unwrap();
        block[0] ^= 0x01;
        let (source, cd_offset) = apk_with(&block);
        assert!(find_signing_block(&source, cd_offset).unwrap_err().is_broken());
    }

    #[test]
    fn size_larger_than_file_is_broken() {
        let mut block = signing_block(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, vec![9; 8])]).unwrap();
        let footer = block.len() - FOOTER_SIZE;
        block[footer..(footer + 8)].copy_from_slice(&u64::MAX.to_le_bytes());
        let (source, cd_offset) = apk_with(&block);
        assert!(find_signing_block(&source, cd_offset).unwrap_err().is_broken());

        block[footer..(footer + 8)].copy_from_slice(&4096u64.to_le_bytes());
        let (source, cd_offset) = apk_with(&block);
        assert!(find_signing_block(&source, cd_offset).unwrap_err().is_broken());
    }

    #[test]
    fn pair_overrunning_footer_is_broken() {
        let mut block = signing_block(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, vec![9; 8])]).unwrap();
        // Pair size is the u64 right after the leading size
        block[8] += 1;
        let (source, cd_offset) = apk_with(&block);
        assert!(find_signing_block(&source, cd_offset).unwrap_err().is_broken());
    }

    #[test]
    fn pair_shorter_than_its_id_is_broken() {
        // size_of_block counts the pair (8 + 0) plus the footer
        let mut block = 32u64.to_le_bytes().to_vec();
        block.extend(0u64.to_le_bytes());
        block.extend(32u64.to_le_bytes());
        block.extend(APK_SIGNING_BLOCK_MAGIC);
        let (source, cd_offset) = apk_with(&block);
        assert!(find_signing_block(&source, cd_offset).unwrap_err().is_broken());
    }

    #[test]
    fn duplicate_ids_are_broken() {
        let block = signing_block(&[
            (SIGNATURE_SCHEME_V2_BLOCK_ID, vec![1]),
            (SIGNATURE_SCHEME_V2_BLOCK_ID, vec![2])
        ])
        .unwrap();
        let (source, cd_offset) = apk_with(&block);
        let err = find_signing_block(&source, cd_offset).unwrap_err();
        assert!(matches!(err, ApkCheckError::Broken(ref reason) if reason.contains("duplicate")));
    }

    #[test]
    fn empty_block_has_no_pairs() {
        let block = signing_block(&[]).unwrap();
        let (source, cd_offset) = apk_with(&block);
        let found = find_signing_block(&source, cd_offset).unwrap().unwrap();
        assert!(found.pairs.is_empty());
    }
}
