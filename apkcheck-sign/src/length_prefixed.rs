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
use byteorder::{ByteOrder, LittleEndian};

/// Forward-only cursor over one record of the signing block.
///
/// Every read is checked against the end of the record it was created for,
/// so a length prefix can never reach into a sibling or past the buffer.
/// `what` names the record in error messages.
pub struct LengthPrefixedReader<'a> {
    buf: &'a [u8],
    pos: usize,
    what: &'static str
}

impl<'a> LengthPrefixedReader<'a> {
    pub fn new(buf: &'a [u8], what: &'static str) -> LengthPrefixedReader<'a> {
        LengthPrefixedReader { buf, pos: 0, what }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                ApkCheckError::broken(format!(
                    "{}: {len} bytes at {} run past its {} byte boundary",
                    self.what,
                    self.pos,
                    self.buf.len()
                ))
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Reads a u32 length followed by that many bytes.
    pub fn read_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    /// Reads length-prefixed items until the record is exhausted.
    pub fn read_sequence(mut self) -> Result<Vec<&'a [u8]>> {
        let mut items = vec![];
        while !self.is_empty() {
            items.push(self.read_prefixed()?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nested_prefixes() {
        let buf = [3, 0, 0, 0, 0xA, 0xB, 0xC, 1, 0, 0, 0, 0xD];
        let mut reader = LengthPrefixedReader::new(&buf, "test");
        assert_eq!(reader.read_prefixed().unwrap(), &[0xA, 0xB, 0xC]);
        assert_eq!(reader.position(), 7);
        assert_eq!(reader.remaining(), 5);
        assert_eq!(reader.read_prefixed().unwrap(), &[0xD]);
        assert!(reader.is_empty());
    }

    #[test]
    fn prefix_past_boundary_is_broken() {
        let buf = [5, 0, 0, 0, 0xA, 0xB];
        let mut reader = LengthPrefixedReader::new(&buf, "test");
        assert!(reader.read_prefixed().unwrap_err().is_broken());

        // A huge length must not overflow the cursor
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0xA];
        let mut reader = LengthPrefixedReader::new(&buf, "test");
        assert!(reader.read_prefixed().unwrap_err().is_broken());
    }

    #[test]
    fn sequence_needs_whole_items() {
        let buf = [1, 0, 0, 0, 0xA, 2, 0];
        let err = LengthPrefixedReader::new(&buf, "test").read_sequence().unwrap_err();
        assert!(err.is_broken());

        let buf = [1, 0, 0, 0, 0xA, 0, 0, 0, 0];
        let items = LengthPrefixedReader::new(&buf, "test").read_sequence().unwrap();
        assert_eq!(items, vec![&[0xA_u8][..], &[][..]]);
    }
}
