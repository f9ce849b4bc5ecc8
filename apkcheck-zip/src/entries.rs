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

use std::io::{Cursor, Read};

use apkcheck_common::*;
use zip::ZipArchive;

use crate::source::ByteSource;

/// The archive's file index, opened over the in-memory package.
///
/// Only the v1 (JAR) signature check needs to look inside entries, everything
/// else works on raw offsets.
pub struct ZipEntries<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>
}

impl<'a> ZipEntries<'a> {
    pub fn open<S: ByteSource + ?Sized>(source: &'a S) -> Result<ZipEntries<'a>> {
        let bytes = source.read_at(0, source.len())?;
        Ok(ZipEntries {
            archive: ZipArchive::new(Cursor::new(bytes))?
        })
    }

    /// Entry names in central directory order.
    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(String::from).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.file_names().any(|entry| entry == name)
    }

    /// Decompresses one entry fully.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.archive.by_name(name)?;
        let mut contents = vec![];
        file.read_to_end(&mut contents)?;
        Ok(contents)
    }
}
