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

use std::{fs, io, path::Path, sync::Arc};

use apkcheck_common::*;

/// An immutable, randomly addressable view over a whole APK.
///
/// Every other component reads the package through this trait, which keeps
/// the filesystem in one place and lets tests count how often the bytes are
/// touched.
pub trait ByteSource: Send + Sync {
    /// Total length of the package in bytes.
    fn len(&self) -> usize;

    /// Borrows `length` bytes starting at `offset`.
    ///
    /// A range that runs past the end of the package is a structural error,
    /// since every caller derives its offsets from the package itself.
    fn read_at(&self, offset: usize, length: usize) -> Result<&[u8]>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// APK contents loaded fully into memory. Cloning shares the buffer.
#[derive(Debug, Clone)]
pub struct ApkBytes {
    bytes: Arc<[u8]>
}

impl ApkBytes {
    /// Reads a whole `.apk` file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<ApkBytes> {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(bytes) => Ok(ApkBytes::from(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(ApkCheckError::FileNotFound(path.to_path_buf()))
            }
            Err(err) => Err(err.into())
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for ApkBytes {
    fn from(value: Vec<u8>) -> Self {
        ApkBytes {
            bytes: value.into()
        }
    }
}

impl From<&[u8]> for ApkBytes {
    fn from(value: &[u8]) -> Self {
        ApkBytes {
            bytes: value.into()
        }
    }
}

impl ByteSource for ApkBytes {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read_at(&self, offset: usize, length: usize) -> Result<&[u8]> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                ApkCheckError::broken(format!(
                    "read of {length} bytes at {offset} runs past end of {} byte file",
                    self.bytes.len()
                ))
            })?;
        Ok(&self.bytes[offset..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_bounds_checked() {
        let source = ApkBytes::from(vec![1, 2, 3, 4]);
        assert_eq!(source.read_at(1, 2).unwrap(), &[2, 3]);
        assert_eq!(source.read_at(4, 0).unwrap(), &[] as &[u8]);
        assert!(source.read_at(3, 2).unwrap_err().is_broken());
        assert!(source.read_at(usize::MAX, 2).unwrap_err().is_broken());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = ApkBytes::from_path("/definitely/not/here.apk").unwrap_err();
        assert!(matches!(err, ApkCheckError::FileNotFound(_)));
    }
}
