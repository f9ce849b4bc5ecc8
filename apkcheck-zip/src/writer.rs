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

//! Builds small archives in memory so the readers can be fed realistic
//! packages without checking binaries into the tree.

use std::io::{Cursor, Write};

use apkcheck_common::*;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

pub struct File {
    pub path: String,
    pub data: Vec<u8>
}

impl File {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> File {
        File {
            path: path.into(),
            data: data.into()
        }
    }
}

// Same rule aapt follows for the resource table
const UNCOMPRESSED_FILES: &[&str] = &["resources.arsc"];

/// Zips `files` in order, 4-byte aligned like a real APK.
pub fn zip_files(files: &[File]) -> Result<Vec<u8>> {
    let mut buf = vec![];
    let mut zip = ZipWriter::new(Cursor::new(&mut buf));
    let compressed_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .with_alignment(4);
    let uncompressed_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .with_alignment(4);

    for file in files {
        let options = if UNCOMPRESSED_FILES.contains(&&file.path[..]) {
            uncompressed_options
        } else {
            compressed_options
        };
        zip.start_file(file.path.as_str(), options)?;
        zip.write_all(&file.data)?;
    }

    zip.finish()?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{find_central_directory, ApkBytes, ByteSource, ZipEntries};

    #[test]
    fn written_archives_are_readable() {
        let buf = zip_files(&[
            File::new("AndroidManifest.xml", b"manifest".to_vec()),
            File::new("resources.arsc", vec![7u8; 64]),
            File::new("META-INF/CERT.SF", b"Signature-Version: 1.0\r\n".to_vec())
        ])
        .unwrap();
        let source = ApkBytes::from(buf);

        let cd = find_central_directory(&source).unwrap();
        assert_eq!(cd.total_entries, 3);
        assert_eq!(
            source.read_at(cd.offset, 4).unwrap(),
            crate::central_directory::CENTRAL_DIRECTORY_MAGIC
        );

        let mut entries = ZipEntries::open(&source).unwrap();
        assert_eq!(
            entries.names(),
            vec!["AndroidManifest.xml", "resources.arsc", "META-INF/CERT.SF"]
        );
        assert!(entries.contains("META-INF/CERT.SF"));
        assert!(!entries.contains("META-INF/CERT.RSA"));
        assert_eq!(entries.read("resources.arsc").unwrap(), vec![7u8; 64]);
        assert!(entries.read("classes.dex").is_err());
    }
}
