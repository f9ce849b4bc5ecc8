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

use std::{fmt, io, path::PathBuf, sync::Arc};

use deku::prelude::*;
use zip::result::ZipError;

/// Common error type making it easier to share `Result`s between apkcheck
/// crates.
///
/// In general designed to avoid needing utilities like `map_err`. Sources
/// that aren't `Clone` are wrapped in an [Arc] so that a container can cache
/// a failed scan and hand it to every thread that asks.
///
/// Note that an APK which parses fine but fails the upload rules is *not* an
/// error. That outcome is an `AcceptanceVerdict` in `apkcheck-api`.
#[derive(Debug, Clone)]
pub enum ApkCheckError {
    /// apkcheck-cli encountered an error while processing something specific
    /// to the command line implementation. For example, not enough arguments
    /// were passed via the shell.
    Cli(String),
    /// The bytes are not a structurally valid APK. The reason describes the
    /// exact malformation and is meant for logs, not for end users.
    ///
    /// Raised for a missing End Of Central Directory record, multi-disk
    /// archives, inconsistent APK Signing Block sizes, duplicate block IDs and
    /// any length prefix that runs past its enclosing record.
    Broken(String),
    /// The APK path handed to the byte source does not exist.
    FileNotFound(PathBuf),
    /// An error occurred while reading the APK from disk.
    FileIoError(Arc<io::Error>),
    /// The `zip` crate failed to list or read entries of the archive while
    /// looking for v1 (JAR) signature files.
    ZipReadingFailed(Arc<ZipError>),
    /// A fixed-layout record such as the End Of Central Directory could not be
    /// deserialised. See [DekuError].
    ByteDeserialisationFailed(DekuError),
    /// An X.509 certificate or a PKCS #7 signature file couldn't be decoded.
    CertificateDecodingFailed(Arc<rasn::error::DecodeError>),
    /// A decoded certificate couldn't be re-encoded to DER.
    CertificateEncodingFailed(Arc<rasn::error::EncodeError>)
}

/// Result type where the error is always [ApkCheckError].
pub type Result<T> = std::result::Result<T, ApkCheckError>;

impl ApkCheckError {
    /// Shorthand used by the parsers for structural failures.
    pub fn broken(reason: impl Into<String>) -> Self {
        ApkCheckError::Broken(reason.into())
    }

    /// Whether this error means "the bytes are not an APK", as opposed to the
    /// file being unreadable.
    pub fn is_broken(&self) -> bool {
        matches!(
            self,
            ApkCheckError::Broken(_)
                | ApkCheckError::ZipReadingFailed(_)
                | ApkCheckError::ByteDeserialisationFailed(_)
        )
    }
}

// Offsets and record names stay in Debug output only
impl fmt::Display for ApkCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApkCheckError::Cli(message) => write!(f, "{message}"),
            ApkCheckError::Broken(_)
            | ApkCheckError::ZipReadingFailed(_)
            | ApkCheckError::ByteDeserialisationFailed(_) => write!(f, "not a valid APK"),
            ApkCheckError::FileNotFound(path) => write!(f, "file not found: {}", path.display()),
            ApkCheckError::FileIoError(err) => write!(f, "could not read file: {err}"),
            ApkCheckError::CertificateDecodingFailed(_)
            | ApkCheckError::CertificateEncodingFailed(_) => {
                write!(f, "signing certificate could not be decoded")
            }
        }
    }
}

impl std::error::Error for ApkCheckError {}

/// This makes it easier for Result<Something, ApkCheckError> to be returned
/// from `main`-style entry points that only speak strings
impl From<ApkCheckError> for String {
    fn from(value: ApkCheckError) -> Self {
        format!("{:?}", value)
    }
}

// Automatic conversion from other types of error to ApkCheckError makes the rest of the code cleaner
impl From<io::Error> for ApkCheckError {
    fn from(value: io::Error) -> Self {
        ApkCheckError::FileIoError(value.into())
    }
}

impl From<DekuError> for ApkCheckError {
    fn from(value: DekuError) -> Self {
        ApkCheckError::ByteDeserialisationFailed(value)
    }
}

impl From<ZipError> for ApkCheckError {
    fn from(value: ZipError) -> Self {
        ApkCheckError::ZipReadingFailed(value.into())
    }
}

impl From<rasn::error::DecodeError> for ApkCheckError {
    fn from(value: rasn::error::DecodeError) -> Self {
        ApkCheckError::CertificateDecodingFailed(value.into())
    }
}

impl From<rasn::error::EncodeError> for ApkCheckError {
    fn from(value: rasn::error::EncodeError) -> Self {
        ApkCheckError::CertificateEncodingFailed(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_is_displayed_without_internal_details() {
        let err = ApkCheckError::broken("signing block sizes 120 != 112 at offset 4096");
        assert_eq!(err.to_string(), "not a valid APK");
        assert!(err.is_broken());
    }

    #[test]
    fn io_errors_are_not_broken() {
        let err: ApkCheckError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(!err.is_broken());
        assert!(err.to_string().starts_with("could not read file"));
    }
}
