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

//! Read-only access to the ZIP layer of an APK.
//!
//! This crate owns the only code that touches the filesystem ([ApkBytes]),
//! finds the End Of Central Directory record by scanning backwards, and lists
//! archive entries for v1 (JAR) signature detection.

pub mod central_directory;
pub mod entries;
pub mod source;
#[cfg(any(test, feature = "writer"))]
pub mod writer;

pub use central_directory::{find_central_directory, CentralDirectory};
pub use entries::ZipEntries;
pub use source::{ApkBytes, ByteSource};
