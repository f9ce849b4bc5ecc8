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

/// The handful of AndroidManifest.xml values the acceptance rules need.
///
/// Decoding the binary XML manifest is left to the caller.
pub trait ManifestInfo {
    fn package_name(&self) -> String;
    fn min_sdk_version(&self) -> u32;
    fn version_code(&self) -> u32;
}

/// Manifest values the caller already has at hand, e.g. from `aapt dump
/// badging` or the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredManifest {
    pub package_name: String,
    pub min_sdk_version: u32,
    pub version_code: u32
}

impl DeclaredManifest {
    pub fn new(package_name: impl Into<String>, min_sdk_version: u32, version_code: u32) -> Self {
        DeclaredManifest {
            package_name: package_name.into(),
            min_sdk_version,
            version_code
        }
    }
}

impl ManifestInfo for DeclaredManifest {
    fn package_name(&self) -> String {
        self.package_name.clone()
    }

    fn min_sdk_version(&self) -> u32 {
        self.min_sdk_version
    }

    fn version_code(&self) -> u32 {
        self.version_code
    }
}
