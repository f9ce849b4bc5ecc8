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

//! # apkcheck API
//!
//! Reads the signing metadata of an APK and decides whether it may be
//! uploaded.
//!
//! ```no_run
//! use apkcheck_api::{AcceptancePolicy, ApkContainer, DeclaredManifest};
//!
//! let apk = ApkContainer::from_path("app-release.apk")?;
//! println!("Signed with {:?}", apk.signing_schemes_present()?);
//!
//! let manifest = DeclaredManifest::new("com.example.app", 26, 7);
//! let verdict = apk.verdict(&manifest, &AcceptancePolicy::default())?;
//! if let Some(reason) = verdict.reason {
//!     eprintln!("{reason}");
//! }
//! # Ok::<(), apkcheck_api::ApkCheckError>(())
//! ```
//!
//! Signatures are not verified. An APK that passes here still has to be
//! verified by whoever installs it.

pub mod container;
pub mod manifest;
pub mod policy;

pub use apkcheck_common::{ApkCheckError, Result};
pub use apkcheck_sign::{SdkBounds, Signer};
pub use apkcheck_zip::{ApkBytes, ByteSource};
pub use container::{ApkContainer, SigningScheme};
pub use manifest::{DeclaredManifest, ManifestInfo};
pub use policy::{AcceptancePolicy, AcceptanceState, AcceptanceVerdict, DisqualifyingReason};
