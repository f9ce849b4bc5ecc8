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

//! Readers for APK Signature Scheme v2 and v3 metadata.
//!
//! The APK Signing Block sits between the ZIP entries and the Central
//! Directory. [signing_block::find_signing_block] validates it and splits it
//! into ID/value pairs, [signed_data_block] decodes the v2/v3 values into
//! [Signer]s, and [certificate] looks inside the DER certificates they carry.
//!
//! Nothing here verifies a signature. Raw digests, signatures and keys are
//! surfaced as-is for callers that want to.

// APK Signature Scheme v2 based on https://source.android.com/docs/security/features/apksigning/v2
// APK Signature Scheme v3 based on https://source.android.com/docs/security/features/apksigning/v3

pub mod certificate;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod length_prefixed;
pub mod signed_data_block;
pub mod signing_block;
pub mod signing_types;

pub use signed_data_block::{decode_v2_signers, decode_v3_signers};
pub use signing_block::{find_signing_block, SigningBlock};
pub use signing_types::{Digest, SdkBounds, Signature, SignatureAlgorithm, SignedData, Signer};
