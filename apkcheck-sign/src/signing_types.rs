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

// Types decoded from the APK Signature Scheme v2/v3 blocks.
// Named according to the APK Signature Scheme v2 doc.

use std::fmt;

use crate::length_prefixed::LengthPrefixedReader;
use crate::signing_block::STRIPPING_PROTECTION_ATTR_ID;

// Android reads max_sdk as a signed int, so this is "no upper bound"
pub const MAX_SDK_UNBOUNDED: u32 = 0x7FFFFFFF;

/// Signature algorithm IDs listed in the APK Signature Scheme v2 doc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSsaPssWithSha2_256,
    RsaSsaPssWithSha2_512,
    RsaSsaPkcs1v1_5WithSha2_256,
    RsaSsaPkcs1v1_5WithSha2_512,
    EcdsaWithSha2_256,
    EcdsaWithSha2_512,
    DsaWithSha2_256
}

impl SignatureAlgorithm {
    pub fn from_id(id: u32) -> Option<SignatureAlgorithm> {
        use SignatureAlgorithm::*;
        match id {
            0x0101 => Some(RsaSsaPssWithSha2_256),
            0x0102 => Some(RsaSsaPssWithSha2_512),
            0x0103 => Some(RsaSsaPkcs1v1_5WithSha2_256),
            0x0104 => Some(RsaSsaPkcs1v1_5WithSha2_512),
            0x0201 => Some(EcdsaWithSha2_256),
            0x0202 => Some(EcdsaWithSha2_512),
            0x0301 => Some(DsaWithSha2_256),
            _ => None
        }
    }

    pub fn description(&self) -> &'static str {
        use SignatureAlgorithm::*;
        match self {
            RsaSsaPssWithSha2_256 => {
                "RSASSA-PSS with SHA2-256 digest, SHA2-256 MGF1, 32 bytes of salt, trailer: 0xbc"
            }
            RsaSsaPssWithSha2_512 => {
                "RSASSA-PSS with SHA2-512 digest, SHA2-512 MGF1, 64 bytes of salt, trailer: 0xbc"
            }
            RsaSsaPkcs1v1_5WithSha2_256 => "RSASSA-PKCS1-v1_5 with SHA2-256 digest",
            // Used by build systems which require deterministic signatures
            RsaSsaPkcs1v1_5WithSha2_512 => "RSASSA-PKCS1-v1_5 with SHA2-512 digest",
            EcdsaWithSha2_256 => "ECDSA with SHA2-256 digest",
            EcdsaWithSha2_512 => "ECDSA with SHA2-512 digest",
            DsaWithSha2_256 => "DSA with SHA2-256 digest"
        }
    }
}

fn algorithm_name(id: u32) -> String {
    SignatureAlgorithm::from_id(id)
        .map(|algorithm| algorithm.description().to_string())
        .unwrap_or_else(|| format!("{id:#x}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub signature_algorithm_id: u32,
    pub digest: Vec<u8>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub signature_algorithm_id: u32,
    pub signature: Vec<u8>
}

/// Platform versions a v3 signer applies to. Values are kept exactly as
/// stored, including the [MAX_SDK_UNBOUNDED] sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkBounds {
    pub min_sdk: u32,
    pub max_sdk: u32
}

impl SdkBounds {
    pub fn is_unbounded_above(&self) -> bool {
        self.max_sdk >= MAX_SDK_UNBOUNDED
    }
}

impl fmt::Display for SdkBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded_above() {
            write!(f, "minSDK {}, maxSDK {:#x}", self.min_sdk, self.max_sdk)
        } else {
            write!(f, "minSDK {}, maxSDK {}", self.min_sdk, self.max_sdk)
        }
    }
}

/// The part of a signer that its signatures cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedData {
    /// The record exactly as it appeared, without its length prefix
    pub raw: Vec<u8>,
    pub digests: Vec<Digest>,
    // Array of X.509 Certificates (ASN.1 DER form) as bytes
    pub certificates: Vec<Vec<u8>>,
    /// v3 only
    pub sdk_bounds: Option<SdkBounds>,
    // Sequence of length-prefixed (u32 id, value) attributes, undecoded
    pub additional_attributes: Vec<u8>
}

impl SignedData {
    /// Returns the signature scheme ID recorded by the v2 stripping protection
    /// attribute, if the signer set one.
    ///
    /// Malformed attribute sequences are treated as "not set" since nothing
    /// else in the attributes is interpreted.
    pub fn stripping_protection(&self) -> Option<u32> {
        let attributes = LengthPrefixedReader::new(&self.additional_attributes, "attributes")
            .read_sequence()
            .ok()?;
        attributes.into_iter().find_map(|attribute| {
            let mut reader = LengthPrefixedReader::new(attribute, "attribute");
            let id = reader.read_u32().ok()?;
            if id != STRIPPING_PROTECTION_ATTR_ID || reader.remaining() != 4 {
                return None;
            }
            reader.read_u32().ok()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    /// The whole signer record, without its length prefix
    pub raw: Vec<u8>,
    pub signed_data: SignedData,
    /// v3 only. Expected to match `signed_data.sdk_bounds`, but both are kept
    /// as found.
    pub sdk_bounds: Option<SdkBounds>,
    pub signatures: Vec<Signature>,
    // SubjectPublicKeyInfo, ASN.1 DER form
    pub public_key: Vec<u8>
}

impl Signer {
    /// False only for a v3 signer whose own bounds differ from the signed ones.
    pub fn sdk_bounds_agree(&self) -> bool {
        self.sdk_bounds == self.signed_data.sdk_bounds
    }
}

impl fmt::Display for SignedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(bounds) = &self.sdk_bounds {
            writeln!(f, "signed data {bounds}")?;
        }
        match self.stripping_protection() {
            Some(scheme) => writeln!(f, "additional attributes: stripping protection set, scheme {scheme}")?,
            None => writeln!(f, "additional attributes: {} bytes", self.additional_attributes.len())?
        }
        writeln!(f, "digests:")?;
        for (i, digest) in self.digests.iter().enumerate() {
            writeln!(
                f,
                " [{i}] {}: {} bytes",
                algorithm_name(digest.signature_algorithm_id),
                digest.digest.len()
            )?;
        }
        write!(f, "certificates: {}", self.certificates.len())
    }
}

impl fmt::Display for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(bounds) = &self.sdk_bounds {
            writeln!(f, "signer {bounds}")?;
        }
        writeln!(f, "{}", self.signed_data)?;
        writeln!(f, "signatures:")?;
        for (i, signature) in self.signatures.iter().enumerate() {
            writeln!(
                f,
                " [{i}] {}: {} bytes",
                algorithm_name(signature.signature_algorithm_id),
                signature.signature.len()
            )?;
        }
        write!(f, "public key: {} bytes", self.public_key.len())
    }
}
