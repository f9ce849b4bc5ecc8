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

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use apkcheck_common::Result;
use apkcheck_sign::certificate::{fingerprint, pkcs7_certificates};
use apkcheck_sign::signing_block::{SIGNATURE_SCHEME_V2_BLOCK_ID, SIGNATURE_SCHEME_V3_BLOCK_ID};
use apkcheck_sign::{decode_v2_signers, decode_v3_signers, find_signing_block, Signer, SigningBlock};
use apkcheck_zip::{find_central_directory, ApkBytes, ByteSource, CentralDirectory, ZipEntries};
use log::{debug, warn};

use crate::manifest::ManifestInfo;
use crate::policy::{AcceptancePolicy, AcceptanceVerdict};

const V1_SIGNATURE_EXTENSIONS: [&str; 3] = [".RSA", ".EC", ".DSA"];

/// The signing schemes an APK can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SigningScheme {
    /// Signed JAR files under `META-INF/`
    V1,
    V2,
    V3
}

impl fmt::Display for SigningScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningScheme::V1 => write!(f, "v1 (JAR signing)"),
            SigningScheme::V2 => write!(f, "v2 (APK Signature Scheme v2)"),
            SigningScheme::V3 => write!(f, "v3 (APK Signature Scheme v3)")
        }
    }
}

/// Result of looking for the APK Signing Block, computed once per container.
#[derive(Debug)]
struct SigningScan {
    block: Option<SigningBlock>,
    is_signed_v2: bool,
    is_signed_v3: bool
}

impl SigningScan {
    fn new(block: Option<SigningBlock>) -> SigningScan {
        let has = |id| block.as_ref().is_some_and(|block| block.contains(id));
        let is_signed_v2 = has(SIGNATURE_SCHEME_V2_BLOCK_ID);
        let is_signed_v3 = has(SIGNATURE_SCHEME_V3_BLOCK_ID);
        SigningScan {
            block,
            is_signed_v2,
            is_signed_v3
        }
    }
}

/// One APK and everything known about how it is signed.
///
/// The Central Directory is located when the container is built, so a
/// container only exists for bytes that look like a ZIP archive. The APK
/// Signing Block is looked up on first use and the outcome, success or
/// [Broken](apkcheck_common::ApkCheckError::Broken), is kept for the life of
/// the container. Containers are `Send + Sync` and can be shared through an
/// [Arc].
pub struct ApkContainer<S: ByteSource = ApkBytes> {
    source: S,
    central_directory: CentralDirectory,
    scan: Mutex<Option<Result<Arc<SigningScan>>>>
}

impl ApkContainer<ApkBytes> {
    /// Loads the APK at `path` into memory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        ApkContainer::new(ApkBytes::from_path(path)?)
    }

    pub fn from_bytes(bytes: impl Into<ApkBytes>) -> Result<Self> {
        ApkContainer::new(bytes.into())
    }
}

impl<S: ByteSource> ApkContainer<S> {
    pub fn new(source: S) -> Result<Self> {
        let central_directory = find_central_directory(&source)?;
        Ok(ApkContainer {
            source,
            central_directory,
            scan: Mutex::new(None)
        })
    }

    pub fn central_directory(&self) -> &CentralDirectory {
        &self.central_directory
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    // Check, then compute and store. The lock is held while scanning so that
    // two threads asking at once still scan only once.
    fn scan(&self) -> Result<Arc<SigningScan>> {
        let mut cache = self.scan.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get_or_insert_with(|| {
                let block = find_signing_block(&self.source, self.central_directory.offset)?;
                match &block {
                    Some(block) => debug!("APK Signing Block holds IDs {:x?}", block.ids()),
                    None => debug!("No APK Signing Block, v1 signatures only")
                }
                Ok(Arc::new(SigningScan::new(block)))
            })
            .clone()
    }

    /// The validated APK Signing Block, if the APK has one.
    pub fn signing_block(&self) -> Result<Option<SigningBlock>> {
        Ok(self.scan()?.block.clone())
    }

    pub fn is_signed_v2(&self) -> Result<bool> {
        Ok(self.scan()?.is_signed_v2)
    }

    pub fn is_signed_v3(&self) -> Result<bool> {
        Ok(self.scan()?.is_signed_v3)
    }

    /// Whether at least one JAR signature file has its `.SF` sibling.
    ///
    /// This only says that a signature is there to be verified, not that it
    /// verifies.
    pub fn is_signed_v1(&self) -> Result<bool> {
        Ok(!self.signature_names()?.is_empty())
    }

    /// Whether the APK carries any signature scheme at all.
    pub fn is_signed(&self) -> Result<bool> {
        Ok(self.is_signed_v1()? || self.is_signed_v2()? || self.is_signed_v3()?)
    }

    pub fn signing_schemes_present(&self) -> Result<BTreeSet<SigningScheme>> {
        let mut schemes = BTreeSet::new();
        if self.is_signed_v1()? {
            schemes.insert(SigningScheme::V1);
        }
        if self.is_signed_v2()? {
            schemes.insert(SigningScheme::V2);
        }
        if self.is_signed_v3()? {
            schemes.insert(SigningScheme::V3);
        }
        Ok(schemes)
    }

    /// v1 signature files (`META-INF/*.RSA`, `.EC` or `.DSA`) that come with
    /// a matching `.SF` file, in archive order.
    pub fn signature_names(&self) -> Result<Vec<String>> {
        let entries = ZipEntries::open(&self.source)?;
        let names = entries.names();

        let mut signatures = vec![];
        for name in &names {
            let Some(stem) = v1_signature_stem(name) else {
                continue;
            };
            if entries.contains(&format!("{stem}.SF")) {
                signatures.push(name.clone());
            } else {
                warn!("v1 signature file {name} missing .SF file - Partial signature!");
            }
        }
        Ok(signatures)
    }

    pub fn v2_signers(&self) -> Result<Vec<Signer>> {
        match self.scan()?.block.as_ref().and_then(|b| b.get(SIGNATURE_SCHEME_V2_BLOCK_ID)) {
            Some(value) => decode_v2_signers(value),
            None => Ok(vec![])
        }
    }

    pub fn v3_signers(&self) -> Result<Vec<Signer>> {
        match self.scan()?.block.as_ref().and_then(|b| b.get(SIGNATURE_SCHEME_V3_BLOCK_ID)) {
            Some(value) => decode_v3_signers(value),
            None => Ok(vec![])
        }
    }

    /// Every certificate (DER) found in the v1 signature files.
    pub fn certificates_v1(&self) -> Result<Vec<Vec<u8>>> {
        let names = self.signature_names()?;
        let mut entries = ZipEntries::open(&self.source)?;
        let mut certificates = vec![];
        for name in names {
            certificates.extend(pkcs7_certificates(&entries.read(&name)?)?);
        }
        Ok(certificates)
    }

    pub fn certificates_v2(&self) -> Result<Vec<Vec<u8>>> {
        Ok(signer_certificates(self.v2_signers()?))
    }

    pub fn certificates_v3(&self) -> Result<Vec<Vec<u8>>> {
        Ok(signer_certificates(self.v3_signers()?))
    }

    /// SubjectPublicKeyInfo (DER) of each v2 signer.
    pub fn public_keys_v2(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.v2_signers()?.into_iter().map(|s| s.public_key).collect())
    }

    /// SubjectPublicKeyInfo (DER) of each v3 signer.
    pub fn public_keys_v3(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.v3_signers()?.into_iter().map(|s| s.public_key).collect())
    }

    /// Certificates from all schemes, v1 first, without duplicates.
    ///
    /// Two certificates are the same when their SHA-256 fingerprints match;
    /// the first occurrence is kept.
    pub fn certificates(&self) -> Result<Vec<Vec<u8>>> {
        let mut all = self.certificates_v1()?;
        all.extend(self.certificates_v2()?);
        all.extend(self.certificates_v3()?);

        let mut seen = HashSet::new();
        all.retain(|der| seen.insert(fingerprint(der)));
        Ok(all)
    }

    /// Judges the APK for upload. See [AcceptancePolicy::evaluate].
    pub fn verdict(
        &self,
        manifest: &dyn ManifestInfo,
        policy: &AcceptancePolicy
    ) -> Result<AcceptanceVerdict> {
        policy.evaluate(self, manifest)
    }
}

// "META-INF/CERT.RSA" -> "META-INF/CERT"
fn v1_signature_stem(name: &str) -> Option<&str> {
    if !name.starts_with("META-INF/") {
        return None;
    }
    V1_SIGNATURE_EXTENSIONS
        .iter()
        .find_map(|extension| name.strip_suffix(extension))
}

fn signer_certificates(signers: Vec<Signer>) -> Vec<Vec<u8>> {
    signers
        .into_iter()
        .flat_map(|signer| signer.signed_data.certificates)
        .collect()
}
