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

//! Builders for synthetic signing blocks, APKs and certificates.
//!
//! The structures below serialise the same layout the readers in this crate
//! decode, the way a signer such as apksigner would write it. Only compiled
//! for tests, or with the `fixtures` feature for downstream crates' tests.

use std::error::Error;

use apkcheck_zip::{find_central_directory, writer, ApkBytes};
use deku::prelude::*;
use rasn::types::{Any, Integer::Primitive, Oid};
use rasn_cms::{
    pkcs7_compat::{EncapsulatedContentInfo, SignedData as Pkcs7SignedData},
    AlgorithmIdentifier, Certificate, CertificateChoices, ContentInfo, SignerInfo
};

use crate::signing_block::{
    APK_SIGNING_BLOCK_MAGIC, SIGNATURE_SCHEME_V2_BLOCK_ID, SIGNATURE_SCHEME_V3_BLOCK_ID
};
use crate::signing_types::MAX_SDK_UNBOUNDED;

pub type FixtureResult<T> = std::result::Result<T, Box<dyn Error>>;

const OID_SHA256: &Oid =
    rasn::types::Oid::JOINT_ISO_ITU_T_COUNTRY_US_ORGANIZATION_GOV_CSOR_NIST_ALGORITHMS_HASH_SHA256;
const OID_PKCS7_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_DATA;
const OID_PKCS7_SIGNED_DATA: &Oid = rasn::types::Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_SIGNED_DATA;

/// What to put in one signer. SDK bounds are only written for v3 blocks.
#[derive(Debug, Clone)]
pub struct SignerSpec {
    pub digests: Vec<(u32, Vec<u8>)>,
    pub certificates: Vec<Vec<u8>>,
    pub additional_attributes: Vec<(u32, Vec<u8>)>,
    pub signed_data_sdk: Option<(u32, u32)>,
    pub signer_sdk: Option<(u32, u32)>,
    pub signatures: Vec<(u32, Vec<u8>)>,
    pub public_key: Vec<u8>
}

impl Default for SignerSpec {
    fn default() -> Self {
        SignerSpec {
            digests: vec![(0x0103, vec![0xD1; 32])],
            certificates: vec![],
            additional_attributes: vec![],
            signed_data_sdk: None,
            signer_sdk: None,
            signatures: vec![(0x0103, vec![0x51; 256])],
            public_key: vec![0x30; 294]
        }
    }
}

impl SignerSpec {
    /// A plausible signer carrying `certificates`.
    pub fn with_certificates(certificates: Vec<Vec<u8>>) -> SignerSpec {
        SignerSpec {
            certificates,
            ..SignerSpec::default()
        }
    }
}

// Outer APK Signing Block structures use u64 lengths
#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct U64LengthPrefixed<T: DekuWriter> {
    length: u64,
    value: T
}

// The signature scheme blocks use u32 lengths
#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct U32LengthPrefixed<T: DekuWriter> {
    length: u32,
    value: T
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct RawWrapper<T: DekuWriter> {
    value: T
}

fn len_pfx_u32<T: DekuWriter + Clone>(thing: T) -> FixtureResult<U32LengthPrefixed<T>> {
    let wrap = RawWrapper {
        value: thing.clone()
    };
    Ok(U32LengthPrefixed {
        length: wrap.to_bytes()?.len() as u32,
        value: thing
    })
}

fn len_pfx_u64<T: DekuWriter + Clone>(thing: T) -> FixtureResult<U64LengthPrefixed<T>> {
    let wrap = RawWrapper {
        value: thing.clone()
    };
    Ok(U64LengthPrefixed {
        length: wrap.to_bytes()?.len() as u64,
        value: thing
    })
}

type LengthPrefixedList<T> = U32LengthPrefixed<Vec<U32LengthPrefixed<T>>>;

fn len_pfx_list<T: DekuWriter + Clone>(items: Vec<T>) -> FixtureResult<LengthPrefixedList<T>> {
    let items = items
        .into_iter()
        .map(len_pfx_u32)
        .collect::<FixtureResult<Vec<_>>>()?;
    len_pfx_u32(items)
}

// Digests, signatures and additional attributes all look like this
#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct IdAndBytes {
    id: u32,
    bytes: U32LengthPrefixed<Vec<u8>>
}

// Additional attributes aren't length-prefixed inside their entry
#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct Attribute {
    id: u32,
    value: Vec<u8>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct SdkPair {
    min_sdk: u32,
    max_sdk: u32
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct SignedData {
    digests: LengthPrefixedList<IdAndBytes>,
    certificates: LengthPrefixedList<Vec<u8>>,
    sdk: Option<SdkPair>,
    additional_attributes: LengthPrefixedList<Attribute>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct Signer {
    signed_data: U32LengthPrefixed<SignedData>,
    sdk: Option<SdkPair>,
    signatures: LengthPrefixedList<IdAndBytes>,
    public_key: U32LengthPrefixed<Vec<u8>>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct SignatureSchemeBlock {
    signers: LengthPrefixedList<Signer>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct SigningBlockIdValuePair {
    id: u32,
    value: Vec<u8>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
struct ApkSigningBlock {
    // Size of this structure MINUS this field!
    // This field appears twice, the 'minus' is only for one of them.
    size_of_self_not_counted: u64,
    pairs: Vec<U64LengthPrefixed<SigningBlockIdValuePair>>,
    size_of_self_counted: u64,
    magic: [u8; 16]
}

fn id_and_bytes(entries: &[(u32, Vec<u8>)]) -> FixtureResult<LengthPrefixedList<IdAndBytes>> {
    let entries = entries
        .iter()
        .map(|(id, bytes)| {
            Ok(IdAndBytes {
                id: *id,
                bytes: len_pfx_u32(bytes.clone())?
            })
        })
        .collect::<FixtureResult<Vec<_>>>()?;
    len_pfx_list(entries)
}

fn sdk_pair(bounds: Option<(u32, u32)>, with_sdk_bounds: bool) -> Option<SdkPair> {
    with_sdk_bounds.then(|| {
        let (min_sdk, max_sdk) = bounds.unwrap_or((24, MAX_SDK_UNBOUNDED));
        SdkPair { min_sdk, max_sdk }
    })
}

fn signer(spec: &SignerSpec, with_sdk_bounds: bool) -> FixtureResult<Signer> {
    let attributes = spec
        .additional_attributes
        .iter()
        .map(|(id, value)| Attribute {
            id: *id,
            value: value.clone()
        })
        .collect();
    let signed_data = SignedData {
        digests: id_and_bytes(&spec.digests)?,
        certificates: len_pfx_list(spec.certificates.clone())?,
        sdk: sdk_pair(spec.signed_data_sdk, with_sdk_bounds),
        additional_attributes: len_pfx_list(attributes)?
    };
    Ok(Signer {
        signed_data: len_pfx_u32(signed_data)?,
        sdk: sdk_pair(spec.signer_sdk, with_sdk_bounds),
        signatures: id_and_bytes(&spec.signatures)?,
        public_key: len_pfx_u32(spec.public_key.clone())?
    })
}

/// Serialises the value stored under the v2 (`with_sdk_bounds = false`) or
/// v3 (`true`) block ID.
pub fn signature_scheme_block(signers: &[SignerSpec], with_sdk_bounds: bool) -> FixtureResult<Vec<u8>> {
    let signers = signers
        .iter()
        .map(|spec| signer(spec, with_sdk_bounds))
        .collect::<FixtureResult<Vec<_>>>()?;
    let block = SignatureSchemeBlock {
        signers: len_pfx_list(signers)?
    };
    Ok(block.to_bytes()?)
}

/// Serialises a whole APK Signing Block holding `pairs`, in order.
pub fn signing_block(pairs: &[(u32, Vec<u8>)]) -> FixtureResult<Vec<u8>> {
    let pairs = pairs
        .iter()
        .map(|(id, value)| {
            len_pfx_u64(SigningBlockIdValuePair {
                id: *id,
                value: value.clone()
            })
        })
        .collect::<FixtureResult<Vec<_>>>()?;

    let pairs_length = RawWrapper {
        value: pairs.clone()
    }
    .to_bytes()?
    .len();
    // Plus size_of_self_counted plus magic
    let sig_block_size = (pairs_length + 8 + 16) as u64;

    let block = ApkSigningBlock {
        size_of_self_not_counted: sig_block_size,
        pairs,
        size_of_self_counted: sig_block_size,
        magic: *APK_SIGNING_BLOCK_MAGIC
    };
    Ok(block.to_bytes()?)
}

/// Inserts `signing_block` right before the Central Directory and points the
/// EOCD at the Central Directory's new position.
pub fn splice_signing_block(zip: &[u8], signing_block: &[u8]) -> FixtureResult<Vec<u8>> {
    let cd = find_central_directory(&ApkBytes::from(zip))?;

    let mut apk = vec![];
    apk.extend(&zip[..cd.offset]);
    apk.extend(signing_block);
    apk.extend(&zip[cd.offset..]);

    let new_cd_start = (cd.offset + signing_block.len()) as u32;
    let field = cd.eocd_offset + signing_block.len() + 16;
    apk[field..(field + 4)].copy_from_slice(&new_cd_start.to_le_bytes());
    Ok(apk)
}

/// A self-signed certificate (DER) whose subject has the given common name.
pub fn certificate_with_common_name(common_name: &str) -> FixtureResult<Vec<u8>> {
    certificate_with_common_name_value(rcgen::DnValue::Utf8String(common_name.into()))
}

/// Like [certificate_with_common_name], with control over the ASN.1 string
/// type the common name is encoded as.
pub fn certificate_with_common_name_value(common_name: rcgen::DnValue) -> FixtureResult<Vec<u8>> {
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    let key_pair = KeyPair::generate()?;
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::OrganizationName, "Android");
    distinguished_name.push(DnType::CommonName, common_name);
    let mut cert_params = CertificateParams::new(vec![])?;
    cert_params.distinguished_name = distinguished_name;
    let cert = cert_params.self_signed(&key_pair)?;

    // Re-encode so the bytes match what comes back out of a PKCS #7 blob
    let decoded = rasn::der::decode::<Certificate>(cert.der())?;
    Ok(rasn::der::encode(&decoded)?)
}

/// A certificate-only PKCS #7 SignedData blob, the shape of a v1
/// `META-INF/*.RSA` file minus its signer infos.
pub fn pkcs7_with_certificates(certificates: &[Vec<u8>]) -> FixtureResult<Vec<u8>> {
    let certificates = certificates
        .iter()
        .map(|der| {
            Ok(CertificateChoices::Certificate(Box::new(rasn::der::decode::<Certificate>(
                der
            )?)))
        })
        .collect::<FixtureResult<Vec<_>>>()?;

    let signed_data = Pkcs7SignedData {
        version: Primitive(1),
        digest_algorithms: vec![AlgorithmIdentifier {
            algorithm: OID_SHA256.into(),
            parameters: None
        }]
        .into(),
        encap_content_info: EncapsulatedContentInfo {
            content_type: OID_PKCS7_DATA.into(),
            content: None
        },
        certificates: Some(certificates.into()),
        crls: None,
        signer_infos: Vec::<SignerInfo>::new().into()
    };

    let wrapper = ContentInfo {
        content_type: OID_PKCS7_SIGNED_DATA.into(),
        content: Any::new(rasn::der::encode(&signed_data)?)
    };
    Ok(rasn::der::encode(&wrapper)?)
}

/// Assembles a complete package: zip entries, optional v1 signature files and
/// an optional APK Signing Block.
#[derive(Default)]
pub struct ApkBuilder {
    files: Vec<writer::File>,
    pairs: Vec<(u32, Vec<u8>)>
}

impl ApkBuilder {
    pub fn new() -> ApkBuilder {
        ApkBuilder::default().file("AndroidManifest.xml", b"\x03\x00\x08\x00".to_vec())
    }

    pub fn file(mut self, path: &str, data: Vec<u8>) -> ApkBuilder {
        self.files.push(writer::File::new(path, data));
        self
    }

    /// Adds `META-INF/{alias}.SF` and `META-INF/{alias}.{extension}` holding
    /// `certificates`.
    pub fn v1_signature(self, alias: &str, extension: &str, certificates: &[Vec<u8>]) -> FixtureResult<ApkBuilder> {
        let pkcs7 = pkcs7_with_certificates(certificates)?;
        Ok(self
            .file(
                &format!("META-INF/{alias}.SF"),
                b"Signature-Version: 1.0\r\nCreated-By: 1.0 (Android)\r\n\r\n".to_vec()
            )
            .file(&format!("META-INF/{alias}.{extension}"), pkcs7))
    }

    pub fn v2(self, signers: &[SignerSpec]) -> FixtureResult<ApkBuilder> {
        let block = signature_scheme_block(signers, false)?;
        Ok(self.pair(SIGNATURE_SCHEME_V2_BLOCK_ID, block))
    }

    pub fn v3(self, signers: &[SignerSpec]) -> FixtureResult<ApkBuilder> {
        let block = signature_scheme_block(signers, true)?;
        Ok(self.pair(SIGNATURE_SCHEME_V3_BLOCK_ID, block))
    }

    pub fn pair(mut self, id: u32, value: Vec<u8>) -> ApkBuilder {
        self.pairs.push((id, value));
        self
    }

    pub fn build(self) -> FixtureResult<Vec<u8>> {
        let zip = writer::zip_files(&self.files)?;
        if self.pairs.is_empty() {
            return Ok(zip);
        }
        splice_signing_block(&zip, &signing_block(&self.pairs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_block_sizes_match_at_both_ends() {
        let block = signing_block(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, vec![1, 2, 3])]).unwrap();
        // 8 + (8 + 4 + 3) + 8 + 16
        assert_eq!(block.len(), 47);
        assert_eq!(&block[..8], &39u64.to_le_bytes());
        assert_eq!(&block[23..31], &39u64.to_le_bytes());
        assert_eq!(&block[31..], APK_SIGNING_BLOCK_MAGIC);
    }

    #[test]
    fn spliced_apk_keeps_a_valid_eocd() {
        let block = signing_block(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, vec![1, 2, 3])]).unwrap();
        let zip = writer::zip_files(&[writer::File::new("a.txt", b"hello".to_vec())]).unwrap();
        let before = find_central_directory(&ApkBytes::from(zip.as_slice())).unwrap();

        let apk = splice_signing_block(&zip, &block).unwrap();
        let after = find_central_directory(&ApkBytes::from(apk)).unwrap();
        assert_eq!(after.offset, before.offset + block.len());
        assert_eq!(after.size, before.size);
    }
}
