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

//! Just enough X.509 and PKCS #7 to tell who signed a package.

use apkcheck_common::*;
use rasn::types::{
    Any, AsnType, BmpString, Ia5String, Implicit, OctetString, Oid, PrintableString, Tag
};
use rasn_cms::{pkcs7_compat::SignedData, CertificateChoices, ContentInfo};
use rasn_pkix::{Certificate, Name};
use sha2::{Digest, Sha256};

const OID_COMMON_NAME: &Oid = Oid::const_new(&[2, 5, 4, 3]);
const OID_PKCS7_SIGNED_DATA: &Oid = Oid::ISO_MEMBER_BODY_US_RSADSI_PKCS7_SIGNED_DATA;

pub type Sha256Hash = [u8; 32];

/// Every common name (CN) in the subject of a DER certificate, in order.
pub fn subject_common_names(der: &[u8]) -> Result<Vec<String>> {
    let certificate = rasn::ber::decode::<Certificate>(der)?;
    Ok(common_names(&certificate.tbs_certificate.subject))
}

fn common_names(name: &Name) -> Vec<String> {
    match name {
        Name::RdnSequence(rdns) => rdns
            .iter()
            .flat_map(|rdn| rdn.to_vec())
            .filter(|attribute| &*attribute.r#type == OID_COMMON_NAME)
            .filter_map(|attribute| directory_string(&attribute.value))
            .collect()
    }
}

// Universal tags for the string forms rasn can't decode as text. TeletexString
// is read as 4-byte characters and UniversalString as UTF-8, so both are
// taken as raw octets instead.
struct TeletexTag;
struct UniversalStringTag;

impl AsnType for TeletexTag {
    const TAG: Tag = Tag::TELETEX_STRING;
}

impl AsnType for UniversalStringTag {
    const TAG: Tag = Tag::UNIVERSAL_STRING;
}

// CNs are UTF8String these days, but keytool still writes PrintableString and
// older tools any of the other DirectoryString forms. IA5String isn't a
// DirectoryString but turns up in the wild anyway.
fn directory_string(value: &Any) -> Option<String> {
    let bytes = value.as_bytes();
    if let Ok(utf8) = rasn::ber::decode::<String>(bytes) {
        return Some(utf8);
    }
    if let Ok(printable) = rasn::ber::decode::<PrintableString>(bytes) {
        return String::from_utf8(printable.as_bytes().to_vec()).ok();
    }
    if let Ok(ia5) = rasn::ber::decode::<Ia5String>(bytes) {
        return String::from_utf8(ia5.as_iso646_bytes().to_vec()).ok();
    }
    if let Ok(bmp) = rasn::ber::decode::<BmpString>(bytes) {
        let units: Vec<u16> = bmp
            .to_bytes()
            .chunks_exact(2)
            .map(|unit| u16::from_be_bytes([unit[0], unit[1]]))
            .collect();
        return String::from_utf16(&units).ok();
    }
    if let Ok(teletex) = rasn::ber::decode::<Implicit<TeletexTag, OctetString>>(bytes) {
        // The printable T.61 characters a CN uses line up with Latin-1
        return Some(teletex.iter().map(|&b| char::from(b)).collect());
    }
    rasn::ber::decode::<Implicit<UniversalStringTag, OctetString>>(bytes)
        .ok()
        .and_then(|universal| ucs4_be(&universal))
}

fn ucs4_be(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    bytes
        .chunks_exact(4)
        .map(|ch| char::from_u32(u32::from_be_bytes([ch[0], ch[1], ch[2], ch[3]])))
        .collect()
}

/// Extracts the certificates from a v1 signature block file
/// (`META-INF/*.RSA`, `.EC` or `.DSA`), re-encoded as DER.
pub fn pkcs7_certificates(pkcs7: &[u8]) -> Result<Vec<Vec<u8>>> {
    let content_info = rasn::ber::decode::<ContentInfo>(pkcs7)?;
    if &*content_info.content_type != OID_PKCS7_SIGNED_DATA {
        return Err(ApkCheckError::broken("v1 signature is not PKCS #7 signed data"));
    }
    let signed_data = rasn::ber::decode::<SignedData>(content_info.content.as_bytes())?;

    let mut certificates = vec![];
    for choice in signed_data.certificates.iter().flat_map(|set| set.to_vec()) {
        if let CertificateChoices::Certificate(certificate) = choice {
            certificates.push(rasn::der::encode(certificate.as_ref())?);
        }
    }
    Ok(certificates)
}

/// SHA-256 over the DER bytes, the usual certificate fingerprint.
pub fn fingerprint(der: &[u8]) -> Sha256Hash {
    Sha256::digest(der).into()
}
