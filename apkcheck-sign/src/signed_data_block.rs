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

// Decodes the values stored under the v2 and v3 block IDs.
//
// V2 layout (v3 differences marked):
//  * length-prefixed sequence of length-prefixed signers:
//    * length-prefixed signed data:
//      * length-prefixed sequence of length-prefixed digests:
//        * signature algorithm ID (u32)
//        * length-prefixed digest
//      * length-prefixed sequence of length-prefixed X.509 certificates
//      * v3: minSDK (u32), maxSDK (u32)
//      * length-prefixed sequence of length-prefixed additional attributes
//    * v3: minSDK (u32), maxSDK (u32)
//    * length-prefixed sequence of length-prefixed signatures:
//      * signature algorithm ID (u32)
//      * length-prefixed signature
//    * length-prefixed public key (SubjectPublicKeyInfo, ASN.1 DER)

use apkcheck_common::*;
use log::{debug, warn};

use crate::{
    length_prefixed::LengthPrefixedReader,
    signing_types::{Digest, SdkBounds, Signature, SignedData, Signer}
};

/// Decodes the value stored under [SIGNATURE_SCHEME_V2_BLOCK_ID].
///
/// [SIGNATURE_SCHEME_V2_BLOCK_ID]: crate::signing_block::SIGNATURE_SCHEME_V2_BLOCK_ID
pub fn decode_v2_signers(block: &[u8]) -> Result<Vec<Signer>> {
    decode_signers(block, false)
}

/// Decodes the value stored under [SIGNATURE_SCHEME_V3_BLOCK_ID].
///
/// [SIGNATURE_SCHEME_V3_BLOCK_ID]: crate::signing_block::SIGNATURE_SCHEME_V3_BLOCK_ID
pub fn decode_v3_signers(block: &[u8]) -> Result<Vec<Signer>> {
    decode_signers(block, true)
}

fn decode_signers(block: &[u8], with_sdk_bounds: bool) -> Result<Vec<Signer>> {
    let mut reader = LengthPrefixedReader::new(block, "signature scheme block");
    let sequence_len = reader.read_u32()? as usize;
    if sequence_len.checked_add(4) != Some(block.len()) {
        return Err(ApkCheckError::broken(format!(
            "signer sequence of {sequence_len} bytes in a {} byte block",
            block.len()
        )));
    }

    let signers = LengthPrefixedReader::new(reader.take(sequence_len)?, "signer sequence")
        .read_sequence()?
        .into_iter()
        .map(|signer| decode_signer(signer, with_sdk_bounds))
        .collect::<Result<Vec<_>>>()?;
    debug!("decoded {} signers", signers.len());
    Ok(signers)
}

fn decode_signer(raw: &[u8], with_sdk_bounds: bool) -> Result<Signer> {
    let mut reader = LengthPrefixedReader::new(raw, "signer");
    let signed_data = decode_signed_data(reader.read_prefixed()?, with_sdk_bounds)?;
    let sdk_bounds = if with_sdk_bounds {
        Some(read_sdk_bounds(&mut reader)?)
    } else {
        None
    };
    let signatures = read_algorithm_entries(reader.read_prefixed()?, "signature")?
        .into_iter()
        .map(|(signature_algorithm_id, signature)| Signature {
            signature_algorithm_id,
            signature
        })
        .collect();
    let public_key = reader.read_prefixed()?.to_vec();
    if !reader.is_empty() {
        debug!("ignoring {} bytes after signer public key", reader.remaining());
    }

    let signer = Signer {
        raw: raw.to_vec(),
        signed_data,
        sdk_bounds,
        signatures,
        public_key
    };
    if !signer.sdk_bounds_agree() {
        warn!(
            "v3 signer SDK bounds {:?} differ from its signed data {:?}",
            signer.sdk_bounds, signer.signed_data.sdk_bounds
        );
    }
    Ok(signer)
}

fn decode_signed_data(raw: &[u8], with_sdk_bounds: bool) -> Result<SignedData> {
    let mut reader = LengthPrefixedReader::new(raw, "signed data");
    let digests = read_algorithm_entries(reader.read_prefixed()?, "digest")?
        .into_iter()
        .map(|(signature_algorithm_id, digest)| Digest {
            signature_algorithm_id,
            digest
        })
        .collect();
    let certificates = LengthPrefixedReader::new(reader.read_prefixed()?, "certificates")
        .read_sequence()?
        .into_iter()
        .map(<[u8]>::to_vec)
        .collect();
    let sdk_bounds = if with_sdk_bounds {
        Some(read_sdk_bounds(&mut reader)?)
    } else {
        None
    };
    let additional_attributes = reader.read_prefixed()?.to_vec();

    Ok(SignedData {
        raw: raw.to_vec(),
        digests,
        certificates,
        sdk_bounds,
        additional_attributes
    })
}

// Max SDK is kept as-is, 0x7FFFFFFF and above mean "no upper bound"
fn read_sdk_bounds(reader: &mut LengthPrefixedReader) -> Result<SdkBounds> {
    Ok(SdkBounds {
        min_sdk: reader.read_u32()?,
        max_sdk: reader.read_u32()?
    })
}

// Digests and signatures share a shape: a sequence of length-prefixed
// (u32 algorithm ID, length-prefixed bytes)
fn read_algorithm_entries(sequence: &[u8], what: &'static str) -> Result<Vec<(u32, Vec<u8>)>> {
    LengthPrefixedReader::new(sequence, what)
        .read_sequence()?
        .into_iter()
        .map(|entry| {
            let mut reader = LengthPrefixedReader::new(entry, what);
            let algorithm_id = reader.read_u32()?;
            let bytes = reader.read_prefixed()?.to_vec();
            Ok((algorithm_id, bytes))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{signature_scheme_block, SignerSpec};
    use crate::signing_types::MAX_SDK_UNBOUNDED;

    fn spec_with(digests: usize, certificates: usize, public_key_len: usize) -> SignerSpec {
        SignerSpec {
            digests: (0..digests)
                .map(|i| (0x0101 + i as u32, vec![i as u8; 32]))
                .collect(),
            certificates: (0..certificates).map(|i| vec![0x30, i as u8, 0xAB]).collect(),
            signatures: vec![(0x0103, vec![0x5A; 256])],
            public_key: vec![0x30; public_key_len],
            ..SignerSpec::default()
        }
    }

    #[test]
    fn decodes_v2_signer() {
        let block = signature_scheme_block(&[spec_with(3, 2, 294)], false).unwrap();
        let signers = decode_v2_signers(&block).unwrap();

        assert_eq!(signers.len(), 1);
        let signer = &signers[0];
        assert_eq!(signer.signed_data.digests.len(), 3);
        assert_eq!(signer.signed_data.digests[2].signature_algorithm_id, 0x0103);
        assert_eq!(signer.signed_data.digests[2].digest, vec![2u8; 32]);
        assert_eq!(
            signer.signed_data.certificates,
            vec![vec![0x30, 0, 0xAB], vec![0x30, 1, 0xAB]]
        );
        assert_eq!(signer.signatures.len(), 1);
        assert_eq!(signer.signatures[0].signature.len(), 256);
        assert_eq!(signer.public_key.len(), 294);
        assert_eq!(signer.sdk_bounds, None);
        assert_eq!(signer.signed_data.sdk_bounds, None);
        // Raw spans exclude their own length prefixes
        assert_eq!(&block[8..], &signer.raw[..]);
    }

    #[test]
    fn decodes_several_signers_in_order() {
        let block = signature_scheme_block(
            &[spec_with(1, 1, 10), spec_with(2, 0, 20), spec_with(0, 3, 0)],
            false
        )
        .unwrap();
        let signers = decode_v2_signers(&block).unwrap();
        let shape: Vec<_> = signers
            .iter()
            .map(|s| {
                (
                    s.signed_data.digests.len(),
                    s.signed_data.certificates.len(),
                    s.public_key.len()
                )
            })
            .collect();
        assert_eq!(shape, vec![(1, 1, 10), (2, 0, 20), (0, 3, 0)]);
    }

    #[test]
    fn decodes_v3_sdk_bounds_unchanged() {
        let spec = SignerSpec {
            signed_data_sdk: Some((28, MAX_SDK_UNBOUNDED)),
            signer_sdk: Some((28, MAX_SDK_UNBOUNDED)),
            ..spec_with(1, 1, 91)
        };
        let block = signature_scheme_block(&[spec], true).unwrap();
        let signer = &decode_v3_signers(&block).unwrap()[0];

        let expected = SdkBounds {
            min_sdk: 28,
            max_sdk: 0x7FFFFFFF
        };
        assert_eq!(signer.sdk_bounds, Some(expected));
        assert_eq!(signer.signed_data.sdk_bounds, Some(expected));
        assert!(signer.sdk_bounds_agree());
        assert_eq!(signer.public_key.len(), 91);
    }

    #[test]
    fn keeps_disagreeing_v3_bounds() {
        let spec = SignerSpec {
            signed_data_sdk: Some((24, 0xFFFFFFFF)),
            signer_sdk: Some((28, 33)),
            ..spec_with(1, 1, 10)
        };
        let block = signature_scheme_block(&[spec], true).unwrap();
        let signer = &decode_v3_signers(&block).unwrap()[0];

        assert!(!signer.sdk_bounds_agree());
        assert_eq!(
            signer.signed_data.sdk_bounds,
            Some(SdkBounds {
                min_sdk: 24,
                max_sdk: 0xFFFFFFFF
            })
        );
        assert_eq!(
            signer.sdk_bounds,
            Some(SdkBounds {
                min_sdk: 28,
                max_sdk: 33
            })
        );
    }

    #[test]
    fn outer_length_off_by_one_is_broken() {
        let block = signature_scheme_block(&[spec_with(1, 1, 10)], false).unwrap();

        let mut longer = block.clone();
        longer.push(0);
        assert!(decode_v2_signers(&longer).unwrap_err().is_broken());

        let mut shorter_prefix = block.clone();
        shorter_prefix[0] -= 1;
        assert!(decode_v2_signers(&shorter_prefix).unwrap_err().is_broken());

        assert!(decode_v2_signers(&block[..3]).unwrap_err().is_broken());
    }

    #[test]
    fn truncated_nested_records_are_broken() {
        let block = signature_scheme_block(&[spec_with(2, 2, 40)], false).unwrap();
        // Chop the public key short, then patch the outer and signer lengths so
        // only the innermost prefix is wrong
        let mut cut = block[..block.len() - 5].to_vec();
        let outer = (cut.len() - 4) as u32;
        cut[..4].copy_from_slice(&outer.to_le_bytes());
        cut[4..8].copy_from_slice(&(outer - 4).to_le_bytes());
        assert!(decode_v2_signers(&cut).unwrap_err().is_broken());
    }

    #[test]
    fn v2_block_read_as_v3_is_broken() {
        // No room for SDK bounds where the attributes prefix should be
        let block = signature_scheme_block(&[spec_with(1, 1, 10)], false).unwrap();
        assert!(decode_v3_signers(&block).is_err());
    }

    #[test]
    fn additional_attributes_are_kept_raw() {
        let spec = SignerSpec {
            additional_attributes: vec![
                (0x1234_5678, b"opaque".to_vec()),
                (crate::signing_block::STRIPPING_PROTECTION_ATTR_ID, 3u32.to_le_bytes().to_vec())
            ],
            ..spec_with(1, 0, 10)
        };
        let block = signature_scheme_block(&[spec], false).unwrap();
        let signed_data = &decode_v2_signers(&block).unwrap()[0].signed_data;

        // Two entries: (4 + 4 + 6) and (4 + 4 + 4)
        assert_eq!(signed_data.additional_attributes.len(), 26);
        assert_eq!(signed_data.stripping_protection(), Some(3));
    }

    #[test]
    fn empty_signer_sequence() {
        let block = signature_scheme_block(&[], false).unwrap();
        assert_eq!(block, vec![0, 0, 0, 0]);
        assert!(decode_v2_signers(&block).unwrap().is_empty());
    }
}
