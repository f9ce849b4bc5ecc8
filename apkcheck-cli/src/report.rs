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

use apkcheck_api::{AcceptancePolicy, ApkContainer, ByteSource, DeclaredManifest, Result, Signer};

/// Prints the signing schemes, signers and verdict. Returns whether the APK
/// was accepted.
pub fn print_report<S: ByteSource>(
    apk: &ApkContainer<S>,
    manifest: &DeclaredManifest,
    policy: &AcceptancePolicy
) -> Result<bool> {
    let schemes = apk.signing_schemes_present()?;
    if schemes.is_empty() {
        println!("Not signed");
    }
    for scheme in &schemes {
        println!("Signed with {scheme}");
    }

    for name in apk.signature_names()? {
        println!("v1 signature file: {name}");
    }
    print_signers("v2", &apk.v2_signers()?);
    print_signers("v3", &apk.v3_signers()?);
    println!("{} distinct certificate(s)", apk.certificates()?.len());

    let verdict = apk.verdict(manifest, policy)?;
    match &verdict.reason {
        None => println!("Accepted for upload"),
        Some(reason) => println!("Rejected: {reason}")
    }
    Ok(verdict.accepted)
}

fn print_signers(scheme: &str, signers: &[Signer]) {
    for (i, signer) in signers.iter().enumerate() {
        println!("{scheme} signer #{}", i + 1);
        println!("{signer}");
    }
}
