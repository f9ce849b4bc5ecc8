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

use std::env;
use std::process::ExitCode;

use apkcheck_api::{AcceptancePolicy, ApkCheckError, ApkContainer, DeclaredManifest, Result};
use log::error;

pub mod report;

/// Prints how an APK is signed and whether it may be uploaded.
///
/// ```
/// $ apkcheck ./app-release.apk 26
/// $ apkcheck ./app-release.apk 26 com.example.app 7
/// ```
///
/// The second argument is the `minSdkVersion` declared in the APK's manifest.
/// Set `RUST_LOG=debug` to see how the signing block was parsed.
fn main() -> Result<ExitCode> {
    env_logger::init();

    let apk_path = env::args()
        .nth(1)
        .ok_or(ApkCheckError::Cli("APK path not provided".into()))?;
    let min_sdk = env::args()
        .nth(2)
        .ok_or(ApkCheckError::Cli("Minimum SDK version not provided".into()))?
        .parse::<u32>()
        .map_err(|_e| ApkCheckError::Cli("Minimum SDK version must be a number".into()))?;
    let package_name = env::args().nth(3).unwrap_or_else(|| "(unknown package)".into());
    let version_code = env::args()
        .nth(4)
        .map_or(Ok(0), |code| code.parse::<u32>())
        .map_err(|_e| ApkCheckError::Cli("Version code must be a number".into()))?;

    let apk = match ApkContainer::from_path(&apk_path) {
        Ok(apk) => apk,
        Err(e) => {
            error!("{apk_path}: {e:?}");
            eprintln!("{apk_path}: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let manifest = DeclaredManifest::new(package_name, min_sdk, version_code);
    match report::print_report(&apk, &manifest, &AcceptancePolicy::default()) {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(e) => {
            error!("{apk_path}: {e:?}");
            eprintln!("{apk_path}: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
