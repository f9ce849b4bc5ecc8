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

//! Upload acceptance rules.
//!
//! An APK is judged once, in a fixed order:
//!
//!  1. The declared min SDK must not exceed [AcceptancePolicy::max_min_sdk].
//!  2. At least one signing scheme must be understood by every device the
//!     APK installs on. v1 always is, v2 only from API 24 (hence a min SDK of
//!     [AcceptancePolicy::v2_min_sdk]), v3 only from API 28.
//!  3. No certificate of an accepted scheme may be a debug certificate.
//!
//! Certificates are only decoded once the first two rules pass.

use std::fmt;

use apkcheck_common::{ApkCheckError, Result};
use apkcheck_sign::certificate::subject_common_names;
use apkcheck_zip::ByteSource;
use log::{debug, info};

use crate::container::{ApkContainer, SigningScheme};
use crate::manifest::ManifestInfo;

/// Thresholds the rules are checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptancePolicy {
    /// Highest declared min SDK the platform accepts
    pub max_min_sdk: u32,
    /// Lowest min SDK at which a v2 signature alone is enough
    pub v2_min_sdk: u32,
    /// Lowest min SDK at which a v3 signature alone is enough
    pub v3_min_sdk: u32,
    /// Subject common name of the Android SDK's generated debug keys
    pub debug_common_name: String
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        AcceptancePolicy {
            max_min_sdk: 30,
            v2_min_sdk: 25,
            v3_min_sdk: 28,
            debug_common_name: "Android Debug".into()
        }
    }
}

/// Why an APK was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisqualifyingReason {
    /// None of the present signing schemes covers the declared min SDK.
    NoRecognizedScheme { min_sdk: u32 },
    MinSdkTooHigh { min_sdk: u32, max_min_sdk: u32 },
    DebugCertificateDetected
}

impl fmt::Display for DisqualifyingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisqualifyingReason::NoRecognizedScheme { min_sdk } => write!(
                f,
                "No signature scheme usable on API {min_sdk} was detected. \
                 Sign the APK with v1 (JAR signing), or raise the minimum SDK so that \
                 APK Signature Scheme v2 or v3 is enough. For more details on app signing, \
                 visit https://source.android.com/security/apksigning"
            ),
            DisqualifyingReason::MinSdkTooHigh {
                min_sdk,
                max_min_sdk
            } => write!(
                f,
                "Minimum SDK {min_sdk} is not supported, the highest supported is API \
                 {max_min_sdk}. Lower the minimum SDK in your manifest or gradle file."
            ),
            DisqualifyingReason::DebugCertificateDetected => write!(
                f,
                "Apps signed with a debug key are not allowed. Sign the APK with your \
                 release keys and try again."
            )
        }
    }
}

/// Outcome of [AcceptancePolicy::evaluate].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptanceVerdict {
    pub accepted: bool,
    /// Only set when not accepted
    pub reason: Option<DisqualifyingReason>
}

/// Where an evaluation stands. Leaves `Pending` at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptanceState {
    Pending,
    Accepted,
    Rejected(DisqualifyingReason)
}

impl AcceptanceState {
    /// Settles a pending state. An already settled state is returned as-is.
    pub fn settle(self, reason: Option<DisqualifyingReason>) -> AcceptanceState {
        match (self, reason) {
            (AcceptanceState::Pending, None) => AcceptanceState::Accepted,
            (AcceptanceState::Pending, Some(reason)) => AcceptanceState::Rejected(reason),
            (settled, _) => settled
        }
    }

    /// `None` while still pending.
    pub fn verdict(&self) -> Option<AcceptanceVerdict> {
        match self {
            AcceptanceState::Pending => None,
            AcceptanceState::Accepted => Some(AcceptanceVerdict {
                accepted: true,
                reason: None
            }),
            AcceptanceState::Rejected(reason) => Some(AcceptanceVerdict {
                accepted: false,
                reason: Some(reason.clone())
            })
        }
    }

    /// Like [AcceptanceState::verdict], but a pending state is an error.
    pub fn into_verdict(self) -> Result<AcceptanceVerdict> {
        self.verdict().ok_or_else(|| ApkCheckError::broken("evaluation never settled"))
    }
}

impl AcceptancePolicy {
    /// Schemes present in the APK that every device at `min_sdk` and above
    /// understands.
    pub fn accepted_schemes<S: ByteSource>(
        &self,
        apk: &ApkContainer<S>,
        min_sdk: u32
    ) -> Result<Vec<SigningScheme>> {
        Ok(apk
            .signing_schemes_present()?
            .into_iter()
            .filter(|scheme| match scheme {
                SigningScheme::V1 => true,
                SigningScheme::V2 => min_sdk >= self.v2_min_sdk,
                SigningScheme::V3 => min_sdk >= self.v3_min_sdk
            })
            .collect())
    }

    /// Runs the rules against `apk` and the values its manifest declares.
    ///
    /// A structurally broken APK, or a certificate that can't be decoded, is
    /// an error rather than a rejection.
    pub fn evaluate<S: ByteSource>(
        &self,
        apk: &ApkContainer<S>,
        manifest: &dyn ManifestInfo
    ) -> Result<AcceptanceVerdict> {
        let state = AcceptanceState::Pending.settle(self.disqualifying_reason(apk, manifest)?);
        info!("{} version {}: {state:?}", manifest.package_name(), manifest.version_code());
        state.into_verdict()
    }

    fn disqualifying_reason<S: ByteSource>(
        &self,
        apk: &ApkContainer<S>,
        manifest: &dyn ManifestInfo
    ) -> Result<Option<DisqualifyingReason>> {
        let min_sdk = manifest.min_sdk_version();
        if min_sdk > self.max_min_sdk {
            return Ok(Some(DisqualifyingReason::MinSdkTooHigh {
                min_sdk,
                max_min_sdk: self.max_min_sdk
            }));
        }

        let schemes = self.accepted_schemes(apk, min_sdk)?;
        if schemes.is_empty() {
            return Ok(Some(DisqualifyingReason::NoRecognizedScheme { min_sdk }));
        }
        debug!("Schemes covering API {min_sdk}: {schemes:?}");

        for scheme in schemes {
            let certificates = match scheme {
                SigningScheme::V1 => apk.certificates_v1()?,
                SigningScheme::V2 => apk.certificates_v2()?,
                SigningScheme::V3 => apk.certificates_v3()?
            };
            for der in certificates {
                let names = subject_common_names(&der)?;
                if names.iter().any(|name| *name == self.debug_common_name) {
                    return Ok(Some(DisqualifyingReason::DebugCertificateDetected));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_thresholds() {
        let policy = AcceptancePolicy::default();
        assert_eq!(policy.max_min_sdk, 30);
        assert_eq!(policy.v2_min_sdk, 25);
        assert_eq!(policy.v3_min_sdk, 28);
        assert_eq!(policy.debug_common_name, "Android Debug");
    }

    #[test]
    fn state_settles_only_once() {
        let accepted = AcceptanceState::Pending.settle(None);
        assert_eq!(accepted, AcceptanceState::Accepted);
        assert_eq!(
            accepted.settle(Some(DisqualifyingReason::DebugCertificateDetected)),
            AcceptanceState::Accepted
        );

        let rejected =
            AcceptanceState::Pending.settle(Some(DisqualifyingReason::DebugCertificateDetected));
        assert_eq!(rejected.clone().settle(None), rejected);
    }

    #[test]
    fn verdict_reason_only_when_rejected() {
        assert_eq!(AcceptanceState::Pending.verdict(), None);
        assert_eq!(
            AcceptanceState::Accepted.verdict(),
            Some(AcceptanceVerdict {
                accepted: true,
                reason: None
            })
        );
        let verdict = AcceptanceState::Rejected(DisqualifyingReason::NoRecognizedScheme {
            min_sdk: 21
        })
        .verdict()
        .unwrap();
        assert!(!verdict.accepted);
        assert!(verdict.reason.is_some());
    }

    #[test]
    fn pending_state_is_never_accepted() {
        let err = AcceptanceState::Pending.into_verdict().unwrap_err();
        assert!(err.is_broken());

        let verdict = AcceptanceState::Accepted.into_verdict().unwrap();
        assert!(verdict.accepted);
    }

    #[test]
    fn reasons_explain_the_fix() {
        let too_high = DisqualifyingReason::MinSdkTooHigh {
            min_sdk: 35,
            max_min_sdk: 30
        };
        assert!(too_high.to_string().contains("API 30"));
        assert!(DisqualifyingReason::DebugCertificateDetected
            .to_string()
            .contains("release keys"));
    }
}
