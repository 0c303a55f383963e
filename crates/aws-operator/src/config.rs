//! The operator configuration file.
//!
//! ```yaml
//! installationName: gauss
//! guestUpdateEnabled: true
//! volumeDeletionTimeout: 30s
//! retry:
//!   maxAttempts: 3
//!   initialDelay: 200ms
//!   maxDelay: 5s
//!   multiplier: 2.0
//! versionBundles:
//!   - version: 1.0.0
//!     cloudConfigVersion: 3.2.0
//! ```

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

use crate::retry::RetryPolicy;

pub const DEFAULT_VOLUME_DELETION_TIMEOUT: Duration = Duration::from_secs(30);

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read config file {}", path.display()))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse config file {}", path.display()))]
    ParseYaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },

    #[snafu(display("installationName must not be empty"))]
    EmptyInstallationName,

    #[snafu(display("at least one version bundle must be configured"))]
    NoVersionBundles,

    #[snafu(display("version bundle version {version:?} is not a semantic version"))]
    InvalidVersion {
        source: semver::Error,
        version: String,
    },

    #[snafu(display("version bundle {version} is configured more than once"))]
    DuplicateVersion { version: String },

    #[snafu(display("version bundle {version} has no cloud-config version"))]
    MissingCloudConfigVersion { version: String },

    #[snafu(display("retry multiplier must be a finite number of at least 1, got {multiplier}"))]
    InvalidRetryMultiplier { multiplier: f64 },

    #[snafu(display(
        "retry maxDelay ({}) must not be shorter than initialDelay ({})",
        humantime::format_duration(*max_delay),
        humantime::format_duration(*initial_delay)
    ))]
    RetryDelaysOutOfOrder {
        initial_delay: Duration,
        max_delay: Duration,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    /// Name of this operator installation, recorded as the project of every metric.
    pub installation_name: String,

    /// Whether guest clusters may be updated. Scaling is always allowed.
    #[serde(default)]
    pub guest_update_enabled: bool,

    /// One resource set is registered per version bundle.
    pub version_bundles: Vec<VersionBundle>,

    /// Policy of the retry middleware wrapping every resource.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Time budget for deleting a single EBS volume.
    #[serde(
        default = "default_volume_deletion_timeout",
        with = "crate::duration"
    )]
    pub volume_deletion_timeout: Duration,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionBundle {
    pub version: String,
    pub cloud_config_version: String,
}

fn default_volume_deletion_timeout() -> Duration {
    DEFAULT_VOLUME_DELETION_TIMEOUT
}

impl OperatorConfig {
    /// Reads and validates the config file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        let config: Self = serde_yaml::from_str(&contents).context(ParseYamlSnafu { path })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.installation_name.is_empty(), EmptyInstallationNameSnafu);
        ensure!(!self.version_bundles.is_empty(), NoVersionBundlesSnafu);

        let mut seen = BTreeSet::new();
        for bundle in &self.version_bundles {
            let version =
                semver::Version::parse(&bundle.version).with_context(|_| InvalidVersionSnafu {
                    version: &bundle.version,
                })?;
            ensure!(seen.insert(version), DuplicateVersionSnafu {
                version: &bundle.version,
            });
            ensure!(
                !bundle.cloud_config_version.is_empty(),
                MissingCloudConfigVersionSnafu {
                    version: &bundle.version,
                }
            );
        }

        let retry = &self.retry;
        ensure!(
            retry.multiplier.is_finite() && retry.multiplier >= 1.0,
            InvalidRetryMultiplierSnafu {
                multiplier: retry.multiplier
            }
        );
        ensure!(retry.max_delay >= retry.initial_delay, RetryDelaysOutOfOrderSnafu {
            initial_delay: retry.initial_delay,
            max_delay: retry.max_delay,
        });

        Ok(())
    }

    /// Retry policy bounding the deletion of a single EBS volume.
    pub fn volume_deletion_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_elapsed(self.volume_deletion_timeout)
    }
}
