//! Command line arguments of the operator.
//!
//! ```no_run
//! use aws_operator::{cli::Command, operator::{self, OperatorDependencies}};
//! use clap::Parser;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dependencies: OperatorDependencies = todo!();
//! match Command::parse() {
//!     Command::Crd => Command::print_crd(std::io::stdout())?,
//!     Command::Run(args) => {
//!         let reconciler = operator::start(&args, dependencies)?;
//!         // Hand every watched AwsCluster to `reconciler.reconcile`
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    ffi::OsStr,
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use kube::CustomResourceExt;
use snafu::{ResultExt, Snafu};

use crate::{
    config::{self, OperatorConfig},
    crd::AwsCluster,
};

/// Searched in order when no config file is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "deploy/config/aws-operator.yaml",
    "/etc/aws-operator/config.yaml",
];

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "failed to locate a required file in any of the following locations: {search_path:?}"
    ))]
    RequiredFileMissing { search_path: Vec<PathBuf> },

    #[snafu(display("failed to load operator config"))]
    LoadConfig { source: config::Error },

    #[snafu(display("failed to serialize CRD"))]
    SerializeCrd { source: serde_yaml::Error },

    #[snafu(display("failed to write CRD"))]
    WriteCrd { source: std::io::Error },
}

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(name = "aws-operator", author, version, about)]
pub enum Command {
    /// Print the AwsCluster CRD.
    Crd,

    /// Run the operator.
    Run(RunArguments),
}

impl Command {
    pub fn print_crd(mut writer: impl Write) -> Result<()> {
        let yaml = serde_yaml::to_string(&AwsCluster::crd()).context(SerializeCrdSnafu)?;
        writer.write_all(yaml.as_bytes()).context(WriteCrdSnafu)
    }
}

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(long_about = "")]
pub struct RunArguments {
    /// Path to the operator config file
    #[arg(
        long,
        short = 'c',
        value_name = "FILE",
        default_value = "",
        env = "AWS_OPERATOR_CONFIG"
    )]
    pub config: ConfigPath,

    /// Overrides whether guest clusters may be updated
    #[arg(long, env = "AWS_OPERATOR_GUEST_UPDATE_ENABLED")]
    pub guest_update_enabled: Option<bool>,
}

impl RunArguments {
    /// Loads the config file, falling back to [`DEFAULT_CONFIG_PATHS`], and applies the
    /// overrides given on the command line.
    pub fn load(&self) -> Result<OperatorConfig> {
        let path = self.config.resolve(DEFAULT_CONFIG_PATHS)?;
        let mut config = OperatorConfig::from_file(path).context(LoadConfigSnafu)?;

        if let Some(enabled) = self.guest_update_enabled {
            config.guest_update_enabled = enabled;
        }

        Ok(config)
    }
}

/// A path to an [`OperatorConfig`] file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigPath {
    path: Option<PathBuf>,
}

impl From<&OsStr> for ConfigPath {
    fn from(s: &OsStr) -> Self {
        Self {
            // clap does not expose whether the flag was given, so the otherwise invalid `""`
            // selects the default search paths.
            path: if s.is_empty() { None } else { Some(s.into()) },
        }
    }
}

impl ConfigPath {
    /// The user provided path if there is one, otherwise the first of `default_paths` that
    /// exists.
    pub fn resolve<'a>(&'a self, default_paths: &'a [impl AsRef<Path> + 'a]) -> Result<&'a Path> {
        let search_paths = match &self.path {
            Some(path) => vec![path.as_path()],
            None => default_paths.iter().map(|path| path.as_ref()).collect(),
        };

        for path in &search_paths {
            if path.exists() {
                return Ok(path);
            }
        }

        RequiredFileMissingSnafu {
            search_path: search_paths
                .into_iter()
                .map(PathBuf::from)
                .collect::<Vec<_>>(),
        }
        .fail()
    }
}
