//! The flat vocabulary of conditions the engine and its resources report.
//!
//! Every error carries an [`ErrorKind`]. Callers branch on [`Error::kind`] to decide whether a
//! condition is a genuine failure or an expected transient state, e.g. a stack that is still
//! being created.

use snafu::Snafu;
use strum::EnumDiscriminants;

use crate::cloud::CloudError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error returned by collaborators whose failure modes the engine does not inspect.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Snafu, EnumDiscriminants)]
#[strum_discriminants(
    name(ErrorKind),
    derive(Hash, strum::IntoStaticStr, strum::Display)
)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Misconfiguration detected while constructing the engine.
    #[snafu(display("invalid config: {reason}"))]
    InvalidConfig { reason: String },

    /// No resource set claims the version bundle version of an object.
    #[snafu(display("no resource set handles version bundle version {version:?}"))]
    InvalidVersion { version: String },

    #[snafu(display("{what} not found"))]
    NotFound { what: String },

    /// A best-effort deletion left resources behind. The next attempt starts over.
    #[snafu(display("deletion of {what} must be retried"))]
    DeletionMustBeRetried { what: String },

    #[snafu(display("stack {stack_name:?} not found"))]
    StackNotFound { stack_name: String },

    #[snafu(display("outputs of stack {stack_name:?} are not accessible in status {status}"))]
    OutputsNotAccessible { stack_name: String, status: String },

    #[snafu(display("failed to render template for stack {stack_name:?}"))]
    RenderTemplate {
        stack_name: String,
        source: BoxedError,
    },

    /// A cloud API call failed.
    #[snafu(display("failed to {action}"))]
    ExecutionFailed { action: String, source: CloudError },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from(self)
    }

    /// `PascalCase`d name of the error kind, suitable as a log field or event reason.
    pub fn category(&self) -> &'static str {
        self.kind().into()
    }
}
