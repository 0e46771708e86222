//! The interface every backend implementation exposes.

use std::str::FromStr;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::job::BuildBatch;

/// Operation a backend is asked to perform on a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Generate code for every job.
    Build,
    /// Check that every job could be built, without writing output.
    Check,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Build => "build",
            Operation::Check => "check",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(Operation::Build),
            "check" => Ok(Operation::Check),
            other => Err(format!("unknown operation '{other}', expected build or check")),
        }
    }
}

/// A backend implementation.
///
/// In-process backends implement this directly; the worker crate provides
/// implementations that forward a batch to an isolated worker.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Generate code for every job in the batch.
    async fn build(&self, batch: &BuildBatch) -> Result<(), ApiError>;

    /// Validate the batch without generating output.
    async fn check(&self, batch: &BuildBatch) -> Result<(), ApiError>;

    /// Run `op` on the batch.
    async fn invoke(&self, op: Operation, batch: &BuildBatch) -> Result<(), ApiError> {
        match op {
            Operation::Build => self.build(batch).await,
            Operation::Check => self.check(batch).await,
        }
    }
}
