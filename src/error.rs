//! Errors that end a shrink run.

use std::path::PathBuf;

use thiserror::Error;

use crate::shrink::Step;

/// Which object a resize step was acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeTarget {
    Filesystem,
    Partition,
    Image,
}

impl std::fmt::Display for ResizeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResizeTarget::Filesystem => "filesystem",
            ResizeTarget::Partition => "partition",
            ResizeTarget::Image => "image",
        })
    }
}

/// Terminal failure of a shrink run. None of these are retried.
#[derive(Debug, Error)]
pub enum ShrinkError {
    #[error("missing required host tools: {}", .0.join(", "))]
    MissingDependency(Vec<String>),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("partitions of {} are already mapped", .0.display())]
    MappingActive(PathBuf),

    #[error("mapping partitions failed")]
    Mapping(#[source] anyhow::Error),

    #[error("filesystem check failed")]
    FilesystemCheck {
        step: Step,
        #[source]
        source: anyhow::Error,
    },

    #[error("filesystem size query failed")]
    SizeQuery(#[source] anyhow::Error),

    #[error("{target} resize failed")]
    Resize {
        target: ResizeTarget,
        #[source]
        source: anyhow::Error,
    },

    #[error("unmapping partitions failed")]
    Unmap(#[source] anyhow::Error),

    #[error("partition table repair failed")]
    Repair(#[source] anyhow::Error),
}

impl ShrinkError {
    /// Pipeline step the failure belongs to.
    pub fn step(&self) -> Step {
        match self {
            ShrinkError::MissingDependency(_) => Step::Preflight,
            ShrinkError::InvalidInput(_) => Step::Inspect,
            ShrinkError::MappingActive(_) | ShrinkError::Mapping(_) => Step::Map,
            ShrinkError::FilesystemCheck { step, .. } => *step,
            ShrinkError::SizeQuery(_) => Step::ComputeSize,
            ShrinkError::Resize { target, .. } => match target {
                ResizeTarget::Filesystem => Step::ResizeFilesystem,
                ResizeTarget::Partition => Step::ResizePartition,
                ResizeTarget::Image => Step::TruncateImage,
            },
            ShrinkError::Unmap(_) => Step::Unmap,
            ShrinkError::Repair(_) => Step::Repair,
        }
    }

    /// The message followed by every underlying cause, `": "`-separated.
    pub fn chain(&self) -> String {
        let mut msg = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            msg.push_str(": ");
            msg.push_str(&cause.to_string());
            source = cause.source();
        }
        msg
    }

    pub(crate) fn resize(target: ResizeTarget) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| ShrinkError::Resize { target, source }
    }

    pub(crate) fn check(step: Step) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| ShrinkError::FilesystemCheck { step, source }
    }
}
