//! Pipeline steps and terminal outcomes.

use std::fmt;

use crate::size::SizeEstimate;
use crate::tools::PartitionTableKind;

/// Every stage a run can report on or fail at, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Preflight,
    Inspect,
    Map,
    Check,
    ComputeSize,
    ResizeFilesystem,
    ResizePartition,
    Recheck,
    TruncateImage,
    Unmap,
    Repair,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Preflight => "check host tools",
            Step::Inspect => "inspect image",
            Step::Map => "map partitions",
            Step::Check => "check filesystem",
            Step::ComputeSize => "compute minimum size",
            Step::ResizeFilesystem => "resize filesystem",
            Step::ResizePartition => "resize partition",
            Step::Recheck => "re-check filesystem",
            Step::TruncateImage => "truncate image",
            Step::Unmap => "unmap partitions",
            Step::Repair => "repair partition table",
        })
    }
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The image was within the shrink margin; nothing was modified.
    AlreadyMinimal {
        estimate: SizeEstimate,
        current_mb: u64,
    },
    /// Filesystem and partition were shrunk to `estimate.min_mb`, and the
    /// image to the end of the partition plus any trailing table data.
    Shrunk {
        estimate: SizeEstimate,
        previous_mb: u64,
        /// Final image length in bytes.
        image_bytes: u64,
        table: PartitionTableKind,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::AlreadyMinimal {
                estimate,
                current_mb,
            } => write!(
                f,
                "Image is already minimal ({} MiB, minimum {} MiB). Nothing to do.",
                current_mb, estimate.min_mb
            ),
            Outcome::Shrunk {
                estimate,
                previous_mb,
                image_bytes,
                table,
            } => write!(
                f,
                "Image shrunk from {} MiB to {} bytes ({} MiB filesystem, {} partition table).",
                previous_mb, image_bytes, estimate.min_mb, table
            ),
        }
    }
}
