//! Minimum size computation and the shrink-worthiness gate.

use std::path::Path;

use anyhow::anyhow;

use crate::error::ShrinkError;
use crate::tools::DiskTools;

/// One mebibyte. All sizes handed to the tools are in these units.
pub const MIB: u64 = 1024 * 1024;

/// Tolerance above the minimum within which an image counts as already minimal.
pub const SHRINK_MARGIN_PERCENT: u64 = 1;

/// Computed minimum filesystem size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEstimate {
    pub min_blocks: u64,
    pub block_size: u64,
    /// `ceil(min_blocks * block_size / MIB)`, always > 0.
    pub min_mb: u64,
}

impl SizeEstimate {
    /// Derive the estimate from a block count and block size.
    pub fn from_blocks(min_blocks: u64, block_size: u64) -> Result<Self, ShrinkError> {
        if min_blocks == 0 || block_size == 0 {
            return Err(ShrinkError::SizeQuery(anyhow!(
                "filesystem reported {} blocks of {} bytes",
                min_blocks,
                block_size
            )));
        }
        let bytes = min_blocks.checked_mul(block_size).ok_or_else(|| {
            ShrinkError::SizeQuery(anyhow!(
                "{} blocks of {} bytes overflows",
                min_blocks,
                block_size
            ))
        })?;

        Ok(Self {
            min_blocks,
            block_size,
            min_mb: bytes.div_ceil(MIB),
        })
    }

    /// Margin-adjusted threshold, `min_mb + min_mb * margin / 100`. Display only.
    pub fn allowed_min_mb(&self) -> f64 {
        self.min_mb as f64 * (100 + SHRINK_MARGIN_PERCENT) as f64 / 100.0
    }
}

/// Query the mapped filesystem and round its minimum size up to whole MiB.
pub fn compute_minimum_size<T>(tools: &T, device: &Path) -> Result<SizeEstimate, ShrinkError>
where
    T: DiskTools + ?Sized,
{
    let stats = tools
        .filesystem_stats(device)
        .map_err(ShrinkError::SizeQuery)?;
    tracing::debug!(
        "filesystem on {}: min_blocks={} block_size={} block_count={:?} free_blocks={:?}",
        device.display(),
        stats.min_blocks,
        stats.block_size,
        stats.block_count,
        stats.free_blocks
    );
    SizeEstimate::from_blocks(stats.min_blocks, stats.block_size)
}

/// Whole MiB of an image's virtual size (floor).
pub fn current_mb(virtual_size: u64) -> u64 {
    virtual_size / MIB
}

/// True iff the image is strictly larger than the margin-adjusted minimum.
///
/// Evaluated as `current_mb * 100 > min_mb * (100 + margin)` in integers,
/// so an image exactly at the threshold is left alone.
pub fn should_shrink(estimate: &SizeEstimate, virtual_size: u64) -> bool {
    let current = u128::from(current_mb(virtual_size)) * 100;
    let allowed = u128::from(estimate.min_mb) * u128::from(100 + SHRINK_MARGIN_PERCENT);
    current > allowed
}
