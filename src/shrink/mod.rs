//! The shrink pipeline.
//!
//! Order matters. The filesystem is shrunk before the partition holding it,
//! and the partition before the image file. GPT keeps a backup header at the
//! old end of the disk, so GPT images get their table repaired once the
//! mapping is gone.
//!
//! ```text
//! inspect → map → check → compute size ─┬─ already minimal ──────────────┐
//!                                       └─ resize fs → resize partition  │
//!                                          → re-check → truncate ────────┤
//!                                          (to partition end)            │
//!                                                                        ▼
//!                                             unmap (on every path once mapped)
//!                                                  → repair (gpt only)
//! ```

mod step;

use std::path::{Path, PathBuf};

use anyhow::anyhow;

pub use step::{Outcome, Step};

use crate::error::{ResizeTarget, ShrinkError};
use crate::report::Reporter;
use crate::session::{ImageHandle, PartitionMapping, Session};
use crate::size::{compute_minimum_size, current_mb, should_shrink};
use crate::tools::DiskTools;

/// Multi-partition images are not supported; the first partition is resized.
pub const PARTITION_INDEX: u32 = 1;

/// Drives one image through the pipeline and owns its partition mapping.
#[derive(Debug)]
pub struct Shrinker<T, R> {
    tools: T,
    reporter: R,
    session: Session,
}

impl<T: DiskTools, R: Reporter> Shrinker<T, R> {
    /// Validate the image at `path` and prepare a session for it.
    ///
    /// Fails with [`ShrinkError::InvalidInput`] for missing files and
    /// non-raw images. Nothing is mapped yet.
    pub fn open(tools: T, mut reporter: R, path: &Path) -> Result<Self, ShrinkError> {
        reporter.step_started(Step::Inspect);
        match ImageHandle::inspect(&tools, path) {
            Ok(image) => {
                if let Some(size) = image.virtual_size {
                    reporter.detail(&format!("{} image, {} MiB", image.format, current_mb(size)));
                }
                reporter.step_succeeded(Step::Inspect);
                Ok(Self::new(tools, reporter, image))
            }
            Err(e) => {
                reporter.step_failed(Step::Inspect, &e);
                reporter.finished(Err(&e));
                Err(e)
            }
        }
    }

    /// Start a session for an already inspected image.
    pub fn new(tools: T, reporter: R, image: ImageHandle) -> Self {
        Self {
            tools,
            reporter,
            session: Session::new(image),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Run the pipeline to completion and report the outcome.
    pub fn run(&mut self) -> Result<Outcome, ShrinkError> {
        let result = self.pipeline();
        self.reporter.finished(result.as_ref());
        result
    }

    fn pipeline(&mut self) -> Result<Outcome, ShrinkError> {
        if let Some(mapping) = &self.session.mapping {
            return Err(ShrinkError::MappingActive(mapping.image.clone()));
        }
        let virtual_size = self.session.image.virtual_size.ok_or_else(|| {
            ShrinkError::InvalidInput(format!(
                "size of {} is stale after truncation, inspect it again",
                self.session.image.path.display()
            ))
        })?;

        let shrunk = match self.step(Step::Map, Self::map) {
            Ok(device) => self.shrink_mapped(&device, virtual_size),
            Err(e) => Err(e),
        };

        // Nothing to tear down when the mapping tool itself failed.
        if self.session.mapping.is_none() {
            return shrunk;
        }

        let unmapped = self.step(Step::Unmap, Self::unmap);
        let outcome = match (shrunk, unmapped) {
            (Ok(outcome), Ok(())) => outcome,
            (Err(e), Ok(())) | (Ok(_), Err(e)) => return Err(e),
            (Err(e), Err(unmap_err)) => {
                self.reporter.warn(&format!(
                    "partitions of {} may still be mapped: {}",
                    self.session.image.path.display(),
                    unmap_err.chain()
                ));
                return Err(e);
            }
        };

        if let Outcome::Shrunk { table, .. } = outcome {
            if table.needs_repair() {
                self.step(Step::Repair, Self::repair)?;
            }
        }

        Ok(outcome)
    }

    /// Everything that happens while the partitions are mapped.
    fn shrink_mapped(&mut self, device: &Path, virtual_size: u64) -> Result<Outcome, ShrinkError> {
        self.step(Step::Check, |s| {
            s.tools
                .check_filesystem(device)
                .map_err(ShrinkError::check(Step::Check))
        })?;

        let estimate = self.step(Step::ComputeSize, |s| {
            let estimate = compute_minimum_size(&s.tools, device)?;
            s.reporter.detail(&format!(
                "minimum {} MiB ({} blocks of {} bytes), image {} MiB, shrink above {:.2} MiB",
                estimate.min_mb,
                estimate.min_blocks,
                estimate.block_size,
                current_mb(virtual_size),
                estimate.allowed_min_mb()
            ));
            Ok(estimate)
        })?;
        self.session.estimate = Some(estimate);

        let previous_mb = current_mb(virtual_size);
        if !should_shrink(&estimate, virtual_size) {
            return Ok(Outcome::AlreadyMinimal {
                estimate,
                current_mb: previous_mb,
            });
        }
        let size_mb = estimate.min_mb;

        self.step(Step::ResizeFilesystem, |s| {
            s.tools
                .resize_filesystem(device, size_mb)
                .map_err(ShrinkError::resize(ResizeTarget::Filesystem))
        })?;

        let partition_end = self.step(Step::ResizePartition, |s| {
            let image = &s.session.image.path;
            let end = s
                .tools
                .resize_partition(image, PARTITION_INDEX, size_mb)
                .map_err(ShrinkError::resize(ResizeTarget::Partition))?;
            let table = s
                .tools
                .partition_table_kind(image)
                .map_err(ShrinkError::resize(ResizeTarget::Partition))?;
            s.session.table = table;
            s.reporter
                .detail(&format!("{} partition table, partition ends at byte {}", table, end));
            Ok(end)
        })?;
        // The partition does not start at byte 0, and GPT needs room for its
        // backup header, so the image keeps everything up to that point.
        let image_bytes = partition_end + self.session.table.trailing_bytes();

        self.step(Step::Recheck, |s| {
            s.tools
                .check_filesystem(device)
                .map_err(ShrinkError::check(Step::Recheck))
        })?;

        self.step(Step::TruncateImage, |s| {
            s.tools
                .truncate_image(&s.session.image.path, image_bytes)
                .map_err(ShrinkError::resize(ResizeTarget::Image))?;
            s.session.image.virtual_size = None;
            Ok(())
        })?;

        Ok(Outcome::Shrunk {
            estimate,
            previous_mb,
            image_bytes,
            table: self.session.table,
        })
    }

    /// Create the mapping. Once the tool succeeds the mapping is recorded,
    /// even when it yields no usable device, so it is always torn down.
    fn map(&mut self) -> Result<PathBuf, ShrinkError> {
        let image = self.session.image.path.clone();
        let devices = self
            .tools
            .map_partitions(&image)
            .map_err(ShrinkError::Mapping)?;

        if devices.len() > 1 {
            tracing::warn!(
                "{} partitions mapped, only partition {} is resized",
                devices.len(),
                PARTITION_INDEX
            );
        }

        let mapping = PartitionMapping::new(image, devices);
        let device = mapping.device().map(Path::to_path_buf);
        self.session.mapping = Some(mapping);

        let device = device
            .ok_or_else(|| ShrinkError::Mapping(anyhow!("no partition devices were mapped")))?;
        self.reporter.detail(&device.display().to_string());
        Ok(device)
    }

    fn unmap(&mut self) -> Result<(), ShrinkError> {
        match self.session.mapping.take() {
            Some(mapping) => self
                .tools
                .unmap_partitions(&mapping.image)
                .map_err(ShrinkError::Unmap),
            None => Ok(()),
        }
    }

    fn repair(&mut self) -> Result<(), ShrinkError> {
        self.tools
            .repair_partition_table(&self.session.image.path)
            .map_err(ShrinkError::Repair)
    }

    /// Run one step, reporting its start and how it ended.
    fn step<U>(
        &mut self,
        step: Step,
        f: impl FnOnce(&mut Self) -> Result<U, ShrinkError>,
    ) -> Result<U, ShrinkError> {
        tracing::debug!("step: {}", step);
        self.reporter.step_started(step);
        let result = f(self);
        match &result {
            Ok(_) => self.reporter.step_succeeded(step),
            Err(e) => self.reporter.step_failed(step, e),
        }
        result
    }
}
