//! Shared test utilities for imgshrink tests.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use imgshrink::error::ShrinkError;
use imgshrink::report::Reporter;
use imgshrink::size::MIB;
use imgshrink::tools::{DiskTools, FsStats, ImageInfo, PartitionTableKind};
use imgshrink::{Outcome, Step};
use tempfile::TempDir;

/// Operations the fake adapter can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    ImageInfo,
    Map,
    Unmap,
    Check,
    Stats,
    ResizeFilesystem,
    ResizePartition,
    TableKind,
    Truncate,
    Repair,
}

/// One recorded adapter call. `size` is the MiB argument of the resize
/// operations and the byte length given to truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub size: Option<u64>,
}

/// In-memory [`DiskTools`] that records calls and simulates sizes.
#[derive(Debug)]
pub struct FakeTools {
    pub format: String,
    pub virtual_size: Cell<u64>,
    pub min_blocks: u64,
    pub block_size: u64,
    pub table: PartitionTableKind,
    pub devices: Vec<PathBuf>,
    /// Byte offset of the first partition.
    pub partition_start: u64,
    pub filesystem_mb: Cell<Option<u64>>,
    pub partition_mb: Cell<Option<u64>>,
    /// Byte offset just past the resized partition.
    pub partition_end: Cell<Option<u64>>,
    /// Fail the n-th (1-based) call of these operations.
    failures: Vec<(Op, usize)>,
    calls: RefCell<Vec<Call>>,
}

impl FakeTools {
    /// A raw MBR image of `image_mb` whose filesystem needs `min_mb`.
    pub fn new(image_mb: u64, min_mb: u64) -> Self {
        Self {
            format: "raw".to_string(),
            virtual_size: Cell::new(image_mb * MIB),
            min_blocks: min_mb * 256,
            block_size: 4096,
            table: PartitionTableKind::Mbr,
            devices: vec![PathBuf::from("/dev/mapper/loop0p1")],
            partition_start: MIB,
            filesystem_mb: Cell::new(None),
            partition_mb: Cell::new(None),
            partition_end: Cell::new(None),
            failures: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_table(mut self, table: PartitionTableKind) -> Self {
        self.table = table;
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = format.to_string();
        self
    }

    pub fn with_devices(mut self, devices: Vec<PathBuf>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_partition_start(mut self, start: u64) -> Self {
        self.partition_start = start;
        self
    }

    pub fn failing(self, op: Op) -> Self {
        self.failing_nth(op, 1)
    }

    pub fn failing_nth(mut self, op: Op, nth: usize) -> Self {
        self.failures.push((op, nth));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls.borrow().iter().filter(|c| c.op == op).count()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls.borrow().iter().map(|c| c.op).collect()
    }

    pub fn sizes(&self, op: Op) -> Vec<u64> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.op == op)
            .filter_map(|c| c.size)
            .collect()
    }

    /// Number of calls that modify the image.
    pub fn mutations(&self) -> usize {
        [
            Op::ResizeFilesystem,
            Op::ResizePartition,
            Op::Truncate,
            Op::Repair,
        ]
        .into_iter()
        .map(|op| self.count(op))
        .sum()
    }

    fn record(&self, op: Op, size: Option<u64>) -> Result<()> {
        self.calls.borrow_mut().push(Call { op, size });
        let count = self.count(op);
        if self.failures.contains(&(op, count)) {
            bail!("simulated {:?} failure", op);
        }
        Ok(())
    }
}

impl DiskTools for FakeTools {
    fn image_info(&self, _image: &Path) -> Result<ImageInfo> {
        self.record(Op::ImageInfo, None)?;
        Ok(ImageInfo {
            format: self.format.clone(),
            virtual_size: self.virtual_size.get(),
        })
    }

    fn map_partitions(&self, _image: &Path) -> Result<Vec<PathBuf>> {
        self.record(Op::Map, None)?;
        Ok(self.devices.clone())
    }

    fn unmap_partitions(&self, _image: &Path) -> Result<()> {
        self.record(Op::Unmap, None)
    }

    fn check_filesystem(&self, _device: &Path) -> Result<()> {
        self.record(Op::Check, None)
    }

    fn filesystem_stats(&self, _device: &Path) -> Result<FsStats> {
        self.record(Op::Stats, None)?;
        Ok(FsStats {
            min_blocks: self.min_blocks,
            block_size: self.block_size,
            block_count: None,
            free_blocks: None,
        })
    }

    fn resize_filesystem(&self, _device: &Path, size_mb: u64) -> Result<()> {
        self.record(Op::ResizeFilesystem, Some(size_mb))?;
        self.filesystem_mb.set(Some(size_mb));
        Ok(())
    }

    fn resize_partition(&self, _image: &Path, index: u32, size_mb: u64) -> Result<u64> {
        assert_eq!(index, 1, "only the first partition is resized");
        self.record(Op::ResizePartition, Some(size_mb))?;
        let end = self.partition_start + size_mb * MIB;
        self.partition_mb.set(Some(size_mb));
        self.partition_end.set(Some(end));
        Ok(end)
    }

    fn partition_table_kind(&self, _image: &Path) -> Result<PartitionTableKind> {
        self.record(Op::TableKind, None)?;
        Ok(self.table)
    }

    fn truncate_image(&self, _image: &Path, size: u64) -> Result<()> {
        self.record(Op::Truncate, Some(size))?;
        if size < self.virtual_size.get() {
            self.virtual_size.set(size);
        }
        Ok(())
    }

    fn repair_partition_table(&self, _image: &Path) -> Result<()> {
        self.record(Op::Repair, None)
    }
}

/// A reporter notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(Step),
    Succeeded(Step),
    Failed(Step),
    Detail(String),
    Warn(String),
    Finished(Result<Outcome, Step>),
}

/// Reporter that keeps every notification.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<Event>,
}

impl RecordingReporter {
    pub fn failed_steps(&self) -> Vec<Step> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Failed(step) => Some(*step),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Warn(_)))
            .count()
    }
}

impl Reporter for RecordingReporter {
    fn step_started(&mut self, step: Step) {
        self.events.push(Event::Started(step));
    }

    fn step_succeeded(&mut self, step: Step) {
        self.events.push(Event::Succeeded(step));
    }

    fn step_failed(&mut self, step: Step, _error: &ShrinkError) {
        self.events.push(Event::Failed(step));
    }

    fn detail(&mut self, message: &str) {
        self.events.push(Event::Detail(message.to_string()));
    }

    fn warn(&mut self, message: &str) {
        self.events.push(Event::Warn(message.to_string()));
    }

    fn finished(&mut self, result: Result<&Outcome, &ShrinkError>) {
        self.events
            .push(Event::Finished(result.map(|o| *o).map_err(|e| e.step())));
    }
}

/// Temporary directory holding an (empty, sparse) image file.
pub struct TestImage {
    /// Kept alive for the lifetime of the image
    pub _temp_dir: TempDir,
    pub path: PathBuf,
}

impl TestImage {
    pub fn new() -> Self {
        Self::with_size(MIB)
    }

    pub fn with_size(bytes: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("disk.raw");
        fs::File::create(&path)
            .expect("Failed to create image")
            .set_len(bytes)
            .expect("Failed to size image");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }
}

/// Write an executable `/bin/sh` script standing in for a host tool.
///
/// Returns the path to put into the tool's `IMGSHRINK_*` override.
pub fn fake_program(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    let mut perms = fs::metadata(&path).expect("Failed to stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("Failed to make script executable");
    path.to_string_lossy().into_owned()
}
