//! Pre-flight check of the disk layout the pipeline assumes.
//!
//! The pipeline is written for a stock Windows install: a small EFI system
//! partition first, the Windows partition, and a recovery partition last.
//! Anything else is reported as a warning that the user must acknowledge
//! before the pipeline will run.

use linuxgate_core::diskpart::PartitionBuilder;
use linuxgate_core::parser::{self, PartitionRecord};
use linuxgate_core::settings::Settings;
use linuxgate_core::sink::LogOnly;
use linuxgate_hal::ProcessOps;
use std::fmt;
use std::ops::RangeInclusive;

/// Expected size of the first (EFI system) partition.
pub const FIRST_PARTITION_MB: RangeInclusive<f64> = 40.0..=150.0;
/// Expected size of the last (recovery) partition.
pub const LAST_PARTITION_MB: RangeInclusive<f64> = 400.0..=700.0;

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutWarning {
    PartitionCount { expected: usize, found: usize },
    FirstPartitionSize { size_mb: f64 },
    LastPartitionSize { size_mb: f64 },
    Geometry(String),
    /// Partitions could not be listed at all.
    CheckFailed(String),
}

impl fmt::Display for LayoutWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutWarning::PartitionCount { expected, found } => write!(
                f,
                "expected {} partitions on the system disk, found {}",
                expected, found
            ),
            LayoutWarning::FirstPartitionSize { size_mb } => write!(
                f,
                "first partition is {:.0} MB, expected {:.0}-{:.0} MB (EFI system partition)",
                size_mb,
                FIRST_PARTITION_MB.start(),
                FIRST_PARTITION_MB.end()
            ),
            LayoutWarning::LastPartitionSize { size_mb } => write!(
                f,
                "last partition is {:.0} MB, expected {:.0}-{:.0} MB (recovery partition)",
                size_mb,
                LAST_PARTITION_MB.start(),
                LAST_PARTITION_MB.end()
            ),
            LayoutWarning::Geometry(detail) => write!(f, "{}", detail),
            LayoutWarning::CheckFailed(detail) => {
                write!(f, "could not read the partition layout: {}", detail)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LayoutReport {
    pub partitions: Vec<PartitionRecord>,
    pub warnings: Vec<LayoutWarning>,
}

impl LayoutReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Inspect a partition snapshot against the stock layout.
pub fn assess_layout(partitions: Vec<PartitionRecord>, expected_count: usize) -> LayoutReport {
    let mut warnings = Vec::new();
    if partitions.len() != expected_count {
        warnings.push(LayoutWarning::PartitionCount {
            expected: expected_count,
            found: partitions.len(),
        });
    }
    if let Some(first) = partitions.first() {
        if !FIRST_PARTITION_MB.contains(&first.size_mb) {
            warnings.push(LayoutWarning::FirstPartitionSize {
                size_mb: first.size_mb,
            });
        }
    }
    if let Some(last) = partitions.last().filter(|_| partitions.len() > 1) {
        if !LAST_PARTITION_MB.contains(&last.size_mb) {
            warnings.push(LayoutWarning::LastPartitionSize {
                size_mb: last.size_mb,
            });
        }
    }
    warnings.extend(
        parser::check_geometry(&partitions, None)
            .into_iter()
            .map(LayoutWarning::Geometry),
    );
    LayoutReport {
        partitions,
        warnings,
    }
}

pub struct PartitionLayoutValidator<'a, H: ProcessOps + ?Sized> {
    hal: &'a H,
    settings: &'a Settings,
}

impl<'a, H: ProcessOps + ?Sized> PartitionLayoutValidator<'a, H> {
    pub fn new(hal: &'a H, settings: &'a Settings) -> Self {
        Self { hal, settings }
    }

    /// List the system disk's partitions and report deviations. Never fails:
    /// a layout that cannot be read is itself a warning.
    pub fn validate(&self) -> LayoutReport {
        log::info!("🔍 Checking partition layout");
        let builder = PartitionBuilder::new(self.hal, self.settings, &LogOnly);
        let report = match builder.list_partitions() {
            Ok(partitions) => {
                for p in &partitions {
                    log::info!(
                        "  partition {} {:<8} offset {:>9.0} MB size {:>9.0} MB",
                        p.index,
                        p.kind.as_str(),
                        p.offset_mb,
                        p.size_mb
                    );
                }
                assess_layout(partitions, self.settings.disk.expected_partition_count)
            }
            Err(err) => LayoutReport {
                partitions: Vec::new(),
                warnings: vec![LayoutWarning::CheckFailed(err.to_string())],
            },
        };
        for warning in &report.warnings {
            log::warn!("layout: {}", warning);
        }
        report
    }
}

/// A layout report plus the user's answer to its warnings.
#[derive(Debug, Clone, Default)]
pub struct LayoutGate {
    report: LayoutReport,
    acknowledged: bool,
}

impl LayoutGate {
    pub fn new(report: LayoutReport) -> Self {
        Self {
            report,
            acknowledged: false,
        }
    }

    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    pub fn acknowledged(mut self, yes: bool) -> Self {
        self.acknowledged = yes;
        self
    }

    pub fn report(&self) -> &LayoutReport {
        &self.report
    }

    pub fn can_proceed(&self) -> bool {
        self.report.is_clean() || self.acknowledged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linuxgate_hal::{FakeHal, FakeResponse};

    const STOCK: &str = "\
  Partition ###  Type              Size     Offset
  -------------  ----------------  -------  -------
  Partition 1    System             100 MB  1024 KB
  Partition 2    Primary            237 GB   101 MB
  Partition 3    Recovery           529 MB   237 GB
";

    const WITH_OEM: &str = "\
  Partition ###  Type              Size     Offset
  -------------  ----------------  -------  -------
  Partition 1    System             260 MB  1024 KB
  Partition 2    Reserved            16 MB   261 MB
  Partition 3    Primary            237 GB   277 MB
  Partition 4    Recovery           990 MB   237 GB
";

    fn settings(dir: &std::path::Path) -> Settings {
        let mut s = Settings::default();
        s.paths.temp_dir = Some(dir.to_path_buf());
        s
    }

    #[test]
    fn stock_layout_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let hal = FakeHal::new();
        hal.respond("list partition", FakeResponse::ok(STOCK));

        let report = PartitionLayoutValidator::new(&hal, &settings).validate();

        assert_eq!(report.partitions.len(), 3);
        assert!(report.is_clean(), "{:?}", report.warnings);
        assert!(LayoutGate::new(report).can_proceed());
    }

    #[test]
    fn four_partitions_need_acknowledgement() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let hal = FakeHal::new();
        hal.respond("list partition", FakeResponse::ok(WITH_OEM));

        let report = PartitionLayoutValidator::new(&hal, &settings).validate();

        assert!(report.warnings.contains(&LayoutWarning::PartitionCount {
            expected: 3,
            found: 4
        }));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, LayoutWarning::FirstPartitionSize { .. })));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, LayoutWarning::LastPartitionSize { .. })));

        let mut gate = LayoutGate::new(report);
        assert!(!gate.can_proceed());
        gate.acknowledge();
        assert!(gate.can_proceed());
    }

    #[test]
    fn unreadable_layout_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let hal = FakeHal::new();
        hal.respond(
            "list partition",
            FakeResponse::failed(2, "Virtual Disk Service error: access denied"),
        );

        let report = PartitionLayoutValidator::new(&hal, &settings).validate();

        assert!(report.partitions.is_empty());
        assert!(matches!(report.warnings[0], LayoutWarning::CheckFailed(_)));
        assert!(!LayoutGate::new(report).acknowledged(false).can_proceed());
    }

    #[test]
    fn overlapping_rows_are_reported() {
        let records = vec![
            PartitionRecord {
                index: 1,
                kind: parser::PartitionKind::System,
                offset_mb: 1.0,
                size_mb: 100.0,
            },
            PartitionRecord {
                index: 2,
                kind: parser::PartitionKind::Data,
                offset_mb: 101.0,
                size_mb: 60_000.0,
            },
            PartitionRecord {
                index: 3,
                kind: parser::PartitionKind::Recovery,
                offset_mb: 50_000.0,
                size_mb: 529.0,
            },
        ];
        let report = assess_layout(records, 3);
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(report.warnings[0], LayoutWarning::Geometry(_)));
    }
}
