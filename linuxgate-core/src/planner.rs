//! Two-phase shrink planning.
//!
//! Phase one frees exactly the staging partition's size; after the staging
//! partition exists the volume is queried again and shrunk a second time for
//! the Linux target, keeping a safety margin on Windows.

use crate::diskpart::PartitionBuilder;
use crate::parser;
use crate::settings::DiskSettings;
use linuxgate_error::{InstallError, InstallResult};
use linuxgate_hal::ProcessOps;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShrinkPolicy {
    pub staging_size_mb: f64,
    pub min_target_mb: f64,
    pub safety_margin_mb: f64,
    pub phase2_min_remaining_mb: f64,
}

impl Default for ShrinkPolicy {
    fn default() -> Self {
        Self::from_settings(&DiskSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase2Plan {
    /// Too little left to be worth a second shrink.
    Skip { remaining_mb: f64 },
    Shrink {
        amount_mb: f64,
        /// The request could not be met in full.
        short_of_request: bool,
    },
}

impl ShrinkPolicy {
    pub fn from_settings(disk: &DiskSettings) -> Self {
        Self {
            staging_size_mb: disk.staging_size_mb as f64,
            min_target_mb: disk.min_linux_size_mb as f64,
            safety_margin_mb: disk.safety_margin_mb as f64,
            phase2_min_remaining_mb: disk.phase2_min_remaining_mb as f64,
        }
    }

    /// Smallest reclaimable amount that lets the install proceed.
    pub fn floor_mb(&self) -> f64 {
        self.staging_size_mb + self.min_target_mb
    }

    pub fn check_floor(&self, available_mb: f64) -> InstallResult<()> {
        if available_mb < self.floor_mb() {
            return Err(InstallError::InsufficientSpace {
                available_mb,
                required_mb: self.floor_mb(),
            });
        }
        Ok(())
    }

    pub fn phase1_amount(&self) -> f64 {
        self.staging_size_mb
    }

    pub fn phase2(&self, remaining_mb: f64, requested_gb: f64) -> Phase2Plan {
        if remaining_mb <= self.phase2_min_remaining_mb {
            return Phase2Plan::Skip { remaining_mb };
        }
        let requested_mb = requested_gb * 1024.0;
        let usable = remaining_mb - self.safety_margin_mb;
        let amount_mb = usable.min(requested_mb).floor();
        if amount_mb <= 0.0 {
            return Phase2Plan::Skip { remaining_mb };
        }
        Phase2Plan::Shrink {
            amount_mb,
            short_of_request: amount_mb < requested_mb.floor(),
        }
    }
}

pub struct ShrinkPlanner<'a, 'b, H: ProcessOps + ?Sized> {
    builder: &'b PartitionBuilder<'a, H>,
    policy: ShrinkPolicy,
}

impl<'a, 'b, H: ProcessOps + ?Sized> ShrinkPlanner<'a, 'b, H> {
    pub fn new(builder: &'b PartitionBuilder<'a, H>, policy: ShrinkPolicy) -> Self {
        Self { builder, policy }
    }

    pub fn policy(&self) -> &ShrinkPolicy {
        &self.policy
    }

    /// Current maximum reclaimable space of `volume` in MB; 0 when diskpart gave no number.
    pub fn query_max_reclaimable(&self, volume: char) -> InstallResult<f64> {
        let raw = self.builder.query_max(volume)?;
        let mb = parser::parse_reclaimable_mb(&raw);
        log::info!("volume {} reclaimable: {:.0} MB", volume, mb);
        if mb == 0.0 {
            log::warn!("no reclaimable size in querymax output: {}", raw.trim());
        }
        Ok(mb)
    }

    /// Query and enforce the floor before anything destructive runs.
    pub fn validate_space(&self, volume: char) -> InstallResult<f64> {
        let available = self.query_max_reclaimable(volume)?;
        self.policy.check_floor(available)?;
        Ok(available)
    }
}
