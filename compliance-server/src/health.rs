use serde::Serialize;
use std::time::Instant;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::query::{latest_per_machine, MachineFilters};
use crate::store::ReportStore;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub started_at: String,
    pub reports_stored: usize,
    pub machines_tracked: usize,
    pub storage: String,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    started_at: OffsetDateTime,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            started_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn get_health(&self, store: &ReportStore) -> KernelHealth {
        let (reports, machines) = store.with_reports(|reports| {
            (reports.len(), latest_per_machine(reports, &MachineFilters::default()).len())
        });

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            started_at: self.started_at.format(&Rfc3339).unwrap_or_default(),
            reports_stored: reports,
            machines_tracked: machines,
            storage: store.describe(),
        }
    }
}
