//! Per-process CPU, memory and start-time sampling via `sysinfo`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Share of one core since the previous refresh, in percent.
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    /// Seconds since the epoch.
    pub start_time: u64,
}

/// Tracks one pid across refreshes so CPU usage can be computed between them.
pub struct Sampler {
    system: System,
    pid: Pid,
}

impl Sampler {
    pub fn new(pid: u32) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(pid),
        }
    }

    /// Re-read the process. `None` once it is gone.
    pub fn refresh(&mut self) -> Option<Sample> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        self.system.process(self.pid).map(|process| Sample {
            cpu_percent: process.cpu_usage(),
            memory_bytes: process.memory(),
            start_time: process.start_time(),
        })
    }
}

async fn refreshed(mut sampler: Sampler) -> Option<(Sampler, Sample)> {
    tokio::task::spawn_blocking(move || {
        let sample = sampler.refresh()?;
        Some((sampler, sample))
    })
    .await
    .ok()
    .flatten()
}

/// Sample `pid` twice, `interval` apart. `None` if it disappears in between.
pub async fn sample_over(pid: u32, interval: Duration) -> Option<Sample> {
    let (sampler, _) = refreshed(Sampler::new(pid)).await?;
    tokio::time::sleep(interval).await;
    let (_, sample) = refreshed(sampler).await?;
    Some(sample)
}

/// Time since the process started.
pub async fn uptime(pid: u32) -> Option<Duration> {
    let (_, sample) = refreshed(Sampler::new(pid)).await?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Some(Duration::from_secs(now.saturating_sub(sample.start_time)))
}
