//! Per-chunk progress accounting: percent, throughput, ETA and log milestones.

use tokio::time::Instant;

use super::constants::BYTES_PER_MIB;

/// Values derived after a chunk has been written.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub downloaded: u64,
    /// `None` while the total size is unknown.
    pub percent: Option<u8>,
    /// MB/s rounded to two decimals, once measurable.
    pub speed: Option<f64>,
    /// Seconds remaining, only with a known size and non-zero speed.
    pub eta: Option<u64>,
    /// Every multiple of ten this chunk crossed for the first time, ascending.
    pub milestones: Vec<u8>,
}

/// Running totals for one transfer.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_size: u64,
    downloaded: u64,
    started: Instant,
    last_milestone: u8,
}

impl ProgressTracker {
    /// Starts tracking a transfer of `total_size` bytes (`0` when unknown).
    #[must_use]
    pub fn new(total_size: u64, started: Instant) -> Self {
        Self {
            total_size,
            downloaded: 0,
            started,
            last_milestone: 0,
        }
    }

    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    /// Accounts for `len` more bytes received at `now`.
    pub fn record_chunk(&mut self, len: usize, now: Instant) -> ProgressSnapshot {
        self.downloaded = self.downloaded.saturating_add(len as u64);

        let percent = (self.total_size > 0).then(|| percent_of(self.downloaded, self.total_size));

        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let bytes_per_sec = if self.downloaded > 0 && elapsed > 0.0 {
            self.downloaded as f64 / elapsed
        } else {
            0.0
        };
        let speed = (bytes_per_sec > 0.0).then(|| round2(bytes_per_sec / BYTES_PER_MIB));

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let eta = (self.total_size > 0 && bytes_per_sec > 0.0).then(|| {
            let remaining = self.total_size.saturating_sub(self.downloaded);
            (remaining as f64 / bytes_per_sec) as u64
        });

        let mut milestones = Vec::new();
        if let Some(p) = percent
            && p / 10 > self.last_milestone
        {
            let decile = p / 10;
            milestones.extend((self.last_milestone + 1..=decile).map(|d| d * 10));
            self.last_milestone = decile;
        }

        ProgressSnapshot {
            downloaded: self.downloaded,
            percent,
            speed,
            eta,
            milestones,
        }
    }
}

/// Floor percentage, clamped to 100 when the declared size was too small.
#[allow(clippy::cast_possible_truncation)]
fn percent_of(downloaded: u64, total: u64) -> u8 {
    let raw = u128::from(downloaded) * 100 / u128::from(total);
    raw.min(100) as u8
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn test_two_mib_in_two_chunks_reports_half_then_full() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(2_097_152, start);

        let first = tracker.record_chunk(MIB, start + Duration::from_secs(1));
        assert_eq!(first.percent, Some(50));
        assert_eq!(first.downloaded, 1_048_576);
        assert_eq!(first.speed, Some(1.0));
        assert_eq!(first.eta, Some(1));
        assert_eq!(first.milestones, vec![50]);

        let second = tracker.record_chunk(MIB, start + Duration::from_secs(2));
        assert_eq!(second.percent, Some(100));
        assert_eq!(second.downloaded, 2_097_152);
        assert_eq!(second.eta, Some(0));
        assert_eq!(second.milestones, vec![100]);
    }

    #[test]
    fn test_unknown_size_reports_no_percent_or_eta() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(0, start);

        let snapshot = tracker.record_chunk(MIB, start + Duration::from_secs(2));
        assert_eq!(snapshot.percent, None);
        assert_eq!(snapshot.eta, None);
        assert!(snapshot.milestones.is_empty());
        assert_eq!(snapshot.speed, Some(0.5));
    }

    #[test]
    fn test_percent_uses_floor_division() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(3, start);
        assert_eq!(tracker.record_chunk(1, start).percent, Some(33));
        assert_eq!(tracker.record_chunk(1, start).percent, Some(66));
    }

    #[test]
    fn test_percent_is_clamped_when_server_under_declares() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(10, start);
        let snapshot = tracker.record_chunk(25, start + Duration::from_secs(1));
        assert_eq!(snapshot.percent, Some(100));
        assert_eq!(snapshot.eta, Some(0));
    }

    #[test]
    fn test_zero_elapsed_time_has_no_speed() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(100, start);
        let snapshot = tracker.record_chunk(10, start);
        assert_eq!(snapshot.speed, None);
        assert_eq!(snapshot.eta, None);
    }

    #[test]
    fn test_milestones_fire_once_per_decile_even_when_skipped() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(100, start);

        assert!(tracker.record_chunk(5, start).milestones.is_empty());
        assert_eq!(tracker.record_chunk(7, start).milestones, vec![10]);
        assert!(tracker.record_chunk(3, start).milestones.is_empty());
        // 15% to 47% in one chunk.
        assert_eq!(tracker.record_chunk(32, start).milestones, vec![20, 30, 40]);
        assert!(tracker.record_chunk(1, start).milestones.is_empty());
    }

    #[test]
    fn test_single_chunk_to_completion_reports_every_decile() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(10, start);
        let snapshot = tracker.record_chunk(10, start);
        assert_eq!(snapshot.milestones, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert!(tracker.record_chunk(5, start).milestones.is_empty());
    }

    #[test]
    fn test_percent_never_decreases() {
        let start = Instant::now();
        let mut tracker = ProgressTracker::new(1000, start);
        let mut last = 0;
        for step in [1, 0, 99, 250, 0, 650] {
            let percent = tracker.record_chunk(step, start).percent.unwrap();
            assert!(percent >= last);
            last = percent;
        }
        assert_eq!(last, 100);
    }
}
