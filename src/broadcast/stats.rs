use std::time::Instant;

/// Frames between periodic throughput log lines
pub const STATS_LOG_INTERVAL: u64 = 100;

/// Statistics for frame broadcasting
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub frames_published: u64,
    pub frames_skipped: u64,
    pub bytes_published: u64,
    pub encode_errors: u64,
    pub publish_errors: u64,
    pub started_at: Option<Instant>,
    pub last_frame_time: Option<Instant>,
}

impl BroadcastStats {
    pub fn mark_started(&mut self) {
        *self = Self {
            started_at: Some(Instant::now()),
            ..Self::default()
        };
    }

    pub fn update_frame_stats(&mut self, frame_size: usize) {
        self.frames_published += 1;
        self.bytes_published += frame_size as u64;
        self.last_frame_time = Some(Instant::now());
    }

    pub fn record_skipped_frame(&mut self) {
        self.frames_skipped += 1;
    }

    pub fn record_encode_error(&mut self) {
        self.encode_errors += 1;
    }

    pub fn record_publish_error(&mut self) {
        self.publish_errors += 1;
    }

    /// Whether the latest published frame completes a logging interval
    pub fn should_log(&self) -> bool {
        self.frames_published > 0 && self.frames_published % STATS_LOG_INTERVAL == 0
    }

    /// Published frames per second since the session started
    pub fn average_fps(&self) -> f64 {
        match self.started_at {
            Some(started) => {
                let elapsed = started.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    self.frames_published as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    pub fn average_frame_size(&self) -> u64 {
        if self.frames_published > 0 {
            self.bytes_published / self.frames_published
        } else {
            0
        }
    }

    pub fn efficiency(&self) -> f64 {
        let total = self.frames_published + self.frames_skipped;
        if total > 0 {
            self.frames_published as f64 / total as f64
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accounting() {
        let mut stats = BroadcastStats::default();
        stats.mark_started();

        stats.update_frame_stats(1000);
        stats.update_frame_stats(3000);
        stats.record_skipped_frame();
        stats.record_skipped_frame();

        assert_eq!(stats.frames_published, 2);
        assert_eq!(stats.bytes_published, 4000);
        assert_eq!(stats.average_frame_size(), 2000);
        assert_eq!(stats.efficiency(), 0.5);
    }

    #[test]
    fn test_log_interval() {
        let mut stats = BroadcastStats::default();
        assert!(!stats.should_log());

        for _ in 0..STATS_LOG_INTERVAL - 1 {
            stats.update_frame_stats(10);
        }
        assert!(!stats.should_log());

        stats.update_frame_stats(10);
        assert!(stats.should_log());
    }

    #[test]
    fn test_mark_started_resets_counters() {
        let mut stats = BroadcastStats::default();
        stats.update_frame_stats(10);
        stats.record_encode_error();

        stats.mark_started();
        assert_eq!(stats.frames_published, 0);
        assert_eq!(stats.encode_errors, 0);
        assert!(stats.started_at.is_some());
    }
}
