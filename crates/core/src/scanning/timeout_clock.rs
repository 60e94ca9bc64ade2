/// Accrues time only while the engine keeps reporting `Uncertain`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeoutClock {
    started_at: Option<u64>,
}

impl TimeoutClock {
    /// Starts accruing at `now_ms` unless already running.
    pub fn start_if_idle(&mut self, now_ms: u64) {
        if self.started_at.is_none() {
            self.started_at = Some(now_ms);
        }
    }

    pub fn elapsed(&self, now_ms: u64) -> u64 {
        self.started_at
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0)
    }

    pub fn stop(&mut self) {
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }
}
