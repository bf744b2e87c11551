use embassy_time::{Duration, Instant, Ticker};

use super::Coordinator;

/// Drives a coordinator from an async task
///
/// Processing runs on a fixed period. The period bounds the timing resolution of the node,
/// so it should be well below the burst interval.
pub struct Runner<'r, 'a> {
    coordinator: &'r mut Coordinator<'a>,
    period: Duration,
}

impl<'r, 'a> Runner<'r, 'a> {
    pub const DEFAULT_PERIOD: Duration = Duration::from_millis(1);

    pub fn new(coordinator: &'r mut Coordinator<'a>, period: Duration) -> Self {
        Self {
            coordinator,
            period,
        }
    }

    pub async fn run(&mut self) {
        let mut ticker = Ticker::every(self.period);
        loop {
            ticker.next().await;
            self.coordinator.process(Instant::now());
        }
    }
}
