use embassy_time::{Duration, Ticker};

use crate::status;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

#[embassy_executor::task]
pub async fn run() -> ! {
    let mut ticker = Ticker::every(HEARTBEAT_PERIOD);
    loop {
        ticker.next().await;
        let snapshot = status::snapshot();
        defmt::info!(
            "status: state={} drive={} transitions={} trains={} ignored={} foreign={} stale={}",
            snapshot.state.name(),
            if snapshot.drive.is_high() { "high" } else { "low" },
            snapshot.transitions,
            snapshot.trains,
            snapshot.ignored_edges,
            snapshot.foreign_edges,
            snapshot.stale_expiries
        );
    }
}
