use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use super::state::CountdownHandle;

/// One elapsed countdown second, tagged with the countdown it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    pub countdown_id: u64,
}

pub const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

/// Spawn the per-second timer for `handle`. The task only posts ticks; the
/// analysis loop decides what they mean. It exits as soon as the handle is
/// cancelled or the loop stops listening.
pub fn spawn_countdown(
    handle: &CountdownHandle,
    period: Duration,
    tx: UnboundedSender<CountdownTick>,
) -> JoinHandle<()> {
    let countdown_id = handle.id();
    let token = handle.token();

    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if tx.send(CountdownTick { countdown_id }).is_err() {
                        break;
                    }
                }
            }
        }
    })
}
