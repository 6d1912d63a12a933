use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::assistant::AssistantCommand;
use crate::capture::CountdownTick;

use super::guidance::GuidanceCore;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Run one step against the core. A panic is logged and the core is put
/// back in `Idle`; the session keeps running and can still be torn down.
fn guarded(core: &mut GuidanceCore, step: &str, f: impl FnOnce(&mut GuidanceCore)) {
    if panic::catch_unwind(AssertUnwindSafe(|| f(&mut *core))).is_err() {
        log_error!("analysis loop: {step} panicked, resetting capture state");
        if panic::catch_unwind(AssertUnwindSafe(|| core.recover())).is_err() {
            log_error!("analysis loop: recovery after {step} panicked");
        }
    }
}

/// Drives a guidance session until `cancel_token` fires, then hands the core
/// back so the caller can tear it down.
///
/// Cancellation is checked first on every wake-up, so no tick, countdown
/// step or command is processed once shutdown has begun.
pub(crate) async fn analysis_loop(
    mut core: GuidanceCore,
    mut commands: UnboundedReceiver<AssistantCommand>,
    mut countdown: UnboundedReceiver<CountdownTick>,
    cancel_token: CancellationToken,
) -> GuidanceCore {
    let mut ticker = tokio::time::interval(core.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut commands_open = true;

    log_info!(
        "analysis loop started ({}ms cadence, degraded={})",
        core.tick_interval().as_millis(),
        core.is_degraded()
    );

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                log_info!("analysis loop shutting down");
                break;
            }
            Some(tick) = countdown.recv() => {
                guarded(&mut core, "countdown tick", |core| {
                    core.on_countdown_tick(tick, Instant::now())
                });
            }
            command = commands.recv(), if commands_open => match command {
                Some(command) => {
                    log_debug!("command {:?}", command);
                    guarded(&mut core, "command", |core| {
                        core.handle_command(command, Instant::now())
                    });
                }
                None => commands_open = false,
            },
            _ = ticker.tick() => {
                guarded(&mut core, "tick", |core| core.tick(Instant::now()));
            }
        }
    }

    core
}
