//! Action generator for computer players.

use super::ActionHandle;
use crate::board::Board;
use crate::rng::GameRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, trace};

/// Spawns a task that presses a random occupied slot every `delay`.
///
/// The generator feeds the same [`ActionHandle`] a human would, so the
/// agent's rejection rules (frozen, awaiting a verdict, queue full) apply
/// unchanged.
pub(super) fn spawn_generator(
    handle: ActionHandle,
    board: Arc<Board>,
    mut rng: GameRng,
    delay: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let delay = delay.max(Duration::from_millis(1));
    let span = info_span!("generator", player = %handle.player());
    tokio::spawn(
        async move {
            debug!("Generator starting");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                let occupied = board.occupied_slots();
                let Some(slot) = rng.choose(&occupied) else {
                    continue;
                };
                let accepted = handle.submit_action(slot);
                trace!(slot, accepted, "Generated action");
            }
            debug!("Generator terminated");
        }
        .instrument(span),
    )
}
