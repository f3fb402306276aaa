//! Game session: wires the controller and players together and owns their
//! lifetime.

use crate::board::Board;
use crate::config::{ConfigError, GameConfig};
use crate::controller::{Controller, GameOutcome};
use crate::observer::GameObserver;
use crate::player::ActionHandle;
use crate::types::{PlayerId, Slot};
use crate::validator::TripleValidator;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// A running game.
///
/// Created with [`GameSession::start`], which must be called from within a
/// tokio runtime. Dropping the session does not stop the game; call
/// [`GameSession::terminate`].
#[derive(Debug)]
pub struct GameSession {
    board: Arc<Board>,
    inputs: Vec<ActionHandle>,
    cancel: CancellationToken,
    controller: Mutex<ControllerTask>,
}

#[derive(Debug)]
struct ControllerTask {
    handle: Option<JoinHandle<GameOutcome>>,
    outcome: Option<GameOutcome>,
}

impl GameSession {
    /// Validates `config` and spawns the controller, which deals the board
    /// and starts every player.
    #[instrument(skip_all, fields(players = config.player_count()))]
    pub fn start(
        config: GameConfig,
        validator: Arc<dyn TripleValidator>,
        observer: Arc<dyn GameObserver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (controller, inputs) = Controller::new(config, validator, observer);
        let board = controller.board();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(controller.run(cancel.clone()));
        info!("Game session started");

        Ok(Self {
            board,
            inputs,
            cancel,
            controller: Mutex::new(ControllerTask {
                handle: Some(task),
                outcome: None,
            }),
        })
    }

    /// Starts a session using the configured feature rules as validator.
    pub fn start_with_default_rules(
        config: GameConfig,
        observer: Arc<dyn GameObserver>,
    ) -> Result<Self, ConfigError> {
        let rules = config.rules();
        Self::start(config, Arc::new(rules), observer)
    }

    /// Input event from a collaborator: `player` pressed the key for `slot`.
    ///
    /// Returns whether the action was queued.
    #[instrument(skip(self))]
    pub fn on_key_press(&self, player: PlayerId, slot: Slot) -> bool {
        match self.inputs.get(player.index()) {
            Some(input) => input.submit_action(slot),
            None => {
                debug!("Key press for unknown player ignored");
                false
            }
        }
    }

    /// The input handle for `player`.
    pub fn input(&self, player: PlayerId) -> Option<&ActionHandle> {
        self.inputs.get(player.index())
    }

    /// The shared board, for queries.
    pub fn board(&self) -> &Arc<Board> {
        &self.board
    }

    /// Current score of `player`.
    pub fn score(&self, player: PlayerId) -> Option<u32> {
        self.input(player).map(|input| input.status().score())
    }

    /// Whether termination has been requested.
    pub fn is_terminating(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for the game to end on its own.
    pub async fn finished(&self) -> Option<GameOutcome> {
        self.join().await
    }

    /// Stops the controller and every player, waits for all of them, and
    /// returns the final outcome. Safe to call more than once.
    #[instrument(skip(self))]
    pub async fn terminate(&self) -> Option<GameOutcome> {
        if !self.cancel.is_cancelled() {
            info!("Terminating game session");
        }
        self.cancel.cancel();
        self.join().await
    }

    async fn join(&self) -> Option<GameOutcome> {
        let mut controller = self.controller.lock().await;
        // Awaiting by reference keeps the handle if this future is dropped.
        if let Some(handle) = controller.handle.as_mut() {
            match handle.await {
                Ok(outcome) => controller.outcome = Some(outcome),
                Err(e) => error!(error = %e, "Controller task failed"),
            }
            controller.handle = None;
        }
        controller.outcome.clone()
    }
}
