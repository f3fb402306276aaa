//! Strictly Set - concurrent arbiter for a real-time triple-matching game.
//!
//! A fixed-size board is shared by several players acting at the same time.
//! Each player marks up to three slots; the third marker submits the triple
//! to a single controller, which validates submissions strictly one at a
//! time, replenishes the board, and reshuffles it when a countdown runs out.
//!
//! # Architecture
//!
//! - **Board**: the shared slot/marker store, behind one lock
//! - **Controller**: owns the supply, validates, deals, keeps time
//! - **Players**: one actor per player, fed by keyboard or a generator
//! - **Validator**: injected predicate classifying a triple
//! - **Session**: starts everything and terminates it cleanly
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strictly_set::{GameConfig, GameSession, PlayerId, TracingObserver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GameConfig::default().with_human_players(1);
//! let session = GameSession::start_with_default_rules(config, Arc::new(TracingObserver))?;
//!
//! session.on_key_press(PlayerId(0), 4);
//!
//! let outcome = session.terminate().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod board;
mod config;
mod controller;
mod error;
mod observer;
mod player;
mod rng;
mod session;
mod types;
mod validator;

// Crate-level exports - Domain types
pub use types::{Item, MARKERS_PER_PLAYER, PlayerId, Slot, Verdict};

// Crate-level exports - Board
pub use board::{Board, Claim, MarkerToggle, Removal};
pub use error::BoardError;

// Crate-level exports - Configuration
pub use config::{ConfigError, GameConfig};

// Crate-level exports - Controller
pub use controller::{Controller, GameOutcome, ItemLedger, Phase, RoundEnd};

// Crate-level exports - Players
pub use player::{
    ActionHandle, AgentTimings, FreezeOutcome, FreezeTimer, PlayerAgent, PlayerMode,
    PlayerStatus, Submission,
};

// Crate-level exports - Observation
pub use observer::{ChannelObserver, GameEvent, GameObserver, NoopObserver, TracingObserver};

// Crate-level exports - Randomness
pub use rng::GameRng;

// Crate-level exports - Session
pub use session::GameSession;

// Crate-level exports - Validation
pub use validator::{SetRules, TripleValidator, find_triples, has_triple};
