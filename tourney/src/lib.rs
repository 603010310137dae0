//! # Tourney
//!
//! Tournament bracket generation and lifecycle orchestration.
//!
//! Given a tournament format and its confirmed participants, the crate builds a
//! match graph (single elimination with byes, or a single / double round-robin
//! schedule), stores it transactionally with winner-advancement links, and
//! drives tournament status through `soon -> registration -> active ->
//! completed` (or `canceled`), including a date-driven scheduler that is safe
//! to run on several instances at once.
//!
//! ## Core Modules
//!
//! - [`bracket`]: pure bracket generators
//! - [`orchestrator`]: generation, two-pass persistence and standings on one transaction
//! - [`tournament`]: models, status lifecycle, read views and match results
//! - [`scheduler`]: advisory-locked periodic status sweep
//! - [`notify`]: room notification hub
//! - [`db`]: store traits and the PostgreSQL implementation

pub mod bracket;
pub mod db;
pub mod notify;
pub mod orchestrator;
pub mod scheduler;
pub mod tournament;

pub use bracket::{BracketGenerator, Generator, GenerationError};
pub use orchestrator::{BracketError, BracketOrchestrator, BracketSummary};
pub use scheduler::{SchedulerConfig, StatusScheduler, TickOutcome};
pub use tournament::{LifecycleError, StatusChange, TournamentLifecycle};
