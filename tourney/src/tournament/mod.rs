//! Tournament domain: models, status lifecycle, read views and match results.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tourney::{
//!     db::{Database, DatabaseConfig},
//!     notify::NotificationHub,
//!     tournament::{TournamentLifecycle, models::TournamentStatus},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&DatabaseConfig::development()).await?;
//!     let (hub, _task) = NotificationHub::spawn(1024);
//!     let lifecycle = TournamentLifecycle::new(Arc::new(db.store()), Arc::new(hub));
//!
//!     let change = lifecycle.update_status(1, TournamentStatus::Active).await?;
//!     println!("{} -> {}", change.from, change.to);
//!     Ok(())
//! }
//! ```

pub mod lifecycle;
pub mod models;
pub mod results;
pub mod view;

pub use lifecycle::{LifecycleError, LifecycleResult, StatusChange, TournamentLifecycle};
pub use models::{
    BracketType, EntrantId, Format, MatchId, Participant, ParticipantType, PersistedMatch,
    Standing, Tournament, TournamentId, TournamentSchedule, TournamentStatus,
};
pub use results::{MatchOutcome, MatchResults, ResultError, ResultResult};
pub use view::{TournamentView, TournamentViews, ViewError, ViewResult};
