//! Hold lifecycle management over the seat ledger.
//!
//! Holds are created atomically with their seats' AVAILABLE→HELD transition
//! and closed (released or expired) atomically with HELD→AVAILABLE. The
//! [`HoldSweeper`] reclaims seats from abandoned holds on a fixed cadence.

pub mod error;
pub mod holds;
pub mod sweeper;

pub use error::{HoldError, SeatConflictReason, SeatDiagnostic};
pub use holds::{DEFAULT_TTL_MINUTES, HoldManager, SweepOutcome};
pub use sweeper::{HoldSweeper, SweeperConfig};
