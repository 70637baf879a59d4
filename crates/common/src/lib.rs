//! Shared value types for the ticketing system.
//!
//! This crate provides the typed identifiers, money representation,
//! authentication context, and clock abstraction used by every other crate.

pub mod auth;
pub mod clock;
pub mod types;

pub use auth::{AuthContext, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use types::{AttemptId, AttendeeId, Currency, EventId, HoldId, Money, OrderId, SeatId};
