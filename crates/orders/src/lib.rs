//! Idempotent order settlement.
//!
//! The settlement saga consumes an ACTIVE hold: it validates the hold
//! against the request, prices the held seats, records a (simulated)
//! payment outcome, and on success atomically transitions the seats
//! HELD→SOLD and the order PENDING→CONFIRMED. A simulated decline or
//! timeout deliberately leaves the order PENDING and the seats HELD.
//!
//! Every settlement is guarded by a client-supplied idempotency key: the
//! same key with the same payload replays the cached response without
//! re-executing any side effect; the same key with a different payload is
//! a hard conflict.

pub mod error;
pub mod fingerprint;
pub mod settlement;

pub use error::SettlementError;
pub use fingerprint::{normalize_simulation, order_fingerprint};
pub use settlement::{OrderReceipt, OrderRequest, PaymentSimulation, SettlementService};
