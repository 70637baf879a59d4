//! Persistence boundary for the ticketing system.
//!
//! All concurrency-sensitive state lives behind the traits in this crate.
//! The single synchronization primitive is the conditional seat transition
//! (`transition_seats`): a set-oriented compare-and-swap whose predicate and
//! write are one atomic statement against the store. There are no advisory
//! locks and no read-then-write windows.
//!
//! Two implementations with identical semantics are provided:
//! [`PostgresStore`] for production and [`InMemoryStore`] for tests and
//! local runs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    AttemptKind, AttemptStatus, Hold, HoldStatus, IdempotencyRecord, NewHold, NewOrder, Order,
    OrderState, OrderView, PaymentAttempt, Seat, SeatStatus,
};
pub use store::{
    HoldCreation, IdempotencyStore, InventoryStore, OrderStore, PaymentLog, TicketStore,
};
