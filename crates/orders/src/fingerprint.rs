//! Canonical request fingerprinting.
//!
//! The fingerprint covers the logically significant fields of a settlement
//! request. Seat ids are sorted and the simulation flag is normalized so
//! that semantically identical requests with superficially different
//! encodings hash identically.

use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::settlement::OrderRequest;

/// Normalizes the payment simulation flag: trimmed, lowercased, empty when
/// absent.
pub fn normalize_simulation(raw: Option<&str>) -> String {
    raw.map(|s| s.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Returns the SHA-256 hex fingerprint of a settlement request.
pub fn order_fingerprint(req: &OrderRequest) -> String {
    let mut seats = req.seat_ids.clone();
    seats.sort();
    let seats = seats
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");

    let canonical = format!(
        "aid={}|eid={}|seats=[{}]|cur={}|hold={}|sim={}",
        req.attendee_id,
        req.event_id,
        seats,
        req.currency,
        req.hold_id,
        normalize_simulation(req.simulate.as_deref()),
    );

    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut hex, b| {
        let _ = write!(hex, "{b:02x}");
        hex
    })
}
