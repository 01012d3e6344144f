use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Returns a unique identifier that sorts lexicographically in creation order.
///
/// The identifier combines the UTC millisecond timestamp with a process-wide
/// sequence counter, both fixed-width hex encoded, so string ordering equals
/// creation ordering within a process.
#[must_use]
pub fn next_ordered_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{millis:013x}-{sequence:012x}")
}
