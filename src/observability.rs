//! Metric name constants. The crate emits through the `metrics` macros and
//! leaves recorder installation to the embedding application; without a
//! recorder every emission is a no-op.

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations committed.
pub const RESERVATIONS_TOTAL: &str = "aula_reservations_total";

/// Counter: reserve attempts rejected with a conflict.
pub const RESERVE_CONFLICTS_TOTAL: &str = "aula_reserve_conflicts_total";

/// Counter: cancellations committed.
pub const CANCELLATIONS_TOTAL: &str = "aula_cancellations_total";

/// Counter: availability searches served.
pub const SEARCHES_TOTAL: &str = "aula_searches_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms currently registered.
pub const ROOMS_REGISTERED: &str = "aula_rooms_registered";

/// Counter: snapshot saves that failed (operations reported not-committed).
pub const STORE_FAILURES_TOTAL: &str = "aula_store_failures_total";

/// Histogram: snapshot save duration in seconds, per commit batch.
pub const STORE_SAVE_DURATION_SECONDS: &str = "aula_store_save_duration_seconds";

/// Histogram: changes per commit batch.
pub const STORE_BATCH_SIZE: &str = "aula_store_batch_size";
