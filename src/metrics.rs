//! Prometheus metrics for labeling activity
//!
//! Everything registers into the default registry; scrape it with
//! [`encode_metrics`].

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, Counter, CounterVec, Encoder,
    GaugeVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Category allocation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Categories currently held, per sensitivity.
    ///
    /// Labels:
    /// - level: Sensitivity the categories belong to (e.g., "s0")
    pub static ref CATEGORIES_RESERVED: GaugeVec = register_gauge_vec!(
        "seclabel_categories_reserved",
        "Categories currently reserved per sensitivity",
        &["level"]
    ).expect("failed to register CATEGORIES_RESERVED metric");

    /// Reservations refused because the category pool was empty.
    pub static ref CATEGORY_EXHAUSTED: CounterVec = register_counter_vec!(
        "seclabel_category_exhausted_total",
        "Category reservations that failed because the pool was exhausted",
        &["level"]
    ).expect("failed to register CATEGORY_EXHAUSTED metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Relabeling
    // ─────────────────────────────────────────────────────────────────────────────

    /// Filesystem entries visited by relabel walks.
    ///
    /// Labels:
    /// - outcome: "labeled" or "skipped" (filesystem without label support)
    pub static ref RELABEL_ENTRIES: CounterVec = register_counter_vec!(
        "seclabel_relabel_entries_total",
        "Filesystem entries processed by relabel walks",
        &["outcome"]
    ).expect("failed to register RELABEL_ENTRIES metric");

    /// Relabel requests refused by the protected-path guard.
    pub static ref RELABEL_DENIED: Counter = register_counter!(
        "seclabel_relabel_denied_total",
        "Relabel requests refused because the target is a protected path"
    ).expect("failed to register RELABEL_DENIED metric");
}

/// Render every registered metric in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_touched_metrics() {
        RELABEL_DENIED.inc();
        RELABEL_ENTRIES.with_label_values(&["labeled"]).inc_by(0.0);
        let text = encode_metrics();
        assert!(text.contains("seclabel_relabel_denied_total"));
        assert!(text.contains("seclabel_relabel_entries_total"));
    }
}
