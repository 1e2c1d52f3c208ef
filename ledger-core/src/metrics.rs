//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for the reconciliation pipeline.
//!
//! # Metrics
//!
//! - `radix_atoms_received_total` - Atoms delivered by the network feed
//! - `radix_atoms_duplicate_total` - Redelivered atoms dropped by hash
//! - `radix_atoms_rejected_total` - Atoms dropped by validation
//! - `radix_atoms_emitted_total` - Atoms emitted in causal order
//! - `radix_atoms_pending` - Atoms waiting on a missing particle
//! - `radix_state_publications_total` - Debounced reducer snapshots published

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Atoms delivered by the feed
    pub atoms_received: IntCounter,

    /// Duplicate deliveries dropped
    pub atoms_duplicate: IntCounter,

    /// Atoms rejected by validation
    pub atoms_rejected: IntCounter,

    /// Atoms emitted by reconcilers
    pub atoms_emitted: IntCounter,

    /// Atoms currently pending across reconcilers
    pub atoms_pending: IntGauge,

    /// Reducer snapshots published
    pub state_publications: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> crate::Result<Self> {
        let registry = Arc::new(Registry::new());

        let atoms_received = IntCounter::new(
            "radix_atoms_received_total",
            "Atoms delivered by the network feed",
        )?;
        registry.register(Box::new(atoms_received.clone()))?;

        let atoms_duplicate = IntCounter::new(
            "radix_atoms_duplicate_total",
            "Redelivered atoms dropped by hash",
        )?;
        registry.register(Box::new(atoms_duplicate.clone()))?;

        let atoms_rejected = IntCounter::new(
            "radix_atoms_rejected_total",
            "Atoms dropped by validation",
        )?;
        registry.register(Box::new(atoms_rejected.clone()))?;

        let atoms_emitted = IntCounter::new(
            "radix_atoms_emitted_total",
            "Atoms emitted in causal order",
        )?;
        registry.register(Box::new(atoms_emitted.clone()))?;

        let atoms_pending = IntGauge::new(
            "radix_atoms_pending",
            "Atoms waiting on a missing particle",
        )?;
        registry.register(Box::new(atoms_pending.clone()))?;

        let state_publications = IntCounter::new(
            "radix_state_publications_total",
            "Debounced reducer snapshots published",
        )?;
        registry.register(Box::new(state_publications.clone()))?;

        Ok(Self {
            atoms_received,
            atoms_duplicate,
            atoms_rejected,
            atoms_emitted,
            atoms_pending,
            state_publications,
            registry,
        })
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in Prometheus text format
    pub fn render(&self) -> crate::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Encoding(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.atoms_received.get(), 0);
        assert_eq!(metrics.atoms_pending.get(), 0);
    }

    #[test]
    fn test_instances_do_not_share_registry() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.atoms_emitted.inc();
        assert_eq!(a.atoms_emitted.get(), 1);
        assert_eq!(b.atoms_emitted.get(), 0);
        assert_eq!(a.registry().gather().len(), 6);
    }

    #[test]
    fn test_render_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.atoms_pending.set(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("radix_atoms_pending 3"));
        assert!(text.contains("radix_atoms_received_total 0"));
    }
}
