use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Receives the number of layers declared by a service configuration.
///
/// Called after every successful configuration lookup. Implementations must
/// tolerate repeated calls; the most recent count wins.
pub trait LayerLimitNotifier: Send + Sync {
    fn notify_layer_count(&self, count: usize);
}

/// Shared layer-count budget fed by the configuration cache.
///
/// Keeps the layer count of the most recently served configuration so that a
/// layer cache elsewhere in the server can size itself.
#[derive(Debug, Default)]
pub struct LayerBudget {
    // Stored as count + 1 so that zero means "never notified".
    max_layers: AtomicUsize,
}

impl LayerBudget {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn project_max_layers(&self) -> Option<usize> {
        self.max_layers.load(Ordering::Acquire).checked_sub(1)
    }
}

impl LayerLimitNotifier for LayerBudget {
    fn notify_layer_count(&self, count: usize) {
        self.max_layers
            .store(count.saturating_add(1), Ordering::Release);
    }
}
