//! Engine configuration

/// Construction-time configuration for an [`Engine`](crate::engine::Engine)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of parallel partitions table scans are spread over
    pub partitions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            partitions: rayon::current_num_threads(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of parallel partitions for execution
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }
}
