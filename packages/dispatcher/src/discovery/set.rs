/// Full snapshot of the live sandbox endpoints.
///
/// Membership is liveness: an endpoint is in the set exactly when it is
/// registered with the discovery service. Snapshots are never patched, a newer
/// one replaces the older one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SandboxSet {
    endpoints: Vec<String>,
    generation: u64,
}

impl SandboxSet {
    /// Build a snapshot. Blank entries are dropped; order and duplicates do not matter.
    pub fn new<I, S>(endpoints: I, generation: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut endpoints: Vec<String> = endpoints
            .into_iter()
            .map(Into::into)
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        endpoints.sort();
        endpoints.dedup();

        Self {
            endpoints,
            generation,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Endpoints in sorted order.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.endpoints
            .binary_search_by(|e| e.as_str().cmp(endpoint))
            .is_ok()
    }

    /// Monotonic counter assigned by the watcher, 0 for the initial empty set.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
