/// Lifecycle of a cached property block.
///
/// Requested → Downloading → Resident, or Failed. Failed blocks stay failed
/// until the loader's cache is cleared.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResidencyState {
    Requested,
    Downloading,
    Resident,
    Failed,
}

impl ResidencyState {
    pub fn is_settled(self) -> bool {
        matches!(self, ResidencyState::Resident | ResidencyState::Failed)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Residency {
    pub state: ResidencyState,
}

impl Residency {
    pub fn new() -> Self {
        Self {
            state: ResidencyState::Requested,
        }
    }

    /// Moves forward; settled states never change again.
    pub fn advance(&mut self, next: ResidencyState) {
        if !self.state.is_settled() {
            self.state = next;
        }
    }
}

impl Default for Residency {
    fn default() -> Self {
        Self::new()
    }
}
