use derive_ex::Ex;
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

/// Settings of [`RenderStore::render_to_string`](crate::RenderStore::render_to_string).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Ex)]
#[derive_ex(Default)]
#[default(Self::new())]
#[serde(default)]
pub struct RenderOptions {
    /// Maximum number of render passes in one session.
    ///
    /// `None` renders until the output stops changing the state.
    pub max_passes: Option<usize>,

    /// Number of scheduler turns to wait, after all operations have finished with a failure,
    /// before deciding whether the failure was handled.
    pub settle_ticks: usize,
}

impl RenderOptions {
    pub const fn new() -> Self {
        Self {
            max_passes: None,
            settle_ticks: 1,
        }
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = Some(max_passes);
        self
    }

    pub fn with_settle_ticks(mut self, settle_ticks: usize) -> Self {
        self.settle_ticks = settle_ticks;
        self
    }
}
