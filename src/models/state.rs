/// Per-torrent state persisted between runs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateRecord {
    /// Unix timestamp of the first sub-threshold rate observation
    pub low_rate_start: Option<i64>,
}

impl StateRecord {
    pub fn with_low_rate_start(timestamp: i64) -> Self {
        Self {
            low_rate_start: Some(timestamp),
        }
    }

    /// An empty record carries no information and is never stored
    pub fn is_empty(&self) -> bool {
        self.low_rate_start.is_none()
    }
}
