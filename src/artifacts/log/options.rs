use chrono::{DateTime, FixedOffset};

pub const DEFAULT_PER_PAGE: usize = 30;
pub const MAX_PER_PAGE: usize = 100;

/// Filters and pagination for a history walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListCommitsOptions {
    /// Commits per page; 0 selects the default
    pub per_page: usize,
    /// 1-based page number; 0 is treated as 1
    pub page: usize,
    /// Only commits that changed this path
    pub path: Option<String>,
    /// Only commits made at or after this time
    pub since: Option<DateTime<FixedOffset>>,
    /// Only commits made at or before this time
    pub until: Option<DateTime<FixedOffset>>,
}

impl ListCommitsOptions {
    pub fn page(per_page: usize, page: usize) -> Self {
        ListCommitsOptions {
            per_page,
            page,
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_since(mut self, since: DateTime<FixedOffset>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<FixedOffset>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn effective_per_page(&self) -> usize {
        match self.per_page {
            0 => DEFAULT_PER_PAGE,
            n => n.min(MAX_PER_PAGE),
        }
    }

    pub fn effective_page(&self) -> usize {
        self.page.max(1)
    }

    /// Matches to skip before the requested page starts
    pub fn skip(&self) -> usize {
        (self.effective_page() - 1).saturating_mul(self.effective_per_page())
    }

    /// Matches to collect before the walk can stop
    pub fn limit(&self) -> usize {
        self.skip().saturating_add(self.effective_per_page())
    }

    /// Whether a commit time falls inside the `since`/`until` window
    pub fn in_time_window(&self, time: DateTime<FixedOffset>) -> bool {
        self.since.is_none_or(|since| time >= since) && self.until.is_none_or(|until| time <= until)
    }
}
