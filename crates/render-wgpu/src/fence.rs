use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pathtracer_render::SubmissionId;

/// Monotonic fence shared with the device's completion callbacks.
///
/// Ids are issued on the submitting thread; completion is published from
/// whatever thread polls the device.
#[derive(Debug, Clone, Default)]
pub struct FenceTracker {
    issued: u64,
    completed: Arc<AtomicU64>,
}

impl FenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the id for the next submission.
    pub fn issue(&mut self) -> SubmissionId {
        self.issued += 1;
        SubmissionId(self.issued)
    }

    /// Callback that marks `id` complete. Queue callbacks run in submission
    /// order, but `fetch_max` keeps the counter monotonic regardless.
    pub fn signal(&self, id: SubmissionId) -> impl FnOnce() + Send + 'static + use<> {
        let completed = Arc::clone(&self.completed);
        move || {
            completed.fetch_max(id.0, Ordering::AcqRel);
        }
    }

    pub fn completed(&self) -> SubmissionId {
        SubmissionId(self.completed.load(Ordering::Acquire))
    }

    pub fn last_issued(&self) -> SubmissionId {
        SubmissionId(self.issued)
    }

    pub fn is_complete(&self, id: SubmissionId) -> bool {
        id <= self.completed()
    }

    pub fn in_flight(&self) -> usize {
        self.issued.saturating_sub(self.completed().0) as usize
    }
}
