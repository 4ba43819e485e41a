use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::{BackendError, RenderBackend, SubmissionId, TracePass};
use crate::scene_data::SceneData;

/// Everything the headless device observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    SceneUploaded {
        version: u64,
        id: SubmissionId,
        triangles: usize,
    },
    SceneRetired {
        version: u64,
    },
    SceneFreed {
        version: u64,
    },
    Traced {
        scene_version: u64,
        sample_index: u32,
        reset: bool,
        id: SubmissionId,
    },
    /// A trace was submitted while the previous one could still be writing
    /// the accumulation target.
    OverlappingWrite {
        id: SubmissionId,
    },
    Completed {
        id: SubmissionId,
    },
    Presented {
        samples: u32,
    },
    Resized {
        width: u32,
        height: u32,
    },
    Idle,
}

/// Shared handle onto the headless device's event log.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<BackendEvent>>>);

impl Journal {
    fn push(&self, event: BackendEvent) {
        if let Ok(mut events) = self.0.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.0.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&BackendEvent) -> bool) -> usize {
        self.0
            .lock()
            .map(|e| e.iter().filter(|ev| pred(ev)).count())
            .unwrap_or(0)
    }
}

/// Remote control for a headless device owned by an engine.
#[derive(Debug, Clone, Default)]
pub struct HeadlessControl {
    stalled: Arc<AtomicBool>,
}

impl HeadlessControl {
    /// Stop completing submissions until [`resume`](Self::resume).
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.stalled.store(false, Ordering::SeqCst);
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::SeqCst)
    }
}

/// Device-free backend.
///
/// Submissions complete in order after `latency` polls. Nothing is rendered;
/// the backend keeps the bookkeeping a real device needs (fences, resident
/// scene allocations, accumulated sample count) and journals every call.
#[derive(Debug)]
pub struct HeadlessBackend {
    width: u32,
    height: u32,
    latency: u32,
    next_id: u64,
    pending: VecDeque<(SubmissionId, u32)>,
    completed: SubmissionId,
    /// Resident scenes, keyed by version, with the last submission that read them.
    scenes: BTreeMap<u64, SubmissionId>,
    retired: BTreeMap<u64, SubmissionId>,
    last_trace: SubmissionId,
    samples: u32,
    journal: Journal,
    control: HeadlessControl,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            latency: 0,
            next_id: 0,
            pending: VecDeque::new(),
            completed: SubmissionId::NONE,
            scenes: BTreeMap::new(),
            retired: BTreeMap::new(),
            last_trace: SubmissionId::NONE,
            samples: 0,
            journal: Journal::default(),
            control: HeadlessControl::default(),
        }
    }

    /// Number of polls a submission stays in flight.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency = polls;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn control(&self) -> HeadlessControl {
        self.control.clone()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    fn submit(&mut self) -> SubmissionId {
        self.next_id += 1;
        let id = SubmissionId(self.next_id);
        self.pending.push_back((id, self.latency));
        id
    }

    fn poll(&mut self) {
        if self.control.is_stalled() {
            return;
        }
        for (_, remaining) in self.pending.iter_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        while let Some(&(id, 0)) = self.pending.front() {
            self.pending.pop_front();
            self.completed = id;
            self.journal.push(BackendEvent::Completed { id });
        }
        self.reclaim();
    }

    fn reclaim(&mut self) {
        let completed = self.completed;
        let freed: Vec<u64> = self
            .retired
            .iter()
            .filter(|(_, fence)| **fence <= completed)
            .map(|(version, _)| *version)
            .collect();
        for version in freed {
            self.retired.remove(&version);
            tracing::trace!(version, "headless scene freed");
            self.journal.push(BackendEvent::SceneFreed { version });
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn upload_scene(&mut self, scene: &SceneData) -> Result<SubmissionId, BackendError> {
        let id = self.submit();
        self.scenes.insert(scene.version, id);
        self.journal.push(BackendEvent::SceneUploaded {
            version: scene.version,
            id,
            triangles: scene.triangles.len(),
        });
        Ok(id)
    }

    fn retire_scene(&mut self, version: u64) {
        if let Some(fence) = self.scenes.remove(&version) {
            self.retired.insert(version, fence);
            self.journal.push(BackendEvent::SceneRetired { version });
            self.reclaim();
        }
    }

    fn trace(&mut self, pass: &TracePass) -> Result<SubmissionId, BackendError> {
        if !self.scenes.contains_key(&pass.scene_version) {
            return Err(BackendError::UnknownScene(pass.scene_version));
        }
        let overlapping = self.last_trace > self.completed;
        let id = self.submit();
        if overlapping {
            self.journal.push(BackendEvent::OverlappingWrite { id });
        }
        self.scenes.insert(pass.scene_version, id);
        if pass.reset {
            self.samples = 0;
        }
        self.samples += 1;
        self.last_trace = id;
        self.journal.push(BackendEvent::Traced {
            scene_version: pass.scene_version,
            sample_index: pass.sample_index,
            reset: pass.reset,
            id,
        });
        Ok(id)
    }

    fn present(&mut self) -> Result<(), BackendError> {
        self.journal.push(BackendEvent::Presented {
            samples: self.samples,
        });
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        self.width = width.max(1);
        self.height = height.max(1);
        self.samples = 0;
        self.journal.push(BackendEvent::Resized {
            width: self.width,
            height: self.height,
        });
        Ok(())
    }

    fn is_complete(&mut self, id: SubmissionId) -> bool {
        self.poll();
        id <= self.completed
    }

    fn wait(&mut self, id: SubmissionId, _timeout: Duration) -> Result<bool, BackendError> {
        for _ in 0..=self.latency {
            if self.is_complete(id) {
                return Ok(true);
            }
            if self.control.is_stalled() {
                return Ok(false);
            }
        }
        Ok(self.is_complete(id))
    }

    fn wait_idle(&mut self) -> Result<(), BackendError> {
        while !self.pending.is_empty() {
            if self.control.is_stalled() {
                return Err(BackendError::Timeout);
            }
            self.poll();
        }
        self.journal.push(BackendEvent::Idle);
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.pending.len()
    }

    fn resident_scenes(&self) -> usize {
        self.scenes.len() + self.retired.len()
    }
}
