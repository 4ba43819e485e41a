use std::collections::VecDeque;

/// One recoverable problem reported by a system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub frame: u64,
    pub system: &'static str,
    pub message: String,
}

/// Bounded log of recoverable errors. Oldest entries are dropped first; the
/// total count keeps growing.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    records: VecDeque<Diagnostic>,
    capacity: usize,
    total: u64,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
            total: 0,
        }
    }

    pub fn record(&mut self, frame: u64, system: &'static str, message: impl Into<String>) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(Diagnostic {
            frame,
            system,
            message: message.into(),
        });
        self.total += 1;
    }

    pub fn records(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    pub fn from_system<'a>(&'a self, system: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.records.iter().filter(move |d| d.system == system)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(256)
    }
}
