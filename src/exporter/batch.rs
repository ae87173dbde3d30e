use crate::domain::LogEvent;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Why a batch was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchTrigger {
    Size,
    Time,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    entries: Vec<LogEvent>,
    trigger: BatchTrigger,
    created_at: Instant,
}

impl Batch {
    pub fn new(entries: Vec<LogEvent>, trigger: BatchTrigger) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entries,
            trigger,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[LogEvent] {
        &self.entries
    }

    pub fn trigger(&self) -> BatchTrigger {
        self.trigger
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
