//! Child registry: the keyed container of live-or-not-yet-reaped children.

use crate::backend::{ChildHandle, ChildStream};
use crate::line_reader::LineBuffer;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One per live or not-yet-reaped child.
///
/// The stdout/stderr streams and their carry-over line buffers live here,
/// on the record, rather than in a process-global map keyed by stream
/// identity. They are dropped (and so released) when the record is removed
/// from the registry at reap time.
pub struct ChildRecord {
    pub handle: Box<dyn ChildHandle>,
    pub id: Option<String>,
    pub pid: u32,
    pub started_at: Instant,
    pub cmdline: Vec<String>,
    pub extra: HashMap<String, String>,
    pub stdout_stream: Option<ChildStream>,
    pub stderr_stream: Option<ChildStream>,
    pub stdout_buf: LineBuffer,
    pub stderr_buf: LineBuffer,
}

impl ChildRecord {
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(crate::error::NO_ID)
    }
}

/// Map from pid to child record. Insertion happens at spawn, deletion at
/// reap. No locking: the supervisor touches this only from its own thread
/// (see design notes on concurrency).
#[derive(Default)]
pub struct ChildRegistry {
    children: HashMap<u32, ChildRecord>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ChildRecord) {
        self.children.insert(record.pid, record);
    }

    pub fn remove(&mut self, pid: u32) -> Option<ChildRecord> {
        self.children.remove(&pid)
    }

    pub fn get_mut(&mut self, pid: u32) -> Option<&mut ChildRecord> {
        self.children.get_mut(&pid)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.children.keys().copied().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ChildRecord> {
        self.children.values_mut()
    }

    pub fn values(&self) -> impl Iterator<Item = &ChildRecord> {
        self.children.values()
    }

    /// Pids of records whose age exceeds `timeout`.
    pub fn older_than(&self, timeout: Duration) -> Vec<u32> {
        self.children
            .values()
            .filter(|c| c.age() > timeout)
            .map(|c| c.pid)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::full_featured::FullFeaturedBackend;
    use crate::backend::Backend;

    fn spawn_record(id: Option<&str>) -> ChildRecord {
        let backend = FullFeaturedBackend;
        let handle = backend
            .start(&["true".to_string()], &HashMap::new())
            .expect("spawn true");
        let pid = handle.pid();
        ChildRecord {
            handle,
            id: id.map(str::to_string),
            pid,
            started_at: Instant::now(),
            cmdline: vec!["true".to_string()],
            extra: HashMap::new(),
            stdout_stream: None,
            stderr_stream: None,
            stdout_buf: LineBuffer::new(),
            stderr_buf: LineBuffer::new(),
        }
    }

    #[test]
    fn insert_lookup_remove_round_trip() {
        let mut reg = ChildRegistry::new();
        let record = spawn_record(Some("job-a"));
        let pid = record.pid;
        reg.insert(record);

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get_mut(pid).unwrap().label(), "job-a");

        let removed = reg.remove(pid).unwrap();
        assert_eq!(removed.pid, pid);
        assert!(reg.is_empty());
        assert!(reg.remove(pid).is_none());
    }

    #[test]
    fn label_falls_back_to_placeholder() {
        let record = spawn_record(None);
        assert_eq!(record.label(), crate::error::NO_ID);
    }

    #[test]
    fn older_than_filters_by_age() {
        let mut reg = ChildRegistry::new();
        let mut record = spawn_record(None);
        record.started_at = Instant::now() - Duration::from_secs(10);
        let pid = record.pid;
        reg.insert(record);

        assert_eq!(reg.older_than(Duration::from_secs(5)), vec![pid]);
        assert!(reg.older_than(Duration::from_secs(20)).is_empty());
    }
}
