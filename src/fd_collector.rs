//! Module A — FdCollector (spec §3 / §4.A).
//!
//! A scoped holder of the file descriptors opened while planning a single
//! [`crate::ast::Command`]: pipe ends and redirection targets. Every fd
//! handed to `add_*` is closed exactly once by the time `collect()` runs or
//! the collector is dropped — including on a planning error, before any
//! child is spawned (spec §4.C: "Failure of any pipe or open aborts the
//! whole command: the collector closes every fd opened so far").
//!
//! `executor.rs`'s Planner constructs one of these per command (single or
//! pipeline) and registers a tracking duplicate of every pipe end and
//! redirection file it opens, immediately after the open succeeds. The
//! duplicate exists only so the collector has something real to own and
//! close; the original fd is what's actually wired into the child process
//! or builtin I/O. `wait_children` collects on every planning-error path in
//! `execute_pipeline`, and each single-command path collects once spawning
//! succeeds or bails out on error.

use os_pipe::{PipeReader, PipeWriter};
use std::fs::File;

enum Owned {
    File(File),
    PipeReader(PipeReader),
    PipeWriter(PipeWriter),
}

/// An ordered set of fds opened during one command's planning (spec §3).
#[derive(Default)]
pub struct FdCollector {
    owned: Vec<Owned>,
}

impl FdCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file: File) {
        self.owned.push(Owned::File(file));
    }

    pub fn add_pipe_reader(&mut self, reader: PipeReader) {
        self.owned.push(Owned::PipeReader(reader));
    }

    pub fn add_pipe_writer(&mut self, writer: PipeWriter) {
        self.owned.push(Owned::PipeWriter(writer));
    }

    /// How many fds are currently tracked (for tests asserting no leak).
    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Close every tracked fd. Idempotent — safe to call more than once, and
    /// implicit on `Drop` regardless (spec §4.A: "close all, idempotent").
    pub fn collect(&mut self) {
        self.owned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_drops_tracked_files() {
        let dir = std::env::temp_dir().join(format!("jsh_fdcollector_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scratch.txt");
        std::fs::write(&path, b"x").unwrap();

        let mut collector = FdCollector::new();
        let file = File::open(&path).unwrap();
        collector.add_file(file);
        assert_eq!(collector.len(), 1);

        collector.collect();
        assert!(collector.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_collector_collects_cleanly() {
        let mut collector = FdCollector::new();
        collector.collect();
        assert!(collector.is_empty());
    }
}
