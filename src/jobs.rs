//! Module E — Job Registry (spec §3 "Job Registry" / §4.E).
//!
//! A pid-keyed table of [`Job`]s, preserving insertion order for `jobs`
//! output. Mutated only from the main loop: post-spawn insertion, the
//! job-control builtins (`fg`/`bg`/`disown`), and the reap path that drains
//! `ChildExited` events after a `waitpid` returns (spec §9's event-driven
//! reaping discipline).

use std::process::Child;

use crate::status;

/// The lifecycle state of a tracked job (spec §3's `exit_state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Running,
    Exited(i32),
    Signaled(i32),
    Stopped(i32),
}

/// A single tracked job: a pipeline leader (or lone command) running in its
/// own process group, background or stopped.
pub struct Job {
    pub job_id: usize,
    pub pid: u32,
    pub pgid: u32,
    pub command: String,
    pub background: bool,
    pub exit_state: ExitState,
    pub child: Child,
}

/// The shell's job registry. Insertion order is tracked separately from the
/// `HashMap` so `iter_in_order` reproduces the order jobs were created in,
/// matching spec §3's "preserving insertion order for reproducible listing".
pub struct JobTable {
    jobs: std::collections::HashMap<usize, Job>,
    order: Vec<usize>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: std::collections::HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Highest `job_id` currently present, or 0 if the table is empty
    /// (spec §3: `find_last_job_id()`).
    pub fn find_last_job_id(&self) -> usize {
        self.jobs.keys().copied().max().unwrap_or(0)
    }

    /// Insert a running background/foreground job, assigning it
    /// `find_last_job_id() + 1` (spec §9: "always picking max(existing)+1").
    pub fn add_with_pgid(&mut self, child: Child, command: String, pgid: u32) -> (usize, u32) {
        let job_id = self.find_last_job_id() + 1;
        let pid = child.id();
        self.jobs.insert(
            job_id,
            Job {
                job_id,
                pid,
                pgid,
                command,
                background: false,
                exit_state: ExitState::Running,
                child,
            },
        );
        self.order.push(job_id);
        (job_id, pid)
    }

    pub fn add(&mut self, child: Child, command: String) -> (usize, u32) {
        let pgid = child.id();
        self.add_with_pgid(child, command, pgid)
    }

    /// Insert a job that has already been observed stopped (e.g. Ctrl-Z).
    pub fn add_stopped_with_pgid(&mut self, child: Child, command: String, pgid: u32) -> (usize, u32) {
        let (job_id, pid) = self.add_with_pgid(child, command, pgid);
        if let Some(job) = self.jobs.get_mut(&job_id) {
            job.exit_state = ExitState::Stopped(0);
        }
        (job_id, pid)
    }

    pub fn add_stopped(&mut self, child: Child, command: String) -> (usize, u32) {
        let pgid = child.id();
        self.add_stopped_with_pgid(child, command, pgid)
    }

    pub fn get_mut(&mut self, job_id: usize) -> Option<&mut Job> {
        self.jobs.get_mut(&job_id)
    }

    pub fn lookup_by_job_id(&self, job_id: usize) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    pub fn lookup_by_pid(&self, pid: u32) -> Option<&Job> {
        self.jobs.values().find(|j| j.pid == pid)
    }

    pub fn lookup_by_pid_mut(&mut self, pid: u32) -> Option<&mut Job> {
        self.jobs.values_mut().find(|j| j.pid == pid)
    }

    pub fn remove(&mut self, job_id: usize) -> Option<Job> {
        self.order.retain(|id| *id != job_id);
        self.jobs.remove(&job_id)
    }

    /// All jobs in insertion order (spec §3: "reproducible listing").
    pub fn iter_in_order(&self) -> Vec<&Job> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .collect()
    }

    /// Alias kept for call sites that only care about a stable display order.
    pub fn jobs_sorted(&self) -> Vec<&Job> {
        self.iter_in_order()
    }

    /// Job ID of the most recently added job (any status) — the `fg`/`bg`
    /// default per spec §9's resolved Open Question ("source picks highest id").
    pub fn most_recent_id(&self) -> Option<usize> {
        self.jobs.keys().copied().max()
    }

    /// Job ID of the most recently added *stopped* job.
    pub fn most_recent_stopped_id(&self) -> Option<usize> {
        self.jobs
            .iter()
            .filter(|(_, j)| matches!(j.exit_state, ExitState::Stopped(_)))
            .map(|(id, _)| *id)
            .max()
    }

    /// IDs of all currently running (not stopped/done) jobs, for `wait`.
    pub fn running_ids(&self) -> Vec<usize> {
        self.jobs
            .iter()
            .filter(|(_, j)| j.exit_state == ExitState::Running)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Non-blocking poll of all running jobs. Prints `[N]  Done  cmd` for any
    /// that have finished and removes them from the table (spec §4.E: "a
    /// reap event removes the pid entry if the process is no longer running").
    pub fn reap(&mut self) {
        let mut done_ids = Vec::new();

        for (job_id, job) in self.jobs.iter_mut() {
            if job.exit_state != ExitState::Running {
                continue;
            }
            match job.child.try_wait() {
                Ok(Some(status)) => {
                    let code = status::exit_code(status);
                    job.exit_state = ExitState::Exited(code);
                    println!("[{}]  Done  {}", job.job_id, job.command);
                    done_ids.push(*job_id);
                }
                Ok(None) => {}
                Err(e) => {
                    eprintln!("jsh: error checking job {}: {}", job_id, e);
                }
            }
        }

        for job_id in done_ids {
            self.remove(job_id);
        }
    }

    /// `disown [ids...]`: drop the listed jobs from the registry without
    /// waiting on them. Per spec §4.H, a job not already running in the
    /// background gets a warning instead of being silently dropped.
    pub fn disown(&mut self, job_id: usize) -> Result<(), String> {
        match self.jobs.get(&job_id) {
            Some(job) if job.background => {
                self.remove(job_id);
                Ok(())
            }
            Some(job) => {
                let warning = format!(
                    "jsh: disown: job {} is not running in the background; \
                     run `bg {}` first if you want to resume it manually",
                    job_id, job_id
                );
                // Still disowned — the registry entry is dropped either way;
                // the warning just tells the user it wasn't already detached.
                let _ = job;
                self.remove(job_id);
                Err(warning)
            }
            None => Err(format!("jsh: disown: {}: no such job", job_id)),
        }
    }
}
