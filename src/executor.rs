//! Modules C/D/E/F/G — Pipeline Planner, Process Spawner, Job Registry
//! handoff, Waiter/Reaper, and Terminal Controller (spec §4.C–§4.G).
//!
//! A [`crate::ast::Command`] is a pipeline of [`crate::ast::Subcommand`]s.
//! This module expands each subcommand's argv, wires up pipes and
//! redirections between stages, spawns builtins and external processes, and
//! waits for (or backgrounds) the result.

use os_pipe::{PipeReader, PipeWriter, pipe};
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Write};
use std::process::{Command as StdCommand, Stdio};

use crate::ast::{self, Attribute, RedirectKind, Redirection};
use crate::builtins;
use crate::fd_collector::FdCollector;
#[cfg(unix)]
use crate::job_control;
use crate::jobs::JobTable;
use crate::state::ShellState;
use crate::status;

#[derive(Debug)]
pub enum ExecutionAction {
    Continue(i32),
    Exit(i32),
}

/// One subcommand with its argv already expanded (spec §4.B's output, fed
/// into the Planner).
struct ExpandedSubcommand<'a> {
    program: String,
    args: Vec<String>,
    redirections: &'a [Redirection],
}

fn expand_subcommands(cmd: &ast::Command, last_exit_code: i32) -> Vec<ExpandedSubcommand<'_>> {
    cmd.subcommands
        .iter()
        .map(|sub| {
            let mut argv = crate::expander::expand_args(&sub.args, last_exit_code);
            let program = if argv.is_empty() {
                String::new()
            } else {
                argv.remove(0)
            };
            ExpandedSubcommand {
                program,
                args: argv,
                redirections: &sub.redirections,
            }
        })
        .collect()
}

/// Run one parsed [`ast::Command`] — the entry point the Runner calls for
/// every command in a line (spec §4: "Run the Expander... then dispatch").
pub fn execute_command(cmd: &ast::Command, state: &mut ShellState, command_text: &str) -> ExecutionAction {
    let _span = tracing::debug_span!("execute_command", command = command_text).entered();
    let background = cmd.has(Attribute::InBackground);
    let segments = expand_subcommands(cmd, state.last_exit_code);

    if segments.is_empty() {
        return ExecutionAction::Continue(0);
    }

    if segments.len() == 1 {
        let seg = &segments[0];
        if seg.program.is_empty() {
            return ExecutionAction::Continue(0);
        }
        if builtins::is_builtin(&seg.program) {
            return run_builtin(seg, state);
        }
        return ExecutionAction::Continue(run_external(seg, background, state, command_text));
    }

    execute_pipeline(segments, background, state, command_text)
}

fn execute_pipeline(
    segments: Vec<ExpandedSubcommand<'_>>,
    background: bool,
    state: &mut ShellState,
    command_text: &str,
) -> ExecutionAction {
    if segments.iter().any(|seg| seg.program == "exit") {
        eprintln!("jsh: 'exit' is not supported in pipelines");
        return ExecutionAction::Continue(1);
    }

    // On Unix, the first external child becomes the pipeline's process group
    // leader; subsequent stages join that group. Stored here so the background
    // path can register the correct pgid with the job table for later cleanup.
    #[allow(unused_mut)]
    let mut pipeline_pgid: Option<u32> = None;

    let mut children: Vec<std::process::Child> = Vec::new();
    // Tracks every pipe/file fd the loop below opens while planning this
    // pipeline, so a planning error anywhere closes all of them at once
    // (spec §4.A/§4.C) instead of relying only on each local's own Drop.
    let mut fds = FdCollector::new();
    // A non-last builtin's stdout can't be written synchronously — the
    // downstream reader isn't spawned yet, so writing more than the pipe
    // buffer would deadlock. Its output is captured in memory instead and
    // the real write is deferred until every stage has been spawned.
    let mut pending_builtin_writes: Vec<(Box<dyn Write + Send>, Vec<u8>)> = Vec::new();
    let mut prev_pipe: Option<PipeReader> = None;
    let mut last_status = 0;
    let last_is_external = !builtins::is_builtin(
        segments
            .last()
            .map(|seg| seg.program.as_str())
            .unwrap_or(""),
    );
    let mut last_external_index: Option<usize> = None;

    for (idx, segment) in segments.iter().enumerate() {
        let is_last = idx + 1 == segments.len();
        let is_builtin = builtins::is_builtin(&segment.program);

        let stdin_default = prev_pipe
            .take()
            .map(InputHandle::Pipe)
            .unwrap_or(InputHandle::Inherit);

        let (stdout_default, next_pipe_reader) = if !is_last {
            match pipe() {
                Ok((reader, writer)) => {
                    // Register a tracking duplicate of each pipe end with the
                    // collector; the originals are what actually get wired
                    // into this stage and the next one.
                    if let Ok(r) = reader.try_clone() {
                        fds.add_pipe_reader(r);
                    }
                    if let Ok(w) = writer.try_clone() {
                        fds.add_pipe_writer(w);
                    }
                    (OutputHandle::Pipe(writer), Some(reader))
                }
                Err(e) => {
                    eprintln!("jsh: {}", crate::errors::PlanError::Pipe { source: e });
                    wait_children(&mut children, &mut fds);
                    return ExecutionAction::Continue(1);
                }
            }
        } else {
            (OutputHandle::Inherit, None)
        };

        let defaults = RedirectionDefaults {
            stdin: stdin_default,
            stdout: stdout_default,
            stderr: OutputHandle::Inherit,
        };

        let resolved = match resolve_redirections(segment.redirections, defaults, &mut fds) {
            Ok(resolved) => resolved,
            Err(msg) => {
                eprintln!("{msg}");
                wait_children(&mut children, &mut fds);
                return ExecutionAction::Continue(1);
            }
        };

        let ResolvedRedirections {
            stdin,
            stdout,
            stderr,
            stdout_redirected,
        } = resolved;

        if !is_last && stdout_redirected {
            let err = crate::errors::PlanError::StdoutRedirectedMidPipeline {
                program: segment.program.to_string(),
            };
            eprintln!("jsh: {err}");
            wait_children(&mut children, &mut fds);
            return ExecutionAction::Continue(1);
        }

        if is_builtin {
            let mut stdin_reader = match stdin.into_reader() {
                Ok(reader) => reader,
                Err(msg) => {
                    eprintln!("{msg}");
                    wait_children(&mut children, &mut fds);
                    return ExecutionAction::Continue(1);
                }
            };
            let mut stdout_writer = match stdout.into_writer("stdout") {
                Ok(writer) => writer,
                Err(msg) => {
                    eprintln!("{msg}");
                    wait_children(&mut children, &mut fds);
                    return ExecutionAction::Continue(1);
                }
            };
            let mut stderr_writer = match stderr.into_writer("stderr") {
                Ok(writer) => writer,
                Err(msg) => {
                    eprintln!("{msg}");
                    wait_children(&mut children, &mut fds);
                    return ExecutionAction::Continue(1);
                }
            };

            if is_last {
                // Last command: run synchronously so we can use the real shell
                // state and capture the pipeline's final exit status.
                let status = match builtins::execute(
                    &segment.program,
                    &segment.args,
                    stdin_reader.as_mut(),
                    stdout_writer.as_mut(),
                    stderr_writer.as_mut(),
                    state,
                ) {
                    builtins::BuiltinAction::Continue(code)
                    | builtins::BuiltinAction::Exit(code) => code,
                };
                let _ = stdout_writer.flush();
                let _ = stderr_writer.flush();
                last_status = status;
            } else {
                // Non-last command: run synchronously, against a throwaway
                // shell state (job-control builtins don't make sense
                // mid-pipeline), but capture its stdout in memory rather than
                // writing straight to the pipe — the downstream reader isn't
                // spawned yet, and writing more than the pipe buffer would
                // deadlock. The capture is written to the real pipe once
                // every stage in the loop has been spawned.
                let mut local_state = throwaway_shell_state();
                let mut capture = Cursor::new(Vec::new());
                let _ = builtins::execute(
                    &segment.program,
                    &segment.args,
                    stdin_reader.as_mut(),
                    &mut capture,
                    stderr_writer.as_mut(),
                    &mut local_state,
                );
                let _ = stderr_writer.flush();
                pending_builtin_writes.push((stdout_writer, capture.into_inner()));
            }
        } else {
            let mut process = StdCommand::new(&segment.program);
            process.args(&segment.args);

            // ── Unix: reset shell-inherited signal handlers and join pipeline group ──
            #[cfg(unix)]
            {
                use std::os::unix::process::CommandExt;
                // Snapshot the current pgid *before* spawning so the closure
                // captures the right leader pid (None = first stage, creates new
                // group; Some(pgid) = subsequent stages, join that group).
                let captured_pgid = pipeline_pgid;
                unsafe {
                    process.pre_exec(move || {
                        let signals = [libc::SIGINT, libc::SIGTSTP, libc::SIGQUIT, libc::SIGPIPE];
                        for &sig in &signals {
                            if libc::signal(sig, libc::SIG_DFL) == libc::SIG_ERR {
                                return Err(std::io::Error::last_os_error());
                            }
                        }
                        let target_pgid = captured_pgid.map(|p| p as libc::pid_t).unwrap_or(0);
                        if libc::setpgid(0, target_pgid) != 0 {
                            return Err(std::io::Error::last_os_error());
                        }
                        Ok(())
                    });
                }
            }

            let (stdin_stdio, here_string) = match stdin.into_stdio() {
                Ok(result) => result,
                Err(msg) => {
                    eprintln!("{msg}");
                    wait_children(&mut children, &mut fds);
                    return ExecutionAction::Continue(1);
                }
            };
            let stdout_stdio = match stdout.into_stdio() {
                Ok(stdio) => stdio,
                Err(msg) => {
                    eprintln!("{msg}");
                    wait_children(&mut children, &mut fds);
                    return ExecutionAction::Continue(1);
                }
            };
            let stderr_stdio = match stderr.into_stdio() {
                Ok(stdio) => stdio,
                Err(msg) => {
                    eprintln!("{msg}");
                    wait_children(&mut children, &mut fds);
                    return ExecutionAction::Continue(1);
                }
            };

            process
                .stdin(stdin_stdio)
                .stdout(stdout_stdio)
                .stderr(stderr_stdio);

            let mut child = match process.spawn() {
                Ok(child) => child,
                Err(e) => {
                    let code = command_error(&segment.program, &e);
                    wait_children(&mut children, &mut fds);
                    return ExecutionAction::Continue(code);
                }
            };

            // ── Unix: close the setpgid race (parent side) ──
            #[cfg(unix)]
            if pipeline_pgid.is_none() {
                let child_pid = child.id() as libc::pid_t;
                unsafe {
                    libc::setpgid(child_pid, child_pid);
                }
                pipeline_pgid = Some(child.id());
            }

            if let Some(text) = here_string {
                if let Some(mut stdin) = child.stdin.take() {
                    let _ = writeln!(stdin, "{text}");
                }
            }

            children.push(child);
            last_external_index = Some(children.len() - 1);
        }

        prev_pipe = next_pipe_reader;
    }

    // Every stage is spawned now, so it's safe to deliver the output any
    // non-last builtin buffered earlier — the downstream reader exists and
    // won't block on an empty pipe.
    for (mut writer, bytes) in pending_builtin_writes {
        let _ = writer.write_all(&bytes);
        let _ = writer.flush();
    }

    // All fds are now owned by the spawned children (via `Stdio`) or this
    // stage's own writers; the collector's tracking duplicates are no longer
    // needed.
    fds.collect();

    // ── Background pipeline: hand off last child to the job table ──
    if background {
        if let Some(last_idx) = last_external_index {
            let last_child = children.swap_remove(last_idx);
            drop(children);
            let pgid = pipeline_pgid.unwrap_or_else(|| last_child.id());
            let (id, pid) = state
                .job_table
                .add_with_pgid(last_child, command_text.to_string(), pgid);
            println!("[{id}] {pid}");
        }
        return ExecutionAction::Continue(0);
    }

    // ── Foreground pipeline: wait for children ──
    #[cfg(unix)]
    {
        if children.is_empty() {
            return ExecutionAction::Continue(last_status);
        }

        let fg_pgid = pipeline_pgid.unwrap_or_else(|| children[0].id());
        let terminal_guard = match job_control::ForegroundTerminalGuard::new(fg_pgid as libc::pid_t) {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(fg_pgid, error = %e, "failed to move terminal to pipeline job group");
                eprintln!("jsh: failed to move terminal to pipeline job group {fg_pgid}: {e}");
                None
            }
        };

        let child_pids: Vec<u32> = children.iter().map(|child| child.id()).collect();
        let last_external_pid = last_external_index.and_then(|idx| children.get(idx).map(|child| child.id()));

        let wait_result =
            match wait_for_pipeline_process_group(&child_pids, fg_pgid as libc::pid_t, last_external_pid) {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("jsh: failed waiting for pipeline jobs: {e}");
                    drop(terminal_guard);
                    return ExecutionAction::Continue(1);
                }
            };

        drop(terminal_guard);

        match wait_result {
            PipelineWaitOutcome::Stopped => {
                let stopped_index = last_external_index.unwrap_or(0);
                let stopped_child = if stopped_index < children.len() {
                    children.swap_remove(stopped_index)
                } else {
                    children.swap_remove(0)
                };
                let (id, _) =
                    state
                        .job_table
                        .add_stopped_with_pgid(stopped_child, command_text.to_string(), fg_pgid);
                println!("[{id}]  Stopped  {command_text}");
                return ExecutionAction::Continue(0);
            }
            PipelineWaitOutcome::Exited(code) => {
                if last_is_external {
                    return ExecutionAction::Continue(code);
                }
            }
        }
    }

    #[cfg(not(unix))]
    for (idx, mut child) in children.into_iter().enumerate() {
        match child.wait() {
            Ok(status) => {
                if last_is_external && Some(idx) == last_external_index {
                    last_status = status::exit_code(status);
                }
            }
            Err(_) => {
                return ExecutionAction::Continue(1);
            }
        }
    }

    ExecutionAction::Continue(last_status)
}

/// A `ShellState` used only to satisfy the `builtins::execute` signature for
/// a builtin that isn't the pipeline's last stage. Built without touching
/// the terminal or forking — none of the real fields matter for a builtin
/// that can only write to its pipe.
fn throwaway_shell_state() -> ShellState {
    ShellState {
        job_table: JobTable::new(),
        last_exit_code: 0,
        pending_exit: false,
        interactive: false,
        #[cfg(unix)]
        shell_pgid: 0,
        #[cfg(unix)]
        default_termios: None,
    }
}

// ── Redirection resolution ──

#[derive(Debug)]
enum InputHandle {
    Inherit,
    Pipe(PipeReader),
    File(File),
    HereString(String),
}

#[derive(Debug)]
enum OutputHandle {
    Inherit,
    Null,
    File(File),
    Pipe(PipeWriter),
}

struct ResolvedRedirections {
    stdin: InputHandle,
    stdout: OutputHandle,
    stderr: OutputHandle,
    stdout_redirected: bool,
}

struct RedirectionDefaults {
    stdin: InputHandle,
    stdout: OutputHandle,
    stderr: OutputHandle,
}

impl OutputHandle {
    fn try_clone(&self) -> Result<OutputHandle, String> {
        match self {
            OutputHandle::Inherit => Ok(OutputHandle::Inherit),
            OutputHandle::Null => Ok(OutputHandle::Null),
            OutputHandle::File(file) => file
                .try_clone()
                .map(OutputHandle::File)
                .map_err(|e| format!("jsh: failed to duplicate file: {e}")),
            OutputHandle::Pipe(writer) => writer
                .try_clone()
                .map(OutputHandle::Pipe)
                .map_err(|e| format!("jsh: failed to duplicate pipe: {e}")),
        }
    }

    fn into_stdio(self) -> Result<Stdio, String> {
        Ok(match self {
            OutputHandle::Inherit => Stdio::inherit(),
            OutputHandle::Null => Stdio::null(),
            OutputHandle::File(file) => Stdio::from(file),
            OutputHandle::Pipe(writer) => Stdio::from(writer),
        })
    }

    fn into_writer(self, label: &str) -> Result<Box<dyn Write + Send>, String> {
        match self {
            OutputHandle::Inherit => {
                if label == "stderr" {
                    Ok(Box::new(io::stderr()))
                } else {
                    Ok(Box::new(io::stdout()))
                }
            }
            OutputHandle::Null => Ok(Box::new(io::sink())),
            OutputHandle::File(file) => Ok(Box::new(file)),
            OutputHandle::Pipe(writer) => Ok(Box::new(writer)),
        }
    }
}

impl InputHandle {
    fn into_stdio(self) -> Result<(Stdio, Option<String>), String> {
        Ok(match self {
            InputHandle::Inherit => (Stdio::inherit(), None),
            InputHandle::Pipe(reader) => (Stdio::from(reader), None),
            InputHandle::File(file) => (Stdio::from(file), None),
            InputHandle::HereString(text) => (Stdio::piped(), Some(text)),
        })
    }

    fn into_reader(self) -> Result<Box<dyn Read + Send>, String> {
        match self {
            InputHandle::Inherit => Ok(Box::new(io::stdin())),
            InputHandle::Pipe(reader) => Ok(Box::new(reader)),
            InputHandle::File(file) => Ok(Box::new(file)),
            InputHandle::HereString(text) => Ok(Box::new(Cursor::new(format!("{text}\n")))),
        }
    }
}

/// Apply one subcommand's redirections on top of the pipeline-assigned
/// defaults (spec §4.C: "later redirections in the list win").
fn resolve_redirections(
    redirections: &[Redirection],
    defaults: RedirectionDefaults,
    fds: &mut FdCollector,
) -> Result<ResolvedRedirections, String> {
    let mut stdin = defaults.stdin;
    let mut stdout = defaults.stdout;
    let mut stderr = defaults.stderr;
    let mut stdout_redirected = false;

    for redir in redirections {
        let path = redir.path.as_deref().unwrap_or("");
        match (&redir.kind, redir.fd) {
            // Piping is wired structurally by the caller; the marker itself
            // carries no independent target.
            (RedirectKind::Pipe, _) => {}

            (RedirectKind::FileWrite, 1) => {
                stdout = open_output_file(path, false, fds)?;
                stdout_redirected = true;
            }
            (RedirectKind::FileWriteAppend, 1) => {
                stdout = open_output_file(path, true, fds)?;
                stdout_redirected = true;
            }
            (RedirectKind::FileRead, 0) => {
                stdin = open_input_file(path, fds)?;
            }
            (RedirectKind::FileWrite, 2) => {
                stderr = open_output_file(path, false, fds)?;
            }
            (RedirectKind::FileWriteAppend, 2) => {
                stderr = open_output_file(path, true, fds)?;
            }

            // 2>&1: stderr → wherever stdout currently points.
            (RedirectKind::FdDup, 2) if path == "1" => {
                stderr = stdout.try_clone()?;
            }
            // 1>&2: stdout → wherever stderr currently points.
            (RedirectKind::FdDup, 1) if path == "2" => {
                stdout = stderr.try_clone()?;
                stdout_redirected = true;
            }
            // N>&N (fd duplicated to itself) — no-op.
            (RedirectKind::FdDup, fd) if path.parse::<i32>() == Ok(*fd) => {}

            (RedirectKind::HereString, 0) => {
                stdin = InputHandle::HereString(path.to_string());
            }

            _ => {
                let err = crate::errors::PlanError::UnsupportedRedirection {
                    fd: redir.fd,
                    target: format!("{:?}", redir.kind),
                };
                return Err(format!("jsh: {err}"));
            }
        }
    }

    Ok(ResolvedRedirections {
        stdin,
        stdout,
        stderr,
        stdout_redirected,
    })
}

/// `/dev/null` (or `NUL` on Windows) is special-cased rather than actually
/// opened, matching the teacher's original redirection resolver.
fn is_null_device(path: &str) -> bool {
    if cfg!(windows) {
        path.eq_ignore_ascii_case("NUL") || path.eq_ignore_ascii_case("/dev/null")
    } else {
        path == "/dev/null"
    }
}

fn open_output_file(path: &str, append: bool, fds: &mut FdCollector) -> Result<OutputHandle, String> {
    if is_null_device(path) {
        return Ok(OutputHandle::Null);
    }

    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
    };

    let file = file.map_err(|source| {
        format!(
            "jsh: {}",
            crate::errors::PlanError::Open { path: path.to_string(), source }
        )
    })?;
    if let Ok(tracked) = file.try_clone() {
        fds.add_file(tracked);
    }
    Ok(OutputHandle::File(file))
}

fn open_input_file(path: &str, fds: &mut FdCollector) -> Result<InputHandle, String> {
    let file = File::open(path).map_err(|source| {
        format!(
            "jsh: {}",
            crate::errors::PlanError::Open { path: path.to_string(), source }
        )
    })?;
    if let Ok(tracked) = file.try_clone() {
        fds.add_file(tracked);
    }
    Ok(InputHandle::File(file))
}

/// Abort a partially-planned pipeline: reap whatever already spawned and
/// close every pipe/file fd the Planner opened for the stages that never got
/// that far (spec §4.C: "the collector closes every fd opened so far").
fn wait_children(children: &mut Vec<std::process::Child>, fds: &mut FdCollector) {
    fds.collect();
    for mut child in children.drain(..) {
        let _ = child.wait();
    }
}

// ── Single-command execution (no pipe) ──

fn run_builtin(segment: &ExpandedSubcommand<'_>, state: &mut ShellState) -> ExecutionAction {
    let mut fds = FdCollector::new();
    let defaults = RedirectionDefaults {
        stdin: InputHandle::Inherit,
        stdout: OutputHandle::Inherit,
        stderr: OutputHandle::Inherit,
    };

    let resolved = match resolve_redirections(segment.redirections, defaults, &mut fds) {
        Ok(resolved) => resolved,
        Err(msg) => {
            eprintln!("{msg}");
            fds.collect();
            return ExecutionAction::Continue(1);
        }
    };

    let ResolvedRedirections {
        stdin,
        stdout,
        stderr,
        ..
    } = resolved;

    let mut stdin_reader = match stdin.into_reader() {
        Ok(reader) => reader,
        Err(msg) => {
            eprintln!("{msg}");
            fds.collect();
            return ExecutionAction::Continue(1);
        }
    };

    let mut stdout_writer = match stdout.into_writer("stdout") {
        Ok(writer) => writer,
        Err(msg) => {
            eprintln!("{msg}");
            fds.collect();
            return ExecutionAction::Continue(1);
        }
    };

    let mut stderr_writer = match stderr.into_writer("stderr") {
        Ok(writer) => writer,
        Err(msg) => {
            eprintln!("{msg}");
            fds.collect();
            return ExecutionAction::Continue(1);
        }
    };

    let action = match builtins::execute(
        &segment.program,
        &segment.args,
        stdin_reader.as_mut(),
        stdout_writer.as_mut(),
        stderr_writer.as_mut(),
        state,
    ) {
        builtins::BuiltinAction::Continue(code) => ExecutionAction::Continue(code),
        builtins::BuiltinAction::Exit(code) => ExecutionAction::Exit(code),
    };

    let _ = stdout_writer.flush();
    let _ = stderr_writer.flush();
    fds.collect();

    action
}

/// Spawn an external program with I/O redirections applied. If `background`
/// is true, the child is handed off to the job table immediately.
fn run_external(
    segment: &ExpandedSubcommand<'_>,
    background: bool,
    state: &mut ShellState,
    command_text: &str,
) -> i32 {
    let mut fds = FdCollector::new();
    let defaults = RedirectionDefaults {
        stdin: InputHandle::Inherit,
        stdout: OutputHandle::Inherit,
        stderr: OutputHandle::Inherit,
    };

    let resolved = match resolve_redirections(segment.redirections, defaults, &mut fds) {
        Ok(resolved) => resolved,
        Err(msg) => {
            eprintln!("{msg}");
            fds.collect();
            return 1;
        }
    };

    let ResolvedRedirections {
        stdin,
        stdout,
        stderr,
        ..
    } = resolved;

    let mut process = StdCommand::new(&segment.program);
    process.args(&segment.args);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Put the spawned process in its own process group before exec so
        // terminal job-control signals (Ctrl-C / Ctrl-Z) can target it safely.
        unsafe {
            process.pre_exec(|| {
                let signals = [libc::SIGINT, libc::SIGTSTP, libc::SIGQUIT, libc::SIGPIPE];
                for &sig in &signals {
                    if libc::signal(sig, libc::SIG_DFL) == libc::SIG_ERR {
                        return Err(std::io::Error::last_os_error());
                    }
                }
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let (stdin_stdio, here_string) = match stdin.into_stdio() {
        Ok(result) => result,
        Err(msg) => {
            eprintln!("{msg}");
            fds.collect();
            return 1;
        }
    };

    let stdout_stdio = match stdout.into_stdio() {
        Ok(stdio) => stdio,
        Err(msg) => {
            eprintln!("{msg}");
            fds.collect();
            return 1;
        }
    };

    let stderr_stdio = match stderr.into_stdio() {
        Ok(stdio) => stdio,
        Err(msg) => {
            eprintln!("{msg}");
            fds.collect();
            return 1;
        }
    };

    process
        .stdin(stdin_stdio)
        .stdout(stdout_stdio)
        .stderr(stderr_stdio);

    let mut child = match process.spawn() {
        Ok(child) => child,
        Err(e) => {
            fds.collect();
            return command_error(&segment.program, &e);
        }
    };

    // The fds are now owned by the spawned child (via `Stdio`); the
    // collector's tracking duplicates are no longer needed.
    fds.collect();

    if let Some(text) = here_string {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = writeln!(stdin, "{text}");
        }
    }

    let pgid = child_process_group(&child, &segment.program);

    // ── Background: hand off to job table ──
    if background {
        let (id, pid) = state
            .job_table
            .add_with_pgid(child, command_text.to_string(), pgid);
        println!("[{id}] {pid}");
        return 0;
    }

    run_foreground(child, &segment.program, pgid, state, command_text)
}

fn child_process_group(
    child: &std::process::Child,
    #[allow(unused_variables)] cmd_name: &str,
) -> u32 {
    #[cfg(unix)]
    {
        let pid = child.id() as libc::pid_t;

        if let Err(e) = job_control::set_process_group(pid, pid) {
            eprintln!("jsh: {cmd_name}: failed to set process group: {e}");
        }

        return match job_control::process_group_id(pid) {
            Ok(pgid) => pgid as u32,
            Err(e) => {
                eprintln!("jsh: {cmd_name}: failed to read process group: {e}");
                child.id()
            }
        };
    }

    #[cfg(not(unix))]
    {
        child.id()
    }
}

/// Wait for a foreground child process to finish or be stopped (Unix: Ctrl-Z).
fn run_foreground(
    mut child: std::process::Child,
    cmd_name: &str,
    #[allow(unused_variables)] pgid: u32,
    #[allow(unused_variables)] state: &mut ShellState,
    #[allow(unused_variables)] command_text: &str,
) -> i32 {
    #[cfg(unix)]
    {
        let pid = child.id() as libc::pid_t;
        let terminal_guard = match job_control::ForegroundTerminalGuard::new(pgid as libc::pid_t) {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(cmd_name, error = %e, "failed to move terminal to job");
                eprintln!("jsh: {cmd_name}: failed to move terminal to job: {e}");
                None
            }
        };

        let wait_outcome = match job_control::wait_for_pid(pid) {
            Ok(outcome) => outcome,
            Err(e) => {
                eprintln!("jsh: {cmd_name}: waitpid failed: {e}");
                return 1;
            }
        };

        drop(terminal_guard);

        if let job_control::WaitOutcome::Stopped = wait_outcome {
            let (id, _) = state
                .job_table
                .add_stopped_with_pgid(child, command_text.to_string(), pgid);
            println!("[{id}]  Stopped  {command_text}");
            return 0;
        }

        if let job_control::WaitOutcome::Exited(code) = wait_outcome {
            return code;
        }

        if let job_control::WaitOutcome::Signaled(signal) = wait_outcome {
            eprintln!("jsh: {cmd_name}: exited due to signal {signal}");
            return -1;
        }

        1
    }

    #[cfg(not(unix))]
    {
        match child.wait() {
            Ok(status) => status::exit_code(status),
            Err(e) => {
                eprintln!("jsh: {cmd_name}: {e}");
                1
            }
        }
    }
}

/// Map a spawn/exec error to the appropriate exit code and message (spec
/// §4.D's refined exec-failure diagnostics): a directory named as the
/// command reports "Is a directory"; a script whose `#!` interpreter is
/// missing names that interpreter; anything else not found is "command not
/// found" (127), and every other failure is 126.
fn command_error(program: &str, e: &std::io::Error) -> i32 {
    let diagnosis = diagnose_exec_failure(program, e);
    tracing::debug!(program, %diagnosis, "spawn failed");
    eprintln!("jsh: {program}: {diagnosis}");
    diagnosis.exit_code()
}

fn diagnose_exec_failure(program: &str, e: &std::io::Error) -> crate::errors::ExecDiagnosis {
    use crate::errors::ExecDiagnosis;

    if e.kind() != io::ErrorKind::NotFound {
        return ExecDiagnosis::Other(e.to_string());
    }

    let path = std::path::Path::new(program);
    if path.is_dir() {
        return ExecDiagnosis::IsADirectory;
    }

    // `program` may have been found on PATH but failed to exec as a script
    // with a dangling shebang; read its first 256 bytes to check.
    if let Ok(mut file) = File::open(path) {
        let mut head = [0u8; 256];
        if let Ok(n) = file.read(&mut head) {
            if let Ok(text) = std::str::from_utf8(&head[..n]) {
                if let Some(rest) = text.strip_prefix("#!") {
                    let interpreter = rest.lines().next().unwrap_or("").trim();
                    if !interpreter.is_empty() && !std::path::Path::new(interpreter).exists() {
                        return ExecDiagnosis::MissingInterpreter(interpreter.to_string());
                    }
                }
            }
        }
    }

    ExecDiagnosis::NotFound
}

#[cfg(unix)]
enum PipelineWaitOutcome {
    Exited(i32),
    Stopped,
}

#[cfg(unix)]
fn wait_for_pipeline_process_group(
    child_pids: &[u32],
    pgid: libc::pid_t,
    last_external_pid: Option<u32>,
) -> io::Result<PipelineWaitOutcome> {
    if child_pids.is_empty() {
        return Ok(PipelineWaitOutcome::Exited(0));
    }

    use std::collections::HashSet;

    let mut remaining: HashSet<libc::pid_t> =
        child_pids.iter().map(|pid| *pid as libc::pid_t).collect();
    let mut last_exit_code: Option<i32> = None;

    while !remaining.is_empty() {
        let mut raw_status: libc::c_int = 0;
        let waited = unsafe { libc::waitpid(-pgid, &mut raw_status, libc::WUNTRACED) };

        if waited < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }

        if unsafe { libc::WIFSTOPPED(raw_status) } {
            return Ok(PipelineWaitOutcome::Stopped);
        }

        if !remaining.remove(&waited) {
            continue;
        }

        let code = if unsafe { libc::WIFEXITED(raw_status) } {
            unsafe { libc::WEXITSTATUS(raw_status) as i32 }
        } else if unsafe { libc::WIFSIGNALED(raw_status) } {
            let signal = unsafe { libc::WTERMSIG(raw_status) };
            eprintln!("jsh: process {waited} exited due to signal {signal}");
            -1
        } else {
            1
        };

        if Some(waited as u32) == last_external_pid {
            last_exit_code = Some(code);
        }
    }

    Ok(PipelineWaitOutcome::Exited(last_exit_code.unwrap_or(0)))
}
