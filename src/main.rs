//! Thin binary wrapper: wires the `jsh` library to stdin/stdout, signal
//! handlers, and the line editor (SPEC_FULL §1's lib/bin split). The engine
//! itself lives in `src/lib.rs` and its modules; this file is the read loop.

use std::io::{self, Write};
use std::sync::atomic::Ordering;

use clap::Parser;

use jsh::ast::ParseOutcome;
use jsh::editor::{LineEditor, EDITOR_ACTIVE};
use jsh::runner::{self, RunOutcome};
use jsh::state::ShellState;
use jsh::{config, parser};

/// `jsh [-c COMMAND] [--login] [--norc] [--version]` (SPEC_FULL §6.8).
#[derive(Parser)]
#[command(name = "james-shell", version, about = "An interactive Unix shell")]
struct Cli {
    /// Run one command string through the Runner and exit with its status,
    /// instead of starting the interactive prompt.
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,

    /// Mark this as a login shell. Accepted for CLI-surface compatibility;
    /// `.jshrc` is the only startup file this shell reads regardless.
    #[arg(long)]
    login: bool,

    /// Skip loading `$HOME/.jshrc`.
    #[arg(long)]
    norc: bool,
}

fn init_tracing() {
    let filter = std::env::var("JSH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "warn".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(io::stderr)
        .try_init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let _ = cli.login;

    #[cfg(unix)]
    jsh::job_control::ignore_job_control_signals();

    ctrlc::set_handler(|| {
        // Suppress the extra newline while the line editor holds raw mode:
        // it already renders its own `^C` (see editor.rs). This only fires
        // on platforms where SIGINT can reach the shell despite raw mode.
        if !EDITOR_ACTIVE.load(Ordering::Relaxed) {
            println!();
            let _ = io::stdout().flush();
        }
    })
    .expect("failed to install Ctrl-C handler");

    if !cli.norc {
        config::load_rc_file();
    }

    let mut state = ShellState::new();

    if let Some(command) = cli.command {
        let code = run_one_shot(&command, &mut state);
        std::process::exit(code);
    }

    run_interactive(&mut state);
    std::process::exit(state.last_exit_code);
}

/// `-c COMMAND`: run exactly one line through the same Runner the prompt
/// uses, with no line editor and no history (SPEC_FULL §6.8). A line that
/// needs continuation (trailing `|`, unterminated quote) is a syntax error
/// here — there is no second physical line to append.
fn run_one_shot(command: &str, state: &mut ShellState) -> i32 {
    match parser::parse(command) {
        ParseOutcome::Commands(cmds) => match runner::run_line(&cmds, command, state) {
            RunOutcome::Continue => state.last_exit_code,
            RunOutcome::Exit(code) => code,
        },
        ParseOutcome::Incomplete(_) => {
            eprintln!("jsh: -c: unexpected end of command (incomplete quote or pipe)");
            2
        }
        ParseOutcome::Error(e) => {
            eprintln!("{e}");
            2
        }
    }
}

/// The interactive read loop: read a physical line, join further physical
/// lines while the parser reports continuation (spec §4.I.a), run the
/// resulting Command list, repeat.
fn run_interactive(state: &mut ShellState) {
    let mut editor = LineEditor::new();
    const PROMPT: &str = "jsh> ";

    'repl: loop {
        state.job_table.reap();

        let first_line = match editor.read_line(PROMPT) {
            Ok(Some(line)) => line,
            Ok(None) => {
                println!("\nGoodbye!");
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                eprintln!("jsh: error reading input: {e}");
                break;
            }
        };

        let mut buffer = first_line;

        let commands = loop {
            match parser::parse(&buffer) {
                ParseOutcome::Commands(cmds) => break cmds,
                ParseOutcome::Error(e) => {
                    eprintln!("{e}");
                    editor.add_to_history(&buffer);
                    state.last_exit_code = 2;
                    continue 'repl;
                }
                ParseOutcome::Incomplete(continuation) => {
                    let suffix = parser::continuation_prompt_suffix(continuation);
                    match editor.read_line(suffix) {
                        Ok(Some(more)) => {
                            buffer.push('\n');
                            buffer.push_str(&more);
                        }
                        Ok(None) => {
                            eprintln!(
                                "jsh: unexpected EOF while looking for matching quote/pipe target"
                            );
                            editor.add_to_history(&buffer);
                            state.last_exit_code = 2;
                            continue 'repl;
                        }
                        Err(_) => continue 'repl,
                    }
                }
            }
        };

        editor.add_to_history(&buffer);

        if commands.is_empty() {
            continue;
        }

        match runner::run_line(&commands, &buffer, state) {
            RunOutcome::Continue => {}
            RunOutcome::Exit(code) => {
                state.last_exit_code = code;
                break;
            }
        }
    }
}
