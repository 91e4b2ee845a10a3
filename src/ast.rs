//! Syntax tree shape the core consumes: a list of [`Command`]s, each a
//! pipeline of [`Subcommand`]s with redirections and execution attributes.

use std::collections::HashSet;

use crate::token::{Token, TokenKind};

/// The kind of a single I/O redirection instruction: the four POSIX kinds
/// plus two supplements, `FdDup` for `2>&1`/`1>&2` and `HereString` for `<<<`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectKind {
    Pipe,
    FileRead,
    FileWrite,
    FileWriteAppend,
    /// Duplicate another fd onto this one (e.g. `2>&1` duplicates fd 1 onto fd 2).
    FdDup,
    /// Feed a literal string as stdin, as if piped from `echo`.
    HereString,
}

#[derive(Debug, Clone)]
pub struct Redirection {
    pub kind: RedirectKind,
    /// The fd in the child to be replaced.
    pub fd: i32,
    /// The path token (file redirections), the target fd as text (`FdDup`),
    /// or the literal text (`HereString`). Unused for `Pipe`.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    InBackground,
    ShortCircuitOnFailure,
}

#[derive(Debug, Clone, Default)]
pub struct Subcommand {
    pub args: Vec<Token>,
    pub redirections: Vec<Redirection>,
}

#[derive(Debug, Clone, Default)]
pub struct Command {
    pub subcommands: Vec<Subcommand>,
    pub attributes: HashSet<Attribute>,
}

impl Command {
    pub fn has(&self, attr: Attribute) -> bool {
        self.attributes.contains(&attr)
    }
}

/// State the outer read loop uses to decide whether another physical line
/// must be appended before re-parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationState {
    None,
    Pipe,
    DoubleQuotedString,
    SingleQuotedString,
}

/// What [`build_commands`] produced for one logical input (after joining
/// however many physical lines continuation required).
pub enum ParseOutcome {
    Commands(Vec<Command>),
    Incomplete(ContinuationState),
    Error(String),
}

/// Build the Command list from a token stream.
///
/// Splits on `;` and `&` (attribute markers, not new commands beyond the
/// InBackground flag) and `&&` (ShortCircuitOnFailure on the *preceding*
/// command). Within each command, splits on `|` into subcommands, and lifts
/// redirection operators out of the argument list into
/// `Subcommand::redirections`.
///
/// `||` is intentionally unsupported and is reported as a syntax error
/// rather than silently treated as `;` or `&&`.
pub fn build_commands(tokens: Vec<Token>) -> ParseOutcome {
    if tokens.is_empty() {
        return ParseOutcome::Commands(vec![]);
    }

    // Drop a trailing comment token; it never reaches argv.
    let tokens: Vec<Token> = tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Comment)
        .collect();

    if tokens.is_empty() {
        return ParseOutcome::Commands(vec![]);
    }

    let mut commands = Vec::new();
    let mut current_tokens: Vec<Token> = Vec::new();
    // Set the moment a preceding command is committed on `&&`; cleared the
    // moment its right-hand side is committed. Only ever true with
    // `current_tokens` empty while we're still waiting for that RHS, so a
    // dangling `&&` (nothing follows it) is exactly the case where both
    // `current_tokens.is_empty()` and this flag are true at commit time.
    let mut awaiting_and_rhs = false;

    macro_rules! finish_command {
        () => {{
            if current_tokens.is_empty() {
                if awaiting_and_rhs {
                    return ParseOutcome::Error(
                        "jsh: syntax error near unexpected token `&&'".to_string(),
                    );
                }
            } else {
                match build_single_command(std::mem::take(&mut current_tokens)) {
                    Ok(cmd) => {
                        commands.push(cmd);
                        awaiting_and_rhs = false;
                    }
                    Err(e) => return ParseOutcome::Error(e),
                }
            }
        }};
    }

    let mut iter = tokens.into_iter().peekable();
    while let Some(tok) = iter.next() {
        match (&tok.kind, tok.text.as_str()) {
            (TokenKind::Special, "||") => {
                return ParseOutcome::Error(
                    "jsh: syntax error: `||` is not supported".to_string(),
                );
            }
            (TokenKind::Special, ";") => {
                finish_command!();
            }
            (TokenKind::Special, "&&") => {
                if current_tokens.is_empty() {
                    return ParseOutcome::Error(
                        "jsh: syntax error near unexpected token `&&'".to_string(),
                    );
                }
                // The command that just finished is the one `&&` applies to,
                // not whatever comes after it — tag it here, directly, while
                // it's still the value we just built.
                match build_single_command(std::mem::take(&mut current_tokens)) {
                    Ok(mut cmd) => {
                        cmd.attributes.insert(Attribute::ShortCircuitOnFailure);
                        commands.push(cmd);
                        awaiting_and_rhs = true;
                    }
                    Err(e) => return ParseOutcome::Error(e),
                }
            }
            (TokenKind::Special, "&") => {
                if current_tokens.is_empty() {
                    return ParseOutcome::Error(
                        "jsh: syntax error near unexpected token `&'".to_string(),
                    );
                }
                match build_single_command(std::mem::take(&mut current_tokens)) {
                    Ok(mut cmd) => {
                        cmd.attributes.insert(Attribute::InBackground);
                        commands.push(cmd);
                        awaiting_and_rhs = false;
                    }
                    Err(e) => return ParseOutcome::Error(e),
                }
            }
            _ => current_tokens.push(tok),
        }
    }

    if !current_tokens.is_empty() || awaiting_and_rhs {
        // Continuation check: examine only the last subcommand of what would
        // be the final (possibly incomplete) command.
        if let Some(state) = continuation_state_of(&current_tokens) {
            return ParseOutcome::Incomplete(state);
        }
        finish_command!();
    }

    ParseOutcome::Commands(commands)
}

/// Looks at the last subcommand's last token only.
fn continuation_state_of(tokens: &[Token]) -> Option<ContinuationState> {
    let last = tokens.last()?;
    match last.kind {
        TokenKind::Special if last.text == "|" => Some(ContinuationState::Pipe),
        TokenKind::UnterminatedSingleQuoted => Some(ContinuationState::SingleQuotedString),
        TokenKind::UnterminatedDoubleQuoted => Some(ContinuationState::DoubleQuotedString),
        _ => None,
    }
}

fn build_single_command(tokens: Vec<Token>) -> Result<Command, String> {
    if let Some(state) = continuation_state_of(&tokens) {
        // A trailing pipe/unterminated quote inside what should be a complete
        // command also means the whole line is incomplete; bubble it up by
        // re-wrapping as an error the caller never sees (build_commands
        // checks continuation before calling this for the final segment).
        return Err(format!("jsh: incomplete input ({state:?})"));
    }

    let mut subcommands: Vec<Subcommand> = vec![Subcommand::default()];

    let mut iter = tokens.into_iter().peekable();
    while let Some(tok) = iter.next() {
        if tok.kind != TokenKind::Special {
            subcommands.last_mut().unwrap().args.push(tok);
            continue;
        }

        match tok.text.as_str() {
            "|" => {
                subcommands
                    .last_mut()
                    .unwrap()
                    .redirections
                    .push(Redirection {
                        kind: RedirectKind::Pipe,
                        fd: 1,
                        path: None,
                    });
                subcommands.push(Subcommand::default());
            }
            ">" => push_file_redirect(&mut subcommands, &mut iter, 1, RedirectKind::FileWrite)?,
            ">>" => {
                push_file_redirect(&mut subcommands, &mut iter, 1, RedirectKind::FileWriteAppend)?
            }
            "1>" => push_file_redirect(&mut subcommands, &mut iter, 1, RedirectKind::FileWrite)?,
            "1>>" => {
                push_file_redirect(&mut subcommands, &mut iter, 1, RedirectKind::FileWriteAppend)?
            }
            "<" => push_file_redirect(&mut subcommands, &mut iter, 0, RedirectKind::FileRead)?,
            "2>" => push_file_redirect(&mut subcommands, &mut iter, 2, RedirectKind::FileWrite)?,
            "2>>" => {
                push_file_redirect(&mut subcommands, &mut iter, 2, RedirectKind::FileWriteAppend)?
            }
            "2>&1" => subcommands
                .last_mut()
                .unwrap()
                .redirections
                .push(Redirection {
                    kind: RedirectKind::FdDup,
                    fd: 2,
                    path: Some("1".to_string()),
                }),
            "1>&2" | ">&2" => subcommands
                .last_mut()
                .unwrap()
                .redirections
                .push(Redirection {
                    kind: RedirectKind::FdDup,
                    fd: 1,
                    path: Some("2".to_string()),
                }),
            ">&1" => subcommands
                .last_mut()
                .unwrap()
                .redirections
                .push(Redirection {
                    kind: RedirectKind::FdDup,
                    fd: 1,
                    path: Some("1".to_string()),
                }),
            "<<<" => {
                let text_tok = iter.next().ok_or_else(|| {
                    "jsh: syntax error: expected text after '<<<'".to_string()
                })?;
                subcommands
                    .last_mut()
                    .unwrap()
                    .redirections
                    .push(Redirection {
                        kind: RedirectKind::HereString,
                        fd: 0,
                        path: Some(text_tok.text),
                    });
            }
            other => {
                return Err(format!("jsh: syntax error: unexpected token `{other}'"));
            }
        }
    }

    Ok(Command {
        subcommands,
        attributes: HashSet::new(),
    })
}

fn push_file_redirect(
    subcommands: &mut [Subcommand],
    iter: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
    fd: i32,
    kind: RedirectKind,
) -> Result<(), String> {
    let path_tok = iter
        .next()
        .ok_or_else(|| "jsh: syntax error: expected filename after redirection operator".to_string())?;
    subcommands
        .last_mut()
        .unwrap()
        .redirections
        .push(Redirection {
            kind,
            fd,
            path: Some(path_tok.text),
        });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokenize;

    fn commands_of(input: &str) -> Vec<Command> {
        match build_commands(tokenize(input)) {
            ParseOutcome::Commands(cmds) => cmds,
            ParseOutcome::Incomplete(s) => panic!("unexpected incomplete: {s:?}"),
            ParseOutcome::Error(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn empty_input_yields_no_commands() {
        assert!(commands_of("").is_empty());
        assert!(commands_of("   ").is_empty());
    }

    #[test]
    fn comment_only_yields_no_commands() {
        assert!(commands_of("# just a comment").is_empty());
    }

    #[test]
    fn single_pipeline_split_on_pipe() {
        let cmds = commands_of("echo hello | tr a b");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].subcommands.len(), 2);
        assert_eq!(cmds[0].subcommands[0].redirections.len(), 1);
        assert_eq!(cmds[0].subcommands[0].redirections[0].kind, RedirectKind::Pipe);
    }

    #[test]
    fn semicolon_splits_independent_commands() {
        let cmds = commands_of("echo a ; echo b");
        assert_eq!(cmds.len(), 2);
        assert!(!cmds[0].has(Attribute::ShortCircuitOnFailure));
        assert!(!cmds[1].has(Attribute::ShortCircuitOnFailure));
    }

    #[test]
    fn short_circuit_attribute_on_preceding_command() {
        let cmds = commands_of("true && echo ok");
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].has(Attribute::ShortCircuitOnFailure));
        assert!(!cmds[1].has(Attribute::ShortCircuitOnFailure));
    }

    #[test]
    fn background_attribute() {
        let cmds = commands_of("sleep 5 &");
        assert_eq!(cmds.len(), 1);
        assert!(cmds[0].has(Attribute::InBackground));
    }

    #[test]
    fn trailing_pipe_is_continuation() {
        match build_commands(tokenize("ls |")) {
            ParseOutcome::Incomplete(ContinuationState::Pipe) => {}
            other => panic!("expected Incomplete(Pipe), got {other:?}"),
        }
    }

    #[test]
    fn unterminated_double_quote_is_continuation() {
        match build_commands(tokenize(r#"echo "hello"#)) {
            ParseOutcome::Incomplete(ContinuationState::DoubleQuotedString) => {}
            other => panic!("expected Incomplete(DoubleQuotedString), got {other:?}"),
        }
    }

    #[test]
    fn or_operator_is_rejected() {
        match build_commands(tokenize("false || echo fallback")) {
            ParseOutcome::Error(_) => {}
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn leading_and_operator_is_error() {
        match build_commands(tokenize("&& echo hi")) {
            ParseOutcome::Error(_) => {}
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn redirections_lifted_out_of_args() {
        let cmds = commands_of("cmd > out.txt 2> err.txt < in.txt");
        let sub = &cmds[0].subcommands[0];
        assert_eq!(sub.args.len(), 1);
        assert_eq!(sub.redirections.len(), 3);
    }

    #[test]
    fn here_string_redirection() {
        let cmds = commands_of("cat <<< hello");
        let sub = &cmds[0].subcommands[0];
        assert_eq!(sub.redirections[0].kind, RedirectKind::HereString);
        assert_eq!(sub.redirections[0].path.as_deref(), Some("hello"));
    }

    #[test]
    fn stderr_to_stdout_dup() {
        let cmds = commands_of("ls 2>&1");
        let sub = &cmds[0].subcommands[0];
        assert_eq!(sub.redirections[0].kind, RedirectKind::FdDup);
        assert_eq!(sub.redirections[0].fd, 2);
        assert_eq!(sub.redirections[0].path.as_deref(), Some("1"));
    }
}

impl std::fmt::Debug for ParseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseOutcome::Commands(cmds) => write!(f, "Commands({} commands)", cmds.len()),
            ParseOutcome::Incomplete(s) => write!(f, "Incomplete({s:?})"),
            ParseOutcome::Error(e) => write!(f, "Error({e})"),
        }
    }
}
