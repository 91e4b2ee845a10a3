//! Top of the "external" parser stack: join physical lines across
//! continuation, tokenize, and build the Command list the core consumes.

use crate::ast::{build_commands, Command, ContinuationState, ParseOutcome};
use crate::token::tokenize;

/// Parse one logical line (which may already be the concatenation of
/// several physical lines joined by the continuation loop) into a Command
/// list, or report that another physical line is needed.
pub fn parse(input: &str) -> ParseOutcome {
    build_commands(tokenize(input))
}

/// Helper for the outer read loop: given a continuation state, the suffix to
/// append to the accumulated buffer before the next physical line.
pub fn continuation_prompt_suffix(state: ContinuationState) -> &'static str {
    match state {
        ContinuationState::None => "",
        ContinuationState::Pipe => "> ",
        ContinuationState::DoubleQuotedString => "dquote> ",
        ContinuationState::SingleQuotedString => "quote> ",
    }
}

/// Drive the continuation loop: repeatedly call `read_more` to obtain
/// additional physical lines until a complete parse is produced or EOF/error
/// occurs. `read_more` receives the continuation-specific prompt suffix.
pub fn parse_with_continuation(
    first_line: String,
    mut read_more: impl FnMut(&str) -> Option<String>,
) -> Result<Vec<Command>, String> {
    let mut buffer = first_line;
    loop {
        match parse(&buffer) {
            ParseOutcome::Commands(cmds) => return Ok(cmds),
            ParseOutcome::Error(e) => return Err(e),
            ParseOutcome::Incomplete(state) => {
                let suffix = continuation_prompt_suffix(state);
                match read_more(suffix) {
                    Some(more) => {
                        buffer.push('\n');
                        buffer.push_str(&more);
                    }
                    None => {
                        return Err(
                            "jsh: unexpected EOF while looking for matching quote/pipe target"
                                .to_string(),
                        )
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_parse_roundtrip() {
        match parse("echo hi") {
            ParseOutcome::Commands(cmds) => assert_eq!(cmds.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn continuation_joins_physical_lines() {
        let mut lines = vec!["world\"".to_string()].into_iter();
        let cmds = parse_with_continuation("echo \"hello".to_string(), |_suffix| lines.next())
            .expect("should parse after continuation");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].subcommands[0].args.len(), 2);
    }

    #[test]
    fn continuation_eof_is_error() {
        let result = parse_with_continuation("echo \"unterminated".to_string(), |_| None);
        assert!(result.is_err());
    }
}
