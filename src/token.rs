//! Tokenizer: turns one physical input line into a sequence of [`Token`]s.
//!
//! This is the lexical layer of the "external" command-line parser described
//! in the design (the syntax tree it produces is the core's input contract).
//! It never looks at redirection operators or pipes specially — those are
//! recognized by `ast::build_commands` from plain [`TokenKind::Bare`]/
//! [`TokenKind::Special`] text. The tokenizer's only job is quoting,
//! escaping, and detecting truncated quotes/comments.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// An unquoted word, possibly containing backslash escapes already resolved.
    Bare,
    /// `'...'` — fully literal, no escapes recognized inside.
    SingleQuoted,
    /// `"..."` — backslash escapes `\"`, `\\`, `\$`, `` \` `` recognized inside.
    DoubleQuoted,
    /// A `'` was opened but never closed on this physical line.
    UnterminatedSingleQuoted,
    /// A `"` was opened but never closed on this physical line.
    UnterminatedDoubleQuoted,
    /// An operator recognized by position rather than content: `|`, `&&`,
    /// `;`, `&`, and the redirection operators (`>`, `>>`, `<`, `<<<`, `2>`,
    /// `2>>`, `2>&1`, `1>&2`).
    Special,
    /// A `#`-prefixed comment running to end of line. Dropped by the
    /// expander and never reaches argv.
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, text: String) -> Self {
        Token { kind, text }
    }
}

/// Recognized multi-character operators, longest first so the scanner is greedy.
const OPERATORS: &[&str] = &[
    "2>>", "2>&1", "1>&2", "<<<", "&&", "||", ">>", "2>", "1>", ">&1", ">&2", "|", ";", "&", ">",
    "<",
];

enum State {
    Normal,
    InWord,
    InDoubleQuote,
    InSingleQuote,
}

/// Tokenize a single physical line. Never fails: unterminated quotes produce
/// an `Unterminated*` token instead of an error, leaving the continuation
/// decision to the parser (spec §4.I.a).
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut state = State::Normal;
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    macro_rules! flush_word {
        () => {
            if !current.is_empty() {
                tokens.push(Token::new(TokenKind::Bare, std::mem::take(&mut current)));
            }
        };
    }

    while i < chars.len() {
        let ch = chars[i];

        match state {
            State::Normal => match ch {
                ' ' | '\t' => i += 1,
                '#' => {
                    let rest: String = chars[i..].iter().collect();
                    tokens.push(Token::new(TokenKind::Comment, rest));
                    return tokens;
                }
                '"' => {
                    state = State::InDoubleQuote;
                    i += 1;
                }
                '\'' => {
                    state = State::InSingleQuote;
                    i += 1;
                }
                _ => {
                    if let Some(op) = match_operator(&chars, i) {
                        tokens.push(Token::new(TokenKind::Special, op.to_string()));
                        i += op.chars().count();
                    } else if ch == '\\' {
                        i += 1;
                        if i < chars.len() {
                            current.push(chars[i]);
                            i += 1;
                        }
                        state = State::InWord;
                    } else {
                        current.push(ch);
                        i += 1;
                        state = State::InWord;
                    }
                }
            },
            State::InWord => match ch {
                ' ' | '\t' => {
                    flush_word!();
                    state = State::Normal;
                    i += 1;
                }
                '"' => {
                    flush_word!();
                    state = State::InDoubleQuote;
                    i += 1;
                }
                '\'' => {
                    flush_word!();
                    state = State::InSingleQuote;
                    i += 1;
                }
                '\\' => {
                    i += 1;
                    if i < chars.len() {
                        current.push(chars[i]);
                        i += 1;
                    }
                }
                _ => {
                    if let Some(op) = match_operator(&chars, i) {
                        flush_word!();
                        tokens.push(Token::new(TokenKind::Special, op.to_string()));
                        i += op.chars().count();
                        state = State::Normal;
                    } else {
                        current.push(ch);
                        i += 1;
                    }
                }
            },
            State::InDoubleQuote => match ch {
                '"' => {
                    tokens.push(Token::new(
                        TokenKind::DoubleQuoted,
                        std::mem::take(&mut current),
                    ));
                    state = State::InWord;
                    i += 1;
                }
                '\\' => {
                    let next = chars.get(i + 1).copied();
                    match next {
                        Some(c @ ('"' | '\\' | '$' | '`')) => {
                            current.push(c);
                            i += 2;
                        }
                        _ => {
                            current.push('\\');
                            i += 1;
                        }
                    }
                }
                _ => {
                    current.push(ch);
                    i += 1;
                }
            },
            State::InSingleQuote => match ch {
                '\'' => {
                    tokens.push(Token::new(
                        TokenKind::SingleQuoted,
                        std::mem::take(&mut current),
                    ));
                    state = State::InWord;
                    i += 1;
                }
                _ => {
                    current.push(ch);
                    i += 1;
                }
            },
        }
    }

    match state {
        State::InWord | State::Normal => flush_word!(),
        State::InDoubleQuote => tokens.push(Token::new(
            TokenKind::UnterminatedDoubleQuoted,
            std::mem::take(&mut current),
        )),
        State::InSingleQuote => tokens.push(Token::new(
            TokenKind::UnterminatedSingleQuoted,
            std::mem::take(&mut current),
        )),
    }

    tokens
}

fn match_operator(chars: &[char], at: usize) -> Option<&'static str> {
    for op in OPERATORS {
        let op_chars: Vec<char> = op.chars().collect();
        if at + op_chars.len() <= chars.len() && chars[at..at + op_chars.len()] == op_chars[..] {
            return Some(op);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokenKind, String)> {
        tokenize(input)
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn simple_words() {
        assert_eq!(
            kinds("echo hello world"),
            vec![
                (TokenKind::Bare, "echo".into()),
                (TokenKind::Bare, "hello".into()),
                (TokenKind::Bare, "world".into()),
            ]
        );
    }

    #[test]
    fn pipe_and_redirection_operators() {
        let toks = tokenize("cat file | sort > out.txt");
        let specials: Vec<&str> = toks
            .iter()
            .filter(|t| t.kind == TokenKind::Special)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(specials, vec!["|", ">"]);
    }

    #[test]
    fn trailing_pipe_is_unterminated_marker_free_but_present_as_special() {
        let toks = tokenize("ls |");
        assert_eq!(toks.last().unwrap().kind, TokenKind::Special);
        assert_eq!(toks.last().unwrap().text, "|");
    }

    #[test]
    fn unterminated_double_quote() {
        let toks = tokenize(r#"echo "hello"#);
        assert_eq!(toks[1].kind, TokenKind::UnterminatedDoubleQuoted);
        assert_eq!(toks[1].text, "hello");
    }

    #[test]
    fn unterminated_single_quote() {
        let toks = tokenize("echo 'hello");
        assert_eq!(toks[1].kind, TokenKind::UnterminatedSingleQuoted);
    }

    #[test]
    fn comment_drops_rest_of_line() {
        let toks = tokenize("echo hi # this is a comment");
        assert_eq!(toks.last().unwrap().kind, TokenKind::Comment);
    }

    #[test]
    fn leading_comment_is_whole_line() {
        let toks = tokenize("# nothing to see here");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Comment);
    }

    #[test]
    fn double_pipe_recognized_as_single_operator() {
        let toks = tokenize("false || echo fallback");
        let specials: Vec<&str> = toks
            .iter()
            .filter(|t| t.kind == TokenKind::Special)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(specials, vec!["||"]);
    }

    #[test]
    fn double_ampersand_recognized() {
        let toks = tokenize("true && echo ok");
        assert!(toks.iter().any(|t| t.kind == TokenKind::Special && t.text == "&&"));
    }

    #[test]
    fn background_ampersand_recognized() {
        let toks = tokenize("sleep 5 &");
        assert_eq!(toks.last().unwrap().text, "&");
    }

    #[test]
    fn stderr_redirect_operator() {
        let toks = tokenize("ls 2> err.txt");
        assert!(toks.iter().any(|t| t.text == "2>"));
    }

    #[test]
    fn dup_fd_operator() {
        let toks = tokenize("ls 2>&1");
        assert!(toks.iter().any(|t| t.text == "2>&1"));
    }

    #[test]
    fn here_string_operator() {
        let toks = tokenize("cat <<< hello");
        assert!(toks.iter().any(|t| t.text == "<<<"));
    }

    #[test]
    fn backslash_escapes_space_outside_quotes() {
        let toks = tokenize(r"echo hello\ world");
        assert_eq!(toks[1].text, "hello world");
    }

    #[test]
    fn mixed_quoting_concatenates_into_one_bare_then_quoted_runs() {
        let toks = tokenize(r#"echo hi"there""#);
        assert_eq!(toks[1].text, "hi");
        assert_eq!(toks[2].kind, TokenKind::DoubleQuoted);
        assert_eq!(toks[2].text, "there");
    }
}
