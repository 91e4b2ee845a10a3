//! Module B — Expander: turns a sequence of parsed [`Token`]s into the final
//! argv strings fed to the Pipeline Planner. Three ordered stages per token:
//! variable expansion, tilde expansion, glob expansion (spec §4.B).

use glob::{glob_with, MatchOptions};

use crate::token::{Token, TokenKind};

/// Expand a subcommand's argument tokens into final argv strings.
pub fn expand_args(args: &[Token], last_exit_code: i32) -> Vec<String> {
    let mut result = Vec::new();
    for tok in args {
        result.extend(expand_token(tok, last_exit_code));
    }
    result
}

fn expand_token(tok: &Token, last_exit_code: i32) -> Vec<String> {
    match tok.kind {
        // Quoted tokens are never expanded (spec §4.B: "Quoted tokens are
        // not expanded inside strings"), including the disabled double-quote
        // variable case (spec §9: "keep disabled").
        TokenKind::SingleQuoted | TokenKind::DoubleQuoted => vec![tok.text.clone()],
        _ => {
            let fragments = expand_variable(&tok.text, last_exit_code);
            fragments
                .into_iter()
                .flat_map(|frag| {
                    let frag = expand_tilde(&frag);
                    expand_glob(&frag)
                })
                .collect()
        }
    }
}

// ── Stage 1: variable expansion ──

fn expand_variable(text: &str, last_exit_code: i32) -> Vec<String> {
    if !text.starts_with('$') {
        return vec![text.to_string()];
    }

    let value = match &text[1..] {
        "?" => last_exit_code.to_string(),
        "$" => std::process::id().to_string(),
        name if !name.is_empty() => match std::env::var(name) {
            Ok(v) => v,
            Err(_) => return vec![String::new()],
        },
        _ => return vec![String::new()],
    };

    let fragments: Vec<String> = value.split(' ').map(str::to_string).collect();
    if fragments.is_empty() {
        vec![String::new()]
    } else {
        fragments
    }
}

// ── Stage 2: tilde expansion ──

fn expand_tilde(fragment: &str) -> String {
    if !fragment.starts_with('~') {
        return fragment.to_string();
    }

    if fragment == "~" {
        return home_dir_for_current_user();
    }

    if let Some(rest) = fragment.strip_prefix("~/") {
        return format!("{}/{}", home_dir_for_current_user(), rest);
    }

    // ~user or ~user/rest
    let after_tilde = &fragment[1..];
    let (username, rest) = match after_tilde.split_once('/') {
        Some((u, r)) => (u, Some(r)),
        None => (after_tilde, None),
    };

    match home_dir_for_user(username) {
        Some(home) => match rest {
            Some(r) => format!("{home}/{r}"),
            None => home,
        },
        None => fragment.to_string(),
    }
}

fn home_dir_for_current_user() -> String {
    if let Ok(home) = std::env::var("HOME") {
        return home;
    }
    #[cfg(unix)]
    {
        let uid = unsafe { libc::getuid() };
        if let Some(user) = users::get_user_by_uid(uid) {
            return user.home_dir().to_string_lossy().into_owned();
        }
    }
    "/".to_string()
}

#[cfg(unix)]
fn home_dir_for_user(name: &str) -> Option<String> {
    users::get_user_by_name(name).map(|u| u.home_dir().to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn home_dir_for_user(_name: &str) -> Option<String> {
    None
}

// ── Stage 3: glob expansion ──

fn is_globbable(fragment: &str) -> bool {
    fragment.contains('*') || fragment.contains('?')
}

fn expand_glob(fragment: &str) -> Vec<String> {
    if !is_globbable(fragment) {
        return vec![fragment.to_string()];
    }

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    match glob_with(fragment, options) {
        Ok(paths) => {
            let mut matches: Vec<String> = paths
                .filter_map(|entry| entry.ok())
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            if matches.is_empty() {
                vec![fragment.to_string()]
            } else {
                matches.sort();
                matches
            }
        }
        Err(_) => vec![fragment.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn tok(kind: TokenKind, text: &str) -> Token {
        Token {
            kind,
            text: text.to_string(),
        }
    }

    #[test]
    fn whole_word_variable_expands() {
        unsafe { std::env::set_var("JSH_EXPANDER_TEST", "value") };
        let result = expand_args(&[tok(TokenKind::Bare, "$JSH_EXPANDER_TEST")], 0);
        assert_eq!(result, vec!["value"]);
        unsafe { std::env::remove_var("JSH_EXPANDER_TEST") };
    }

    #[test]
    fn variable_value_splits_on_space_into_fragments() {
        unsafe { std::env::set_var("JSH_MULTI", "a b c") };
        let result = expand_args(&[tok(TokenKind::Bare, "$JSH_MULTI")], 0);
        assert_eq!(result, vec!["a", "b", "c"]);
        unsafe { std::env::remove_var("JSH_MULTI") };
    }

    #[test]
    fn unknown_variable_is_empty_fragment() {
        let result = expand_args(&[tok(TokenKind::Bare, "$JSH_NOT_SET_XYZ")], 0);
        assert_eq!(result, vec![""]);
    }

    #[test]
    fn exit_code_variable() {
        let result = expand_args(&[tok(TokenKind::Bare, "$?")], 42);
        assert_eq!(result, vec!["42"]);
    }

    #[test]
    fn pid_variable_is_numeric() {
        let result = expand_args(&[tok(TokenKind::Bare, "$$")], 0);
        assert_eq!(result.len(), 1);
        assert!(result[0].parse::<u32>().is_ok());
    }

    #[test]
    fn non_dollar_token_passes_through() {
        let result = expand_args(&[tok(TokenKind::Bare, "hello")], 0);
        assert_eq!(result, vec!["hello"]);
    }

    #[test]
    fn single_quoted_token_never_expanded() {
        unsafe { std::env::set_var("JSH_SQ_TEST", "nope") };
        let result = expand_args(&[tok(TokenKind::SingleQuoted, "$JSH_SQ_TEST")], 0);
        assert_eq!(result, vec!["$JSH_SQ_TEST"]);
        unsafe { std::env::remove_var("JSH_SQ_TEST") };
    }

    #[test]
    fn double_quoted_token_does_not_expand_variables() {
        unsafe { std::env::set_var("JSH_DQ_TEST", "nope") };
        let result = expand_args(&[tok(TokenKind::DoubleQuoted, "$JSH_DQ_TEST")], 0);
        assert_eq!(result, vec!["$JSH_DQ_TEST"]);
        unsafe { std::env::remove_var("JSH_DQ_TEST") };
    }

    #[test]
    fn double_quoted_glob_chars_stay_literal() {
        let result = expand_args(&[tok(TokenKind::DoubleQuoted, "*.rs")], 0);
        assert_eq!(result, vec!["*.rs"]);
    }

    #[test]
    fn tilde_alone_expands_to_home() {
        unsafe { std::env::set_var("HOME", "/home/tester") };
        let result = expand_args(&[tok(TokenKind::Bare, "~")], 0);
        assert_eq!(result, vec!["/home/tester"]);
    }

    #[test]
    fn tilde_with_path_expands() {
        unsafe { std::env::set_var("HOME", "/home/tester") };
        let result = expand_args(&[tok(TokenKind::Bare, "~/projects")], 0);
        assert_eq!(result, vec!["/home/tester/projects"]);
    }

    #[test]
    fn tilde_mid_token_not_expanded() {
        let result = expand_args(&[tok(TokenKind::Bare, "foo~bar")], 0);
        assert_eq!(result, vec!["foo~bar"]);
    }

    #[test]
    fn unknown_user_tilde_left_literal() {
        let result = expand_args(
            &[tok(TokenKind::Bare, "~definitely_not_a_real_user_xyz")],
            0,
        );
        assert_eq!(result, vec!["~definitely_not_a_real_user_xyz"]);
    }

    #[test]
    fn no_glob_match_keeps_pattern_literal() {
        let result = expand_args(
            &[tok(
                TokenKind::Bare,
                "*.definitely_not_a_real_extension_xyz123",
            )],
            0,
        );
        assert_eq!(result, vec!["*.definitely_not_a_real_extension_xyz123"]);
    }
}
