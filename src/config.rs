//! Module N [AMBIENT] — `$HOME/.jshrc` loading (SPEC_FULL §6.6).
//!
//! A flat `KEY=value` file applied as `export` before the first prompt. Not a
//! scripting language: no control flow, no command substitution, matching
//! spec §1's Non-goals. A missing file is silent; a malformed line is
//! reported to stderr and skipped rather than aborting startup.

use std::path::{Path, PathBuf};

fn rc_file_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(|home| PathBuf::from(home).join(".jshrc"))
}

/// Load and apply `$HOME/.jshrc`. Called once from `main` before the first
/// prompt, unless `--norc` was passed.
pub fn load_rc_file() {
    if let Some(path) = rc_file_path() {
        apply_rc_file(&path);
    }
}

fn apply_rc_file(path: &Path) {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return;
    };

    for (lineno, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match trimmed.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                tracing::debug!(key, "applying .jshrc entry");
                // SAFETY: called once from main, before the editor or any
                // child process exists (spec §5: env is mutated only from
                // the main loop).
                unsafe { std::env::set_var(key, value) };
            }
            _ => {
                eprintln!(
                    "jsh: {}:{}: malformed .jshrc line, skipped: {trimmed}",
                    path.display(),
                    lineno + 1
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_lines_applied_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".jshrc");
        std::fs::write(
            &path,
            "# a comment\n\nJSH_CFG_TEST_A=1\nbadline\nJSH_CFG_TEST_B=two words\n",
        )
        .unwrap();

        apply_rc_file(&path);

        assert_eq!(std::env::var("JSH_CFG_TEST_A").as_deref(), Ok("1"));
        assert_eq!(std::env::var("JSH_CFG_TEST_B").as_deref(), Ok("two words"));

        unsafe {
            std::env::remove_var("JSH_CFG_TEST_A");
            std::env::remove_var("JSH_CFG_TEST_B");
        }
    }

    #[test]
    fn missing_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist");
        apply_rc_file(&path);
    }
}
