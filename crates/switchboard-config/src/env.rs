use std::sync::OnceLock;

use regex::{Captures, Regex};

/// `{{ scope.NAME }}` with an optional `| default("...")`
const PLACEHOLDER: &str = r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#;

fn placeholder() -> Result<&'static Regex, String> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLACEHOLDER))
        .as_ref()
        .map_err(|e| format!("invalid placeholder pattern: {e}"))
}

/// Expand `{{ env.VAR }}` placeholders in raw TOML text
///
/// `{{ env.VAR | default("fallback") }}` uses the fallback when `VAR` is
/// unset. Comment lines are left untouched, so commented-out settings may
/// reference variables that do not exist.
pub fn expand_env(input: &str) -> Result<String, String> {
    let re = placeholder()?;
    let lines = input
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                Ok(line.to_owned())
            } else {
                expand_line(re, line)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(re: &Regex, line: &str) -> Result<String, String> {
    let mut expanded = String::with_capacity(line.len());
    let mut rest = 0;

    for captures in re.captures_iter(line) {
        let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
            continue;
        };

        expanded.push_str(&line[rest..whole.start()]);
        expanded.push_str(&resolve(key.as_str(), &captures)?);
        rest = whole.end();
    }

    expanded.push_str(&line[rest..]);
    Ok(expanded)
}

fn resolve(key: &str, captures: &Captures<'_>) -> Result<String, String> {
    let var = match key.split_once('.') {
        Some(("env", var)) if !var.is_empty() && !var.contains('.') => var,
        _ => return Err(format!("only variables scoped with 'env.' are supported: `{key}`")),
    };

    match (std::env::var(var), captures.get(2)) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.as_str().to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_placeholders() {
        let input = "key = \"value\"";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn single_env_var() {
        temp_env::with_var("SWITCHBOARD_TEST_VAR", Some("hello"), || {
            let result = expand_env("key = \"{{ env.SWITCHBOARD_TEST_VAR }}\"").unwrap();
            assert_eq!(result, "key = \"hello\"");
        });
    }

    #[test]
    fn multiple_env_vars() {
        let vars = [("SWITCHBOARD_FOO", Some("foo")), ("SWITCHBOARD_BAR", Some("bar"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("a = \"{{ env.SWITCHBOARD_FOO }}\"\nb = \"{{ env.SWITCHBOARD_BAR }}\"").unwrap();
            assert_eq!(result, "a = \"foo\"\nb = \"bar\"");
        });
    }

    #[test]
    fn missing_env_var() {
        temp_env::with_var_unset("MISSING_VAR", || {
            let err = expand_env("key = \"{{ env.MISSING_VAR }}\"").unwrap_err();
            assert!(err.contains("MISSING_VAR"));
        });
    }

    #[test]
    fn unsupported_scope() {
        let err = expand_env("key = \"{{ foo.BAR }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn commented_lines_skip_expansion() {
        temp_env::with_var_unset("MISSING_VAR", || {
            let input = "# key = \"{{ env.MISSING_VAR }}\"";
            let result = expand_env(input).unwrap();
            assert_eq!(result, input);
        });
    }

    #[test]
    fn indented_comment_skips_expansion() {
        temp_env::with_var_unset("MISSING_VAR", || {
            let input = "  # key = \"{{ env.MISSING_VAR }}\"";
            let result = expand_env(input).unwrap();
            assert_eq!(result, input);
        });
    }

    #[test]
    fn mixed_comments_and_values() {
        let vars = [("REAL_VAR", Some("value"))];
        temp_env::with_vars(vars, || {
            temp_env::with_var_unset("COMMENTED_VAR", || {
                let input = "# secret = \"{{ env.COMMENTED_VAR }}\"\nkey = \"{{ env.REAL_VAR }}\"";
                let result = expand_env(input).unwrap();
                assert_eq!(result, "# secret = \"{{ env.COMMENTED_VAR }}\"\nkey = \"value\"");
            });
        });
    }

    #[test]
    fn default_used_when_var_missing() {
        temp_env::with_var_unset("OPTIONAL_VAR", || {
            let result = expand_env("key = \"{{ env.OPTIONAL_VAR | default(\"\") }}\"").unwrap();
            assert_eq!(result, "key = \"\"");
        });
    }

    #[test]
    fn default_not_used_when_var_present() {
        temp_env::with_var("OPTIONAL_VAR", Some("actual"), || {
            let result = expand_env("key = \"{{ env.OPTIONAL_VAR | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "key = \"actual\"");
        });
    }

    #[test]
    fn default_with_nonempty_fallback() {
        temp_env::with_var_unset("MISSING_VAR", || {
            let result = expand_env("key = \"{{ env.MISSING_VAR | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "key = \"fallback\"");
        });
    }

    #[test]
    fn trailing_newline_is_kept() {
        temp_env::with_var("SWITCHBOARD_TEST_FILTER", Some("debug"), || {
            let result = expand_env("log_filter = \"{{ env.SWITCHBOARD_TEST_FILTER }}\"\n").unwrap();
            assert_eq!(result, "log_filter = \"debug\"\n");
        });
    }

    #[test]
    fn nested_scope_is_rejected() {
        let err = expand_env("key = \"{{ env.A.B }}\"").unwrap_err();
        assert!(err.contains("env.A.B"));
    }

    #[test]
    fn missing_var_without_default_still_errors() {
        temp_env::with_var_unset("REQUIRED_VAR", || {
            let err = expand_env("key = \"{{ env.REQUIRED_VAR }}\"").unwrap_err();
            assert!(err.contains("REQUIRED_VAR"));
        });
    }
}
