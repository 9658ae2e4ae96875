//! Environment variable interpolation for config files.
//!
//! Lets credentials stay in the environment while the YAML file only
//! references them:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escaped dollar
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # 1: braced name
            (?:
                (:?-)                  # 2: default operator
                ([^}]*)                # 3: default value
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # 4: bare name
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every problem found, so all missing variables are reported at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| resolve(caps, &mut errors))
        .into_owned();

    InterpolationResult { text, errors }
}

/// Resolve a single match, recording an error and leaving the reference
/// untouched when it cannot be satisfied.
fn resolve(caps: &Captures, errors: &mut Vec<String>) -> String {
    let full_match = &caps[0];
    if full_match == "$$" {
        return "$".to_string();
    }

    let Some(name) = caps.get(1).or_else(|| caps.get(4)).map(|m| m.as_str()) else {
        return full_match.to_string();
    };
    let operator = caps.get(2).map(|m| m.as_str());
    let default = caps.get(3).map(|m| m.as_str());

    match env::var(name) {
        Ok(value) if value.contains('\n') || value.contains('\r') => {
            errors.push(format!(
                "environment variable '{name}' contains newlines, which is not allowed"
            ));
            full_match.to_string()
        }
        Ok(value) if value.is_empty() && operator == Some(":-") => {
            default.unwrap_or_default().to_string()
        }
        Ok(value) => value,
        Err(_) => match default {
            Some(default) => default.to_string(),
            None => {
                errors.push(format!("environment variable '{name}' is not set"));
                full_match.to_string()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: every test uses its own variable names
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring the values captured above
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_braced_and_bare_substitution() {
        with_env_vars(&[("PLAYLAKE_TEST_BUCKET", Some("udacity-dend"))], || {
            let result = interpolate("a: $PLAYLAKE_TEST_BUCKET, b: ${PLAYLAKE_TEST_BUCKET}");
            assert!(result.is_ok());
            assert_eq!(result.text, "a: udacity-dend, b: udacity-dend");
        });
    }

    #[test]
    fn test_all_missing_variables_reported() {
        with_env_vars(
            &[("PLAYLAKE_TEST_MISS1", None), ("PLAYLAKE_TEST_MISS2", None)],
            || {
                let result = interpolate("a: $PLAYLAKE_TEST_MISS1, b: ${PLAYLAKE_TEST_MISS2}");
                assert_eq!(result.errors.len(), 2);
                assert!(result.errors[0].contains("PLAYLAKE_TEST_MISS1"));
                assert!(result.text.contains("$PLAYLAKE_TEST_MISS1"));
            },
        );
    }

    #[test]
    fn test_default_operators() {
        with_env_vars(
            &[
                ("PLAYLAKE_TEST_UNSET", None),
                ("PLAYLAKE_TEST_EMPTY", Some("")),
            ],
            || {
                let result = interpolate(
                    "a: ${PLAYLAKE_TEST_UNSET:-x}, b: ${PLAYLAKE_TEST_EMPTY:-y}, c: ${PLAYLAKE_TEST_EMPTY-z}",
                );
                assert!(result.is_ok());
                assert_eq!(result.text, "a: x, b: y, c: ");
            },
        );
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("price: $$100");
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }

    #[test]
    fn test_newline_injection_blocked() {
        with_env_vars(&[("PLAYLAKE_TEST_INJECT", Some("a\nb"))], || {
            let result = interpolate("value: $PLAYLAKE_TEST_INJECT");
            assert!(!result.is_ok());
            assert!(result.errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_credentials_block() {
        with_env_vars(
            &[
                ("PLAYLAKE_TEST_KEY_ID", Some("AKIA123")),
                ("PLAYLAKE_TEST_SECRET", Some("secret")),
                ("PLAYLAKE_TEST_REGION", None),
            ],
            || {
                let yaml = r#"
input:
  path: "s3a://udacity-dend/"
  storage_options:
    aws_access_key_id: ${PLAYLAKE_TEST_KEY_ID}
    aws_secret_access_key: ${PLAYLAKE_TEST_SECRET}
    aws_region: ${PLAYLAKE_TEST_REGION:-us-west-2}
"#;
                let result = interpolate(yaml);
                assert!(result.is_ok());
                assert!(result.text.contains("aws_access_key_id: AKIA123"));
                assert!(result.text.contains("aws_secret_access_key: secret"));
                assert!(result.text.contains("aws_region: us-west-2"));
            },
        );
    }
}
