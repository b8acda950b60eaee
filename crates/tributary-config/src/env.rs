use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Substitute `${VAR}` and `${VAR:-fallback}` placeholders in raw TOML text
///
/// An unset variable without a fallback is an error. Comment lines are
/// copied through untouched so commented-out settings never require their
/// variables to exist.
pub fn expand_env(input: &str) -> anyhow::Result<String> {
    fn placeholder() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("placeholder regex is valid")
        })
    }

    let mut missing: Option<String> = None;

    let expanded: Vec<String> = input
        .split('\n')
        .map(|line| {
            if line.trim_start().starts_with('#') {
                return line.to_owned();
            }

            placeholder()
                .replace_all(line, |caps: &Captures<'_>| {
                    let name = &caps[1];
                    match (std::env::var(name), caps.get(2)) {
                        (Ok(value), _) => value,
                        (Err(_), Some(fallback)) => fallback.as_str().to_owned(),
                        (Err(_), None) => {
                            missing.get_or_insert_with(|| name.to_owned());
                            String::new()
                        }
                    }
                })
                .into_owned()
        })
        .collect();

    if let Some(name) = missing {
        anyhow::bail!("environment variable not set: `{name}`");
    }

    Ok(expanded.join("\n"))
}
