//! Environment interpolation for configuration values.

use regex::Regex;
use std::sync::OnceLock;

static REFERENCE: OnceLock<Option<Regex>> = OnceLock::new();

fn reference() -> Option<&'static Regex> {
    REFERENCE
        .get_or_init(|| Regex::new(r"\$\{([^}]*)\}").ok())
        .as_ref()
}

/// Replace every `${VAR}` in `value` using `lookup`.
///
/// Returns the name of the first variable `lookup` could not resolve.
pub fn interpolate(
    value: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, String> {
    let Some(pattern) = reference() else {
        return Ok(value.to_string());
    };

    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for caps in pattern.captures_iter(value) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str().trim();
        let resolved = lookup(name).ok_or_else(|| name.to_string())?;
        out.push_str(&value[last..whole.start()]);
        out.push_str(&resolved);
        last = whole.end();
    }
    out.push_str(&value[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn replaces_every_reference() {
        let lookup = env(&[("HOST", "example.org"), ("PORT", "8080")]);
        assert_eq!(
            interpolate("https://${HOST}:${ PORT }/", lookup).unwrap(),
            "https://example.org:8080/"
        );
    }

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(interpolate("token", env(&[])).unwrap(), "token");
    }

    #[test]
    fn unset_variable_is_reported() {
        let err = interpolate("${MISSING}", env(&[])).unwrap_err();
        assert_eq!(err, "MISSING");
    }
}
