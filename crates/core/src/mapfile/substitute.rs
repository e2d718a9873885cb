//! Backreference expansion for canonicalization templates.

/// Expand `template`, replacing `\0`..`\9` with the matching entry of
/// `groups`.
///
/// A reference to a group that does not exist, and a backslash followed by
/// anything other than a digit, are copied through unchanged. A lone
/// trailing backslash is dropped.
pub fn expand(template: &str, groups: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            break;
        };
        let group = next
            .to_digit(10)
            .and_then(|d| groups.get(d as usize));
        match group {
            Some(text) => out.push_str(text),
            None => {
                out.push('\\');
                out.push(next);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_substitution() {
        assert_eq!(expand(r"\1@EXAMPLE", &["alice@X", "alice"]), "alice@EXAMPLE");
    }

    #[test]
    fn test_group_zero() {
        assert_eq!(expand(r"user:\0", &["bob"]), "user:bob");
    }

    #[test]
    fn test_missing_group_is_literal() {
        assert_eq!(expand(r"\9", &["ab", "a", "b"]), r"\9");
    }

    #[test]
    fn test_non_digit_escape_passes_through() {
        assert_eq!(expand(r"a\xb\\c", &["m"]), r"a\xb\\c");
    }

    #[test]
    fn test_plain_template() {
        assert_eq!(expand("condor_pool", &["whatever"]), "condor_pool");
    }

    #[test]
    fn test_trailing_backslash_dropped() {
        assert_eq!(expand("abc\\", &[]), "abc");
    }
}
