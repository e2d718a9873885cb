//! Line grammar for canonicalization and user-map files.
//!
//! ```text
//! <method> <principal> <canonicalization>
//! @include <path>
//! # comment
//! ```
//!
//! Each field is a bare word, a `"quoted string"` or, where the caller
//! allows it, a `/regex/` with optional `i` and `U` modifiers.

use super::rule::RegexOptions;

/// Directive that pulls another file or a whole directory into the map.
pub const INCLUDE_DIRECTIVE: &str = "@include";

/// Walks one line field by field.
#[derive(Debug)]
pub struct FieldCursor<'a> {
    line: &'a [u8],
    pos: usize,
}

fn is_field_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n')
}

impl<'a> FieldCursor<'a> {
    pub fn new(line: &'a str) -> Self {
        Self {
            line: line.as_bytes(),
            pos: 0,
        }
    }

    /// Next bare or quoted field.
    pub fn next_field(&mut self) -> String {
        self.parse(None)
    }

    /// Next field, treating a leading `/` as a regex literal.
    ///
    /// `options` is set to `NOT_EMPTY` (plus any trailing modifiers) for a
    /// regex, cleared for a quoted field and left alone for a bare word.
    pub fn next_pattern_field(&mut self, options: &mut RegexOptions) -> String {
        self.parse(Some(options))
    }

    fn peek(&self) -> Option<u8> {
        self.line.get(self.pos).copied()
    }

    fn parse(&mut self, mut options: Option<&mut RegexOptions>) -> String {
        while self.peek().is_some_and(is_field_space) {
            self.pos += 1;
        }

        let delimiter = match (self.peek(), options.as_deref_mut()) {
            (Some(b'"'), Some(opts)) => {
                *opts = RegexOptions::empty();
                Some(b'"')
            }
            (Some(b'"'), None) => Some(b'"'),
            (Some(b'/'), Some(opts)) => {
                *opts = RegexOptions::NOT_EMPTY;
                Some(b'/')
            }
            _ => None,
        };

        let mut field = Vec::new();
        match delimiter {
            Some(end) => {
                self.pos += 1;
                self.read_delimited(end, &mut field, options);
            }
            None => {
                while let Some(b) = self.peek().filter(|&b| !is_field_space(b)) {
                    field.push(b);
                    self.pos += 1;
                }
            }
        }

        // Fields are split at ASCII bytes only, so they stay valid UTF-8.
        String::from_utf8_lossy(&field).into_owned()
    }

    // End of line terminates the field even without a closing delimiter.
    fn read_delimited(&mut self, end: u8, field: &mut Vec<u8>, options: Option<&mut RegexOptions>) {
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == end {
                if end == b'/' {
                    self.read_modifiers(options);
                }
                return;
            }
            if b != b'\\' {
                field.push(b);
                continue;
            }
            match self.peek() {
                Some(next) if next == end => field.push(next),
                Some(b'\\') => field.push(b'\\'),
                Some(next) => field.extend_from_slice(&[b'\\', next]),
                None => {
                    field.push(b'\\');
                    return;
                }
            }
            self.pos += 1;
        }
    }

    fn read_modifiers(&mut self, mut options: Option<&mut RegexOptions>) {
        loop {
            let flag = match self.peek() {
                Some(b'i') => RegexOptions::CASELESS,
                Some(b'U') => RegexOptions::UNGREEDY,
                _ => return,
            };
            if let Some(opts) = options.as_deref_mut() {
                opts.insert(flag);
            }
            self.pos += 1;
        }
    }
}

/// A parsed rule line: `(method, principal, canonicalization)` for the
/// canonical map, `(canonical, user)` for the user map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub method: Option<String>,
    pub principal: String,
    pub options: RegexOptions,
    pub canonicalization: String,
}

/// Classification of one canonicalization-file line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonLine {
    /// Blank line or comment.
    Ignore,
    /// `@include <path>`; the path may be empty.
    Include(String),
    Entry(Entry),
    /// At least one of the three fields is missing.
    Malformed {
        method: String,
        principal: String,
        canonicalization: String,
    },
}

/// Classification of one user-map line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLine {
    Ignore,
    Entry(Entry),
    /// The user field is missing.
    Malformed { canonicalization: String },
}

fn initial_options(assume_literal: bool) -> RegexOptions {
    // Legacy maps compile every principal as a regex.
    if assume_literal {
        RegexOptions::empty()
    } else {
        RegexOptions::NOT_EMPTY
    }
}

/// Parse one line of a canonicalization file.
pub fn parse_canon_line(line: &str, assume_literal: bool) -> CanonLine {
    if line.is_empty() {
        return CanonLine::Ignore;
    }

    let mut cursor = FieldCursor::new(line);
    let method = cursor.next_field();
    if method == INCLUDE_DIRECTIVE {
        return CanonLine::Include(cursor.next_field());
    }
    if method.is_empty() || method.starts_with('#') {
        return CanonLine::Ignore;
    }

    let mut options = initial_options(assume_literal);
    let principal = if assume_literal {
        cursor.next_pattern_field(&mut options)
    } else {
        cursor.next_field()
    };
    let canonicalization = cursor.next_field();

    if principal.is_empty() || canonicalization.is_empty() {
        return CanonLine::Malformed {
            method,
            principal,
            canonicalization,
        };
    }

    CanonLine::Entry(Entry {
        method: Some(method),
        principal,
        options,
        canonicalization,
    })
}

/// Parse one line of a user-map file.
pub fn parse_user_line(line: &str, assume_literal: bool) -> UserLine {
    if line.is_empty() {
        return UserLine::Ignore;
    }

    let mut cursor = FieldCursor::new(line);
    let mut options = initial_options(assume_literal);
    let canonicalization = if assume_literal {
        cursor.next_pattern_field(&mut options)
    } else {
        cursor.next_field()
    };
    if canonicalization.is_empty() || canonicalization.starts_with('#') {
        return UserLine::Ignore;
    }

    let user = cursor.next_field();
    if user.is_empty() {
        return UserLine::Malformed { canonicalization };
    }

    UserLine::Entry(Entry {
        method: None,
        principal: canonicalization,
        options,
        canonicalization: user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(line: &str) -> Vec<String> {
        let mut cursor = FieldCursor::new(line);
        (0..3).map(|_| cursor.next_field()).collect()
    }

    #[test]
    fn test_bare_words() {
        assert_eq!(fields("  GSI\tbob   bob_local"), vec!["GSI", "bob", "bob_local"]);
    }

    #[test]
    fn test_quoted_field_escapes() {
        let f = fields(r#"SSL "/CN=Alice \"Al\" Smith\\x" alice"#);
        assert_eq!(f[1], r#"/CN=Alice "Al" Smith\x"#);
        assert_eq!(f[2], "alice");
    }

    #[test]
    fn test_multibyte_fields_survive() {
        let f = fields("SSL \"/CN=Müller Jürgen\" müller");
        assert_eq!(f[1], "/CN=Müller Jürgen");
        assert_eq!(f[2], "müller");
    }

    #[test]
    fn test_unknown_escape_is_kept() {
        let f = fields(r#"M "a\nb" c"#);
        assert_eq!(f[1], r"a\nb");
    }

    #[test]
    fn test_unterminated_quote_runs_to_eol() {
        let f = fields(r#"M "half open"#);
        assert_eq!(f[1], "half open");
        assert_eq!(f[2], "");
    }

    #[test]
    fn test_trailing_backslash_in_quote() {
        let f = fields("M \"abc\\");
        assert_eq!(f[1], "abc\\");
    }

    #[test]
    fn test_slash_is_plain_without_pattern_support() {
        let f = fields("M /CN=bob/ x");
        assert_eq!(f[1], "/CN=bob/");
    }

    #[test]
    fn test_regex_field_with_modifiers() {
        let mut cursor = FieldCursor::new(r"/^(.*)@EXAMPLE\.COM$/iU  \1");
        let mut opts = RegexOptions::empty();
        let re = cursor.next_pattern_field(&mut opts);
        assert_eq!(re, r"^(.*)@EXAMPLE\.COM$");
        assert_eq!(
            opts,
            RegexOptions::NOT_EMPTY | RegexOptions::CASELESS | RegexOptions::UNGREEDY
        );
        assert_eq!(cursor.next_field(), r"\1");
    }

    #[test]
    fn test_regex_escaped_slash() {
        let mut cursor = FieldCursor::new(r"/^\/DC=org\/CN=(.*)$/ x");
        let mut opts = RegexOptions::empty();
        assert_eq!(cursor.next_pattern_field(&mut opts), r"^/DC=org/CN=(.*)$");
    }

    #[test]
    fn test_quoted_field_clears_pattern_options() {
        let mut cursor = FieldCursor::new(r#""not a regex""#);
        let mut opts = RegexOptions::NOT_EMPTY;
        assert_eq!(cursor.next_pattern_field(&mut opts), "not a regex");
        assert!(opts.is_empty());
    }

    #[test]
    fn test_canon_line_kinds() {
        assert_eq!(parse_canon_line("", true), CanonLine::Ignore);
        assert_eq!(parse_canon_line("   ", true), CanonLine::Ignore);
        assert_eq!(parse_canon_line("# GSI x y", true), CanonLine::Ignore);
        assert_eq!(
            parse_canon_line("@include conf.d", true),
            CanonLine::Include("conf.d".into())
        );
        assert!(matches!(
            parse_canon_line("KERBEROS onlyprincipal", true),
            CanonLine::Malformed { .. }
        ));
    }

    #[test]
    fn test_canon_line_literal_and_pattern() {
        let CanonLine::Entry(lit) = parse_canon_line("KERBEROS someuser unused", true) else {
            panic!("expected entry");
        };
        assert_eq!(lit.method.as_deref(), Some("KERBEROS"));
        assert!(lit.options.is_empty());

        let CanonLine::Entry(re) = parse_canon_line(r"KERBEROS /^(.*)@EXAMPLE\.COM$/ \1", true) else {
            panic!("expected entry");
        };
        assert_eq!(re.options, RegexOptions::NOT_EMPTY);
        assert_eq!(re.canonicalization, r"\1");
    }

    #[test]
    fn test_legacy_mode_marks_everything_as_pattern() {
        let CanonLine::Entry(e) = parse_canon_line("GSI bob bob_local", false) else {
            panic!("expected entry");
        };
        assert_eq!(e.options, RegexOptions::NOT_EMPTY);
    }

    #[test]
    fn test_user_line_kinds() {
        let UserLine::Entry(e) = parse_user_line("alice      alice_local", true) else {
            panic!("expected entry");
        };
        assert_eq!(e.principal, "alice");
        assert_eq!(e.canonicalization, "alice_local");
        assert!(e.method.is_none());

        assert_eq!(parse_user_line("#alice bob", true), UserLine::Ignore);
        assert_eq!(
            parse_user_line("alice", true),
            UserLine::Malformed {
                canonicalization: "alice".into()
            }
        );
    }
}
