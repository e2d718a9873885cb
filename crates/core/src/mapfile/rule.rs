//! Rule variants and the ordered rule list for one authentication method.
//!
//! A [`RuleList`] is scanned front to back and the first rule that matches
//! wins. Runs of adjacent literal entries are coalesced into one
//! [`LiteralGroup`] so exact-match lookups stay O(1) without disturbing
//! their position relative to any interleaved [`PatternRule`].

use std::io::{self, Write};

use regex_lite::{Captures, Regex, RegexBuilder};

use super::arena::{ArenaMap, ArenaStr, StringArena};

bitflags::bitflags! {
    /// Options attached to a pattern rule.
    ///
    /// `NOT_EMPTY` doubles as the marker that a principal field is a pattern
    /// at all; a field parsed with an empty option set is a literal.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegexOptions: u32 {
        /// `i` modifier.
        const CASELESS  = 1 << 0;
        /// `U` modifier: quantifiers are lazy unless followed by `?`.
        const UNGREEDY  = 1 << 1;
        /// Reject matches whose whole-match span is empty.
        const NOT_EMPTY = 1 << 2;
    }
}

impl RegexOptions {
    /// Trailing modifier letters as they would appear after `/pattern/`.
    pub fn modifiers(&self) -> String {
        let mut out = String::new();
        if self.contains(Self::CASELESS) {
            out.push('i');
        }
        if self.contains(Self::UNGREEDY) {
            out.push('U');
        }
        out
    }
}

/// A successful match: the template to expand and the capture groups to
/// expand it with. Group 0 is the whole match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch<'p> {
    pub canonicalization: ArenaStr,
    pub groups: Vec<&'p str>,
}

// ---------------------------------------------------------------------------
// Literal group
// ---------------------------------------------------------------------------

/// A batch of adjacent exact-match entries sharing one hash table.
///
/// Keys and canonicalizations both live in the engine's [`StringArena`].
#[derive(Debug, Default)]
pub struct LiteralGroup {
    map: ArenaMap<ArenaStr>,
}

impl LiteralGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key -> canonicalization`. Returns `false` for a duplicate key;
    /// the first mapping is kept.
    pub fn insert(&mut self, arena: &mut StringArena, key: &str, canonicalization: ArenaStr) -> bool {
        self.map.insert(arena, key, canonicalization)
    }

    /// Exact lookup of `principal`. The only capture group is the principal.
    pub fn find<'p>(&self, arena: &StringArena, principal: &'p str) -> Option<RuleMatch<'p>> {
        let (_, canonicalization) = self.map.get(arena, principal)?;
        Some(RuleMatch {
            canonicalization: *canonicalization,
            groups: vec![principal],
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (ArenaStr, ArenaStr)> + '_ {
        self.map.iter().map(|(key, canon)| (key, *canon))
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.map.bucket_count()
    }
}

// ---------------------------------------------------------------------------
// Pattern rule
// ---------------------------------------------------------------------------

/// A compiled regular expression and the template it canonicalizes to.
#[derive(Debug)]
pub struct PatternRule {
    regex: Regex,
    /// `(?:pattern)\z`, used to look for a non-empty match at a position
    /// where `regex` prefers an empty one.
    end_anchored: Option<Regex>,
    /// The pattern can assert on text past the match (`$`, `\z`, `\b`, `\B`).
    looks_past_end: bool,
    options: RegexOptions,
    canonicalization: ArenaStr,
}

impl PatternRule {
    /// Compile `pattern` with `options`.
    pub fn compile(
        pattern: &str,
        options: RegexOptions,
        canonicalization: ArenaStr,
    ) -> Result<Self, regex_lite::Error> {
        let build = |source: &str| {
            RegexBuilder::new(source)
                .case_insensitive(options.contains(RegexOptions::CASELESS))
                .swap_greed(options.contains(RegexOptions::UNGREEDY))
                .build()
        };
        let regex = build(pattern)?;
        let end_anchored = if options.contains(RegexOptions::NOT_EMPTY) {
            build(&format!("(?:{pattern})\\z")).ok()
        } else {
            None
        };
        let looks_past_end = pattern.contains('$')
            || ["\\z", "\\b", "\\B"].iter().any(|a| pattern.contains(a));
        Ok(Self {
            regex,
            end_anchored,
            looks_past_end,
            options,
            canonicalization,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn options(&self) -> RegexOptions {
        self.options
    }

    pub fn canonicalization(&self) -> ArenaStr {
        self.canonicalization
    }

    /// Run the pattern against the full principal. No anchoring is added.
    ///
    /// The group list runs up to the highest-numbered group that took part
    /// in the match; lower groups that did not participate are empty.
    pub fn find<'p>(&self, principal: &'p str) -> Option<RuleMatch<'p>> {
        let caps = if self.options.contains(RegexOptions::NOT_EMPTY) {
            self.find_non_empty(principal)?
        } else {
            self.regex.captures(principal)?
        };

        let last = (0..caps.len()).rev().find(|&i| caps.get(i).is_some()).unwrap_or(0);
        let groups = (0..=last)
            .map(|i| caps.get(i).map_or("", |m| m.as_str()))
            .collect();

        Some(RuleMatch {
            canonicalization: self.canonicalization,
            groups,
        })
    }

    /// Leftmost match with a non-empty span.
    ///
    /// Where the engine's preferred match at a position is empty, the other
    /// matches starting there are tried before moving on: longest first, or
    /// shortest first under `U`.
    fn find_non_empty<'p>(&self, principal: &'p str) -> Option<Captures<'p>> {
        let mut at = 0;
        while at <= principal.len() {
            let caps = self.regex.captures_at(principal, at)?;
            let whole = caps.get(0)?;
            if !whole.is_empty() {
                return Some(caps);
            }
            let start = whole.start();
            if let Some(caps) = self.non_empty_at(principal, start) {
                return Some(caps);
            }
            at = start + principal[start..].chars().next().map_or(1, char::len_utf8);
        }
        None
    }

    // Candidate ends before the end of the principal would evaluate `$` and
    // word boundaries against a cut haystack, so those patterns only retry
    // the match that runs to the end.
    fn non_empty_at<'p>(&self, principal: &'p str, start: usize) -> Option<Captures<'p>> {
        let end_anchored = self.end_anchored.as_ref()?;
        let mut ends: Vec<usize> = principal[start..]
            .char_indices()
            .map(|(i, c)| start + i + c.len_utf8())
            .filter(|&end| !self.looks_past_end || end == principal.len())
            .collect();
        if !self.options.contains(RegexOptions::UNGREEDY) {
            ends.reverse();
        }
        ends.into_iter().find_map(|end| {
            end_anchored
                .captures_at(&principal[..end], start)
                .filter(|caps| caps.get(0).is_some_and(|m| m.start() == start))
        })
    }
}

// ---------------------------------------------------------------------------
// Rule / RuleList
// ---------------------------------------------------------------------------

/// One position in a [`RuleList`].
#[derive(Debug)]
pub enum Rule {
    Literal(LiteralGroup),
    Pattern(PatternRule),
}

impl Rule {
    pub fn find<'p>(&self, arena: &StringArena, principal: &'p str) -> Option<RuleMatch<'p>> {
        match self {
            Rule::Literal(group) => group.find(arena, principal),
            Rule::Pattern(pattern) => pattern.find(principal),
        }
    }

    fn dump<W: Write>(&self, arena: &StringArena, out: &mut W) -> io::Result<()> {
        match self {
            Rule::Literal(group) => {
                writeln!(out, "   HASH {{")?;
                for (key, canon) in group.entries() {
                    writeln!(out, "        \"{}\"  {}", arena.get(key), arena.get(canon))?;
                }
                writeln!(out, "   }} # end HASH")
            }
            Rule::Pattern(pattern) => writeln!(
                out,
                "   REGEX {{ /{}/{} {} }}",
                pattern.pattern(),
                pattern.options().modifiers(),
                arena.get(pattern.canonicalization())
            ),
        }
    }
}

/// Ordered, append-only rules for a single method.
#[derive(Debug, Default)]
pub struct RuleList {
    rules: Vec<Rule>,
}

impl RuleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_pattern(&mut self, rule: PatternRule) {
        self.rules.push(Rule::Pattern(rule));
    }

    /// Add a literal entry, extending the trailing [`LiteralGroup`] when the
    /// last rule is one. Returns `false` if the key was already present in
    /// that group.
    pub fn push_literal(&mut self, arena: &mut StringArena, key: &str, canonicalization: ArenaStr) -> bool {
        if !matches!(self.rules.last(), Some(Rule::Literal(_))) {
            self.rules.push(Rule::Literal(LiteralGroup::new()));
        }
        match self.rules.last_mut() {
            Some(Rule::Literal(group)) => group.insert(arena, key, canonicalization),
            _ => false,
        }
    }

    /// First rule in list order that matches `principal`.
    pub fn find<'p>(&self, arena: &StringArena, principal: &'p str) -> Option<RuleMatch<'p>> {
        self.rules.iter().find_map(|rule| rule.find(arena, principal))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn dump<W: Write>(&self, arena: &StringArena, out: &mut W) -> io::Result<()> {
        for rule in &self.rules {
            rule.dump(arena, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(arena: &mut StringArena, re: &str, opts: RegexOptions, canon: &str) -> PatternRule {
        let canon = arena.insert(canon);
        PatternRule::compile(re, opts, canon).unwrap()
    }

    #[test]
    fn test_adjacent_literals_share_a_group() {
        let mut arena = StringArena::new();
        let mut list = RuleList::new();
        let c = arena.insert("x");
        assert!(list.push_literal(&mut arena, "a", c));
        assert!(list.push_literal(&mut arena, "b", c));
        assert_eq!(list.len(), 1);

        let p = pattern(&mut arena, "^z$", RegexOptions::NOT_EMPTY, "z");
        list.push_pattern(p);
        assert!(list.push_literal(&mut arena, "c", c));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_duplicate_literal_first_wins() {
        let mut arena = StringArena::new();
        let mut list = RuleList::new();
        let first = arena.insert("first");
        let second = arena.insert("second");
        assert!(list.push_literal(&mut arena, "key", first));
        assert!(!list.push_literal(&mut arena, "key", second));

        let m = list.find(&arena, "key").unwrap();
        assert_eq!(arena.get(m.canonicalization), "first");
        assert_eq!(m.groups, vec!["key"]);
    }

    #[test]
    fn test_pattern_groups() {
        let mut arena = StringArena::new();
        let p = pattern(&mut arena, r"^(\w+)@(\w+)$", RegexOptions::NOT_EMPTY, r"\1");
        let m = p.find("alice@REALM").unwrap();
        assert_eq!(m.groups, vec!["alice@REALM", "alice", "REALM"]);
    }

    #[test]
    fn test_trailing_unmatched_group_is_dropped() {
        let mut arena = StringArena::new();
        let p = pattern(&mut arena, r"^(a)(x)?(b)?$", RegexOptions::NOT_EMPTY, "");
        assert_eq!(p.find("a").unwrap().groups, vec!["a", "a"]);
        assert_eq!(p.find("ab").unwrap().groups, vec!["ab", "a", "", "b"]);
    }

    #[test]
    fn test_caseless_option() {
        let mut arena = StringArena::new();
        let strict = pattern(&mut arena, "^alice$", RegexOptions::NOT_EMPTY, "");
        let loose = pattern(
            &mut arena,
            "^alice$",
            RegexOptions::NOT_EMPTY | RegexOptions::CASELESS,
            "",
        );
        assert!(strict.find("ALICE").is_none());
        assert!(loose.find("ALICE").is_some());
    }

    #[test]
    fn test_ungreedy_option() {
        let mut arena = StringArena::new();
        let greedy = pattern(&mut arena, "^(.+)@", RegexOptions::NOT_EMPTY, "");
        let lazy = pattern(
            &mut arena,
            "^(.+)@",
            RegexOptions::NOT_EMPTY | RegexOptions::UNGREEDY,
            "",
        );
        assert_eq!(greedy.find("a@b@c").unwrap().groups[1], "a@b");
        assert_eq!(lazy.find("a@b@c").unwrap().groups[1], "a");
    }

    #[test]
    fn test_not_empty_skips_empty_matches() {
        let mut arena = StringArena::new();
        let p = pattern(&mut arena, "a*", RegexOptions::NOT_EMPTY, "");
        assert_eq!(p.find("baa").unwrap().groups, vec!["aa"]);
        assert!(p.find("bbb").is_none());

        let allow_empty = pattern(&mut arena, "a*", RegexOptions::empty(), "");
        assert_eq!(allow_empty.find("bbb").unwrap().groups, vec![""]);
    }

    #[test]
    fn test_not_empty_retries_when_empty_is_preferred() {
        let mut arena = StringArena::new();
        let lazy = pattern(
            &mut arena,
            "(.*)",
            RegexOptions::NOT_EMPTY | RegexOptions::UNGREEDY,
            "",
        );
        assert_eq!(lazy.find("alice").unwrap().groups, vec!["a", "a"]);

        let empty_first = pattern(&mut arena, "(|alice)", RegexOptions::NOT_EMPTY, "");
        assert_eq!(
            empty_first.find("alice").unwrap().groups,
            vec!["alice", "alice"]
        );

        let later = pattern(&mut arena, "(|b+)", RegexOptions::NOT_EMPTY, "");
        assert_eq!(later.find("abb").unwrap().groups, vec!["bb", "bb"]);
    }

    #[test]
    fn test_not_empty_retry_respects_end_assertions() {
        let mut arena = StringArena::new();
        let p = pattern(&mut arena, "a$|", RegexOptions::NOT_EMPTY, "");
        assert!(p.find("ab").is_none());
        assert_eq!(p.find("ba").unwrap().groups, vec!["a"]);
    }

    #[test]
    fn test_modifiers_rendering() {
        let opts = RegexOptions::CASELESS | RegexOptions::UNGREEDY | RegexOptions::NOT_EMPTY;
        assert_eq!(opts.modifiers(), "iU");
        assert_eq!(RegexOptions::NOT_EMPTY.modifiers(), "");
    }
}
