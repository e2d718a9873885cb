//! Principal canonicalization and user mapping.
//!
//! A [`MapFile`] holds one ordered [`RuleList`] per authentication method
//! plus one for the user map. Loading appends rules in file order; lookups
//! walk the list for a method and return the first match, expanded through
//! its canonicalization template.
//!
//! ```text
//! # method   principal                      canonicalization
//! KERBEROS   /^(.*)@EXAMPLE\.COM$/           \1
//! SSL        "/DC=org/CN=Alice Smith"        alice@example.com
//! @include   mapfile.d
//! ```
//!
//! Parse problems are local: a bad line, a regex that does not compile or
//! a rejected `@include` is logged, counted in the [`LoadReport`] and
//! skipped. Loading is single-threaded; once built, a `MapFile` is only
//! read, so concurrent lookups are safe. Use [`SharedMapFile`] to publish a
//! rebuilt map without readers ever seeing a half-loaded one.

pub mod arena;
pub mod include;
pub mod parser;
pub mod rule;
pub mod shared;
pub mod substitute;

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use self::arena::{ArenaMap, StringArena};
use self::include::{resolve_include, DirLister, FsDirLister};
use self::parser::{parse_canon_line, parse_user_line, CanonLine, UserLine};
use self::rule::{PatternRule, RegexOptions, Rule, RuleList};
use crate::config::MapConfig;
use crate::errors::{ConfigError, MapFileError};

pub use self::shared::SharedMapFile;

/// Name the user map table is shown under in dumps.
pub const USERMAP_NAME: &str = "<usermap>";

/// Read one line into `buf`, without its `\n` or `\r\n` terminator.
///
/// Bytes that are not UTF-8 are replaced rather than failing the source.
fn read_line<R: BufRead>(
    src: &mut R,
    buf: &mut Vec<u8>,
    source_name: &str,
) -> Result<Option<String>, MapFileError> {
    buf.clear();
    let read = src.read_until(b'\n', buf).map_err(|source| MapFileError::Read {
        source_name: source_name.to_string(),
        source,
    })?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    let line = String::from_utf8_lossy(buf);
    if let Cow::Owned(_) = line {
        warn!(source = source_name, "line is not valid UTF-8, invalid bytes replaced");
    }
    Ok(Some(line.into_owned()))
}

// ---------------------------------------------------------------------------
// Options and reports
// ---------------------------------------------------------------------------

/// How a canonicalization source is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Principals are literals unless written `/regex/`. When false every
    /// principal is compiled as a regular expression.
    pub assume_literal: bool,
    /// Honor `@include`. Included files are always loaded with this off.
    pub allow_include: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            assume_literal: true,
            allow_include: true,
        }
    }
}

/// Counters describing one load, including anything it pulled in through
/// `@include`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub lines: usize,
    pub rules_added: usize,
    pub duplicate_keys: usize,
    pub malformed_lines: usize,
    pub invalid_patterns: usize,
    pub rejected_includes: usize,
    pub files_included: usize,
    pub sources_failed: usize,
}

impl LoadReport {
    pub fn merge(&mut self, other: &LoadReport) {
        self.lines += other.lines;
        self.rules_added += other.rules_added;
        self.duplicate_keys += other.duplicate_keys;
        self.malformed_lines += other.malformed_lines;
        self.invalid_patterns += other.invalid_patterns;
        self.rejected_includes += other.rejected_includes;
        self.files_included += other.files_included;
        self.sources_failed += other.sources_failed;
    }

    /// `true` if anything was skipped because of an error. Duplicate
    /// literal keys are not errors.
    pub fn has_problems(&self) -> bool {
        self.malformed_lines + self.invalid_patterns + self.rejected_includes + self.sources_failed
            > 0
    }

    fn record(&mut self, outcome: AddOutcome) {
        match outcome {
            AddOutcome::Added => self.rules_added += 1,
            AddOutcome::Duplicate => self.duplicate_keys += 1,
            AddOutcome::InvalidPattern => self.invalid_patterns += 1,
        }
    }
}

/// Result of [`MapFile::add_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// The literal key already exists in the current literal group.
    Duplicate,
    /// The pattern did not compile; nothing was added.
    InvalidPattern,
}

/// Pattern compilation counters for one map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegexStats {
    pub compiled: usize,
    pub failed: usize,
    pub min_pattern_len: usize,
    pub max_pattern_len: usize,
}

impl RegexStats {
    fn record(&mut self, pattern_len: usize) {
        if self.compiled == 0 || pattern_len < self.min_pattern_len {
            self.min_pattern_len = pattern_len;
        }
        self.max_pattern_len = self.max_pattern_len.max(pattern_len);
        self.compiled += 1;
    }
}

/// Memory and rule accounting, see [`MapFile::usage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapFileUsage {
    /// Method tables, counting the user map.
    pub methods: usize,
    /// Rule list positions (literal groups count once).
    pub entries: usize,
    pub regex: usize,
    /// Literal keys across all groups.
    pub hash: usize,
    pub string_bytes: usize,
    pub wasted_bytes: usize,
    /// Approximate number of heap allocations held by the map.
    pub allocations: usize,
}

// ---------------------------------------------------------------------------
// MapFile
// ---------------------------------------------------------------------------

/// Canonicalization and user-map rules loaded from one or more mapfiles.
pub struct MapFile {
    arena: StringArena,
    methods: ArenaMap<RuleList>,
    usermap: Option<RuleList>,
    regex_stats: RegexStats,
    lister: Arc<dyn DirLister + Send + Sync>,
}

impl fmt::Debug for MapFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapFile")
            .field("methods", &self.methods.len())
            .field("usermap", &self.usermap.as_ref().map(RuleList::len))
            .field("regex_stats", &self.regex_stats)
            .finish_non_exhaustive()
    }
}

impl Default for MapFile {
    fn default() -> Self {
        Self::with_dir_lister(Arc::new(FsDirLister::default()))
    }
}

impl MapFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `lister` to enumerate directories named by `@include`.
    pub fn with_dir_lister(lister: Arc<dyn DirLister + Send + Sync>) -> Self {
        Self {
            arena: StringArena::new(),
            methods: ArenaMap::new(),
            usermap: None,
            regex_stats: RegexStats::default(),
            lister,
        }
    }

    /// Build a map from every source named in `config`.
    ///
    /// A source that cannot be opened, or a user map that stops on a bad
    /// line, is logged and counted; the remaining sources still load.
    pub fn from_config(config: &MapConfig) -> Result<(Self, LoadReport), ConfigError> {
        let lister = config.include.dir_lister()?;
        let mut map = Self::with_dir_lister(Arc::new(lister));
        let mut report = LoadReport::default();

        let opts = LoadOptions {
            assume_literal: config.canonical.assume_literal,
            allow_include: config.canonical.allow_include,
        };
        for path in &config.canonical.files {
            match map.parse_canonicalization_file(path, opts) {
                Ok(r) => report.merge(&r),
                Err(e) => {
                    error!(error = %e, "canonicalization source skipped");
                    report.sources_failed += 1;
                }
            }
        }
        for path in &config.usermap.files {
            match map.parse_usermap_file(path, config.usermap.assume_literal) {
                Ok(r) => report.merge(&r),
                Err(e) => {
                    error!(error = %e, "usermap source incomplete");
                    report.sources_failed += 1;
                }
            }
        }

        info!(
            methods = map.methods.len(),
            rules = report.rules_added,
            problems = report.has_problems(),
            "mapfile configuration loaded"
        );
        Ok((map, report))
    }

    // -- loading ------------------------------------------------------------

    /// Load a canonicalization file from disk.
    pub fn parse_canonicalization_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        opts: LoadOptions,
    ) -> Result<LoadReport, MapFileError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            error!(path = %path.display(), error = %source, "could not open canonicalization file");
            MapFileError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        debug!(path = %path.display(), "reading mapfile");
        self.parse_canonicalization(BufReader::new(file), &path.to_string_lossy(), opts)
    }

    /// Load canonicalization rules from a line source. `source_name` is used
    /// in diagnostics and to resolve relative `@include` paths.
    pub fn parse_canonicalization<R: BufRead>(
        &mut self,
        mut src: R,
        source_name: &str,
        opts: LoadOptions,
    ) -> Result<LoadReport, MapFileError> {
        let mut report = LoadReport::default();

        let mut buf = Vec::new();
        let mut line_no = 0;
        while let Some(line) = read_line(&mut src, &mut buf, source_name)? {
            line_no += 1;
            report.lines += 1;

            match parse_canon_line(&line, opts.assume_literal) {
                CanonLine::Ignore => {}
                CanonLine::Include(target) => {
                    self.include(source_name, line_no, &target, opts, &mut report)
                }
                CanonLine::Malformed {
                    method,
                    principal,
                    canonicalization,
                } => {
                    error!(
                        source = source_name,
                        line = line_no,
                        method = %method,
                        principal = %principal,
                        canonicalization = %canonicalization,
                        "error parsing line, skipping to next line"
                    );
                    report.malformed_lines += 1;
                }
                CanonLine::Entry(entry) => {
                    debug!(
                        source = source_name,
                        line = line_no,
                        method = entry.method.as_deref().unwrap_or_default(),
                        principal = %entry.principal,
                        canonicalization = %entry.canonicalization,
                        "canonicalization entry"
                    );
                    let outcome = self.add_entry(
                        entry.method.as_deref(),
                        entry.options,
                        &entry.principal,
                        &entry.canonicalization,
                    );
                    report.record(outcome);
                }
            }
        }

        debug!(source = source_name, rules = report.rules_added, "canonicalization source loaded");
        Ok(report)
    }

    fn include(
        &mut self,
        source_name: &str,
        line_no: usize,
        target: &str,
        opts: LoadOptions,
        report: &mut LoadReport,
    ) {
        if !opts.allow_include {
            error!(
                source = source_name,
                line = line_no,
                "@include directive not allowed in this map file"
            );
            report.rejected_includes += 1;
            return;
        }
        if target.is_empty() {
            error!(source = source_name, line = line_no, "empty filename for @include directive");
            report.rejected_includes += 1;
            return;
        }

        let path = resolve_include(source_name, target);
        let files = if path.is_dir() {
            match self.lister.list(&path) {
                Ok(files) => files,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "could not include dir");
                    report.sources_failed += 1;
                    return;
                }
            }
        } else {
            vec![path]
        };

        let nested = LoadOptions {
            allow_include: false,
            ..opts
        };
        for file in files {
            match self.parse_canonicalization_file(&file, nested) {
                Ok(r) => {
                    report.merge(&r);
                    report.files_included += 1;
                }
                Err(e) => {
                    warn!(source = source_name, line = line_no, error = %e, "included file skipped");
                    report.sources_failed += 1;
                }
            }
        }
    }

    /// Load a user map file from disk.
    pub fn parse_usermap_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        assume_literal: bool,
    ) -> Result<LoadReport, MapFileError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            error!(path = %path.display(), error = %source, "could not open usermap file");
            MapFileError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.parse_usermap(BufReader::new(file), &path.to_string_lossy(), assume_literal)
    }

    /// Load user map rules (`<canonical> <user>`) from a line source.
    ///
    /// Unlike canonicalization sources, a line without a user field stops
    /// the load with [`MapFileError::MalformedUsermapLine`]. Rules from the
    /// preceding lines stay in the map.
    pub fn parse_usermap<R: BufRead>(
        &mut self,
        mut src: R,
        source_name: &str,
        assume_literal: bool,
    ) -> Result<LoadReport, MapFileError> {
        let mut report = LoadReport::default();

        let mut buf = Vec::new();
        let mut line_no = 0;
        while let Some(line) = read_line(&mut src, &mut buf, source_name)? {
            line_no += 1;
            report.lines += 1;

            match parse_user_line(&line, assume_literal) {
                UserLine::Ignore => {}
                UserLine::Malformed { canonicalization } => {
                    error!(
                        source = source_name,
                        line = line_no,
                        canonicalization = %canonicalization,
                        "error parsing usermap line"
                    );
                    return Err(MapFileError::MalformedUsermapLine {
                        source_name: source_name.to_string(),
                        line: line_no,
                    });
                }
                UserLine::Entry(entry) => {
                    debug!(
                        source = source_name,
                        line = line_no,
                        canonicalization = %entry.principal,
                        user = %entry.canonicalization,
                        "usermap entry"
                    );
                    let outcome =
                        self.add_entry(None, entry.options, &entry.principal, &entry.canonicalization);
                    report.record(outcome);
                }
            }
        }

        Ok(report)
    }

    /// Append one rule to the table for `method` (`None` is the user map).
    ///
    /// A non-empty `options` set makes `principal` a regular expression;
    /// otherwise it is a literal key added to the trailing literal group.
    pub fn add_entry(
        &mut self,
        method: Option<&str>,
        options: RegexOptions,
        principal: &str,
        canonicalization: &str,
    ) -> AddOutcome {
        let canon = self.arena.insert(canonicalization);
        let list = match method {
            Some(method) => self
                .methods
                .get_or_insert_with(&mut self.arena, method, RuleList::new),
            None => self.usermap.get_or_insert_with(RuleList::new),
        };

        if options.is_empty() {
            return if list.push_literal(&mut self.arena, principal, canon) {
                AddOutcome::Added
            } else {
                AddOutcome::Duplicate
            };
        }

        match PatternRule::compile(principal, options, canon) {
            Ok(rule) => {
                self.regex_stats.record(principal.len());
                list.push_pattern(rule);
                AddOutcome::Added
            }
            Err(e) => {
                self.regex_stats.failed += 1;
                error!(
                    pattern = principal,
                    error = %e,
                    "error compiling expression, this entry will be ignored"
                );
                AddOutcome::InvalidPattern
            }
        }
    }

    // -- lookup -------------------------------------------------------------

    fn lookup(&self, list: &RuleList, input: &str) -> Option<String> {
        let found = list.find(&self.arena, input)?;
        let template = self.arena.get(found.canonicalization);
        Some(substitute::expand(template, &found.groups))
    }

    /// Map `principal`, authenticated by `method`, to its canonical name.
    ///
    /// `None` when the method has no table or no rule matches.
    pub fn canonicalize(&self, method: &str, principal: &str) -> Option<String> {
        let (_, list) = self.methods.get(&self.arena, method)?;
        self.lookup(list, principal)
    }

    /// Map a canonical name to a local account through the user map.
    pub fn resolve_user(&self, canonical: &str) -> Option<String> {
        self.lookup(self.usermap.as_ref()?, canonical)
    }

    /// `true` if any rule was loaded for `method`.
    pub fn has_method(&self, method: &str) -> bool {
        self.methods
            .get(&self.arena, method)
            .is_some_and(|(_, list)| !list.is_empty())
    }

    /// Method names in load order.
    pub fn methods(&self) -> Vec<&str> {
        self.methods.iter().map(|(name, _)| self.arena.get(name)).collect()
    }

    // -- housekeeping -------------------------------------------------------

    /// Drop every rule but keep the string arena.
    pub fn reset(&mut self) {
        self.methods.clear();
        self.usermap = None;
    }

    /// Drop every rule and release the string arena.
    pub fn clear(&mut self) {
        self.reset();
        self.arena.clear();
        self.regex_stats = RegexStats::default();
    }

    /// Number of regex rules plus literal keys.
    pub fn size(&self) -> usize {
        let usage = self.usage();
        usage.regex + usage.hash
    }

    pub fn regex_stats(&self) -> RegexStats {
        self.regex_stats
    }

    fn tables(&self) -> Vec<(&str, &RuleList)> {
        let mut tables: Vec<_> = self
            .methods
            .iter()
            .map(|(name, list)| (self.arena.get(name), list))
            .collect();
        tables.sort_by(|a, b| a.0.cmp(b.0));
        if let Some(list) = &self.usermap {
            tables.insert(0, (USERMAP_NAME, list));
        }
        tables
    }

    pub fn usage(&self) -> MapFileUsage {
        let tables = self.tables();
        let mut usage = MapFileUsage {
            methods: tables.len(),
            ..Default::default()
        };
        let mut allocations = 0;

        for (_, list) in &tables {
            allocations += 1;
            for rule in list.rules() {
                usage.entries += 1;
                match rule {
                    Rule::Literal(group) => {
                        usage.hash += group.len();
                        allocations += 2 + group.bucket_count();
                    }
                    Rule::Pattern(_) => {
                        usage.regex += 1;
                        allocations += 1;
                    }
                }
            }
        }

        let arena = self.arena.usage();
        usage.string_bytes = arena.used;
        usage.wasted_bytes = arena.wasted;
        usage.allocations = allocations + arena.chunks;
        usage
    }

    /// Render every table for debugging.
    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (name, list) in self.tables() {
            writeln!(out)?;
            writeln!(out, "{name} = {{")?;
            list.dump(&self.arena, out)?;
            writeln!(out, "}} # end {name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon_map(text: &str) -> MapFile {
        let mut map = MapFile::new();
        map.parse_canonicalization(text.as_bytes(), "test", LoadOptions::default())
            .unwrap();
        map
    }

    #[test]
    fn test_regex_then_literal() {
        let map = canon_map(
            "KERBEROS /^(.*)@EXAMPLE\\.COM$/ \\1\n\
             KERBEROS someuser unused\n",
        );
        assert_eq!(
            map.canonicalize("KERBEROS", "alice@EXAMPLE.COM").as_deref(),
            Some("alice")
        );
        assert_eq!(
            map.canonicalize("KERBEROS", "someuser").as_deref(),
            Some("someuser")
        );
        assert_eq!(map.canonicalize("KERBEROS", "nobody"), None);
        assert_eq!(map.canonicalize("SSL", "alice@EXAMPLE.COM"), None);
    }

    #[test]
    fn test_non_utf8_line_does_not_stop_the_source() {
        let text: &[u8] = b"GSI a first\nSSL \"/CN=M\xfcller\" mueller\nGSI b after\n";
        let mut map = MapFile::new();
        let report = map
            .parse_canonicalization(text, "test", LoadOptions::default())
            .unwrap();
        assert_eq!(report.lines, 3);
        assert_eq!(map.canonicalize("GSI", "a").as_deref(), Some("first"));
        assert_eq!(map.canonicalize("GSI", "b").as_deref(), Some("after"));
        assert_eq!(
            map.canonicalize("SSL", "/CN=M\u{fffd}ller").as_deref(),
            Some("mueller")
        );
    }

    #[test]
    fn test_non_utf8_usermap_line_is_decoded() {
        let text: &[u8] = b"m\xfcller mueller\nalice al\n";
        let mut map = MapFile::new();
        map.parse_usermap(text, "users", true).unwrap();
        assert_eq!(map.resolve_user("alice").as_deref(), Some("al"));
        assert_eq!(map.resolve_user("m\u{fffd}ller").as_deref(), Some("mueller"));
    }

    #[test]
    fn test_crlf_terminators_are_stripped() {
        let map = canon_map("GSI a b\r\nGSI /^(c)$/ \\1x\r\nGSI last end");
        assert_eq!(map.canonicalize("GSI", "a").as_deref(), Some("b"));
        assert_eq!(map.canonicalize("GSI", "c").as_deref(), Some("cx"));
        assert_eq!(map.canonicalize("GSI", "last").as_deref(), Some("end"));

        let mut users = MapFile::new();
        users.parse_usermap("alice al\r\n".as_bytes(), "users", true).unwrap();
        assert_eq!(users.resolve_user("alice").as_deref(), Some("al"));
    }

    #[test]
    fn test_not_empty_pattern_prefers_non_empty_match() {
        let map = canon_map("GSI /(.*)/U \\1\nGSI /(|alice)/ x\\1\n");
        assert_eq!(map.canonicalize("GSI", "alice").as_deref(), Some("a"));

        let map = canon_map("GSI /(|alice)/ x\\1\n");
        assert_eq!(map.canonicalize("GSI", "alice").as_deref(), Some("xalice"));
    }

    #[test]
    fn test_literal_expands_group_zero() {
        let map = canon_map("SSL bob \\0@pool\n");
        assert_eq!(map.canonicalize("SSL", "bob").as_deref(), Some("bob@pool"));
    }

    #[test]
    fn test_file_order_wins() {
        let map = canon_map(
            "GSI /^alice/ first\n\
             GSI alice second\n\
             GSI /.*/ third\n",
        );
        assert_eq!(map.canonicalize("GSI", "alice").as_deref(), Some("first"));
        assert_eq!(map.canonicalize("GSI", "zed").as_deref(), Some("third"));
    }

    #[test]
    fn test_literal_before_regex() {
        let map = canon_map(
            "GSI alice literal\n\
             GSI /^alice$/ regex\n",
        );
        assert_eq!(map.canonicalize("GSI", "alice").as_deref(), Some("literal"));
    }

    #[test]
    fn test_report_counts() {
        let mut map = MapFile::new();
        let report = map
            .parse_canonicalization(
                "# comment\n\
                 \n\
                 GSI a x\n\
                 GSI a y\n\
                 GSI /(unclosed/ z\n\
                 GSI onlytwo\n"
                    .as_bytes(),
                "test",
                LoadOptions::default(),
            )
            .unwrap();
        assert_eq!(report.lines, 6);
        assert_eq!(report.rules_added, 1);
        assert_eq!(report.duplicate_keys, 1);
        assert_eq!(report.invalid_patterns, 1);
        assert_eq!(report.malformed_lines, 1);
        assert!(report.has_problems());
        assert_eq!(map.regex_stats().failed, 1);
    }

    #[test]
    fn test_include_rejected_when_disallowed() {
        let mut map = MapFile::new();
        let opts = LoadOptions {
            allow_include: false,
            ..Default::default()
        };
        let report = map
            .parse_canonicalization("@include other\nGSI a b\n".as_bytes(), "test", opts)
            .unwrap();
        assert_eq!(report.rejected_includes, 1);
        assert_eq!(map.canonicalize("GSI", "a").as_deref(), Some("b"));
    }

    #[test]
    fn test_empty_include_target() {
        let mut map = MapFile::new();
        let report = map
            .parse_canonicalization("@include\n".as_bytes(), "test", LoadOptions::default())
            .unwrap();
        assert_eq!(report.rejected_includes, 1);
    }

    #[test]
    fn test_legacy_mode_compiles_everything() {
        let mut map = MapFile::new();
        let opts = LoadOptions {
            assume_literal: false,
            ..Default::default()
        };
        map.parse_canonicalization("GSI ^bo+b$ bob_local\n".as_bytes(), "test", opts)
            .unwrap();
        assert_eq!(map.canonicalize("GSI", "booob").as_deref(), Some("bob_local"));
        assert_eq!(map.usage().regex, 1);
    }

    #[test]
    fn test_usermap() {
        let mut map = MapFile::new();
        map.parse_usermap("alice      alice_local\n".as_bytes(), "users", true)
            .unwrap();
        assert_eq!(map.resolve_user("alice").as_deref(), Some("alice_local"));
        assert_eq!(map.resolve_user("bob"), None);
        assert_eq!(map.canonicalize("alice", "alice"), None);
    }

    #[test]
    fn test_usermap_stops_on_malformed_line() {
        let mut map = MapFile::new();
        let err = map
            .parse_usermap("alice a\nbroken\ncarol c\n".as_bytes(), "users", true)
            .unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert_eq!(map.resolve_user("alice").as_deref(), Some("a"));
        assert_eq!(map.resolve_user("carol"), None);
    }

    #[test]
    fn test_usermap_regex() {
        let mut map = MapFile::new();
        map.parse_usermap("/^(\\w+)@pool$/ \\1\n".as_bytes(), "users", true)
            .unwrap();
        assert_eq!(map.resolve_user("carol@pool").as_deref(), Some("carol"));
    }

    #[test]
    fn test_no_usermap_means_not_found() {
        let map = canon_map("GSI a b\n");
        assert_eq!(map.resolve_user("a"), None);
    }

    #[test]
    fn test_usage_and_size() {
        let mut map = canon_map(
            "GSI a x\n\
             GSI b y\n\
             GSI /^c/ z\n\
             SSL d w\n",
        );
        map.parse_usermap("e f\n".as_bytes(), "users", true).unwrap();

        let usage = map.usage();
        assert_eq!(usage.methods, 3);
        assert_eq!(usage.entries, 4);
        assert_eq!(usage.regex, 1);
        assert_eq!(usage.hash, 4);
        assert!(usage.string_bytes > 0);
        assert!(usage.allocations > 0);
        assert_eq!(map.size(), 5);
        assert_eq!(map.methods(), vec!["GSI", "SSL"]);
    }

    #[test]
    fn test_reset_and_clear() {
        let mut map = canon_map("GSI a b\n");
        map.reset();
        assert_eq!(map.canonicalize("GSI", "a"), None);
        assert!(map.usage().string_bytes > 0);

        map.clear();
        assert_eq!(map.usage(), MapFileUsage::default());

        map.parse_canonicalization("GSI a c\n".as_bytes(), "test", LoadOptions::default())
            .unwrap();
        assert_eq!(map.canonicalize("GSI", "a").as_deref(), Some("c"));
    }

    #[test]
    fn test_dump_format() {
        let mut map = canon_map(
            "SSL \"bob smith\" bob\n\
             GSI /^x$/i X\n",
        );
        map.parse_usermap("bob bob_local\n".as_bytes(), "users", true)
            .unwrap();

        let mut out = Vec::new();
        map.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = "\n<usermap> = {\n   HASH {\n        \"bob\"  bob_local\n   } # end HASH\n} # end <usermap>\n\
                        \nGSI = {\n   REGEX { /^x$/i X }\n} # end GSI\n\
                        \nSSL = {\n   HASH {\n        \"bob smith\"  bob\n   } # end HASH\n} # end SSL\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_has_method() {
        let map = canon_map("GSI a b\n");
        assert!(map.has_method("GSI"));
        assert!(!map.has_method("SSL"));
    }
}
