//! Unified diff parsing.
//!
//! Parses the line-oriented unified-diff output of the version-control
//! clients into per-file patches, and derives the added/modified/removed
//! file sets that the storage layer maps back to identifiers.
//!
//! The grammar is the common denominator of the supported tools: a
//! `--- `/`+++ ` pair (or a `rename from`/`rename to` pair) opens a file
//! entry, `@@ -start[,len] +start[,len] @@` opens a hunk, and hunk body
//! lines carry a one-character classification prefix. Anything else
//! between files (`diff --git`, `index`, mode lines) is ignored.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

// @@ -(source start)(,source length) +(target start)(,target length) @@ (section)
static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@ ?(.*)").unwrap()
});

/// Classification of a single hunk body line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Added,
    Removed,
    /// The `\ No newline at end of file` marker. Carried through but not
    /// counted against the hunk's declared lengths.
    NoNewline,
}

impl LineKind {
    fn prefix(self) -> char {
        match self {
            LineKind::Context => ' ',
            LineKind::Added => '+',
            LineKind::Removed => '-',
            LineKind::NoNewline => '\\',
        }
    }
}

/// One classified line of a hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub kind: LineKind,
    pub value: String,
    pub source_line_no: Option<usize>,
    pub target_line_no: Option<usize>,
    pub diff_line_no: usize,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.value)
    }
}

/// One modified block of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub source_start: usize,
    pub source_length: usize,
    pub target_start: usize,
    pub target_length: usize,
    pub section_header: String,
    pub lines: Vec<Line>,
}

impl Hunk {
    /// Number of added lines in this hunk.
    pub fn added(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.kind == LineKind::Added)
            .count()
    }

    /// Number of removed lines in this hunk.
    pub fn removed(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.kind == LineKind::Removed)
            .count()
    }
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{},{} +{},{} @@ {}",
            self.source_start,
            self.source_length,
            self.target_start,
            self.target_length,
            self.section_header
        )?;
        for line in &self.lines {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}

/// How a patch changes one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Added,
    Removed,
    Renamed,
    Modified,
}

/// All hunks touching a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedFile {
    pub source_file: String,
    pub target_file: String,
    pub renamed: bool,
    pub hunks: Vec<Hunk>,
}

impl PatchedFile {
    fn new(source: String, target: String, renamed: bool) -> Self {
        // darcs prefixes both sides with the repository directory as
        // `old-REPO/path` and `new-REPO/path`; normalize to the bare path.
        if let (Some(s), Some(t)) = (source.strip_prefix("old-"), target.strip_prefix("new-")) {
            if s == t {
                if let Some((_, rest)) = s.split_once('/') {
                    return PatchedFile {
                        source_file: rest.to_string(),
                        target_file: rest.to_string(),
                        renamed,
                        hunks: Vec::new(),
                    };
                }
            }
        }
        PatchedFile {
            source_file: source,
            target_file: target,
            renamed,
            hunks: Vec::new(),
        }
    }

    /// The file path with any `a/`/`b/` tool prefix stripped.
    pub fn path(&self) -> &str {
        if let Some(stripped) = self.source_file.strip_prefix("a/") {
            if self.target_file.starts_with("b/") || self.target_file == "/dev/null" {
                return stripped;
            }
        }
        if let Some(stripped) = self.target_file.strip_prefix("b/") {
            if self.source_file == "/dev/null" {
                return stripped;
            }
        }
        &self.source_file
    }

    /// Classify this file's change from its hunk shape.
    pub fn kind(&self) -> FileChange {
        if self.renamed {
            FileChange::Renamed
        } else if self.hunks.len() == 1
            && self.hunks[0].source_start == 0
            && self.hunks[0].source_length == 0
        {
            FileChange::Added
        } else if self.hunks.len() == 1
            && self.hunks[0].target_start == 0
            && self.hunks[0].target_length == 0
        {
            FileChange::Removed
        } else {
            FileChange::Modified
        }
    }
}

impl fmt::Display for PatchedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.renamed {
            writeln!(f, "rename from {}", self.source_file)?;
            writeln!(f, "rename to {}", self.target_file)?;
        } else {
            writeln!(f, "--- {}", self.source_file)?;
            writeln!(f, "+++ {}", self.target_file)?;
        }
        let rendered: Vec<String> = self.hunks.iter().map(|h| h.to_string()).collect();
        write!(f, "{}", rendered.join("\n"))
    }
}

/// The `(added, modified, removed)` path sets of a whole patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedFiles {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

/// A parsed unified diff: a sequence of per-file patches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    pub files: Vec<PatchedFile>,
}

impl PatchSet {
    /// Parse unified-diff text.
    ///
    /// A hunk body line that is not context/added/removed/no-newline, a
    /// hunk header with no preceding file header, and a target file
    /// header with no source are parse errors, not silent skips.
    pub fn parse(text: &str) -> Result<PatchSet> {
        let raw: Vec<&str> = text.lines().collect();
        let mut files: Vec<PatchedFile> = Vec::new();
        // Source half of a file header waiting for its target half.
        let mut pending: Option<(String, bool)> = None;
        let mut in_file = false;

        let mut i = 0;
        while i < raw.len() {
            let line = raw[i];
            if let Some(rest) = line.strip_prefix("--- ") {
                pending = Some((strip_timestamp(rest), false));
                in_file = false;
            } else if let Some(rest) = line.strip_prefix("rename from ") {
                pending = Some((rest.to_string(), true));
                in_file = false;
            } else if let Some(rest) = line.strip_prefix("+++ ") {
                let (source, renamed) = pending.take().ok_or_else(|| {
                    Error::DiffParse(format!("target file header without source: {line}"))
                })?;
                files.push(PatchedFile::new(source, strip_timestamp(rest), renamed));
                in_file = true;
            } else if let Some(rest) = line.strip_prefix("rename to ") {
                let (source, renamed) = pending.take().ok_or_else(|| {
                    Error::DiffParse(format!("rename target without source: {line}"))
                })?;
                files.push(PatchedFile::new(source, rest.to_string(), renamed));
                in_file = true;
            } else if let Some(caps) = HUNK_HEADER.captures(line) {
                if !in_file {
                    return Err(Error::DiffParse(format!(
                        "hunk with no preceding file header: {line}"
                    )));
                }
                let (hunk, next) = parse_hunk(&caps, &raw, i)?;
                if let Some(file) = files.last_mut() {
                    file.hunks.push(hunk);
                }
                i = next;
            }
            i += 1;
        }
        Ok(PatchSet { files })
    }

    /// Aggregate per-file classifications into the three path sets.
    ///
    /// Renames contribute their old name to `removed` and their new name
    /// to `added`.
    pub fn changed_files(&self) -> ChangedFiles {
        let mut changed = ChangedFiles::default();
        for file in &self.files {
            match file.kind() {
                FileChange::Renamed => {
                    changed.removed.insert(file.source_file.clone());
                    changed.added.insert(file.target_file.clone());
                }
                FileChange::Added => {
                    changed.added.insert(file.path().to_string());
                }
                FileChange::Modified => {
                    changed.modified.insert(file.path().to_string());
                }
                FileChange::Removed => {
                    changed.removed.insert(file.path().to_string());
                }
            }
        }
        changed
    }
}

impl fmt::Display for PatchSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.files.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", rendered.join("\n"))
    }
}

/// Parse one hunk starting at the header line `raw[start]`.
///
/// Consumes body lines until the running source and target counters both
/// reach the lengths declared in the header; returns the hunk and the
/// index of its last consumed line.
fn parse_hunk(caps: &regex::Captures<'_>, raw: &[&str], start: usize) -> Result<(Hunk, usize)> {
    let source_start = parse_num(caps.get(1).map(|m| m.as_str()))?;
    let source_length = parse_len(caps.get(2).map(|m| m.as_str()))?;
    let target_start = parse_num(caps.get(3).map(|m| m.as_str()))?;
    let target_length = parse_len(caps.get(4).map(|m| m.as_str()))?;
    let section_header = caps.get(5).map(|m| m.as_str()).unwrap_or("").to_string();

    let mut hunk = Hunk {
        source_start,
        source_length,
        target_start,
        target_length,
        section_header,
        lines: Vec::new(),
    };

    let mut source_no = source_start;
    let mut target_no = target_start;
    let source_end = source_start + source_length;
    let target_end = target_start + target_length;

    let mut i = start;
    while source_no < source_end || target_no < target_end {
        i += 1;
        if i >= raw.len() {
            break;
        }
        let body = raw[i];
        let (kind, value) = classify(body)?;
        let mut line = Line {
            kind,
            value,
            source_line_no: None,
            target_line_no: None,
            diff_line_no: i + 1,
        };
        match kind {
            LineKind::Context => {
                line.source_line_no = Some(source_no);
                line.target_line_no = Some(target_no);
                source_no += 1;
                target_no += 1;
            }
            LineKind::Added => {
                line.target_line_no = Some(target_no);
                target_no += 1;
            }
            LineKind::Removed => {
                line.source_line_no = Some(source_no);
                source_no += 1;
            }
            LineKind::NoNewline => {}
        }
        hunk.lines.push(line);
    }
    Ok((hunk, i))
}

fn classify(line: &str) -> Result<(LineKind, String)> {
    // Some tools emit completely empty context lines.
    if line.is_empty() {
        return Ok((LineKind::Context, String::new()));
    }
    let mut chars = line.chars();
    let kind = match chars.next() {
        Some(' ') => LineKind::Context,
        Some('+') => LineKind::Added,
        Some('-') => LineKind::Removed,
        Some('\\') => LineKind::NoNewline,
        _ => {
            return Err(Error::DiffParse(format!("hunk diff line expected: {line}")));
        }
    };
    Ok((kind, chars.as_str().to_string()))
}

fn parse_num(field: Option<&str>) -> Result<usize> {
    field
        .unwrap_or("0")
        .parse()
        .map_err(|_| Error::DiffParse("bad hunk header offset".to_string()))
}

/// A missing length field defaults to 1.
fn parse_len(field: Option<&str>) -> Result<usize> {
    match field {
        Some(s) => s
            .parse()
            .map_err(|_| Error::DiffParse("bad hunk header length".to_string())),
        None => Ok(1),
    }
}

fn strip_timestamp(field: &str) -> String {
    match field.split_once('\t') {
        Some((name, _timestamp)) => name.to_string(),
        None => field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD_AND_MODIFY: &str = "\
diff --git a/.bt/abc/values b/.bt/abc/values
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/.bt/abc/values
@@ -0,0 +1,2 @@
+first
+second
diff --git a/.bt/def/values b/.bt/def/values
index e69de29..4b48dee 100644
--- a/.bt/def/values
+++ b/.bt/def/values
@@ -1,3 +1,3 @@
 kept
-old
+new
 tail
";

    #[test]
    fn test_changed_files_added_and_modified() {
        let patch = PatchSet::parse(ADD_AND_MODIFY).unwrap();
        let changed = patch.changed_files();
        assert_eq!(
            changed.added.iter().collect::<Vec<_>>(),
            vec![".bt/abc/values"]
        );
        assert_eq!(
            changed.modified.iter().collect::<Vec<_>>(),
            vec![".bt/def/values"]
        );
        assert!(changed.removed.is_empty());
    }

    #[test]
    fn test_removed_file() {
        let text = "\
--- a/gone.txt
+++ /dev/null
@@ -1,2 +0,0 @@
-one
-two
";
        let patch = PatchSet::parse(text).unwrap();
        assert_eq!(patch.files.len(), 1);
        assert_eq!(patch.files[0].kind(), FileChange::Removed);
        assert_eq!(patch.files[0].path(), "gone.txt");
        let changed = patch.changed_files();
        assert_eq!(changed.removed.iter().collect::<Vec<_>>(), vec!["gone.txt"]);
    }

    #[test]
    fn test_rename_contributes_both_names() {
        let text = "\
diff --git a/old.txt b/new.txt
similarity index 100%
rename from old.txt
rename to new.txt
";
        let patch = PatchSet::parse(text).unwrap();
        assert_eq!(patch.files[0].kind(), FileChange::Renamed);
        let changed = patch.changed_files();
        assert_eq!(changed.removed.iter().collect::<Vec<_>>(), vec!["old.txt"]);
        assert_eq!(changed.added.iter().collect::<Vec<_>>(), vec!["new.txt"]);
        assert!(changed.modified.is_empty());
    }

    #[test]
    fn test_missing_length_defaults_to_one() {
        let text = "\
--- a/f
+++ b/f
@@ -1 +1 @@
-old
+new
";
        let patch = PatchSet::parse(text).unwrap();
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.source_length, 1);
        assert_eq!(hunk.target_length, 1);
        assert_eq!(hunk.added(), 1);
        assert_eq!(hunk.removed(), 1);
        assert_eq!(patch.files[0].kind(), FileChange::Modified);
    }

    #[test]
    fn test_hunk_line_numbers() {
        let patch = PatchSet::parse(ADD_AND_MODIFY).unwrap();
        let hunk = &patch.files[1].hunks[0];
        assert_eq!(hunk.lines[0].source_line_no, Some(1));
        assert_eq!(hunk.lines[0].target_line_no, Some(1));
        assert_eq!(hunk.lines[1].source_line_no, Some(2));
        assert_eq!(hunk.lines[1].target_line_no, None);
        assert_eq!(hunk.lines[2].target_line_no, Some(2));
        assert_eq!(hunk.lines[3].source_line_no, Some(3));
        assert_eq!(hunk.lines[3].target_line_no, Some(3));
    }

    #[test]
    fn test_no_newline_marker_is_classified_not_counted() {
        let text = "\
--- a/f
+++ b/f
@@ -1,1 +1,1 @@
-old
\\ No newline at end of file
+new
";
        let patch = PatchSet::parse(text).unwrap();
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.lines.len(), 3);
        assert_eq!(hunk.lines[1].kind, LineKind::NoNewline);
        assert_eq!(hunk.added(), 1);
        assert_eq!(hunk.removed(), 1);
    }

    #[test]
    fn test_empty_body_line_is_context() {
        let text = "\
--- a/f
+++ b/f
@@ -1,2 +1,2 @@

-old
+new
";
        let patch = PatchSet::parse(text).unwrap();
        let hunk = &patch.files[0].hunks[0];
        assert_eq!(hunk.lines[0].kind, LineKind::Context);
        assert_eq!(hunk.lines[0].value, "");
    }

    #[test]
    fn test_malformed_hunk_line_is_an_error() {
        let text = "\
--- a/f
+++ b/f
@@ -1,2 +1,2 @@
 context
garbage line
";
        match PatchSet::parse(text) {
            Err(Error::DiffParse(msg)) => assert!(msg.contains("garbage")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_hunk_without_file_header_is_an_error() {
        let text = "@@ -1,1 +1,1 @@\n-old\n+new\n";
        assert!(matches!(
            PatchSet::parse(text),
            Err(Error::DiffParse(_))
        ));
    }

    #[test]
    fn test_target_without_source_is_an_error() {
        let text = "+++ b/f\n@@ -1,1 +1,1 @@\n-o\n+n\n";
        assert!(matches!(
            PatchSet::parse(text),
            Err(Error::DiffParse(_))
        ));
    }

    #[test]
    fn test_darcs_repo_prefixes_are_normalized() {
        let text = "\
--- old-myrepo/.bt/abc/values
+++ new-myrepo/.bt/abc/values
@@ -1,1 +1,1 @@
-old
+new
";
        let patch = PatchSet::parse(text).unwrap();
        assert_eq!(patch.files[0].path(), ".bt/abc/values");
    }

    #[test]
    fn test_timestamps_are_stripped() {
        let text = "\
--- a/f\t2010-01-01 00:00:00.000000000 +0000
+++ b/f\t2010-01-02 00:00:00.000000000 +0000
@@ -1,1 +1,1 @@
-old
+new
";
        let patch = PatchSet::parse(text).unwrap();
        assert_eq!(patch.files[0].source_file, "a/f");
        assert_eq!(patch.files[0].target_file, "b/f");
    }

    #[test]
    fn test_section_header_is_kept() {
        let text = "\
--- a/f
+++ b/f
@@ -1,1 +1,1 @@ fn main()
-old
+new
";
        let patch = PatchSet::parse(text).unwrap();
        assert_eq!(patch.files[0].hunks[0].section_header, "fn main()");
    }

    #[test]
    fn test_render_reparse_is_idempotent() {
        let patch = PatchSet::parse(ADD_AND_MODIFY).unwrap();
        let rendered = patch.to_string();
        let reparsed = PatchSet::parse(&rendered).unwrap();
        assert_eq!(rendered, reparsed.to_string());
        assert_eq!(patch.changed_files(), reparsed.changed_files());
        for (original, round_tripped) in patch.files.iter().zip(reparsed.files.iter()) {
            assert_eq!(original.kind(), round_tripped.kind());
            for (a, b) in original.hunks.iter().zip(round_tripped.hunks.iter()) {
                let kinds_a: Vec<LineKind> = a.lines.iter().map(|l| l.kind).collect();
                let kinds_b: Vec<LineKind> = b.lines.iter().map(|l| l.kind).collect();
                assert_eq!(kinds_a, kinds_b);
            }
        }
    }

    #[test]
    fn test_render_reparse_preserves_renames() {
        let text = "\
rename from old.txt
rename to new.txt
";
        let patch = PatchSet::parse(text).unwrap();
        let reparsed = PatchSet::parse(&patch.to_string()).unwrap();
        assert_eq!(reparsed.files[0].kind(), FileChange::Renamed);
    }
}
