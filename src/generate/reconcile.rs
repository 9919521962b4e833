//! Applies diff edits and full-file overwrites to an in-memory file set.
//!
//! Both operations are pure: they return a new [`FileSet`] and leave their
//! input untouched. Files that are not edited keep their original allocation.

use std::sync::Arc;

use tracing::{debug, warn};

use super::types::{FileDiff, FileSet, GeneratedFile};

/// Why a diff was not applied. Skipping is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No file with the diff's path exists.
    MissingFile,
    /// The `old` text does not occur verbatim in the file.
    OldContentNotFound,
}

/// Result of applying one diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// The first occurrence of the old text was replaced.
    Applied {
        /// Path of the edited file.
        path: String,
    },
    /// The diff was a no-op.
    Skipped {
        /// Path the diff targeted.
        path: String,
        /// Why it was skipped.
        reason: SkipReason,
    },
}

impl DiffOutcome {
    /// Whether the diff changed a file.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Files after reconciliation plus a per-diff outcome log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// The updated set.
    pub files: FileSet,
    /// One entry per input diff, in order.
    pub outcomes: Vec<DiffOutcome>,
}

impl Reconciled {
    /// Number of diffs that changed a file.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }
}

/// Applies `diffs` in order against `files`.
///
/// Each diff replaces only the first literal occurrence of its old text.
/// Later diffs see the result of earlier ones.
#[must_use]
pub fn apply_diffs(files: &FileSet, diffs: &[FileDiff]) -> Reconciled {
    let mut next = files.clone();
    let mut outcomes = Vec::with_capacity(diffs.len());

    for diff in diffs {
        let Some(current) = next.get(&diff.path) else {
            warn!(path = %diff.path, "skipping diff against missing file");
            outcomes.push(DiffOutcome::Skipped {
                path: diff.path.clone(),
                reason: SkipReason::MissingFile,
            });
            continue;
        };

        let Some(patched) = replace_first(&current.content, &diff.old_content, &diff.new_content)
        else {
            warn!(path = %diff.path, "skipping diff whose old text was not found");
            outcomes.push(DiffOutcome::Skipped {
                path: diff.path.clone(),
                reason: SkipReason::OldContentNotFound,
            });
            continue;
        };

        debug!(path = %diff.path, "applied diff");
        next.upsert(Arc::new(GeneratedFile::new(diff.path.clone(), patched)));
        outcomes.push(DiffOutcome::Applied {
            path: diff.path.clone(),
        });
    }

    Reconciled {
        files: next,
        outcomes,
    }
}

/// Overlays full-file writes: existing paths are replaced, new paths appended.
#[must_use]
pub fn merge_overwrites(files: &FileSet, overwrites: &[GeneratedFile]) -> FileSet {
    let mut next = files.clone();
    for file in overwrites {
        if !next.upsert(file.clone()) {
            debug!(path = %file.path, "revision replaced file");
        }
    }
    next
}

fn replace_first(haystack: &str, old: &str, new: &str) -> Option<String> {
    if old.is_empty() {
        return None;
    }
    let idx = haystack.find(old)?;
    let mut out = String::with_capacity(haystack.len() - old.len() + new.len());
    out.push_str(&haystack[..idx]);
    out.push_str(new);
    out.push_str(&haystack[idx + old.len()..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(files: &[(&str, &str)]) -> FileSet {
        files
            .iter()
            .map(|(p, c)| GeneratedFile::new(*p, *c))
            .collect()
    }

    fn diff(path: &str, old: &str, new: &str) -> FileDiff {
        FileDiff {
            path: path.into(),
            old_content: old.into(),
            new_content: new.into(),
        }
    }

    #[test]
    fn replaces_first_occurrence_only() {
        let files = set(&[("a.css", "red red red")]);
        let out = apply_diffs(&files, &[diff("a.css", "red", "blue")]);
        assert_eq!(out.files.get("a.css").unwrap().content, "blue red red");
        assert_eq!(out.applied(), 1);
    }

    #[test]
    fn is_pure_and_preserves_untouched_identity() {
        let files = set(&[("a.ts", "const a = 1;"), ("b.ts", "const b = 2;")]);
        let snapshot = files.clone();
        let diffs = vec![diff("a.ts", "1", "10")];

        let first = apply_diffs(&files, &diffs);
        let second = apply_diffs(&files, &diffs);

        assert_eq!(first, second);
        assert_eq!(files, snapshot);
        assert_eq!(files.get("a.ts").unwrap().content, "const a = 1;");
        assert!(Arc::ptr_eq(
            first.files.get("b.ts").unwrap(),
            files.get("b.ts").unwrap()
        ));
        assert!(!Arc::ptr_eq(
            first.files.get("a.ts").unwrap(),
            files.get("a.ts").unwrap()
        ));
    }

    #[test]
    fn missing_old_text_leaves_content_byte_identical() {
        let original = "body {\n  margin: 0;\n}\n";
        let files = set(&[("globals.css", original)]);
        let out = apply_diffs(
            &files,
            &[diff("globals.css", "padding: 0;", "padding: 4px;")],
        );

        assert_eq!(
            out.files.get("globals.css").unwrap().content.as_bytes(),
            original.as_bytes()
        );
        assert_eq!(
            out.outcomes,
            vec![DiffOutcome::Skipped {
                path: "globals.css".into(),
                reason: SkipReason::OldContentNotFound,
            }]
        );
    }

    #[test]
    fn diff_against_missing_file_is_a_noop() {
        let files = set(&[("a", "x")]);
        let out = apply_diffs(&files, &[diff("nope", "x", "y")]);
        assert_eq!(out.files, files);
        assert_eq!(
            out.outcomes,
            vec![DiffOutcome::Skipped {
                path: "nope".into(),
                reason: SkipReason::MissingFile
            }]
        );
    }

    #[test]
    fn empty_old_text_is_skipped() {
        let files = set(&[("a", "x")]);
        let out = apply_diffs(&files, &[diff("a", "", "prefix")]);
        assert_eq!(out.files.get("a").unwrap().content, "x");
        assert_eq!(out.applied(), 0);
    }

    #[test]
    fn later_diffs_see_earlier_edits() {
        let files = set(&[("a", "one")]);
        let out = apply_diffs(
            &files,
            &[diff("a", "one", "two"), diff("a", "two", "three")],
        );
        assert_eq!(out.files.get("a").unwrap().content, "three");
    }

    #[test]
    fn merge_replaces_existing_and_appends_new() {
        let files = set(&[("a", "1"), ("b", "2")]);
        let merged = merge_overwrites(
            &files,
            &[GeneratedFile::new("b", "20"), GeneratedFile::new("c", "3")],
        );
        let flat: Vec<(String, String)> = merged
            .iter()
            .map(|f| (f.path.clone(), f.content.clone()))
            .collect();
        assert_eq!(
            flat,
            vec![
                ("a".into(), "1".into()),
                ("b".into(), "20".into()),
                ("c".into(), "3".into())
            ]
        );
        assert_eq!(files.get("b").unwrap().content, "2");
    }
}
