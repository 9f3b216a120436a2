//! Unified diff rendering between the submitted and proposed file sets.
//!
//! Line-level LCS with three lines of context per hunk. Files too large for
//! the quadratic table are rendered as a single whole-file replacement.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

const CONTEXT: usize = 3;

/// Above this many LCS cells a file is diffed as a full replacement.
const MAX_TABLE_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal(usize),
    Delete(usize),
    Insert(usize),
}

/// Render a unified diff for every path whose content differs.
pub fn unified_diff(
    original: &BTreeMap<String, String>,
    proposed: &BTreeMap<String, String>,
) -> String {
    let paths: BTreeSet<&String> = original.keys().chain(proposed.keys()).collect();
    let mut out = String::new();

    for path in paths {
        let old = original.get(path).map(String::as_str);
        let new = proposed.get(path).map(String::as_str);
        if old == new {
            continue;
        }
        let old_header = match old {
            Some(_) => format!("a/{path}"),
            None => "/dev/null".to_string(),
        };
        let new_header = match new {
            Some(_) => format!("b/{path}"),
            None => "/dev/null".to_string(),
        };
        let _ = writeln!(out, "--- {old_header}");
        let _ = writeln!(out, "+++ {new_header}");
        out.push_str(&file_hunks(old.unwrap_or(""), new.unwrap_or("")));
    }

    out
}

fn file_hunks(old: &str, new: &str) -> String {
    // Lines keep their terminator so a missing final newline is a change.
    let a: Vec<&str> = old.split_inclusive('\n').collect();
    let b: Vec<&str> = new.split_inclusive('\n').collect();
    let ops = diff_ops(&a, &b);

    let changed: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, Op::Equal(_)))
        .map(|(i, _)| i)
        .collect();
    if changed.is_empty() {
        return String::new();
    }

    // Line counters before each op, for hunk headers.
    let mut a_before = Vec::with_capacity(ops.len() + 1);
    let mut b_before = Vec::with_capacity(ops.len() + 1);
    let (mut ai, mut bi) = (0usize, 0usize);
    for op in &ops {
        a_before.push(ai);
        b_before.push(bi);
        match op {
            Op::Equal(_) => {
                ai += 1;
                bi += 1;
            }
            Op::Delete(_) => ai += 1,
            Op::Insert(_) => bi += 1,
        }
    }
    a_before.push(ai);
    b_before.push(bi);

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &idx in &changed {
        let start = idx.saturating_sub(CONTEXT);
        let end = (idx + 1 + CONTEXT).min(ops.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }

    let mut out = String::new();
    for (start, end) in ranges {
        let old_len = a_before[end] - a_before[start];
        let new_len = b_before[end] - b_before[start];
        let old_start = if old_len == 0 { a_before[start] } else { a_before[start] + 1 };
        let new_start = if new_len == 0 { b_before[start] } else { b_before[start] + 1 };
        let _ = writeln!(out, "@@ -{old_start},{old_len} +{new_start},{new_len} @@");
        for op in &ops[start..end] {
            match op {
                Op::Equal(i) => push_line(&mut out, ' ', a[*i]),
                Op::Delete(i) => push_line(&mut out, '-', a[*i]),
                Op::Insert(j) => push_line(&mut out, '+', b[*j]),
            }
        }
    }
    out
}

fn push_line(out: &mut String, marker: char, line: &str) {
    out.push(marker);
    match line.strip_suffix('\n') {
        Some(text) => {
            out.push_str(text);
            out.push('\n');
        }
        None => {
            out.push_str(line);
            out.push_str("\n\\ No newline at end of file\n");
        }
    }
}

fn diff_ops(a: &[&str], b: &[&str]) -> Vec<Op> {
    let (n, m) = (a.len(), b.len());

    if n.saturating_mul(m) > MAX_TABLE_CELLS {
        return (0..n)
            .map(Op::Delete)
            .chain((0..m).map(Op::Insert))
            .collect();
    }

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(Op::Equal(i));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(Op::Delete(i));
            i += 1;
        } else {
            ops.push(Op::Insert(j));
            j += 1;
        }
    }
    ops.extend((i..n).map(Op::Delete));
    ops.extend((j..m).map(Op::Insert));
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_identical_files_produce_empty_diff() {
        let f = files(&[("a.py", "x = 1\n")]);
        assert_eq!(unified_diff(&f, &f), "");
    }

    #[test]
    fn test_single_line_change() {
        let old = files(&[("a.py", "def f(x): return x\n")]);
        let new = files(&[("a.py", "def f(x: int) -> int: return x\n")]);
        let diff = unified_diff(&old, &new);
        assert_eq!(
            diff,
            "--- a/a.py\n+++ b/a.py\n@@ -1,1 +1,1 @@\n-def f(x): return x\n+def f(x: int) -> int: return x\n"
        );
    }

    #[test]
    fn test_context_is_limited_to_three_lines() {
        let old_text: String = (1..=10).map(|i| format!("line{i}\n")).collect();
        let new_text = old_text.replace("line5\n", "LINE5\n");
        let diff = unified_diff(&files(&[("f", &old_text)]), &files(&[("f", &new_text)]));

        assert!(diff.contains("@@ -2,7 +2,7 @@"));
        assert!(diff.contains(" line2\n"));
        assert!(!diff.contains(" line1\n"));
        assert!(diff.contains(" line8\n"));
        assert!(!diff.contains(" line9\n"));
        assert!(diff.contains("-line5\n+LINE5\n"));
    }

    #[test]
    fn test_distant_changes_get_separate_hunks() {
        let old_text: String = (1..=20).map(|i| format!("l{i}\n")).collect();
        let new_text = old_text.replace("l2\n", "L2\n").replace("l18\n", "L18\n");
        let diff = unified_diff(&files(&[("f", &old_text)]), &files(&[("f", &new_text)]));
        assert_eq!(diff.matches("@@ -").count(), 2);
    }

    #[test]
    fn test_dropped_final_newline_is_a_hunk() {
        let old = files(&[("a.py", "x = 1\n")]);
        let new = files(&[("a.py", "x = 1")]);
        assert_eq!(
            unified_diff(&old, &new),
            "--- a/a.py\n+++ b/a.py\n@@ -1,1 +1,1 @@\n-x = 1\n+x = 1\n\\ No newline at end of file\n"
        );
    }

    #[test]
    fn test_added_and_removed_files() {
        let old = files(&[("gone.py", "a\n")]);
        let new = files(&[("new.py", "b\n")]);
        let diff = unified_diff(&old, &new);
        assert!(diff.contains("--- a/gone.py\n+++ /dev/null\n@@ -1,1 +0,0 @@\n-a\n"));
        assert!(diff.contains("--- /dev/null\n+++ b/new.py\n@@ -0,0 +1,1 @@\n+b\n"));
    }
}
