//! Character-level diff (Myers) and the statistics derived from it.
//!
//! Common prefix and suffix are trimmed before the O((N+M)D) search. The
//! search keeps one snapshot of the frontier per edit step, so memory grows
//! with D²; past [`MAX_EDIT_DISTANCE`] the trimmed middle is reported as one
//! deletion followed by one insertion.

use crate::count_words;

/// Edit distance above which the middle section is not aligned further.
pub const MAX_EDIT_DISTANCE: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Equal,
    Insert,
    Delete,
}

/// A maximal run of characters sharing one [`ChangeKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSpan {
    pub kind: ChangeKind,
    pub text: String,
}

/// Diff `old` against `new`, returning merged spans in document order.
pub fn diff_chars(old: &str, new: &str) -> Vec<DiffSpan> {
    let a: Vec<char> = old.chars().collect();
    let b: Vec<char> = new.chars().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];

    let middle = myers(a_mid, b_mid).unwrap_or_else(|| {
        a_mid
            .iter()
            .map(|c| (ChangeKind::Delete, *c))
            .chain(b_mid.iter().map(|c| (ChangeKind::Insert, *c)))
            .collect()
    });

    let ops = a[..prefix]
        .iter()
        .map(|c| (ChangeKind::Equal, *c))
        .chain(middle)
        .chain(a[a.len() - suffix..].iter().map(|c| (ChangeKind::Equal, *c)));

    let mut spans: Vec<DiffSpan> = Vec::new();
    for (kind, c) in ops {
        match spans.last_mut() {
            Some(span) if span.kind == kind => span.text.push(c),
            _ => spans.push(DiffSpan {
                kind,
                text: c.to_string(),
            }),
        }
    }
    spans
}

/// Forward Myers search; `None` when the edit distance exceeds the cap.
fn myers(a: &[char], b: &[char]) -> Option<Vec<(ChangeKind, char)>> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max_d = (a.len() + b.len()).min(MAX_EDIT_DISTANCE) as isize;
    let off = max_d + 1;
    let mut v = vec![0isize; (2 * max_d + 3) as usize];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    for d in 0..=max_d {
        // Snapshot of the frontier reached with d-1 edits, for k in -d..=d.
        trace.push(v[(off - d) as usize..=(off + d) as usize].to_vec());

        let mut k = -d;
        while k <= d {
            let down = k == -d || (k != d && v[(off + k - 1) as usize] < v[(off + k + 1) as usize]);
            let mut x = if down {
                v[(off + k + 1) as usize]
            } else {
                v[(off + k - 1) as usize] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[(off + k) as usize] = x;

            if x >= n && y >= m {
                return Some(backtrack(a, b, &trace, d));
            }
            k += 2;
        }
    }
    None
}

fn backtrack(a: &[char], b: &[char], trace: &[Vec<isize>], d_final: isize) -> Vec<(ChangeKind, char)> {
    let mut ops = Vec::new();
    let (mut x, mut y) = (a.len() as isize, b.len() as isize);

    for d in (0..=d_final).rev() {
        if d == 0 {
            while x > 0 && y > 0 {
                ops.push((ChangeKind::Equal, a[(x - 1) as usize]));
                x -= 1;
                y -= 1;
            }
            break;
        }

        let snap = &trace[d as usize];
        let at = |k: isize| snap[(k + d) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            ops.push((ChangeKind::Equal, a[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }
        if x == prev_x {
            ops.push((ChangeKind::Insert, b[(y - 1) as usize]));
        } else {
            ops.push((ChangeKind::Delete, a[(x - 1) as usize]));
        }
        x = prev_x;
        y = prev_y;
    }

    ops.reverse();
    ops
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Character and word counts derived from a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub inserted_chars: usize,
    pub deleted_chars: usize,
    pub unchanged_chars: usize,
    pub inserted_words: usize,
    pub deleted_words: usize,
}

impl DiffStats {
    pub fn words_changed(&self) -> u64 {
        (self.inserted_words + self.deleted_words) as u64
    }

    /// `(inserted + deleted) / unchanged * 100`, rounded to two decimals.
    ///
    /// With no unchanged characters the ratio is undefined; any change then
    /// counts as 100%.
    pub fn percent_changed(&self) -> f64 {
        let changed = self.inserted_chars + self.deleted_chars;
        if self.unchanged_chars == 0 {
            return if changed == 0 { 0.0 } else { 100.0 };
        }
        round2(changed as f64 / self.unchanged_chars as f64 * 100.0)
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Diff two bodies and tally the result.
pub fn diff_stats(old: &str, new: &str) -> DiffStats {
    let mut stats = DiffStats::default();
    for span in diff_chars(old, new) {
        let chars = span.text.chars().count();
        match span.kind {
            ChangeKind::Equal => stats.unchanged_chars += chars,
            ChangeKind::Insert => {
                stats.inserted_chars += chars;
                stats.inserted_words += count_words(&span.text);
            }
            ChangeKind::Delete => {
                stats.deleted_chars += chars;
                stats.deleted_words += count_words(&span.text);
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(spans: &[DiffSpan]) -> String {
        spans
            .iter()
            .map(|s| match s.kind {
                ChangeKind::Equal => s.text.clone(),
                ChangeKind::Insert => format!("{{+{}+}}", s.text),
                ChangeKind::Delete => format!("[-{}-]", s.text),
            })
            .collect()
    }

    /// Applying the spans must reproduce both inputs.
    fn assert_reconstructs(old: &str, new: &str) {
        let spans = diff_chars(old, new);
        let rebuilt_old: String = spans
            .iter()
            .filter(|s| s.kind != ChangeKind::Insert)
            .map(|s| s.text.as_str())
            .collect();
        let rebuilt_new: String = spans
            .iter()
            .filter(|s| s.kind != ChangeKind::Delete)
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(rebuilt_old, old);
        assert_eq!(rebuilt_new, new);
    }

    #[test]
    fn identical_inputs_are_one_equal_span() {
        let spans = diff_chars("same text", "same text");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, ChangeKind::Equal);
        assert!(diff_chars("", "").is_empty());
    }

    #[test]
    fn single_insertion_and_deletion() {
        assert_eq!(render(&diff_chars("abc", "abxc")), "ab{+x+}c");
        assert_eq!(render(&diff_chars("abxc", "abc")), "ab[-x-]c");
    }

    #[test]
    fn replacement_in_the_middle() {
        let spans = diff_chars("the quick fox", "the slow fox");
        assert_reconstructs("the quick fox", "the slow fox");
        assert!(spans.iter().any(|s| s.kind == ChangeKind::Delete));
        assert!(spans.iter().any(|s| s.kind == ChangeKind::Insert));
    }

    #[test]
    fn reconstructs_assorted_inputs() {
        let cases = [
            ("", "hello"),
            ("hello", ""),
            ("kitten", "sitting"),
            ("ABCABBA", "CBABAC"),
            ("línea uno\nlínea dos", "línea uno\nlínea tres\nfin"),
        ];
        for (old, new) in cases {
            assert_reconstructs(old, new);
        }
    }

    #[test]
    fn myers_finds_shortest_script() {
        // Classic example: D = 5.
        let spans = diff_chars("ABCABBA", "CBABAC");
        let edits: usize = spans
            .iter()
            .filter(|s| s.kind != ChangeKind::Equal)
            .map(|s| s.text.chars().count())
            .sum();
        assert_eq!(edits, 5);
    }

    #[test]
    fn stats_are_deterministic() {
        let old = "alpha beta gamma delta ".repeat(20);
        let new = old.replace("gamma", "epsilon zeta");
        let first = diff_stats(&old, &new);
        for _ in 0..5 {
            assert_eq!(diff_stats(&old, &new), first);
        }
        assert_eq!(first.percent_changed(), diff_stats(&old, &new).percent_changed());
    }

    #[test]
    fn appended_tenth_is_ten_percent() {
        let old = "word ".repeat(200);
        let new = format!("{old}{}", "more ".repeat(20));
        let stats = diff_stats(&old, &new);
        assert_eq!(stats.unchanged_chars, 1000);
        assert_eq!(stats.inserted_chars, 100);
        assert!((stats.percent_changed() - 10.0).abs() <= 0.01);
        assert_eq!(stats.words_changed(), 20);
    }

    #[test]
    fn counts_words_in_changed_spans() {
        let stats = diff_stats("one two three", "one two three four five");
        assert_eq!(stats.inserted_words, 2);
        assert_eq!(stats.deleted_words, 0);
    }

    #[test]
    fn fully_replaced_text_is_hundred_percent() {
        let stats = diff_stats("aaaa", "bbbb");
        assert_eq!(stats.unchanged_chars, 0);
        assert_eq!(stats.percent_changed(), 100.0);
        assert_eq!(DiffStats::default().percent_changed(), 0.0);
    }

    #[test]
    fn oversized_edit_falls_back_to_replace() {
        let old: String = (0..3000).map(|i| if i % 2 == 0 { 'a' } else { 'b' }).collect();
        let new: String = (0..3000).map(|i| if i % 3 == 0 { 'c' } else { 'd' }).collect();
        assert_reconstructs(&old, &new);
    }
}
