use std::ops::Range;

/// Character-column ranges of `current` that differ from `baseline`.
///
/// Columns past the end of the baseline count as changed; columns removed
/// from the end of the line have nothing left to draw and are ignored.
pub fn changed_columns(current: &str, baseline: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    let mut old = baseline.chars();
    for (column, ch) in current.chars().enumerate() {
        if old.next() == Some(ch) {
            continue;
        }
        match ranges.last_mut() {
            Some(last) if last.end == column => last.end = column + 1,
            _ => ranges.push(column..column + 1),
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::changed_columns;

    #[test]
    fn identical_lines_have_no_highlights() {
        assert!(changed_columns("load 0.42", "load 0.42").is_empty());
        assert!(changed_columns("", "").is_empty());
    }

    #[test]
    fn adjacent_changes_merge_into_one_range() {
        assert_eq!(changed_columns("load 0.57", "load 0.42"), vec![7..9]);
        assert_eq!(changed_columns("a1c3", "abcd"), vec![1..2, 3..4]);
    }

    #[test]
    fn growth_is_highlighted_and_shrink_is_not() {
        assert_eq!(changed_columns("abcdef", "abc"), vec![3..6]);
        assert_eq!(changed_columns("new", ""), vec![0..3]);
        assert!(changed_columns("ab", "abcdef").is_empty());
    }

    #[test]
    fn columns_count_characters_not_bytes() {
        assert_eq!(changed_columns("héllo", "hallo"), vec![1..2]);
    }
}
