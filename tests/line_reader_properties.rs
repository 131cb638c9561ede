//! Property-based tests for the non-blocking line reader.
//!
//! Same `proptest!`-block style as `tests/property_tests.rs`, one invariant
//! per block. Exercises the line-reader invariant: splitting arbitrary
//! content into arbitrary chunks and feeding it through `LineBuffer` must
//! reproduce the original content split on `\r?\n`.

use kidpool::line_reader::LineBuffer;
use proptest::prelude::*;

fn split_into_chunks(data: &[u8], cut_points: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = cut_points
        .iter()
        .map(|c| c % (data.len() + 1))
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(data[start..cut].to_vec());
        start = cut;
    }
    chunks.push(data[start..].to_vec());
    chunks
}

fn expected_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

proptest! {
    /// Feeding arbitrary chunk boundaries of the same content always
    /// reproduces the same sequence of lines once EOF is flushed.
    #[test]
    fn chunk_boundaries_do_not_affect_emitted_lines(
        lines in prop::collection::vec("[a-zA-Z0-9 ]{0,12}", 1..8),
        cut_points in prop::collection::vec(any::<usize>(), 0..6),
    ) {
        let text = lines.join("\n");
        let chunks = split_into_chunks(text.as_bytes(), &cut_points);

        let mut buf = LineBuffer::new();
        let mut emitted = Vec::new();
        for chunk in &chunks {
            emitted.extend(buf.feed(chunk));
        }
        emitted.extend(buf.flush_on_eof());

        prop_assert_eq!(emitted, expected_lines(&text));
        prop_assert!(buf.is_empty());
    }

    /// A buffer that has flushed at EOF never re-emits stale content on a
    /// subsequent feed.
    #[test]
    fn flush_then_feed_starts_clean(first in "[a-zA-Z]{0,10}", second in "[a-zA-Z]{1,10}") {
        let mut buf = LineBuffer::new();
        buf.feed(first.as_bytes());
        buf.flush_on_eof();

        let lines = buf.feed(format!("{}\n", second).as_bytes());
        prop_assert_eq!(lines, vec![second]);
    }
}
