//! Document loading and text chunking.
//!
//! Loads every regular file in the watched directory as text and splits it
//! into fixed-size character windows with a fixed overlap between
//! consecutive windows. The overlap exists so information spanning a chunk
//! boundary is not lost to retrieval. Splitting is deterministic for
//! identical input.

use std::path::Path;
use tracing::warn;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Load all documents under `dir` and split them into chunks.
///
/// A missing or empty directory yields an empty vec, not an error. A file
/// that fails to load (unreadable, not valid UTF-8) is skipped with a
/// logged warning and does not abort loading of the remaining documents.
pub fn load_and_split(dir: &Path, cfg: &ChunkingConfig) -> Vec<Chunk> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    // Stable document order regardless of directory iteration order.
    paths.sort();

    let mut chunks = Vec::new();
    for path in paths {
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping document that failed to load");
                continue;
            }
        };

        for (seq, piece) in split_text(&text, cfg.chunk_size, cfg.chunk_overlap)
            .into_iter()
            .enumerate()
        {
            chunks.push(Chunk {
                source: path.clone(),
                text: piece,
                seq,
            });
        }
    }

    chunks
}

/// Split `text` into windows of `chunk_size` characters, each sharing its
/// first `overlap` characters with the tail of the previous window.
///
/// Operates on character counts, so multi-byte UTF-8 input never splits
/// inside a code point. Empty input yields no chunks.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < chunk_size);

    if text.is_empty() {
        return Vec::new();
    }

    // Byte offsets of every char boundary, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    let n_chars = bounds.len() - 1;

    let step = chunk_size - overlap;
    let mut pieces = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(n_chars);
        pieces.push(text[bounds[start]..bounds[end]].to_string());
        if end == n_chars {
            break;
        }
        start += step;
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_short_text_single_chunk() {
        let pieces = split_text("The sky is blue.", 2000, 200);
        assert_eq!(pieces, vec!["The sky is blue.".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(split_text("", 2000, 200).is_empty());
    }

    #[test]
    fn test_overlap_between_consecutive_chunks() {
        let text: String = ('a'..='z').cycle().take(25).collect();
        let pieces = split_text(&text, 10, 4);
        assert!(pieces.len() > 1);
        for pair in pieces.windows(2) {
            let prev_tail: String = pair[0].chars().skip(pair[0].chars().count() - 4).collect();
            let next_head: String = pair[1].chars().take(4).collect();
            assert_eq!(prev_tail, next_head);
        }
    }

    #[test]
    fn test_coverage_reconstructs_document() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, \
                    sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.";
        let overlap = 7;
        let pieces = split_text(text, 30, overlap);

        let mut rebuilt = pieces[0].clone();
        for piece in &pieces[1..] {
            rebuilt.extend(piece.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_multibyte_input_splits_on_char_boundaries() {
        let text: String = "héllo wörld ünïcode ".repeat(10);
        let pieces = split_text(&text, 16, 3);
        let total: usize = pieces[0].chars().count()
            + pieces[1..]
                .iter()
                .map(|p| p.chars().count() - 3)
                .sum::<usize>();
        assert_eq!(total, text.chars().count());
    }

    #[test]
    fn test_deterministic() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        assert_eq!(split_text(text, 12, 5), split_text(text, 12, 5));
    }

    #[test]
    fn test_missing_directory_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let chunks = load_and_split(&tmp.path().join("nope"), &ChunkingConfig::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_load_and_split_assigns_per_document_sequence() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), "x".repeat(30)).unwrap();
        std::fs::write(tmp.path().join("b.txt"), "short").unwrap();

        let cfg = ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 2,
        };
        let chunks = load_and_split(tmp.path(), &cfg);

        let a_seqs: Vec<_> = chunks
            .iter()
            .filter(|c| c.source.ends_with("a.txt"))
            .map(|c| c.seq)
            .collect();
        assert!(a_seqs.len() > 1);
        assert_eq!(a_seqs, (0..a_seqs.len()).collect::<Vec<_>>());

        let b: Vec<_> = chunks
            .iter()
            .filter(|c| c.source.ends_with("b.txt"))
            .collect();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].seq, 0);
        assert_eq!(b[0].text, "short");
    }
}
