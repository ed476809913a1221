use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::models::Chunk;

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub separator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkingConfig::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for ChunkingConfig {
    fn from(value: &PipelineConfig) -> Self {
        Self {
            max_chars: value.chunk_size,
            overlap_chars: value.chunk_overlap,
            separator: value.separator.clone(),
        }
    }
}

impl ChunkingConfig {
    fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        if self.separator.is_empty() {
            return Err(IngestError::InvalidChunkConfig(
                "separator must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Splits `corpus` into windows of at most `max_chars` characters.
///
/// Each window ends right after the last separator that still leaves room
/// for progress, or at the hard limit when there is none. The next window
/// starts `overlap_chars` before the previous end, so dropping the first
/// `overlap_chars` of every chunk but the first gives back the corpus.
pub fn split_text(corpus: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let chars = corpus.chars().collect::<Vec<_>>();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let separator = config.separator.chars().collect::<Vec<_>>();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + config.max_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            last_separator_end(&chars, &separator, start, start + config.overlap_chars, hard_end)
                .unwrap_or(hard_end)
        };

        chunks.push(Chunk {
            index: chunks.len(),
            start,
            text: chars[start..end].iter().collect(),
        });

        if end == chars.len() {
            break;
        }
        start = end - config.overlap_chars;
    }

    Ok(chunks)
}

/// Largest `end` in `(floor, ceiling]` such that a separator lying inside
/// the window ends exactly at `end`.
fn last_separator_end(
    chars: &[char],
    separator: &[char],
    start: usize,
    floor: usize,
    ceiling: usize,
) -> Option<usize> {
    let width = separator.len();
    (floor + 1..=ceiling)
        .rev()
        .filter(|end| *end >= start + width)
        .find(|end| chars[end - width..*end] == *separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
            separator: "\n".to_string(),
        }
    }

    fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
        let mut text = String::new();
        for (position, chunk) in chunks.iter().enumerate() {
            if position == 0 {
                text.push_str(&chunk.text);
            } else {
                text.extend(chunk.text.chars().skip(overlap));
            }
        }
        text
    }

    fn sample_corpus() -> String {
        (0..60)
            .map(|line| format!("line {line} talks about pump pressure and valve {}", line * 7))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn short_corpus_is_a_single_chunk() {
        let chunks = split_text("just a sentence", &config(1_000, 200)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "just a sentence");
        assert_eq!(chunks[0].start, 0);
    }

    #[test]
    fn empty_corpus_has_no_chunks() {
        assert!(split_text("", &config(1_000, 200)).unwrap().is_empty());
    }

    #[test]
    fn hard_cut_when_no_separator_in_range() {
        let corpus = "A".repeat(1_200);
        let chunks = split_text(&corpus, &config(1_000, 200)).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].char_len(), 1_000);
        assert_eq!(chunks[1].start, 800);
        assert_eq!(chunks[1].char_len(), 400);
    }

    #[test]
    fn prefers_breaking_after_separator() {
        let corpus = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = split_text(&corpus, &config(40, 5)).unwrap();

        assert!(chunks[0].text.ends_with('\n'));
        assert_eq!(chunks[0].char_len(), 31);
    }

    #[test]
    fn chunks_respect_size_and_exact_overlap() {
        let corpus = sample_corpus();
        let overlap = 40;
        let chunks = split_text(&corpus, &config(300, overlap)).unwrap();

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.char_len() <= 300);
        }
        for pair in chunks.windows(2) {
            let tail = pair[0]
                .text
                .chars()
                .skip(pair[0].char_len() - overlap)
                .collect::<String>();
            let head = pair[1].text.chars().take(overlap).collect::<String>();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn removing_overlap_reconstructs_corpus() {
        let corpus = format!("{}\nÜbersicht – ärger\n{}", sample_corpus(), "x".repeat(700));
        for (max_chars, overlap) in [(100, 0), (250, 50), (1_000, 200)] {
            let chunks = split_text(&corpus, &config(max_chars, overlap)).unwrap();
            assert_eq!(reassemble(&chunks, overlap), corpus);
        }
    }

    #[test]
    fn multi_character_separator_is_honoured() {
        let corpus = format!("{}\n\n{}", "a".repeat(20), "b".repeat(20));
        let settings = ChunkingConfig {
            max_chars: 30,
            overlap_chars: 2,
            separator: "\n\n".to_string(),
        };
        let chunks = split_text(&corpus, &settings).unwrap();

        assert!(chunks[0].text.ends_with("\n\n"));
        assert_eq!(reassemble(&chunks, 2), corpus);
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let error = split_text("abc", &config(10, 10)).unwrap_err();
        assert!(matches!(error, IngestError::InvalidChunkConfig(_)));
    }
}
