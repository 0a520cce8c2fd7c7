use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_CHUNK_SIZE: usize = 500;

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").unwrap_or_else(|_| unreachable!()));

/// Split content into paragraph-aligned chunks of at most `chunk_size`
/// characters. Oversized paragraphs split at sentence boundaries, then by
/// whitespace; only a single whitespace-free token may exceed the limit.
pub fn chunk_content(content: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in PARAGRAPH_BREAK.split(content) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.chars().count() > chunk_size {
            flush(&mut chunks, &mut current);
            pack_oversized_paragraph(paragraph, chunk_size, &mut chunks, &mut current);
        } else if fits(&current, paragraph, "\n\n", chunk_size) {
            join(&mut current, paragraph, "\n\n");
        } else {
            flush(&mut chunks, &mut current);
            current.push_str(paragraph);
        }
    }

    flush(&mut chunks, &mut current);
    chunks
}

fn fits(current: &str, addition: &str, joiner: &str, chunk_size: usize) -> bool {
    let joiner_len = if current.is_empty() { 0 } else { joiner.len() };
    current.chars().count() + joiner_len + addition.chars().count() <= chunk_size
}

fn join(current: &mut String, addition: &str, joiner: &str) {
    if !current.is_empty() {
        current.push_str(joiner);
    }
    current.push_str(addition);
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
}

fn pack_oversized_paragraph(
    paragraph: &str,
    chunk_size: usize,
    chunks: &mut Vec<String>,
    current: &mut String,
) {
    for sentence in split_sentences(paragraph) {
        if sentence.chars().count() > chunk_size {
            flush(chunks, current);
            pack_by_whitespace(sentence, chunk_size, chunks, current);
        } else if fits(current, sentence, " ", chunk_size) {
            join(current, sentence, " ");
        } else {
            flush(chunks, current);
            current.push_str(sentence);
        }
    }
}

fn pack_by_whitespace(
    text: &str,
    chunk_size: usize,
    chunks: &mut Vec<String>,
    current: &mut String,
) {
    for word in text.split_whitespace() {
        if word.chars().count() > chunk_size {
            // A single token over the limit becomes its own chunk
            flush(chunks, current);
            chunks.push(word.to_string());
        } else if fits(current, word, " ", chunk_size) {
            join(current, word, " ");
        } else {
            flush(chunks, current);
            current.push_str(word);
        }
    }
}

/// Break text after sentence terminators followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((index, character)) = chars.next() {
        if matches!(character, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = text[start..=index].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = index + character.len_utf8();
                }
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_within_bounds(chunks: &[String], chunk_size: usize) {
        for chunk in chunks {
            let over = chunk.chars().count() > chunk_size;
            let single_token = !chunk.contains(char::is_whitespace);
            assert!(
                !over || single_token,
                "chunk exceeds size and is not a single token: {chunk:?}"
            );
        }
    }

    fn tokens(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    #[test]
    fn test_empty_content_yields_no_chunks() {
        assert!(chunk_content("", DEFAULT_CHUNK_SIZE).is_empty());
        assert!(chunk_content("  \n\n  \n\n", DEFAULT_CHUNK_SIZE).is_empty());
    }

    #[test]
    fn test_short_content_is_one_chunk() {
        let chunks = chunk_content("QGIS is a GIS.", DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks, vec!["QGIS is a GIS."]);
    }

    #[test]
    fn test_exact_size_paragraph_is_one_chunk() {
        let paragraph = "a".repeat(DEFAULT_CHUNK_SIZE);
        let chunks = chunk_content(&paragraph, DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_paragraphs_pack_greedily() {
        let content = "first paragraph\n\nsecond paragraph\n\nthird paragraph";
        let chunks = chunk_content(content, 40);
        assert_eq!(chunks[0], "first paragraph\n\nsecond paragraph");
        assert_eq!(chunks[1], "third paragraph");
    }

    #[test]
    fn test_long_paragraph_splits_on_sentences() {
        let content =
            "This is the first sentence of the paragraph. This is the second one. And a third!";
        let chunks = chunk_content(content, 50);
        assert!(chunks.len() >= 2);
        assert_within_bounds(&chunks, 50);
        assert_eq!(tokens(&chunks.join(" ")), tokens(content));
    }

    #[test]
    fn test_terminator_free_paragraph_splits_on_whitespace() {
        let content = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunk_content(content, 20);
        assert!(chunks.len() > 1);
        assert_within_bounds(&chunks, 20);
        assert_eq!(tokens(&chunks.join(" ")), tokens(content));
    }

    #[test]
    fn test_giant_token_gets_its_own_chunk() {
        let giant = "x".repeat(60);
        let content = format!("small words {giant} more words");
        let chunks = chunk_content(&content, 20);
        assert!(chunks.contains(&giant));
        assert_within_bounds(&chunks, 20);
        assert_eq!(tokens(&chunks.join(" ")), tokens(&content));
    }

    #[test]
    fn test_round_trip_preserves_tokens() {
        let content = "Intro paragraph with a few words.\n\n\
            A much longer paragraph follows here. It has several sentences in it. \
            Some of them are fairly long and wordy, to force sentence-level splits. \
            The final sentence wraps things up.\n\n\
            Outro.";
        let chunks = chunk_content(content, 80);
        assert_within_bounds(&chunks, 80);
        assert_eq!(tokens(&chunks.join(" ")), tokens(content));
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("One. Two! Three? Four");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn test_split_sentences_no_terminators() {
        let sentences = split_sentences("no terminators here at all");
        assert_eq!(sentences, vec!["no terminators here at all"]);
    }
}
