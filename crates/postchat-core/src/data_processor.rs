use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::{Chunk, Post, UserId};

/// Splits post text into bounded chunks ready for embedding.
#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingSettings,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_settings(chunking_config: ChunkingSettings) -> Self { Self { chunking_config } }

    /// Chunk a post's text in reading order. Vectors are left empty.
    pub fn chunk_post(&self, post: &Post) -> Vec<Chunk> {
        self.chunk_text(&post.content)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| Chunk { id: Uuid::new_v4(), post_id: post.id, chunk_index, content, vector: Vec::new() })
            .collect()
    }

    /// Paragraphs within the cap stay whole; longer ones are packed sentence
    /// by sentence, and a sentence over the cap becomes overlapping word windows.
    pub fn chunk_text(&self, content: &str) -> Vec<String> {
        let normalized = content.replace("\r\n", "\n");
        let mut chunks = Vec::new();
        for paragraph in split_paragraphs(&normalized) {
            if self.count_tokens(&paragraph) <= self.chunking_config.max_tokens {
                chunks.push(paragraph);
                continue;
            }
            let mut current = String::new();
            for sentence in split_sentences(&paragraph) {
                if self.count_tokens(&sentence) > self.chunking_config.max_tokens {
                    if !current.is_empty() { chunks.push(std::mem::take(&mut current)); }
                    chunks.extend(self.split_with_overlap(&sentence));
                    continue;
                }
                let candidate = if current.is_empty() { sentence.clone() } else { format!("{} {}", current, sentence) };
                if self.count_tokens(&candidate) > self.chunking_config.max_tokens {
                    chunks.push(std::mem::replace(&mut current, sentence));
                } else {
                    current = candidate;
                }
            }
            if !current.is_empty() { chunks.push(current); }
        }
        chunks.retain(|c| !c.trim().is_empty());
        debug!(chunks = chunks.len(), "chunked text");
        chunks
    }

    /// Build one post per `.txt` file under `data_dir`, authored by `author_id`.
    pub fn load_text_posts(&self, data_dir: &Path, author_id: UserId) -> Result<Vec<Post>> {
        let files = self.list_txt_files(data_dir);
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        let mut posts = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), "loading {}/{}", file_index + 1, files.len());
            let content = self.read_file_content(file_path)?;
            posts.push(Post::new(author_id, self.extract_title(file_path), content));
        }
        info!(files = posts.len(), dir = %data_dir.display(), "loaded text posts");
        Ok(posts)
    }

    pub fn read_file_content(&self, file_path: &Path) -> Result<String> {
        let bytes = fs::read(file_path).map_err(|e| Error::NotFound(format!("{}: {}", file_path.display(), e)))?;
        Ok(match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).to_string(),
        })
    }

    pub fn extract_title(&self, file_path: &Path) -> String {
        file_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "untitled".to_string())
    }

    fn count_tokens(&self, text: &str) -> usize { let word_count = text.split_whitespace().count(); (word_count as f32 / 0.75).ceil() as usize }

    fn split_with_overlap(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let words_per_chunk = ((self.chunking_config.max_tokens as f32 * 0.75).floor() as usize).max(1);
        let overlap_words = ((words_per_chunk as f32 * self.chunking_config.overlap_percent) as usize).min(words_per_chunk - 1);
        let mut chunks = Vec::new(); let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap_words;
        }
        chunks
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path(); if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
        }
        txt_files.sort(); txt_files
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() { paragraphs.push(current.join("\n")); current.clear(); }
        } else {
            current.push(line.trim());
        }
    }
    if !current.is_empty() { paragraphs.push(current.join("\n")); }
    paragraphs
}

/// Sentence ends at `.`, `!` or `?` followed by whitespace or end of text.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = paragraph[start..end].trim();
                if !sentence.is_empty() { sentences.push(sentence.to_string()); }
                start = end;
            }
        }
    }
    let tail = paragraph[start..].trim();
    if !tail.is_empty() { sentences.push(tail.to_string()); }
    sentences
}
