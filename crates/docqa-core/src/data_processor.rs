use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ChunkingSettings;
use crate::types::{Chunk, DocumentId};

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", " "];
const PAGE_BREAK: char = '\x0c';

/// A parsed source file and its chunks.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub document_id: DocumentId,
    pub path: PathBuf,
    pub chunks: Vec<Chunk>,
}

/// Reads `.txt` files and splits them into fixed-size overlapping chunks.
#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingSettings,
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(chunking_config: ChunkingSettings) -> Self { Self { chunking_config } }

    /// Processes every `.txt` file under `data_dir`, assigning document ids
    /// sequentially from `first_id` in path order.
    pub fn process_directory(&self, data_dir: &Path, first_id: DocumentId) -> Result<Vec<SourceDocument>> {
        let files = self.list_txt_files(data_dir);
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        let mut documents = Vec::with_capacity(files.len());
        for (offset, file_path) in (0u64..).zip(files.iter()) {
            let content = self.read_file_content(file_path)?;
            let document_id = first_id + offset;
            let chunks = self.chunk_document(document_id, &content);
            info!(file = %file_path.display(), document_id, chunks = chunks.len(), "processed file");
            documents.push(SourceDocument { document_id, path: file_path.clone(), chunks });
        }
        info!(files = documents.len(), chunks = documents.iter().map(|d| d.chunks.len()).sum::<usize>(), "processed directory");
        Ok(documents)
    }

    /// Splits a document into chunks. Pages are separated by form feeds and
    /// numbered from 1; text without form feeds is page 0.
    pub fn chunk_document(&self, document_id: DocumentId, content: &str) -> Vec<Chunk> {
        let paged = content.contains(PAGE_BREAK);
        let mut chunks = Vec::new();
        let mut position = 0u32;
        for (page_index, page_text) in (0u32..).zip(content.split(PAGE_BREAK)) {
            let page = if paged { page_index + 1 } else { 0 };
            for piece in self.split_text(page_text) {
                chunks.push(Chunk::new(u64::from(position) + 1, document_id, page, position, piece));
                position += 1;
            }
        }
        chunks
    }

    /// Fixed-size character windows with overlap, cut at the strongest
    /// separator found in the back half of each window.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let size = self.chunking_config.chunk_size.max(1);
        let overlap = self.chunking_config.chunk_overlap.min(size - 1);
        let mut pieces = Vec::new();
        let mut start = 0usize;
        while start < chars.len() {
            let hard_end = (start + size).min(chars.len());
            let end = if hard_end == chars.len() { hard_end } else { Self::boundary(&chars, start, hard_end) };
            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() { pieces.push(piece.to_string()); }
            if end >= chars.len() { break; }
            let next = end.saturating_sub(overlap);
            start = if next > start { next } else { end };
        }
        pieces
    }

    fn boundary(chars: &[char], start: usize, hard_end: usize) -> usize {
        let floor = start + (hard_end - start) / 2;
        for sep in SEPARATORS {
            let sep: Vec<char> = sep.chars().collect();
            let mut end = hard_end;
            while end >= floor + sep.len() {
                if chars[end - sep.len()..end] == sep[..] { return end; }
                end -= 1;
            }
        }
        hard_end
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path(); if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
        }
        txt_files.sort(); txt_files
    }
}
