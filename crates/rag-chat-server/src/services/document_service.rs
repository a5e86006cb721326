use crate::config::RagConfig;
use crate::database::{NewChunk, Repository};
use crate::document::{DocumentParser, ParsedDocument, TextChunker};
use anyhow::{Context, Result};
use pgvector::Vector;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::services::conversation::manager::{EmbeddingProvider, IngestionProvider};
use crate::services::conversation::types::IngestionReport;

/// Loads the PDF directory into the vector store, skipping files already indexed
pub struct DocumentService {
    repository: Arc<Repository>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    chunker: TextChunker,
    pdf_directory: PathBuf,
    // One ingestion run at a time, so the filename check stays valid
    run_lock: Mutex<()>,
}

impl DocumentService {
    pub fn new(
        repository: Arc<Repository>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        config: &RagConfig,
    ) -> Result<Self> {
        Ok(Self {
            repository,
            embedding_provider,
            chunker: TextChunker::new(config.chunk_size, config.chunk_overlap)?,
            pdf_directory: config.pdf_directory.clone(),
            run_lock: Mutex::new(()),
        })
    }

    /// parse -> chunk -> embed -> save, for one file
    async fn index_file(&self, path: &Path) -> Result<usize> {
        let owned = path.to_path_buf();
        let parsed: ParsedDocument = tokio::task::spawn_blocking(move || DocumentParser::parse(&owned))
            .await
            .context("PDF parser task panicked")??;

        if parsed.content.trim().is_empty() {
            anyhow::bail!("No text content found in {}", parsed.metadata.file_name);
        }

        let chunks = self.chunker.chunk(&parsed.content);
        info!(
            "{}: {} pages, {} chars, {} chunks",
            parsed.metadata.file_name,
            parsed.metadata.pages,
            parsed.metadata.char_count,
            chunks.len()
        );

        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = self
                .embedding_provider
                .embed(&chunk.content)
                .await
                .with_context(|| format!("Failed to embed chunk {}", chunk.index))?;

            rows.push(NewChunk {
                source_file: parsed.metadata.file_name.clone(),
                chunk_index: i32::try_from(chunk.index).unwrap_or(i32::MAX),
                content: chunk.content,
                embedding: Vector::from(embedding),
            });
        }

        self.repository.insert_chunks(&rows).await
    }
}

#[async_trait::async_trait]
impl IngestionProvider for DocumentService {
    async fn process_all(&self) -> Result<IngestionReport> {
        let _run = self.run_lock.lock().await;
        info!("Starting document processing in {:?}", self.pdf_directory);

        let files = find_pdfs(&self.pdf_directory).await?;
        let mut report = IngestionReport {
            files_found: files.len(),
            ..Default::default()
        };

        if files.is_empty() {
            warn!("No PDF files found in {:?}", self.pdf_directory);
            return Ok(report);
        }

        let known: HashSet<String> = self
            .repository
            .list_source_files()
            .await
            .context("Failed to list indexed files")?
            .into_iter()
            .collect();

        for path in files {
            let name = file_name(&path);
            if known.contains(&name) {
                debug!("Skipping already indexed file {}", name);
                report.files_skipped += 1;
                continue;
            }

            match self.index_file(&path).await {
                Ok(count) => {
                    report.files_indexed += 1;
                    report.chunks_added += count;
                }
                Err(e) => {
                    error!("Failed to index {}: {:#}", name, e);
                    report.files_failed += 1;
                }
            }
        }

        info!(
            "Document processing finished: {} found, {} skipped, {} indexed, {} failed, {} chunks added",
            report.files_found,
            report.files_skipped,
            report.files_indexed,
            report.files_failed,
            report.chunks_added
        );

        Ok(report)
    }
}

/// PDFs directly inside `dir`, sorted by name. A missing directory is
/// created and reported as empty.
pub async fn find_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create PDF directory {:?}", dir))?;
        info!("Created PDF directory {:?}", dir);
        return Ok(Vec::new());
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read PDF directory {:?}", dir))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && DocumentParser::is_pdf(&path) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
