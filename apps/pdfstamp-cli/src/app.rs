//! Command execution against the configured storage

use anyhow::{Context, Result};
use pdfstamp_core::{BlobStore, Document, FlattenSource, FsBlobStore, Workflow};
use std::path::Path;

use crate::config::Config;
use crate::records::RecordStore;
use crate::renderer::LazyPdfium;
use crate::Command;

pub struct App {
    workflow: Workflow<FsBlobStore, LazyPdfium>,
    records: RecordStore,
}

impl App {
    pub fn open(config: &Config) -> Result<Self> {
        let store = FsBlobStore::open(&config.storage_dir).with_context(|| {
            format!("Failed to open storage at {}", config.storage_dir.display())
        })?;
        let renderer = LazyPdfium::new(config.pdfium_library_path.clone());
        Ok(Self {
            workflow: Workflow::new(store, renderer).with_dpi(config.dpi),
            records: RecordStore::open(config.records_dir())?,
        })
    }

    /// Run one command, returning what should be printed.
    pub fn run(&self, command: Command) -> Result<String> {
        match command {
            Command::Upload { file, owner, title } => {
                let bytes = std::fs::read(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let file_name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document.pdf".to_string());
                let title = title.unwrap_or_else(|| default_title(&file));

                let document = self.workflow.upload(&owner, &title, &file_name, &bytes)?;
                self.records.save_document(&document)?;
                to_json(&document)
            }
            Command::Signature { image, owner } => {
                let bytes = std::fs::read(&image)
                    .with_context(|| format!("Failed to read {}", image.display()))?;
                let signature = self.workflow.register_signature(&owner, &bytes)?;
                self.records.save_signature(&signature)?;
                Ok(serde_json::to_string_pretty(&signature)?)
            }
            Command::Sign { id, placement } => {
                let request = placement.to_request()?;
                let document = self.records.load_document(id)?;
                let signature = self.records.load_signature(&document.owner)?;

                let signed = self
                    .workflow
                    .sign(&document, &signature, &request)
                    .with_context(|| format!("Failed to sign document {}", id))?;
                self.records.save_document(&signed)?;
                to_json(&signed)
            }
            Command::Flatten { id, original } => {
                let document = self.records.load_document(id)?;
                let source = if original {
                    FlattenSource::Original
                } else {
                    FlattenSource::SignedArtifact
                };

                let flattened = self
                    .workflow
                    .flatten(&document, source)
                    .with_context(|| format!("Failed to flatten document {}", id))?;
                self.records.save_document(&flattened)?;
                to_json(&flattened)
            }
            Command::Show { id } => to_json(&self.records.load_document(id)?),
            Command::Pages { id } => {
                let document = self.records.load_document(id)?;
                Ok(self.workflow.page_count(&document)?.to_string())
            }
            Command::Export { id, output } => {
                let document = self.records.load_document(id)?;
                let bytes = self.workflow.store().get(document.current_file())?;
                std::fs::write(&output, bytes)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                Ok(output.display().to_string())
            }
        }
    }
}

fn default_title(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}

fn to_json(document: &Document) -> Result<String> {
    Ok(serde_json::to_string_pretty(document)?)
}
