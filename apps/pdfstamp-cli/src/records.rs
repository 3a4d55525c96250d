//! JSON metadata records for documents and signatures
//!
//! The core library does not persist metadata; this is the CLI's own thin
//! layer. One file per record, replaced atomically on every save.

use anyhow::{Context, Result};
use pdfstamp_core::{storage, Document, Signature};
use serde::{de::DeserializeOwned, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["documents", "signatures"] {
            std::fs::create_dir_all(root.join(dir))
                .with_context(|| format!("Failed to create {}", root.join(dir).display()))?;
        }
        Ok(Self { root })
    }

    fn document_path(&self, id: Uuid) -> PathBuf {
        self.root.join("documents").join(format!("{}.json", id))
    }

    fn signature_path(&self, owner: &str) -> Result<PathBuf> {
        // Same owner rules as the signature image key
        storage::signature_key(owner)?;
        Ok(self.root.join("signatures").join(format!("{}.json", owner)))
    }

    pub fn save_document(&self, document: &Document) -> Result<()> {
        write_json(&self.document_path(document.id), document)
    }

    /// Load a document record, rejecting one whose status and files disagree.
    pub fn load_document(&self, id: Uuid) -> Result<Document> {
        let document: Document = read_json(&self.document_path(id))
            .with_context(|| format!("Unknown document {}", id))?;
        document
            .validate()
            .with_context(|| format!("Corrupt record for document {}", id))?;
        Ok(document)
    }

    pub fn save_signature(&self, signature: &Signature) -> Result<()> {
        write_json(&self.signature_path(&signature.owner)?, signature)
    }

    pub fn load_signature(&self, owner: &str) -> Result<Signature> {
        read_json(&self.signature_path(owner)?)
            .with_context(|| format!("No signature registered for {}", owner))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    let mut staged = tempfile::Builder::new()
        .prefix(".staged-")
        .suffix(".json")
        .tempfile_in(dir)?;
    serde_json::to_writer_pretty(staged.as_file_mut(), value)?;
    staged.write_all(b"\n")?;
    staged
        .persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfstamp_core::{DocumentStatus, FileRef};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn file(key: &str) -> FileRef {
        FileRef {
            key: key.to_string(),
            size: 3,
            sha256: storage::sha256_hex(b"pdf"),
        }
    }

    #[test]
    fn test_document_round_trip() {
        let dir = tempdir().unwrap();
        let records = RecordStore::open(dir.path()).unwrap();
        let doc = Document::new(
            Uuid::new_v4(),
            "alice",
            "Lease",
            file("documents/original/a.pdf"),
        );

        records.save_document(&doc).unwrap();
        assert_eq!(records.load_document(doc.id).unwrap(), doc);
    }

    #[test]
    fn test_unknown_document_is_an_error() {
        let dir = tempdir().unwrap();
        let records = RecordStore::open(dir.path()).unwrap();
        let err = records.load_document(Uuid::nil()).unwrap_err();
        assert!(err.to_string().contains("Unknown document"));
    }

    #[test]
    fn test_inconsistent_record_is_rejected() {
        let dir = tempdir().unwrap();
        let records = RecordStore::open(dir.path()).unwrap();
        let mut doc = Document::new(Uuid::new_v4(), "alice", "Lease", file("a.pdf"));
        doc.status = DocumentStatus::Flattened;
        records.save_document(&doc).unwrap();
        assert!(records.load_document(doc.id).is_err());
    }

    #[test]
    fn test_signature_round_trip_and_owner_rules() {
        let dir = tempdir().unwrap();
        let records = RecordStore::open(dir.path()).unwrap();
        let sig = Signature {
            id: Uuid::new_v4(),
            owner: "alice".to_string(),
            image: file("signatures/alice.png"),
        };
        records.save_signature(&sig).unwrap();
        assert_eq!(records.load_signature("alice").unwrap(), sig);
        assert!(records.load_signature("bob").is_err());
        assert!(records.load_signature("../alice").is_err());
    }

    #[test]
    fn test_saves_leave_no_staging_files() {
        let dir = tempdir().unwrap();
        let records = RecordStore::open(dir.path()).unwrap();
        let doc = Document::new(Uuid::new_v4(), "alice", "Lease", file("a.pdf"));
        records.save_document(&doc).unwrap();
        records.save_document(&doc).unwrap();
        let count = std::fs::read_dir(dir.path().join("documents")).unwrap().count();
        assert_eq!(count, 1);
    }
}
