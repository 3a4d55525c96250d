//! Blob storage for originals, signed outputs and signature images
//!
//! Blobs are addressed by relative, `/`-separated keys. Writes go to a
//! temporary file beside the target and are renamed into place, so a reader
//! never sees a half-written artifact.

use crate::error::{Result, StampError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

pub const ORIGINALS_PREFIX: &str = "documents/original";
pub const SIGNED_PREFIX: &str = "documents/signed";
pub const SIGNATURES_PREFIX: &str = "signatures";

/// A stored blob: its key, size and SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub key: String,
    pub size: u64,
    pub sha256: String,
}

impl FileRef {
    /// Last segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

pub trait BlobStore {
    /// Store `bytes` under `key`, replacing any previous blob.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<FileRef>;

    /// Read a blob back, checking it still matches its digest.
    fn get(&self, file: &FileRef) -> Result<Vec<u8>>;

    /// Filesystem path of a stored blob, for code that reads from paths.
    fn local_path(&self, file: &FileRef) -> Result<PathBuf>;
}

/// Compute SHA-256 hash of data
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Reject keys that are empty, absolute or that step outside the store.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = || StampError::InvalidInput(format!("Invalid storage key: {:?}", key));
    if key.is_empty() || key.contains('\\') || key.starts_with('/') {
        return Err(invalid());
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid());
        }
    }
    if Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(invalid());
    }
    Ok(())
}

/// Keep only the final path segment of a client-supplied file name.
fn sanitize_file_name(file_name: &str) -> String {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        "document.pdf".to_string()
    } else {
        name.to_string()
    }
}

pub fn original_key(document_id: Uuid, file_name: &str) -> String {
    format!(
        "{}/{}/{}",
        ORIGINALS_PREFIX,
        document_id,
        sanitize_file_name(file_name)
    )
}

pub fn signed_key(document_id: Uuid, file_name: &str) -> String {
    format!(
        "{}/{}/{}",
        SIGNED_PREFIX,
        document_id,
        sanitize_file_name(file_name)
    )
}

/// Signature images are keyed by owner, so an owner has at most one.
pub fn signature_key(owner: &str) -> Result<String> {
    let valid = !owner.is_empty()
        && owner != "."
        && owner != ".."
        && owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if !valid {
        return Err(StampError::InvalidInput(format!(
            "Owner id {:?} cannot be used as a storage key",
            owner
        )));
    }
    Ok(format!("{}/{}.png", SIGNATURES_PREFIX, owner))
}

/// Blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store, creating the root directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<FileRef> {
        let path = self.path_for(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".staged-")
            .tempfile_in(parent)?;
        staged.write_all(bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(&path).map_err(|e| StampError::Io(e.error))?;

        tracing::debug!("Stored {} ({} bytes)", key, bytes.len());
        Ok(FileRef {
            key: key.to_string(),
            size: bytes.len() as u64,
            sha256: sha256_hex(bytes),
        })
    }

    fn get(&self, file: &FileRef) -> Result<Vec<u8>> {
        let bytes = std::fs::read(self.local_path(file)?)?;
        if sha256_hex(&bytes) != file.sha256 {
            return Err(StampError::PreconditionFailed(format!(
                "Stored file {} no longer matches its digest",
                file.key
            )));
        }
        Ok(bytes)
    }

    fn local_path(&self, file: &FileRef) -> Result<PathBuf> {
        let path = self.path_for(&file.key)?;
        if !path.is_file() {
            return Err(StampError::PreconditionFailed(format!(
                "Stored file {} is missing",
                file.key
            )));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_put_then_get() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let file = store.put("documents/original/a/contract.pdf", b"%PDF-1.7").unwrap();

        assert_eq!(file.size, 8);
        assert_eq!(file.file_name(), "contract.pdf");
        assert_eq!(store.get(&file).unwrap(), b"%PDF-1.7".to_vec());
        assert!(store
            .local_path(&file)
            .unwrap()
            .ends_with("documents/original/a/contract.pdf"));
    }

    #[test]
    fn test_put_replaces_and_leaves_no_staging_files() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        store.put("signatures/alice.png", b"one").unwrap();
        let second = store.put("signatures/alice.png", b"two").unwrap();

        assert_eq!(store.get(&second).unwrap(), b"two".to_vec());
        let names: Vec<_> = std::fs::read_dir(dir.path().join("signatures"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["alice.png".to_string()]);
    }

    #[test]
    fn test_tampered_blob_fails_digest_check() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let file = store.put("signatures/bob.png", b"original").unwrap();
        std::fs::write(dir.path().join("signatures/bob.png"), b"changed").unwrap();
        assert!(matches!(
            store.get(&file),
            Err(StampError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_missing_blob_is_precondition_failure() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let file = FileRef {
            key: "documents/signed/x/out.pdf".to_string(),
            size: 0,
            sha256: sha256_hex(b""),
        };
        assert!(matches!(
            store.local_path(&file),
            Err(StampError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_escaping_keys_are_rejected() {
        for key in ["", "/etc/passwd", "../outside", "a/../../b", "a//b", "a\\b", "./a"] {
            assert!(
                matches!(validate_key(key), Err(StampError::InvalidInput(_))),
                "{:?} should be rejected",
                key
            );
        }
        assert!(validate_key("documents/original/x.pdf").is_ok());
    }

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            original_key(id, "../../scan.pdf"),
            "documents/original/00000000-0000-0000-0000-000000000000/scan.pdf"
        );
        assert_eq!(
            signed_key(id, "scan_signed.pdf"),
            "documents/signed/00000000-0000-0000-0000-000000000000/scan_signed.pdf"
        );
        assert_eq!(original_key(id, "").rsplit('/').next(), Some("document.pdf"));
        assert_eq!(signature_key("alice").unwrap(), "signatures/alice.png");
        assert!(signature_key("../alice").is_err());
        assert!(signature_key("").is_err());
    }
}
