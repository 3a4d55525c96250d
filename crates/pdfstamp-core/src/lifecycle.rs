//! Document records and the status state machine
//!
//! ```text
//! uploaded ──Sign──────────▶ signed ──Flatten──▶ flattened
//!    │
//!    └──────FlattenOriginal──────────────────▶ flattened_original
//! ```
//!
//! `flattened` and `flattened_original` are terminal. A document carries a
//! signed artifact exactly when it has left `uploaded`.

use crate::error::{Result, StampError};
use crate::storage::FileRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Signed,
    Flattened,
    FlattenedOriginal,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Flattened | DocumentStatus::FlattenedOriginal
        )
    }

    /// Whether a document in this status must carry a signed artifact.
    pub fn has_signed_artifact(&self) -> bool {
        !matches!(self, DocumentStatus::Uploaded)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStatus::Uploaded => write!(f, "uploaded"),
            DocumentStatus::Signed => write!(f, "signed"),
            DocumentStatus::Flattened => write!(f, "flattened"),
            DocumentStatus::FlattenedOriginal => write!(f, "flattened_original"),
        }
    }
}

/// A requested change of status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Stamp a signature onto the original
    Sign,
    /// Rasterize the signed artifact
    Flatten,
    /// Rasterize the original, skipping signing
    FlattenOriginal,
}

impl Transition {
    /// Status a document must be in for this transition.
    pub fn source(&self) -> DocumentStatus {
        match self {
            Transition::Sign | Transition::FlattenOriginal => DocumentStatus::Uploaded,
            Transition::Flatten => DocumentStatus::Signed,
        }
    }

    pub fn target(&self) -> DocumentStatus {
        match self {
            Transition::Sign => DocumentStatus::Signed,
            Transition::Flatten => DocumentStatus::Flattened,
            Transition::FlattenOriginal => DocumentStatus::FlattenedOriginal,
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Sign => write!(f, "sign"),
            Transition::Flatten => write!(f, "flatten"),
            Transition::FlattenOriginal => write!(f, "flatten_original"),
        }
    }
}

/// An uploaded document and where it is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub original_file: FileRef,
    pub signed_file: Option<FileRef>,
    pub created_at: DateTime<Utc>,
    pub status: DocumentStatus,
}

impl Document {
    /// A freshly uploaded document.
    pub fn new(
        id: Uuid,
        owner: impl Into<String>,
        title: impl Into<String>,
        original_file: FileRef,
    ) -> Self {
        Self {
            id,
            owner: owner.into(),
            title: title.into(),
            original_file,
            signed_file: None,
            created_at: Utc::now(),
            status: DocumentStatus::Uploaded,
        }
    }

    /// Check the status/artifact invariant, e.g. on records read from disk.
    pub fn validate(&self) -> Result<()> {
        match (self.status.has_signed_artifact(), self.signed_file.is_some()) {
            (true, false) => Err(StampError::PreconditionFailed(format!(
                "Document {} is {} but has no signed file",
                self.id, self.status
            ))),
            (false, true) => Err(StampError::PreconditionFailed(format!(
                "Document {} is {} but already has a signed file",
                self.id, self.status
            ))),
            _ => Ok(()),
        }
    }

    /// Fail unless `transition` may be applied to this document now.
    pub fn check_transition(&self, transition: Transition) -> Result<()> {
        self.validate()?;
        if self.status != transition.source() {
            return Err(StampError::PreconditionFailed(format!(
                "Cannot {} document {}: status is {}, expected {}",
                transition,
                self.id,
                self.status,
                transition.source()
            )));
        }
        Ok(())
    }

    /// The newest artifact: the signed file once there is one, else the original.
    pub fn current_file(&self) -> &FileRef {
        self.signed_file.as_ref().unwrap_or(&self.original_file)
    }

    /// The stored file a transition reads from.
    pub fn transition_source(&self, transition: Transition) -> Result<&FileRef> {
        self.check_transition(transition)?;
        match transition {
            Transition::Sign | Transition::FlattenOriginal => Ok(&self.original_file),
            Transition::Flatten => self.signed_file.as_ref().ok_or_else(|| {
                StampError::PreconditionFailed(format!(
                    "Document {} has no signed file to flatten",
                    self.id
                ))
            }),
        }
    }
}

/// Signature image registered by a user; one per owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: Uuid,
    pub owner: String,
    pub image: FileRef,
}

/// A completed transformation, ready to be recorded against a document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEvent {
    pub transition: Transition,
    /// The artifact the transformation produced
    pub output: FileRef,
}

/// Apply a completed transformation, returning the updated document.
///
/// The input document is left as it was; on error nothing changes.
pub fn apply_transition(document: &Document, event: DocumentEvent) -> Result<Document> {
    document.check_transition(event.transition)?;

    let mut next = document.clone();
    next.signed_file = Some(event.output);
    next.status = event.transition.target();

    tracing::info!(
        "Document {}: {} -> {}",
        document.id,
        document.status,
        next.status
    );
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(key: &str) -> FileRef {
        FileRef {
            key: key.to_string(),
            size: 1,
            sha256: "00".to_string(),
        }
    }

    fn uploaded() -> Document {
        Document::new(
            Uuid::new_v4(),
            "alice",
            "Lease",
            file("documents/original/x/lease.pdf"),
        )
    }

    fn event(transition: Transition, key: &str) -> DocumentEvent {
        DocumentEvent {
            transition,
            output: file(key),
        }
    }

    #[test]
    fn test_sign_then_flatten() {
        let doc = uploaded();
        let signed = apply_transition(&doc, event(Transition::Sign, "signed.pdf")).unwrap();
        assert_eq!(signed.status, DocumentStatus::Signed);
        assert_eq!(signed.signed_file, Some(file("signed.pdf")));
        assert_eq!(signed.original_file, doc.original_file);

        let flat = apply_transition(&signed, event(Transition::Flatten, "flat.pdf")).unwrap();
        assert_eq!(flat.status, DocumentStatus::Flattened);
        assert_eq!(flat.signed_file, Some(file("flat.pdf")));
        assert_eq!(flat.id, doc.id);
        assert_eq!(flat.created_at, doc.created_at);
        assert_eq!(flat.current_file(), &file("flat.pdf"));
        assert_eq!(doc.current_file(), &doc.original_file);
    }

    #[test]
    fn test_flatten_original() {
        let flat = apply_transition(&uploaded(), event(Transition::FlattenOriginal, "o.pdf")).unwrap();
        assert_eq!(flat.status, DocumentStatus::FlattenedOriginal);
        assert!(flat.signed_file.is_some());
    }

    #[test]
    fn test_flatten_without_signed_artifact_fails() {
        let doc = uploaded();
        let err = apply_transition(&doc, event(Transition::Flatten, "flat.pdf")).unwrap_err();
        assert!(matches!(err, StampError::PreconditionFailed(_)));
        assert!(matches!(
            doc.transition_source(Transition::Flatten),
            Err(StampError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let signed = apply_transition(&uploaded(), event(Transition::Sign, "s.pdf")).unwrap();
        let flat = apply_transition(&signed, event(Transition::Flatten, "f.pdf")).unwrap();
        let flat_original =
            apply_transition(&uploaded(), event(Transition::FlattenOriginal, "o.pdf")).unwrap();

        for doc in [&flat, &flat_original] {
            assert!(doc.status.is_terminal());
            for t in [Transition::Sign, Transition::Flatten, Transition::FlattenOriginal] {
                assert!(matches!(
                    apply_transition(doc, event(t, "again.pdf")),
                    Err(StampError::PreconditionFailed(_))
                ));
            }
        }
    }

    #[test]
    fn test_signed_document_cannot_be_resigned() {
        let signed = apply_transition(&uploaded(), event(Transition::Sign, "s.pdf")).unwrap();
        assert!(signed.check_transition(Transition::Sign).is_err());
        assert!(signed.check_transition(Transition::FlattenOriginal).is_err());
        assert_eq!(
            signed.transition_source(Transition::Flatten).unwrap(),
            &file("s.pdf")
        );
    }

    #[test]
    fn test_inconsistent_record_is_rejected() {
        let mut doc = uploaded();
        doc.status = DocumentStatus::Signed;
        assert!(matches!(doc.validate(), Err(StampError::PreconditionFailed(_))));
        assert!(doc.check_transition(Transition::Flatten).is_err());

        let mut doc = uploaded();
        doc.signed_file = Some(file("stray.pdf"));
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DocumentStatus::FlattenedOriginal).unwrap(),
            "\"flattened_original\""
        );
        assert_eq!(DocumentStatus::FlattenedOriginal.to_string(), "flattened_original");
        let status: DocumentStatus = serde_json::from_str("\"signed\"").unwrap();
        assert_eq!(status, DocumentStatus::Signed);
    }

    #[test]
    fn test_document_record_round_trips() {
        let doc = apply_transition(&uploaded(), event(Transition::Sign, "s.pdf")).unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn transition() -> impl Strategy<Value = Transition> {
        prop_oneof![
            Just(Transition::Sign),
            Just(Transition::Flatten),
            Just(Transition::FlattenOriginal),
        ]
    }

    proptest! {
        /// Whatever is requested, a document never ends up violating the
        /// status/artifact invariant, and rejected requests change nothing.
        #[test]
        fn any_transition_sequence_keeps_invariant(
            steps in proptest::collection::vec(transition(), 0..8)
        ) {
            let original = FileRef {
                key: "documents/original/x/a.pdf".to_string(),
                size: 1,
                sha256: "00".to_string(),
            };
            let mut doc = Document::new(Uuid::new_v4(), "owner", "title", original);
            for (i, step) in steps.into_iter().enumerate() {
                let output = FileRef {
                    key: format!("out-{}.pdf", i),
                    size: 1,
                    sha256: "00".to_string(),
                };
                let before = doc.clone();
                match apply_transition(&doc, DocumentEvent { transition: step, output }) {
                    Ok(next) => {
                        prop_assert_eq!(before.status, step.source());
                        prop_assert_eq!(next.status, step.target());
                        doc = next;
                    }
                    Err(_) => prop_assert_eq!(&doc, &before),
                }
                prop_assert!(doc.validate().is_ok());
            }
        }
    }
}
