//! Output file naming

/// Which transformation produced an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Signed,
    Flattened,
    FlattenedOriginal,
}

impl Stage {
    pub fn suffix(&self) -> &'static str {
        match self {
            Stage::Signed => "_signed",
            Stage::Flattened => "_flattened",
            Stage::FlattenedOriginal => "_original_flattened",
        }
    }
}

/// Strip a trailing `.pdf` extension, ignoring case.
pub fn stem(file_name: &str) -> &str {
    let split = file_name.len().saturating_sub(4);
    match (file_name.get(..split), file_name.get(split..)) {
        (Some(stem), Some(ext)) if ext.eq_ignore_ascii_case(".pdf") && !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Name of the file produced at `stage` from the original upload named `base`.
///
/// Always derived from the original's name, so flattening a signed document
/// yields `contract_flattened.pdf`, not `contract_signed_flattened.pdf`.
pub fn output_name(base: &str, stage: Stage) -> String {
    format!("{}{}.pdf", stem(base), stage.suffix())
}
