//! Runtime configuration from the environment (and `.env`)

use anyhow::{bail, Context, Result};
use pdfstamp_core::rasterizer::{DEFAULT_DPI, MAX_DPI};
use std::path::PathBuf;

pub const STORAGE_DIR_VAR: &str = "PDFSTAMP_STORAGE_DIR";
pub const DPI_VAR: &str = "PDFSTAMP_DPI";
pub const PDFIUM_PATH_VAR: &str = "PDFIUM_LIBRARY_PATH";

const DEFAULT_STORAGE_DIR: &str = "./pdfstamp-data";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of the blob store and the JSON records
    pub storage_dir: PathBuf,
    /// Rasterization resolution
    pub dpi: u32,
    /// Directory holding libpdfium, if not on the system library path
    pub pdfium_library_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage_dir = get(STORAGE_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));

        let dpi = match get(DPI_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("{} must be a whole number, got {:?}", DPI_VAR, raw))?,
            None => DEFAULT_DPI,
        };

        let config = Self {
            storage_dir,
            dpi,
            pdfium_library_path: get(PDFIUM_PATH_VAR).map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the environment.
    pub fn with_overrides(
        mut self,
        storage_dir: Option<PathBuf>,
        dpi: Option<u32>,
    ) -> Result<Self> {
        if let Some(dir) = storage_dir {
            self.storage_dir = dir;
        }
        if let Some(dpi) = dpi {
            self.dpi = dpi;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.dpi == 0 || self.dpi > MAX_DPI {
            bail!("DPI must be between 1 and {}, got {}", MAX_DPI, self.dpi);
        }
        Ok(())
    }

    pub fn records_dir(&self) -> PathBuf {
        self.storage_dir.join("records")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(
            config,
            Config {
                storage_dir: PathBuf::from("./pdfstamp-data"),
                dpi: 200,
                pdfium_library_path: None,
            }
        );
        assert_eq!(config.records_dir(), PathBuf::from("./pdfstamp-data/records"));
    }

    #[test]
    fn test_reads_variables() {
        let config = Config::from_lookup(lookup(&[
            (STORAGE_DIR_VAR, "/srv/stamp"),
            (DPI_VAR, " 300 "),
            (PDFIUM_PATH_VAR, "/opt/pdfium/lib"),
        ]))
        .unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("/srv/stamp"));
        assert_eq!(config.dpi, 300);
        assert_eq!(config.pdfium_library_path, Some(PathBuf::from("/opt/pdfium/lib")));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config =
            Config::from_lookup(lookup(&[(STORAGE_DIR_VAR, ""), (DPI_VAR, "  ")])).unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("./pdfstamp-data"));
        assert_eq!(config.dpi, 200);
    }

    #[test]
    fn test_bad_dpi_is_an_error() {
        assert!(Config::from_lookup(lookup(&[(DPI_VAR, "high")])).is_err());
        assert!(Config::from_lookup(lookup(&[(DPI_VAR, "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[(DPI_VAR, "5000")])).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::from_lookup(lookup(&[(DPI_VAR, "150")]))
            .unwrap()
            .with_overrides(Some(PathBuf::from("elsewhere")), Some(96))
            .unwrap();
        assert_eq!(config.storage_dir, PathBuf::from("elsewhere"));
        assert_eq!(config.dpi, 96);

        let base = Config::from_lookup(lookup(&[])).unwrap();
        assert!(base.with_overrides(None, Some(0)).is_err());
    }
}
