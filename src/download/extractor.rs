//! Archive extractor
//!
//! Pulls selected executables out of a zip into a flat directory. Entries are
//! matched by base name, case-insensitively, so the archive's internal
//! folder layout does not matter.

use crate::error::ChandlError;
use crate::utils::filename::{remove_if_exists, replace_file, with_suffix, STAGING_SUFFIX};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Outcome of an extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Files written into the target directory
    pub extracted: Vec<PathBuf>,
    /// Wanted names that were not in the archive
    pub missing: Vec<String>,
}

/// Extracts a fixed set of files from zip archives
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    wanted: Vec<String>,
    required: String,
}

impl ArchiveExtractor {
    /// Extract `wanted`; the first name is mandatory unless overridden
    pub fn new<I, S>(wanted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wanted: Vec<String> = wanted.into_iter().map(Into::into).collect();
        let required = wanted.first().cloned().unwrap_or_default();
        Self { wanted, required }
    }

    /// Name whose absence fails the whole pass
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required = name.into();
        self
    }

    fn wanted_name(&self, entry_name: &str) -> Option<&str> {
        let base = entry_name
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(entry_name);
        self.wanted
            .iter()
            .find(|name| name.eq_ignore_ascii_case(base))
            .map(String::as_str)
    }

    /// Extract into `target_dir`, replacing existing files of the same name
    pub fn extract(&self, archive_path: &Path, target_dir: &Path) -> Result<ExtractionReport, ChandlError> {
        let file = File::open(archive_path).map_err(|e| {
            ChandlError::Extraction(format!("cannot open {}: {}", archive_path.display(), e))
        })?;
        let mut archive = ZipArchive::new(file)?;
        std::fs::create_dir_all(target_dir)?;

        let mut extracted: Vec<PathBuf> = Vec::new();
        let mut done: Vec<&str> = Vec::new();

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let Some(name) = self.wanted_name(entry.name()) else {
                continue;
            };
            if done.contains(&name) {
                debug!("Ignoring duplicate entry {}", entry.name());
                continue;
            }

            let dest = target_dir.join(name);
            let staged = with_suffix(&dest, STAGING_SUFFIX);
            debug!("Extracting {} -> {}", entry.name(), dest.display());

            let written = File::create(&staged).and_then(|out| {
                let mut out = BufWriter::new(out);
                io::copy(&mut entry, &mut out)?;
                out.flush()
            });
            if let Err(e) = written.and_then(|()| replace_file(&staged, &dest)) {
                let _ = remove_if_exists(&staged);
                return Err(ChandlError::Extraction(format!("writing {}: {}", name, e)));
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o755))?;
            }

            done.push(name);
            extracted.push(dest);
        }

        let missing: Vec<String> = self
            .wanted
            .iter()
            .filter(|name| !done.contains(&name.as_str()))
            .cloned()
            .collect();

        if !self.required.is_empty() && missing.iter().any(|m| m.eq_ignore_ascii_case(&self.required)) {
            return Err(ChandlError::Extraction(format!(
                "{} not found in {}; the archive layout may have changed",
                self.required,
                archive_path.display()
            )));
        }

        info!("Extracted {} of {} files", extracted.len(), self.wanted.len());
        Ok(ExtractionReport { extracted, missing })
    }
}
