//! KMZ archive member extraction.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use super::LoadError;

/// Extract the first member whose name ends in `.kml` (case-insensitive),
/// in archive order.
pub fn extract_kml_member(bytes: &[u8]) -> Result<Vec<u8>, LoadError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    for idx in 0..archive.len() {
        let mut member = archive.by_index(idx)?;
        if member.is_dir() || !member.name().to_ascii_lowercase().ends_with(".kml") {
            continue;
        }

        tracing::debug!(member = member.name(), "Using KMZ member");
        let mut out = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut out)?;
        return Ok(out);
    }

    Err(LoadError::NoMarkupMember)
}
