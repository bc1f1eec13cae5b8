//! Hardened ZIP handling for downloaded annual reports.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::{Result, XbrlError};

/// Maximum total uncompressed size.
const MAX_ZIP_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum uncompressed-to-compressed ratio.
const MAX_COMPRESSION_RATIO: f64 = 100.0;

/// Archives may nest one more archive (some filers wrap the report twice).
const MAX_NESTING: u32 = 1;

/// Whether an entry name is safe to consider.
///
/// Rejects absolute paths, path traversal and characters that are invalid
/// on common filesystems.
fn is_safe_entry_name(name: &str) -> bool {
    if name.starts_with('/') || name.starts_with('\\') {
        return false;
    }
    if name.contains("..") {
        return false;
    }
    if name
        .chars()
        .any(|c| matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
    {
        return false;
    }
    true
}

/// Whether a ratio trips the bomb heuristic; exactly the limit passes.
fn ratio_exceeded(total_uncompressed: u64, compressed: usize) -> bool {
    if compressed == 0 {
        return total_uncompressed > 0;
    }
    total_uncompressed as f64 / compressed as f64 > MAX_COMPRESSION_RATIO
}

/// Extract the XHTML report from a ZIP archive.
///
/// Applies the size and ratio limits, skips unsafe entry names and
/// `__MACOSX` metadata, and recurses once into the first nested archive if
/// no XHTML entry is found at the top level. Content decodes as UTF-8 with
/// a latin-1 fallback.
///
/// Returns the document together with any non-fatal warnings.
pub fn extract_xhtml(content: &[u8]) -> Result<(String, Vec<String>)> {
    extract_inner(content, 0)
}

fn extract_inner(content: &[u8], depth: u32) -> Result<(String, Vec<String>)> {
    let mut warnings = Vec::new();
    let mut archive = ZipArchive::new(Cursor::new(content))?;

    let mut total_size: u64 = 0;
    for i in 0..archive.len() {
        total_size = total_size.saturating_add(archive.by_index_raw(i)?.size());
    }

    if total_size > MAX_ZIP_SIZE {
        return Err(XbrlError::TooLarge {
            size: total_size,
            max: MAX_ZIP_SIZE,
        });
    }

    if ratio_exceeded(total_size, content.len()) {
        return Err(XbrlError::SuspiciousRatio {
            ratio: total_size as f64 / content.len().max(1) as f64,
            max: MAX_COMPRESSION_RATIO,
        });
    }

    let names: Vec<String> = archive.file_names().map(String::from).collect();

    let xhtml_entry = names.iter().find(|n| {
        is_safe_entry_name(n)
            && !n.starts_with("__MACOSX")
            && (n.ends_with(".xhtml") || n.ends_with(".html"))
    });

    if let Some(entry) = xhtml_entry {
        let mut file = archive.by_name(entry)?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;

        return match String::from_utf8(bytes) {
            Ok(text) => Ok((text, warnings)),
            Err(e) => {
                warnings.push("UTF-8 decode failed, trying latin-1".to_string());
                tracing::warn!("UTF-8 decode failed, falling back to latin-1");
                let text = e.into_bytes().iter().map(|&b| b as char).collect();
                Ok((text, warnings))
            }
        };
    }

    // No document at this level; a single nested archive is tolerated.
    if depth < MAX_NESTING {
        if let Some(nested) = names
            .iter()
            .find(|n| is_safe_entry_name(n) && n.ends_with(".zip"))
        {
            let mut file = archive.by_name(nested)?;
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            let (text, mut nested_warnings) = extract_inner(&bytes, depth + 1)?;
            warnings.append(&mut nested_warnings);
            return Ok((text, warnings));
        }
    }

    Err(XbrlError::NoXhtml)
}
