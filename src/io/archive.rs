use crate::types::{GridError, GridResult};
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Check if content is ZIP format by examining magic bytes
pub fn is_zip_content(content: &[u8]) -> bool {
    content.len() >= 4 && content[0..4] == [0x50, 0x4B, 0x03, 0x04]
}

/// Extract every entry of a ZIP archive under `dest_dir`, keeping its internal
/// directory layout. Returns the extracted file paths, sorted.
pub fn extract_all(zip_path: &Path, dest_dir: &Path) -> GridResult<Vec<PathBuf>> {
    extract_matching(zip_path, dest_dir, |_| true)
}

/// Extract the entries whose name satisfies `keep`
pub fn extract_matching<F>(zip_path: &Path, dest_dir: &Path, keep: F) -> GridResult<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    log::info!("Extracting {} to {}", zip_path.display(), dest_dir.display());
    let file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| GridError::InvalidFormat(format!("Failed to open ZIP archive {}: {}", zip_path.display(), e)))?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| GridError::InvalidFormat(format!("Failed to read ZIP entry {}: {}", i, e)))?;

        // entries escaping the destination are skipped
        let relative = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => {
                log::warn!("Skipping unsafe ZIP entry: {}", entry.name());
                continue;
            }
        };
        let out_path = dest_dir.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if !keep(entry.name()) {
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        log::debug!("Extracting: {}", entry.name());
        let mut out = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
        extracted.push(out_path);
    }

    if extracted.is_empty() {
        log::warn!("No matching entries in {}", zip_path.display());
    }
    extracted.sort();
    Ok(extracted)
}

/// Extract every archive found directly inside `dir`
pub fn extract_directory(dir: &Path) -> GridResult<Vec<PathBuf>> {
    let mut archives: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e.eq_ignore_ascii_case("zip")).unwrap_or(false))
        .collect();
    archives.sort();

    let mut extracted = Vec::new();
    for archive in archives {
        extracted.extend(extract_all(&archive, dir)?);
    }
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn make_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer.add_directory("TCD_2015/tile", FileOptions::default()).unwrap();
        writer.start_file("TCD_2015/tile/TCD_2015_100m.tif", FileOptions::default()).unwrap();
        writer.write_all(b"raster").unwrap();
        writer.start_file("TCD_2015/readme.txt", FileOptions::default()).unwrap();
        writer.write_all(b"notes").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("tcd.zip");
        make_zip(&zip_path);

        let tifs = extract_matching(&zip_path, dir.path(), |n| n.ends_with(".tif")).unwrap();
        assert_eq!(tifs, vec![dir.path().join("TCD_2015/tile/TCD_2015_100m.tif")]);
        assert_eq!(std::fs::read(&tifs[0]).unwrap(), b"raster");

        let all = extract_directory(dir.path()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_zip_magic() {
        assert!(is_zip_content(&[0x50, 0x4B, 0x03, 0x04, 0x00]));
        assert!(!is_zip_content(b"CDF\x01"));
    }

    #[test]
    fn test_not_a_zip_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"truncated download").unwrap();
        assert!(matches!(extract_all(&path, dir.path()), Err(GridError::InvalidFormat(_))));
    }
}
