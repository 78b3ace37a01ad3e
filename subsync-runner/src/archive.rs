//! Result archive packaging

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::{EngineError, Result};

/// Writes a deflated zip at `destination` holding `files` as `(entry name, path)`
///
/// Files that no longer exist are skipped. Blocking; call from a blocking thread.
pub fn create_zip_archive(files: &[(String, PathBuf)], destination: &Path) -> Result<()> {
    let file = File::create(destination)
        .map_err(|e| EngineError::io("Failed to create archive", e))?;
    let mut archive = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, path) in files {
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(EngineError::io(format!("Failed to read {}", path.display()), e)),
        };
        archive.start_file(name.as_str(), options)?;
        archive
            .write_all(&contents)
            .map_err(|e| EngineError::io("Failed to write archive entry", e))?;
        debug!("Added {} to {}", name, destination.display());
    }

    let mut writer = archive.finish()?;
    writer
        .flush()
        .map_err(|e| EngineError::io("Failed to flush archive", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_archive_contains_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let subtitle = dir.path().join("clip.srt");
        let backup = dir.path().join("clip.srt.bk");
        std::fs::write(&subtitle, "ALIGNED").unwrap();
        std::fs::write(&backup, "ORIGINAL").unwrap();

        let destination = dir.path().join("clip_results.zip");
        let files = vec![
            ("clip.srt".to_string(), subtitle),
            ("clip.srt.bk".to_string(), backup),
            ("clip.smi.bk".to_string(), dir.path().join("clip.smi.bk")),
        ];
        create_zip_archive(&files, &destination).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&destination).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);

        let mut contents = String::new();
        archive
            .by_name("clip.srt.bk")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "ORIGINAL");
    }
}
