use std::{io::ErrorKind, path::Path};

use miette::{Context, IntoDiagnostic, Result};
use tracing::{debug, warn};

/// Check whether a path exists. Missing is `false`; any other stat error is
/// logged and the path treated as present.
pub fn file_exists(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(_) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            warn!("stat {}: {err}", path.display());
            true
        }
    }
}

/// Move a file into place, falling back to a copy when the rename crosses
/// filesystems.
pub fn replace_file(src: &Path, dest: &Path) -> Result<()> {
    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    debug!("moving file failed, falling back to copying");
    std::fs::copy(src, dest)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not copy {} to {}", src.display(), dest.display()))?;
    let _ = std::fs::remove_file(src);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_do_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!file_exists(&dir.path().join("nope.mp4")));

        let present = dir.path().join("here.mp4");
        std::fs::write(&present, b"x").unwrap();
        assert!(file_exists(&present));
    }

    #[test]
    fn replace_file_moves_the_contents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.mp4");
        let dest = dir.path().join("dest.mp4");
        std::fs::write(&src, b"payload").unwrap();

        replace_file(&src, &dest).unwrap();

        assert!(!file_exists(&src));
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }
}
