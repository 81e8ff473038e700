use std::{num::NonZeroUsize, path::Path, sync::Mutex};

use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::{debug, info};

use crate::{io::replace_file, outside::Ffmpeg, pool};

/// Normalize every video to the canonical dimensions. Videos already
/// matching are filtered out by a probe pre-pass run through the same pool.
pub fn scale_all(
    ffmpeg: &Ffmpeg,
    files: Vec<String>,
    dimensions: (u32, u32),
    workers: NonZeroUsize,
) -> Result<()> {
    let need = needs_scaling(ffmpeg, files, dimensions, workers)?;
    let total = need.len();
    if total == 0 {
        debug!("all videos already have canonical dimensions");
        return Ok(());
    }

    info!("scaling {total} videos to {}x{}", dimensions.0, dimensions.1);
    let failed = pool::run_all(need, workers, |file| {
        scale_one(ffmpeg, Path::new(&file), dimensions).wrap_err_with(|| format!("scale {file}"))
    });

    if failed > 0 {
        return Err(miette!("scale: {failed}/{total} failed"));
    }
    Ok(())
}

/// Probe each file's dimensions and keep the ones that differ from the
/// target. Probe failures abort the batch before any transcode is queued.
fn needs_scaling(
    ffmpeg: &Ffmpeg,
    files: Vec<String>,
    dimensions: (u32, u32),
    workers: NonZeroUsize,
) -> Result<Vec<String>> {
    let total = files.len();
    let need = Mutex::new(Vec::new());

    let failed = pool::run_all(files, workers, |file| {
        let probed = ffmpeg
            .dimensions(Path::new(&file))
            .wrap_err_with(|| format!("get dimensions for {file}"))?;
        if probed != dimensions {
            need.lock().unwrap().push(file);
        }
        Ok(())
    });

    if failed > 0 {
        return Err(miette!("get dimensions: {failed}/{total} failed"));
    }
    Ok(need.into_inner().unwrap())
}

/// Scale one video in place through a scratch file; a failed transcode
/// leaves the input untouched.
fn scale_one(ffmpeg: &Ffmpeg, file: &Path, dimensions: (u32, u32)) -> Result<()> {
    let dir = tempfile::tempdir()
        .into_diagnostic()
        .wrap_err("could not create scratch directory")?;
    let scaled = dir.path().join("scaled.mp4");

    ffmpeg.scale(file, &scaled, dimensions)?;
    replace_file(&scaled, file)
}
