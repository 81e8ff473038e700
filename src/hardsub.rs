use std::{num::NonZeroUsize, path::Path};

use miette::{miette, Context, Result};
use tracing::{debug, info};

use crate::{
    io::file_exists,
    outside::Ffmpeg,
    playlist::PlaylistEntry,
    pool,
    types::{hardsub_filename, subtitle_filename_for},
};

/// Burn each entry's subtitle file into its video, writing
/// `<base>.sub.mp4`. Entries flagged `#nosubtitles` are left alone, and
/// already-rendered videos are skipped unless `force` is set. To render one
/// again, delete its hardsub file or pass `force`.
pub fn burn_all(
    ffmpeg: &Ffmpeg,
    entries: &[PlaylistEntry],
    font_name: &str,
    font_size: u32,
    force: bool,
    workers: NonZeroUsize,
) -> Result<()> {
    let jobs: Vec<&str> = entries
        .iter()
        .filter(|entry| !entry.no_subtitles)
        .map(|entry| entry.filename.as_str())
        .filter(|video| force || !file_exists(Path::new(&hardsub_filename(video))))
        .collect();

    let total = jobs.len();
    if total == 0 {
        debug!("no videos need subtitles rendered");
        return Ok(());
    }

    info!("rendering subtitles into {total} videos");
    let failed = pool::run_all(jobs, workers, |video| {
        burn_one(ffmpeg, video, font_name, font_size)
            .wrap_err_with(|| format!("render subtitles for {video}"))
    });

    if failed > 0 {
        return Err(miette!("render subtitles: {failed}/{total} failed"));
    }
    Ok(())
}

fn burn_one(ffmpeg: &Ffmpeg, video: &str, font_name: &str, font_size: u32) -> Result<()> {
    let subtitles = subtitle_filename_for(video);
    let output = hardsub_filename(video);
    ffmpeg.burn_subtitles(
        Path::new(video),
        Path::new(&subtitles),
        Path::new(&output),
        font_name,
        font_size,
    )
}
