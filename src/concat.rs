use std::{fmt::Write as _, path::Path};

use miette::{Context, IntoDiagnostic, Result};
use tracing::{debug, info};

use crate::{outside::Ffmpeg, playlist::PlaylistEntry};

/// Losslessly concatenate the playlist's videos into one MP4.
///
/// Each input is remuxed to an MPEG transport stream in a scratch directory,
/// then a single concat invocation joins the intermediates. Any remux
/// failure aborts before the merge; the scratch directory is removed on
/// every exit path.
pub fn concat_videos(ffmpeg: &Ffmpeg, entries: &[PlaylistEntry], output: &Path) -> Result<()> {
    let dir = tempfile::tempdir()
        .into_diagnostic()
        .wrap_err("could not create scratch directory")?;

    info!("remuxing {} videos", entries.len());
    let mut list = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let ts_file = dir.path().join(format!("{i:05}.ts"));
        ffmpeg
            .remux_to_transport_stream(Path::new(&entry.filename), &ts_file)
            .wrap_err_with(|| format!("remux {}", entry.filename))?;
        writeln!(list, "file '{}'", ts_file.display())
            .into_diagnostic()
            .wrap_err("could not build concat list")?;
    }

    let list_file = dir.path().join("concat.txt");
    std::fs::write(&list_file, list)
        .into_diagnostic()
        .wrap_err("could not write concat list")?;

    debug!("concatenating into {}", output.display());
    ffmpeg
        .concat_transport_streams(&list_file, output)
        .wrap_err_with(|| format!("concatenate into {}", output.display()))
}
