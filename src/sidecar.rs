use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::error;

use crate::types::Post;

/// Write one post to its metadata sidecar, `<short_id>.json`.
pub fn write_post(post: &Post) -> Result<()> {
    let filename = post.metadata_filename();
    let file = File::create(&filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not create {filename}"))?;
    serde_json::to_writer(BufWriter::new(file), post)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not encode metadata for {}", post.short_id))
}

/// Read one post back from a metadata sidecar.
pub fn read_post(path: &Path) -> Result<Post> {
    let file = File::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .into_diagnostic()
        .wrap_err_with(|| format!("could not decode metadata from {}", path.display()))
}

/// Write every post's sidecar. Failures are logged with the post's key and
/// counted; the batch runs to the end.
pub fn write_all(posts: &[Post]) -> Result<()> {
    let mut failed = 0;
    for post in posts {
        if let Err(report) = write_post(post) {
            error!("write metadata for {}: {report}", post.short_id);
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(miette!("write metadata: {failed}/{} failed", posts.len()));
    }
    Ok(())
}

/// Read a list of sidecar files, in order. Unreadable files are logged and
/// counted without stopping the scan; any failure turns into an aggregate
/// error.
pub fn read_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Post>> {
    let mut posts = Vec::with_capacity(paths.len());
    let mut failed = 0;
    for path in paths {
        let path = path.as_ref();
        match read_post(path) {
            Ok(post) => posts.push(post),
            Err(report) => {
                error!("read metadata from {}: {report}", path.display());
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(miette!("read metadata: {failed}/{} failed", paths.len()));
    }
    Ok(posts)
}
