use std::{num::NonZeroUsize, path::Path};

use miette::{miette, Context, Result};
use tracing::{debug, info};

use crate::{io::file_exists, outside::PostSource, pool, types::Post};

/// Download every post's video to `<short_id>.mp4`. Videos already on disk
/// are skipped unless `force` is set, so re-runs only fetch what is missing.
pub fn download_all(
    source: &dyn PostSource,
    posts: &[Post],
    force: bool,
    workers: NonZeroUsize,
) -> Result<()> {
    let jobs: Vec<&Post> = posts
        .iter()
        .filter(|post| force || !file_exists(Path::new(&post.video_filename())))
        .collect();

    let total = jobs.len();
    if total == 0 {
        debug!("all videos already downloaded");
        return Ok(());
    }

    info!("downloading {total} videos");
    let failed = pool::run_all(jobs, workers, |post| {
        source
            .download_video(&post.source_url, Path::new(&post.video_filename()))
            .wrap_err_with(|| format!("get [{}] \"{:.20}\"", post.uploader_name, post.title))?;
        debug!("got [{}] {}", post.uploader_name, post.title);
        Ok(())
    });

    if failed > 0 {
        return Err(miette!("download videos: {failed}/{total} failed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use time::macros::datetime;

    use super::*;

    struct CountingSource {
        downloads: AtomicUsize,
        fail: bool,
    }

    impl PostSource for CountingSource {
        fn extract_posts(&self, _url: &str) -> Result<Vec<Post>> {
            Ok(Vec::new())
        }

        fn download_video(&self, _url: &str, dest: &Path) -> Result<()> {
            self.downloads.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(miette!("connection reset"));
            }
            std::fs::write(dest, b"").map_err(|err| miette!("{err}"))
        }
    }

    fn post(dir: &Path, short_id: &str) -> Post {
        Post {
            title: "t".to_string(),
            uploader_name: "u".to_string(),
            uploader_id: "1".to_string(),
            source_url: format!("http://v.cdn.example.com/{short_id}.mp4"),
            // Abuse the short ID to land the artifact inside the temp dir
            short_id: dir.join(short_id).display().to_string(),
            created_at: datetime!(2013-02-05 11:06:16),
        }
    }

    #[test]
    fn existing_videos_are_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let posts = vec![post(dir.path(), "a"), post(dir.path(), "b")];
        std::fs::write(posts[0].video_filename(), b"").unwrap();

        let source = CountingSource { downloads: AtomicUsize::new(0), fail: false };
        download_all(&source, &posts, false, NonZeroUsize::new(2).unwrap()).unwrap();
        assert_eq!(source.downloads.load(Ordering::Relaxed), 1);

        let source = CountingSource { downloads: AtomicUsize::new(0), fail: false };
        download_all(&source, &posts, true, NonZeroUsize::new(2).unwrap()).unwrap();
        assert_eq!(source.downloads.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn failures_aggregate_into_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let posts = vec![post(dir.path(), "a"), post(dir.path(), "b")];

        let source = CountingSource { downloads: AtomicUsize::new(0), fail: true };
        let err = download_all(&source, &posts, false, NonZeroUsize::new(2).unwrap()).unwrap_err();
        assert!(err.to_string().contains("2/2 failed"), "{err}");
    }
}
