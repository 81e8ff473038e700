use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
    sync::OnceLock,
};

use miette::{Context, IntoDiagnostic, Result};
use regex::Regex;

use crate::{
    io::file_exists,
    sidecar,
    types::{hardsub_filename, metadata_filename_for, Post},
};

/// One parsed playlist entry. `no_subtitles` is set when the entry was
/// immediately preceded by a `#nosubtitles` directive line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub filename: String,
    pub no_subtitles: bool,
}

/// The directive consumes exactly the next filename entry; the scan is a
/// two-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    PendingNoSubtitles,
}

fn no_subtitles_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#\s*nosubtitles").unwrap())
}

/// Parse an extended M3U stream into its filename entries. `#`-prefixed
/// lines are directives or comments and never entries themselves; filename
/// lines are taken verbatim apart from trailing CR/LF.
pub fn read_playlist<R: BufRead>(reader: R) -> Result<Vec<PlaylistEntry>> {
    let mut entries = Vec::new();
    let mut state = ScanState::Normal;

    for line in reader.lines() {
        let line = line
            .into_diagnostic()
            .wrap_err("could not read playlist line")?;
        if line.starts_with('#') {
            if no_subtitles_re().is_match(&line) {
                state = ScanState::PendingNoSubtitles;
            }
            continue;
        }

        let filename = line.trim_end_matches(['\r', '\n']).to_string();
        entries.push(PlaylistEntry {
            filename,
            no_subtitles: state == ScanState::PendingNoSubtitles,
        });
        state = ScanState::Normal;
    }

    Ok(entries)
}

/// Serialize posts as an extended M3U playlist: the `#EXTM3U` header, then a
/// two-line entry per post.
pub fn write_playlist<W: Write>(writer: &mut W, posts: &[Post]) -> Result<()> {
    writeln!(writer, "#EXTM3U")
        .into_diagnostic()
        .wrap_err("could not write playlist header")?;
    for post in posts {
        writeln!(writer, "{}", post.m3u_entry())
            .into_diagnostic()
            .wrap_err_with(|| format!("could not write playlist entry for {}", post.short_id))?;
    }
    Ok(())
}

/// Rewrite a playlist, replacing each filename entry with its hardsub
/// sibling when that file exists and the entry is not flagged
/// `#nosubtitles`. A line-for-line transform: directive and comment lines
/// pass through unchanged and the line count is preserved.
pub fn hardsub_playlist<R: BufRead, W: Write>(reader: R, writer: &mut W) -> Result<()> {
    let mut state = ScanState::Normal;

    for line in reader.lines() {
        let line = line
            .into_diagnostic()
            .wrap_err("could not read playlist line")?;
        if line.starts_with('#') {
            if no_subtitles_re().is_match(&line) {
                state = ScanState::PendingNoSubtitles;
            }
            writeln!(writer, "{line}").into_diagnostic()?;
            continue;
        }

        let flagged = state == ScanState::PendingNoSubtitles;
        state = ScanState::Normal;

        let subbed = hardsub_filename(&line);
        if !flagged && file_exists(Path::new(&subbed)) {
            writeln!(writer, "{subbed}").into_diagnostic()?;
        } else {
            writeln!(writer, "{line}").into_diagnostic()?;
        }
    }

    Ok(())
}

pub fn read_playlist_file(path: &Path) -> Result<Vec<PlaylistEntry>> {
    let file = File::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not open playlist {}", path.display()))?;
    read_playlist(BufReader::new(file))
}

/// Read the metadata sidecars named by a playlist's entries, in entry order.
pub fn read_posts_for_playlist(path: &Path) -> Result<Vec<Post>> {
    let entries = read_playlist_file(path)?;
    let sidecars: Vec<String> = entries
        .iter()
        .map(|entry| metadata_filename_for(&entry.filename))
        .collect();
    sidecar::read_all(&sidecars)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use time::macros::datetime;

    use super::*;

    fn post(short_id: &str, uploader: &str, title: &str) -> Post {
        Post {
            title: title.to_string(),
            uploader_name: uploader.to_string(),
            uploader_id: "1".to_string(),
            source_url: format!("http://v.cdn.example.com/{short_id}.mp4"),
            short_id: short_id.to_string(),
            created_at: datetime!(2013-02-05 11:06:16),
        }
    }

    #[test]
    fn directive_flags_exactly_the_next_entry() {
        let playlist = "#EXTM3U\n#nosubtitles\n#EXTINF:-1,A: t\na.mp4\nb.mp4\n";
        let entries = read_playlist(playlist.as_bytes()).unwrap();
        assert_eq!(
            entries,
            vec![
                PlaylistEntry { filename: "a.mp4".to_string(), no_subtitles: true },
                PlaylistEntry { filename: "b.mp4".to_string(), no_subtitles: false },
            ]
        );
    }

    #[test]
    fn doubled_directives_still_flag_a_single_entry() {
        let playlist = indoc! {"
            #EXTM3U
            #nosubtitles
            # nosubtitles
            a.mp4
            b.mp4
        "};
        let entries = read_playlist(playlist.as_bytes()).unwrap();
        assert!(entries[0].no_subtitles);
        assert!(!entries[1].no_subtitles);
    }

    #[test]
    fn comment_lines_are_never_entries() {
        let playlist = "#EXTM3U\n#EXTINF:-1,A: t\n#just a comment\nonly.mp4\n";
        let entries = read_playlist(playlist.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "only.mp4");
    }

    #[test]
    fn serialized_playlists_parse_back_in_order() {
        let posts = vec![
            post("Mz2Wzi73VnI", "ig/yt: mielmonster", "Guys be like #superbowl"),
            post("bnmHnwVILKD", "Ben Willbond", "Idiots Assemble!"),
        ];

        let mut buf = Vec::new();
        write_playlist(&mut buf, &posts).unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            indoc! {"
                #EXTM3U
                #EXTINF:-1,ig/yt: mielmonster: Guys be like #superbowl
                Mz2Wzi73VnI.mp4
                #EXTINF:-1,Ben Willbond: Idiots Assemble!
                bnmHnwVILKD.mp4
            "}
        );

        let entries = read_playlist(text.as_bytes()).unwrap();
        let filenames: Vec<&str> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(filenames, vec!["Mz2Wzi73VnI.mp4", "bnmHnwVILKD.mp4"]);
    }

    #[test]
    fn hardsub_rewrite_substitutes_only_unflagged_entries_with_hardsubs() {
        let dir = tempfile::tempdir().unwrap();
        let video = |name: &str| dir.path().join(name).display().to_string();

        // Hardsubs exist for a and b, but b is flagged; c has none.
        for name in ["a.sub.mp4", "b.sub.mp4"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let playlist = format!(
            "#EXTM3U\n#EXTINF:-1,A: one\n{}\n#nosubtitles\n#EXTINF:-1,B: two\n{}\n#EXTINF:-1,C: three\n{}\n",
            video("a.mp4"),
            video("b.mp4"),
            video("c.mp4"),
        );

        let mut out = Vec::new();
        hardsub_playlist(playlist.as_bytes(), &mut out).unwrap();

        let want = format!(
            "#EXTM3U\n#EXTINF:-1,A: one\n{}\n#nosubtitles\n#EXTINF:-1,B: two\n{}\n#EXTINF:-1,C: three\n{}\n",
            video("a.sub.mp4"),
            video("b.mp4"),
            video("c.mp4"),
        );
        assert_eq!(String::from_utf8(out).unwrap(), want);
    }
}
