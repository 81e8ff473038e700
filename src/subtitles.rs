use std::{
    borrow::Cow,
    fs::File,
    io::{BufRead, BufReader, ErrorKind, Write},
    path::Path,
    sync::OnceLock,
    time::Duration,
};

use miette::{miette, Context, IntoDiagnostic, Result};
use regex::Regex;
use tracing::error;

use crate::{
    outside::DurationProbe,
    playlist::PlaylistEntry,
    types::{format_srt_time, parse_srt_time, subtitle_filename_for, Post, Subtitle},
};

fn field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z]+)\}").unwrap())
}

fn index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").unwrap())
}

fn interval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d\d:\d\d:\d\d,\d\d\d) --> (\d\d:\d\d:\d\d,\d\d\d)$").unwrap()
    })
}

/// Substitute `{field}` placeholders with the post's values. Unknown fields
/// are an error rather than passing through silently.
fn render_template(template: &str, post: &Post) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for cap in field_re().captures_iter(template) {
        let whole = cap.get(0).unwrap();
        out.push_str(&template[last..whole.start()]);

        let value: Cow<'_, str> = match &cap[1] {
            "title" => Cow::from(&post.title),
            "uploader" => Cow::from(&post.uploader_name),
            "uploaderID" => Cow::from(&post.uploader_id),
            "shortID" => Cow::from(&post.short_id),
            "url" => Cow::from(&post.source_url),
            "created" => Cow::from(post.created_at.to_string()),
            field => {
                return Err(miette!("unknown field {{{field}}} in subtitle template"));
            }
        };
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Check a template against the known post fields before a batch starts.
pub fn validate_template(template: &str) -> Result<()> {
    for cap in field_re().captures_iter(template) {
        match &cap[1] {
            "title" | "uploader" | "uploaderID" | "shortID" | "url" | "created" => {}
            field => {
                return Err(miette!("unknown field {{{field}}} in subtitle template"));
            }
        }
    }
    Ok(())
}

/// Render one SubRip block for a post: index 1, an interval from zero to
/// `display`, then the rendered template text. Blank lines are collapsed;
/// a blank line would prematurely end the block.
pub fn render_subtitle(post: &Post, display: Duration, template: &str) -> Result<String> {
    let rendered = render_template(template, post)?;

    let mut text = rendered.replace('\r', "");
    while text.contains("\n\n") {
        text = text.replace("\n\n", "\n");
    }
    let text = text.trim();

    Ok(format!(
        "1\n00:00:00,000 --> {}\n{text}\n",
        format_srt_time(display)
    ))
}

fn is_variation_selector(c: char) -> bool {
    matches!(c, '\u{FE00}'..='\u{FE0F}' | '\u{180B}'..='\u{180D}' | '\u{E0100}'..='\u{E01EF}')
}

/// Drop the Unicode variation selectors that force emoji presentation, for
/// renderers whose fonts only carry the plain glyphs.
pub fn strip_variation_selectors(s: &str) -> String {
    s.chars().filter(|&c| !is_variation_selector(c)).collect()
}

/// Write a `.srt` sidecar for every post. Per-post failures are logged with
/// the short ID and counted; the batch runs to the end.
pub fn write_all_subtitles(
    posts: &[Post],
    display: Duration,
    template: &str,
    plain_emoji: bool,
) -> Result<()> {
    let mut failed = 0;
    for post in posts {
        match render_subtitle(post, display, template) {
            Ok(mut block) => {
                if plain_emoji {
                    block = strip_variation_selectors(&block);
                }
                if let Err(err) = std::fs::write(post.subtitle_filename(), block) {
                    error!("write subtitles for {}: {err}", post.short_id);
                    failed += 1;
                }
            }
            Err(report) => {
                error!("write subtitles for {}: {report}", post.short_id);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(miette!("write subtitles: {failed}/{} failed", posts.len()));
    }
    Ok(())
}

/// Parse a SubRip stream into its blocks. Blocks are separated by blank
/// lines; a structural mismatch is a descriptive error for that input.
pub fn parse_subrip<R: BufRead>(reader: R) -> Result<Vec<Subtitle>> {
    let mut lines = reader.lines();
    let mut subs = Vec::new();

    loop {
        // Skip separators until the next index line or the end of input
        let index_line = loop {
            match lines.next() {
                None => return Ok(subs),
                Some(line) => {
                    let line = line
                        .into_diagnostic()
                        .wrap_err("could not read subtitle line")?;
                    let line = line.trim_end_matches('\r').to_string();
                    if !line.is_empty() {
                        break line;
                    }
                }
            }
        };

        if !index_re().is_match(&index_line) {
            return Err(miette!("expected subtitle index, got {index_line:?}"));
        }
        let index: usize = index_line
            .parse()
            .into_diagnostic()
            .wrap_err_with(|| format!("subtitle index out of range: {index_line:?}"))?;

        let interval_line = lines
            .next()
            .ok_or_else(|| miette!("expected subtitle interval, got end of input"))?
            .into_diagnostic()
            .wrap_err("could not read subtitle line")?;
        let interval_line = interval_line.trim_end_matches('\r');
        let cap = interval_re()
            .captures(interval_line)
            .ok_or_else(|| miette!("expected subtitle interval, got {interval_line:?}"))?;
        let start = parse_srt_time(&cap[1])?;
        let stop = parse_srt_time(&cap[2])?;

        let mut text_lines = Vec::new();
        for line in lines.by_ref() {
            let line = line
                .into_diagnostic()
                .wrap_err("could not read subtitle line")?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            text_lines.push(line.to_string());
        }

        subs.push(Subtitle {
            index,
            start,
            stop,
            text: text_lines.join("\n"),
        });
    }
}

/// Read the subtitle blocks belonging to a video by the sidecar naming
/// convention. A missing file is not an error; a post may have no subtitles.
pub fn read_subrip_for_video(video: &str) -> Result<Vec<Subtitle>> {
    let path = subtitle_filename_for(video);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err)
                .into_diagnostic()
                .wrap_err_with(|| format!("could not open {path}"));
        }
    };
    parse_subrip(BufReader::new(file)).wrap_err_with(|| format!("parse {path}"))
}

/// Merge the subtitle streams of a playlist into one continuous stream whose
/// timings match the naive concatenation of the playlist's videos. Every
/// entry advances the running offset by its probed duration; flagged entries
/// contribute no blocks. Indexes are renumbered globally from 1.
pub fn concat_subtitles<W: Write>(
    writer: &mut W,
    entries: &[PlaylistEntry],
    probe: &dyn DurationProbe,
) -> Result<()> {
    let mut offset = Duration::ZERO;
    let mut index = 0;

    for entry in entries {
        let duration = probe
            .duration(Path::new(&entry.filename))
            .wrap_err_with(|| format!("probe duration of {}", entry.filename))?;

        if entry.no_subtitles {
            offset += duration;
            continue;
        }

        for mut sub in read_subrip_for_video(&entry.filename)? {
            index += 1;
            sub.index = index;
            sub.start += offset;
            sub.stop += offset;
            write!(writer, "{sub}")
                .into_diagnostic()
                .wrap_err("could not write concatenated subtitles")?;
        }
        offset += duration;
    }

    Ok(())
}
