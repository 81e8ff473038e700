use miette::{Context, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use time::{format_description::FormatItem, macros::format_description, PrimitiveDateTime};

/// Timestamp format used by both the metadata sidecars and the web API:
/// ISO-8601-like with fractional seconds and no UTC offset. Parsing accepts
/// any number of fractional digits, or none; output always carries six.
static TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
static TIMESTAMP_FORMAT_WHOLE: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
static TIMESTAMP_OUTPUT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]");

pub fn parse_timestamp(s: &str) -> Result<PrimitiveDateTime> {
    PrimitiveDateTime::parse(s, TIMESTAMP_FORMAT)
        .or_else(|_| PrimitiveDateTime::parse(s, TIMESTAMP_FORMAT_WHOLE))
        .into_diagnostic()
        .wrap_err_with(|| format!("unrecognized timestamp: {s:?}"))
}

mod created_at {
    use serde::{de::Error as _, ser::Error as _, Deserialize, Deserializer, Serializer};
    use time::PrimitiveDateTime;

    use super::{parse_timestamp, TIMESTAMP_OUTPUT};

    pub fn serialize<S: Serializer>(
        created: &PrimitiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let s = created.format(TIMESTAMP_OUTPUT).map_err(S::Error::custom)?;
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<PrimitiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_timestamp(&s).map_err(D::Error::custom)
    }
}

/// One archived post. Constructed by the discovery step, persisted to a
/// metadata sidecar, and read back by the commands that work off a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub title: String,
    #[serde(rename = "uploaderName")]
    pub uploader_name: String,
    #[serde(rename = "uploaderID")]
    pub uploader_id: String,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    #[serde(rename = "shortID")]
    pub short_id: String,
    #[serde(rename = "createdAt", with = "created_at")]
    pub created_at: PrimitiveDateTime,
}

impl Post {
    /// `<short_id>.mp4`. The short ID is the filesystem key every artifact
    /// name derives from.
    pub fn video_filename(&self) -> String {
        format!("{}.mp4", self.short_id)
    }

    /// `<short_id>.srt`
    pub fn subtitle_filename(&self) -> String {
        format!("{}.srt", self.short_id)
    }

    /// `<short_id>.json`
    pub fn metadata_filename(&self) -> String {
        format!("{}.json", self.short_id)
    }

    /// Extended M3U entry: an info line with the uploader and the title
    /// crammed onto one physical line, then the video filename.
    pub fn m3u_entry(&self) -> String {
        let title = self.title.replace('\r', "").replace('\n', " ");
        format!(
            "#EXTINF:-1,{}: {}\n{}",
            self.uploader_name,
            title,
            self.video_filename()
        )
    }
}

fn video_basename(video: &str) -> &str {
    video.strip_suffix(".mp4").unwrap_or(video)
}

/// Hardsubbed sibling of a video path: strip a trailing `.mp4` if present,
/// append `.sub.mp4`. Total on any input.
pub fn hardsub_filename(video: &str) -> String {
    format!("{}.sub.mp4", video_basename(video))
}

/// Subtitle sibling of a video path.
pub fn subtitle_filename_for(video: &str) -> String {
    format!("{}.srt", video_basename(video))
}

/// Metadata sidecar sibling of a video path.
pub fn metadata_filename_for(video: &str) -> String {
    format!("{}.json", video_basename(video))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn post(short_id: &str) -> Post {
        Post {
            title: "Idiots Assemble!".to_string(),
            uploader_name: "Ben Willbond".to_string(),
            uploader_id: "907837017694211072".to_string(),
            source_url: "http://v.cdn.example.com/videos/abc.mp4".to_string(),
            short_id: short_id.to_string(),
            created_at: datetime!(2013-02-05 11:06:16),
        }
    }

    #[test]
    fn artifact_names_derive_from_the_short_id() {
        let p = post("bnmHnwVILKD");
        assert_eq!(p.video_filename(), "bnmHnwVILKD.mp4");
        assert_eq!(p.subtitle_filename(), "bnmHnwVILKD.srt");
        assert_eq!(p.metadata_filename(), "bnmHnwVILKD.json");
    }

    #[test]
    fn distinct_short_ids_give_distinct_artifacts() {
        let a = post("aaa");
        let b = post("bbb");
        assert_ne!(a.video_filename(), b.video_filename());
        assert_ne!(a.subtitle_filename(), b.subtitle_filename());
        assert_ne!(a.metadata_filename(), b.metadata_filename());
    }

    #[test]
    fn hardsub_name_strips_the_video_suffix() {
        assert_eq!(hardsub_filename("a.mp4"), "a.sub.mp4");
        assert_eq!(hardsub_filename("dir/a.mp4"), "dir/a.sub.mp4");
        // Inputs without the suffix are used whole, no failure
        assert_eq!(hardsub_filename("weird"), "weird.sub.mp4");
        assert_eq!(subtitle_filename_for("a.mp4"), "a.srt");
        assert_eq!(metadata_filename_for("a.mp4"), "a.json");
    }

    #[test]
    fn m3u_entry_crams_the_title_onto_one_line() {
        let mut p = post("bnmHnwVILKD");
        p.title = "line one\r\nline two\nline three".to_string();
        assert_eq!(
            p.m3u_entry(),
            "#EXTINF:-1,Ben Willbond: line one line two line three\nbnmHnwVILKD.mp4"
        );
    }

    #[test]
    fn timestamps_parse_with_and_without_fractional_seconds() {
        assert_eq!(
            parse_timestamp("2013-02-05T11:06:16.000000").unwrap(),
            datetime!(2013-02-05 11:06:16)
        );
        assert_eq!(
            parse_timestamp("2013-02-05T11:06:16").unwrap(),
            datetime!(2013-02-05 11:06:16)
        );
        assert!(parse_timestamp("05/02/2013").is_err());
    }
}
