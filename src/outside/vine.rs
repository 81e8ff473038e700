use std::{
    collections::HashMap,
    fs::File,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        OnceLock,
    },
    time::Duration,
};

use miette::{miette, Context, IntoDiagnostic, Result};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::types::{parse_timestamp, Post};

const BASE_URL: &str = "https://vine.co";
const PAGE_SIZE: u32 = 100;

/// Interface for turning a URL into post records and fetching their videos
pub trait PostSource: Sync {
    /// Get the post metadata related to a URL for a single post, a user
    /// profile, or a user's likes, issuing as many requests as pagination
    /// needs.
    fn extract_posts(&self, url: &str) -> Result<Vec<Post>>;

    /// Download the raw video behind a post's source URL to a file.
    fn download_video(&self, url: &str, dest: &Path) -> Result<()>;
}

fn user_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:https?://)?vine\.co/(u/)?([^/]+)(/likes)?/?(\?.*)?$").unwrap()
    })
}

fn single_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://(?:www\.)?vine\.co/(?:v|oembed)/(\w+)").unwrap())
}

fn permalink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https://vine\.co/v/([a-zA-Z0-9]+)$").unwrap())
}

fn post_data_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)window\.POST_DATA\s*=\s*(\{.+?\});\s*</script>").unwrap())
}

/// Client for the web API. Holds the fallback-ID counter for records whose
/// permalink yields no usable short ID, so fallbacks are deterministic
/// within one run.
pub struct VineApi {
    agent: ureq::Agent,
    fallback_ids: AtomicUsize,
}

impl VineApi {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(60))
                .build(),
            fallback_ids: AtomicUsize::new(0),
        }
    }

    /// Keep only the posts uploaded by the user the URL refers to, dropping
    /// reposts that timelines mix in.
    pub fn filter_reposts(&self, posts: Vec<Post>, url: &str) -> Result<Vec<Post>> {
        let user_id = self.user_url_to_user_id(url)?;
        Ok(posts
            .into_iter()
            .filter(|post| post.uploader_id == user_id)
            .collect())
    }

    fn single_post(&self, url: &str) -> Result<Vec<Post>> {
        if !single_url_re().is_match(url) {
            return Err(miette!("url must be for an individual post: {url}"));
        }
        // There is no API endpoint for single posts, so read the page HTML
        let html = self.get_text(url)?;
        posts_from_page(&html)
    }

    fn user_posts(&self, url: &str) -> Result<Vec<Post>> {
        let user_id = self.user_url_to_user_id(url)?;
        let cap = user_url_re()
            .captures(url)
            .ok_or_else(|| miette!("unrecognized user url: {url:?}"))?;

        let timeline_url = if cap.get(3).is_some() {
            format!("{BASE_URL}/api/timelines/users/{user_id}/likes")
        } else {
            format!("{BASE_URL}/api/timelines/users/{user_id}")
        };
        self.timeline_posts(&timeline_url)
    }

    fn user_url_to_user_id(&self, url: &str) -> Result<String> {
        let cap = user_url_re()
            .captures(url)
            .ok_or_else(|| miette!("unrecognized user url: {url:?}"))?;

        // Without the `u/` marker the path segment is a vanity name that the
        // profile endpoint resolves to the numeric ID
        let is_vanity = cap.get(1).is_none();
        if is_vanity {
            let name = &cap[2];
            let profile: UserResult =
                self.get_json(&format!("{BASE_URL}/api/users/profiles/vanity/{name}"))?;
            Ok(profile.data.user_id.to_string())
        } else {
            Ok(cap[2].to_string())
        }
    }

    fn timeline_posts(&self, url: &str) -> Result<Vec<Post>> {
        let mut posts = Vec::new();
        for page in 1u32.. {
            debug!("fetching timeline page {page}");
            let result: TimelineResult =
                self.get_json(&format!("{url}?page={page}&size={PAGE_SIZE}"))?;

            for record in result.data.records {
                posts.push(self.record_to_post(record)?);
            }
            if result.data.next_page <= 0 {
                break;
            }
        }
        Ok(posts)
    }

    fn record_to_post(&self, record: TimelineRecord) -> Result<Post> {
        Ok(Post {
            title: record.description,
            uploader_name: record.username,
            uploader_id: record.user_id.to_string(),
            source_url: record.video_url,
            short_id: self.short_id_for(&record.permalink_url),
            created_at: parse_timestamp(&record.created)?,
        })
    }

    fn short_id_for(&self, permalink: &str) -> String {
        match permalink_re().captures(permalink) {
            Some(cap) => cap[1].to_string(),
            None => format!("fallbackID{}", self.fallback_ids.fetch_add(1, Ordering::Relaxed)),
        }
    }

    fn get_response(&self, url: &str) -> Result<ureq::Response> {
        match self.agent.get(url).call() {
            Ok(resp) => Ok(resp),
            // The API reports failures in its envelope, keep reading the body
            Err(ureq::Error::Status(_, resp)) => Ok(resp),
            Err(err) => Err(miette!("GET {url}: {err}")),
        }
    }

    fn get_text(&self, url: &str) -> Result<String> {
        self.get_response(url)?
            .into_string()
            .into_diagnostic()
            .wrap_err_with(|| format!("GET {url}"))
    }

    /// GET a JSON API endpoint, unwrap the enveloping object, and decode the
    /// response.
    fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let resp = self.get_response(url)?;
        let status = resp.status();
        let body = resp
            .into_string()
            .into_diagnostic()
            .wrap_err_with(|| format!("GET {url}"))?;

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|_| miette!("unrecognized json from {url}: {body}"))?;
        if !envelope.success {
            return Err(miette!("GET {url:?}: status {status}: {}", envelope.error));
        }

        serde_json::from_str(&body)
            .into_diagnostic()
            .wrap_err_with(|| format!("could not decode api response from {url}"))
    }
}

impl PostSource for VineApi {
    fn extract_posts(&self, url: &str) -> Result<Vec<Post>> {
        let mut errors = Vec::new();
        match self.single_post(url) {
            Ok(posts) => return Ok(posts),
            Err(report) => errors.push(report.to_string()),
        }
        match self.user_posts(url) {
            Ok(posts) => return Ok(posts),
            Err(report) => errors.push(report.to_string()),
        }
        Err(miette!("post extraction: {}", errors.join(", ")))
    }

    fn download_video(&self, url: &str, dest: &Path) -> Result<()> {
        let resp = self
            .agent
            .get(url)
            .call()
            .map_err(|err| miette!("download {url}: {err}"))?;

        let mut file = File::create(dest)
            .into_diagnostic()
            .wrap_err_with(|| format!("could not create {}", dest.display()))?;
        std::io::copy(&mut resp.into_reader(), &mut file)
            .into_diagnostic()
            .wrap_err_with(|| format!("download {url}"))?;
        Ok(())
    }
}

/// Extract the post records embedded in a single post's page HTML.
fn posts_from_page(html: &str) -> Result<Vec<Post>> {
    let cap = post_data_re()
        .captures(html)
        .ok_or_else(|| miette!("no post metadata found in page"))?;

    let map: HashMap<String, PagePost> = serde_json::from_str(&cap[1])
        .into_diagnostic()
        .wrap_err("could not decode embedded post data")?;

    // The map is keyed by post ID and holds a single record
    let Some(page_post) = map.into_values().next() else {
        return Ok(Vec::new());
    };

    let Some(original) = page_post
        .video_urls
        .iter()
        .find(|video_url| video_url.id == "original")
    else {
        return Ok(Vec::new());
    };

    Ok(vec![Post {
        source_url: original.video_url.clone(),
        title: page_post.description,
        uploader_name: page_post.username,
        uploader_id: page_post.user_id.to_string(),
        short_id: page_post.short_id,
        created_at: parse_timestamp(&page_post.created)?,
    }])
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: String,
}

// Single-post page JSON structures
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PagePost {
    username: String,
    user_id: i64,
    description: String,
    short_id: String,
    video_urls: Vec<PageVideoUrl>,
    created: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PageVideoUrl {
    video_url: String,
    id: String,
}

// Timeline (posts/likes) API JSON structures
#[derive(Debug, Deserialize)]
struct TimelineResult {
    data: TimelineRecords,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TimelineRecords {
    records: Vec<TimelineRecord>,
    next_page: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TimelineRecord {
    username: String,
    user_id: i64,
    description: String,
    video_url: String,
    permalink_url: String,
    created: String,
}

// User profile API JSON structures
#[derive(Debug, Deserialize)]
struct UserResult {
    data: UserRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UserRecord {
    user_id: i64,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn short_ids_come_from_permalinks() {
        let api = VineApi::new();
        assert_eq!(api.short_id_for("https://vine.co/v/bnmHnwVILKD"), "bnmHnwVILKD");
    }

    #[test]
    fn fallback_ids_count_up_within_a_run() {
        let api = VineApi::new();
        assert_eq!(api.short_id_for("https://example.com/nope"), "fallbackID0");
        assert_eq!(api.short_id_for("https://example.com/nope"), "fallbackID1");
    }

    #[test]
    fn user_urls_distinguish_likes_from_posts() {
        let cap = user_url_re().captures("https://vine.co/u/1108673385032228864/likes").unwrap();
        assert!(cap.get(1).is_some(), "explicit user IDs carry the u/ marker");
        assert_eq!(&cap[2], "1108673385032228864");
        assert!(cap.get(3).is_some());

        let cap = user_url_re().captures("https://vine.co/Mielmonster").unwrap();
        assert!(cap.get(1).is_none(), "vanity names have no u/ marker");
        assert_eq!(&cap[2], "Mielmonster");
        assert!(cap.get(3).is_none());
    }

    #[test]
    fn page_html_yields_the_original_video() {
        let html = r#"<script>window.POST_DATA = {"919229468141178880":
            {"username":"Jack","userId":912480,"description":"Chicken.",
             "shortId":"b9KOOWX7HUx","created":"2013-05-19T21:12:31.000000",
             "videoUrls":[
                {"videoUrl":"http://v.cdn.example.com/low.mp4","id":"low"},
                {"videoUrl":"http://v.cdn.example.com/orig.mp4","id":"original"}]}};
            </script>"#;

        let posts = posts_from_page(html).unwrap();
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.short_id, "b9KOOWX7HUx");
        assert_eq!(post.uploader_name, "Jack");
        assert_eq!(post.uploader_id, "912480");
        assert_eq!(post.source_url, "http://v.cdn.example.com/orig.mp4");
        assert_eq!(post.created_at, datetime!(2013-05-19 21:12:31));
    }

    #[test]
    fn pages_without_post_data_are_an_error() {
        assert!(posts_from_page("<html></html>").is_err());
    }
}
