use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

macro_rules! arg_env {
    ($v:literal) => {
        concat!("VINEKEEPER_", $v)
    };
}

/// Archive short-form video posts: download videos and metadata, generate
/// SubRip subtitles, burn them in, and concatenate playlists.
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true, env = arg_env!("CONFIG"))]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download posts' videos and metadata, and write a playlist
    Get(GetArgs),

    /// Generate SubRip subtitles for every post in a playlist
    Subtitles(SubtitlesArgs),

    /// Burn subtitles into videos and write a playlist of the results
    Hardsub(HardsubArgs),

    /// Losslessly concatenate a playlist of videos into one file
    Concat(ConcatArgs),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// URL of a single post, a user profile, or a user's likes
    pub url: String,

    /// Path of the playlist to write
    pub playlist: PathBuf,

    /// Download videos even if they already exist
    #[arg(long)]
    pub force: bool,

    /// Write the playlist in chronological order instead of newest-first
    #[arg(long)]
    pub no_reverse: bool,

    /// Keep only posts uploaded by the requested user
    #[arg(long)]
    pub no_reposts: bool,
}

#[derive(Args, Debug)]
pub struct SubtitlesArgs {
    /// Playlist naming the videos to generate subtitles for
    pub playlist: PathBuf,

    /// Subtitle text template; fields like {uploader} and {title} are
    /// replaced with each post's metadata
    #[arg(long)]
    pub format: Option<String>,

    /// Subtitle display duration in seconds
    #[arg(short = 't', long)]
    pub duration: Option<f64>,

    /// Remove emoji variation selectors from the rendered text
    #[arg(long)]
    pub plain_emoji: bool,
}

#[derive(Args, Debug)]
pub struct HardsubArgs {
    /// Playlist naming the videos to subtitle
    pub playlist_in: PathBuf,

    /// Path of the rewritten playlist pointing at the subtitled videos
    pub playlist_out: PathBuf,

    /// Font name for the burned-in subtitles
    #[arg(long)]
    pub font: Option<String>,

    /// Font size for the burned-in subtitles
    #[arg(long)]
    pub font_size: Option<u32>,

    /// Re-render videos whose subtitled version already exists
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConcatArgs {
    /// Playlist naming the videos to join, in order
    pub playlist: PathBuf,

    /// Path of the concatenated video to write
    pub video: PathBuf,
}
