mod cli;
mod concat;
mod download;
mod hardsub;
mod io;
mod logging;
mod outside;
mod playlist;
mod pool;
mod scale;
mod settings;
mod sidecar;
mod subtitles;
mod types;

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
    time::Duration,
};

use clap::Parser;
use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::{error, info, Level};

use crate::{
    cli::{Cli, Command, ConcatArgs, GetArgs, HardsubArgs, SubtitlesArgs},
    outside::{Ffmpeg, PostSource, VineApi},
    settings::Settings,
    types::{subtitle_filename_for, Post},
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    logging::init_logging(level)?;

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Get(args) => run_get(args, &settings),
        Command::Subtitles(args) => run_subtitles(args, &settings),
        Command::Hardsub(args) => run_hardsub(args, &settings),
        Command::Concat(args) => run_concat(args, &settings),
    }
}

fn run_get(args: GetArgs, settings: &Settings) -> Result<()> {
    let api = VineApi::new();

    let mut posts = api.extract_posts(&args.url)?;
    info!("{} posts found", posts.len());

    if args.no_reposts {
        posts = api.filter_reposts(posts, &args.url)?;
        info!("{} posts after dropping reposts", posts.len());
    }

    if args.no_reverse {
        posts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    } else {
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    // Attempt every stage even if an earlier one had failures, then report
    let mut failed_stages = 0;

    if let Err(report) = sidecar::write_all(&posts) {
        error!("{report}");
        failed_stages += 1;
    }

    if let Err(report) =
        download::download_all(&api, &posts, args.force, settings.download_workers())
    {
        error!("{report}");
        failed_stages += 1;
    }

    if let Err(report) = write_playlist_file(&args.playlist, &posts) {
        error!("{report}");
        failed_stages += 1;
    }

    if failed_stages > 0 {
        return Err(miette!("getting posts did not fully succeed"));
    }
    info!("archived {} posts", posts.len());
    Ok(())
}

fn run_subtitles(args: SubtitlesArgs, settings: &Settings) -> Result<()> {
    let template = args
        .format
        .as_deref()
        .unwrap_or(&settings.subtitle_template);
    subtitles::validate_template(template)?;

    let seconds = args.duration.unwrap_or(settings.subtitle_duration);
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(miette!("invalid subtitle duration: {seconds}"));
    }
    let display = Duration::from_secs_f64(seconds);

    let posts = playlist::read_posts_for_playlist(&args.playlist)?;
    subtitles::write_all_subtitles(&posts, display, template, args.plain_emoji)?;

    info!("wrote subtitles for {} posts", posts.len());
    Ok(())
}

fn run_hardsub(args: HardsubArgs, settings: &Settings) -> Result<()> {
    let entries = playlist::read_playlist_file(&args.playlist_in)?;
    let ffmpeg = Ffmpeg::new()?;
    let workers = settings.encode_workers()?;

    let files: Vec<String> = entries.iter().map(|entry| entry.filename.clone()).collect();
    scale::scale_all(&ffmpeg, files, settings.canonical_dimensions(), workers)?;

    let font_name = args.font.as_deref().unwrap_or(&settings.font_name);
    let font_size = args.font_size.unwrap_or(settings.font_size);
    // Render failures are reported only after the rewritten playlist is out
    let rendered = hardsub::burn_all(&ffmpeg, &entries, font_name, font_size, args.force, workers);
    if let Err(report) = &rendered {
        error!("{report}");
    }

    let in_file = File::open(&args.playlist_in)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not open playlist {}", args.playlist_in.display()))?;
    let out_file = File::create(&args.playlist_out)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not create playlist {}", args.playlist_out.display()))?;
    let mut writer = BufWriter::new(out_file);
    playlist::hardsub_playlist(BufReader::new(in_file), &mut writer)?;
    writer
        .flush()
        .into_diagnostic()
        .wrap_err("could not write playlist")?;

    info!("wrote playlist {}", args.playlist_out.display());
    rendered
}

fn run_concat(args: ConcatArgs, settings: &Settings) -> Result<()> {
    let entries = playlist::read_playlist_file(&args.playlist)?;
    let ffmpeg = Ffmpeg::new()?;
    let workers = settings.encode_workers()?;

    let files: Vec<String> = entries.iter().map(|entry| entry.filename.clone()).collect();
    scale::scale_all(&ffmpeg, files, settings.canonical_dimensions(), workers)?;

    concat::concat_videos(&ffmpeg, &entries, &args.video)?;

    // The merged subtitle stream lands next to the output video
    let merged = subtitle_filename_for(&args.video.to_string_lossy());
    let file = File::create(&merged)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not create {merged}"))?;
    let mut writer = BufWriter::new(file);
    subtitles::concat_subtitles(&mut writer, &entries, &ffmpeg)?;
    writer
        .flush()
        .into_diagnostic()
        .wrap_err("could not write concatenated subtitles")?;

    info!("wrote {} and {merged}", args.video.display());
    Ok(())
}

fn write_playlist_file(path: &Path, posts: &[Post]) -> Result<()> {
    let file = File::create(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("could not create playlist {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    playlist::write_playlist(&mut writer, posts)?;
    writer
        .flush()
        .into_diagnostic()
        .wrap_err("could not write playlist")
}
