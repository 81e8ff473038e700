use std::{ffi::OsStr, fmt::Debug, path::Path, sync::OnceLock, time::Duration};

use miette::{miette, Context, IntoDiagnostic, Result};
use regex::Regex;

use super::command::{
    assert_success_command, read_stdout_command, FFMPEG, FFPROBE, FFXXX_DEFAULT_ARGS,
};

/// Probe the playback duration of a media file.
pub trait DurationProbe: Sync {
    fn duration(&self, path: &Path) -> Result<Duration>;
}

/// Interface for the [ffmpeg](https://ffmpeg.org) and `ffprobe` programs
#[derive(Debug)]
pub struct Ffmpeg;

impl Ffmpeg {
    /// Verify that the `ffmpeg` and `ffprobe` binaries are reachable before
    /// any job is scheduled.
    pub fn new() -> Result<Self> {
        assert_success_command(FFMPEG, |cmd| cmd.arg("-version"))
            .wrap_err("ffmpeg not found in PATH")?;
        assert_success_command(FFPROBE, |cmd| cmd.arg("-version"))
            .wrap_err("ffprobe not found in PATH")?;

        Ok(Self)
    }

    /// Probe the pixel dimensions of a video's streams.
    pub fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let out = read_stdout_command(FFPROBE, |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .arg("-show_streams")
                .args(["-of", "flat"])
                .arg(path.as_os_str())
        })?;

        parse_dimensions(&out).wrap_err_with(|| format!("probe dimensions of {}", path.display()))
    }

    /// Re-encode a video to the given dimensions.
    pub fn scale(&self, input: &Path, output: &Path, (width, height): (u32, u32)) -> Result<()> {
        assert_success_command(FFMPEG, |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .arg("-y")
                .args([OsStr::new("-i"), input.as_os_str()])
                .args(["-vf", &format!("scale={width}:{height}")])
                .arg(output.as_os_str())
        })
    }

    /// Remux an MP4 into an MPEG transport stream without re-encoding, the
    /// intermediate format the lossless concatenation works on.
    pub fn remux_to_transport_stream(&self, input: &Path, output: &Path) -> Result<()> {
        assert_success_command(FFMPEG, |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .arg("-y") // a playlist may name the same video twice
                .args([OsStr::new("-i"), input.as_os_str()])
                .args(["-c", "copy"])
                .args(["-bsf:v", "h264_mp4toannexb"])
                .args(["-f", "mpegts"])
                .arg(output.as_os_str())
        })
    }

    /// Concatenate transport streams named in a concat list file into one
    /// MP4, undoing the ADTS framing the remux put on the audio.
    pub fn concat_transport_streams(&self, list: &Path, output: &Path) -> Result<()> {
        assert_success_command(FFMPEG, |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .arg("-y")
                .args(["-f", "concat"])
                // "safe" filenames are relative and [a-zA-Z0-9_.-] only;
                // the list holds absolute scratch paths
                .args(["-safe", "0"])
                .args([OsStr::new("-i"), list.as_os_str()])
                .args(["-c", "copy"])
                .args(["-bsf:a", "aac_adtstoasc"])
                .arg(output.as_os_str())
        })
    }

    /// Burn the subtitle file into the picture, producing a new video.
    pub fn burn_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        output: &Path,
        font_name: &str,
        font_size: u32,
    ) -> Result<()> {
        let filter = format!(
            "subtitles=f={}:force_style='FontName={font_name},Fontsize={font_size}'",
            subtitles.display()
        );
        assert_success_command(FFMPEG, |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .arg("-y")
                .args([OsStr::new("-i"), video.as_os_str()])
                .args(["-vf", &filter])
                .arg(output.as_os_str())
        })
    }
}

impl DurationProbe for Ffmpeg {
    fn duration(&self, path: &Path) -> Result<Duration> {
        let out = read_stdout_command(FFPROBE, |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .args(["-show_entries", "format=duration"])
                .args(["-of", "default=noprint_wrappers=1:nokey=1"])
                .arg(path.as_os_str())
        })?;

        parse_probed_duration(&out).wrap_err_with(|| format!("probe duration of {}", path.display()))
    }
}

fn width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"streams\.stream\.\d+\.width=(\d+)").unwrap())
}

fn height_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"streams\.stream\.\d+\.height=(\d+)").unwrap())
}

fn parse_dimensions(out: &str) -> Result<(u32, u32)> {
    let parse = |re: &Regex, what: &str| -> Result<u32> {
        let cap = re
            .captures(out)
            .ok_or_else(|| miette!("no {what} in ffprobe output"))?;
        cap[1]
            .parse()
            .into_diagnostic()
            .wrap_err_with(|| format!("{what} out of range: {}", &cap[1]))
    };

    Ok((parse(width_re(), "width")?, parse(height_re(), "height")?))
}

fn parse_probed_duration(out: &str) -> Result<Duration> {
    let seconds: f64 = out
        .trim()
        .parse()
        .into_diagnostic()
        .wrap_err_with(|| format!("non-numeric ffprobe duration: {:?}", out.trim()))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(miette!("invalid ffprobe duration: {seconds}"));
    }
    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_come_from_flat_stream_output() {
        let out = "streams.stream.0.index=0\n\
                   streams.stream.0.width=480\n\
                   streams.stream.0.height=480\n\
                   streams.stream.1.index=1\n";
        assert_eq!(parse_dimensions(out).unwrap(), (480, 480));
    }

    #[test]
    fn missing_dimensions_are_an_error() {
        let out = "streams.stream.0.index=0\n";
        assert!(parse_dimensions(out).is_err());
    }

    #[test]
    fn probed_durations_parse_fractional_seconds() {
        assert_eq!(
            parse_probed_duration("6.023000\n").unwrap(),
            Duration::from_micros(6_023_000)
        );
        assert!(parse_probed_duration("N/A").is_err());
        assert!(parse_probed_duration("-1.0").is_err());
    }
}
