use std::process::{Command, Output, Stdio};

use bitflags::bitflags;
use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::{debug, trace};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";
pub const FFXXX_DEFAULT_ARGS: [&str; 3] = ["-hide_banner", "-loglevel", "error"];

bitflags! {
    pub struct Capture: u8 {
        const STDOUT = 0b01;
        const STDERR = 0b10;
    }
}

/// Run a command, returning its raw output handle.
///
/// IO streams are captured only if the caller asked for them. The function
/// returns an error only if the command could not be executed at all; a
/// non-zero exit status is left for the caller to interpret.
pub fn run_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
) -> Result<Output> {
    let get_io = |wanted| if wanted { Stdio::piped() } else { Stdio::null() };

    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(Stdio::null())
        .stdout(get_io(capture.contains(Capture::STDOUT)))
        .stderr(get_io(capture.contains(Capture::STDERR)));

    debug!("executing command: {cmd:?}");
    let res = cmd
        .output()
        .into_diagnostic()
        .wrap_err_with(|| format!("could not run {program}"))?;

    trace!("status: {}", res.status);
    Ok(res)
}

/// Run the command and verify that it returned a success status code,
/// carrying its stderr into the diagnostic when it did not.
pub fn assert_success_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
) -> Result<()> {
    let res = run_command(program, f, Capture::STDERR)?;
    if res.status.success() {
        let stderr = String::from_utf8_lossy(&res.stderr);
        if !stderr.is_empty() {
            debug!("{program} {}, stderr: {stderr}", res.status);
        }
        Ok(())
    } else {
        Err(command_failed(program, &res))
    }
}

/// Run the command and return its stdout, verifying the status code.
pub fn read_stdout_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
) -> Result<String> {
    let res = run_command(program, f, Capture::STDOUT | Capture::STDERR)?;
    if !res.status.success() {
        return Err(command_failed(program, &res));
    }
    String::from_utf8(res.stdout)
        .into_diagnostic()
        .wrap_err_with(|| format!("{program} output is not valid UTF-8"))
}

fn command_failed(program: &str, res: &Output) -> miette::Report {
    let stderr = String::from_utf8_lossy(&res.stderr);
    miette!("{program} {}\nstderr:\n{stderr}", res.status)
}
