mod command;
mod ffmpeg;
mod vine;

pub use ffmpeg::{DurationProbe, Ffmpeg};
pub use vine::{PostSource, VineApi};
