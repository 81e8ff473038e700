mod post;
mod subtitle;

pub use post::{
    hardsub_filename, metadata_filename_for, parse_timestamp, subtitle_filename_for, Post,
};
pub use subtitle::{format_srt_time, parse_srt_time, Subtitle};
