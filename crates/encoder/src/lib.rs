//! Shadercap Encoder
//!
//! Turns a directory of `frame_%04d.png` files into MP4 and/or GIF output by
//! invoking ffmpeg once per requested format. A failing format does not stop
//! the other one; frames are removed once at least one format succeeded.

pub mod binary;
pub mod command;
pub mod run;

pub use binary::{encoder_version, resolve_encoder, BinarySource, EncoderBinary, Platform};
pub use command::{build_args, EncodeJob};
pub use run::{encode_blocking, remove_frames, EncodeReport, EncoderBackend, FfmpegEncoder, FormatOutcome};
