//! Cut animation frames rendered over a shared background into transparent sprites.
//!
//! A candidate frame is compared with the background, the per-channel
//! difference is smoothed and thresholded into a KEEP/DISCARD [`Mask`], and
//! the candidate is composited through that mask onto a transparent canvas.
//! [`BatchRunner`] drives the whole pipeline for many candidates at once.

mod error;
mod sprite_ops;
#[cfg(test)]
mod test_utils;
mod utils;

pub mod batch;
pub mod config;

pub use batch::{
    mask_from_files, BatchJob, BatchReport, BatchRunner, CancelToken, ItemFailure, Progress,
    ProgressEvent, SpriteOutput,
};
pub use config::{Config, CONFIG_VERSION, DEFAULT_NOISE_THRESHOLD, DEFAULT_SHARPNESS};
pub use error::{BatchError, CompositeError, ConfigError, DifferenceError, EncodeError, ItemError};
pub use sprite_ops::composite::{composite, ApplySpriteMask, TRANSPARENT};
pub use sprite_ops::difference::{compute_mask, difference_map, DifferencePixel, FrameDifference};
pub use sprite_ops::encode::{encode, EncodingSettings, OutputFormat, PngSettings, WebpSettings};
pub use sprite_ops::gaussian::GaussianBlur;
pub use sprite_ops::mask::{Mask, DISCARD, DISCARD_PREVIEW, KEEP, KEEP_PREVIEW};
pub use utils::{mask_file_name, output_file_name};

pub use imageproc::definitions::Image;
