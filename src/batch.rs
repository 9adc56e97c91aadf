//! Batch driver turning a list of candidate frames into sprites.
//!
//! Each candidate is processed end-to-end (decode, mask, composite, encode,
//! write) by one worker of a bounded pool. Workers report back over a
//! channel; only the calling thread touches the progress counters and the
//! failure list. A failing candidate never aborts the rest of the batch and
//! never leaves files behind.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use image::{DynamicImage, Rgb, Rgba};
use imageproc::definitions::Image;
use itertools::Itertools;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::Config;
use crate::error::{BatchError, ItemError};
use crate::sprite_ops::composite::composite;
use crate::sprite_ops::difference::compute_mask;
use crate::sprite_ops::encode::{encode, OutputFormat};
use crate::sprite_ops::mask::Mask;
use crate::utils::{mask_file_name, output_file_name, partial_path};

/// One background and the candidates to cut against it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub background: PathBuf,
    pub candidates: Vec<PathBuf>,
    pub output_dir: PathBuf,
}

/// Shared flag that stops dispatching further candidates
///
/// Candidates already being processed run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Running `done / expected` count
///
/// `expected` starts at the number of candidates and shrinks by one for
/// every failed or skipped candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub expected: usize,
}

/// Events delivered to the batch observer, always on the calling thread
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        total: usize,
    },
    ItemDone {
        candidate: PathBuf,
        sprite: PathBuf,
        progress: Progress,
    },
    ItemFailed {
        candidate: PathBuf,
        message: String,
        progress: Progress,
    },
}

/// Files written for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteOutput {
    pub candidate: PathBuf,
    pub sprite: PathBuf,
    pub mask_preview: Option<PathBuf>,
}

/// A candidate that could not be turned into a sprite
#[derive(Debug)]
pub struct ItemFailure {
    pub candidate: PathBuf,
    pub background: PathBuf,
    pub error: ItemError,
}

/// Outcome of a whole batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    /// Written sprites, in candidate order
    pub completed: Vec<SpriteOutput>,
    pub failures: Vec<ItemFailure>,
    /// Candidates never started because the batch was cancelled
    pub skipped: Vec<PathBuf>,
}

impl BatchReport {
    pub fn progress(&self) -> Progress {
        Progress {
            done: self.completed.len(),
            expected: self.total - self.failures.len() - self.skipped.len(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

enum Outcome {
    Done(SpriteOutput),
    Failed(ItemError),
    Skipped,
}

/// Runs [`BatchJob`]s on a bounded worker pool
pub struct BatchRunner {
    config: Config,
    pool: ThreadPool,
    cancel: CancelToken,
}

impl BatchRunner {
    /// Validates `config` and builds a pool sized by its concurrency toggle
    ///
    /// # Errors
    ///
    /// * `BatchError::Config` - When a setting is out of its accepted domain
    /// * `BatchError::ThreadPool` - When the worker pool cannot be created
    pub fn new(config: Config) -> Result<Self, BatchError> {
        let workers = if config.concurrent {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            1
        };
        Self::with_workers(config, workers)
    }

    /// Like [`BatchRunner::new`] with an explicit worker count (at least one)
    pub fn with_workers(config: Config, workers: usize) -> Result<Self, BatchError> {
        config.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("sprite-cutter-{index}"))
            .build()?;

        Ok(Self {
            config,
            pool,
            cancel: CancelToken::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Token that stops this runner from starting further candidates
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Processes every candidate of `job`, reporting through `observer`
    ///
    /// Per-candidate failures are collected in the report; only problems
    /// that prevent the batch from starting at all are returned as errors.
    ///
    /// # Errors
    ///
    /// * `BatchError::OutputDir` - When the output directory cannot be created
    #[tracing::instrument(
        skip_all,
        fields(background = %job.background.display(), candidates = job.candidates.len())
    )]
    pub fn run(
        &self,
        job: &BatchJob,
        mut observer: impl FnMut(&ProgressEvent),
    ) -> Result<BatchReport, BatchError> {
        fs::create_dir_all(&job.output_dir).map_err(|source| BatchError::OutputDir {
            path: job.output_dir.clone(),
            source,
        })?;

        let total = job.candidates.len();
        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };
        observer(&ProgressEvent::Started { total });

        let background = Background::open(&job.background);
        let mut outcomes: Vec<(usize, SpriteOutput)> = Vec::with_capacity(total);

        self.pool.in_place_scope(|scope| {
            let (sender, receiver) = mpsc::channel();

            let mut claimed = HashSet::with_capacity(total);
            for (index, candidate) in job.candidates.iter().enumerate() {
                if let Some(name) = self.claim_output_names(candidate, &mut claimed) {
                    let error = ItemError::InvalidSetting(format!(
                        "`{name}` is already written by an earlier candidate"
                    ));
                    // The receiver is still alive on this thread
                    let _ = sender.send((index, Outcome::Failed(error)));
                    continue;
                }

                let sender = sender.clone();
                let background = &background;
                scope.spawn(move |_| {
                    let outcome = if self.cancel.is_cancelled() {
                        Outcome::Skipped
                    } else {
                        match background {
                            Ok(background) => self
                                .cut(background, candidate, &job.output_dir)
                                .map_or_else(Outcome::Failed, Outcome::Done),
                            Err(error) => Outcome::Failed(shared_failure(error)),
                        }
                    };
                    // The receiver outlives every worker
                    let _ = sender.send((index, outcome));
                });
            }
            drop(sender);

            let mut expected = total;
            for (index, outcome) in receiver {
                let candidate = job.candidates[index].clone();
                match outcome {
                    Outcome::Done(output) => {
                        let sprite = output.sprite.clone();
                        outcomes.push((index, output));
                        tracing::debug!(candidate = %candidate.display(), "sprite written");
                        observer(&ProgressEvent::ItemDone {
                            candidate,
                            sprite,
                            progress: Progress {
                                done: outcomes.len(),
                                expected,
                            },
                        });
                    }
                    Outcome::Failed(error) => {
                        expected -= 1;
                        tracing::warn!(
                            candidate = %candidate.display(),
                            background = %job.background.display(),
                            %error,
                            "candidate failed"
                        );
                        observer(&ProgressEvent::ItemFailed {
                            candidate: candidate.clone(),
                            message: error.to_string(),
                            progress: Progress {
                                done: outcomes.len(),
                                expected,
                            },
                        });
                        report.failures.push(ItemFailure {
                            candidate,
                            background: job.background.clone(),
                            error,
                        });
                    }
                    Outcome::Skipped => {
                        expected -= 1;
                        report.skipped.push(candidate);
                    }
                }
            }
        });

        report.completed = outcomes
            .into_iter()
            .sorted_by_key(|(index, _)| *index)
            .map(|(_, output)| output)
            .collect();

        tracing::info!(
            completed = report.completed.len(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            "batch finished"
        );
        Ok(report)
    }

    /// Reserves the files `candidate` will write, returning the first one
    /// an earlier candidate already holds
    fn claim_output_names(
        &self,
        candidate: &Path,
        claimed: &mut HashSet<String>,
    ) -> Option<String> {
        let name = output_file_name(candidate, self.config.output_extension.as_deref())?;
        let mut names = vec![name.clone()];
        if self.config.save_mask_preview {
            names.push(mask_file_name(&name));
        }

        let taken = names.iter().find(|name| claimed.contains(*name)).cloned();
        if taken.is_none() {
            claimed.extend(names);
        }
        taken
    }

    fn cut(
        &self,
        background: &Background,
        candidate: &Path,
        output_dir: &Path,
    ) -> Result<SpriteOutput, ItemError> {
        let config = &self.config;
        let name = output_file_name(candidate, config.output_extension.as_deref()).ok_or_else(|| {
            ItemError::InvalidSetting(format!(
                "cannot derive an output file name from {}",
                candidate.display()
            ))
        })?;
        let format = OutputFormat::from_path(&name).ok_or_else(|| {
            ItemError::InvalidSetting(format!("cannot determine an output format for `{name}`"))
        })?;

        let frames = FramePair::new(background, open_image(candidate)?);
        let mask = frames.mask(config.sharpness, config.noise_threshold)?;
        let sprite = frames.composite(&mask)?;

        let sprite_path = output_dir.join(&name);
        let mut files = vec![(sprite_path.clone(), encode(&sprite, &config.encoding, format)?)];

        let mask_preview = if config.save_mask_preview {
            let preview_path = output_dir.join(mask_file_name(&name));
            let bytes = encode(&mask.to_preview(), &config.encoding.for_preview(), format)?;
            files.push((preview_path.clone(), bytes));
            Some(preview_path)
        } else {
            None
        };

        write_all_or_nothing(&files)?;

        Ok(SpriteOutput {
            candidate: candidate.to_path_buf(),
            sprite: sprite_path,
            mask_preview,
        })
    }
}

/// Decoded background in both channel layouts a candidate may need
struct Background {
    rgb: Image<Rgb<u8>>,
    rgba: Image<Rgba<u8>>,
    has_alpha: bool,
}

impl Background {
    fn open(path: &Path) -> Result<Self, ItemError> {
        let image = open_image(path)?;
        Ok(Self::from_image(&image))
    }

    fn from_image(image: &DynamicImage) -> Self {
        Self {
            rgb: image.to_rgb8(),
            rgba: image.to_rgba8(),
            has_alpha: image.color().has_alpha(),
        }
    }
}

/// Background and candidate normalised to one channel layout
///
/// If either side carries alpha both are compared as RGBA, otherwise as RGB.
enum FramePair<'a> {
    Rgb(&'a Image<Rgb<u8>>, Image<Rgb<u8>>),
    Rgba(&'a Image<Rgba<u8>>, Image<Rgba<u8>>),
}

impl<'a> FramePair<'a> {
    fn new(background: &'a Background, candidate: DynamicImage) -> Self {
        if background.has_alpha || candidate.color().has_alpha() {
            Self::Rgba(&background.rgba, candidate.into_rgba8())
        } else {
            Self::Rgb(&background.rgb, candidate.into_rgb8())
        }
    }

    fn mask(&self, blur_radius: f32, noise_threshold: f32) -> Result<Mask, ItemError> {
        let mask = match self {
            Self::Rgb(background, candidate) => {
                compute_mask(*background, candidate, blur_radius, noise_threshold)
            }
            Self::Rgba(background, candidate) => {
                compute_mask(*background, candidate, blur_radius, noise_threshold)
            }
        }?;
        Ok(mask)
    }

    fn composite(&self, mask: &Mask) -> Result<Image<Rgba<u8>>, ItemError> {
        let sprite = match self {
            Self::Rgb(_, candidate) => composite(candidate, mask),
            Self::Rgba(_, candidate) => composite(candidate, mask),
        }?;
        Ok(sprite)
    }
}

/// Computes the mask of a single candidate read from disk
///
/// Used for previewing settings without writing a sprite.
pub fn mask_from_files(
    background: &Path,
    candidate: &Path,
    blur_radius: f32,
    noise_threshold: f32,
) -> Result<Mask, ItemError> {
    let background = Background::open(background)?;
    FramePair::new(&background, open_image(candidate)?).mask(blur_radius, noise_threshold)
}

fn open_image(path: &Path) -> Result<DynamicImage, ItemError> {
    image::open(path).map_err(|source| ItemError::UnreadableInput {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })
}

/// Writes every file to a `.partial` sibling, then renames them into place
///
/// On any failure all partial and already renamed files are removed.
pub(crate) fn write_all_or_nothing(files: &[(PathBuf, Vec<u8>)]) -> Result<(), ItemError> {
    let mut written: Vec<PathBuf> = Vec::with_capacity(files.len() * 2);

    let result = (|| -> Result<(), ItemError> {
        for (target, bytes) in files {
            let partial = partial_path(target);
            written.push(partial.clone());
            fs::write(&partial, bytes).map_err(|source| ItemError::Io {
                path: partial.clone(),
                source,
            })?;
        }
        for (target, _) in files {
            let partial = partial_path(target);
            fs::rename(&partial, target).map_err(|source| ItemError::Io {
                path: target.clone(),
                source,
            })?;
            written.push(target.clone());
        }
        Ok(())
    })();

    if result.is_err() {
        for path in &written {
            let _ = fs::remove_file(path);
        }
    }
    result
}

/// Copy of a background failure for one more candidate
fn shared_failure(error: &ItemError) -> ItemError {
    match error {
        ItemError::UnreadableInput { path, source } => ItemError::UnreadableInput {
            path: path.clone(),
            source: Arc::clone(source),
        },
        other => ItemError::InvalidSetting(other.to_string()),
    }
}
