use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

use sprite_cutter::{
    encode, mask_from_files, BatchJob, BatchRunner, Config, OutputFormat, ProgressEvent,
};

const DEFAULT_CONFIG_PATH: &str = "sprite-cutter.json";

#[derive(Parser, Debug)]
#[command(name = "sprite-cutter", version, about)]
struct Cli {
    /// Settings file (created by `config init`; defaults apply when absent).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cut every candidate frame out of the background.
    Cut(CutArgs),
    /// Write only the red/transparent mask preview for one candidate.
    Mask(MaskArgs),
    /// Inspect or create the settings file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
struct CutArgs {
    /// Background image shared by all candidates.
    #[arg(long, short)]
    background: PathBuf,

    /// Candidate frames.
    #[arg(required = true)]
    candidates: Vec<PathBuf>,

    /// Output directory (overrides the settings file).
    #[arg(long, short)]
    out: Option<PathBuf>,

    /// Blur radius applied to the difference (0 disables smoothing).
    #[arg(long)]
    sharpness: Option<f32>,

    /// Largest summed RGB difference still treated as background.
    #[arg(long)]
    noise: Option<f32>,

    /// Worker threads (defaults to all cores, or 1 when concurrency is off).
    #[arg(long)]
    jobs: Option<usize>,

    /// Skip the `diff<name>` mask previews.
    #[arg(long)]
    no_masks: bool,

    /// Write sprites with this extension instead of the candidate's.
    #[arg(long)]
    format: Option<String>,
}

#[derive(Parser, Debug)]
struct MaskArgs {
    #[arg(long, short)]
    background: PathBuf,

    #[arg(long, short)]
    candidate: PathBuf,

    /// Output image path; its extension selects the format.
    #[arg(long, short)]
    out: PathBuf,

    #[arg(long)]
    sharpness: Option<f32>,

    #[arg(long)]
    noise: Option<f32>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default settings to the settings file.
    Init {
        /// Target file (defaults to `--config`).
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective settings.
    Show,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Command::Cut(args) => cmd_cut(&cli.config, args),
        Command::Mask(args) => cmd_mask(&cli.config, args),
        Command::Config(ConfigCommand::Init { path, force }) => {
            cmd_config_init(path.as_deref().unwrap_or(&cli.config), force)
        }
        Command::Config(ConfigCommand::Show) => cmd_config_show(&cli.config),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load_or_default(path).with_context(|| format!("load settings '{}'", path.display()))
}

fn cmd_cut(config_path: &Path, args: CutArgs) -> anyhow::Result<ExitCode> {
    let mut config = load_config(config_path)?;
    if let Some(out) = args.out {
        config.output_dir = out;
    }
    if let Some(sharpness) = args.sharpness {
        config.sharpness = sharpness;
    }
    if let Some(noise) = args.noise {
        config.noise_threshold = noise;
    }
    if args.no_masks {
        config.save_mask_preview = false;
    }
    if let Some(format) = args.format {
        config.output_extension = Some(format);
    }

    let job = BatchJob {
        background: args.background,
        candidates: args.candidates,
        output_dir: config.output_dir.clone(),
    };

    let runner = match args.jobs {
        Some(jobs) => BatchRunner::with_workers(config, jobs),
        None => BatchRunner::new(config),
    }
    .context("invalid settings")?;

    tracing::info!(
        candidates = job.candidates.len(),
        workers = runner.workers(),
        "converting candidates into sprites"
    );

    let report = runner.run(&job, |event| match event {
        ProgressEvent::Started { .. } => {}
        ProgressEvent::ItemDone {
            sprite, progress, ..
        } => {
            eprintln!(
                "[{}/{}] {} is ready",
                progress.done,
                progress.expected,
                sprite.display()
            );
        }
        ProgressEvent::ItemFailed {
            candidate,
            message,
            progress,
        } => {
            eprintln!(
                "[{}/{}] {} failed: {message}",
                progress.done,
                progress.expected,
                candidate.display()
            );
        }
    })?;

    for failure in &report.failures {
        eprintln!(
            "failed: {} (background {}): {}",
            failure.candidate.display(),
            failure.background.display(),
            failure.error
        );
    }
    eprintln!(
        "done: {} written, {} failed",
        report.completed.len(),
        report.failures.len()
    );

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_mask(config_path: &Path, args: MaskArgs) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    let sharpness = args.sharpness.unwrap_or(config.sharpness);
    let noise = args.noise.unwrap_or(config.noise_threshold);

    let format = OutputFormat::from_path(&args.out)
        .with_context(|| format!("unknown image format for '{}'", args.out.display()))?;
    let mask = mask_from_files(&args.background, &args.candidate, sharpness, noise)?;
    let bytes = encode(&mask.to_preview(), &config.encoding.for_preview(), format)?;

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, bytes)
        .with_context(|| format!("write mask '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({} of {} pixels kept)",
        args.out.display(),
        mask.keep_count(),
        mask.keep_count() + mask.discard_count()
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_init(config_path: &Path, force: bool) -> anyhow::Result<ExitCode> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "'{}' already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    Config::default().save(config_path)?;
    eprintln!("wrote {}", config_path.display());
    Ok(ExitCode::SUCCESS)
}

fn cmd_config_show(config_path: &Path) -> anyhow::Result<ExitCode> {
    let config = load_config(config_path)?;
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(ExitCode::SUCCESS)
}
