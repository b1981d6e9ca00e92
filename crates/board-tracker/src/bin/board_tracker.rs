//! board-tracker CLI: track a camera against an ArUco grid board.

use board_tracker::aruco::builtins::{builtin_dictionary, BUILTIN_DICTIONARY_NAMES};
use board_tracker::aruco::{rotate_code_u64, Dictionary};
use board_tracker::config::SourceConfig;
use board_tracker::sink::{JsonLinesPoseSink, PngFrameSink};
use board_tracker::source::open_source;
use board_tracker::{OutputMode, TrackerConfig, TrackerContext};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "board-tracker")]
#[command(about = "Estimate and publish the camera pose relative to a printed ArUco grid board")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracking loop.
    Run(RunArgs),

    /// Print board geometry and the board-frame corners of every marker.
    BoardInfo {
        /// Tracker config (JSON).
        #[arg(long)]
        config: PathBuf,
    },

    /// Print statistics of a built-in dictionary.
    DictionaryInfo {
        /// Dictionary name, e.g. DICT_4X4_50.
        #[arg(long)]
        name: String,
    },
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Tracker config (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Calibration file (OpenCV YAML or JSON); overrides the config.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Directory of frames to replay; overrides the config source.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Restart the frame directory when it runs out.
    #[arg(long = "loop")]
    looping: bool,

    /// Which sinks to feed.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Loop rate in Hz.
    #[arg(long)]
    rate: Option<f64>,

    /// Dump translation, rotation matrix and quaternion for solved frames.
    #[arg(long)]
    debug: bool,

    /// Stop after this many iterations.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Write poses as JSON lines to this file instead of stdout.
    #[arg(long)]
    pose_out: Option<PathBuf>,

    /// Save published frames as PNG files into this directory.
    #[arg(long)]
    frame_out: Option<PathBuf>,

    /// Log verbosity.
    #[arg(long, value_enum, default_value_t = LogLevelArg::Info)]
    log_level: LogLevelArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Headless,
    WithPublish,
    WithDisplay,
}

impl From<ModeArg> for OutputMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Headless => OutputMode::Headless,
            ModeArg::WithPublish => OutputMode::WithPublish,
            ModeArg::WithDisplay => OutputMode::WithDisplay,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(value: LogLevelArg) -> Self {
        match value {
            LogLevelArg::Off => LevelFilter::Off,
            LogLevelArg::Error => LevelFilter::Error,
            LogLevelArg::Warn => LevelFilter::Warn,
            LogLevelArg::Info => LevelFilter::Info,
            LogLevelArg::Debug => LevelFilter::Debug,
            LogLevelArg::Trace => LevelFilter::Trace,
        }
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::BoardInfo { config } => board_info(&config),
        Commands::DictionaryInfo { name } => dictionary_info(&name),
    }
}

fn init_logging(level: LogLevelArg) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    board_tracker::core::init_tracing(level.into(), false);
    #[cfg(not(feature = "tracing"))]
    board_tracker::core::init_with_level(level.into())?;
    Ok(())
}

fn apply_overrides(cfg: &mut TrackerConfig, args: &RunArgs) {
    if let Some(path) = &args.calibration {
        cfg.calibration_path = path.clone();
    }
    if let Some(dir) = &args.frames {
        cfg.source = Some(SourceConfig::ImageSequence {
            dir: dir.clone(),
            looping: args.looping,
        });
    }
    if let Some(mode) = args.mode {
        cfg.mode = mode.into();
    }
    if let Some(rate) = args.rate {
        cfg.rate_hz = rate;
    }
    if args.debug {
        cfg.debug = true;
    }
    if let Some(path) = &args.pose_out {
        cfg.publish.pose_out = Some(path.clone());
    }
    if let Some(dir) = &args.frame_out {
        cfg.publish.frame_out = Some(dir.clone());
    }
}

fn run(args: RunArgs) -> CliResult<()> {
    init_logging(args.log_level)?;

    let mut cfg = TrackerConfig::load_json(&args.config)?;
    apply_overrides(&mut cfg, &args);
    cfg.validate()?;

    let source_cfg = cfg
        .source
        .as_ref()
        .ok_or("no frame source: set `source` in the config or pass --frames")?;
    let source = open_source(source_cfg)?;

    let mut ctx = TrackerContext::from_config(&cfg, source)?.with_max_frames(args.max_frames);
    ctx = match &cfg.publish.pose_out {
        Some(path) => ctx.with_pose_sink(Box::new(JsonLinesPoseSink::create(path)?)),
        None => ctx.with_pose_sink(Box::new(JsonLinesPoseSink::stdout())),
    };
    if let Some(dir) = &cfg.publish.frame_out {
        ctx = ctx.with_frame_sink(Box::new(PngFrameSink::create(dir)?));
    }
    if cfg.mode.uses_display() {
        #[cfg(feature = "display")]
        {
            ctx = ctx.with_display(Box::new(board_tracker::display::DisplayWindow::new(
                "board-tracker",
            )));
        }
        #[cfg(not(feature = "display"))]
        {
            return Err("with-display needs the `display` feature".into());
        }
    }

    let flag = ctx.shutdown_flag();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let summary = ctx.run(cfg.mode)?;
    log::info!("summary: {}", serde_json::to_string(&summary)?);
    Ok(())
}

fn board_info(config: &Path) -> CliResult<()> {
    let cfg = TrackerConfig::load_json(config)?;
    let board = cfg.build_board()?;
    let spec = board.spec();
    let markers: Vec<_> = board
        .marker_ids()
        .filter_map(|id| {
            let (row, col) = board.marker_cell(id)?;
            let corners = board.marker_object_points(id)?;
            Some(json!({
                "id": id,
                "row": row,
                "col": col,
                "corners": corners.iter().map(|p| [p.x, p.y, p.z]).collect::<Vec<_>>(),
            }))
        })
        .collect();
    let report = json!({
        "rows": spec.rows,
        "cols": spec.cols,
        "marker_length": spec.marker_length,
        "marker_separation": spec.marker_separation,
        "dictionary": spec.dictionary.name,
        "first_marker": spec.first_marker,
        "markers": markers,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Smallest Hamming distance between two distinct markers over all rotations.
fn min_inter_marker_distance(dict: &Dictionary) -> u32 {
    let n = dict.marker_size;
    let mut best = u32::MAX;
    for (i, &a) in dict.codes.iter().enumerate() {
        for r in 1..4u8 {
            best = best.min((a ^ rotate_code_u64(a, n, r)).count_ones());
        }
        for &b in &dict.codes[i + 1..] {
            for r in 0..4u8 {
                best = best.min((rotate_code_u64(a, n, r) ^ b).count_ones());
            }
        }
    }
    best
}

fn dictionary_info(name: &str) -> CliResult<()> {
    let dict = builtin_dictionary(name).ok_or_else(|| {
        format!(
            "unknown dictionary {name:?}; known: {}",
            BUILTIN_DICTIONARY_NAMES.join(", ")
        )
    })?;
    let report = json!({
        "name": dict.name,
        "marker_size": dict.marker_size,
        "bits": dict.bit_count(),
        "codes": dict.len(),
        "max_correction_bits": dict.max_correction_bits,
        "min_distance": min_inter_marker_distance(&dict),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
