//! Headless front end: render a filtered view to PNG, list an overlay file or
//! show a saved session.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use tracelens::ViewerSession;
use tracelens::config::{AppConfig, LogLevel};
use tracelens::persistence::JsonFileStore;
use tracelens::filter::FilterMode;
use tracelens::store::{LoadReport, OverlayStore};

#[derive(Parser, Debug)]
#[command(name = "tracelens", version, about = "Trace viewer renderer and overlay inspector")]
struct Cli {
    /// Configuration file; the platform default when omitted
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration (RUST_LOG still wins)
    #[arg(long, global = true, value_name = "LEVEL", value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter and scale an image, optionally with overlays, and write a PNG
    Render {
        /// Image to render
        input: PathBuf,

        /// PNG file to write; relative paths land in the configured export
        /// folder. Defaults to `<input>-view.png`
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Contrast mode
        #[arg(short, long, value_enum, default_value_t = ModeArg::Normal)]
        mode: ModeArg,

        /// Zoom in percent (10-400); the configured default when omitted
        #[arg(short, long)]
        zoom: Option<u32>,

        /// Thicken thin dark traces after filtering
        #[arg(short, long)]
        trace: bool,

        /// Overlay file to composite on top
        #[arg(long, value_name = "FILE")]
        overlays: Option<PathBuf>,
    },

    /// Print the overlays of an overlay file as a table
    Overlays {
        /// Overlay file written by an export
        file: PathBuf,
    },

    /// Show what a viewer would restore from a session settings file
    Session {
        /// Settings file; the configured or platform default when omitted
        file: Option<PathBuf>,
    },
}

fn parse_log_level(name: &str) -> Result<LogLevel, String> {
    LogLevel::from_name(name).ok_or_else(|| {
        let names: Vec<_> = LogLevel::all().iter().map(LogLevel::name).collect();
        format!("expected one of {}", names.join(", ").to_lowercase())
    })
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "view".to_string());
    PathBuf::from(format!("{stem}-view.png"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Normal,
    EnhancedColor,
    HighContrastColor,
    SmartInvert,
    InvertedGray,
    HcGray,
    InvertedHcGray,
    Binary,
}

impl From<ModeArg> for FilterMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Normal => FilterMode::None,
            ModeArg::EnhancedColor => FilterMode::EnhancedColor,
            ModeArg::HighContrastColor => FilterMode::HighContrastColor,
            ModeArg::SmartInvert => FilterMode::SmartInvert,
            ModeArg::InvertedGray => FilterMode::InvertedGray,
            ModeArg::HcGray => FilterMode::HCGray,
            ModeArg::InvertedHcGray => FilterMode::InvertedHCGray,
            ModeArg::Binary => FilterMode::Binary,
        }
    }
}

fn load_config(path: Option<&Path>) -> AppConfig {
    match path {
        Some(path) => AppConfig::load_from_path(path).unwrap_or_else(|e| {
            eprintln!("warning: ignoring config {}: {}", path.display(), e);
            AppConfig::default()
        }),
        None => AppConfig::load_from_default_path().unwrap_or_default(),
    }
}

fn init_logging(level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(level.to_level_filter())
        .parse_default_env()
        .init();
}

fn report_skipped(report: &LoadReport) {
    if report.has_skipped() {
        eprintln!(
            "warning: {} overlay records skipped, {} loaded",
            report.skipped.len(),
            report.loaded
        );
    }
}

fn render(
    config: &AppConfig,
    input: &Path,
    output: &Path,
    mode: FilterMode,
    zoom: Option<u32>,
    trace: bool,
    overlays: Option<&Path>,
) -> Result<(), tracelens::ViewerError> {
    let mut session = ViewerSession::new(config.preferences.clone());
    let size = session.open_file(input)?;
    log::info!("Loaded {:?} ({}x{})", input, size.width, size.height);

    if mode != FilterMode::None {
        session.set_enhanced(true);
        session.set_contrast_mode(mode);
    }
    session.set_trace_enhancement(trace);
    if let Some(zoom) = zoom {
        session.zoom_mut().set_scale(zoom);
    }

    if let Some(path) = overlays {
        let report = session.import_overlays(path)?;
        report_skipped(&report);
    }

    let written = session.export_view(output, overlays.is_some())?;
    println!(
        "Wrote {} ({}x{}, {}, {}%)",
        output.display(),
        written.width,
        written.height,
        mode,
        session.zoom().scale_percent()
    );
    Ok(())
}

fn list_overlays(file: &Path) -> Result<(), tracelens::ViewerError> {
    let (store, report) = OverlayStore::import_from_file(file)?;
    report_skipped(&report);

    println!("{:>3}  {:<16}  {:<28}  Details", "#", "Type", "Position");
    for (index, overlay) in store.iter().enumerate() {
        let (kind, position, details) = overlay.summary();
        println!("{:>3}  {:<16}  {:<28}  {}", index + 1, kind, position, details);
    }
    println!("{} overlays", store.len());
    Ok(())
}

fn show_session(config: &AppConfig, file: Option<&Path>) -> Result<(), tracelens::ViewerError> {
    let Some(path) = file
        .map(Path::to_path_buf)
        .or_else(|| config.session_settings_path())
    else {
        println!("No session settings location is available");
        return Ok(());
    };

    let store = JsonFileStore::open(&path)?;
    let (session, report) = ViewerSession::open(config.preferences.clone(), &store);
    for warning in &report.settings {
        eprintln!("warning: ignored '{}': {}", warning.key, warning.message);
    }
    report_skipped(&report.overlays);

    let pipeline = session.pipeline();
    println!("Session {}", path.display());
    println!(
        "  last file:   {}",
        session
            .last_file()
            .map_or_else(|| "-".to_string(), |p| p.display().to_string())
    );
    println!("  zoom:        {}%", session.zoom().scale_percent());
    println!(
        "  contrast:    {}{}",
        pipeline.mode,
        if pipeline.enabled { "" } else { " (off)" }
    );
    println!("  overlays:    {}", session.overlays().len());
    println!(
        "  positions:   {}",
        session.positions().names().collect::<Vec<_>>().join(", ")
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let level = cli.log_level.unwrap_or(config.preferences.log_level);
    init_logging(level);

    let result = match &cli.command {
        Command::Render {
            input,
            output,
            mode,
            zoom,
            trace,
            overlays,
        } => render(
            &config,
            input,
            &config
                .preferences
                .export_path(&output.clone().unwrap_or_else(|| default_output(input))),
            FilterMode::from(*mode),
            *zoom,
            *trace,
            overlays.as_deref(),
        ),
        Command::Overlays { file } => list_overlays(file),
        Command::Session { file } => show_session(&config, file.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("{:?}", e);
            eprintln!("error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_is_validated() {
        let parse = |level: &str| {
            Cli::try_parse_from(["tracelens", "--log-level", level, "overlays", "a.json"])
        };
        assert_eq!(parse("DEBUG").unwrap().log_level, Some(LogLevel::Debug));
        assert!(parse("loud").is_err());
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output(Path::new("/in/trace.jpg")),
            PathBuf::from("trace-view.png")
        );
        let cli = Cli::try_parse_from(["tracelens", "render", "trace.png"]).unwrap();
        assert!(matches!(cli.command, Command::Render { output: None, .. }));
    }
}
