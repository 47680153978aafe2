//! Tapestry CLI: compose, preview, calibrate and drive an e-paper wall.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tapestry::compose::{render_preview, PreviewStyle};
use tapestry::dispatch::{DispatchParams, Dispatcher, HttpTransport};
use tapestry::marker::{render_detections, OverlayStyle};
use tapestry::{
    calibrate_photo, compose_image, dispatch_jobs, load_json, load_layout, marker_images,
    marker_jobs, open_image, CalibrateConfig, ComposeParams, Layout, LayoutConfig, PanelAddress,
    PanelType,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "tapestry")]
#[command(about = "Compose images across e-paper panel walls and calibrate them from photos")]
#[command(version)]
struct Cli {
    /// Log verbosity (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write one native-resolution tile per panel.
    Compose {
        #[arg(long)]
        layout: PathBuf,
        #[arg(long)]
        image: PathBuf,
        /// Directory for `<address>.png` tiles.
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Render the whole wall, bezels included, as one image.
    Preview {
        #[arg(long)]
        layout: PathBuf,
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 800)]
        max_width: u32,
        #[arg(long, default_value_t = 600)]
        max_height: u32,
    },
    /// Solve panel placements from a photo of the wall showing markers.
    Calibrate {
        /// JSON calibration config; other flags override its fields.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Layout providing the panel-type table.
        #[arg(long)]
        layout: Option<PathBuf>,
        /// Marker edge in mm (default: derived from marker payloads).
        #[arg(long)]
        marker_mm: Option<f64>,
        #[arg(long)]
        default_type: Option<String>,
        /// Report path (default `calibration_report.json`).
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write the proposed layout here.
        #[arg(long)]
        layout_out: Option<PathBuf>,
        /// Write the photo with every detection outlined here.
        #[arg(long)]
        debug_image: Option<PathBuf>,
    },
    /// Render calibration markers; write them to disk and/or show them.
    Markers {
        #[arg(long)]
        layout: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Send the markers to the panels.
        #[arg(long)]
        send: bool,
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
    },
    /// Compose an image and send it to every panel.
    Send {
        #[arg(long)]
        layout: PathBuf,
        #[arg(long)]
        image: PathBuf,
        /// Full refresh before drawing.
        #[arg(long)]
        clear: bool,
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
        /// Write the per-panel outcomes here as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Blank every panel.
    Clear {
        #[arg(long)]
        layout: PathBuf,
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
    },
    /// Ask every panel for its resolution and temperature.
    Probe {
        #[arg(long)]
        layout: PathBuf,
        #[arg(long, default_value_t = 10.0)]
        timeout: f64,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Compose {
            layout,
            image,
            out_dir,
        } => run_compose(&layout, &image, &out_dir),
        Commands::Preview {
            layout,
            image,
            out,
            max_width,
            max_height,
        } => run_preview(&layout, &image, &out, max_width, max_height),
        Commands::Calibrate {
            config,
            photo,
            layout,
            marker_mm,
            default_type,
            out,
            layout_out,
            debug_image,
        } => {
            let mut cfg = match (&config, &photo) {
                (Some(path), _) => CalibrateConfig::load_json(path)?,
                (None, Some(photo)) => CalibrateConfig::new(photo.to_string_lossy()),
                (None, None) => return Err("calibrate needs --config or --photo".into()),
            };
            if let Some(photo) = photo {
                cfg.photo_path = photo.to_string_lossy().into_owned();
            }
            if let Some(layout) = layout {
                cfg.layout_path = Some(layout.to_string_lossy().into_owned());
            }
            if marker_mm.is_some() {
                cfg.marker_size_mm = marker_mm;
            }
            if default_type.is_some() {
                cfg.default_panel_type = default_type;
            }
            if let Some(out) = out {
                cfg.output_path = Some(out.to_string_lossy().into_owned());
            }
            if let Some(layout_out) = layout_out {
                cfg.layout_output_path = Some(layout_out.to_string_lossy().into_owned());
            }
            if let Some(path) = debug_image {
                cfg.debug_image_path = Some(path.to_string_lossy().into_owned());
            }
            run_calibrate(&cfg)
        }
        Commands::Markers {
            layout,
            out_dir,
            send,
            timeout,
        } => run_markers(&layout, out_dir.as_deref(), send, timeout).await,
        Commands::Send {
            layout,
            image,
            clear,
            timeout,
            report,
        } => run_send(&layout, &image, clear, timeout, report.as_deref()).await,
        Commands::Clear { layout, timeout } => run_clear(&layout, timeout).await,
        Commands::Probe { layout, timeout } => run_probe(&layout, timeout).await,
    }
}

fn init_logging(level: &str) -> CliResult<()> {
    let filter = tapestry::core::parse_level(level)?;
    #[cfg(feature = "tracing")]
    tapestry::core::init_tracing(filter, false);
    #[cfg(not(feature = "tracing"))]
    tapestry::core::init_with_level(filter)?;
    Ok(())
}

/// Address as a file name (`host:port` -> `host_port`).
fn tile_name(address: &PanelAddress, ext: &str) -> String {
    format!("{}.{ext}", address.as_str().replace(':', "_"))
}

fn run_compose(layout_path: &Path, image_path: &Path, out_dir: &Path) -> CliResult<()> {
    let layout = load_layout(layout_path)?;
    let img = open_image(image_path)?;
    let composition = compose_image(&layout, &img, ComposeParams::default())?;

    std::fs::create_dir_all(out_dir)?;
    for (address, tile) in &composition.tiles {
        let path = out_dir.join(tile_name(address, "png"));
        tile.image.save(&path)?;
        log::info!(
            "{address}: {}x{} -> {}",
            tile.image.width(),
            tile.image.height(),
            path.display()
        );
    }
    Ok(())
}

fn run_preview(
    layout_path: &Path,
    image_path: &Path,
    out: &Path,
    max_width: u32,
    max_height: u32,
) -> CliResult<()> {
    let layout = load_layout(layout_path)?;
    let img = open_image(image_path)?.to_rgb8();
    let style = PreviewStyle {
        max_width,
        max_height,
        ..PreviewStyle::default()
    };
    let preview = render_preview(&layout, &img, &style)?;
    preview.save(out)?;
    log::info!(
        "preview {}x{} written to {}",
        preview.width(),
        preview.height(),
        out.display()
    );
    for overlap in layout.overlaps() {
        log::warn!(
            "{} and {} overlap by {:.1} mm²",
            overlap.a,
            overlap.b,
            overlap.area_mm2
        );
    }
    Ok(())
}

fn run_calibrate(cfg: &CalibrateConfig) -> CliResult<()> {
    let panel_types: Vec<PanelType> = match &cfg.layout_path {
        Some(path) => load_json::<LayoutConfig>(path)?.panel_types,
        None => Vec::new(),
    };
    let photo = open_image(&cfg.photo_path)?;
    log::info!(
        "photo {}: {}x{}",
        cfg.photo_path,
        photo.width(),
        photo.height()
    );

    let report = calibrate_photo(
        &photo,
        &panel_types,
        cfg.marker_size_mm,
        cfg.default_panel_type.as_deref(),
        &cfg.detect,
    )?;

    for r in &report.calibration.results {
        log::info!(
            "{}: ({:.1}, {:.1}) mm, {}°, confidence {:.2}",
            r.address,
            r.position.x,
            r.position.y,
            r.rotation.degrees(),
            r.confidence
        );
    }
    for d in &report.calibration.diagnostics {
        log::warn!("{}", serde_json::to_string(d)?);
    }

    let out = cfg.output_path();
    report.write_json(&out)?;
    log::info!("report written to {}", out.display());

    if let (Some(path), Some(layout)) = (&cfg.layout_output_path, &report.layout) {
        tapestry::write_json(layout, path)?;
        log::info!("proposed layout written to {path}");
    }
    if let Some(path) = &cfg.debug_image_path {
        let overlay =
            render_detections(&photo.to_rgb8(), &report.detections, &OverlayStyle::default());
        overlay.save(path)?;
        log::info!("detection overlay written to {path}");
    }
    Ok(())
}

fn dispatcher(timeout_s: f64, clear: bool) -> CliResult<Dispatcher<HttpTransport>> {
    let timeout = Duration::try_from_secs_f64(timeout_s)?;
    let transport = HttpTransport::new(timeout.min(Duration::from_secs(5)))?;
    Ok(Dispatcher::new(transport, DispatchParams { timeout, clear }))
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn run_markers(
    layout_path: &Path,
    out_dir: Option<&Path>,
    send: bool,
    timeout: f64,
) -> CliResult<()> {
    let layout = load_layout(layout_path)?;

    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir)?;
        for (address, img) in marker_images(&layout)? {
            let path = dir.join(tile_name(&address, "png"));
            img.save(&path)?;
            log::info!("{address}: marker -> {}", path.display());
        }
    }

    if send {
        let jobs = marker_jobs(&layout)?;
        let report = dispatcher(timeout, true)?
            .dispatch_with_cancel(jobs, ctrl_c())
            .await;
        print_failures(&layout, &report);
    }
    Ok(())
}

async fn run_send(
    layout_path: &Path,
    image_path: &Path,
    clear: bool,
    timeout: f64,
    report_path: Option<&Path>,
) -> CliResult<()> {
    let layout = load_layout(layout_path)?;
    let img = open_image(image_path)?;
    let composition = compose_image(&layout, &img, ComposeParams::default())?;
    let jobs = dispatch_jobs(&layout, &composition)?;

    let report = dispatcher(timeout, clear)?
        .dispatch_with_cancel(jobs, ctrl_c())
        .await;
    print_failures(&layout, &report);
    if let Some(path) = report_path {
        tapestry::write_json(&report, path)?;
    }
    if report.all_delivered() {
        Ok(())
    } else {
        Err(format!("{} of {} panels failed", report.failed(), report.outcomes.len()).into())
    }
}

async fn run_clear(layout_path: &Path, timeout: f64) -> CliResult<()> {
    let layout = load_layout(layout_path)?;
    let addresses: Vec<PanelAddress> = layout.panels().iter().map(|p| p.address.clone()).collect();
    let report = dispatcher(timeout, false)?.clear_all(&addresses).await;
    print_failures(&layout, &report);
    Ok(())
}

async fn run_probe(layout_path: &Path, timeout: f64) -> CliResult<()> {
    let layout = load_layout(layout_path)?;
    let addresses: Vec<PanelAddress> = layout.panels().iter().map(|p| p.address.clone()).collect();
    let infos = dispatcher(timeout, false)?.probe(&addresses).await;

    for (address, info) in &infos {
        match info {
            Ok(info) => {
                let expected = layout.get(address).map(|p| p.native_resolution());
                let matches =
                    expected.is_some_and(|r| r.width == info.width && r.height == info.height);
                println!(
                    "{address}: {} {}x{} {}°C{}",
                    info.screen_model,
                    info.width,
                    info.height,
                    info.temperature,
                    if matches { "" } else { " (resolution differs from layout)" }
                );
            }
            Err(f) => println!("{address}: {}", f.message),
        }
    }
    Ok(())
}

fn print_failures(layout: &Layout, report: &tapestry::DispatchReport) {
    for address in report.failed_addresses() {
        if let Some(tapestry::Outcome::Failed(f)) = report.outcomes.get(address) {
            eprintln!("{address}: {}", f.message);
        }
    }
    println!("{} of {} panels updated", report.delivered(), layout.len());
}
