use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use widget_placement::{
    default_artifact_path, default_config_path, Config, Dispatcher, Footprint, PlacementArtifact,
    SourceFingerprint,
};

#[derive(Parser)]
#[command(
    name = "widget-placement",
    about = "Find the calmest, best-composed spot on a wallpaper for a fixed-size widget",
    version,
    after_help = "Simple usage: widget-placement <image>  (analyze and write the placement artifact)\n\n\
                  The artifact is read by the desktop clock overlay; see --output."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Wallpaper image to analyze
    image: PathBuf,

    /// Configuration file (default: $XDG_CONFIG_HOME/hypr/empty_area/config.conf)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Artifact path (default: $XDG_CONFIG_HOME/hypr/colorgen/empty_areas.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override ALGORITHM from the configuration (original, fast, ultra_fast)
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Widget width in pixels
    #[arg(long, default_value = "280")]
    width: u32,

    /// Widget height in pixels
    #[arg(long, default_value = "120")]
    height: u32,

    /// Minimum distance between the widget and the screen edge
    #[arg(long, default_value = "50")]
    margin: u32,

    /// Print the result without writing the artifact
    #[arg(long)]
    no_write: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    // Config warnings are logged before the final level is known.
    let early = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(if cli.quiet { "error" } else { "warn" }))
        .finish();
    let loaded = tracing::subscriber::with_default(early, || Config::load(&config_path));
    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: Failed to read {}: {e}", config_path.display());
            process::exit(1);
        }
    };
    if let Some(algorithm) = &cli.algorithm {
        config.algorithm.clone_from(algorithm);
    }

    let level = if cli.quiet {
        "error"
    } else if cli.verbose || config.debug_output {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(level))
        .init();

    let footprint = Footprint {
        width: cli.width,
        height: cli.height,
        margin: cli.margin,
    };
    let dispatcher = Dispatcher::new(config, footprint);

    let tier = match dispatcher.tier() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let source = match SourceFingerprint::of(&cli.image, tier, &dispatcher.options()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let output = cli.output.clone().unwrap_or_else(default_artifact_path);

    if dispatcher.config().position_caching {
        if let Some(cached) = PlacementArtifact::load_cached(&output, &source) {
            if !cli.quiet {
                eprintln!("[CACHED] {}", display_name(&cli.image));
            }
            emit(&cached);
            return;
        }
    }

    let analysis = match dispatcher.analyze_path(&cli.image) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if dispatcher.config().save_debug_images {
        let dir = output.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let stem = cli
            .image
            .file_stem()
            .map_or_else(|| "wallpaper".to_string(), |s| s.to_string_lossy().to_string());
        match analysis.save_debug_images(&dir, &stem) {
            Ok(paths) => {
                for p in paths {
                    tracing::debug!("debug image: {}", p.display());
                }
            }
            Err(e) => tracing::warn!("could not save debug images: {e}"),
        }
    }

    let artifact = PlacementArtifact {
        source,
        result: analysis.result,
    };

    if !cli.no_write {
        if let Err(e) = artifact.write(&output) {
            eprintln!("Error: Failed to write {}: {e}", output.display());
            process::exit(1);
        }
    }

    if !cli.quiet {
        let (x, y) = artifact.result.center;
        eprintln!(
            "[OK] {} ({tier}): center ({x}, {y}), square {}",
            display_name(&cli.image),
            artifact.result.square_size
        );
    }
    emit(&artifact);
}

/// Print the debug block followed by the JSON document.
fn emit(artifact: &PlacementArtifact) {
    let json = match artifact.to_json() {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    print!("{}", artifact.result.to_debug_text());
    println!("--- JSON ---");
    println!("{json}");
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
