use anyhow::anyhow;
use clap::Parser;
use eframe::{NativeOptions, egui};
use std::process::ExitCode;
use std::time::Duration;

mod app;
mod paths;

use app::UiApp;
use paths::AppPaths;
use tube_core::AppConfig;

/// Plays YouTube URLs in a driven Chrome window.
#[derive(Debug, Parser)]
#[command(name = "TubePilot", version = env!("TUBEPILOT_VERSION"))]
struct Cli {
    /// Close the window after N milliseconds (smoke testing).
    #[arg(long, value_name = "N")]
    auto_close_ms: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:?}");
            eprintln!("Application stopped with error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = AppPaths::resolve();
    let fallback = AppConfig::with_data_dir(&paths.data_dir);
    let config = match AppConfig::load_or(&paths.config_file, fallback.clone()) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("ignoring unreadable config: {e}");
            fallback
        }
    };
    let auto_close = cli
        .auto_close_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis);

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([900.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "TubePilot",
        options,
        Box::new(move |_cc| {
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(Box::new(UiApp::new(
                config, paths, auto_close,
            )))
        }),
    )
    .map_err(|e| anyhow!("window loop failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_auto_close() {
        let cli = Cli::try_parse_from(["TubePilot", "--auto-close-ms", "1500"]).unwrap();
        assert_eq!(cli.auto_close_ms, Some(1500));
    }

    #[test]
    fn cli_rejects_unknown_flags() {
        assert!(Cli::try_parse_from(["TubePilot", "--headless"]).is_err());
        assert!(Cli::try_parse_from(["TubePilot", "--auto-close-ms", "soon"]).is_err());
    }
}
