//! Window shell: owns the controller, the URL list and the classifier, and
//! turns button clicks into controller calls.

use eframe::{App, Frame, egui};
use std::path::Path;
use std::time::{Duration, Instant};
use tube_core::{
    AppConfig, FrameClassifier, NextOutcome, PlaybackController, Prediction, UrlList,
};

use crate::paths::AppPaths;

mod player;
mod settings;

const THUMB_WIDTH: u32 = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Panel {
    Player,
    Settings,
}

pub struct UiApp {
    config: AppConfig,
    paths: AppPaths,
    controller: PlaybackController,
    list: UrlList,
    url_input: String,
    status: String,
    panel: Panel,
    auto_skip: bool,
    annotate: bool,
    classifier: Option<FrameClassifier>,
    classifier_failed: bool,
    annotation: Option<Prediction>,
    frame_thumb: Option<egui::TextureHandle>,
    auto_close_at: Option<Instant>,
    draft: settings::SettingsDraft,
    app_version: &'static str,
}

impl UiApp {
    pub fn new(config: AppConfig, paths: AppPaths, auto_close: Option<Duration>) -> Self {
        let controller = PlaybackController::webdriver(&config.player);
        let draft = settings::SettingsDraft::from_config(&config);
        Self {
            auto_skip: config.player.auto_skip_ads,
            annotate: config.player.annotate_frames,
            config,
            paths,
            controller,
            list: UrlList::new(),
            url_input: String::new(),
            status: "Ready".to_string(),
            panel: Panel::Player,
            classifier: None,
            classifier_failed: false,
            annotation: None,
            frame_thumb: None,
            auto_close_at: auto_close.map(|d| Instant::now() + d),
            draft,
            app_version: env!("TUBEPILOT_VERSION"),
        }
    }

    fn import_list(&mut self, path: &Path) {
        match self.list.import_file(path) {
            Ok(added) => {
                self.status = format!("Imported {added} URLs from {}", path.display());
            }
            Err(e) => {
                tracing::warn!("{e:#}");
                self.status = format!("Import failed: {e:#}");
            }
        }
    }

    /// Typed URL first, then the selected list entry.
    fn current_url(&self) -> Option<String> {
        let typed = self.url_input.trim();
        if !typed.is_empty() {
            return Some(typed.to_string());
        }
        self.list.selected().map(str::to_string)
    }

    fn open_current(&mut self) {
        let Some(url) = self.current_url() else {
            self.status = "No URL selected or entered".to_string();
            return;
        };
        self.status = match self.controller.open(&url) {
            Ok(()) => "Opened in browser".to_string(),
            Err(e) => format!("Open failed: {e}"),
        };
    }

    fn open_entry(&mut self, index: usize) {
        self.list.select(index);
        self.url_input.clear();
        self.open_current();
    }

    fn toggle_play_pause(&mut self) {
        self.status = match self.controller.toggle_play_pause() {
            Ok(true) => "Play".to_string(),
            Ok(false) => "Pause".to_string(),
            Err(e) => {
                tracing::warn!("toggle failed: {e}");
                format!("Play/pause failed: {e}")
            }
        };
    }

    fn play(&mut self) {
        self.status = match self.controller.play() {
            Ok(()) => "Play".to_string(),
            Err(e) => format!("Play failed: {e}"),
        };
    }

    fn pause(&mut self) {
        self.status = match self.controller.pause() {
            Ok(()) => "Pause".to_string(),
            Err(e) => format!("Pause failed: {e}"),
        };
    }

    fn next(&mut self) {
        self.status = match self.controller.next(&mut self.list) {
            Ok(NextOutcome::Opened(url)) => format!("Next: {url}"),
            Ok(NextOutcome::PlayerNext { clicked: true }) => "Next".to_string(),
            Ok(NextOutcome::PlayerNext { clicked: false }) => {
                "End of list; player has no next button".to_string()
            }
            Err(e) => format!("Next failed: {e}"),
        };
    }

    fn close_session(&mut self) {
        self.status = match self.controller.close() {
            Ok(()) => "Browser closed".to_string(),
            Err(e) => format!("Close failed: {e}"),
        };
        self.annotation = None;
        self.frame_thumb = None;
    }

    fn set_auto_skip(&mut self, enabled: bool) {
        self.auto_skip = enabled;
        self.controller.set_auto_skip(enabled);
    }

    fn set_annotate(&mut self, enabled: bool) {
        self.annotate = enabled;
        self.controller.set_annotate(enabled);
        if !enabled {
            self.annotation = None;
        }
    }

    /// Loads the model on first use. A failure disables annotation.
    fn classifier(&mut self) -> Option<&FrameClassifier> {
        if self.classifier.is_none() && !self.classifier_failed {
            self.status = "Loading classifier...".to_string();
            match FrameClassifier::load(&self.config.classifier) {
                Ok(classifier) => {
                    tracing::info!("classifier ready");
                    self.classifier = Some(classifier);
                }
                Err(e) => {
                    tracing::warn!("classifier unavailable: {e}");
                    self.status = format!("Classifier unavailable: {e}");
                    self.classifier_failed = true;
                    self.set_annotate(false);
                }
            }
        }
        self.classifier.as_ref()
    }

    fn annotate_frame(&mut self, ctx: &egui::Context, frame: tube_core::Frame) {
        self.frame_thumb = thumbnail(&frame).map(|image| {
            ctx.load_texture("last-frame", image, egui::TextureOptions::LINEAR)
        });
        let Some(classifier) = self.classifier() else {
            return;
        };
        match classifier.predict(&frame) {
            Ok(prediction) => {
                tracing::debug!("frame annotated: {prediction}");
                self.annotation = Some(prediction);
            }
            Err(e) => tracing::warn!("prediction failed: {e}"),
        }
    }

    fn run_scheduled(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        let outcome = self.controller.tick(now);
        if outcome.reloaded {
            self.status = "Player error; page reloaded".to_string();
        }
        if let Some(frame) = outcome.frame {
            self.annotate_frame(ctx, frame);
        }
        if let Some(wait) = self.controller.next_wakeup(now) {
            ctx.request_repaint_after(wait.max(Duration::from_millis(50)));
        }

        if let Some(at) = self.auto_close_at {
            if now >= at {
                tracing::info!("auto-close timer elapsed");
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            } else {
                ctx.request_repaint_after(at - now);
            }
        }
    }
}

/// Scales a frame down to `THUMB_WIDTH` keeping its aspect ratio.
fn thumbnail(frame: &tube_core::Frame) -> Option<egui::ColorImage> {
    let img = image::RgbImage::from_raw(
        frame.width as u32,
        frame.height as u32,
        frame.data.clone(),
    )?;
    let width = THUMB_WIDTH.min(img.width()).max(1);
    let height = (img.height() * width / img.width().max(1)).max(1);
    let thumb = image::imageops::thumbnail(&img, width, height);
    let size = [thumb.width() as usize, thumb.height() as usize];
    Some(egui::ColorImage::from_rgb(size, thumb.as_raw()))
}

impl App for UiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            self.controller.shutdown();
        }
        self.run_scheduled(ctx);

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.panel, Panel::Player, "Player");
                ui.selectable_value(&mut self.panel, Panel::Settings, "Settings");
            });
            if self.panel == Panel::Player {
                self.render_controls(ui);
            }
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            self.render_status_bar(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.panel {
            Panel::Player => self.render_list(ui),
            Panel::Settings => self.render_settings_panel(ui),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(640, 360, [192, 108])]
    #[case(100, 50, [100, 50])]
    #[case(1, 1, [1, 1])]
    fn thumbnail_keeps_aspect_ratio(
        #[case] width: usize,
        #[case] height: usize,
        #[case] expected: [usize; 2],
    ) {
        let frame = tube_core::Frame::zeros(width, height);
        let image = thumbnail(&frame).unwrap();
        assert_eq!(image.size, expected);
    }

    #[test]
    fn thumbnail_of_malformed_frame_is_none() {
        let frame = tube_core::Frame {
            width: 4,
            height: 4,
            data: vec![0; 3],
        };
        assert!(thumbnail(&frame).is_none());
    }
}
