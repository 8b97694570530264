//! Settings panel for the browser, the timers and the classifier.

use super::{Panel, UiApp};
use eframe::egui;
use std::path::PathBuf;
use tube_core::AppConfig;

/// Editable copy of the config; applied only on "Save".
#[derive(Debug, Clone, PartialEq)]
pub(super) struct SettingsDraft {
    config: AppConfig,
    proxy: String,
    profile: String,
    labels_path: String,
}

impl SettingsDraft {
    pub(super) fn from_config(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            proxy: config.player.proxy.clone().unwrap_or_default(),
            profile: config.player.profile.clone().unwrap_or_default(),
            labels_path: config
                .classifier
                .labels_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// The config this draft describes; blank text fields become `None`.
    pub(super) fn to_config(&self) -> AppConfig {
        let optional = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        let mut config = self.config.clone();
        config.player.proxy = optional(&self.proxy);
        config.player.profile = optional(&self.profile);
        config.classifier.labels_path = optional(&self.labels_path).map(PathBuf::from);
        config
    }
}

impl UiApp {
    /// Renders the settings screen and applies it on save.
    pub(super) fn render_settings_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Browser");
        ui.add_space(8.0);
        let player = &mut self.draft.config.player;
        egui::Grid::new("browser-settings")
            .num_columns(2)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                ui.label("WebDriver URL");
                ui.text_edit_singleline(&mut player.webdriver_url);
                ui.end_row();

                ui.label("Start chromedriver");
                ui.checkbox(&mut player.spawn_chromedriver, "when nothing answers");
                ui.end_row();

                ui.label("chromedriver binary");
                ui.text_edit_singleline(&mut player.chromedriver_path);
                ui.end_row();

                ui.label("Proxy");
                ui.add(
                    egui::TextEdit::singleline(&mut self.draft.proxy)
                        .hint_text("host:port or socks5://host:port"),
                );
                ui.end_row();

                ui.label("Profile");
                ui.add(
                    egui::TextEdit::singleline(&mut self.draft.profile)
                        .hint_text("profile name (folder)"),
                );
                ui.end_row();

                ui.label("Connect timeout (s)");
                ui.add(egui::DragValue::new(&mut player.connect_timeout_secs).range(1..=300));
                ui.end_row();

                ui.label("Page load timeout (s)");
                ui.add(egui::DragValue::new(&mut player.page_load_timeout_secs).range(1..=300));
                ui.end_row();
            });

        ui.add_space(12.0);
        ui.heading("Timers");
        ui.add_space(8.0);
        egui::Grid::new("timer-settings")
            .num_columns(2)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                ui.label("Ad-skip interval (ms)");
                ui.add(
                    egui::DragValue::new(&mut player.ad_skip_interval_ms)
                        .range(100..=10_000)
                        .speed(10),
                );
                ui.end_row();

                ui.label("Title refresh (ms)");
                ui.add(
                    egui::DragValue::new(&mut player.refresh_interval_ms)
                        .range(250..=60_000)
                        .speed(10),
                );
                ui.end_row();

                ui.label("Error check (ms)");
                ui.add(
                    egui::DragValue::new(&mut player.error_check_interval_ms)
                        .range(500..=60_000)
                        .speed(10),
                );
                ui.end_row();

                ui.label("Reload cooldown (s)");
                ui.add(egui::DragValue::new(&mut player.error_reload_cooldown_secs).range(1..=600));
                ui.end_row();

                ui.label("Frame annotation (ms)");
                ui.add(
                    egui::DragValue::new(&mut player.frame_interval_ms)
                        .range(500..=60_000)
                        .speed(50),
                );
                ui.end_row();
            });

        ui.add_space(12.0);
        ui.heading("Classifier");
        ui.add_space(8.0);
        let classifier = &mut self.draft.config.classifier;
        egui::Grid::new("classifier-settings")
            .num_columns(2)
            .spacing([12.0, 6.0])
            .show(ui, |ui| {
                ui.label("Weights URL");
                ui.text_edit_singleline(&mut classifier.weights_url);
                ui.end_row();

                ui.label("Labels file");
                ui.add(
                    egui::TextEdit::singleline(&mut self.draft.labels_path)
                        .hint_text("one class name per line"),
                );
                ui.end_row();

                ui.label("Input size");
                ui.add(egui::DragValue::new(&mut classifier.input_size).range(32..=512));
                ui.end_row();
            });
        ui.label(format!(
            "Weights are cached at {}",
            self.draft.config.classifier.weights_path.display()
        ));

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            if ui.button("Save").clicked() {
                self.apply_settings();
            }
            if ui.button("Reset to defaults").clicked() {
                let defaults = AppConfig::with_data_dir(&self.paths.data_dir);
                self.draft = SettingsDraft::from_config(&defaults);
            }
            if ui.button("Discard changes").clicked() {
                self.draft = SettingsDraft::from_config(&self.config);
            }
        });

        ui.add_space(16.0);
        ui.separator();
        ui.label(format!("App version: {}", self.app_version));
        ui.label(format!("Config file: {}", self.paths.config_file.display()));
    }

    /// Saves the draft together with the toggles from the player row, which
    /// may have changed since the draft was taken.
    fn apply_settings(&mut self) {
        let mut config = self.draft.to_config();
        config.player.auto_skip_ads = self.auto_skip;
        config.player.annotate_frames = self.annotate;
        if config.classifier != self.config.classifier {
            self.classifier = None;
            self.classifier_failed = false;
        }
        self.controller.apply_config(&config.player);
        self.status = match config.save(&self.paths.config_file) {
            Ok(()) => format!("Settings saved to {}", self.paths.config_file.display()),
            Err(e) => {
                tracing::warn!("saving settings failed: {e}");
                format!("Settings applied but not saved: {e}")
            }
        };
        self.draft = SettingsDraft::from_config(&config);
        self.config = config;
        self.panel = Panel::Player;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::AppPaths;

    #[test]
    fn blank_fields_become_none() {
        let mut config = AppConfig::default();
        config.player.proxy = Some("127.0.0.1:8080".into());
        let mut draft = SettingsDraft::from_config(&config);
        assert_eq!(draft.proxy, "127.0.0.1:8080");

        draft.proxy = "   ".into();
        draft.profile = " work ".into();
        draft.labels_path = "labels.txt".into();
        let edited = draft.to_config();
        assert_eq!(edited.player.proxy, None);
        assert_eq!(edited.player.profile.as_deref(), Some("work"));
        assert_eq!(
            edited.classifier.labels_path,
            Some(PathBuf::from("labels.txt"))
        );
    }

    #[test]
    fn untouched_draft_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::with_data_dir(dir.path());
        assert_eq!(SettingsDraft::from_config(&config).to_config(), config);
    }

    #[test]
    fn saving_settings_keeps_live_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path(), dir.path());
        let config = AppConfig::with_data_dir(&paths.data_dir);
        let auto_skip = config.player.auto_skip_ads;
        let annotate = config.player.annotate_frames;
        let mut app = UiApp::new(config, paths.clone(), None);

        app.set_auto_skip(!auto_skip);
        app.set_annotate(!annotate);
        app.draft.profile = "work".into();
        app.apply_settings();

        let saved = AppConfig::read_path(&paths.config_file).unwrap();
        assert_eq!(saved.player.auto_skip_ads, !auto_skip);
        assert_eq!(saved.player.annotate_frames, !annotate);
        assert_eq!(saved.player.profile.as_deref(), Some("work"));
        assert_eq!(app.config, saved);
        assert_eq!(app.draft.to_config(), saved);
    }
}
