//! Playback controls, URL list and status bar.

use super::UiApp;
use eframe::egui;
use rfd::FileDialog;

impl UiApp {
    pub(super) fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let input = ui.add(
                egui::TextEdit::singleline(&mut self.url_input)
                    .hint_text("Enter YouTube URL...")
                    .desired_width(320.0),
            );
            if input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                self.open_current();
            }

            if ui.button("Add").clicked() {
                if self.list.push(&self.url_input) {
                    self.url_input.clear();
                } else {
                    self.status = "Nothing to add".to_string();
                }
            }

            if ui.button("Import list...").clicked()
                && let Some(path) = FileDialog::new()
                    .add_filter("Text files", &["txt"])
                    .add_filter("All files", &["*"])
                    .set_directory(".")
                    .pick_file()
            {
                self.import_list(&path);
            }

            if ui.button("Open").clicked() {
                self.open_current();
            }

            let live = self.controller.has_session();
            if ui.add_enabled(live, egui::Button::new("Play")).clicked() {
                self.play();
            }
            if ui.add_enabled(live, egui::Button::new("Pause")).clicked() {
                self.pause();
            }
            if ui
                .add_enabled(live, egui::Button::new("Play/Pause"))
                .clicked()
            {
                self.toggle_play_pause();
            }
            if ui.add_enabled(live, egui::Button::new("Next")).clicked() {
                self.next();
            }
            if ui.add_enabled(live, egui::Button::new("Close")).clicked() {
                self.close_session();
            }
        });

        ui.horizontal(|ui| {
            let mut auto_skip = self.auto_skip;
            if ui.checkbox(&mut auto_skip, "Auto-skip ads").changed() {
                self.set_auto_skip(auto_skip);
            }
            let mut annotate = self.annotate;
            if ui.checkbox(&mut annotate, "Annotate frames").changed() {
                if annotate {
                    self.classifier_failed = false;
                }
                self.set_annotate(annotate);
            }
        });
    }

    pub(super) fn render_list(&mut self, ui: &mut egui::Ui) {
        if self.list.is_empty() {
            ui.heading("No URLs yet");
            ui.label("Type a URL and press Add, or import a text file with one URL per line.");
            return;
        }

        let mut clicked = None;
        let mut opened = None;
        let mut removed = None;
        ui.horizontal(|ui| {
            if ui
                .add_enabled(
                    self.list.selected_index().is_some(),
                    egui::Button::new("Remove selected"),
                )
                .clicked()
            {
                removed = self.list.selected_index();
            }
            if ui.button("Clear list").clicked() {
                self.list.clear();
                self.status = "List cleared".to_string();
            }
        });
        ui.add_space(6.0);

        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                for (i, url) in self.list.entries().iter().enumerate() {
                    let selected = self.list.selected_index() == Some(i);
                    let resp = ui.selectable_label(selected, url);
                    if resp.double_clicked() {
                        opened = Some(i);
                    } else if resp.clicked() {
                        clicked = Some(i);
                    }
                }
            });

        if let Some(i) = clicked {
            self.list.select(i);
        }
        if let Some(i) = opened {
            self.open_entry(i);
        }
        if let Some(i) = removed
            && let Some(url) = self.list.remove(i)
        {
            self.status = format!("Removed {url}");
        }
    }

    pub(super) fn render_status_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label(&self.status);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let (pos, total) = self.list.position();
                let title = self.controller.cached_title().unwrap_or("-");
                ui.label(format!(
                    "{}: {title}   {pos}/{total}",
                    self.controller.state()
                ));
                if let Some(prediction) = &self.annotation {
                    ui.separator();
                    ui.label(format!("Frame: {prediction}"));
                }
            });
        });
        if let Some(tex) = &self.frame_thumb {
            let size = tex.size_vec2();
            ui.add(egui::Image::new((tex.id(), size)));
        }
    }
}
