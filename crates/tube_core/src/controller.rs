use serde_json::{Value, json};
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

use crate::browser::{LaunchOptions, PageSession, SessionLauncher, WebDriverLauncher};
use crate::config::PlayerConfig;
use crate::error::ControlError;
use crate::inference::Frame;
use crate::schedule::{ScheduledTask, Scheduler};
use crate::url_list::UrlList;

/// What the controller believes the page is doing. Transitions are
/// optimistic; the page may disagree until the next refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Opening,
    Playing,
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "Idle",
            SessionState::Opening => "Opening",
            SessionState::Playing => "Playing",
            SessionState::Paused => "Paused",
        })
    }
}

/// Result of [`PlaybackController::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    /// The next list entry was opened.
    Opened(String),
    /// The list was exhausted; the player's own next button was pressed.
    PlayerNext { clicked: bool },
}

/// What a call to [`PlaybackController::tick`] did.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// `Some(showing_ad)` when the ad-skip script ran.
    pub ad_check: Option<bool>,
    pub refreshed: bool,
    pub reloaded: bool,
    pub frame: Option<Frame>,
}

/// Skip buttons and overlay close buttons, newest markup first.
pub const AD_SKIP_SELECTORS: &[&str] = &[
    "button.ytp-skip-ad-button",
    ".ytp-skip-ad-button",
    ".ytp-ad-skip-button-modern",
    ".ytp-ad-skip-button",
    ".ytp-ad-overlay-close-button",
    ".ytp-ad-overlay-close-container",
];

const PLAY_JS: &str = r#"
const v = document.querySelector('video');
if (!v) return false;
const p = v.play();
if (p && typeof p.catch === 'function') p.catch(() => {});
return true;
"#;

const PAUSE_JS: &str = r#"
const v = document.querySelector('video');
if (!v) return false;
v.pause();
return true;
"#;

const IS_PLAYING_JS: &str = r#"
const v = document.querySelector('video');
return !!v && !v.paused && !v.ended;
"#;

const NEXT_BUTTON_JS: &str = r#"
const b = document.querySelector('.ytp-next-button');
if (!b) return false;
b.click();
return true;
"#;

const OBSERVE_JS: &str = r#"
const v = document.querySelector('video');
return { title: document.title, hasVideo: !!v, paused: v ? (v.paused || v.ended) : true };
"#;

const ERROR_OVERLAY_JS: &str = r#"
const e = document.querySelector('.ytp-error');
return !!e && e.offsetParent !== null;
"#;

pub(crate) const SKIP_ADS_JS: &str = r#"
const player = document.querySelector('.html5-video-player');
const video = document.querySelector('video');
const ad = !!(player && player.classList.contains('ad-showing'));
let clicked = 0;
for (const sel of arguments[0]) {
  for (const el of document.querySelectorAll(sel)) {
    if (el.offsetParent === null) continue;
    try { el.click(); clicked++; } catch (_) {}
  }
}
const flag = arguments[1];
if (video) {
  try {
    if (ad) {
      if (!video.muted) { video.muted = true; window[flag] = true; }
      video.playbackRate = 16;
    } else {
      if (video.playbackRate > 2) video.playbackRate = 1;
      if (window[flag]) { video.muted = false; window[flag] = false; }
    }
  } catch (_) {}
}
return { ad: ad, clicked: clicked };
"#;

/// Undoes the ad handling: normal rate, and unmuted if the ad pass muted.
pub(crate) const RESTORE_RATE_JS: &str = r#"
const flag = arguments[0];
const v = document.querySelector('video');
if (v) {
  try {
    v.playbackRate = 1.0;
    if (window[flag]) v.muted = false;
  } catch (_) {}
}
window[flag] = false;
return true;
"#;

/// Page-global set while a video is muted by the ad pass rather than the user.
const AD_MUTED_FLAG: &str = "__tubepilotAdMuted";

/// Normalises `input` and sets `autoplay=1` and `mute=1` exactly once,
/// dropping any values those keys already had.
pub fn with_autoplay_params(input: &str) -> Result<Url, ControlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ControlError::EmptyUrl);
    }
    let invalid = |source| ControlError::InvalidUrl {
        url: trimmed.to_string(),
        source,
    };
    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{trimmed}")).map_err(invalid)?
        }
        Err(e) => return Err(invalid(e)),
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "autoplay" && k != "mute")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(&kept)
        .append_pair("autoplay", "1")
        .append_pair("mute", "1");
    Ok(url)
}

/// Drives one browser session: open, play, pause, next, ad skipping.
///
/// Everything runs on the caller's thread. The periodic work (ad skipping,
/// state refresh, error recovery, frame capture) happens in [`Self::tick`],
/// which the UI calls on every repaint.
pub struct PlaybackController {
    launcher: Box<dyn SessionLauncher>,
    session: Option<Box<dyn PageSession>>,
    options: LaunchOptions,
    state: SessionState,
    current_url: Option<String>,
    title: Option<String>,
    scheduler: Scheduler,
    ad_skip: ScheduledTask,
    refresh: ScheduledTask,
    error_check: ScheduledTask,
    frames: ScheduledTask,
    reload_cooldown: Duration,
    last_reload: Option<Instant>,
}

impl PlaybackController {
    /// Controller backed by a real WebDriver endpoint.
    pub fn webdriver(cfg: &PlayerConfig) -> Self {
        Self::new(cfg, Box::new(WebDriverLauncher))
    }

    pub fn new(cfg: &PlayerConfig, launcher: Box<dyn SessionLauncher>) -> Self {
        let scheduler = Scheduler::new();
        let ad_skip = scheduler.task("ad-skip", cfg.ad_skip_interval(), cfg.auto_skip_ads);
        let refresh = scheduler.task("refresh", cfg.refresh_interval(), true);
        let error_check = scheduler.task("error-check", cfg.error_check_interval(), true);
        let frames = scheduler.task("frames", cfg.frame_interval(), cfg.annotate_frames);
        Self {
            launcher,
            session: None,
            options: LaunchOptions::from_config(cfg),
            state: SessionState::Idle,
            current_url: None,
            title: None,
            scheduler,
            ad_skip,
            refresh,
            error_check,
            frames,
            reload_cooldown: cfg.error_reload_cooldown(),
            last_reload: None,
        }
    }

    /// Takes new intervals right away; launch options apply to the next
    /// browser start.
    pub fn apply_config(&mut self, cfg: &PlayerConfig) {
        self.options = LaunchOptions::from_config(cfg);
        self.ad_skip.set_interval(cfg.ad_skip_interval());
        self.refresh.set_interval(cfg.refresh_interval());
        self.error_check.set_interval(cfg.error_check_interval());
        self.frames.set_interval(cfg.frame_interval());
        self.reload_cooldown = cfg.error_reload_cooldown();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn cached_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn auto_skip_enabled(&self) -> bool {
        self.ad_skip.is_active()
    }

    pub fn annotate_enabled(&self) -> bool {
        self.frames.is_active()
    }

    fn session(&mut self) -> Result<&mut Box<dyn PageSession>, ControlError> {
        self.session.as_mut().ok_or(ControlError::NoSession)
    }

    fn run(&mut self, script: &str, args: Vec<Value>) -> Result<Value, ControlError> {
        self.session()?.execute(script, args)
    }

    /// Launches the browser when needed and navigates to `url` with the
    /// autoplay/mute parameters. On failure the state is left as it was.
    pub fn open(&mut self, url: &str) -> Result<(), ControlError> {
        let target = with_autoplay_params(url)?;
        let previous = self.state;
        self.state = SessionState::Opening;
        match self.navigate_to(&target) {
            Ok(()) => {
                tracing::info!("opened {target}");
                self.state = SessionState::Playing;
                self.current_url = Some(target.into());
                self.title = None;
                self.last_reload = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("opening {target} failed: {e}");
                self.state = previous;
                Err(e)
            }
        }
    }

    fn navigate_to(&mut self, target: &Url) -> Result<(), ControlError> {
        if self.session.is_none() {
            tracing::info!("starting browser via {}", self.options.webdriver_url);
            let session = self.launcher.launch(&self.options)?;
            self.session = Some(session);
        }
        self.session()?.navigate(target.as_str())
    }

    pub fn play(&mut self) -> Result<(), ControlError> {
        self.run(PLAY_JS, Vec::new())?;
        self.state = SessionState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ControlError> {
        self.run(PAUSE_JS, Vec::new())?;
        self.state = SessionState::Paused;
        Ok(())
    }

    pub fn is_playing(&mut self) -> Result<bool, ControlError> {
        Ok(self.run(IS_PLAYING_JS, Vec::new())?.as_bool().unwrap_or(false))
    }

    /// Flips playback based on the page's own `paused` flag and returns
    /// whether it is now playing.
    pub fn toggle_play_pause(&mut self) -> Result<bool, ControlError> {
        if self.is_playing()? {
            self.pause()?;
            Ok(false)
        } else {
            self.play()?;
            Ok(true)
        }
    }

    /// Opens the entry after the list cursor. With nothing left in the list
    /// the player's own next button is clicked instead. The cursor only
    /// moves when the entry actually opened.
    pub fn next(&mut self, list: &mut UrlList) -> Result<NextOutcome, ControlError> {
        let previous = list.selected_index();
        if let Some(url) = list.advance().map(str::to_string) {
            if let Err(e) = self.open(&url) {
                list.restore_cursor(previous);
                return Err(e);
            }
            return Ok(NextOutcome::Opened(url));
        }
        let clicked = self.run(NEXT_BUTTON_JS, Vec::new())?.as_bool().unwrap_or(false);
        if !clicked {
            tracing::debug!("player next button not found");
        }
        Ok(NextOutcome::PlayerNext { clicked })
    }

    /// Enables or disables the ad-skip task. Disabling also puts the
    /// playback rate back to normal and unmutes a video the ad pass muted.
    pub fn set_auto_skip(&mut self, enabled: bool) {
        if enabled {
            self.ad_skip.restart();
            return;
        }
        self.ad_skip.cancel();
        if self.session.is_some()
            && let Err(e) = self.run(RESTORE_RATE_JS, vec![json!(AD_MUTED_FLAG)])
        {
            tracing::debug!("restoring playback rate failed: {e}");
        }
    }

    pub fn set_annotate(&mut self, enabled: bool) {
        if enabled {
            self.frames.restart();
        } else {
            self.frames.cancel();
        }
    }

    /// One ad-skip pass: click known skip/close controls and fast-forward
    /// while an ad is showing. Returns whether an ad was showing.
    pub fn skip_ads_once(&mut self) -> Result<bool, ControlError> {
        let selectors = json!(AD_SKIP_SELECTORS);
        let result = self.run(SKIP_ADS_JS, vec![selectors, json!(AD_MUTED_FLAG)])?;
        let clicked = result.get("clicked").and_then(Value::as_u64).unwrap_or(0);
        if clicked > 0 {
            tracing::debug!("clicked {clicked} ad control(s)");
        }
        Ok(result.get("ad").and_then(Value::as_bool).unwrap_or(false))
    }

    pub fn title(&mut self) -> Result<String, ControlError> {
        let title = self.session()?.title()?;
        Ok(title.trim().to_string())
    }

    /// Reads title and paused flag from the page and updates the believed
    /// state. Idle/Opening are never overwritten.
    pub fn refresh(&mut self) -> Result<(), ControlError> {
        let observed = self.run(OBSERVE_JS, Vec::new())?;
        if let Some(title) = observed.get("title").and_then(Value::as_str) {
            let title = title.trim();
            self.title = (!title.is_empty()).then(|| title.to_string());
        }
        let has_video = observed
            .get("hasVideo")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if has_video && matches!(self.state, SessionState::Playing | SessionState::Paused) {
            let paused = observed
                .get("paused")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            self.state = if paused {
                SessionState::Paused
            } else {
                SessionState::Playing
            };
        }
        Ok(())
    }

    /// Reloads the current URL when the player shows its error overlay,
    /// at most once per cooldown. Returns whether a reload happened.
    pub fn recover_errors(&mut self, now: Instant) -> Result<bool, ControlError> {
        let Some(url) = self.current_url.clone() else {
            return Ok(false);
        };
        if let Some(last) = self.last_reload
            && now.saturating_duration_since(last) < self.reload_cooldown
        {
            return Ok(false);
        }
        let overlay = self.run(ERROR_OVERLAY_JS, Vec::new())?.as_bool().unwrap_or(false);
        if !overlay {
            return Ok(false);
        }
        tracing::warn!("player error overlay detected; reloading {url}");
        self.last_reload = Some(now);
        self.session()?.navigate(&url)?;
        Ok(true)
    }

    /// Screenshot of the `<video>` element as an RGB frame.
    pub fn capture_frame(&mut self) -> Result<Frame, ControlError> {
        let png = self.session()?.screenshot_video()?;
        Frame::decode(&png).map_err(|e| ControlError::Capture(e.to_string()))
    }

    /// Runs every scheduled task that is due. Failures are logged and
    /// swallowed; page markup changes simply make the tasks do nothing.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.session.is_none() {
            return outcome;
        }
        if self.ad_skip.poll(now) {
            match self.skip_ads_once() {
                Ok(ad) => outcome.ad_check = Some(ad),
                Err(e) => tracing::debug!("ad-skip tick failed: {e}"),
            }
        }
        if self.refresh.poll(now) {
            match self.refresh() {
                Ok(()) => outcome.refreshed = true,
                Err(e) => tracing::debug!("refresh tick failed: {e}"),
            }
        }
        if self.error_check.poll(now) {
            match self.recover_errors(now) {
                Ok(reloaded) => outcome.reloaded = reloaded,
                Err(e) => tracing::warn!("error recovery failed: {e}"),
            }
        }
        if self.frames.poll(now) {
            match self.capture_frame() {
                Ok(frame) => outcome.frame = Some(frame),
                Err(e) => tracing::debug!("frame capture failed: {e}"),
            }
        }
        outcome
    }

    /// How long the UI may sleep before the next task is due.
    pub fn next_wakeup(&self, now: Instant) -> Option<Duration> {
        if self.session.is_none() {
            return None;
        }
        [&self.ad_skip, &self.refresh, &self.error_check, &self.frames]
            .into_iter()
            .filter_map(|task| task.time_until_due(now))
            .min()
    }

    /// Ends the browser session. The controller can open a new one later.
    pub fn close(&mut self) -> Result<(), ControlError> {
        self.state = SessionState::Idle;
        self.title = None;
        self.current_url = None;
        match self.session.take() {
            Some(mut session) => {
                tracing::info!("closing browser session");
                session.close()
            }
            None => Ok(()),
        }
    }

    /// Cancels every scheduled task for good and closes the session.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
        if let Err(e) = self.close() {
            tracing::warn!("closing browser failed: {e}");
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
