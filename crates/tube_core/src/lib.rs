//! Core of TubePilot: the URL list, the browser-driving playback controller,
//! its interval tasks, the frame classifier and the configuration file.

pub mod browser;
pub mod config;
pub mod controller;
pub mod error;
pub mod inference;
pub mod schedule;
pub mod url_list;

pub use browser::{LaunchOptions, PageSession, SessionLauncher, WebDriverLauncher};
pub use config::{AppConfig, PlayerConfig};
pub use controller::{NextOutcome, PlaybackController, SessionState, TickOutcome};
pub use error::{ConfigError, ControlError, InferenceError};
pub use inference::{ClassifierConfig, Frame, FrameClassifier, Prediction};
pub use schedule::{ScheduledTask, Scheduler};
pub use url_list::UrlList;
