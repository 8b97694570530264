//! WebDriver plumbing behind the playback controller.
//!
//! The controller only talks to [`PageSession`] / [`SessionLauncher`]; the
//! `fantoccini` implementation below owns a current-thread Tokio runtime and
//! blocks the caller on every command.

use fantoccini::wd::Capabilities;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Value, json};
use std::future::Future;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::runtime::Runtime;
use url::Url;

use crate::config::PlayerConfig;
use crate::error::ControlError;

/// One live page in a driven browser.
pub trait PageSession {
    fn navigate(&mut self, url: &str) -> Result<(), ControlError>;
    /// Runs `script` as a function body; `arguments[i]` maps to `args[i]`.
    fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value, ControlError>;
    fn title(&mut self) -> Result<String, ControlError>;
    /// Encoded (PNG) screenshot of the page's `<video>` element.
    fn screenshot_video(&mut self) -> Result<Vec<u8>, ControlError>;
    fn close(&mut self) -> Result<(), ControlError>;
}

/// Starts or attaches to a browser and hands back a page session.
pub trait SessionLauncher {
    fn launch(&mut self, options: &LaunchOptions) -> Result<Box<dyn PageSession>, ControlError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub webdriver_url: String,
    pub spawn_chromedriver: bool,
    pub chromedriver_path: String,
    pub proxy: Option<String>,
    pub profile_dir: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub page_load_timeout: Duration,
}

impl LaunchOptions {
    pub fn from_config(cfg: &PlayerConfig) -> Self {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            webdriver_url: cfg.webdriver_url.clone(),
            spawn_chromedriver: cfg.spawn_chromedriver,
            chromedriver_path: cfg.chromedriver_path.clone(),
            proxy: non_empty(&cfg.proxy),
            profile_dir: non_empty(&cfg.profile)
                .map(|name| cfg.profiles_dir.join(sanitize_profile_name(&name))),
            connect_timeout: cfg.connect_timeout(),
            page_load_timeout: cfg.page_load_timeout(),
        }
    }

    /// Chrome capabilities: a visible window that may autoplay.
    pub fn capabilities(&self) -> Capabilities {
        let mut args = vec![
            "--start-maximized".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--autoplay-policy=no-user-gesture-required".to_string(),
        ];
        if let Some(proxy) = &self.proxy {
            args.push(format!("--proxy-server={proxy}"));
        }
        if let Some(dir) = &self.profile_dir {
            args.push(format!("--user-data-dir={}", dir.display()));
        }
        let caps = json!({
            "browserName": "chrome",
            "goog:chromeOptions": {
                "args": args,
                "excludeSwitches": ["enable-logging"]
            }
        });
        match caps {
            Value::Object(map) => map,
            _ => Capabilities::new(),
        }
    }

    fn driver_port(&self) -> u16 {
        Url::parse(&self.webdriver_url)
            .ok()
            .and_then(|u| u.port_or_known_default())
            .unwrap_or(9515)
    }
}

/// Maps a free-form profile name onto `[A-Za-z0-9._-]`, collapsing every run
/// of other characters into one `_`.
pub fn sanitize_profile_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    if out.is_empty() || out.chars().all(|c| c == '.') {
        out = "default".to_string();
    }
    out
}

/// Launches Chrome sessions through a W3C WebDriver endpoint.
#[derive(Debug, Default)]
pub struct WebDriverLauncher;

impl SessionLauncher for WebDriverLauncher {
    fn launch(&mut self, options: &LaunchOptions) -> Result<Box<dyn PageSession>, ControlError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ControlError::Launch(format!("tokio runtime: {e}")))?;
        let caps = options.capabilities();

        let mut driver = None;
        let client = match runtime.block_on(connect(options, caps.clone())) {
            Ok(client) => client,
            Err(first) if options.spawn_chromedriver => {
                tracing::warn!(
                    "webdriver connect failed ({first}); starting {}",
                    options.chromedriver_path
                );
                let mut child = Command::new(&options.chromedriver_path)
                    .arg(format!("--port={}", options.driver_port()))
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|e| {
                        ControlError::Launch(format!(
                            "cannot start {}: {e}",
                            options.chromedriver_path
                        ))
                    })?;
                match runtime.block_on(connect_with_retry(options, caps)) {
                    Ok(client) => {
                        driver = Some(child);
                        client
                    }
                    Err(e) => {
                        let _ = child.kill();
                        return Err(e);
                    }
                }
            }
            Err(e) => return Err(e),
        };
        tracing::info!("webdriver session ready at {}", options.webdriver_url);

        Ok(Box::new(WebDriverSession {
            runtime,
            client,
            driver,
            page_load_timeout: options.page_load_timeout,
            closed: false,
        }))
    }
}

async fn connect(options: &LaunchOptions, caps: Capabilities) -> Result<Client, ControlError> {
    let mut builder = ClientBuilder::native();
    builder.capabilities(caps);
    match tokio::time::timeout(
        options.connect_timeout,
        builder.connect(&options.webdriver_url),
    )
    .await
    {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(e)) => Err(ControlError::Launch(e.to_string())),
        Err(_) => Err(ControlError::Timeout {
            what: "webdriver connect",
            after: options.connect_timeout,
        }),
    }
}

async fn connect_with_retry(
    options: &LaunchOptions,
    caps: Capabilities,
) -> Result<Client, ControlError> {
    let mut last = ControlError::Launch("chromedriver did not answer".to_string());
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        match connect(options, caps.clone()).await {
            Ok(client) => return Ok(client),
            Err(e) => last = e,
        }
    }
    Err(last)
}

/// A page in a Chrome window driven through `fantoccini`.
pub struct WebDriverSession {
    runtime: Runtime,
    client: Client,
    driver: Option<Child>,
    page_load_timeout: Duration,
    closed: bool,
}

impl WebDriverSession {
    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

impl PageSession for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), ControlError> {
        let limit = self.page_load_timeout;
        match self.block_on(tokio::time::timeout(limit, self.client.goto(url))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ControlError::Navigation(e.to_string())),
            Err(_) => Err(ControlError::Timeout {
                what: "page load",
                after: limit,
            }),
        }
    }

    fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value, ControlError> {
        self.block_on(self.client.execute(script, args))
            .map_err(|e| ControlError::Script(e.to_string()))
    }

    fn title(&mut self) -> Result<String, ControlError> {
        self.block_on(self.client.title())
            .map_err(|e| ControlError::Script(e.to_string()))
    }

    fn screenshot_video(&mut self) -> Result<Vec<u8>, ControlError> {
        let client = &self.client;
        self.runtime
            .block_on(async move {
                let video = client.find(Locator::Css("video")).await?;
                video.screenshot().await
            })
            .map_err(|e| ControlError::Capture(e.to_string()))
    }

    fn close(&mut self) -> Result<(), ControlError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self
            .block_on(self.client.clone().close())
            .map_err(|e| ControlError::Script(e.to_string()));
        if let Some(mut child) = self.driver.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        result
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("closing browser session failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("work", "work")]
    #[case("  my profile #2 ", "my_profile_2")]
    #[case("a//..//b", "a_.._b")]
    #[case("élan", "_lan")]
    #[case("???", "_")]
    #[case("", "default")]
    #[case("..", "default")]
    fn sanitize_profile_name_keeps_safe_chars(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_profile_name(input), expected);
    }

    #[test]
    fn options_from_config_resolve_profile_and_proxy() {
        let cfg = PlayerConfig {
            proxy: Some("  ".into()),
            profile: Some("news feed".into()),
            profiles_dir: PathBuf::from("/data/profiles"),
            ..PlayerConfig::default()
        };
        let opts = LaunchOptions::from_config(&cfg);
        assert_eq!(opts.proxy, None);
        assert_eq!(
            opts.profile_dir,
            Some(PathBuf::from("/data/profiles/news_feed"))
        );
        assert_eq!(opts.driver_port(), 9515);
    }

    #[test]
    fn capabilities_carry_proxy_and_profile_args() {
        let opts = LaunchOptions {
            proxy: Some("socks5://127.0.0.1:1080".into()),
            profile_dir: Some(PathBuf::from("p/alice")),
            ..LaunchOptions::from_config(&PlayerConfig::default())
        };
        let caps = opts.capabilities();
        assert_eq!(caps["browserName"], "chrome");
        let args: Vec<&str> = caps["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(args.contains(&"--proxy-server=socks5://127.0.0.1:1080"));
        assert!(args.contains(&"--user-data-dir=p/alice"));
        assert!(args.contains(&"--autoplay-policy=no-user-gesture-required"));
    }
}
