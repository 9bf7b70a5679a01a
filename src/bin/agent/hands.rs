use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use headless_chrome::browser::tab::ModifierKey;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info, warn};
use workflow_capture::util::slugify;
use workflow_capture::{DriverError, ElementHandle, ElementInfo, PageDriver, Query, Viewport};

use crate::dom::{self, Lookup};

const FIND_POLL: Duration = Duration::from_millis(100);

/// Chrome session bound to one app profile. Created once per run.
pub struct ChromePage {
    _browser: Browser,
    tab: Arc<Tab>,
}

pub struct LaunchSettings {
    pub headless: bool,
    pub app: String,
    /// Parent directory of the per-app profiles.
    pub profiles_dir: PathBuf,
}

impl ChromePage {
    pub fn launch(settings: &LaunchSettings) -> Result<Self> {
        let chrome_path = find_chrome()?;
        let profile = prepare_profile(&settings.profiles_dir, &settings.app)?;
        info!(chrome = %chrome_path.display(), profile = %profile.display(), "launching chrome");

        let options = LaunchOptions {
            headless: settings.headless,
            path: Some(chrome_path),
            user_data_dir: Some(profile),
            window_size: Some((1280, 720)),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
                OsStr::new("--password-store=basic"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        let browser = Browser::new(options).context("browser launch failed")?;
        let tab = browser.new_tab().context("could not open a tab")?;
        tab.navigate_to("about:blank")?;
        debug!("chrome ready");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn selector(handle: &ElementHandle) -> String {
        dom::handle_selector(handle)
    }
}

/// `auth_states/<app>` keeps logins between runs; a crashed session leaves a
/// lock file behind that would stop Chrome from starting.
fn prepare_profile(profiles_dir: &Path, app: &str) -> Result<PathBuf> {
    let slug = slugify(app);
    let profile = profiles_dir.join(if slug.is_empty() { "default" } else { slug.as_str() });
    std::fs::create_dir_all(&profile)
        .with_context(|| format!("could not create profile dir {}", profile.display()))?;
    let lock = profile.join("SingletonLock");
    if lock.symlink_metadata().is_ok() {
        warn!(path = %lock.display(), "removing stale profile lock");
        let _ = std::fs::remove_file(&lock);
    }
    Ok(profile)
}

fn find_chrome() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("CHROME_PATH").map(PathBuf::from) {
        if path.exists() {
            return Ok(path);
        }
        warn!(path = %path.display(), "CHROME_PATH does not exist; searching");
    }

    let mut candidates: Vec<PathBuf> = vec![
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(local.join(r"Google\Chrome\Application\chrome.exe"));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join("Applications/Google Chrome.app/Contents/MacOS/Google Chrome"));
    }

    if let Some(found) = candidates.into_iter().find(|p| p.exists()) {
        return Ok(found);
    }
    headless_chrome::browser::default_executable()
        .map_err(|e| anyhow::anyhow!("Chrome executable not found: {e}"))
}

fn browser_err(err: anyhow::Error) -> DriverError {
    DriverError::browser(format!("{err:#}"))
}

/// `Control+A` -> modifiers and the final key.
fn split_chord(chord: &str) -> (Vec<ModifierKey>, &str) {
    let mut parts: Vec<&str> = chord.split('+').collect();
    let key = parts.pop().unwrap_or_default();
    let modifiers = parts
        .into_iter()
        .filter_map(|m| match m.to_ascii_lowercase().as_str() {
            "control" | "ctrl" => Some(ModifierKey::Ctrl),
            "meta" | "cmd" | "command" => Some(ModifierKey::Meta),
            "alt" | "option" => Some(ModifierKey::Alt),
            "shift" => Some(ModifierKey::Shift),
            _ => None,
        })
        .collect();
    (modifiers, key)
}

impl PageDriver for ChromePage {
    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(browser_err)
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self.tab.get_url())
    }

    fn title(&mut self) -> Result<String, DriverError> {
        dom::get_page_title(&self.tab).map_err(browser_err)
    }

    fn viewport(&mut self) -> Result<Viewport, DriverError> {
        dom::viewport(&self.tab).map_err(browser_err)
    }

    fn find(&mut self, query: &Query, timeout: Duration) -> Result<ElementHandle, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            match dom::find_once(&self.tab, query).map_err(browser_err)? {
                Lookup::Found(handle) => return Ok(handle),
                Lookup::Invalid(reason) => {
                    return Err(DriverError::InvalidQuery(format!("{query}: {reason}")));
                }
                Lookup::Missing if Instant::now() >= deadline => {
                    return Err(DriverError::NotFound(query.to_string()));
                }
                Lookup::Missing => std::thread::sleep(FIND_POLL),
            }
        }
    }

    fn interactive_elements(&mut self) -> Result<Vec<ElementInfo>, DriverError> {
        dom::interactive_elements(&self.tab).map_err(browser_err)
    }

    fn click(&mut self, element: &ElementHandle, timeout: Duration) -> Result<(), DriverError> {
        let selector = Self::selector(element);
        let el = self
            .tab
            .wait_for_element_with_custom_timeout(&selector, timeout)
            .map_err(|_| DriverError::Timeout {
                operation: format!("click {}", element.id()),
                timeout_ms: timeout.as_millis() as u64,
            })?;
        el.click().map_err(browser_err)?;
        Ok(())
    }

    fn fill(
        &mut self,
        element: &ElementHandle,
        text: &str,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        if dom::fill(&self.tab, element, text).map_err(browser_err)? {
            Ok(())
        } else {
            Err(DriverError::browser(format!(
                "element {} does not take text",
                element.id()
            )))
        }
    }

    fn press_keys(&mut self, chord: &str) -> Result<(), DriverError> {
        let (modifiers, key) = split_chord(chord);
        if modifiers.is_empty() {
            self.tab.press_key(key).map_err(browser_err)?;
        } else {
            self.tab
                .press_key_with_modifiers(key, Some(&modifiers))
                .map_err(browser_err)?;
        }
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), DriverError> {
        self.tab.type_str(text).map_err(browser_err)?;
        Ok(())
    }

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        self.tab.set_default_timeout(timeout);
        let result = self
            .tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(|err| DriverError::Timeout {
                operation: format!("navigate {url}: {err}"),
                timeout_ms: timeout.as_millis() as u64,
            });
        self.tab.set_default_timeout(Duration::from_secs(20));
        result
    }

    fn wait_for_idle(&mut self, timeout: Duration) -> Result<(), DriverError> {
        let limit_ms = timeout.as_millis() as u64;
        match dom::wait_for_idle(&self.tab, limit_ms) {
            Ok(true) => Ok(()),
            Ok(false) => Err(DriverError::Timeout {
                operation: "page idle".to_string(),
                timeout_ms: limit_ms,
            }),
            Err(err) => Err(browser_err(err)),
        }
    }

    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
