use anyhow::{Result, anyhow};
use headless_chrome::browser::tab::NoElementFound;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::page::{Page, PageSource};

/// How to get hold of a Chrome instance.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub headless: bool,
    /// DevTools endpoint of an already running Chrome, e.g. `http://127.0.0.1:9222`.
    pub attach_url: Option<String>,
    /// Explicit Chrome binary; otherwise headless_chrome looks one up.
    pub chrome_path: Option<PathBuf>,
}

/// Browser plus the one tab plans run against.
pub struct BrowserSession {
    _browser: Browser,
    pub tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(options: &BrowserOptions) -> Result<Self> {
        if let Some(url) = &options.attach_url {
            info!(url = %url, "attaching to existing Chrome");
            match Browser::connect(url.clone()) {
                Ok(browser) => {
                    let existing = {
                        let tabs = browser.get_tabs();
                        let tabs = tabs
                            .lock()
                            .map_err(|_| anyhow!("browser tab list lock poisoned"))?;
                        tabs.first().cloned()
                    };
                    let tab = match existing {
                        Some(tab) => {
                            debug!("using existing tab");
                            tab
                        }
                        None => browser.new_tab()?,
                    };
                    return Ok(Self {
                        _browser: browser,
                        tab,
                    });
                }
                Err(e) => warn!("could not attach ({:#}), launching a new browser", e),
            }
        }

        let launch = LaunchOptions {
            headless: options.headless,
            path: options.chrome_path.clone(),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(300),
            ..Default::default()
        };

        info!(headless = options.headless, "launching Chrome");
        let browser =
            Browser::new(launch).map_err(|e| anyhow!("browser launch failed: {:#}", e))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        info!("Chrome ready");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

impl PageSource for BrowserSession {
    type Page = ChromePage;

    fn page(&self) -> ChromePage {
        ChromePage::new(self.tab.clone())
    }
}

/// [`Page`] backed by a headless_chrome tab.
#[derive(Clone)]
pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }
}

const CLEAR_VALUE_JS: &str = "function() { this.value = ''; }";

impl Page for ChromePage {
    type Element<'a> = Element<'a>;

    fn navigate(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url)?.wait_until_navigated()?;
        Ok(())
    }

    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|e| {
                anyhow!("timed out after {:?} waiting for '{}': {:#}", timeout, selector, e)
            })?;
        Ok(())
    }

    fn query_all<'a>(&'a self, selector: &str) -> Result<Vec<Element<'a>>> {
        match self.tab.find_elements(selector) {
            Ok(elements) => Ok(elements),
            Err(e) if e.downcast_ref::<NoElementFound>().is_some() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn element_click<'a>(&'a self, element: &Element<'a>) -> Result<()> {
        element.click()?;
        Ok(())
    }

    fn element_fill<'a>(&'a self, element: &Element<'a>, value: &str) -> Result<()> {
        element.call_js_fn(CLEAR_VALUE_JS, vec![], false)?;
        element.type_into(value)?;
        Ok(())
    }

    fn element_text<'a>(&'a self, element: &Element<'a>) -> Result<String> {
        element.get_inner_text()
    }

    fn set_default_timeout(&self, timeout: Duration) {
        self.tab.set_default_timeout(timeout);
    }
}
