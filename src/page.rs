use anyhow::Result;
use std::time::Duration;

/// The narrow set of page-automation operations the executor depends on.
///
/// Every call blocks until the backend answers. Errors are backend faults;
/// the executor records them as `exception` results and stops.
pub trait Page {
    /// Handle to one element resolved by [`Page::query_all`].
    type Element<'a>
    where
        Self: 'a;

    fn navigate(&self, url: &str) -> Result<()>;

    /// Block until `selector` has at least one match, or fail once `timeout` elapses.
    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// All matches in document order; empty when nothing matches.
    fn query_all<'a>(&'a self, selector: &str) -> Result<Vec<Self::Element<'a>>>;

    fn element_click<'a>(&'a self, element: &Self::Element<'a>) -> Result<()>;

    /// Replace the element's current value with `value`.
    fn element_fill<'a>(&'a self, element: &Self::Element<'a>, value: &str) -> Result<()>;

    fn element_text<'a>(&'a self, element: &Self::Element<'a>) -> Result<String>;

    fn set_default_timeout(&self, timeout: Duration);
}

/// Something that hands out the page runs execute against, such as a browser
/// session. Runs hold the source exclusively while they use the page.
pub trait PageSource: Send + 'static {
    type Page: Page;

    fn page(&self) -> Self::Page;
}
