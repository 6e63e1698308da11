#![allow(dead_code)]

use anyhow::{Result, anyhow};
use plan_pilot::Page;
use plan_pilot::page::PageSource;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Navigate(String),
    WaitFor(String, Duration),
    QueryAll(String),
    Click(String, usize),
    Fill(String, usize, String),
    Text(String, usize),
    SetDefaultTimeout(Duration),
}

/// Handle to the `index`-th match of `selector`.
#[derive(Debug, Clone)]
pub struct FakeElement {
    selector: String,
    index: usize,
}

/// In-memory page: selectors map to the visible text of their matches.
#[derive(Default)]
pub struct FakePage {
    elements: HashMap<String, Vec<String>>,
    vanishing: HashSet<String>,
    navigate_error: Option<String>,
    pub calls: RefCell<Vec<Call>>,
    pub filled: RefCell<HashMap<(String, usize), String>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elements(mut self, selector: &str, texts: &[&str]) -> Self {
        self.elements.insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Selector whose presence wait succeeds but which is gone by query time.
    pub fn with_vanishing(mut self, selector: &str) -> Self {
        self.vanishing.insert(selector.to_string());
        self
    }

    pub fn failing_navigation(mut self, message: &str) -> Self {
        self.navigate_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Page for FakePage {
    type Element<'a> = FakeElement;

    fn navigate(&self, url: &str) -> Result<()> {
        self.record(Call::Navigate(url.to_string()));
        match &self.navigate_error {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }

    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.record(Call::WaitFor(selector.to_string(), timeout));
        let present = self.vanishing.contains(selector)
            || self.elements.get(selector).is_some_and(|m| !m.is_empty());
        if present {
            Ok(())
        } else {
            Err(anyhow!(
                "Timeout {}ms exceeded waiting for selector '{}'",
                timeout.as_millis(),
                selector
            ))
        }
    }

    fn query_all<'a>(&'a self, selector: &str) -> Result<Vec<FakeElement>> {
        self.record(Call::QueryAll(selector.to_string()));
        let count = if self.vanishing.contains(selector) {
            0
        } else {
            self.elements.get(selector).map_or(0, Vec::len)
        };
        Ok((0..count)
            .map(|index| FakeElement {
                selector: selector.to_string(),
                index,
            })
            .collect())
    }

    fn element_click<'a>(&'a self, element: &FakeElement) -> Result<()> {
        self.record(Call::Click(element.selector.clone(), element.index));
        Ok(())
    }

    fn element_fill<'a>(&'a self, element: &FakeElement, value: &str) -> Result<()> {
        self.record(Call::Fill(
            element.selector.clone(),
            element.index,
            value.to_string(),
        ));
        self.filled.borrow_mut().insert(
            (element.selector.clone(), element.index),
            value.to_string(),
        );
        Ok(())
    }

    fn element_text<'a>(&'a self, element: &FakeElement) -> Result<String> {
        self.record(Call::Text(element.selector.clone(), element.index));
        self.elements
            .get(&element.selector)
            .and_then(|texts| texts.get(element.index))
            .cloned()
            .ok_or_else(|| anyhow!("element detached"))
    }

    fn set_default_timeout(&self, timeout: Duration) {
        self.record(Call::SetDefaultTimeout(timeout));
    }
}

/// Hands out a fresh [`FakePage`] with the same elements for every run.
#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    elements: Vec<(String, Vec<String>)>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elements(mut self, selector: &str, texts: &[&str]) -> Self {
        self.elements.push((
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        ));
        self
    }
}

impl PageSource for FakeSession {
    type Page = FakePage;

    fn page(&self) -> FakePage {
        self.elements
            .iter()
            .fold(FakePage::new(), |page, (selector, texts)| {
                let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
                page.with_elements(selector, &texts)
            })
    }
}
