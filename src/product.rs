//! Product lookup on an inventory page: find an item by keyword, open it and
//! report its name and price.

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ExecutorConfig;
use crate::executor::execute;
use crate::login::{LoginForm, login};
use crate::page::Page;
use crate::types::{ExecutionTrace, Plan, Step};

/// Where the inventory lives. Defaults are the saucedemo.com markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySelectors {
    pub list: String,
    pub item_name: String,
    pub item_price: String,
    pub details_name: String,
    pub details_price: String,
}

impl Default for InventorySelectors {
    fn default() -> Self {
        Self {
            list: ".inventory_list".to_string(),
            item_name: ".inventory_item_name".to_string(),
            item_price: ".inventory_item_price".to_string(),
            details_name: ".inventory_details_name".to_string(),
            details_price: ".inventory_details_price".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductReport {
    pub success: bool,
    pub message: String,
    /// Steps that ran, when a run got far enough to execute any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<ExecutionTrace>,
}

impl ProductReport {
    fn failed(message: String, trace: Option<ExecutionTrace>) -> Self {
        Self {
            success: false,
            message,
            trace,
        }
    }
}

/// Find the first inventory item whose name contains `keyword` (ignoring
/// case), open it and read its details.
///
/// Names and prices are paired by position in the list. When the details
/// page does not render, the name and price from the list are reported.
pub fn find_product<P: Page>(
    page: &P,
    keyword: &str,
    selectors: &InventorySelectors,
    config: &ExecutorConfig,
) -> ProductReport {
    if let Err(e) = page.wait_for_selector(&selectors.list, config.element_timeout) {
        return ProductReport::failed(format!("inventory did not load: {:#}", e), None);
    }

    let names = match texts(page, &selectors.item_name) {
        Ok(names) => names,
        Err(e) => return ProductReport::failed(format!("cannot read inventory: {:#}", e), None),
    };
    let prices = texts(page, &selectors.item_price).unwrap_or_default();

    let needle = keyword.to_lowercase();
    let Some(index) = names.iter().position(|n| n.to_lowercase().contains(&needle)) else {
        return ProductReport::failed(
            format!(
                "Product with keyword \"{}\" not found. Inventory items: {:?}",
                keyword, names
            ),
            None,
        );
    };
    let listed_name = names[index].clone();
    let listed_price = prices.get(index).cloned().unwrap_or_default();
    info!(keyword, index, name = %listed_name, "product found");

    let plan = Plan::from_steps([
        Step::Click {
            selector: selectors.item_name.clone(),
            index,
        },
        Step::read_text(&selectors.details_name),
        Step::read_text(&selectors.details_price),
    ]);
    let trace = execute(&plan, page, config);

    let read: Vec<&str> = trace.values().map(str::trim).collect();
    if let (true, [name, price]) = (trace.is_success(), read.as_slice()) {
        let message = format!("Product \"{}\" found. Price: {}", name, price);
        return ProductReport {
            success: true,
            message,
            trace: Some(trace),
        };
    }

    // The item was opened; only its details page failed.
    let opened = trace.results().first().is_some_and(|r| r.outcome.is_ok());
    if opened {
        warn!("details page unreadable, reporting the inventory listing");
        let message = format!("Product \"{}\" found. Price: {}", listed_name, listed_price);
        return ProductReport {
            success: true,
            message,
            trace: Some(trace),
        };
    }

    let (_, message) = trace.summary();
    ProductReport::failed(message, Some(trace))
}

/// Log in with `form`, then [`find_product`].
pub fn run_product_task<P: Page>(
    page: &P,
    form: &LoginForm,
    keyword: &str,
    config: &ExecutorConfig,
) -> ProductReport {
    let trace = login(page, form, config);
    if !trace.is_success() {
        let (_, message) = trace.summary();
        return ProductReport::failed(format!("login failed: {}", message), Some(trace));
    }
    find_product(page, keyword, &InventorySelectors::default(), config)
}

fn texts<P: Page>(page: &P, selector: &str) -> Result<Vec<String>> {
    page.query_all(selector)?
        .iter()
        .map(|el| page.element_text(el).map(|t| t.trim().to_string()))
        .collect()
}
