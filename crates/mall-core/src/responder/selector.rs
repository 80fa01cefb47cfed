//! Responder selection

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::llm::GenerativeClient;
use crate::responder::{GenerativeTextResponder, ProductSearchResponder, Responder};
use crate::Result;

/// Which responder handles the next exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderMode {
    GenerativeText,
    #[default]
    ProductSearch,
}

impl ResponderMode {
    pub fn toggled(self) -> Self {
        match self {
            ResponderMode::GenerativeText => ResponderMode::ProductSearch,
            ResponderMode::ProductSearch => ResponderMode::GenerativeText,
        }
    }
}

impl fmt::Display for ResponderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponderMode::GenerativeText => write!(f, "generative"),
            ResponderMode::ProductSearch => write!(f, "search"),
        }
    }
}

impl FromStr for ResponderMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "generative" | "generative_text" | "gemini" | "llm" | "ai" => {
                Ok(ResponderMode::GenerativeText)
            }
            "search" | "product_search" | "product" | "products" => Ok(ResponderMode::ProductSearch),
            other => Err(format!("unknown responder mode: {}", other)),
        }
    }
}

/// Session-scoped switch between the two responders
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponderSelector {
    mode: ResponderMode,
}

impl ResponderSelector {
    pub fn new(mode: ResponderMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ResponderMode {
        self.mode
    }

    pub fn set(&mut self, mode: ResponderMode) {
        self.mode = mode;
    }

    /// Flip to the other responder and return the new mode
    pub fn toggle(&mut self) -> ResponderMode {
        self.mode = self.mode.toggled();
        self.mode
    }
}

/// One responder per mode
#[derive(Clone)]
pub struct Responders {
    generative: Arc<dyn Responder>,
    product_search: Arc<dyn Responder>,
}

impl Responders {
    pub fn new(generative: Arc<dyn Responder>, product_search: Arc<dyn Responder>) -> Self {
        Self {
            generative,
            product_search,
        }
    }

    /// Build the HTTP-backed responders from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = GenerativeClient::new(config)?;
        Ok(Self::new(
            Arc::new(GenerativeTextResponder::new(client)),
            Arc::new(ProductSearchResponder::new(config)?),
        ))
    }

    pub fn get(&self, mode: ResponderMode) -> &Arc<dyn Responder> {
        match mode {
            ResponderMode::GenerativeText => &self.generative,
            ResponderMode::ProductSearch => &self.product_search,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_product_search() {
        assert_eq!(ResponderSelector::default().mode(), ResponderMode::ProductSearch);
    }

    #[test]
    fn test_toggle() {
        let mut selector = ResponderSelector::default();
        assert_eq!(selector.toggle(), ResponderMode::GenerativeText);
        assert_eq!(selector.toggle(), ResponderMode::ProductSearch);
        selector.set(ResponderMode::GenerativeText);
        assert_eq!(selector.mode(), ResponderMode::GenerativeText);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("gemini".parse::<ResponderMode>(), Ok(ResponderMode::GenerativeText));
        assert_eq!(" Search ".parse::<ResponderMode>(), Ok(ResponderMode::ProductSearch));
        assert!("weather".parse::<ResponderMode>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for mode in [ResponderMode::GenerativeText, ResponderMode::ProductSearch] {
            assert_eq!(mode.to_string().parse::<ResponderMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_from_config_routes_by_mode() {
        let responders = Responders::from_config(&Config::default()).unwrap();
        assert_eq!(responders.get(ResponderMode::GenerativeText).name(), "generative");
        assert_eq!(responders.get(ResponderMode::ProductSearch).name(), "product-search");
    }
}
