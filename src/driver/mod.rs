//! Boundary to the live page.
//!
//! The engine only ever talks to a [`PageDriver`]. Every primitive is
//! blocking, and every primitive that can hang takes an explicit time box
//! chosen by the caller.

pub mod scripted;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Opaque reference to a live element. Only meaningful inside the resolution
/// call that produced it; never compare handles across steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// A visible interactive element as seen by an enumeration pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    pub handle: ElementHandle,
    pub tag: String,
    pub aria_label: String,
    pub text: String,
    pub title: String,
    pub rect: Option<Rect>,
}

impl ElementInfo {
    /// aria-label, inner text and title joined and lowercased.
    pub fn combined_text(&self) -> String {
        [&self.aria_label, &self.text, &self.title]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// How to look an element up. Drivers translate these into whatever their
/// backend understands (XPath, CSS, accessibility queries).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// Visible text, exact or case-insensitive substring.
    Text { text: String, exact: bool },
    /// aria-label, exact or case-insensitive substring.
    AriaLabel { value: String, exact: bool },
    /// A button whose text equals (or contains) the value.
    Button { text: String, exact: bool },
    /// A link or button whose text contains the value.
    LinkOrButton(String),
    /// Raw CSS selector, used verbatim.
    Css(String),
    /// Raw XPath expression, used verbatim.
    XPath(String),
    /// Accessible role plus accessible name (case-insensitive substring).
    Role { role: String, name: String },
    /// Placeholder text (case-insensitive substring).
    Placeholder(String),
    /// Field labelled by the given text.
    Label(String),
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Text { text, exact: true } => write!(f, "text={text:?}"),
            Query::Text { text, exact: false } => write!(f, "text~={text:?}"),
            Query::AriaLabel { value, exact: true } => write!(f, "[aria-label={value:?}]"),
            Query::AriaLabel { value, exact: false } => write!(f, "[aria-label*={value:?} i]"),
            Query::Button { text, exact: true } => write!(f, "button={text:?}"),
            Query::Button { text, exact: false } => write!(f, "button~={text:?}"),
            Query::LinkOrButton(text) => write!(f, "a|button~={text:?}"),
            Query::Css(selector) => f.write_str(selector),
            Query::XPath(path) => write!(f, "xpath={path}"),
            Query::Role { role, name } => write!(f, "role={role}[name~={name:?}]"),
            Query::Placeholder(text) => write!(f, "placeholder~={text:?}"),
            Query::Label(text) => write!(f, "label~={text:?}"),
        }
    }
}

impl Query {
    /// `//…` and `(//…)` are XPath, everything else is taken as CSS.
    pub fn selector(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("//") || raw.starts_with("(//") {
            Query::XPath(raw.to_string())
        } else {
            Query::Css(raw.to_string())
        }
    }
}

/// Primitive page operations the engine is built on.
///
/// The page is exclusively owned by one run, hence `&mut self` throughout.
pub trait PageDriver {
    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError>;

    fn current_url(&mut self) -> Result<String, DriverError>;

    fn title(&mut self) -> Result<String, DriverError>;

    fn viewport(&mut self) -> Result<Viewport, DriverError>;

    /// First visible element matching `query`, waiting up to `timeout`.
    fn find(&mut self, query: &Query, timeout: Duration) -> Result<ElementHandle, DriverError>;

    /// Visible buttons, role=button elements, links and elements with a click handler,
    /// in document order.
    fn interactive_elements(&mut self) -> Result<Vec<ElementInfo>, DriverError>;

    fn click(&mut self, element: &ElementHandle, timeout: Duration) -> Result<(), DriverError>;

    /// Atomically replace the element's value.
    fn fill(
        &mut self,
        element: &ElementHandle,
        text: &str,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Press a key chord such as `Control+A` on the focused element.
    fn press_keys(&mut self, chord: &str) -> Result<(), DriverError>;

    /// Send literal keystrokes to the focused element.
    fn type_text(&mut self, text: &str) -> Result<(), DriverError>;

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait until network and DOM activity settle.
    fn wait_for_idle(&mut self, timeout: Duration) -> Result<(), DriverError>;

    /// Unconditional pause.
    fn pause(&mut self, duration: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_text_skips_blank_parts() {
        let info = ElementInfo {
            handle: ElementHandle::new("e1"),
            tag: "button".into(),
            aria_label: "  ".into(),
            text: " Create Project ".into(),
            title: "New".into(),
            rect: None,
        };
        assert_eq!(info.combined_text(), "create project new");
    }

    #[test]
    fn xpath_queries_are_tagged() {
        assert_eq!(Query::XPath("//textarea".into()).to_string(), "xpath=//textarea");
        assert_eq!(Query::Css("#title".into()).to_string(), "#title");
    }

    #[test]
    fn rect_center() {
        let rect = Rect::new(10.0, 20.0, 100.0, 40.0);
        assert_eq!(rect.center(), (60.0, 40.0));
        assert!(Rect::new(0.0, 0.0, 0.0, 10.0).is_empty());
    }
}
