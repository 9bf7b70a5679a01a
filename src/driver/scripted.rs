//! In-memory page used for dry runs and tests.
//!
//! Elements are plain records that are rendered into an HTML document on
//! demand, so CSS queries go through a real selector engine (`scraper`).
//! Lookups follow browser-backed semantics: visible elements only, first
//! match in document order. Every primitive bumps a counter in
//! [`CallCounts`] so callers can check which paths actually ran.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::time::Duration;

use scraper::{Html, Selector};

use crate::driver::{ElementHandle, ElementInfo, PageDriver, Query, Rect, Viewport};
use crate::error::DriverError;

/// Carries the element key through the rendered document.
const KEY_ATTR: &str = "data-scripted-key";

const VOID_TAGS: &[&str] = &["input", "img", "br", "hr", "meta", "link"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub screenshot: usize,
    pub current_url: usize,
    pub find: usize,
    pub enumerate: usize,
    pub click: usize,
    pub fill: usize,
    pub press_keys: usize,
    pub type_text: usize,
    pub navigate: usize,
    pub wait_for_idle: usize,
    pub pause: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedElement {
    pub key: String,
    pub tag: String,
    pub text: String,
    pub attributes: BTreeMap<String, String>,
    pub rect: Rect,
    pub visible: bool,
    /// Key of the enclosing element; top-level elements sit in `<body>`.
    pub parent: Option<String>,
    pub navigates_to: Option<String>,
    pub fill_fails: bool,
    pub click_fails: bool,
}

impl ScriptedElement {
    pub fn new(key: &str, tag: &str) -> Self {
        Self {
            key: key.to_string(),
            tag: tag.to_lowercase(),
            rect: Rect::new(0.0, 0.0, 100.0, 30.0),
            visible: true,
            ..Default::default()
        }
    }

    pub fn button(key: &str, text: &str) -> Self {
        Self::new(key, "button").with_text(text)
    }

    pub fn link(key: &str, text: &str) -> Self {
        Self::new(key, "a").with_text(text)
    }

    pub fn input(key: &str) -> Self {
        Self::new(key, "input").attr("type", "text")
    }

    pub fn textarea(key: &str) -> Self {
        Self::new(key, "textarea")
    }

    pub fn editable(key: &str) -> Self {
        Self::new(key, "div").attr("contenteditable", "true")
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn at(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Rect::new(x, y, width, height);
        self
    }

    /// Nest this element inside the element with key `parent`.
    pub fn within(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn navigates_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.to_string());
        self
    }

    pub fn rejects_fill(mut self) -> Self {
        self.fill_fails = true;
        self
    }

    pub fn rejects_click(mut self) -> Self {
        self.click_fails = true;
        self
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn attribute_or_empty(&self, name: &str) -> &str {
        self.attribute(name).unwrap_or("")
    }

    fn is_interactive(&self) -> bool {
        matches!(self.tag.as_str(), "button" | "a")
            || self.attribute("role") == Some("button")
            || self.attribute("onclick").is_some()
    }

    fn is_editable(&self) -> bool {
        self.attribute("contenteditable") == Some("true")
    }

    fn is_fillable(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea") || self.is_editable()
    }

    fn role(&self) -> &str {
        if let Some(role) = self.attribute("role") {
            return role;
        }
        match self.tag.as_str() {
            "button" => "button",
            "a" => "link",
            "textarea" => "textbox",
            "input" => match self.attribute_or_empty("type") {
                "" | "text" | "search" | "email" | "url" => "textbox",
                "submit" | "button" => "button",
                _ => "",
            },
            _ if self.is_editable() => "textbox",
            _ => "",
        }
    }

    fn accessible_name(&self) -> &str {
        [
            self.attribute_or_empty("aria-label"),
            self.text.trim(),
            self.attribute_or_empty("placeholder"),
        ]
        .into_iter()
        .find(|name| !name.is_empty())
        .unwrap_or("")
    }

    fn render_open(&self, out: &mut String) {
        let _ = write!(out, "<{} {KEY_ATTR}=\"{}\"", self.tag, escape(&self.key));
        for (name, value) in &self.attributes {
            let _ = write!(out, " {name}=\"{}\"", escape(value));
        }
        out.push('>');
    }

    fn matches(&self, query: &Query) -> bool {
        let text = self.text.trim();
        match query {
            Query::Text { text: wanted, exact } => text_matches(text, wanted, *exact),
            Query::AriaLabel { value, exact } => {
                text_matches(self.attribute_or_empty("aria-label"), value, *exact)
            }
            Query::Button { text: wanted, exact } => {
                self.role() == "button" && text_matches(text, wanted, *exact)
            }
            Query::LinkOrButton(wanted) => {
                matches!(self.tag.as_str(), "a" | "button") && contains_ci(text, wanted)
            }
            Query::Role { role, name } => {
                self.role().eq_ignore_ascii_case(role) && contains_ci(self.accessible_name(), name)
            }
            Query::Placeholder(wanted) => contains_ci(self.attribute_or_empty("placeholder"), wanted),
            Query::Label(wanted) => contains_ci(self.attribute_or_empty("aria-label"), wanted),
            Query::Css(_) | Query::XPath(_) => false,
        }
    }

    fn info(&self) -> ElementInfo {
        ElementInfo {
            handle: ElementHandle::new(self.key.clone()),
            tag: self.tag.clone(),
            aria_label: self.attribute_or_empty("aria-label").to_string(),
            text: self.text.clone(),
            title: self.attribute_or_empty("title").to_string(),
            rect: Some(self.rect),
        }
    }
}

/// A scripted, fully in-memory page.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    url: String,
    title: String,
    viewport: Viewport,
    elements: Vec<ScriptedElement>,
    values: HashMap<String, String>,
    focused: Option<String>,
    select_all_pending: bool,
    clicked: Vec<String>,
    chords: Vec<String>,
    delayed_url: Option<(usize, String)>,
    unreachable: HashSet<String>,
    idle_fails: bool,
    screenshot_fails: bool,
    url_fails: bool,
    paused: Duration,
    calls: CallCounts,
}

impl ScriptedPage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            viewport: Viewport::default(),
            elements: Vec::new(),
            values: HashMap::new(),
            focused: None,
            select_all_pending: false,
            clicked: Vec::new(),
            chords: Vec::new(),
            delayed_url: None,
            unreachable: HashSet::new(),
            idle_fails: false,
            screenshot_fails: false,
            url_fails: false,
            paused: Duration::ZERO,
            calls: CallCounts::default(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_viewport(mut self, width: f64, height: f64) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    pub fn with_element(mut self, element: ScriptedElement) -> Self {
        self.elements.push(element);
        self
    }

    /// After `polls` further URL reads the page reports `url`.
    pub fn change_url_after(mut self, polls: usize, url: &str) -> Self {
        self.delayed_url = Some((polls, url.to_string()));
        self
    }

    pub fn with_unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    pub fn with_busy_network(mut self) -> Self {
        self.idle_fails = true;
        self
    }

    /// URL reads fail, as they do while a navigation is being torn down.
    pub fn with_unreadable_url(mut self) -> Self {
        self.url_fails = true;
        self
    }

    /// Screenshots fail as if the tab had been closed.
    pub fn close_tab(&mut self) {
        self.screenshot_fails = true;
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn clicked(&self) -> &[String] {
        &self.clicked
    }

    pub fn chords(&self) -> &[String] {
        &self.chords
    }

    pub fn paused(&self) -> Duration {
        self.paused
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    fn element(&self, handle: &ElementHandle) -> Result<&ScriptedElement, DriverError> {
        self.elements
            .iter()
            .find(|el| el.key == handle.id())
            .ok_or_else(|| DriverError::NotFound(format!("stale handle {}", handle.id())))
    }

    /// Visible when it and every enclosing element are visible.
    fn is_visible(&self, key: &str) -> bool {
        let mut current = Some(key);
        // parent chains may cycle
        for _ in 0..=self.elements.len() {
            let Some(key) = current else { return true };
            match self.elements.iter().find(|el| el.key == key) {
                Some(el) if el.visible => current = el.parent.as_deref(),
                _ => return false,
            }
        }
        false
    }

    /// The page as HTML, nested by [`ScriptedElement::parent`].
    fn markup(&self) -> String {
        let mut html = format!(
            "<!DOCTYPE html><html><head><title>{}</title></head><body>",
            escape(&self.title)
        );
        self.render_children(None, &mut html, 0);
        html.push_str("</body></html>");
        html
    }

    fn render_children(&self, parent: Option<&str>, out: &mut String, depth: usize) {
        if depth > self.elements.len() {
            return;
        }
        for element in self.elements.iter().filter(|el| el.parent.as_deref() == parent) {
            element.render_open(out);
            if VOID_TAGS.contains(&element.tag.as_str()) {
                continue;
            }
            out.push_str(&escape(&element.text));
            self.render_children(Some(&element.key), out, depth + 1);
            let _ = write!(out, "</{}>", element.tag);
        }
    }

    /// Keys of the elements matching a CSS selector, in document order.
    fn select_css(&self, css: &str) -> Result<Vec<String>, DriverError> {
        let selector = Selector::parse(css)
            .map_err(|err| DriverError::InvalidQuery(format!("{css}: {err}")))?;
        let document = Html::parse_document(&self.markup());
        Ok(document
            .select(&selector)
            .filter_map(|el| el.value().attr(KEY_ATTR))
            .map(str::to_string)
            .collect())
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    !needle.trim().is_empty() && haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

fn text_matches(actual: &str, wanted: &str, exact: bool) -> bool {
    if exact {
        !wanted.is_empty() && actual.trim() == wanted.trim()
    } else {
        contains_ci(actual, wanted)
    }
}

impl PageDriver for ScriptedPage {
    fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        self.calls.screenshot += 1;
        if self.screenshot_fails {
            return Err(DriverError::browser("target closed"));
        }
        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(self.url.as_bytes());
        Ok(png)
    }

    fn current_url(&mut self) -> Result<String, DriverError> {
        self.calls.current_url += 1;
        if self.url_fails {
            return Err(DriverError::browser("url unavailable"));
        }
        if let Some((remaining, url)) = self.delayed_url.take() {
            if remaining == 0 {
                self.url = url;
            } else {
                self.delayed_url = Some((remaining - 1, url));
            }
        }
        Ok(self.url.clone())
    }

    fn title(&mut self) -> Result<String, DriverError> {
        Ok(self.title.clone())
    }

    fn viewport(&mut self) -> Result<Viewport, DriverError> {
        Ok(self.viewport)
    }

    fn find(&mut self, query: &Query, _timeout: Duration) -> Result<ElementHandle, DriverError> {
        self.calls.find += 1;
        let keys = match query {
            Query::Css(css) => self.select_css(css)?,
            Query::XPath(path) => {
                return Err(DriverError::InvalidQuery(format!(
                    "xpath={path}: the scripted page only evaluates CSS"
                )));
            }
            _ => self
                .elements
                .iter()
                .filter(|el| el.matches(query))
                .map(|el| el.key.clone())
                .collect(),
        };
        keys.into_iter()
            .find(|key| self.is_visible(key))
            .map(ElementHandle::new)
            .ok_or_else(|| DriverError::NotFound(query.to_string()))
    }

    fn interactive_elements(&mut self) -> Result<Vec<ElementInfo>, DriverError> {
        self.calls.enumerate += 1;
        Ok(self
            .elements
            .iter()
            .filter(|el| el.is_interactive() && self.is_visible(&el.key))
            .map(ScriptedElement::info)
            .collect())
    }

    fn click(&mut self, handle: &ElementHandle, timeout: Duration) -> Result<(), DriverError> {
        self.calls.click += 1;
        let element = self.element(handle)?;
        if !self.is_visible(handle.id()) {
            return Err(DriverError::Timeout {
                operation: format!("click {}", handle.id()),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if element.click_fails {
            return Err(DriverError::browser("element is not clickable at point"));
        }
        let navigation = element.navigates_to.clone();
        self.clicked.push(handle.id().to_string());
        self.focused = Some(handle.id().to_string());
        self.select_all_pending = false;
        if let Some(url) = navigation {
            self.url = url;
        }
        Ok(())
    }

    fn fill(
        &mut self,
        handle: &ElementHandle,
        text: &str,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        self.calls.fill += 1;
        let element = self.element(handle)?;
        if !element.is_fillable() || element.fill_fails {
            return Err(DriverError::browser(format!(
                "element {} is not an <input>, <textarea> or editable region",
                handle.id()
            )));
        }
        self.values.insert(handle.id().to_string(), text.to_string());
        self.focused = Some(handle.id().to_string());
        Ok(())
    }

    fn press_keys(&mut self, chord: &str) -> Result<(), DriverError> {
        self.calls.press_keys += 1;
        self.chords.push(chord.to_string());
        if chord.ends_with("+A") {
            self.select_all_pending = true;
        }
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> Result<(), DriverError> {
        self.calls.type_text += 1;
        let focused = self
            .focused
            .clone()
            .ok_or_else(|| DriverError::browser("no focused element"))?;
        let fillable = self
            .elements
            .iter()
            .any(|el| el.key == focused && el.is_fillable());
        if !fillable {
            return Err(DriverError::browser("focused element does not accept text"));
        }
        let value = self.values.entry(focused).or_default();
        if std::mem::take(&mut self.select_all_pending) {
            value.clear();
        }
        value.push_str(text);
        Ok(())
    }

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        self.calls.navigate += 1;
        if self.unreachable.contains(url) {
            return Err(DriverError::Timeout {
                operation: format!("navigate {url}"),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        self.url = url.to_string();
        self.focused = None;
        Ok(())
    }

    fn wait_for_idle(&mut self, timeout: Duration) -> Result<(), DriverError> {
        self.calls.wait_for_idle += 1;
        if self.idle_fails {
            return Err(DriverError::Timeout {
                operation: "network idle".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    fn pause(&mut self, duration: Duration) {
        self.calls.pause += 1;
        self.paused += duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    fn page() -> ScriptedPage {
        ScriptedPage::new("https://app.test/")
            .with_element(ScriptedElement::link("login", "Login"))
            .with_element(
                ScriptedElement::button("create", "Create Project").attr("aria-label", "New project"),
            )
            .with_element(ScriptedElement::input("title").attr("placeholder", "Project name"))
            .with_element(ScriptedElement::new("plain", "input"))
            .with_element(ScriptedElement::button("ghost", "Ghost").hidden())
    }

    fn hit(page: &mut ScriptedPage, css: &str) -> Result<ElementHandle, DriverError> {
        page.find(&Query::Css(css.into()), T)
    }

    #[test]
    fn css_queries_follow_selector_semantics() {
        let mut page = page();
        assert_eq!(hit(&mut page, "[placeholder=\"Project name\"]").unwrap().id(), "title");
        assert_eq!(hit(&mut page, "[aria-label*='PROJECT' i]").unwrap().id(), "create");
        assert_eq!(hit(&mut page, "input:not([type])").unwrap().id(), "plain");
        assert_eq!(
            hit(&mut page, "textarea, input[type='text']").unwrap().id(),
            "title"
        );
        assert!(matches!(hit(&mut page, "button["), Err(DriverError::InvalidQuery(_))));
        assert!(matches!(hit(&mut page, "#missing"), Err(DriverError::NotFound(_))));
    }

    #[test]
    fn css_handles_escaped_quotes_and_combinators() {
        let mut page = ScriptedPage::new("https://app.test/")
            .with_element(ScriptedElement::input("search").attr("placeholder", "Search"))
            .with_element(ScriptedElement::new("form", "form"))
            .with_element(ScriptedElement::input("greeting").attr("placeholder", "Say \"hi\"").within("form"));

        assert_eq!(hit(&mut page, r#"[placeholder="Say \"hi\""]"#).unwrap().id(), "greeting");
        assert_eq!(hit(&mut page, "form > input").unwrap().id(), "greeting");
        assert_eq!(hit(&mut page, "body > input").unwrap().id(), "search");
    }

    #[test]
    fn xpath_is_rejected_rather_than_guessed() {
        let mut page = page();
        assert!(matches!(
            page.find(&Query::XPath("//input".into()), T),
            Err(DriverError::InvalidQuery(_))
        ));
    }

    #[test]
    fn hidden_parent_hides_children() {
        let mut page = ScriptedPage::new("https://app.test/")
            .with_element(ScriptedElement::new("dialog", "div").hidden())
            .with_element(ScriptedElement::button("confirm", "Confirm").within("dialog"));
        assert!(hit(&mut page, "button").is_err());
        assert!(page.interactive_elements().unwrap().is_empty());
    }

    #[test]
    fn hidden_elements_are_not_found() {
        let mut page = page();
        let query = Query::Text {
            text: "Ghost".into(),
            exact: true,
        };
        assert!(page.find(&query, T).is_err());
        assert!(page
            .interactive_elements()
            .unwrap()
            .iter()
            .all(|info| info.handle.id() != "ghost"));
    }

    #[test]
    fn select_all_then_type_replaces_value() {
        let mut page = page();
        let handle = ElementHandle::new("title");
        page.fill(&handle, "old", T).unwrap();
        page.press_keys("Control+A").unwrap();
        page.type_text("new").unwrap();
        assert_eq!(page.value_of("title"), Some("new"));
    }

    #[test]
    fn delayed_url_change() {
        let mut page = ScriptedPage::new("a").change_url_after(2, "b");
        assert_eq!(page.current_url().unwrap(), "a");
        assert_eq!(page.current_url().unwrap(), "a");
        assert_eq!(page.current_url().unwrap(), "b");
    }
}
