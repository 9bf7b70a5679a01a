use anyhow::{Context, Result};
use headless_chrome::Tab;
use serde::Deserialize;
use serde_json::{Value, json};
use workflow_capture::{ElementHandle, ElementInfo, Query, Rect, Viewport};

/// Attribute used to pin elements found by a query so later calls can
/// address them with a plain CSS selector.
pub const HANDLE_ATTR: &str = "data-wc-id";

/// Shared helpers injected ahead of every lookup script.
///
/// `visible` mirrors what a user can see: laid out, not hidden, non-zero box.
/// `tag` assigns a stable handle id to an element the first time it is
/// returned.
const PRELUDE_JS: &str = r#"
  const visible = (el) => {
    if (!el || !el.getBoundingClientRect) return false;
    const s = getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden' || s.opacity === '0') return false;
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
  };
  window.__wcNext = window.__wcNext || 0;
  const tag = (el) => {
    let id = el.getAttribute('data-wc-id');
    if (!id) {
      id = 'wc' + (window.__wcNext++);
      el.setAttribute('data-wc-id', id);
    }
    return id;
  };
  const norm = (s) => (s || '').trim();
  const has = (hay, needle) => norm(needle) !== '' && norm(hay).toLowerCase().includes(norm(needle).toLowerCase());
  const same = (a, b) => norm(b) !== '' && norm(a) === norm(b);
  const ownText = (el) => norm(el.innerText || el.textContent);
  const roleOf = (el) => {
    const explicit = el.getAttribute('role');
    if (explicit) return explicit;
    const t = el.tagName.toLowerCase();
    if (t === 'button') return 'button';
    if (t === 'a' && el.hasAttribute('href')) return 'link';
    if (t === 'textarea') return 'textbox';
    if (t === 'input') {
      const type = (el.getAttribute('type') || 'text').toLowerCase();
      if (['text', 'search', 'email', 'url', 'tel', 'password'].includes(type)) return 'textbox';
      if (['submit', 'button', 'reset'].includes(type)) return 'button';
    }
    if (el.isContentEditable) return 'textbox';
    return '';
  };
  const nameOf = (el) => {
    const labelled = el.getAttribute('aria-labelledby');
    const byRef = labelled ? labelled.split(/\s+/).map(id => norm((document.getElementById(id) || {}).innerText)).join(' ') : '';
    const label = el.labels && el.labels.length ? norm(el.labels[0].innerText) : '';
    return norm(el.getAttribute('aria-label')) || norm(byRef) || label || ownText(el) || norm(el.getAttribute('placeholder')) || norm(el.getAttribute('title'));
  };
"#;

/// Finds the first visible match for a query spec and returns its handle id.
const FIND_JS: &str = r#"
  const q = __QUERY__;
  let pool;
  if (q.kind === 'css') {
    try {
      pool = Array.from(document.querySelectorAll(q.value));
    } catch (e) {
      return '!invalid ' + String(e);
    }
  } else if (q.kind === 'xpath') {
    try {
      const snap = document.evaluate(q.value, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
      pool = [];
      for (let i = 0; i < snap.snapshotLength; i++) pool.push(snap.snapshotItem(i));
    } catch (e) {
      return '!invalid ' + String(e);
    }
  } else {
    pool = Array.from(document.querySelectorAll('body *'));
  }
  const leafText = (el) => {
    // prefer the innermost element carrying the text
    return Array.from(el.children).every(c => !has(ownText(c), q.value) || !visible(c));
  };
  const test = (el) => {
    switch (q.kind) {
      case 'css':
      case 'xpath': return el.nodeType === 1;
      case 'text': return (q.exact ? same(ownText(el), q.value) : has(ownText(el), q.value)) && leafText(el);
      case 'aria': return q.exact ? same(el.getAttribute('aria-label'), q.value) : has(el.getAttribute('aria-label'), q.value);
      case 'button': return roleOf(el) === 'button' && (q.exact ? same(ownText(el), q.value) : has(ownText(el), q.value));
      case 'link_or_button': {
        const t = el.tagName.toLowerCase();
        return (t === 'a' || t === 'button') && has(ownText(el), q.value);
      }
      case 'role': return roleOf(el).toLowerCase() === q.role.toLowerCase() && has(nameOf(el), q.value);
      case 'placeholder': return has(el.getAttribute('placeholder'), q.value);
      case 'label': {
        if (has(el.getAttribute('aria-label'), q.value)) return true;
        return !!(el.labels && Array.from(el.labels).some(l => has(l.innerText, q.value)));
      }
      default: return false;
    }
  };
  const hit = pool.find(el => visible(el) && test(el));
  return hit ? tag(hit) : null;
"#;

/// Lists visible interactive elements with their text and geometry.
const ENUMERATE_JS: &str = r#"
  const selector = 'button, [role="button"], a, [onclick]';
  return JSON.stringify(Array.from(document.querySelectorAll(selector))
    .filter(visible)
    .map(el => {
      const r = el.getBoundingClientRect();
      return {
        id: tag(el),
        tag: el.tagName.toLowerCase(),
        aria_label: norm(el.getAttribute('aria-label')),
        text: ownText(el).slice(0, 200),
        title: norm(el.getAttribute('title')),
        x: r.x, y: r.y, width: r.width, height: r.height,
      };
    }));
"#;

/// Replaces the value of an input, textarea or editable region and fires
/// the events frameworks listen for. Returns false for anything else.
const FILL_JS: &str = r#"
  const el = document.querySelector(__SELECTOR__);
  const value = __VALUE__;
  if (!el) return false;
  el.focus();
  const t = el.tagName.toLowerCase();
  if (t === 'input' || t === 'textarea') {
    const proto = t === 'input' ? HTMLInputElement.prototype : HTMLTextAreaElement.prototype;
    const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
    setter.call(el, value);
  } else if (el.isContentEditable) {
    el.textContent = value;
  } else {
    return false;
  }
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
"#;

/// Resolves once the document is loaded and the DOM has been quiet for
/// `quiet` ms; resolves false if `limit` ms pass first.
const IDLE_JS: &str = r#"
  new Promise((resolve) => {
    const quiet = __QUIET__, limit = __LIMIT__;
    let timer = null;
    const finish = (ok) => { observer.disconnect(); clearTimeout(timer); clearTimeout(cap); resolve(ok); };
    const arm = () => {
      clearTimeout(timer);
      timer = setTimeout(() => { if (document.readyState === 'complete') finish(true); else arm(); }, quiet);
    };
    const observer = new MutationObserver(arm);
    observer.observe(document, { subtree: true, childList: true, attributes: true, characterData: true });
    const cap = setTimeout(() => finish(false), limit);
    arm();
  })
"#;

const QUIET_MS: u64 = 500;
const INVALID_MARKER: &str = "!invalid";

#[derive(Debug, Deserialize)]
struct RawElement {
    id: String,
    tag: String,
    aria_label: String,
    text: String,
    title: String,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

fn wrap(body: &str) -> String {
    format!("(() => {{\n{PRELUDE_JS}\n{body}\n}})()")
}

fn evaluate(tab: &Tab, script: &str, await_promise: bool) -> Result<Option<Value>> {
    let result = tab
        .evaluate(script, await_promise)
        .context("page script failed")?;
    Ok(result.value)
}

/// CSS selector addressing a handle produced by [`find_once`] or [`interactive_elements`].
pub fn handle_selector(handle: &ElementHandle) -> String {
    format!("[{HANDLE_ATTR}=\"{}\"]", handle.id())
}

fn query_spec(query: &Query) -> Value {
    match query {
        Query::Text { text, exact } => json!({"kind": "text", "value": text, "exact": exact}),
        Query::AriaLabel { value, exact } => json!({"kind": "aria", "value": value, "exact": exact}),
        Query::Button { text, exact } => json!({"kind": "button", "value": text, "exact": exact}),
        Query::LinkOrButton(text) => json!({"kind": "link_or_button", "value": text}),
        Query::Css(selector) => json!({"kind": "css", "value": selector}),
        Query::XPath(path) => json!({"kind": "xpath", "value": path}),
        Query::Role { role, name } => json!({"kind": "role", "role": role, "value": name}),
        Query::Placeholder(text) => json!({"kind": "placeholder", "value": text}),
        Query::Label(text) => json!({"kind": "label", "value": text}),
    }
}

pub enum Lookup {
    Found(ElementHandle),
    Missing,
    /// The page rejected the selector.
    Invalid(String),
}

/// One lookup pass over the current document.
pub fn find_once(tab: &Tab, query: &Query) -> Result<Lookup> {
    let script = wrap(&FIND_JS.replace("__QUERY__", &query_spec(query).to_string()));
    // objects do not survive the round trip by value, so errors come back as a tagged string
    let lookup = match evaluate(tab, &script, false)? {
        Some(Value::String(raw)) => match raw.strip_prefix(INVALID_MARKER) {
            Some(reason) => Lookup::Invalid(reason.trim().to_string()),
            None => Lookup::Found(ElementHandle::new(raw)),
        },
        _ => Lookup::Missing,
    };
    Ok(lookup)
}

pub fn interactive_elements(tab: &Tab) -> Result<Vec<ElementInfo>> {
    let raw = evaluate(tab, &wrap(ENUMERATE_JS), false)?
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "[]".to_string());
    let elements: Vec<RawElement> =
        serde_json::from_str(&raw).context("element listing is not valid JSON")?;
    Ok(elements
        .into_iter()
        .map(|el| ElementInfo {
            handle: ElementHandle::new(el.id),
            tag: el.tag,
            aria_label: el.aria_label,
            text: el.text,
            title: el.title,
            rect: Some(Rect::new(el.x, el.y, el.width, el.height)),
        })
        .collect())
}

pub fn fill(tab: &Tab, handle: &ElementHandle, text: &str) -> Result<bool> {
    let script = wrap(
        &FILL_JS
            .replace("__SELECTOR__", &Value::from(handle_selector(handle)).to_string())
            .replace("__VALUE__", &Value::from(text).to_string()),
    );
    let filled = evaluate(tab, &script, false)?
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    Ok(filled)
}

/// `true` if the page went quiet within `limit_ms`.
pub fn wait_for_idle(tab: &Tab, limit_ms: u64) -> Result<bool> {
    let script = IDLE_JS
        .replace("__QUIET__", &QUIET_MS.min(limit_ms).to_string())
        .replace("__LIMIT__", &limit_ms.to_string());
    let idle = evaluate(tab, &script, true)?
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    Ok(idle)
}

pub fn viewport(tab: &Tab) -> Result<Viewport> {
    let raw = evaluate(
        tab,
        "JSON.stringify({width: window.innerWidth, height: window.innerHeight})",
        false,
    )?
    .and_then(|v| v.as_str().map(String::from))
    .context("no viewport size")?;
    serde_json::from_str(&raw).context("viewport size is not valid JSON")
}

/// Get the current page title.
pub fn get_page_title(tab: &Tab) -> Result<String> {
    let value = evaluate(tab, "document.title", false)?;
    Ok(value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_specs_carry_kind_and_value() {
        let spec = query_spec(&Query::Role {
            role: "textbox".into(),
            name: "Title".into(),
        });
        assert_eq!(spec["kind"], "role");
        assert_eq!(spec["role"], "textbox");
        assert_eq!(spec["value"], "Title");

        let spec = query_spec(&Query::Text {
            text: "Next".into(),
            exact: true,
        });
        assert_eq!(spec["exact"], true);

        let spec = query_spec(&Query::XPath("//textarea[@name='notes']".into()));
        assert_eq!(spec["kind"], "xpath");
        assert_eq!(spec["value"], "//textarea[@name='notes']");
    }

    #[test]
    fn xpath_lookups_use_document_evaluate() {
        assert!(FIND_JS.contains("q.kind === 'xpath'"));
        assert!(FIND_JS.contains("ORDERED_NODE_SNAPSHOT_TYPE"));
    }

    #[test]
    fn handle_selector_quotes_id() {
        assert_eq!(handle_selector(&ElementHandle::new("wc7")), "[data-wc-id=\"wc7\"]");
    }

    #[test]
    fn scripts_are_wrapped_in_an_iife() {
        let script = wrap("return 1;");
        assert!(script.starts_with("(() => {"));
        assert!(script.trim_end().ends_with("})()"));
        assert!(script.contains("const visible"));
    }
}
