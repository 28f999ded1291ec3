//! JavaScript expressions injected into the page via `Runtime.evaluate`.
//!
//! These handle element indexing, shadow-DOM piercing, stamp-based
//! re-resolution, and text extraction. Kept in one module so the rest of the
//! crate stays free of embedded script.
//!
//! Scanned elements are stamped with a `data-wt-idx` attribute and a deep
//! query helper is installed at `window.__wtFind`; both survive until the
//! next scan or navigation, which is exactly the catalog's lifetime.

/// Marker attribute carrying an element's catalog index.
pub const INDEX_ATTR: &str = "data-wt-idx";

/// Visible-text budget for `text()`, in bytes.
pub const TEXT_BUDGET: usize = 8_000;

/// Markup budget for `html()`, in bytes.
pub const HTML_BUDGET: usize = 10_000;

fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

fn js_opt(s: Option<&str>) -> String {
    s.map(|v| js_str(v)).unwrap_or_else(|| "null".into())
}

/// Shared traversal helpers: deep query piercing open shadow roots and
/// same-origin iframes. Closed shadow roots and cross-origin frames are
/// unreachable through ordinary introspection and stay out of the catalog.
const HELPERS: &str = r#"
function subRoots(el) {
  const roots = [];
  if (el.shadowRoot) roots.push(el.shadowRoot);
  if ((el.tagName === 'IFRAME' || el.tagName === 'FRAME')) {
    try { if (el.contentDocument) roots.push(el.contentDocument); } catch (e) {}
  }
  return roots;
}
function deepQueryAll(root, selectors) {
  const results = [];
  try { results.push(...root.querySelectorAll(selectors)); } catch (e) {}
  for (const el of root.querySelectorAll('*')) {
    for (const sub of subRoots(el)) results.push(...deepQueryAll(sub, selectors));
  }
  return results;
}
function deepFind(root, idx) {
  const found = root.querySelector('[data-wt-idx="' + idx + '"]');
  if (found) return found;
  for (const el of root.querySelectorAll('*')) {
    for (const sub of subRoots(el)) {
      const hit = deepFind(sub, idx);
      if (hit) return hit;
    }
  }
  return null;
}
function clearStamps(root) {
  root.querySelectorAll('[data-wt-idx]').forEach(el => el.removeAttribute('data-wt-idx'));
  for (const el of root.querySelectorAll('*')) {
    for (const sub of subRoots(el)) clearStamps(sub);
  }
}
"#;

const INTERACTIVE_SELECTORS: &str = "a[href], button, input, select, textarea, \
[role=\"button\"], [role=\"link\"], [role=\"tab\"], [role=\"menuitem\"], \
[role=\"checkbox\"], [role=\"radio\"], [role=\"textbox\"], [onclick], \
[tabindex]:not([tabindex=\"-1\"]), details > summary, [contenteditable=\"true\"]";

/// Body of the scan. Walks the (scoped) tree, filters to visible enabled
/// interactive elements, restricts to the topmost modal when one is up,
/// stamps each survivor with its index, and returns the catalog as JSON.
const SCAN_BODY: &str = r#"
window.__wtFind = (idx) => deepFind(document, idx);
clearStamps(document);

const root = SCOPE ? document.querySelector(SCOPE) : document;
if (!root) return JSON.stringify({ error: 'Selector not found: ' + SCOPE });

const interactive = deepQueryAll(root, SELECTORS);
const qualSet = new Set(interactive);

function isSemantic(el) {
  const tag = el.tagName.toLowerCase();
  if (['a', 'button', 'input', 'select', 'textarea'].includes(tag)) return true;
  const role = el.getAttribute('role') || '';
  if (['button', 'link', 'tab', 'menuitem', 'checkbox', 'radio', 'textbox'].includes(role)) return true;
  return el.isContentEditable;
}

// Topmost visible modal/dialog container. When one is up, background
// controls are irrelevant noise and the catalog is restricted to it.
const allDialogs = [...document.querySelectorAll('[role=dialog], [aria-modal=true]')]
  .filter(d => d.offsetParent !== null || getComputedStyle(d).position === 'fixed');
const topDialog = allDialogs[allDialogs.length - 1] || null;

const seen = new Set();
const results = [];

for (const el of interactive) {
  if (topDialog && !topDialog.contains(el)) continue;
  if (el.offsetParent === null && el.tagName !== 'BODY' && getComputedStyle(el).position !== 'fixed') continue;
  if (getComputedStyle(el).visibility === 'hidden') continue;
  const rect = el.getBoundingClientRect();
  if (rect.width === 0 && rect.height === 0) continue;
  if (el.disabled || el.getAttribute('aria-disabled') === 'true') continue;

  // Nested non-semantic matches ([onclick] spans, tabindex wrappers inside
  // a button) collapse into their outermost qualifying ancestor.
  if (!isSemantic(el)) {
    let p = el.parentElement, nested = false;
    while (p) { if (qualSet.has(p)) { nested = true; break; } p = p.parentElement; }
    if (nested) continue;
  }

  const tag = el.tagName.toLowerCase();
  const type = el.type || '';
  const role = el.getAttribute('role') || '';
  const text = (el.textContent || '').trim().replace(/\s+/g, ' ').slice(0, 80);
  const ariaLabel = el.getAttribute('aria-label') || '';
  const placeholder = el.placeholder || '';
  const name = el.name || '';
  const value = (tag === 'input' || tag === 'select' || tag === 'textarea')
    ? (el.value || '').slice(0, 40) : '';

  let kind = '';
  if (tag === 'a') kind = 'link';
  else if (tag === 'button' || role === 'button') kind = 'button';
  else if (tag === 'input') kind = type ? 'input:' + type : 'input';
  else if (tag === 'select') kind = 'select';
  else if (tag === 'textarea') kind = 'textarea';
  else if (role === 'textbox') kind = 'textbox';
  else if (role) kind = role;
  else kind = tag;

  let desc = (ariaLabel || text || placeholder || name || '').slice(0, 80);
  if (value && !desc.includes(value)) desc += desc ? ' [' + value + ']' : value;

  let href = '';
  if (tag === 'a' && el.href && !el.href.startsWith('javascript:')) href = el.href;

  const key = kind + '|' + desc + '|' + href;
  if (seen.has(key)) continue;
  seen.add(key);

  el.setAttribute('data-wt-idx', results.length);
  results.push({ kind, desc, href });
}

return JSON.stringify(results);
"#;

/// Build the scan expression. `scope` restricts traversal to descendants of
/// the first matching container.
pub fn scan_js(scope: Option<&str>) -> String {
    format!(
        "(() => {{\nconst SCOPE = {scope};\nconst SELECTORS = {selectors};\n{HELPERS}\n{SCAN_BODY}\n}})()",
        scope = js_opt(scope),
        selectors = js_str(INTERACTIVE_SELECTORS),
    )
}

/// Re-resolve a stamped element and report its click point.
///
/// Distinguishes the failure modes the dispatcher needs: `stale` when the
/// stamp is gone (DOM changed since the scan), `reason` when the element is
/// present but not interactable right now (zero-size or covered).
pub fn click_info_js(index: usize) -> String {
    format!(
        r#"(() => {{
const IDX = {index};
{HELPERS}
const el = (window.__wtFind && window.__wtFind(IDX)) || deepFind(document, IDX);
if (!el) return JSON.stringify({{ stale: true }});
el.scrollIntoView({{ block: 'center' }});
const rect = el.getBoundingClientRect();
if (rect.width === 0 || rect.height === 0) return JSON.stringify({{ reason: 'zero rendered size' }});
const cx = rect.x + rect.width / 2, cy = rect.y + rect.height / 2;
const hit = document.elementFromPoint(cx, cy);
function reaches(node, target) {{
  let n = node;
  while (n) {{
    if (n === target) return true;
    n = n.parentElement || (n.getRootNode && n.getRootNode().host) || null;
  }}
  return false;
}}
if (hit && hit !== el && !el.contains(hit) && !hit.contains(el) && !reaches(hit, el) && !(hit.shadowRoot && reaches(el, hit)))
  return JSON.stringify({{ reason: 'covered by <' + hit.tagName.toLowerCase() + '>' }});
const kind = el.getAttribute('role') || el.tagName.toLowerCase();
const desc = (el.getAttribute('aria-label') || el.textContent || '').trim().replace(/\s+/g, ' ').slice(0, 80);
return JSON.stringify({{ x: cx, y: cy, kind, desc }});
}})()"#
    )
}

/// Re-resolve a stamped element and verify it accepts typed text.
pub fn type_info_js(index: usize) -> String {
    format!(
        r#"(() => {{
const IDX = {index};
{HELPERS}
const el = (window.__wtFind && window.__wtFind(IDX)) || deepFind(document, IDX);
if (!el) return JSON.stringify({{ stale: true }});
const tag = el.tagName.toLowerCase();
const ce = el.isContentEditable;
const role = el.getAttribute('role') || '';
if (!(tag === 'input' || tag === 'textarea' || ce || role === 'textbox'))
  return JSON.stringify({{ reason: 'not a text input (<' + tag + '>)' }});
el.scrollIntoView({{ block: 'center' }});
const rect = el.getBoundingClientRect();
if (rect.width === 0 || rect.height === 0) return JSON.stringify({{ reason: 'zero rendered size' }});
return JSON.stringify({{ x: rect.x + rect.width / 2, y: rect.y + rect.height / 2, tag, ce }});
}})()"#
    )
}

/// Clear an input/textarea through the native prototype setter so
/// controlled components see the change, or select-all in contenteditable
/// (the caller follows up with a Backspace key event).
pub fn clear_js(index: usize) -> String {
    format!(
        r#"(() => {{
const IDX = {index};
{HELPERS}
const el = (window.__wtFind && window.__wtFind(IDX)) || deepFind(document, IDX);
if (!el) return JSON.stringify({{ stale: true }});
if (el.isContentEditable) {{
  const range = document.createRange();
  range.selectNodeContents(el);
  const sel = window.getSelection();
  sel.removeAllRanges();
  sel.addRange(range);
  return JSON.stringify({{ ce: true }});
}}
const setter = Object.getOwnPropertyDescriptor(HTMLInputElement.prototype, 'value')?.set
  || Object.getOwnPropertyDescriptor(HTMLTextAreaElement.prototype, 'value')?.set;
if (setter) setter.call(el, ''); else el.value = '';
el.dispatchEvent(new Event('input', {{ bubbles: true }}));
el.dispatchEvent(new Event('change', {{ bubbles: true }}));
return JSON.stringify({{ ce: false }});
}})()"#
    )
}

/// Re-assert the element's current value through the native setter and fire
/// bubbling input/change events.
///
/// Framework wrappers (React and friends) shadow the `value` property on the
/// instance, so plain assignment never reaches their change tracking; going
/// through the base prototype's setter is a Chromium-specific workaround
/// that does. Run after `Input.insertText` so controlled components pick up
/// what was typed.
pub fn sync_value_js(index: usize) -> String {
    format!(
        r#"(() => {{
const IDX = {index};
{HELPERS}
const el = (window.__wtFind && window.__wtFind(IDX)) || deepFind(document, IDX);
if (!el || el.isContentEditable) return JSON.stringify({{}});
const setter = Object.getOwnPropertyDescriptor(HTMLInputElement.prototype, 'value')?.set
  || Object.getOwnPropertyDescriptor(HTMLTextAreaElement.prototype, 'value')?.set;
if (setter) setter.call(el, el.value);
el.dispatchEvent(new Event('input', {{ bubbles: true }}));
el.dispatchEvent(new Event('change', {{ bubbles: true }}));
return JSON.stringify({{}});
}})()"#
    )
}

/// Extract visible text, piercing shadow roots and same-origin iframes,
/// truncated at [`TEXT_BUDGET`] with an explicit marker.
pub fn extract_text_js(scope: Option<&str>) -> String {
    format!(
        r#"(() => {{
const SCOPE = {scope};
const MAX = {budget};
const root = SCOPE ? document.querySelector(SCOPE) : document.body;
if (!root) return 'Selector not found: ' + SCOPE;
const chunks = [];
let total = 0;
function walk(node) {{
  if (total >= MAX) return;
  if (node.nodeType === 3) {{
    const t = node.textContent.trim();
    if (t.length > 0) {{
      const parent = node.parentElement;
      if (parent) {{
        if (['SCRIPT', 'STYLE', 'NOSCRIPT', 'SVG'].includes(parent.tagName)) return;
        if (parent.offsetParent === null && getComputedStyle(parent).position !== 'fixed') return;
      }}
      chunks.push(t);
      total += t.length;
    }}
    return;
  }}
  if (node.nodeType === 1) {{
    if (node.shadowRoot) for (const c of node.shadowRoot.childNodes) walk(c);
    if (node.tagName === 'IFRAME' || node.tagName === 'FRAME') {{
      try {{ if (node.contentDocument) walk(node.contentDocument.body || node.contentDocument); }} catch (e) {{}}
    }}
    for (const c of node.childNodes) walk(c);
  }}
}}
walk(root);
let text = chunks.join(' ').replace(/\s+/g, ' ').trim();
if (text.length > MAX) text = text.slice(0, MAX) + '... (truncated)';
return text || '(empty page)';
}})()"#,
        scope = js_opt(scope),
        budget = TEXT_BUDGET,
    )
}

/// outerHTML of the first match, truncated at [`HTML_BUDGET`].
pub fn get_html_js(selector: &str) -> String {
    format!(
        r#"(() => {{
const SEL = {selector};
const el = document.querySelector(SEL);
if (!el) return 'Selector not found: ' + SEL;
const html = el.outerHTML;
return html.length > {budget} ? html.slice(0, {budget}) + '... (truncated)' : html;
}})()"#,
        selector = js_str(selector),
        budget = HTML_BUDGET,
    )
}

/// Scroll the page. `direction` is one of up/down/top/bottom.
pub fn scroll_js(direction: &str, amount: i64) -> Option<String> {
    let js = match direction {
        "up" => format!("window.scrollBy(0, -{amount})"),
        "down" => format!("window.scrollBy(0, {amount})"),
        "top" => "window.scrollTo(0, 0)".to_string(),
        "bottom" => "window.scrollTo(0, document.body.scrollHeight)".to_string(),
        _ => return None,
    };
    Some(js)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_js_embeds_scope_as_json() {
        let js = scan_js(Some(".modal \"quoted\""));
        assert!(js.contains(r#"const SCOPE = ".modal \"quoted\"";"#));
        assert!(js.contains(INDEX_ATTR));
        assert!(js.contains("__wtFind"));
    }

    #[test]
    fn scan_js_without_scope_uses_null() {
        let js = scan_js(None);
        assert!(js.contains("const SCOPE = null;"));
    }

    #[test]
    fn click_info_embeds_index() {
        let js = click_info_js(7);
        assert!(js.contains("const IDX = 7;"));
        assert!(js.contains("elementFromPoint"));
    }

    #[test]
    fn text_js_carries_budget_and_marker() {
        let js = extract_text_js(None);
        assert!(js.contains(&format!("const MAX = {TEXT_BUDGET};")));
        assert!(js.contains("(truncated)"));
    }

    #[test]
    fn html_js_escapes_selector() {
        let js = get_html_js("input[name=\"q\"]");
        assert!(js.contains(r#"const SEL = "input[name=\"q\"]";"#));
    }

    #[test]
    fn scroll_js_rejects_unknown_direction() {
        assert!(scroll_js("sideways", 100).is_none());
        assert_eq!(scroll_js("top", 0).unwrap(), "window.scrollTo(0, 0)");
    }
}
