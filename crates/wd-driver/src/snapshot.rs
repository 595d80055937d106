//! Accessibility snapshot via an injected script

use action_primitives::PageSnapshot;

use crate::model::RawSnapshot;

/// Walks the DOM and returns `{url, title, nodes}`. Each node carries
/// role, accessible name, text, aria-label, placeholder, depth and a
/// unique CSS path. `arguments[0]` caps the node count.
pub const SNAPSHOT_SCRIPT: &str = r#"
const limit = arguments[0] || 500;
const implicitRole = (el) => {
  const tag = el.tagName.toLowerCase();
  const type = (el.getAttribute('type') || '').toLowerCase();
  if (tag === 'button') return 'button';
  if (tag === 'a' && el.hasAttribute('href')) return 'link';
  if (tag === 'select') return 'combobox';
  if (tag === 'textarea') return 'textbox';
  if (tag === 'img') return 'img';
  if (/^h[1-6]$/.test(tag)) return 'heading';
  if (tag === 'input') {
    if (['submit', 'button', 'reset'].includes(type)) return 'button';
    if (type === 'checkbox') return 'checkbox';
    if (type === 'radio') return 'radio';
    if (type === 'hidden') return '';
    return 'textbox';
  }
  return '';
};
const cssPath = (el) => {
  if (el.id) return '#' + CSS.escape(el.id);
  const parts = [];
  let node = el;
  while (node && node.nodeType === 1 && node !== document.documentElement) {
    if (node.id) { parts.unshift('#' + CSS.escape(node.id)); break; }
    const tag = node.tagName.toLowerCase();
    const parent = node.parentElement;
    const same = parent ? Array.from(parent.children).filter((c) => c.tagName === node.tagName) : [];
    parts.unshift(same.length > 1 ? `${tag}:nth-of-type(${same.indexOf(node) + 1})` : tag);
    node = parent;
  }
  return parts.join(' > ');
};
const depthOf = (el) => { let d = 0; for (let n = el.parentElement; n; n = n.parentElement) d++; return d; };
const clean = (s) => (s || '').replace(/\s+/g, ' ').trim().slice(0, 200);
const nodes = [];
for (const el of document.querySelectorAll('body *')) {
  if (nodes.length >= limit) break;
  const role = el.getAttribute('role') || implicitRole(el);
  const ownText = clean(Array.from(el.childNodes).filter((c) => c.nodeType === 3).map((c) => c.textContent).join(' '));
  if (!role && !ownText) continue;
  const style = window.getComputedStyle(el);
  const rect = el.getBoundingClientRect();
  const visible = style.visibility !== 'hidden' && style.display !== 'none' && (rect.width > 0 || rect.height > 0);
  const labelled = el.labels && el.labels.length ? clean(el.labels[0].innerText) : '';
  const text = clean(el.innerText);
  const name = clean(el.getAttribute('aria-label')) || labelled || clean(el.getAttribute('alt'))
    || clean(el.getAttribute('title')) || (['button', 'link', 'heading', 'option'].includes(role) ? text : '')
    || clean(el.getAttribute('placeholder'));
  nodes.push({
    role, name, text: role === 'textbox' ? '' : text,
    aria_label: el.getAttribute('aria-label'),
    placeholder: el.getAttribute('placeholder'),
    depth: depthOf(el),
    dom_id: el.id || null,
    css: cssPath(el),
    visible,
    value: 'value' in el && typeof el.value === 'string' ? el.value : null,
  });
}
return { url: window.location.href, title: document.title, nodes };
"#;

pub fn into_snapshot(raw: RawSnapshot) -> PageSnapshot {
    PageSnapshot::new(raw.url, raw.title, raw.nodes)
}
