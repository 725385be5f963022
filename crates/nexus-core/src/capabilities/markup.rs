//! `nexus::dom` - CSS selector queries over HTML
//!
//! Values crossing the boundary are flat maps, never live DOM handles:
//!
//! - document: `#{kind: "document", source}`
//! - element:  `#{kind: "element", tag, innerText, innerHtml, outerHtml, attributes}`
//!
//! `select` re-parses the source it is given, so an element can be queried
//! further (`el.select("span")`).

use crate::error::CapabilityError;
use crate::namespace::{Args, Namespace};
use crate::registry::{Capability, ModuleKind};
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};

const DOCUMENT: &str = "document";
const ELEMENT: &str = "element";

#[derive(Debug, Default)]
pub struct MarkupCapability;

impl Capability for MarkupCapability {
    fn key(&self) -> &str {
        ModuleKind::Markup.key()
    }

    fn register(&self, namespace: &mut Namespace) {
        namespace
            .module(self.key())
            .function("parse", 1..=1, |args| {
                Ok(json!({ "kind": DOCUMENT, "source": args.string(0)? }))
            })
            .method("select", 2..=2, |args| select(args))
            .method("text", 1..=1, |args| field(args, "innerText"))
            .method("html", 1..=1, |args| field(args, "innerHtml"))
            .method("attr", 2..=2, |args| {
                let name = args.string(1)?;
                let node = node(args)?;
                Ok(node
                    .get("attributes")
                    .and_then(|attrs| attrs.get(&name))
                    .cloned()
                    .unwrap_or(Value::Null))
            });
    }
}

fn node<'a>(args: &'a Args<'_>) -> Result<&'a Map<String, Value>, CapabilityError> {
    match args.value(0) {
        Value::Object(map) if matches!(map.get("kind").and_then(Value::as_str), Some(DOCUMENT | ELEMENT)) => {
            Ok(map)
        }
        _ => Err(args.invalid("expected a document or element")),
    }
}

fn select(args: &Args<'_>) -> Result<Value, CapabilityError> {
    let raw = args.string(1)?;
    let selector = Selector::parse(&raw)
        .map_err(|e| args.invalid(format!("invalid selector '{}': {}", raw, e)))?;

    let node = node(args)?;
    let html = match node.get("kind").and_then(Value::as_str) {
        Some(DOCUMENT) => Html::parse_document(source(node, "source")),
        _ => Html::parse_fragment(source(node, "outerHtml")),
    };

    Ok(Value::Array(html.select(&selector).map(element).collect()))
}

/// Read a precomputed field; documents are parsed on demand
fn field(args: &Args<'_>, name: &str) -> Result<Value, CapabilityError> {
    let node = node(args)?;
    if node.get("kind").and_then(Value::as_str) == Some(ELEMENT) {
        return Ok(node.get(name).cloned().unwrap_or(Value::Null));
    }

    let html = Html::parse_document(source(node, "source"));
    let root = html.root_element();
    Ok(match name {
        "innerText" => json!(root.text().collect::<String>()),
        _ => json!(root.inner_html()),
    })
}

fn source<'a>(node: &'a Map<String, Value>, key: &str) -> &'a str {
    node.get(key).and_then(Value::as_str).unwrap_or("")
}

fn element(el: ElementRef<'_>) -> Value {
    let attributes: Map<String, Value> = el
        .value()
        .attrs()
        .map(|(name, value)| (name.to_string(), json!(value)))
        .collect();
    json!({
        "kind": ELEMENT,
        "tag": el.value().name(),
        "innerText": el.text().collect::<String>(),
        "innerHtml": el.inner_html(),
        "outerHtml": el.html(),
        "attributes": attributes,
    })
}
