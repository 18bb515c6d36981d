//! Semantic classification of click targets.

use crate::collector::types::{truncate_chars, Element};
use serde::{Deserialize, Serialize};

/// Maximum characters of visible text kept from a target.
pub const MAX_TEXT_CHARS: usize = 80;

/// Maximum class names kept from a target.
pub const MAX_CLASSES: usize = 5;

/// Tags that are interactive without any further hint.
const INTERACTIVE_TAGS: [&str; 3] = ["button", "a", "input"];

/// Class-name fragments that mark a custom control as clickable.
const CLICKABLE_CLASS_HINTS: [&str; 5] = ["btn", "button", "link", "cta", "click"];

/// Semantic descriptors of a DOM node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub tag: String,
    pub text: String,
    pub id: String,
    pub class_list: Vec<String>,
    pub selector: String,
    pub is_semantic: bool,
}

/// Classify a node. Returns `None` only for a missing node.
pub fn classify(element: Option<&Element>) -> Option<ElementInfo> {
    let el = element?;

    let tag = el.tag_name();
    let text = el
        .inner_text
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(el.text_content.as_deref())
        .map(|t| truncate_chars(t, MAX_TEXT_CHARS))
        .unwrap_or_default();
    let class_list: Vec<String> = el
        .class_list
        .iter()
        .filter(|c| !c.is_empty())
        .take(MAX_CLASSES)
        .cloned()
        .collect();

    let selector = if !el.id.is_empty() {
        format!("#{}", el.id)
    } else if let Some(first) = class_list.first() {
        format!(".{first}")
    } else {
        tag.clone()
    };

    let is_semantic = INTERACTIVE_TAGS.contains(&tag.as_str())
        || el.has_click_handler
        || el.attr("onclick").is_some_and(|v| !v.is_empty())
        || el.attr("role") == Some("button")
        || class_list.iter().any(|c| {
            let lower = c.to_lowercase();
            CLICKABLE_CLASS_HINTS.iter().any(|hint| lower.contains(hint))
        });

    Some(ElementInfo {
        tag,
        text,
        id: el.id.clone(),
        class_list,
        selector,
        is_semantic,
    })
}

/// Classify the element a click landed on, preferring a `data-pp` ancestor.
pub fn classify_click_target(target: Option<&Element>) -> Option<ElementInfo> {
    classify(target.map(Element::closest_tracked))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_target_prefers_tracked_ancestor() {
        let tracked = Element::new("div")
            .with_id("plan-pro")
            .with_attr("data-pp", "");
        let icon = Element::new("svg").with_parent(tracked);
        let info = classify_click_target(Some(&icon)).unwrap();
        assert_eq!(info.selector, "#plan-pro");
        assert_eq!(classify_click_target(None), None);
    }

    #[test]
    fn test_missing_node() {
        assert_eq!(classify(None), None);
    }

    #[test]
    fn test_selector_priority() {
        let el = Element::new("DIV").with_id("hero").with_class("card");
        assert_eq!(classify(Some(&el)).unwrap().selector, "#hero");

        let el = Element::new("div").with_class("card").with_class("wide");
        assert_eq!(classify(Some(&el)).unwrap().selector, ".card");

        let el = Element::new("SPAN");
        let info = classify(Some(&el)).unwrap();
        assert_eq!(info.selector, "span");
        assert!(!info.is_semantic);
    }

    #[test]
    fn test_semantic_detection() {
        assert!(classify(Some(&Element::new("BUTTON"))).unwrap().is_semantic);
        assert!(classify(Some(&Element::new("a"))).unwrap().is_semantic);
        assert!(classify(Some(&Element::new("div").with_attr("role", "button")))
            .unwrap()
            .is_semantic);
        assert!(classify(Some(&Element::new("div").with_attr("onclick", "go()")))
            .unwrap()
            .is_semantic);
        assert!(classify(Some(&Element::new("div").with_click_handler()))
            .unwrap()
            .is_semantic);
        assert!(classify(Some(&Element::new("div").with_class("Hero-CTA")))
            .unwrap()
            .is_semantic);
        assert!(!classify(Some(&Element::new("div").with_class("panel")))
            .unwrap()
            .is_semantic);
    }

    #[test]
    fn test_limits() {
        let mut el = Element::new("button").with_text("x".repeat(200));
        for i in 0..8 {
            el = el.with_class(format!("c{i}"));
        }
        let info = classify(Some(&el)).unwrap();
        assert_eq!(info.text.chars().count(), MAX_TEXT_CHARS);
        assert_eq!(info.class_list.len(), MAX_CLASSES);
    }

    #[test]
    fn test_text_falls_back_to_content() {
        let mut el = Element::new("a");
        el.text_content = Some("Pricing".to_string());
        assert_eq!(classify(Some(&el)).unwrap().text, "Pricing");
    }
}
