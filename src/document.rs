// document.rs — the element registry overlay labels refer to by id

use glam::Vec2;
use serde::Deserialize;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

fn default_background() -> [u8; 4] {
    [20, 20, 20, 200]
}

fn default_color() -> [u8; 4] {
    [255, 255, 255, 255]
}

fn default_font_size() -> f32 {
    16.0
}

/// Host-owned content shown by an overlay label.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Element {
    pub id: String,
    #[serde(default)]
    pub text: String,
    /// Box size in CSS pixels; fitted to the text when absent.
    #[serde(default)]
    pub size: Option<Vec2>,
    #[serde(default = "default_background")]
    pub background: [u8; 4],
    #[serde(default = "default_color")]
    pub color: [u8; 4],
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

impl Element {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            size: None,
            background: default_background(),
            color: default_color(),
            font_size: default_font_size(),
        }
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.size = Some(Vec2::new(width, height));
        self
    }

    /// Explicit size, or a rough single-line fit of the text.
    pub fn box_size(&self) -> Vec2 {
        self.size.unwrap_or_else(|| {
            let chars = self.text.chars().count().max(1) as f32;
            Vec2::new(chars * self.font_size * 0.6 + 16.0, self.font_size * 1.6)
        })
    }
}

/// Non-owning reference from a label to its element.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    id: String,
    element: Weak<Element>,
}

impl ElementHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `None` once the element has been removed from the document.
    pub fn get(&self) -> Option<Rc<Element>> {
        self.element.upgrade()
    }
}

#[derive(Debug, Default)]
pub struct Document {
    elements: HashMap<String, Rc<Element>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        let mut doc = Self::new();
        for e in elements {
            doc.insert(e);
        }
        doc
    }

    /// Replaces any element with the same id.
    pub fn insert(&mut self, element: Element) {
        self.elements.insert(element.id.clone(), Rc::new(element));
    }

    pub fn remove(&mut self, id: &str) -> Option<Rc<Element>> {
        self.elements.remove(id)
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<ElementHandle> {
        self.elements.get(id).map(|e| ElementHandle {
            id: id.to_string(),
            element: Rc::downgrade(e),
        })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_do_not_own_elements() {
        let mut doc = Document::from_elements([Element::new("a", "A")]);
        let handle = doc.get_element_by_id("a").unwrap();
        assert_eq!(handle.get().unwrap().text, "A");

        drop(handle);
        assert_eq!(doc.len(), 1);

        let handle = doc.get_element_by_id("a").unwrap();
        doc.remove("a");
        assert!(handle.get().is_none());
        assert_eq!(handle.id(), "a");
    }

    #[test]
    fn unknown_id_is_none() {
        let doc = Document::new();
        assert!(doc.get_element_by_id("missing").is_none());
        assert!(doc.is_empty());
    }
}
