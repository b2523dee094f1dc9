//! # Registry
//!
//! One generic, explicitly constructed name -> item table. Tools and agent
//! definitions both live in a `Registry`; nothing is global, so every test
//! can build its own isolated instance.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Anything that can be looked up by name
pub trait Named {
    fn name(&self) -> &str;
}

impl<T: Named + ?Sized> Named for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Named + ?Sized> Named for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Name-keyed collection of shared items
#[derive(Debug)]
pub struct Registry<T: ?Sized> {
    items: BTreeMap<String, Arc<T>>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T: Named + ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item. Fails if the name is already taken.
    pub fn register(&mut self, item: Arc<T>) -> Result<()> {
        let name = item.name().to_string();
        if self.items.contains_key(&name) {
            return Err(Error::already_exists(name).with_operation("registry::register"));
        }
        self.items.insert(name, item);
        Ok(())
    }

    /// Register an item, replacing any previous entry with the same name.
    /// Returns the replaced item.
    pub fn replace(&mut self, item: Arc<T>) -> Option<Arc<T>> {
        self.items.insert(item.name().to_string(), item)
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.items.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<T>> {
        self.items.remove(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.items.keys().map(|k| k.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[derive(Debug)]
    struct Item(&'static str, u32);

    impl Named for Item {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Item("b", 1))).unwrap();
        registry.register(Arc::new(Item("a", 2))).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get("b").map(|i| i.1), Some(1));
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_duplicate_register_fails_but_replace_wins() {
        let mut registry = Registry::new();
        registry.register(Arc::new(Item("x", 1))).unwrap();

        let err = registry.register(Arc::new(Item("x", 2))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(registry.get("x").map(|i| i.1), Some(1));

        let old = registry.replace(Arc::new(Item("x", 3)));
        assert_eq!(old.map(|i| i.1), Some(1));
        assert_eq!(registry.get("x").map(|i| i.1), Some(3));
    }

    #[test]
    fn test_instances_are_isolated() {
        let mut first: Registry<Item> = Registry::new();
        let second: Registry<Item> = Registry::new();
        first.register(Arc::new(Item("only-here", 0))).unwrap();
        assert!(first.contains("only-here"));
        assert!(!second.contains("only-here"));
    }
}
