//! Display attributes and their resolution.
//!
//! Input methods tag composed text with attribute ids through one or more
//! display-attribute properties. The registry knows which properties exist and
//! what each id looks like. A [`DisplayAttributeResolver`] snapshots the
//! property list once per update pass and answers lookups for that pass.

use crate::context::{PropertyId, PropertySpan};
use crate::error::Result;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tracing::{debug, warn};

/// Opaque display-attribute id carried as a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeId(pub u32);

impl AttributeId {
    /// No attribute; rendered with default input styling.
    pub const NONE: Self = Self(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl Default for AttributeId {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Rgb(u8, u8, u8),
    /// Index into the host's system palette.
    System(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderlineStyle {
    None,
    Solid,
    Dot,
    Dash,
    Squiggle,
}

impl Default for UnderlineStyle {
    fn default() -> Self {
        Self::None
    }
}

/// What stage of conversion an attributed span is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeClass {
    Input,
    TargetConverted,
    Converted,
    TargetNotConverted,
    InputError,
    FixedConverted,
    Other,
}

impl Default for AttributeClass {
    fn default() -> Self {
        Self::Input
    }
}

/// How a span of composition text should look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayAttribute {
    pub foreground: Option<Color>,
    pub background: Option<Color>,
    pub underline: UnderlineStyle,
    pub bold_underline: bool,
    pub underline_color: Option<Color>,
    pub class: AttributeClass,
}

/// Source of display-attribute properties and their styling.
pub trait AttributeRegistry {
    /// Display-attribute properties currently installed, in registry order.
    fn attribute_property_ids(&self) -> Result<Vec<PropertyId>>;

    fn resolve(&self, id: AttributeId) -> Option<DisplayAttribute>;
}

/// Per-pass view of an [`AttributeRegistry`].
///
/// The property list always starts with [`PropertyId::ATTRIBUTE`] followed by
/// the registry's own properties with duplicates removed. If the registry
/// cannot enumerate its properties the list is empty and every span resolves
/// to [`AttributeId::NONE`].
pub struct DisplayAttributeResolver<'a, G: ?Sized> {
    registry: &'a G,
    property_ids: Vec<PropertyId>,
    memo: RefCell<AHashMap<AttributeId, Option<DisplayAttribute>>>,
}

impl<'a, G: AttributeRegistry + ?Sized> DisplayAttributeResolver<'a, G> {
    pub fn build(registry: &'a G) -> Self {
        let property_ids = match registry.attribute_property_ids() {
            Ok(ids) => {
                let mut list = Vec::with_capacity(ids.len() + 1);
                list.push(PropertyId::ATTRIBUTE);
                for id in ids {
                    if !list.contains(&id) {
                        list.push(id);
                    }
                }
                list
            }
            Err(e) => {
                warn!(error = %e, "display attribute properties unavailable");
                Vec::new()
            }
        };
        debug!(count = property_ids.len(), "built display attribute resolver");

        Self {
            registry,
            property_ids,
            memo: RefCell::new(AHashMap::new()),
        }
    }

    /// Properties to query, in precedence order.
    pub fn property_ids(&self) -> &[PropertyId] {
        &self.property_ids
    }

    /// Looks an id up, memoized for the lifetime of this resolver.
    pub fn resolve(&self, id: AttributeId) -> Option<DisplayAttribute> {
        if id.is_none() {
            return None;
        }
        *self
            .memo
            .borrow_mut()
            .entry(id)
            .or_insert_with(|| self.registry.resolve(id))
    }

    /// Picks the attribute for a span: the first property, in precedence
    /// order, whose value resolves in the registry.
    pub fn attribute_for<R>(&self, span: &PropertySpan<R>) -> AttributeId {
        self.property_ids
            .iter()
            .filter_map(|pid| span.value(*pid))
            .map(AttributeId)
            .find(|id| self.resolve(*id).is_some())
            .unwrap_or(AttributeId::NONE)
    }

    /// Maps ids to the data handed to the conversion area. Unresolvable ids
    /// get default input styling.
    pub fn resolve_all(&self, ids: &[AttributeId]) -> Vec<DisplayAttribute> {
        ids.iter()
            .map(|id| self.resolve(*id).unwrap_or_default())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::Cell;

    struct CountingRegistry {
        properties: Vec<PropertyId>,
        lookups: Cell<usize>,
        broken: bool,
    }

    impl CountingRegistry {
        fn new(properties: Vec<PropertyId>) -> Self {
            Self {
                properties,
                lookups: Cell::new(0),
                broken: false,
            }
        }
    }

    impl AttributeRegistry for CountingRegistry {
        fn attribute_property_ids(&self) -> Result<Vec<PropertyId>> {
            if self.broken {
                return Err(Error::environment("enumeration failed"));
            }
            Ok(self.properties.clone())
        }

        fn resolve(&self, id: AttributeId) -> Option<DisplayAttribute> {
            self.lookups.set(self.lookups.get() + 1);
            (id.0 == 7).then(|| DisplayAttribute {
                underline: UnderlineStyle::Squiggle,
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_system_property_comes_first() {
        let registry = CountingRegistry::new(vec![
            PropertyId(40),
            PropertyId::ATTRIBUTE,
            PropertyId(41),
            PropertyId(40),
        ]);
        let resolver = DisplayAttributeResolver::build(&registry);
        assert_eq!(
            resolver.property_ids(),
            &[PropertyId::ATTRIBUTE, PropertyId(40), PropertyId(41)]
        );
    }

    #[test]
    fn test_enumeration_failure_tracks_nothing() {
        let mut registry = CountingRegistry::new(vec![PropertyId(40)]);
        registry.broken = true;
        let resolver = DisplayAttributeResolver::build(&registry);
        assert!(resolver.property_ids().is_empty());
    }

    #[test]
    fn test_first_resolvable_property_wins() {
        let registry = CountingRegistry::new(vec![PropertyId(40)]);
        let resolver = DisplayAttributeResolver::build(&registry);

        // System attribute carries an unknown id, custom property a known one.
        let span = PropertySpan {
            range: (),
            values: vec![(PropertyId::ATTRIBUTE, 3), (PropertyId(40), 7)],
        };
        assert_eq!(resolver.attribute_for(&span), AttributeId(7));

        let unknown = PropertySpan {
            range: (),
            values: vec![(PropertyId::ATTRIBUTE, 3)],
        };
        assert_eq!(resolver.attribute_for(&unknown), AttributeId::NONE);
    }

    #[test]
    fn test_lookups_are_memoized() {
        let registry = CountingRegistry::new(Vec::new());
        let resolver = DisplayAttributeResolver::build(&registry);
        for _ in 0..4 {
            assert!(resolver.resolve(AttributeId(7)).is_some());
            assert!(resolver.resolve(AttributeId(9)).is_none());
        }
        assert_eq!(registry.lookups.get(), 2);
        assert!(resolver.resolve(AttributeId::NONE).is_none());
        assert_eq!(registry.lookups.get(), 2);
    }

    #[test]
    fn test_resolve_all_defaults_unknown() {
        let registry = CountingRegistry::new(Vec::new());
        let resolver = DisplayAttributeResolver::build(&registry);
        let attrs = resolver.resolve_all(&[AttributeId(7), AttributeId::NONE, AttributeId(2)]);
        assert_eq!(attrs[0].underline, UnderlineStyle::Squiggle);
        assert_eq!(attrs[1], DisplayAttribute::default());
        assert_eq!(attrs[2].class, AttributeClass::Input);
    }
}
