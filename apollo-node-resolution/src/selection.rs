use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::schema::EntityTypeDefinition;

/// A selection as found in query plans.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum Selection {
    /// A field selection.
    Field(Field),

    /// An inline fragment selection.
    InlineFragment(InlineFragment),
}

/// The field that is used
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// An optional alias for the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// The name of the field.
    pub name: String,

    /// The selections for the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selections: Option<Vec<Selection>>,
}

/// An inline fragment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    /// The required fragment type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_condition: Option<String>,

    /// The selections from the fragment.
    pub selections: Vec<Selection>,
}

/// The fields a client requested on a node, with their own nested selections.
///
/// Leaf fields map to an empty selection set. Aliases are resolved to field names: a resolver
/// computes fields, the executor takes care of naming them in the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    fields: IndexMap<String, SelectionSet>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a leaf field.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.entry(name.into()).or_default();
        self
    }

    /// Requests a field together with a selection of its own fields.
    pub fn nested(mut self, name: impl Into<String>, selections: SelectionSet) -> Self {
        self.fields.entry(name.into()).or_default().merge(selections);
        self
    }

    /// Converts query plan selections made on an object of the entity type `definition`.
    ///
    /// Inline fragments apply when they have no type condition, or when the condition is the
    /// type itself or one of its interfaces. Nested selections are converted without type
    /// filtering.
    pub fn from_selections(definition: &EntityTypeDefinition, selections: &[Selection]) -> Self {
        let mut set = SelectionSet::new();
        set.collect(Some(definition), selections);
        set
    }

    fn collect(&mut self, definition: Option<&EntityTypeDefinition>, selections: &[Selection]) {
        for selection in selections {
            match selection {
                Selection::Field(Field {
                    name, selections, ..
                }) => {
                    let nested = self.fields.entry(name.clone()).or_default();
                    if let Some(selections) = selections {
                        nested.collect(None, selections);
                    }
                }
                Selection::InlineFragment(InlineFragment {
                    type_condition,
                    selections,
                }) => {
                    let applies = match (type_condition, definition) {
                        (None, _) | (_, None) => true,
                        (Some(condition), Some(definition)) => definition.satisfies(condition),
                    };
                    if applies {
                        self.collect(definition, selections);
                    }
                }
            }
        }
    }

    fn merge(&mut self, other: SelectionSet) {
        for (name, nested) in other.fields {
            self.fields.entry(name).or_default().merge(nested);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Selection made on `field`, if it was requested.
    pub fn get(&self, field: &str) -> Option<&SelectionSet> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// The requested fields a node resolver for `definition` has to compute.
    pub fn requested_responsibilities<'a>(
        &'a self,
        definition: &'a EntityTypeDefinition,
    ) -> impl Iterator<Item = &'a str> {
        self.fields()
            .filter(move |field| definition.is_responsible_for(field))
    }
}
