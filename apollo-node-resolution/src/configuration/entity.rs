use std::collections::HashMap;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::de;
use serde::de::DeserializeOwned;
use serde_yaml::Mapping;

use crate::error::RegistrationError;
use crate::global_id::EntityType;
use crate::schema::SchemaRegistry;

/// Options that apply to every entity type, with per entity type overrides.
///
/// An override only needs the options it changes: it is merged field by field over `all`.
#[derive(Debug, Clone, Default, Serialize, JsonSchema)]
pub struct EntityConfiguration<T>
where
    T: std::fmt::Debug + Default + Clone + Serialize + JsonSchema,
{
    /// options applying to all entity types
    #[serde(default)]
    pub(crate) all: T,
    /// per entity type options
    #[serde(default)]
    pub(crate) types: HashMap<EntityType, T>,
}

impl<T> EntityConfiguration<T>
where
    T: std::fmt::Debug + Default + Clone + Serialize + JsonSchema,
{
    pub(crate) fn get(&self, entity_type: &EntityType) -> &T {
        self.types.get(entity_type).unwrap_or(&self.all)
    }

    /// Fails on the first override naming a type the schema does not declare.
    ///
    /// `section` is the configuration key the overrides live under, for error reporting.
    pub(crate) fn check_entity_types(
        &self,
        section: &str,
        schema: &SchemaRegistry,
    ) -> Result<(), RegistrationError> {
        let mut unknown: Vec<&EntityType> = self
            .types
            .keys()
            .filter(|entity_type| !schema.contains(entity_type))
            .collect();
        unknown.sort();
        match unknown.first() {
            Some(entity_type) => Err(RegistrationError::UnknownConfiguredEntityType {
                entity_type: entity_type.to_string(),
                path: format!("{section}.types.{entity_type}"),
            }),
            None => Ok(()),
        }
    }
}

/// Overrides as written, before they are merged over `all`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Overrides {
    #[serde(default)]
    all: Mapping,
    #[serde(default)]
    types: HashMap<EntityType, Mapping>,
}

impl<'de, T> Deserialize<'de> for EntityConfiguration<T>
where
    T: DeserializeOwned,
    T: std::fmt::Debug + Default + Clone + Serialize + JsonSchema,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Overrides { all, types } = Overrides::deserialize(deserializer)?;

        let types = types
            .into_iter()
            .map(|(entity_type, options)| {
                let mut merged = all.clone();
                for (key, value) in options {
                    merged.insert(key, value);
                }
                let options = from_mapping(merged).map_err(|error| {
                    de::Error::custom(format!("types.{entity_type}: {error}"))
                })?;
                Ok((entity_type, options))
            })
            .collect::<Result<_, D::Error>>()?;
        let all = from_mapping(all).map_err(|error| de::Error::custom(format!("all: {error}")))?;

        Ok(EntityConfiguration { all, types })
    }
}

fn from_mapping<T: DeserializeOwned>(mapping: Mapping) -> Result<T, serde_yaml::Error> {
    serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
}
