//! Entity types implementing `Node`, and which resolver owns each of their fields.
use apollo_compiler::schema::ExtendedType;
use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::error::RegistrationError;
use crate::error::ResolutionError;
use crate::global_id::EntityType;
use crate::global_id::GlobalId;

pub(crate) const NODE_INTERFACE: &str = "Node";
pub(crate) const ID_FIELD: &str = "id";
pub(crate) const TYPENAME_FIELD: &str = "__typename";
/// Directive marking a field that has its own field-level resolver.
pub(crate) const RESOLVER_DIRECTIVE: &str = "resolver";

/// Which resolver produces a field of an entity type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldOwner {
    /// The `id` field: an input of node resolution, never one of its outputs.
    Supplied,
    /// Part of the node resolver's responsibility set.
    NodeResolver,
    /// Produced by a dedicated field-level resolver.
    FieldResolver,
}

/// A `Node` entity type with the owner of each of its fields.
#[derive(Clone, Debug)]
pub struct EntityTypeDefinition {
    name: EntityType,
    interfaces: Vec<String>,
    fields: IndexMap<String, FieldOwner>,
}

impl EntityTypeDefinition {
    fn new(name: EntityType) -> Self {
        let mut fields = IndexMap::new();
        fields.insert(ID_FIELD.to_string(), FieldOwner::Supplied);
        Self {
            name,
            interfaces: vec![NODE_INTERFACE.to_string()],
            fields,
        }
    }

    pub fn name(&self) -> &EntityType {
        &self.name
    }

    /// Interfaces the type implements, `Node` first.
    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.interfaces.iter().map(String::as_str)
    }

    /// Whether a fragment with `type_condition` applies to objects of this type.
    pub fn satisfies(&self, type_condition: &str) -> bool {
        self.name.as_str() == type_condition || self.interfaces().any(|i| i == type_condition)
    }

    /// Every field of the type with its owner, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldOwner)> {
        self.fields
            .iter()
            .map(|(name, owner)| (name.as_str(), *owner))
    }

    pub fn owner(&self, field: &str) -> Option<FieldOwner> {
        self.fields.get(field).copied()
    }

    /// Fields the node resolver is obligated to produce.
    pub fn responsibility_set(&self) -> impl Iterator<Item = &str> {
        self.fields_owned_by(FieldOwner::NodeResolver)
    }

    pub fn field_resolver_fields(&self) -> impl Iterator<Item = &str> {
        self.fields_owned_by(FieldOwner::FieldResolver)
    }

    pub fn is_responsible_for(&self, field: &str) -> bool {
        self.owner(field) == Some(FieldOwner::NodeResolver)
    }

    fn fields_owned_by(&self, owner: FieldOwner) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(move |(_, o)| **o == owner)
            .map(|(name, _)| name.as_str())
    }
}

/// The entity types known to the engine.
///
/// Global ids are validated against it and the coordinator uses it to check what node resolvers
/// return.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    types: IndexMap<EntityType, EntityTypeDefinition>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// Extracts entity types from GraphQL SDL.
    ///
    /// Every object type implementing `Node` is an entity type, along with the other interfaces
    /// it implements. Fields marked with `@resolver` belong to field-level resolvers, all others
    /// except `id` to the node resolver.
    pub fn from_sdl(sdl: &str) -> Result<Self, RegistrationError> {
        let schema = apollo_compiler::Schema::parse_and_validate(sdl, "schema.graphql")
            .map_err(|invalid| RegistrationError::InvalidSchema(invalid.errors.to_string()))?;

        let mut builder = Self::builder();
        for (name, ty) in &schema.types {
            let ExtendedType::Object(object) = ty else {
                continue;
            };
            if !object
                .implements_interfaces
                .iter()
                .any(|interface| interface.name.as_str() == NODE_INTERFACE)
            {
                continue;
            }

            builder = builder.entity_type(
                name.as_str(),
                object.fields.keys().map(|field| field.as_str()),
            )?;
            for interface in &object.implements_interfaces {
                builder = builder.interface(name.as_str(), interface.name.as_str())?;
            }
            for (field_name, field) in &object.fields {
                if field.directives.has(RESOLVER_DIRECTIVE) {
                    builder = builder.field_resolver(name.as_str(), field_name.as_str())?;
                }
            }
        }

        Ok(builder.build())
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeDefinition> {
        self.types.get(&EntityType::new(name))
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityTypeDefinition> {
        self.types.values()
    }

    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.types.contains_key(entity_type)
    }

    /// Builds a global id, checking that the entity type exists and the internal id is not empty.
    pub fn global_id(
        &self,
        entity_type: &str,
        internal_id: &str,
    ) -> Result<GlobalId, ResolutionError> {
        let Some(definition) = self.entity_type(entity_type) else {
            return Err(ResolutionError::invalid_identity(format!(
                "unknown entity type '{entity_type}'"
            )));
        };
        if internal_id.is_empty() {
            return Err(ResolutionError::invalid_identity(format!(
                "empty internal id for '{entity_type}'"
            )));
        }

        Ok(GlobalId::new_unchecked(
            definition.name().clone(),
            internal_id,
        ))
    }
}

#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    types: IndexMap<EntityType, EntityTypeDefinition>,
}

impl SchemaRegistryBuilder {
    /// Declares an entity type and its fields. `id` is implied and always supplied.
    ///
    /// Fields start out owned by the node resolver; see [`Self::field_resolver`].
    pub fn entity_type<I, F>(mut self, name: &str, fields: I) -> Result<Self, RegistrationError>
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        let entity_type = EntityType::new(name);
        let mut definition = EntityTypeDefinition::new(entity_type.clone());
        for field in fields {
            let field = field.into();
            if field != ID_FIELD {
                definition.fields.insert(field, FieldOwner::NodeResolver);
            }
        }

        match self.types.entry(entity_type) {
            Entry::Occupied(_) => Err(RegistrationError::DuplicateEntityType(name.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(definition);
                Ok(self)
            }
        }
    }

    /// Hands `field` over to a field-level resolver, removing it from the responsibility set.
    pub fn field_resolver(
        mut self,
        entity_type: &str,
        field: &str,
    ) -> Result<Self, RegistrationError> {
        let definition = self
            .types
            .get_mut(&EntityType::new(entity_type))
            .ok_or_else(|| RegistrationError::UnknownEntityType(entity_type.to_string()))?;
        match definition.fields.get_mut(field) {
            None => Err(RegistrationError::UnknownField {
                entity_type: entity_type.to_string(),
                field: field.to_string(),
            }),
            Some(FieldOwner::Supplied) => Err(RegistrationError::SuppliedField {
                entity_type: entity_type.to_string(),
                field: field.to_string(),
            }),
            Some(owner) => {
                *owner = FieldOwner::FieldResolver;
                Ok(self)
            }
        }
    }

    /// Records that `entity_type` implements `interface`. Every entity type implements `Node`.
    pub fn interface(
        mut self,
        entity_type: &str,
        interface: &str,
    ) -> Result<Self, RegistrationError> {
        let definition = self
            .types
            .get_mut(&EntityType::new(entity_type))
            .ok_or_else(|| RegistrationError::UnknownEntityType(entity_type.to_string()))?;
        if !definition.interfaces.iter().any(|i| i == interface) {
            definition.interfaces.push(interface.to_string());
        }
        Ok(self)
    }

    pub fn build(self) -> SchemaRegistry {
        SchemaRegistry { types: self.types }
    }
}
