use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;


/// Kind of monitored entity an identifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Device,
    Asset,
    Customer,
    Tenant,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Device => "DEVICE",
            EntityType::Asset => "ASSET",
            EntityType::Customer => "CUSTOMER",
            EntityType::Tenant => "TENANT",
        }
    }
}

impl FromStr for EntityType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEVICE" => Ok(EntityType::Device),
            "ASSET" => Ok(EntityType::Asset),
            "CUSTOMER" => Ok(EntityType::Customer),
            "TENANT" => Ok(EntityType::Tenant),
            other => Err(ParseError::UnknownType(other.to_string())),
        }
    }
}

/// Identifier of a monitored entity: a type tag plus a UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    pub entity_type: EntityType,
    pub id: Uuid,
}

impl EntityId {
    pub fn new(entity_type: EntityType, id: Uuid) -> Self {
        Self { entity_type, id }
    }

    /// Device identifier with a fresh random UUID
    pub fn new_device() -> Self {
        Self::new(EntityType::Device, Uuid::new_v4())
    }

    /// A nil UUID is treated as an absent identifier
    pub fn is_empty(&self) -> bool {
        self.id.is_nil()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type.as_str(), self.id)
    }
}

impl FromStr for EntityId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_entity_id(s)
    }
}

/// Entity ID parsing errors
#[derive(Debug, PartialEq)]
pub enum ParseError {
    /// Empty entity ID
    Empty,
    /// Missing "TYPE:uuid" separator or empty parts
    InvalidFormat(String),
    /// Type tag is not a known entity type
    UnknownType(String),
    /// UUID part does not parse
    InvalidUuid(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "entity id is empty"),
            ParseError::InvalidFormat(msg) => write!(f, "{}", msg),
            ParseError::UnknownType(t) => write!(f, "unknown entity type '{}'", t),
            ParseError::InvalidUuid(u) => write!(f, "invalid entity uuid '{}'", u),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse entity ID from its textual form
///
/// Format is "TYPE:uuid", where TYPE is one of DEVICE, ASSET, CUSTOMER, TENANT.
///
/// # Examples
///
/// ```
/// use tskv::entity::{parse_entity_id, EntityType};
///
/// let parsed = parse_entity_id("DEVICE:6f1c2a8e-3b7d-4c55-9a0e-2f4d1b8c7e90").unwrap();
/// assert_eq!(parsed.entity_type, EntityType::Device);
/// ```
pub fn parse_entity_id(entity_id: &str) -> Result<EntityId, ParseError> {
    if entity_id.is_empty() {
        return Err(ParseError::Empty);
    }

    let (type_part, uuid_part) = entity_id.split_once(':').ok_or_else(|| {
        ParseError::InvalidFormat(format!(
            "Entity ID '{}' must have the form TYPE:uuid",
            entity_id
        ))
    })?;

    if type_part.is_empty() || uuid_part.is_empty() {
        return Err(ParseError::InvalidFormat(format!(
            "Entity ID '{}' has an empty type or uuid part",
            entity_id
        )));
    }

    let entity_type = type_part.parse::<EntityType>()?;
    let id = Uuid::parse_str(uuid_part).map_err(|_| ParseError::InvalidUuid(uuid_part.to_string()))?;

    Ok(EntityId { entity_type, id })
}

/// Entity record as held by the registry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    /// Human-readable name
    pub name: String,

    /// Free-form metadata owned by the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<Value>,

    /// Latest-known sensor summary document, replaced on every ingested batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Value>,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            additional_info: None,
            sensors: None,
        }
    }
}
