//! Constraint and return attributes.

use serde::{Deserialize, Serialize};

/// Column name under which the database's opaque node identifier is returned.
pub const INTERNAL_ID_COLUMN: &str = "NEO4JID";

/// An attribute used to constrain or return a node.
///
/// `InternalId` is the sentinel meaning "use the engine's opaque per-node
/// identifier" instead of a named property. Wherever it appears, statements
/// use `ID(x)` and parsed rows carry the value under [`INTERNAL_ID_COLUMN`].
///
/// In YAML the sentinel is written `internal_id` and a property as
/// `{ property: name }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AttributeRepr", into = "AttributeRepr")]
pub enum Attribute {
    InternalId,
    Property(String),
}

/// Keyword used for [`Attribute::InternalId`] in configuration files.
const INTERNAL_ID_KEYWORD: &str = "internal_id";

/// Configuration form of an [`Attribute`]: a bare keyword or a
/// `property` map.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AttributeRepr {
    Keyword(String),
    Property { property: String },
}

impl TryFrom<AttributeRepr> for Attribute {
    type Error = String;

    fn try_from(repr: AttributeRepr) -> Result<Self, Self::Error> {
        match repr {
            AttributeRepr::Keyword(keyword) if keyword == INTERNAL_ID_KEYWORD => {
                Ok(Self::InternalId)
            }
            AttributeRepr::Keyword(other) => Err(format!(
                "unknown attribute `{}`, expected `{}` or `property: <name>`",
                other, INTERNAL_ID_KEYWORD
            )),
            AttributeRepr::Property { property } => Ok(Self::Property(property)),
        }
    }
}

impl From<Attribute> for AttributeRepr {
    fn from(attribute: Attribute) -> Self {
        match attribute {
            Attribute::InternalId => Self::Keyword(INTERNAL_ID_KEYWORD.to_string()),
            Attribute::Property(property) => Self::Property { property },
        }
    }
}

impl Attribute {
    /// Shorthand for `Attribute::Property`.
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }

    pub fn is_internal_id(&self) -> bool {
        matches!(self, Self::InternalId)
    }

    /// Expression selecting this attribute on a query variable.
    pub fn expression(&self, variable: &str) -> String {
        match self {
            Self::InternalId => format!("ID({})", variable),
            Self::Property(name) => format!("{}.{}", variable, name),
        }
    }

    /// Column alias used in RETURN clauses and in parsed rows.
    pub fn column(&self) -> &str {
        match self {
            Self::InternalId => INTERNAL_ID_COLUMN,
            Self::Property(name) => name,
        }
    }

    /// Suffix appended to a node's internal label to name its parameter.
    pub fn parameter_suffix(&self) -> &str {
        match self {
            Self::InternalId => "internalID",
            Self::Property(name) => name,
        }
    }

    /// `<expression> AS <column>` for RETURN clauses.
    pub fn return_element(&self, variable: &str) -> String {
        format!("{} AS {}", self.expression(variable), self.column())
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InternalId => write!(f, "<internal id>"),
            Self::Property(name) => write!(f, "{}", name),
        }
    }
}
