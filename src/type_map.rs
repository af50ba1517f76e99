//! Maps OCSF attribute types to SQLAlchemy / PostgreSQL column types.
//!
//! # Type Mapping Table
//!
//! | OCSF type | SQLAlchemy type | PostgreSQL type | Notes |
//! |-----------|-----------------|-----------------|-------|
//! | `string_t`, `url_t`, `path_t`, `json_t` | `Text` | `TEXT` | `json_t` is stored as text, not JSONB |
//! | `integer_t`, `port_t` | `Integer` | `INTEGER` | |
//! | `long_t`, `timestamp_t` | `BigInteger` | `BIGINT` | timestamps are epoch milliseconds |
//! | `float_t` | `Float` | `REAL` | |
//! | `boolean_t` | `Boolean` | `BOOLEAN` | |
//! | `datetime_t` | `DateTime(timezone=True)` | `TIMESTAMP WITH TIME ZONE` | |
//! | `ip_t` | `INET` | `INET` | PostgreSQL dialect type |
//! | `subnet_t` | `CIDR` | `CIDR` | PostgreSQL dialect type |
//! | `mac_t`, `hostname_t`, `email_t`, `file_hash_t` | `String(n)` | `VARCHAR(n)` | length-limited |
//! | `uuid_t` | `Uuid` | `UUID` | |
//! | `bytestring_t` | `LargeBinary` | `BYTEA` | |
//! | Unknown `*_t` types | `Text` | `TEXT` | Fallback |
//!
//! Any type name that is neither in the table nor carries the `_t` scalar
//! suffix is treated as a reference to another schema object.

use std::collections::BTreeMap;

/// Broad family of an OCSF scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeCategory {
    Primitive,
    Network,
    Temporal,
    Special,
}

/// How one OCSF scalar type is rendered as a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// OCSF type name (e.g., `"ip_t"`).
    pub ocsf_type: String,

    /// SQLAlchemy type symbol (e.g., `"String"`, `"INET"`).
    pub sa_type: String,

    /// Python annotation used inside `Mapped[...]`.
    pub python_type: String,

    /// Native PostgreSQL column type.
    pub postgres_type: String,

    pub category: TypeCategory,

    /// Length limit rendered as `String(n)`.
    pub max_length: Option<u32>,

    /// Whether the symbol comes from `sqlalchemy.dialects.postgresql`.
    pub dialect: bool,

    /// Rendered as `DateTime(timezone=True)`.
    pub timezone: bool,
}

impl TypeMapping {
    /// Create a mapping with no length limit from the core `sqlalchemy` module.
    pub fn new(
        ocsf_type: &str,
        sa_type: &str,
        python_type: &str,
        postgres_type: &str,
        category: TypeCategory,
    ) -> Self {
        Self {
            ocsf_type: ocsf_type.to_string(),
            sa_type: sa_type.to_string(),
            python_type: python_type.to_string(),
            postgres_type: postgres_type.to_string(),
            category,
            max_length: None,
            dialect: false,
            timezone: false,
        }
    }

    /// Set a length limit.
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Mark the type as PostgreSQL dialect specific.
    pub fn dialect_specific(mut self) -> Self {
        self.dialect = true;
        self
    }

    /// Mark the type as timezone aware.
    pub fn with_timezone(mut self) -> Self {
        self.timezone = true;
        self
    }

    /// Column type expression, e.g. `"Text"`, `"String(253)"` or
    /// `"DateTime(timezone=True)"`.
    pub fn column_type(&self) -> String {
        match self.max_length {
            Some(len) => format!("{}({len})", self.sa_type),
            None if self.timezone => format!("{}(timezone=True)", self.sa_type),
            None => self.sa_type.clone(),
        }
    }
}

/// Suffix every OCSF scalar type name carries.
const SCALAR_SUFFIX: &str = "_t";

/// Type name used when an attribute's type could not be resolved.
pub const DEFAULT_TYPE: &str = "string_t";

fn builtin_mappings() -> Vec<TypeMapping> {
    use TypeCategory::{Network, Primitive, Special, Temporal};

    vec![
        TypeMapping::new("string_t", "Text", "str", "TEXT", Primitive),
        TypeMapping::new("integer_t", "Integer", "int", "INTEGER", Primitive),
        TypeMapping::new("long_t", "BigInteger", "int", "BIGINT", Primitive),
        TypeMapping::new("float_t", "Float", "float", "REAL", Primitive),
        TypeMapping::new("boolean_t", "Boolean", "bool", "BOOLEAN", Primitive),
        // Milliseconds since epoch.
        TypeMapping::new("timestamp_t", "BigInteger", "int", "BIGINT", Temporal),
        TypeMapping::new(
            "datetime_t",
            "DateTime",
            "datetime",
            "TIMESTAMP WITH TIME ZONE",
            Temporal,
        )
        .with_timezone(),
        TypeMapping::new("ip_t", "INET", "str", "INET", Network).dialect_specific(),
        TypeMapping::new("mac_t", "String", "str", "VARCHAR(17)", Network).with_max_length(17),
        TypeMapping::new("subnet_t", "CIDR", "str", "CIDR", Network).dialect_specific(),
        TypeMapping::new("port_t", "Integer", "int", "INTEGER", Network),
        // RFC 1035 limit.
        TypeMapping::new("hostname_t", "String", "str", "VARCHAR(253)", Network)
            .with_max_length(253),
        // RFC 5321 limit.
        TypeMapping::new("email_t", "String", "str", "VARCHAR(254)", Network)
            .with_max_length(254),
        TypeMapping::new("url_t", "Text", "str", "TEXT", Network),
        TypeMapping::new("json_t", "Text", "str", "TEXT", Special),
        TypeMapping::new("uuid_t", "Uuid", "str", "UUID", Special),
        TypeMapping::new("path_t", "Text", "str", "TEXT", Primitive),
        // SHA-512 hex digest.
        TypeMapping::new("file_hash_t", "String", "str", "VARCHAR(128)", Primitive)
            .with_max_length(128),
        TypeMapping::new("bytestring_t", "LargeBinary", "bytes", "BYTEA", Primitive),
        // String-family aliases found in the OCSF source tree.
        TypeMapping::new("file_name_t", "Text", "str", "TEXT", Primitive),
        TypeMapping::new("file_path_t", "Text", "str", "TEXT", Primitive),
        TypeMapping::new("username_t", "Text", "str", "TEXT", Primitive),
        TypeMapping::new("process_name_t", "Text", "str", "TEXT", Primitive),
        TypeMapping::new("resource_uid_t", "Text", "str", "TEXT", Primitive),
    ]
}

/// Lookup table from OCSF scalar types to column types.
#[derive(Debug, Clone)]
pub struct TypeMapper {
    builtin: BTreeMap<String, TypeMapping>,
    custom: BTreeMap<String, TypeMapping>,
    fallback: TypeMapping,
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeMapper {
    pub fn new() -> Self {
        let builtin = builtin_mappings()
            .into_iter()
            .map(|m| (m.ocsf_type.clone(), m))
            .collect();
        Self {
            builtin,
            custom: BTreeMap::new(),
            fallback: TypeMapping::new("unknown", "Text", "str", "TEXT", TypeCategory::Primitive),
        }
    }

    /// Mapping for an OCSF type: custom entries first, then built-ins, then
    /// the `Text` fallback.
    pub fn mapping(&self, ocsf_type: &str) -> &TypeMapping {
        self.custom
            .get(ocsf_type)
            .or_else(|| self.builtin.get(ocsf_type))
            .unwrap_or(&self.fallback)
    }

    /// Add or replace a mapping. Custom mappings shadow built-ins.
    pub fn register_custom_mapping(&mut self, mapping: TypeMapping) {
        self.custom.insert(mapping.ocsf_type.clone(), mapping);
    }

    /// SQLAlchemy column type expression for an OCSF type.
    pub fn column_type(&self, ocsf_type: &str) -> String {
        self.mapping(ocsf_type).column_type()
    }

    /// PostgreSQL column type for an OCSF type.
    pub fn postgres_type(&self, ocsf_type: &str) -> &str {
        &self.mapping(ocsf_type).postgres_type
    }

    /// Whether `type_name` names a scalar.
    ///
    /// Scalars are the mapped types plus anything carrying the `_t` suffix.
    pub fn is_scalar_type(&self, type_name: &str) -> bool {
        self.custom.contains_key(type_name)
            || self.builtin.contains_key(type_name)
            || type_name.ends_with(SCALAR_SUFFIX)
    }

    /// Whether `type_name` refers to another schema entity.
    pub fn is_object_type(&self, type_name: &str) -> bool {
        !self.is_scalar_type(type_name)
    }

    /// All built-in OCSF type names, sorted.
    pub fn primitive_types(&self) -> Vec<&str> {
        self.builtin.keys().map(String::as_str).collect()
    }

    /// Built-in OCSF type names in one category, sorted.
    pub fn types_by_category(&self, category: TypeCategory) -> Vec<&str> {
        self.builtin
            .values()
            .filter(|m| m.category == category)
            .map(|m| m.ocsf_type.as_str())
            .collect()
    }
}
