//! Schema analysis: relationships, array attributes, enums, and columns.
//!
//! [`SchemaAnalyzer::analyze`] turns one raw [`OcsfSchema`] snapshot into an
//! [`AnalyzedSchema`], the only structure the filter and the generator read.
//!
//! Relationship inference uses the scalar heuristic from [`TypeMapper`]: an
//! attribute refers to another entity when it names an `object_type`, or when
//! its type is not a scalar.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::Result;
use crate::naming::NamingConvention;
use crate::resolver::{
    EntityKind, InheritanceResolver, InheritanceTree, ResolvedAttribute, ResolvedEntity,
    ResolvedEvent, ResolvedObject,
};
use crate::schema::{OcsfCategory, OcsfEnumValue, OcsfSchema, SchemaLoader};
use crate::type_map::{DEFAULT_TYPE, TypeMapper};

/// How a reference attribute is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// Single reference through an `<attr>_id` column.
    ForeignKey,
    /// Many-valued reference through a link table.
    AssociationTable,
}

/// One attribute that references another entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipInfo {
    pub source_entity: String,
    pub attribute_name: String,
    pub target_entity: String,
    pub is_array: bool,
    pub is_nullable: bool,
    pub kind: RelationshipKind,
}

/// One array-valued attribute and its backing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayAttributeInfo {
    pub parent_entity: String,
    pub attribute_name: String,
    pub element_type: String,
    pub is_primitive: bool,
    pub association_table_name: String,
}

/// An integer enum found on an attribute or in the dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumInfo {
    /// Derived name, `<attribute>_enum`.
    pub name: String,
    pub values: BTreeMap<i64, String>,
    pub description: String,
}

/// How one own attribute is stored on its entity's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// A value column typed from the OCSF scalar type.
    Scalar { ocsf_type: String },
    /// An integer reference to `target`'s table.
    ForeignKey { target: String },
}

/// A column derived from one own, non-array attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Attribute the column stores.
    pub attribute: String,
    /// Column name: the attribute name, or `<attribute>_id` for references.
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub caption: String,
    pub description: String,
}

impl ColumnInfo {
    pub fn is_foreign_key(&self) -> bool {
        matches!(self.kind, ColumnKind::ForeignKey { .. })
    }
}

/// The analyzed schema handed to the filter and the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedSchema {
    pub version: String,
    pub objects: BTreeMap<String, ResolvedObject>,
    pub events: BTreeMap<String, ResolvedEvent>,
    pub object_tree: InheritanceTree,
    pub event_tree: InheritanceTree,
    pub relationships: Vec<RelationshipInfo>,
    pub array_attributes: Vec<ArrayAttributeInfo>,
    pub enums: BTreeMap<String, EnumInfo>,
    pub categories: BTreeMap<String, OcsfCategory>,
}

impl AnalyzedSchema {
    /// Look up an entity of either kind.
    pub fn entity(&self, name: &str, kind: EntityKind) -> Option<&ResolvedEntity> {
        match kind {
            EntityKind::Object => self.objects.get(name),
            EntityKind::Event => self.events.get(name).map(|e| &e.entity),
        }
    }

    pub fn tree(&self, kind: EntityKind) -> &InheritanceTree {
        match kind {
            EntityKind::Object => &self.object_tree,
            EntityKind::Event => &self.event_tree,
        }
    }

    pub fn relationship(&self, source: &str, attribute: &str) -> Option<&RelationshipInfo> {
        self.relationships
            .iter()
            .find(|r| r.source_entity == source && r.attribute_name == attribute)
    }

    pub fn array_attribute(&self, parent: &str, attribute: &str) -> Option<&ArrayAttributeInfo> {
        self.array_attributes
            .iter()
            .find(|a| a.parent_entity == parent && a.attribute_name == attribute)
    }
}

/// Target entity of a reference attribute, if it is one.
pub fn reference_target<'a>(attr: &'a ResolvedAttribute, types: &TypeMapper) -> Option<&'a str> {
    if let Some(target) = attr.object_type.as_deref() {
        return Some(target);
    }
    attr.type_ref
        .as_named()
        .filter(|name| types.is_object_type(name))
}

/// Columns for an entity's own, non-array attributes, in name order.
///
/// A foreign key column whose derived `<attr>_id` name is taken by a scalar
/// attribute becomes `<attr>_ref_id` (then `<attr>_ref_ref_id`, ...).
pub fn entity_columns(
    entity: &ResolvedEntity,
    types: &TypeMapper,
    naming: &NamingConvention,
) -> Vec<ColumnInfo> {
    let own = || entity.own_attributes.values().filter(|attr| !attr.is_array);
    let scalar_names: BTreeSet<String> = own()
        .filter(|attr| reference_target(attr, types).is_none())
        .map(|attr| naming.column_name(&attr.name))
        .collect();

    own()
        .map(|attr| {
            let (name, kind) = match reference_target(attr, types) {
                Some(target) => (
                    foreign_key_column(&attr.name, &scalar_names, naming),
                    ColumnKind::ForeignKey {
                        target: target.to_string(),
                    },
                ),
                None => (
                    naming.column_name(&attr.name),
                    ColumnKind::Scalar {
                        ocsf_type: attr.type_ref.name_or_default().to_string(),
                    },
                ),
            };
            ColumnInfo {
                attribute: attr.name.clone(),
                name,
                kind,
                nullable: !attr.is_required(),
                caption: attr.caption.clone(),
                description: attr.description.clone(),
            }
        })
        .collect()
}

fn foreign_key_column(attribute: &str, taken: &BTreeSet<String>, naming: &NamingConvention) -> String {
    let mut stem = attribute.to_string();
    let mut column = naming.foreign_key_column(&stem);
    while taken.contains(&column) {
        log::debug!("'{column}' is taken by a scalar attribute; renaming the foreign key of '{attribute}'");
        stem.push_str("_ref");
        column = naming.foreign_key_column(&stem);
    }
    column
}

/// Combines loading, inheritance resolution, and relationship analysis.
#[derive(Debug, Clone)]
pub struct SchemaAnalyzer {
    schema: OcsfSchema,
    types: TypeMapper,
    naming: NamingConvention,
}

impl SchemaAnalyzer {
    /// Analyze an already-loaded schema.
    pub fn new(schema: OcsfSchema) -> Self {
        Self {
            schema,
            types: TypeMapper::new(),
            naming: NamingConvention::default(),
        }
    }

    /// Load the schema tree at `root` and prepare to analyze it.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(SchemaLoader::new(root)?.load()?))
    }

    pub fn with_type_mapper(mut self, types: TypeMapper) -> Self {
        self.types = types;
        self
    }

    /// Naming used for backing-table names and foreign key columns.
    pub fn with_naming(mut self, naming: NamingConvention) -> Self {
        self.naming = naming;
        self
    }

    pub fn schema(&self) -> &OcsfSchema {
        &self.schema
    }

    pub fn type_mapper(&self) -> &TypeMapper {
        &self.types
    }

    pub fn naming(&self) -> &NamingConvention {
        &self.naming
    }

    pub fn resolver(&self) -> InheritanceResolver<'_> {
        InheritanceResolver::new(&self.schema)
    }

    /// Resolve every entity and derive the relational structure.
    ///
    /// Nothing is cached; every call re-resolves the schema.
    pub fn analyze(&self) -> AnalyzedSchema {
        let resolver = self.resolver();
        let objects = resolver.resolve_all_objects();
        let events = resolver.resolve_all_events();

        let entities = || {
            objects
                .values()
                .chain(events.values().map(|e| &e.entity))
        };

        let relationships = entities()
            .flat_map(|e| {
                e.all_attributes
                    .values()
                    .filter_map(move |attr| self.relationship_for(&e.name, attr))
            })
            .collect();

        let array_attributes = entities()
            .flat_map(|e| {
                e.all_attributes
                    .values()
                    .filter(|attr| attr.is_array)
                    .map(move |attr| self.array_info(&e.name, attr))
            })
            .collect();

        let enums = self.extract_enums(entities());

        AnalyzedSchema {
            version: self.schema.version.clone(),
            object_tree: resolver.build_object_inheritance_tree(),
            event_tree: resolver.build_event_inheritance_tree(),
            relationships,
            array_attributes,
            enums,
            categories: self.schema.categories.clone(),
            objects,
            events,
        }
    }

    /// Entities an object references, sorted. Includes itself when it is
    /// self-referencing.
    pub fn get_object_dependencies(&self, name: &str) -> Vec<String> {
        let Some(object) = self.resolver().resolve_object(name) else {
            return Vec::new();
        };
        let deps: BTreeSet<&str> = object
            .all_attributes
            .values()
            .filter_map(|attr| reference_target(attr, &self.types))
            .collect();
        deps.into_iter().map(str::to_string).collect()
    }

    /// Topological object and event orders.
    pub fn get_generation_order(&self) -> (Vec<String>, Vec<String>) {
        let resolver = self.resolver();
        (
            resolver.build_object_inheritance_tree().topological_order,
            resolver.build_event_inheritance_tree().topological_order,
        )
    }

    /// Column layout for one entity. Empty if the entity does not exist.
    pub fn get_entity_columns(&self, name: &str, kind: EntityKind) -> Vec<ColumnInfo> {
        let resolver = self.resolver();
        let entity = match kind {
            EntityKind::Object => resolver.resolve_object(name),
            EntityKind::Event => resolver.resolve_event(name).map(|e| e.entity),
        };
        entity
            .map(|e| entity_columns(&e, &self.types, &self.naming))
            .unwrap_or_default()
    }

    fn relationship_for(&self, source: &str, attr: &ResolvedAttribute) -> Option<RelationshipInfo> {
        let target = reference_target(attr, &self.types)?;
        Some(RelationshipInfo {
            source_entity: source.to_string(),
            attribute_name: attr.name.clone(),
            target_entity: target.to_string(),
            is_array: attr.is_array,
            is_nullable: !attr.is_required(),
            kind: if attr.is_array {
                RelationshipKind::AssociationTable
            } else {
                RelationshipKind::ForeignKey
            },
        })
    }

    fn array_info(&self, parent: &str, attr: &ResolvedAttribute) -> ArrayAttributeInfo {
        let element_type = attr
            .object_type
            .as_deref()
            .or(attr.type_ref.as_named())
            .unwrap_or(DEFAULT_TYPE);
        ArrayAttributeInfo {
            parent_entity: parent.to_string(),
            attribute_name: attr.name.clone(),
            element_type: element_type.to_string(),
            is_primitive: self.types.is_scalar_type(element_type),
            association_table_name: self.naming.association_table_name(parent, &attr.name),
        }
    }

    /// Entity attributes first (objects, then events), then the dictionary.
    /// The first definition of each derived name wins.
    fn extract_enums<'e>(
        &self,
        entities: impl Iterator<Item = &'e ResolvedEntity>,
    ) -> BTreeMap<String, EnumInfo> {
        let mut enums = BTreeMap::new();
        let mut seen = BTreeSet::new();
        let mut offer = |attr_name: &str, description: &str, values: &BTreeMap<String, OcsfEnumValue>| {
            let name = format!("{attr_name}_enum");
            if !seen.insert(name.clone()) {
                return;
            }
            let values: BTreeMap<i64, String> = values
                .iter()
                .filter_map(|(key, v)| Some((key.trim().parse::<i64>().ok()?, v.caption.clone())))
                .collect();
            // String-keyed enums document values; they are not integer enums.
            // They still claim the name, so later definitions are dropped.
            if values.is_empty() {
                return;
            }
            enums.insert(
                name.clone(),
                EnumInfo {
                    name,
                    values,
                    description: description.to_string(),
                },
            );
        };

        for entity in entities {
            for attr in entity.all_attributes.values() {
                if let Some(values) = &attr.enum_values {
                    offer(&attr.name, &attr.description, values);
                }
            }
        }
        for (name, attr) in &self.schema.dictionary.attributes {
            if let Some(values) = &attr.enum_values {
                offer(name, attr.description.as_deref().unwrap_or_default(), values);
            }
        }
        enums
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Dictionary, OcsfEvent, OcsfObject, parse_attributes};
    use serde_json::json;

    fn schema() -> OcsfSchema {
        let objects = [
            ("_entity", json!({"attributes": {"name": {"type": "string_t"}}})),
            ("process", json!({"extends": "_entity", "attributes": {
                "pid": {"type": "integer_t", "requirement": "required"},
                "parent_process": {"type": "process"},
                "file": {"type": "object_t", "object_type": "file", "requirement": "required"},
                "loaded_modules": {"type": "string_t", "is_array": true},
                "sessions": {"type": "session[]"},
                "state_id": {"type": "integer_t", "enum": {"0": {"caption": "Unknown"}, "1": {"caption": "Running"}}}
            }})),
            ("file", json!({"extends": "_entity", "attributes": {
                "ip": {"type": "ip_t"},
                "method": {"type": "string_t", "enum": {"GET": {"caption": "Get"}}}
            }})),
            ("session", json!({"attributes": {"uid": {"type": "string_t"}}})),
        ];
        let events = [(
            "process_activity",
            json!({"uid": 1007, "attributes": {
                "process": {"type": "process", "requirement": "required"},
                "state_id": {"type": "integer_t", "enum": {"0": {"caption": "Other meaning"}}}
            }}),
        )];
        let dictionary = parse_attributes(
            &serde_json::from_value(json!({
                "severity_id": {"type": "integer_t", "description": "Severity.",
                                "enum": {"0": {"caption": "Unknown"}, "99": {"caption": "Other"}}}
            }))
            .unwrap(),
        )
        .unwrap();

        OcsfSchema {
            version: "1.4.0".to_string(),
            objects: objects
                .into_iter()
                .map(|(n, v)| (n.to_string(), OcsfObject::from_json(n, v).unwrap()))
                .collect(),
            events: events
                .into_iter()
                .map(|(n, v)| (n.to_string(), OcsfEvent::from_json(n, Some("system"), v).unwrap()))
                .collect(),
            dictionary: Dictionary { attributes: dictionary },
            ..Default::default()
        }
    }

    #[test]
    fn relationship_inference() {
        let analyzed = SchemaAnalyzer::new(schema()).analyze();

        let parent = analyzed.relationship("process", "parent_process").unwrap();
        assert_eq!(parent.target_entity, "process");
        assert_eq!(parent.kind, RelationshipKind::ForeignKey);
        assert!(parent.is_nullable);

        let file = analyzed.relationship("process", "file").unwrap();
        assert_eq!(file.target_entity, "file");
        assert!(!file.is_nullable);

        let sessions = analyzed.relationship("process", "sessions").unwrap();
        assert_eq!(sessions.kind, RelationshipKind::AssociationTable);
        assert!(sessions.is_array);

        let event_ref = analyzed.relationship("process_activity", "process").unwrap();
        assert_eq!(event_ref.target_entity, "process");

        // Scalars never become relationships.
        assert!(analyzed.relationship("process", "pid").is_none());
        assert!(analyzed.relationship("file", "ip").is_none());
    }

    #[test]
    fn array_attributes_cover_every_array() {
        let analyzed = SchemaAnalyzer::new(schema()).analyze();
        assert_eq!(analyzed.array_attributes.len(), 2);

        let modules = analyzed.array_attribute("process", "loaded_modules").unwrap();
        assert!(modules.is_primitive);
        assert_eq!(modules.element_type, "string_t");
        assert_eq!(modules.association_table_name, "ocsf_process_loaded_modules");

        let sessions = analyzed.array_attribute("process", "sessions").unwrap();
        assert!(!sessions.is_primitive);
        assert_eq!(sessions.element_type, "session");
    }

    #[test]
    fn backing_names_follow_naming_config() {
        let naming = NamingConvention::new(crate::naming::NamingConfig {
            table_prefix: "t_".to_string(),
            ..Default::default()
        });
        let analyzer = SchemaAnalyzer::new(schema()).with_naming(naming);
        let first = analyzer.analyze();
        let second = analyzer.analyze();
        let name = &first.array_attribute("process", "sessions").unwrap().association_table_name;
        assert_eq!(name, "t_process_sessions");
        assert_eq!(first.array_attributes, second.array_attributes);
    }

    #[test]
    fn enums_first_definition_wins() {
        let analyzed = SchemaAnalyzer::new(schema()).analyze();

        // Objects are scanned before events.
        let state = &analyzed.enums["state_id_enum"];
        assert_eq!(state.values[&1], "Running");
        assert_eq!(state.values[&0], "Unknown");

        let severity = &analyzed.enums["severity_id_enum"];
        assert_eq!(severity.values[&99], "Other");
        assert_eq!(severity.description, "Severity.");

        // String-keyed enums are not integer enums.
        assert!(!analyzed.enums.contains_key("method_enum"));
    }

    #[test]
    fn string_keyed_first_definition_still_claims_the_name() {
        let mut s = schema();
        s.events.insert(
            "zeta_activity".to_string(),
            OcsfEvent::from_json(
                "zeta_activity",
                Some("system"),
                json!({"attributes": {
                    "method": {"type": "integer_t", "enum": {"1": {"caption": "Later"}}}
                }}),
            )
            .unwrap(),
        );
        let analyzed = SchemaAnalyzer::new(s).analyze();

        // `file.method` is found first and has no integer keys.
        assert!(!analyzed.enums.contains_key("method_enum"));
        assert!(analyzed.enums.contains_key("state_id_enum"));
    }

    #[test]
    fn inherited_attributes_are_analyzed_for_children() {
        let mut s = schema();
        s.objects.insert(
            "child_process".to_string(),
            OcsfObject::from_json("child_process", json!({"extends": "process"})).unwrap(),
        );
        let analyzed = SchemaAnalyzer::new(s).analyze();
        assert!(analyzed.relationship("child_process", "parent_process").is_some());
        assert!(analyzed.array_attribute("child_process", "loaded_modules").is_some());
    }

    #[test]
    fn entity_columns_exclude_arrays() {
        let analyzer = SchemaAnalyzer::new(schema());
        let columns = analyzer.get_entity_columns("process", EntityKind::Object);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["file_id", "parent_process_id", "pid", "state_id"]);

        let fk = &columns[0];
        assert_eq!(fk.kind, ColumnKind::ForeignKey { target: "file".to_string() });
        assert!(!fk.nullable);
        assert!(columns[1].nullable);
        assert!(!columns[2].is_foreign_key());

        assert!(analyzer.get_entity_columns("nope", EntityKind::Object).is_empty());
        let event_cols = analyzer.get_entity_columns("process_activity", EntityKind::Event);
        assert_eq!(event_cols[0].name, "process_id");
    }

    #[test]
    fn foreign_key_column_avoids_scalar_names() {
        let mut s = schema();
        s.objects.insert(
            "device".to_string(),
            OcsfObject::from_json(
                "device",
                json!({"attributes": {
                    "owner": {"type": "session"},
                    "owner_id": {"type": "integer_t"},
                    "owner_ref_id": {"type": "string_t"}
                }}),
            )
            .unwrap(),
        );
        let columns = SchemaAnalyzer::new(s).get_entity_columns("device", EntityKind::Object);
        let names: Vec<(&str, &str)> = columns
            .iter()
            .map(|c| (c.attribute.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("owner", "owner_ref_ref_id"),
                ("owner_id", "owner_id"),
                ("owner_ref_id", "owner_ref_id"),
            ]
        );
        assert!(columns[0].is_foreign_key());
    }

    #[test]
    fn helper_views_match_analyze() {
        let analyzer = SchemaAnalyzer::new(schema());
        let analyzed = analyzer.analyze();

        let (objects, events) = analyzer.get_generation_order();
        assert_eq!(objects, analyzed.object_tree.topological_order);
        assert_eq!(events, analyzed.event_tree.topological_order);

        let deps = analyzer.get_object_dependencies("process");
        assert_eq!(deps, vec!["file", "process", "session"]);
        let from_relationships: BTreeSet<&str> = analyzed
            .relationships
            .iter()
            .filter(|r| r.source_entity == "process")
            .map(|r| r.target_entity.as_str())
            .collect();
        assert_eq!(deps, from_relationships.into_iter().collect::<Vec<_>>());

        let process = &analyzed.objects["process"];
        assert_eq!(
            analyzer.get_entity_columns("process", EntityKind::Object),
            entity_columns(process, analyzer.type_mapper(), analyzer.naming())
        );
    }

    #[test]
    fn new_scalar_suffix_is_not_a_reference() {
        let mut s = schema();
        s.objects.insert(
            "probe".to_string(),
            OcsfObject::from_json("probe", json!({"attributes": {
                "where": {"type": "geo_hash_t"},
                "thing": {"type": "gadget"}
            }}))
            .unwrap(),
        );
        let analyzed = SchemaAnalyzer::new(s).analyze();
        assert!(analyzed.relationship("probe", "where").is_none());
        // Unknown non-suffixed names are presumed to be objects.
        assert_eq!(analyzed.relationship("probe", "thing").unwrap().target_entity, "gadget");
    }
}
