//! Inheritance resolution for OCSF objects and events.
//!
//! OCSF entities name a single parent through `extends`. Resolution walks
//! that chain to the root, merges ancestor attributes under the entity's own
//! attributes, and fills gaps from the shared dictionary. Trees built here
//! drive the emission order of generated models.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Deref;

use crate::schema::{OcsfAttribute, OcsfEnumValue, OcsfEvent, OcsfObject, OcsfSchema, Requirement};
use crate::type_map::DEFAULT_TYPE;

/// Which entity universe a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntityKind {
    Object,
    Event,
}

/// An attribute's type after dictionary fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// A type named by the entity or the dictionary.
    Named(String),
    /// Neither source names a type. Treated as [`DEFAULT_TYPE`].
    Unresolved,
}

impl TypeRef {
    pub fn as_named(&self) -> Option<&str> {
        match self {
            TypeRef::Named(name) => Some(name),
            TypeRef::Unresolved => None,
        }
    }

    /// The type name, with unresolved types read as strings.
    pub fn name_or_default(&self) -> &str {
        self.as_named().unwrap_or(DEFAULT_TYPE)
    }
}

/// An attribute after inheritance merging and dictionary fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttribute {
    pub name: String,
    pub caption: String,
    pub description: String,
    pub type_ref: TypeRef,
    pub requirement: Requirement,
    pub is_array: bool,

    /// True when the attribute came from an ancestor.
    pub is_inherited: bool,

    /// Entity that declared this attribute.
    pub source: String,

    pub enum_values: Option<BTreeMap<String, OcsfEnumValue>>,
    pub object_type: Option<String>,
}

impl ResolvedAttribute {
    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }
}

/// An object or event with its inheritance fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    pub name: String,
    pub caption: String,
    pub description: String,
    pub extends: Option<String>,

    /// Self first, root last. Never contains a name twice.
    pub inheritance_chain: Vec<String>,

    pub own_attributes: BTreeMap<String, ResolvedAttribute>,
    pub inherited_attributes: BTreeMap<String, ResolvedAttribute>,

    /// Inherited attributes overlaid with own attributes.
    pub all_attributes: BTreeMap<String, ResolvedAttribute>,
}

pub type ResolvedObject = ResolvedEntity;

/// A resolved event class.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEvent {
    pub entity: ResolvedEntity,
    pub uid: i64,
    pub category: String,
}

impl Deref for ResolvedEvent {
    type Target = ResolvedEntity;

    fn deref(&self) -> &ResolvedEntity {
        &self.entity
    }
}

/// Parent/child structure of one entity universe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InheritanceTree {
    /// Parent name to children, each list sorted.
    pub children: BTreeMap<String, Vec<String>>,

    /// Child name to parent, only for parents inside the tree.
    pub parents: BTreeMap<String, String>,

    /// Entities without a parent in the tree, sorted.
    pub roots: Vec<String>,

    /// Every entity exactly once, each parent before its children.
    pub topological_order: Vec<String>,
}

impl InheritanceTree {
    /// Build a tree from each entity's declared parent.
    ///
    /// Parents outside the key set are ignored, making the entity a root.
    /// If the links contain a cycle, one link on it is cut and the entity
    /// becomes a root, so the topological order always covers every entity.
    pub fn from_parents(declared: &BTreeMap<String, Option<String>>) -> Self {
        let mut parents: BTreeMap<String, String> = declared
            .iter()
            .filter_map(|(name, parent)| {
                let parent = parent.as_ref()?;
                (parent != name && declared.contains_key(parent))
                    .then(|| (name.clone(), parent.clone()))
            })
            .collect();

        let mut order = Vec::with_capacity(declared.len());
        let mut placed: BTreeSet<&str> = BTreeSet::new();
        let children_of = |parents: &BTreeMap<String, String>| {
            let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (child, parent) in parents {
                children.entry(parent.clone()).or_default().push(child.clone());
            }
            children
        };

        // Kahn's algorithm in name order. Each node has in-degree 0 or 1.
        let mut children = children_of(&parents);
        let mut queue: VecDeque<&str> = declared
            .keys()
            .filter(|name| !parents.contains_key(*name))
            .map(String::as_str)
            .collect();

        loop {
            while let Some(node) = queue.pop_front() {
                if !placed.insert(node) {
                    continue;
                }
                order.push(node.to_string());
                if let Some(kids) = children.get(node) {
                    for kid in kids {
                        if let Some((name, _)) = declared.get_key_value(kid) {
                            queue.push_back(name.as_str());
                        }
                    }
                }
            }

            let Some(stranded) = declared.keys().find(|n| !placed.contains(n.as_str())) else {
                break;
            };

            // Follow parent links from the first stranded entity until a
            // name repeats; that name is on the cycle.
            let mut seen = BTreeSet::new();
            let mut current = stranded.clone();
            while seen.insert(current.clone()) {
                match parents.get(&current) {
                    Some(parent) => current = parent.clone(),
                    None => break,
                }
            }
            log::warn!(
                "inheritance cycle through '{current}'; treating it as a root"
            );
            parents.remove(&current);
            children = children_of(&parents);
            if let Some((name, _)) = declared.get_key_value(&current) {
                queue.push_back(name.as_str());
            }
        }

        let roots = declared
            .keys()
            .filter(|name| !parents.contains_key(*name))
            .cloned()
            .collect();

        Self {
            children,
            parents,
            roots,
            topological_order: order,
        }
    }

    pub fn parent(&self, name: &str) -> Option<&str> {
        self.parents.get(name).map(String::as_str)
    }

    pub fn children(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.topological_order.iter().any(|n| n == name)
    }

    /// A root with at least one child. Needs a type discriminator.
    pub fn is_polymorphic_base(&self, name: &str) -> bool {
        !self.parents.contains_key(name) && !self.children(name).is_empty()
    }

    /// Number of ancestors inside the tree.
    pub fn depth(&self, name: &str) -> usize {
        let mut depth = 0;
        let mut current = name;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
            if depth > self.parents.len() {
                break;
            }
        }
        depth
    }

    pub fn len(&self) -> usize {
        self.topological_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topological_order.is_empty()
    }
}

/// Shared view over objects and events.
trait SourceEntity {
    fn extends(&self) -> Option<&str>;
    fn attributes(&self) -> &BTreeMap<String, OcsfAttribute>;
}

impl SourceEntity for OcsfObject {
    fn extends(&self) -> Option<&str> {
        self.extends.as_deref()
    }
    fn attributes(&self) -> &BTreeMap<String, OcsfAttribute> {
        &self.attributes
    }
}

impl SourceEntity for OcsfEvent {
    fn extends(&self) -> Option<&str> {
        self.extends.as_deref()
    }
    fn attributes(&self) -> &BTreeMap<String, OcsfAttribute> {
        &self.attributes
    }
}

/// Resolves `extends` chains against one schema snapshot.
#[derive(Debug, Clone, Copy)]
pub struct InheritanceResolver<'a> {
    schema: &'a OcsfSchema,
}

impl<'a> InheritanceResolver<'a> {
    pub fn new(schema: &'a OcsfSchema) -> Self {
        Self { schema }
    }

    /// Resolve one object. `None` if the schema has no such object.
    pub fn resolve_object(&self, name: &str) -> Option<ResolvedObject> {
        let object = self.schema.objects.get(name)?;
        let mut entity = self.resolve_entity(name, &self.schema.objects);
        entity.caption = object.caption.clone();
        entity.description = object.description.clone();
        Some(entity)
    }

    /// Resolve one event. `None` if the schema has no such event.
    pub fn resolve_event(&self, name: &str) -> Option<ResolvedEvent> {
        let event = self.schema.events.get(name)?;
        let mut entity = self.resolve_entity(name, &self.schema.events);
        entity.caption = event.caption.clone();
        entity.description = event.description.clone();
        Some(ResolvedEvent {
            entity,
            uid: event.uid,
            category: event.category.clone(),
        })
    }

    pub fn resolve_all_objects(&self) -> BTreeMap<String, ResolvedObject> {
        self.schema
            .objects
            .keys()
            .filter_map(|name| Some((name.clone(), self.resolve_object(name)?)))
            .collect()
    }

    pub fn resolve_all_events(&self) -> BTreeMap<String, ResolvedEvent> {
        self.schema
            .events
            .keys()
            .filter_map(|name| Some((name.clone(), self.resolve_event(name)?)))
            .collect()
    }

    pub fn build_object_inheritance_tree(&self) -> InheritanceTree {
        InheritanceTree::from_parents(&declared_parents(&self.schema.objects))
    }

    pub fn build_event_inheritance_tree(&self) -> InheritanceTree {
        InheritanceTree::from_parents(&declared_parents(&self.schema.events))
    }

    /// Entities whose `extends` names `name`, sorted.
    pub fn direct_children(&self, name: &str, kind: EntityKind) -> Vec<String> {
        match kind {
            EntityKind::Object => children_in(&self.schema.objects, name),
            EntityKind::Event => children_in(&self.schema.events, name),
        }
    }

    /// Every entity below `name`, breadth-first. Safe on cyclic input.
    pub fn all_descendants(&self, name: &str, kind: EntityKind) -> Vec<String> {
        let mut seen = BTreeSet::from([name.to_string()]);
        let mut out = Vec::new();
        let mut queue: VecDeque<String> = self.direct_children(name, kind).into();
        while let Some(child) = queue.pop_front() {
            if !seen.insert(child.clone()) {
                continue;
            }
            queue.extend(self.direct_children(&child, kind));
            out.push(child);
        }
        out
    }

    fn resolve_entity<E: SourceEntity>(
        &self,
        name: &str,
        universe: &BTreeMap<String, E>,
    ) -> ResolvedEntity {
        let chain = inheritance_chain(name, universe);

        let mut inherited = BTreeMap::new();
        for ancestor in chain.iter().skip(1).rev() {
            if let Some(entity) = universe.get(ancestor) {
                for (attr_name, attr) in entity.attributes() {
                    let mut resolved = self.resolve_attribute(attr, ancestor);
                    resolved.is_inherited = true;
                    inherited.insert(attr_name.clone(), resolved);
                }
            }
        }

        let entity = universe.get(name);
        let own: BTreeMap<String, ResolvedAttribute> = entity
            .map(|e| {
                e.attributes()
                    .iter()
                    .map(|(attr_name, attr)| (attr_name.clone(), self.resolve_attribute(attr, name)))
                    .collect()
            })
            .unwrap_or_default();

        let mut all = inherited.clone();
        all.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));

        ResolvedEntity {
            name: name.to_string(),
            caption: String::new(),
            description: String::new(),
            extends: entity.and_then(|e| e.extends()).map(str::to_string),
            inheritance_chain: chain,
            own_attributes: own,
            inherited_attributes: inherited,
            all_attributes: all,
        }
    }

    /// Local definition first, then the dictionary entry of the same name.
    fn resolve_attribute(&self, attr: &OcsfAttribute, source: &str) -> ResolvedAttribute {
        let shared = self.schema.dictionary.attributes.get(&attr.name);
        let from_shared = |f: fn(&OcsfAttribute) -> Option<&String>| shared.and_then(f).cloned();

        // A caption equal to the bare name is a placeholder.
        let caption = attr
            .caption
            .clone()
            .filter(|c| *c != attr.name)
            .or_else(|| from_shared(|d| d.caption.as_ref()))
            .unwrap_or_else(|| attr.name.clone());

        let type_ref = attr
            .type_name
            .clone()
            .or_else(|| from_shared(|d| d.type_name.as_ref()))
            .map_or(TypeRef::Unresolved, TypeRef::Named);

        ResolvedAttribute {
            name: attr.name.clone(),
            caption,
            description: attr
                .description
                .clone()
                .filter(|d| !d.is_empty())
                .or_else(|| from_shared(|d| d.description.as_ref()))
                .unwrap_or_default(),
            type_ref,
            requirement: attr
                .requirement
                .or_else(|| shared.and_then(|d| d.requirement))
                .unwrap_or_default(),
            is_array: attr.is_array || shared.is_some_and(|d| d.is_array),
            is_inherited: false,
            source: source.to_string(),
            enum_values: attr
                .enum_values
                .clone()
                .or_else(|| shared.and_then(|d| d.enum_values.clone())),
            object_type: attr
                .object_type
                .clone()
                .or_else(|| from_shared(|d| d.object_type.as_ref())),
        }
    }
}

/// Walk `extends` from `name` toward the root.
///
/// Stops at a parent outside the universe or at a name already in the chain.
fn inheritance_chain<E: SourceEntity>(name: &str, universe: &BTreeMap<String, E>) -> Vec<String> {
    let mut chain = vec![name.to_string()];
    let mut current = universe.get(name);
    while let Some(parent) = current.and_then(|e| e.extends()) {
        if chain.iter().any(|n| n == parent) || !universe.contains_key(parent) {
            break;
        }
        chain.push(parent.to_string());
        current = universe.get(parent);
    }
    chain
}

fn declared_parents<E: SourceEntity>(universe: &BTreeMap<String, E>) -> BTreeMap<String, Option<String>> {
    universe
        .iter()
        .map(|(name, e)| (name.clone(), e.extends().map(str::to_string)))
        .collect()
}

fn children_in<E: SourceEntity>(universe: &BTreeMap<String, E>, name: &str) -> Vec<String> {
    universe
        .iter()
        .filter(|(child, e)| e.extends() == Some(name) && child.as_str() != name)
        .map(|(child, _)| child.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(name: &str, body: serde_json::Value) -> (String, OcsfObject) {
        (name.to_string(), OcsfObject::from_json(name, body).unwrap())
    }

    fn schema() -> OcsfSchema {
        let dictionary = crate::schema::parse_attributes(
            &serde_json::from_value(json!({
                "name": {"caption": "Name", "type": "string_t", "description": "Shared name."},
                "uid": {"caption": "Unique ID", "type": "string_t"},
                "labels": {"caption": "Labels", "type": "string_t", "is_array": true},
                "owner": {"caption": "Owner", "type": "object_t", "object_type": "user"}
            }))
            .unwrap(),
        )
        .unwrap();

        OcsfSchema {
            version: "1.4.0".to_string(),
            objects: BTreeMap::from([
                object("_entity", json!({"caption": "Entity", "attributes": {
                    "name": {"requirement": "recommended"},
                    "uid": {}
                }})),
                object("file", json!({"caption": "File", "extends": "_entity", "attributes": {
                    "name": {"caption": "File Name", "requirement": "required"},
                    "labels": {},
                    "owner": {},
                    "size": {"type": "long_t"}
                }})),
                object("user", json!({"caption": "User", "extends": "_entity", "attributes": {}})),
            ]),
            dictionary: crate::schema::Dictionary { attributes: dictionary },
            ..Default::default()
        }
    }

    fn parents(pairs: &[(&str, Option<&str>)]) -> BTreeMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(n, p)| (n.to_string(), p.map(str::to_string)))
            .collect()
    }

    fn assert_parent_first(tree: &InheritanceTree) {
        for (child, parent) in &tree.parents {
            let c = tree.topological_order.iter().position(|n| n == child).unwrap();
            let p = tree.topological_order.iter().position(|n| n == parent).unwrap();
            assert!(p < c, "{parent} must precede {child}");
        }
    }

    #[test]
    fn resolve_missing_is_none() {
        let s = schema();
        let r = InheritanceResolver::new(&s);
        assert!(r.resolve_object("nope").is_none());
        assert!(r.resolve_event("nope").is_none());
    }

    #[test]
    fn own_attribute_overrides_inherited() {
        let s = schema();
        let file = InheritanceResolver::new(&s).resolve_object("file").unwrap();

        assert_eq!(file.inheritance_chain, vec!["file", "_entity"]);
        let name = &file.all_attributes["name"];
        assert!(!name.is_inherited);
        assert_eq!(name.source, "file");
        assert_eq!(name.caption, "File Name");
        assert_eq!(name.requirement, Requirement::Required);

        let uid = &file.all_attributes["uid"];
        assert!(uid.is_inherited);
        assert_eq!(uid.source, "_entity");
        assert!(file.inherited_attributes.contains_key("name"));
    }

    #[test]
    fn dictionary_fallback() {
        let s = schema();
        let file = InheritanceResolver::new(&s).resolve_object("file").unwrap();

        let labels = &file.own_attributes["labels"];
        assert!(labels.is_array);
        assert_eq!(labels.type_ref, TypeRef::Named("string_t".to_string()));
        assert_eq!(labels.caption, "Labels");

        let owner = &file.own_attributes["owner"];
        assert_eq!(owner.object_type.as_deref(), Some("user"));

        let name = &file.own_attributes["name"];
        assert_eq!(name.description, "Shared name.");

        // Local type wins over the dictionary.
        assert_eq!(file.own_attributes["size"].type_ref.name_or_default(), "long_t");
    }

    #[test]
    fn unresolved_type_defaults_to_string() {
        let mut s = schema();
        s.objects.insert(
            "thing".to_string(),
            OcsfObject::from_json("thing", json!({"attributes": {"mystery": {}}})).unwrap(),
        );
        let thing = InheritanceResolver::new(&s).resolve_object("thing").unwrap();
        let mystery = &thing.own_attributes["mystery"];
        assert_eq!(mystery.type_ref, TypeRef::Unresolved);
        assert_eq!(mystery.type_ref.name_or_default(), "string_t");
        assert_eq!(mystery.caption, "mystery");
    }

    #[test]
    fn chain_terminates_on_cycle() {
        let mut s = schema();
        s.objects.insert(
            "a".to_string(),
            OcsfObject::from_json("a", json!({"extends": "b"})).unwrap(),
        );
        s.objects.insert(
            "b".to_string(),
            OcsfObject::from_json("b", json!({"extends": "a"})).unwrap(),
        );
        let a = InheritanceResolver::new(&s).resolve_object("a").unwrap();
        assert_eq!(a.inheritance_chain, vec!["a", "b"]);
    }

    #[test]
    fn chain_stops_at_unknown_parent() {
        let mut s = schema();
        s.objects.insert(
            "orphan".to_string(),
            OcsfObject::from_json("orphan", json!({"extends": "missing"})).unwrap(),
        );
        let orphan = InheritanceResolver::new(&s).resolve_object("orphan").unwrap();
        assert_eq!(orphan.inheritance_chain, vec!["orphan"]);
        assert_eq!(orphan.extends.as_deref(), Some("missing"));
    }

    #[test]
    fn object_tree_orders_parents_first() {
        let s = schema();
        let tree = InheritanceResolver::new(&s).build_object_inheritance_tree();
        assert_eq!(tree.topological_order, vec!["_entity", "file", "user"]);
        assert_eq!(tree.roots, vec!["_entity"]);
        assert_eq!(tree.children("_entity"), ["file", "user"]);
        assert!(tree.is_polymorphic_base("_entity"));
        assert!(!tree.is_polymorphic_base("file"));
        assert_eq!(tree.depth("file"), 1);
        assert_parent_first(&tree);
    }

    #[test]
    fn tree_ignores_parents_outside_universe() {
        let tree = InheritanceTree::from_parents(&parents(&[("a", Some("gone")), ("b", Some("a"))]));
        assert_eq!(tree.roots, vec!["a"]);
        assert_eq!(tree.topological_order, vec!["a", "b"]);
    }

    #[test]
    fn tree_is_permutation_even_with_cycles() {
        let tree = InheritanceTree::from_parents(&parents(&[
            ("a", Some("b")),
            ("b", Some("a")),
            ("c", Some("a")),
            ("root", None),
            ("self_ref", Some("self_ref")),
        ]));
        let mut sorted = tree.topological_order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "root", "self_ref"]);
        assert_parent_first(&tree);
    }

    #[test]
    fn deep_chain_sorted_regardless_of_names() {
        let tree = InheritanceTree::from_parents(&parents(&[
            ("a_leaf", Some("m_mid")),
            ("m_mid", Some("z_root")),
            ("z_root", None),
        ]));
        assert_eq!(tree.topological_order, vec!["z_root", "m_mid", "a_leaf"]);
        assert_eq!(tree.depth("a_leaf"), 2);
    }

    #[test]
    fn children_and_descendants() {
        let s = schema();
        let r = InheritanceResolver::new(&s);
        assert_eq!(r.direct_children("_entity", EntityKind::Object), vec!["file", "user"]);
        assert_eq!(r.all_descendants("_entity", EntityKind::Object), vec!["file", "user"]);
        assert!(r.all_descendants("file", EntityKind::Object).is_empty());
        assert!(r.direct_children("_entity", EntityKind::Event).is_empty());
    }

    #[test]
    fn resolve_event_carries_uid_and_category() {
        let mut s = schema();
        s.events.insert(
            "base_event".to_string(),
            OcsfEvent::from_json("base_event", None, json!({"attributes": {"time": {"type": "timestamp_t"}}}))
                .unwrap(),
        );
        s.events.insert(
            "file_activity".to_string(),
            OcsfEvent::from_json(
                "file_activity",
                Some("system"),
                json!({"uid": 1001, "extends": "base_event", "attributes": {"file": {"type": "file"}}}),
            )
            .unwrap(),
        );
        let r = InheritanceResolver::new(&s);
        let event = r.resolve_event("file_activity").unwrap();
        assert_eq!(event.uid, 1001);
        assert_eq!(event.category, "system");
        assert!(event.all_attributes["time"].is_inherited);
        assert_eq!(r.resolve_all_events().len(), 2);
        assert_eq!(r.build_event_inheritance_tree().topological_order, vec!["base_event", "file_activity"]);
    }
}
