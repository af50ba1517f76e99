//! Dependency-bounded schema filtering.
//!
//! Starting from one core object, a breadth-first walk over object
//! references picks the objects within `max_depth` hops. Every ancestor of a
//! picked object is added so joined-table inheritance still has its base
//! tables, and the result is rebuilt into a smaller [`AnalyzedSchema`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::analyzer::AnalyzedSchema;
use crate::error::{Error, Result, sample_names};
use crate::resolver::{InheritanceTree, ResolvedEntity};

/// Default number of reference hops followed from the core object.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// What to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// Object the traversal starts from.
    pub core_object: String,

    /// Reference hops followed from the core object. `0` keeps the core
    /// object (and its ancestors) only.
    pub max_depth: usize,

    /// Also keep events that reference a kept object.
    pub include_events: bool,
}

impl FilterConfig {
    pub fn new(core_object: impl Into<String>) -> Self {
        Self {
            core_object: core_object.into(),
            max_depth: DEFAULT_MAX_DEPTH,
            include_events: false,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_events(mut self, include_events: bool) -> Self {
        self.include_events = include_events;
        self
    }
}

/// What a filter run kept and why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterResult {
    /// Every kept object: the traversal set plus inheritance additions.
    pub included_objects: BTreeSet<String>,

    /// Hop count for every kept object. Inheritance additions get the
    /// smallest depth of the kept objects that needed them.
    pub object_depths: BTreeMap<String, usize>,

    /// Ancestors kept only for inheritance, not reached by the traversal.
    pub inheritance_additions: BTreeSet<String>,

    /// Objects of the full schema that were not kept.
    pub excluded_objects: BTreeSet<String>,

    pub included_events: BTreeSet<String>,
}

impl FilterResult {
    /// Objects reached by the traversal itself.
    pub fn traversed_objects(&self) -> impl Iterator<Item = &str> {
        self.included_objects
            .iter()
            .filter(|name| !self.inheritance_additions.contains(*name))
            .map(String::as_str)
    }
}

/// Filters an analyzed schema down to the neighborhood of one object.
#[derive(Debug, Clone, Copy)]
pub struct ObjectFilter<'a> {
    analyzed: &'a AnalyzedSchema,
}

impl<'a> ObjectFilter<'a> {
    pub fn new(analyzed: &'a AnalyzedSchema) -> Self {
        Self { analyzed }
    }

    /// Build the reduced schema for `config`.
    ///
    /// Fails with [`Error::ObjectNotFound`] when the core object is not an
    /// object of the schema.
    pub fn filter(&self, config: &FilterConfig) -> Result<(AnalyzedSchema, FilterResult)> {
        if !self.analyzed.objects.contains_key(&config.core_object) {
            return Err(Error::ObjectNotFound {
                name: config.core_object.clone(),
                available: sample_names(self.analyzed.objects.keys().map(String::as_str)),
            });
        }

        let mut depths = self.traverse(&config.core_object, config.max_depth);
        let additions = self.inheritance_additions(&mut depths);
        let included: BTreeSet<String> = depths.keys().cloned().collect();

        let excluded = self
            .analyzed
            .objects
            .keys()
            .filter(|name| !included.contains(*name))
            .cloned()
            .collect();

        let included_events = if config.include_events {
            self.referencing_events(&included)
        } else {
            BTreeSet::new()
        };

        let filtered = self.rebuild(&included, &included_events);

        log::info!(
            "filtered from '{}' at depth {}: {} objects ({} for inheritance), {} events",
            config.core_object,
            config.max_depth,
            included.len(),
            additions.len(),
            included_events.len()
        );

        let result = FilterResult {
            included_objects: included,
            object_depths: depths,
            inheritance_additions: additions,
            excluded_objects: excluded,
            included_events,
        };
        Ok((filtered, result))
    }

    /// Bounded breadth-first walk. Returns the depth of each reached object.
    fn traverse(&self, core: &str, max_depth: usize) -> BTreeMap<String, usize> {
        let mut depths = BTreeMap::new();
        let mut queue = VecDeque::from([(core.to_string(), 0usize)]);

        while let Some((name, depth)) = queue.pop_front() {
            if depths.contains_key(&name) {
                continue;
            }
            let Some(object) = self.analyzed.objects.get(&name) else {
                continue;
            };
            depths.insert(name, depth);
            if depth >= max_depth {
                continue;
            }
            for dep in self.object_references(object) {
                if !depths.contains_key(dep) {
                    queue.push_back((dep.to_string(), depth + 1));
                }
            }
        }
        depths
    }

    /// Objects an entity points at: explicit `object_type`s plus type names
    /// that are objects of the schema. Sorted and distinct.
    fn object_references<'e>(&self, entity: &'e ResolvedEntity) -> BTreeSet<&'e str> {
        entity
            .all_attributes
            .values()
            .filter_map(|attr| {
                attr.object_type.as_deref().or_else(|| {
                    attr.type_ref
                        .as_named()
                        .filter(|t| self.analyzed.objects.contains_key(*t))
                })
            })
            .collect()
    }

    /// Add every missing ancestor of the traversed objects to `depths`.
    fn inheritance_additions(&self, depths: &mut BTreeMap<String, usize>) -> BTreeSet<String> {
        let mut additions: BTreeMap<String, usize> = BTreeMap::new();
        for (name, &depth) in depths.iter() {
            let Some(object) = self.analyzed.objects.get(name) else {
                continue;
            };
            for ancestor in object.inheritance_chain.iter().skip(1) {
                if depths.contains_key(ancestor) || !self.analyzed.objects.contains_key(ancestor) {
                    continue;
                }
                additions
                    .entry(ancestor.clone())
                    .and_modify(|d| *d = (*d).min(depth))
                    .or_insert(depth);
            }
        }
        let names = additions.keys().cloned().collect();
        depths.extend(additions);
        names
    }

    /// Events with any attribute pointing directly at a kept object.
    fn referencing_events(&self, included: &BTreeSet<String>) -> BTreeSet<String> {
        self.analyzed
            .events
            .iter()
            .filter(|(_, event)| {
                self.object_references(event)
                    .iter()
                    .any(|target| included.contains(*target))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn rebuild(&self, objects: &BTreeSet<String>, events: &BTreeSet<String>) -> AnalyzedSchema {
        let src = self.analyzed;
        let kept_source = |name: &str| objects.contains(name) || events.contains(name);

        AnalyzedSchema {
            version: src.version.clone(),
            objects: src
                .objects
                .iter()
                .filter(|(name, _)| objects.contains(*name))
                .map(|(name, o)| (name.clone(), o.clone()))
                .collect(),
            events: src
                .events
                .iter()
                .filter(|(name, _)| events.contains(*name))
                .map(|(name, e)| (name.clone(), e.clone()))
                .collect(),
            object_tree: restrict_tree(&src.object_tree, objects),
            event_tree: restrict_tree(&src.event_tree, events),
            relationships: src
                .relationships
                .iter()
                .filter(|r| kept_source(&r.source_entity) && objects.contains(&r.target_entity))
                .cloned()
                .collect(),
            array_attributes: src
                .array_attributes
                .iter()
                .filter(|a| {
                    kept_source(&a.parent_entity)
                        && (a.is_primitive || objects.contains(&a.element_type))
                })
                .cloned()
                .collect(),
            enums: src.enums.clone(),
            categories: src.categories.clone(),
        }
    }
}

/// A fresh tree over `kept`, keeping a parent link only when the parent is
/// kept too.
fn restrict_tree(tree: &InheritanceTree, kept: &BTreeSet<String>) -> InheritanceTree {
    let declared = kept
        .iter()
        .map(|name| (name.clone(), tree.parent(name).map(str::to_string)))
        .collect();
    InheritanceTree::from_parents(&declared)
}
