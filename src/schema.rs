//! OCSF schema source types and the directory-tree loader.
//!
//! The loader reads a checkout of the `ocsf-schema` repository:
//!
//! ```text
//! <root>/
//!   version.json          {"version": "1.4.0"}
//!   dictionary.json       {"attributes": {...}, "types": {"attributes": {...}}}
//!   categories.json       {"attributes": {"iam": {"caption", "uid", ...}}}
//!   objects/*.json
//!   events/base_event.json
//!   events/<category>/*.json
//! ```
//!
//! Nothing here resolves `extends`; see [`crate::resolver`] for that.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

/// Files every schema root must contain.
pub const REQUIRED_FILES: [&str; 3] = ["version.json", "dictionary.json", "categories.json"];

/// Attribute keys starting with this character are inclusion directives
/// (e.g. `"$include"`) and are never attributes.
const DIRECTIVE_MARKER: char = '$';

/// Version reported when `version.json` carries no version.
const UNKNOWN_VERSION: &str = "unknown";

/// The raw, un-resolved OCSF schema.
#[derive(Debug, Clone, Default)]
pub struct OcsfSchema {
    /// Schema version string (e.g., `"1.4.0"`).
    pub version: String,

    /// Object definitions keyed by file stem (e.g., `"process"`).
    pub objects: BTreeMap<String, OcsfObject>,

    /// Event class definitions keyed by file stem (e.g., `"file_activity"`).
    pub events: BTreeMap<String, OcsfEvent>,

    pub categories: BTreeMap<String, OcsfCategory>,

    /// Shared attribute dictionary.
    pub dictionary: Dictionary,

    /// Scalar type definitions from `dictionary.json` (`types.attributes`).
    pub types: BTreeMap<String, Value>,
}

/// The shared attribute dictionary from `dictionary.json`.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    pub attributes: BTreeMap<String, OcsfAttribute>,
}

/// An OCSF object definition (e.g., Process, File).
#[derive(Debug, Clone, Default)]
pub struct OcsfObject {
    pub name: String,

    /// Human-readable name. Defaults to `name` when the file has none.
    pub caption: String,

    pub description: String,

    /// Parent object name (e.g., `"_entity"`).
    pub extends: Option<String>,

    /// Attributes declared in this file only. Sorted by `BTreeMap`.
    pub attributes: BTreeMap<String, OcsfAttribute>,

    /// Observable type number, when the object is observable.
    pub observable: Option<i64>,

    pub profiles: Vec<String>,
}

/// An OCSF event class definition.
#[derive(Debug, Clone, Default)]
pub struct OcsfEvent {
    pub name: String,
    pub caption: String,
    pub description: String,

    /// Class identifier (e.g., `1001` for File System Activity).
    pub uid: i64,

    /// Category name: the directory the file was found in, or the file's
    /// own `category` field for `base_event`.
    pub category: String,

    pub extends: Option<String>,
    pub attributes: BTreeMap<String, OcsfAttribute>,
    pub profiles: Vec<String>,
}

/// An OCSF event category (e.g., System Activity).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcsfCategory {
    pub name: String,
    pub caption: String,
    pub description: String,
    pub uid: i64,
    pub classes: Vec<String>,
}

/// How strongly an attribute is expected to be populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Requirement {
    #[default]
    Optional,
    Recommended,
    Required,
}

impl Requirement {
    /// Parse a requirement tier. Unknown values are treated as optional.
    pub fn parse(value: &str) -> Self {
        match value {
            "required" => Requirement::Required,
            "recommended" => Requirement::Recommended,
            _ => Requirement::Optional,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Requirement::Optional => "optional",
            Requirement::Recommended => "recommended",
            Requirement::Required => "required",
        }
    }
}

/// One attribute as written in a source file.
///
/// Fields a file leaves out stay `None` so the resolver can fall back to
/// the dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcsfAttribute {
    pub name: String,
    pub caption: Option<String>,
    pub description: Option<String>,

    /// OCSF type name with any `[]` array marker removed.
    pub type_name: Option<String>,

    /// `None` when the file does not state a requirement.
    pub requirement: Option<Requirement>,

    /// Set by `"is_array": true` or a `type[]` marker.
    pub is_array: bool,

    /// Inline enum keyed by the raw value string (`"0"`, `"99"`).
    pub enum_values: Option<BTreeMap<String, OcsfEnumValue>>,

    /// Referenced object for `object_t` attributes.
    pub object_type: Option<String>,

    pub group: Option<String>,
    pub sibling: Option<String>,
    pub profile: Option<String>,
    pub deprecated: bool,
}

/// A single value in an inline enum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcsfEnumValue {
    pub caption: String,
    pub description: Option<String>,
}

// ── Raw file shapes ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    extends: Option<String>,
    #[serde(default)]
    uid: Option<i64>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    observable: Option<i64>,
    #[serde(default)]
    profiles: Vec<String>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    #[serde(rename = "type", default)]
    type_name: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    requirement: Option<String>,
    #[serde(default)]
    is_array: bool,
    #[serde(rename = "enum", default)]
    enum_values: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    object_type: Option<String>,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    sibling: Option<String>,
    #[serde(default)]
    profile: Option<String>,
    #[serde(rename = "@deprecated", default)]
    deprecated: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawVersion {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDictionary {
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    #[serde(default)]
    types: RawTypes,
}

#[derive(Debug, Default, Deserialize)]
struct RawTypes {
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawCategories {
    #[serde(default)]
    attributes: BTreeMap<String, RawCategory>,
}

#[derive(Debug, Deserialize)]
struct RawCategory {
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    uid: i64,
    #[serde(default)]
    classes: Vec<String>,
}

// ── Attribute parsing ───────────────────────────────────────────────────────

/// Parse an `attributes` map from an entity or dictionary file.
///
/// Directive keys are skipped. A value that is not a JSON object becomes an
/// attribute with only its name set.
pub fn parse_attributes(
    raw: &BTreeMap<String, Value>,
) -> serde_json::Result<BTreeMap<String, OcsfAttribute>> {
    let mut attributes = BTreeMap::new();
    for (name, value) in raw {
        if name.starts_with(DIRECTIVE_MARKER) {
            continue;
        }
        let attr = if value.is_object() {
            parse_attribute(name, value.clone())?
        } else {
            OcsfAttribute {
                name: name.clone(),
                ..Default::default()
            }
        };
        attributes.insert(name.clone(), attr);
    }
    Ok(attributes)
}

fn parse_attribute(name: &str, value: Value) -> serde_json::Result<OcsfAttribute> {
    let raw: RawAttribute = serde_json::from_value(value)?;

    let mut is_array = raw.is_array;
    let type_name = raw.type_name.map(|t| match t.strip_suffix("[]") {
        Some(element) => {
            is_array = true;
            element.to_string()
        }
        None => t,
    });

    Ok(OcsfAttribute {
        name: name.to_string(),
        caption: raw.caption,
        description: raw.description,
        type_name,
        requirement: raw.requirement.as_deref().map(Requirement::parse),
        is_array,
        enum_values: raw.enum_values.map(parse_enum_values),
        object_type: raw.object_type,
        group: raw.group,
        sibling: raw.sibling,
        profile: raw.profile,
        deprecated: raw.deprecated.is_some(),
    })
}

fn parse_enum_values(raw: BTreeMap<String, Value>) -> BTreeMap<String, OcsfEnumValue> {
    raw.into_iter()
        .filter_map(|(key, value)| {
            let entry = match value {
                Value::Object(map) => OcsfEnumValue {
                    caption: map
                        .get("caption")
                        .and_then(Value::as_str)
                        .unwrap_or(&key)
                        .to_string(),
                    description: map
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                },
                Value::String(caption) => OcsfEnumValue {
                    caption,
                    description: None,
                },
                _ => return None,
            };
            Some((key, entry))
        })
        .collect()
}

impl OcsfObject {
    /// Build an object from the JSON body of `objects/<name>.json`.
    pub fn from_json(name: &str, value: Value) -> serde_json::Result<Self> {
        let raw: RawEntity = serde_json::from_value(value)?;
        Ok(Self {
            name: name.to_string(),
            caption: raw.caption.unwrap_or_else(|| name.to_string()),
            description: raw.description.unwrap_or_default(),
            extends: raw.extends,
            attributes: parse_attributes(&raw.attributes)?,
            observable: raw.observable,
            profiles: raw.profiles,
        })
    }
}

impl OcsfEvent {
    /// Build an event from the JSON body of an event file.
    ///
    /// `category` is the directory the file lives in; `None` falls back to
    /// the file's own `category` field.
    pub fn from_json(name: &str, category: Option<&str>, value: Value) -> serde_json::Result<Self> {
        let raw: RawEntity = serde_json::from_value(value)?;
        Ok(Self {
            name: name.to_string(),
            caption: raw.caption.unwrap_or_else(|| name.to_string()),
            description: raw.description.unwrap_or_default(),
            uid: raw.uid.unwrap_or(0),
            category: category
                .map(str::to_string)
                .or(raw.category)
                .unwrap_or_default(),
            extends: raw.extends,
            attributes: parse_attributes(&raw.attributes)?,
            profiles: raw.profiles,
        })
    }
}

// ── Loader ──────────────────────────────────────────────────────────────────

/// Reads an OCSF schema tree from disk.
#[derive(Debug, Clone)]
pub struct SchemaLoader {
    root: PathBuf,
}

impl SchemaLoader {
    /// Open a schema root, failing if any of [`REQUIRED_FILES`] is missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::MissingFile { path: root });
        }
        for file in REQUIRED_FILES {
            let path = root.join(file);
            if !path.is_file() {
                return Err(Error::MissingFile { path });
            }
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every object, event, category, and dictionary entry.
    ///
    /// A malformed object or event file is logged and skipped. Malformed
    /// top-level descriptors are fatal.
    pub fn load(&self) -> Result<OcsfSchema> {
        let version = self.get_version()?;
        let (dictionary, types) = self.load_dictionary()?;
        let categories = self.load_categories()?;
        let objects = self.load_objects()?;
        let events = self.load_events(&categories)?;

        log::debug!(
            "loaded OCSF {version}: {} objects, {} events, {} categories",
            objects.len(),
            events.len(),
            categories.len()
        );

        Ok(OcsfSchema {
            version,
            objects,
            events,
            categories,
            dictionary,
            types,
        })
    }

    /// Schema version, read from `version.json` alone.
    pub fn get_version(&self) -> Result<String> {
        let raw: RawVersion = read_json(&self.root.join("version.json"))?;
        Ok(raw.version.unwrap_or_else(|| UNKNOWN_VERSION.to_string()))
    }

    /// Sorted object names from the `objects/` directory listing.
    pub fn list_objects(&self) -> Result<Vec<String>> {
        json_stems(&self.root.join("objects"))
    }

    /// Sorted event names: `base_event` plus every `*.json` in any
    /// subdirectory of `events/`.
    pub fn list_events(&self) -> Result<Vec<String>> {
        let events_dir = self.root.join("events");
        let mut names = Vec::new();
        if events_dir.join("base_event.json").is_file() {
            names.push("base_event".to_string());
        }
        for dir in subdirectories(&events_dir)? {
            names.extend(json_stems(&dir)?);
        }
        names.sort();
        Ok(names)
    }

    /// Load one object file. `Ok(None)` when no such file exists.
    pub fn get_object(&self, name: &str) -> Result<Option<OcsfObject>> {
        let path = self.root.join("objects").join(format!("{name}.json"));
        if !path.is_file() {
            return Ok(None);
        }
        let value: Value = read_json(&path)?;
        let object = OcsfObject::from_json(name, value).map_err(|e| Error::Parse { path, source: e })?;
        Ok(Some(object))
    }

    /// Look up one attribute in `dictionary.json`.
    pub fn dictionary_attribute(&self, name: &str) -> Result<Option<OcsfAttribute>> {
        let (dictionary, _) = self.load_dictionary()?;
        Ok(dictionary.attributes.get(name).cloned())
    }

    /// Look up one scalar type definition in `dictionary.json`.
    pub fn type_definition(&self, type_name: &str) -> Result<Option<Value>> {
        let (_, types) = self.load_dictionary()?;
        Ok(types.get(type_name).cloned())
    }

    fn load_dictionary(&self) -> Result<(Dictionary, BTreeMap<String, Value>)> {
        let path = self.root.join("dictionary.json");
        let raw: RawDictionary = read_json(&path)?;
        let attributes =
            parse_attributes(&raw.attributes).map_err(|e| Error::Parse { path, source: e })?;
        Ok((Dictionary { attributes }, raw.types.attributes))
    }

    fn load_categories(&self) -> Result<BTreeMap<String, OcsfCategory>> {
        let raw: RawCategories = read_json(&self.root.join("categories.json"))?;
        Ok(raw
            .attributes
            .into_iter()
            .map(|(name, cat)| {
                let category = OcsfCategory {
                    caption: cat.caption.unwrap_or_else(|| name.clone()),
                    name: name.clone(),
                    description: cat.description,
                    uid: cat.uid,
                    classes: cat.classes,
                };
                (name, category)
            })
            .collect())
    }

    fn load_objects(&self) -> Result<BTreeMap<String, OcsfObject>> {
        let dir = self.root.join("objects");
        let mut objects = BTreeMap::new();
        for name in json_stems(&dir)? {
            let path = dir.join(format!("{name}.json"));
            match read_entity(&path, |v| OcsfObject::from_json(&name, v)) {
                Ok(object) => {
                    objects.insert(name, object);
                }
                Err(e) => log::warn!("skipping object {}: {e}", path.display()),
            }
        }
        Ok(objects)
    }

    fn load_events(
        &self,
        categories: &BTreeMap<String, OcsfCategory>,
    ) -> Result<BTreeMap<String, OcsfEvent>> {
        let dir = self.root.join("events");
        let mut events = BTreeMap::new();

        let base_path = dir.join("base_event.json");
        if base_path.is_file() {
            match read_entity(&base_path, |v| OcsfEvent::from_json("base_event", None, v)) {
                Ok(event) => {
                    events.insert("base_event".to_string(), event);
                }
                Err(e) => log::warn!("skipping event {}: {e}", base_path.display()),
            }
        }

        for category in categories.keys() {
            let cat_dir = dir.join(category);
            if !cat_dir.is_dir() {
                continue;
            }
            for name in json_stems(&cat_dir)? {
                let path = cat_dir.join(format!("{name}.json"));
                match read_entity(&path, |v| OcsfEvent::from_json(&name, Some(category.as_str()), v)) {
                    Ok(event) => {
                        if events.insert(name.clone(), event).is_some() {
                            log::warn!("event '{name}' defined more than once; keeping {}", path.display());
                        }
                    }
                    Err(e) => log::warn!("skipping event {}: {e}", path.display()),
                }
            }
        }
        Ok(events)
    }
}

// ── Filesystem helpers ──────────────────────────────────────────────────────

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| Error::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_entity<T>(path: &Path, build: impl FnOnce(Value) -> serde_json::Result<T>) -> Result<T> {
    let value: Value = read_json(path)?;
    build(value).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Sorted stems of the `*.json` files directly inside `dir`.
/// A missing directory yields an empty list.
fn json_stems(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| Error::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut stems = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::Read {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();
    Ok(stems)
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| Error::Read {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::Read {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
