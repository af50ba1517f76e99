//! SQLAlchemy model generation from an analyzed OCSF schema.
//!
//! [`CodeGenerator::generate_all`] renders one Python package:
//!
//! ```text
//! <output>/
//!   __init__.py
//!   base.py                      declarative base + timestamp mixin
//!   base_models/<object>.py      one model per object
//!   events/<event>.py            one model per event class
//!   relations/<table>.py         array backing tables
//!   metadata/<registry>.py       schema registry tables
//!   enums.py                     integer enums
//! ```
//!
//! Key design decisions:
//! - Joined table inheritance: each entity level owns one table keyed by a
//!   primary key that references its parent's table
//! - Root entities with children carry the `_type` discriminator
//! - Models are emitted in inheritance order, parents first
//! - Every module imports exactly the symbols its body uses
//! - Deterministic output: byte-identical across runs

mod imports;
mod render;

pub use imports::{ImportSet, Package};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::analyzer::AnalyzedSchema;
use crate::error::{Error, Result};
use crate::naming::NamingConvention;
use crate::resolver::EntityKind;
use crate::type_map::TypeMapper;

use imports::{module_name, relative_module};
use render::{py_str, write_docstring};

/// What a generated file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileKind {
    Base,
    ObjectModel,
    EventModel,
    /// `Table` linking an entity to the objects of one array attribute.
    AssociationTable,
    /// Mapped class holding the values of one scalar array attribute.
    ValueTable,
    Metadata,
    Enums,
    PackageIndex,
}

/// One rendered output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the output directory.
    pub path: PathBuf,
    pub content: String,
    pub kind: FileKind,
    /// Entity or table the file was rendered for.
    pub source: Option<String>,
    /// Database table the file defines.
    pub table: Option<String>,
    /// Python classes the file defines.
    pub classes: Vec<String>,
}

/// Statistics about a generation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerationStats {
    pub objects_generated: usize,
    pub events_generated: usize,
    pub association_tables: usize,
    pub value_tables: usize,
    pub metadata_tables: usize,
    pub enums_generated: usize,
    pub files: usize,
}

impl GenerationStats {
    pub fn from_files(files: &[GeneratedFile], schema: &AnalyzedSchema) -> Self {
        let count = |kind: FileKind| files.iter().filter(|f| f.kind == kind).count();
        Self {
            objects_generated: count(FileKind::ObjectModel),
            events_generated: count(FileKind::EventModel),
            association_tables: count(FileKind::AssociationTable),
            value_tables: count(FileKind::ValueTable),
            metadata_tables: count(FileKind::Metadata),
            enums_generated: if count(FileKind::Enums) > 0 {
                schema.enums.len()
            } else {
                0
            },
            files: files.len(),
        }
    }
}

/// A name exported from a generated sub-package.
struct Export {
    package: Package,
    module: String,
    name: String,
}

/// Renders an [`AnalyzedSchema`] into Python modules.
///
/// The naming convention must be the one the schema was analyzed with, or
/// backing-table names will disagree between entity models and relation
/// files.
#[derive(Debug, Clone)]
pub struct CodeGenerator<'a> {
    schema: &'a AnalyzedSchema,
    naming: NamingConvention,
    types: TypeMapper,
    output_dir: PathBuf,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(schema: &'a AnalyzedSchema, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            schema,
            naming: NamingConvention::default(),
            types: TypeMapper::new(),
            output_dir: output_dir.into(),
        }
    }

    pub fn with_naming(mut self, naming: NamingConvention) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_type_mapper(mut self, types: TypeMapper) -> Self {
        self.types = types;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render every file, in emission order.
    ///
    /// Objects precede events; within each kind, models follow the
    /// inheritance tree's topological order.
    pub fn generate_all(&self) -> Result<Vec<GeneratedFile>> {
        let mut files = Vec::new();
        let mut exports = Vec::new();

        files.push(self.base_file());

        for kind in [EntityKind::Object, EntityKind::Event] {
            for name in &self.schema.tree(kind).topological_order {
                if let Some(file) = self.generate_entity(name, kind)? {
                    exports.push(Export {
                        package: Package::for_kind(kind),
                        module: module_name(name),
                        name: self.naming.class_name(name),
                    });
                    files.push(file);
                }
            }
        }

        for (file, export) in self.relation_files()? {
            exports.push(export);
            files.push(file);
        }

        for (file, export) in self.metadata_files() {
            exports.push(export);
            files.push(file);
        }

        let enum_names = match self.enums_file() {
            Some((file, names)) => {
                files.push(file);
                names
            }
            None => Vec::new(),
        };

        files.extend(self.package_indexes(&exports, &enum_names));

        self.check_unique(&files)?;
        Ok(files)
    }

    /// Output paths, table names, and class names must each be unique
    /// across the generated package.
    fn check_unique(&self, files: &[GeneratedFile]) -> Result<()> {
        let mut paths = BTreeSet::new();
        let mut tables: BTreeMap<&str, &Path> = BTreeMap::new();
        let mut classes: BTreeMap<&str, &Path> = BTreeMap::new();

        for file in files {
            if !paths.insert(&file.path) {
                return Err(Error::DuplicateOutput {
                    path: self.output_dir.join(&file.path),
                });
            }
            if let Some(table) = &file.table {
                claim(&mut tables, "table", table, &file.path)?;
            }
            for class in &file.classes {
                claim(&mut classes, "class", class, &file.path)?;
            }
        }
        Ok(())
    }

    /// Render and write every file, creating directories as needed.
    ///
    /// Returns the written paths in emission order.
    pub fn write_all(&self) -> Result<Vec<PathBuf>> {
        let files = self.generate_all()?;
        self.write_files(&files)
    }

    /// Write already rendered files under the output directory.
    pub fn write_files(&self, files: &[GeneratedFile]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(files.len());
        for file in files {
            let path = self.output_dir.join(&file.path);
            write_file(&path, &file.content)?;
            written.push(path);
        }
        Ok(written)
    }

    /// Render the model of one entity. `None` if the schema has no such
    /// entity.
    pub fn generate_entity(&self, name: &str, kind: EntityKind) -> Result<Option<GeneratedFile>> {
        let Some(entity) = self.schema.entity(name, kind) else {
            return Ok(None);
        };
        let model = render::entity_model(self, entity, kind)?;
        let file_kind = match kind {
            EntityKind::Object => FileKind::ObjectModel,
            EntityKind::Event => FileKind::EventModel,
        };
        Ok(Some(GeneratedFile {
            path: module_path(Package::for_kind(kind), &module_name(name)),
            content: render::render_entity(self, &model),
            kind: file_kind,
            source: Some(name.to_string()),
            table: Some(model.table_name.clone()),
            classes: vec![model.class_name.clone()],
        }))
    }

    fn base_class(&self) -> String {
        self.naming.class_name("base")
    }

    fn mixin_class(&self) -> String {
        self.naming.class_name("timestamp_mixin")
    }

    fn header(&self, summary: &str) -> String {
        format!(
            "\"\"\"{summary}\n\nAuto-generated from OCSF schema version {}.\nDO NOT EDIT MANUALLY.\n\"\"\"\n",
            self.schema.version
        )
    }

    /// Assemble header, import block, and body into one module.
    fn python_module(&self, summary: &str, imports: &ImportSet, body: &str) -> String {
        let mut out = self.header(summary);
        out.push('\n');
        let block = imports.render();
        if !block.is_empty() {
            out.push_str(&block);
            out.push_str("\n\n");
        }
        out.push_str(body);
        out
    }

    // ── Base ───────────────────────────────────────────────────────────

    fn base_file(&self) -> GeneratedFile {
        let mut imports = ImportSet::new();
        imports.use_datetime();
        imports.use_typing("Optional");
        imports.use_sqlalchemy("DateTime");
        imports.use_sqlalchemy("func");
        for symbol in ["DeclarativeBase", "Mapped", "mapped_column"] {
            imports.use_orm(symbol);
        }

        let mut body = String::new();
        writeln!(body, "class {}(DeclarativeBase):", self.base_class()).unwrap();
        write_docstring(&mut body, "    ", "Declarative base shared by every generated model", &[]);
        writeln!(body, "\n").unwrap();
        writeln!(body, "class {}:", self.mixin_class()).unwrap();
        write_docstring(
            &mut body,
            "    ",
            "Audit timestamps carried by every entity and registry table",
            &[],
        );
        writeln!(body).unwrap();
        writeln!(body, "    created_at: Mapped[datetime] = mapped_column(").unwrap();
        writeln!(body, "        DateTime(timezone=True),").unwrap();
        writeln!(body, "        server_default=func.now(),").unwrap();
        writeln!(body, "        nullable=False,").unwrap();
        writeln!(body, "    )").unwrap();
        writeln!(body, "    updated_at: Mapped[Optional[datetime]] = mapped_column(").unwrap();
        writeln!(body, "        DateTime(timezone=True),").unwrap();
        writeln!(body, "        onupdate=func.now(),").unwrap();
        writeln!(body, "        nullable=True,").unwrap();
        writeln!(body, "    )").unwrap();

        GeneratedFile {
            path: module_path(Package::Root, "base"),
            content: self.python_module("Base classes for OCSF SQLAlchemy models.", &imports, &body),
            kind: FileKind::Base,
            source: None,
            table: None,
            classes: vec![self.base_class(), self.mixin_class()],
        }
    }

    // ── Relations ──────────────────────────────────────────────────────

    /// Backing tables for the array attributes entities declare themselves.
    ///
    /// Inherited arrays are served by the ancestor's table.
    fn relation_files(&self) -> Result<Vec<(GeneratedFile, Export)>> {
        let mut out = Vec::new();
        for info in &self.schema.array_attributes {
            let parent = info.parent_entity.as_str();
            let Some(kind) = self.owner_kind(parent) else {
                debug!("skipping {parent}.{}: owner is outside the generated schema", info.attribute_name);
                continue;
            };
            let declared = self
                .schema
                .entity(parent, kind)
                .is_some_and(|e| e.own_attributes.contains_key(&info.attribute_name));
            if !declared {
                continue;
            }
            let Some(link) = render::array_link(self, parent, &info.attribute_name)? else {
                continue;
            };

            let module = module_name(&info.association_table_name);
            let (content, file_kind, name, classes) = match link.element {
                Some(element) => (
                    render::render_association(self, &link, element),
                    FileKind::AssociationTable,
                    module.clone(),
                    Vec::new(),
                ),
                None => {
                    let class_name = self.naming.array_class_name(parent, &info.attribute_name);
                    (
                        render::render_value_table(self, &link, kind),
                        FileKind::ValueTable,
                        class_name.clone(),
                        vec![class_name],
                    )
                }
            };
            out.push((
                GeneratedFile {
                    path: module_path(Package::Relations, &module),
                    content,
                    kind: file_kind,
                    source: Some(info.association_table_name.clone()),
                    table: Some(info.association_table_name.clone()),
                    classes,
                },
                Export {
                    package: Package::Relations,
                    module,
                    name,
                },
            ));
        }
        Ok(out)
    }

    fn owner_kind(&self, name: &str) -> Option<EntityKind> {
        if self.schema.objects.contains_key(name) {
            Some(EntityKind::Object)
        } else if self.schema.events.contains_key(name) {
            Some(EntityKind::Event)
        } else {
            None
        }
    }

    // ── Metadata registries ────────────────────────────────────────────

    fn metadata_files(&self) -> Vec<(GeneratedFile, Export)> {
        METADATA_TABLES
            .iter()
            .map(|table| {
                let key = format!("metadata_{}", table.module);
                let class_name = self.naming.class_name(&key);
                let table_name = self.naming.table_name(&key);

                let mut imports = ImportSet::new();
                imports.import_from(
                    relative_module(Package::Metadata, Package::Root, "base"),
                    self.base_class(),
                );
                imports.import_from(
                    relative_module(Package::Metadata, Package::Root, "base"),
                    self.mixin_class(),
                );
                imports.use_orm("Mapped");
                imports.use_orm("mapped_column");

                let mut body = String::new();
                writeln!(
                    body,
                    "class {class_name}({}, {}):",
                    self.base_class(),
                    self.mixin_class()
                )
                .unwrap();
                write_docstring(&mut body, "    ", table.summary, &[]);
                writeln!(body).unwrap();
                writeln!(body, "    __tablename__ = \"{table_name}\"").unwrap();
                writeln!(body).unwrap();
                writeln!(body, "    id: Mapped[int] = mapped_column(primary_key=True)").unwrap();
                for &(name, python, type_expr, nullable, options, comment) in table.columns {
                    let symbol = type_expr.split('(').next().unwrap_or(type_expr);
                    imports.use_sqlalchemy(symbol);
                    let annotation = if nullable {
                        imports.use_typing("Optional");
                        format!("Optional[{python}]")
                    } else {
                        python.to_string()
                    };
                    writeln!(
                        body,
                        "    {name}: Mapped[{annotation}] = mapped_column({type_expr}, {options}nullable={}, comment=\"{}\")",
                        if nullable { "True" } else { "False" },
                        py_str(comment)
                    )
                    .unwrap();
                }
                let fields: Vec<String> = table
                    .repr_fields
                    .iter()
                    .map(|f| format!("{f}={{self.{f}!r}}"))
                    .collect();
                writeln!(body).unwrap();
                writeln!(body, "    def __repr__(self) -> str:").unwrap();
                writeln!(body, "        return f\"<{class_name}({})>\"", fields.join(", ")).unwrap();

                let file = GeneratedFile {
                    path: module_path(Package::Metadata, table.module),
                    content: self.python_module(
                        &format!("OCSF metadata registry: {}.", table.module),
                        &imports,
                        &body,
                    ),
                    kind: FileKind::Metadata,
                    source: Some(table_name.clone()),
                    table: Some(table_name),
                    classes: vec![class_name.clone()],
                };
                let export = Export {
                    package: Package::Metadata,
                    module: table.module.to_string(),
                    name: class_name,
                };
                (file, export)
            })
            .collect()
    }

    // ── Enums ──────────────────────────────────────────────────────────

    /// `enums.py` with one `IntEnum` per analyzed enum, or `None` when the
    /// schema has none.
    fn enums_file(&self) -> Option<(GeneratedFile, Vec<String>)> {
        if self.schema.enums.is_empty() {
            return None;
        }

        let mut body = String::new();
        let mut names = Vec::new();
        for info in self.schema.enums.values() {
            let class_name = self.naming.enum_name(&info.name);
            let attribute = info.name.strip_suffix("_enum").unwrap_or(&info.name);

            writeln!(body, "\nclass {class_name}(IntEnum):").unwrap();
            write_docstring(
                &mut body,
                "    ",
                &format!("Values of {attribute}"),
                &[info.description.as_str()],
            );
            writeln!(body).unwrap();

            let mut members = BTreeSet::new();
            for (value, caption) in &info.values {
                let mut member = self.naming.enum_value_name(caption);
                if members.contains(&member) {
                    let suffix = value.to_string().replace('-', "NEG");
                    member = format!("{member}_{suffix}");
                }
                members.insert(member.clone());
                writeln!(body, "    {member} = {value}").unwrap();
            }
            writeln!(body).unwrap();
            names.push(class_name);
        }
        write_all_list(&mut body, &names);

        let content = format!(
            "{}\nfrom enum import IntEnum\n\n{body}",
            self.header("OCSF integer enumerations.")
        );
        let file = GeneratedFile {
            path: module_path(Package::Root, "enums"),
            content,
            kind: FileKind::Enums,
            source: None,
            table: None,
            classes: names.clone(),
        };
        Some((file, names))
    }

    // ── Package indexes ────────────────────────────────────────────────

    fn package_indexes(&self, exports: &[Export], enum_names: &[String]) -> Vec<GeneratedFile> {
        const PACKAGES: [(Package, &str); 4] = [
            (Package::BaseModels, "Generated OCSF object models."),
            (Package::Events, "Generated OCSF event models."),
            (Package::Relations, "Generated OCSF array tables."),
            (Package::Metadata, "OCSF metadata registries."),
        ];

        let mut files = Vec::new();
        let mut root_imports = vec![format!(
            "from .base import {}, {}",
            self.base_class(),
            self.mixin_class()
        )];
        let mut root_names = vec![self.base_class(), self.mixin_class()];

        for (package, summary) in PACKAGES {
            let members: Vec<&Export> = exports.iter().filter(|e| e.package == package).collect();
            let Some(dir) = package.dir() else {
                continue;
            };
            if members.is_empty() {
                continue;
            }

            let mut body = String::new();
            for export in &members {
                writeln!(body, "from .{} import {}", export.module, export.name).unwrap();
            }
            writeln!(body).unwrap();
            let names: Vec<String> = members.iter().map(|e| e.name.clone()).collect();
            write_all_list(&mut body, &names);

            files.push(GeneratedFile {
                path: Path::new(dir).join("__init__.py"),
                content: format!("{}\n{body}", self.header(summary)),
                kind: FileKind::PackageIndex,
                source: None,
                table: None,
                classes: Vec::new(),
            });
            root_imports.push(format!("from .{dir} import *  # noqa: F401,F403"));
            root_names.extend(names);
        }

        if !enum_names.is_empty() {
            root_imports.push("from .enums import *  # noqa: F401,F403".to_string());
            root_names.extend(enum_names.iter().cloned());
        }

        let mut body = root_imports.join("\n");
        body.push_str("\n\n");
        write_all_list(&mut body, &root_names);
        files.push(GeneratedFile {
            path: PathBuf::from("__init__.py"),
            content: format!("{}\n{body}", self.header("Generated OCSF SQLAlchemy models.")),
            kind: FileKind::PackageIndex,
            source: None,
            table: None,
            classes: Vec::new(),
        });
        files
    }
}

/// `(name, python type, column type, nullable, extra options, comment)`.
type MetadataColumn = (
    &'static str,
    &'static str,
    &'static str,
    bool,
    &'static str,
    &'static str,
);

struct MetadataTable {
    module: &'static str,
    summary: &'static str,
    columns: &'static [MetadataColumn],
    repr_fields: &'static [&'static str],
}

const METADATA_TABLES: [MetadataTable; 5] = [
    MetadataTable {
        module: "objects",
        summary: "Registry of OCSF objects and event classes",
        columns: &[
            ("name", "str", "String(100)", false, "unique=True, ", "Object/event name"),
            ("caption", "str", "String(200)", false, "", "Human-readable caption"),
            ("description", "str", "Text", true, "", "Full description"),
            ("object_type", "str", "String(50)", false, "", "Type: object or event"),
            ("extends", "str", "String(100)", true, "", "Parent object/event name"),
            ("category", "str", "String(50)", true, "", "Event category"),
            ("uid", "int", "Integer", true, "", "Event class UID"),
        ],
        repr_fields: &["name"],
    },
    MetadataTable {
        module: "attributes",
        summary: "Registry of OCSF attributes",
        columns: &[
            ("name", "str", "String(100)", false, "index=True, ", "Attribute name"),
            ("object_name", "str", "String(100)", false, "index=True, ", "Parent object name"),
            ("caption", "str", "String(200)", false, "", "Human-readable caption"),
            ("description", "str", "Text", true, "", "Full description"),
            ("ocsf_type", "str", "String(50)", true, "", "OCSF type (e.g., string_t)"),
            ("requirement", "str", "String(20)", false, "default=\"optional\", ", "optional/recommended/required"),
            ("is_array", "bool", "Boolean", false, "default=False, ", "Whether this is an array"),
            ("is_inherited", "bool", "Boolean", false, "default=False, ", "Whether inherited from parent"),
            ("source_object", "str", "String(100)", true, "", "Object where originally defined"),
        ],
        repr_fields: &["name", "object_name"],
    },
    MetadataTable {
        module: "enums",
        summary: "Registry of OCSF enum values",
        columns: &[
            ("enum_name", "str", "String(100)", false, "index=True, ", "Enum name"),
            ("value_id", "int", "Integer", false, "", "Enum value ID"),
            ("caption", "str", "String(200)", false, "", "Human-readable caption"),
            ("description", "str", "Text", true, "", "Value description"),
        ],
        repr_fields: &["enum_name", "value_id"],
    },
    MetadataTable {
        module: "categories",
        summary: "Registry of OCSF event categories",
        columns: &[
            ("name", "str", "String(50)", false, "unique=True, ", "Category name"),
            ("caption", "str", "String(100)", false, "", "Human-readable caption"),
            ("description", "str", "Text", true, "", "Full description"),
            ("uid", "int", "Integer", false, "unique=True, ", "Category UID"),
        ],
        repr_fields: &["name", "uid"],
    },
    MetadataTable {
        module: "event_classes",
        summary: "Registry of OCSF event classes",
        columns: &[
            ("name", "str", "String(100)", false, "unique=True, ", "Event class name"),
            ("caption", "str", "String(200)", false, "", "Human-readable caption"),
            ("description", "str", "Text", true, "", "Full description"),
            ("uid", "int", "Integer", false, "unique=True, ", "Event class UID"),
            ("category_uid", "int", "Integer", false, "", "Parent category UID"),
            ("extends", "str", "String(100)", true, "", "Parent event class"),
        ],
        repr_fields: &["name", "uid"],
    },
];

/// Record that `path` defines `name`, failing if another file already does.
fn claim<'f>(
    seen: &mut BTreeMap<&'f str, &'f Path>,
    what: &'static str,
    name: &'f str,
    path: &'f Path,
) -> Result<()> {
    match seen.insert(name, path) {
        Some(first) => Err(Error::DuplicateName {
            what,
            name: name.to_string(),
            first: first.to_path_buf(),
            second: path.to_path_buf(),
        }),
        None => Ok(()),
    }
}

fn module_path(package: Package, module: &str) -> PathBuf {
    let file = format!("{module}.py");
    match package.dir() {
        Some(dir) => Path::new(dir).join(file),
        None => PathBuf::from(file),
    }
}

fn write_all_list(out: &mut String, names: &[String]) {
    writeln!(out, "__all__ = [").unwrap();
    for name in names {
        writeln!(out, "    \"{name}\",").unwrap();
    }
    writeln!(out, "]").unwrap();
}

/// Write content to a file, creating parent directories as needed.
fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, content).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
