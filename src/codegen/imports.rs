//! Exact import blocks for generated Python modules.
//!
//! Every generated file builds one [`ImportSet`] while its body is rendered:
//! each symbol is registered at the point the body first uses it, so the
//! rendered block never names a symbol the body does not reference and
//! never misses one it does.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::resolver::EntityKind;
use crate::type_map::TypeMapping;

/// Module that PostgreSQL-only column types are imported from.
const DIALECT_MODULE: &str = "sqlalchemy.dialects.postgresql";

/// Sub-package of the generated tree a module lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Package {
    Root,
    BaseModels,
    Events,
    Relations,
    Metadata,
}

impl Package {
    /// Directory name under the output root; `None` for the root itself.
    pub fn dir(self) -> Option<&'static str> {
        match self {
            Package::Root => None,
            Package::BaseModels => Some("base_models"),
            Package::Events => Some("events"),
            Package::Relations => Some("relations"),
            Package::Metadata => Some("metadata"),
        }
    }

    /// Package holding the models of one entity universe.
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Object => Package::BaseModels,
            EntityKind::Event => Package::Events,
        }
    }
}

/// Relative module path from a module in `from` to `module` in `to`.
///
/// | from | to | result |
/// |------|----|--------|
/// | `base_models` | `base_models` | `.user` |
/// | `events` | `base_models` | `..base_models.user` |
/// | `base_models` | root | `..base` |
/// | root | `events` | `.events.process_activity` |
pub fn relative_module(from: Package, to: Package, module: &str) -> String {
    if from == to {
        return format!(".{module}");
    }
    let up = if from == Package::Root { "." } else { ".." };
    match to.dir() {
        Some(dir) => format!("{up}{dir}.{module}"),
        None => format!("{up}{module}"),
    }
}

/// Python module name for an entity or table.
///
/// OCSF names are already identifiers apart from extension paths such as
/// `win/win_service`.
pub fn module_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Symbols one generated module imports, grouped by source.
#[derive(Debug, Clone, Default)]
pub struct ImportSet {
    datetime: bool,
    typing: BTreeSet<&'static str>,
    sqlalchemy: BTreeSet<String>,
    dialect: BTreeSet<String>,
    orm: BTreeSet<&'static str>,
    local: BTreeMap<String, BTreeSet<String>>,
    type_checking: BTreeMap<String, BTreeSet<String>>,
}

impl ImportSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_datetime(&mut self) {
        self.datetime = true;
    }

    pub fn use_typing(&mut self, name: &'static str) {
        self.typing.insert(name);
    }

    pub fn use_sqlalchemy(&mut self, name: &str) {
        self.sqlalchemy.insert(name.to_string());
    }

    pub fn use_orm(&mut self, name: &'static str) {
        self.orm.insert(name);
    }

    /// Register everything a column of this type needs: the SQLAlchemy type
    /// symbol (core or dialect) and `datetime` for its annotation.
    pub fn use_column_type(&mut self, mapping: &TypeMapping) {
        if mapping.dialect {
            self.dialect.insert(mapping.sa_type.clone());
        } else {
            self.sqlalchemy.insert(mapping.sa_type.clone());
        }
        if mapping.python_type == "datetime" {
            self.datetime = true;
        }
    }

    /// Import `name` from a generated module at runtime.
    pub fn import_from(&mut self, module: String, name: String) {
        self.local.entry(module).or_default().insert(name);
    }

    /// Import `name` for annotations only, under `if TYPE_CHECKING:`.
    ///
    /// Names already imported at runtime are not repeated.
    pub fn import_for_typing(&mut self, module: String, name: String) {
        if self.local.get(&module).is_some_and(|names| names.contains(&name)) {
            return;
        }
        self.type_checking.entry(module).or_default().insert(name);
    }

    /// Render the import block: standard library, SQLAlchemy, then the
    /// generated package. Ends with a newline when non-empty.
    pub fn render(&self) -> String {
        let mut typing = self.typing.clone();
        if !self.type_checking.is_empty() {
            typing.insert("TYPE_CHECKING");
        }

        let mut stdlib = String::new();
        if self.datetime {
            writeln!(stdlib, "from datetime import datetime").unwrap();
        }
        if !typing.is_empty() {
            writeln!(stdlib, "from typing import {}", join(typing.iter().copied())).unwrap();
        }

        let mut third_party = String::new();
        if !self.sqlalchemy.is_empty() {
            writeln!(
                third_party,
                "from sqlalchemy import {}",
                join(self.sqlalchemy.iter().map(String::as_str))
            )
            .unwrap();
        }
        if !self.dialect.is_empty() {
            writeln!(
                third_party,
                "from {DIALECT_MODULE} import {}",
                join(self.dialect.iter().map(String::as_str))
            )
            .unwrap();
        }
        if !self.orm.is_empty() {
            writeln!(
                third_party,
                "from sqlalchemy.orm import {}",
                join(self.orm.iter().copied())
            )
            .unwrap();
        }

        let mut local = String::new();
        for (module, names) in &self.local {
            writeln!(local, "from {module} import {}", join(names.iter().map(String::as_str))).unwrap();
        }
        if !self.type_checking.is_empty() {
            writeln!(local, "\nif TYPE_CHECKING:").unwrap();
            for (module, names) in &self.type_checking {
                writeln!(
                    local,
                    "    from {module} import {}",
                    join(names.iter().map(String::as_str))
                )
                .unwrap();
            }
        }

        [stdlib, third_party, local]
            .into_iter()
            .filter(|group| !group.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn join<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_map::TypeMapper;

    #[test]
    fn relative_paths_by_package() {
        use Package::*;
        assert_eq!(relative_module(BaseModels, BaseModels, "user"), ".user");
        assert_eq!(relative_module(Events, Events, "base_event"), ".base_event");
        assert_eq!(
            relative_module(Events, BaseModels, "user"),
            "..base_models.user"
        );
        assert_eq!(
            relative_module(BaseModels, Events, "base_event"),
            "..events.base_event"
        );
        assert_eq!(relative_module(Relations, Root, "base"), "..base");
        assert_eq!(relative_module(Root, Events, "x"), ".events.x");
    }

    #[test]
    fn module_names_are_identifiers() {
        assert_eq!(module_name("_entity"), "_entity");
        assert_eq!(module_name("win/win_service"), "win_win_service");
    }

    #[test]
    fn empty_set_renders_nothing() {
        assert_eq!(ImportSet::new().render(), "");
    }

    #[test]
    fn dialect_types_are_split_out() {
        let types = TypeMapper::new();
        let mut imports = ImportSet::new();
        imports.use_column_type(types.mapping("ip_t"));
        imports.use_column_type(types.mapping("string_t"));
        assert_eq!(
            imports.render(),
            "from sqlalchemy import Text\n\
             from sqlalchemy.dialects.postgresql import INET\n"
        );
    }

    #[test]
    fn datetime_follows_the_annotation() {
        let types = TypeMapper::new();
        let mut imports = ImportSet::new();
        imports.use_column_type(types.mapping("timestamp_t"));
        assert!(!imports.render().contains("datetime"));
        imports.use_column_type(types.mapping("datetime_t"));
        assert!(imports.render().starts_with("from datetime import datetime\n"));
    }

    #[test]
    fn typing_only_imports_go_under_type_checking() {
        let mut imports = ImportSet::new();
        imports.use_typing("Optional");
        imports.import_from("..base".to_string(), "OcsfBase".to_string());
        imports.import_for_typing(".device".to_string(), "OcsfDevice".to_string());
        // Already imported at runtime, so not repeated.
        imports.import_for_typing("..base".to_string(), "OcsfBase".to_string());

        let rendered = imports.render();
        assert_eq!(
            rendered,
            "from typing import Optional, TYPE_CHECKING\n\
             \n\
             from ..base import OcsfBase\n\
             \n\
             if TYPE_CHECKING:\n    from .device import OcsfDevice\n"
        );
    }
}
