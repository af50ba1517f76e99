//! Model contexts and Python rendering for entities and array tables.

use std::fmt::Write;

use log::debug;

use super::CodeGenerator;
use super::imports::{ImportSet, Package, module_name, relative_module};
use crate::analyzer::{ArrayAttributeInfo, ColumnKind, entity_columns};
use crate::error::{Error, Result};
use crate::resolver::{EntityKind, ResolvedEntity};
use crate::type_map::TypeMapping;

/// Column comments are cut to this many characters.
const COMMENT_LIMIT: usize = 200;

/// Docstring paragraphs wrap at this width, indentation included.
const DOC_WIDTH: usize = 76;

/// Names a mapped attribute cannot take: Python keywords, `id` (the
/// primary key), and the attributes `DeclarativeBase` reserves.
const RESERVED_NAMES: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "id", "if", "import", "in", "is", "lambda", "metadata", "nonlocal", "not", "or", "pass",
    "raise", "registry", "return", "try", "type", "while", "with", "yield",
];

/// Escape a reserved name with a trailing underscore.
pub fn attribute_name(name: &str) -> String {
    if RESERVED_NAMES.contains(&name) {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

/// Escape text for a double-quoted Python string literal.
pub fn py_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' | '\r' | '\t' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Comment text for a column: the description, else the caption.
fn column_comment(description: &str, caption: &str) -> String {
    let text = if description.trim().is_empty() {
        caption
    } else {
        description
    };
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut: String = flat.chars().take(COMMENT_LIMIT).collect();
    py_str(cut.trim_end())
}

/// Write an indented class docstring: a summary line, then wrapped
/// paragraphs.
pub fn write_docstring(out: &mut String, indent: &str, summary: &str, paragraphs: &[&str]) {
    let escape = |s: &str| s.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"");
    let summary = summary.trim();
    let summary = if summary.ends_with('.') {
        summary.to_string()
    } else {
        format!("{summary}.")
    };
    let paragraphs: Vec<&str> = paragraphs
        .iter()
        .copied()
        .filter(|p| !p.trim().is_empty())
        .collect();

    if paragraphs.is_empty() {
        writeln!(out, "{indent}\"\"\"{}\"\"\"", escape(&summary)).unwrap();
        return;
    }
    writeln!(out, "{indent}\"\"\"{}", escape(&summary)).unwrap();
    for paragraph in paragraphs {
        writeln!(out).unwrap();
        for line in wrap(&escape(paragraph), DOC_WIDTH.saturating_sub(indent.len())) {
            writeln!(out, "{indent}{line}").unwrap();
        }
    }
    writeln!(out, "{indent}\"\"\"").unwrap();
}

/// Greedy word wrap. Words longer than `width` get a line of their own.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

// ── Entity models ──────────────────────────────────────────────────────

/// The generated parent class of an entity.
#[derive(Debug, Clone)]
pub struct ParentModel {
    pub name: String,
    pub class_name: String,
    pub table_name: String,
    pub module: String,
}

/// How a column's value is stored.
#[derive(Debug, Clone)]
pub enum Storage {
    Scalar(TypeMapping),
    ForeignKey { target: String, table: String },
}

#[derive(Debug, Clone)]
pub struct ColumnModel {
    /// Mapped attribute name, escaped.
    pub name: String,
    pub nullable: bool,
    /// Escaped, truncated comment text; empty for none.
    pub comment: String,
    pub storage: Storage,
}

/// How a relationship reaches its target.
#[derive(Debug, Clone)]
pub enum Link {
    /// Through a foreign key column on this table.
    ManyToOne {
        fk_column: String,
        self_referential: bool,
    },
    /// Through an association table. `joins` holds explicit primary and
    /// secondary join conditions when both ends share an inheritance line.
    ManyToMany {
        table: String,
        joins: Option<(String, String)>,
    },
    /// To the rows of a scalar-array class.
    Values { back_populates: String },
}

#[derive(Debug, Clone)]
pub struct RelationshipModel {
    pub name: String,
    pub target_class: String,
    /// Module of the target class, relative to this entity's module.
    pub target_module: String,
    pub link: Link,
}

/// Everything needed to render one entity's model file.
#[derive(Debug, Clone)]
pub struct EntityModel<'g> {
    pub entity: &'g ResolvedEntity,
    pub kind: EntityKind,
    pub class_name: String,
    pub table_name: String,
    pub identity: String,
    pub parent: Option<ParentModel>,
    pub polymorphic_root: bool,
    /// Class uid and category for events.
    pub event: Option<(i64, String)>,
    pub columns: Vec<ColumnModel>,
    pub relationships: Vec<RelationshipModel>,
}

impl EntityModel<'_> {
    /// Whether a foreign key column points at the parent table, making the
    /// inheritance join ambiguous.
    fn references_parent(&self) -> bool {
        let Some(parent) = &self.parent else {
            return false;
        };
        self.columns.iter().any(|c| {
            matches!(&c.storage, Storage::ForeignKey { target, .. } if *target == parent.name)
        })
    }
}

/// An array attribute that gets a backing table.
#[derive(Debug, Clone, Copy)]
pub struct ArrayLink<'g> {
    pub info: &'g ArrayAttributeInfo,
    /// Element object, for arrays of objects.
    pub element: Option<&'g str>,
}

/// Resolve the backing table of `parent.attribute`.
///
/// `None` when the schema no longer carries the array or, for object
/// arrays, its relationship.
pub fn array_link<'g>(
    generator: &CodeGenerator<'g>,
    parent: &str,
    attribute: &str,
) -> Result<Option<ArrayLink<'g>>> {
    let schema = generator.schema;
    let Some(info) = schema.array_attribute(parent, attribute) else {
        debug!("skipping {parent}.{attribute}: array is outside the generated schema");
        return Ok(None);
    };
    if info.is_primitive {
        return Ok(Some(ArrayLink {
            info,
            element: None,
        }));
    }
    let Some(relationship) = schema.relationship(parent, attribute) else {
        debug!(
            "skipping {parent}.{attribute}: '{}' is outside the generated schema",
            info.element_type
        );
        return Ok(None);
    };
    let element = checked_target(generator, parent, attribute, &relationship.target_entity)?;
    Ok(Some(ArrayLink {
        info,
        element: Some(element),
    }))
}

fn checked_target<'g>(
    generator: &CodeGenerator<'g>,
    entity: &str,
    attribute: &str,
    target: &'g str,
) -> Result<&'g str> {
    if generator.schema.objects.contains_key(target) {
        Ok(target)
    } else {
        Err(Error::DanglingReference {
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            target: target.to_string(),
        })
    }
}

/// Parent and element columns of an association table.
pub fn association_columns(generator: &CodeGenerator<'_>, parent: &str, element: &str) -> (String, String) {
    let parent_column = generator.naming.foreign_key_column(parent);
    let element_column = generator.naming.foreign_key_column(element);
    if element_column == parent_column {
        let related = format!("related_{element_column}");
        (parent_column, related)
    } else {
        (parent_column, element_column)
    }
}

/// Name of the back-reference from array rows to their owner.
fn owner_attribute(generator: &CodeGenerator<'_>, parent: &str) -> String {
    attribute_name(&generator.naming.relationship_name(parent))
}

/// Build the render context for one entity.
pub fn entity_model<'g>(
    generator: &CodeGenerator<'g>,
    entity: &'g ResolvedEntity,
    kind: EntityKind,
) -> Result<EntityModel<'g>> {
    let schema = generator.schema;
    let naming = &generator.naming;
    let name = entity.name.as_str();
    let package = Package::for_kind(kind);
    let tree = schema.tree(kind);

    let parent = tree.parent(name).map(|p| ParentModel {
        name: p.to_string(),
        class_name: naming.class_name(p),
        table_name: naming.table_name(p),
        module: relative_module(package, package, &module_name(p)),
    });

    let mut columns = Vec::new();
    let mut relationships = Vec::new();

    for column in entity_columns(entity, &generator.types, naming) {
        let storage = match &column.kind {
            ColumnKind::Scalar { ocsf_type } => Storage::Scalar(generator.types.mapping(ocsf_type).clone()),
            ColumnKind::ForeignKey { target } => {
                let Some(relationship) = schema.relationship(name, &column.attribute) else {
                    debug!(
                        "skipping {name}.{}: '{target}' is outside the generated schema",
                        column.attribute
                    );
                    continue;
                };
                let target =
                    checked_target(generator, name, &column.attribute, &relationship.target_entity)?;
                relationships.push(RelationshipModel {
                    name: attribute_name(&naming.relationship_name(&column.attribute)),
                    target_class: naming.class_name(target),
                    target_module: relative_module(package, Package::BaseModels, &module_name(target)),
                    link: Link::ManyToOne {
                        fk_column: attribute_name(&column.name),
                        self_referential: kind == EntityKind::Object && target == name,
                    },
                });
                Storage::ForeignKey {
                    target: target.to_string(),
                    table: naming.table_name(target),
                }
            }
        };
        columns.push(ColumnModel {
            name: attribute_name(&column.name),
            nullable: column.nullable,
            comment: column_comment(&column.description, &column.caption),
            storage,
        });
    }

    let class_name = naming.class_name(name);
    for attr in entity.own_attributes.values().filter(|a| a.is_array) {
        let Some(link) = array_link(generator, name, &attr.name)? else {
            continue;
        };
        let relationship_name = attribute_name(&naming.relationship_name(&attr.name));
        let table = &link.info.association_table_name;
        let relationship = match link.element {
            Some(element) => {
                let element_class = naming.class_name(element);
                let shares_lineage = entity.inheritance_chain.iter().any(|n| n == element)
                    || schema
                        .objects
                        .get(element)
                        .is_some_and(|e| e.inheritance_chain.iter().any(|n| n == name));
                let joins = shares_lineage.then(|| {
                    let (parent_column, element_column) = association_columns(generator, name, element);
                    let var = module_name(table);
                    (
                        format!("{class_name}.id == {var}.c.{parent_column}"),
                        format!("{element_class}.id == {var}.c.{element_column}"),
                    )
                });
                RelationshipModel {
                    name: relationship_name,
                    target_module: relative_module(package, Package::BaseModels, &module_name(element)),
                    target_class: element_class,
                    link: Link::ManyToMany {
                        table: table.clone(),
                        joins,
                    },
                }
            }
            None => RelationshipModel {
                name: relationship_name,
                target_class: naming.array_class_name(name, &attr.name),
                target_module: relative_module(package, Package::Relations, &module_name(table)),
                link: Link::Values {
                    back_populates: owner_attribute(generator, name),
                },
            },
        };
        relationships.push(relationship);
    }

    let event = match kind {
        EntityKind::Event => schema.events.get(name).map(|e| (e.uid, e.category.clone())),
        EntityKind::Object => None,
    };

    Ok(EntityModel {
        entity,
        kind,
        class_name,
        table_name: naming.table_name(name),
        identity: naming.discriminator_value(name),
        polymorphic_root: tree.is_polymorphic_base(name),
        parent,
        event,
        columns,
        relationships,
    })
}

/// Render one entity model module.
pub fn render_entity(generator: &CodeGenerator<'_>, model: &EntityModel<'_>) -> String {
    let package = Package::for_kind(model.kind);
    let mut imports = ImportSet::new();
    let mut body = String::new();

    imports.use_orm("Mapped");
    imports.use_orm("mapped_column");

    let bases = match &model.parent {
        Some(parent) => {
            imports.import_from(parent.module.clone(), parent.class_name.clone());
            parent.class_name.clone()
        }
        None => {
            let base = generator.base_class();
            let mixin = generator.mixin_class();
            let module = relative_module(package, Package::Root, "base");
            imports.import_from(module.clone(), base.clone());
            imports.import_from(module, mixin.clone());
            format!("{base}, {mixin}")
        }
    };

    let chain = format!("Inheritance chain: {}", model.entity.inheritance_chain.join(" -> "));
    writeln!(body, "class {}({bases}):", model.class_name).unwrap();
    write_docstring(
        &mut body,
        "    ",
        &model.entity.caption,
        &[model.entity.description.as_str(), chain.as_str()],
    );
    writeln!(body).unwrap();
    writeln!(body, "    __tablename__ = \"{}\"", model.table_name).unwrap();
    if let Some((uid, category)) = &model.event {
        writeln!(body, "    __ocsf_class_uid__ = {uid}").unwrap();
        writeln!(body, "    __ocsf_category__ = \"{}\"", py_str(category)).unwrap();
    }
    writeln!(body).unwrap();

    let mut mapper_args = Vec::new();
    match &model.parent {
        Some(parent) => {
            imports.use_sqlalchemy("ForeignKey");
            writeln!(body, "    # Joined table inheritance from {}", parent.name).unwrap();
            writeln!(body, "    id: Mapped[int] = mapped_column(").unwrap();
            writeln!(
                body,
                "        ForeignKey(\"{}.id\", ondelete=\"CASCADE\"),",
                parent.table_name
            )
            .unwrap();
            writeln!(body, "        primary_key=True,").unwrap();
            writeln!(body, "    )").unwrap();
            mapper_args.push(format!("\"polymorphic_identity\": \"{}\"", model.identity));
            if model.references_parent() {
                mapper_args.push(format!("\"inherit_condition\": id == {}.id", parent.class_name));
            }
        }
        None => {
            writeln!(body, "    id: Mapped[int] = mapped_column(primary_key=True)").unwrap();
            if model.polymorphic_root {
                imports.use_sqlalchemy("String");
                writeln!(
                    body,
                    "    _type: Mapped[str] = mapped_column(String(100), nullable=False)"
                )
                .unwrap();
                mapper_args.push("\"polymorphic_on\": \"_type\"".to_string());
                mapper_args.push(format!("\"polymorphic_identity\": \"{}\"", model.identity));
            }
        }
    }
    if !mapper_args.is_empty() {
        writeln!(body, "    __mapper_args__ = {{{}}}", mapper_args.join(", ")).unwrap();
    }

    if !model.columns.is_empty() {
        writeln!(body, "\n    # Attributes").unwrap();
        for column in &model.columns {
            render_column(&mut body, &mut imports, column);
        }
    }

    if !model.relationships.is_empty() {
        writeln!(body, "\n    # Relationships").unwrap();
        for relationship in &model.relationships {
            render_relationship(&mut body, &mut imports, &model.class_name, relationship);
        }
    }

    writeln!(body).unwrap();
    writeln!(body, "    def __repr__(self) -> str:").unwrap();
    writeln!(body, "        return f\"<{}(id={{self.id}})>\"", model.class_name).unwrap();

    let title = match model.kind {
        EntityKind::Object => "object",
        EntityKind::Event => "event",
    };
    generator.python_module(
        &format!("Generated {title} model: {}.", model.entity.name),
        &imports,
        &body,
    )
}

fn render_column(out: &mut String, imports: &mut ImportSet, column: &ColumnModel) {
    let (python, type_expr, foreign_table) = match &column.storage {
        Storage::Scalar(mapping) => {
            imports.use_column_type(mapping);
            (mapping.python_type.as_str(), mapping.column_type(), None)
        }
        Storage::ForeignKey { table, .. } => {
            imports.use_sqlalchemy("Integer");
            imports.use_sqlalchemy("ForeignKey");
            ("int", "Integer".to_string(), Some(table))
        }
    };
    let annotation = if column.nullable {
        imports.use_typing("Optional");
        format!("Optional[{python}]")
    } else {
        python.to_string()
    };

    writeln!(out, "    {}: Mapped[{annotation}] = mapped_column(", column.name).unwrap();
    writeln!(out, "        {type_expr},").unwrap();
    if let Some(table) = foreign_table {
        if column.nullable {
            writeln!(out, "        ForeignKey(\"{table}.id\", ondelete=\"SET NULL\"),").unwrap();
        } else {
            writeln!(out, "        ForeignKey(\"{table}.id\"),").unwrap();
        }
    }
    if !column.comment.is_empty() {
        writeln!(out, "        comment=\"{}\",", column.comment).unwrap();
    }
    writeln!(out, "        nullable={},", py_bool(column.nullable)).unwrap();
    writeln!(out, "    )").unwrap();
}

fn render_relationship(
    out: &mut String,
    imports: &mut ImportSet,
    class_name: &str,
    relationship: &RelationshipModel,
) {
    imports.use_orm("relationship");
    let target = &relationship.target_class;
    if target != class_name {
        imports.import_for_typing(relationship.target_module.clone(), target.clone());
    }

    match &relationship.link {
        Link::ManyToOne {
            fk_column,
            self_referential,
        } => {
            imports.use_typing("Optional");
            writeln!(
                out,
                "    {}: Mapped[Optional[\"{target}\"]] = relationship(",
                relationship.name
            )
            .unwrap();
            writeln!(out, "        \"{target}\",").unwrap();
            writeln!(out, "        foreign_keys=[{fk_column}],").unwrap();
            if *self_referential {
                writeln!(out, "        remote_side=[id],").unwrap();
            }
        }
        Link::ManyToMany { table, joins } => {
            imports.use_typing("List");
            writeln!(
                out,
                "    {}: Mapped[List[\"{target}\"]] = relationship(",
                relationship.name
            )
            .unwrap();
            writeln!(out, "        \"{target}\",").unwrap();
            writeln!(out, "        secondary=\"{table}\",").unwrap();
            if let Some((primary, secondary)) = joins {
                writeln!(out, "        primaryjoin=\"{primary}\",").unwrap();
                writeln!(out, "        secondaryjoin=\"{secondary}\",").unwrap();
            }
        }
        Link::Values { back_populates } => {
            imports.use_typing("List");
            writeln!(
                out,
                "    {}: Mapped[List[\"{target}\"]] = relationship(",
                relationship.name
            )
            .unwrap();
            writeln!(out, "        \"{target}\",").unwrap();
            writeln!(out, "        back_populates=\"{back_populates}\",").unwrap();
            writeln!(out, "        order_by=\"{target}.position\",").unwrap();
            writeln!(out, "        cascade=\"all, delete-orphan\",").unwrap();
        }
    }
    writeln!(out, "    )").unwrap();
}

// ── Array tables ───────────────────────────────────────────────────────

/// Render the association `Table` backing an array of objects.
pub fn render_association(
    generator: &CodeGenerator<'_>,
    link: &ArrayLink<'_>,
    element: &str,
) -> String {
    let info = link.info;
    let naming = &generator.naming;
    let table = &info.association_table_name;
    let (parent_column, element_column) =
        association_columns(generator, &info.parent_entity, element);

    let mut imports = ImportSet::new();
    for symbol in ["Column", "ForeignKey", "Integer", "Table"] {
        imports.use_sqlalchemy(symbol);
    }
    imports.import_from(
        relative_module(Package::Relations, Package::Root, "base"),
        generator.base_class(),
    );

    let mut body = String::new();
    writeln!(body, "{} = Table(", module_name(table)).unwrap();
    writeln!(body, "    \"{table}\",").unwrap();
    writeln!(body, "    {}.metadata,", generator.base_class()).unwrap();
    writeln!(body, "    Column(\"id\", Integer, primary_key=True),").unwrap();
    for (column, target) in [
        (&parent_column, info.parent_entity.as_str()),
        (&element_column, element),
    ] {
        writeln!(body, "    Column(").unwrap();
        writeln!(body, "        \"{column}\",").unwrap();
        writeln!(body, "        Integer,").unwrap();
        writeln!(
            body,
            "        ForeignKey(\"{}.id\", ondelete=\"CASCADE\"),",
            naming.table_name(target)
        )
        .unwrap();
        writeln!(body, "        nullable=False,").unwrap();
        writeln!(body, "        index=True,").unwrap();
        writeln!(body, "    ),").unwrap();
    }
    writeln!(
        body,
        "    Column(\"position\", Integer, nullable=True, comment=\"Order in the array\"),"
    )
    .unwrap();
    writeln!(
        body,
        "    comment=\"Association table for {}.{}\",",
        py_str(&info.parent_entity),
        py_str(&info.attribute_name)
    )
    .unwrap();
    writeln!(body, ")").unwrap();

    generator.python_module(&format!("Generated association table: {table}."), &imports, &body)
}

/// Render the mapped class backing an array of scalars.
pub fn render_value_table(
    generator: &CodeGenerator<'_>,
    link: &ArrayLink<'_>,
    parent_kind: EntityKind,
) -> String {
    let info = link.info;
    let naming = &generator.naming;
    let parent = info.parent_entity.as_str();
    let class_name = naming.array_class_name(parent, &info.attribute_name);
    let parent_class = naming.class_name(parent);
    let parent_column = naming.foreign_key_column(parent);
    let owner = owner_attribute(generator, parent);
    let value = generator.types.mapping(&info.element_type);

    let mut imports = ImportSet::new();
    imports.import_from(
        relative_module(Package::Relations, Package::Root, "base"),
        generator.base_class(),
    );
    imports.import_for_typing(
        relative_module(
            Package::Relations,
            Package::for_kind(parent_kind),
            &module_name(parent),
        ),
        parent_class.clone(),
    );
    imports.use_sqlalchemy("ForeignKey");
    imports.use_sqlalchemy("Integer");
    imports.use_column_type(value);
    imports.use_typing("Optional");
    for symbol in ["Mapped", "mapped_column", "relationship"] {
        imports.use_orm(symbol);
    }

    let mut body = String::new();
    writeln!(body, "class {class_name}({}):", generator.base_class()).unwrap();
    write_docstring(
        &mut body,
        "    ",
        &format!("Values of {parent}.{}", info.attribute_name),
        &[],
    );
    writeln!(body).unwrap();
    writeln!(body, "    __tablename__ = \"{}\"", info.association_table_name).unwrap();
    writeln!(body).unwrap();
    writeln!(body, "    id: Mapped[int] = mapped_column(primary_key=True)").unwrap();
    writeln!(body, "    {parent_column}: Mapped[int] = mapped_column(").unwrap();
    writeln!(body, "        Integer,").unwrap();
    writeln!(
        body,
        "        ForeignKey(\"{}.id\", ondelete=\"CASCADE\"),",
        naming.table_name(parent)
    )
    .unwrap();
    writeln!(body, "        nullable=False,").unwrap();
    writeln!(body, "        index=True,").unwrap();
    writeln!(body, "    )").unwrap();
    writeln!(
        body,
        "    value: Mapped[Optional[{}]] = mapped_column({}, nullable=True)",
        value.python_type,
        value.column_type()
    )
    .unwrap();
    writeln!(
        body,
        "    position: Mapped[Optional[int]] = mapped_column(Integer, nullable=True, comment=\"Order in the array\")"
    )
    .unwrap();
    writeln!(body).unwrap();
    writeln!(
        body,
        "    {owner}: Mapped[\"{parent_class}\"] = relationship(\"{parent_class}\", back_populates=\"{}\")",
        attribute_name(&naming.relationship_name(&info.attribute_name))
    )
    .unwrap();
    writeln!(body).unwrap();
    writeln!(body, "    def __repr__(self) -> str:").unwrap();
    writeln!(
        body,
        "        return f\"<{class_name}({parent_column}={{self.{parent_column}}}, value={{self.value!r}})>\""
    )
    .unwrap();

    generator.python_module(
        &format!("Generated array table: {}.", info.association_table_name),
        &imports,
        &body,
    )
}
