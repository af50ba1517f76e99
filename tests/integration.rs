//! End-to-end integration tests for ocsf-orm-gen.
//!
//! These tests write a small schema tree shaped like an ocsf-schema checkout
//! to a temporary directory and drive the full pipeline through the public
//! API: loading → analysis → filtering → model generation → writing.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use ocsf_orm_gen::analyzer::{AnalyzedSchema, SchemaAnalyzer};
use ocsf_orm_gen::codegen::{CodeGenerator, FileKind, GeneratedFile, GenerationStats};
use ocsf_orm_gen::error::Error;
use ocsf_orm_gen::filter::{FilterConfig, ObjectFilter};
use ocsf_orm_gen::schema::SchemaLoader;

/// Build a minimal but realistic schema checkout.
///
/// ```text
/// _entity <- user, group
/// a <- b            (b.ref points back at a)
/// device            (ip, owner -> user)
/// base_event <- authentication (iam, 3002)
/// ```
fn schema_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(root, "version.json", &json!({"version": "1.4.0"}));
    write(
        root,
        "dictionary.json",
        &json!({
            "attributes": {
                "name": {"caption": "Name", "type": "string_t", "description": "The name."},
                "uid": {"caption": "Unique ID", "type": "string_t"},
                "severity_id": {
                    "caption": "Severity ID",
                    "type": "integer_t",
                    "enum": {
                        "0": {"caption": "Unknown"},
                        "1": {"caption": "Informational"},
                        "99": {"caption": "Other"}
                    }
                }
            },
            "types": {"attributes": {
                "ip_t": {"caption": "IP Address", "type": "string_t"},
                "email_t": {"caption": "Email Address", "type": "string_t"}
            }}
        }),
    );
    write(
        root,
        "categories.json",
        &json!({"attributes": {
            "system": {"caption": "System Activity", "uid": 1},
            "iam": {"caption": "Identity & Access Management", "uid": 3}
        }}),
    );

    write(
        root,
        "objects/_entity.json",
        &json!({"caption": "Entity", "attributes": {
            "name": {"requirement": "recommended"},
            "uid": {"requirement": "recommended"}
        }}),
    );
    write(
        root,
        "objects/user.json",
        &json!({"caption": "User", "extends": "_entity", "attributes": {
            "email_addr": {"type": "email_t"},
            "groups": {"type": "object_t", "object_type": "group", "is_array": true}
        }}),
    );
    write(
        root,
        "objects/group.json",
        &json!({"caption": "Group", "extends": "_entity", "attributes": {
            "privileges": {"type": "string_t[]"}
        }}),
    );
    write(
        root,
        "objects/a.json",
        &json!({"caption": "A", "attributes": {
            "name": {"type": "string_t", "requirement": "required"}
        }}),
    );
    write(
        root,
        "objects/b.json",
        &json!({"caption": "B", "extends": "a", "attributes": {
            "ref": {"type": "object_t", "object_type": "a"}
        }}),
    );
    write(
        root,
        "objects/device.json",
        &json!({"caption": "Device", "attributes": {
            "ip": {"type": "ip_t"},
            "owner": {"type": "user"}
        }}),
    );

    write(
        root,
        "events/base_event.json",
        &json!({"caption": "Base Event", "attributes": {
            "time": {"type": "timestamp_t", "requirement": "required"},
            "severity_id": {"requirement": "required"}
        }}),
    );
    write(
        root,
        "events/iam/authentication.json",
        &json!({"caption": "Authentication", "uid": 3002, "extends": "base_event", "attributes": {
            "user": {"type": "user", "requirement": "required"},
            "src_ip": {"type": "ip_t"}
        }}),
    );
    dir
}

fn analyze(root: &Path) -> AnalyzedSchema {
    SchemaAnalyzer::load(root)
        .expect("schema should load")
        .analyze()
}

fn content<'f>(files: &'f [GeneratedFile], path: &str) -> &'f str {
    &files
        .iter()
        .find(|f| f.path == Path::new(path))
        .unwrap_or_else(|| panic!("{path} not generated"))
        .content
}

fn position(files: &[GeneratedFile], path: &str) -> usize {
    files
        .iter()
        .position(|f| f.path == Path::new(path))
        .unwrap_or_else(|| panic!("{path} not generated"))
}

/// Every entity's model is emitted after its parent's.
fn assert_topological(files: &[GeneratedFile], schema: &AnalyzedSchema) {
    for (dir, tree) in [
        ("base_models", &schema.object_tree),
        ("events", &schema.event_tree),
    ] {
        for name in &tree.topological_order {
            if let Some(parent) = tree.parent(name) {
                let child_at = position(files, &format!("{dir}/{name}.py"));
                let parent_at = position(files, &format!("{dir}/{parent}.py"));
                assert!(parent_at < child_at, "{name} emitted before {parent}");
            }
        }
    }
}

#[test]
fn reference_to_the_parent_round_trip() {
    let dir = schema_tree();
    let schema = analyze(dir.path());

    let files = CodeGenerator::new(&schema, "out").generate_all().unwrap();
    assert!(position(&files, "base_models/a.py") < position(&files, "base_models/b.py"));

    let b = content(&files, "base_models/b.py");
    assert!(b.contains("class OcsfB(OcsfA):"));
    assert!(b.contains("from .a import OcsfA\n"));
    assert!(b.contains("    ref_id: Mapped[Optional[int]] = mapped_column("));
    assert!(b.contains("ForeignKey(\"ocsf_a.id\", ondelete=\"SET NULL\"),"));
    assert!(b.contains("\"inherit_condition\": id == OcsfA.id"));

    let (_, result) = ObjectFilter::new(&schema)
        .filter(&FilterConfig::new("b").with_max_depth(0))
        .unwrap();
    assert!(result.inheritance_additions.contains("a"));
    assert_eq!(result.object_depths.get("b"), Some(&0));
    assert_eq!(
        result.included_objects.iter().collect::<Vec<_>>(),
        ["a", "b"]
    );
}

#[test]
fn full_pipeline_writes_package() {
    let schema_dir = schema_tree();
    let out = tempfile::tempdir().unwrap();
    let schema = analyze(schema_dir.path());

    let written = CodeGenerator::new(&schema, out.path()).write_all().unwrap();
    assert!(!written.is_empty());
    for path in &written {
        assert!(path.starts_with(out.path()));
        assert!(path.is_file(), "{} was not written", path.display());
    }

    let root = out.path();
    for file in [
        "base.py",
        "__init__.py",
        "enums.py",
        "base_models/__init__.py",
        "base_models/_entity.py",
        "base_models/user.py",
        "events/__init__.py",
        "events/authentication.py",
        "relations/__init__.py",
        "relations/ocsf_user_groups.py",
        "relations/ocsf_group_privileges.py",
        "metadata/__init__.py",
        "metadata/objects.py",
        "metadata/event_classes.py",
    ] {
        assert!(root.join(file).is_file(), "{file} missing");
    }

    let authentication = fs::read_to_string(root.join("events/authentication.py")).unwrap();
    assert!(authentication.contains("class OcsfAuthentication(OcsfBaseEvent):"));
    assert!(authentication.contains("    __ocsf_class_uid__ = 3002\n"));
    assert!(authentication.contains("    __ocsf_category__ = \"iam\"\n"));
    assert!(authentication.contains("    from ..base_models.user import OcsfUser\n"));

    let enums = fs::read_to_string(root.join("enums.py")).unwrap();
    assert!(enums.contains("class OcsfSeverityIdEnum(IntEnum):"));
}

#[test]
fn written_files_match_generated_files() {
    let schema_dir = schema_tree();
    let out = tempfile::tempdir().unwrap();
    let schema = analyze(schema_dir.path());

    let generator = CodeGenerator::new(&schema, out.path());
    let files = generator.generate_all().unwrap();
    let written = generator.write_files(&files).unwrap();

    assert_eq!(written.len(), files.len());
    for (file, path) in files.iter().zip(&written) {
        assert_eq!(*path, out.path().join(&file.path));
        assert_eq!(fs::read_to_string(path).unwrap(), file.content);
    }
    assert_eq!(walkdir(out.path()).len(), files.len());
}

#[test]
fn deterministic_output() {
    let schema_dir = schema_tree();
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    // Analyze twice so nothing is shared between the runs.
    CodeGenerator::new(&analyze(schema_dir.path()), dir_a.path())
        .write_all()
        .unwrap();
    CodeGenerator::new(&analyze(schema_dir.path()), dir_b.path())
        .write_all()
        .unwrap();

    let files_a = walkdir(dir_a.path());
    assert_eq!(files_a.len(), walkdir(dir_b.path()).len());

    // Compare all generated files byte-for-byte.
    for entry in files_a {
        let relative = entry.strip_prefix(dir_a.path()).unwrap();
        let file_a = fs::read_to_string(&entry).unwrap();
        let file_b = fs::read_to_string(dir_b.path().join(relative)).unwrap();
        assert_eq!(file_a, file_b, "files differ: {}", relative.display());
    }
}

#[test]
fn models_follow_inheritance_order() {
    let dir = schema_tree();
    let schema = analyze(dir.path());
    let files = CodeGenerator::new(&schema, "out").generate_all().unwrap();

    assert_topological(&files, &schema);
    assert!(
        position(&files, "base_models/_entity.py") < position(&files, "events/base_event.py")
    );
    assert_eq!(files[0].kind, FileKind::Base);
}

#[test]
fn filtered_generation_keeps_order_and_scope() {
    let dir = schema_tree();
    let schema = analyze(dir.path());

    let config = FilterConfig::new("device")
        .with_max_depth(1)
        .with_events(true);
    let (filtered, result) = ObjectFilter::new(&schema).filter(&config).unwrap();

    assert_eq!(result.object_depths.get("device"), Some(&0));
    assert_eq!(result.object_depths.get("user"), Some(&1));
    assert!(result.inheritance_additions.contains("_entity"));
    assert!(!result.included_objects.contains("group"));
    assert!(result.excluded_objects.contains("group"));
    assert!(result.included_events.contains("authentication"));

    let files = CodeGenerator::new(&filtered, "out").generate_all().unwrap();
    assert_topological(&files, &filtered);

    assert!(!files.iter().any(|f| f.path == Path::new("base_models/group.py")));
    assert!(!files.iter().any(|f| f.path == Path::new("relations/ocsf_user_groups.py")));
    let user = content(&files, "base_models/user.py");
    assert!(!user.contains("groups"));

    let device = content(&files, "base_models/device.py");
    assert!(device.contains("    owner_id: Mapped[Optional[int]] = mapped_column("));

    let stats = GenerationStats::from_files(&files, &filtered);
    assert_eq!(stats.objects_generated, 3);
    assert_eq!(stats.events_generated, 1);
    assert_eq!(stats.association_tables, 0);
}

#[test]
fn imports_are_minimal() {
    let dir = schema_tree();
    let schema = analyze(dir.path());
    let files = CodeGenerator::new(&schema, "out").generate_all().unwrap();

    let device = content(&files, "base_models/device.py");
    assert_eq!(
        device
            .lines()
            .find(|l| l.starts_with("from sqlalchemy.dialects.postgresql import")),
        Some("from sqlalchemy.dialects.postgresql import INET")
    );
    assert!(!device.contains("CIDR"));
    assert!(!device.contains("from datetime import"));
    assert!(!device.contains("List"));

    let a = content(&files, "base_models/a.py");
    assert!(!a.contains("dialects"));
    assert!(!a.contains("relationship"));
    assert!(!a.contains("TYPE_CHECKING"));
}

#[test]
fn foreign_key_column_does_not_shadow_a_scalar() {
    let dir = schema_tree();
    write(
        dir.path(),
        "objects/asset.json",
        &json!({"caption": "Asset", "attributes": {
            "owner": {"type": "user"},
            "owner_id": {"type": "integer_t"}
        }}),
    );
    let schema = analyze(dir.path());
    let files = CodeGenerator::new(&schema, "out").generate_all().unwrap();

    let asset = content(&files, "base_models/asset.py");
    assert_eq!(asset.matches("    owner_id: Mapped[").count(), 1);
    assert!(asset.contains("    owner_id: Mapped[Optional[int]] = mapped_column(\n        Integer,\n        nullable=True,"));
    assert!(asset.contains(
        "    owner_ref_id: Mapped[Optional[int]] = mapped_column(\n        Integer,\n        ForeignKey(\"ocsf_user.id\", ondelete=\"SET NULL\"),"
    ));
    assert!(asset.contains("        foreign_keys=[owner_ref_id],"));
}

#[test]
fn table_shared_by_an_object_and_an_array_is_rejected() {
    let dir = schema_tree();
    // `group.privileges` is backed by `ocsf_group_privileges`.
    write(
        dir.path(),
        "objects/group_privileges.json",
        &json!({"caption": "Group Privileges", "attributes": {"name": {"type": "string_t"}}}),
    );
    let schema = analyze(dir.path());

    let err = CodeGenerator::new(&schema, "out").generate_all().unwrap_err();
    match err {
        Error::DuplicateName { what, name, .. } => {
            assert_eq!(what, "table");
            assert_eq!(name, "ocsf_group_privileges");
        }
        other => panic!("expected DuplicateName, got {other:?}"),
    }

    // Nothing is written when generation fails.
    let out = tempfile::tempdir().unwrap();
    assert!(CodeGenerator::new(&schema, out.path()).write_all().is_err());
    assert!(walkdir(out.path()).is_empty());
}

#[test]
fn missing_required_file_is_reported() {
    let dir = schema_tree();
    fs::remove_file(dir.path().join("dictionary.json")).unwrap();

    match SchemaAnalyzer::load(dir.path()) {
        Err(Error::MissingFile { path }) => assert!(path.ends_with("dictionary.json")),
        Err(other) => panic!("expected MissingFile, got {other:?}"),
        Ok(_) => panic!("expected MissingFile, got a schema"),
    }
}

#[test]
fn unknown_core_object_returns_error() {
    let dir = schema_tree();
    let schema = analyze(dir.path());

    let err = ObjectFilter::new(&schema)
        .filter(&FilterConfig::new("nonexistent_object"))
        .unwrap_err();
    assert!(matches!(err, Error::ObjectNotFound { .. }));

    let message = err.to_string();
    assert!(message.contains("nonexistent_object"));
    assert!(message.contains("not found"));
    // Should mention available objects.
    assert!(message.contains("device"));
}

#[test]
fn loader_reports_version_and_listings() {
    let dir = schema_tree();
    let loader = SchemaLoader::new(dir.path()).unwrap();

    assert_eq!(loader.get_version().unwrap(), "1.4.0");
    assert_eq!(
        loader.list_objects().unwrap(),
        ["_entity", "a", "b", "device", "group", "user"]
    );
    assert!(loader.list_events().unwrap().contains(&"authentication".to_string()));
}

// ── Helpers ────────────────────────────────────────────────────────────

fn write(root: &Path, rel: &str, value: &Value) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn walkdir(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    fn walk(dir: &Path, files: &mut Vec<PathBuf>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, files);
                } else {
                    files.push(path);
                }
            }
        }
    }
    walk(dir, &mut files);
    files.sort();
    files
}
