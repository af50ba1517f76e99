//! Generate SQLAlchemy ORM models from the OCSF schema source tree.
//!
//! `ocsf-orm-gen` reads a checkout of the [OCSF](https://schema.ocsf.io/)
//! (Open Cybersecurity Schema Framework) schema repository and generates a
//! Python package of SQLAlchemy 2.x declarative models for PostgreSQL.
//!
//! # Pipeline
//!
//! 1. [`schema::SchemaLoader`] reads `version.json`, `dictionary.json`,
//!    `categories.json`, `objects/` and `events/`
//! 2. [`resolver::InheritanceResolver`] walks `extends` chains and merges
//!    attributes, falling back to the dictionary
//! 3. [`analyzer::SchemaAnalyzer`] derives relationships, array tables, and
//!    enums into an [`analyzer::AnalyzedSchema`]
//! 4. [`filter::ObjectFilter`] optionally narrows the schema to the objects
//!    reachable from one core object
//! 5. [`codegen::CodeGenerator`] renders the models
//!
//! # Features
//!
//! - Joined table inheritance with a discriminator on polymorphic roots
//! - Association tables for object arrays, value tables for scalar arrays
//! - Exact, minimal import blocks in every generated module
//! - Configurable table and class prefixes/suffixes
//! - Deterministic output: byte-identical across runs
//!
//! # Usage
//!
//! ```no_run
//! use ocsf_orm_gen::analyzer::SchemaAnalyzer;
//! use ocsf_orm_gen::codegen::CodeGenerator;
//! use ocsf_orm_gen::filter::{FilterConfig, ObjectFilter};
//!
//! let analyzed = SchemaAnalyzer::load("ocsf-schema")?.analyze();
//! let (filtered, result) =
//!     ObjectFilter::new(&analyzed).filter(&FilterConfig::new("user").with_max_depth(2))?;
//! let written = CodeGenerator::new(&filtered, "generated_models").write_all()?;
//! eprintln!(
//!     "Generated {} files for {} objects",
//!     written.len(),
//!     result.included_objects.len()
//! );
//! # Ok::<(), ocsf_orm_gen::error::Error>(())
//! ```

pub mod analyzer;
pub mod codegen;
pub mod error;
pub mod filter;
pub mod naming;
pub mod resolver;
pub mod schema;
pub mod type_map;
