use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use ocsf_orm_gen::analyzer::{RelationshipKind, SchemaAnalyzer};
use ocsf_orm_gen::codegen::{CodeGenerator, GenerationStats};
use ocsf_orm_gen::error::Result;
use ocsf_orm_gen::filter::{DEFAULT_MAX_DEPTH, FilterConfig, ObjectFilter};
use ocsf_orm_gen::naming::{NamingConfig, NamingConvention};
use ocsf_orm_gen::schema::SchemaLoader;

/// Generate SQLAlchemy ORM models from the OCSF schema source tree.
///
/// Reads a checkout of the ocsf-schema repository and generates a Python
/// package of joined-table-inheritance models for PostgreSQL.
#[derive(Parser)]
#[command(name = "ocsf-orm-gen", version, about)]
struct Cli {
    /// Root of the OCSF schema checkout.
    #[arg(
        long,
        global = true,
        env = "OCSF_SCHEMA_PATH",
        default_value = "ocsf-schema"
    )]
    schema_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate SQLAlchemy models.
    Generate {
        /// Output directory for the generated package.
        #[arg(long, short, default_value = "generated_models")]
        output: PathBuf,

        /// Prefix for table names.
        #[arg(long, default_value = "ocsf_")]
        table_prefix: String,

        /// Suffix for table names.
        #[arg(long, default_value = "")]
        table_suffix: String,

        /// Prefix for class names.
        #[arg(long, default_value = "Ocsf")]
        class_prefix: String,

        /// Suffix for class names.
        #[arg(long, default_value = "")]
        class_suffix: String,

        /// Generate only the objects reachable from this object.
        ///
        /// Example: --core-object user --max-depth 2
        #[arg(long)]
        core_object: Option<String>,

        /// Maximum reference depth followed from the core object.
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        /// Also generate events that reference a kept object.
        #[arg(long)]
        include_events: bool,

        /// Suppress non-error output.
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show the schema version and entity counts.
    Info,

    /// Show inheritance, relationship, and enum statistics.
    Analyze,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");

        // Print cause chain.
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = std::error::Error::source(cause);
        }

        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Generate {
            output,
            table_prefix,
            table_suffix,
            class_prefix,
            class_suffix,
            core_object,
            max_depth,
            include_events,
            quiet,
        } => {
            let naming = NamingConvention::new(NamingConfig {
                table_prefix,
                table_suffix,
                class_prefix,
                class_suffix,
            });

            if !quiet {
                eprintln!("Loading schema from {}", cli.schema_path.display());
            }
            let analyzer = SchemaAnalyzer::load(&cli.schema_path)?.with_naming(naming.clone());
            let mut analyzed = analyzer.analyze();
            if !quiet {
                eprintln!(
                    "Loaded OCSF v{}: {} objects, {} events",
                    analyzed.version,
                    analyzed.objects.len(),
                    analyzed.events.len()
                );
            }

            if let Some(core_object) = core_object {
                let config = FilterConfig::new(core_object)
                    .with_max_depth(max_depth)
                    .with_events(include_events);
                let (filtered, result) = ObjectFilter::new(&analyzed).filter(&config)?;
                if !quiet {
                    eprintln!(
                        "Filtered to {} objects ({} for inheritance), {} events",
                        result.included_objects.len(),
                        result.inheritance_additions.len(),
                        result.included_events.len()
                    );
                }
                analyzed = filtered;
            }

            let generator = CodeGenerator::new(&analyzed, &output).with_naming(naming);
            let files = generator.generate_all()?;
            let written = generator.write_files(&files)?;
            if !quiet {
                let stats = GenerationStats::from_files(&files, &analyzed);
                eprintln!(
                    "Generated {} objects, {} events, {} association tables, {} value tables, {} enums",
                    stats.objects_generated,
                    stats.events_generated,
                    stats.association_tables,
                    stats.value_tables,
                    stats.enums_generated
                );
                eprintln!("Wrote {} files to {}", written.len(), output.display());
                eprintln!("Done.");
            }
        }

        Commands::Info => {
            let loader = SchemaLoader::new(&cli.schema_path)?;
            let objects = loader.list_objects()?;
            let events = loader.list_events()?;

            println!("OCSF schema version: {}", loader.get_version()?);
            println!("Schema path: {}", loader.root().display());
            println!("Objects: {}", objects.len());
            println!("Events: {}", events.len());
            print_sample("Objects", &objects);
            print_sample("Events", &events);
        }

        Commands::Analyze => {
            let analyzed = SchemaAnalyzer::load(&cli.schema_path)?.analyze();

            println!("OCSF schema version: {}", analyzed.version);

            let mut by_depth: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
            for name in &analyzed.object_tree.topological_order {
                by_depth
                    .entry(analyzed.object_tree.depth(name))
                    .or_default()
                    .push(name);
            }
            println!("\nObjects by inheritance depth:");
            for (depth, names) in &by_depth {
                println!("  depth {depth}: {} objects", names.len());
            }
            println!(
                "  polymorphic bases: {}",
                analyzed
                    .object_tree
                    .roots
                    .iter()
                    .filter(|r| analyzed.object_tree.is_polymorphic_base(r))
                    .count()
            );

            let mut by_category: BTreeMap<&str, usize> = BTreeMap::new();
            for event in analyzed.events.values() {
                *by_category.entry(event.category.as_str()).or_default() += 1;
            }
            println!("\nEvents by category:");
            for (&category, count) in &by_category {
                let category = if category.is_empty() { "(none)" } else { category };
                println!("  {category}: {count}");
            }

            let foreign_keys = analyzed
                .relationships
                .iter()
                .filter(|r| r.kind == RelationshipKind::ForeignKey)
                .count();
            let primitive_arrays = analyzed
                .array_attributes
                .iter()
                .filter(|a| a.is_primitive)
                .count();
            println!("\nRelationships: {}", analyzed.relationships.len());
            println!("  foreign keys: {foreign_keys}");
            println!(
                "  association tables: {}",
                analyzed.relationships.len() - foreign_keys
            );
            println!("Array attributes: {}", analyzed.array_attributes.len());
            println!("  primitive: {primitive_arrays}");
            println!(
                "  object: {}",
                analyzed.array_attributes.len() - primitive_arrays
            );
            println!("Enums: {}", analyzed.enums.len());
            println!("Categories: {}", analyzed.categories.len());
        }
    }

    Ok(())
}

/// Print up to ten names, then a count of the rest.
fn print_sample(label: &str, names: &[String]) {
    println!("\n{label}:");
    for name in names.iter().take(10) {
        println!("  {name}");
    }
    if names.len() > 10 {
        println!("  ... and {} more", names.len() - 10);
    }
}
