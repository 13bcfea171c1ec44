//! Package Inspector CLI
//!
//! Loads a package definition, builds and validates it, and reports on its
//! version history, release resolution and registered entity types.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use verspack::{EntityRegistry, Package, PackageDef, Provenance, ValueRegistry};

#[derive(Parser)]
#[command(name = "verspack-inspect")]
#[command(about = "Build, validate and inspect versioned record packages")]
struct Cli {
    /// Path to the package definition JSON
    #[arg(short, long, default_value = "package.json")]
    definition: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the package and report every version and item
    History,

    /// Resolve a release version and list its public item types
    Release {
        /// Version to resolve (or "latest")
        #[arg(default_value = "latest")]
        version: String,
    },

    /// List the entity types the package registers for dispatch
    Entities,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(&cli.definition)?;
    let def: PackageDef = serde_json::from_str(&content)?;
    let package = Package::build(def)?;

    match cli.command {
        Commands::History => {
            println!("Package: {}", package.name());
            for (vid, version) in package.versions() {
                match version.previous {
                    Some(pid) => println!(
                        "  Version {} (from {})",
                        version.name,
                        package.version(pid).name
                    ),
                    None => println!("  Version {} (root)", version.name),
                }
                for &iid in package.items_of(vid) {
                    let item = package.item(iid);
                    let kind = if item.is_entity() { "entity" } else { "item" };
                    match item.provenance {
                        Provenance::New => {
                            println!("    + {} ({}, {} variables)", item.name, kind, item.variables.len())
                        }
                        Provenance::Modified => {
                            println!("    ~ {} ({}, {} variables)", item.name, kind, item.variables.len())
                        }
                        Provenance::Identical => println!("    = {} ({})", item.name, kind),
                        Provenance::Deleted => println!("    - {} ({})", item.name, kind),
                    }
                }
            }
            Ok(())
        }

        Commands::Release { version } => {
            let release = package.resolve_release(Some(&version))?;
            println!(
                "Release {} of {}: {} item(s)",
                release.version_name,
                package.name(),
                release.items.len()
            );
            for item in &release.items {
                println!("  {} -> {}", item.name, item.type_name);
            }
            Ok(())
        }

        Commands::Entities => {
            let values = Arc::new(ValueRegistry::new());
            let registry = EntityRegistry::from_package(&package, values);
            println!(
                "{} entity type(s) registered for {}",
                registry.len(),
                package.name()
            );
            for (vid, _) in package.versions() {
                for &iid in package.items_of(vid) {
                    let item = package.item(iid);
                    if item.is_entity() && item.is_concrete() {
                        println!("  {}", package.type_name(iid));
                    }
                }
            }
            Ok(())
        }
    }
}
