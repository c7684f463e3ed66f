//! Command-line arguments and the configuration derived from them.

use clap::{Args as ClapArgs, Parser, Subcommand};
use ormapi_core::store::DEFAULT_BUSY_TIMEOUT_MS;
use ormapi_core::{Dialect, EngineConfig, StoreConfig};
use ormapi_proto::DEFAULT_PAGE_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// JSON schema description.
    pub schema_path: PathBuf,
    /// SQLite store settings.
    pub store: StoreConfig,
    /// Query engine settings.
    pub engine: EngineConfig,
}

/// ormapi command-line interface
#[derive(Parser, Debug)]
#[command(name = "ormapi")]
#[command(version, about = "Relation-aware resource API over SQLite", long_about = None)]
pub struct Args {
    /// Path to the JSON schema description.
    #[arg(short, long, default_value = "schema.json")]
    pub schema: PathBuf,

    /// SQLite database file. Omit for a throwaway in-memory database.
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// Page size used when a query does not set one.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u64,

    /// Largest page size a query may request. Unbounded when omitted.
    #[arg(long)]
    pub max_page_size: Option<u64>,

    /// Busy timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_BUSY_TIMEOUT_MS)]
    pub busy_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Convert command-line arguments to the CLI configuration.
    pub fn into_config(self) -> (CliConfig, Command) {
        let store = match self.database {
            Some(path) => StoreConfig::new(path),
            None => StoreConfig::in_memory(),
        }
        .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms));

        let mut engine = EngineConfig::new().with_default_page_size(self.page_size);
        if let Some(max) = self.max_page_size {
            engine = engine.with_max_page_size(max);
        }

        let config = CliConfig {
            schema_path: self.schema,
            store,
            engine,
        };
        (config, self.command)
    }
}

/// A JSON argument: inline text, or `@path` to read a file.
#[derive(ClapArgs, Debug, Clone)]
pub struct JsonInput {
    /// JSON text, or @file.
    #[arg(long = "data")]
    pub data: String,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the tables described by the schema.
    Init,

    /// Read a page of a collection.
    GetAll {
        type_name: String,
        /// Query as JSON, or @file.
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Read one resource.
    GetOne {
        type_name: String,
        id: String,
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Create a resource from a JSON payload.
    Post {
        type_name: String,
        #[command(flatten)]
        input: JsonInput,
    },

    /// Update a resource from a JSON payload.
    Patch {
        type_name: String,
        id: String,
        #[command(flatten)]
        input: JsonInput,
    },

    /// Delete a resource.
    Delete { type_name: String, id: String },

    /// Read or modify relationship linkage.
    #[command(subcommand)]
    Relationship(RelationshipCommand),

    /// Print the statements a collection read would run.
    Explain {
        type_name: String,
        #[arg(short, long)]
        query: Option<String>,
        /// SQL dialect (sqlite or postgres).
        #[arg(long, default_value = "sqlite")]
        dialect: Dialect,
    },
}

/// Relationship subcommands. Bodies use the `{"data": ...}` form.
#[derive(Subcommand, Debug, Clone)]
pub enum RelationshipCommand {
    /// Read current linkage.
    Get {
        type_name: String,
        id: String,
        relation: String,
    },
    /// Add linkage.
    Post {
        type_name: String,
        id: String,
        relation: String,
        #[command(flatten)]
        input: JsonInput,
    },
    /// Replace linkage.
    Patch {
        type_name: String,
        id: String,
        relation: String,
        #[command(flatten)]
        input: JsonInput,
    },
    /// Remove linkage.
    Delete {
        type_name: String,
        id: String,
        relation: String,
        #[command(flatten)]
        input: JsonInput,
    },
}
