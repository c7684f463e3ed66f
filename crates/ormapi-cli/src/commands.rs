//! Command execution.

use crate::config::{CliConfig, Command, JsonInput, RelationshipCommand};
use crate::error::CliError;
use ormapi_core::{ExplainService, ResourceService, SchemaRegistry, SqliteStore};
use ormapi_proto::{payload_from_json, query_from_json, Query, RelationshipBody};
use serde::Serialize;
use serde_json::Value as Json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolve `@path` arguments to file contents.
fn read_text(raw: &str) -> Result<String, CliError> {
    match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: PathBuf::from(path),
            source,
        }),
        None => Ok(raw.to_string()),
    }
}

fn parse_query(raw: Option<&str>) -> Result<Query, CliError> {
    match raw {
        Some(raw) => Ok(query_from_json(&read_text(raw)?)?),
        None => Ok(Query::new()),
    }
}

fn parse_body(input: &JsonInput) -> Result<RelationshipBody, CliError> {
    let text = read_text(&input.data)?;
    serde_json::from_str(&text).map_err(|e| CliError::Input(e.into()))
}

fn to_json<T: Serialize>(value: &T) -> Result<Json, CliError> {
    Ok(serde_json::to_value(value)?)
}

/// Run one command and return its JSON output.
pub fn execute(config: &CliConfig, command: Command) -> Result<Json, CliError> {
    let registry = Arc::new(SchemaRegistry::load(&config.schema_path)?);
    info!(
        schema = %config.schema_path.display(),
        types = registry.type_names().count(),
        "schema loaded"
    );

    // Explaining needs no database.
    if let Command::Explain {
        type_name,
        query,
        dialect,
    } = &command
    {
        let metadata = registry.get(type_name)?;
        let query = parse_query(query.as_deref())?;
        let explain = ExplainService::new(&registry, &config.engine).explain(&metadata, &query, *dialect)?;
        return to_json(&explain);
    }

    let store = SqliteStore::open(&config.store)?;
    debug!(path = ?config.store.path, "store opened");

    if let Command::Init = command {
        store.create_schema(&registry)?;
        info!("tables created");
        return Ok(serde_json::json!({ "created": registry.type_names().collect::<Vec<_>>() }));
    }

    let service = ResourceService::with_config(registry, Arc::new(store), config.engine.clone());
    match command {
        Command::GetAll { type_name, query } => {
            to_json(&service.get_all(&type_name, &parse_query(query.as_deref())?)?)
        }
        Command::GetOne {
            type_name,
            id,
            query,
        } => to_json(&service.get_one(&type_name, &id, &parse_query(query.as_deref())?)?),
        Command::Post { type_name, input } => {
            let payload = payload_from_json(&read_text(&input.data)?)?;
            to_json(&service.post_one(&type_name, &payload)?)
        }
        Command::Patch {
            type_name,
            id,
            input,
        } => {
            let payload = payload_from_json(&read_text(&input.data)?)?;
            to_json(&service.patch_one(&type_name, &id, &payload)?)
        }
        Command::Delete { type_name, id } => {
            service.delete_one(&type_name, &id)?;
            Ok(serde_json::json!({ "deleted": { "type": type_name, "id": id } }))
        }
        Command::Relationship(command) => relationship(&service, command),
        Command::Init | Command::Explain { .. } => Ok(Json::Null),
    }
}

fn relationship(service: &ResourceService, command: RelationshipCommand) -> Result<Json, CliError> {
    let data = match command {
        RelationshipCommand::Get {
            type_name,
            id,
            relation,
        } => service.get_relationship(&type_name, &id, &relation)?,
        RelationshipCommand::Post {
            type_name,
            id,
            relation,
            input,
        } => service.post_relationship(&type_name, &id, &relation, &parse_body(&input)?.data)?,
        RelationshipCommand::Patch {
            type_name,
            id,
            relation,
            input,
        } => service.patch_relationship(&type_name, &id, &relation, &parse_body(&input)?.data)?,
        RelationshipCommand::Delete {
            type_name,
            id,
            relation,
            input,
        } => service.delete_relationship(&type_name, &id, &relation, &parse_body(&input)?.data)?,
    };
    to_json(&RelationshipBody::from(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use clap::Parser;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"{
        "entities": [
            {
                "type": "users",
                "properties": [{"name": "login", "type": "string"}],
                "relations": [
                    {
                        "name": "roles",
                        "cardinality": "many-to-many",
                        "target": "roles",
                        "pivot": {"table": "users_have_roles", "ownerColumn": "user_id", "targetColumn": "role_id"}
                    }
                ]
            },
            {
                "type": "roles",
                "properties": [{"name": "name", "type": "string"}]
            }
        ]
    }"#;

    fn run(dir: &TempDir, args: &[&str]) -> Result<Json, CliError> {
        let schema = dir.path().join("schema.json");
        let database = dir.path().join("app.db");
        let mut argv = vec![
            "ormapi".to_string(),
            "--schema".to_string(),
            schema.display().to_string(),
            "--database".to_string(),
            database.display().to_string(),
        ];
        argv.extend(args.iter().map(|s| s.to_string()));
        let (config, command) = Args::parse_from(argv).into_config();
        execute(&config, command)
    }

    #[test]
    fn test_end_to_end() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("schema.json"), SCHEMA).unwrap();

        run(&dir, &["init"]).unwrap();
        run(&dir, &["post", "roles", "--data", r#"{"attributes": {"name": "admin"}}"#]).unwrap();
        let user = run(
            &dir,
            &[
                "post",
                "users",
                "--data",
                r#"{"attributes": {"login": "ann"}, "relationships": {"roles": {"data": [{"type": "roles", "id": "1"}]}}}"#,
            ],
        )
        .unwrap();
        assert_eq!(user["relationships"]["roles"][0]["attributes"]["name"], "admin");

        let page = run(&dir, &["get-all", "users", "--query", r#"{"include": ["roles"]}"#]).unwrap();
        assert_eq!(page["totalItems"], 1);

        let linkage = run(&dir, &["relationship", "get", "users", "1", "roles"]).unwrap();
        assert_eq!(linkage, serde_json::json!({"data": [{"type": "roles", "id": "1"}]}));

        let err = run(&dir, &["get-one", "users", "42"]).unwrap_err();
        assert_eq!(err.report()["error"], "not_found");
    }

    #[test]
    fn test_explain_without_database() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("schema.json"), SCHEMA).unwrap();
        let explain = run(&dir, &["explain", "users", "--dialect", "postgres"]).unwrap();
        assert_eq!(explain["dialect"], "postgres");
        assert!(!dir.path().join("app.db").exists());
    }
}
