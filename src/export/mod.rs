//! Export pipeline: grouping, row collection, artifact writing, and the
//! resumable batch engine.

pub mod artifacts;
pub mod engine;
pub mod grouping;
pub mod progress;
pub mod rows;

use serde_json::Value;

use crate::config::Config;
use crate::error::AppError;
use crate::notion::client::NotionClient;
use crate::notion::query::{self, resolve_sorts};
use crate::notion::schema::DatabaseSchema;
use crate::notion::GroupProperty;
use grouping::GroupIndex;

/// Everything the exporter needs to know about the database, resolved once
/// per run: the grouping property, the helper properties, the sort order,
/// and the group index built from a full unfiltered scan.
#[derive(Debug, Clone)]
pub struct GroupContext {
    pub group_property: GroupProperty,
    pub title_prop: Option<String>,
    pub section_prop: Option<String>,
    pub order_prop: Option<String>,
    pub sorts: Vec<Value>,
    pub index: GroupIndex,
}

/// Retrieves the schema, scans the database, and builds the group index.
pub async fn load_group_context(
    client: &NotionClient,
    config: &Config,
) -> Result<GroupContext, AppError> {
    let schema = DatabaseSchema::retrieve(client, &config.notion_database_id).await?;
    let group_property = schema.group_property(&config.notion_property_name)?;

    let title_prop = schema.title_property();
    let section_prop = schema.section_property();
    let order_prop = schema.order_property();
    let sorts = resolve_sorts(order_prop.as_deref(), title_prop.as_deref());

    let pages = query::query_database(client, &config.notion_database_id, None, &[], None).await?;
    let index = GroupIndex::build(&pages, &group_property);

    if index.entries.is_empty() {
        return Err(AppError::NoGroups);
    }

    Ok(GroupContext {
        group_property,
        title_prop,
        section_prop,
        order_prop,
        sorts,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::checkpoint::{DualStore, LocalCheckpointStore};
    use crate::config::Cli;
    use crate::export::artifacts::{read_group_csv, ExportLayout};
    use crate::export::engine::{ExportEngine, NotionRowSource, RunBudget, RunOutcome};
    use crate::export::progress::Progress;
    use crate::notion::NotionClient;
    use secrecy::SecretString;

    fn test_config(server_uri: &str, export_dir: &std::path::Path) -> Config {
        Config::from_cli(
            Cli::try_parse_from([
                "kurzus-export",
                "--notion-api-key",
                "secret_test",
                "--notion-database-id",
                "db-1",
                "--notion-base-url",
                server_uri,
                "--export-dir",
                &export_dir.display().to_string(),
            ])
            .unwrap(),
        )
    }

    fn schema_json() -> Value {
        json!({
            "object": "database",
            "id": "db-1",
            "properties": {
                "Név": { "type": "title", "title": {} },
                "Kurzus": {
                    "type": "multi_select",
                    "multi_select": {
                        "options": [
                            { "id": "opt-a", "name": "A" },
                            { "id": "opt-b", "name": "B" }
                        ]
                    }
                },
                "Szakasz": {
                    "type": "select",
                    "select": { "options": [ { "id": "s-1", "name": "Bevezető" } ] }
                },
                "Sorszám": { "type": "number", "number": {} }
            }
        })
    }

    fn page_json(id: &str, title: &str, course: (&str, &str), sorszam: u32) -> Value {
        json!({
            "object": "page",
            "id": id,
            "properties": {
                "Név": { "type": "title", "title": [ { "plain_text": title } ] },
                "Kurzus": {
                    "type": "multi_select",
                    "multi_select": [ { "id": course.0, "name": course.1 } ]
                },
                "Szakasz": { "type": "select", "select": { "id": "s-1", "name": "Bevezető" } },
                "Sorszám": { "type": "number", "number": sorszam }
            }
        })
    }

    fn blocks_json(text: &str) -> Value {
        json!({
            "results": [
                {
                    "id": "h2",
                    "type": "heading_2",
                    "has_children": false,
                    "heading_2": { "rich_text": [ { "plain_text": "Videó szöveg" } ] }
                },
                {
                    "id": "p",
                    "type": "paragraph",
                    "has_children": false,
                    "paragraph": { "rich_text": [ { "plain_text": text } ] }
                }
            ],
            "has_more": false,
            "next_cursor": null
        })
    }

    fn query_response(pages: Vec<Value>) -> Value {
        json!({ "results": pages, "has_more": false, "next_cursor": null })
    }

    async fn mount_notion(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/databases/db-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(schema_json()))
            .mount(server)
            .await;

        let a_pages = vec![
            page_json("pa1", "A lecke 1", ("opt-a", "A"), 1),
            page_json("pa2", "A lecke 2", ("opt-a", "A"), 2),
            page_json("pa3", "A lecke 3", ("opt-a", "A"), 3),
        ];
        let b_pages = vec![
            page_json("pb1", "B lecke 1", ("opt-b", "B"), 1),
            page_json("pb2", "B lecke 2", ("opt-b", "B"), 2),
        ];

        // Filtered queries first: mocks match in mount order.
        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(body_partial_json(json!({
                "filter": { "and": [ { "property": "Kurzus", "multi_select": { "contains": "A" } } ] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(query_response(a_pages.clone())))
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(body_partial_json(json!({
                "filter": { "and": [ { "property": "Kurzus", "multi_select": { "contains": "B" } } ] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(query_response(b_pages.clone())))
            .mount(server)
            .await;

        // Unfiltered scan for the group index.
        let mut all_pages = a_pages;
        all_pages.extend(b_pages);
        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(query_response(all_pages)))
            .mount(server)
            .await;

        for page_id in ["pa1", "pa2", "pa3", "pb1", "pb2"] {
            Mock::given(method("GET"))
                .and(path(format!("/v1/blocks/{}/children", page_id)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(blocks_json(&format!("Tartalom: {}", page_id))),
                )
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn end_to_end_export_against_notion_wire_format() {
        let server = MockServer::start().await;
        mount_notion(&server).await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri(), dir.path());
        let client =
            NotionClient::new(&config.notion_base_url, SecretString::from("secret_test".to_string()))
                .unwrap();

        let ctx = load_group_context(&client, &config).await.unwrap();
        assert_eq!(ctx.index.labels(), vec!["A (3)", "B (2)"]);
        assert_eq!(ctx.title_prop.as_deref(), Some("Név"));
        assert_eq!(ctx.section_prop.as_deref(), Some("Szakasz"));
        assert_eq!(ctx.order_prop.as_deref(), Some("Sorszám"));

        let layout = ExportLayout::new(dir.path()).unwrap();
        let store = DualStore::new(
            LocalCheckpointStore::new(dir.path().join("checkpoint.json")),
            None,
        );
        let source = NotionRowSource::new(client, config.notion_database_id.clone(), ctx.clone());

        let engine = ExportEngine {
            source: &source,
            store: &store,
            mirror: None,
            layout: &layout,
            budget: RunBudget::unlimited(),
            progress: Progress::new(),
        };

        let report = engine
            .run(&ctx.index, &config.notion_database_id, &config.notion_property_name)
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.processed, vec!["A (3)", "B (2)"]);

        // Three rows for A, ordered by Sorszám, carrying the extracted
        // video-script section.
        let a_rows = read_group_csv(&layout, "A (3)").unwrap();
        assert_eq!(a_rows.len(), 3);
        assert_eq!(a_rows[0].oldal_cime, "A lecke 1");
        assert_eq!(a_rows[0].szakasz, "Bevezető");
        assert!(a_rows[0].tartalom.starts_with("## Videó szöveg"));
        assert!(a_rows[0].tartalom.contains("Tartalom: pa1"));

        let b_rows = read_group_csv(&layout, "B (2)").unwrap();
        assert_eq!(b_rows.len(), 2);

        // Flat CSV: five records under the header (content fields are
        // multiline, so raw line counts would mislead).
        let mut reader = csv::Reader::from_path(layout.flat_csv_path()).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 5);
        assert_eq!(&records[0][0], "A (3)");
        assert_eq!(&records[3][0], "B (2)");

        assert!(layout.workbook_path().exists());
    }

    #[tokio::test]
    async fn missing_group_property_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/databases/db-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "database",
                "properties": { "Név": { "type": "title", "title": {} } }
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri(), dir.path());
        let client =
            NotionClient::new(&config.notion_base_url, SecretString::from("secret_test".to_string()))
                .unwrap();

        let err = load_group_context(&client, &config).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
