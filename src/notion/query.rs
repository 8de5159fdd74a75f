//! Paginated database queries with filter and sort payloads.
//!
//! The query endpoint pages through results with `start_cursor`/`has_more`;
//! all pages are accumulated before returning. A progress callback reports
//! the running page count after each batch.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::notion::client::NotionClient;
use crate::notion::schema::GroupPropertyKind;

/// One page (row) of a Notion database.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: String,
    pub properties: Map<String, Value>,
}

/// Internal struct that mirrors the query response JSON exactly.
#[derive(Debug, Deserialize)]
struct WireQueryResponse {
    results: Vec<Value>,
    has_more: bool,
    next_cursor: Option<String>,
}

impl Page {
    fn from_value(value: Value) -> Option<Self> {
        let id = value.get("id")?.as_str()?.to_string();
        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Some(Self { id, properties })
    }
}

/// Queries a database, following pagination until exhausted.
///
/// # Arguments
///
/// * `filter` - Optional Notion filter object.
/// * `sorts` - Sort descriptors, may be empty.
/// * `on_batch` - Invoked after each fetched batch with `(batch_no, total)`.
pub async fn query_database(
    client: &NotionClient,
    database_id: &str,
    filter: Option<Value>,
    sorts: &[Value],
    mut on_batch: Option<&mut (dyn FnMut(u32, usize) + Send)>,
) -> Result<Vec<Page>, AppError> {
    let path = format!("/v1/databases/{}/query", database_id);

    let mut pages: Vec<Page> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut batch: u32 = 0;

    loop {
        let mut payload = Map::new();
        if let Some(filter) = &filter {
            payload.insert("filter".into(), filter.clone());
        }
        if !sorts.is_empty() {
            payload.insert("sorts".into(), Value::Array(sorts.to_vec()));
        }
        if let Some(cursor) = &cursor {
            payload.insert("start_cursor".into(), Value::String(cursor.clone()));
        }

        let response = client.post(&path, &Value::Object(payload)).await?;
        let wire: WireQueryResponse = serde_json::from_value(response)
            .map_err(|e| AppError::Internal(format!("Failed to parse query response: {}", e)))?;

        pages.extend(wire.results.into_iter().filter_map(Page::from_value));
        batch += 1;
        if let Some(on_batch) = on_batch.as_deref_mut() {
            on_batch(batch, pages.len());
        }

        if wire.has_more {
            cursor = wire.next_cursor;
            if cursor.is_none() {
                break;
            }
        } else {
            break;
        }
    }

    Ok(pages)
}

/// Builds the filter selecting pages whose grouping property equals (or for
/// multi_select, contains) the given option name. Wrapped in an `and` so
/// additional conditions compose naturally.
pub fn build_group_filter(prop_name: &str, kind: GroupPropertyKind, name: &str) -> Value {
    let condition = match kind {
        GroupPropertyKind::Select => json!({ "property": prop_name, "select": { "equals": name } }),
        GroupPropertyKind::MultiSelect => {
            json!({ "property": prop_name, "multi_select": { "contains": name } })
        }
        GroupPropertyKind::Status => json!({ "property": prop_name, "status": { "equals": name } }),
    };
    json!({ "and": [condition] })
}

/// Sort descriptors: by the order property when present, else by title.
pub fn resolve_sorts(order_prop: Option<&str>, title_prop: Option<&str>) -> Vec<Value> {
    if let Some(order) = order_prop {
        vec![json!({ "property": order, "direction": "ascending" })]
    } else if let Some(title) = title_prop {
        vec![json!({ "property": title, "direction": "ascending" })]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> NotionClient {
        NotionClient::new(base_url, SecretString::from("secret_test".to_string())).unwrap()
    }

    fn mock_page(id: &str, title: &str) -> Value {
        json!({
            "object": "page",
            "id": id,
            "properties": {
                "Név": { "type": "title", "title": [ { "plain_text": title } ] }
            }
        })
    }

    #[tokio::test]
    async fn single_page_query() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [ mock_page("p1", "Egy"), mock_page("p2", "Kettő") ],
                "has_more": false,
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let pages = query_database(&client, "db-1", None, &[], None)
            .await
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].id, "p1");
    }

    #[tokio::test]
    async fn pagination_follows_cursor() {
        let server = MockServer::start().await;

        // First page: no start_cursor in the body.
        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(body_partial_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [ mock_page("p1", "Egy") ],
                "has_more": true,
                "next_cursor": "cursor-2"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        // Second page: requested with the cursor.
        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(body_partial_json(json!({ "start_cursor": "cursor-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [ mock_page("p2", "Kettő") ],
                "has_more": false,
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());

        let mut batches: Vec<(u32, usize)> = Vec::new();
        let mut on_batch = |batch: u32, total: usize| batches.push((batch, total));
        let pages = query_database(&client, "db-1", None, &[], Some(&mut on_batch))
            .await
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(batches, vec![(1, 1), (2, 2)]);
    }

    #[tokio::test]
    async fn filter_and_sorts_are_sent() {
        let server = MockServer::start().await;

        let filter = build_group_filter("Kurzus", GroupPropertyKind::MultiSelect, "A");
        let sorts = resolve_sorts(Some("Sorszám"), None);

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(body_partial_json(json!({
                "filter": { "and": [ { "property": "Kurzus", "multi_select": { "contains": "A" } } ] },
                "sorts": [ { "property": "Sorszám", "direction": "ascending" } ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [],
                "has_more": false,
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let pages = query_database(&client, "db-1", Some(filter), &sorts, None)
            .await
            .unwrap();

        assert!(pages.is_empty());
    }

    #[test]
    fn filter_shapes_per_kind() {
        let select = build_group_filter("P", GroupPropertyKind::Select, "X");
        assert_eq!(select["and"][0]["select"]["equals"], "X");

        let multi = build_group_filter("P", GroupPropertyKind::MultiSelect, "X");
        assert_eq!(multi["and"][0]["multi_select"]["contains"], "X");

        let status = build_group_filter("P", GroupPropertyKind::Status, "X");
        assert_eq!(status["and"][0]["status"]["equals"], "X");
    }

    #[test]
    fn sorts_prefer_order_property() {
        let sorts = resolve_sorts(Some("Sorszám"), Some("Név"));
        assert_eq!(sorts.len(), 1);
        assert_eq!(sorts[0]["property"], "Sorszám");

        let sorts = resolve_sorts(None, Some("Név"));
        assert_eq!(sorts[0]["property"], "Név");

        assert!(resolve_sorts(None, None).is_empty());
    }
}
