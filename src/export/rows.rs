//! Row collection for one group.
//!
//! Each page in a group becomes one `CourseRow`: title, section, order
//! number, and the markdown content cut from the page's video/lesson section.
//! Rows are ordered by numeric `sorszam` (comma decimals tolerated, missing
//! values last), then by title, case-insensitive.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::export::GroupContext;
use crate::notion::blocks::{blocks_to_md, fetch_blocks_recursive, select_video_or_lesson};
use crate::notion::client::NotionClient;
use crate::notion::properties::{extract_property_as_string, extract_title};
use crate::notion::query::{build_group_filter, query_database};

/// CSV column order for group exports.
pub const CSV_FIELDNAMES: [&str; 4] = ["oldal_cime", "szakasz", "sorszam", "tartalom"];

/// One exported row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRow {
    pub oldal_cime: String,
    pub szakasz: String,
    pub sorszam: String,
    pub tartalom: String,
}

/// Numeric sort key for `sorszam`. Accepts comma decimals; anything
/// unparsable sorts last.
fn order_key(sorszam: &str) -> f64 {
    sorszam
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .unwrap_or(f64::INFINITY)
}

/// Sorts rows in place: numeric order first, then title.
pub fn sort_rows(rows: &mut [CourseRow], has_order_prop: bool) {
    rows.sort_by(|a, b| {
        let by_title = a
            .oldal_cime
            .to_lowercase()
            .cmp(&b.oldal_cime.to_lowercase());
        if has_order_prop {
            order_key(&a.sorszam)
                .partial_cmp(&order_key(&b.sorszam))
                .unwrap_or(Ordering::Equal)
                .then(by_title)
        } else {
            by_title
        }
    });
}

/// Collects the rows of one group, filtered by a canonical option name.
///
/// `on_progress` receives human-readable status lines as batches arrive.
pub async fn collect_rows_for_group(
    client: &NotionClient,
    database_id: &str,
    ctx: &GroupContext,
    canonical_name: &str,
    on_progress: &(dyn Fn(String) + Send + Sync),
) -> Result<Vec<CourseRow>, AppError> {
    let filter = build_group_filter(
        &ctx.group_property.name,
        ctx.group_property.kind,
        canonical_name,
    );

    let mut on_batch = |batch_no: u32, total: usize| {
        on_progress(format!(
            "„{}” – {} oldal beolvasva (batch {}).",
            canonical_name, total, batch_no
        ));
    };
    let pages = query_database(
        client,
        database_id,
        Some(filter),
        &ctx.sorts,
        Some(&mut on_batch),
    )
    .await?;

    let mut rows = Vec::with_capacity(pages.len());
    for page in &pages {
        let oldal_cime = match &ctx.title_prop {
            Some(title_prop) => extract_title(page, title_prop),
            None => String::new(),
        };
        let szakasz = extract_property_as_string(page, ctx.section_prop.as_deref());
        let sorszam = extract_property_as_string(page, ctx.order_prop.as_deref());

        let blocks = fetch_blocks_recursive(client, page.id.clone()).await?;
        let md = blocks_to_md(&blocks);
        let tartalom = select_video_or_lesson(&md);

        rows.push(CourseRow {
            oldal_cime,
            szakasz,
            sorszam,
            tartalom,
        });
    }

    sort_rows(&mut rows, ctx.order_prop.is_some());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(title: &str, sorszam: &str) -> CourseRow {
        CourseRow {
            oldal_cime: title.into(),
            szakasz: String::new(),
            sorszam: sorszam.into(),
            tartalom: String::new(),
        }
    }

    #[test]
    fn sorts_numerically_by_sorszam() {
        let mut rows = vec![row("c", "10"), row("a", "2"), row("b", "1")];
        sort_rows(&mut rows, true);
        let titles: Vec<_> = rows.iter().map(|r| r.oldal_cime.as_str()).collect();
        assert_eq!(titles, vec!["b", "a", "c"]);
    }

    #[test]
    fn comma_decimals_are_parsed() {
        let mut rows = vec![row("second", "1,5"), row("first", "1,2")];
        sort_rows(&mut rows, true);
        assert_eq!(rows[0].oldal_cime, "first");
    }

    #[test]
    fn missing_sorszam_sorts_last() {
        let mut rows = vec![row("no number", ""), row("numbered", "3")];
        sort_rows(&mut rows, true);
        assert_eq!(rows[0].oldal_cime, "numbered");
        assert_eq!(rows[1].oldal_cime, "no number");
    }

    #[test]
    fn ties_break_by_title_case_insensitive() {
        let mut rows = vec![row("Zebra", "1"), row("alma", "1")];
        sort_rows(&mut rows, true);
        assert_eq!(rows[0].oldal_cime, "alma");
    }

    #[test]
    fn without_order_prop_sorts_by_title_only() {
        let mut rows = vec![row("b", "1"), row("a", "99")];
        sort_rows(&mut rows, false);
        assert_eq!(rows[0].oldal_cime, "a");
    }

    #[test]
    fn row_roundtrips_through_csv() {
        let rows = vec![
            CourseRow {
                oldal_cime: "Cím, vesszővel".into(),
                szakasz: "Szakasz".into(),
                sorszam: "1".into(),
                tartalom: "többsoros\ntartalom".into(),
            },
        ];

        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &rows {
            writer.serialize(row).unwrap();
        }
        let bytes = writer.into_inner().unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let header = reader.headers().unwrap().clone();
        assert_eq!(
            header.iter().collect::<Vec<_>>(),
            CSV_FIELDNAMES.to_vec()
        );
        let parsed: Vec<CourseRow> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(parsed, rows);
    }
}
