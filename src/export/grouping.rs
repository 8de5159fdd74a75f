//! Group index construction.
//!
//! Pages are counted per option of the grouping property, option names are
//! rewritten through the display-rename table, and each display name keeps
//! the set of canonical Notion option names that can match its pages (the
//! current option name, every historical name seen on pages, and rename
//! aliases). Entries are ordered by member count, descending.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use crate::notion::query::Page;
use crate::notion::schema::{GroupProperty, GroupPropertyKind};

/// Display-name rewrites applied to option names before they reach the UI
/// and the sheet names. Left: name in Notion, right: displayed name.
pub const DISPLAY_RENAMES: &[(&str, &str)] = &[
    ("Üzleti Modellek", "Milyen vállalkozást indíts"),
    ("Marketing rendszerek", "Ügyfélszerző marketing rendszerek"),
];

/// One group of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    /// Name shown to the user and used for sheet titles.
    pub display_name: String,
    /// Number of member pages.
    pub count: usize,
    /// Notion option names that select this group's pages, in deterministic
    /// order. Queries try them until one returns rows.
    pub canonical: BTreeSet<String>,
}

impl GroupEntry {
    /// The `"Name (count)"` label shown in the group picker.
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name, self.count)
    }
}

/// All groups, ordered by count descending (ties by name).
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    pub entries: Vec<GroupEntry>,
}

fn display_rename(name: &str) -> &str {
    DISPLAY_RENAMES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

/// Option references (`id`, `name`) found on a page for the grouping
/// property. A multi_select page contributes one reference per option.
fn page_option_refs<'a>(page: &'a Page, property: &GroupProperty) -> Vec<(&'a str, &'a str)> {
    let Some(prop) = page.properties.get(&property.name) else {
        return Vec::new();
    };

    let mut refs = Vec::new();
    let mut push_ref = |value: &'a Value| {
        if let Some(id) = value.get("id").and_then(Value::as_str) {
            let name = value.get("name").and_then(Value::as_str).unwrap_or("");
            refs.push((id, name));
        }
    };

    match property.kind {
        GroupPropertyKind::Select | GroupPropertyKind::Status => {
            if let Some(value) = prop.get(property.kind.as_str()).filter(|v| !v.is_null()) {
                push_ref(value);
            }
        }
        GroupPropertyKind::MultiSelect => {
            if let Some(values) = prop.get("multi_select").and_then(Value::as_array) {
                for value in values {
                    push_ref(value);
                }
            }
        }
    }
    refs
}

impl GroupIndex {
    /// Builds the index from an unfiltered database scan.
    pub fn build(pages: &[Page], property: &GroupProperty) -> Self {
        let mut counts_by_id: BTreeMap<&str, usize> = BTreeMap::new();
        let mut seen_names_by_id: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for option in &property.options {
            counts_by_id.insert(option.id.as_str(), 0);
            seen_names_by_id.insert(option.id.as_str(), BTreeSet::new());
        }

        for page in pages {
            for (id, name) in page_option_refs(page, property) {
                if let Some(count) = counts_by_id.get_mut(id) {
                    *count += 1;
                    if !name.is_empty() {
                        seen_names_by_id
                            .get_mut(id)
                            .expect("seen set exists for every counted id")
                            .insert(name.to_string());
                    }
                }
            }
        }

        // Display name → set of option names that were renamed onto it.
        let mut reverse_alias: HashMap<&str, BTreeSet<String>> = HashMap::new();
        for (from, to) in DISPLAY_RENAMES {
            reverse_alias
                .entry(*to)
                .or_default()
                .insert((*from).to_string());
        }

        let mut entries: Vec<GroupEntry> = property
            .options
            .iter()
            .map(|option| {
                let display_name = display_rename(&option.name).to_string();

                let mut canonical = BTreeSet::new();
                canonical.insert(option.name.clone());
                if let Some(seen) = seen_names_by_id.get(option.id.as_str()) {
                    canonical.extend(seen.iter().cloned());
                }
                if let Some(aliases) = reverse_alias.get(display_name.as_str()) {
                    canonical.extend(aliases.iter().cloned());
                }
                canonical.insert(display_name.clone());

                GroupEntry {
                    display_name,
                    count: *counts_by_id.get(option.id.as_str()).unwrap_or(&0),
                    canonical,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });

        Self { entries }
    }

    /// Looks up an entry by display name.
    pub fn find(&self, display_name: &str) -> Option<&GroupEntry> {
        self.entries.iter().find(|e| e.display_name == display_name)
    }

    /// Looks up an entry by its `"Name (count)"` label.
    pub fn find_by_label(&self, label: &str) -> Option<&GroupEntry> {
        self.entries.iter().find(|e| e.label() == label)
    }

    /// Display names in index order.
    pub fn display_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.display_name.clone()).collect()
    }

    /// `"Name (count)"` labels in index order.
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(GroupEntry::label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::schema::SelectOption;
    use serde_json::json;

    fn property(options: &[(&str, &str)], kind: GroupPropertyKind) -> GroupProperty {
        GroupProperty {
            name: "Kurzus".into(),
            kind,
            options: options
                .iter()
                .map(|(id, name)| SelectOption {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                })
                .collect(),
        }
    }

    fn multi_select_page(options: &[(&str, &str)]) -> Page {
        let values: Vec<_> = options
            .iter()
            .map(|(id, name)| json!({ "id": id, "name": name }))
            .collect();
        Page {
            id: "p".into(),
            properties: json!({
                "Kurzus": { "type": "multi_select", "multi_select": values }
            })
            .as_object()
            .cloned()
            .unwrap(),
        }
    }

    fn select_page(id: &str, name: &str) -> Page {
        Page {
            id: "p".into(),
            properties: json!({
                "Kurzus": { "type": "select", "select": { "id": id, "name": name } }
            })
            .as_object()
            .cloned()
            .unwrap(),
        }
    }

    #[test]
    fn counts_pages_per_option() {
        let prop = property(&[("a", "Alpha"), ("b", "Béta")], GroupPropertyKind::Select);
        let pages = vec![
            select_page("a", "Alpha"),
            select_page("a", "Alpha"),
            select_page("b", "Béta"),
        ];

        let index = GroupIndex::build(&pages, &prop);
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.entries[0].display_name, "Alpha");
        assert_eq!(index.entries[0].count, 2);
        assert_eq!(index.entries[1].count, 1);
    }

    #[test]
    fn multi_select_counts_each_membership() {
        let prop = property(
            &[("a", "Alpha"), ("b", "Béta")],
            GroupPropertyKind::MultiSelect,
        );
        let pages = vec![
            multi_select_page(&[("a", "Alpha"), ("b", "Béta")]),
            multi_select_page(&[("a", "Alpha")]),
        ];

        let index = GroupIndex::build(&pages, &prop);
        let alpha = index.find("Alpha").unwrap();
        let beta = index.find("Béta").unwrap();
        assert_eq!(alpha.count, 2);
        assert_eq!(beta.count, 1);
    }

    #[test]
    fn labels_include_counts() {
        let prop = property(&[("a", "Alpha")], GroupPropertyKind::Select);
        let pages = vec![select_page("a", "Alpha")];
        let index = GroupIndex::build(&pages, &prop);
        assert_eq!(index.labels(), vec!["Alpha (1)"]);
    }

    #[test]
    fn ordering_is_count_desc_then_name() {
        let prop = property(
            &[("a", "Zebra"), ("b", "Alma"), ("c", "Citrom")],
            GroupPropertyKind::Select,
        );
        let pages = vec![select_page("b", "Alma"), select_page("a", "Zebra")];

        let index = GroupIndex::build(&pages, &prop);
        let names = index.display_names();
        // Alma and Zebra each have 1 (name order), Citrom 0.
        assert_eq!(names, vec!["Alma", "Zebra", "Citrom"]);
    }

    #[test]
    fn display_rename_applies_and_keeps_canonical() {
        let prop = property(&[("a", "Üzleti Modellek")], GroupPropertyKind::Select);
        let pages = vec![select_page("a", "Üzleti Modellek")];

        let index = GroupIndex::build(&pages, &prop);
        let entry = &index.entries[0];
        assert_eq!(entry.display_name, "Milyen vállalkozást indíts");
        assert!(entry.canonical.contains("Üzleti Modellek"));
        assert!(entry.canonical.contains("Milyen vállalkozást indíts"));
        assert_eq!(entry.label(), "Milyen vállalkozást indíts (1)");
    }

    #[test]
    fn historical_names_seen_on_pages_become_canonical() {
        // Option was renamed in Notion: schema says "Új név" but an old page
        // still carries "Régi név" under the same option id.
        let prop = property(&[("a", "Új név")], GroupPropertyKind::Select);
        let pages = vec![select_page("a", "Régi név"), select_page("a", "Új név")];

        let index = GroupIndex::build(&pages, &prop);
        let entry = &index.entries[0];
        assert_eq!(entry.count, 2);
        assert!(entry.canonical.contains("Régi név"));
        assert!(entry.canonical.contains("Új név"));
    }

    #[test]
    fn unknown_option_ids_are_ignored() {
        let prop = property(&[("a", "Alpha")], GroupPropertyKind::Select);
        let pages = vec![select_page("ghost", "Szellem")];

        let index = GroupIndex::build(&pages, &prop);
        assert_eq!(index.entries[0].count, 0);
    }
}
