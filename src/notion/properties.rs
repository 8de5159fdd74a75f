//! Extraction of page property values as display strings.

use serde_json::Value;

use crate::notion::query::Page;

/// Extracts the page title through the named title property.
pub fn extract_title(page: &Page, title_prop: &str) -> String {
    let Some(prop) = page.properties.get(title_prop) else {
        return String::new();
    };
    if prop.get("type").and_then(Value::as_str) != Some("title") {
        return String::new();
    }
    plain_text_concat(prop.get("title"))
        .trim()
        .to_string()
}

/// Extracts any supported property value as a display string. Unknown
/// property types and missing properties render as the empty string.
pub fn extract_property_as_string(page: &Page, prop_name: Option<&str>) -> String {
    let Some(prop_name) = prop_name else {
        return String::new();
    };
    let Some(prop) = page.properties.get(prop_name) else {
        return String::new();
    };

    match prop.get("type").and_then(Value::as_str).unwrap_or("") {
        "number" => prop
            .get("number")
            .and_then(Value::as_f64)
            .map(format_number)
            .unwrap_or_default(),
        "select" => option_name(prop.get("select")),
        "multi_select" => joined_option_names(prop.get("multi_select")),
        "status" => option_name(prop.get("status")),
        "rich_text" => plain_text_concat(prop.get("rich_text")),
        "date" => format_date(prop.get("date")),
        "url" => prop
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        "email" => prop
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        "people" => people_names(prop.get("people")),
        "title" => plain_text_concat(prop.get("title")),
        _ => String::new(),
    }
}

/// Renders a number the way a spreadsheet cell would: integers without a
/// trailing `.0`, everything else as-is.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Concatenates the `plain_text` of a rich-text array.
fn plain_text_concat(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|t| t.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Name of a single select/status option, empty when unset.
fn option_name(value: Option<&Value>) -> String {
    value
        .and_then(|v| v.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Comma-joined names of a multi_select array.
fn joined_option_names(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|opts| {
            opts.iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .filter(|n| !n.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

/// A date range renders as `start..end`, a plain date as `start`.
fn format_date(value: Option<&Value>) -> String {
    let Some(date) = value.filter(|v| !v.is_null()) else {
        return String::new();
    };
    let start = date.get("start").and_then(Value::as_str).unwrap_or("");
    match date.get("end").and_then(Value::as_str) {
        Some(end) if !end.is_empty() => format!("{}..{}", start, end),
        _ => start.to_string(),
    }
}

/// Person display names, falling back to the person's email.
fn people_names(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|people| {
            people
                .iter()
                .filter_map(|person| {
                    person
                        .get("name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| {
                            person
                                .get("person")
                                .and_then(|p| p.get("email"))
                                .and_then(Value::as_str)
                                .map(str::to_string)
                        })
                })
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}
