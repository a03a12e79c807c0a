//! Schema scaffolding for the queue table
//!
//! Everything here is plain string formatting driven by the table name, so
//! the same input always produces the same text.

/// `"OutgoingMail"` → `"outgoing_mail"`. Only the last `::` segment is used.
#[must_use]
pub fn underscore(name: &str) -> String {
    let name = name.rsplit("::").next().unwrap_or(name);
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;

    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if previous.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        previous = Some(c);
    }

    out
}

#[must_use]
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }

    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }

    match word.strip_suffix('s') {
        Some(stem) if !stem.ends_with('s') && !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

#[must_use]
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    if let Some(stem) = word.strip_suffix('y')
        && stem
            .chars()
            .last()
            .is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
    {
        return format!("{stem}ies");
    }

    if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
    {
        return format!("{word}es");
    }

    format!("{word}s")
}

/// Table name for a record type: `"Email"` → `"emails"`
#[must_use]
pub fn tableize(name: &str) -> String {
    pluralize(&singularize(&underscore(name)))
}

/// Type name for a table: `"emails"` → `"Email"`
#[must_use]
pub fn classify(name: &str) -> String {
    singularize(&underscore(name))
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str()
            })
        })
        .collect()
}

/// `CREATE TABLE` for the queue table
#[must_use]
pub fn create_table_statement(table: &str, if_not_exists: bool) -> String {
    let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };

    format!(
        "CREATE TABLE {guard}{table} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_address VARCHAR(255),
    to_address VARCHAR(255),
    last_send_attempt INTEGER NOT NULL DEFAULT 0,
    mail TEXT,
    created_on INTEGER
)"
    )
}

/// Migration creating (and dropping) the queue table for `table_name`
#[must_use]
pub fn create_migration(table_name: &str) -> String {
    let table = tableize(table_name);

    format!(
        "-- {class}Migration
-- up
{create};

-- down
DROP TABLE {table};
",
        class = classify(table_name),
        create = create_table_statement(&table, false),
    )
}

/// Record type matching the table created by [`create_migration`]
#[must_use]
pub fn create_model(table_name: &str) -> String {
    format!(
        "/// A queued email stored in the `{table}` table
#[derive(Debug, Clone)]
pub struct {class} {{
    pub id: i64,
    pub from_address: String,
    pub to_address: String,
    pub last_send_attempt: i64,
    pub mail: String,
    pub created_on: i64,
}}
",
        table = tableize(table_name),
        class = classify(table_name),
    )
}
