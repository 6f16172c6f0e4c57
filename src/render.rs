//! Output formatting: JSON, aligned tables and GitHub markdown tables.

use std::{env, fmt::Write as _, str::FromStr};

use serde::Serialize;
use serde_json::Value;

use crate::envelope::{LinkageResponse, LinkagesResponse, ListResponse, Resource, SingleResponse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    PrettyJson,
    Table,
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "pretty-json" => Ok(Self::PrettyJson),
            "table" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!(
                "unknown output format {other:?} (expected json, pretty, table or markdown)"
            )),
        }
    }
}

impl OutputFormat {
    /// The flag value if given, else `ASC_DEFAULT_OUTPUT`, else JSON.
    pub fn resolve(flag: Option<&str>) -> Result<Self, String> {
        if let Some(flag) = flag.filter(|f| !f.trim().is_empty()) {
            return flag.parse();
        }
        match env::var("ASC_DEFAULT_OUTPUT") {
            Ok(value) if !value.trim().is_empty() => value.parse(),
            _ => Ok(Self::Json),
        }
    }
}

/// Headers plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn with_row<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.row(cells);
        self
    }
}

/// Row builder for a printable response type.
pub trait TableRows {
    fn table(&self) -> Table;
}

/// Formats `value` for the terminal.
pub fn render<T>(value: &T, format: OutputFormat) -> serde_json::Result<String>
where
    T: Serialize + TableRows + ?Sized,
{
    Ok(match format {
        OutputFormat::Json => serde_json::to_string(value)?,
        OutputFormat::PrettyJson => serde_json::to_string_pretty(value)?,
        OutputFormat::Table => render_table(&value.table()),
        OutputFormat::Markdown => render_markdown(&value.table()),
    })
}

/// Removes escape sequences and control characters other than `\t`.
pub fn sanitize_terminal(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            match chars.peek() {
                // CSI: parameters then a final byte in 0x40..=0x7e
                Some('[') => {
                    chars.next();
                    for n in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&n) {
                            break;
                        }
                    }
                }
                // OSC: terminated by BEL or ESC \
                Some(']') => {
                    chars.next();
                    while let Some(n) = chars.next() {
                        if n == '\u{7}' {
                            break;
                        }
                        if n == '\u{1b}' {
                            if chars.peek() == Some(&'\\') {
                                chars.next();
                            }
                            break;
                        }
                    }
                }
                Some(_) => {
                    chars.next();
                }
                None => {}
            }
            continue;
        }
        if c == '\t' || !c.is_control() {
            out.push(c);
        }
    }
    out
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn compact_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn escape_markdown(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("<br>"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

fn clean_cell(cell: &str) -> String {
    compact_whitespace(&sanitize_terminal(&cell.replace(['\n', '\r'], " ")))
}

/// Tab-aligned columns: each cell is padded to its column's widest cell plus
/// two spaces, the same layout a tab writer with space padding produces.
pub fn render_table(table: &Table) -> String {
    let headers: Vec<String> = table.headers.iter().map(|h| clean_cell(h)).collect();
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|r| r.iter().map(|c| clean_cell(c)).collect())
        .collect();

    let columns = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for line in std::iter::once(&headers).chain(rows.iter()) {
        for (i, cell) in line.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for line in std::iter::once(&headers).chain(rows.iter()) {
        let mut text = String::new();
        for (i, cell) in line.iter().enumerate() {
            if i + 1 < line.len() {
                let pad = widths[i] - cell.chars().count();
                let _ = write!(text, "{cell}{}  ", " ".repeat(pad));
            } else {
                text.push_str(cell);
            }
        }
        out.push_str(text.trim_end());
        out.push('\n');
    }
    out
}

/// GitHub-flavoured markdown table.
pub fn render_markdown(table: &Table) -> String {
    let cell = |c: &String| escape_markdown(&clean_cell(c));
    let mut out = String::new();
    let headers: Vec<String> = table.headers.iter().map(cell).collect();
    let _ = writeln!(out, "| {} |", headers.join(" | "));
    let _ = writeln!(
        out,
        "| {} |",
        vec!["---"; table.headers.len()].join(" | ")
    );
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(cell).collect();
        let _ = writeln!(out, "| {} |", cells.join(" | "));
    }
    out
}

/// Short text for a JSON scalar; arrays are comma-joined.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| value_text(Some(v)))
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

pub fn opt_text<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn attribute_summary(attributes: Option<&Value>) -> String {
    let Some(Value::Object(map)) = attributes else {
        return String::new();
    };
    ["name", "title", "canonicalName", "state", "status"]
        .iter()
        .find_map(|key| map.get(*key).map(|v| value_text(Some(v))))
        .unwrap_or_default()
}

fn generic_row(resource: &Resource<Value>) -> Vec<String> {
    vec![
        resource.id.clone(),
        resource.kind.clone(),
        attribute_summary(resource.attributes.as_ref()),
    ]
}

impl TableRows for ListResponse<Value> {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Type", "Summary"]);
        for resource in &self.data {
            table.row(generic_row(resource));
        }
        table
    }
}

impl TableRows for SingleResponse<Value> {
    fn table(&self) -> Table {
        Table::new(["ID", "Type", "Summary"]).with_row(generic_row(&self.data))
    }
}

impl TableRows for LinkagesResponse {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Type"]);
        for linkage in &self.data {
            table.row([linkage.id.as_str(), linkage.kind.as_str()]);
        }
        table
    }
}

impl TableRows for LinkageResponse {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Type"]);
        if let Some(linkage) = &self.data {
            table.row([linkage.id.as_str(), linkage.kind.as_str()]);
        }
        table
    }
}

/// Outcome of a delete command.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub id: String,
    pub deleted: bool,
}

impl TableRows for DeleteResult {
    fn table(&self) -> Table {
        Table::new(["ID", "Deleted"]).with_row([self.id.clone(), self.deleted.to_string()])
    }
}

/// Output of the `token` command.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TokenResult {
    pub token: String,
}

impl TableRows for TokenResult {
    fn table(&self) -> Table {
        Table::new(["Token"]).with_row([self.token.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_escape_sequences_and_controls() {
        let hostile = "ok\u{1b}[31mred\u{1b}[0m\u{1b}]0;title\u{7}\u{0}\u{8}\tend\u{9b}";
        let clean = sanitize_terminal(hostile);
        assert_eq!(clean, "okred\tend");
    }

    #[test]
    fn sanitized_cells_have_no_control_bytes() {
        let inputs = [
            "\u{1b}[2J\u{1b}[H wipe",
            "bell\u{7}\u{7}",
            "line1\nline2\r\n",
            "\u{1b}]8;;https://evil\u{1b}\\link\u{1b}]8;;\u{1b}\\",
            "\u{1b}",
            "\u{7f}del",
        ];
        for input in inputs {
            let table = Table::new(["Value"]).with_row([input]);
            for rendered in [render_table(&table), render_markdown(&table)] {
                let body = rendered.trim_end_matches('\n');
                assert!(
                    !body.chars().any(|c| c.is_control() && c != '\n'),
                    "{input:?} -> {rendered:?}"
                );
                assert!(!body.contains('\u{1b}'));
            }
        }
    }

    #[test]
    fn compacts_whitespace() {
        assert_eq!(compact_whitespace("  a \t b\n\nc  "), "a b c");
    }

    #[test]
    fn table_alignment() {
        let table = Table::new(["ID", "Name"])
            .with_row(["1", "Alpha"])
            .with_row(["12345", "B"]);
        assert_eq!(render_table(&table), "ID     Name\n1      Alpha\n12345  B\n");
    }

    #[test]
    fn markdown_escapes() {
        let table = Table::new(["A"]).with_row(["x|y\\z"]);
        assert_eq!(render_markdown(&table), "| A |\n| --- |\n| x\\|y\\\\z |\n");
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("TABLE".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("yaml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::resolve(Some("pretty")).unwrap(), OutputFormat::PrettyJson);
    }

    #[test]
    fn generic_list_rows() {
        let list: ListResponse<Value> = serde_json::from_value(serde_json::json!({
            "data": [{"type": "ciProducts", "id": "p1", "attributes": {"name": "Demo"}}]
        }))
        .unwrap();
        assert_eq!(render(&list, OutputFormat::Table).unwrap(), "ID  Type        Summary\np1  ciProducts  Demo\n");
    }
}
