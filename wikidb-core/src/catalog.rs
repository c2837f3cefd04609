//! Query catalog - named SQL templates loaded once at startup
//!
//! Templates come from a properties file (if configured) or from the
//! bundled `resources/db-queries.properties`. All six keys must be present;
//! a missing key fails the load, so lookups after construction cannot fail.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::error::{Result, WikiError};

/// Bundled default statements (MySQL dialect)
pub const BUNDLED_QUERIES: &str = include_str!("../resources/db-queries.properties");

/// The fixed set of statements the database service knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryName {
    CreateTable,
    ListPages,
    GetPage,
    CreatePage,
    SavePage,
    DeletePage,
}

impl QueryName {
    /// Every query, in catalog declaration order
    pub const ALL: [QueryName; 6] = [
        QueryName::CreateTable,
        QueryName::ListPages,
        QueryName::GetPage,
        QueryName::CreatePage,
        QueryName::SavePage,
        QueryName::DeletePage,
    ];

    /// Properties key for this query
    pub fn key(self) -> &'static str {
        match self {
            QueryName::CreateTable => "create-pages-table",
            QueryName::ListPages => "all-pages",
            QueryName::GetPage => "get-page",
            QueryName::CreatePage => "create-page",
            QueryName::SavePage => "save-page",
            QueryName::DeletePage => "delete-page",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for QueryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Where the catalog text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// External properties file
    File(PathBuf),
    /// `db-queries.properties` compiled into the crate
    Bundled,
}

impl CatalogSource {
    /// Use the file when one is configured, otherwise the bundled default
    pub fn from_option(path: Option<PathBuf>) -> Self {
        path.map(CatalogSource::File).unwrap_or(CatalogSource::Bundled)
    }
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogSource::File(path) => write!(f, "{}", path.display()),
            CatalogSource::Bundled => f.write_str("<bundled db-queries.properties>"),
        }
    }
}

/// Immutable mapping from query name to SQL template
#[derive(Debug, Clone)]
pub struct QueryCatalog {
    templates: Vec<String>,
}

impl QueryCatalog {
    /// Load and validate the catalog from `source`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, the text is malformed, or any of
    /// the six keys is missing or empty.
    pub fn load(source: &CatalogSource) -> Result<Self> {
        let catalog = match source {
            CatalogSource::File(path) => {
                let text = fs::read_to_string(path).map_err(|e| WikiError::io(path, e))?;
                Self::from_properties(&text)?
            }
            CatalogSource::Bundled => Self::bundled()?,
        };
        tracing::debug!(source = %source, "Query catalog loaded");
        Ok(catalog)
    }

    /// Catalog built from the bundled default statements
    pub fn bundled() -> Result<Self> {
        Self::from_properties(BUNDLED_QUERIES)
    }

    /// Parse properties text and pick out the six required templates.
    /// Unknown keys are ignored; a later duplicate overrides an earlier one.
    pub fn from_properties(text: &str) -> Result<Self> {
        let mut props: HashMap<String, String> = parse_properties(text)?.into_iter().collect();

        let mut templates = Vec::with_capacity(QueryName::ALL.len());
        for name in QueryName::ALL {
            match props.remove(name.key()) {
                Some(sql) if !sql.trim().is_empty() => templates.push(sql),
                _ => return Err(WikiError::MissingQuery { key: name.key() }),
            }
        }

        Ok(Self { templates })
    }

    /// SQL template for `name`
    pub fn get(&self, name: QueryName) -> &str {
        &self.templates[name.index()]
    }

    /// Entries in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (QueryName, &str)> {
        QueryName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{c}')
}

fn ends_with_odd_backslashes(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

/// Parse Java-style properties text into ordered key/value pairs.
pub fn parse_properties(text: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    let mut lines = text.lines().enumerate();

    while let Some((idx, raw)) = lines.next() {
        let first = raw.trim_start_matches(is_blank);
        if first.is_empty() || first.starts_with('#') || first.starts_with('!') {
            continue;
        }

        let mut logical = String::new();
        let mut current = first;
        loop {
            if !ends_with_odd_backslashes(current) {
                logical.push_str(current);
                break;
            }
            logical.push_str(&current[..current.len() - 1]);
            match lines.next() {
                Some((_, next)) => current = next.trim_start_matches(is_blank),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        let line = idx + 1;
        entries.push((unescape(key, line)?, unescape(value, line)?));
    }

    Ok(entries)
}

/// Split a logical line at the first unescaped `=`, `:` or blank.
fn split_entry(logical: &str) -> (&str, &str) {
    let mut key_end = logical.len();
    let mut explicit_sep = false;
    let mut escaped = false;

    for (i, c) in logical.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                explicit_sep = true;
                break;
            }
            c if is_blank(c) => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &logical[..key_end];
    let mut rest = &logical[key_end..];
    if explicit_sep {
        rest = rest[1..].trim_start_matches(is_blank);
    } else {
        rest = rest.trim_start_matches(is_blank);
        if let Some(stripped) = rest.strip_prefix(|c: char| c == '=' || c == ':') {
            rest = stripped.trim_start_matches(is_blank);
        }
    }

    (key, rest)
}

fn unescape(raw: &str, line: usize) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        WikiError::catalog_parse(line, format!("malformed \\u escape '\\u{hex}'"))
                    })?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {}
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_catalog_text() -> String {
        QueryName::ALL
            .iter()
            .map(|name| format!("{}=SQL for {}\n", name.key(), name.key()))
            .collect()
    }

    #[test]
    fn bundled_catalog_has_every_query() {
        let catalog = QueryCatalog::bundled().unwrap();

        assert!(catalog
            .get(QueryName::CreateTable)
            .starts_with("create table if not exists Pages"));
        assert_eq!(catalog.get(QueryName::ListPages), "select title from Pages");
        assert_eq!(
            catalog.get(QueryName::GetPage),
            "select id, content from Pages where title = ?"
        );
        assert_eq!(catalog.iter().count(), 6);
    }

    #[test]
    fn continuation_lines_are_joined() {
        let catalog = QueryCatalog::bundled().unwrap();
        let create = catalog.get(QueryName::CreateTable);

        assert!(!create.contains('\\'));
        assert!(create.contains("( id integer auto_increment primary key, title"));
        assert!(create.ends_with("content text)"));
    }

    #[test]
    fn missing_key_fails_load() {
        let text = full_catalog_text().replace("save-page=", "#save-page=");
        let err = QueryCatalog::from_properties(&text).unwrap_err();

        assert!(matches!(err, WikiError::MissingQuery { key: "save-page" }));
    }

    #[test]
    fn empty_template_counts_as_missing() {
        let text = format!("{}delete-page=\n", full_catalog_text());
        let err = QueryCatalog::from_properties(&text).unwrap_err();

        assert!(matches!(err, WikiError::MissingQuery { key: "delete-page" }));
    }

    #[test]
    fn later_duplicates_override() {
        let text = format!("{}all-pages=select 1\n", full_catalog_text());
        let catalog = QueryCatalog::from_properties(&text).unwrap();

        assert_eq!(catalog.get(QueryName::ListPages), "select 1");
    }

    #[test]
    fn separators_and_comments() {
        let entries = parse_properties(
            "# comment\n! also comment\n\n  a = 1\nb:2\nc 3\nd\\=x = 4\ne\n",
        )
        .unwrap();

        assert_eq!(
            entries,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
                ("d=x".to_string(), "4".to_string()),
                ("e".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn escapes_are_decoded() {
        let entries = parse_properties("k=tab\\there \\u00e9 \\\\ end\n").unwrap();
        assert_eq!(entries[0].1, "tab\there é \\ end");
    }

    #[test]
    fn even_backslashes_do_not_continue() {
        let entries = parse_properties("a=x\\\\\nb=y\n").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, "x\\");
    }

    #[test]
    fn malformed_unicode_escape_reports_line() {
        let err = parse_properties("a=1\nb=\\u12\n").unwrap_err();
        assert!(matches!(err, WikiError::CatalogParse { line: 2, .. }));
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.properties");
        std::fs::write(&path, full_catalog_text()).unwrap();

        let catalog = QueryCatalog::load(&CatalogSource::File(path)).unwrap();
        assert_eq!(catalog.get(QueryName::DeletePage), "SQL for delete-page");

        let missing = CatalogSource::File(dir.path().join("nope.properties"));
        assert!(matches!(
            QueryCatalog::load(&missing),
            Err(WikiError::Io { .. })
        ));
    }

    #[test]
    fn source_defaults_to_bundled() {
        assert_eq!(CatalogSource::from_option(None), CatalogSource::Bundled);
    }
}
