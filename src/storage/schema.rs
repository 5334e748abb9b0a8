//! Table layouts and the JSON payloads stored in their columns.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::corpus::{Document, YEAR_FIELD};
use crate::error::{Error, Result};

/// Summary of every topic, written next to the database
pub const TOPIC_WORDS_FILE: &str = "topic_words.json";

/// One value per column, in schema order
pub type Row = Vec<Value>;

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    fn new(name: &str, ty: ColumnType) -> Self {
        Column {
            name: name.to_string(),
            ty,
        }
    }
}

const DOC_FIXED_COLUMNS: [&str; 5] = [
    "doc_id",
    "topic_distribution",
    "topic_similarity",
    "vector_similarity",
    "word_list",
];

/// Check that every metadata field can become a docs column.
///
/// # Errors
/// `Configuration` naming the first field that is not an identifier or that
/// matches a fixed column or an earlier field, ignoring case.
pub fn check_metadata_fields(fields: &[String]) -> Result<()> {
    let mut taken: Vec<&str> = DOC_FIXED_COLUMNS.to_vec();
    for field in fields {
        if !is_identifier(field) {
            return Err(Error::configuration(format!(
                "metadata field '{field}' is not a valid column name"
            )));
        }
        // column names are case-insensitive
        if taken.iter().any(|c| c.eq_ignore_ascii_case(field)) {
            return Err(Error::configuration(format!(
                "metadata field '{field}' collides with another column"
            )));
        }
        taken.push(field);
    }
    Ok(())
}

/// Layout of one live table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    /// the first column is the primary key
    pub columns: Vec<Column>,
    /// columns receiving an equality-lookup index
    pub indexed: Vec<String>,
}

impl TableSchema {
    pub fn topics(prefix: &str) -> Self {
        use ColumnType::*;
        TableSchema {
            name: format!("{prefix}_topics"),
            columns: vec![
                Column::new("topic_id", Integer),
                Column::new("word_distribution", Text),
                Column::new("topic_evolution", Text),
                Column::new("frequency", Real),
                Column::new("docs", Text),
            ],
            indexed: vec!["topic_id".to_string()],
        }
    }

    /// Fixed document columns followed by one column per metadata field.
    ///
    /// # Errors
    /// `Configuration` when a field is rejected by [`check_metadata_fields`].
    pub fn docs(prefix: &str, metadata_fields: &[String]) -> Result<Self> {
        check_metadata_fields(metadata_fields)?;
        let mut columns: Vec<Column> = DOC_FIXED_COLUMNS
            .iter()
            .map(|name| {
                let ty = if *name == "doc_id" {
                    ColumnType::Integer
                } else {
                    ColumnType::Text
                };
                Column::new(name, ty)
            })
            .collect();
        let mut indexed = vec!["doc_id".to_string()];
        for field in metadata_fields {
            let ty = if field == YEAR_FIELD {
                ColumnType::Integer
            } else {
                ColumnType::Text
            };
            columns.push(Column::new(field, ty));
            indexed.push(field.clone());
        }
        Ok(TableSchema {
            name: TableSchema::docs_name(prefix),
            columns,
            indexed,
        })
    }

    pub fn docs_name(prefix: &str) -> String {
        format!("{prefix}_docs")
    }

    pub fn words(prefix: &str) -> Self {
        use ColumnType::*;
        TableSchema {
            name: format!("{prefix}_words"),
            columns: vec![
                Column::new("word_id", Integer),
                Column::new("word", Text),
                Column::new("distribution_across_topics", Text),
                Column::new("docs", Text),
                Column::new("similar_words_by_topic", Text),
                Column::new("similar_words_by_cooc", Text),
            ],
            indexed: vec!["word_id".to_string(), "word".to_string()],
        }
    }

    pub fn info(prefix: &str) -> Self {
        TableSchema {
            name: format!("{prefix}_info"),
            columns: vec![
                Column::new("key", ColumnType::Text),
                Column::new("value", ColumnType::Text),
            ],
            indexed: Vec::new(),
        }
    }

    #[inline]
    pub fn shadow_name(&self) -> String {
        format!("{}__shadow", self.name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub(crate) fn create_sql(&self, table: &str) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let key = if i == 0 { " PRIMARY KEY" } else { "" };
                format!("\"{}\" {}{}", c.name, c.ty.sql(), key)
            })
            .collect();
        format!("CREATE TABLE \"{table}\" ({})", columns.join(", "))
    }

    pub(crate) fn insert_sql(&self, table: &str) -> String {
        let names: Vec<String> = self.column_names().map(|n| format!("\"{n}\"")).collect();
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO \"{table}\" ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        )
    }

    /// `<table>_<column>_index` on every indexed column of the live table
    pub(crate) fn index_sql(&self) -> Vec<String> {
        self.indexed
            .iter()
            .map(|col| {
                format!(
                    "CREATE INDEX \"{table}_{col}_index\" ON \"{table}\" (\"{col}\")",
                    table = self.name
                )
            })
            .collect()
    }
}

/// Metadata cell of `field` for `doc`: `year` as an integer (0 when absent),
/// anything else as text (empty when absent).
pub fn metadata_value(doc: &Document, field: &str) -> Value {
    if field == YEAR_FIELD {
        Value::Integer(doc.year.map(i64::from).unwrap_or(0))
    } else {
        Value::Text(doc.metadata.get(field).cloned().unwrap_or_default())
    }
}

/// `{"labels": [...], "data": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution<L> {
    pub labels: Vec<L>,
    pub data: Vec<f32>,
}

impl<L> Distribution<L> {
    pub fn new(labels: Vec<L>, data: Vec<f32>) -> Self {
        Distribution { labels, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Topic-indexed distribution, labels `0..k`
pub fn topic_distribution(weights: Vec<f32>) -> Distribution<usize> {
    Distribution::new((0..weights.len()).collect(), weights)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarWord {
    pub word: String,
    pub weight: f32,
}

/// `(word, weight, word_id)`
pub type WordEntry = (String, f32, usize);

#[derive(Debug, Clone, PartialEq)]
pub struct TopicRecord {
    pub topic_id: usize,
    pub word_distribution: Distribution<String>,
    pub topic_evolution: Distribution<i32>,
    pub frequency: f64,
    pub docs: Vec<(usize, f32)>,
}

impl TopicRecord {
    pub fn into_row(self) -> Result<Row> {
        Ok(vec![
            Value::Integer(self.topic_id as i64),
            Value::Text(serde_json::to_string(&self.word_distribution)?),
            Value::Text(serde_json::to_string(&self.topic_evolution)?),
            Value::Real(self.frequency),
            Value::Text(serde_json::to_string(&self.docs)?),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocRecord {
    pub doc_id: usize,
    pub topic_distribution: Distribution<usize>,
    pub topic_similarity: Vec<(usize, f64)>,
    pub vector_similarity: Vec<(usize, f64)>,
    pub word_list: Vec<WordEntry>,
    /// one value per metadata column, in schema order
    pub metadata: Vec<Value>,
}

impl DocRecord {
    pub fn into_row(self) -> Result<Row> {
        let mut row = vec![
            Value::Integer(self.doc_id as i64),
            Value::Text(serde_json::to_string(&self.topic_distribution)?),
            Value::Text(serde_json::to_string(&self.topic_similarity)?),
            Value::Text(serde_json::to_string(&self.vector_similarity)?),
            Value::Text(serde_json::to_string(&self.word_list)?),
        ];
        row.extend(self.metadata);
        Ok(row)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordRecord {
    pub word_id: usize,
    pub word: String,
    pub distribution_across_topics: Distribution<usize>,
    pub docs: Vec<(usize, f32)>,
    pub similar_words_by_topic: Vec<SimilarWord>,
    pub similar_words_by_cooc: Vec<SimilarWord>,
}

impl WordRecord {
    pub fn into_row(self) -> Result<Row> {
        Ok(vec![
            Value::Integer(self.word_id as i64),
            Value::Text(self.word),
            Value::Text(serde_json::to_string(&self.distribution_across_topics)?),
            Value::Text(serde_json::to_string(&self.docs)?),
            Value::Text(serde_json::to_string(&self.similar_words_by_topic)?),
            Value::Text(serde_json::to_string(&self.similar_words_by_cooc)?),
        ])
    }
}

/// Parameters of the run that produced the stored tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub nb_topics: usize,
    pub interval: u32,
    pub metadata_fields: Vec<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub nb_docs: usize,
    pub vocabulary_size: usize,
    pub algorithm: String,
    pub weighting: String,
}

impl RunInfo {
    /// One `(key, json value)` row per field
    pub fn into_rows(self) -> Result<Vec<Row>> {
        let value = serde_json::to_value(self)?;
        let serde_json::Value::Object(map) = value else {
            return Err(Error::Serialization("run info is not an object".to_string()));
        };
        Ok(map
            .into_iter()
            .map(|(key, value)| vec![Value::Text(key), Value::Text(value.to_string())])
            .collect())
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = serde_json::Map::new();
        for (key, value) in pairs {
            map.insert(key, serde_json::from_str(&value)?);
        }
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }
}

/// Entry of `topic_words.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub name: usize,
    pub frequency: f64,
    /// top words joined by ", "
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn identifiers() {
        assert!(is_identifier("year"));
        assert!(is_identifier("_author2"));
        assert!(!is_identifier("2nd"));
        assert!(!is_identifier("title; drop"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn docs_schema_types_metadata_columns() {
        let schema = TableSchema::docs("c", &["author".to_string(), "year".to_string()]).unwrap();
        assert_eq!(schema.name, "c_docs");
        let year = schema.columns.iter().find(|c| c.name == "year").unwrap();
        assert_eq!(year.ty, ColumnType::Integer);
        let author = schema.columns.iter().find(|c| c.name == "author").unwrap();
        assert_eq!(author.ty, ColumnType::Text);
        assert_eq!(schema.indexed, vec!["doc_id", "author", "year"]);
    }

    #[test]
    fn field_check_names_the_offending_key() {
        let fields = vec!["author".to_string(), "pub-date".to_string()];
        match check_metadata_fields(&fields) {
            Err(Error::Configuration(msg)) => assert!(msg.contains("pub-date")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(check_metadata_fields(&["Word_List".to_string()]).is_err());
        assert!(check_metadata_fields(&["author".to_string(), "year".to_string()]).is_ok());
    }

    #[test]
    fn colliding_or_unsafe_fields_are_rejected() {
        assert!(TableSchema::docs("c", &["Doc_Id".to_string()]).is_err());
        assert!(TableSchema::docs("c", &["a b".to_string()]).is_err());
        assert!(TableSchema::docs("c", &["x".to_string(), "X".to_string()]).is_err());
    }

    #[test]
    fn sql_statements() {
        let schema = TableSchema::info("c");
        assert_eq!(
            schema.create_sql("c_info__shadow"),
            "CREATE TABLE \"c_info__shadow\" (\"key\" TEXT PRIMARY KEY, \"value\" TEXT)"
        );
        assert_eq!(
            schema.insert_sql("c_info"),
            "INSERT INTO \"c_info\" (\"key\", \"value\") VALUES (?1, ?2)"
        );
        assert_eq!(
            TableSchema::words("c").index_sql()[1],
            "CREATE INDEX \"c_words_word_index\" ON \"c_words\" (\"word\")"
        );
    }

    #[test]
    fn missing_metadata_defaults() {
        let doc = Document {
            metadata: IndexMap::new(),
            year: None,
        };
        assert_eq!(metadata_value(&doc, "year"), Value::Integer(0));
        assert_eq!(metadata_value(&doc, "author"), Value::Text(String::new()));
    }

    #[test]
    fn run_info_survives_key_value_rows() {
        let info = RunInfo {
            nb_topics: 3,
            interval: 10,
            metadata_fields: vec!["author".to_string(), "year".to_string()],
            start_year: Some(1750),
            end_year: None,
            nb_docs: 12,
            vocabulary_size: 40,
            algorithm: "nmf".to_string(),
            weighting: "tfidf".to_string(),
        };
        let pairs: Vec<(String, String)> = info
            .clone()
            .into_rows()
            .unwrap()
            .into_iter()
            .map(|row| match (&row[0], &row[1]) {
                (Value::Text(k), Value::Text(v)) => (k.clone(), v.clone()),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(RunInfo::from_pairs(pairs).unwrap(), info);
    }
}
