//! Read-only access to the stored aggregates.
//!
//! Every call opens its own read-only connection, so one `Explorer` can
//! serve concurrent callers. Unknown topics, documents, words and fields
//! come back as `None` or empty results. Field names are checked against
//! the stored column list before any SQL is built from them.

pub mod display;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::corpus::YEAR_FIELD;
use crate::error::{Error, Result};
use crate::query::display::{display_words, DisplayWord};
use crate::storage::schema::{is_identifier, Distribution, RunInfo, SimilarWord, TableSchema, WordEntry};
use crate::storage::{table_exists, Store};
use crate::utils::math::cosine_dense;
use crate::utils::normalizer::normalize_distribution_f64;

/// Documents listed per topic
pub const TOPIC_DOCUMENTS: usize = 50;
/// Documents listed per word
pub const WORD_DOCUMENTS: usize = 50;
/// Neighbors listed per similarity method
pub const SIMILAR_DOCUMENTS: usize = 100;
pub const DEFAULT_SIMILAR_WORDS: usize = 20;
/// Words kept in a topic's distribution
pub const MIN_WORD_WEIGHT: f32 = 0.01;

/// Metadata of one document, field name to value
pub type Metadata = IndexMap<String, serde_json::Value>;

/// A document by id, or by metadata equalities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocRef {
    Id(usize),
    Fields(IndexMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDoc {
    pub doc_id: usize,
    pub metadata: Metadata,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarTopic {
    pub topic: usize,
    pub topic_evolution: Distribution<i32>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicData {
    pub topic_id: usize,
    pub word_distribution: Distribution<String>,
    pub topic_evolution: Distribution<i32>,
    pub documents: Vec<ScoredDoc>,
    pub frequency: f64,
    pub similar_topics: Vec<SimilarTopic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocData {
    pub doc_id: usize,
    pub topic_distribution: Distribution<usize>,
    pub metadata: Metadata,
    pub topic_sim_docs: Vec<ScoredDoc>,
    pub vector_sim_docs: Vec<ScoredDoc>,
    pub words: Vec<DisplayWord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordData {
    pub word: String,
    /// `None` when the word is not in the vocabulary
    pub word_id: Option<usize>,
    pub topic_ids: Vec<usize>,
    pub topic_distribution: Option<Distribution<usize>>,
    pub documents: Vec<ScoredDoc>,
    pub similar_words_by_topic: Vec<SimilarWord>,
    pub similar_words_by_cooc: Vec<SimilarWord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicWeight {
    pub name: usize,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicEvolution {
    pub topic: usize,
    pub topic_evolution: Distribution<i32>,
}

/// Stored row of the topics table
struct TopicRow {
    topic_id: usize,
    word_distribution: Distribution<String>,
    topic_evolution: Distribution<i32>,
    frequency: f64,
    docs: Vec<(usize, f32)>,
}

pub struct Explorer {
    path: PathBuf,
    topics: String,
    docs: String,
    words: String,
    info: RunInfo,
}

impl Explorer {
    /// Open the tables stored under `table`.
    ///
    /// # Errors
    /// `Configuration` when `table` is not an identifier or no run was stored
    /// under it.
    pub fn open(path: &Path, table: &str) -> Result<Self> {
        if !is_identifier(table) {
            return Err(Error::configuration(format!("table name '{table}' is not a valid identifier")));
        }
        let conn = Store::open_read_only(path)?;
        let info_table = TableSchema::info(table).name;
        if !table_exists(&conn, &info_table)? {
            return Err(Error::configuration(format!(
                "no run stored under '{table}' in {}",
                path.display()
            )));
        }
        let mut stmt = conn.prepare(&format!("SELECT key, value FROM \"{info_table}\""))?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let info = RunInfo::from_pairs(pairs)?;
        debug!(target: "topic_explorer::query", table, nb_topics = info.nb_topics, "Explorer opened");
        Ok(Explorer {
            path: path.to_path_buf(),
            topics: TableSchema::topics(table).name,
            docs: TableSchema::docs_name(table),
            words: TableSchema::words(table).name,
            info,
        })
    }

    fn connect(&self) -> Result<Connection> {
        Store::open_read_only(&self.path)
    }

    #[inline]
    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn topic_ids(&self) -> Vec<usize> {
        (0..self.info.nb_topics).collect()
    }

    fn is_field(&self, field: &str) -> bool {
        self.info.metadata_fields.iter().any(|f| f == field)
    }

    /// Known fields of `fields`, in the caller's order
    fn known_fields<'a>(&self, fields: &'a [String]) -> Vec<&'a str> {
        fields
            .iter()
            .map(String::as_str)
            .filter(|f| self.is_field(f))
            .collect()
    }

    pub fn get_vocabulary(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("SELECT word FROM \"{}\" ORDER BY word", self.words))?;
        let words = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(words)
    }

    pub fn get_word_from_id(&self, word_id: usize) -> Result<Option<String>> {
        let conn = self.connect()?;
        let word = conn
            .query_row(
                &format!("SELECT word FROM \"{}\" WHERE word_id = ?1", self.words),
                [word_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(word)
    }

    fn metadata_with(&self, conn: &Connection, doc_id: usize, fields: &[&str]) -> Result<Option<Metadata>> {
        if fields.is_empty() {
            let exists = conn
                .query_row(
                    &format!("SELECT 1 FROM \"{}\" WHERE doc_id = ?1", self.docs),
                    [doc_id as i64],
                    |_| Ok(()),
                )
                .optional()?;
            return Ok(exists.map(|_| Metadata::new()));
        }
        let columns: Vec<String> = fields.iter().map(|f| format!("\"{f}\"")).collect();
        let sql = format!("SELECT {} FROM \"{}\" WHERE doc_id = ?1", columns.join(", "), self.docs);
        let metadata = conn
            .query_row(&sql, [doc_id as i64], |row| {
                let mut metadata = Metadata::with_capacity(fields.len());
                for (i, field) in fields.iter().enumerate() {
                    metadata.insert(field.to_string(), json_value(row.get(i)?));
                }
                Ok(metadata)
            })
            .optional()?;
        Ok(metadata)
    }

    /// Requested metadata of `doc_id`; unknown fields are left out
    pub fn get_metadata(&self, doc_id: usize, fields: &[String]) -> Result<Option<Metadata>> {
        let conn = self.connect()?;
        self.metadata_with(&conn, doc_id, &self.known_fields(fields))
    }

    /// Documents with `field == value`, or `value <= field < end_value`
    pub fn get_doc_ids_by_metadata(&self, field: &str, value: &str, end_value: Option<&str>) -> Result<BTreeSet<usize>> {
        if !self.is_field(field) {
            return Ok(BTreeSet::new());
        }
        let conn = self.connect()?;
        let ids = match end_value {
            None => {
                let sql = format!("SELECT doc_id FROM \"{}\" WHERE \"{field}\" = ?1", self.docs);
                collect_ids(&conn, &sql, &[value])?
            }
            Some(end) => {
                let sql = format!(
                    "SELECT doc_id FROM \"{}\" WHERE \"{field}\" >= ?1 AND \"{field}\" < ?2",
                    self.docs
                );
                collect_ids(&conn, &sql, &[value, end])?
            }
        };
        Ok(ids)
    }

    fn topic_row(&self, conn: &Connection, topic_id: usize) -> Result<Option<TopicRow>> {
        let raw = conn
            .query_row(
                &format!(
                    "SELECT word_distribution, topic_evolution, frequency, docs FROM \"{}\" WHERE topic_id = ?1",
                    self.topics
                ),
                [topic_id as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((words, evolution, frequency, docs)) = raw else {
            return Ok(None);
        };
        Ok(Some(TopicRow {
            topic_id,
            word_distribution: parse(&words)?,
            topic_evolution: parse(&evolution)?,
            frequency,
            docs: parse(&docs)?,
        }))
    }

    fn scored_docs<I>(&self, conn: &Connection, docs: I, fields: &[&str]) -> Result<Vec<ScoredDoc>>
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let mut out = Vec::new();
        for (doc_id, score) in docs {
            let metadata = self.metadata_with(conn, doc_id, fields)?.unwrap_or_default();
            out.push(ScoredDoc {
                doc_id,
                metadata,
                score,
            });
        }
        Ok(out)
    }

    /// Topic words of weight at least 0.01, its first documents, and the
    /// other topics ranked by cosine similarity of their evolution series
    pub fn get_topic_data(&self, topic_id: usize, fields: &[String]) -> Result<Option<TopicData>> {
        let conn = self.connect()?;
        let Some(row) = self.topic_row(&conn, topic_id)? else {
            return Ok(None);
        };
        let fields = self.known_fields(fields);
        let documents = self.scored_docs(
            &conn,
            row.docs.iter().take(TOPIC_DOCUMENTS).map(|&(d, w)| (d, w as f64)),
            &fields,
        )?;

        let mut similar_topics: Vec<SimilarTopic> = self
            .evolutions(&conn)?
            .into_iter()
            .filter(|e| e.topic != topic_id)
            .map(|e| SimilarTopic {
                topic: e.topic,
                score: cosine_dense(&row.topic_evolution.data, &e.topic_evolution.data),
                topic_evolution: e.topic_evolution,
            })
            .collect();
        similar_topics.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.topic.cmp(&b.topic)));

        let (labels, data): (Vec<String>, Vec<f32>) = row
            .word_distribution
            .labels
            .into_iter()
            .zip(row.word_distribution.data)
            .filter(|(_, w)| *w >= MIN_WORD_WEIGHT)
            .unzip();
        Ok(Some(TopicData {
            topic_id: row.topic_id,
            word_distribution: Distribution::new(labels, data),
            topic_evolution: row.topic_evolution,
            documents,
            frequency: row.frequency,
            similar_topics,
        }))
    }

    /// Ranked documents of `topic_id` published in `[year, year + interval)`
    pub fn get_topic_data_by_year(
        &self,
        topic_id: usize,
        year: i32,
        interval: u32,
        fields: &[String],
        limit: usize,
    ) -> Result<Vec<ScoredDoc>> {
        let conn = self.connect()?;
        let Some(row) = self.topic_row(&conn, topic_id)? else {
            return Ok(Vec::new());
        };
        let end = year.saturating_add(interval.max(1) as i32);
        let sql = format!(
            "SELECT doc_id FROM \"{}\" WHERE \"{YEAR_FIELD}\" >= ?1 AND \"{YEAR_FIELD}\" < ?2",
            self.docs
        );
        let in_range = if self.is_field(YEAR_FIELD) {
            collect_ids(&conn, &sql, &[year, end])?
        } else {
            BTreeSet::new()
        };
        let fields = self.known_fields(fields);
        let docs = row
            .docs
            .into_iter()
            .filter(|(d, _)| in_range.contains(d))
            .take(limit)
            .map(|(d, w)| (d, w as f64));
        self.scored_docs(&conn, docs, &fields)
    }

    fn resolve(&self, conn: &Connection, doc_ref: &DocRef) -> Result<Option<usize>> {
        match doc_ref {
            DocRef::Id(id) => Ok(self.metadata_with(conn, *id, &[])?.map(|_| *id)),
            DocRef::Fields(filters) => {
                if filters.is_empty() || !filters.keys().all(|f| self.is_field(f)) {
                    return Ok(None);
                }
                let clauses: Vec<String> = filters
                    .keys()
                    .enumerate()
                    .map(|(i, f)| format!("\"{f}\" = ?{}", i + 1))
                    .collect();
                let sql = format!(
                    "SELECT doc_id FROM \"{}\" WHERE {} ORDER BY doc_id LIMIT 1",
                    self.docs,
                    clauses.join(" AND ")
                );
                let id = conn
                    .query_row(&sql, params_from_iter(filters.values()), |row| row.get::<_, i64>(0))
                    .optional()?;
                Ok(id.map(|id| id as usize))
            }
        }
    }

    pub fn get_doc_data(&self, doc_ref: &DocRef) -> Result<Option<DocData>> {
        let conn = self.connect()?;
        let Some(doc_id) = self.resolve(&conn, doc_ref)? else {
            return Ok(None);
        };
        let (distribution, topic_sim, vector_sim, word_list) = conn.query_row(
            &format!(
                "SELECT topic_distribution, topic_similarity, vector_similarity, word_list FROM \"{}\" WHERE doc_id = ?1",
                self.docs
            ),
            [doc_id as i64],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;
        let fields: Vec<&str> = self.info.metadata_fields.iter().map(String::as_str).collect();
        let topic_sim: Vec<(usize, f64)> = parse(&topic_sim)?;
        let vector_sim: Vec<(usize, f64)> = parse(&vector_sim)?;
        let word_list: Vec<WordEntry> = parse(&word_list)?;
        Ok(Some(DocData {
            doc_id,
            topic_distribution: parse(&distribution)?,
            metadata: self.metadata_with(&conn, doc_id, &fields)?.unwrap_or_default(),
            topic_sim_docs: self.scored_docs(&conn, topic_sim.into_iter().take(SIMILAR_DOCUMENTS), &fields)?,
            vector_sim_docs: self.scored_docs(&conn, vector_sim.into_iter().take(SIMILAR_DOCUMENTS), &fields)?,
            words: display_words(&word_list),
        }))
    }

    /// Topic distribution, ranked documents and neighbors of `word`.
    /// `limit` (default 20) caps each neighbor list.
    pub fn get_word_data(&self, word: &str, limit: Option<usize>) -> Result<WordData> {
        let limit = limit.unwrap_or(DEFAULT_SIMILAR_WORDS);
        let conn = self.connect()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT word_id, distribution_across_topics, docs, similar_words_by_topic, similar_words_by_cooc FROM \"{}\" WHERE word = ?1",
                    self.words
                ),
                [word],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((word_id, distribution, docs, by_topic, by_cooc)) = raw else {
            return Ok(WordData {
                word: word.to_string(),
                word_id: None,
                topic_ids: Vec::new(),
                topic_distribution: None,
                documents: Vec::new(),
                similar_words_by_topic: Vec::new(),
                similar_words_by_cooc: Vec::new(),
            });
        };
        let fields: Vec<&str> = self.info.metadata_fields.iter().map(String::as_str).collect();
        let docs: Vec<(usize, f32)> = parse(&docs)?;
        let documents = self.scored_docs(
            &conn,
            docs.into_iter().take(WORD_DOCUMENTS).map(|(d, w)| (d, w as f64)),
            &fields,
        )?;
        let neighbors = |json: &str| -> Result<Vec<SimilarWord>> {
            let list: Vec<SimilarWord> = parse(json)?;
            Ok(list.into_iter().filter(|s| s.word != word).take(limit).collect())
        };
        Ok(WordData {
            word: word.to_string(),
            word_id: Some(word_id as usize),
            topic_ids: self.topic_ids(),
            topic_distribution: Some(parse(&distribution)?),
            documents,
            similar_words_by_topic: neighbors(&by_topic)?,
            similar_words_by_cooc: neighbors(&by_cooc)?,
        })
    }

    /// Sorted distinct non-empty values of `field` held by at least
    /// `frequency_filter` documents. `"word"` lists the vocabulary.
    pub fn get_all_field_values(&self, field: &str, frequency_filter: usize) -> Result<Vec<String>> {
        if field == "word" {
            return self.get_vocabulary();
        }
        if !self.is_field(field) {
            return Ok(Vec::new());
        }
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT \"{field}\", COUNT(*) FROM \"{}\" GROUP BY \"{field}\"",
            self.docs
        ))?;
        let counted = stmt
            .query_map([], |row| Ok((row.get::<_, Value>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut numbers = Vec::new();
        let mut texts = Vec::new();
        for (value, count) in counted {
            if (count as usize) < frequency_filter {
                continue;
            }
            match value {
                Value::Integer(0) | Value::Null => {}
                Value::Integer(n) => numbers.push(n),
                Value::Text(s) if s.is_empty() => {}
                Value::Text(s) => texts.push(s),
                Value::Real(r) => texts.push(r.to_string()),
                Value::Blob(_) => {}
            }
        }
        numbers.sort_unstable();
        texts.sort();
        Ok(numbers.into_iter().map(|n| n.to_string()).chain(texts).collect())
    }

    /// Summed and renormalized topic distribution of the documents matching
    /// every `(field, value)` equality. Empty when nothing matches.
    pub fn get_topic_distribution_by_metadata(&self, filters: &[(String, String)]) -> Result<Vec<TopicWeight>> {
        if filters.is_empty() || !filters.iter().all(|(f, _)| self.is_field(f)) {
            return Ok(Vec::new());
        }
        let clauses: Vec<String> = filters
            .iter()
            .enumerate()
            .map(|(i, (f, _))| format!("\"{f}\" = ?{}", i + 1))
            .collect();
        let sql = format!(
            "SELECT topic_distribution FROM \"{}\" WHERE {}",
            self.docs,
            clauses.join(" AND ")
        );
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(filters.iter().map(|(_, v)| v)), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut sums: Vec<f64> = Vec::new();
        for json in rows {
            let distribution: Distribution<usize> = parse(&json)?;
            if sums.len() < distribution.len() {
                sums.resize(distribution.len(), 0.0);
            }
            for (t, w) in distribution.data.iter().enumerate() {
                sums[t] += *w as f64;
            }
        }
        Ok(normalize_distribution_f64(&sums)
            .into_iter()
            .enumerate()
            .map(|(name, frequency)| TopicWeight { name, frequency })
            .collect())
    }

    pub fn get_field_distribution(&self, field: &str, value: &str) -> Result<Vec<TopicWeight>> {
        self.get_topic_distribution_by_metadata(&[(field.to_string(), value.to_string())])
    }

    fn evolutions(&self, conn: &Connection) -> Result<Vec<TopicEvolution>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT topic_id, topic_evolution FROM \"{}\" ORDER BY topic_id",
            self.topics
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(topic, json)| {
                Ok(TopicEvolution {
                    topic: topic as usize,
                    topic_evolution: parse(&json)?,
                })
            })
            .collect()
    }

    /// Evolution series of every topic, by topic id
    pub fn get_time_distributions(&self) -> Result<Vec<TopicEvolution>> {
        let conn = self.connect()?;
        self.evolutions(&conn)
    }
}

fn parse<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}

fn collect_ids<P: rusqlite::ToSql>(conn: &Connection, sql: &str, params: &[P]) -> Result<BTreeSet<usize>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params_from_iter(params.iter()), |row| row.get::<_, i64>(0))?
        .map(|id| id.map(|id| id as usize))
        .collect::<rusqlite::Result<BTreeSet<usize>>>()?;
    Ok(ids)
}

fn json_value(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(n) => n.into(),
        Value::Real(r) => r.into(),
        Value::Text(s) => s.into(),
        Value::Blob(b) => b.into(),
    }
}
