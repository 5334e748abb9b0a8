use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rusqlite::types::Value;
use tempfile::TempDir;

use topic_explorer::aggregate::Aggregator;
use topic_explorer::model::artifact::ModelArtifact;
use topic_explorer::pipeline;
use topic_explorer::storage::schema::TableSchema;
use topic_explorer::storage::Store;
use topic_explorer::{Config, DocRef, Error, Explorer};

const TEXTS: [(&str, Option<i32>, &str); 8] = [
    ("river water boat fish river water", Some(1760), "Ada"),
    ("water boat fish river flood", Some(1765), "Ada"),
    ("fish river water harbor boat", Some(1780), "Ben"),
    ("boat harbor water river", Some(1790), "Ben"),
    ("court judge law trial court", Some(1762), "Ada"),
    ("judge law trial verdict court", Some(1771), "Cy"),
    ("law trial court judge appeal", Some(1785), "Cy"),
    ("trial judge verdict law court", None, "Ben"),
];

fn write_collection(dir: &Path, texts: &[(&str, Option<i32>, &str)]) {
    let texts_dir = dir.join("texts");
    fs::create_dir_all(&texts_dir).unwrap();
    let mut metadata = Vec::new();
    for (i, (text, year, author)) in texts.iter().enumerate() {
        fs::write(texts_dir.join(i.to_string()), text).unwrap();
        let mut entry = serde_json::json!({ "author": author });
        if let Some(year) = year {
            entry["year"] = (*year).into();
        }
        metadata.push(entry);
    }
    fs::write(dir.join("metadata.json"), serde_json::to_vec(&metadata).unwrap()).unwrap();
}

struct Fixture {
    dir: TempDir,
    db: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        write_collection(&dir.path().join("collection"), &TEXTS);
        let db = dir.path().join("out").join("topics.db");
        fs::create_dir_all(db.parent().unwrap()).unwrap();
        Fixture { dir, db }
    }

    fn config(&self, extra: &str) -> Config {
        let toml = format!(
            r#"
[source]
path = '{}'

[database]
path = '{}'

[topic_modeling]
nb_topics = 2
seed = 7

[topics_over_time]
interval = 10

{extra}
"#,
            self.dir.path().join("collection").display(),
            self.db.display(),
        );
        Config::from_toml_str(&toml).unwrap()
    }

    fn run(&self) -> Explorer {
        pipeline::run(&self.config("")).unwrap();
        Explorer::open(&self.db, "corpus").unwrap()
    }
}

fn fields(pairs: &[(&str, &str)]) -> DocRef {
    DocRef::Fields(pairs.iter().map(|(f, v)| (f.to_string(), v.to_string())).collect::<IndexMap<_, _>>())
}

#[test]
fn run_reports_every_stored_row() {
    let fixture = Fixture::new();
    let report = pipeline::run(&fixture.config("")).unwrap();
    assert_eq!(report.documents, 8);
    assert_eq!(report.nb_topics, 2);
    assert_eq!(report.topics, 2);
    assert_eq!(report.docs, 8);
    assert_eq!(report.words, report.vocabulary);

    let explorer = Explorer::open(&fixture.db, "corpus").unwrap();
    let info = explorer.info();
    assert_eq!(info.nb_topics, 2);
    assert_eq!(info.nb_docs, 8);
    assert_eq!(info.interval, 10);
    assert_eq!(info.metadata_fields, vec!["author".to_string(), "year".to_string()]);
    assert_eq!(explorer.topic_ids(), vec![0, 1]);
}

#[test]
fn opening_an_unknown_table_is_a_configuration_error() {
    let fixture = Fixture::new();
    fixture.run();
    assert!(matches!(Explorer::open(&fixture.db, "missing"), Err(Error::Configuration(_))));
    assert!(matches!(Explorer::open(&fixture.db, "bad name"), Err(Error::Configuration(_))));
}

#[test]
fn vocabulary_ids_follow_sorted_order() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let vocabulary = explorer.get_vocabulary().unwrap();
    let mut sorted = vocabulary.clone();
    sorted.sort();
    assert_eq!(vocabulary, sorted);
    assert_eq!(vocabulary[0], "appeal");
    for (id, word) in vocabulary.iter().enumerate() {
        assert_eq!(explorer.get_word_from_id(id).unwrap().as_deref(), Some(word.as_str()));
    }
    assert_eq!(explorer.get_word_from_id(vocabulary.len()).unwrap(), None);
}

#[test]
fn word_data_lists_containing_documents() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let data = explorer.get_word_data("river", None).unwrap();
    assert!(data.word_id.is_some());
    assert_eq!(data.topic_ids, vec![0, 1]);
    assert_eq!(data.topic_distribution.as_ref().map(|d| d.len()), Some(2));
    let mut docs: Vec<usize> = data.documents.iter().map(|d| d.doc_id).collect();
    docs.sort_unstable();
    assert_eq!(docs, vec![0, 1, 2, 3]);
    assert!(data.documents.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(data.documents[0].metadata.contains_key("author"));
    for list in [&data.similar_words_by_topic, &data.similar_words_by_cooc] {
        assert!(!list.is_empty());
        assert!(list.len() <= 20);
        assert!(list.iter().all(|s| s.word != "river"));
    }

    let limited = explorer.get_word_data("river", Some(2)).unwrap();
    assert_eq!(limited.similar_words_by_cooc.len(), 2);
}

#[test]
fn unknown_word_has_no_id() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let data = explorer.get_word_data("zeppelin", None).unwrap();
    assert_eq!(data.word, "zeppelin");
    assert_eq!(data.word_id, None);
    assert!(data.topic_distribution.is_none());
    assert!(data.documents.is_empty());
    assert!(data.similar_words_by_topic.is_empty());
}

#[test]
fn doc_data_by_id() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let doc = explorer.get_doc_data(&DocRef::Id(0)).unwrap().unwrap();
    assert_eq!(doc.doc_id, 0);
    assert_eq!(doc.topic_distribution.len(), 2);
    assert_eq!(doc.metadata["author"], "Ada");
    assert_eq!(doc.metadata["year"], 1760);

    for similar in [&doc.topic_sim_docs, &doc.vector_sim_docs] {
        assert!(similar.iter().all(|d| d.doc_id != 0));
        assert!(similar.iter().all(|d| (0.0..=1.0).contains(&d.score)));
        assert!(similar.windows(2).all(|w| w[0].score >= w[1].score));
    }
    // the closest text shares its vocabulary
    assert!([1, 2, 3].contains(&doc.vector_sim_docs[0].doc_id));

    let words: Vec<&str> = doc.words.iter().map(|w| w.word.as_str()).collect();
    let mut sorted = words.clone();
    sorted.sort();
    assert_eq!(words, sorted);
    assert!(words.contains(&"river"));
    assert!(doc.words.iter().all(|w| (0.5..=1.0).contains(&w.opacity)));
    assert!(doc.words.iter().any(|w| w.weight == 1.0));
}

#[test]
fn doc_data_by_fields_picks_the_lowest_id() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let doc = explorer.get_doc_data(&fields(&[("author", "Ben")])).unwrap().unwrap();
    assert_eq!(doc.doc_id, 2);
    let doc = explorer
        .get_doc_data(&fields(&[("author", "Ben"), ("year", "1790")]))
        .unwrap()
        .unwrap();
    assert_eq!(doc.doc_id, 3);
}

#[test]
fn unresolvable_docs_are_none() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    assert!(explorer.get_doc_data(&DocRef::Id(99)).unwrap().is_none());
    assert!(explorer.get_doc_data(&fields(&[("author", "Zed")])).unwrap().is_none());
    assert!(explorer.get_doc_data(&fields(&[("title", "x")])).unwrap().is_none());
    assert!(explorer.get_doc_data(&fields(&[])).unwrap().is_none());
}

#[test]
fn doc_ids_by_exact_value_and_range() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let cy: Vec<usize> = explorer.get_doc_ids_by_metadata("author", "Cy", None).unwrap().into_iter().collect();
    assert_eq!(cy, vec![5, 6]);
    let early: Vec<usize> = explorer
        .get_doc_ids_by_metadata("year", "1760", Some("1780"))
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(early, vec![0, 1, 4, 5]);
    assert!(explorer.get_doc_ids_by_metadata("title", "x", None).unwrap().is_empty());
}

#[test]
fn metadata_keeps_only_known_fields() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let requested = vec!["year".to_string(), "title".to_string()];
    let metadata = explorer.get_metadata(7, &requested).unwrap().unwrap();
    assert_eq!(metadata.len(), 1);
    // missing years are stored as 0
    assert_eq!(metadata["year"], 0);
    assert!(explorer.get_metadata(8, &requested).unwrap().is_none());
}

#[test]
fn field_distribution_is_normalized() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let distribution = explorer.get_field_distribution("author", "Ada").unwrap();
    assert_eq!(distribution.iter().map(|t| t.name).collect::<Vec<_>>(), vec![0, 1]);
    let total: f64 = distribution.iter().map(|t| t.frequency).sum();
    assert!((total - 1.0).abs() < 1e-9);

    let both = explorer
        .get_topic_distribution_by_metadata(&[("author".to_string(), "Cy".to_string()), ("year".to_string(), "1771".to_string())])
        .unwrap();
    assert_eq!(both.len(), 2);

    assert!(explorer.get_field_distribution("author", "Zed").unwrap().is_empty());
    assert!(explorer.get_field_distribution("title", "x").unwrap().is_empty());
    assert!(explorer.get_topic_distribution_by_metadata(&[]).unwrap().is_empty());
}

#[test]
fn field_values_are_sorted_and_filtered() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let years = explorer.get_all_field_values("year", 1).unwrap();
    assert_eq!(years, vec!["1760", "1762", "1765", "1771", "1780", "1785", "1790"]);
    assert_eq!(explorer.get_all_field_values("author", 3).unwrap(), vec!["Ada", "Ben"]);
    assert!(explorer.get_all_field_values("title", 1).unwrap().is_empty());
    assert_eq!(explorer.get_all_field_values("word", 1).unwrap(), explorer.get_vocabulary().unwrap());
}

#[test]
fn topic_data_and_evolutions() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let evolutions = explorer.get_time_distributions().unwrap();
    assert_eq!(evolutions.len(), 2);
    for evolution in &evolutions {
        assert_eq!(evolution.topic_evolution.labels, vec![1760, 1770, 1780, 1790]);
    }

    let topic = explorer.get_topic_data(0, &["author".to_string()]).unwrap().unwrap();
    assert_eq!(topic.topic_id, 0);
    assert!((0.0..=1.0).contains(&topic.frequency));
    assert!(!topic.documents.is_empty());
    assert!(topic.documents.iter().all(|d| d.metadata.len() == 1));
    assert!(topic.word_distribution.data.iter().all(|&w| w >= 0.01));
    assert_eq!(topic.similar_topics.len(), 1);
    assert_eq!(topic.similar_topics[0].topic, 1);
    assert_eq!(topic.topic_evolution, evolutions[0].topic_evolution);

    assert!(explorer.get_topic_data(5, &[]).unwrap().is_none());
}

#[test]
fn topic_documents_by_year_stay_in_range() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    for topic in explorer.topic_ids() {
        let docs = explorer.get_topic_data_by_year(topic, 1760, 10, &[], 50).unwrap();
        assert!(docs.iter().all(|d| [0, 1, 4].contains(&d.doc_id)));
        let capped = explorer.get_topic_data_by_year(topic, 1760, 100, &[], 1).unwrap();
        assert!(capped.len() <= 1);
    }
    assert!(explorer.get_topic_data_by_year(9, 1760, 10, &[], 50).unwrap().is_empty());
}

#[test]
fn summary_file_is_written_next_to_the_database() {
    let fixture = Fixture::new();
    fixture.run();
    let raw = fs::read(fixture.db.parent().unwrap().join("topic_words.json")).unwrap();
    let summary: Vec<serde_json::Value> = serde_json::from_slice(&raw).unwrap();
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0]["name"], 0);
    assert!(summary[1]["description"].as_str().unwrap().contains(", "));
}

#[test]
fn repeated_runs_store_identical_rankings() {
    let first = Fixture::new();
    let second = Fixture::new();
    let a = first.run();
    let b = second.run();
    for doc in 0..TEXTS.len() {
        let x = a.get_doc_data(&DocRef::Id(doc)).unwrap().unwrap();
        let y = b.get_doc_data(&DocRef::Id(doc)).unwrap().unwrap();
        assert_eq!(x.words, y.words);
        assert_eq!(x.topic_distribution, y.topic_distribution);
        assert_eq!(
            x.vector_sim_docs.iter().map(|d| d.doc_id).collect::<Vec<_>>(),
            y.vector_sim_docs.iter().map(|d| d.doc_id).collect::<Vec<_>>()
        );
    }
    assert_eq!(
        a.get_word_data("law", None).unwrap(),
        b.get_word_data("law", None).unwrap()
    );
}

#[test]
fn failed_rerun_keeps_the_previous_tables() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let before = explorer.get_doc_data(&DocRef::Id(1)).unwrap();

    let mut broken = fixture.config("");
    broken.topic_modeling.nb_topics = 50;
    assert!(matches!(pipeline::run(&broken), Err(Error::Configuration(_))));

    let explorer = Explorer::open(&fixture.db, "corpus").unwrap();
    assert_eq!(explorer.info().nb_topics, 2);
    assert_eq!(explorer.get_doc_data(&DocRef::Id(1)).unwrap(), before);
}

fn add_metadata_key(fixture: &Fixture, doc: usize, key: &str) {
    let path = fixture.dir.path().join("collection").join("metadata.json");
    let mut metadata: Vec<serde_json::Value> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    metadata[doc][key] = "1901-05-01".into();
    fs::write(&path, serde_json::to_vec(&metadata).unwrap()).unwrap();
}

fn assert_unchanged(fixture: &Fixture, info: &topic_explorer::storage::schema::RunInfo, key: &str) {
    let explorer = Explorer::open(&fixture.db, "corpus").unwrap();
    assert_eq!(explorer.info(), info);
    assert!(explorer.get_all_field_values(key, 1).unwrap().is_empty());
    assert_eq!(explorer.get_all_field_values("author", 1).unwrap(), vec!["Ada", "Ben", "Cy"]);
    assert_eq!(explorer.topic_ids(), vec![0, 1]);
    assert_eq!(explorer.get_doc_data(&DocRef::Id(7)).unwrap().map(|d| d.doc_id), Some(7));
}

#[test]
fn rerun_with_an_unusable_field_name_keeps_the_previous_generation() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let info = explorer.info().clone();
    let before = explorer.get_doc_data(&DocRef::Id(0)).unwrap();

    add_metadata_key(&fixture, 0, "pub-date");
    match pipeline::run(&fixture.config("")) {
        Err(Error::Configuration(msg)) => assert!(msg.contains("pub-date")),
        other => panic!("unexpected: {:?}", other.map(|r| r.documents)),
    }

    assert_unchanged(&fixture, &info, "pub-date");
    let explorer = Explorer::open(&fixture.db, "corpus").unwrap();
    assert_eq!(explorer.get_doc_data(&DocRef::Id(0)).unwrap(), before);
}

#[test]
fn field_names_colliding_with_stored_columns_are_rejected() {
    let fixture = Fixture::new();
    let info = fixture.run().info().clone();

    add_metadata_key(&fixture, 3, "Word_List");
    match pipeline::run(&fixture.config("")) {
        Err(Error::Configuration(msg)) => assert!(msg.contains("Word_List")),
        other => panic!("unexpected: {:?}", other.map(|r| r.documents)),
    }
    assert_unchanged(&fixture, &info, "Word_List");
}

#[test]
fn failure_in_a_later_stage_publishes_no_table() {
    let fixture = Fixture::new();
    let info = fixture.run().info().clone();

    let mut store = Store::open(&fixture.db).unwrap();
    let aggregator = Aggregator::new(Some(2)).unwrap();
    let info_schema = TableSchema::info("corpus");
    let topic_schema = TableSchema::topics("corpus");
    let doc_schema = TableSchema::docs("corpus", &["author".to_string(), "pub_date".to_string()]).unwrap();
    {
        let mut generation = store
            .begin(&[info_schema, topic_schema.clone(), doc_schema.clone()])
            .unwrap();
        generation
            .insert("corpus_info", &[Value::Text("nb_topics".into()), Value::Text("9".into())])
            .unwrap();
        let topics = aggregator.stage(&mut generation, &topic_schema, 9, |topic| {
            Ok(vec![
                Value::Integer(topic as i64),
                Value::Text("{}".into()),
                Value::Text("{}".into()),
                Value::Real(0.0),
                Value::Text("[]".into()),
            ])
        });
        assert_eq!(topics.unwrap(), 9);
        let docs = aggregator.stage(&mut generation, &doc_schema, 8, |_| {
            Err(Error::Pipeline("document row failed".to_string()))
        });
        assert!(docs.is_err());
    }

    assert_unchanged(&fixture, &info, "pub_date");
    assert!(!store.table_exists("corpus_info__shadow").unwrap());
    assert!(!store.table_exists("corpus_topics__shadow").unwrap());
}

#[test]
fn uncommitted_generation_leaves_readers_on_the_old_rows() {
    let fixture = Fixture::new();
    let explorer = fixture.run();
    let before = explorer.get_topic_data(0, &[]).unwrap();

    let mut store = Store::open(&fixture.db).unwrap();
    {
        let mut generation = store.begin(&[TableSchema::topics("corpus")]).unwrap();
        generation
            .insert("corpus_topics", &[
                Value::Integer(0),
                Value::Text("{}".into()),
                Value::Text("{}".into()),
                Value::Real(0.0),
                Value::Text("[]".into()),
            ])
            .unwrap();
        assert_eq!(generation.rows("corpus_topics"), 1);
    }
    assert_eq!(explorer.get_topic_data(0, &[]).unwrap(), before);
    assert!(!store.table_exists("corpus_topics__shadow").unwrap());
}

#[test]
fn inference_collection_replaces_the_documents() {
    let fixture = Fixture::new();
    let inference = fixture.dir.path().join("inference");
    write_collection(
        &inference,
        &[
            ("river boat harbor", Some(1800), "Di"),
            ("judge court verdict", Some(1801), "Di"),
            ("fish water unseen", Some(1802), "Ed"),
        ],
    );
    let mut config = fixture.config("");
    config.source.inference_path = Some(inference);
    let report = pipeline::run(&config).unwrap();
    assert_eq!(report.documents, 3);
    assert_eq!(report.docs, 3);
    // vocabulary stays the training one
    assert_eq!(report.words, report.vocabulary);

    let explorer = Explorer::open(&fixture.db, "corpus").unwrap();
    assert!(explorer.get_word_data("unseen", None).unwrap().word_id.is_none());
    let doc = explorer.get_doc_data(&fields(&[("author", "Di")])).unwrap().unwrap();
    assert_eq!(doc.doc_id, 0);
}

#[test]
fn lda_run_with_saved_artifact() {
    let fixture = Fixture::new();
    let artifact = fixture.dir.path().join("model.cbor");
    let config = fixture.config(&format!(
        "[aggregation]\nartifact_path = '{}'\nworkers = 2\n",
        artifact.display()
    ));
    let mut config = config;
    config.topic_modeling.algorithm = "lda".to_string();
    let report = pipeline::run(&config).unwrap();
    assert_eq!(report.topics, 2);

    let explorer = Explorer::open(&fixture.db, "corpus").unwrap();
    assert_eq!(explorer.info().algorithm, "lda");
    let doc = explorer.get_doc_data(&DocRef::Id(4)).unwrap().unwrap();
    let total: f32 = doc.topic_distribution.data.iter().sum();
    assert!((total - 1.0).abs() < 1e-4);

    let loaded = ModelArtifact::load(&artifact).unwrap();
    let model = loaded
        .into_model(vec![topic_explorer::RawDocument::new("river water boat")])
        .unwrap();
    assert_eq!(model.nb_topics(), 2);
    assert_eq!(model.corpus().size(), 1);
}

#[test]
fn separate_tables_share_one_database() {
    let fixture = Fixture::new();
    fixture.run();
    let mut other = fixture.config("");
    other.database.table_name = "second".to_string();
    other.topic_modeling.nb_topics = 3;
    pipeline::run(&other).unwrap();

    assert_eq!(Explorer::open(&fixture.db, "corpus").unwrap().info().nb_topics, 2);
    assert_eq!(Explorer::open(&fixture.db, "second").unwrap().info().nb_topics, 3);
}
