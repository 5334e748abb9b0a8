//! CBOR snapshot of a fitted run.
//!
//! The snapshot holds the fitted vectorizer and both model matrices; the
//! corpus itself is rebuilt from its source texts.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::corpus::{Corpus, RawDocument};
use crate::error::{Error, Result};
use crate::model::backend::Backend;
use crate::model::TopicModel;
use crate::utils::math::matrix::DenseMatrix;
use crate::vectorizer::serde::VectorizerData;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub vectorizer: VectorizerData,
    pub backend: Backend,
    pub doc_topic: DenseMatrix,
    pub topic_word: DenseMatrix,
}

impl ModelArtifact {
    pub fn from_model(model: &TopicModel) -> Self {
        ModelArtifact {
            vectorizer: VectorizerData::from(model.corpus().vectorizer().as_ref()),
            backend: model.backend().clone(),
            doc_topic: model.doc_topic().clone(),
            topic_word: model.topic_word().clone(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_cbor::to_vec(self)?;
        fs::write(path, bytes)?;
        info!(target: "topic_explorer::model", path = %path.display(), "Model artifact written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let artifact: ModelArtifact = serde_cbor::from_slice(&bytes)?;
        if artifact.vectorizer.vocabulary.len() != artifact.topic_word.cols() {
            return Err(Error::Serialization(format!(
                "artifact {} has {} terms but a topic-word matrix over {}",
                path.display(),
                artifact.vectorizer.vocabulary.len(),
                artifact.topic_word.cols()
            )));
        }
        Ok(artifact)
    }

    /// Re-vectorize `docs` with the stored vectorizer and bind the stored
    /// matrices to them. `docs` must be the documents the model was fit on.
    pub fn into_model(self, docs: Vec<RawDocument>) -> Result<TopicModel> {
        let vectorizer = Arc::new(self.vectorizer.into_vectorizer());
        let corpus = Arc::new(Corpus::with_vectorizer(vectorizer, docs));
        TopicModel::from_parts(corpus, self.backend, self.doc_topic, self.topic_word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::backend::Algorithm;
    use crate::vectorizer::VectorizerParams;
    use tempfile::TempDir;

    fn docs() -> Vec<RawDocument> {
        vec![
            RawDocument::new("river boat water"),
            RawDocument::new("water river fish"),
            RawDocument::new("court law judge"),
            RawDocument::new("law judge trial"),
        ]
    }

    #[test]
    fn saved_artifact_restores_the_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.cbor");
        let corpus = Arc::new(Corpus::fit(docs(), VectorizerParams::default()).unwrap());
        let model = TopicModel::infer_topics(corpus, Backend::new(Algorithm::Nmf, 20, 4), 2).unwrap();

        ModelArtifact::from_model(&model).save(&path).unwrap();
        let restored = ModelArtifact::load(&path).unwrap().into_model(docs()).unwrap();

        assert_eq!(restored.doc_topic(), model.doc_topic());
        assert_eq!(restored.top_words(0, 3).unwrap(), model.top_words(0, 3).unwrap());
    }

    #[test]
    fn mismatched_documents_are_rejected() {
        let corpus = Arc::new(Corpus::fit(docs(), VectorizerParams::default()).unwrap());
        let model = TopicModel::infer_topics(corpus, Backend::new(Algorithm::Nmf, 5, 4), 2).unwrap();
        let artifact = ModelArtifact::from_model(&model);
        assert!(artifact.into_model(docs()[..2].to_vec()).is_err());
    }
}
