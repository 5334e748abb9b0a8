use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::vectorizer::{Vectorizer, VectorizerParams};

/// Serializable form of a fitted `Vectorizer`.
/// The term lookup map is rebuilt from `vocabulary` on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerData {
    pub params: VectorizerParams,
    /// surface forms ordered by id
    pub vocabulary: Vec<String>,
    pub idf: Vec<f32>,
    pub doc_num: usize,
}

impl VectorizerData {
    pub fn into_vectorizer(self) -> Vectorizer {
        Vectorizer::from_parts(self.params, self.vocabulary, self.idf, self.doc_num)
    }
}

impl From<&Vectorizer> for VectorizerData {
    fn from(v: &Vectorizer) -> Self {
        VectorizerData {
            params: v.params.clone(),
            vocabulary: v.vocabulary.clone(),
            idf: v.idf.clone(),
            doc_num: v.doc_num,
        }
    }
}

impl Serialize for Vectorizer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        VectorizerData::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Vectorizer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = VectorizerData::deserialize(deserializer)?;
        if data.vocabulary.len() != data.idf.len() {
            return Err(serde::de::Error::custom(
                "vocabulary and idf lengths differ",
            ));
        }
        Ok(data.into_vectorizer())
    }
}

#[cfg(test)]
mod tests {
    use crate::vectorizer::{Vectorizer, VectorizerParams};

    #[test]
    fn restored_vectorizer_transforms_identically() {
        let (v, _) = Vectorizer::fit_transform(VectorizerParams::default(), &["a b b", "b c"]).unwrap();
        let bytes = serde_cbor::to_vec(&v).unwrap();
        let restored: Vectorizer = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(restored.vocabulary(), v.vocabulary());
        assert_eq!(restored.id_for_term("c"), Some(2));
        assert_eq!(restored.transform(&["c a"]), v.transform(&["c a"]));
    }
}
