use num::Num;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ZeroSpVec;

impl<N> Serialize for ZeroSpVec<N>
where
    N: Num + Serialize + Copy,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // len, then ordered (index, value) entries
        let mut state = serializer.serialize_struct("ZeroSpVec", 2)?;
        state.serialize_field("len", &(self.len as u64))?;
        let entries: Vec<(u32, N)> = self
            .inds
            .iter()
            .copied()
            .zip(self.vals.iter().copied())
            .collect();
        state.serialize_field("entries", &entries)?;
        state.end()
    }
}

impl<'de, N> Deserialize<'de> for ZeroSpVec<N>
where
    N: Num + Deserialize<'de> + Copy,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ZeroSpVecData<N> {
            len: u64,
            entries: Vec<(u32, N)>,
        }

        let data: ZeroSpVecData<N> = ZeroSpVecData::deserialize(deserializer)?;
        let len = data.len as usize;
        if data.entries.iter().any(|(idx, _)| *idx as usize >= len) {
            return Err(serde::de::Error::custom("ZeroSpVec entry index out of bounds"));
        }
        let (inds, vals): (Vec<u32>, Vec<N>) = data.entries.into_iter().unzip();
        Ok(ZeroSpVec::from_unsorted(len, inds, vals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbor_keeps_length_and_entries() {
        let v = ZeroSpVec::from_dense(&[0.0f32, 0.5, 0.0, 2.0, 0.0]);
        let bytes = serde_cbor::to_vec(&v).unwrap();
        let back: ZeroSpVec<f32> = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.len(), 5);
    }

    #[test]
    fn rejects_out_of_bounds_entries() {
        let json = r#"{"len": 2, "entries": [[5, 1.0]]}"#;
        assert!(serde_json::from_str::<ZeroSpVec<f32>>(json).is_err());
    }
}
