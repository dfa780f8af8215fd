//! Conversion between embedding vectors and their stored text form.

const DELIMITER: char = ',';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeatureParseError {
    #[error("feature string is empty")]
    Empty,

    #[error("component {index} is not a number: '{value}'")]
    InvalidComponent { index: usize, value: String },
}

/// Scale `v` to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Join the components as shortest round-trip decimals
pub fn serialize_feature(feature: &[f32]) -> String {
    feature
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

pub fn parse_feature(raw: &str) -> Result<Vec<f32>, FeatureParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FeatureParseError::Empty);
    }

    raw.split(DELIMITER)
        .enumerate()
        .map(|(index, part)| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| FeatureParseError::InvalidComponent {
                    index,
                    value: part.to_string(),
                })
        })
        .collect()
}
