use sha2::{Digest, Sha256};

/// Length of every encoded state vector.
pub const STATE_DIM: usize = 32;

/// Rounds beyond this saturate the round feature.
const ROUND_SCALE: f64 = 10.0;

fn bucket(token: &str) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(bytes) % (STATE_DIM as u64 - 1)) as usize
}

/// Encode subtask text and round into a fixed-length numeric state.
///
/// The first `STATE_DIM - 1` components are a feature-hashed,
/// L2-normalized bag of lowercase words; the last is the round scaled
/// into `[0, 1]`.
pub fn encode_state(text: &str, round: u32) -> Vec<f64> {
    let mut state = vec![0.0; STATE_DIM];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        state[bucket(&token.to_lowercase())] += 1.0;
    }
    let norm = state.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in &mut state {
            *v /= norm;
        }
    }
    state[STATE_DIM - 1] = (f64::from(round) / ROUND_SCALE).min(1.0);
    state
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_length_and_deterministic() {
        let a = encode_state("Summarize file X", 1);
        let b = encode_state("summarize FILE x", 1);
        assert_eq!(a.len(), STATE_DIM);
        assert_eq!(a, b);
    }

    #[test]
    fn test_word_part_is_unit_length() {
        let s = encode_state("write a parser for toml files", 0);
        let norm: f64 = s[..STATE_DIM - 1].iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_feature_saturates() {
        assert!((encode_state("", 5)[STATE_DIM - 1] - 0.5).abs() < 1e-9);
        assert!((encode_state("", 50)[STATE_DIM - 1] - 1.0).abs() < 1e-9);
        assert!(encode_state("", 0).iter().all(|v| *v == 0.0));
    }
}
