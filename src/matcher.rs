//! Verification decision: normalize, measure, compare against a threshold.
//!
//! Everything here is pure arithmetic over two embeddings of the same space.
//! Which space they came from is the caller's business.

use ndarray::{Array1, ArrayView1};
use serde::Serialize;

use crate::error::{VerifyError, VerifyResult};
use crate::profile::{Metric, ModelProfile};
use crate::Embedding;

/// Stands in for the norm of an all-zero vector.
pub const NORM_EPSILON: f64 = 1e-10;

/// Outcome of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VerificationResult {
    pub distance: f64,
    pub verified: bool,
    pub threshold: f64,
    pub confidence: f64,
}

/// Scale `v` to unit length. A zero vector stays zero.
pub fn normalize(v: ArrayView1<f32>) -> Array1<f64> {
    let v = v.mapv(f64::from);
    let norm = v.dot(&v).sqrt();
    // the f64 norm of finite f32 values never underflows, so only an
    // all-zero vector lands here
    let denom = if norm == 0.0 { NORM_EPSILON } else { norm };
    v / denom
}

fn validate(a: &Embedding, b: &Embedding) -> VerifyResult<()> {
    if a.is_empty() || b.is_empty() {
        return Err(VerifyError::InvalidEmbedding("embedding is empty".into()));
    }
    if a.len() != b.len() {
        return Err(VerifyError::InvalidEmbedding(format!(
            "length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    if !a.vector.iter().chain(b.vector.iter()).all(|x| x.is_finite()) {
        return Err(VerifyError::InvalidEmbedding(
            "embedding contains non-finite values".into(),
        ));
    }
    Ok(())
}

/// Distance between two embeddings under `metric`. Always `>= 0`.
pub fn distance(a: &Embedding, b: &Embedding, metric: Metric) -> VerifyResult<f64> {
    validate(a, b)?;

    let d = match metric {
        Metric::Euclidean => {
            let diff = a.vector.mapv(f64::from) - b.vector.mapv(f64::from);
            diff.dot(&diff).sqrt()
        }
        Metric::Cosine => {
            let similarity = normalize(a.vector.view()).dot(&normalize(b.vector.view()));
            // rounding can push identical vectors a hair below zero
            (1.0 - similarity).max(0.0)
        }
    };

    Ok(d)
}

/// Confidence in `[0, 1]`, falling linearly with distance. Euclidean
/// distances are assumed to live in roughly `[0, 2]`.
pub fn confidence(distance: f64, metric: Metric) -> f64 {
    let c = match metric {
        Metric::Euclidean => 1.0 - distance / 2.0,
        Metric::Cosine => 1.0 - distance,
    };
    c.clamp(0.0, 1.0)
}

/// Verified iff `distance < threshold`, strictly.
pub fn decide(distance: f64, threshold: f64, metric: Metric) -> VerificationResult {
    VerificationResult {
        distance,
        verified: distance < threshold,
        threshold,
        confidence: confidence(distance, metric),
    }
}

/// Compare two embeddings of `profile`'s space with its metric and threshold.
pub fn verify(
    a: &Embedding,
    b: &Embedding,
    profile: ModelProfile,
) -> VerifyResult<VerificationResult> {
    let metric = profile.metric();
    let d = distance(a, b, metric)?;
    Ok(decide(d, profile.threshold(), metric))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use rand::Rng;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn random_embedding(rng: &mut impl Rng, len: usize) -> Embedding {
        Embedding::new((0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
    }

    #[test]
    fn normalize_yields_unit_norm() {
        let mut rng = rand::thread_rng();
        for len in [1, 2, 128, 512] {
            let v = random_embedding(&mut rng, len);
            let n = normalize(v.vector.view());
            assert_eq!(n.len(), len);
            assert!((n.dot(&n).sqrt() - 1.0).abs() < 1e-9);
        }

        let tiny = Array1::from_vec(vec![1e-3f32, -2e-3, 5e-4]);
        let n = normalize(tiny.view());
        assert!((n.dot(&n).sqrt() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tiny_vectors_keep_their_direction() {
        for values in [[1e-11f32, 0.0], [3e-30, -4e-30], [f32::MIN_POSITIVE, 0.0]] {
            let a = emb(&values);
            let n = normalize(a.vector.view());
            assert!((n.dot(&n).sqrt() - 1.0).abs() < 1e-9, "{values:?}");
            assert!(distance(&a, &a, Metric::Cosine).unwrap() < 1e-9, "{values:?}");
        }

        let d = distance(&emb(&[1e-11, 0.0]), &emb(&[1.0, 0.0]), Metric::Cosine).unwrap();
        assert!(d < 1e-9);
    }

    #[test]
    fn normalize_zero_vector_stays_zero() {
        let zeros = Array1::<f32>::zeros(128);
        let n = normalize(zeros.view());
        assert_eq!(n.len(), 128);
        assert!(n.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn self_distance_is_zero() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let a = random_embedding(&mut rng, 128);
            assert!(distance(&a, &a, Metric::Cosine).unwrap() < 1e-12);
            assert_eq!(distance(&a, &a, Metric::Euclidean).unwrap(), 0.0);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let a = random_embedding(&mut rng, 64);
            let b = random_embedding(&mut rng, 64);
            for metric in [Metric::Euclidean, Metric::Cosine] {
                let ab = distance(&a, &b, metric).unwrap();
                let ba = distance(&b, &a, metric).unwrap();
                assert!(ab >= 0.0);
                assert!((ab - ba).abs() < 1e-12, "{metric:?}: {ab} vs {ba}");
            }
        }
    }

    #[test]
    fn euclidean_known_value() {
        let d = distance(&emb(&[0.0, 0.0]), &emb(&[3.0, 4.0]), Metric::Euclidean).unwrap();
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_ignores_magnitude() {
        let d = distance(&emb(&[1.0, 2.0]), &emb(&[10.0, 20.0]), Metric::Cosine).unwrap();
        assert!(d < 1e-12);

        let opposite = distance(&emb(&[1.0, 0.0]), &emb(&[-1.0, 0.0]), Metric::Cosine).unwrap();
        assert!((opposite - 2.0).abs() < 1e-12);
    }

    #[test]
    fn threshold_is_strict() {
        for metric in [Metric::Euclidean, Metric::Cosine] {
            assert!(decide(0.5999, 0.6, metric).verified);
            assert!(!decide(0.6, 0.6, metric).verified);
            assert!(!decide(0.6001, 0.6, metric).verified);
        }

        let t = ModelProfile::ArcFace.threshold();
        assert!(!decide(t, t, Metric::Cosine).verified);
    }

    #[test]
    fn confidence_is_bounded_and_monotone() {
        for metric in [Metric::Euclidean, Metric::Cosine] {
            let mut previous = f64::INFINITY;
            for step in 0..=300 {
                let d = step as f64 * 0.01;
                let c = decide(d, 0.5, metric).confidence;
                assert!((0.0..=1.0).contains(&c));
                assert!(c <= previous);
                previous = c;
            }
        }
        assert_eq!(confidence(0.5, Metric::Euclidean), 0.75);
        assert_eq!(confidence(0.5, Metric::Cosine), 0.5);
        assert_eq!(confidence(2.5, Metric::Euclidean), 0.0);
    }

    #[test]
    fn zero_embeddings_match_under_euclidean() {
        let a = emb(&[0.0; 128]);
        let b = emb(&[0.0; 128]);

        let result = verify(&a, &b, ModelProfile::DlibResnet).unwrap();
        assert_eq!(result.distance, 0.0);
        assert!(result.verified);
        assert_eq!(result.threshold, 0.6);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn orthogonal_vectors_do_not_match() {
        let d = distance(&emb(&[1.0, 0.0]), &emb(&[0.0, 1.0]), Metric::Cosine).unwrap();
        let result = decide(d, 0.38, Metric::Cosine);

        assert!((result.distance - 1.0).abs() < 1e-12);
        assert!(!result.verified);
        assert!(result.confidence.abs() < 1e-12);
    }

    #[test]
    fn identical_vectors_match_under_cosine() {
        let result = verify(&emb(&[1.0, 0.0]), &emb(&[1.0, 0.0]), ModelProfile::ArcFace).unwrap();

        assert_eq!(result.distance, 0.0);
        assert!(result.verified);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn zero_vector_under_cosine_is_total() {
        let d = distance(&emb(&[0.0, 0.0]), &emb(&[1.0, 0.0]), Metric::Cosine).unwrap();
        assert_eq!(d, 1.0);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let err = distance(&emb(&[1.0, 2.0]), &emb(&[1.0]), Metric::Euclidean).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidEmbedding(_)));

        let err = distance(&emb(&[]), &emb(&[]), Metric::Cosine).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidEmbedding(_)));

        let err = distance(&emb(&[f32::NAN]), &emb(&[1.0]), Metric::Cosine).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidEmbedding(_)));
    }
}
