use crate::{AttestationError, LivenessVerifier};
use quorum_types::AttestationProof;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Ordered fallback over attestation layers.
#[derive(Clone, Default)]
pub struct AttestationVerifier {
    layers: Vec<Arc<dyn LivenessVerifier>>,
}

impl AttestationVerifier {
    pub fn new(layers: Vec<Arc<dyn LivenessVerifier>>) -> Self {
        Self { layers }
    }

    pub fn versions(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.version()).collect()
    }

    /// Check the key `(x, y)` against each layer in order.
    ///
    /// Returns `true` at the first layer that confirms, without querying the
    /// rest. Returns `false` only when every layer rejected the proof. A
    /// layer error aborts the check.
    pub async fn verify_key(&self, x: [u8; 32], y: [u8; 32]) -> Result<bool, AttestationError> {
        let proof = AttestationProof::new(x, y);

        for layer in &self.layers {
            let start = Instant::now();
            let outcome = layer.verify_liveness_proof(&proof).await;
            let latency = start.elapsed().as_secs_f64();

            match outcome {
                Ok(true) => {
                    quorum_metrics::record_attestation_check(layer.version(), true, latency);
                    debug!(version = layer.version(), x = %proof.x, "Liveness proof confirmed");
                    return Ok(true);
                }
                Ok(false) => {
                    quorum_metrics::record_attestation_check(layer.version(), false, latency);
                    debug!(version = layer.version(), x = %proof.x, "Liveness proof rejected");
                }
                Err(source) => {
                    quorum_metrics::record_attestation_check(layer.version(), false, latency);
                    warn!(version = layer.version(), error = %source, "Attestation layer error");
                    return Err(AttestationError::Layer {
                        version: layer.version().to_string(),
                        source,
                    });
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LayerError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Layer {
        version: &'static str,
        answer: Result<bool, LayerError>,
        calls: AtomicUsize,
    }

    impl Layer {
        fn new(version: &'static str, answer: Result<bool, LayerError>) -> Arc<Self> {
            Arc::new(Self {
                version,
                answer,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LivenessVerifier for Layer {
        fn version(&self) -> &str {
            self.version
        }

        async fn verify_liveness_proof(&self, _: &AttestationProof) -> Result<bool, LayerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn verifier(layers: &[Arc<Layer>]) -> AttestationVerifier {
        AttestationVerifier::new(
            layers
                .iter()
                .map(|l| l.clone() as Arc<dyn LivenessVerifier>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_first_passing_layer_wins() {
        let v1 = Layer::new("v1", Ok(false));
        let v2 = Layer::new("v2", Ok(true));
        let v3 = Layer::new("v3", Ok(true));
        let verifier = verifier(&[v1.clone(), v2.clone(), v3.clone()]);

        assert!(verifier.verify_key([1; 32], [2; 32]).await.unwrap());
        assert_eq!((v1.calls(), v2.calls(), v3.calls()), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_all_layers_reject() {
        let layers = [Layer::new("v1", Ok(false)), Layer::new("v2", Ok(false))];
        let verifier = verifier(&layers);

        assert!(!verifier.verify_key([1; 32], [2; 32]).await.unwrap());
        assert!(layers.iter().all(|l| l.calls() == 1));
    }

    #[tokio::test]
    async fn test_layer_error_aborts() {
        let v1 = Layer::new("v1", Err(LayerError::Transport("timeout".into())));
        let v2 = Layer::new("v2", Ok(true));
        let verifier = verifier(&[v1.clone(), v2.clone()]);

        let err = verifier.verify_key([1; 32], [2; 32]).await.unwrap_err();
        assert!(matches!(err, AttestationError::Layer { ref version, .. } if version == "v1"));
        assert_eq!(v2.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_layers_rejects() {
        let verifier = AttestationVerifier::default();
        assert!(!verifier.verify_key([0; 32], [0; 32]).await.unwrap());
    }
}
