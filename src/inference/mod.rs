pub mod llama;
pub mod snapshot;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;

use crate::conversation::ChatMessage;

pub use llama::LlamaHost;

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    /// `None` means greedy decoding.
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: u64,
}

impl GenerationParams {
    pub fn d3() -> Self {
        Self {
            max_new_tokens: 2048,
            temperature: Some(0.3),
            top_p: Some(0.9),
            seed: rand::random(),
        }
    }

    pub fn chat() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: None,
            top_p: None,
            seed: rand::random(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Generation {
    /// Prompt echo followed by the generated continuation.
    pub text: String,
    pub generated_tokens: usize,
    pub elapsed: Duration,
}

impl Generation {
    pub fn tokens_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.generated_tokens as f64 / secs
        } else {
            0.0
        }
    }
}

/// A loaded model plus its tokenizer and chat template. Calls block; run them
/// on the blocking pool.
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    fn render_chat(&self, messages: &[ChatMessage]) -> Result<String>;

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation>;
}

/// Holder of the current model. Empty until startup installs one and again
/// after shutdown clears it.
#[derive(Clone, Default)]
pub struct ModelSlot {
    inner: Arc<RwLock<Option<Arc<dyn ChatModel>>>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: Arc<dyn ChatModel>) -> Self {
        let slot = Self::new();
        slot.install(model);
        slot
    }

    pub fn install(&self, model: Arc<dyn ChatModel>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(model);
    }

    pub fn clear(&self) -> Option<Arc<dyn ChatModel>> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.take()
    }

    pub fn current(&self) -> Option<Arc<dyn ChatModel>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl ChatModel for Fixed {
        fn model_id(&self) -> &str {
            "fixed"
        }

        fn render_chat(&self, _messages: &[ChatMessage]) -> Result<String> {
            Ok(String::new())
        }

        fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<Generation> {
            Ok(Generation {
                text: String::new(),
                generated_tokens: 0,
                elapsed: Duration::ZERO,
            })
        }
    }

    #[test]
    fn slot_lifecycle() {
        let slot = ModelSlot::new();
        assert!(!slot.is_ready());

        slot.install(Arc::new(Fixed));
        let shared = slot.clone();
        assert!(shared.is_ready());
        assert_eq!(shared.current().unwrap().model_id(), "fixed");

        assert!(slot.clear().is_some());
        assert!(!shared.is_ready());
        assert!(slot.clear().is_none());
    }

    #[test]
    fn preset_sampling_parameters() {
        let d3 = GenerationParams::d3();
        assert_eq!(d3.max_new_tokens, 2048);
        assert_eq!(d3.temperature, Some(0.3));
        assert_eq!(d3.top_p, Some(0.9));

        let chat = GenerationParams::chat();
        assert_eq!(chat.max_new_tokens, 512);
        assert_eq!(chat.temperature, None);
    }

    #[test]
    fn throughput_handles_zero_elapsed() {
        let g = Generation {
            text: String::new(),
            generated_tokens: 10,
            elapsed: Duration::ZERO,
        };
        assert_eq!(g.tokens_per_sec(), 0.0);

        let g = Generation {
            elapsed: Duration::from_secs(2),
            ..g
        };
        assert_eq!(g.tokens_per_sec(), 5.0);
    }
}
