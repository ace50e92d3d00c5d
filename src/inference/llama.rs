use anyhow::{anyhow, Context, Result};
use candle::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{
    Cache, Config as LlamaModelConfig, Llama, LlamaConfig, LlamaEosToks,
};
use std::fs;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::conversation::{ChatMessage, ChatTemplate, STOP_SEQS};
use crate::inference::snapshot::{self, SnapshotFiles};
use crate::inference::{ChatModel, Generation, GenerationParams};

// ---------------------------------------------------------
// PUBLIC SERVICE
// ---------------------------------------------------------
pub struct LlamaHost {
    model_id: String,
    model: Llama,
    model_cfg: LlamaModelConfig,
    tokenizer: Tokenizer,
    template: ChatTemplate,
    device: Device,
    dtype: DType,
    eos_ids: Vec<u32>,
}

impl LlamaHost {
    /// Resolves the snapshot (local dir or hub) and loads it. Blocking.
    pub fn load(cfg: &Config) -> Result<Self> {
        cfg.warn_inert_flags();
        let files = snapshot::resolve(cfg)?;
        Self::load_from(cfg, &files)
    }

    pub fn load_from(cfg: &Config, files: &SnapshotFiles) -> Result<Self> {
        let device = Device::cuda_if_available(cfg.cuda_device)?;
        let dtype = if device.is_cuda() {
            DType::BF16
        } else {
            DType::F32
        };
        info!(model_id = %cfg.model_id, ?device, ?dtype, "loading model");

        // ---- Tokenizer ----
        let tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| anyhow!("tokenizer error: {e}"))?;
        check_tokenizer_round_trip(&tokenizer);

        // ---- Chat template ----
        let template = ChatTemplate::load(
            files.tokenizer_config.as_deref(),
            cfg.chat_template_path.as_deref(),
        )?;

        // ---- Config ----
        let raw_cfg = fs::read(&files.config)
            .with_context(|| format!("failed to read {}", files.config.display()))?;
        let llama_cfg: LlamaConfig =
            serde_json::from_slice(&raw_cfg).context("invalid llama config.json")?;
        let model_cfg = llama_cfg.into_config(false);

        let eos_ids = collect_eos_ids(model_cfg.eos_token_id.as_ref(), |t| tokenizer.token_to_id(t));
        debug!(?eos_ids, "eos tokens");

        // ---- mmap the weights ----
        info!(shards = files.weights.len(), "mapping safetensors");
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)? };
        let model = Llama::load(vb, &model_cfg)?;

        info!(model_id = %cfg.model_id, "model and tokenizer loaded");

        Ok(Self {
            model_id: cfg.model_id.clone(),
            model,
            model_cfg,
            tokenizer,
            template,
            device,
            dtype,
            eos_ids,
        })
    }
}

impl ChatModel for LlamaHost {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn render_chat(&self, messages: &[ChatMessage]) -> Result<String> {
        self.template.render(messages, true)
    }

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation> {
        let started = Instant::now();

        // The template already emits BOS.
        let enc = self
            .tokenizer
            .encode(prompt, false)
            .map_err(|e| anyhow!("tokenizer encode error: {e}"))?;
        let mut tokens = enc.get_ids().to_vec();
        let prompt_len = tokens.len();

        let mut cache = Cache::new(true, self.dtype, &self.model_cfg, &self.device)?;
        let mut lp = LogitsProcessor::new(params.seed, params.temperature, params.top_p);
        let mut pos = 0usize;

        for _ in 0..params.max_new_tokens {
            if pos >= self.model_cfg.max_position_embeddings {
                warn!(pos, "context window exhausted");
                break;
            }

            // first step: whole prompt; later: last token only
            let ctx: &[u32] = if pos == 0 {
                &tokens
            } else {
                &tokens[tokens.len() - 1..]
            };

            let input = Tensor::new(ctx, &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .forward(&input, pos, &mut cache)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;

            pos += ctx.len();

            let next_id = lp.sample(&logits)?;
            if self.eos_ids.contains(&next_id) {
                break;
            }
            tokens.push(next_id);
        }

        let generated_tokens = tokens.len() - prompt_len;
        let text = self
            .tokenizer
            .decode(&tokens, false)
            .map_err(|e| anyhow!("tokenizer decode error: {e}"))?;

        Ok(Generation {
            text,
            generated_tokens,
            elapsed: started.elapsed(),
        })
    }
}

// ---------------------------------------------------------
// Helpers
// ---------------------------------------------------------
/// Configured EOS ids plus every stop sequence the vocabulary knows, so
/// decoding halts on the same markers `assistant_reply` cuts at.
fn collect_eos_ids<F>(configured: Option<&LlamaEosToks>, lookup: F) -> Vec<u32>
where
    F: Fn(&str) -> Option<u32>,
{
    let mut ids = match configured {
        Some(LlamaEosToks::Single(id)) => vec![*id],
        Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
        None => Vec::new(),
    };

    for token in STOP_SEQS {
        if let Some(id) = lookup(token) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    ids
}

/// Catches byte-fallback decoding regressions early.
fn check_tokenizer_round_trip(tokenizer: &Tokenizer) {
    let decoded = tokenizer
        .encode("😊", false)
        .and_then(|enc| tokenizer.decode(enc.get_ids(), false));

    match decoded {
        Ok(text) if !text.contains('\u{FFFD}') => debug!(%text, "tokenizer round-trip ok"),
        Ok(text) => warn!(%text, "tokenizer emits replacement characters"),
        Err(e) => warn!(error = %e, "tokenizer round-trip failed"),
    }
}
