pub mod cleanup;

use anyhow::{anyhow, Context, Result};
use minijinja::{context, Environment, Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub use cleanup::{assistant_reply, extract_code_block, ASSISTANT_MARKER, STOP_SEQS};

const CHAT_TEMPLATE_NAME: &str = "hf_chat_template";

/// ChatML, as used by Hermes-2-Pro. Only applied when the snapshot ships no template.
const CHATML_TEMPLATE: &str = r"{{ bos_token }}{% for message in messages %}{{ '<|im_start|>' ~ message.role ~ '\n' ~ message.content ~ '<|im_end|>\n' }}{% endfor %}{% if add_generation_prompt %}{{ '<|im_start|>assistant\n' }}{% endif %}";

/// One role/content turn. Roles are not validated; whatever the caller sends
/// reaches the template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

pub struct ChatTemplate {
    env: Environment<'static>,
    bos_token: String,
    eos_token: String,
}

impl std::fmt::Debug for ChatTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTemplate")
            .field("bos_token", &self.bos_token)
            .field("eos_token", &self.eos_token)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    chat_template: Option<TemplateField>,
    #[serde(default)]
    bos_token: Option<SpecialToken>,
    #[serde(default)]
    eos_token: Option<SpecialToken>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TemplateField {
    Single(String),
    Named(Vec<NamedTemplate>),
}

#[derive(Deserialize)]
struct NamedTemplate {
    name: String,
    template: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecialToken {
    Text(String),
    Added { content: String },
}

impl SpecialToken {
    fn into_content(self) -> String {
        match self {
            SpecialToken::Text(s) => s,
            SpecialToken::Added { content } => content,
        }
    }
}

impl TemplateField {
    fn pick_default(self) -> Option<String> {
        match self {
            TemplateField::Single(src) => Some(src),
            TemplateField::Named(mut list) => {
                let idx = list.iter().position(|t| t.name == "default").unwrap_or(0);
                if list.is_empty() {
                    None
                } else {
                    Some(list.swap_remove(idx).template)
                }
            }
        }
    }
}

impl ChatTemplate {
    pub fn new(source: String, bos_token: &str, eos_token: &str) -> Result<Self> {
        // Compiled once per process; the environment needs a 'static source.
        let template_src: &'static str = Box::leak(source.into_boxed_str());

        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_function("raise_exception", |msg: String| -> Result<String, Error> {
            Err(Error::new(ErrorKind::InvalidOperation, msg))
        });
        env.add_template(CHAT_TEMPLATE_NAME, template_src)
            .map_err(|e| anyhow!("failed to compile chat template: {e}"))?;

        Ok(Self {
            env,
            bos_token: bos_token.to_string(),
            eos_token: eos_token.to_string(),
        })
    }

    pub fn chatml(bos_token: &str, eos_token: &str) -> Result<Self> {
        Self::new(CHATML_TEMPLATE.to_string(), bos_token, eos_token)
    }

    /// Parses a `tokenizer_config.json` body. Falls back to ChatML when it
    /// carries no `chat_template`.
    pub fn from_tokenizer_config(raw: &str) -> Result<Self> {
        let cfg: TokenizerConfig =
            serde_json::from_str(raw).context("invalid tokenizer_config.json")?;

        let bos = cfg.bos_token.map(SpecialToken::into_content).unwrap_or_default();
        let eos = cfg.eos_token.map(SpecialToken::into_content).unwrap_or_default();

        match cfg.chat_template.and_then(TemplateField::pick_default) {
            Some(src) => Self::new(src, &bos, &eos),
            None => {
                warn!("tokenizer_config.json has no chat_template; using chatml");
                Self::chatml(&bos, &eos)
            }
        }
    }

    /// Resolution order: explicit template file, snapshot tokenizer config,
    /// built-in ChatML.
    pub fn load(tokenizer_config: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let base = match tokenizer_config {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::from_tokenizer_config(&raw)?
            }
            None => Self::chatml("", "")?,
        };

        let Some(path) = override_path else {
            return Ok(base);
        };

        if !path.exists() {
            warn!(
                target = "conversation",
                path = %path.display(),
                "CHAT_TEMPLATE_PATH does not exist"
            );
            return Ok(base);
        }

        let src = fs::read_to_string(path)
            .with_context(|| format!("failed to read chat template {}", path.display()))?;
        info!(path = %path.display(), "using chat template override");
        Self::new(src, &base.bos_token, &base.eos_token)
    }

    pub fn render(&self, messages: &[ChatMessage], add_generation_prompt: bool) -> Result<String> {
        let tmpl = self
            .env
            .get_template(CHAT_TEMPLATE_NAME)
            .map_err(|e| anyhow!("chat template missing: {e}"))?;

        tmpl.render(context! {
            messages => messages,
            bos_token => &self.bos_token,
            eos_token => &self.eos_token,
            add_generation_prompt => add_generation_prompt,
        })
        .map_err(|e| anyhow!("chat template rendering failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn turns() -> Vec<ChatMessage> {
        vec![ChatMessage::system("S"), ChatMessage::user("U")]
    }

    #[test]
    fn chatml_renders_turns_and_generation_prompt() {
        let tmpl = ChatTemplate::chatml("<s>", "</s>").unwrap();
        let out = tmpl.render(&turns(), true).unwrap();
        assert_eq!(
            out,
            "<s><|im_start|>system\nS<|im_end|>\n<|im_start|>user\nU<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn chatml_without_generation_prompt() {
        let tmpl = ChatTemplate::chatml("", "").unwrap();
        let out = tmpl.render(&turns(), false).unwrap();
        assert!(!out.ends_with(ASSISTANT_MARKER));
        assert!(out.ends_with("U<|im_end|>\n"));
    }

    #[test]
    fn tokenizer_config_prefers_default_named_template() {
        let raw = r#"{
            "bos_token": "<|begin_of_text|>",
            "eos_token": {"content": "<|im_end|>", "lstrip": false},
            "chat_template": [
                {"name": "tool_use", "template": "TOOLS"},
                {"name": "default", "template": "{{ bos_token }}{% for m in messages %}[{{ m.role }}]{% endfor %}"}
            ]
        }"#;
        let tmpl = ChatTemplate::from_tokenizer_config(raw).unwrap();
        assert_eq!(tmpl.eos_token, "<|im_end|>");
        let out = tmpl.render(&turns(), true).unwrap();
        assert_eq!(out, "<|begin_of_text|>[system][user]");
    }

    #[test]
    fn tokenizer_config_without_template_falls_back_to_chatml() {
        let raw = r#"{"bos_token": null, "eos_token": "</s>"}"#;
        let tmpl = ChatTemplate::from_tokenizer_config(raw).unwrap();
        let out = tmpl.render(&turns(), true).unwrap();
        assert!(out.starts_with("<|im_start|>system\nS"));
        assert!(out.ends_with(ASSISTANT_MARKER));
    }

    #[test]
    fn raise_exception_surfaces_as_error() {
        let tmpl = ChatTemplate::new(
            "{{ raise_exception('roles must alternate') }}".to_string(),
            "",
            "",
        )
        .unwrap();
        let err = tmpl.render(&turns(), true).unwrap_err();
        assert!(err.to_string().contains("roles must alternate"));
    }

    #[test]
    fn override_file_replaces_snapshot_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_template.jinja");
        fs::write(&path, "{% for m in messages %}{{ m.content }};{% endfor %}").unwrap();

        let tmpl = ChatTemplate::load(None, Some(&path)).unwrap();
        assert_eq!(tmpl.render(&turns(), true).unwrap(), "S;U;");
    }
}
