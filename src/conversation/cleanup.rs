//! Post-processing of decoded model output.

pub const ASSISTANT_MARKER: &str = "<|im_start|>assistant\n";
/// Turn terminators for ChatML and Llama-3 vocabularies. Generation stops on
/// these tokens and replies are cut at them.
pub const STOP_SEQS: &[&str] = &["<|im_end|>", "<|eot_id|>", "<|end_of_text|>", "</s>"];

const FENCE: &str = "```";
const FENCE_OPENERS: &[&str] = &["```javascript", "```js"];

/// Returns what follows the last assistant marker, cut at the first stop
/// sequence. Text without a marker is returned whole: the decoder may have
/// dropped special tokens, and the reply is then the only usable content.
pub fn assistant_reply(decoded: &str) -> &str {
    let reply = match decoded.rfind(ASSISTANT_MARKER) {
        Some(idx) => &decoded[idx + ASSISTANT_MARKER.len()..],
        None => decoded,
    };

    let end = STOP_SEQS
        .iter()
        .filter_map(|seq| reply.find(seq))
        .min()
        .unwrap_or(reply.len());

    &reply[..end]
}

/// Pulls JavaScript out of a fenced block and trims it. Prose before the
/// opener and after the closer is discarded.
pub fn extract_code_block(reply: &str) -> &str {
    let mut body = reply;

    if let Some((idx, len)) = find_opener(body) {
        let rest = &body[idx + len..];
        // drop the remainder of the info-string line
        body = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest,
        };
    }

    if let Some(end) = body.find(FENCE) {
        body = &body[..end];
    }

    body.trim()
}

/// Earliest opener whose info string is exactly one of `FENCE_OPENERS`, so
/// `json` or `jsx` blocks are skipped.
fn find_opener(text: &str) -> Option<(usize, usize)> {
    FENCE_OPENERS
        .iter()
        .filter_map(|o| {
            text.match_indices(o)
                .map(|(idx, m)| (idx, m.len()))
                .find(|(idx, len)| {
                    text[idx + len..]
                        .chars()
                        .next()
                        .map_or(true, char::is_whitespace)
                })
        })
        .min_by_key(|(idx, _)| *idx)
}
