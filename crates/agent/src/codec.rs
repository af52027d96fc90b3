//! Response protocol codec.
//!
//! The model is told to answer with exactly one JSON step per turn. Anything
//! that does not parse as a step becomes the final answer, verbatim.

use codeloop_core::step::Step;

/// The result of decoding one model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The text was a well-formed step.
    Step(Step),
    /// The text was not a step; it is carried unchanged.
    Fallback(String),
}

impl Decoded {
    /// Collapse into a step, turning fallback text into an `output`.
    pub fn into_step(self) -> Step {
        match self {
            Decoded::Step(step) => step,
            Decoded::Fallback(raw) => Step::Output { content: raw },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Decoded::Fallback(_))
    }
}

/// Decode a raw model turn.
///
/// Surrounding whitespace and a single enclosing ```` ``` ```` / ```` ```json ````
/// fence are ignored. The fallback keeps the original text, untrimmed.
pub fn decode(raw: &str) -> Decoded {
    let candidate = strip_fence(raw.trim());
    match serde_json::from_str::<Step>(candidate) {
        Ok(step) => Decoded::Step(step),
        Err(_) => Decoded::Fallback(raw.to_string()),
    }
}

/// Render a tool result as the assistant turn the model sees next.
pub fn encode_observation(content: &str) -> String {
    let step = Step::Observe {
        content: content.to_string(),
    };
    serde_json::to_string(&step).unwrap_or_else(|_| {
        serde_json::json!({ "step": "observe", "content": content }).to_string()
    })
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening line.
    match body.split_once('\n') {
        Some((info, inner)) if !info.trim_start().starts_with('{') => inner.trim(),
        _ => body.trim(),
    }
}
