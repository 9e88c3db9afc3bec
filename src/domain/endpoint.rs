use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol family a model may be probed against (§4.1, glossary).
///
/// A closed, small tagged sum — deliberately not an open-world trait object
/// (§9 "Polymorphism across endpoint families").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointType {
    Chat,
    Claude,
    Gemini,
    Codex,
    Image,
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndpointType::Chat => "CHAT",
            EndpointType::Claude => "CLAUDE",
            EndpointType::Gemini => "GEMINI",
            EndpointType::Codex => "CODEX",
            EndpointType::Image => "IMAGE",
        };
        f.write_str(s)
    }
}

/// Classify a model name into the endpoint variants that should be probed
/// (§4.1 "Classification of a model name").
pub fn classify_model(model_name: &str) -> Vec<EndpointType> {
    let lower = model_name.to_lowercase();

    if lower.contains("codex") {
        return vec![EndpointType::Codex];
    }

    if is_image_model(&lower) {
        return vec![EndpointType::Image];
    }

    let mut variants = vec![EndpointType::Chat];
    if lower.contains("claude") {
        variants.push(EndpointType::Claude);
    } else if lower.contains("gemini") {
        variants.push(EndpointType::Gemini);
    } else if gpt5_codex_pattern().is_match(&lower) {
        variants.push(EndpointType::Codex);
    }
    variants
}

fn is_image_model(lower: &str) -> bool {
    image_pattern().is_match(lower)
}

fn image_pattern() -> &'static regex::Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"dall-e|dalle|image|midjourney|stable-diffusion|sd-|sdxl|flux|ideogram|playground",
        )
        .expect("static regex is valid")
    })
}

fn gpt5_codex_pattern() -> &'static regex::Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"gpt-5\.[123]").expect("static regex is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_chat_model() {
        assert_eq!(classify_model("gpt-4o"), vec![EndpointType::Chat]);
    }

    #[test]
    fn claude_model_gets_chat_and_claude() {
        assert_eq!(
            classify_model("claude-sonnet-4"),
            vec![EndpointType::Chat, EndpointType::Claude]
        );
    }

    #[test]
    fn gemini_model_gets_chat_and_gemini() {
        assert_eq!(
            classify_model("gemini-2.0-flash"),
            vec![EndpointType::Chat, EndpointType::Gemini]
        );
    }

    #[test]
    fn gpt5_dot_x_gets_codex_variant() {
        assert_eq!(
            classify_model("gpt-5.2-preview"),
            vec![EndpointType::Chat, EndpointType::Codex]
        );
    }

    #[test]
    fn gpt5_dot_0_does_not_match() {
        assert_eq!(classify_model("gpt-5.0"), vec![EndpointType::Chat]);
    }

    #[test]
    fn codex_name_is_codex_only() {
        assert_eq!(classify_model("gpt-5-codex"), vec![EndpointType::Codex]);
    }

    #[test]
    fn image_model_is_image_only() {
        for name in ["dall-e-3", "stable-diffusion-xl", "flux-pro", "some-sdxl-model"] {
            assert_eq!(classify_model(name), vec![EndpointType::Image], "{name}");
        }
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(
            classify_model("Claude-3.5-Sonnet"),
            vec![EndpointType::Chat, EndpointType::Claude]
        );
    }
}
