//! Catalog of GenAI and ML service domains, keyed to a coarse category used
//! for alert enrichment.
//!
//! Lookup handles subdomains: `cdn.openai.com` matches via its `openai.com`
//! suffix, `copilot-proxy.githubusercontent.com` via the 3-label suffix.

use std::collections::HashMap;

use lazy_static::lazy_static;

lazy_static! {
    static ref AI_DOMAIN_CATEGORIES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        // Major LLM providers
        for d in [
            "openai.com",
            "api.openai.com",
            "chatgpt.com",
            "oaistatic.com",
            "oaiusercontent.com",
            "chat.openai.com",
            "anthropic.com",
            "claude.ai",
            "api.anthropic.com",
            "console.anthropic.com",
            "cohere.ai",
            "api.cohere.ai",
            "mistral.ai",
            "api.mistral.ai",
            "chat.mistral.ai",
            "ai21.com",
            "studio.ai21.com",
            "perplexity.ai",
            "pplx.ai",
            "you.com",
            "phind.com",
            "poe.com",
            "character.ai",
            "inflection.ai",
            "pi.ai",
            "chat.deepseek.com",
            "api.deepseek.com",
            "x.ai",
            "grok.x.ai",
            // Google AI
            "gemini.google.com",
            "bard.google.com",
            "generativelanguage.googleapis.com",
            "ai.google.dev",
            "vertexai.google.com",
            "notebooklm.google.com",
            "aistudio.google.com",
            // Microsoft
            "copilot.microsoft.com",
            "copilot.cloud.microsoft",
            // Meta AI
            "ai.meta.com",
            "llama.meta.com",
        ] {
            m.insert(d, "LLM");
        }
        // Image generation
        for d in [
            "midjourney.com",
            "stability.ai",
            "stable-diffusion.com",
            "clipdrop.co",
            "dreamstudio.ai",
            "leonardo.ai",
            "app.leonardo.ai",
            "ideogram.ai",
            "playground.com",
            "nightcafe.studio",
            "artbreeder.com",
            "hotpot.ai",
            "starryai.com",
            "deep-image.ai",
            "deepdreamgenerator.com",
            "craiyon.com",
            "lexica.art",
            "openart.ai",
            "tensor.art",
            "civitai.com",
            "fal.ai",
            "api.fal.ai",
            "flux.ai",
            "designer.microsoft.com",
        ] {
            m.insert(d, "Image Gen");
        }
        // Video generation
        for d in [
            "runwayml.com",
            "app.runwayml.com",
            "pika.art",
            "sora.com",
            "luma.ai",
            "kaiber.ai",
            "heygen.com",
            "synthesia.io",
            "descript.com",
        ] {
            m.insert(d, "Video Gen");
        }
        // Code assistants
        for d in [
            "githubcopilot.com",
            "copilot-proxy.githubusercontent.com",
            "cursor.sh",
            "cursor.com",
            "tabnine.com",
            "api.tabnine.com",
            "codeium.com",
            "windsurf.com",
            "sourcegraph.com",
            "cody.dev",
            "replit.com",
            "repl.co",
            "gitpod.io",
            "codium.ai",
            "mutable.ai",
            "aider.chat",
            "continue.dev",
            "supermaven.com",
            "bolt.new",
            "v0.dev",
        ] {
            m.insert(d, "Code AI");
        }
        // Audio & speech
        for d in [
            "elevenlabs.io",
            "api.elevenlabs.io",
            "suno.ai",
            "app.suno.ai",
            "udio.com",
            "speechify.com",
            "murf.ai",
            "resemble.ai",
            "play.ht",
            "wellsaidlabs.com",
            "lovo.ai",
            "uberduck.ai",
        ] {
            m.insert(d, "Voice AI");
        }
        // Writing & productivity
        for d in [
            "jasper.ai",
            "writesonic.com",
            "copy.ai",
            "rytr.me",
            "wordtune.com",
            "grammarly.com",
            "notion.so",
            "mem.ai",
            "otter.ai",
            "fireflies.ai",
        ] {
            m.insert(d, "Writing AI");
        }
        // Agent platforms & tooling
        for d in [
            "langchain.com",
            "smith.langchain.com",
            "crewai.com",
            "autogen.microsoft.com",
            "zapier.com",
            "make.com",
            "n8n.io",
            "relevanceai.com",
        ] {
            m.insert(d, "Agent/Tool");
        }
        // ML infrastructure / API providers
        for d in [
            "huggingface.co",
            "hf.co",
            "api-inference.huggingface.co",
            "replicate.com",
            "api.replicate.com",
            "modal.com",
            "together.xyz",
            "api.together.xyz",
            "fireworks.ai",
            "api.fireworks.ai",
            "groq.com",
            "api.groq.com",
            "anyscale.com",
            "baseten.co",
            "banana.dev",
            "deepinfra.com",
            "cerebras.ai",
            "sambanova.ai",
            "octoai.cloud",
            "lepton.ai",
            "wandb.ai",
            "neptune.ai",
            "mlflow.org",
            "kaggle.com",
        ] {
            m.insert(d, "ML Infra");
        }
        // Research
        for d in ["arxiv.org", "paperswithcode.com"] {
            m.insert(d, "Research");
        }
        m
    };
}

/// Category of an AI service domain, or `None` if unknown.
///
/// Matches the exact domain first, then the last-2-label suffix, then the
/// last-3-label suffix.
pub fn ai_category(domain: &str) -> Option<&'static str> {
    let domain = domain.trim().to_ascii_lowercase();
    if domain.is_empty() {
        return None;
    }
    if let Some(cat) = AI_DOMAIN_CATEGORIES.get(domain.as_str()) {
        return Some(cat);
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() >= 2 {
        let parent = labels[labels.len() - 2..].join(".");
        if let Some(cat) = AI_DOMAIN_CATEGORIES.get(parent.as_str()) {
            return Some(cat);
        }
    }
    if labels.len() >= 3 {
        let grandparent = labels[labels.len() - 3..].join(".");
        if let Some(cat) = AI_DOMAIN_CATEGORIES.get(grandparent.as_str()) {
            return Some(cat);
        }
    }
    None
}

pub fn is_ai_domain(domain: &str) -> bool {
    ai_category(domain).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert_eq!(ai_category("claude.ai"), Some("LLM"));
        assert_eq!(ai_category("midjourney.com"), Some("Image Gen"));
    }

    #[test]
    fn subdomain_matches_via_two_label_suffix() {
        assert_eq!(ai_category("chat.api.openai.com"), Some("LLM"));
        assert_eq!(ai_category("cdn.openai.com"), Some("LLM"));
    }

    #[test]
    fn three_label_suffix() {
        assert!(is_ai_domain("eu.api-inference.huggingface.co"));
    }

    #[test]
    fn case_and_whitespace_insensitive() {
        assert!(is_ai_domain("  API.OpenAI.com "));
    }

    #[test]
    fn unknown_domains_do_not_match() {
        assert!(!is_ai_domain("example.com"));
        assert!(!is_ai_domain(""));
        assert!(!is_ai_domain("internal.corp"));
    }
}
