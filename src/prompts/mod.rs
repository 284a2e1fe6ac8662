// Prompt template subsystem
//
// Templates are opaque tera documents keyed by name. The gateway resolves a
// name through the cascading resolver and renders it with stage-supplied
// bindings; nothing in the pipeline depends on template wording.

pub mod builtin;
pub mod resolver;

pub use resolver::{PromptResolver, PromptSource, ResolvedPrompt};

use anyhow::{Context, Result};

/// Resolve a named template and render it with the given bindings
pub fn render_prompt(
    resolver: &mut PromptResolver,
    name: &str,
    bindings: &tera::Context,
) -> Result<String> {
    let template = resolver.resolve(name)?;
    tera::Tera::one_off(&template.content, bindings, false)
        .with_context(|| format!("Failed to render prompt template '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_classify_prompt() {
        let mut resolver = PromptResolver::new();
        let mut bindings = tera::Context::new();
        bindings.insert("prompt", "I want to build a note-taking app for students");

        let rendered = render_prompt(&mut resolver, builtin::CLASSIFY_INTENT, &bindings).unwrap();
        assert!(rendered.contains("note-taking app for students"));
    }

    #[test]
    fn test_render_unknown_template_fails() {
        let mut resolver = PromptResolver::new();
        let bindings = tera::Context::new();

        let result = render_prompt(&mut resolver, "no_such_template", &bindings);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_missing_binding_fails() {
        // classify_intent requires a `prompt` binding
        let mut resolver = PromptResolver::new();
        let bindings = tera::Context::new();

        let result = render_prompt(&mut resolver, builtin::CLASSIFY_INTENT, &bindings);
        assert!(result.is_err());
    }
}
