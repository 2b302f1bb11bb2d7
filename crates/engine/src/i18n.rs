//! Message catalogs and placeholder rendering.
//!
//! Catalogs are flat JSON objects (`locales/active.<lang>.json`) mapping a message
//! id to a template. Placeholders are written as `{Name}`.

use std::collections::HashMap;

use goldie_common::error::AppError;

/// Looks up and renders a localized message.
pub trait Localizer: Send + Sync {
    /// Render `message_id` in `language`, substituting `args`.
    fn render(
        &self,
        language: &str,
        message_id: &str,
        args: &[(&str, &str)],
    ) -> Result<String, AppError>;

    /// Whether a catalog exists for `language`.
    fn supports(&self, language: &str) -> bool;
}

const EMBEDDED: &[(&str, &str)] = &[
    ("en", include_str!("../../../locales/active.en.json")),
    ("ru", include_str!("../../../locales/active.ru.json")),
];

/// In-memory catalog keyed by language, falling back to a default language.
#[derive(Debug, Clone)]
pub struct Catalog {
    default_language: String,
    messages: HashMap<String, HashMap<String, String>>,
}

impl Catalog {
    /// Catalogs shipped with the binary.
    pub fn embedded(default_language: &str) -> Result<Self, AppError> {
        Self::from_json(default_language, EMBEDDED)
    }

    /// Build from `(language, json)` pairs.
    pub fn from_json(default_language: &str, sources: &[(&str, &str)]) -> Result<Self, AppError> {
        let mut messages = HashMap::with_capacity(sources.len());
        for (language, json) in sources {
            let catalog: HashMap<String, String> = serde_json::from_str(json).map_err(|e| {
                AppError::Localization(format!("Invalid catalog for '{language}': {e}"))
            })?;
            messages.insert((*language).to_string(), catalog);
        }

        if !messages.contains_key(default_language) {
            return Err(AppError::Config(format!(
                "No catalog for default language '{default_language}'"
            )));
        }

        Ok(Self {
            default_language: default_language.to_string(),
            messages,
        })
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    fn template(&self, language: &str, message_id: &str) -> Option<&str> {
        self.messages
            .get(language)
            .and_then(|catalog| catalog.get(message_id))
            .or_else(|| {
                self.messages
                    .get(&self.default_language)
                    .and_then(|catalog| catalog.get(message_id))
            })
            .map(String::as_str)
    }
}

impl Localizer for Catalog {
    fn render(
        &self,
        language: &str,
        message_id: &str,
        args: &[(&str, &str)],
    ) -> Result<String, AppError> {
        let template = self.template(language, message_id).ok_or_else(|| {
            AppError::Localization(format!("Unknown message '{message_id}' for '{language}'"))
        })?;

        substitute(template, args)
            .map_err(|name| AppError::Localization(format!("Missing '{name}' for '{message_id}'")))
    }

    fn supports(&self, language: &str) -> bool {
        self.messages.contains_key(language)
    }
}

/// Replace every `{Name}` in `template`. Returns the first unknown name on failure.
fn substitute(template: &str, args: &[(&str, &str)]) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let name = &after[..end];
        let value = args
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| name.to_string())?;
        out.push_str(value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Language for an interaction: the stored choice, then the platform's language
/// when a catalog exists for it, then the default.
pub fn resolve_language(
    localizer: &dyn Localizer,
    stored: Option<&str>,
    platform: Option<&str>,
    default: &str,
) -> String {
    [stored, platform]
        .into_iter()
        .flatten()
        .find(|language| !language.is_empty() && localizer.supports(language))
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::from_json(
            "en",
            &[
                ("en", r#"{"hello": "Hello, {Name}!", "only_en": "English only"}"#),
                ("ru", r#"{"hello": "Привет, {Name}!"}"#),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let text = catalog().render("ru", "hello", &[("Name", "Goldie")]).unwrap();
        assert_eq!(text, "Привет, Goldie!");
    }

    #[test]
    fn test_missing_message_falls_back_to_default_language() {
        let text = catalog().render("ru", "only_en", &[]).unwrap();
        assert_eq!(text, "English only");
    }

    #[test]
    fn test_unknown_language_uses_default() {
        let text = catalog().render("de", "hello", &[("Name", "x")]).unwrap();
        assert_eq!(text, "Hello, x!");
    }

    #[test]
    fn test_unknown_message_is_an_error() {
        assert!(catalog().render("en", "nope", &[]).is_err());
    }

    #[test]
    fn test_missing_placeholder_is_an_error() {
        assert!(catalog().render("en", "hello", &[]).is_err());
    }

    #[test]
    fn test_default_language_must_exist() {
        assert!(Catalog::from_json("kg", &[("en", "{}")]).is_err());
    }

    #[test]
    fn test_embedded_catalogs_share_keys() {
        let en: HashMap<String, String> = serde_json::from_str(EMBEDDED[0].1).unwrap();
        let ru: HashMap<String, String> = serde_json::from_str(EMBEDDED[1].1).unwrap();
        let mut en_keys: Vec<_> = en.keys().collect();
        let mut ru_keys: Vec<_> = ru.keys().collect();
        en_keys.sort();
        ru_keys.sort();
        assert_eq!(en_keys, ru_keys);
    }

    #[test]
    fn test_resolve_language() {
        let catalog = catalog();
        assert_eq!(resolve_language(&catalog, Some("ru"), Some("en"), "en"), "ru");
        assert_eq!(resolve_language(&catalog, None, Some("ru"), "en"), "ru");
        assert_eq!(resolve_language(&catalog, None, Some("de"), "en"), "en");
        assert_eq!(resolve_language(&catalog, Some(""), None, "en"), "en");
    }
}
