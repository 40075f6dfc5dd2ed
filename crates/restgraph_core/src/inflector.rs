//! English pluralization for collection paths and collection keys.

/// Turns a singular resource name into its plural form.
pub trait Inflector: Send + Sync {
    /// Pluralizes a lowercase singular word.
    fn pluralize(&self, singular: &str) -> String;
}

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("ox", "oxen"),
    ("quiz", "quizzes"),
];

const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "news",
    "metadata",
];

// Words whose -f / -fe ending becomes -ves.
const VES: &[&str] = &[
    "leaf", "loaf", "wolf", "half", "shelf", "knife", "wife", "life", "calf", "thief",
];

/// Rule-based English inflector.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishInflector;

impl EnglishInflector {
    /// Creates the inflector.
    pub fn new() -> Self {
        Self
    }
}

impl Inflector for EnglishInflector {
    fn pluralize(&self, singular: &str) -> String {
        if singular.is_empty() {
            return String::new();
        }
        let lower = singular.to_lowercase();

        if UNCOUNTABLE.contains(&lower.as_str()) {
            return singular.to_string();
        }
        if let Some((_, plural)) = IRREGULAR.iter().find(|(s, _)| *s == lower) {
            return (*plural).to_string();
        }
        if VES.contains(&lower.as_str()) {
            let stem = singular
                .strip_suffix("fe")
                .or_else(|| singular.strip_suffix('f'))
                .unwrap_or(singular);
            return format!("{stem}ves");
        }

        if let Some(stem) = singular.strip_suffix('y') {
            let before = stem.chars().last();
            if before.is_some_and(|c| !"aeiou".contains(c)) {
                return format!("{stem}ies");
            }
        }

        if ["s", "x", "z", "ch", "sh"].iter().any(|end| lower.ends_with(end)) {
            return format!("{singular}es");
        }

        format!("{singular}s")
    }
}
