//! Entry name sanitization
//!
//! Archive entry names end up as file names on whatever platform imports
//! the archive, so they are normalized on the way in:
//!
//! - `\` is treated as a path separator; empty, `.` and `..` components are dropped
//! - control characters and `< > : " | ? *` are removed
//! - trailing dots and spaces are trimmed
//! - each component is capped at `max_bytes` (on a char boundary)
//! - reserved device names (`CON`, `PRN`, `AUX`, `NUL`, `COM1-9`, `LPT1-9`)
//!   are prefixed with `_`
//! - components that end up empty become `unnamed`
//!
//! Sanitization is idempotent. [`NameRegistry`] adds case-insensitive
//! de-duplication on top by appending `-1`, `-2`, ... before the extension.

use std::collections::HashSet;

/// Replacement for components that sanitize to nothing.
pub const EMPTY_NAME: &str = "unnamed";

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

const RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize an archive path, component by component.
pub fn sanitize_name(name: &str, max_bytes: usize) -> String {
    let components: Vec<String> = name
        .split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != "." && *c != "..")
        .map(|c| sanitize_component(c, max_bytes))
        .collect();

    if components.is_empty() {
        return EMPTY_NAME.to_string();
    }
    components.join("/")
}

fn sanitize_component(component: &str, max_bytes: usize) -> String {
    let stripped: String = component
        .chars()
        .filter(|c| !c.is_control() && !FORBIDDEN.contains(c))
        .collect();

    let mut out = fit(stripped.trim_end_matches(['.', ' ']), max_bytes);
    if is_reserved(&out) {
        out = fit(&format!("_{}", out), max_bytes);
    }
    if out.is_empty() {
        out = EMPTY_NAME.to_string();
    }
    out
}

/// Truncate to `max_bytes` on a char boundary, then trim trailing dots and spaces.
fn fit(s: &str, max_bytes: usize) -> String {
    let mut end = s.len().min(max_bytes);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].trim_end_matches(['.', ' ']).to_string()
}

fn is_reserved(component: &str) -> bool {
    let stem = component.split('.').next().unwrap_or(component);
    RESERVED
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
}

/// Split the last path component into `(prefix, stem, extension)`.
///
/// The extension keeps its leading dot; a leading-dot file has no extension.
fn split_last(name: &str) -> (&str, &str, &str) {
    let (prefix, file) = match name.rfind('/') {
        Some(idx) => name.split_at(idx + 1),
        None => ("", name),
    };
    match file.rfind('.') {
        Some(0) | None => (prefix, file, ""),
        Some(idx) => (prefix, &file[..idx], &file[idx..]),
    }
}

/// Tracks claimed names within one archive and de-duplicates collisions.
#[derive(Debug, Clone)]
pub struct NameRegistry {
    taken: HashSet<String>,
    max_bytes: usize,
}

impl NameRegistry {
    /// Create an empty registry.
    pub fn new(max_bytes: usize) -> Self {
        NameRegistry {
            taken: HashSet::new(),
            max_bytes,
        }
    }

    /// Sanitize `name` and return a variant no earlier claim has used.
    ///
    /// Collisions are case-insensitive, matching the most restrictive
    /// file systems an archive may be extracted on.
    pub fn claim(&mut self, name: &str) -> String {
        let sanitized = sanitize_name(name, self.max_bytes);
        if self.taken.insert(sanitized.to_lowercase()) {
            return sanitized;
        }

        let (prefix, stem, ext) = split_last(&sanitized);
        let mut n: u64 = 1;
        loop {
            let suffix = format!("-{}{}", n, ext);
            let budget = self.max_bytes.saturating_sub(suffix.len());
            let candidate = format!("{}{}{}", prefix, fit(stem, budget), suffix);
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Whether a name (case-insensitively) has already been claimed.
    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(&name.to_lowercase())
    }

    /// Number of claimed names.
    pub fn len(&self) -> usize {
        self.taken.len()
    }

    /// Whether nothing has been claimed yet.
    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MAX: usize = 200;

    #[test]
    fn test_strips_control_and_forbidden() {
        assert_eq!(sanitize_name("a\u{0}b\nc?.png", MAX), "abc.png");
        assert_eq!(sanitize_name("what:is<this>.txt", MAX), "whatisthis.txt");
    }

    #[test]
    fn test_trims_trailing_dots_and_spaces() {
        assert_eq!(sanitize_name("image.png. . ", MAX), "image.png");
        assert_eq!(sanitize_name("...", MAX), EMPTY_NAME);
    }

    #[test]
    fn test_reserved_names() {
        assert_eq!(sanitize_name("CON", MAX), "_CON");
        assert_eq!(sanitize_name("nul.txt", MAX), "_nul.txt");
        assert_eq!(sanitize_name("com1.png", MAX), "_com1.png");
        assert_eq!(sanitize_name("console.png", MAX), "console.png");
        assert_eq!(sanitize_name("CON.", MAX), "_CON");
    }

    #[test]
    fn test_path_components() {
        assert_eq!(
            sanitize_name("assets\\icon/../main.png", MAX),
            "assets/icon/main.png"
        );
        assert_eq!(sanitize_name("/", MAX), EMPTY_NAME);
        assert_eq!(sanitize_name("", MAX), EMPTY_NAME);
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let long = "é".repeat(50);
        let out = sanitize_name(&long, 17);
        assert!(out.len() <= 17);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_registry_passthrough() {
        let mut registry = NameRegistry::new(MAX);
        assert_eq!(registry.claim("assets/a.png"), "assets/a.png");
        assert!(registry.is_taken("ASSETS/A.PNG"));
    }

    #[test]
    fn test_registry_deduplicates() {
        let mut registry = NameRegistry::new(MAX);
        assert_eq!(registry.claim("a.png"), "a.png");
        assert_eq!(registry.claim("a.png"), "a-1.png");
        assert_eq!(registry.claim("A.PNG"), "A-2.PNG");
        assert_eq!(registry.claim("a-1.png"), "a-1-1.png");
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_registry_dedup_without_extension() {
        let mut registry = NameRegistry::new(MAX);
        assert_eq!(registry.claim("readme"), "readme");
        assert_eq!(registry.claim("readme"), "readme-1");
        assert_eq!(registry.claim(".hidden"), ".hidden");
        assert_eq!(registry.claim(".hidden"), ".hidden-1");
    }

    #[test]
    fn test_registry_is_stable() {
        let names = ["x.png", "x.png", "y.png", "x.png"];
        let run = || {
            let mut registry = NameRegistry::new(MAX);
            names.iter().map(|n| registry.claim(n)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
        assert_eq!(run(), vec!["x.png", "x-1.png", "y.png", "x-2.png"]);
    }

    #[test]
    fn test_registry_dedup_respects_length_cap() {
        let mut registry = NameRegistry::new(20);
        let name = format!("{}.png", "a".repeat(16));
        let first = registry.claim(&name);
        let second = registry.claim(&name);
        assert!(first.len() <= 20);
        assert!(second.len() <= 20);
        assert_ne!(first.to_lowercase(), second.to_lowercase());
        assert!(second.ends_with("-1.png"));
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(name in "\\PC{0,64}", max in 16usize..80) {
            let once = sanitize_name(&name, max);
            let twice = sanitize_name(&once, max);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_clean_names_claim_unchanged(name in "[a-z]{1,12}\\.[a-z]{1,4}") {
            prop_assume!(!is_reserved(&name));
            let mut registry = NameRegistry::new(MAX);
            prop_assert_eq!(registry.claim(&name), name);
        }
    }
}
