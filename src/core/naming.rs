//! QG-006: Naming conventions for generated identifiers.
//!
//! Result variables and parameter fields use the snake_case form of a type
//! name, pluralized for collections. [`ResultNames`] keeps every name in one
//! plan unique.

use regex::Regex;
use rustc_hash::FxHashSet;
use std::sync::OnceLock;

/// Names the generated body already uses for its own bindings.
pub const RESERVED_NAMES: &[&str] = &[
    "params", "cx", "tx", "self", "order", "this", "arg", "outcome",
];

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "gen",
    "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern"))
}

/// Whether `name` is a plain identifier.
pub fn is_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

/// Whether `name` is a Rust keyword.
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Whether `name` cannot be a parameter or result binding: a keyword, a
/// name the generated body binds itself, or a `task_N` handle.
pub fn is_reserved(name: &str) -> bool {
    is_keyword(name)
        || RESERVED_NAMES.contains(&name)
        || name
            .strip_prefix("task_")
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// `GetUserWithPosts` → `get_user_with_posts`, `UserID` → `user_id`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower);
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// English plural of a snake_case word: `post` → `posts`, `category` → `categories`.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{}es", word);
    }
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", word)
}

/// Default result variable for a return type.
pub fn result_var_for(type_name: &str, collection: bool) -> String {
    let base = to_snake_case(type_name);
    if collection {
        pluralize(&base)
    } else {
        base
    }
}

/// Allocator for collision-free names within one plan.
#[derive(Debug, Clone)]
pub struct ResultNames {
    taken: FxHashSet<String>,
}

impl Default for ResultNames {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultNames {
    pub fn new() -> Self {
        let taken = RESERVED_NAMES
            .iter()
            .chain(KEYWORDS.iter())
            .map(|s| (*s).to_string())
            .collect();
        Self { taken }
    }

    /// Claim an explicit name. Returns false if it is taken or reserved.
    pub fn claim_explicit(&mut self, name: &str) -> bool {
        self.taken.insert(name.to_string())
    }

    /// Claim `base`, or the first free `base_2`, `base_3`, ...
    pub fn claim_derived(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "value" } else { base };
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 2usize;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
