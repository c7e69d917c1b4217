//! Folded matching keys for layer identifiers.

/// Fold a raw identifier into its matching key.
///
/// Lowercases, strips Portuguese diacritics, and collapses every run of
/// non-alphanumeric characters into a single `_`.
///
/// ```
/// use interdictus::labels::fold_key;
///
/// assert_eq!(fold_key("  Terras--Indígenas__PA "), "terras_indigenas_pa");
/// ```
pub fn fold_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = fold_diacritic(c);
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// A folded identifier with its tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerKey {
    folded: String,
}

impl LayerKey {
    pub fn new(raw: &str) -> Self {
        Self {
            folded: fold_key(raw),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.folded
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.folded.contains(needle)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.folded.split('_').filter(|t| !t.is_empty())
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.tokens().any(|t| t == token)
    }

    /// Whether any token begins with `prefix` (`ucfederal` for `uc`).
    pub fn has_token_prefix(&self, prefix: &str) -> bool {
        self.tokens().any(|t| t.starts_with(prefix))
    }

    /// Trailing two-letter token, uppercased, when the key has more than one token.
    pub fn region(&self) -> Option<String> {
        let tokens: Vec<&str> = self.tokens().collect();
        match tokens.as_slice() {
            [_, .., last] if last.len() == 2 && last.chars().all(|c| c.is_ascii_alphabetic()) => {
                Some(last.to_ascii_uppercase())
            }
            _ => None,
        }
    }
}
