//! Wildcard intent patterns.
//!
//! `*` matches any run of characters (including none and including dots),
//! `?` matches exactly one character. Everything else is literal.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentPattern {
    source: String,
    chars: Vec<char>,
}

impl IntentPattern {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            chars: source.chars().collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the text contains a wildcard marker.
    pub fn is_wildcard(text: &str) -> bool {
        text.contains(['*', '?'])
    }

    /// Greedy glob match with single-star backtracking; linear in practice.
    pub fn matches(&self, key: &str) -> bool {
        let text: Vec<char> = key.chars().collect();
        let pattern = &self.chars;

        let (mut p, mut t) = (0, 0);
        let mut star: Option<(usize, usize)> = None;

        while t < text.len() {
            match pattern.get(p) {
                Some('?') => {
                    p += 1;
                    t += 1;
                }
                Some('*') => {
                    star = Some((p, t));
                    p += 1;
                }
                Some(&c) if c == text[t] => {
                    p += 1;
                    t += 1;
                }
                _ => match star {
                    Some((sp, st)) => {
                        p = sp + 1;
                        t = st + 1;
                        star = Some((sp, st + 1));
                    }
                    None => return false,
                },
            }
        }

        pattern[p..].iter().all(|&c| c == '*')
    }
}
