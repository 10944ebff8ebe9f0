//! Naming conventions shared by the resolvers.

/// Method-name prefixes that collapse to a plain CRUD action.
const ACTION_PREFIXES: [(&str, &str); 6] = [
    ("Create", "create"),
    ("Get", "get"),
    ("Update", "update"),
    ("Delete", "delete"),
    ("List", "list"),
    ("Search", "search"),
];

/// Strip one trailing `s` from segments longer than one character.
pub fn singularize(segment: &str) -> &str {
    if segment.len() > 1 {
        segment.strip_suffix('s').unwrap_or(segment)
    } else {
        segment
    }
}

pub fn is_numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// `ResetPassword` → `reset.password`, `HTTPServer` → `http.server`.
///
/// A dot goes before an upper-case letter that starts a new word: one that
/// follows a lower-case letter, or ends an acronym run.
pub fn camel_to_dotted(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_upper = false;

    for (i, &c) in chars.iter().enumerate() {
        let upper = c.is_uppercase();
        if upper && i > 0 {
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if (!prev_upper || next_lower) && !out.is_empty() {
                out.push('.');
            }
        }
        out.extend(c.to_lowercase());
        prev_upper = upper;
    }

    out
}

/// Map an RPC method name to an action: known CRUD prefixes win, anything
/// else is converted with [`camel_to_dotted`].
pub fn method_action(method: &str) -> String {
    for (prefix, action) in ACTION_PREFIXES {
        if let Some(rest) = method.strip_prefix(prefix) {
            if rest.chars().next().map_or(true, char::is_uppercase) {
                return action.to_string();
            }
        }
    }
    camel_to_dotted(method)
}
