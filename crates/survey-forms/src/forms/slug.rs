/// URL-safe slug derived from a form name.
///
/// Lowercases, drops anything outside `[A-Za-z0-9_]`, whitespace and `-`,
/// collapses runs of whitespace/`_`/`-` into one `-`, and trims hyphens at
/// both ends. Names with no usable characters fall back to `form`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        "form".to_string()
    } else {
        slug
    }
}

/// First of `base`, `base-1`, `base-2`, ... for which `taken` answers false.
pub fn unique_slug<F>(base: &str, mut taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !taken(base) {
        return base.to_string();
    }

    let mut counter = 1u32;
    loop {
        let candidate = format!("{base}-{counter}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
