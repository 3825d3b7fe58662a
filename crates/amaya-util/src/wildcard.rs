//! Wildcard pattern matching for user-configured command patterns.
//!
//! `*` matches any sequence of characters (including none); every other
//! character matches itself.

/// Match a string against a wildcard pattern.
///
/// ```
/// use amaya_util::wildcard::matches;
///
/// assert!(matches("git push *", "git push --force origin"));
/// assert!(matches("*", "anything"));
/// assert!(!matches("git push *", "git status"));
/// ```
pub fn matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen, and the text index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, start)) = backtrack {
            p = star + 1;
            t = start + 1;
            backtrack = Some((star, start + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Return the first pattern that matches `text`.
pub fn find_matching_pattern<'a, S: AsRef<str>>(patterns: &'a [S], text: &str) -> Option<&'a str> {
    patterns
        .iter()
        .map(AsRef::as_ref)
        .find(|pattern| matches(pattern, text))
}
