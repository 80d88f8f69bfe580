//! Entity block list.
//!
//! Shell-style glob patterns matched against the whole entity id:
//!
//! - `*` matches any run of characters, `?` exactly one.
//! - `[seq]` matches one character in `seq`, `[!seq]` one character not in
//!   it. Ranges like `[0-9]` work. A `]` directly after the opening bracket
//!   is a member, and an unclosed `[` is a literal.
//!
//! Blocked entities never reach the event store or the current-state map.

use floorcast_types::{EntityId, StateMap};
use regex::RegexSet;

/// Compiled block list.
#[derive(Debug, Clone)]
pub struct EntityFilter {
    set: RegexSet,
}

impl EntityFilter {
    /// Compile `patterns` into a single matcher.
    ///
    /// # Errors
    ///
    /// Returns the [`regex::Error`] if the translated patterns do not
    /// compile (e.g. a reversed range such as `[z-a]`, or the combined set
    /// exceeds the size limit).
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let set = RegexSet::new(patterns.iter().map(|p| glob_to_regex(p.as_ref())))?;
        Ok(Self { set })
    }

    /// Whether events for `entity_id` should be dropped.
    pub fn is_blocked(&self, entity_id: &EntityId) -> bool {
        self.set.is_match(entity_id.as_str())
    }

    /// Remove blocked entities from a state map. Returns how many were
    /// removed.
    pub fn retain_allowed(&self, state: &mut StateMap) -> usize {
        let before = state.len();
        state.retain(|id, _| !self.is_blocked(id));
        before.saturating_sub(state.len())
    }
}

/// Translate a glob into an anchored regex.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len().saturating_add(8));
    out.push('^');
    let mut buf = [0_u8; 4];
    let mut chars = glob.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match char_class(chars.as_str()) {
                Some((class, rest)) => {
                    out.push_str(&class);
                    chars = rest.chars();
                }
                None => out.push_str(r"\["),
            },
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}

/// Translate a `[...]` class whose body starts at `after` (just past the
/// `[`). Returns the regex class and the text following the closing `]`,
/// or `None` if the class is never closed.
fn char_class(after: &str) -> Option<(String, &str)> {
    let (negated, body_start) = after
        .strip_prefix('!')
        .map_or((false, after), |rest| (true, rest));
    let search_from = usize::from(body_start.starts_with(']'));
    let close = body_start
        .get(search_from..)?
        .find(']')?
        .checked_add(search_from)?;
    let body = body_start.get(..close)?;
    let rest = body_start.get(close.checked_add(1)?..)?;

    let mut class = String::with_capacity(body.len().saturating_add(4));
    class.push_str(if negated { "[^" } else { "[" });
    for c in body.chars() {
        // Characters with a meaning inside a regex class, `-` excepted.
        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
            class.push('\\');
        }
        class.push(c);
    }
    class.push(']');
    Some((class, rest))
}
