// Text measurement the way Mastodon counts it.
//
// A URL always costs `url_weight` characters and a remote mention
// `@user@domain` costs only `@user`. Everything else is one per char.

use crate::mastodon::DestinationCapabilities;

pub const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBudget {
    pub max_chars: usize,
    pub url_weight: usize,
}

impl TextBudget {
    pub fn new(max_chars: usize, url_weight: usize) -> Self {
        Self {
            max_chars,
            url_weight,
        }
    }

    pub fn from_capabilities(caps: &DestinationCapabilities) -> Self {
        Self::new(caps.max_chars, caps.chars_per_url)
    }

    pub fn length(&self, text: &str) -> usize {
        let chars: Vec<char> = text.chars().collect();
        let mut count = 0;
        let mut i = 0;

        while i < chars.len() {
            if let Some(end) = url_end(&chars, i) {
                count += self.url_weight;
                i = end;
            } else if let Some((user_end, end)) = remote_mention(&chars, i) {
                count += user_end - i;
                i = end;
            } else {
                count += 1;
                i += 1;
            }
        }

        count
    }

    pub fn fits(&self, text: &str) -> bool {
        self.length(text) <= self.max_chars
    }

    /// Cut `text` down until it fits, marking the cut with an ellipsis.
    pub fn truncate(&self, text: &str) -> String {
        if self.fits(text) {
            return text.to_string();
        }

        let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        for &end in boundaries.iter().rev() {
            let candidate = format!("{}{ELLIPSIS}", text[..end].trim_end());
            if self.fits(&candidate) {
                return candidate;
            }
        }

        String::new()
    }
}

fn starts_with_at(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut i = at;
    for p in pattern.chars() {
        if chars.get(i) != Some(&p) {
            return false;
        }
        i += 1;
    }
    true
}

/// End of a URL starting at `i`, if one does.
fn url_end(chars: &[char], i: usize) -> Option<usize> {
    if i > 0 && chars[i - 1].is_alphanumeric() {
        return None;
    }

    let scheme_len = if starts_with_at(chars, i, "https://") {
        8
    } else if starts_with_at(chars, i, "http://") {
        7
    } else {
        return None;
    };

    let body_start = i + scheme_len;
    let end = chars[body_start..]
        .iter()
        .position(|c| c.is_whitespace())
        .map_or(chars.len(), |p| body_start + p);

    (end > body_start).then_some(end)
}

fn is_handle_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// For `@user@domain` at `i`, the end of `@user` and the end of the domain.
fn remote_mention(chars: &[char], i: usize) -> Option<(usize, usize)> {
    if chars[i] != '@' {
        return None;
    }
    if i > 0 && (is_handle_char(chars[i - 1]) || chars[i - 1] == '@') {
        return None;
    }

    let mut user_end = i + 1;
    while user_end < chars.len() && is_handle_char(chars[user_end]) {
        user_end += 1;
    }
    if user_end == i + 1 || chars.get(user_end) != Some(&'@') {
        return None;
    }

    let domain_start = user_end + 1;
    let mut end = domain_start;
    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || matches!(chars[end], '.' | '-')) {
        end += 1;
    }
    while end > domain_start && matches!(chars[end - 1], '.' | '-') {
        end -= 1;
    }
    if end == domain_start {
        return None;
    }

    Some((user_end, end))
}
