//! Markdown scanning helpers.
//!
//! These work on raw note text with regexes and never build a full markdown
//! AST. False negatives inside exotic syntax are acceptable; false positives
//! from code blocks, links and headings are not.

use once_cell::sync::Lazy;
use regex::Regex;

/// File extensions counted as images when embedded.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "avif"];

static CODE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*?(?:```|\z)|~~~.*?(?:~~~|\z)").unwrap());
static INLINE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`\n]+`").unwrap());
static HTML_COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static WIKI_EMBED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[\[([^\]]+)\]\]").unwrap());
static MD_IMAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").unwrap());
static WIKILINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[([^\]]+)\]\]").unwrap());
static MD_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").unwrap());
static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\p{L}\p{N}_/&-])#(\p{L}[\p{L}\p{N}_/-]*)").unwrap());

/// Split a note into `(frontmatter_yaml, body)`.
///
/// Frontmatter must open on the first line with `---` and close with a line
/// reading `---` or `...`. Without a closing line the whole note is body.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let text = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(rest) = text.strip_prefix("---") else {
        return (None, content);
    };
    let Some(rest) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) else {
        return (None, content);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "---" || trimmed == "..." {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, content)
}

/// Body of a note with frontmatter removed.
pub fn strip_frontmatter(content: &str) -> &str {
    split_frontmatter(content).1
}

/// Remove fenced and inline code.
pub fn strip_code(text: &str) -> String {
    let without_fences = CODE_FENCE_RE.replace_all(text, "");
    INLINE_CODE_RE.replace_all(&without_fences, "").into_owned()
}

/// Plain text used for length and shape heuristics: frontmatter, code,
/// HTML comments and embeds (`![[..]]`, `![..](..)`) removed.
pub fn plain_text(content: &str) -> String {
    let body = strip_frontmatter(content);
    let text = strip_code(body);
    let text = HTML_COMMENT_RE.replace_all(&text, "");
    let text = WIKI_EMBED_RE.replace_all(&text, "");
    MD_IMAGE_RE.replace_all(&text, "").into_owned()
}

/// Whether a link target names an image file.
pub fn is_image_target(target: &str) -> bool {
    let file = target
        .split(['|', '#', '?'])
        .next()
        .unwrap_or(target)
        .trim();
    match file.rsplit_once('.') {
        Some((_, ext)) => IMAGE_EXTENSIONS
            .iter()
            .any(|candidate| ext.eq_ignore_ascii_case(candidate)),
        None => false,
    }
}

/// Count embedded images outside code: image-typed `![[..]]` embeds plus
/// every markdown `![alt](path)` image.
pub fn count_embedded_images(content: &str) -> usize {
    let text = strip_code(strip_frontmatter(content));
    let embeds = WIKI_EMBED_RE
        .captures_iter(&text)
        .filter(|cap| is_image_target(&cap[1]))
        .count();
    embeds + MD_IMAGE_RE.find_iter(&text).count()
}

/// Targets of `[[wikilinks]]` outside code, excluding embeds.
///
/// Alias (`[[a|b]]`) and heading (`[[a#h]]`) suffixes are dropped.
pub fn extract_wikilinks(content: &str) -> Vec<String> {
    let text = strip_code(strip_frontmatter(content));
    let mut links = Vec::new();
    for cap in WIKILINK_RE.captures_iter(&text) {
        let Some(whole) = cap.get(0) else { continue };
        if whole.start() > 0 && text.as_bytes()[whole.start() - 1] == b'!' {
            continue;
        }
        let target = cap[1]
            .split('|')
            .next()
            .unwrap_or_default()
            .split('#')
            .next()
            .unwrap_or_default()
            .trim();
        if !target.is_empty() {
            links.push(target.to_string());
        }
    }
    links
}

/// Extract inline `#hashtags` from markdown content.
///
/// Code, headings, markdown links and URLs are removed first so anchors and
/// fragments never count. Tags keep their original case, are deduplicated
/// case-insensitively, and come back in order of first appearance.
pub fn extract_inline_hashtags(content: &str) -> Vec<String> {
    let text = strip_code(strip_frontmatter(content));
    let text = remove_headings(&text);
    let text = MD_LINK_RE.replace_all(&text, "$1");
    let text = URL_RE.replace_all(&text, "");

    let mut tags: Vec<String> = Vec::new();
    for cap in HASHTAG_RE.captures_iter(&text) {
        let tag = cap[1].trim_end_matches(['/', '-', '_']);
        if tag.is_empty() {
            continue;
        }
        let lower = tag.to_lowercase();
        if !tags.iter().any(|t| t.to_lowercase() == lower) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Drop markdown heading lines (`#` runs followed by a space or end of line).
fn remove_headings(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                let hash_count = trimmed.chars().take_while(|&c| c == '#').count();
                let after_hashes = trimmed.chars().nth(hash_count);
                !(after_hashes.is_none() || after_hashes == Some(' '))
            } else {
                true
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_frontmatter() {
        let content = "---\ntags: [a, b]\n---\n# Title\nBody";
        let (yaml, body) = split_frontmatter(content);
        assert_eq!(yaml, Some("tags: [a, b]\n"));
        assert_eq!(body, "# Title\nBody");
    }

    #[test]
    fn test_split_frontmatter_crlf_and_dots() {
        let content = "---\r\ntitle: x\r\n...\r\nBody";
        let (yaml, body) = split_frontmatter(content);
        assert_eq!(yaml, Some("title: x\r\n"));
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_split_frontmatter_absent_or_unclosed() {
        assert_eq!(split_frontmatter("Body only"), (None, "Body only"));
        assert_eq!(split_frontmatter("---\ntitle: x\n"), (None, "---\ntitle: x\n"));
        assert_eq!(split_frontmatter("----\nx"), (None, "----\nx"));
    }

    #[test]
    fn test_plain_text_removes_noise() {
        let content = "---\ntags: [x]\n---\nKeep this.\n```rust\nfn main() {}\n```\n![[diagram.png]]\n![alt](img.jpg)\n<!-- hidden -->\nAnd `code` too.";
        let text = plain_text(content);
        assert!(text.contains("Keep this."));
        assert!(text.contains("And  too."));
        assert!(!text.contains("fn main"));
        assert!(!text.contains("diagram"));
        assert!(!text.contains("img.jpg"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("tags"));
    }

    #[test]
    fn test_unterminated_fence_removed_to_end() {
        let text = strip_code("before\n```\nnever closed");
        assert_eq!(text, "before\n");
    }

    #[test]
    fn test_count_embedded_images() {
        let content = "![[a.png]] ![[b.JPG|300]] ![[note]] ![[doc.pdf]] ![x](c.webp)\n```\n![[d.png]]\n```";
        assert_eq!(count_embedded_images(content), 3);
    }

    #[test]
    fn test_is_image_target() {
        assert!(is_image_target("photo.avif"));
        assert!(is_image_target("scan.PNG#page=1"));
        assert!(!is_image_target("paper.pdf"));
        assert!(!is_image_target("no-extension"));
    }

    #[test]
    fn test_extract_wikilinks() {
        let content = "See [[Event Sourcing]] and [[CQRS|command split]] and [[Kafka#Delivery]]. ![[image.png]] `[[in code]]`";
        assert_eq!(
            extract_wikilinks(content),
            vec!["Event Sourcing", "CQRS", "Kafka"]
        );
    }

    #[test]
    fn test_extract_inline_hashtags() {
        let content = "# Heading\nText with #rust and #Event-Driven and #幂等性.\n`#notatag` [link](#anchor) https://x.io/#frag #RUST";
        assert_eq!(
            extract_inline_hashtags(content),
            vec!["rust", "Event-Driven", "幂等性"]
        );
    }

    #[test]
    fn test_hashtags_skip_numeric_and_code_blocks() {
        let content = "Issue #123\n```\n#[derive(Debug)]\n```\nreal #tag";
        assert_eq!(extract_inline_hashtags(content), vec!["tag"]);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("幂等性测试", 3), "幂等性");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
