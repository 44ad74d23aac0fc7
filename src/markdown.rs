//! Text helpers for turning a repository README into page contents.

use regex::{Captures, Regex};
use std::sync::OnceLock;
use url::Url;

fn heading1_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\A# ([^\r\n]*)").expect("Invalid heading pattern"))
}

fn leading_heading1_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\A# [^\r\n]*(?:\r?\n)*").expect("Invalid leading heading pattern")
    })
}

fn br_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("Invalid br pattern"))
}

fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"!\[(?P<alt>[^\]]*)\]\((?P<target>[^)\s]+)(?P<title>\s+[^)]*)?\)")
            .expect("Invalid image pattern")
    })
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+\.\d+\.\d+").expect("Invalid version pattern"))
}

/// Text of the level-one heading on the very first line, if there is one.
pub fn heading1(text: &str) -> Option<String> {
    heading1_pattern()
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|heading| !heading.is_empty())
}

/// Remove a leading level-one heading and the blank lines after it.
pub fn strip_heading1(text: &str) -> String {
    leading_heading1_pattern().replace(text, "").into_owned()
}

/// Rewrite every `<br>` variant into the self-closing `<br />` form.
pub fn normalize_br_tags(text: &str) -> String {
    br_tag_pattern().replace_all(text, "<br />").into_owned()
}

/// Resolve relative image targets against `base`, leaving absolute ones alone.
pub fn absolutize_image_sources(text: &str, base: &Url) -> String {
    image_pattern()
        .replace_all(text, |caps: &Captures| {
            let target = &caps["target"];
            if Url::parse(target).is_ok() {
                return caps[0].to_string();
            }
            match base.join(target) {
                Ok(absolute) => format!(
                    "![{}]({}{})",
                    &caps["alt"],
                    absolute,
                    caps.name("title").map_or("", |m| m.as_str())
                ),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Clean a README for use as page contents.
///
/// Returns `None` when nothing but whitespace remains.
pub fn page_contents(readme: &str, base: Option<&Url>) -> Option<String> {
    let text = strip_heading1(readme);
    let text = normalize_br_tags(&text);
    let text = match base {
        Some(base) => absolutize_image_sources(&text, base),
        None => text,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// First `major.minor.patch` version found in a tag or release name.
pub fn release_version(tag: &str) -> Option<&str> {
    version_pattern().find(tag).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://raw.githubusercontent.com/acme/tool/master/").unwrap()
    }

    #[test]
    fn test_heading1_only_on_first_line() {
        assert_eq!(heading1("# Tool\n\nBody"), Some("Tool".to_string()));
        assert_eq!(heading1("Intro\n# Tool\n"), None);
        assert_eq!(heading1("## Tool\n"), None);
        assert_eq!(heading1("#   \nBody"), None);
    }

    #[test]
    fn test_strip_heading1() {
        assert_eq!(strip_heading1("# Tool\n\n\nBody\n"), "Body\n");
        assert_eq!(strip_heading1("Body\n# Tool\n"), "Body\n# Tool\n");
    }

    #[test]
    fn test_normalize_br_tags() {
        assert_eq!(
            normalize_br_tags("a<br>b<BR/>c<br  />d"),
            "a<br />b<br />c<br />d"
        );
    }

    #[test]
    fn test_absolutize_image_sources() {
        let text = "![logo](docs/logo.png) and ![shot](https://example.com/a.png)";
        assert_eq!(
            absolutize_image_sources(text, &base()),
            "![logo](https://raw.githubusercontent.com/acme/tool/master/docs/logo.png) and ![shot](https://example.com/a.png)"
        );
    }

    #[test]
    fn test_absolutize_keeps_title() {
        let text = "![logo](./logo.png \"Logo\")";
        assert_eq!(
            absolutize_image_sources(text, &base()),
            "![logo](https://raw.githubusercontent.com/acme/tool/master/logo.png \"Logo\")"
        );
    }

    #[test]
    fn test_page_contents_empty_after_cleanup() {
        assert_eq!(page_contents("# Tool\n\n", Some(&base())), None);
        assert_eq!(
            page_contents("# Tool\n\nHello<br>", None),
            Some("Hello<br />".to_string())
        );
    }

    #[test]
    fn test_release_version() {
        assert_eq!(release_version("v1.2.3"), Some("1.2.3"));
        assert_eq!(release_version("release-10.20.30-beta"), Some("10.20.30"));
        assert_eq!(release_version("nightly"), None);
    }
}
