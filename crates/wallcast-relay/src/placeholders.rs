//! Mention placeholders in notification templates.
//!
//! `{all}`, `{everyone}`, `{online}` and `{here}` become chat-wide mentions.
//! Any other `{...}` sequence is kept literally.

/// Recognized placeholders and the mention each expands to.
pub const MENTIONS: &[(&str, &str)] = &[
    ("all", "@all"),
    ("everyone", "@everyone"),
    ("online", "@online"),
    ("here", "@here"),
];

fn mention_for(name: &str) -> Option<&'static str> {
    MENTIONS
        .iter()
        .find(|(placeholder, _)| *placeholder == name)
        .map(|(_, mention)| *mention)
}

/// Substitute every recognized placeholder in `template`.
pub fn expand(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        match mention_for(&after[..close]) {
            Some(mention) => {
                out.push_str(mention);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expands_known_mentions() {
        assert_eq!(expand("meeting {all}!"), "meeting @all!");
        assert_eq!(
            expand("{online} and {here}, {everyone}"),
            "@online and @here, @everyone"
        );
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(expand("new post on the wall"), "new post on the wall");
        assert_eq!(expand(""), "");
    }

    #[test]
    fn test_unknown_and_unclosed_kept() {
        assert_eq!(expand("{foo}"), "{foo}");
        assert_eq!(expand("{foo} {all}"), "{foo} @all");
        assert_eq!(expand("broken {all"), "broken {all");
        assert_eq!(expand("{{all}}"), "{@all}");
        assert_eq!(expand("}{"), "}{");
    }

    #[test]
    fn test_multibyte_text() {
        assert_eq!(expand("Новый пост {all} 🎉"), "Новый пост @all 🎉");
    }
}
