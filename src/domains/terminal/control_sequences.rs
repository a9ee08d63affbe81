use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

// CSI (with private-mode prefixes and intermediates), OSC terminated by BEL or
// ST, charset selection, keypad mode switches.
static ESCAPE_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\x1b\[[?>=!]?[0-9;:]*[ -/]*[@-~]",
        r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)",
        r"|\x1b[()][AB012]",
        r"|\x1b[=>]",
    ))
    .expect("escape sequence pattern is valid")
});

/// Removes terminal control sequences so the remaining text can be matched.
pub fn strip_escape_sequences(text: &str) -> Cow<'_, str> {
    if !text.contains('\x1b') {
        return Cow::Borrowed(text);
    }
    ESCAPE_SEQUENCE.replace_all(text, "")
}
