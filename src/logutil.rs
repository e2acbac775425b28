//! Logging helpers: the `syserr!` macro for invariant violations and
//! `room_text` for quoting custom room names and descriptions.

use std::borrow::Cow;

/// Log target that receives every `SYSERR` record. `main.rs` can route it to
/// its own file.
pub const SYSERR_TARGET: &str = "syserr";

/// Log a configuration error or invariant violation. The caller still decides
/// whether to return early; the macro only reports.
#[macro_export]
macro_rules! syserr {
    ($($arg:tt)+) => {
        ::log::error!(target: $crate::logutil::SYSERR_TARGET, "SYSERR: {}", format_args!($($arg)+))
    };
}

/// Longest room text quoted in a log line, in characters.
pub const ROOM_TEXT_PREVIEW: usize = 72;

/// Flatten a custom room name or description for a quoted log field.
///
/// Description lines are joined with ` / `, other whitespace runs collapse to
/// one space, control characters are dropped and `"` is escaped so the field
/// stays balanced. Text past [`ROOM_TEXT_PREVIEW`] ends in `...`. Plain names
/// come back borrowed.
pub fn room_text(s: &str) -> Cow<'_, str> {
    let plain = s.chars().count() <= ROOM_TEXT_PREVIEW
        && !s.contains(|c: char| c == '"' || c.is_control() || c.is_whitespace() && c != ' ')
        && !s.contains("  ")
        && s.trim() == s;
    if plain {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len().min(ROOM_TEXT_PREVIEW * 2));
    let mut count = 0;
    for (i, line) in s.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
        if i > 0 {
            out.push_str(" / ");
            count += 3;
        }
        let mut space = false;
        for c in line.chars() {
            if count >= ROOM_TEXT_PREVIEW {
                out.push_str("...");
                return Cow::Owned(out);
            }
            if c.is_whitespace() {
                space = true;
                continue;
            }
            if c.is_control() {
                continue;
            }
            if space {
                out.push(' ');
                count += 1;
                space = false;
            }
            if c == '"' {
                out.push('\\');
            }
            out.push(c);
            count += 1;
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_borrowed() {
        assert!(matches!(room_text("The Old Mill"), Cow::Borrowed("The Old Mill")));
    }

    #[test]
    fn description_lines_are_joined() {
        let desc = "A dusty road winds north.\r\n  Wagon ruts\tcut deep here.\r\n\r\n";
        assert_eq!(room_text(desc), "A dusty road winds north. / Wagon ruts cut deep here.");
    }

    #[test]
    fn quotes_are_escaped_and_controls_dropped() {
        assert_eq!(room_text("The \"Red\" Hall\u{7}"), "The \\\"Red\\\" Hall");
    }

    #[test]
    fn long_descriptions_are_cut() {
        let desc = "stone ".repeat(40);
        let out = room_text(&desc);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), ROOM_TEXT_PREVIEW + 3);
    }
}
