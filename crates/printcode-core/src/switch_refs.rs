//! DIP-switch references embedded in error-code text.
//!
//! Service manuals point technicians at switches in free text, e.g.
//! "Set DipSW 3-5 to 1 to isolate the fuser". [`switch_refs`] pulls those
//! `(switch, bit)` pairs out so a lookup can attach the referenced rows.

use std::sync::OnceLock;

use regex::Regex;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:dipsw|sw)\s*(\d+)\s*-\s*(\d+)").expect("static switch pattern")
    })
}

/// `(switch_number, bit_number)` pairs referenced in `text`, in order of
/// first appearance, without duplicates.
pub fn switch_refs(text: &str) -> Vec<(i64, i64)> {
    let mut refs = Vec::new();
    for caps in pattern().captures_iter(text) {
        let sw = caps[1].parse::<i64>();
        let bit = caps[2].parse::<i64>();
        if let (Ok(sw), Ok(bit)) = (sw, bit) {
            if !refs.contains(&(sw, bit)) {
                refs.push((sw, bit));
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_in_order() {
        let refs = switch_refs("Set DipSW 3-5 to 1, then SW12-0. See also dipsw 3 - 5.");
        assert_eq!(refs, vec![(3, 5), (12, 0)]);
    }

    #[test]
    fn test_no_refs() {
        assert!(switch_refs("Replace the fuser unit").is_empty());
        assert!(switch_refs("").is_empty());
    }
}
