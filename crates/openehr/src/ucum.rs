//! UCUM unit normalisation.
//!
//! Forms and imports use colloquial unit spellings. The repository validates `DV_QUANTITY`
//! units against the template, which expects UCUM case-sensitive codes.

use std::borrow::Cow;

const ALIASES: &[(&str, &str)] = &[
    ("mmhg", "mm[Hg]"),
    ("mm hg", "mm[Hg]"),
    ("bpm", "/min"),
    ("beats/min", "/min"),
    ("beats per minute", "/min"),
    ("per min", "/min"),
    ("kgs", "kg"),
    ("kilograms", "kg"),
    ("lb", "[lb_av]"),
    ("lbs", "[lb_av]"),
    ("centimetres", "cm"),
    ("centimeters", "cm"),
    ("inches", "[in_i]"),
    ("in", "[in_i]"),
];

/// Maps common aliases to their UCUM code. Unknown units are returned trimmed but otherwise
/// unchanged.
///
/// ```rust
/// assert_eq!(openehr::ucum::normalise_unit("mmHg"), "mm[Hg]");
/// assert_eq!(openehr::ucum::normalise_unit("Kg"), "kg");
/// assert_eq!(openehr::ucum::normalise_unit("/min"), "/min");
/// ```
pub fn normalise_unit(unit: &str) -> Cow<'_, str> {
    let trimmed = unit.trim();
    let lower = trimmed.to_ascii_lowercase();

    if let Some((_, ucum)) = ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return Cow::Borrowed(*ucum);
    }

    // Case-only variants of SI units (`KG`, `Cm`).
    if matches!(lower.as_str(), "kg" | "g" | "cm" | "m") && trimmed != lower {
        return Cow::Owned(lower);
    }

    Cow::Borrowed(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_aliases() {
        assert_eq!(normalise_unit("mmHg"), "mm[Hg]");
        assert_eq!(normalise_unit(" MM HG "), "mm[Hg]");
        assert_eq!(normalise_unit("bpm"), "/min");
        assert_eq!(normalise_unit("lbs"), "[lb_av]");
    }

    #[test]
    fn leaves_ucum_codes_alone() {
        assert_eq!(normalise_unit("mm[Hg]"), "mm[Hg]");
        assert_eq!(normalise_unit("/min"), "/min");
        assert_eq!(normalise_unit("kg"), "kg");
        assert_eq!(normalise_unit("%"), "%");
    }

    #[test]
    fn lowercases_si_units() {
        assert_eq!(normalise_unit("KG"), "kg");
        assert_eq!(normalise_unit("Cm"), "cm");
    }
}
