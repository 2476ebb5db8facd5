//! Fixed mapping between display colors and the provider's event color ids.
//!
//! Google Calendar only accepts the closed palette `"1"`..`"11"` on events.
//! Outbound, any hex color maps to one of those ids (unknown colors fall
//! back to [`NEUTRAL_COLOR_ID`]). Inbound, an id maps back to its canonical
//! hex value; that direction is only used for events created outside the
//! household.

/// Canonical palette: (color id, hex)
const PALETTE: [(&str, &str); 11] = [
    ("1", "#7986CB"),  // Lavender
    ("2", "#33B679"),  // Sage
    ("3", "#8E24AA"),  // Grape
    ("4", "#E67C73"),  // Flamingo
    ("5", "#F6BF26"),  // Banana
    ("6", "#F4511E"),  // Tangerine
    ("7", "#039BE5"),  // Peacock
    ("8", "#616161"),  // Graphite
    ("9", "#3F51B5"),  // Blueberry
    ("10", "#0B8043"), // Basil
    ("11", "#D50000"), // Tomato
];

/// Household display colors that are not part of the palette (outbound only)
const ALIASES: [(&str, &str); 9] = [
    ("#EC4899", "4"),  // pink
    ("#8B5CF6", "3"),  // purple
    ("#3B82F6", "9"),  // blue
    ("#10B981", "10"), // green
    ("#F97316", "6"),  // orange
    ("#EAB308", "5"),  // yellow
    ("#EF4444", "11"), // red
    ("#14B8A6", "7"),  // teal
    ("#6B7280", "8"),  // gray
];

/// Color id used for any hex value outside the table
pub const NEUTRAL_COLOR_ID: &str = "8";

/// Normalize `#abc` / `abc` / `#AABBCC` into `#AABBCC`
fn normalize_hex(hex: &str) -> Option<String> {
    let digits = hex.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).collect(),
        6 => digits.to_string(),
        _ => return None,
    };

    Some(format!("#{}", expanded.to_ascii_uppercase()))
}

/// Map a display color to the provider color id
pub fn to_color_id(hex: &str) -> &'static str {
    let Some(normalized) = normalize_hex(hex) else {
        return NEUTRAL_COLOR_ID;
    };

    PALETTE
        .iter()
        .find(|(_, palette_hex)| *palette_hex == normalized)
        .map(|(id, _)| *id)
        .or_else(|| {
            ALIASES
                .iter()
                .find(|(alias_hex, _)| *alias_hex == normalized)
                .map(|(_, id)| *id)
        })
        .unwrap_or(NEUTRAL_COLOR_ID)
}

/// Map a provider color id back to its canonical hex color
pub fn to_hex(color_id: &str) -> Option<&'static str> {
    PALETTE
        .iter()
        .find(|(id, _)| *id == color_id.trim())
        .map(|(_, hex)| *hex)
}
