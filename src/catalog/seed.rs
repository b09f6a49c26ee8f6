//! Default catalog contents written when a store is created.

/// Username of the profile every new store starts with.
pub const DEFAULT_PROFILE: &str = "Default";

/// Entertainment types, in insertion order.
pub const DEFAULT_TYPES: [&str; 3] = ["Movie", "Music", "Book"];

/// Providers, in insertion order. `"Self"` stands for copies the owner
/// made or bought outside any store front.
pub const DEFAULT_PROVIDERS: [&str; 6] = [
    "Self",
    "Vudu",
    "Movies Anywhere",
    "Microsoft",
    "Amazon",
    "Google",
];

/// Mediums and whether a provider applies to them, in insertion order.
pub const DEFAULT_MEDIUMS: [(&str, bool); 7] = [
    ("CD", false),
    ("DVD", false),
    ("Cassette", false),
    ("Hard Cover", false),
    ("Soft Cover", false),
    ("Digital", true),
    ("Video Cassette", false),
];

/// Types each default medium can hold.
const VALID_TYPES: [(&str, &[&str]); 7] = [
    ("CD", &["Music", "Book"]),
    ("Cassette", &["Music", "Book"]),
    ("Hard Cover", &["Book"]),
    ("Soft Cover", &["Book"]),
    ("DVD", &["Movie"]),
    ("Video Cassette", &["Movie"]),
    ("Digital", &["Movie", "Music", "Book"]),
];

/// Returns the default types a medium can hold.
///
/// Matching is case-insensitive. Unknown mediums hold nothing.
pub fn default_types_for_medium(medium: &str) -> &'static [&'static str] {
    VALID_TYPES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(medium))
        .map(|(_, types)| *types)
        .unwrap_or(&[])
}
