//! Entity-name normalization.
//!
//! External identifiers arrive as lowercase, often pluralized path
//! segments (`pages`, `menu_items`, `sites/pages`). Normalization maps
//! each `/`-separated segment to UpperCamelCase and singularizes it, with
//! results held in a bounded LRU cache on the registry. The reverse
//! mapping produces snake_case database names and is pure, so it lives as
//! a free function.

use heck::ToUpperCamelCase;

use super::EntityRegistry;

impl EntityRegistry {
    /// Normalize a raw external name. Each `/` segment is normalized on
    /// its own, so `sites/pages` becomes `Site/Page`.
    pub fn normalize_entity_name(&self, raw: &str) -> String {
        raw.split('/')
            .map(|segment| self.normalize_segment(segment))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Entries currently held by the normalization cache.
    pub fn normalization_cache_len(&self) -> usize {
        self.lock_name_cache().len()
    }

    fn normalize_segment(&self, segment: &str) -> String {
        let mut cache = self.lock_name_cache();
        if let Some(hit) = cache.get(segment) {
            return hit.clone();
        }
        let normalized = normalize_segment_uncached(segment);
        cache.put(segment.to_string(), normalized.clone());
        normalized
    }
}

fn normalize_segment_uncached(segment: &str) -> String {
    let mut name = segment.to_upper_camel_case();
    if name.ends_with("ies") {
        name.truncate(name.len() - 3);
        name.push('y');
    } else if name.ends_with('s') && !name.ends_with("ss") {
        name.truncate(name.len() - 1);
    }
    name
}

/// Reverse of normalization: UpperCamelCase type names become snake_case
/// database names. An underscore is inserted before every interior
/// uppercase letter, then everything is lowercased, so `MenuItem` becomes
/// `menu_item`.
pub fn denormalize_entity_name(name: &str) -> String {
    let mut denormalized = String::with_capacity(name.len() + 4);
    for (position, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if position > 0 {
                denormalized.push('_');
            }
            for lowered in ch.to_lowercase() {
                denormalized.push(lowered);
            }
        } else {
            denormalized.push(ch);
        }
    }
    denormalized
}
