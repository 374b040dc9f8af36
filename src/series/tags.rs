//! Tag extraction from series names
//!
//! Tagged series carry their tags inline, `name;key=value;key2=value2`.
//! Untagged names produce a single `name` tag.

use std::collections::BTreeMap;

/// Tag holding the metric path
pub const NAME_TAG: &str = "name";

/// Split a series name into its tag set
///
/// Pairs without `=` are ignored. The `name` tag is always present.
pub fn extract_tags(name: &str) -> BTreeMap<String, String> {
    let mut parts = name.split(';');
    let mut tags = BTreeMap::new();
    tags.insert(NAME_TAG.to_string(), parts.next().unwrap_or_default().to_string());

    for pair in parts {
        if let Some((key, value)) = pair.split_once('=') {
            if !key.is_empty() {
                tags.insert(key.to_string(), value.to_string());
            }
        }
    }
    tags
}

/// Metric path of a possibly tagged name
pub fn extract_name_tag(name: &str) -> &str {
    name.split(';').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tags_untagged() {
        let tags = extract_tags("servers.web01.cpu");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[NAME_TAG], "servers.web01.cpu");
    }

    #[test]
    fn test_extract_tags_tagged() {
        let tags = extract_tags("cpu.load;dc=east;host=web01;broken");
        assert_eq!(tags[NAME_TAG], "cpu.load");
        assert_eq!(tags["dc"], "east");
        assert_eq!(tags["host"], "web01");
        assert!(!tags.contains_key("broken"));
    }

    #[test]
    fn test_extract_name_tag() {
        assert_eq!(extract_name_tag("cpu.load;dc=east"), "cpu.load");
        assert_eq!(extract_name_tag("cpu.load"), "cpu.load");
    }
}
