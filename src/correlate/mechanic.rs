use regex::Regex;
use std::sync::OnceLock;

pub const MAX_MECHANIC_CHARS: usize = 120;

fn re_mechanic() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:new|secret|update|introducing|added|unlock|mechanic|feature|quest|code)[:\-\s]*(.*)",
        )
        .unwrap()
    })
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Text following the first trigger word in a mention title, e.g.
/// "Secret Pet Fusion Mechanic Found" -> "Pet Fusion Mechanic Found".
/// Titles without a trigger are used as-is; a trigger that ends the title
/// leaves an empty label.
pub fn extract_mechanic(title: &str) -> String {
    match re_mechanic().captures(title).and_then(|caps| caps.get(1)) {
        Some(label) => truncate_chars(label.as_str().trim(), MAX_MECHANIC_CHARS),
        None => truncate_chars(title, MAX_MECHANIC_CHARS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mechanic() {
        assert!(extract_mechanic("NEW Dragon Quest Update!").contains("Dragon Quest"));
        assert_eq!(
            extract_mechanic("Secret Pet Fusion Mechanic Found"),
            "Pet Fusion Mechanic Found"
        );
        assert_eq!(
            extract_mechanic("Update: New Code for Free Items"),
            "New Code for Free Items"
        );
        assert!(extract_mechanic("NEW Test Game Mechanic Update!").contains("Mechanic"));
    }

    #[test]
    fn test_extract_mechanic_fallbacks() {
        assert_eq!(extract_mechanic("Blox Fruits Is Amazing"), "Blox Fruits Is Amazing");
        assert_eq!(extract_mechanic("Blox Fruits UPDATE"), "");
        assert_eq!(extract_mechanic("Blox Fruits update!!  "), "!!");
    }

    #[test]
    fn test_extract_mechanic_truncates_by_chars() {
        let long = format!("Unlock {}", "é".repeat(300));
        let label = extract_mechanic(&long);
        assert_eq!(label.chars().count(), MAX_MECHANIC_CHARS);
        assert!(label.chars().all(|c| c == 'é'));

        let plain = "x".repeat(500);
        assert_eq!(extract_mechanic(&plain).len(), MAX_MECHANIC_CHARS);
    }
}
