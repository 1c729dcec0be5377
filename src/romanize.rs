//! Rewrites Taiwanese Tâi-lô spellings into the Penang Hokkien forms used
//! on the street.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static WORD_SWAPS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\blí\b", "lu"),
        (r"\bgóa\b", "wa"),
        (r"\bguá\b", "wa"),
        (r"\bko̍k\b", "lor"),
        (r"\bkoh\b", "lor"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

const SOUND_SWAPS: [(&str, &str); 4] = [("ts", "c"), ("ing", "eng"), ("ue", "ua"), ("liáu", "liao")];

pub fn penang_patch(tailo: &str) -> String {
    if tailo.trim().is_empty() {
        return String::new();
    }
    let mut text = tailo.to_lowercase();
    for (re, replacement) in WORD_SWAPS.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }
    for (from, to) in SOUND_SWAPS {
        text = text.replace(from, to);
    }
    text
}

/// Fills `translations.hokkien.romanization` from the model's `tailo` field
/// on every result that carries one.
pub fn apply_to_results(results: &mut [Value]) {
    for result in results {
        let Some(hokkien) = result
            .pointer_mut("/translations/hokkien")
            .and_then(Value::as_object_mut)
        else {
            continue;
        };
        let Some(tailo) = hokkien.get("tailo").and_then(Value::as_str) else {
            continue;
        };
        let patched = penang_patch(tailo);
        hokkien.insert("romanization".to_string(), Value::String(patched));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn swaps_pronouns_and_particles() {
        assert_eq!(penang_patch("Guá ài lí"), "wa ài lu");
        assert_eq!(penang_patch("góa koh lâi"), "wa lor lâi");
    }

    #[test]
    fn swaps_sounds() {
        assert_eq!(penang_patch("tsiah-pn̄g"), "ciah-pn̄g");
        assert_eq!(penang_patch("sing-li"), "seng-li");
        assert_eq!(penang_patch("hue"), "hua");
        assert_eq!(penang_patch("liáu"), "liao");
    }

    #[test]
    fn word_swaps_need_boundaries() {
        assert_eq!(penang_patch("lín"), "lín");
        assert_eq!(penang_patch("kohaa"), "kohaa");
    }

    #[test]
    fn blank_input_is_empty() {
        assert_eq!(penang_patch("  "), "");
    }

    #[test]
    fn fills_romanization_from_tailo() {
        let mut results = vec![
            json!({"translations": {"hokkien": {"hanzi": "我", "tailo": "guá"}}}),
            json!({"translations": {"malay": {"script": "saya"}}}),
        ];
        apply_to_results(&mut results);
        assert_eq!(results[0]["translations"]["hokkien"]["romanization"], "wa");
        assert!(results[1]["translations"].get("hokkien").is_none());
    }
}
