//! Coarse subtitle-language detection for the language tag and the
//! default-voice recommendation.

/// Classify a cue script as Chinese or English by character counts. Han
/// characters vote Chinese; Latin letters and common ASCII punctuation
/// vote English.
pub fn detect_language(texts: &[&str]) -> &'static str {
    let mut zh = 0usize;
    let mut en = 0usize;
    for text in texts {
        for ch in text.chars() {
            let code = ch as u32;
            if (0x4E00..=0x9FFF).contains(&code) || (0x3400..=0x4DBF).contains(&code) {
                zh += 1;
            } else if ch.is_ascii_alphabetic() || " ,.;:!?".contains(ch) {
                en += 1;
            }
        }
    }
    if zh > en {
        "zh"
    } else {
        "en"
    }
}

/// Default voice for a detected language.
pub fn recommended_voice(lang: &str) -> &'static str {
    match lang {
        "zh" => "zh-CN-YunjianNeural",
        _ => "en-US-AriaNeural",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_chinese() {
        assert_eq!(detect_language(&["这是一个中文句子", "另一句"]), "zh");
    }

    #[test]
    fn test_detects_english() {
        assert_eq!(detect_language(&["Hello there, world."]), "en");
        assert_eq!(detect_language(&[]), "en");
    }

    #[test]
    fn test_voice_recommendation() {
        assert_eq!(recommended_voice("zh"), "zh-CN-YunjianNeural");
        assert_eq!(recommended_voice("en"), "en-US-AriaNeural");
    }
}
