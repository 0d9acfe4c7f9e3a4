/// Estimates how many model tokens a piece of text will consume.
///
/// Memory only depends on this trait, so a real tokenizer can replace the
/// heuristic without touching the truncation logic.
pub trait TokenEstimator {
    fn estimate(&self, text: &str) -> usize;
}

/// Character-class heuristic that deliberately overestimates.
///
/// CJK characters weigh 1.3 tokens, emoji 2 tokens, everything else 0.6
/// tokens. The sum gets a 5% margin and one extra token on top. Weights are
/// kept in tenths so the arithmetic stays exact.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

const CJK_TENTHS: usize = 13;
const EMOJI_TENTHS: usize = 20;
const OTHER_TENTHS: usize = 6;
const MARGIN_PERCENT: usize = 105;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        let mut cjk = 0usize;
        let mut emoji = 0usize;
        let mut other = 0usize;
        for ch in text.chars() {
            match classify(ch) {
                CharClass::Cjk => cjk += 1,
                CharClass::Emoji => emoji += 1,
                CharClass::Other => other += 1,
            }
        }

        let other_tokens = if other == 0 {
            0
        } else {
            (other * OTHER_TENTHS).div_ceil(10).max(1)
        };
        let tenths = cjk * CJK_TENTHS + emoji * EMOJI_TENTHS + other_tokens * 10;
        let base = tenths.div_ceil(10);
        (base * MARGIN_PERCENT).div_ceil(100) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Cjk,
    Emoji,
    Other,
}

fn classify(ch: char) -> CharClass {
    let cp = ch as u32;
    match cp {
        0x3000..=0x303F     // CJK symbols and punctuation
        | 0x3040..=0x30FF   // hiragana, katakana
        | 0x3130..=0x318F   // hangul compatibility jamo
        | 0x3400..=0x4DBF   // ext A
        | 0x4E00..=0x9FFF   // unified ideographs
        | 0xAC00..=0xD7AF   // hangul syllables
        | 0xF900..=0xFAFF   // compatibility ideographs
        | 0xFF00..=0xFFEF   // half/full-width forms
        | 0x20000..=0x2FA1F => CharClass::Cjk,
        0x10000.. => CharClass::Emoji,
        _ => CharClass::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn est(text: &str) -> usize {
        HeuristicEstimator.estimate(text)
    }

    #[test]
    fn empty_text_still_costs_one() {
        assert_eq!(est(""), 1);
    }

    #[test]
    fn ascii_uses_point_six_per_char() {
        // 2 chars -> ceil(1.2) = 2 -> ceil(2.1) = 3 -> +1
        assert_eq!(est("Hi"), 4);
        // 16 chars -> ceil(9.6) = 10 -> ceil(10.5) = 11 -> +1
        assert_eq!(est("You are helpful."), 12);
    }

    #[test]
    fn single_char_floors_at_one_token() {
        // 1 char -> ceil(0.6) = 1 -> ceil(1.05) = 2 -> +1
        assert_eq!(est("a"), 3);
    }

    #[test]
    fn cjk_weighs_more_than_ascii() {
        // 10 ideographs -> 13 -> ceil(13.65) = 14 -> +1
        assert_eq!(est("你好你好你好你好你好"), 15);
        assert!(est("你好") > est("ab"));
    }

    #[test]
    fn emoji_weighs_two_tokens() {
        // 3 emoji -> 6 -> ceil(6.3) = 7 -> +1
        assert_eq!(est("😀🎉🚀"), 8);
    }

    #[test]
    fn mixed_classes_are_summed_before_rounding() {
        // cjk 1.3 + emoji 2 + other ceil(0.6) = 4.3 -> 5 -> ceil(5.25) = 6 -> +1
        assert_eq!(est("你😀a"), 7);
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify('a'), CharClass::Other);
        assert_eq!(classify('é'), CharClass::Other);
        assert_eq!(classify('中'), CharClass::Cjk);
        assert_eq!(classify('ア'), CharClass::Cjk);
        assert_eq!(classify('한'), CharClass::Cjk);
        assert_eq!(classify('\u{20000}'), CharClass::Cjk);
        assert_eq!(classify('🚀'), CharClass::Emoji);
    }

    #[test]
    fn non_empty_text_is_at_least_one() {
        for text in ["a", " ", "\n", "中", "🚀", "hello world"] {
            assert!(est(text) >= 1, "{text:?}");
        }
    }

    #[test]
    fn monotonic_in_length_per_class() {
        for unit in ["a", "中", "🚀"] {
            let mut prev = est("");
            for n in 1..200 {
                let next = est(&unit.repeat(n));
                assert!(next >= prev, "{unit:?} x{n}: {next} < {prev}");
                prev = next;
            }
        }
    }

    #[test]
    fn never_underestimates_char_count_ratio() {
        let text = "The quick brown fox jumps over the lazy dog";
        let chars = text.chars().count();
        assert!(est(text) * 10 >= chars * 6);
    }
}
