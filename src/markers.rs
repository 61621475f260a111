//! Process-lifetime delimiter set used to frame synthesized tool calls in plain text.
//!
//! The markers are constructed once, at startup, from a fixed pool of rare Unicode
//! code points. They are never derived per-request: a multi-turn conversation writes
//! its tool-call history back into the prompt using these markers, so later turns
//! must still be parseable with the same set.

use rand::Rng;

/// One `(open, close, mid)` row of the delimiter-triple pool.
const DELIMITER_TRIPLES: [(char, char, char); 6] = [
    ('༒', '༒', '࿇'),
    ('꧁', '꧂', '࿔'),
    ('᎒', '᎒', '᎓'),
    ('ꆈ', 'ꆈ', 'ꊰ'),
    ('꩜', '꩜', '꩟'),
    ('ꓸ', 'ꓸ', 'ꓹ'),
];

/// Rare CJK suffix glyphs used to further disambiguate a process's marker set.
const SUFFIX_POOL: [char; 20] = [
    '龘', '靐', '齉', '麤', '爨', '驫', '鱻', '羴', '犇', '骉', '飝', '厵', '靇', '飍', '馫', '灥', '厽', '叒', '叕',
    '芔',
];

/// The eight Unicode markers that frame tool-call envelopes and tool results in the
/// delimited-text protocol. Constructed once per process and treated as an immutable
/// value thereafter — never read from ambient global state, so callers can construct
/// their own [`MarkerSet`] in tests without touching any process-wide initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet {
    pub tc_start: String,
    pub tc_end: String,
    pub name_start: String,
    pub name_end: String,
    pub args_start: String,
    pub args_end: String,
    pub result_start: String,
    pub result_end: String,
}

impl MarkerSet {
    /// Build a marker set by drawing a delimiter triple and two suffix glyphs
    /// uniformly at random from the fixed pools.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let (open, close, mid) = DELIMITER_TRIPLES[rng.random_range(0..DELIMITER_TRIPLES.len())];
        let s1 = SUFFIX_POOL[rng.random_range(0..SUFFIX_POOL.len())];
        let s2 = SUFFIX_POOL[rng.random_range(0..SUFFIX_POOL.len())];

        Self::from_parts(open, close, mid, s1, s2)
    }

    /// Build a marker set from explicit parts. Used by [`MarkerSet::generate`] and by
    /// tests that need a deterministic, known set of markers.
    pub fn from_parts(open: char, close: char, mid: char, s1: char, s2: char) -> Self {
        Self {
            tc_start: format!("{open}{s1}ᐅ"),
            tc_end: format!("ᐊ{s1}{close}"),
            name_start: format!("{mid}▸"),
            name_end: format!("◂{mid}"),
            args_start: format!("{mid}▹"),
            args_end: format!("◃{mid}"),
            result_start: format!("{open}{s2}⟫"),
            result_end: format!("⟪{s2}{close}"),
        }
    }

    /// Render a single tool-call envelope, as appended to an assistant message's
    /// content per the request transcoder's rewriting rules.
    pub fn encode_tool_call(&self, name: &str, arguments: &str) -> String {
        format!(
            "\n{}\n{}{name}{}\n{}{arguments}{}\n{}",
            self.tc_start, self.name_start, self.name_end, self.args_start, self.args_end, self.tc_end
        )
    }

    /// Render a tool result injected back into the prompt as a user turn.
    pub fn encode_tool_result(&self, name: &str, result: &str) -> String {
        format!("{}[{name}]\n{result}{}", self.result_start, self.result_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MarkerSet {
        MarkerSet::from_parts('༒', '༒', '࿇', '龘', '靐')
    }

    #[test]
    fn markers_are_distinct_and_non_prefixing() {
        let m = sample();
        let all = [
            &m.tc_start,
            &m.tc_end,
            &m.name_start,
            &m.name_end,
            &m.args_start,
            &m.args_end,
            &m.result_start,
            &m.result_end,
        ];

        for (i, a) in all.iter().enumerate() {
            assert!(a.chars().count() >= 2, "marker too short: {a:?}");
            for (j, b) in all.iter().enumerate() {
                if i == j {
                    continue;
                }
                assert!(!b.starts_with(a.as_str()), "{a:?} is a prefix of {b:?}");
            }
        }
    }

    #[test]
    fn generate_produces_valid_markers() {
        for _ in 0..50 {
            let m = MarkerSet::generate();
            assert!(m.tc_start.chars().count() >= 2);
            assert_ne!(m.tc_start, m.tc_end);
        }
    }

    #[test]
    fn encode_tool_call_round_trips_through_markers() {
        let m = sample();
        let encoded = m.encode_tool_call("add", r#"{"a":1,"b":2}"#);
        assert!(encoded.contains(&m.tc_start));
        assert!(encoded.contains(&m.name_start));
        assert!(encoded.contains("add"));
        assert!(encoded.ends_with(&m.tc_end));
    }
}
