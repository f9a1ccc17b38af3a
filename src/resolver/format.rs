//! Choosing one media format out of a provider response.

use super::strategy::FormatPreference;
use crate::sources::MediaFormatCandidate;

/// Rule that produced a selection, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    BestAudioOnly,
    MedianAudioOnly,
    AnyWithAudio,
}

impl FormatPreference {
    /// Rules tried for this preference, first match wins.
    pub fn rules(self) -> &'static [SelectionRule] {
        match self {
            Self::BestAudioOnly => &[
                SelectionRule::BestAudioOnly,
                SelectionRule::MedianAudioOnly,
                SelectionRule::AnyWithAudio,
            ],
            Self::MedianAudioOnly => &[SelectionRule::MedianAudioOnly, SelectionRule::AnyWithAudio],
            Self::AnyWithAudio => &[SelectionRule::AnyWithAudio],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection<'a> {
    pub candidate: &'a MediaFormatCandidate,
    pub rule: SelectionRule,
}

impl Selection<'_> {
    /// Provider format note (or "audio"); "mixed" whenever the last-resort
    /// rule made the pick.
    pub fn format_label(&self) -> String {
        if self.rule == SelectionRule::AnyWithAudio {
            return "mixed".to_string();
        }
        self.candidate
            .format_note
            .as_deref()
            .filter(|note| !note.trim().is_empty())
            .unwrap_or("audio")
            .to_string()
    }

    pub fn bitrate_label(&self) -> String {
        let bitrate = self.candidate.bitrate();
        if bitrate > 0.0 {
            format!("{}kbps", bitrate.round() as u64)
        } else {
            "unknown".to_string()
        }
    }
}

pub struct FormatSelector;

impl FormatSelector {
    /// Applies the preference's rules in order; `None` when no candidate
    /// carries audio with a usable URL.
    pub fn select(
        candidates: &[MediaFormatCandidate],
        preference: FormatPreference,
    ) -> Option<Selection<'_>> {
        preference.rules().iter().find_map(|rule| {
            let candidate = match rule {
                SelectionRule::BestAudioOnly => Self::best_audio_only(candidates),
                SelectionRule::MedianAudioOnly => Self::median_audio_only(candidates),
                SelectionRule::AnyWithAudio => Self::any_with_audio(candidates),
            }?;
            Some(Selection {
                candidate,
                rule: *rule,
            })
        })
    }

    fn audio_only(candidates: &[MediaFormatCandidate]) -> Vec<&MediaFormatCandidate> {
        candidates
            .iter()
            .filter(|c| c.is_audio_only() && c.has_url())
            .collect()
    }

    /// Highest bitrate; ties keep provider order.
    fn best_audio_only(candidates: &[MediaFormatCandidate]) -> Option<&MediaFormatCandidate> {
        Self::audio_only(candidates)
            .into_iter()
            .fold(None, |best: Option<&MediaFormatCandidate>, c| match best {
                Some(b) if b.bitrate() >= c.bitrate() => Some(b),
                _ => Some(c),
            })
    }

    /// Element at `len / 2` after a stable ascending sort by bitrate.
    fn median_audio_only(candidates: &[MediaFormatCandidate]) -> Option<&MediaFormatCandidate> {
        let mut audio = Self::audio_only(candidates);
        if audio.is_empty() {
            return None;
        }
        audio.sort_by(|a, b| a.bitrate().total_cmp(&b.bitrate()));
        Some(audio[audio.len() / 2])
    }

    fn any_with_audio(candidates: &[MediaFormatCandidate]) -> Option<&MediaFormatCandidate> {
        candidates.iter().find(|c| c.has_audio && c.has_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn audio(url: &str, bitrate: Option<f64>) -> MediaFormatCandidate {
        MediaFormatCandidate {
            has_audio: true,
            has_video: false,
            bitrate_kbps: bitrate,
            extension: "m4a".to_string(),
            resource_url: url.to_string(),
            format_note: None,
        }
    }

    fn muxed(url: &str) -> MediaFormatCandidate {
        MediaFormatCandidate {
            has_video: true,
            extension: "mp4".to_string(),
            ..audio(url, None)
        }
    }

    fn video_only(url: &str) -> MediaFormatCandidate {
        MediaFormatCandidate {
            has_audio: false,
            ..muxed(url)
        }
    }

    fn pick(candidates: &[MediaFormatCandidate], pref: FormatPreference) -> Option<String> {
        FormatSelector::select(candidates, pref).map(|s| s.candidate.resource_url.clone())
    }

    #[test]
    fn test_best_picks_highest_bitrate() {
        let candidates = vec![audio("a", Some(64.0)), audio("b", Some(256.0)), audio("c", Some(128.0))];
        let selection = FormatSelector::select(&candidates, FormatPreference::BestAudioOnly).unwrap();

        assert_eq!(selection.candidate.resource_url, "b");
        assert_eq!(selection.rule, SelectionRule::BestAudioOnly);
        assert_eq!(selection.bitrate_label(), "256kbps");
        assert_eq!(selection.format_label(), "audio");
    }

    #[test]
    fn test_format_label_uses_note() {
        let candidates = vec![MediaFormatCandidate {
            format_note: Some("medium".to_string()),
            ..audio("a", Some(129.5))
        }];
        let selection = FormatSelector::select(&candidates, FormatPreference::BestAudioOnly).unwrap();
        assert_eq!(selection.format_label(), "medium");
        assert_eq!(selection.bitrate_label(), "130kbps");
    }

    #[test]
    fn test_best_tie_keeps_first() {
        let candidates = vec![audio("first", Some(128.0)), audio("second", Some(128.0))];
        assert_eq!(pick(&candidates, FormatPreference::BestAudioOnly).as_deref(), Some("first"));
    }

    #[test]
    fn test_best_is_monotonic() {
        let mut candidates = vec![audio("a", Some(64.0)), audio("b", Some(128.0))];
        assert_eq!(pick(&candidates, FormatPreference::BestAudioOnly).as_deref(), Some("b"));

        candidates.push(audio("c", Some(320.0)));
        assert_eq!(pick(&candidates, FormatPreference::BestAudioOnly).as_deref(), Some("c"));

        candidates.push(audio("d", Some(96.0)));
        assert_eq!(pick(&candidates, FormatPreference::BestAudioOnly).as_deref(), Some("c"));
    }

    #[test]
    fn test_median_selection() {
        let candidates = vec![audio("hi", Some(256.0)), audio("lo", Some(64.0)), audio("mid", Some(128.0))];
        let selection = FormatSelector::select(&candidates, FormatPreference::MedianAudioOnly).unwrap();
        assert_eq!(selection.candidate.resource_url, "mid");
        assert_eq!(selection.rule, SelectionRule::MedianAudioOnly);

        // Con número par se toma el elemento superior
        let candidates = vec![audio("a", Some(64.0)), audio("b", Some(128.0))];
        assert_eq!(pick(&candidates, FormatPreference::MedianAudioOnly).as_deref(), Some("b"));

        let single = vec![audio("only", None)];
        assert_eq!(pick(&single, FormatPreference::MedianAudioOnly).as_deref(), Some("only"));
    }

    #[test]
    fn test_missing_bitrate_sorts_lowest() {
        let candidates = vec![audio("none", None), audio("a", Some(96.0)), audio("b", Some(160.0))];
        assert_eq!(pick(&candidates, FormatPreference::MedianAudioOnly).as_deref(), Some("a"));
        assert_eq!(pick(&candidates, FormatPreference::BestAudioOnly).as_deref(), Some("b"));

        let unknown = vec![audio("x", None)];
        let selection = FormatSelector::select(&unknown, FormatPreference::BestAudioOnly).unwrap();
        assert_eq!(selection.bitrate_label(), "unknown");
    }

    #[test]
    fn test_falls_back_to_mixed_stream() {
        let candidates = vec![video_only("v"), muxed("m")];
        let selection = FormatSelector::select(&candidates, FormatPreference::BestAudioOnly).unwrap();

        assert_eq!(selection.candidate.resource_url, "m");
        assert_eq!(selection.rule, SelectionRule::AnyWithAudio);
        assert_eq!(selection.format_label(), "mixed");
    }

    #[test]
    fn test_any_with_audio_prefers_provider_order() {
        let candidates = vec![video_only("v"), muxed("m"), audio("a", Some(320.0))];
        let selection = FormatSelector::select(&candidates, FormatPreference::AnyWithAudio).unwrap();
        assert_eq!(selection.candidate.resource_url, "m");
    }

    #[test]
    fn test_last_resort_rule_is_always_labelled_mixed() {
        let candidates = vec![audio("a", Some(128.0))];
        let selection = FormatSelector::select(&candidates, FormatPreference::AnyWithAudio).unwrap();

        assert_eq!(selection.rule, SelectionRule::AnyWithAudio);
        assert!(!selection.candidate.has_video);
        assert_eq!(selection.format_label(), "mixed");
    }

    #[test]
    fn test_no_audio_yields_none() {
        let candidates = vec![video_only("v1"), video_only("v2")];
        assert_eq!(pick(&candidates, FormatPreference::BestAudioOnly), None);
        assert_eq!(pick(&[], FormatPreference::AnyWithAudio), None);
    }

    #[test]
    fn test_empty_urls_are_skipped() {
        let candidates = vec![audio("", Some(320.0)), audio("ok", Some(64.0))];
        assert_eq!(pick(&candidates, FormatPreference::BestAudioOnly).as_deref(), Some("ok"));

        let candidates = vec![audio(" ", Some(320.0))];
        assert_eq!(pick(&candidates, FormatPreference::BestAudioOnly), None);
    }
}
