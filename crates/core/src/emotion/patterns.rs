use super::Emotion;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Hand-tuned reference bands for one label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmotionPattern {
    pub pitch_hz: ValueRange,
    pub volume: ValueRange,
    pub centroid_hz: ValueRange,
    pub keywords: &'static [&'static str],
}

const fn pattern(
    pitch: (f32, f32),
    volume: (f32, f32),
    centroid: (f32, f32),
    keywords: &'static [&'static str],
) -> EmotionPattern {
    EmotionPattern {
        pitch_hz: ValueRange::new(pitch.0, pitch.1),
        volume: ValueRange::new(volume.0, volume.1),
        centroid_hz: ValueRange::new(centroid.0, centroid.1),
        keywords,
    }
}

impl Emotion {
    pub const fn pattern(&self) -> EmotionPattern {
        match self {
            Emotion::Happy => pattern(
                (160.0, 300.0),
                (0.4, 0.9),
                (800.0, 3000.0),
                &[
                    "good", "great", "awesome", "wonderful", "excellent", "fantastic", "amazing",
                    "love", "perfect", "best",
                ],
            ),
            Emotion::Sad => pattern(
                (80.0, 160.0),
                (0.1, 0.5),
                (200.0, 1000.0),
                &[
                    "sad", "terrible", "awful", "bad", "disappointed", "down", "horrible", "worst",
                    "hate", "depressed",
                ],
            ),
            Emotion::Angry => pattern(
                (180.0, 400.0),
                (0.6, 1.0),
                (1200.0, 4000.0),
                &[
                    "angry", "furious", "mad", "hate", "annoying", "stupid", "rage", "pissed",
                    "damn", "idiot",
                ],
            ),
            Emotion::Excited => pattern(
                (200.0, 450.0),
                (0.5, 1.0),
                (1000.0, 3500.0),
                &[
                    "excited", "amazing", "incredible", "wow", "fantastic", "awesome",
                    "unbelievable", "epic", "brilliant",
                ],
            ),
            Emotion::Calm => pattern(
                (110.0, 180.0),
                (0.2, 0.6),
                (300.0, 1200.0),
                &[
                    "calm", "peaceful", "relaxed", "quiet", "serene", "tranquil", "gentle", "soft",
                    "steady",
                ],
            ),
            Emotion::Nervous => pattern(
                (170.0, 300.0),
                (0.15, 0.6),
                (600.0, 2500.0),
                &[
                    "nervous", "worried", "anxious", "scared", "uncertain", "afraid", "concerned",
                    "stressed",
                ],
            ),
            Emotion::Confident => pattern(
                (120.0, 220.0),
                (0.4, 0.8),
                (500.0, 2000.0),
                &[
                    "confident", "sure", "certain", "definitely", "absolutely", "positive",
                    "strong", "determined",
                ],
            ),
            Emotion::Surprised => pattern(
                (220.0, 500.0),
                (0.4, 0.95),
                (800.0, 3500.0),
                &[
                    "surprised", "wow", "really", "unexpected", "shocking", "unbelievable", "omg",
                    "whoa",
                ],
            ),
            Emotion::Neutral => pattern(
                (120.0, 220.0),
                (0.25, 0.7),
                (400.0, 1800.0),
                &[
                    "hello", "yes", "no", "okay", "fine", "hi", "thanks", "well", "the", "and",
                ],
            ),
            Emotion::Frustrated => pattern(
                (140.0, 280.0),
                (0.25, 0.85),
                (500.0, 2200.0),
                &[
                    "frustrated", "annoying", "difficult", "problem", "issue", "trouble", "ugh",
                    "damn",
                ],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_label_has_well_formed_ranges() {
        for emotion in Emotion::ALL {
            let p = emotion.pattern();
            assert!(p.pitch_hz.min < p.pitch_hz.max, "{emotion}");
            assert!(p.volume.min < p.volume.max, "{emotion}");
            assert!(p.volume.max <= 1.0, "{emotion}");
            assert!(p.centroid_hz.min < p.centroid_hz.max, "{emotion}");
            assert!(!p.keywords.is_empty(), "{emotion}");
        }
    }

    #[test]
    fn ranges_are_inclusive() {
        let p = Emotion::Happy.pattern();
        assert!(p.pitch_hz.contains(160.0));
        assert!(p.pitch_hz.contains(300.0));
        assert!(!p.pitch_hz.contains(300.5));
    }
}
