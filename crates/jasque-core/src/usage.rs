use serde::{Deserialize, Serialize};

/// Token accounting for one agent run, raw from the model provider.
/// Accumulated per turn; values never decrease over a run's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTally {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub request_count: u64,
}

impl UsageTally {
    pub fn from_counts(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            request_count: 1,
        }
    }

    /// Fold another turn's usage into the running total.
    pub fn add(&mut self, other: &UsageTally) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.request_count += other.request_count;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_turns() {
        let mut total = UsageTally::default();
        total.add(&UsageTally::from_counts(100, 40));
        total.add(&UsageTally::from_counts(250, 90));

        assert_eq!(total.input_tokens, 350);
        assert_eq!(total.output_tokens, 130);
        assert_eq!(total.request_count, 2);
        assert_eq!(total.total_tokens(), 480);
    }

    #[test]
    fn default_is_zero() {
        let tally = UsageTally::default();
        assert_eq!(tally.total_tokens(), 0);
        assert_eq!(tally.request_count, 0);
    }

    #[test]
    fn serde_roundtrip() {
        let tally = UsageTally::from_counts(12, 34);
        let json = serde_json::to_string(&tally).unwrap();
        let parsed: UsageTally = serde_json::from_str(&json).unwrap();
        assert_eq!(tally, parsed);
    }
}
