//! Word-distance checks over a reassembled neighborhood.
//!
//! The neighborhood text is split at the first anchor match into a head and
//! a tail. The head keeps its last `distance` words and the tail its first
//! `distance` words. When the anchor recurs in the tail, the tail is cut at
//! every recurrence and each piece keeps only the words within `distance`
//! of one of its ends. Each kept run of words is tested on its own, so
//! words that were far apart never become neighbors.

use regex::Regex;

use crate::error::Result;
use crate::proximity::Polarity;
use crate::term::compile_pattern;

#[derive(Debug, Clone)]
pub struct WindowChecker {
    split: Regex,
    anchor: Regex,
    target: Regex,
    distance: usize,
    polarity: Polarity,
}

impl WindowChecker {
    /// `anchor` and `target` are pattern sources; `distance` counts words
    /// and already includes any headroom for a multi-word target.
    pub fn new(anchor: &str, target: &str, distance: usize, polarity: Polarity) -> Result<Self> {
        Ok(Self {
            split: compile_pattern(&format!(r"^(?P<head>.*?)(?:{anchor})(?P<tail>.*?)$"))?,
            anchor: compile_pattern(anchor)?,
            target: compile_pattern(target)?,
            distance,
            polarity,
        })
    }

    pub fn is_hit(&self, text: &str) -> bool {
        if self.polarity == Polarity::Near && !self.target.is_match(text) {
            return false;
        }
        let (head, tail) = match self.split.captures(text) {
            Some(caps) => (
                caps.name("head").map_or("", |m| m.as_str()),
                caps.name("tail").map_or("", |m| m.as_str()),
            ),
            None => ("", ""),
        };

        let mut runs = vec![last_words(head, self.distance)];
        if self.anchor.is_match(tail) {
            runs.extend(self.segmented(tail));
        } else {
            runs.push(first_words(tail, self.distance));
        }
        let found = runs
            .iter()
            .filter(|run| !run.is_empty())
            .any(|run| self.target.is_match(&format!(" {run} ")));
        match self.polarity {
            Polarity::Near => found,
            Polarity::NotNear => !found,
        }
    }

    /// Runs of words near an anchor when the anchor repeats in `tail`.
    pub fn segmented(&self, tail: &str) -> Vec<String> {
        let segments: Vec<&str> = self.anchor.split(tail).collect();
        let last = segments.len().saturating_sub(1);
        let d = self.distance;
        let mut runs = Vec::with_capacity(segments.len() + 1);
        for (i, segment) in segments.into_iter().enumerate() {
            let words: Vec<&str> = segment.split_whitespace().collect();
            if i == last {
                runs.push(words[..d.min(words.len())].join(" "));
            } else if words.len() > 2 * d {
                runs.push(words[..d].join(" "));
                runs.push(words[words.len() - d..].join(" "));
            } else {
                runs.push(words.join(" "));
            }
        }
        runs
    }
}

fn last_words(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    words[words.len().saturating_sub(n)..].join(" ")
}

fn first_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(distance: usize) -> WindowChecker {
        WindowChecker::new(r"(^|\s)x(\s|$)", "w3", distance, Polarity::Near).unwrap()
    }

    #[test]
    fn segments_keep_words_near_either_anchor() {
        let runs = checker(2).segmented(" w1 w2 w3 x w4 w5 x w6 w7 w8");
        assert_eq!(runs, vec!["w1 w2 w3", "w4 w5", "w6 w7"]);
    }

    #[test]
    fn long_segments_lose_their_middle() {
        let runs = checker(2).segmented(" a b c d e x f");
        assert_eq!(runs, vec!["a b", "d e", "f"]);
    }

    #[test]
    fn head_and_tail_trimming() {
        assert_eq!(last_words("a b c d ", 2), "c d");
        assert_eq!(first_words(" a b c", 2), "a b");
        assert_eq!(last_words("", 3), "");
    }
}
