//! Pruning of phrase hits found through the line window.
//!
//! A windowed query pairs every line with its successor, so it also returns
//! lines whose pair only matched by accident. A hit survives if the phrase
//! is inside the line, or if some split of the phrase ends this line and
//! starts the next line of the same work.

use regex::Regex;

use crate::error::Result;
use crate::storage::{SearchColumn, WorkLine};
use crate::term::compile_pattern;

#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    whole: Regex,
    splits: Vec<(Regex, Regex)>,
}

impl PhraseMatcher {
    pub fn new(pattern: &str, words: &[String]) -> Result<Self> {
        let whole = compile_pattern(pattern)?;
        let mut splits = Vec::with_capacity(words.len().saturating_sub(1));
        for at in 1..words.len() {
            let head = format!("{}$", words[..at].join(" "));
            let tail = format!("^{}", words[at..].join(" "));
            splits.push((compile_pattern(&head)?, compile_pattern(&tail)?));
        }
        Ok(Self { whole, splits })
    }

    pub fn within(&self, line: &str) -> bool {
        self.whole.is_match(line)
    }

    /// Does the phrase start at the end of `line` and finish on `next`?
    pub fn spans(&self, line: &str, next: &str) -> bool {
        self.splits
            .iter()
            .any(|(head, tail)| head.is_match(line) && tail.is_match(next))
    }
}

/// Keep the hits that really contain the phrase. `fetch` looks up a line
/// by table and index when the following line is not among the hits.
pub fn prune(
    lines: Vec<WorkLine>,
    matcher: &PhraseMatcher,
    column: SearchColumn,
    mut fetch: impl FnMut(&str, i64) -> Result<Option<WorkLine>>,
) -> Result<Vec<WorkLine>> {
    let mut keep = vec![false; lines.len()];
    for (i, line) in lines.iter().enumerate() {
        let text = line.text(column).trim();
        if matcher.within(text) {
            keep[i] = true;
            continue;
        }
        let fetched;
        let next = match lines.get(i + 1) {
            Some(n) if n.work == line.work && n.index == line.index + 1 => Some(n),
            _ => {
                fetched = fetch(line.author(), line.index + 1)?;
                fetched.as_ref()
            }
        };
        keep[i] = match next {
            Some(next) if next.work == line.work => matcher.spans(text, next.text(column).trim()),
            _ => false,
        };
    }
    Ok(lines
        .into_iter()
        .zip(keep)
        .filter_map(|(line, kept)| kept.then_some(line))
        .collect())
}
