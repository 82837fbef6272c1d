use serde::{Deserialize, Serialize};
use std::fmt;

/// Appended to the last fragment when the bundle hits its size limit.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Text used when the store holds no entities.
pub const NO_DATA: &str = "no data available";

/// What a fragment describes. Every fragment is derived from store,
/// metric or graph values; none is free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    NoData,
    NotAvailable,
    EntitySummary,
    Neighborhood,
    PortfolioOverview,
    SectorDistribution,
    SectorSummary,
    HealthRanking,
    RevenueRanking,
    RiskRanking,
    ConcentrationRanking,
    GrowthRanking,
    CreditRanking,
    TopFlows,
    LifecycleDistribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub text: String,
}

impl Fragment {
    pub fn new(kind: FragmentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    fn chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Ordered, size-bounded context for one question.
///
/// The rendered form joins fragments with a single newline and never
/// exceeds `max_chars` characters. When a fragment had to be cut, the
/// last fragment ends with [`TRUNCATION_MARKER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBundle {
    fragments: Vec<Fragment>,
    max_chars: usize,
    truncated: bool,
}

impl ContextBundle {
    /// Take candidates in order until `max_fragments` or `max_chars` is
    /// reached.
    ///
    /// The fragment that overflows `max_chars` is cut at a word boundary
    /// and marked. If not even the marker fits, the bundle is empty.
    ///
    /// ```
    /// use cnpj_insight::retrieval::bundle::{ContextBundle, Fragment, FragmentKind, TRUNCATION_MARKER};
    ///
    /// let bundle = ContextBundle::assemble(
    ///     vec![
    ///         Fragment::new(FragmentKind::PortfolioOverview, "three entities"),
    ///         Fragment::new(FragmentKind::HealthRanking, "alpha beta gamma delta"),
    ///     ],
    ///     10,
    ///     35,
    /// );
    /// let text = bundle.render();
    /// assert!(text.chars().count() <= 35);
    /// assert_eq!(text, format!("three entities\nalpha{}", TRUNCATION_MARKER));
    /// ```
    pub fn assemble<I>(candidates: I, max_fragments: usize, max_chars: usize) -> Self
    where
        I: IntoIterator<Item = Fragment>,
    {
        let mut bundle = Self {
            fragments: Vec::new(),
            max_chars,
            truncated: false,
        };
        let mut used = 0;
        for candidate in candidates {
            if bundle.fragments.len() >= max_fragments {
                break;
            }
            let separator = usize::from(!bundle.fragments.is_empty());
            let needed = separator + candidate.chars();
            if used + needed <= max_chars {
                used += needed;
                bundle.fragments.push(candidate);
            } else {
                bundle.close_with_marker(candidate, used);
                break;
            }
        }
        bundle
    }

    /// Cut `overflow` (or, if too little room is left, the previous
    /// fragments) so the marker fits within `max_chars`.
    fn close_with_marker(&mut self, overflow: Fragment, used: usize) {
        self.truncated = true;
        let marker = TRUNCATION_MARKER.chars().count();

        let separator = usize::from(!self.fragments.is_empty());
        let room = self.max_chars.saturating_sub(used + separator);
        if room >= marker {
            let kept = cut_at_word(&overflow.text, room - marker);
            if !kept.is_empty() {
                let text = format!("{}{}", kept, TRUNCATION_MARKER);
                self.fragments.push(Fragment::new(overflow.kind, text));
                return;
            }
        }

        let mut used = used;
        while let Some(last) = self.fragments.last_mut() {
            let last_len = last.chars();
            let before = used - last_len;
            let budget = self.max_chars - before;
            if budget >= marker {
                let kept = cut_at_word(&last.text, budget - marker).to_string();
                last.text = format!("{}{}", kept, TRUNCATION_MARKER);
                return;
            }
            self.fragments.pop();
            used = before.saturating_sub(1);
        }

        if self.max_chars >= marker {
            let kept = cut_at_word(&overflow.text, self.max_chars - marker);
            let text = format!("{}{}", kept, TRUNCATION_MARKER);
            self.fragments.push(Fragment::new(overflow.kind, text));
        }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// True when a fragment was cut to respect `max_chars`.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Fragments joined by a newline.
    pub fn render(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Length of [`render`](Self::render) in characters.
    pub fn char_len(&self) -> usize {
        let text: usize = self.fragments.iter().map(Fragment::chars).sum();
        text + self.fragments.len().saturating_sub(1)
    }
}

impl fmt::Display for ContextBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Longest prefix of `text` with at most `max` characters that does not
/// end inside a word. Trailing whitespace is dropped.
fn cut_at_word(text: &str, max: usize) -> &str {
    let Some((end, next)) = text.char_indices().nth(max) else {
        return text.trim_end();
    };
    let prefix = &text[..end];
    if next.is_whitespace() {
        return prefix.trim_end();
    }
    match prefix.rfind(char::is_whitespace) {
        Some(space) => prefix[..space].trim_end(),
        None => "",
    }
}
