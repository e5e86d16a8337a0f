//! Selection logic shared by the category and vendor pickers, plus the
//! split editor's balance rule.

/// Anything with a display name can be ranked.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for crate::core::Category {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for crate::core::Vendor {
    fn name(&self) -> &str {
        &self.name
    }
}

const SCORE_EXACT: u8 = 100;
const SCORE_PREFIX: u8 = 80;
const SCORE_CONTAINS: u8 = 40;

/// Results shown when a query is present.
const MAX_RANKED: usize = 8;
/// Results shown for an empty query, in input order.
const MAX_UNRANKED: usize = 10;

/// Case-insensitive match score; `None` drops the candidate.
pub fn score(name: &str, query: &str) -> Option<u8> {
    let name = name.to_lowercase();
    let query = query.to_lowercase();

    if name == query {
        Some(SCORE_EXACT)
    } else if name.starts_with(&query) {
        Some(SCORE_PREFIX)
    } else if name.contains(&query) {
        Some(SCORE_CONTAINS)
    } else {
        None
    }
}

/// Ranks candidates for the query: descending score, ties in input order,
/// capped to the top 8. An empty query returns the first 10 unranked.
pub fn rank<'a, T: Named>(candidates: &'a [T], query: &str) -> Vec<&'a T> {
    if query.is_empty() {
        return candidates.iter().take(MAX_UNRANKED).collect();
    }

    let mut scored: Vec<(u8, &T)> = candidates
        .iter()
        .filter_map(|c| score(c.name(), query).map(|s| (s, c)))
        .collect();
    // Stable, so equal scores keep input order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored.into_iter().take(MAX_RANKED).map(|(_, c)| c).collect()
}

/// The create-new row appears whenever the query is non-empty and no
/// candidate matches it exactly, case-insensitive.
pub fn offers_create<T: Named>(candidates: &[T], query: &str) -> bool {
    !query.is_empty()
        && !candidates
            .iter()
            .any(|c| c.name().eq_ignore_ascii_case(query))
}

/// What the picker hands back to the caller. Creation of a new entity is
/// deferred: the caller receives the raw query as the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Existing(usize),
    Create(String),
}

/// Keyboard-driven selection over the ranked candidates plus the optional
/// trailing create row. Opening a picker starts fresh: empty query,
/// highlight on the first row.
#[derive(Debug, Default)]
pub struct PickerState {
    pub query: String,
    pub selected: usize,
}

impl PickerState {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.selected = 0;
    }

    fn row_count<T: Named>(&self, candidates: &[T]) -> usize {
        rank(candidates, &self.query).len() + usize::from(offers_create(candidates, &self.query))
    }

    pub fn move_down<T: Named>(&mut self, candidates: &[T]) {
        let rows = self.row_count(candidates);
        if rows > 0 && self.selected + 1 < rows {
            self.selected += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Commits the highlighted row. Returns `None` when there is nothing to
    /// commit (no candidates and no create row).
    pub fn commit<T: Named>(&self, candidates: &[T]) -> Option<Choice> {
        let ranked = rank(candidates, &self.query);

        if self.selected < ranked.len() {
            let name = ranked[self.selected].name();
            let index = candidates.iter().position(|c| c.name() == name)?;
            return Some(Choice::Existing(index));
        }

        if offers_create(candidates, &self.query) {
            return Some(Choice::Create(self.query.clone()));
        }

        None
    }
}

/// Draft state for splitting one transaction across categories. Save is
/// gated on the lines balancing against the original amount.
#[derive(Debug, Clone)]
pub struct SplitDraft {
    pub total: f64,
    pub lines: Vec<crate::core::Split>,
}

/// Tolerance, in currency units, for the split balance check.
pub const BALANCE_EPSILON: f64 = 0.01;

impl SplitDraft {
    pub fn new(total: f64) -> Self {
        Self {
            total,
            lines: vec![crate::core::Split {
                category_name: String::new(),
                amount: total,
                description: String::new(),
            }],
        }
    }

    pub fn add_line(&mut self) {
        self.lines.push(crate::core::Split {
            category_name: String::new(),
            amount: 0.0,
            description: String::new(),
        });
    }

    /// At least one line must remain.
    pub fn remove_line(&mut self, index: usize) -> bool {
        if self.lines.len() <= 1 || index >= self.lines.len() {
            return false;
        }

        self.lines.remove(index);
        true
    }

    pub fn remainder(&self) -> f64 {
        self.total - self.lines.iter().map(|l| l.amount).sum::<f64>()
    }

    /// A full one-cent shortfall is out of balance; the slack keeps float
    /// noise from tipping the comparison either way.
    pub fn is_balanced(&self) -> bool {
        self.remainder().abs() < BALANCE_EPSILON - 1e-6
    }

    pub fn can_save(&self) -> bool {
        self.is_balanced() && !self.lines.is_empty()
    }
}
