/// Per-table id issuing
use std::cmp::Ordering;

/// Monotonic id counter. Ids are decimal strings; loading a table feeds
/// every stored id through [`IdCounter::observe`] so new ids always start
/// above anything already issued.
#[derive(Debug, Default, Clone)]
pub struct IdCounter {
    last: u64,
}

impl IdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next id
    pub fn next_id(&mut self) -> String {
        self.last += 1;
        self.last.to_string()
    }

    /// Raise the counter to at least `id` (non-numeric ids are ignored)
    pub fn observe(&mut self, id: &str) {
        if let Ok(n) = id.parse::<u64>() {
            self.last = self.last.max(n);
        }
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}

/// Numeric ordering for decimal id strings
pub fn id_order(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_above_observed() {
        let mut counter = IdCounter::new();
        counter.observe("7");
        counter.observe("3");
        counter.observe("gbif:99");
        assert_eq!(counter.next_id(), "8");
        assert_eq!(counter.next_id(), "9");
    }

    #[test]
    fn test_id_order_is_numeric() {
        let mut ids = vec!["10", "9", "100", "2"];
        ids.sort_by(|a, b| id_order(a, b));
        assert_eq!(ids, vec!["2", "9", "10", "100"]);
    }
}
