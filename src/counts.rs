use std::collections::HashMap;

/// Running per-class tally for one session.
///
/// Counts are per-frame occurrences: an object visible in ten frames adds ten.
#[derive(Debug, Default)]
pub struct CountAggregator {
    order: Vec<String>,
    counts: HashMap<String, u64>,
}

impl CountAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, class_name: &str) {
        match self.counts.get_mut(class_name) {
            Some(count) => *count += 1,
            None => {
                self.order.push(class_name.to_string());
                self.counts.insert(class_name.to_string(), 1);
            }
        }
    }

    /// Owned copy of the current tallies, in first-seen order.
    pub fn snapshot(&self) -> CountSnapshot {
        CountSnapshot {
            entries: self
                .order
                .iter()
                .map(|name| (name.clone(), self.counts.get(name).copied().unwrap_or(0)))
                .collect(),
        }
    }
}

/// Read-only tallies as of the moment `CountAggregator::snapshot` was called.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountSnapshot {
    entries: Vec<(String, u64)>,
}

impl CountSnapshot {
    /// Count for `class_name`; zero when never seen.
    pub fn get(&self, class_name: &str) -> u64 {
        self.entries
            .iter()
            .find(|(name, _)| name == class_name)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.entries.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
