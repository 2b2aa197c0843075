// Sorted repository views.
// Builds the four descending projections served by /view/top/{n}/{key}.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::error::QueryError;
use crate::github::Repository;

/// Repository fields the views sort on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRecord {
    pub name: String,
    pub forks: u64,
    pub updated_at: DateTime<Utc>,
    pub open_issues: u64,
    pub stars: u64,
}

impl From<&Repository> for RepoRecord {
    fn from(repo: &Repository) -> Self {
        Self {
            name: repo.name.clone(),
            forks: repo.forks_count,
            updated_at: repo.updated_at,
            open_issues: repo.open_issues_count,
            stars: repo.stargazers_count,
        }
    }
}

impl RepoRecord {
    /// JSON value of this record's metric for `key`.
    pub fn metric(&self, key: ViewKey) -> Value {
        match key {
            ViewKey::Forks => Value::from(self.forks),
            ViewKey::LastUpdated => Value::from(format_timestamp(&self.updated_at)),
            ViewKey::OpenIssues => Value::from(self.open_issues),
            ViewKey::Stars => Value::from(self.stars),
        }
    }

    /// Descending comparison on one key.
    fn cmp_desc(&self, other: &Self, key: ViewKey) -> Ordering {
        match key {
            ViewKey::Forks => other.forks.cmp(&self.forks),
            ViewKey::LastUpdated => other.updated_at.cmp(&self.updated_at),
            ViewKey::OpenIssues => other.open_issues.cmp(&self.open_issues),
            ViewKey::Stars => other.stars.cmp(&self.stars),
        }
    }
}

/// RFC 3339 in UTC with a `Z` suffix and whole seconds.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Sort key of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Forks,
    LastUpdated,
    OpenIssues,
    Stars,
}

impl ViewKey {
    pub const ALL: [ViewKey; 4] = [
        ViewKey::Forks,
        ViewKey::LastUpdated,
        ViewKey::OpenIssues,
        ViewKey::Stars,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKey::Forks => "forks",
            ViewKey::LastUpdated => "last_updated",
            ViewKey::OpenIssues => "open_issues",
            ViewKey::Stars => "stars",
        }
    }
}

impl FromStr for ViewKey {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| QueryError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four orderings of the same shared records.
#[derive(Debug, Clone, Default)]
pub struct ViewIndex {
    by_forks: Vec<Arc<RepoRecord>>,
    by_last_updated: Vec<Arc<RepoRecord>>,
    by_open_issues: Vec<Arc<RepoRecord>>,
    by_stars: Vec<Arc<RepoRecord>>,
}

impl ViewIndex {
    /// Build all views. Sorting is stable, so equal keys keep input order.
    pub fn build(records: Vec<RepoRecord>) -> Self {
        let shared: Vec<Arc<RepoRecord>> = records.into_iter().map(Arc::new).collect();
        let sorted = |key: ViewKey| {
            let mut view = shared.clone();
            view.sort_by(|a, b| a.cmp_desc(b, key));
            view
        };

        Self {
            by_forks: sorted(ViewKey::Forks),
            by_last_updated: sorted(ViewKey::LastUpdated),
            by_open_issues: sorted(ViewKey::OpenIssues),
            by_stars: sorted(ViewKey::Stars),
        }
    }

    pub fn view(&self, key: ViewKey) -> &[Arc<RepoRecord>] {
        match key {
            ViewKey::Forks => &self.by_forks,
            ViewKey::LastUpdated => &self.by_last_updated,
            ViewKey::OpenIssues => &self.by_open_issues,
            ViewKey::Stars => &self.by_stars,
        }
    }

    /// First `min(n, len)` records of a view.
    pub fn top_n(&self, key: ViewKey, n: usize) -> &[Arc<RepoRecord>] {
        let view = self.view(key);
        &view[..n.min(view.len())]
    }

    pub fn len(&self) -> usize {
        self.by_forks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_forks.is_empty()
    }

    /// `[["{org}/{name}", metric], ...]` for the top `n` of a view.
    pub fn render_top(&self, key: ViewKey, n: usize, org: &str) -> Value {
        Value::Array(
            self.top_n(key, n)
                .iter()
                .map(|record| {
                    Value::Array(vec![
                        Value::from(format!("{}/{}", org, record.name)),
                        record.metric(key),
                    ])
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str, forks: u64, day: u32, open_issues: u64, stars: u64) -> RepoRecord {
        RepoRecord {
            name: name.to_string(),
            forks,
            updated_at: Utc.with_ymd_and_hms(2024, 1, day, 8, 30, 0).unwrap(),
            open_issues,
            stars,
        }
    }

    fn sample() -> Vec<RepoRecord> {
        vec![
            record("hystrix", 4700, 3, 300, 24000),
            record("zuul", 2300, 20, 12, 13000),
            record("eureka", 3700, 11, 250, 12000),
            record("conductor", 2300, 15, 60, 12500),
        ]
    }

    fn names(records: &[Arc<RepoRecord>]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_views_are_sorted_descending() {
        let index = ViewIndex::build(sample());
        assert_eq!(
            names(index.view(ViewKey::Forks)),
            vec!["hystrix", "eureka", "zuul", "conductor"]
        );
        assert_eq!(
            names(index.view(ViewKey::LastUpdated)),
            vec!["zuul", "conductor", "eureka", "hystrix"]
        );
        assert_eq!(
            names(index.view(ViewKey::OpenIssues)),
            vec!["hystrix", "eureka", "conductor", "zuul"]
        );
        assert_eq!(
            names(index.view(ViewKey::Stars)),
            vec!["hystrix", "zuul", "conductor", "eureka"]
        );
    }

    #[test]
    fn test_ties_keep_input_order() {
        let index = ViewIndex::build(sample());
        // zuul and conductor both have 2300 forks; zuul came first upstream.
        let forks = names(index.view(ViewKey::Forks));
        let zuul = forks.iter().position(|n| *n == "zuul").unwrap();
        let conductor = forks.iter().position(|n| *n == "conductor").unwrap();
        assert!(zuul < conductor);

        let again = ViewIndex::build(sample());
        for key in ViewKey::ALL {
            assert_eq!(names(index.view(key)), names(again.view(key)));
        }
    }

    #[test]
    fn test_top_n_clamps() {
        let index = ViewIndex::build(sample());
        assert_eq!(index.top_n(ViewKey::Stars, 0).len(), 0);
        assert_eq!(index.top_n(ViewKey::Stars, 2).len(), 2);
        assert_eq!(index.top_n(ViewKey::Stars, 4).len(), 4);
        assert_eq!(index.top_n(ViewKey::Stars, 1000).len(), 4);
        assert!(ViewIndex::default().top_n(ViewKey::Forks, 5).is_empty());
    }

    #[test]
    fn test_top_n_is_non_increasing() {
        let index = ViewIndex::build(sample());
        for n in 0..=6 {
            let top = index.top_n(ViewKey::OpenIssues, n);
            assert_eq!(top.len(), n.min(4));
            assert!(top.windows(2).all(|w| w[0].open_issues >= w[1].open_issues));
        }
    }

    #[test]
    fn test_views_share_the_same_records() {
        let index = ViewIndex::build(sample());
        let mut base: Vec<*const RepoRecord> =
            index.view(ViewKey::Forks).iter().map(Arc::as_ptr).collect();
        base.sort();
        for key in ViewKey::ALL {
            let mut ptrs: Vec<*const RepoRecord> =
                index.view(key).iter().map(Arc::as_ptr).collect();
            ptrs.sort();
            assert_eq!(ptrs, base, "view {} differs", key);
        }
    }

    #[test]
    fn test_render_top() {
        let index = ViewIndex::build(vec![record("A", 5, 1, 0, 10), record("B", 9, 2, 0, 2)]);
        assert_eq!(
            index.render_top(ViewKey::Forks, 1, "org"),
            serde_json::json!([["org/B", 9]])
        );
        assert_eq!(
            index.render_top(ViewKey::Stars, 1, "org"),
            serde_json::json!([["org/A", 10]])
        );
        assert_eq!(
            index.render_top(ViewKey::LastUpdated, 1, "org"),
            serde_json::json!([["org/B", "2024-01-02T08:30:00Z"]])
        );
    }

    #[test]
    fn test_view_key_parsing() {
        assert_eq!("forks".parse::<ViewKey>(), Ok(ViewKey::Forks));
        assert_eq!("last_updated".parse::<ViewKey>(), Ok(ViewKey::LastUpdated));
        assert_eq!(
            "watchers".parse::<ViewKey>(),
            Err(QueryError::UnknownKey("watchers".into()))
        );
    }
}
