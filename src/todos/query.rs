//! Filtering, ordering and bucket counts for todo lists. Everything here runs
//! on rows the store already selected.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Time, UtcOffset};
use uuid::Uuid;

use super::dto::TodoDetails;
use super::repo_types::Todo;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineBucket {
    #[default]
    All,
    Today,
    Upcoming,
    Overdue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssigneeFilter {
    #[default]
    All,
    /// The actor is one of the assignees.
    Me,
    /// Someone other than the actor is an assignee.
    Others,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Deadline,
    Created,
    Alphabetical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// The current day as a half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl DayWindow {
    /// The day containing `now`, with midnight taken in `offset`.
    pub fn containing(now: OffsetDateTime, offset: UtcOffset) -> Self {
        let start = now.to_offset(offset).replace_time(Time::MIDNIGHT);
        Self {
            start,
            end: start + Duration::days(1),
        }
    }
}

impl DeadlineBucket {
    pub fn matches(self, todo: &Todo, day: &DayWindow) -> bool {
        match (self, todo.deadline) {
            (DeadlineBucket::All, _) => true,
            (_, None) => false,
            (DeadlineBucket::Today, Some(d)) => d >= day.start && d < day.end,
            (DeadlineBucket::Upcoming, Some(d)) => d >= day.start,
            (DeadlineBucket::Overdue, Some(d)) => d < day.start && !todo.completed,
        }
    }
}

impl AssigneeFilter {
    pub fn matches(self, item: &TodoDetails, actor: Uuid) -> bool {
        match self {
            AssigneeFilter::All => true,
            AssigneeFilter::Me => item.assigned_to.iter().any(|u| u.id == actor),
            AssigneeFilter::Others => item.assigned_to.iter().any(|u| u.id != actor),
        }
    }
}

/// Incomplete before completed, then by the chosen key. `order` only applies
/// to `SortKey::Created`.
pub fn compare(a: &Todo, b: &Todo, key: SortKey, order: SortOrder) -> Ordering {
    a.completed.cmp(&b.completed).then_with(|| match key {
        SortKey::Deadline => match (a.deadline, b.deadline) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortKey::Created => {
            let o = a.created_at.cmp(&b.created_at);
            match order {
                SortOrder::Asc => o,
                SortOrder::Desc => o.reverse(),
            }
        }
        SortKey::Alphabetical => a.text.cmp(&b.text),
    })
}

pub fn sort_todos<T: AsRef<Todo>>(items: &mut [T], key: SortKey, order: SortOrder) {
    items.sort_by(|a, b| compare(a.as_ref(), b.as_ref(), key, order));
}

/// Badge numbers for a todo set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub all: usize,
    pub active: usize,
    pub completed: usize,
    pub today: usize,
    pub upcoming: usize,
    pub overdue: usize,
}

pub fn count_buckets<T: AsRef<Todo>>(items: &[T], day: &DayWindow) -> BucketCounts {
    let mut counts = BucketCounts::default();
    for item in items {
        let todo = item.as_ref();
        counts.all += 1;
        if todo.completed {
            counts.completed += 1;
        } else {
            counts.active += 1;
        }
        if DeadlineBucket::Today.matches(todo, day) {
            counts.today += 1;
        }
        if DeadlineBucket::Upcoming.matches(todo, day) {
            counts.upcoming += 1;
        }
        if DeadlineBucket::Overdue.matches(todo, day) {
            counts.overdue += 1;
        }
    }
    counts
}

/// Caller-selected view over an already selected todo set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub deadline: DeadlineBucket,
    pub assignee: AssigneeFilter,
    pub sort: SortKey,
    pub order: SortOrder,
}

/// Applies the bucket and assignee filters, then sorts.
pub fn apply(
    items: Vec<TodoDetails>,
    actor: Uuid,
    opts: ListOptions,
    day: &DayWindow,
) -> Vec<TodoDetails> {
    let mut kept: Vec<TodoDetails> = items
        .into_iter()
        .filter(|item| opts.deadline.matches(&item.todo, day))
        .filter(|item| opts.assignee.matches(item, actor))
        .collect();
    sort_todos(&mut kept, opts.sort, opts.order);
    kept
}
