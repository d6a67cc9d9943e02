//! Per-item stage execution with failure isolation.
//!
//! A [`Step`] wraps one collaborator call. [`run_stage`] feeds every item
//! through it and keeps the ones that produced a result. Item-level faults
//! are logged and the item is dropped; a collaborator that reports itself
//! unavailable aborts the stage with a [`StageError`].

use crate::error::{Fault, ItemError, StageError};
use crate::models::{Stage, WorkItem};
use async_trait::async_trait;
use tracing::{debug, warn};

/// One per-item transform.
#[async_trait]
pub trait Step: Send + Sync {
    /// What a successful call produces.
    type Output: Send;

    fn stage(&self) -> Stage;

    /// Run the collaborator for one item. `Ok(None)` means "no result".
    async fn process(&self, item: &WorkItem) -> Result<Option<Self::Output>, Fault>;

    /// Record a successful result on the item.
    fn apply(&self, item: &mut WorkItem, output: Self::Output);
}

/// Run `step` over `items`, returning the survivors in input order.
pub async fn run_stage<S>(step: &S, items: Vec<WorkItem>) -> Result<Vec<WorkItem>, StageError>
where
    S: Step + ?Sized,
{
    let stage = step.stage();
    let mut survivors = Vec::with_capacity(items.len());

    for mut item in items {
        match step.process(&item).await {
            Ok(Some(output)) => {
                step.apply(&mut item, output);
                debug!("{}: '{}' ok", stage, item.title);
                survivors.push(item);
            }
            Ok(None) => {
                log_item_error(ItemError {
                    stage,
                    title: item.title,
                    reason: "no result".to_string(),
                });
            }
            Err(Fault::Item(reason)) => {
                log_item_error(ItemError {
                    stage,
                    title: item.title,
                    reason,
                });
            }
            Err(Fault::Unavailable(reason)) => {
                return Err(StageError::new(stage, reason));
            }
        }
    }

    Ok(survivors)
}

fn log_item_error(error: ItemError) {
    warn!("{}", error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Uppercases the title unless it is listed as failing.
    struct Shout {
        no_result: &'static str,
        item_fault: &'static str,
        unavailable: &'static str,
        calls: AtomicUsize,
    }

    impl Shout {
        fn new() -> Self {
            Self {
                no_result: "-",
                item_fault: "-",
                unavailable: "-",
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Step for Shout {
        type Output = String;

        fn stage(&self) -> Stage {
            Stage::Extract
        }

        async fn process(&self, item: &WorkItem) -> Result<Option<String>, Fault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if item.title == self.no_result {
                Ok(None)
            } else if item.title == self.item_fault {
                Err(Fault::item("corrupt pdf"))
            } else if item.title == self.unavailable {
                Err(Fault::unavailable("extractor missing"))
            } else {
                Ok(Some(item.title.to_uppercase()))
            }
        }

        fn apply(&self, item: &mut WorkItem, output: String) {
            item.content = Some(output);
        }
    }

    fn items(titles: &[&str]) -> Vec<WorkItem> {
        titles.iter().map(|t| WorkItem::new(*t, "test")).collect()
    }

    #[tokio::test]
    async fn test_all_succeed_and_apply_output() {
        let step = Shout::new();
        let out = run_stage(&step, items(&["a", "b"])).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content.as_deref(), Some("A"));
        assert_eq!(out[1].content.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_item_failures_are_dropped_not_fatal() {
        let step = Shout {
            no_result: "b",
            item_fault: "d",
            ..Shout::new()
        };
        let out = run_stage(&step, items(&["a", "b", "c", "d", "e"]))
            .await
            .unwrap();
        let titles: Vec<_> = out.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c", "e"]);
        assert_eq!(step.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_unavailable_aborts_stage() {
        let step = Shout {
            unavailable: "b",
            ..Shout::new()
        };
        let err = run_stage(&step, items(&["a", "b", "c"])).await.unwrap_err();
        assert_eq!(err.stage, Stage::Extract);
        assert_eq!(err.reason, "extractor missing");
        // "c" is never processed once the collaborator is known to be down.
        assert_eq!(step.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let step = Shout::new();
        let out = run_stage(&step, Vec::new()).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(step.calls.load(Ordering::SeqCst), 0);
    }
}
