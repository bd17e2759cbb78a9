//! TaskProgressTracker - 冪等・上限付きのタスク完了カウンタ
//!
//! 完了報告は task_id で重複排除される。既出の id と上限超過の報告は
//! エラーではなく静かな no-op（書き込みもイベントもなし）。
//! `TaskCompleted` は実際に挿入が起きたときだけ一度発行される。

use crate::domain::{EngineError, LifecycleEvent, SubjectId, TaskId, TaskProgress, TaskReport};

use super::guard::{SideEffect, Step, TransitionGuard};

/// Answer to a completion report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub progress: TaskProgress,

    /// False for duplicate or over-bound reports (nothing changed).
    pub newly_recorded: bool,
}

/// Records task completions through the transition guard.
pub struct TaskProgressTracker {
    guard: TransitionGuard,
}

impl TaskProgressTracker {
    pub fn new(guard: TransitionGuard) -> Self {
        Self { guard }
    }

    /// Fold one completion report in. Unknown subject -> NotFound.
    pub async fn record_completion(
        &self,
        subject_id: &SubjectId,
        task_id: TaskId,
    ) -> Result<CompletionOutcome, EngineError> {
        let outcome = self
            .guard
            .attempt(subject_id, move |record| async move {
                let before = record.progress();
                match record.with_task_completed(task_id.clone()) {
                    TaskReport::Recorded(next) => {
                        let progress = next.progress();
                        let event = LifecycleEvent::TaskCompleted {
                            subject_id: next.subject_id.clone(),
                            task_id,
                            completed: progress.completed,
                            total: progress.total,
                        };
                        Ok(Step::Commit {
                            value: CompletionOutcome {
                                progress,
                                newly_recorded: true,
                            },
                            record: next,
                            event,
                            effect: SideEffect::None,
                        })
                    }
                    TaskReport::Duplicate | TaskReport::AtCapacity => Ok(Step::Skip {
                        value: CompletionOutcome {
                            progress: before,
                            newly_recorded: false,
                        },
                    }),
                }
            })
            .await?;

        if outcome.newly_recorded {
            tracing::info!(
                subject = %subject_id,
                completed = outcome.progress.completed,
                total = outcome.progress.total,
                "task completion recorded"
            );
        }
        Ok(outcome)
    }
}
