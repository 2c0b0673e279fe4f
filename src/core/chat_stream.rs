//! Background workers for streaming requests.
//!
//! A worker owns nothing but its [`StreamJob`]: it runs the request and
//! reports deltas and the final result back to the event loop as
//! [`AppAction`]s.

use tracing::debug;

use crate::core::app::{AppAction, AppActionDispatcher};
use crate::core::requestor::StreamRequestor;
use crate::core::turn::{StreamJob, TurnKind};

#[derive(Clone)]
pub struct ChatStreamService {
    requestor: StreamRequestor,
    dispatcher: AppActionDispatcher,
}

impl ChatStreamService {
    pub fn new(requestor: StreamRequestor, dispatcher: AppActionDispatcher) -> Self {
        Self {
            requestor,
            dispatcher,
        }
    }

    pub fn spawn_stream(&self, job: StreamJob) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move { service.run_job(job).await })
    }

    /// Runs one job to completion on the current task.
    pub async fn run_job(&self, job: StreamJob) {
        let StreamJob {
            conversation_id,
            turn_id,
            kind,
            request,
            cancel,
        } = job;
        debug!(conversation = %conversation_id, turn_id, ?kind, "Stream worker started");

        let live = self.dispatcher.clone();
        let delta_conversation = conversation_id.clone();
        let result = self
            .requestor
            .run(request, &cancel, |delta| {
                // Title text is only useful once complete.
                if kind == TurnKind::Reply {
                    live.dispatch(AppAction::TurnDelta {
                        conversation_id: delta_conversation.clone(),
                        turn_id,
                        delta: delta.to_string(),
                    });
                }
            })
            .await;

        self.dispatcher.dispatch(AppAction::TurnFinished {
            conversation_id,
            turn_id,
            kind,
            result,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::Conversation;
    use crate::core::requestor::StreamOutcome;
    use crate::core::turn::TurnCoordinator;
    use crate::utils::test_utils::{sse_chunk, test_settings, ScriptedTransport};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn worker_reports_deltas_then_the_final_result_in_order() {
        let transport = ScriptedTransport::with_chunks(vec![
            sse_chunk("Hel").into_bytes(),
            sse_chunk("lo").into_bytes(),
            b"data: [DONE]\n".to_vec(),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = ChatStreamService::new(
            StreamRequestor::new(Arc::new(transport)),
            AppActionDispatcher::new(tx),
        );
        let mut turns = TurnCoordinator::new(Conversation::new("m"));
        let job = turns.send("hi", &test_settings()).unwrap();
        let turn_id = job.turn_id;

        service.spawn_stream(job).await.unwrap();

        let mut deltas = Vec::new();
        let mut finished = None;
        while let Ok(action) = rx.try_recv() {
            match action {
                AppAction::TurnDelta { delta, .. } => {
                    assert!(finished.is_none(), "delta after the final result");
                    deltas.push(delta);
                }
                AppAction::TurnFinished {
                    turn_id: id,
                    result,
                    ..
                } => {
                    assert_eq!(id, turn_id);
                    finished = Some(result);
                }
            }
        }
        assert_eq!(deltas, vec!["Hel", "lo"]);
        assert_eq!(
            finished.unwrap().unwrap(),
            StreamOutcome::Completed("Hello".into())
        );
    }

    #[tokio::test]
    async fn title_jobs_do_not_stream_deltas() {
        let transport = ScriptedTransport::with_chunks(vec![sse_chunk("A Title").into_bytes()]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = ChatStreamService::new(
            StreamRequestor::new(Arc::new(transport)),
            AppActionDispatcher::new(tx),
        );
        let mut conversation = Conversation::new("m");
        conversation.append(crate::core::message::Role::User, "hello");
        let mut turns = TurnCoordinator::new(conversation);
        let job = turns.request_title(&test_settings()).unwrap();

        service.run_job(job).await;

        let action = rx.try_recv().unwrap();
        assert!(matches!(
            action,
            AppAction::TurnFinished {
                kind: TurnKind::Title,
                ..
            }
        ));
        assert!(rx.try_recv().is_err());
    }
}
