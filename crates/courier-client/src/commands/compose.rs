//! The compose buffer and optimistic sends.
//!
//! `submit_draft` clears the buffer before the write goes out. If the write
//! fails the text comes back (unless the user already typed something new)
//! and a [`FailedSend`] is kept for `retry_send`.

use tracing::{info, warn};

use courier_shared::{ErrorKind, NotFound, SyncError, ValidationError};

use crate::core::ChatSyncCore;
use crate::events::SyncEvent;
use crate::outcome::SendOutcome;
use crate::state::FailedSend;
use crate::Result;

impl ChatSyncCore {
    pub fn set_draft(&self, text: impl Into<String>) {
        self.state().draft = text.into();
    }

    pub fn draft(&self) -> String {
        self.state().draft.clone()
    }

    /// Send the compose buffer to the open chat as the session user.
    pub async fn submit_draft(&self) -> Result<SendOutcome> {
        let (chat_id, user, content) = {
            let mut state = self.state();
            let user = state.user.clone().ok_or(SyncError::NoSession)?;
            let chat_id = state
                .open_chat
                .clone()
                .ok_or(ValidationError::NoChatSelected)?;
            if state.draft.trim().is_empty() {
                return Err(ValidationError::EmptyContent.into());
            }
            (chat_id, user, std::mem::take(&mut state.draft))
        };

        let sender_name = if user.display_name.is_empty() {
            user.username.clone()
        } else {
            user.display_name.clone()
        };

        match self.send_message(&chat_id, &user.id, &sender_name, &content).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                let retryable = matches!(error.kind(), ErrorKind::Remote | ErrorKind::Permission);
                let token = {
                    let mut state = self.state();
                    if state.draft.is_empty() {
                        state.draft = content.clone();
                    }
                    retryable.then(|| {
                        state.next_send_token += 1;
                        let token = state.next_send_token;
                        state.failed_sends.insert(
                            token,
                            FailedSend {
                                token,
                                chat_id: chat_id.clone(),
                                sender_id: user.id.clone(),
                                sender_name,
                                content,
                                error: error.clone(),
                            },
                        );
                        token
                    })
                };
                warn!(chat_id = %chat_id, error = %error, ?token, "Send failed, draft restored");
                if let Some(token) = token {
                    self.emit(SyncEvent::SendFailed {
                        token,
                        chat_id,
                        error: error.clone(),
                    });
                }
                Err(error)
            }
        }
    }

    /// Re-attempt a failed send. On success the restored draft is cleared if
    /// it still holds the same text.
    pub async fn retry_send(&self, token: u64) -> Result<SendOutcome> {
        let failed = self
            .state()
            .failed_sends
            .remove(&token)
            .ok_or(NotFound::PendingSend(token))?;

        let result = self
            .send_message(&failed.chat_id, &failed.sender_id, &failed.sender_name, &failed.content)
            .await;

        match result {
            Ok(outcome) => {
                let mut state = self.state();
                if state.draft == failed.content {
                    state.draft.clear();
                }
                info!(token, msg_id = %outcome.message().id, "Retried send delivered");
                Ok(outcome)
            }
            Err(error) => {
                let chat_id = failed.chat_id.clone();
                self.state().failed_sends.insert(
                    token,
                    FailedSend {
                        error: error.clone(),
                        ..failed
                    },
                );
                warn!(token, error = %error, "Retry failed");
                self.emit(SyncEvent::SendFailed {
                    token,
                    chat_id,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Forget a failed send. Returns `false` for an unknown token.
    pub fn discard_failed_send(&self, token: u64) -> bool {
        self.state().failed_sends.remove(&token).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::session_core;
    use courier_store::{Fault, StorePath};

    #[tokio::test]
    async fn test_submit_requires_open_chat_and_content() {
        let (_, core) = session_core("u1", &[]).await;
        core.set_draft("hello");
        assert_eq!(
            core.submit_draft().await.unwrap_err(),
            ValidationError::NoChatSelected.into()
        );
        assert_eq!(core.draft(), "hello");

        let chat = core
            .create_chat("Solo", &"u1".into(), ["u1".into()], false)
            .await
            .unwrap()
            .chat;
        core.select_chat(&chat.id).await.unwrap();
        core.set_draft("  ");
        assert_eq!(
            core.submit_draft().await.unwrap_err(),
            ValidationError::EmptyContent.into()
        );
    }

    #[tokio::test]
    async fn test_submit_clears_buffer_and_appends() {
        let (_, core) = session_core("u1", &[]).await;
        let chat = core
            .create_chat("Solo", &"u1".into(), ["u1".into()], false)
            .await
            .unwrap()
            .chat;
        core.select_chat(&chat.id).await.unwrap();

        core.set_draft("hello");
        let outcome = core.submit_draft().await.unwrap();
        assert_eq!(core.draft(), "");
        assert_eq!(outcome.message().sender_name, "u1");
        let messages = core.messages();
        assert_eq!(messages.len(), 1);

        // The push for the same message is a no-op.
        assert!(!core.apply_incoming_message(outcome.into_message()));
        assert_eq!(core.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_send_restores_draft_and_retries() {
        let (store, core) = session_core("u1", &[]).await;
        let chat = core
            .create_chat("Solo", &"u1".into(), ["u1".into()], false)
            .await
            .unwrap()
            .chat;
        core.select_chat(&chat.id).await.unwrap();
        let mut events = core.subscribe_events();

        let messages_path = StorePath::messages(&chat.id).unwrap();
        store.inject_fault(Fault::on_writes(messages_path).times(1));

        core.set_draft("hello");
        let err = core.submit_draft().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(core.draft(), "hello");
        assert!(core.messages().is_empty());

        let failed = core.failed_sends();
        assert_eq!(failed.len(), 1);
        let token = failed[0].token;
        loop {
            match events.recv().await.unwrap() {
                SyncEvent::SendFailed { token: t, .. } => {
                    assert_eq!(t, token);
                    break;
                }
                _ => continue,
            }
        }

        let outcome = core.retry_send(token).await.unwrap();
        assert_eq!(outcome.message().content, "hello");
        assert_eq!(core.draft(), "");
        assert!(core.failed_sends().is_empty());
        assert_eq!(core.messages().len(), 1);

        assert_eq!(
            core.retry_send(token).await.unwrap_err(),
            NotFound::PendingSend(token).into()
        );
    }

    #[tokio::test]
    async fn test_each_failure_gets_a_token() {
        let (store, core) = session_core("u1", &[]).await;
        let chat = core
            .create_chat("Solo", &"u1".into(), ["u1".into()], false)
            .await
            .unwrap()
            .chat;
        core.select_chat(&chat.id).await.unwrap();
        store.inject_fault(Fault::on_writes(StorePath::messages(&chat.id).unwrap()));

        core.set_draft("first");
        core.submit_draft().await.unwrap_err();
        core.set_draft("second");
        core.submit_draft().await.unwrap_err();
        assert_eq!(core.draft(), "second");

        let tokens: Vec<u64> = core.failed_sends().iter().map(|f| f.token).collect();
        assert_eq!(tokens.len(), 2);
        assert!(core.discard_failed_send(tokens[0]));
        assert!(!core.discard_failed_send(tokens[0]));
        assert_eq!(core.failed_sends().len(), 1);
    }
}
